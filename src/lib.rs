//! BacklogForge: template-driven backlog generation and synchronization
//! for Azure DevOps.
//!
//! A YAML template describes an Epic > Feature > User Story > Task
//! hierarchy with `{{name}}` placeholders; [`template`] expands it into a
//! concrete backlog, [`sync`] uploads the result through a [`remote`]
//! store and rebuilds hierarchies from flat work item records, and [`mcp`]
//! exposes the whole pipeline as MCP tools.

pub mod mcp;
pub mod models;
pub mod remote;
pub mod sync;
pub mod template;
