//! Domain models for BacklogForge.
//!
//! # Core Concepts
//!
//! The same hierarchy (epics → features → stories → tasks) passes through
//! three states, each with its own types:
//!
//! - [`TemplateDoc`]: An authored template, carrying expansion markers
//!   (`optional`, `parameterized`, `default_instances`, `instance_key`).
//! - [`Backlog`]: The expanded result. Concrete nodes only; placeholders are
//!   resolved and markers are gone, so a backlog can always be uploaded.
//! - [`WorkItem`]: An item as the remote store holds it, with a numeric id,
//!   workflow state, and parent link. Remote identity never appears on the
//!   template side.

mod backlog;
mod template;
mod work_item;

pub use backlog::*;
pub use template::*;
pub use work_item::*;
