//! Request and response types for MCP tools.

use std::collections::BTreeMap;

use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::models::{BacklogCounts, Iteration, WorkItem};
use crate::sync::hierarchy::Summary;
use crate::sync::{ItemOutcome, UploadReport};

// ============================================================
// Request Types
// ============================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GenerateProjectRequest {
    #[schemars(description = "Path to the YAML template file to expand")]
    pub template_path: String,
    #[schemars(
        description = "Project name substituted into the epic title; defaults to the name baked into the template"
    )]
    #[serde(default)]
    pub project_name: Option<String>,
    #[schemars(
        description = "Instance names for 'Data Source Integration - {{name}}' features (e.g. SAP, Salesforce)"
    )]
    #[serde(default)]
    pub datasources: Option<Vec<String>>,
    #[schemars(
        description = "Instance names for 'Dimension - {{name}}' stories under the Data Modeling Layer feature"
    )]
    #[serde(default)]
    pub dimensions: Option<Vec<String>>,
    #[schemars(
        description = "Instance names for 'Fact - {{name}}' stories under the Data Modeling Layer feature"
    )]
    #[serde(default)]
    pub facts: Option<Vec<String>>,
    #[schemars(description = "Instance names for 'Semantic Model - {{name}}' features")]
    #[serde(default)]
    pub semantic_models: Option<Vec<String>>,
    #[schemars(description = "Instance names for 'Presentation Layer - {{name}}' features")]
    #[serde(default)]
    pub visualizations: Option<Vec<String>>,
    #[schemars(
        description = "Keywords matching feature titles to drop before expansion (case-insensitive substring match)"
    )]
    #[serde(default)]
    pub exclude: Vec<String>,
    #[schemars(
        description = "When true, exclusion keywords only remove features marked optional in the template"
    )]
    #[serde(default)]
    pub exclude_optional_only: bool,
    #[schemars(
        description = "Where to write the expanded backlog YAML; defaults to data/<project-slug>.yaml"
    )]
    #[serde(default)]
    pub output_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UploadFromTemplateRequest {
    #[schemars(
        description = "Path to a backlog YAML file, either a template or a previously expanded file"
    )]
    pub yaml_path: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetProjectStatusRequest {
    #[schemars(description = "Limit the report to the epic with this title")]
    #[serde(default)]
    pub epic_title: Option<String>,
    #[schemars(description = "Include aggregate counts and totals in the response. Defaults to true.")]
    #[serde(default = "default_true")]
    pub include_summary: bool,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetWorkItemRequest {
    #[schemars(description = "The numeric id of the work item")]
    pub id: u64,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SearchWorkItemsRequest {
    #[schemars(description = "Exact title to search for")]
    pub title: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateWorkItemRequest {
    #[schemars(description = "Work item type: 'Epic', 'Feature', 'User Story', or 'Task'")]
    pub work_item_type: String,
    #[schemars(description = "Title of the new work item")]
    pub title: String,
    #[schemars(description = "Description text; plain text with bullet lines is converted to HTML")]
    #[serde(default)]
    pub description: Option<String>,
    #[schemars(description = "Acceptance criteria (User Story only; ignored for other types)")]
    #[serde(default)]
    pub acceptance_criteria: Option<String>,
    #[schemars(description = "Story points (User Story only)")]
    #[serde(default)]
    pub story_points: Option<f64>,
    #[schemars(description = "Estimated hours (Task only)")]
    #[serde(default)]
    pub estimate: Option<f64>,
    #[schemars(description = "Id of the parent work item to link under")]
    #[serde(default)]
    pub parent_id: Option<u64>,
    #[schemars(description = "Iteration path to assign, e.g. 'MyProject\\Sprint 1'")]
    #[serde(default)]
    pub iteration_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateWorkItemRequest {
    #[schemars(description = "The numeric id of the work item to update")]
    pub id: u64,
    #[schemars(description = "New title")]
    #[serde(default)]
    pub title: Option<String>,
    #[schemars(description = "New description")]
    #[serde(default)]
    pub description: Option<String>,
    #[schemars(description = "New state, e.g. 'Active' or 'Closed'")]
    #[serde(default)]
    pub state: Option<String>,
    #[schemars(description = "New iteration path")]
    #[serde(default)]
    pub iteration_path: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunWiqlQueryRequest {
    #[schemars(
        description = "A WIQL query, e.g. \"SELECT [System.Id] FROM WorkItems WHERE [System.WorkItemType] = 'Epic'\""
    )]
    pub query: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct CreateIterationRequest {
    #[schemars(description = "Name of the iteration, e.g. 'Sprint 1'")]
    pub name: String,
    #[schemars(description = "Start date as YYYY-MM-DD or RFC 3339")]
    #[serde(default)]
    pub start_date: Option<String>,
    #[schemars(description = "Finish date as YYYY-MM-DD or RFC 3339")]
    #[serde(default)]
    pub finish_date: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateIterationRequest {
    #[schemars(description = "Current name of the iteration to update")]
    pub current_name: String,
    #[schemars(description = "New name for the iteration")]
    #[serde(default)]
    pub new_name: Option<String>,
    #[schemars(description = "New start date as YYYY-MM-DD or RFC 3339")]
    #[serde(default)]
    pub start_date: Option<String>,
    #[schemars(description = "New finish date as YYYY-MM-DD or RFC 3339")]
    #[serde(default)]
    pub finish_date: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct SubscribeIterationsRequest {
    #[schemars(description = "Iteration names to add to the team's sprint board")]
    pub names: Vec<String>,
}

fn default_true() -> bool {
    true
}

// ============================================================
// Response Types
// ============================================================

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct WorkItemInfo {
    pub id: u64,
    #[serde(rename = "type")]
    pub work_item_type: String,
    pub title: String,
    pub state: String,
    pub description: Option<String>,
    pub acceptance_criteria: Option<String>,
    pub story_points: Option<f64>,
    pub estimate: Option<f64>,
    pub parent_id: Option<u64>,
    pub iteration_path: Option<String>,
}

impl From<WorkItem> for WorkItemInfo {
    fn from(item: WorkItem) -> Self {
        Self {
            id: item.id,
            work_item_type: item.work_item_type.as_str().to_string(),
            title: item.title,
            state: item.state,
            description: item.description,
            acceptance_criteria: item.acceptance_criteria,
            story_points: item.story_points,
            estimate: item.estimate,
            parent_id: item.parent_id,
            iteration_path: item.iteration_path,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct WorkItemListResponse {
    pub items: Vec<WorkItemInfo>,
    pub count: usize,
}

impl WorkItemListResponse {
    pub fn new(items: Vec<WorkItem>) -> Self {
        let items: Vec<WorkItemInfo> = items.into_iter().map(WorkItemInfo::from).collect();
        let count = items.len();
        Self { items, count }
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct CountsInfo {
    pub epics: usize,
    pub features: usize,
    pub stories: usize,
    pub tasks: usize,
    pub total: usize,
}

impl From<BacklogCounts> for CountsInfo {
    fn from(counts: BacklogCounts) -> Self {
        Self {
            epics: counts.epics,
            features: counts.features,
            stories: counts.stories,
            tasks: counts.tasks,
            total: counts.total(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct GenerateProjectResponse {
    /// Where the expanded backlog YAML was written
    pub output_path: String,
    pub counts: CountsInfo,
    pub total_story_points: f64,
    pub total_estimate_hours: f64,
    /// Validation warnings; empty when the backlog is fully clean
    pub warnings: Vec<String>,
    /// ASCII preview of the expanded hierarchy
    pub tree: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UploadOutcomeInfo {
    #[serde(rename = "type")]
    pub item_type: String,
    pub title: String,
    pub status: String,
    pub message: String,
    pub id: Option<u64>,
}

impl From<&ItemOutcome> for UploadOutcomeInfo {
    fn from(outcome: &ItemOutcome) -> Self {
        Self {
            item_type: outcome.item_type.as_str().to_string(),
            title: outcome.title.clone(),
            status: outcome.status.as_str().to_string(),
            message: outcome.message.clone(),
            id: outcome.id,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UploadReportInfo {
    pub outcomes: Vec<UploadOutcomeInfo>,
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
    pub parent_unavailable: usize,
    /// Formatted report text, one line per outcome
    pub text: String,
}

impl From<&UploadReport> for UploadReportInfo {
    fn from(report: &UploadReport) -> Self {
        Self {
            outcomes: report.outcomes.iter().map(UploadOutcomeInfo::from).collect(),
            created: report.created,
            skipped: report.skipped,
            failed: report.failed,
            parent_unavailable: report.parent_unavailable,
            text: report.format_lines(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct UploadFromTemplateResponse {
    /// The YAML file the upload was expanded from
    pub file: String,
    pub report: UploadReportInfo,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SummaryInfo {
    pub total_items: usize,
    pub counts: BTreeMap<String, usize>,
    pub states: BTreeMap<String, BTreeMap<String, usize>>,
    pub total_story_points: f64,
    pub total_estimate_hours: f64,
}

impl From<Summary> for SummaryInfo {
    fn from(summary: Summary) -> Self {
        Self {
            total_items: summary.total_items,
            counts: summary.counts,
            states: summary.states,
            total_story_points: summary.total_story_points,
            total_estimate_hours: summary.total_estimate_hours,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ProjectStatusResponse {
    /// ASCII rendering of the remote hierarchy
    pub tree: String,
    pub summary: Option<SummaryInfo>,
    /// Local YAML snapshots written, one per epic
    pub saved_files: Vec<String>,
    pub total_records: usize,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct IterationInfo {
    pub id: u64,
    pub identifier: String,
    pub name: String,
    pub path: String,
    pub start_date: Option<String>,
    pub finish_date: Option<String>,
}

impl From<Iteration> for IterationInfo {
    fn from(iteration: Iteration) -> Self {
        Self {
            id: iteration.id,
            identifier: iteration.identifier,
            name: iteration.name,
            path: iteration.path,
            start_date: iteration.start_date,
            finish_date: iteration.finish_date,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct IterationListResponse {
    pub iterations: Vec<IterationInfo>,
    pub count: usize,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SubscriptionResultInfo {
    pub name: String,
    /// The iteration's GUID identifier, when the name resolved to one
    pub identifier: Option<String>,
    /// "subscribed", "already_subscribed", or "not_found"
    pub outcome: String,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SubscribeIterationsResponse {
    pub results: Vec<SubscriptionResultInfo>,
}
