//! Remote work item store: the capability surface plus its two
//! implementations (Azure DevOps REST, in-memory for tests).

pub mod devops;
pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    Iteration, IterationUpdate, SubscriptionOutcome, WorkItem, WorkItemDraft, WorkItemUpdate,
};

/// Field reference names used by the remote store.
pub mod fields {
    pub const ID: &str = "System.Id";
    pub const TITLE: &str = "System.Title";
    pub const WORK_ITEM_TYPE: &str = "System.WorkItemType";
    pub const STATE: &str = "System.State";
    pub const DESCRIPTION: &str = "System.Description";
    pub const PARENT: &str = "System.Parent";
    pub const ITERATION_PATH: &str = "System.IterationPath";
    pub const ACCEPTANCE_CRITERIA: &str = "Microsoft.VSTS.Common.AcceptanceCriteria";
    pub const STORY_POINTS: &str = "Microsoft.VSTS.Scheduling.StoryPoints";
    pub const EFFORT: &str = "Microsoft.VSTS.Scheduling.Effort";
}

/// Remote store errors.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: personal access token missing or rejected")]
    Unauthorized,

    #[error("Server error: {0}")]
    Server(String),
}

/// Accepts `YYYY-MM-DD` or RFC 3339 and returns the wire form the remote
/// store expects (`YYYY-MM-DDT00:00:00Z` for bare dates).
pub(crate) fn normalize_date(value: &str) -> Result<String, RemoteError> {
    if chrono::NaiveDate::parse_from_str(value, "%Y-%m-%d").is_ok() {
        return Ok(format!("{}T00:00:00Z", value));
    }
    if chrono::DateTime::parse_from_rfc3339(value).is_ok() {
        return Ok(value.to_string());
    }
    Err(RemoteError::BadRequest(format!(
        "invalid date '{}', expected YYYY-MM-DD or RFC 3339",
        value
    )))
}

/// Operations the rest of the crate needs from a work item store.
///
/// The upload orchestrator and the reverse hierarchy builder are written
/// against this trait, so tests run the same code paths against the
/// in-memory store that production runs against Azure DevOps.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Creates a work item, optionally linked under a parent.
    async fn create_item(
        &self,
        draft: &WorkItemDraft,
        parent_id: Option<u64>,
    ) -> Result<WorkItem, RemoteError>;

    /// Applies a partial update to an existing item.
    async fn update_item(&self, id: u64, update: &WorkItemUpdate)
        -> Result<WorkItem, RemoteError>;

    /// Fetches one item by id. `Ok(None)` when the id does not exist.
    async fn get_item(&self, id: u64) -> Result<Option<WorkItem>, RemoteError>;

    /// Finds items by exact title, any parent.
    async fn search_items(&self, title: &str) -> Result<Vec<WorkItem>, RemoteError>;

    /// Runs a free-form query and returns the matching items.
    async fn query(&self, wiql: &str) -> Result<Vec<WorkItem>, RemoteError>;

    /// Lists every iteration defined for the project.
    async fn list_iterations(&self) -> Result<Vec<Iteration>, RemoteError>;

    /// Creates an iteration, with optional start/finish dates.
    async fn create_iteration(
        &self,
        name: &str,
        start_date: Option<&str>,
        finish_date: Option<&str>,
    ) -> Result<Iteration, RemoteError>;

    /// Renames an iteration and/or changes its dates.
    async fn update_iteration(
        &self,
        current_name: &str,
        update: &IterationUpdate,
    ) -> Result<Iteration, RemoteError>;

    /// Subscribes an iteration to the team backlog by its identifier.
    async fn subscribe_iteration(
        &self,
        identifier: &str,
    ) -> Result<SubscriptionOutcome, RemoteError>;
}
