//! Synchronization between expanded backlogs and the remote store.
//!
//! [`upload`] pushes a backlog top-down; [`hierarchy`] rebuilds trees from
//! flat remote records; [`tree_render`] draws both as indented text.

pub mod hierarchy;
pub mod tree_render;

use serde::{Deserialize, Serialize};

use crate::models::{Backlog, Feature, Story, WorkItemDraft, WorkItemType};
use crate::remote::RemoteStore;

/// What happened to one node during upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Created,
    Skipped,
    Failed,
    ParentUnavailable,
}

impl UploadStatus {
    /// Single-character marker used in report lines.
    pub fn marker(&self) -> char {
        match self {
            Self::Created => '+',
            Self::Skipped => '~',
            Self::Failed => '!',
            Self::ParentUnavailable => '^',
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
            Self::ParentUnavailable => "parent_unavailable",
        }
    }
}

/// Per-node upload result, in walk order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemOutcome {
    pub item_type: WorkItemType,
    pub title: String,
    pub status: UploadStatus,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

/// Full result of an upload run: every outcome plus counters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UploadReport {
    pub outcomes: Vec<ItemOutcome>,
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
    pub parent_unavailable: usize,
}

impl UploadReport {
    pub fn push(&mut self, outcome: ItemOutcome) {
        match outcome.status {
            UploadStatus::Created => self.created += 1,
            UploadStatus::Skipped => self.skipped += 1,
            UploadStatus::Failed => self.failed += 1,
            UploadStatus::ParentUnavailable => self.parent_unavailable += 1,
        }
        self.outcomes.push(outcome);
    }

    /// One line per item in walk order, e.g.
    /// `[+] Epic: Platform - created [id 1]`.
    pub fn format_lines(&self) -> String {
        let mut out = String::new();
        for outcome in &self.outcomes {
            out.push_str(&format!(
                "[{}] {}: {} - {}",
                outcome.status.marker(),
                outcome.item_type.as_str(),
                outcome.title,
                outcome.message
            ));
            if let Some(id) = outcome.id {
                out.push_str(&format!(" [id {}]", id));
            }
            out.push('\n');
        }
        out
    }
}

/// Uploads a backlog to the remote store, top-down and idempotently.
///
/// A node is skipped when a remote item with the same title under the same
/// parent already exists; its id still anchors the node's children, so
/// re-running an interrupted upload creates only what is missing. A failed
/// create records the node as failed and its whole subtree as parent
/// unavailable, then the walk continues with siblings. Remote errors never
/// abort the run; they end up in the report.
pub async fn upload(backlog: &Backlog, store: &dyn RemoteStore) -> UploadReport {
    let mut report = UploadReport::default();
    for epic in &backlog.epics {
        let draft = WorkItemDraft::from_epic(epic);
        let Some(epic_id) = push_node(store, &draft, None, &mut report).await else {
            for feature in &epic.features {
                mark_feature_unavailable(feature, &mut report);
            }
            continue;
        };
        for feature in &epic.features {
            let draft = WorkItemDraft::from_feature(feature);
            let Some(feature_id) = push_node(store, &draft, Some(epic_id), &mut report).await
            else {
                for story in &feature.stories {
                    mark_story_unavailable(story, &mut report);
                }
                continue;
            };
            for story in &feature.stories {
                let draft = WorkItemDraft::from_story(story);
                let Some(story_id) = push_node(store, &draft, Some(feature_id), &mut report).await
                else {
                    for task in &story.tasks {
                        mark_unavailable(WorkItemType::Task, &task.title, &mut report);
                    }
                    continue;
                };
                for task in &story.tasks {
                    let draft = WorkItemDraft::from_task(task);
                    push_node(store, &draft, Some(story_id), &mut report).await;
                }
            }
        }
    }
    report
}

/// Creates one node unless it already exists. Returns the remote id to hang
/// children from, or `None` when creation failed.
async fn push_node(
    store: &dyn RemoteStore,
    draft: &WorkItemDraft,
    parent_id: Option<u64>,
    report: &mut UploadReport,
) -> Option<u64> {
    if let Some(existing) = find_existing(store, &draft.title, parent_id).await {
        tracing::info!(title = %draft.title, id = existing, "work item already exists, skipping");
        report.push(ItemOutcome {
            item_type: draft.work_item_type,
            title: draft.title.clone(),
            status: UploadStatus::Skipped,
            message: "already exists".to_string(),
            id: Some(existing),
        });
        return Some(existing);
    }

    match store.create_item(draft, parent_id).await {
        Ok(item) => {
            tracing::info!(title = %item.title, id = item.id, "created work item");
            report.push(ItemOutcome {
                item_type: draft.work_item_type,
                title: draft.title.clone(),
                status: UploadStatus::Created,
                message: "created".to_string(),
                id: Some(item.id),
            });
            Some(item.id)
        }
        Err(e) => {
            tracing::warn!(title = %draft.title, error = %e, "failed to create work item");
            report.push(ItemOutcome {
                item_type: draft.work_item_type,
                title: draft.title.clone(),
                status: UploadStatus::Failed,
                message: e.to_string(),
                id: None,
            });
            None
        }
    }
}

/// An item exists only if both title and resolved parent id match; the
/// same title under a different parent is a distinct item. A failed search
/// counts as not-found so the create is still attempted.
async fn find_existing(
    store: &dyn RemoteStore,
    title: &str,
    parent_id: Option<u64>,
) -> Option<u64> {
    match store.search_items(title).await {
        Ok(matches) => matches
            .iter()
            .find(|item| item.title == title && item.parent_id == parent_id)
            .map(|item| item.id),
        Err(e) => {
            tracing::warn!(title = %title, error = %e, "existence check failed, attempting create");
            None
        }
    }
}

fn mark_feature_unavailable(feature: &Feature, report: &mut UploadReport) {
    mark_unavailable(WorkItemType::Feature, &feature.title, report);
    for story in &feature.stories {
        mark_story_unavailable(story, report);
    }
}

fn mark_story_unavailable(story: &Story, report: &mut UploadReport) {
    mark_unavailable(WorkItemType::UserStory, &story.title, report);
    for task in &story.tasks {
        mark_unavailable(WorkItemType::Task, &task.title, report);
    }
}

fn mark_unavailable(item_type: WorkItemType, title: &str, report: &mut UploadReport) {
    report.push(ItemOutcome {
        item_type,
        title: title.to_string(),
        status: UploadStatus::ParentUnavailable,
        message: "parent unavailable".to_string(),
        id: None,
    });
}
