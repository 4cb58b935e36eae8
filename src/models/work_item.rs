use serde::{Deserialize, Serialize};

use crate::models::{Epic, Feature, Story, Task};

/// The four work item types of the remote hierarchy, top to bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WorkItemType {
    Epic,
    Feature,
    #[serde(rename = "User Story")]
    UserStory,
    Task,
}

impl WorkItemType {
    /// All types in hierarchy order.
    pub const ALL: [WorkItemType; 4] = [
        WorkItemType::Epic,
        WorkItemType::Feature,
        WorkItemType::UserStory,
        WorkItemType::Task,
    ];

    /// Display name as the remote store spells it.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epic => "Epic",
            Self::Feature => "Feature",
            Self::UserStory => "User Story",
            Self::Task => "Task",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "Epic" => Some(Self::Epic),
            "Feature" => Some(Self::Feature),
            "User Story" => Some(Self::UserStory),
            "Task" => Some(Self::Task),
            _ => None,
        }
    }

    /// Depth in the hierarchy, 0 for epics. Used for display ordering.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Epic => 0,
            Self::Feature => 1,
            Self::UserStory => 2,
            Self::Task => 3,
        }
    }
}

/// A work item as it exists in the remote store.
///
/// Remote identity (`id`) and workflow `state` live only here; the template
/// side of the crate never carries either.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: u64,
    #[serde(rename = "type")]
    pub work_item_type: WorkItemType,
    pub title: String,
    pub state: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_points: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_path: Option<String>,
}

/// Fields for a work item that does not exist yet.
///
/// `sanitized()` drops fields that are not legal for the draft's type, so a
/// task can never reach the remote store with story points attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItemDraft {
    pub work_item_type: WorkItemType,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_points: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_path: Option<String>,
}

impl WorkItemDraft {
    pub fn from_epic(epic: &Epic) -> Self {
        Self {
            work_item_type: WorkItemType::Epic,
            title: epic.title.clone(),
            description: epic.description.clone(),
            acceptance_criteria: None,
            story_points: None,
            estimate: None,
            iteration_path: epic.iteration_path.clone(),
        }
    }

    pub fn from_feature(feature: &Feature) -> Self {
        Self {
            work_item_type: WorkItemType::Feature,
            title: feature.title.clone(),
            description: feature.description.clone(),
            acceptance_criteria: None,
            story_points: None,
            estimate: None,
            iteration_path: feature.iteration_path.clone(),
        }
    }

    pub fn from_story(story: &Story) -> Self {
        Self {
            work_item_type: WorkItemType::UserStory,
            title: story.title.clone(),
            description: story.description.clone(),
            acceptance_criteria: story.acceptance_criteria.clone(),
            story_points: story.story_points,
            estimate: None,
            iteration_path: story.iteration_path.clone(),
        }
    }

    pub fn from_task(task: &Task) -> Self {
        Self {
            work_item_type: WorkItemType::Task,
            title: task.title.clone(),
            description: task.description.clone(),
            acceptance_criteria: None,
            story_points: None,
            estimate: task.estimate,
            iteration_path: task.iteration_path.clone(),
        }
    }

    /// Drops fields not valid for this draft's work item type.
    pub fn sanitized(mut self) -> Self {
        match self.work_item_type {
            WorkItemType::Epic | WorkItemType::Feature => {
                self.acceptance_criteria = None;
                self.story_points = None;
                self.estimate = None;
            }
            WorkItemType::UserStory => {
                self.estimate = None;
            }
            WorkItemType::Task => {
                self.acceptance_criteria = None;
                self.story_points = None;
            }
        }
        self
    }
}

/// Partial update for an existing work item. All fields optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkItemUpdate {
    pub title: Option<String>,
    pub description: Option<String>,
    pub state: Option<String>,
    pub iteration_path: Option<String>,
}

impl WorkItemUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.state.is_none()
            && self.iteration_path.is_none()
    }
}

/// A sprint/iteration node in the remote store.
///
/// `identifier` is the stable GUID used for team subscription; `path` is the
/// classification path (`Project\Iteration\Sprint 1`). Dates are wire
/// strings as the remote reports them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Iteration {
    pub id: u64,
    pub identifier: String,
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_date: Option<String>,
}

/// Partial update for an iteration. All fields optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationUpdate {
    pub name: Option<String>,
    pub start_date: Option<String>,
    pub finish_date: Option<String>,
}

/// Result of subscribing an iteration to the team backlog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionOutcome {
    Subscribed,
    AlreadySubscribed,
}

impl SubscriptionOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Subscribed => "subscribed",
            Self::AlreadySubscribed => "already_subscribed",
        }
    }
}
