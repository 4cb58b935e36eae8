use serde::{Deserialize, Serialize};

/// A fully expanded hierarchy, ready for validation and upload.
///
/// Unlike the template types, backlog nodes carry no expansion markers: a
/// `Backlog` is always concrete. It serializes to the same YAML shape as a
/// template (the marker fields are simply absent), so an exported backlog
/// can be re-loaded and re-expanded as a no-op.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Backlog {
    pub epics: Vec<Epic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Epic {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stories: Vec<Story>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Story {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_points: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_path: Option<String>,
}

/// Item counts per hierarchy level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BacklogCounts {
    pub epics: usize,
    pub features: usize,
    pub stories: usize,
    pub tasks: usize,
}

impl BacklogCounts {
    pub fn total(&self) -> usize {
        self.epics + self.features + self.stories + self.tasks
    }
}

impl Backlog {
    /// Counts items at each level of the hierarchy.
    pub fn counts(&self) -> BacklogCounts {
        let mut counts = BacklogCounts {
            epics: self.epics.len(),
            features: 0,
            stories: 0,
            tasks: 0,
        };
        for epic in &self.epics {
            counts.features += epic.features.len();
            for feature in &epic.features {
                counts.stories += feature.stories.len();
                for story in &feature.stories {
                    counts.tasks += story.tasks.len();
                }
            }
        }
        counts
    }

    /// Sum of story points across every story.
    pub fn total_story_points(&self) -> f64 {
        self.epics
            .iter()
            .flat_map(|e| &e.features)
            .flat_map(|f| &f.stories)
            .filter_map(|s| s.story_points)
            .sum()
    }

    /// Sum of task estimates in hours.
    pub fn total_estimate_hours(&self) -> f64 {
        self.epics
            .iter()
            .flat_map(|e| &e.features)
            .flat_map(|f| &f.stories)
            .flat_map(|s| &s.tasks)
            .filter_map(|t| t.estimate)
            .sum()
    }
}
