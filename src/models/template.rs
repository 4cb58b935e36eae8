use serde::{Deserialize, Serialize};

fn is_false(v: &bool) -> bool {
    !*v
}

/// Root of a template document.
///
/// Templates describe a four-level hierarchy (epics → features → stories →
/// tasks) plus expansion markers. The optional top-level `template` block
/// carries free-form metadata (name, version, notes); it is accepted on load
/// and never written back out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateDoc {
    #[serde(default, skip_serializing)]
    pub template: Option<serde_yaml::Value>,
    pub epics: Vec<EpicTemplate>,
}

/// Top level of the hierarchy. Epics carry neither story points nor estimates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpicTemplate {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<FeatureTemplate>,
}

/// A feature beneath an epic.
///
/// `optional: true` marks the feature as a candidate for exclusion
/// filtering. `parameterized: true` marks the whole subtree for instance
/// expansion: the feature is cloned once per instance name, with `{{name}}`
/// placeholders substituted throughout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureTemplate {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub optional: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub parameterized: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_instances: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stories: Vec<StoryTemplate>,
}

/// A user story beneath a feature.
///
/// Stories may themselves be parameterized; a parameterized story expands
/// in place within its feature, one copy per instance name. `instance_key`
/// names the story in dotted override keys when the title itself is a
/// placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoryTemplate {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub acceptance_criteria: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub story_points: Option<f64>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub parameterized: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub default_instances: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_path: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskTemplate>,
}

/// A task beneath a story. Tasks have an `estimate` in hours but never
/// story points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskTemplate {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimate: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iteration_path: Option<String>,
}

/// The expansion marker of a parameterized node, assembled from the flat
/// template fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    /// Stable name for override lookups when the node title is a placeholder.
    pub instance_key: Option<String>,
    /// Instance names used when no override is supplied.
    pub default_instances: Vec<String>,
}

impl FeatureTemplate {
    /// Returns the parameterization marker, or `None` for plain features.
    pub fn parameter_spec(&self) -> Option<ParameterSpec> {
        self.parameterized.then(|| ParameterSpec {
            instance_key: None,
            default_instances: self.default_instances.clone(),
        })
    }
}

impl StoryTemplate {
    /// Returns the parameterization marker, or `None` for plain stories.
    pub fn parameter_spec(&self) -> Option<ParameterSpec> {
        self.parameterized.then(|| ParameterSpec {
            instance_key: self.instance_key.clone(),
            default_instances: self.default_instances.clone(),
        })
    }
}
