//! Placeholder expansion, exclusion filtering, and instance overrides.
//!
//! Expansion runs two passes in fixed order: parameterized stories first
//! (each expands in place within its feature), then parameterized features
//! (each clones its whole subtree per instance, substituting placeholders
//! everywhere). After both passes no placeholder may remain anywhere.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{
    Backlog, Epic, Feature, FeatureTemplate, Story, StoryTemplate, Task, TaskTemplate, TemplateDoc,
};

/// The substitution token accepted in template text.
pub const PLACEHOLDER: &str = "{{name}}";
/// Spaced spelling, treated identically.
pub const PLACEHOLDER_SPACED: &str = "{{ name }}";

/// Replaces every placeholder occurrence in `text` with `instance`.
pub fn substitute(text: &str, instance: &str) -> String {
    text.replace(PLACEHOLDER, instance)
        .replace(PLACEHOLDER_SPACED, instance)
}

fn substitute_opt(text: Option<&str>, instance: &str) -> Option<String> {
    text.map(|t| substitute(t, instance))
}

/// True if `text` still contains a substitution placeholder.
pub fn contains_placeholder(text: &str) -> bool {
    text.contains(PLACEHOLDER) || text.contains(PLACEHOLDER_SPACED)
}

/// Which features an exclusion keyword may remove.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExclusionPolicy {
    /// Keywords match any feature.
    #[default]
    AnyFeature,
    /// Keywords match only features marked `optional: true`.
    OptionalOnly,
}

/// Removes features whose titles match an exclusion keyword.
///
/// Matching is case-insensitive substring. Exclusion runs before expansion,
/// so a keyword matching a parameterized feature's template title removes
/// every instance it would have produced. Empty keywords are ignored.
pub fn exclude_features(doc: &mut TemplateDoc, keywords: &[String], policy: ExclusionPolicy) {
    let keywords: Vec<String> = keywords
        .iter()
        .filter(|k| !k.is_empty())
        .map(|k| k.to_lowercase())
        .collect();
    if keywords.is_empty() {
        return;
    }
    for epic in &mut doc.epics {
        epic.features.retain(|feature| {
            if policy == ExclusionPolicy::OptionalOnly && !feature.optional {
                return true;
            }
            let title = feature.title.to_lowercase();
            let excluded = keywords.iter().any(|k| title.contains(k.as_str()));
            if excluded {
                tracing::debug!(feature = %feature.title, "excluding feature");
            }
            !excluded
        });
    }
}

/// A malformed `KEY=name,name` override argument.
#[derive(Debug, Error)]
#[error("Invalid instance override '{spec}', expected KEY=name,name")]
pub struct OverrideParseError {
    spec: String,
}

/// Caller-supplied instance names, keyed by feature and optionally story.
///
/// Keys match case-insensitively as substrings of node titles, so the key
/// `"data source"` addresses the feature `"Data Source Integration -
/// {{name}}"`. A dotted key (`"Data Modeling.Dimension"`) targets a
/// parameterized story: the part before the dot matches the enclosing
/// feature's title, the part after matches the story's `instance_key`, or
/// its title when no key is set.
#[derive(Debug, Clone, Default)]
pub struct InstanceOverrides {
    rules: Vec<OverrideRule>,
}

#[derive(Debug, Clone)]
struct OverrideRule {
    feature: String,
    story: Option<String>,
    instances: Vec<String>,
}

impl InstanceOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers instance names for a key. An empty instance list is a
    /// valid override: the matching node expands to nothing.
    pub fn insert(&mut self, key: &str, instances: Vec<String>) {
        let (feature, story) = match key.split_once('.') {
            Some((f, s)) => (f.to_string(), Some(s.to_string())),
            None => (key.to_string(), None),
        };
        self.rules.push(OverrideRule {
            feature,
            story,
            instances,
        });
    }

    /// Parses `KEY=name,name` arguments as passed on the command line.
    pub fn from_args(args: &[String]) -> Result<Self, OverrideParseError> {
        let mut overrides = Self::new();
        for arg in args {
            let Some((key, values)) = arg.split_once('=') else {
                return Err(OverrideParseError { spec: arg.clone() });
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(OverrideParseError { spec: arg.clone() });
            }
            let instances = values
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
                .collect();
            overrides.insert(key, instances);
        }
        Ok(overrides)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Instance names for a feature-level key matching `feature_title`.
    pub fn for_feature(&self, feature_title: &str) -> Option<&[String]> {
        let title = feature_title.to_lowercase();
        self.rules
            .iter()
            .find(|r| r.story.is_none() && title.contains(&r.feature.to_lowercase()))
            .map(|r| r.instances.as_slice())
    }

    /// Instance names for a dotted key matching the enclosing feature title
    /// and the story's `instance_key` or title.
    pub fn for_story(&self, feature_title: &str, story_key: &str) -> Option<&[String]> {
        let feature = feature_title.to_lowercase();
        let story = story_key.to_lowercase();
        self.rules
            .iter()
            .find(|r| {
                r.story
                    .as_ref()
                    .is_some_and(|s| story.contains(&s.to_lowercase()))
                    && feature.contains(&r.feature.to_lowercase())
            })
            .map(|r| r.instances.as_slice())
    }
}

/// Errors raised during expansion.
#[derive(Debug, Error)]
pub enum ExpansionError {
    #[error("Unresolved {{{{name}}}} placeholder in {location}")]
    UnresolvedPlaceholder { location: String },
}

/// Expands a template into a concrete backlog.
///
/// A parameterized node with an empty instance list (whether from an
/// override or its own `default_instances`) expands to nothing; its
/// subtree vanishes from the output. A placeholder left anywhere after
/// both passes, including on nodes that were never parameterized, is an
/// [`ExpansionError::UnresolvedPlaceholder`].
pub fn expand(doc: &TemplateDoc, overrides: &InstanceOverrides) -> Result<Backlog, ExpansionError> {
    let mut epics = Vec::with_capacity(doc.epics.len());
    for epic in &doc.epics {
        let mut features = Vec::new();
        for feature in &epic.features {
            let stories = expand_stories(feature, overrides);
            match feature.parameter_spec() {
                Some(spec) => {
                    let instances = overrides
                        .for_feature(&feature.title)
                        .unwrap_or(&spec.default_instances);
                    for instance in instances {
                        features.push(instantiate_feature(feature, &stories, instance));
                    }
                }
                None => features.push(Feature {
                    title: feature.title.clone(),
                    description: feature.description.clone(),
                    iteration_path: feature.iteration_path.clone(),
                    stories,
                }),
            }
        }
        epics.push(Epic {
            title: epic.title.clone(),
            description: epic.description.clone(),
            iteration_path: epic.iteration_path.clone(),
            features,
        });
    }
    let backlog = Backlog { epics };
    check_resolved(&backlog)?;
    Ok(backlog)
}

/// Pass one: expands parameterized stories in place, preserving sibling
/// order. Non-parameterized stories pass through with placeholders intact
/// for the feature pass to resolve.
fn expand_stories(feature: &FeatureTemplate, overrides: &InstanceOverrides) -> Vec<Story> {
    let mut stories = Vec::with_capacity(feature.stories.len());
    for story in &feature.stories {
        match story.parameter_spec() {
            Some(spec) => {
                let key = spec.instance_key.as_deref().unwrap_or(&story.title);
                let instances = overrides
                    .for_story(&feature.title, key)
                    .unwrap_or(&spec.default_instances);
                for instance in instances {
                    stories.push(instantiate_story(story, instance));
                }
            }
            None => stories.push(concrete_story(story)),
        }
    }
    stories
}

fn instantiate_feature(feature: &FeatureTemplate, stories: &[Story], instance: &str) -> Feature {
    Feature {
        title: substitute(&feature.title, instance),
        description: substitute_opt(feature.description.as_deref(), instance),
        iteration_path: substitute_opt(feature.iteration_path.as_deref(), instance),
        stories: stories.iter().map(|s| substitute_story(s, instance)).collect(),
    }
}

fn instantiate_story(story: &StoryTemplate, instance: &str) -> Story {
    Story {
        title: substitute(&story.title, instance),
        description: substitute_opt(story.description.as_deref(), instance),
        acceptance_criteria: substitute_opt(story.acceptance_criteria.as_deref(), instance),
        story_points: story.story_points,
        iteration_path: substitute_opt(story.iteration_path.as_deref(), instance),
        tasks: story
            .tasks
            .iter()
            .map(|t| instantiate_task(t, instance))
            .collect(),
    }
}

fn instantiate_task(task: &TaskTemplate, instance: &str) -> Task {
    Task {
        title: substitute(&task.title, instance),
        description: substitute_opt(task.description.as_deref(), instance),
        estimate: task.estimate,
        iteration_path: substitute_opt(task.iteration_path.as_deref(), instance),
    }
}

fn concrete_story(story: &StoryTemplate) -> Story {
    Story {
        title: story.title.clone(),
        description: story.description.clone(),
        acceptance_criteria: story.acceptance_criteria.clone(),
        story_points: story.story_points,
        iteration_path: story.iteration_path.clone(),
        tasks: story
            .tasks
            .iter()
            .map(|t| Task {
                title: t.title.clone(),
                description: t.description.clone(),
                estimate: t.estimate,
                iteration_path: t.iteration_path.clone(),
            })
            .collect(),
    }
}

fn substitute_story(story: &Story, instance: &str) -> Story {
    Story {
        title: substitute(&story.title, instance),
        description: substitute_opt(story.description.as_deref(), instance),
        acceptance_criteria: substitute_opt(story.acceptance_criteria.as_deref(), instance),
        story_points: story.story_points,
        iteration_path: substitute_opt(story.iteration_path.as_deref(), instance),
        tasks: story
            .tasks
            .iter()
            .map(|t| Task {
                title: substitute(&t.title, instance),
                description: substitute_opt(t.description.as_deref(), instance),
                estimate: t.estimate,
                iteration_path: substitute_opt(t.iteration_path.as_deref(), instance),
            })
            .collect(),
    }
}

fn check_resolved(backlog: &Backlog) -> Result<(), ExpansionError> {
    for epic in &backlog.epics {
        check_text(
            "epic",
            &epic.title,
            &[epic.description.as_deref(), epic.iteration_path.as_deref()],
        )?;
        for feature in &epic.features {
            check_text(
                "feature",
                &feature.title,
                &[
                    feature.description.as_deref(),
                    feature.iteration_path.as_deref(),
                ],
            )?;
            for story in &feature.stories {
                check_text(
                    "story",
                    &story.title,
                    &[
                        story.description.as_deref(),
                        story.acceptance_criteria.as_deref(),
                        story.iteration_path.as_deref(),
                    ],
                )?;
                for task in &story.tasks {
                    check_text(
                        "task",
                        &task.title,
                        &[task.description.as_deref(), task.iteration_path.as_deref()],
                    )?;
                }
            }
        }
    }
    Ok(())
}

fn check_text(kind: &str, title: &str, fields: &[Option<&str>]) -> Result<(), ExpansionError> {
    let unresolved = contains_placeholder(title)
        || fields
            .iter()
            .flatten()
            .any(|text| contains_placeholder(text));
    if unresolved {
        return Err(ExpansionError::UnresolvedPlaceholder {
            location: format!("{} '{}'", kind, title),
        });
    }
    Ok(())
}
