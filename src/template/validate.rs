//! Content validation for expanded backlogs.
//!
//! Validation never fails fast: every rule produces its own issue and the
//! whole list is returned, so one pass reports everything wrong with a
//! document. Callers decide whether errors are fatal.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::Backlog;

/// The story point scale. Positive values outside it are warnings.
pub const ALLOWED_STORY_POINTS: [f64; 6] = [1.0, 2.0, 3.0, 5.0, 8.0, 13.0];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
        }
    }
}

/// A single validation finding, attributed to the node that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub location: String,
    pub message: String,
}

impl ValidationIssue {
    fn error(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            location: location.into(),
            message: message.into(),
        }
    }

    fn warning(location: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            location: location.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}: {}",
            self.severity.as_str(),
            self.location,
            self.message
        )
    }
}

/// True if any issue in the list is an error.
pub fn has_errors(issues: &[ValidationIssue]) -> bool {
    issues.iter().any(|i| i.severity == Severity::Error)
}

/// Checks a backlog against the content rules.
///
/// Errors: blank titles or descriptions at any level, stories without
/// acceptance criteria or a positive story point value, tasks without a
/// positive estimate, duplicate sibling titles. Warnings: story points off
/// the 1/2/3/5/8/13 scale, features without stories, stories without tasks.
pub fn validate(backlog: &Backlog) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    check_duplicate_titles(
        "epic",
        backlog.epics.iter().map(|e| e.title.as_str()),
        "backlog",
        &mut issues,
    );

    for (i, epic) in backlog.epics.iter().enumerate() {
        let epic_loc = node_loc("Epic", &epic.title, i);
        check_title(&epic.title, &epic_loc, &mut issues);
        check_description(epic.description.as_deref(), &epic_loc, &mut issues);
        check_duplicate_titles(
            "feature",
            epic.features.iter().map(|f| f.title.as_str()),
            &epic_loc,
            &mut issues,
        );

        for (j, feature) in epic.features.iter().enumerate() {
            let feature_loc = node_loc("Feature", &feature.title, j);
            check_title(&feature.title, &feature_loc, &mut issues);
            check_description(feature.description.as_deref(), &feature_loc, &mut issues);
            if feature.stories.is_empty() {
                issues.push(ValidationIssue::warning(&feature_loc, "feature has no stories"));
            }
            check_duplicate_titles(
                "story",
                feature.stories.iter().map(|s| s.title.as_str()),
                &feature_loc,
                &mut issues,
            );

            for (k, story) in feature.stories.iter().enumerate() {
                let story_loc = node_loc("Story", &story.title, k);
                check_title(&story.title, &story_loc, &mut issues);
                check_description(story.description.as_deref(), &story_loc, &mut issues);
                if !has_text(story.acceptance_criteria.as_deref()) {
                    issues.push(ValidationIssue::error(
                        &story_loc,
                        "missing acceptance_criteria",
                    ));
                }
                match story.story_points {
                    None => {
                        issues.push(ValidationIssue::error(&story_loc, "missing story_points"));
                    }
                    Some(p) if p <= 0.0 => {
                        issues.push(ValidationIssue::error(
                            &story_loc,
                            "story_points must be positive",
                        ));
                    }
                    Some(p) if !ALLOWED_STORY_POINTS.contains(&p) => {
                        issues.push(ValidationIssue::warning(
                            &story_loc,
                            format!("story_points {} not in the 1/2/3/5/8/13 scale", p),
                        ));
                    }
                    Some(_) => {}
                }
                if story.tasks.is_empty() {
                    issues.push(ValidationIssue::warning(&story_loc, "story has no tasks"));
                }
                check_duplicate_titles(
                    "task",
                    story.tasks.iter().map(|t| t.title.as_str()),
                    &story_loc,
                    &mut issues,
                );

                for (m, task) in story.tasks.iter().enumerate() {
                    let task_loc = node_loc("Task", &task.title, m);
                    check_title(&task.title, &task_loc, &mut issues);
                    check_description(task.description.as_deref(), &task_loc, &mut issues);
                    match task.estimate {
                        None => {
                            issues.push(ValidationIssue::error(&task_loc, "missing estimate"));
                        }
                        Some(e) if e <= 0.0 => {
                            issues.push(ValidationIssue::error(
                                &task_loc,
                                "estimate must be positive",
                            ));
                        }
                        Some(_) => {}
                    }
                }
            }
        }
    }

    issues
}

fn node_loc(kind: &str, title: &str, index: usize) -> String {
    if title.trim().is_empty() {
        format!("{} {}", kind, index + 1)
    } else {
        format!("{} '{}'", kind, title)
    }
}

fn has_text(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

fn check_title(title: &str, location: &str, issues: &mut Vec<ValidationIssue>) {
    if title.trim().is_empty() {
        issues.push(ValidationIssue::error(location, "missing title"));
    }
}

fn check_description(description: Option<&str>, location: &str, issues: &mut Vec<ValidationIssue>) {
    if !has_text(description) {
        issues.push(ValidationIssue::error(location, "missing description"));
    }
}

fn check_duplicate_titles<'a>(
    kind: &str,
    titles: impl Iterator<Item = &'a str>,
    scope: &str,
    issues: &mut Vec<ValidationIssue>,
) {
    let mut seen = HashSet::new();
    for title in titles {
        if title.trim().is_empty() {
            continue;
        }
        if !seen.insert(title) {
            issues.push(ValidationIssue::error(
                scope,
                format!("duplicate {} title '{}'", kind, title),
            ));
        }
    }
}
