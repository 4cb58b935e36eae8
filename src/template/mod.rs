//! Template loading, expansion, and validation.
//!
//! A template is a YAML document describing an epic → feature → story → task
//! hierarchy with expansion markers. This module owns the on-disk format;
//! [`expand`] turns templates into concrete backlogs and [`validate`] checks
//! backlogs for content problems before upload.

pub mod expand;
pub mod validate;

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::models::{Backlog, TemplateDoc};

/// Errors raised while reading or writing template documents.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Template document contains no epics")]
    Empty,
}

/// Parses a template document from YAML text.
///
/// Structural problems (a level missing its `title`, a scalar where a list
/// belongs) surface as [`TemplateError::Yaml`]; a well-formed document with
/// zero epics is [`TemplateError::Empty`].
pub fn parse_template(text: &str) -> Result<TemplateDoc, TemplateError> {
    let doc: TemplateDoc = serde_yaml::from_str(text)?;
    if doc.epics.is_empty() {
        return Err(TemplateError::Empty);
    }
    Ok(doc)
}

/// Reads and parses a template document from disk.
pub fn load_template(path: &Path) -> Result<TemplateDoc, TemplateError> {
    let text = std::fs::read_to_string(path)?;
    parse_template(&text)
}

/// Writes an expanded backlog to disk as YAML, creating parent directories
/// as needed. Returns the path written.
pub fn save_backlog(backlog: &Backlog, path: &Path) -> Result<PathBuf, TemplateError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let yaml = serde_yaml::to_string(backlog)?;
    std::fs::write(path, yaml)?;
    Ok(path.to_path_buf())
}

/// Turns a title into a filesystem-safe slug.
///
/// Lowercases, keeps ASCII alphanumerics, collapses runs of spaces, dashes,
/// and underscores into a single `-`, and drops everything else.
pub fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut pending_dash = false;
    for c in title.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c.to_ascii_lowercase());
        } else if c == ' ' || c == '-' || c == '_' {
            pending_dash = true;
        }
    }
    slug
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_lowercases_and_dashes() {
        assert_eq!(slugify("Acme Data Platform"), "acme-data-platform");
    }

    #[test]
    fn slugify_drops_punctuation() {
        assert_eq!(slugify("My Project!!!"), "my-project");
    }

    #[test]
    fn slugify_collapses_separator_runs() {
        assert_eq!(slugify("  spaces  and---dashes  "), "spaces-and-dashes");
    }

    #[test]
    fn parse_rejects_empty_epic_list() {
        let result = parse_template("epics: []\n");
        assert!(matches!(result, Err(TemplateError::Empty)));
    }

    #[test]
    fn parse_accepts_metadata_block() {
        let doc = parse_template(
            "template:\n  name: demo\nepics:\n  - title: Platform\n",
        )
        .unwrap();
        assert_eq!(doc.epics.len(), 1);
        assert_eq!(doc.epics[0].title, "Platform");
        assert!(doc.template.is_some());
    }
}
