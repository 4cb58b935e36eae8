//! ASCII tree rendering for backlog previews and remote hierarchies.

use crate::models::{Backlog, Feature, Story, Task, WorkItem};
use crate::sync::hierarchy::{HierarchyTree, TreeNode};

/// A label with children, the common shape both tree flavors render as.
struct Entry {
    label: String,
    children: Vec<Entry>,
}

/// Render a reconstructed remote hierarchy as ASCII art.
///
/// Example output:
/// ```text
/// Epic: Acme Data Platform  (New)
/// ├── Feature: Data Source Integration - SAP  (New)
/// │   └── User Story: Connect to SAP  (New, SP:5)
/// └── Feature: Semantic Model  (Active)
/// ```
///
/// Orphaned records are grouped under a synthetic `(unparented)` root so
/// they stay visible.
pub fn render_hierarchy(tree: &HierarchyTree) -> String {
    let mut entries: Vec<Entry> = tree.roots.iter().map(entry_from_node).collect();
    if !tree.orphans.is_empty() {
        entries.push(Entry {
            label: "(unparented)".to_string(),
            children: tree.orphans.iter().map(entry_from_node).collect(),
        });
    }
    render_entries(&entries)
}

/// Render an expanded backlog as ASCII art, with per-feature story counts
/// and point totals.
pub fn render_backlog(backlog: &Backlog) -> String {
    let entries: Vec<Entry> = backlog
        .epics
        .iter()
        .map(|epic| Entry {
            label: format!("Epic: {}", epic.title),
            children: epic.features.iter().map(feature_entry).collect(),
        })
        .collect();
    render_entries(&entries)
}

fn entry_from_node(node: &TreeNode) -> Entry {
    Entry {
        label: item_label(&node.item),
        children: node.children.iter().map(entry_from_node).collect(),
    }
}

fn item_label(item: &WorkItem) -> String {
    let mut label = format!("{}: {}", item.work_item_type.as_str(), item.title);
    let mut extras = Vec::new();
    if !item.state.is_empty() {
        extras.push(item.state.clone());
    }
    if let Some(points) = item.story_points.filter(|p| *p != 0.0) {
        extras.push(format!("SP:{}", trim_number(points)));
    }
    if let Some(estimate) = item.estimate.filter(|e| *e != 0.0) {
        extras.push(format!("Est:{}h", trim_number(estimate)));
    }
    if let Some(ref path) = item.iteration_path {
        if !path.is_empty() {
            extras.push(format!("Iteration:{}", path));
        }
    }
    if !extras.is_empty() {
        label.push_str(&format!("  ({})", extras.join(", ")));
    }
    label
}

fn feature_entry(feature: &Feature) -> Entry {
    let points: f64 = feature.stories.iter().filter_map(|s| s.story_points).sum();
    Entry {
        label: format!(
            "Feature: {}  [{} stories, {} SP]",
            feature.title,
            feature.stories.len(),
            trim_number(points)
        ),
        children: feature.stories.iter().map(story_entry).collect(),
    }
}

fn story_entry(story: &Story) -> Entry {
    Entry {
        label: format!(
            "Story: {}  (SP: {})",
            story.title,
            trim_number(story.story_points.unwrap_or(0.0))
        ),
        children: story.tasks.iter().map(task_entry).collect(),
    }
}

fn task_entry(task: &Task) -> Entry {
    Entry {
        label: format!(
            "Task: {}  ({}h)",
            task.title,
            trim_number(task.estimate.unwrap_or(0.0))
        ),
        children: Vec::new(),
    }
}

/// Format a number without a trailing `.0` for whole values.
fn trim_number(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

fn render_entries(entries: &[Entry]) -> String {
    let mut output = String::new();
    for (i, entry) in entries.iter().enumerate() {
        let is_last = i == entries.len() - 1;
        render_entry(&mut output, entry, "", is_last, true);
    }
    output
}

/// Recursively render an entry and its children.
fn render_entry(output: &mut String, entry: &Entry, prefix: &str, is_last: bool, is_root: bool) {
    if is_root {
        // Root entries: just the label (no branch characters)
        output.push_str(&entry.label);
        output.push('\n');
    } else {
        let branch = if is_last { "└── " } else { "├── " };
        output.push_str(prefix);
        output.push_str(branch);
        output.push_str(&entry.label);
        output.push('\n');
    }

    // Calculate prefix for children
    let child_prefix = if is_root {
        String::new()
    } else {
        let continuation = if is_last { "    " } else { "│   " };
        format!("{}{}", prefix, continuation)
    };

    for (i, child) in entry.children.iter().enumerate() {
        let child_is_last = i == entry.children.len() - 1;
        render_entry(output, child, &child_prefix, child_is_last, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::WorkItemType;

    fn make_item(id: u64, work_item_type: WorkItemType, title: &str) -> WorkItem {
        WorkItem {
            id,
            work_item_type,
            title: title.to_string(),
            state: "New".to_string(),
            description: None,
            acceptance_criteria: None,
            story_points: None,
            estimate: None,
            parent_id: None,
            iteration_path: None,
        }
    }

    fn node(item: WorkItem, children: Vec<TreeNode>) -> TreeNode {
        TreeNode { item, children }
    }

    #[test]
    fn renders_single_epic_root() {
        let tree = HierarchyTree {
            roots: vec![node(make_item(1, WorkItemType::Epic, "Platform"), vec![])],
            orphans: vec![],
        };
        assert_eq!(render_hierarchy(&tree), "Epic: Platform  (New)\n");
    }

    #[test]
    fn renders_nested_hierarchy_with_extras() {
        let mut story = make_item(3, WorkItemType::UserStory, "Load data");
        story.story_points = Some(5.0);
        let mut task = make_item(4, WorkItemType::Task, "Wire pipeline");
        task.estimate = Some(2.5);
        let tree = HierarchyTree {
            roots: vec![node(
                make_item(1, WorkItemType::Epic, "Platform"),
                vec![
                    node(
                        make_item(2, WorkItemType::Feature, "Ingest"),
                        vec![node(story, vec![node(task, vec![])])],
                    ),
                    node(make_item(5, WorkItemType::Feature, "Model"), vec![]),
                ],
            )],
            orphans: vec![],
        };
        let expected = "Epic: Platform  (New)\n\
                        ├── Feature: Ingest  (New)\n\
                        │   └── User Story: Load data  (New, SP:5)\n\
                        │       └── Task: Wire pipeline  (New, Est:2.5h)\n\
                        └── Feature: Model  (New)\n";
        assert_eq!(render_hierarchy(&tree), expected);
    }

    #[test]
    fn groups_orphans_under_synthetic_root() {
        let tree = HierarchyTree {
            roots: vec![node(make_item(1, WorkItemType::Epic, "Platform"), vec![])],
            orphans: vec![node(make_item(9, WorkItemType::Task, "Stray"), vec![])],
        };
        let expected = "Epic: Platform  (New)\n\
                        (unparented)\n\
                        └── Task: Stray  (New)\n";
        assert_eq!(render_hierarchy(&tree), expected);
    }

    #[test]
    fn renders_backlog_preview_with_totals() {
        let backlog = Backlog {
            epics: vec![crate::models::Epic {
                title: "Acme".to_string(),
                description: None,
                iteration_path: None,
                features: vec![
                    Feature {
                        title: "Ingest".to_string(),
                        description: None,
                        iteration_path: None,
                        stories: vec![Story {
                            title: "Load".to_string(),
                            description: None,
                            acceptance_criteria: None,
                            story_points: Some(5.0),
                            iteration_path: None,
                            tasks: vec![Task {
                                title: "Wire".to_string(),
                                description: None,
                                estimate: Some(4.0),
                                iteration_path: None,
                            }],
                        }],
                    },
                    Feature {
                        title: "Model".to_string(),
                        description: None,
                        iteration_path: None,
                        stories: vec![],
                    },
                ],
            }],
        };
        let expected = "Epic: Acme\n\
                        ├── Feature: Ingest  [1 stories, 5 SP]\n\
                        │   └── Story: Load  (SP: 5)\n\
                        │       └── Task: Wire  (4h)\n\
                        └── Feature: Model  [0 stories, 0 SP]\n";
        assert_eq!(render_backlog(&backlog), expected);
    }
}
