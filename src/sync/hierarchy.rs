//! Reverse hierarchy building: from flat remote records back to a tree,
//! summary statistics, and an editable backlog document.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{Backlog, Epic, Feature, Story, Task, WorkItem, WorkItemType};
use crate::remote::{fields, RemoteError, RemoteStore};

/// A work item with its children resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    #[serde(flatten)]
    pub item: WorkItem,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeNode>,
}

/// The reconstructed forest. Epics without parents are roots; records whose
/// parent is missing from the fetched set end up under `orphans` instead of
/// being dropped, so totals always cover every record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HierarchyTree {
    pub roots: Vec<TreeNode>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub orphans: Vec<TreeNode>,
}

impl HierarchyTree {
    pub fn is_empty(&self) -> bool {
        self.roots.is_empty() && self.orphans.is_empty()
    }
}

/// Aggregate statistics over a hierarchy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_items: usize,
    pub counts: BTreeMap<String, usize>,
    pub states: BTreeMap<String, BTreeMap<String, usize>>,
    pub total_story_points: f64,
    pub total_estimate_hours: f64,
}

/// Fetches every Epic, Feature, User Story, and Task from the store,
/// optionally restricted to one epic's subtree by exact title.
pub async fn fetch_hierarchy(
    store: &dyn RemoteStore,
    epic_title: Option<&str>,
) -> Result<Vec<WorkItem>, RemoteError> {
    let type_filter = WorkItemType::ALL
        .iter()
        .map(|t| format!("[{}] = '{}'", fields::WORK_ITEM_TYPE, t.as_str()))
        .collect::<Vec<_>>()
        .join(" OR ");
    let wiql = format!(
        "SELECT [{}] FROM WorkItems WHERE ({})",
        fields::ID,
        type_filter
    );
    let records = store.query(&wiql).await?;
    Ok(match epic_title {
        Some(title) => prune_to_epic(records, title),
        None => records,
    })
}

/// Keeps only the subtree(s) of epics with the given exact title. Returns
/// an empty set when no epic matches.
pub fn prune_to_epic(records: Vec<WorkItem>, epic_title: &str) -> Vec<WorkItem> {
    let root_ids: Vec<u64> = records
        .iter()
        .filter(|r| r.work_item_type == WorkItemType::Epic && r.title == epic_title)
        .map(|r| r.id)
        .collect();
    if root_ids.is_empty() {
        return Vec::new();
    }

    let ids: HashSet<u64> = records.iter().map(|r| r.id).collect();
    let mut children_map: HashMap<u64, Vec<u64>> = HashMap::new();
    for record in &records {
        if let Some(parent) = record.parent_id.filter(|p| ids.contains(p)) {
            children_map.entry(parent).or_default().push(record.id);
        }
    }

    let mut keep = HashSet::new();
    let mut queue = root_ids;
    while let Some(current) = queue.pop() {
        if !keep.insert(current) {
            continue;
        }
        if let Some(kids) = children_map.get(&current) {
            queue.extend(kids.iter().copied());
        }
    }

    records.into_iter().filter(|r| keep.contains(&r.id)).collect()
}

/// Builds a nested tree from flat records using only `parent_id` edges.
/// Siblings are ordered by type rank, then title.
pub fn build_tree(records: Vec<WorkItem>) -> HierarchyTree {
    let ids: HashSet<u64> = records.iter().map(|r| r.id).collect();
    let mut children_of: HashMap<u64, Vec<WorkItem>> = HashMap::new();
    let mut roots = Vec::new();
    let mut orphans = Vec::new();

    for record in records {
        match record.parent_id {
            Some(parent) if ids.contains(&parent) => {
                children_of.entry(parent).or_default().push(record)
            }
            None if record.work_item_type == WorkItemType::Epic => roots.push(record),
            _ => orphans.push(record),
        }
    }

    sort_records(&mut roots);
    sort_records(&mut orphans);
    HierarchyTree {
        roots: roots
            .into_iter()
            .map(|r| attach(r, &mut children_of))
            .collect(),
        orphans: orphans
            .into_iter()
            .map(|r| attach(r, &mut children_of))
            .collect(),
    }
}

fn attach(item: WorkItem, children_of: &mut HashMap<u64, Vec<WorkItem>>) -> TreeNode {
    let mut children = children_of.remove(&item.id).unwrap_or_default();
    sort_records(&mut children);
    let children = children
        .into_iter()
        .map(|c| attach(c, children_of))
        .collect();
    TreeNode { item, children }
}

fn sort_records(records: &mut [WorkItem]) {
    records.sort_by(|a, b| {
        (a.work_item_type.rank(), a.title.as_str())
            .cmp(&(b.work_item_type.rank(), b.title.as_str()))
    });
}

/// Counts per type, counts per state within each type, and point/estimate
/// totals across the whole tree, orphans included.
pub fn compute_summary(tree: &HierarchyTree) -> Summary {
    let mut summary = Summary {
        total_items: 0,
        counts: BTreeMap::new(),
        states: BTreeMap::new(),
        total_story_points: 0.0,
        total_estimate_hours: 0.0,
    };
    for node in tree.roots.iter().chain(tree.orphans.iter()) {
        add_node(node, &mut summary);
    }
    summary
}

fn add_node(node: &TreeNode, summary: &mut Summary) {
    let item = &node.item;
    let type_name = item.work_item_type.as_str().to_string();
    summary.total_items += 1;
    *summary.counts.entry(type_name.clone()).or_default() += 1;
    *summary
        .states
        .entry(type_name)
        .or_default()
        .entry(item.state.clone())
        .or_default() += 1;
    if let Some(points) = item.story_points {
        summary.total_story_points += points;
    }
    if let Some(estimate) = item.estimate {
        summary.total_estimate_hours += estimate;
    }
    for child in &node.children {
        add_node(child, summary);
    }
}

/// Converts a reconstructed tree back into a backlog document.
///
/// Remote ids and workflow states do not survive the conversion; the result
/// is an editable template-shaped document, with rich-text fields reduced
/// to plain text. Children of an unexpected type for their level (a task
/// directly under a feature) are left out.
pub fn to_backlog(tree: &HierarchyTree) -> Backlog {
    Backlog {
        epics: tree
            .roots
            .iter()
            .filter(|n| n.item.work_item_type == WorkItemType::Epic)
            .map(epic_from_node)
            .collect(),
    }
}

fn epic_from_node(node: &TreeNode) -> Epic {
    Epic {
        title: node.item.title.clone(),
        description: cleaned(node.item.description.as_deref()),
        iteration_path: non_empty(node.item.iteration_path.as_deref()),
        features: typed_children(node, WorkItemType::Feature)
            .map(feature_from_node)
            .collect(),
    }
}

fn feature_from_node(node: &TreeNode) -> Feature {
    Feature {
        title: node.item.title.clone(),
        description: cleaned(node.item.description.as_deref()),
        iteration_path: non_empty(node.item.iteration_path.as_deref()),
        stories: typed_children(node, WorkItemType::UserStory)
            .map(story_from_node)
            .collect(),
    }
}

fn story_from_node(node: &TreeNode) -> Story {
    Story {
        title: node.item.title.clone(),
        description: cleaned(node.item.description.as_deref()),
        acceptance_criteria: cleaned(node.item.acceptance_criteria.as_deref()),
        story_points: node.item.story_points,
        iteration_path: non_empty(node.item.iteration_path.as_deref()),
        tasks: typed_children(node, WorkItemType::Task)
            .map(task_from_node)
            .collect(),
    }
}

fn task_from_node(node: &TreeNode) -> Task {
    Task {
        title: node.item.title.clone(),
        description: cleaned(node.item.description.as_deref()),
        estimate: node.item.estimate,
        iteration_path: non_empty(node.item.iteration_path.as_deref()),
    }
}

fn typed_children(
    node: &TreeNode,
    child_type: WorkItemType,
) -> impl Iterator<Item = &TreeNode> {
    node.children
        .iter()
        .filter(move |c| c.item.work_item_type == child_type)
}

fn cleaned(text: Option<&str>) -> Option<String> {
    text.map(clean_rich_text).filter(|t| !t.is_empty())
}

fn non_empty(text: Option<&str>) -> Option<String> {
    text.map(str::to_string).filter(|t| !t.is_empty())
}

/// Reduces remote rich text to plain text.
///
/// Block boundaries (`<div>`, `<br>`, `</p>`, `</li>`) become newlines,
/// every other tag is dropped, and the common entities are decoded.
pub fn clean_rich_text(text: &str) -> String {
    let stripped = strip_tags(text);
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&amp;", "&");
    let lines: Vec<&str> = decoded.lines().map(str::trim_end).collect();
    lines.join("\n").trim().to_string()
}

fn strip_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '<' {
            out.push(c);
            continue;
        }
        let mut tag = String::new();
        for t in chars.by_ref() {
            if t == '>' {
                break;
            }
            tag.push(t);
        }
        if breaks_line(&tag) && !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
    }
    out
}

fn breaks_line(tag: &str) -> bool {
    let name = tag
        .trim()
        .trim_end_matches('/')
        .split_whitespace()
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    matches!(name.as_str(), "div" | "br" | "/p" | "/li")
}
