//! In-memory remote store for tests and offline runs.
//!
//! Behaves like the real store where the orchestrator can tell the
//! difference: sequential ids, created items start in state `"New"`,
//! parent links are checked, and searches match exact titles.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    Iteration, IterationUpdate, SubscriptionOutcome, WorkItem, WorkItemDraft, WorkItemUpdate,
};
use crate::remote::{normalize_date, RemoteError, RemoteStore};

#[derive(Debug, Default)]
struct State {
    items: HashMap<u64, WorkItem>,
    item_order: Vec<u64>,
    iterations: Vec<Iteration>,
    subscribed: Vec<String>,
    next_item_id: u64,
    next_iteration_id: u64,
    poisoned_titles: Vec<String>,
}

/// Shared-handle in-memory store. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("store lock poisoned")
    }

    /// Makes every future create of an item with this title fail, so tests
    /// can exercise partial-failure handling.
    pub fn fail_on_title(&self, title: &str) {
        self.state().poisoned_titles.push(title.to_string());
    }

    /// Number of work items currently stored.
    pub fn item_count(&self) -> usize {
        self.state().items.len()
    }
}

#[async_trait]
impl RemoteStore for InMemoryStore {
    async fn create_item(
        &self,
        draft: &WorkItemDraft,
        parent_id: Option<u64>,
    ) -> Result<WorkItem, RemoteError> {
        let mut state = self.state();
        if state.poisoned_titles.iter().any(|t| t == &draft.title) {
            return Err(RemoteError::Server(format!(
                "injected failure for '{}'",
                draft.title
            )));
        }
        if let Some(parent) = parent_id {
            if !state.items.contains_key(&parent) {
                return Err(RemoteError::NotFound(format!(
                    "parent work item {} not found",
                    parent
                )));
            }
        }
        state.next_item_id += 1;
        let item = WorkItem {
            id: state.next_item_id,
            work_item_type: draft.work_item_type,
            title: draft.title.clone(),
            state: "New".to_string(),
            description: draft.description.clone(),
            acceptance_criteria: draft.acceptance_criteria.clone(),
            story_points: draft.story_points,
            estimate: draft.estimate,
            parent_id,
            iteration_path: draft.iteration_path.clone(),
        };
        state.items.insert(item.id, item.clone());
        state.item_order.push(item.id);
        Ok(item)
    }

    async fn update_item(
        &self,
        id: u64,
        update: &WorkItemUpdate,
    ) -> Result<WorkItem, RemoteError> {
        let mut state = self.state();
        let item = state
            .items
            .get_mut(&id)
            .ok_or_else(|| RemoteError::NotFound(format!("work item {} not found", id)))?;
        if let Some(ref title) = update.title {
            item.title = title.clone();
        }
        if let Some(ref description) = update.description {
            item.description = Some(description.clone());
        }
        if let Some(ref new_state) = update.state {
            item.state = new_state.clone();
        }
        if let Some(ref path) = update.iteration_path {
            item.iteration_path = Some(path.clone());
        }
        Ok(item.clone())
    }

    async fn get_item(&self, id: u64) -> Result<Option<WorkItem>, RemoteError> {
        Ok(self.state().items.get(&id).cloned())
    }

    async fn search_items(&self, title: &str) -> Result<Vec<WorkItem>, RemoteError> {
        let state = self.state();
        Ok(state
            .item_order
            .iter()
            .filter_map(|id| state.items.get(id))
            .filter(|item| item.title == title)
            .cloned()
            .collect())
    }

    async fn query(&self, _wiql: &str) -> Result<Vec<WorkItem>, RemoteError> {
        // No query engine here; every stored item matches, in creation order.
        let state = self.state();
        Ok(state
            .item_order
            .iter()
            .filter_map(|id| state.items.get(id))
            .cloned()
            .collect())
    }

    async fn list_iterations(&self) -> Result<Vec<Iteration>, RemoteError> {
        Ok(self.state().iterations.clone())
    }

    async fn create_iteration(
        &self,
        name: &str,
        start_date: Option<&str>,
        finish_date: Option<&str>,
    ) -> Result<Iteration, RemoteError> {
        let start_date = start_date.map(normalize_date).transpose()?;
        let finish_date = finish_date.map(normalize_date).transpose()?;
        let mut state = self.state();
        state.next_iteration_id += 1;
        let iteration = Iteration {
            id: state.next_iteration_id,
            identifier: Uuid::new_v4().to_string(),
            name: name.to_string(),
            path: format!("\\Project\\Iteration\\{}", name),
            start_date,
            finish_date,
        };
        state.iterations.push(iteration.clone());
        Ok(iteration)
    }

    async fn update_iteration(
        &self,
        current_name: &str,
        update: &IterationUpdate,
    ) -> Result<Iteration, RemoteError> {
        let start_date = update.start_date.as_deref().map(normalize_date).transpose()?;
        let finish_date = update
            .finish_date
            .as_deref()
            .map(normalize_date)
            .transpose()?;
        let mut state = self.state();
        let iteration = state
            .iterations
            .iter_mut()
            .find(|i| i.name == current_name)
            .ok_or_else(|| {
                RemoteError::NotFound(format!("iteration '{}' not found", current_name))
            })?;
        if let Some(ref name) = update.name {
            iteration.name = name.clone();
            iteration.path = format!("\\Project\\Iteration\\{}", name);
        }
        if start_date.is_some() {
            iteration.start_date = start_date;
        }
        if finish_date.is_some() {
            iteration.finish_date = finish_date;
        }
        Ok(iteration.clone())
    }

    async fn subscribe_iteration(
        &self,
        identifier: &str,
    ) -> Result<SubscriptionOutcome, RemoteError> {
        let mut state = self.state();
        if !state.iterations.iter().any(|i| i.identifier == identifier) {
            return Err(RemoteError::NotFound(format!(
                "iteration identifier '{}' not found",
                identifier
            )));
        }
        if state.subscribed.iter().any(|s| s == identifier) {
            return Ok(SubscriptionOutcome::AlreadySubscribed);
        }
        state.subscribed.push(identifier.to_string());
        Ok(SubscriptionOutcome::Subscribed)
    }
}
