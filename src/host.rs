use futures::future::join_all;
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

use crate::model::work_item::{TaskDefinition, WorkItem};
use crate::providers::TaskProvider;
use crate::util::sync::lock_or_recover;

/// What a task-execution host offers to task providers.
pub trait TaskHost: Send + Sync {
    fn register_provider(&self, task_type: &str, provider: Arc<dyn TaskProvider>) -> Registration;
}

/// Handle for a registered provider. Dropping it leaves the provider
/// registered; call `dispose` to take it back out.
pub struct Registration {
    task_type: String,
    on_dispose: Option<Box<dyn FnOnce() + Send>>,
}

impl Registration {
    pub fn new(task_type: &str, on_dispose: impl FnOnce() + Send + 'static) -> Self {
        Self {
            task_type: task_type.to_string(),
            on_dispose: Some(Box::new(on_dispose)),
        }
    }

    pub fn task_type(&self) -> &str {
        &self.task_type
    }

    pub fn dispose(mut self) {
        if let Some(f) = self.on_dispose.take() {
            f();
        }
    }
}

struct Entry {
    id: u64,
    task_type: String,
    provider: Arc<dyn TaskProvider>,
}

#[derive(Default)]
struct RegistryState {
    next_id: u64,
    entries: Vec<Entry>,
}

/// In-process host: keeps providers in registration order and routes
/// resolve requests by task type.
#[derive(Clone, Default)]
pub struct Registry {
    state: Arc<Mutex<RegistryState>>,
}

impl TaskHost for Registry {
    fn register_provider(&self, task_type: &str, provider: Arc<dyn TaskProvider>) -> Registration {
        let id = {
            let mut state = lock_or_recover(&self.state);
            state.next_id += 1;
            let id = state.next_id;
            state.entries.push(Entry {
                id,
                task_type: task_type.to_string(),
                provider,
            });
            id
        };
        debug!(task_type, id, "provider registered");

        let state: Weak<Mutex<RegistryState>> = Arc::downgrade(&self.state);
        Registration::new(task_type, move || {
            if let Some(state) = state.upgrade() {
                lock_or_recover(&state).entries.retain(|e| e.id != id);
                debug!(id, "provider disposed");
            }
        })
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.state).entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn provider_types(&self) -> Vec<String> {
        lock_or_recover(&self.state)
            .entries
            .iter()
            .map(|e| e.task_type.clone())
            .collect()
    }

    fn providers(&self) -> Vec<Arc<dyn TaskProvider>> {
        lock_or_recover(&self.state)
            .entries
            .iter()
            .map(|e| e.provider.clone())
            .collect()
    }

    /// Every provider's tasks, grouped by provider in registration order.
    pub async fn fetch_tasks(&self) -> Vec<WorkItem> {
        let pending: Vec<_> = self.providers().iter().map(|p| p.provide_tasks()).collect();
        join_all(pending)
            .await
            .into_iter()
            .flat_map(|tasks| tasks.iter().cloned().collect::<Vec<_>>())
            .collect()
    }

    pub fn resolve(&self, definition: Arc<TaskDefinition>) -> Option<WorkItem> {
        let provider = {
            let state = lock_or_recover(&self.state);
            state
                .entries
                .iter()
                .find(|e| e.task_type == definition.task_type)
                .map(|e| e.provider.clone())
        }?;
        provider.resolve_task(definition)
    }

    pub fn invalidate_all(&self) {
        for provider in self.providers() {
            provider.invalidate();
        }
    }
}
