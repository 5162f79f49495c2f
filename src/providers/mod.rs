pub mod custom;
pub mod taskfile;

use futures::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex};

use crate::model::work_item::{TaskDefinition, WorkItem};
use crate::util::sync::lock_or_recover;

/// A detection pass that every caller can await. Clones share one underlying
/// computation.
pub type PendingTasks = Shared<BoxFuture<'static, Arc<Vec<WorkItem>>>>;

pub trait TaskProvider: Send + Sync {
    fn task_type(&self) -> &str;

    /// Current tasks. Repeated calls hand back the same pending computation
    /// until the provider is invalidated.
    fn provide_tasks(&self) -> PendingTasks;

    /// Turn a host-supplied definition into a runnable item without running
    /// detection. The returned item carries the same `Arc`. `None` means the
    /// definition is not one this provider can run.
    fn resolve_task(&self, definition: Arc<TaskDefinition>) -> Option<WorkItem>;

    fn invalidate(&self) {}
}

pub fn ready_tasks(items: Vec<WorkItem>) -> PendingTasks {
    futures::future::ready(Arc::new(items)).boxed().shared()
}

/// Slot for the memoized detection pass. Clones share the slot, so a file
/// watcher can clear it from another thread.
#[derive(Clone, Default)]
pub struct TaskCache {
    pending: Arc<Mutex<Option<PendingTasks>>>,
}

impl TaskCache {
    pub fn get_or_start(&self, start: impl FnOnce() -> PendingTasks) -> PendingTasks {
        lock_or_recover(&self.pending).get_or_insert_with(start).clone()
    }

    /// Drops the cached pass. Returns whether there was one.
    pub fn clear(&self) -> bool {
        lock_or_recover(&self.pending).take().is_some()
    }
}
