use std::sync::Arc;

use super::{ready_tasks, PendingTasks, TaskCache, TaskProvider};
use crate::model::work_item::{ShellExecution, TaskDefinition, TaskGroup, WorkItem};

pub const CUSTOM_BUILD_TYPE: &str = "custombuildscript";
const TASK_NAME: &str = "build";

/// Offers one fixed build task running a configured shell command.
pub struct CustomBuildProvider {
    command: String,
    cache: TaskCache,
}

impl CustomBuildProvider {
    pub fn new(command: String) -> Self {
        Self {
            command,
            cache: TaskCache::default(),
        }
    }

    fn build_item(&self, definition: Arc<TaskDefinition>) -> WorkItem {
        let name = definition.task.clone();
        WorkItem::new(
            definition,
            name,
            CUSTOM_BUILD_TYPE,
            ShellExecution::new(self.command.clone()),
        )
        .with_group(Some(TaskGroup::Build))
    }
}

impl TaskProvider for CustomBuildProvider {
    fn task_type(&self) -> &str {
        CUSTOM_BUILD_TYPE
    }

    fn provide_tasks(&self) -> PendingTasks {
        self.cache.get_or_start(|| {
            let definition = Arc::new(TaskDefinition::new(CUSTOM_BUILD_TYPE, TASK_NAME, None));
            ready_tasks(vec![self.build_item(definition)])
        })
    }

    fn resolve_task(&self, definition: Arc<TaskDefinition>) -> Option<WorkItem> {
        if definition.task_type != CUSTOM_BUILD_TYPE || definition.task.trim().is_empty() {
            return None;
        }
        Some(self.build_item(definition))
    }

    fn invalidate(&self) {
        self.cache.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::Shared;

    #[tokio::test]
    async fn provides_single_build_task() {
        let provider = CustomBuildProvider::new("./build.sh --fast".into());
        let tasks = provider.provide_tasks().await;
        assert_eq!(tasks.len(), 1);
        let item = &tasks[0];
        assert_eq!(item.name, "build");
        assert_eq!(item.source, CUSTOM_BUILD_TYPE);
        assert_eq!(item.group, Some(TaskGroup::Build));
        assert_eq!(item.execution.command_line, "./build.sh --fast");
        assert_eq!(item.definition.task_type, CUSTOM_BUILD_TYPE);
    }

    #[tokio::test]
    async fn repeated_calls_share_result() {
        let provider = CustomBuildProvider::new("make".into());
        let a = provider.provide_tasks();
        let b = provider.provide_tasks();
        assert!(Shared::ptr_eq(&a, &b));
        assert!(Arc::ptr_eq(&a.await, &b.await));
    }

    #[test]
    fn resolve_preserves_definition_identity() {
        let provider = CustomBuildProvider::new("./build.sh".into());
        let definition = Arc::new(TaskDefinition::new(CUSTOM_BUILD_TYPE, "build", None));
        let item = provider.resolve_task(definition.clone()).unwrap();
        assert!(Arc::ptr_eq(&item.definition, &definition));
        assert_eq!(item.execution.command_line, "./build.sh");
    }

    #[test]
    fn resolve_rejects_foreign_type() {
        let provider = CustomBuildProvider::new("./build.sh".into());
        let definition = Arc::new(TaskDefinition::new("task", "build", None));
        assert!(provider.resolve_task(definition).is_none());
    }
}
