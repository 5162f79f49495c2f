use futures::FutureExt;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{PendingTasks, TaskCache, TaskProvider};
use crate::config::DetectionConfig;
use crate::diagnostics::OutputChannel;
use crate::error::DetectError;
use crate::model::work_item::{ShellExecution, TaskDefinition, TaskGroup, WorkItem};
use crate::util::exec::{ToolOutput, ToolRunner};
use crate::watcher::ManifestWatcher;

pub const TASK_TYPE: &str = "task";
pub const FAILURE_MESSAGE: &str = "Auto detecting task tasks failed.";

/// One entry of `task --json`.
#[derive(Deserialize)]
struct TaskRecord {
    #[serde(rename = "Task")]
    task: String,
    #[serde(rename = "Desc", default)]
    desc: Option<String>,
}

/// Discovers tasks by asking the task runner for its task list.
pub struct TaskfileProvider {
    root: PathBuf,
    config: DetectionConfig,
    runner: Arc<dyn ToolRunner>,
    log: Arc<OutputChannel>,
    cache: TaskCache,
    watcher: Option<ManifestWatcher>,
}

impl TaskfileProvider {
    pub fn new(
        root: PathBuf,
        config: DetectionConfig,
        runner: Arc<dyn ToolRunner>,
        log: Arc<OutputChannel>,
    ) -> Self {
        Self {
            root,
            config,
            runner,
            log,
            cache: TaskCache::default(),
            watcher: None,
        }
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.root.join(&self.config.manifest)
    }

    /// Drop cached tasks whenever the manifest is created, changed or deleted.
    pub fn watch_manifest(&mut self) -> notify::Result<()> {
        let cache = self.cache.clone();
        let watcher = ManifestWatcher::start(&self.manifest_path(), move || {
            if cache.clear() {
                debug!("manifest changed, cached tasks dropped");
            }
        })?;
        self.watcher = Some(watcher);
        Ok(())
    }
}

impl TaskProvider for TaskfileProvider {
    fn task_type(&self) -> &str {
        TASK_TYPE
    }

    fn provide_tasks(&self) -> PendingTasks {
        self.cache.get_or_start(|| {
            let runner = self.runner.clone();
            let root = self.root.clone();
            let config = self.config.clone();
            let log = self.log.clone();
            async move { Arc::new(detect_tasks(runner.as_ref(), &root, &config, &log).await) }
                .boxed()
                .shared()
        })
    }

    fn resolve_task(&self, definition: Arc<TaskDefinition>) -> Option<WorkItem> {
        if definition.task.trim().is_empty() {
            return None;
        }
        let execution = ShellExecution::for_task(&self.config.executable, &definition.task);
        let name = definition.task.clone();
        Some(WorkItem::new(definition, name, TASK_TYPE, execution))
    }

    fn invalidate(&self) {
        self.cache.clear();
    }
}

/// One detection pass. Failures are written to `log` and yield no tasks.
pub async fn detect_tasks(
    runner: &dyn ToolRunner,
    root: &Path,
    config: &DetectionConfig,
    log: &OutputChannel,
) -> Vec<WorkItem> {
    log.append_line("running command");

    let result = match runner.run(&config.executable, &["--json"], root).await {
        Ok(output) => {
            if !output.stderr.is_empty() {
                log.append_line(&output.stderr);
                log.show();
            }
            parse_tasks(&config.executable, &output)
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(items) => {
            debug!(count = items.len(), "detected tasks");
            items
        }
        Err(e) => {
            warn!("task detection failed: {e}");
            if let Some((stdout, stderr)) = e.captured() {
                if !stderr.is_empty() {
                    log.append_line(stderr);
                }
                if !stdout.is_empty() {
                    log.append_line(stdout);
                }
            }
            log.append_line(&format!("{} error: {e}", e.kind()));
            log.append_line(FAILURE_MESSAGE);
            log.show();
            Vec::new()
        }
    }
}

/// Decode `--json` output into work items, keeping the tool's order.
pub fn parse_tasks(executable: &str, output: &ToolOutput) -> Result<Vec<WorkItem>, DetectError> {
    if output.stdout.is_empty() {
        return Ok(Vec::new());
    }

    let records: Vec<TaskRecord> =
        serde_json::from_str(&output.stdout).map_err(|source| DetectError::Decode {
            source,
            stdout: output.stdout.clone(),
        })?;

    let items = records
        .into_iter()
        .map(|record| {
            let execution = ShellExecution::for_task(executable, &record.task);
            let group = TaskGroup::classify(&record.task);
            let definition =
                Arc::new(TaskDefinition::new(TASK_TYPE, record.task.clone(), record.desc));
            WorkItem::new(definition, record.task, TASK_TYPE, execution).with_group(group)
        })
        .collect();

    Ok(items)
}
