use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::diagnostics::OutputChannel;
use crate::host::{Registration, TaskHost};
use crate::providers::custom::CustomBuildProvider;
use crate::providers::taskfile::TaskfileProvider;
use crate::providers::TaskProvider;
use crate::util::exec::ToolRunner;

/// Providers registered for one project root.
pub struct Activation {
    registrations: Vec<Registration>,
}

impl Activation {
    pub fn task_types(&self) -> Vec<&str> {
        self.registrations.iter().map(|r| r.task_type()).collect()
    }

    pub fn deactivate(self) {
        for registration in self.registrations {
            registration.dispose();
        }
    }
}

/// Register the task providers for `root` with `host`.
///
/// Without a root there is nothing to detect and no activation. The task
/// runner provider is only registered when the manifest exists, and it drops
/// its cache whenever the manifest changes.
pub fn activate(
    host: &dyn TaskHost,
    config: &AppConfig,
    root: Option<&Path>,
    runner: Arc<dyn ToolRunner>,
    log: Arc<OutputChannel>,
) -> Option<Activation> {
    let root = root?;
    let mut registrations = Vec::new();

    let manifest = root.join(&config.detection.manifest);
    if manifest.is_file() {
        let mut provider = TaskfileProvider::new(
            root.to_path_buf(),
            config.detection.clone(),
            runner,
            log,
        );
        if let Err(e) = provider.watch_manifest() {
            warn!("cannot watch {}: {e}", manifest.display());
        }
        registrations.push(register(host, Arc::new(provider)));
    } else {
        debug!(
            "no {} in {}, task detection skipped",
            config.detection.manifest,
            root.display()
        );
    }

    if config.custom.enabled {
        let provider = CustomBuildProvider::new(config.custom.command.clone());
        registrations.push(register(host, Arc::new(provider)));
    }

    Some(Activation { registrations })
}

fn register(host: &dyn TaskHost, provider: Arc<dyn TaskProvider>) -> Registration {
    host.register_provider(provider.task_type(), provider.clone())
}
