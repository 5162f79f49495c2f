use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::{OsStr, OsString};
use std::path::Path;
use tracing::{debug, warn};

/// Watches a single manifest file. The parent directory is watched instead of
/// the file so that creating a missing manifest is seen too.
pub struct ManifestWatcher {
    _watcher: RecommendedWatcher,
}

impl ManifestWatcher {
    /// `on_change` runs on the watcher's thread for every create, modify or
    /// remove of the manifest. Keep it short.
    pub fn start<F>(manifest: &Path, on_change: F) -> notify::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let file_name: OsString = manifest
            .file_name()
            .ok_or_else(|| notify::Error::generic("manifest path has no file name"))?
            .to_os_string();
        let dir = manifest
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."))
            .to_path_buf();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) if is_manifest_event(&event, &file_name) => {
                debug!(kind = ?event.kind, "manifest changed");
                on_change();
            }
            Ok(_) => {}
            Err(e) => warn!("manifest watch error: {e}"),
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        debug!("watching {}", manifest.display());

        Ok(Self { _watcher: watcher })
    }
}

pub fn is_manifest_event(event: &Event, file_name: &OsStr) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(file_name))
}
