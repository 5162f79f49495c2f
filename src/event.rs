use anyhow::{Context, Result};
use std::time::Duration;
use tokio::sync::mpsc;

use crate::cli::{print_tasks, Session};
use crate::watcher::ManifestWatcher;

const DEBOUNCE_MS: u64 = 300;

/// Print the task list, then print it again after every burst of manifest
/// changes until Ctrl-C.
pub async fn run_watch(session: &mut Session) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<()>();
    let manifest = session.manifest_path();
    let _watcher = ManifestWatcher::start(&manifest, move || {
        let _ = tx.send(());
    })
    .with_context(|| format!("Failed to watch {}", manifest.display()))?;

    refresh(session).await?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let debounce = Duration::from_millis(DEBOUNCE_MS);
    let mut pending = false;

    loop {
        tokio::select! {
            _ = &mut ctrl_c => break,
            Some(()) = rx.recv() => {
                pending = true;
            }
            _ = tokio::time::sleep(debounce), if pending => {
                pending = false;
                if !session.refresh_activation() {
                    session.registry.invalidate_all();
                }
                refresh(session).await?;
            }
        }
    }

    Ok(())
}

async fn refresh(session: &mut Session) -> Result<()> {
    let tasks = session.registry.fetch_tasks().await;
    println!("# {}", chrono::Local::now().format("%H:%M:%S"));
    print_tasks(&tasks, false)?;
    session.flush_log();
    Ok(())
}
