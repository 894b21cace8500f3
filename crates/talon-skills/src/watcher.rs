//! File watcher for skill hot-reload.
//!
//! Watches the skill directories and emits one reload request per burst of
//! changes to `*.md` files.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Keeps the underlying `notify` watcher alive. Dropping it stops watching
/// and closes the reload channel.
pub struct SkillWatcher {
    _watcher: RecommendedWatcher,
    watched: Vec<PathBuf>,
}

impl SkillWatcher {
    /// Start watching `dirs`. Directories that do not exist are skipped.
    ///
    /// The returned receiver yields `()` once changes have been quiet for
    /// `debounce`.
    pub fn start(
        dirs: &[PathBuf],
        debounce: Duration,
    ) -> talon_core::Result<(Self, mpsc::Receiver<()>)> {
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<Event>();
        let (reload_tx, reload_rx) = mpsc::channel::<()>(1);

        let mut watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            match res {
                Ok(event) if is_relevant(&event) => {
                    let _ = raw_tx.send(event);
                }
                Ok(_) => {}
                Err(e) => warn!(error = %e, "skill watcher error"),
            }
        })
        .map_err(|e| talon_core::TalonError::Other(anyhow::anyhow!("failed to create watcher: {e}")))?;

        let mut watched = Vec::new();
        for dir in dirs {
            if !dir.exists() {
                debug!(dir = %dir.display(), "watch path does not exist, skipping");
                continue;
            }
            watcher.watch(dir, RecursiveMode::Recursive).map_err(|e| {
                talon_core::TalonError::Other(anyhow::anyhow!(
                    "failed to watch {}: {e}",
                    dir.display()
                ))
            })?;
            info!(dir = %dir.display(), "watching for skill changes");
            watched.push(dir.clone());
        }

        tokio::spawn(async move {
            while let Some(first) = raw_rx.recv().await {
                debug!(paths = ?first.paths, "skill file change detected");
                // Drain until the directory has been quiet for `debounce`.
                loop {
                    match tokio::time::timeout(debounce, raw_rx.recv()).await {
                        Ok(Some(_)) => continue,
                        Ok(None) => return,
                        Err(_) => break,
                    }
                }
                // A full channel already holds a pending reload.
                if let Err(mpsc::error::TrySendError::Closed(_)) = reload_tx.try_send(()) {
                    return;
                }
            }
        });

        Ok((
            Self {
                _watcher: watcher,
                watched,
            },
            reload_rx,
        ))
    }

    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }
}

fn is_relevant(event: &Event) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|p| p.extension().is_some_and(|e| e == "md"))
}
