//! Config file watching.
//!
//! The watcher listens on the directory holding the config file rather
//! than the file itself, so saves that replace the file (write to a temp
//! file, then rename) are still seen.

use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::debug;

/// Watches one config file and reports when it changes.
pub struct ConfigWatcher {
    /// Kept alive for as long as events are wanted.
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<()>,
}

impl ConfigWatcher {
    /// Start watching `path`.
    ///
    /// The file itself need not exist yet; its directory must.
    pub fn new(path: &Path) -> Result<Self, notify::Error> {
        let dir = watch_dir(path);
        let name = path.file_name().map(OsString::from).unwrap_or_default();
        let (tx, rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) if touches(&event, &name) => {
                    // The receiver is gone once the demo shuts down.
                    let _closed = tx.send(());
                }
                Ok(_) => {}
                Err(err) => debug!(error = %err, "Config watch error"),
            }
        })?;
        watcher.watch(&dir, RecursiveMode::NonRecursive)?;
        debug!(dir = %dir.display(), "Watching config directory");

        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Wait for the next change, folding any burst already queued into
    /// one. Returns `None` if the watcher has stopped.
    ///
    /// Cancel-safe: a change is only consumed when this returns.
    pub async fn changed(&mut self) -> Option<()> {
        self.rx.recv().await?;
        while self.rx.try_recv().is_ok() {}
        Some(())
    }
}

/// Directory to watch for `path`; a bare file name means the working
/// directory.
fn watch_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Whether `event` creates or modifies the file called `name`.
fn touches(event: &Event, name: &OsStr) -> bool {
    matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_))
        && event
            .paths
            .iter()
            .any(|p| p.file_name() == Some(name))
}
