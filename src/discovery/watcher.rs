// ABOUTME: Filesystem watcher for agent-discovery hot reload, debounced 500ms per file (last-writer-wins within the window)
// ABOUTME: A new dependency relative to the teacher (no file in the reference corpus watches disk for hot-reloadable definitions); grounded in the notify crate's own recommended std-mpsc usage pattern

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Debounce window: "batch and debounce by 500 ms per
/// file (last-writer-wins within the window)."
pub const DEBOUNCE: Duration = Duration::from_millis(500);

/// A live filesystem watcher over one or more `BaseFolder` roots. Dropping
/// this struct stops the underlying OS watch (the blocking thread exits
/// once its std channel disconnects).
pub struct AgentWatcher {
    _watcher: RecommendedWatcher,
}

impl AgentWatcher {
    /// Start watching every path in `roots` recursively. Returns the
    /// watcher handle (keep it alive for as long as watching should
    /// continue) plus a channel that yields one debounced path per
    /// distinct file that changed.
    ///
    /// # Errors
    /// Returns an error if the underlying OS watch cannot be established.
    pub fn spawn(roots: &[PathBuf]) -> notify::Result<(Self, mpsc::UnboundedReceiver<PathBuf>)> {
        let (raw_tx, raw_rx) = std::sync::mpsc::channel::<notify::Result<notify::Event>>();
        let mut watcher = notify::recommended_watcher(move |res| {
            let _ = raw_tx.send(res);
        })?;

        for root in roots {
            watcher.watch(root, RecursiveMode::Recursive)?;
        }

        let (debounced_tx, debounced_rx) = mpsc::unbounded_channel();
        std::thread::spawn(move || debounce_loop(&raw_rx, &debounced_tx));

        Ok((Self { _watcher: watcher }, debounced_rx))
    }

    /// Add one more root to an already-running watcher, e.g. a `BaseFolder`
    /// registered after startup via `POST /api/discovery/base-folders`.
    ///
    /// # Errors
    /// Returns an error if the underlying OS watch cannot be established.
    pub fn watch_additional(&mut self, root: &std::path::Path) -> notify::Result<()> {
        self._watcher.watch(root, RecursiveMode::Recursive)
    }
}

fn debounce_loop(
    raw_rx: &std::sync::mpsc::Receiver<notify::Result<notify::Event>>,
    debounced_tx: &mpsc::UnboundedSender<PathBuf>,
) {
    let mut pending: HashMap<PathBuf, Instant> = HashMap::new();

    loop {
        match raw_rx.recv_timeout(DEBOUNCE) {
            Ok(Ok(event)) => {
                let now = Instant::now();
                for path in event.paths {
                    pending.insert(path, now);
                }
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "filesystem watch error");
            }
            Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {}
            Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => return,
        }

        let now = Instant::now();
        let ready: Vec<PathBuf> = pending
            .iter()
            .filter(|(_, &last_touched)| now.duration_since(last_touched) >= DEBOUNCE)
            .map(|(path, _)| path.clone())
            .collect();
        for path in ready {
            pending.remove(&path);
            if debounced_tx.send(path).is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn a_write_to_a_watched_file_eventually_surfaces_as_one_debounced_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file_path = dir.path().join("agent.md");
        std::fs::write(&file_path, "initial").expect("seed file");

        let (_watcher, mut rx) = AgentWatcher::spawn(std::slice::from_ref(&dir.path().to_path_buf())).expect("spawn watcher");

        {
            let mut file = std::fs::OpenOptions::new().append(true).open(&file_path).expect("open");
            writeln!(file, "more content").expect("write");
        }

        let received = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("did not time out")
            .expect("channel open");
        assert_eq!(std::fs::canonicalize(&received).ok(), std::fs::canonicalize(&file_path).ok());
    }
}
