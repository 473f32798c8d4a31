pub mod event;

use std::path::{Path, PathBuf};

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use thiserror::Error;
use tokio::sync::mpsc as tokio_mpsc;
use tokio::task::JoinHandle;

use crate::walker::Classifier;
use event::{ChangeEvent, Op};

/// Capacity of the classified event channel.
const EVENT_BUFFER: usize = 256;
/// Capacity of the watcher error channel. Errors past this are logged and dropped.
const ERROR_BUFFER: usize = 16;

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("unable to create file watcher: {0}")]
    Init(#[source] notify::Error),
    #[error("unable to watch {path}: {source}")]
    Register {
        path: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Handle to a running watcher. Dropping it stops watching and closes both streams.
pub struct WatcherHandle {
    /// Keep alive: dropping the watcher stops the OS watcher.
    _watcher: RecommendedWatcher,
    /// The bridge task forwarding events from std channel to tokio channels.
    _bridge_task: JoinHandle<()>,
}

/// The two streams produced by a watcher.
pub struct WatchStreams {
    pub events: tokio_mpsc::Receiver<ChangeEvent>,
    pub errors: tokio_mpsc::Receiver<notify::Error>,
}

/// Start a recursive watcher on `watch_root`.
///
/// Returns a `WatcherHandle` (must be kept alive) and the event/error receivers.
/// Paths matching the classifier's ignore rules never reach the event stream.
/// Must be called from within a tokio runtime.
pub fn start_watcher(
    watch_root: &Path,
    classifier: Classifier,
) -> Result<(WatcherHandle, WatchStreams), WatchError> {
    let (std_tx, std_rx) = std::sync::mpsc::channel::<notify::Result<notify::Event>>();

    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        let _ = std_tx.send(res);
    })
    .map_err(WatchError::Init)?;
    watcher
        .watch(watch_root, RecursiveMode::Recursive)
        .map_err(|source| WatchError::Register {
            path: watch_root.to_path_buf(),
            source,
        })?;

    let (event_tx, event_rx) = tokio_mpsc::channel::<ChangeEvent>(EVENT_BUFFER);
    let (error_tx, error_rx) = tokio_mpsc::channel::<notify::Error>(ERROR_BUFFER);

    // Bridge: spawn_blocking to receive from std channel, classify, forward to tokio
    let root = watch_root.to_path_buf();
    let bridge_task = tokio::task::spawn_blocking(move || {
        while let Ok(result) = std_rx.recv() {
            match result {
                Ok(event) => {
                    for change in classify_event(&event, &root, &classifier) {
                        if event_tx.blocking_send(change).is_err() {
                            return; // receiver dropped, shutdown
                        }
                    }
                }
                Err(err) => {
                    if let Err(dropped) = error_tx.try_send(err) {
                        tracing::warn!("watcher error not delivered: {dropped}");
                    }
                }
            }
        }
        tracing::debug!("watcher bridge exiting");
    });

    tracing::info!(root = %watch_root.display(), "watching");

    Ok((
        WatcherHandle {
            _watcher: watcher,
            _bridge_task: bridge_task,
        },
        WatchStreams {
            events: event_rx,
            errors: error_rx,
        },
    ))
}

/// Translate one `notify` event into change events, dropping ignored paths.
fn classify_event(event: &notify::Event, root: &Path, classifier: &Classifier) -> Vec<ChangeEvent> {
    let Some(op) = Op::from_kind(&event.kind) else {
        return Vec::new();
    };

    event
        .paths
        .iter()
        .filter(|path| {
            let relative = path.strip_prefix(root).unwrap_or(path.as_path());
            !classifier.is_ignored(relative)
        })
        .map(|path| ChangeEvent::new(path.clone(), op))
        .collect()
}
