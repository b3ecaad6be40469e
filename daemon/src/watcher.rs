use anyhow::{anyhow, Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::{OsStr, OsString};
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{TriggerPolicy, WatchConfig};
use crate::event;
use crate::flash::FlashHandler;

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// An active subscription on the marker file's directory.
pub struct WatchSession {
    // Dropped before `watcher` so a backend blocked on a full channel is released.
    events: mpsc::Receiver<notify::Result<notify::Event>>,
    watcher: RecommendedWatcher,
    watch_dir: PathBuf,
    file_name: OsString,
    triggers: TriggerPolicy,
}

/// Prepares the marker directory and starts watching it.
///
/// The parent directory is created if needed and any existing marker file is
/// removed first, so the first event seen is a genuine creation.
pub fn start(config: &WatchConfig) -> Result<WatchSession> {
    let watch_dir = config.watch_dir();
    std::fs::create_dir_all(&watch_dir)
        .with_context(|| format!("Failed to create watch directory {}", watch_dir.display()))?;

    remove_stale_marker(&config.watch_file);

    let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>(EVENT_CHANNEL_CAPACITY);
    let mut watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            let _ = tx.blocking_send(res);
        },
        NotifyConfig::default(),
    )
    .context("Failed to create file watcher")?;

    // Watch the parent directory rather than the file itself: the file is
    // absent at this point and is recreated on every signal.
    watcher
        .watch(&watch_dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("Failed to watch directory {}", watch_dir.display()))?;
    debug!("Subscribed to {}", watch_dir.display());

    Ok(WatchSession {
        events: rx,
        watcher,
        watch_dir,
        file_name: config.file_name().to_os_string(),
        triggers: config.triggers,
    })
}

impl WatchSession {
    pub fn watch_dir(&self) -> &Path {
        &self.watch_dir
    }

    /// Handles marker-file events until `shutdown` resolves, then tears the
    /// watch down. Events are handled one at a time, in delivery order.
    ///
    /// Returns an error only if the notification channel closes on its own.
    pub async fn run<H, S>(mut self, handler: &H, shutdown: S) -> Result<()>
    where
        H: FlashHandler + ?Sized,
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let result = loop {
            let next = tokio::select! {
                _ = &mut shutdown => break Ok(()),
                next = self.events.recv() => next,
            };

            match next {
                Some(Ok(raw)) => dispatch(&raw, &self.file_name, &self.triggers, handler).await,
                Some(Err(e)) => warn!("Watch error: {e}"),
                None => break Err(anyhow!("File watcher stopped delivering events")),
            }
        };

        self.stop();
        result
    }

    fn stop(self) {
        let Self {
            mut watcher,
            events,
            watch_dir,
            ..
        } = self;
        // The backend thread may be parked in `blocking_send` on a full
        // channel; it has to be released before `unwatch` can be answered.
        drop(events);
        if let Err(e) = watcher.unwatch(&watch_dir) {
            debug!("Failed to unwatch {}: {e}", watch_dir.display());
        }
        debug!("Unsubscribed from {}", watch_dir.display());
    }
}

async fn dispatch<H>(raw: &notify::Event, file_name: &OsStr, triggers: &TriggerPolicy, handler: &H)
where
    H: FlashHandler + ?Sized,
{
    debug!(kind = ?raw.kind, paths = ?raw.paths, "Raw file event");
    for event in event::classify(raw, file_name) {
        info!("{event}");
        if event.kind.triggers_flash(triggers) {
            let outcome = handler.flash(&event).await;
            match outcome.exit_status() {
                Some(status) => debug!(%status, "Flash helper exited within launch window"),
                None => debug!(?outcome, "Flash attempt finished"),
            }
        }
    }
}

fn remove_stale_marker(path: &Path) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!("Removed existing {}", path.display()),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!("Could not remove existing {}: {e}", path.display()),
    }
}
