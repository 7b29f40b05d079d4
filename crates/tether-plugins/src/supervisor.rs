//! Process lifecycle: start, crash watching and bulk stop.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, warn};

use crate::handle::PluginHandle;

/// Starts managed backend plugins and restarts them when their process dies.
///
/// Every crash watcher's task handle is kept and joined by
/// [`shutdown`](Self::shutdown).
#[derive(Debug)]
pub struct Supervisor {
    interval: Duration,
    token: CancellationToken,
    watchers: Mutex<Vec<JoinHandle<()>>>,
}

impl Supervisor {
    /// Create a supervisor polling every `interval`.
    #[must_use]
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            token: CancellationToken::new(),
            watchers: Mutex::new(Vec::new()),
        }
    }

    /// Start `handle` and watch it for crashes.
    ///
    /// No-op unless the plugin is both backend-capable and managed. A failed
    /// start is logged and no watcher is spawned. Once [`shutdown`](Self::shutdown)
    /// has run, plugins are no longer started.
    pub async fn start(&self, handle: &Arc<PluginHandle>) {
        if !handle.is_backend() || !handle.is_managed() {
            return;
        }

        if self.token.is_cancelled() {
            warn!(plugin_id = %handle.id(), "supervisor is shut down, plugin not started");
            return;
        }

        if let Err(e) = handle.start().await {
            error!(plugin_id = %handle.id(), error = %e, "failed to start plugin");
            return;
        }

        let watched = Arc::clone(handle);
        let span = handle.logger().clone();
        let watcher = tokio::spawn(
            crash_watch(watched, self.interval, self.token.child_token()).instrument(span),
        );

        let mut watchers = self.lock_watchers();
        watchers.retain(|w| !w.is_finished());
        watchers.push(watcher);
    }

    /// Number of crash watchers still running.
    #[must_use]
    pub fn watcher_count(&self) -> usize {
        self.lock_watchers()
            .iter()
            .filter(|w| !w.is_finished())
            .count()
    }

    /// Cancel every crash watcher and wait for all of them to exit.
    pub async fn shutdown(&self) {
        self.token.cancel();
        let watchers = std::mem::take(&mut *self.lock_watchers());
        for result in join_all(watchers).await {
            if let Err(e) = result {
                warn!(error = %e, "crash watcher did not exit cleanly");
            }
        }
        debug!("crash watchers stopped");
    }

    fn lock_watchers(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.watchers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stop every handle concurrently and wait for all of them. Failures are
    /// logged per plugin and never abort the others.
    pub async fn stop_all(handles: Vec<Arc<PluginHandle>>) {
        join_all(handles.into_iter().map(|handle| async move {
            debug!(plugin_id = %handle.id(), "stopping plugin");
            match handle.stop().await {
                Ok(()) => debug!(plugin_id = %handle.id(), "plugin stopped"),
                Err(e) => error!(plugin_id = %handle.id(), error = %e, "failed to stop plugin"),
            }
        }))
        .await;
    }
}

/// Poll `handle` every `period` and restart its process whenever it has
/// exited. Returns once the handle is decommissioned or `token` is
/// cancelled. Restart failures are logged and retried on the next tick.
///
/// A handle decommissioned while a restart is in flight is stopped again
/// once that restart completes.
async fn crash_watch(handle: Arc<PluginHandle>, period: Duration, token: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.reset();

    loop {
        tokio::select! {
            biased;
            () = token.cancelled() => {
                debug!("crash watch cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        if handle.is_decommissioned() {
            debug!("plugin decommissioned");
            return;
        }

        if !handle.exited() {
            continue;
        }

        debug!("restarting plugin");
        match handle.start().await {
            Ok(()) if handle.is_decommissioned() => {
                debug!("plugin decommissioned during restart, stopping it");
                if let Err(e) = handle.stop().await {
                    error!(error = %e, "failed to stop plugin");
                }
                return;
            },
            Ok(()) => debug!("plugin restarted"),
            Err(e) => error!(error = %e, "failed to restart plugin"),
        }
    }
}
