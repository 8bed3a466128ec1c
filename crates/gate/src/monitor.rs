// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background session upkeep: proactive refresh and inactivity logout.
//!
//! Both loops run on tokio timers, so tests drive them with a paused clock.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::refresh::RefreshCoordinator;
use crate::session::{EndReason, Session, SessionEvent, SessionState};

/// Timer settings for [`SessionMonitor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MonitorConfig {
    pub refresh_interval: Duration,
    pub inactivity_timeout: Duration,
    pub inactivity_poll: Duration,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            refresh_interval: Duration::from_secs(14 * 60),
            inactivity_timeout: Duration::from_secs(15 * 60),
            inactivity_poll: Duration::from_secs(60),
        }
    }
}

/// Source of user-activity signals (input events, keystrokes, clicks).
///
/// Cheap to clone; every clone feeds the same subscribers.
#[derive(Debug, Clone)]
pub struct ActivityFeed {
    tx: broadcast::Sender<()>,
}

impl ActivityFeed {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(16);
        Self { tx }
    }

    /// Record one user interaction.
    pub fn notify(&self) {
        let _ = self.tx.send(());
    }

    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.tx.subscribe()
    }

    /// Number of live subscribers.
    pub fn subscribers(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for ActivityFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Timestamp of the most recent user activity.
#[derive(Debug)]
pub struct SessionClock {
    last_activity: Mutex<Instant>,
}

impl SessionClock {
    pub fn new() -> Self {
        Self { last_activity: Mutex::new(Instant::now()) }
    }

    pub fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    pub fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    pub fn idle_for(&self) -> Duration {
        Instant::now().saturating_duration_since(self.last_activity())
    }
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the running monitor loops. Dropping it stops them.
pub struct SessionMonitor {
    cancel: CancellationToken,
    clock: Arc<SessionClock>,
    tasks: Vec<JoinHandle<()>>,
}

impl SessionMonitor {
    /// Subscribe to `activity` and spawn both loops.
    pub fn start(
        session: Arc<Session>,
        coordinator: RefreshCoordinator,
        activity: &ActivityFeed,
        config: MonitorConfig,
    ) -> Self {
        let cancel = CancellationToken::new();
        let clock = Arc::new(SessionClock::new());

        // Subscribe here, not inside the task, so no activity after `start`
        // returns can be missed.
        let activity_rx = activity.subscribe();
        let events_rx = session.events();

        let tasks = vec![
            spawn_refresh_loop(
                Arc::clone(&session),
                coordinator,
                config.refresh_interval,
                cancel.clone(),
            ),
            spawn_inactivity_watchdog(
                session,
                Arc::clone(&clock),
                activity_rx,
                events_rx,
                config,
                cancel.clone(),
            ),
        ];
        tracing::debug!(
            refresh_secs = config.refresh_interval.as_secs(),
            idle_secs = config.inactivity_timeout.as_secs(),
            "session monitor started"
        );
        Self { cancel, clock, tasks }
    }

    pub fn clock(&self) -> &SessionClock {
        &self.clock
    }

    pub fn is_running(&self) -> bool {
        !self.cancel.is_cancelled()
    }

    /// Signal both loops to stop without waiting for them.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Stop both loops and wait until they have exited (and released their
    /// activity subscription).
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        for task in std::mem::take(&mut self.tasks) {
            let _ = task.await;
        }
    }
}

impl Drop for SessionMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Refresh the access token every `period` while a refresh token exists.
fn spawn_refresh_loop(
    session: Arc<Session>,
    coordinator: RefreshCoordinator,
    period: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = timer.tick() => {}
            }

            if session.state() == SessionState::LoggedOut {
                tracing::debug!("logged out, skipping proactive refresh");
                continue;
            }
            if session.store().refresh_token().is_none() {
                tracing::debug!("no refresh token, skipping proactive refresh");
                continue;
            }

            // The coordinator ends the session on failure, and only for the
            // generation the refresh started under.
            let result = tokio::select! {
                _ = cancel.cancelled() => break,
                r = coordinator.refresh() => r,
            };
            match result {
                Ok(_) => tracing::debug!("proactive refresh complete"),
                Err(e) => tracing::warn!(err = %e, "proactive refresh failed"),
            }
        }
    })
}

/// Log out once the time since the last activity exceeds `inactivity_timeout`.
fn spawn_inactivity_watchdog(
    session: Arc<Session>,
    clock: Arc<SessionClock>,
    mut activity_rx: broadcast::Receiver<()>,
    mut events_rx: broadcast::Receiver<SessionEvent>,
    config: MonitorConfig,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let period = config.inactivity_poll;
        let mut timer = tokio::time::interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut activity_open = true;
        let mut events_open = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                r = activity_rx.recv(), if activity_open => match r {
                    Ok(()) | Err(broadcast::error::RecvError::Lagged(_)) => clock.touch(),
                    Err(broadcast::error::RecvError::Closed) => activity_open = false,
                },
                // A fresh login counts as activity.
                r = events_rx.recv(), if events_open => match r {
                    Ok(SessionEvent::LoggedIn) => clock.touch(),
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => events_open = false,
                },
                _ = timer.tick() => {
                    if session.state() == SessionState::LoggedOut {
                        continue;
                    }
                    let idle = clock.idle_for();
                    tracing::debug!(idle_secs = idle.as_secs(), "inactivity check");
                    if idle > config.inactivity_timeout {
                        tracing::warn!(idle_secs = idle.as_secs(), "inactive too long, logging out");
                        session.end(EndReason::Inactivity);
                    }
                }
            }
        }
        // Dropping the receiver here unsubscribes from the activity feed.
        drop(activity_rx);
    })
}

#[cfg(test)]
#[path = "monitor_tests.rs"]
mod tests;
