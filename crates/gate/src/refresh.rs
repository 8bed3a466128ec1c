// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Single-flight access-token refresh.
//!
//! At most one refresh episode runs per coordinator. The first caller opens
//! the episode, which is spawned onto the runtime so it completes even if
//! that caller is dropped. Everyone arriving while it runs (the opener
//! included) is queued as a waiter and released in arrival order with the
//! same outcome.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::GateError;
use crate::session::{EndReason, Session};
use crate::token::TokenResponse;
use crate::transport::{Request, Transport};

/// Where and how to call the refresh endpoint.
#[derive(Debug, Clone)]
pub struct RefreshEndpoint {
    pub path: String,
    /// JSON field carrying the refresh token in the request body.
    pub field: String,
}

impl Default for RefreshEndpoint {
    fn default() -> Self {
        Self { path: "/user/token/refresh/".to_owned(), field: "refresh".to_owned() }
    }
}

type Waiter = oneshot::Sender<Result<String, GateError>>;

/// Refresh bookkeeping. `waiters` is non-empty only while `in_progress`.
#[derive(Default)]
struct RefreshState {
    in_progress: bool,
    waiters: VecDeque<Waiter>,
}

/// Shares one refresh episode among any number of concurrent callers.
///
/// Cheap to clone; clones share the same episode state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    session: Arc<Session>,
    transport: Arc<dyn Transport>,
    endpoint: RefreshEndpoint,
    state: Mutex<RefreshState>,
    episodes: AtomicU64,
}

impl RefreshCoordinator {
    pub fn new(
        session: Arc<Session>,
        transport: Arc<dyn Transport>,
        endpoint: RefreshEndpoint,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                session,
                transport,
                endpoint,
                state: Mutex::new(RefreshState::default()),
                episodes: AtomicU64::new(0),
            }),
        }
    }

    /// Obtain a fresh access token, joining the in-flight episode if any.
    pub async fn refresh(&self) -> Result<String, GateError> {
        let (tx, rx) = oneshot::channel();
        let (opened, position) = {
            let mut state = self.inner.state.lock();
            state.waiters.push_back(tx);
            let opened = !state.in_progress;
            state.in_progress = true;
            (opened, state.waiters.len())
        };

        if opened {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move { inner.run_episode().await });
        } else {
            tracing::debug!(position, "refresh in flight, queued");
        }

        // The sender is only dropped if the runtime tears the episode down.
        rx.await.unwrap_or(Err(GateError::SessionExpired))
    }

    /// Whether an episode is currently running.
    pub fn in_progress(&self) -> bool {
        self.inner.state.lock().in_progress
    }

    /// Number of callers currently queued on the running episode.
    pub fn waiting(&self) -> usize {
        self.inner.state.lock().waiters.len()
    }

    /// Total episodes started (one refresh-endpoint call each at most).
    pub fn episodes(&self) -> u64 {
        self.inner.episodes.load(Ordering::Relaxed)
    }
}

impl Inner {
    async fn run_episode(&self) {
        let episode = self.episodes.fetch_add(1, Ordering::Relaxed) + 1;
        let outcome = self.exchange().await;
        match &outcome {
            Ok(_) => tracing::info!(episode, "access token refreshed"),
            Err(e) => tracing::warn!(episode, err = %e, "access token refresh failed"),
        }

        // Drain and reset atomically so a caller arriving now opens a new episode
        // instead of joining a settled one.
        let mut state = self.state.lock();
        let waiters = std::mem::take(&mut state.waiters);
        tracing::debug!(episode, waiters = waiters.len(), "releasing refresh waiters");
        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
        state.in_progress = false;
    }

    /// Call the refresh endpoint once and apply the result to the session.
    async fn exchange(&self) -> Result<String, GateError> {
        let (generation, refresh_token) = self.session.begin_refresh()?;
        let mut body = serde_json::Map::new();
        body.insert(self.endpoint.field.clone(), serde_json::Value::String(refresh_token));
        let request = Request::post(self.endpoint.path.as_str()).json(body.into());

        let result = match self.transport.execute(&request).await {
            Ok(resp) if resp.is_success() => resp
                .json::<TokenResponse>()
                .map_err(|e| GateError::RefreshFailed(format!("invalid refresh response: {e}"))),
            Ok(resp) => Err(GateError::RefreshFailed(format!(
                "status {}: {}",
                resp.status,
                resp.text()
            ))),
            Err(e) => Err(GateError::RefreshFailed(e.to_string())),
        };

        match result {
            Ok(token) => {
                if self.session.commit_refresh(
                    generation,
                    &token.access,
                    token.refresh.as_deref(),
                ) {
                    Ok(token.access)
                } else {
                    tracing::debug!(generation, "session changed during refresh, discarding token");
                    Err(GateError::SessionExpired)
                }
            }
            Err(e) => {
                self.session.abort_refresh(generation, EndReason::RefreshFailed);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
#[path = "refresh_tests.rs"]
mod tests;
