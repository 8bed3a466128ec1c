// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted in-process backend for deterministic gate tests.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use crate::error::GateError;
use crate::refresh::{RefreshCoordinator, RefreshEndpoint};
use crate::session::Session;
use crate::storage::{MemoryStorage, Storage};
use crate::token::TokenStore;
use crate::transport::{Request, Response, Transport};

pub const LOGIN_PATH: &str = "/user/token/";
pub const REFRESH_PATH: &str = "/user/token/refresh/";

/// Fake API: accepts exactly one access token, mints a new one per refresh.
///
/// - Refresh responses can be held open with [`FakeBackend::hold_refresh`]
///   so tests can pile callers onto one episode.
/// - Every non-refresh request is recorded with its `Authorization` header.
pub struct FakeBackend {
    valid_access: Mutex<String>,
    refresh_calls: AtomicU32,
    refresh_bodies: Mutex<Vec<serde_json::Value>>,
    refresh_status: Mutex<u16>,
    rotate_refresh: AtomicBool,
    refresh_gate: Mutex<Option<Arc<Semaphore>>>,
    api_log: Mutex<Vec<(String, Option<String>)>>,
    reject_all: AtomicBool,
    offline: AtomicBool,
}

impl FakeBackend {
    pub fn new(valid_access: &str) -> Arc<Self> {
        Arc::new(Self {
            valid_access: Mutex::new(valid_access.to_owned()),
            refresh_calls: AtomicU32::new(0),
            refresh_bodies: Mutex::new(Vec::new()),
            refresh_status: Mutex::new(200),
            rotate_refresh: AtomicBool::new(false),
            refresh_gate: Mutex::new(None),
            api_log: Mutex::new(Vec::new()),
            reject_all: AtomicBool::new(false),
            offline: AtomicBool::new(false),
        })
    }

    /// Make the refresh endpoint answer with `status` (non-2xx = failure).
    pub fn refresh_status(&self, status: u16) {
        *self.refresh_status.lock() = status;
    }

    /// Include a rotated refresh token in refresh responses.
    pub fn rotate_refresh(&self) {
        self.rotate_refresh.store(true, Ordering::Relaxed);
    }

    /// Answer 401 to every API call, even with a valid token.
    pub fn reject_all(&self) {
        self.reject_all.store(true, Ordering::Relaxed);
    }

    /// Fail every call with a network error.
    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::Relaxed);
    }

    /// Block refresh responses until [`FakeBackend::release_refresh`].
    pub fn hold_refresh(&self) {
        *self.refresh_gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_refresh(&self) {
        if let Some(gate) = self.refresh_gate.lock().take() {
            gate.add_permits(1024);
        }
    }

    pub fn refresh_calls(&self) -> u32 {
        self.refresh_calls.load(Ordering::Relaxed)
    }

    pub fn refresh_bodies(&self) -> Vec<serde_json::Value> {
        self.refresh_bodies.lock().clone()
    }

    /// `(path, authorization header)` for every API call, in order.
    pub fn api_log(&self) -> Vec<(String, Option<String>)> {
        self.api_log.lock().clone()
    }

    async fn refresh(&self, request: &Request) -> Response {
        let n = self.refresh_calls.fetch_add(1, Ordering::Relaxed) + 1;
        self.refresh_bodies.lock().push(request.body.clone().unwrap_or_default());

        let gate = self.refresh_gate.lock().clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        let status = *self.refresh_status.lock();
        if !(200..300).contains(&status) {
            return Response::new(status, r#"{"detail":"Token is invalid or expired"}"#);
        }
        let access = format!("fresh-{n}");
        *self.valid_access.lock() = access.clone();
        let body = if self.rotate_refresh.load(Ordering::Relaxed) {
            serde_json::json!({ "access": access, "refresh": format!("rotated-{n}") })
        } else {
            serde_json::json!({ "access": access })
        };
        Response::new(200, body.to_string())
    }

    fn login(&self, request: &Request) -> Response {
        let body = request.body.clone().unwrap_or_default();
        if body["password"] != "hunter2" {
            return Response::new(401, r#"{"detail":"No active account found"}"#);
        }
        let access = "login-access".to_owned();
        *self.valid_access.lock() = access.clone();
        let body = serde_json::json!({ "access": access, "refresh": "login-refresh" });
        Response::new(200, body.to_string())
    }
}

#[async_trait]
impl Transport for FakeBackend {
    async fn execute(&self, request: &Request) -> Result<Response, GateError> {
        if self.offline.load(Ordering::Relaxed) {
            return Err(GateError::Network("connection refused".into()));
        }
        match request.path.as_str() {
            REFRESH_PATH => Ok(self.refresh(request).await),
            LOGIN_PATH => Ok(self.login(request)),
            path => {
                let auth = request.header_value("authorization").map(str::to_owned);
                self.api_log.lock().push((path.to_owned(), auth.clone()));
                let expected = format!("Bearer {}", self.valid_access.lock());
                let rejected = self.reject_all.load(Ordering::Relaxed);
                if rejected || auth.as_deref() != Some(expected.as_str()) {
                    return Ok(Response::new(401, r#"{"detail":"Given token not valid"}"#));
                }
                Ok(Response::new(200, serde_json::json!({ "path": path }).to_string()))
            }
        }
    }
}

/// Session + coordinator wired to a [`FakeBackend`], seeded with `tokens`
/// and resumed.
pub fn wired(
    backend: &Arc<FakeBackend>,
    tokens: &[(&str, &str)],
) -> (Arc<Session>, RefreshCoordinator) {
    let (session, coordinator) = parked(backend, tokens);
    session.resume();
    (session, coordinator)
}

/// Like [`wired`], but the persisted tokens are never resumed, so the
/// session stays `LoggedOut`.
pub fn parked(
    backend: &Arc<FakeBackend>,
    tokens: &[(&str, &str)],
) -> (Arc<Session>, RefreshCoordinator) {
    let storage: Arc<dyn Storage> = Arc::new(MemoryStorage::with_entries(tokens.iter().copied()));
    let session = Arc::new(Session::new(TokenStore::load(storage)));
    let transport: Arc<dyn Transport> = Arc::clone(backend) as Arc<dyn Transport>;
    let coordinator = RefreshCoordinator::new(
        Arc::clone(&session),
        transport,
        RefreshEndpoint { path: REFRESH_PATH.to_owned(), field: "refresh".to_owned() },
    );
    (session, coordinator)
}

/// Poll `cond` until it holds, failing after two seconds.
pub async fn wait_until(mut cond: impl FnMut() -> bool) -> anyhow::Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            anyhow::bail!("condition not met within 2s");
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
    Ok(())
}
