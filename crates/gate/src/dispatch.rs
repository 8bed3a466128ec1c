// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request dispatch: bearer attachment, 401 detection, one replay after refresh.

use std::sync::Arc;

use crate::error::GateError;
use crate::refresh::RefreshCoordinator;
use crate::session::Session;
use crate::transport::{Request, Response, Transport};

const UNAUTHORIZED: u16 = 401;

/// Sends collaborator requests with the current access token attached.
#[derive(Clone)]
pub struct RequestDispatcher {
    session: Arc<Session>,
    transport: Arc<dyn Transport>,
    coordinator: RefreshCoordinator,
    /// Authorization scheme prefix, e.g. `Bearer`.
    scheme: String,
}

impl RequestDispatcher {
    pub fn new(
        session: Arc<Session>,
        transport: Arc<dyn Transport>,
        coordinator: RefreshCoordinator,
        scheme: impl Into<String>,
    ) -> Self {
        Self { session, transport, coordinator, scheme: scheme.into() }
    }

    /// Send `request`, refreshing and replaying it once on a 401.
    ///
    /// The token is attached only while a session is live; a logged-out
    /// session sends the request unauthenticated and never refreshes.
    ///
    /// Any non-401 status is returned unchanged. A 401 on the replay (or on a
    /// request that was already replayed) is [`GateError::Unauthorized`]. A
    /// failed refresh is propagated as-is and the request is not resent.
    pub async fn send(&self, mut request: Request) -> Result<Response, GateError> {
        if let Some(token) = self.session.access_token() {
            self.attach(&mut request, &token);
        }

        let resp = self.transport.execute(&request).await?;
        if resp.status != UNAUTHORIZED {
            return Ok(resp);
        }
        if request.is_retry() {
            tracing::warn!(path = %request.path, "unauthorized on replayed request");
            return Err(GateError::Unauthorized { status: resp.status });
        }

        request.mark_retry();
        tracing::debug!(method = %request.method, path = %request.path, "401, refreshing access token");
        let token = self.coordinator.refresh().await?;
        self.attach(&mut request, &token);

        let resp = self.transport.execute(&request).await?;
        if resp.status == UNAUTHORIZED {
            tracing::warn!(path = %request.path, "still unauthorized after refresh");
            return Err(GateError::Unauthorized { status: resp.status });
        }
        Ok(resp)
    }

    fn attach(&self, request: &mut Request, token: &str) {
        request.set_header("Authorization", format!("{} {token}", self.scheme));
    }
}

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;
