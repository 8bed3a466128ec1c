// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

/// Errors surfaced by the gate to its callers.
///
/// `Clone` because a single refresh outcome is handed to every queued waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    /// Transport could not complete the call. Never retried by the gate.
    #[error("network error: {0}")]
    Network(String),
    /// 401 after the one permitted refresh-and-retry cycle.
    #[error("unauthorized (status {status})")]
    Unauthorized { status: u16 },
    /// The refresh endpoint rejected the refresh token or errored.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),
    /// No refresh token was available, or the session ended mid-refresh.
    #[error("session expired")]
    SessionExpired,
    #[error("storage error: {0}")]
    Storage(String),
    #[error("decode error: {0}")]
    Decode(String),
}

impl GateError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "NETWORK",
            Self::Unauthorized { .. } => "UNAUTHORIZED",
            Self::RefreshFailed(_) => "REFRESH_FAILED",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::Storage(_) => "STORAGE",
            Self::Decode(_) => "DECODE",
        }
    }

    /// Whether the caller should treat this as an authentication failure.
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::RefreshFailed(_) | Self::SessionExpired)
    }

    /// Whether this error ends the session (the store has been cleared).
    pub fn ends_session(&self) -> bool {
        matches!(self, Self::RefreshFailed(_) | Self::SessionExpired)
    }
}

impl From<serde_json::Error> for GateError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
