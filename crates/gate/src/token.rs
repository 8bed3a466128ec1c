// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token store: the current access/refresh pair with write-through persistence.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::storage::Storage;

/// Storage key for the access token.
pub const ACCESS_KEY: &str = "access_token";

/// Storage key for the refresh token.
pub const REFRESH_KEY: &str = "refresh_token";

/// Current credentials. Both values are opaque strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

impl TokenPair {
    pub fn new(access: impl Into<String>, refresh: Option<String>) -> Self {
        Self { access: Some(access.into()), refresh }
    }

    pub fn is_empty(&self) -> bool {
        self.access.is_none() && self.refresh.is_none()
    }
}

/// Token issue/refresh response body.
///
/// Accepts both the short (`access`/`refresh`) and OAuth-style
/// (`access_token`/`refresh_token`) field names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    #[serde(alias = "access_token")]
    pub access: String,
    #[serde(default, alias = "refresh_token", skip_serializing_if = "Option::is_none")]
    pub refresh: Option<String>,
}

impl From<TokenResponse> for TokenPair {
    fn from(resp: TokenResponse) -> Self {
        Self { access: Some(resp.access), refresh: resp.refresh }
    }
}

/// Holder of the current [`TokenPair`].
///
/// Cheap to clone; clones share the same pair. Every mutation is written
/// through to the injected [`Storage`]. Storage failures are logged and the
/// in-memory value still wins, so a broken disk never blocks requests.
#[derive(Clone)]
pub struct TokenStore {
    inner: Arc<Inner>,
}

struct Inner {
    pair: Mutex<TokenPair>,
    storage: Arc<dyn Storage>,
}

impl TokenStore {
    /// Build a store seeded from whatever `storage` already holds.
    pub fn load(storage: Arc<dyn Storage>) -> Self {
        let pair = TokenPair {
            access: read_key(&*storage, ACCESS_KEY),
            refresh: read_key(&*storage, REFRESH_KEY),
        };
        if !pair.is_empty() {
            tracing::debug!(
                has_access = pair.access.is_some(),
                has_refresh = pair.refresh.is_some(),
                "loaded persisted tokens"
            );
        }
        Self { inner: Arc::new(Inner { pair: Mutex::new(pair), storage }) }
    }

    pub fn get(&self) -> TokenPair {
        self.inner.pair.lock().clone()
    }

    pub fn access(&self) -> Option<String> {
        self.inner.pair.lock().access.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.inner.pair.lock().refresh.clone()
    }

    pub fn set_access(&self, token: impl Into<String>) {
        let token = token.into();
        let mut pair = self.inner.pair.lock();
        self.persist(ACCESS_KEY, Some(&token));
        pair.access = Some(token);
    }

    pub fn set_refresh(&self, token: impl Into<String>) {
        let token = token.into();
        let mut pair = self.inner.pair.lock();
        self.persist(REFRESH_KEY, Some(&token));
        pair.refresh = Some(token);
    }

    /// Replace both tokens. A `None` refresh token removes the stored one.
    pub fn set(&self, tokens: TokenPair) {
        let mut pair = self.inner.pair.lock();
        self.persist(ACCESS_KEY, tokens.access.as_deref());
        self.persist(REFRESH_KEY, tokens.refresh.as_deref());
        *pair = tokens;
    }

    /// Drop both tokens and remove their storage keys.
    pub fn clear(&self) {
        let mut pair = self.inner.pair.lock();
        self.persist(ACCESS_KEY, None);
        self.persist(REFRESH_KEY, None);
        *pair = TokenPair::default();
    }

    fn persist(&self, key: &str, value: Option<&str>) {
        let result = match value {
            Some(v) => self.inner.storage.write(key, v),
            None => self.inner.storage.remove(key),
        };
        if let Err(e) = result {
            tracing::warn!(key, err = %e, "failed to persist token");
        }
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let pair = self.inner.pair.lock();
        f.debug_struct("TokenStore")
            .field("has_access", &pair.access.is_some())
            .field("has_refresh", &pair.refresh.is_some())
            .finish()
    }
}

/// Read a key, treating empty strings (older tombstones) and read errors as absent.
fn read_key(storage: &dyn Storage, key: &str) -> Option<String> {
    match storage.read(key) {
        Ok(Some(v)) if !v.is_empty() => Some(v),
        Ok(_) => None,
        Err(e) => {
            tracing::warn!(key, err = %e, "failed to read persisted token");
            None
        }
    }
}

#[cfg(test)]
#[path = "token_tests.rs"]
mod tests;
