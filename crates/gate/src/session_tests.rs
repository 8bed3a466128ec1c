// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use super::*;
use crate::storage::MemoryStorage;

fn fresh() -> Session {
    Session::new(TokenStore::load(Arc::new(MemoryStorage::new())))
}

fn persisted() -> Session {
    let storage = MemoryStorage::with_entries([("access_token", "a-0"), ("refresh_token", "r-0")]);
    Session::new(TokenStore::load(Arc::new(storage)))
}

#[test]
fn starts_logged_out_even_with_persisted_tokens() -> anyhow::Result<()> {
    let session = persisted();
    assert_eq!(session.state(), SessionState::LoggedOut);
    assert_eq!(session.store().access().as_deref(), Some("a-0"));
    Ok(())
}

#[test]
fn begin_authenticates_and_emits_logged_in() -> anyhow::Result<()> {
    let session = fresh();
    let mut events = session.events();

    session.begin(TokenPair::new("a-1", Some("r-1".into())));

    assert_eq!(session.state(), SessionState::Authenticated);
    assert_eq!(session.store().refresh_token().as_deref(), Some("r-1"));
    assert_eq!(events.try_recv()?, SessionEvent::LoggedIn);
    Ok(())
}

#[test]
fn resume_requires_access_token() -> anyhow::Result<()> {
    assert!(!fresh().resume());

    let session = persisted();
    assert!(session.resume());
    assert_eq!(session.state(), SessionState::Authenticated);
    // Already authenticated: nothing to resume.
    assert!(!session.resume());
    Ok(())
}

#[test]
fn end_is_idempotent() -> anyhow::Result<()> {
    let session = fresh();
    let mut events = session.events();
    session.begin(TokenPair::new("a", Some("r".into())));
    let _ = events.try_recv()?;

    assert!(session.end(EndReason::Explicit));
    assert!(!session.end(EndReason::Explicit));
    assert!(!session.end(EndReason::Inactivity));

    assert_eq!(session.state(), SessionState::LoggedOut);
    assert!(session.store().get().is_empty());
    assert_eq!(events.try_recv()?, SessionEvent::Ended { reason: EndReason::Explicit });
    assert!(events.try_recv().is_err(), "only one Ended event expected");
    Ok(())
}

#[test]
fn end_while_logged_out_wipes_leftover_tokens() -> anyhow::Result<()> {
    let session = persisted();
    let mut events = session.events();

    assert!(!session.end(EndReason::Explicit));
    assert!(session.store().get().is_empty());
    assert!(events.try_recv().is_err(), "no Ended event when no session was live");
    Ok(())
}

#[test]
fn logged_out_session_exposes_no_access_token() -> anyhow::Result<()> {
    let session = persisted();
    assert_eq!(session.access_token(), None);

    assert!(session.resume());
    assert_eq!(session.access_token().as_deref(), Some("a-0"));
    Ok(())
}

#[test]
fn state_observable_tracks_transitions() -> anyhow::Result<()> {
    let session = fresh();
    let rx = session.subscribe();
    assert_eq!(*rx.borrow(), SessionState::LoggedOut);

    session.begin(TokenPair::new("a", Some("r".into())));
    assert_eq!(*rx.borrow(), SessionState::Authenticated);

    let (generation, _) = session.begin_refresh()?;
    assert_eq!(*rx.borrow(), SessionState::Refreshing);

    assert!(session.commit_refresh(generation, "a-2", None));
    assert_eq!(*rx.borrow(), SessionState::Authenticated);
    assert_eq!(session.store().access().as_deref(), Some("a-2"));
    // Refresh token kept when the endpoint does not rotate it.
    assert_eq!(session.store().refresh_token().as_deref(), Some("r"));
    Ok(())
}

#[test]
fn commit_after_logout_is_discarded() -> anyhow::Result<()> {
    let session = fresh();
    session.begin(TokenPair::new("a", Some("r".into())));
    let (generation, _) = session.begin_refresh()?;

    assert!(session.end(EndReason::Explicit));
    assert!(!session.commit_refresh(generation, "late", Some("late-r")));

    assert_eq!(session.state(), SessionState::LoggedOut);
    assert!(session.store().get().is_empty());
    Ok(())
}

#[test]
fn abort_after_relogin_keeps_new_session() -> anyhow::Result<()> {
    let session = fresh();
    session.begin(TokenPair::new("a", Some("r".into())));
    let (stale, _) = session.begin_refresh()?;

    session.begin(TokenPair::new("a-new", Some("r-new".into())));
    session.abort_refresh(stale, EndReason::RefreshFailed);

    assert_eq!(session.state(), SessionState::Authenticated);
    assert_eq!(session.store().access().as_deref(), Some("a-new"));
    Ok(())
}

#[test]
fn abort_clears_and_emits_once() -> anyhow::Result<()> {
    let session = fresh();
    session.begin(TokenPair::new("a", Some("r".into())));
    let mut events = session.events();
    let (generation, _) = session.begin_refresh()?;

    session.abort_refresh(generation, EndReason::RefreshFailed);

    assert_eq!(session.state(), SessionState::LoggedOut);
    assert!(session.store().get().is_empty());
    assert_eq!(events.try_recv()?, SessionEvent::Ended { reason: EndReason::RefreshFailed });
    Ok(())
}

#[test]
fn begin_refresh_refuses_logged_out_session() -> anyhow::Result<()> {
    let session = persisted();
    let mut events = session.events();

    assert_eq!(session.begin_refresh(), Err(GateError::SessionExpired));
    assert_eq!(session.state(), SessionState::LoggedOut);
    // Persisted tokens stay put so a later resume still works.
    assert_eq!(session.store().refresh_token().as_deref(), Some("r-0"));
    assert!(events.try_recv().is_err());
    Ok(())
}

#[test]
fn begin_refresh_without_refresh_token_expires_session() -> anyhow::Result<()> {
    let session = fresh();
    session.begin(TokenPair::new("a", None));
    let mut events = session.events();

    assert_eq!(session.begin_refresh(), Err(GateError::SessionExpired));
    assert_eq!(session.state(), SessionState::LoggedOut);
    assert!(session.store().get().is_empty());
    assert_eq!(events.try_recv()?, SessionEvent::Ended { reason: EndReason::SessionExpired });
    Ok(())
}

#[test]
fn commit_refuses_logged_out_session() -> anyhow::Result<()> {
    let session = fresh();
    let generation = session.generation();
    assert!(!session.commit_refresh(generation, "late", None));
    assert_eq!(session.state(), SessionState::LoggedOut);
    assert!(session.store().get().is_empty());
    Ok(())
}

#[test]
fn event_wire_format() -> anyhow::Result<()> {
    let json = serde_json::to_value(SessionEvent::Ended { reason: EndReason::Inactivity })?;
    assert_eq!(json, serde_json::json!({"event": "ended", "reason": "inactivity"}));
    assert_eq!(SessionState::Refreshing.to_string(), "refreshing");
    Ok(())
}
