// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use serde_json::json;

use super::*;
use crate::storage::{MemoryStore, TOKEN_EXPIRED_KEY};
use crate::test_support::{token_expiring_in, unsigned_token, FlakyStore};

fn response(access: &str, refresh: Option<&str>) -> TokenResponse {
    TokenResponse {
        access_token: access.to_owned(),
        refresh_token: refresh.map(str::to_owned),
        token_type: Some("bearer".to_owned()),
        expires_in: None,
        user_id: None,
    }
}

fn empty_store() -> (Arc<MemoryStore>, TokenStore) {
    let kv = Arc::new(MemoryStore::new());
    let store = TokenStore::load(Arc::clone(&kv) as Arc<dyn KeyValueStore>);
    (kv, store)
}

#[test]
fn login_scenario_extracts_user() -> anyhow::Result<()> {
    let (kv, store) = empty_store();
    let access = token_expiring_in("u1", 3600);

    store.save(&response(&access, Some("r")), None)?;

    assert!(store.is_authenticated());
    assert_eq!(store.user_id().as_deref(), Some("u1"));
    assert_eq!(kv.get(ACCESS_TOKEN_KEY), Some(format!("Bearer {access}")));
    assert_eq!(kv.get(REFRESH_TOKEN_KEY).as_deref(), Some("r"));
    assert_eq!(kv.get(IS_AUTHENTICATED_KEY).as_deref(), Some("true"));
    assert_eq!(kv.get(USER_ID_KEY).as_deref(), Some("u1"));
    assert_eq!(store.authorization_header(), Some(format!("Bearer {access}")));
    Ok(())
}

#[test]
fn save_rejects_empty_access_token() {
    let (kv, store) = empty_store();
    crate::assert_err_contains!(store.save(&response("", Some("r")), None), "access token");
    crate::assert_err_contains!(store.save(&response("Bearer ", None), None), "access token");
    assert_eq!(kv.get(REFRESH_TOKEN_KEY), None);
    assert!(!store.is_authenticated());
}

#[test]
fn save_tolerates_opaque_access_token() -> anyhow::Result<()> {
    let (kv, store) = empty_store();
    store.save(&response("opaque", None), Some("ana@example.com"))?;

    assert!(store.is_authenticated());
    assert_eq!(store.user_id(), None);
    assert_eq!(kv.get(USER_ID_KEY), None);
    assert_eq!(store.email().as_deref(), Some("ana@example.com"));
    Ok(())
}

#[test]
fn save_falls_back_to_response_user_id() -> anyhow::Result<()> {
    let (_kv, store) = empty_store();
    let mut resp = response("opaque", None);
    resp.user_id = Some("from-body".to_owned());
    store.save(&resp, None)?;
    assert_eq!(store.user_id().as_deref(), Some("from-body"));
    Ok(())
}

#[test]
fn email_claim_wins_over_login_email() -> anyhow::Result<()> {
    let (_kv, store) = empty_store();
    let access = unsigned_token(&json!({ "sub": "u1", "email": "claim@example.com" }));
    store.save(&response(&access, None), Some("typed@example.com"))?;
    assert_eq!(store.email().as_deref(), Some("claim@example.com"));
    Ok(())
}

#[test]
fn refresh_without_new_refresh_token_keeps_old_one() -> anyhow::Result<()> {
    let (kv, store) = empty_store();
    store.save(&response(&token_expiring_in("u1", 3600), Some("r1")), None)?;
    store.save(&response(&token_expiring_in("u1", 7200), None), None)?;

    assert_eq!(store.refresh_token().map(|t| t.value().to_owned()).as_deref(), Some("r1"));
    assert_eq!(kv.get(REFRESH_TOKEN_KEY).as_deref(), Some("r1"));
    Ok(())
}

#[test]
fn clear_keeps_email_and_expiry_flag() -> anyhow::Result<()> {
    let (kv, store) = empty_store();
    store.save(&response(&token_expiring_in("u1", 3600), Some("r")), Some("ana@example.com"))?;
    kv.set(TOKEN_EXPIRED_KEY, "true")?;

    store.clear();

    assert!(!store.is_authenticated());
    assert_eq!(store.access_token(), None);
    assert_eq!(store.refresh_token(), None);
    assert_eq!(store.user_id(), None);
    assert_eq!(store.email().as_deref(), Some("ana@example.com"));
    for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, IS_AUTHENTICATED_KEY, USER_ID_KEY] {
        assert_eq!(kv.get(key), None, "{key} should be cleared");
    }
    assert_eq!(kv.get(EMAIL_KEY).as_deref(), Some("ana@example.com"));
    assert_eq!(kv.get(TOKEN_EXPIRED_KEY).as_deref(), Some("true"));
    Ok(())
}

#[test]
fn load_restores_persisted_session() {
    let access = token_expiring_in("u7", 600);
    let prefixed = format!("Bearer {access}");
    let kv = Arc::new(MemoryStore::with_entries([
        (ACCESS_TOKEN_KEY, prefixed.as_str()),
        (REFRESH_TOKEN_KEY, "r"),
        (EMAIL_KEY, "ana@example.com"),
    ]));
    let store = TokenStore::load(kv);

    let snap = store.snapshot();
    assert_eq!(snap.access.as_ref().map(Token::value), Some(access.as_str()));
    assert!(snap.access.and_then(|t| t.expires_at()).is_some());
    assert_eq!(snap.refresh.map(|t| t.value().to_owned()).as_deref(), Some("r"));
    // Not persisted, so recovered from the subject claim.
    assert_eq!(snap.user_id.as_deref(), Some("u7"));
    assert_eq!(snap.email.as_deref(), Some("ana@example.com"));
}

#[test]
fn load_normalizes_missing_prefix_and_resave_is_idempotent() -> anyhow::Result<()> {
    let access = token_expiring_in("u1", 600);
    let kv = Arc::new(MemoryStore::with_entries([(ACCESS_TOKEN_KEY, access.as_str())]));
    let store = TokenStore::load(Arc::clone(&kv) as Arc<dyn KeyValueStore>);

    let expected = format!("Bearer {access}");
    assert_eq!(kv.get(ACCESS_TOKEN_KEY).as_deref(), Some(expected.as_str()));

    let header = store.authorization_header().unwrap_or_default();
    store.save(&response(&header, None), None)?;
    assert_eq!(kv.get(ACCESS_TOKEN_KEY).as_deref(), Some(expected.as_str()));

    let reloaded = TokenStore::load(Arc::clone(&kv) as Arc<dyn KeyValueStore>);
    assert_eq!(reloaded.authorization_header().as_deref(), Some(expected.as_str()));
    assert_eq!(kv.get(ACCESS_TOKEN_KEY).as_deref(), Some(expected.as_str()));
    Ok(())
}

#[test]
fn load_with_garbage_token_degrades_to_unknown_expiry() {
    let kv = Arc::new(MemoryStore::with_entries([(ACCESS_TOKEN_KEY, "Bearer not.a.jwt!")]));
    let store = TokenStore::load(kv);
    let access = store.access_token();
    assert!(access.is_some());
    assert_eq!(access.and_then(|t| t.expires_at()), None);
    assert!(store.is_authenticated());
}

#[test]
fn load_drops_stale_authenticated_marker() {
    let kv = Arc::new(MemoryStore::with_entries([(IS_AUTHENTICATED_KEY, "true")]));
    let store = TokenStore::load(Arc::clone(&kv) as Arc<dyn KeyValueStore>);
    assert!(!store.is_authenticated());
    assert_eq!(kv.get(IS_AUTHENTICATED_KEY), None);
}

#[test]
fn expired_access_token_is_not_authenticated() -> anyhow::Result<()> {
    let (_kv, store) = empty_store();
    store.save(&response(&token_expiring_in("u1", -5), Some("r")), None)?;
    assert!(!store.is_authenticated());
    Ok(())
}

#[test]
fn load_drops_marker_for_expired_access_token() {
    let expired = format!("Bearer {}", token_expiring_in("u1", -60));
    let kv = Arc::new(MemoryStore::with_entries([
        (ACCESS_TOKEN_KEY, expired.as_str()),
        (REFRESH_TOKEN_KEY, "r"),
        (IS_AUTHENTICATED_KEY, "true"),
    ]));
    let store = TokenStore::load(Arc::clone(&kv) as Arc<dyn KeyValueStore>);

    assert!(!store.is_authenticated());
    assert_eq!(kv.get(IS_AUTHENTICATED_KEY), None);
    // Still there for the refresh path.
    assert!(store.access_token().is_some());
    assert_eq!(kv.get(ACCESS_TOKEN_KEY).as_deref(), Some(expired.as_str()));
}

#[test]
fn load_keeps_marker_for_current_access_token() {
    let current = format!("Bearer {}", token_expiring_in("u1", 600));
    let kv = Arc::new(MemoryStore::with_entries([
        (ACCESS_TOKEN_KEY, current.as_str()),
        (IS_AUTHENTICATED_KEY, "true"),
    ]));
    let store = TokenStore::load(Arc::clone(&kv) as Arc<dyn KeyValueStore>);

    assert!(store.is_authenticated());
    assert_eq!(kv.get(IS_AUTHENTICATED_KEY).as_deref(), Some("true"));
}

#[test]
fn failed_save_leaves_storage_and_memory_unchanged() -> anyhow::Result<()> {
    let kv = Arc::new(FlakyStore::new());
    let store = TokenStore::load(Arc::clone(&kv) as Arc<dyn KeyValueStore>);
    let old = token_expiring_in("u1", 600);
    store.save(&response(&old, Some("r1")), None)?;
    let before = store.snapshot();

    kv.fail_writes_to(REFRESH_TOKEN_KEY);
    let result = store.save(&response(&token_expiring_in("u2", 3600), Some("r2")), None);

    crate::assert_err_contains!(result, "disk full");
    assert_eq!(store.snapshot(), before);
    assert_eq!(kv.get(ACCESS_TOKEN_KEY), Some(format!("Bearer {old}")));
    assert_eq!(kv.get(REFRESH_TOKEN_KEY).as_deref(), Some("r1"));
    assert_eq!(kv.get(USER_ID_KEY).as_deref(), Some("u1"));

    // What is persisted restores the same session.
    let reloaded = TokenStore::load(Arc::clone(&kv) as Arc<dyn KeyValueStore>);
    assert_eq!(reloaded.snapshot(), before);
    Ok(())
}

#[test]
fn login_and_clear_start_new_generations() -> anyhow::Result<()> {
    let (_kv, store) = empty_store();
    let start = store.generation();

    store.save(&response(&token_expiring_in("u1", 3600), Some("r1")), None)?;
    let logged_in = store.generation();
    assert_ne!(logged_in, start);

    store.save_refreshed(&response(&token_expiring_in("u1", 7200), Some("r2")), logged_in)?;
    assert_eq!(store.generation(), logged_in);

    store.clear();
    assert_ne!(store.generation(), logged_in);
    Ok(())
}

#[test]
fn refreshed_pair_from_older_session_is_discarded() -> anyhow::Result<()> {
    let (kv, store) = empty_store();
    store.save(&response(&token_expiring_in("u1", 3600), Some("r1")), None)?;
    let before_logout = store.generation();
    store.clear();

    let result = store.save_refreshed(&response(&token_expiring_in("u1", 7200), Some("r2")), before_logout);

    assert_eq!(result, Err(AuthError::SessionChanged));
    assert_eq!(store.access_token(), None);
    assert_eq!(kv.get(REFRESH_TOKEN_KEY), None);
    assert_eq!(kv.get(IS_AUTHENTICATED_KEY), None);
    assert_eq!(store.refresh_token_for(before_logout), Err(AuthError::SessionChanged));
    Ok(())
}

#[test]
fn clear_if_current_skips_newer_session() -> anyhow::Result<()> {
    let (kv, store) = empty_store();
    let stale = store.generation();
    store.save(&response(&token_expiring_in("u1", 3600), Some("r1")), None)?;

    assert!(!store.clear_if_current(stale));
    assert!(store.is_authenticated());
    assert_eq!(kv.get(REFRESH_TOKEN_KEY).as_deref(), Some("r1"));

    assert!(store.clear_if_current(store.generation()));
    assert_eq!(store.access_token(), None);
    Ok(())
}
