// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token store: owns the access/refresh pair and its persisted projection.
//!
//! Reads hand out copies taken under a read lock, so a header is never built
//! from a half-updated pair. Mutation is crate-private: only the refresh
//! coordinator and the session's login/logout paths write tokens.
//!
//! Each login and each clear starts a new generation. A refresh carries the
//! generation it started from and commits nothing once that has moved on.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::AuthError;
use crate::storage::{
    Change, KeyValueStore, ACCESS_TOKEN_KEY, EMAIL_KEY, IS_AUTHENTICATED_KEY, REFRESH_TOKEN_KEY,
    USER_ID_KEY,
};
use crate::token::claims::decode_unverified_claims;
use crate::token::{epoch_secs, normalize_bearer, strip_bearer, Token, TokenResponse};

/// Keys removed by [`TokenStore::clear`]. The remembered email stays, and the
/// expiry flag belongs to the observer.
const CLEARED_KEYS: &[&str] = &[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, IS_AUTHENTICATED_KEY, USER_ID_KEY];

/// In-memory view of the current session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionTokens {
    /// Access token without the `Bearer ` prefix.
    pub access: Option<Token>,
    pub refresh: Option<Token>,
    pub user_id: Option<String>,
    pub email: Option<String>,
}

pub struct TokenStore {
    storage: Arc<dyn KeyValueStore>,
    state: RwLock<SessionTokens>,
    /// Bumped by login and by clear, always under the `state` write lock.
    generation: AtomicU64,
}

impl TokenStore {
    /// Rebuild the session from persisted state. Never fails.
    pub fn load(storage: Arc<dyn KeyValueStore>) -> Self {
        let access = storage.get(ACCESS_TOKEN_KEY).and_then(|stored| {
            let raw = strip_bearer(&stored);
            if raw.is_empty() {
                return None;
            }
            let normalized = normalize_bearer(raw);
            if normalized != stored {
                debug!("normalizing persisted access token prefix");
                if let Err(e) = storage.set(ACCESS_TOKEN_KEY, &normalized) {
                    warn!("failed to rewrite access token: {e}");
                }
            }
            Some(Token::parse(raw))
        });

        let refresh = storage
            .get(REFRESH_TOKEN_KEY)
            .filter(|r| !r.trim().is_empty())
            .map(|r| Token::parse(r.trim()));

        // The expired access token is kept for the refresh path, but it no
        // longer counts as authenticated.
        if !access.as_ref().is_some_and(is_current) && storage.get(IS_AUTHENTICATED_KEY).is_some() {
            if let Err(e) = storage.remove(IS_AUTHENTICATED_KEY) {
                warn!("failed to drop stale authentication marker: {e}");
            }
        }

        let user_id = storage.get(USER_ID_KEY).or_else(|| {
            access.as_ref().and_then(|t| decode_unverified_claims(t.value())).and_then(|c| c.sub)
        });
        let email = storage.get(EMAIL_KEY);

        Self {
            storage,
            state: RwLock::new(SessionTokens { access, refresh, user_id, email }),
            generation: AtomicU64::new(0),
        }
    }

    /// Identifies the current session. Changes on every login and clear,
    /// but not on refresh.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// The refresh token of session `generation`, or `SessionChanged` if a
    /// login or clear has happened since.
    pub(crate) fn refresh_token_for(&self, generation: u64) -> Result<Option<Token>, AuthError> {
        let state = self.state.read();
        if self.generation() != generation {
            return Err(AuthError::SessionChanged);
        }
        Ok(state.refresh.clone())
    }

    /// Commit a token pair from `/login`, starting a new session generation.
    ///
    /// A response without a refresh token keeps the current one.
    /// `login_email` is used when the token carries no email claim.
    pub(crate) fn save(
        &self,
        response: &TokenResponse,
        login_email: Option<&str>,
    ) -> Result<SessionTokens, AuthError> {
        self.commit(response, login_email, None)
    }

    /// Commit a token pair from `/refresh`, but only if the session is still
    /// the one the refresh started from.
    pub(crate) fn save_refreshed(
        &self,
        response: &TokenResponse,
        generation: u64,
    ) -> Result<SessionTokens, AuthError> {
        self.commit(response, None, Some(generation))
    }

    /// Persist first, as one batch, then update memory. A storage failure
    /// leaves both untouched.
    fn commit(
        &self,
        response: &TokenResponse,
        login_email: Option<&str>,
        expected_generation: Option<u64>,
    ) -> Result<SessionTokens, AuthError> {
        let raw = strip_bearer(&response.access_token);
        if raw.is_empty() {
            return Err(AuthError::InvalidTokens("access token is required".to_owned()));
        }

        let claims = decode_unverified_claims(raw);
        if claims.is_none() {
            warn!("could not extract claims from access token; user fields left unset");
        }
        let claims = claims.unwrap_or_default();

        let mut state = self.state.write();
        if let Some(expected) = expected_generation {
            if self.generation() != expected {
                return Err(AuthError::SessionChanged);
            }
        }

        let access = Token::parse(raw);
        let refresh = match response.refresh_token.as_deref().map(str::trim) {
            Some(r) if !r.is_empty() => Some(Token::parse(r)),
            _ => state.refresh.clone(),
        };
        let user_id = claims.sub.or_else(|| response.user_id.clone());
        let email = claims.email.or_else(|| login_email.map(str::to_owned)).or(state.email.clone());

        let header = normalize_bearer(raw);
        let mut changes: Vec<Change<'_>> = vec![
            (ACCESS_TOKEN_KEY, Some(header.as_str())),
            (IS_AUTHENTICATED_KEY, is_current(&access).then_some("true")),
            (USER_ID_KEY, user_id.as_deref()),
        ];
        if let Some(ref r) = refresh {
            changes.push((REFRESH_TOKEN_KEY, Some(r.value())));
        }
        if let Some(ref e) = email {
            changes.push((EMAIL_KEY, Some(e.as_str())));
        }
        self.storage.apply(&changes).map_err(|e| AuthError::Storage(e.to_string()))?;

        *state = SessionTokens { access: Some(access), refresh, user_id, email };
        if expected_generation.is_none() {
            self.generation.fetch_add(1, Ordering::AcqRel);
        }
        Ok(state.clone())
    }

    /// Drop the session. Storage failures are logged; memory is always cleared.
    pub(crate) fn clear(&self) {
        let mut state = self.state.write();
        self.clear_locked(&mut state);
    }

    /// Drop the session only if it is still `generation`. Returns whether it
    /// was cleared.
    pub(crate) fn clear_if_current(&self, generation: u64) -> bool {
        let mut state = self.state.write();
        if self.generation() != generation {
            return false;
        }
        self.clear_locked(&mut state);
        true
    }

    fn clear_locked(&self, state: &mut SessionTokens) {
        let changes: Vec<Change<'_>> = CLEARED_KEYS.iter().map(|&key| (key, None)).collect();
        if let Err(e) = self.storage.apply(&changes) {
            warn!("failed to remove session keys: {e}");
        }
        let email = state.email.take();
        *state = SessionTokens { email, ..SessionTokens::default() };
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    pub fn snapshot(&self) -> SessionTokens {
        self.state.read().clone()
    }

    pub fn access_token(&self) -> Option<Token> {
        self.state.read().access.clone()
    }

    pub fn refresh_token(&self) -> Option<Token> {
        self.state.read().refresh.clone()
    }

    /// `Bearer <token>` for the current access token.
    pub fn authorization_header(&self) -> Option<String> {
        self.state.read().access.as_ref().map(|t| normalize_bearer(t.value()))
    }

    pub fn user_id(&self) -> Option<String> {
        self.state.read().user_id.clone()
    }

    pub fn email(&self) -> Option<String> {
        self.state.read().email.clone()
    }

    /// An access token is present and not literally past its expiry.
    pub fn is_authenticated(&self) -> bool {
        self.state.read().access.as_ref().is_some_and(is_current)
    }
}

/// Not literally past its expiry. A token without `exp` counts as current.
fn is_current(token: &Token) -> bool {
    token.expires_at().map_or(true, |exp| exp > epoch_secs())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
