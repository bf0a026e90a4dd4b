// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! String-valued key-value persistence for session state.
//!
//! The session core only needs `get`/`set`/`remove`. [`MemoryStore`] backs
//! tests and embedders that persist elsewhere; [`FileStore`] keeps a JSON
//! object on disk and rewrites it atomically once per mutation or batch.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Persisted access token, always stored with the `Bearer ` prefix.
pub const ACCESS_TOKEN_KEY: &str = "accessToken";
/// Persisted raw refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
/// `"true"` while an access token is believed valid.
pub const IS_AUTHENTICATED_KEY: &str = "isAuthenticated";
/// Subject claim extracted from the access token.
pub const USER_ID_KEY: &str = "userId";
/// Remembered email; survives logout.
pub const EMAIL_KEY: &str = "email";
/// One-shot forced-logout flag.
pub const TOKEN_EXPIRED_KEY: &str = "token_expired";

/// One change in a batch: `Some` sets the key, `None` removes it.
pub type Change<'a> = (&'a str, Option<&'a str>);

/// Minimal persistent key-value storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> std::io::Result<()>;
    fn remove(&self, key: &str) -> std::io::Result<()>;

    /// Apply `changes` as a unit: either all of them land or none do.
    ///
    /// The default applies them in order and restores the previous values
    /// when one fails. Stores that can write a batch atomically override it.
    fn apply(&self, changes: &[Change<'_>]) -> std::io::Result<()> {
        let mut applied: Vec<(&str, Option<String>)> = Vec::with_capacity(changes.len());
        for &(key, value) in changes {
            let previous = self.get(key);
            let result = match value {
                Some(v) => self.set(key, v),
                None => self.remove(key),
            };
            if let Err(e) = result {
                for (key, previous) in applied.into_iter().rev() {
                    let restored = match previous {
                        Some(ref v) => self.set(key, v),
                        None => self.remove(key),
                    };
                    if let Err(e) = restored {
                        warn!(key, "failed to restore session key: {e}");
                    }
                }
                return Err(e);
            }
            applied.push((key, previous));
        }
        Ok(())
    }
}

/// In-memory store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with the given entries.
    pub fn with_entries<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let map = entries.into_iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect();
        Self { entries: Mutex::new(map) }
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        self.entries.lock().insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> std::io::Result<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn apply(&self, changes: &[Change<'_>]) -> std::io::Result<()> {
        let mut entries = self.entries.lock();
        apply_to(&mut entries, changes);
        Ok(())
    }
}

fn apply_to(entries: &mut BTreeMap<String, String>, changes: &[Change<'_>]) {
    for &(key, value) in changes {
        match value {
            Some(v) => {
                entries.insert(key.to_owned(), v.to_owned());
            }
            None => {
                entries.remove(key);
            }
        }
    }
}

/// JSON-file backed store.
///
/// The whole map is held in memory and flushed on each mutation with a
/// write-tmp-then-rename, so readers never observe a half-written file.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open (or lazily create) the store at `path`.
    ///
    /// A missing file starts empty. A corrupt file is logged and ignored; it
    /// is overwritten on the next mutation.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read_to_string(&path) {
            Ok(data) => match serde_json::from_str::<BTreeMap<String, String>>(&data) {
                Ok(map) => map,
                Err(e) => {
                    warn!(path = %path.display(), "failed to parse session state: {e}");
                    BTreeMap::new()
                }
            },
            Err(e) => {
                debug!(path = %path.display(), "no persisted session state: {e}");
                BTreeMap::new()
            }
        };
        Self { path, entries: Mutex::new(entries) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, entries: &BTreeMap<String, String>) -> std::io::Result<()> {
        use std::sync::atomic::{AtomicU32, Ordering};
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(entries)?;
        let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
        let tmp_name = format!(
            "{}.{}.{}.tmp",
            self.path.file_name().unwrap_or_default().to_string_lossy(),
            std::process::id(),
            seq,
        );
        let tmp_path = self.path.with_file_name(tmp_name);
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &self.path)?;
        debug!(path = %self.path.display(), keys = entries.len(), "persisted session state");
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> std::io::Result<()> {
        self.apply(&[(key, Some(value))])
    }

    fn remove(&self, key: &str) -> std::io::Result<()> {
        self.apply(&[(key, None)])
    }

    /// One flush per batch. The in-memory map only changes once the file
    /// has been replaced.
    fn apply(&self, changes: &[Change<'_>]) -> std::io::Result<()> {
        let mut entries = self.entries.lock();
        let mut next = entries.clone();
        apply_to(&mut next, changes);
        if next == *entries {
            return Ok(());
        }
        self.flush(&next)?;
        *entries = next;
        Ok(())
    }
}

/// Resolve the state directory for session data.
///
/// Checks `NIFYA_STATE_DIR`, then `$XDG_STATE_HOME/nifya`,
/// then `$HOME/.local/state/nifya`.
pub fn state_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("NIFYA_STATE_DIR") {
        return PathBuf::from(dir);
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("nifya");
    }
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".local/state/nifya");
    }
    PathBuf::from(".nifya")
}

#[cfg(test)]
#[path = "storage_tests.rs"]
mod tests;
