//! Per-session graph context cache.
//!
//! A session's context is computed once from the graph store and reused for
//! every later prompt in that session. Entries must not outlive the session
//! binding; [`ContextCache::set`] purges strays it encounters.

use crate::registry::SessionRegistry;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

/// What a call to [`ContextCache::set`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheOutcome {
    Stored,
    /// The session already had a context; the new value was discarded.
    AlreadyCached,
    /// The session is not live. `purged` reports whether a stray entry was removed.
    NotLive { purged: bool },
    /// The session is now bound to another connection; nothing was written.
    Superseded,
}

#[derive(Debug, Default)]
pub struct ContextCache {
    contexts: DashMap<String, String>,
}

impl ContextCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<String> {
        self.contexts
            .get(session_id)
            .map(|entry| entry.value().clone())
    }

    /// Store `context` for a session that has none yet, provided the session
    /// is still bound to `connection_id`.
    ///
    /// Not a pure write: for a session that is no longer live, any leftover
    /// entry is removed instead.
    ///
    /// The ownership check runs while the entry is held, so a handshake that
    /// rebinds the session either fails the check or evicts the value
    /// afterwards when it clears the cache.
    pub fn set(
        &self,
        session_id: &str,
        connection_id: &str,
        context: String,
        registry: &SessionRegistry,
    ) -> CacheOutcome {
        let entry = self.contexts.entry(session_id.to_string());

        match registry.connection_id(session_id) {
            None => {
                let purged = match entry {
                    Entry::Occupied(stray) => {
                        stray.remove();
                        true
                    }
                    Entry::Vacant(_) => false,
                };
                if purged {
                    tracing::warn!(session_id = %session_id, "Purged context for disconnected session");
                }
                CacheOutcome::NotLive { purged }
            }
            Some(owner) if owner != connection_id => {
                tracing::debug!(
                    session_id = %session_id,
                    connection_id = %connection_id,
                    owner = %owner,
                    "Dropped context computed for a replaced connection"
                );
                CacheOutcome::Superseded
            }
            Some(_) => match entry {
                Entry::Occupied(_) => CacheOutcome::AlreadyCached,
                Entry::Vacant(slot) => {
                    tracing::debug!(
                        session_id = %session_id,
                        context_len = context.len(),
                        "Cached graph context"
                    );
                    slot.insert(context);
                    CacheOutcome::Stored
                }
            },
        }
    }

    /// Drop the entry for `session_id`.
    pub fn remove(&self, session_id: &str) -> bool {
        self.contexts.remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }
}
