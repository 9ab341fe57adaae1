//! Alias registry tracking open vector store connections.
//!
//! A connection is registered under an alias while in use and deregistered when its
//! [`AliasGuard`] drops, on success and error paths alike. Several holders may share one alias;
//! the alias disappears once the last holder releases it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
struct AliasEntry {
    endpoint: String,
    holders: usize,
}

/// Process-wide table of connected aliases.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    aliases: Mutex<HashMap<String, AliasEntry>>,
}

impl ConnectionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a holder of `alias` pointing at `endpoint`.
    pub fn register(self: &Arc<Self>, alias: &str, endpoint: &str) -> AliasGuard {
        let mut aliases = self.lock();
        let entry = aliases
            .entry(alias.to_string())
            .or_insert_with(|| AliasEntry {
                endpoint: endpoint.to_string(),
                holders: 0,
            });
        if entry.endpoint != endpoint {
            tracing::warn!(
                alias,
                previous = %entry.endpoint,
                endpoint,
                "Alias re-registered against a different endpoint"
            );
            entry.endpoint = endpoint.to_string();
        }
        entry.holders += 1;
        tracing::trace!(alias, holders = entry.holders, "Alias connected");

        AliasGuard {
            registry: Arc::clone(self),
            alias: alias.to_string(),
        }
    }

    /// Release one holder of `alias`. Returns `false` when the alias was not registered.
    pub fn disconnect(&self, alias: &str) -> bool {
        let mut aliases = self.lock();
        let Some(entry) = aliases.get_mut(alias) else {
            return false;
        };
        entry.holders = entry.holders.saturating_sub(1);
        if entry.holders == 0 {
            aliases.remove(alias);
            tracing::trace!(alias, "Alias disconnected");
        }
        true
    }

    /// Whether `alias` currently has at least one holder.
    pub fn is_connected(&self, alias: &str) -> bool {
        self.lock().contains_key(alias)
    }

    /// Endpoint registered for `alias`.
    pub fn endpoint(&self, alias: &str) -> Option<String> {
        self.lock().get(alias).map(|entry| entry.endpoint.clone())
    }

    /// Aliases currently connected, sorted.
    pub fn active_aliases(&self) -> Vec<String> {
        let mut aliases: Vec<String> = self.lock().keys().cloned().collect();
        aliases.sort();
        aliases
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, AliasEntry>> {
        self.aliases.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps an alias registered for as long as it lives.
#[derive(Debug)]
pub struct AliasGuard {
    registry: Arc<ConnectionRegistry>,
    alias: String,
}

impl AliasGuard {
    /// Alias held by this guard.
    pub fn alias(&self) -> &str {
        &self.alias
    }
}

impl Drop for AliasGuard {
    fn drop(&mut self) {
        self.registry.disconnect(&self.alias);
    }
}
