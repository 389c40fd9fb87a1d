//! In-memory token -> (access level, enabled) mapping

use kiosk_api::{AccessToken, TokenToggle};
use std::collections::HashMap;
use tracing::info;

use crate::PolicyTable;

/// Snapshot of every usable kiosk token
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    tokens: HashMap<String, AccessToken>,
}

impl TokenStore {
    /// Build from persisted tokens, dropping any whose level has no policy
    pub fn load(tokens: impl IntoIterator<Item = AccessToken>, policies: &PolicyTable) -> Self {
        let mut store = Self::default();
        for token in tokens {
            if !policies.contains(token.access_level) {
                info!(
                    access_level = token.access_level,
                    "Dropping token for unknown access level"
                );
                continue;
            }
            store.tokens.insert(token.token.clone(), token);
        }
        store
    }

    /// Returns false if the token is already present
    pub fn add(&mut self, token: AccessToken) -> bool {
        if self.tokens.contains_key(&token.token) {
            return false;
        }
        self.tokens.insert(token.token.clone(), token);
        true
    }

    pub fn remove(&mut self, token: &str) -> bool {
        self.tokens.remove(token).is_some()
    }

    pub fn get(&self, token: &str) -> Option<&AccessToken> {
        self.tokens.get(token)
    }

    /// Flip a token's enabled flag. None if the token is unknown.
    pub fn set_enabled(&mut self, token: &str, enabled: bool) -> Option<TokenToggle> {
        let entry = self.tokens.get_mut(token)?;
        let outcome = match (entry.enabled, enabled) {
            (true, true) => TokenToggle::AlreadyEnabled,
            (false, false) => TokenToggle::AlreadyDisabled,
            (false, true) => TokenToggle::Enabled,
            (true, false) => TokenToggle::Disabled,
        };
        entry.enabled = enabled;
        Some(outcome)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
