//! Shared access state: the policy table and token store snapshots
//!
//! Readers clone an `Arc` snapshot and release the lock immediately. Writers
//! (policy reload and token administration) serialise on one mutex, persist
//! first, then swap in a freshly built snapshot.

use kiosk_api::{AccessPolicy, AccessToken, ErrorCode, TokenToggle};
use kiosk_store::{Store, StoreError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use thiserror::Error;
use tracing::{info, warn};

use crate::{PolicyTable, TokenStore};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Unknown access level: {0}")]
    UnknownAccessLevel(u32),

    #[error("Token not found")]
    TokenNotFound,

    #[error("Token already exists")]
    TokenExists,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl RegistryError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UnknownAccessLevel(_) | Self::TokenNotFound | Self::TokenExists => {
                ErrorCode::Unprocessable
            }
            Self::Store(_) => ErrorCode::InternalError,
        }
    }
}

pub type RegistryResult<T> = Result<T, RegistryError>;

/// Counts after a policy reload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReloadSummary {
    pub policy_count: usize,
    pub token_count: usize,
}

pub struct AccessRegistry {
    store: Arc<dyn Store>,
    policies: RwLock<Arc<PolicyTable>>,
    tokens: RwLock<Arc<TokenStore>>,
    write_lock: Mutex<()>,
}

// The snapshot locks only ever hold a whole Arc, so a poisoned guard is still consistent
fn read<T>(lock: &RwLock<Arc<T>>) -> Arc<T> {
    Arc::clone(&lock.read().unwrap_or_else(PoisonError::into_inner))
}

fn swap<T>(lock: &RwLock<Arc<T>>, next: T) {
    *lock.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
}

impl AccessRegistry {
    /// Build the initial snapshots from persisted policies and tokens
    pub fn load(store: Arc<dyn Store>) -> RegistryResult<Self> {
        let policies = PolicyTable::new(store.load_policies()?);
        let tokens = TokenStore::load(store.load_tokens()?, &policies);

        info!(
            policy_count = policies.len(),
            token_count = tokens.len(),
            "Access registry loaded"
        );

        Ok(Self {
            store,
            policies: RwLock::new(Arc::new(policies)),
            tokens: RwLock::new(Arc::new(tokens)),
            write_lock: Mutex::new(()),
        })
    }

    fn writer(&self) -> MutexGuard<'_, ()> {
        self.write_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Current policy snapshot
    pub fn policies(&self) -> Arc<PolicyTable> {
        read(&self.policies)
    }

    /// Current token snapshot
    pub fn tokens(&self) -> Arc<TokenStore> {
        read(&self.tokens)
    }

    /// Replace every policy, then rebuild the token store against the new table.
    ///
    /// The persisted replacement is a single transaction; when it fails the
    /// in-memory snapshots are left untouched.
    pub fn reload(&self, policies: &[AccessPolicy]) -> RegistryResult<ReloadSummary> {
        let _guard = self.writer();

        self.store.replace_policies(policies)?;
        self.refresh_locked()
    }

    fn refresh_locked(&self) -> RegistryResult<ReloadSummary> {
        let table = PolicyTable::new(self.store.load_policies()?);
        let persisted_tokens = self.store.load_tokens()?;
        let policy_count = table.len();

        let tokens = TokenStore::load(persisted_tokens, &table);
        let token_count = tokens.len();

        // Tokens are rebuilt only once the new policy table is visible
        swap(&self.policies, table);
        swap(&self.tokens, tokens);

        info!(policy_count, token_count, "Access policies reloaded");
        Ok(ReloadSummary {
            policy_count,
            token_count,
        })
    }

    /// Mint and persist a new enabled token for an existing access level
    pub fn issue_token(&self, access_level: u32) -> RegistryResult<String> {
        let _guard = self.writer();

        if !self.policies().contains(access_level) {
            return Err(RegistryError::UnknownAccessLevel(access_level));
        }

        let token = AccessToken::new(kiosk_util::generate_token(), access_level);
        let mut next = (*self.tokens()).clone();
        if !next.add(token.clone()) {
            return Err(RegistryError::TokenExists);
        }

        self.store.insert_token(&token)?;
        swap(&self.tokens, next);

        info!(access_level, "Kiosk token issued");
        Ok(token.token)
    }

    pub fn remove_token(&self, token: &str) -> RegistryResult<()> {
        let _guard = self.writer();

        let mut next = (*self.tokens()).clone();
        if !next.remove(token) {
            return Err(RegistryError::TokenNotFound);
        }

        match self.store.delete_token(token) {
            Ok(()) => {}
            // Already gone from storage; memory is brought in line below
            Err(StoreError::NotFound(_)) => warn!("Removed token was missing from storage"),
            Err(e) => return Err(e.into()),
        }
        swap(&self.tokens, next);

        info!("Kiosk token removed");
        Ok(())
    }

    /// Enable or disable a token; no-ops are reported and not persisted
    pub fn set_token_enabled(&self, token: &str, enabled: bool) -> RegistryResult<TokenToggle> {
        let _guard = self.writer();

        let mut next = (*self.tokens()).clone();
        let outcome = next
            .set_enabled(token, enabled)
            .ok_or(RegistryError::TokenNotFound)?;

        if outcome.changed() {
            let updated = next.get(token).ok_or(RegistryError::TokenNotFound)?;
            self.store.update_token(updated)?;
            swap(&self.tokens, next);
        }

        info!(?outcome, "Kiosk token toggled");
        Ok(outcome)
    }
}
