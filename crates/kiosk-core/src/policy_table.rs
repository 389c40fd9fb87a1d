//! In-memory access level -> policy mapping

use kiosk_api::AccessPolicy;
use std::collections::HashMap;

/// Immutable snapshot of every access policy, keyed by access level
#[derive(Debug, Clone, Default)]
pub struct PolicyTable {
    policies: HashMap<u32, AccessPolicy>,
}

impl PolicyTable {
    pub fn new(policies: impl IntoIterator<Item = AccessPolicy>) -> Self {
        Self {
            policies: policies
                .into_iter()
                .map(|p| (p.access_level, p))
                .collect(),
        }
    }

    pub fn get(&self, access_level: u32) -> Option<&AccessPolicy> {
        self.policies.get(&access_level)
    }

    pub fn contains(&self, access_level: u32) -> bool {
        self.policies.contains_key(&access_level)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}
