//! Last-accepted value of every idempotent setting, replayed after the
//! daemon restarts.

use std::collections::BTreeMap;

use crate::message::{CacheKey, ConfigRequest};

#[derive(Debug, Default)]
pub(crate) struct ConfigCache {
    entries: BTreeMap<CacheKey, ConfigRequest>,
}

impl ConfigCache {
    /// Record `request` if it is cacheable. Returns whether it was stored.
    pub(crate) fn record(&mut self, request: &ConfigRequest) -> bool {
        match request.cache_key() {
            Some(key) => {
                self.entries.insert(key, request.clone());
                true
            }
            None => false,
        }
    }

    pub(crate) fn get(&self, key: &CacheKey) -> Option<&ConfigRequest> {
        self.entries.get(key)
    }

    pub(crate) fn keys(&self) -> Vec<CacheKey> {
        self.entries.keys().copied().collect()
    }

    /// Requests to replay after re-registration, in key order.
    pub(crate) fn replay(&self) -> Vec<ConfigRequest> {
        self.entries
            .iter()
            .filter(|(key, _)| key.category.is_resynced())
            .map(|(_, request)| request.clone())
            .collect()
    }
}
