//! Cached, ordered view over a [`RuleStore`].
//!
//! Each entry point's active rules are fetched once, sorted by
//! `(priority, rule_code)` and kept as an immutable `Arc` slice. A reload
//! swaps the whole slice, so readers never observe a partially updated list.
//! Entries expire after the configured TTL or when invalidated by a rule
//! write.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};
use std::time::{Duration, Instant};

use serde::Deserialize;
use time::OffsetDateTime;

use crate::error::StorageError;
use crate::memory::ChangeHook;
use crate::record::{RuleRecord, SchemaRecord};
use crate::traits::RuleStore;

/// Rule catalog cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Seconds a cached rule list stays valid without an explicit reload.
    pub ttl_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig { ttl_secs: 300 }
    }
}

struct CachedList {
    loaded_at: Instant,
    rules: Arc<[Arc<RuleRecord>]>,
}

pub struct RuleCatalog {
    backend: Arc<dyn RuleStore>,
    ttl: Duration,
    lists: RwLock<HashMap<String, CachedList>>,
}

impl RuleCatalog {
    pub fn new(backend: Arc<dyn RuleStore>, config: &StoreConfig) -> Self {
        RuleCatalog {
            backend,
            ttl: Duration::from_secs(config.ttl_secs),
            lists: RwLock::new(HashMap::new()),
        }
    }

    /// Rules at `entry_point` selectable at `now`, ordered by priority
    /// ascending with ties broken by `rule_code` ascending.
    pub fn applicable(
        &self,
        entry_point: &str,
        now: OffsetDateTime,
    ) -> Result<Vec<Arc<RuleRecord>>, StorageError> {
        let ordered = self.ordered(entry_point)?;
        Ok(ordered
            .iter()
            .filter(|r| r.is_active_at(now))
            .cloned()
            .collect())
    }

    pub fn rule(&self, rule_code: &str) -> Result<Option<RuleRecord>, StorageError> {
        self.backend.rule_by_code(rule_code)
    }

    pub fn schema(&self, fields_code: &str) -> Result<Option<SchemaRecord>, StorageError> {
        self.backend.schema_for(fields_code)
    }

    /// Drop the cached list for one entry point, or for all of them.
    pub fn invalidate(&self, entry_point: Option<&str>) {
        match self.lists.write() {
            Ok(mut lists) => match entry_point {
                Some(ep) => {
                    lists.remove(ep);
                }
                None => lists.clear(),
            },
            Err(_) => tracing::warn!("rule catalog lock poisoned; invalidation skipped"),
        }
    }

    /// A hook suitable for [`MemoryRuleStore::on_change`](crate::MemoryRuleStore::on_change).
    /// Holds only a weak reference, so the catalog can be dropped freely.
    pub fn invalidation_hook(self: &Arc<Self>) -> ChangeHook {
        let weak: Weak<RuleCatalog> = Arc::downgrade(self);
        Box::new(move |entry_point: &str| {
            if let Some(catalog) = weak.upgrade() {
                tracing::debug!(entry_point, "rule write; invalidating cached list");
                catalog.invalidate(Some(entry_point));
            }
        })
    }

    fn ordered(&self, entry_point: &str) -> Result<Arc<[Arc<RuleRecord>]>, StorageError> {
        {
            let lists = self
                .lists
                .read()
                .map_err(|_| StorageError::poisoned("rule catalog"))?;
            if let Some(cached) = lists.get(entry_point) {
                if cached.loaded_at.elapsed() < self.ttl {
                    return Ok(Arc::clone(&cached.rules));
                }
            }
        }

        let mut records = self.backend.rules_for(entry_point)?;
        records.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.rule_code.cmp(&b.rule_code))
        });
        let rules: Arc<[Arc<RuleRecord>]> = records.into_iter().map(Arc::new).collect();
        tracing::debug!(entry_point, count = rules.len(), "loaded rule list");

        self.lists
            .write()
            .map_err(|_| StorageError::poisoned("rule catalog"))?
            .insert(
                entry_point.to_string(),
                CachedList {
                    loaded_at: Instant::now(),
                    rules: Arc::clone(&rules),
                },
            );
        Ok(rules)
    }
}
