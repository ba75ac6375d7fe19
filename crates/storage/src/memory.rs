//! In-memory backends: rule/schema catalog, audit log and VAT cache slot.
//!
//! These back the CLI and the test suites. Every lock is taken for the
//! duration of one call only; a poisoned lock surfaces as
//! `StorageError::Backend` rather than a panic.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, RwLock};

use crate::error::StorageError;
use crate::record::{AuditRecord, CachedVat, RuleRecord, SchemaRecord};
use crate::traits::{AppendOutcome, AuditSink, RuleStore, VatCache};

/// Callback fired with an entry point whenever a write changes the rules
/// registered there.
pub type ChangeHook = Box<dyn Fn(&str) + Send + Sync>;

// ──────────────────────────────────────────────
// Rule / schema catalog
// ──────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryRuleStore {
    rules: RwLock<Vec<RuleRecord>>,
    schemas: RwLock<BTreeMap<String, SchemaRecord>>,
    hooks: RwLock<Vec<ChangeHook>>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from a batch of records, applying the same checks as
    /// individual writes. Schemas are loaded first so rule references resolve.
    pub fn from_records(
        rules: Vec<RuleRecord>,
        schemas: Vec<SchemaRecord>,
    ) -> Result<Self, StorageError> {
        let store = Self::new();
        for schema in schemas {
            store.put_schema(schema)?;
        }
        for rule in rules {
            store.put_rule(rule)?;
        }
        Ok(store)
    }

    /// Register a hook fired after every rule write.
    pub fn on_change(&self, hook: ChangeHook) -> Result<(), StorageError> {
        self.hooks
            .write()
            .map_err(|_| StorageError::poisoned("hooks"))?
            .push(hook);
        Ok(())
    }

    /// Insert or replace a rule version.
    ///
    /// Writing an active version deactivates every other version of the same
    /// `rule_code`, so at most one version is active at a time.
    pub fn put_rule(&self, record: RuleRecord) -> Result<(), StorageError> {
        record
            .check_definition()
            .map_err(|message| StorageError::InvalidRecord {
                code: record.rule_code.clone(),
                message,
            })?;

        let mut touched = vec![record.entry_point.clone()];
        {
            let mut rules = self
                .rules
                .write()
                .map_err(|_| StorageError::poisoned("rules"))?;
            if record.active {
                for other in rules.iter_mut().filter(|r| {
                    r.rule_code == record.rule_code && r.version != record.version && r.active
                }) {
                    other.active = false;
                    touched.push(other.entry_point.clone());
                }
            }
            let slot = rules
                .iter_mut()
                .find(|r| r.rule_code == record.rule_code && r.version == record.version);
            match slot {
                Some(existing) => {
                    touched.push(existing.entry_point.clone());
                    *existing = record;
                }
                None => rules.push(record),
            }
        }

        touched.sort();
        touched.dedup();
        self.notify(&touched)
    }

    /// Deactivate every version of `rule_code`. Returns whether anything changed.
    pub fn deactivate(&self, rule_code: &str) -> Result<bool, StorageError> {
        let mut touched = Vec::new();
        {
            let mut rules = self
                .rules
                .write()
                .map_err(|_| StorageError::poisoned("rules"))?;
            for r in rules
                .iter_mut()
                .filter(|r| r.rule_code == rule_code && r.active)
            {
                r.active = false;
                touched.push(r.entry_point.clone());
            }
        }
        let changed = !touched.is_empty();
        touched.sort();
        touched.dedup();
        self.notify(&touched)?;
        Ok(changed)
    }

    /// Insert a schema, or a newer version of one.
    ///
    /// Replacing the content of a version already referenced by an active
    /// rule is refused.
    pub fn put_schema(&self, record: SchemaRecord) -> Result<(), StorageError> {
        if !record.schema.is_object() && !record.schema.is_boolean() {
            return Err(StorageError::InvalidRecord {
                code: record.fields_code.clone(),
                message: "schema must be a JSON object or boolean".to_string(),
            });
        }

        let mut schemas = self
            .schemas
            .write()
            .map_err(|_| StorageError::poisoned("schemas"))?;
        if let Some(existing) = schemas.get(&record.fields_code) {
            if existing.version == record.version && existing.schema != record.schema {
                let rules = self
                    .rules
                    .read()
                    .map_err(|_| StorageError::poisoned("rules"))?;
                let referencing = rules.iter().find(|r| {
                    r.active && r.rules_fields_code.as_deref() == Some(record.fields_code.as_str())
                });
                if let Some(rule) = referencing {
                    return Err(StorageError::SchemaInUse {
                        fields_code: record.fields_code.clone(),
                        version: record.version,
                        rule_code: rule.rule_code.clone(),
                    });
                }
            }
            if existing.version > record.version {
                return Err(StorageError::InvalidRecord {
                    code: record.fields_code.clone(),
                    message: format!(
                        "version {} is older than stored version {}",
                        record.version, existing.version
                    ),
                });
            }
        }
        schemas.insert(record.fields_code.clone(), record);
        Ok(())
    }

    fn notify(&self, entry_points: &[String]) -> Result<(), StorageError> {
        let hooks = self
            .hooks
            .read()
            .map_err(|_| StorageError::poisoned("hooks"))?;
        for ep in entry_points {
            for hook in hooks.iter() {
                hook(ep);
            }
        }
        Ok(())
    }
}

impl RuleStore for MemoryRuleStore {
    fn rules_for(&self, entry_point: &str) -> Result<Vec<RuleRecord>, StorageError> {
        let rules = self
            .rules
            .read()
            .map_err(|_| StorageError::poisoned("rules"))?;
        Ok(rules
            .iter()
            .filter(|r| r.active && r.entry_point == entry_point)
            .cloned()
            .collect())
    }

    fn rule_by_code(&self, rule_code: &str) -> Result<Option<RuleRecord>, StorageError> {
        let rules = self
            .rules
            .read()
            .map_err(|_| StorageError::poisoned("rules"))?;
        Ok(rules
            .iter()
            .find(|r| r.active && r.rule_code == rule_code)
            .cloned())
    }

    fn schema_for(&self, fields_code: &str) -> Result<Option<SchemaRecord>, StorageError> {
        let schemas = self
            .schemas
            .read()
            .map_err(|_| StorageError::poisoned("schemas"))?;
        Ok(schemas.get(fields_code).cloned())
    }
}

// ──────────────────────────────────────────────
// Audit log
// ──────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every record in insertion order.
    pub fn records(&self) -> Result<Vec<AuditRecord>, StorageError> {
        Ok(self
            .records
            .lock()
            .map_err(|_| StorageError::poisoned("audit"))?
            .clone())
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditLog {
    fn append(&self, record: AuditRecord) -> Result<AppendOutcome, StorageError> {
        let mut records = self
            .records
            .lock()
            .map_err(|_| StorageError::poisoned("audit"))?;
        if records
            .iter()
            .any(|r| r.execution_id == record.execution_id)
        {
            return Ok(AppendOutcome::Duplicate);
        }
        records.push(record);
        Ok(AppendOutcome::Inserted)
    }
}

// ──────────────────────────────────────────────
// VAT cache slot
// ──────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryVatCache {
    slots: Mutex<HashMap<String, CachedVat>>,
}

impl MemoryVatCache {
    pub fn new() -> Self {
        Self::default()
    }
}

impl VatCache for MemoryVatCache {
    fn read(&self, cart_id: &str) -> Result<CachedVat, StorageError> {
        let slots = self
            .slots
            .lock()
            .map_err(|_| StorageError::poisoned("vat cache"))?;
        Ok(slots.get(cart_id).cloned().unwrap_or_default())
    }

    fn write(&self, cart_id: &str, value: CachedVat) -> Result<(), StorageError> {
        self.slots
            .lock()
            .map_err(|_| StorageError::poisoned("vat cache"))?
            .insert(cart_id.to_string(), value);
        Ok(())
    }

    fn clear(&self, cart_id: &str) -> Result<(), StorageError> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| StorageError::poisoned("vat cache"))?;
        if let Some(slot) = slots.get_mut(cart_id) {
            slot.vat_result = None;
            slot.vat_last_calculated_at = None;
        }
        Ok(())
    }
}
