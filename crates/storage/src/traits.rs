use std::sync::Arc;

use crate::error::StorageError;
use crate::record::{AuditRecord, CachedVat, RuleRecord, SchemaRecord};

/// Read side of the rule/schema catalog.
///
/// Implementations are queried at defined points only (rule fetch at the
/// start of an engine run, schema fetch before validation) and must be
/// `Send + Sync` so one store can back concurrent cart evaluations.
pub trait RuleStore: Send + Sync {
    /// Every record registered at `entry_point` with `active = true`,
    /// in no particular order. Activation windows are applied by the caller.
    fn rules_for(&self, entry_point: &str) -> Result<Vec<RuleRecord>, StorageError>;

    /// The active record for `rule_code`, if any.
    fn rule_by_code(&self, rule_code: &str) -> Result<Option<RuleRecord>, StorageError>;

    /// The schema registered under `fields_code`, if any.
    fn schema_for(&self, fields_code: &str) -> Result<Option<SchemaRecord>, StorageError>;
}

/// Outcome of an audit append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Inserted,
    /// A record with the same `execution_id` already exists; nothing written.
    Duplicate,
}

/// Append-only audit log.
pub trait AuditSink: Send + Sync {
    fn append(&self, record: AuditRecord) -> Result<AppendOutcome, StorageError>;
}

/// The VAT slot persisted on each cart, keyed by cart id.
pub trait VatCache: Send + Sync {
    /// Current slot contents; an unknown cart reads as an empty slot.
    fn read(&self, cart_id: &str) -> Result<CachedVat, StorageError>;

    fn write(&self, cart_id: &str, value: CachedVat) -> Result<(), StorageError>;

    /// Null out `vat_result` and `vat_last_calculated_at`.
    fn clear(&self, cart_id: &str) -> Result<(), StorageError>;
}

impl<T: RuleStore + ?Sized> RuleStore for Arc<T> {
    fn rules_for(&self, entry_point: &str) -> Result<Vec<RuleRecord>, StorageError> {
        (**self).rules_for(entry_point)
    }

    fn rule_by_code(&self, rule_code: &str) -> Result<Option<RuleRecord>, StorageError> {
        (**self).rule_by_code(rule_code)
    }

    fn schema_for(&self, fields_code: &str) -> Result<Option<SchemaRecord>, StorageError> {
        (**self).schema_for(fields_code)
    }
}

impl<T: AuditSink + ?Sized> AuditSink for Arc<T> {
    fn append(&self, record: AuditRecord) -> Result<AppendOutcome, StorageError> {
        (**self).append(record)
    }
}

impl<T: VatCache + ?Sized> VatCache for Arc<T> {
    fn read(&self, cart_id: &str) -> Result<CachedVat, StorageError> {
        (**self).read(cart_id)
    }

    fn write(&self, cart_id: &str, value: CachedVat) -> Result<(), StorageError> {
        (**self).write(cart_id, value)
    }

    fn clear(&self, cart_id: &str) -> Result<(), StorageError> {
        (**self).clear(cart_id)
    }
}
