//! Storage seams for the acted rules engine: the rule/schema catalog the
//! engine reads from, the append-only audit sink and the per-cart VAT slot
//! the orchestrator writes to.

mod catalog;
mod error;
mod memory;
mod record;
mod traits;

pub use catalog::{RuleCatalog, StoreConfig};
pub use error::StorageError;
pub use memory::{ChangeHook, MemoryAuditLog, MemoryRuleStore, MemoryVatCache};
pub use record::{AuditRecord, CachedVat, RuleRecord, SchemaRecord};
pub use traits::{AppendOutcome, AuditSink, RuleStore, VatCache};
