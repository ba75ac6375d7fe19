//! The shipped VAT rule family: the `cart_calculate_vat` rules and the
//! context schema they validate against.

use std::sync::Arc;

use acted_storage::{MemoryRuleStore, RuleRecord, SchemaRecord};

use crate::error::VatError;

const RULES_JSON: &str = include_str!("../seed/vat_rules.json");
const SCHEMA_JSON: &str = include_str!("../seed/cart_vat_context_schema.json");

/// Schema every seeded rule references.
pub const CONTEXT_SCHEMA: &str = "cart_vat_context_schema";

pub fn seed_rules() -> Result<Vec<RuleRecord>, VatError> {
    serde_json::from_str(RULES_JSON).map_err(|e| VatError::Seed(format!("vat_rules.json: {}", e)))
}

pub fn seed_schemas() -> Result<Vec<SchemaRecord>, VatError> {
    let schema: SchemaRecord = serde_json::from_str(SCHEMA_JSON)
        .map_err(|e| VatError::Seed(format!("cart_vat_context_schema.json: {}", e)))?;
    Ok(vec![schema])
}

/// A rule store holding the seed schemas and rules.
pub fn seeded_store() -> Result<Arc<MemoryRuleStore>, VatError> {
    let store = MemoryRuleStore::from_records(seed_rules()?, seed_schemas()?)?;
    Ok(Arc::new(store))
}
