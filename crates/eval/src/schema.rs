//! Context validation against stored JSON Schema documents.
//!
//! Compiled validators are cached per `(fields_code, version)`; storing a
//! new schema version therefore compiles a fresh validator on first use.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use acted_storage::{RuleCatalog, SchemaRecord};

use crate::error::EvalError;

/// Upper bound on messages collected from one failed validation.
const MAX_MESSAGES: usize = 8;

#[derive(Default)]
pub struct SchemaRegistry {
    compiled: RwLock<HashMap<(String, i64), Arc<jsonschema::Validator>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate `instance` against the schema registered under `fields_code`.
    ///
    /// Fails with `SchemaNotFound` when the store has no active schema for
    /// the code, `SchemaCompile` when the document is not a valid schema,
    /// and `InvalidContext` carrying the validator's messages otherwise.
    pub fn validate(
        &self,
        catalog: &RuleCatalog,
        fields_code: &str,
        instance: &serde_json::Value,
    ) -> Result<(), EvalError> {
        let record = catalog
            .schema(fields_code)?
            .filter(|s| s.is_active)
            .ok_or_else(|| EvalError::SchemaNotFound {
                fields_code: fields_code.to_string(),
            })?;
        let validator = self.validator_for(&record)?;

        let messages: Vec<String> = validator
            .iter_errors(instance)
            .take(MAX_MESSAGES)
            .map(|e| format!("{}", e))
            .collect();
        if messages.is_empty() {
            Ok(())
        } else {
            Err(EvalError::InvalidContext {
                fields_code: fields_code.to_string(),
                message: messages.join("; "),
            })
        }
    }

    /// Compile a schema document without caching it. Used to vet schemas
    /// before they are stored.
    pub fn check(record: &SchemaRecord) -> Result<(), EvalError> {
        jsonschema::validator_for(&record.schema)
            .map(|_| ())
            .map_err(|e| EvalError::SchemaCompile {
                fields_code: record.fields_code.clone(),
                message: e.to_string(),
            })
    }

    fn validator_for(&self, record: &SchemaRecord) -> Result<Arc<jsonschema::Validator>, EvalError> {
        let key = (record.fields_code.clone(), record.version);
        if let Ok(compiled) = self.compiled.read() {
            if let Some(v) = compiled.get(&key) {
                return Ok(Arc::clone(v));
            }
        }

        let validator = jsonschema::validator_for(&record.schema).map_err(|e| {
            EvalError::SchemaCompile {
                fields_code: record.fields_code.clone(),
                message: e.to_string(),
            }
        })?;
        let validator = Arc::new(validator);
        tracing::debug!(fields_code = %record.fields_code, version = record.version, "compiled schema");

        match self.compiled.write() {
            Ok(mut compiled) => {
                compiled.insert(key, Arc::clone(&validator));
            }
            Err(_) => tracing::warn!("schema cache lock poisoned; validator not cached"),
        }
        Ok(validator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acted_storage::{MemoryRuleStore, StoreConfig};
    use serde_json::json;

    fn schema(version: i64, required: &[&str]) -> SchemaRecord {
        SchemaRecord {
            fields_code: "ctx".to_string(),
            name: "Context".to_string(),
            description: String::new(),
            schema: json!({
                "type": "object",
                "required": required,
            }),
            version,
            is_active: true,
        }
    }

    fn catalog(store: &Arc<MemoryRuleStore>) -> RuleCatalog {
        RuleCatalog::new(store.clone(), &StoreConfig::default())
    }

    #[test]
    fn valid_and_invalid_contexts() {
        let store = Arc::new(MemoryRuleStore::new());
        store.put_schema(schema(1, &["user"])).unwrap();
        let cat = catalog(&store);
        let reg = SchemaRegistry::new();

        assert!(reg.validate(&cat, "ctx", &json!({"user": {}})).is_ok());
        let err = reg.validate(&cat, "ctx", &json!({"cart": {}})).unwrap_err();
        match err {
            EvalError::InvalidContext { fields_code, message } => {
                assert_eq!(fields_code, "ctx");
                assert!(message.contains("user"), "{}", message);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn missing_schema() {
        let store = Arc::new(MemoryRuleStore::new());
        let cat = catalog(&store);
        let err = SchemaRegistry::new()
            .validate(&cat, "nope", &json!({}))
            .unwrap_err();
        assert_eq!(
            err,
            EvalError::SchemaNotFound {
                fields_code: "nope".to_string()
            }
        );
    }

    #[test]
    fn new_version_recompiles() {
        let store = Arc::new(MemoryRuleStore::new());
        store.put_schema(schema(1, &[])).unwrap();
        let cat = catalog(&store);
        let reg = SchemaRegistry::new();
        assert!(reg.validate(&cat, "ctx", &json!({})).is_ok());

        store.put_schema(schema(2, &["vat"])).unwrap();
        assert!(reg.validate(&cat, "ctx", &json!({})).is_err());
    }

    #[test]
    fn uncompilable_schema() {
        let mut bad = schema(1, &[]);
        bad.schema = json!({"type": 12});
        assert!(matches!(
            SchemaRegistry::check(&bad),
            Err(EvalError::SchemaCompile { .. })
        ));
    }
}
