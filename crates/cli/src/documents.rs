//! Rule files on disk.
//!
//! A rules file is either a bare array of rule records or an object with
//! `rules` and `schemas` arrays (the shape `acted seed` prints).

use std::path::Path;

use acted_storage::{RuleRecord, SchemaRecord};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct RuleBundle {
    pub rules: Vec<RuleRecord>,
    #[serde(default)]
    pub schemas: Vec<SchemaRecord>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RulesDocument {
    Bundle(RuleBundle),
    Rules(Vec<RuleRecord>),
}

impl From<RulesDocument> for RuleBundle {
    fn from(doc: RulesDocument) -> Self {
        match doc {
            RulesDocument::Bundle(bundle) => bundle,
            RulesDocument::Rules(rules) => RuleBundle {
                rules,
                schemas: Vec::new(),
            },
        }
    }
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T, String> {
    let text = std::fs::read_to_string(path)
        .map_err(|_| format!("error: {} file not found: {}", what, path.display()))?;
    serde_json::from_str(&text).map_err(|e| format!("error: invalid JSON in {}: {}", path.display(), e))
}

pub(crate) fn load_rules(path: &Path) -> Result<RuleBundle, String> {
    let doc: RulesDocument = read_json(path, "rules")?;
    Ok(doc.into())
}
