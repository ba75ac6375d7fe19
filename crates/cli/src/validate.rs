//! Static checks over a rules file, without running anything.

use std::collections::{BTreeMap, BTreeSet};

use acted_eval::{Action, FunctionRegistry, Operand, Rule, SchemaRegistry, ENTRY_POINTS};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::documents::RuleBundle;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct Finding {
    pub subject: String,
    pub message: String,
}

impl Finding {
    fn new(subject: &str, message: impl Into<String>) -> Self {
        Finding {
            subject: subject.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub(crate) struct ValidationReport {
    pub rules: usize,
    pub schemas: usize,
    pub problems: Vec<Finding>,
    pub warnings: Vec<Finding>,
}

impl ValidationReport {
    pub(crate) fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

pub(crate) fn validate_bundle(bundle: &RuleBundle, functions: &FunctionRegistry) -> ValidationReport {
    let mut report = ValidationReport {
        rules: bundle.rules.len(),
        schemas: bundle.schemas.len(),
        ..ValidationReport::default()
    };

    let mut schema_versions = BTreeSet::new();
    for schema in &bundle.schemas {
        if !schema_versions.insert((schema.fields_code.as_str(), schema.version)) {
            report.problems.push(Finding::new(
                &schema.fields_code,
                format!("duplicate schema version {}", schema.version),
            ));
        }
        if let Err(e) = SchemaRegistry::check(schema) {
            report.problems.push(Finding::new(&schema.fields_code, e.to_string()));
        }
    }
    let known_schemas: BTreeSet<&str> = bundle
        .schemas
        .iter()
        .filter(|s| s.is_active)
        .map(|s| s.fields_code.as_str())
        .collect();

    let mut active_versions: BTreeMap<&str, usize> = BTreeMap::new();
    for record in &bundle.rules {
        let code = record.rule_code.as_str();
        if record.active {
            *active_versions.entry(code).or_default() += 1;
        }
        match Rule::from_record(record) {
            Ok(rule) => {
                for name in called_functions(&rule) {
                    if !functions.contains(name) {
                        report.warnings.push(Finding::new(
                            code,
                            format!(
                                "calls unregistered function '{}'; the action will be skipped (known: {})",
                                name,
                                functions.names().collect::<Vec<_>>().join(", ")
                            ),
                        ));
                    }
                }
            }
            Err(e) => report.problems.push(Finding::new(code, e.message)),
        }
        if !ENTRY_POINTS.contains(&record.entry_point.as_str()) {
            report.warnings.push(Finding::new(
                code,
                format!("entry point '{}' is not one the application calls", record.entry_point),
            ));
        }
        if let Some(fields_code) = &record.rules_fields_code {
            if bundle.schemas.is_empty() {
                report.warnings.push(Finding::new(
                    code,
                    format!("schema '{}' is not included in this file", fields_code),
                ));
            } else if !known_schemas.contains(fields_code.as_str()) {
                report.problems.push(Finding::new(
                    code,
                    format!("references unknown or inactive schema '{}'", fields_code),
                ));
            }
        }
        for (label, bound) in [
            ("active_from", &record.active_from),
            ("active_until", &record.active_until),
        ] {
            if let Some(raw) = bound {
                if OffsetDateTime::parse(raw, &Rfc3339).is_err() {
                    report.problems.push(Finding::new(
                        code,
                        format!("{} '{}' is not an RFC 3339 timestamp", label, raw),
                    ));
                }
            }
        }
    }
    for (code, count) in active_versions {
        if count > 1 {
            report.problems.push(Finding::new(
                code,
                format!("{} active versions; at most one may be active", count),
            ));
        }
    }
    report
}

/// Every function a rule names, in action order, without repeats.
fn called_functions(rule: &Rule) -> Vec<&str> {
    fn walk<'a>(op: &'a Operand, out: &mut Vec<&'a str>) {
        if let Operand::Call { function, params } = op {
            out.push(function.as_str());
            for (_, p) in params {
                walk(p, out);
            }
        }
    }

    let mut out: Vec<&str> = Vec::new();
    for action in &rule.actions {
        match action {
            Action::Set { value, .. } => walk(value, &mut out),
            Action::CalculateSum { value, .. } => {
                if let Some(v) = value {
                    walk(v, &mut out);
                }
            }
            Action::CallFunction { function, args, .. } => {
                out.push(function.as_str());
                for a in args {
                    walk(a, &mut out);
                }
            }
            Action::CallRule { .. } | Action::Unsupported { .. } => {}
        }
    }
    let mut seen = BTreeSet::new();
    out.retain(|name| seen.insert(*name));
    out
}
