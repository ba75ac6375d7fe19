use acted_eval::EvalError;
use acted_storage::StorageError;

/// Failures of one VAT calculation. Every variant ends up as an
/// error-shaped `VatResult`; none of them escapes the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum VatError {
    #[error("engine failed for item {item_id}: {source}")]
    Engine {
        item_id: String,
        #[source]
        source: EvalError,
    },

    #[error("rule '{rule_code}' failed for item {item_id}: {message}")]
    RuleFailed {
        item_id: String,
        rule_code: String,
        message: String,
    },

    #[error("invalid amount for item {item_id}: {message}")]
    Amount { item_id: String, message: String },

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("seed data is malformed: {0}")]
    Seed(String),
}
