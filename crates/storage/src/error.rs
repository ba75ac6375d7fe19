/// All errors that can be returned by a store, sink or cache implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A rule or schema record violates a definition invariant and was
    /// rejected before it reached the store.
    #[error("invalid record '{code}': {message}")]
    InvalidRecord { code: String, message: String },

    /// A schema version that an active rule references cannot be replaced
    /// in place; publish a new version or a new `fields_code` instead.
    #[error("schema {fields_code} v{version} is referenced by active rule '{rule_code}'")]
    SchemaInUse {
        fields_code: String,
        version: i64,
        rule_code: String,
    },

    /// Cart not known to the cart store.
    #[error("cart not found: {cart_id}")]
    CartNotFound { cart_id: String },

    /// Cart item not known to the cart store.
    #[error("cart item not found: {cart_id}/{item_id}")]
    ItemNotFound { cart_id: String, item_id: String },

    /// A backend-specific storage error (lock poisoning, I/O, serialization).
    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StorageError {
    pub(crate) fn poisoned(what: &str) -> Self {
        StorageError::Backend(format!("{} lock poisoned", what))
    }
}
