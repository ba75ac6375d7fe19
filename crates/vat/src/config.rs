use serde::Deserialize;

/// Orchestrator settings (`[vat]` in `acted.toml`).
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct VatConfig {
    /// Entry point evaluated once per cart item.
    pub entry_point: String,
    /// Country used when the cart has no saved address and no override.
    pub default_country: String,
    /// Written to `settings.context_version` and to the cached blob.
    pub context_version: u32,
}

impl Default for VatConfig {
    fn default() -> Self {
        VatConfig {
            entry_point: "cart_calculate_vat".to_string(),
            default_country: "GB".to_string(),
            context_version: 1,
        }
    }
}
