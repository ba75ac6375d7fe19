//! The VAT result blob persisted on a cart.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VatStatus {
    Calculated,
    Error,
    NotCalculated,
}

/// Monetary fields serialize as decimal strings (`"20.00"`, rates `"0.2000"`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VatTotals {
    pub net: Decimal,
    pub vat: Decimal,
    pub gross: Decimal,
}

impl VatTotals {
    pub fn zero() -> Self {
        let zero = acted_eval::numeric::round_money(Decimal::ZERO);
        VatTotals {
            net: zero,
            vat: zero,
            gross: zero,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemVat {
    pub id: String,
    pub net_amount: Decimal,
    pub vat_rate: Decimal,
    pub vat_amount: Decimal,
    pub gross_amount: Decimal,
    /// The rule that last wrote `cart_item.vat_amount`.
    pub rule_applied: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exemption_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VatResult {
    pub status: VatStatus,
    pub region: Option<String>,
    pub totals: VatTotals,
    pub items: Vec<ItemVat>,
    pub execution_id: String,
    /// RFC 3339, UTC.
    pub timestamp: String,
    pub context_version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl VatResult {
    pub fn is_calculated(&self) -> bool {
        self.status == VatStatus::Calculated
    }

    /// An error- or not-calculated-shaped result with zero totals.
    pub fn empty(
        status: VatStatus,
        execution_id: String,
        timestamp: String,
        context_version: u32,
        error: Option<String>,
    ) -> Self {
        VatResult {
            status,
            region: None,
            totals: VatTotals::zero(),
            items: Vec::new(),
            execution_id,
            timestamp,
            context_version,
            error,
        }
    }
}
