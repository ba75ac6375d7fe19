//! Building the per-item execution context the VAT rules read.

use std::collections::BTreeMap;

use acted_eval::functions::classify;
use acted_eval::numeric::{round_money, round_rate};
use acted_eval::{ExecutionContext, Value};
use rust_decimal::Decimal;

use crate::cart::{Cart, CartItem};
use crate::error::VatError;

/// Inputs shared by every item of one calculation.
#[derive(Debug, Clone)]
pub struct UserContext {
    pub user_id: Option<String>,
    pub country_code: String,
    /// RFC 3339 instant exposed as `settings.effective_date`.
    pub effective_date: String,
    pub context_version: u32,
}

fn map(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect::<BTreeMap<_, _>>(),
    )
}

fn opt_text(s: Option<&str>) -> Value {
    s.map(Value::text).unwrap_or(Value::Null)
}

/// `actual_price × quantity` at 2 dp.
pub fn net_amount(item: &CartItem) -> Result<Decimal, VatError> {
    item.actual_price
        .checked_mul(Decimal::from(item.quantity))
        .map(round_money)
        .ok_or_else(|| VatError::Amount {
            item_id: item.id.clone(),
            message: "price × quantity overflows".to_string(),
        })
}

/// The `{user, cart, cart_item, vat, settings}` context for one item.
pub fn item_context(user: &UserContext, cart: &Cart, item: &CartItem) -> Result<ExecutionContext, VatError> {
    let net = net_amount(item)?;
    let metadata = Value::from_json(&item.metadata);
    let classification = classify(item.product_code.as_deref(), &metadata);

    let mut root = BTreeMap::new();
    root.insert(
        "user".to_string(),
        map(vec![
            ("id", opt_text(user.user_id.as_deref())),
            ("country_code", Value::text(user.country_code.clone())),
        ]),
    );
    root.insert("cart".to_string(), map(vec![("id", Value::text(cart.id.clone()))]));
    root.insert(
        "cart_item".to_string(),
        map(vec![
            ("id", Value::text(item.id.clone())),
            ("product_code", opt_text(item.product_code.as_deref())),
            ("product_type", Value::text(classification.product_type().as_str())),
            ("quantity", Value::Int(i64::from(item.quantity))),
            ("net_amount", Value::Decimal(net)),
            ("vat_amount", Value::Decimal(round_money(Decimal::ZERO))),
            ("vat_rate", Value::Decimal(round_rate(Decimal::ZERO))),
            ("gross_amount", Value::Decimal(net)),
            ("classification", classification.to_value()),
        ]),
    );
    root.insert(
        "vat".to_string(),
        map(vec![
            ("region", Value::Null),
            ("rate", Value::Null),
            ("amount", Value::Null),
        ]),
    );
    root.insert(
        "settings".to_string(),
        map(vec![
            ("effective_date", Value::text(user.effective_date.clone())),
            ("context_version", Value::Int(i64::from(user.context_version))),
        ]),
    );
    Ok(ExecutionContext::from_map(root))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user() -> UserContext {
        UserContext {
            user_id: Some("u1".to_string()),
            country_code: "GB".to_string(),
            effective_date: "2025-03-01T00:00:00Z".to_string(),
            context_version: 1,
        }
    }

    fn item(price: i64, qty: u32, metadata: serde_json::Value) -> CartItem {
        CartItem {
            id: "i1".to_string(),
            product_code: Some("CB1/P".to_string()),
            actual_price: Decimal::new(price, 2),
            quantity: qty,
            metadata,
        }
    }

    #[test]
    fn builds_the_documented_shape() {
        let ctx = item_context(&user(), &Cart::new("c1"), &item(10000, 3, json!({}))).unwrap();
        assert_eq!(ctx.lookup("user.country_code"), Value::text("GB"));
        assert_eq!(ctx.lookup("cart.id"), Value::text("c1"));
        assert_eq!(ctx.lookup("cart_item.net_amount").to_string(), "300.00");
        assert_eq!(ctx.lookup("cart_item.gross_amount").to_string(), "300.00");
        assert_eq!(ctx.lookup("cart_item.vat_rate").to_string(), "0.0000");
        assert_eq!(ctx.lookup("cart_item.product_type"), Value::text("Printed"));
        assert_eq!(ctx.lookup("cart_item.classification.is_printed"), Value::Bool(true));
        assert_eq!(ctx.lookup("vat.region"), Value::Null);
        assert_eq!(ctx.lookup("settings.context_version"), Value::Int(1));
    }

    #[test]
    fn explicit_product_type_wins() {
        let ctx = item_context(
            &user(),
            &Cart::new("c1"),
            &item(100, 1, json!({"product_type": "Tutorial"})),
        )
        .unwrap();
        assert_eq!(ctx.lookup("cart_item.product_type"), Value::text("Tutorial"));
    }

    #[test]
    fn net_amount_rounds_to_pennies() {
        let i = CartItem {
            actual_price: "3.333".parse().unwrap(),
            ..item(0, 3, json!({}))
        };
        assert_eq!(net_amount(&i).unwrap().to_string(), "10.00");
    }
}
