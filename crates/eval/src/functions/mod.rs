//! Whitelisted functions callable from `call_function` actions and
//! `{"function": ..}` operands.
//!
//! Functions are registered explicitly at startup under a name with a
//! fixed parameter list. They take resolved arguments and return a value;
//! there is no reflection and no I/O beyond the static tables in
//! [`region`].

pub mod classify;
pub mod region;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;

use crate::error::FunctionError;
use crate::numeric;
use crate::value::Value;

pub use classify::{classify, Classification, ProductType};
pub use region::{region_for_country, vat_rate_for_country, Region};

pub type FunctionResult = Result<Value, FunctionError>;

type Callable = Arc<dyn Fn(&[Value]) -> FunctionResult + Send + Sync>;

#[derive(Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<String>,
    call: Callable,
}

impl fmt::Debug for FunctionDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionDef")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// Why a call through the registry did not produce a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    Unknown(String),
    Failed(FunctionError),
}

#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: BTreeMap<String, FunctionDef>,
}

impl FunctionRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The registry with every built-in VAT function.
    pub fn with_builtins() -> Self {
        let mut r = Self::new();
        r.register("lookup_region", &["country_code"], lookup_region);
        r.register("map_country_to_region", &["country_code"], lookup_region);
        r.register("lookup_vat_rate", &["country_code"], lookup_vat_rate);
        r.register("get_vat_rate", &["region", "classification"], get_vat_rate);
        r.register(
            "calculate_vat_amount",
            &["net_amount", "vat_rate"],
            calculate_vat_amount,
        );
        r.register("add_decimals", &["a", "b"], add_decimals);
        r.register("sum_decimals", &["values"], sum_decimals);
        r.register(
            "classify_product",
            &["product_code", "metadata"],
            classify_product,
        );
        r
    }

    /// Register (or replace) a function.
    pub fn register<F>(&mut self, name: &str, params: &[&str], f: F)
    where
        F: Fn(&[Value]) -> FunctionResult + Send + Sync + 'static,
    {
        self.functions.insert(
            name.to_string(),
            FunctionDef {
                name: name.to_string(),
                params: params.iter().map(|p| p.to_string()).collect(),
                call: Arc::new(f),
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.keys().map(String::as_str)
    }

    /// Call with positional arguments. The argument count must match the
    /// declared parameter list.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, CallError> {
        let def = self
            .functions
            .get(name)
            .ok_or_else(|| CallError::Unknown(name.to_string()))?;
        if args.len() != def.params.len() {
            return Err(CallError::Failed(FunctionError::Arity {
                function: name.to_string(),
                expected: def.params.len(),
                got: args.len(),
            }));
        }
        (def.call)(args).map_err(CallError::Failed)
    }

    /// Call with named arguments, mapped onto the declared parameter list.
    /// Missing parameters are passed as `Null`; unknown names are rejected.
    pub fn call_named(&self, name: &str, params: &[(String, Value)]) -> Result<Value, CallError> {
        let def = self
            .functions
            .get(name)
            .ok_or_else(|| CallError::Unknown(name.to_string()))?;
        if let Some((unknown, _)) = params.iter().find(|(k, _)| !def.params.contains(k)) {
            return Err(CallError::Failed(FunctionError::invalid(
                name,
                format!("unknown parameter '{}'", unknown),
            )));
        }
        let args: Vec<Value> = def
            .params
            .iter()
            .map(|p| {
                params
                    .iter()
                    .find(|(k, _)| k == p)
                    .map(|(_, v)| v.clone())
                    .unwrap_or(Value::Null)
            })
            .collect();
        (def.call)(&args).map_err(CallError::Failed)
    }
}

// ──────────────────────────────────────────────
// Built-ins
// ──────────────────────────────────────────────

fn decimal_arg(function: &str, param: &str, v: &Value) -> Result<Decimal, FunctionError> {
    numeric::to_decimal(v).ok_or_else(|| {
        FunctionError::invalid(
            function,
            format!("'{}' must be a decimal, got {}", param, v.type_name()),
        )
    })
}

fn lookup_region(args: &[Value]) -> FunctionResult {
    let region = match args.first().and_then(Value::as_str) {
        Some(code) => region_for_country(code),
        None => Region::Row,
    };
    Ok(Value::text(region.as_str()))
}

fn lookup_vat_rate(args: &[Value]) -> FunctionResult {
    let rate = match args.first().and_then(Value::as_str) {
        Some(code) => vat_rate_for_country(code),
        None => numeric::round_rate(Decimal::ZERO),
    };
    Ok(Value::Decimal(rate))
}

/// Regional default rate for a product classification.
fn get_vat_rate(args: &[Value]) -> FunctionResult {
    let region = args
        .first()
        .and_then(Value::as_str)
        .and_then(|r| r.parse::<Region>().ok())
        .unwrap_or(Region::Row);
    let classification = Classification::from_value(args.get(1).unwrap_or(&Value::Null));
    let zero_rated_material =
        classification.is_printed || classification.is_flash_card || classification.is_pbor;
    let bp = match region {
        Region::Uk if zero_rated_material => 0,
        Region::Uk => 2000,
        Region::Ie => 2300,
        Region::Sa => 1500,
        Region::Eu | Region::Row => 0,
    };
    Ok(Value::Decimal(numeric::round_rate(Decimal::new(bp, 4))))
}

fn calculate_vat_amount(args: &[Value]) -> FunctionResult {
    const NAME: &str = "calculate_vat_amount";
    let net = decimal_arg(NAME, "net_amount", &args[0])?;
    let rate = decimal_arg(NAME, "vat_rate", &args[1])?;
    let amount = net.checked_mul(rate).ok_or_else(|| FunctionError::Overflow {
        function: NAME.to_string(),
    })?;
    Ok(Value::Decimal(numeric::round_money(amount)))
}

fn add_decimals(args: &[Value]) -> FunctionResult {
    const NAME: &str = "add_decimals";
    let a = decimal_arg(NAME, "a", &args[0])?;
    let b = decimal_arg(NAME, "b", &args[1])?;
    let sum = a.checked_add(b).ok_or_else(|| FunctionError::Overflow {
        function: NAME.to_string(),
    })?;
    Ok(Value::Decimal(numeric::round_money(sum)))
}

fn sum_decimals(args: &[Value]) -> FunctionResult {
    const NAME: &str = "sum_decimals";
    let items = match &args[0] {
        Value::List(items) => items,
        Value::Null => return Ok(Value::Decimal(numeric::round_money(Decimal::ZERO))),
        other => {
            return Err(FunctionError::invalid(
                NAME,
                format!("'values' must be a list, got {}", other.type_name()),
            ))
        }
    };
    let mut total = Decimal::ZERO;
    for item in items {
        let d = decimal_arg(NAME, "values[]", item)?;
        total = total.checked_add(d).ok_or_else(|| FunctionError::Overflow {
            function: NAME.to_string(),
        })?;
    }
    Ok(Value::Decimal(numeric::round_money(total)))
}

fn classify_product(args: &[Value]) -> FunctionResult {
    let code = args.first().and_then(Value::as_str);
    let metadata = args.get(1).unwrap_or(&Value::Null);
    Ok(classify(code, metadata).to_value())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::str::FromStr;

    fn dec(s: &str) -> Value {
        Value::Decimal(Decimal::from_str(s).unwrap())
    }

    fn registry() -> FunctionRegistry {
        FunctionRegistry::with_builtins()
    }

    #[test]
    fn region_lookup_and_alias() {
        let r = registry();
        assert_eq!(r.call("lookup_region", &[Value::text("GB")]).unwrap(), Value::text("UK"));
        assert_eq!(
            r.call("map_country_to_region", &[Value::text("FR")]).unwrap(),
            Value::text("EU")
        );
        assert_eq!(r.call("lookup_region", &[Value::Null]).unwrap(), Value::text("ROW"));
    }

    #[test]
    fn vat_rate_lookup() {
        let r = registry();
        assert_eq!(r.call("lookup_vat_rate", &[Value::text("GB")]).unwrap(), dec("0.2000"));
        assert_eq!(r.call("lookup_vat_rate", &[Value::text("XX")]).unwrap(), dec("0.00"));
    }

    #[test]
    fn regional_defaults_by_classification() {
        let r = registry();
        let printed = Value::from_json(&json!({"is_printed": true}));
        let digital = Value::from_json(&json!({"is_digital": true}));
        assert_eq!(
            r.call("get_vat_rate", &[Value::text("UK"), printed]).unwrap(),
            dec("0")
        );
        assert_eq!(
            r.call("get_vat_rate", &[Value::text("UK"), digital.clone()]).unwrap(),
            dec("0.20")
        );
        assert_eq!(
            r.call("get_vat_rate", &[Value::text("SA"), digital]).unwrap(),
            dec("0.15")
        );
    }

    #[test]
    fn vat_amount_rounds_half_up() {
        let r = registry();
        let v = r
            .call("calculate_vat_amount", &[dec("10.125"), dec("0.20")])
            .unwrap();
        assert_eq!(v.to_string(), "2.03");
        let v = r
            .call("calculate_vat_amount", &[Value::text("100.00"), dec("0.2000")])
            .unwrap();
        assert_eq!(v, dec("20.00"));
    }

    #[test]
    fn add_and_sum() {
        let r = registry();
        assert_eq!(r.call("add_decimals", &[dec("100.00"), dec("20.00")]).unwrap(), dec("120.00"));
        let list = Value::List(vec![dec("1.10"), Value::Int(2), Value::text("0.05")]);
        assert_eq!(r.call("sum_decimals", &[list]).unwrap(), dec("3.15"));
    }

    #[test]
    fn bad_arguments_raise() {
        let r = registry();
        assert!(matches!(
            r.call("calculate_vat_amount", &[Value::Null, dec("0.2")]),
            Err(CallError::Failed(FunctionError::InvalidArgument { .. }))
        ));
        assert!(matches!(
            r.call("add_decimals", &[dec("1")]),
            Err(CallError::Failed(FunctionError::Arity { expected: 2, got: 1, .. }))
        ));
        assert_eq!(
            r.call("does_not_exist", &[]),
            Err(CallError::Unknown("does_not_exist".to_string()))
        );
    }

    #[test]
    fn named_parameters() {
        let r = registry();
        let v = r
            .call_named(
                "calculate_vat_amount",
                &[
                    ("vat_rate".to_string(), dec("0.15")),
                    ("net_amount".to_string(), dec("200.00")),
                ],
            )
            .unwrap();
        assert_eq!(v, dec("30.00"));
        assert!(r
            .call_named("add_decimals", &[("c".to_string(), dec("1"))])
            .is_err());
    }

    #[test]
    fn custom_registration() {
        let mut r = FunctionRegistry::new();
        r.register("always_fails", &[], |_| {
            Err(FunctionError::Failed {
                function: "always_fails".to_string(),
                message: "boom".to_string(),
            })
        });
        assert!(r.contains("always_fails"));
        assert!(!r.contains("lookup_region"));
        assert!(matches!(r.call("always_fails", &[]), Err(CallError::Failed(_))));
    }
}
