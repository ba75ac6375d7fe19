//! The VAT orchestrator: one engine run per cart item, aggregated into a
//! `VatResult` that is cached on the cart and recorded in the audit log.

use std::sync::Arc;

use acted_eval::functions::region_for_country;
use acted_eval::numeric::{round_money, round_rate, to_decimal};
use acted_eval::{ExecutionContext, RuleEngine, RuleTrace};
use acted_storage::{AppendOutcome, AuditRecord, AuditSink, CachedVat, VatCache};
use rust_decimal::Decimal;
use serde_json::json;
use uuid::Uuid;

use crate::cart::{AddressBook, Cart, CartItem, MemoryCartStore};
use crate::clock::{rfc3339, CancelToken, Clock};
use crate::config::VatConfig;
use crate::context::{item_context, UserContext};
use crate::error::VatError;
use crate::result::{ItemVat, VatResult, VatStatus, VatTotals};

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct VatRequest {
    /// Ignore any cached result and always run the pipeline.
    pub force: bool,
    /// Used when the cart owner has no saved address.
    pub country_code_override: Option<String>,
    /// Checked between items.
    pub cancel: Option<CancelToken>,
}

impl VatRequest {
    pub fn forced() -> Self {
        VatRequest {
            force: true,
            ..Self::default()
        }
    }
}

pub struct VatOrchestrator {
    engine: Arc<RuleEngine>,
    cache: Arc<dyn VatCache>,
    audit: Arc<dyn AuditSink>,
    addresses: Arc<dyn AddressBook>,
    clock: Arc<dyn Clock>,
    config: VatConfig,
}

/// Everything gathered while walking the items; kept on failure so the
/// audit record can describe how far the run got.
#[derive(Default)]
struct Pass {
    inputs: Vec<serde_json::Value>,
    traces: Vec<serde_json::Value>,
    items: Vec<ItemVat>,
    region: Option<String>,
}

enum Outcome {
    Completed,
    Cancelled,
}

impl VatOrchestrator {
    pub fn new(
        engine: Arc<RuleEngine>,
        cache: Arc<dyn VatCache>,
        audit: Arc<dyn AuditSink>,
        addresses: Arc<dyn AddressBook>,
        clock: Arc<dyn Clock>,
        config: VatConfig,
    ) -> Self {
        VatOrchestrator {
            engine,
            cache,
            audit,
            addresses,
            clock,
            config,
        }
    }

    /// Compute (or read back) the VAT for `cart`.
    ///
    /// Always returns a result; `status` tells the caller whether the
    /// totals can be trusted. Failures are cached with the error flag set
    /// and still audited. A cancelled call writes nothing.
    pub fn execute_vat_calculation(&self, cart: &Cart, request: &VatRequest) -> VatResult {
        if !request.force {
            if let Some(cached) = self.cached(cart) {
                tracing::debug!(cart_id = %cart.id, execution_id = %cached.execution_id, "VAT cache hit");
                return cached;
            }
        }

        let timestamp = rfc3339(self.clock.now());
        let execution_id = format!("vat-{}", Uuid::new_v4());
        let user = self.user_context(cart, request, &timestamp);

        let mut pass = Pass::default();
        match self.run_items(cart, &user, request.cancel.as_ref(), &mut pass) {
            Ok(Outcome::Completed) => {
                let result = self.calculated(cart, &user, pass.items, pass.region, execution_id, timestamp);
                tracing::info!(
                    cart_id = %cart.id,
                    items = result.items.len(),
                    net = %result.totals.net,
                    vat = %result.totals.vat,
                    gross = %result.totals.gross,
                    "VAT calculated"
                );
                self.store(cart, &result, None);
                self.record(cart, &user, pass.inputs, pass.traces, &result);
                result
            }
            Ok(Outcome::Cancelled) => {
                tracing::info!(cart_id = %cart.id, "VAT calculation cancelled");
                VatResult::empty(
                    VatStatus::NotCalculated,
                    execution_id,
                    timestamp,
                    self.config.context_version,
                    None,
                )
            }
            Err(e) => {
                let message = e.to_string();
                tracing::warn!(cart_id = %cart.id, "VAT calculation failed: {}", message);
                let mut result = VatResult::empty(
                    VatStatus::Error,
                    execution_id,
                    timestamp,
                    self.config.context_version,
                    Some(message.clone()),
                );
                result.region = pass.region;
                self.store(cart, &result, Some(message));
                self.record(cart, &user, pass.inputs, pass.traces, &result);
                result
            }
        }
    }

    /// Load the cart from `carts` and compute its VAT.
    pub fn execute_for(
        &self,
        carts: &MemoryCartStore,
        cart_id: &str,
        request: &VatRequest,
    ) -> Result<VatResult, VatError> {
        let cart = carts.cart(cart_id)?;
        Ok(self.execute_vat_calculation(&cart, request))
    }

    /// A fresh calculated blob computed from this revision of the cart.
    fn cached(&self, cart: &Cart) -> Option<VatResult> {
        let cart_id = cart.id.as_str();
        let slot = match self.cache.read(cart_id) {
            Ok(slot) => slot,
            Err(e) => {
                tracing::warn!(cart_id, "VAT cache read failed: {}", e);
                return None;
            }
        };
        if !slot.is_fresh() {
            return None;
        }
        if slot.cart_revision != cart.revision {
            tracing::debug!(
                cart_id,
                cached = slot.cart_revision,
                current = cart.revision,
                "cached VAT is from another cart revision"
            );
            return None;
        }
        let blob = slot.vat_result?;
        match serde_json::from_value::<VatResult>(blob) {
            Ok(result) if result.is_calculated() => Some(result),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(cart_id, "cached VAT result unreadable; recalculating: {}", e);
                None
            }
        }
    }

    /// Country from the saved address, then the override, then the default.
    fn user_context(&self, cart: &Cart, request: &VatRequest, timestamp: &str) -> UserContext {
        let country = self
            .addresses
            .country_code_for(cart)
            .or_else(|| request.country_code_override.clone())
            .map(|c| c.trim().to_ascii_uppercase())
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| self.config.default_country.clone());
        UserContext {
            user_id: cart.user_id.clone(),
            country_code: country,
            effective_date: timestamp.to_string(),
            context_version: self.config.context_version,
        }
    }

    fn run_items(
        &self,
        cart: &Cart,
        user: &UserContext,
        cancel: Option<&CancelToken>,
        pass: &mut Pass,
    ) -> Result<Outcome, VatError> {
        for item in &cart.items {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                return Ok(Outcome::Cancelled);
            }
            let ctx = item_context(user, cart, item)?;
            pass.inputs.push(json!({ "item_id": item.id, "context": ctx.to_json() }));

            let run = self.engine.execute(&self.config.entry_point, ctx);
            pass.traces
                .extend(run.rules_executed.iter().map(|t| trace_entry(&item.id, t)));

            if let Some(source) = run.error.clone() {
                return Err(VatError::Engine {
                    item_id: item.id.clone(),
                    source,
                });
            }
            if let Some(failed) = run.rules_executed.iter().find(|t| t.failed()) {
                return Err(VatError::RuleFailed {
                    item_id: item.id.clone(),
                    rule_code: failed.rule_code.clone(),
                    message: failed.error.clone().unwrap_or_default(),
                });
            }

            if pass.region.is_none() {
                pass.region = run.context.lookup("vat.region").as_str().map(str::to_string);
            }
            let rule_applied = run.last_writer("cart_item.vat_amount").map(str::to_string);
            pass.items.push(read_item(item, &run.context, rule_applied)?);
        }
        Ok(Outcome::Completed)
    }

    fn calculated(
        &self,
        cart: &Cart,
        user: &UserContext,
        items: Vec<ItemVat>,
        region: Option<String>,
        execution_id: String,
        timestamp: String,
    ) -> VatResult {
        let net = round_money(items.iter().map(|i| i.net_amount).sum::<Decimal>());
        let vat = round_money(items.iter().map(|i| i.vat_amount).sum::<Decimal>());
        // An empty cart still reports the region its owner falls in.
        let region = region.or_else(|| {
            cart.items
                .is_empty()
                .then(|| region_for_country(&user.country_code).as_str().to_string())
        });
        VatResult {
            status: VatStatus::Calculated,
            region,
            totals: VatTotals {
                net,
                vat,
                gross: round_money(net + vat),
            },
            items,
            execution_id,
            timestamp,
            context_version: self.config.context_version,
            error: None,
        }
    }

    /// Replace the cart's VAT slot. Persistence failures are logged; the
    /// caller still gets the computed result.
    fn store(&self, cart: &Cart, result: &VatResult, error: Option<String>) {
        let cart_id = cart.id.as_str();
        let slot = CachedVat {
            vat_result: serde_json::to_value(result).ok(),
            vat_last_calculated_at: Some(result.timestamp.clone()),
            vat_calculation_error: error.is_some(),
            vat_calculation_error_message: error.unwrap_or_default(),
            cart_revision: cart.revision,
        };
        if let Err(e) = self.cache.write(cart_id, slot) {
            tracing::error!(cart_id, "VAT cache write failed: {}", e);
        }
    }

    fn record(
        &self,
        cart: &Cart,
        user: &UserContext,
        inputs: Vec<serde_json::Value>,
        traces: Vec<serde_json::Value>,
        result: &VatResult,
    ) {
        let record = AuditRecord {
            execution_id: result.execution_id.clone(),
            cart_ref: cart.id.clone(),
            order_ref: None,
            input_context: json!({
                "user": {"id": user.user_id, "country_code": user.country_code},
                "effective_date": user.effective_date,
                "items": inputs,
            }),
            output_data: serde_json::to_value(result).unwrap_or_default(),
            rules_executed: traces,
            created_at: result.timestamp.clone(),
        };
        match self.audit.append(record) {
            Ok(AppendOutcome::Inserted) => {}
            Ok(AppendOutcome::Duplicate) => {
                tracing::warn!(execution_id = %result.execution_id, "audit record already present")
            }
            Err(e) => tracing::error!(cart_id = %cart.id, "audit append failed: {}", e),
        }
    }
}

fn trace_entry(item_id: &str, trace: &RuleTrace) -> serde_json::Value {
    let mut entry = serde_json::to_value(trace).unwrap_or_default();
    if let Some(obj) = entry.as_object_mut() {
        obj.insert("item_id".to_string(), json!(item_id));
    }
    entry
}

/// Read the item's VAT fields back out of the finished context.
fn read_item(item: &CartItem, ctx: &ExecutionContext, rule_applied: Option<String>) -> Result<ItemVat, VatError> {
    let decimal = |path: &str| {
        to_decimal(&ctx.lookup(path)).ok_or_else(|| VatError::Amount {
            item_id: item.id.clone(),
            message: format!("{} is not a decimal", path),
        })
    };
    let net_amount = round_money(decimal("cart_item.net_amount")?);
    let vat_amount = round_money(decimal("cart_item.vat_amount")?);
    let gross_amount = round_money(decimal("cart_item.gross_amount")?);
    if gross_amount != net_amount + vat_amount {
        return Err(VatError::Amount {
            item_id: item.id.clone(),
            message: format!(
                "gross {} does not equal net {} + vat {}",
                gross_amount, net_amount, vat_amount
            ),
        });
    }
    Ok(ItemVat {
        id: item.id.clone(),
        net_amount,
        vat_rate: round_rate(decimal("cart_item.vat_rate")?),
        vat_amount,
        gross_amount,
        rule_applied,
        exemption_reason: ctx
            .lookup("cart_item.exemption_reason")
            .as_str()
            .map(str::to_string),
    })
}
