//! Condition evaluator.
//!
//! Conditions are JSONLogic-style `{operator: [args]}` trees. Parsing is
//! total: anything that is not understood becomes `Condition::Invalid`.
//! A tree holding an invalid node anywhere evaluates to false as a whole,
//! so a malformed operand never compares equal to a real `null`.
//! `evaluate` therefore never fails and never mutates the context.

use std::cmp::Ordering;

use crate::numeric;
use crate::value::{ExecutionContext, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    fn from_symbol(op: &str) -> Option<CompareOp> {
        match op {
            "==" => Some(CompareOp::Eq),
            "!=" => Some(CompareOp::Ne),
            "<" => Some(CompareOp::Lt),
            "<=" => Some(CompareOp::Le),
            ">" => Some(CompareOp::Gt),
            ">=" => Some(CompareOp::Ge),
            _ => None,
        }
    }

    fn apply(self, left: &Value, right: &Value) -> bool {
        match self {
            CompareOp::Eq => numeric::values_equal(left, right),
            CompareOp::Ne => !numeric::values_equal(left, right),
            ordering => match numeric::compare_numbers(left, right) {
                Some(ord) => match ordering {
                    CompareOp::Lt => ord == Ordering::Less,
                    CompareOp::Le => ord != Ordering::Greater,
                    CompareOp::Gt => ord == Ordering::Greater,
                    CompareOp::Ge => ord != Ordering::Less,
                    CompareOp::Eq | CompareOp::Ne => false,
                },
                None => false,
            },
        }
    }
}

/// A parsed condition tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `{}`: the rule is unconditional.
    Always,
    /// `{"var": "a.b"}` or `{"var": ["a.b", default]}`.
    Var { path: String, default: Option<Value> },
    Literal(Value),
    Compare {
        op: CompareOp,
        left: Box<Condition>,
        right: Box<Condition>,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
    /// `{"in": [x, [v1, v2]]}`; the haystack must be a literal array.
    In {
        needle: Box<Condition>,
        haystack: Vec<Value>,
    },
    Invalid(String),
}

impl Condition {
    /// False when any node of the tree failed to parse.
    pub fn is_well_formed(&self) -> bool {
        match self {
            Condition::Invalid(_) => false,
            Condition::Compare { left, right, .. } => {
                left.is_well_formed() && right.is_well_formed()
            }
            Condition::And(items) | Condition::Or(items) => {
                items.iter().all(Condition::is_well_formed)
            }
            Condition::Not(inner) => inner.is_well_formed(),
            Condition::In { needle, .. } => needle.is_well_formed(),
            Condition::Always | Condition::Var { .. } | Condition::Literal(_) => true,
        }
    }
}

/// Parse a rule's top-level condition. Non-object conditions are invalid.
pub fn parse_condition(json: &serde_json::Value) -> Condition {
    match json {
        serde_json::Value::Object(_) => parse_node(json),
        other => Condition::Invalid(format!(
            "condition must be an object, got {}",
            json_kind(other)
        )),
    }
}

fn parse_node(json: &serde_json::Value) -> Condition {
    let obj = match json {
        serde_json::Value::Object(obj) => obj,
        other => return Condition::Literal(Value::from_json(other)),
    };
    if obj.is_empty() {
        return Condition::Always;
    }
    if obj.len() != 1 {
        return Condition::Invalid(format!(
            "expected a single operator, got {} keys",
            obj.len()
        ));
    }
    let Some((op, args)) = obj.iter().next() else {
        return Condition::Invalid("empty operator".to_string());
    };

    match op.as_str() {
        "var" => parse_var(args),
        "and" | "or" => {
            let items = match args.as_array() {
                Some(items) if !items.is_empty() => items,
                _ => {
                    return Condition::Invalid(format!("'{}' needs a non-empty array", op))
                }
            };
            let parsed = items.iter().map(parse_node).collect();
            if op == "and" {
                Condition::And(parsed)
            } else {
                Condition::Or(parsed)
            }
        }
        "!" => match args {
            serde_json::Value::Array(items) if items.len() == 1 => {
                Condition::Not(Box::new(parse_node(&items[0])))
            }
            serde_json::Value::Array(_) => Condition::Invalid("'!' takes one operand".to_string()),
            single => Condition::Not(Box::new(parse_node(single))),
        },
        "in" => match args.as_array().map(Vec::as_slice) {
            Some([needle, serde_json::Value::Array(haystack)]) => Condition::In {
                needle: Box::new(parse_node(needle)),
                haystack: haystack.iter().map(Value::from_json).collect(),
            },
            _ => Condition::Invalid("'in' needs [value, literal array]".to_string()),
        },
        symbol => match CompareOp::from_symbol(symbol) {
            Some(cmp) => match args.as_array().map(Vec::as_slice) {
                Some([left, right]) => Condition::Compare {
                    op: cmp,
                    left: Box::new(parse_node(left)),
                    right: Box::new(parse_node(right)),
                },
                _ => Condition::Invalid(format!("'{}' takes exactly two operands", symbol)),
            },
            None => Condition::Invalid(format!("unknown operator '{}'", symbol)),
        },
    }
}

fn parse_var(args: &serde_json::Value) -> Condition {
    match args {
        serde_json::Value::String(path) => Condition::Var {
            path: path.clone(),
            default: None,
        },
        serde_json::Value::Number(n) => Condition::Var {
            path: n.to_string(),
            default: None,
        },
        serde_json::Value::Array(items) => match items.as_slice() {
            [serde_json::Value::String(path)] => Condition::Var {
                path: path.clone(),
                default: None,
            },
            [serde_json::Value::String(path), default] => Condition::Var {
                path: path.clone(),
                default: Some(Value::from_json(default)),
            },
            _ => Condition::Invalid("'var' needs a path string".to_string()),
        },
        _ => Condition::Invalid("'var' needs a path string".to_string()),
    }
}

fn json_kind(v: &serde_json::Value) -> &'static str {
    match v {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Evaluate a parsed condition. Only a `Bool(true)` result counts as true.
pub fn evaluate(cond: &Condition, ctx: &ExecutionContext) -> bool {
    cond.is_well_formed() && holds(cond, ctx)
}

fn holds(cond: &Condition, ctx: &ExecutionContext) -> bool {
    matches!(eval_node(cond, ctx), Value::Bool(true))
}

/// Parse and evaluate a raw JSON condition in one step.
pub fn evaluate_json(json: &serde_json::Value, ctx: &ExecutionContext) -> bool {
    evaluate(&parse_condition(json), ctx)
}

fn eval_node(cond: &Condition, ctx: &ExecutionContext) -> Value {
    match cond {
        Condition::Always => Value::Bool(true),

        Condition::Var { path, default } => match ctx.get(path) {
            Some(Value::Null) | None => default.clone().unwrap_or(Value::Null),
            Some(v) => v.clone(),
        },

        Condition::Literal(v) => v.clone(),

        Condition::Compare { op, left, right } => {
            let l = eval_node(left, ctx);
            let r = eval_node(right, ctx);
            Value::Bool(op.apply(&l, &r))
        }

        Condition::And(items) => Value::Bool(items.iter().all(|c| holds(c, ctx))),

        Condition::Or(items) => Value::Bool(items.iter().any(|c| holds(c, ctx))),

        Condition::Not(inner) => match eval_node(inner, ctx) {
            Value::Bool(b) => Value::Bool(!b),
            Value::Null => Value::Bool(true),
            _ => Value::Null,
        },

        Condition::In { needle, haystack } => {
            let n = eval_node(needle, ctx);
            Value::Bool(haystack.iter().any(|h| numeric::values_equal(&n, h)))
        }

        Condition::Invalid(_) => Value::Null,
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────
