//! CLI integration tests for every subcommand.
//!
//! Uses `assert_cmd` to spawn the `acted` binary and verify exit codes,
//! stdout content, and stderr content. Each test runs in its own temp
//! directory so no stray `acted.toml` is picked up.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Helper: create a Command for the `acted` binary, rooted at `dir`.
fn acted(dir: &Path) -> Command {
    let mut cmd = cargo_bin_cmd!("acted");
    cmd.current_dir(dir);
    cmd.env_remove("RUST_LOG");
    cmd
}

fn write_json(dir: &TempDir, name: &str, value: &serde_json::Value) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, serde_json::to_string_pretty(value).unwrap()).unwrap();
    path
}

fn uk_cart() -> serde_json::Value {
    json!({
        "id": "cart-1",
        "items": [
            {"id": "i1", "actual_price": "100.00", "quantity": 1, "metadata": {"product_type": "Digital"}},
            {"id": "i2", "actual_price": "50.00", "quantity": 1, "metadata": {"product_type": "Printed"}},
        ],
    })
}

fn greeting_rules() -> serde_json::Value {
    json!([
        {
            "rule_code": "greet",
            "name": "Greet",
            "entry_point": "home_page_mount",
            "priority": 1,
            "condition": {"==": [{"var": "user.country_code"}, "GB"]},
            "actions": [
                {"type": "update", "target": "page.banner", "operation": "set", "value": "Hello UK"},
            ],
            "stop_processing": true,
        },
        {
            "rule_code": "never",
            "name": "Never",
            "entry_point": "home_page_mount",
            "priority": 2,
            "condition": {},
            "actions": [
                {"type": "update", "target": "page.banner", "operation": "set", "value": "unreachable"},
            ],
        },
    ])
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    let dir = TempDir::new().unwrap();
    acted(dir.path())
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Acted rules engine and VAT calculator"));
}

#[test]
fn version_exits_0() {
    let dir = TempDir::new().unwrap();
    acted(dir.path())
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("acted"));
}

#[test]
fn unknown_subcommand_fails() {
    let dir = TempDir::new().unwrap();
    acted(dir.path()).arg("frobnicate").assert().failure();
}

// ──────────────────────────────────────────────
// 2. Seed
// ──────────────────────────────────────────────

#[test]
fn seed_prints_rules_and_schema() {
    let dir = TempDir::new().unwrap();
    let out = acted(dir.path()).arg("seed").assert().success();
    let stdout = String::from_utf8(out.get_output().stdout.clone()).unwrap();
    let v: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(v["rules"].as_array().unwrap().len(), 15);
    assert_eq!(v["schemas"][0]["fields_code"], json!("cart_vat_context_schema"));
}

#[test]
fn seed_output_validates() {
    let dir = TempDir::new().unwrap();
    let out = acted(dir.path()).arg("seed").assert().success();
    let seed = dir.path().join("seed.json");
    fs::write(&seed, &out.get_output().stdout).unwrap();
    acted(dir.path())
        .args(["validate", seed.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("valid: 15 rules, 1 schemas"));
}

// ──────────────────────────────────────────────
// 3. Eval
// ──────────────────────────────────────────────

#[test]
fn eval_text_summary() {
    let dir = TempDir::new().unwrap();
    let rules = write_json(&dir, "rules.json", &greeting_rules());
    let ctx = write_json(&dir, "ctx.json", &json!({"user": {"country_code": "GB"}}));
    acted(dir.path())
        .args(["eval", rules.to_str().unwrap(), "--entry-point", "home_page_mount"])
        .args(["--context", ctx.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("greet v1: fired (1 actions)"))
        .stdout(predicate::str::contains("Hello UK"))
        .stdout(predicate::str::contains("never").not());
}

#[test]
fn eval_json_output() {
    let dir = TempDir::new().unwrap();
    let rules = write_json(&dir, "rules.json", &greeting_rules());
    let ctx = write_json(&dir, "ctx.json", &json!({"user": {"country_code": "IE"}}));
    let out = acted(dir.path())
        .args(["--output", "json", "eval", rules.to_str().unwrap()])
        .args(["--entry-point", "home_page_mount", "--context", ctx.to_str().unwrap()])
        .assert()
        .success();
    let v: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).unwrap();
    assert_eq!(v["success"], json!(true));
    assert_eq!(v["context"]["page"]["banner"], json!("unreachable"));
    assert!(v["execution_id"].as_str().unwrap().starts_with("exec-"));
    assert_eq!(v["rules_executed"].as_array().unwrap().len(), 2);
}

#[test]
fn eval_missing_context_file_fails() {
    let dir = TempDir::new().unwrap();
    let rules = write_json(&dir, "rules.json", &greeting_rules());
    acted(dir.path())
        .args(["eval", rules.to_str().unwrap(), "--entry-point", "home_page_mount"])
        .args(["--context", "nope.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("context file not found"));
}

#[test]
fn eval_invalid_context_fails_with_json_error() {
    let dir = TempDir::new().unwrap();
    let seed = acted(dir.path()).arg("seed").assert().success();
    let rules = dir.path().join("seed.json");
    fs::write(&rules, &seed.get_output().stdout).unwrap();
    let ctx = write_json(&dir, "ctx.json", &json!({"user": {"country_code": "gbr"}}));

    acted(dir.path())
        .args(["--output", "json", "eval", rules.to_str().unwrap()])
        .args(["--entry-point", "cart_calculate_vat", "--context", ctx.to_str().unwrap()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"success\": false"))
        .stderr(predicate::str::contains("{\"error\":"));
}

#[test]
fn eval_rejects_malformed_rule_records() {
    let dir = TempDir::new().unwrap();
    let rules = write_json(
        &dir,
        "rules.json",
        &json!([{
            "rule_code": "bad",
            "name": "bad",
            "entry_point": "checkout_start",
            "priority": 1,
            "condition": [],
            "actions": [],
        }]),
    );
    let ctx = write_json(&dir, "ctx.json", &json!({}));
    acted(dir.path())
        .args(["eval", rules.to_str().unwrap(), "--entry-point", "checkout_start"])
        .args(["--context", ctx.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid record 'bad'"));
}

#[test]
fn strict_mode_from_config_fails_the_run() {
    let dir = TempDir::new().unwrap();
    let rules = write_json(
        &dir,
        "rules.json",
        &json!([{
            "rule_code": "boom",
            "name": "boom",
            "entry_point": "checkout_start",
            "priority": 1,
            "condition": {},
            "actions": [{"type": "call_function", "function": "add_decimals", "args": ["x", "1"], "store_result_in": "t"}],
        }]),
    );
    let ctx = write_json(&dir, "ctx.json", &json!({}));

    acted(dir.path())
        .args(["eval", rules.to_str().unwrap(), "--entry-point", "checkout_start"])
        .args(["--context", ctx.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("boom v1: error"));

    fs::write(dir.path().join("acted.toml"), "[engine]\nstrict = true\n").unwrap();
    acted(dir.path())
        .args(["eval", rules.to_str().unwrap(), "--entry-point", "checkout_start"])
        .args(["--context", ctx.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("rule 'boom' failed"));
}

// ──────────────────────────────────────────────
// 4. Vat
// ──────────────────────────────────────────────

#[test]
fn vat_with_seed_rules() {
    let dir = TempDir::new().unwrap();
    let cart = write_json(&dir, "cart.json", &uk_cart());
    acted(dir.path())
        .args(["vat", cart.to_str().unwrap(), "--country", "GB"])
        .assert()
        .success()
        .stdout(predicate::str::contains("status: calculated"))
        .stdout(predicate::str::contains("region: UK"))
        .stdout(predicate::str::contains("[calculate_vat_uk_digital_product]"))
        .stdout(predicate::str::contains("totals: net 150.00 vat 20.00 gross 170.00"));
}

#[test]
fn vat_json_output_for_south_africa() {
    let dir = TempDir::new().unwrap();
    let cart = write_json(
        &dir,
        "cart.json",
        &json!({"id": "c", "items": [
            {"id": "t", "actual_price": "200.00", "quantity": 1, "metadata": {"product_type": "Tutorial"}}
        ]}),
    );
    let out = acted(dir.path())
        .args(["--output", "json", "vat", cart.to_str().unwrap(), "--country", "ZA", "--force"])
        .assert()
        .success();
    let v: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).unwrap();
    assert_eq!(v["status"], json!("calculated"));
    assert_eq!(v["region"], json!("SA"));
    assert_eq!(v["totals"], json!({"net": "200.00", "vat": "30.00", "gross": "230.00"}));
    assert_eq!(v["items"][0]["vat_rate"], json!("0.1500"));
}

#[test]
fn vat_default_country_comes_from_config() {
    let dir = TempDir::new().unwrap();
    let cart = write_json(&dir, "cart.json", &uk_cart());
    let config = dir.path().join("settings.toml");
    fs::write(&config, "[vat]\ndefault_country = \"IE\"\n").unwrap();
    acted(dir.path())
        .args(["--config", config.to_str().unwrap(), "vat", cart.to_str().unwrap()])
        .assert()
        .success()
        .stdout(predicate::str::contains("region: IE"))
        .stdout(predicate::str::contains("totals: net 150.00 vat 34.50 gross 184.50"));
}

#[test]
fn vat_error_result_exits_1() {
    let dir = TempDir::new().unwrap();
    let cart = write_json(&dir, "cart.json", &uk_cart());
    acted(dir.path())
        .args(["vat", cart.to_str().unwrap(), "--country", "GBR"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("status: error"))
        .stderr(predicate::str::contains("invalid context"));
}

#[test]
fn missing_explicit_config_fails() {
    let dir = TempDir::new().unwrap();
    let cart = write_json(&dir, "cart.json", &uk_cart());
    acted(dir.path())
        .args(["--config", "absent.toml", "vat", cart.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("error reading config"));
}

#[test]
fn quiet_suppresses_errors() {
    let dir = TempDir::new().unwrap();
    acted(dir.path())
        .args(["--quiet", "vat", "missing.json"])
        .assert()
        .failure()
        .stderr(predicate::str::is_empty());
}

// ──────────────────────────────────────────────
// 5. Validate
// ──────────────────────────────────────────────

#[test]
fn validate_reports_problems_and_exits_1() {
    let dir = TempDir::new().unwrap();
    let rules = write_json(
        &dir,
        "rules.json",
        &json!([
            {"rule_code": "ok", "name": "ok", "entry_point": "checkout_start", "priority": 1,
             "condition": {}, "actions": []},
            {"rule_code": "bad", "name": "bad", "entry_point": "checkout_start", "priority": 2,
             "condition": {}, "actions": [{"type": ""}]},
        ]),
    );
    acted(dir.path())
        .args(["validate", rules.to_str().unwrap()])
        .assert()
        .failure()
        .stdout(predicate::str::contains("problem: bad:"))
        .stderr(predicate::str::contains("1 problem(s)"));
}

#[test]
fn validate_json_report() {
    let dir = TempDir::new().unwrap();
    let rules = write_json(&dir, "rules.json", &greeting_rules());
    let out = acted(dir.path())
        .args(["--output", "json", "validate", rules.to_str().unwrap()])
        .assert()
        .success();
    let v: serde_json::Value = serde_json::from_slice(&out.get_output().stdout).unwrap();
    assert_eq!(v["rules"], json!(2));
    assert_eq!(v["problems"], json!([]));
}

#[test]
fn validate_invalid_json_fails() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rules.json");
    fs::write(&path, "{ not json").unwrap();
    acted(dir.path())
        .args(["validate", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid JSON"));
}
