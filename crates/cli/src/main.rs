mod config;
mod documents;
mod validate;

use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use acted_eval::{EngineResult, ExecutionContext, FunctionRegistry, RuleEngine};
use acted_storage::{MemoryAuditLog, MemoryRuleStore, MemoryVatCache, RuleCatalog};
use acted_vat::{Cart, StaticAddressBook, SystemClock, VatOrchestrator, VatRequest, VatResult, VatStatus};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::ActedConfig;
use crate::documents::{load_rules, read_json, RuleBundle};

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Acted rules engine and VAT calculator.
#[derive(Parser)]
#[command(name = "acted", version, about = "Acted rules engine and VAT calculator")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// Settings file (defaults to ./acted.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the rules of one entry point against a context
    Eval {
        /// Path to the rules JSON file
        rules: PathBuf,
        /// Entry point to execute
        #[arg(long)]
        entry_point: String,
        /// Path to the context JSON file
        #[arg(long)]
        context: PathBuf,
    },

    /// Calculate VAT for a cart
    Vat {
        /// Path to the cart JSON file
        cart: PathBuf,
        /// Rules JSON file (defaults to the shipped VAT rules)
        #[arg(long)]
        rules: Option<PathBuf>,
        /// Country code used when the cart has no saved address
        #[arg(long)]
        country: Option<String>,
        /// Recalculate even when a cached result exists
        #[arg(long)]
        force: bool,
    },

    /// Check rule definitions and schemas in a rules file
    Validate {
        /// Path to the rules JSON file
        rules: PathBuf,
    },

    /// Print the shipped VAT rules and context schema
    Seed,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    let config = match ActedConfig::load(cli.config.as_deref()) {
        Ok(c) => c,
        Err(msg) => fail(&msg, cli.output, cli.quiet),
    };

    match cli.command {
        Commands::Eval {
            rules,
            entry_point,
            context,
        } => {
            cmd_eval(&rules, &entry_point, &context, &config, cli.output, cli.quiet);
        }
        Commands::Vat {
            cart,
            rules,
            country,
            force,
        } => {
            cmd_vat(
                &cart,
                rules.as_deref(),
                country,
                force,
                &config,
                cli.output,
                cli.quiet,
            );
        }
        Commands::Validate { rules } => {
            cmd_validate(&rules, cli.output, cli.quiet);
        }
        Commands::Seed => {
            cmd_seed(cli.output, cli.quiet);
        }
    }
}

/// Logs go to stderr so JSON on stdout stays parseable. `RUST_LOG`
/// overrides the default filter.
fn init_logging(quiet: bool) {
    let default = if quiet { "off" } else { "acted=info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn build_engine(bundle: RuleBundle, config: &ActedConfig) -> Result<RuleEngine, String> {
    let store = MemoryRuleStore::from_records(bundle.rules, bundle.schemas)
        .map_err(|e| format!("error: {}", e))?;
    let catalog = Arc::new(RuleCatalog::new(Arc::new(store), &config.store));
    Ok(RuleEngine::new(
        catalog,
        Arc::new(FunctionRegistry::with_builtins()),
        config.engine.clone(),
    ))
}

fn cmd_eval(
    rules_path: &Path,
    entry_point: &str,
    context_path: &Path,
    config: &ActedConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let bundle = load_rules(rules_path).unwrap_or_else(|msg| fail(&msg, output, quiet));
    let context_json: serde_json::Value =
        read_json(context_path, "context").unwrap_or_else(|msg| fail(&msg, output, quiet));
    let context = match ExecutionContext::from_json(&context_json) {
        Ok(c) => c,
        Err(e) => {
            let msg = format!("error: invalid context in {}: {}", context_path.display(), e);
            fail(&msg, output, quiet);
        }
    };
    let engine = build_engine(bundle, config).unwrap_or_else(|msg| fail(&msg, output, quiet));

    let result = engine.execute(entry_point, context);
    match output {
        OutputFormat::Json => print_json(&result),
        OutputFormat::Text => {
            if !quiet {
                print_engine_summary(&result);
            }
        }
    }
    if !result.success {
        if let Some(e) = &result.error {
            report_error(&format!("error: {}", e), output, quiet);
        }
        process::exit(1);
    }
}

fn print_engine_summary(result: &EngineResult) {
    println!("execution: {}", result.execution_id);
    for t in &result.rules_executed {
        let indent = if t.called_from.is_some() { "    " } else { "  " };
        let outcome = match (&t.error, t.condition_result) {
            (Some(e), _) => format!("error: {}", e),
            (None, true) => format!("fired ({} actions)", t.actions_executed),
            (None, false) => "skipped".to_string(),
        };
        println!("{}{} v{}: {}", indent, t.rule_code, t.version, outcome);
    }
    println!("success: {}", result.success);
    let context = serde_json::to_string_pretty(&result.context)
        .unwrap_or_else(|e| format!("serialization error: {}", e));
    println!("context: {}", context);
}

fn cmd_vat(
    cart_path: &Path,
    rules_path: Option<&Path>,
    country: Option<String>,
    force: bool,
    config: &ActedConfig,
    output: OutputFormat,
    quiet: bool,
) {
    let cart: Cart = read_json(cart_path, "cart").unwrap_or_else(|msg| fail(&msg, output, quiet));
    let bundle = match rules_path {
        Some(p) => load_rules(p).unwrap_or_else(|msg| fail(&msg, output, quiet)),
        None => seed_bundle().unwrap_or_else(|msg| fail(&msg, output, quiet)),
    };
    let engine = build_engine(bundle, config).unwrap_or_else(|msg| fail(&msg, output, quiet));

    let orchestrator = VatOrchestrator::new(
        Arc::new(engine),
        Arc::new(MemoryVatCache::new()),
        Arc::new(MemoryAuditLog::new()),
        Arc::new(StaticAddressBook::new()),
        Arc::new(SystemClock),
        config.vat.clone(),
    );
    let request = VatRequest {
        force,
        country_code_override: country,
        cancel: None,
    };
    let result = orchestrator.execute_vat_calculation(&cart, &request);

    match output {
        OutputFormat::Json => print_json(&result),
        OutputFormat::Text => {
            if !quiet {
                print_vat_summary(&result);
            }
        }
    }
    if result.status != VatStatus::Calculated {
        if let Some(e) = &result.error {
            report_error(&format!("error: {}", e), output, quiet);
        }
        process::exit(1);
    }
}

fn print_vat_summary(result: &VatResult) {
    let status = match result.status {
        VatStatus::Calculated => "calculated",
        VatStatus::Error => "error",
        VatStatus::NotCalculated => "not_calculated",
    };
    println!("status: {}", status);
    println!("region: {}", result.region.as_deref().unwrap_or("-"));
    for item in &result.items {
        print!(
            "  {}: net {} rate {} vat {} gross {}",
            item.id, item.net_amount, item.vat_rate, item.vat_amount, item.gross_amount
        );
        match (&item.rule_applied, &item.exemption_reason) {
            (Some(rule), Some(reason)) => println!(" [{}; {}]", rule, reason),
            (Some(rule), None) => println!(" [{}]", rule),
            (None, _) => println!(),
        }
    }
    println!(
        "totals: net {} vat {} gross {}",
        result.totals.net, result.totals.vat, result.totals.gross
    );
}

fn cmd_validate(rules_path: &Path, output: OutputFormat, quiet: bool) {
    let bundle = load_rules(rules_path).unwrap_or_else(|msg| fail(&msg, output, quiet));
    let report = validate::validate_bundle(&bundle, &FunctionRegistry::with_builtins());

    match output {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            if !quiet {
                for w in &report.warnings {
                    println!("warning: {}: {}", w.subject, w.message);
                }
                for p in &report.problems {
                    println!("problem: {}: {}", p.subject, p.message);
                }
                if report.is_valid() {
                    println!(
                        "valid: {} rules, {} schemas",
                        report.rules, report.schemas
                    );
                }
            }
        }
    }
    if !report.is_valid() {
        let msg = format!(
            "error: {} problem(s) in {}",
            report.problems.len(),
            rules_path.display()
        );
        fail(&msg, output, quiet);
    }
}

fn cmd_seed(output: OutputFormat, quiet: bool) {
    let bundle = seed_bundle().unwrap_or_else(|msg| fail(&msg, output, quiet));
    print_json(&bundle);
}

fn seed_bundle() -> Result<RuleBundle, String> {
    let rules = acted_vat::seed_rules().map_err(|e| format!("internal error: {}", e))?;
    let schemas = acted_vat::seed_schemas().map_err(|e| format!("internal error: {}", e))?;
    Ok(RuleBundle { rules, schemas })
}

fn print_json<T: serde::Serialize>(value: &T) {
    let pretty = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("serialization error: {}", e));
    println!("{}", pretty);
}

fn fail(msg: &str, output: OutputFormat, quiet: bool) -> ! {
    report_error(msg, output, quiet);
    process::exit(1);
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}
