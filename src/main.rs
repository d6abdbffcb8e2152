mod output;
mod repl;

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rustyline::error::ReadlineError;
use serde::Deserialize;
use tracing::{debug, info};

use dashvars::core::config::EngineConfig;
use dashvars::core::fixture::FixtureService;
use dashvars::core::initial::InitialValues;
use dashvars::core::propagation::{ChangePropagationEngine, EngineContext};
use dashvars::core::scope::ScopeContext;
use dashvars::core::types::{AdHocFilter, TimeRange, VariableDefinition, VariableKind, VariableValue};

use crate::output::Printer;
use crate::repl::Repl;

/// Dashboard file: variable definitions plus the rows the fixture backend serves.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Dashboard {
    variables: Vec<VariableDefinition>,
    #[serde(default)]
    fixtures: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    time_range: Option<TimeRange>,
    /// URL query string carrying `var-<name>` initial values.
    #[serde(default)]
    initial: Option<String>,
}

struct Args {
    dashboard: PathBuf,
    config: Option<PathBuf>,
    query: Option<String>,
}

fn expand(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);
    let mut dashboard = None;
    let mut config = None;
    let mut query = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or("--config needs a path")?;
                config = Some(expand(&path));
            }
            "--query" => {
                query = Some(args.next().ok_or("--query needs a query string")?);
            }
            other if dashboard.is_none() => dashboard = Some(expand(other)),
            other => return Err(format!("Unexpected argument: {}", other)),
        }
    }

    let dashboard = dashboard
        .ok_or("Usage: dashvars <dashboard.json> [--config <file>] [--query <var-name=value&...>]")?;
    Ok(Args { dashboard, config, query })
}

fn load_dashboard(path: &Path) -> Result<Dashboard, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    serde_json::from_str(&content)
        .map_err(|e| format!("Invalid dashboard {}: {}", path.display(), e))
}

#[tokio::main]
async fn main() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,dashvars=info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let printer = Printer::new();
    if let Err(e) = run().await {
        printer.error(&e);
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let args = parse_args()?;
    let config = EngineConfig::load(args.config.as_deref())?;
    let dashboard = load_dashboard(&args.dashboard)?;

    let service = FixtureService::from_json(
        &serde_json::Value::Object(dashboard.fixtures),
        config.stream_batch_size,
    )?;
    let context = EngineContext::new(Arc::new(service), config);
    let mut engine = ChangePropagationEngine::new(context, dashboard.variables);

    let query = args.query.or(dashboard.initial).unwrap_or_default();
    let initial = InitialValues::from_query_string(&query);
    let range = dashboard.time_range.unwrap_or_else(|| last_minutes(15));

    info!(target: "dashvars", dashboard = %args.dashboard.display(), "loading dashboard");
    engine.load(Some(range), &initial).await.map_err(|e| e.to_string())?;
    engine.settle().await.map_err(|e| e.to_string())?;

    interactive(&mut engine).await
}

fn last_minutes(minutes: i64) -> TimeRange {
    let end = Utc::now();
    TimeRange::new(end - Duration::minutes(minutes), end)
}

async fn interactive(engine: &mut ChangePropagationEngine) -> Result<(), String> {
    let mut repl = Repl::new()?;

    repl.printer().header("dashvars");
    let report = engine.validation();
    if !report.is_clean() {
        repl.printer().warning("Configuration issues found:");
        repl.printer().print_indented(&report.format_summary(), 2);
    }
    show_all(engine, repl.printer());
    repl.printer().info("Type 'help' for available commands");

    loop {
        let line = match repl.read_line("dashvars> ") {
            Ok(Some(line)) => line,
            Ok(None) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => return Err(format!("Input error: {}", e)),
        };

        let parts: Vec<&str> = line.split_whitespace().collect();
        let Some((&command, rest)) = parts.split_first() else {
            continue;
        };

        if matches!(command, "quit" | "exit") {
            break;
        }

        if let Err(e) = execute(engine, repl.printer(), command, rest).await {
            repl.printer().error(&e);
        }
    }

    if let Err(e) = repl.save_history() {
        repl.printer().warning(&e);
    }
    repl.printer().success("Goodbye!");
    Ok(())
}

async fn execute(
    engine: &mut ChangePropagationEngine,
    printer: &Printer,
    command: &str,
    args: &[&str],
) -> Result<(), String> {
    debug!(target: "dashvars", command, ?args, "executing");

    match command {
        "show" => match args.first() {
            Some(name) => show_one(engine, printer, name)?,
            None => show_all(engine, printer),
        },
        "set" => {
            let (name, raw) = args.split_first().ok_or("Usage: set <name> <value>")?;
            let def = engine.definitions().iter()
                .find(|d| d.name == *name)
                .ok_or_else(|| format!("Variable not found: {}", name))?;
            let value = parse_value(def, &raw.join(" "))?;

            let result = engine.set_value(name, value).await.map_err(|e| e.to_string())?;
            engine.settle().await.map_err(|e| e.to_string())?;

            printer.success(&format!("{} updated", result.changed_variable));
            if !result.reset_variables.is_empty() {
                printer.info(&format!(
                    "Reloaded {} ({} fetches cancelled)",
                    result.reset_variables.join(", "),
                    result.cancelled_fetches
                ));
            }
        }
        "search" => {
            let (name, keyword) = args.split_first().ok_or("Usage: search <name> [keyword]")?;
            let started = engine.search(name, &keyword.join(" ")).await.map_err(|e| e.to_string())?;
            engine.settle().await.map_err(|e| e.to_string())?;
            if !started {
                printer.warning(&format!("{} cannot be searched right now", name));
            }
            show_one(engine, printer, name)?;
        }
        "open" => {
            let name = args.first().ok_or("Usage: open <name>")?;
            let fetched = engine.open_dropdown(name).await.map_err(|e| e.to_string())?;
            engine.settle().await.map_err(|e| e.to_string())?;
            if !fetched {
                printer.info("Options already loaded");
            }
            show_one(engine, printer, name)?;
        }
        "range" => {
            let range = parse_range(args)?;
            engine.set_time_range(range).await.map_err(|e| e.to_string())?;
            engine.settle().await.map_err(|e| e.to_string())?;
            printer.success(&format!(
                "Time range {} .. {}",
                range.start_time.to_rfc3339(),
                range.end_time.to_rfc3339()
            ));
        }
        "scope" => {
            let context = match args {
                ["global"] | [] => ScopeContext::global(),
                ["tab", tab] => ScopeContext::tab(tab),
                ["panel", tab, panel] => ScopeContext::panel(tab, panel),
                _ => return Err("Usage: scope global | tab <id> | panel <tab> <panel>".to_string()),
            };
            engine.set_scope_context(context).await.map_err(|e| e.to_string())?;
            engine.settle().await.map_err(|e| e.to_string())?;
            show_all(engine, printer);
        }
        "graph" => {
            if let Some(err) = engine.configuration_error() {
                printer.warning(&err.to_string());
            }
            print!("{}", engine.graph().to_dot());
        }
        "order" => {
            let order = engine.load_order();
            if order.is_empty() {
                printer.info("No variables defined");
                return Ok(());
            }
            printer.header(&format!("Load order ({} variables)", order.len()));
            for (i, name) in engine.load_order().names().iter().enumerate() {
                let parents = engine.graph().parent_variables(name);
                let item = if parents.is_empty() {
                    format!("{}. {}", i + 1, name)
                } else {
                    format!("{}. {} (after {})", i + 1, name, parents.join(", "))
                };
                printer.print_list_item(&item, 2);
            }
        }
        "history" => {
            let history = engine.history();
            let entries = match args {
                [] => history.get_last_n(20),
                [n] if n.parse::<usize>().is_ok() => history.get_last_n(n.parse().unwrap_or(20)),
                terms => history.search(&terms.join(" ")),
            };
            printer.header(&format!("History ({} of {} events)", entries.len(), history.len()));
            for entry in entries {
                let mut line = format!(
                    "#{} {} {} {:?}",
                    entry.sequence,
                    entry.timestamp.format("%H:%M:%S%.3f"),
                    entry.variable,
                    entry.kind
                );
                if let Some(value) = &entry.value {
                    line.push_str(&format!(" = {}", value));
                }
                if let Some(detail) = &entry.detail {
                    line.push_str(&format!(" ({})", detail));
                }
                printer.print_list_item(&line, 2);
            }
        }
        "export" => {
            let path = args.first().ok_or("Usage: export <path>")?;
            let path = expand(path);
            engine.history().export(&path)?;
            printer.success(&format!("History written to {}", path.display()));
        }
        "validate" => {
            let report = engine.validation();
            if report.is_clean() {
                printer.success("Configuration is clean");
            } else {
                printer.print_indented(&report.format_summary(), 2);
            }
        }
        "help" => show_help(printer),
        other => {
            printer.error(&format!("Command '{}' not recognized", other));
            printer.info("Try 'help' for available commands");
        }
    }

    Ok(())
}

fn parse_value(def: &VariableDefinition, raw: &str) -> Result<VariableValue, String> {
    let raw = raw.trim();
    if let VariableKind::DynamicFilters { .. } = def.kind {
        if raw.is_empty() {
            return Ok(VariableValue::Filters(Vec::new()));
        }
        let filters: Vec<AdHocFilter> = serde_json::from_str(raw)
            .map_err(|e| format!("Filters must be a JSON array: {}", e))?;
        return Ok(VariableValue::Filters(filters));
    }

    if raw.is_empty() {
        return Ok(def.empty_value());
    }
    if def.multi_select {
        let values = raw.split(',').map(|v| v.trim().to_string()).filter(|v| !v.is_empty()).collect();
        return Ok(VariableValue::List(values));
    }
    Ok(VariableValue::Str(raw.to_string()))
}

fn parse_time(text: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("Invalid time '{}': {}", text, e))
}

fn parse_range(args: &[&str]) -> Result<TimeRange, String> {
    match args {
        ["last", minutes] => {
            let minutes: i64 = minutes.parse().map_err(|_| format!("Invalid minutes: {}", minutes))?;
            Ok(last_minutes(minutes))
        }
        [start, end] => Ok(TimeRange::new(parse_time(start)?, parse_time(end)?)),
        _ => Err("Usage: range <start> <end> | range last <minutes>".to_string()),
    }
}

fn show_all(engine: &ChangePropagationEngine, printer: &Printer) {
    let visible = engine.visible_variables();
    let loading = if engine.is_variables_loading() { " (loading)" } else { "" };
    printer.header(&format!("Variables ({} visible){}", visible.len(), loading));

    if visible.is_empty() {
        printer.info("No variables in this scope");
        return;
    }

    let width = visible.iter().map(|r| r.name.len()).max().unwrap_or(0);
    for record in &visible {
        let value = format!("{}  [{}]", record.value.display(), printer.state(record.state));
        printer.print_key_value(&format!("{:width$}", record.name, width = width), &value, 2);
    }
}

fn show_one(engine: &ChangePropagationEngine, printer: &Printer, name: &str) -> Result<(), String> {
    let record = engine.record(name).ok_or_else(|| format!("Variable not found: {}", name))?;

    printer.header(&format!("{} ({})", record.label, record.variable_type.name()));
    printer.print_key_value("value", &record.value.display(), 2);
    printer.print_key_value("state", &printer.state(record.state), 2);
    printer.print_key_value("scope", &format!("{:?}", record.scope).to_lowercase(), 2);

    let parents = engine.graph().parent_variables(name);
    if !parents.is_empty() {
        printer.print_key_value("depends on", &parents.join(", "), 2);
    }

    if !record.options.is_empty() {
        printer.subheader(&format!("Options ({})", record.options.len()));
        for option in &record.options {
            if option.label == option.value {
                printer.print_list_item(&option.value, 2);
            } else {
                printer.print_list_item(&format!("{} = {}", option.label, option.value), 2);
            }
        }
    }
    Ok(())
}

fn show_help(printer: &Printer) {
    printer.header("Commands");
    let commands = [
        ("show [name]", "List variables in the current scope, or one variable with its options"),
        ("set <name> <value>", "Select a value; comma separated for multi-select, JSON for filters"),
        ("search <name> <keyword>", "Reload options matching a keyword"),
        ("open <name>", "Open a dropdown, fetching options only when missing"),
        ("range <start> <end>", "Set the time range (RFC 3339); 'range last 60' for minutes"),
        ("scope <level> [ids]", "global | tab <id> | panel <tab> <panel>"),
        ("graph", "Print the dependency graph as DOT"),
        ("order", "Print the load order"),
        ("history [n|term]", "Show recent resolution events or search them"),
        ("export <path>", "Write the event history as JSON"),
        ("validate", "Show configuration issues"),
        ("quit", "Leave"),
    ];
    for (usage, description) in commands {
        printer.print_key_value(&format!("{:24}", usage), description, 2);
    }
}
