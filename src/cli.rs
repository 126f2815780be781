//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::{self, CsvAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::config_validation::{unknown_keys, validate_config};
use crate::domain::error::VedaError;
use crate::domain::interpreter::{DEFAULT_MAX_CALL_DEPTH, InterpreterConfig};
use crate::domain::lexer::tokenize;
use crate::domain::market_data::MarketData;
use crate::domain::script::{self, ScriptReport};
use crate::domain::trade::{PositionSummary, TradeRecord};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;

pub const DEFAULT_LOG_LEVEL: &str = "warn";

#[derive(Parser, Debug)]
#[command(name = "vedascript", about = "Run trading strategy scripts against market data")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a script against a symbol's bars and write the trade log
    Run {
        #[arg(short, long)]
        script: Option<PathBuf>,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        max_steps: Option<u64>,
        /// Print the script's globals after the run
        #[arg(long)]
        globals: bool,
    },
    /// Parse a script and report every syntax error
    Check {
        #[arg(short, long)]
        script: PathBuf,
    },
    /// Print the token stream of a script
    Tokens {
        #[arg(short, long)]
        script: PathBuf,
    },
    /// List symbols with a CSV file in the data directory
    ListSymbols {
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub script: Option<PathBuf>,
    pub data_dir: Option<PathBuf>,
    pub symbol: Option<String>,
    pub output: Option<PathBuf>,
    pub max_steps: Option<u64>,
    pub print_globals: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub script: PathBuf,
    pub data_dir: PathBuf,
    pub symbol: String,
    /// `None` writes the trade log to stdout.
    pub output: Option<PathBuf>,
    pub interpreter: InterpreterConfig,
    pub print_globals: bool,
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run {
            script,
            config,
            data_dir,
            symbol,
            output,
            max_steps,
            globals,
        } => {
            let overrides = RunOverrides {
                script,
                data_dir,
                symbol,
                output,
                max_steps,
                print_globals: globals,
            };
            run_command(config.as_ref(), overrides)
        }
        Command::Check { script } => {
            init_logging(DEFAULT_LOG_LEVEL);
            run_check(&script)
        }
        Command::Tokens { script } => {
            init_logging(DEFAULT_LOG_LEVEL);
            run_tokens(&script)
        }
        Command::ListSymbols { data_dir, config } => run_list_symbols(data_dir, config.as_ref()),
    }
}

/// Install the stderr subscriber. `RUST_LOG` wins over `default_level`.
/// Later calls are no-ops.
pub fn init_logging(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

fn load_optional_config(path: Option<&PathBuf>) -> Result<Option<FileConfigAdapter>, ExitCode> {
    let Some(path) = path else {
        return Ok(None);
    };
    eprintln!("Loading config from {}", path.display());
    let adapter = load_config(path)?;
    if let Err(e) = validate_config(&adapter) {
        eprintln!("error: {e}");
        return Err((&e).into());
    }
    for key in unknown_keys(&adapter) {
        eprintln!("warning: unrecognised config key {key}");
    }
    Ok(Some(adapter))
}

pub fn resolve_log_level(config: Option<&dyn ConfigPort>) -> String {
    config
        .and_then(|c| c.get_string("logging", "level"))
        .map(|level| level.to_lowercase())
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string())
}

fn config_count(config: Option<&dyn ConfigPort>, key: &str) -> Result<Option<u64>, VedaError> {
    match config {
        Some(c) => c.get_count("interpreter", key),
        None => Ok(None),
    }
}

/// A step budget of 0, from either source, means unlimited.
pub fn build_interpreter_config(
    config: Option<&dyn ConfigPort>,
    max_steps_override: Option<u64>,
) -> Result<InterpreterConfig, VedaError> {
    let max_steps = match max_steps_override {
        Some(steps) => steps,
        None => config_count(config, "max_steps")?.unwrap_or(0),
    };
    let max_call_depth = config_count(config, "max_call_depth")?
        .map_or(DEFAULT_MAX_CALL_DEPTH, |depth| depth.max(1) as usize);

    Ok(InterpreterConfig {
        max_steps: (max_steps > 0).then_some(max_steps),
        max_call_depth,
    })
}

pub fn build_run_settings(
    config: Option<&dyn ConfigPort>,
    overrides: RunOverrides,
) -> Result<RunSettings, VedaError> {
    let path = |section: &str, key: &str| config.and_then(|c| c.get_path(section, key));

    let script = overrides
        .script
        .or_else(|| path("script", "path"))
        .ok_or_else(|| VedaError::ConfigMissing {
            section: "script".into(),
            key: "path".into(),
        })?;
    let symbol = overrides
        .symbol
        .or_else(|| config.and_then(|c| c.get_string("data", "symbol")))
        .map(|s| s.trim().to_string())
        .ok_or_else(|| VedaError::ConfigMissing {
            section: "data".into(),
            key: "symbol".into(),
        })?;
    let data_dir = overrides
        .data_dir
        .or_else(|| path("data", "dir"))
        .unwrap_or_else(|| PathBuf::from("."));
    let output = overrides
        .output
        .or_else(|| path("output", "trades"));
    let print_globals = match config {
        Some(c) if !overrides.print_globals => {
            c.get_bool("output", "print_globals")?.unwrap_or(false)
        }
        _ => overrides.print_globals,
    };
    let interpreter = build_interpreter_config(config, overrides.max_steps)?;

    Ok(RunSettings {
        script,
        data_dir,
        symbol,
        output,
        interpreter,
        print_globals,
    })
}

fn run_command(config_path: Option<&PathBuf>, overrides: RunOverrides) -> ExitCode {
    let adapter = match load_optional_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let config = adapter.as_ref().map(|a| a as &dyn ConfigPort);
    init_logging(&resolve_log_level(config));

    let settings = match build_run_settings(config, overrides) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    let data_port = CsvAdapter::new(settings.data_dir.clone());
    run_pipeline(&data_port, &settings)
}

fn read_script(path: &Path) -> Result<String, ExitCode> {
    fs::read_to_string(path).map_err(|e| {
        eprintln!("error: failed to read script {}: {}", path.display(), e);
        ExitCode::from(&VedaError::Io(e))
    })
}

/// Load bars, run the script, and write the trade log. A runtime failure
/// still writes the trades emitted before it.
pub fn run_pipeline(data_port: &dyn DataPort, settings: &RunSettings) -> ExitCode {
    let source = match read_script(&settings.script) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let bars = match data_port.fetch_bars(&settings.symbol) {
        Ok(b) => b,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let market = MarketData::from_bars(&bars);
    if let Err(e) = market.validate() {
        eprintln!("error: {} ({})", e, settings.symbol);
        return (&e).into();
    }

    eprintln!(
        "Running {} on {} ({} bars)",
        settings.script.display(),
        settings.symbol,
        market.len()
    );

    match script::run_script(&source, Arc::new(market), settings.interpreter) {
        Ok(report) => {
            if let Err(e) = write_trade_log(settings.output.as_deref(), &report.trades) {
                eprintln!("error: failed to write trades: {e}");
                return (&e).into();
            }
            print_summary(&report.position);
            if settings.print_globals {
                print_globals(&report);
            }
            ExitCode::SUCCESS
        }
        Err(VedaError::Parse(e)) => {
            eprintln!(
                "error: failed to parse {}:\n{}",
                settings.script.display(),
                e.display_with_context(&source)
            );
            (&VedaError::Parse(e)).into()
        }
        Err(VedaError::Runtime(run_err)) => {
            eprintln!("error: {}", run_err);
            if let Err(e) = write_trade_log(settings.output.as_deref(), &run_err.trades) {
                eprintln!("error: failed to write trades: {e}");
            }
            print_summary(&PositionSummary::from_trades(&run_err.trades));
            (&VedaError::Runtime(run_err)).into()
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn write_trade_log(output: Option<&Path>, trades: &[TradeRecord]) -> Result<(), VedaError> {
    match output {
        Some(path) => {
            let file = fs::File::create(path)?;
            csv_adapter::write_trades(file, trades)?;
            eprintln!("Trades written to: {}", path.display());
            Ok(())
        }
        None => csv_adapter::write_trades(io::stdout().lock(), trades),
    }
}

fn print_summary(position: &PositionSummary) {
    eprintln!("\n=== Run Summary ===");
    eprintln!("Trades:           {}", position.trades_count);
    eprintln!("Bought:           {}", position.buy_quantity);
    eprintln!("Sold:             {}", position.sell_quantity);
    eprintln!("Net Position:     {}", position.quantity);
}

fn print_globals(report: &ScriptReport) {
    eprintln!("\n=== Globals ===");
    for (name, value) in &report.globals {
        eprintln!("  {} = {}", name, value);
    }
}

fn run_check(script_path: &PathBuf) -> ExitCode {
    let source = match read_script(script_path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let errors = script::check(&source);
    if errors.is_empty() {
        if let Ok(program) = script::compile(&source) {
            for name in script::shadowed_builtins(&program) {
                eprintln!("warning: '{}' shadows a built-in", name);
            }
        }
        eprintln!("{}: OK", script_path.display());
        return ExitCode::SUCCESS;
    }

    for err in &errors {
        eprintln!("{}\n", err.display_with_context(&source));
    }
    eprintln!("{}: {} error(s)", script_path.display(), errors.len());
    let first = VedaError::Parse(errors[0].clone());
    (&first).into()
}

fn run_tokens(script_path: &PathBuf) -> ExitCode {
    let source = match read_script(script_path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    for token in tokenize(&source) {
        println!(
            "{:>4}:{:<4} {:<14} {:?}",
            token.line, token.column, token.kind, token.lexeme
        );
    }
    ExitCode::SUCCESS
}

fn run_list_symbols(data_dir: Option<PathBuf>, config_path: Option<&PathBuf>) -> ExitCode {
    let adapter = match load_optional_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let config = adapter.as_ref().map(|a| a as &dyn ConfigPort);
    init_logging(&resolve_log_level(config));

    let data_dir = data_dir
        .or_else(|| config.and_then(|c| c.get_path("data", "dir")))
        .unwrap_or_else(|| PathBuf::from("."));

    let symbols = match CsvAdapter::new(data_dir.clone()).list_symbols() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    if symbols.is_empty() {
        eprintln!("No symbols found in {}", data_dir.display());
    } else {
        for symbol in &symbols {
            println!("{}", symbol);
        }
        eprintln!("{} symbols found", symbols.len());
    }
    ExitCode::SUCCESS
}
