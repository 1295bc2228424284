//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::{write_trades, write_trades_csv, CsvAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{self as engine, BacktestRequest, BacktestResult};
use crate::domain::config_validation::{
    load_backtest_request, load_optimization_request, unknown_identifiers, validate_ranges,
    validate_request,
};
use crate::domain::error::BarsmithError;
use crate::domain::optimizer::{format_params, OptimizationEntry};
use crate::domain::stats::{Metric, Stats};
use crate::domain::strategy::StrategySource;
use crate::ports::config_port::ConfigPort;

const DEFAULT_DATA_DIR: &str = "data";

#[derive(Parser, Debug)]
#[command(name = "barsmith", about = "Indicator backtester and parameter optimizer")]
pub struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a single backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Write the trade ledger here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Grid-search the [optimize] ranges and rank the results
    Optimize {
        #[arg(short, long)]
        config: PathBuf,
        /// Only print the best N combinations
        #[arg(long)]
        top: Option<usize>,
    },
    /// Parse and check a configuration without running it
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr).with_target(false).compact())
        .with(filter)
        .init();
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            output,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config)
            } else {
                run_backtest(&config, output.as_deref())
            }
        }
        Command::Optimize { config, top } => run_optimize(&config, top),
        Command::Validate { config } => run_validate(&config),
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    })
}

/// Print `err`, with a caret under the failing column for condition syntax
/// errors, and map it to an exit code.
fn fail(err: &BarsmithError, strategy: Option<&StrategySource>) -> ExitCode {
    match (err, strategy) {
        (BarsmithError::ConditionParse { field, source }, Some(s)) => {
            let input = condition_source(s, field).unwrap_or_default();
            eprintln!(
                "error: failed to parse {field}:\n{}",
                source.display_with_context(input)
            );
        }
        _ => eprintln!("error: {err}"),
    }
    err.into()
}

fn condition_source<'a>(strategy: &'a StrategySource, field: &str) -> Option<&'a str> {
    match field {
        "long_entry" => Some(strategy.long_entry.as_str()),
        "short_entry" => Some(strategy.short_entry.as_str()),
        "exit_condition" => strategy.exit_condition.as_deref(),
        _ => None,
    }
}

fn data_port(config: &dyn ConfigPort) -> CsvAdapter {
    let dir = config
        .get_string("backtest", "data_dir")
        .unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
    CsvAdapter::new(PathBuf::from(dir))
}

fn load_request(adapter: &dyn ConfigPort) -> Result<BacktestRequest, ExitCode> {
    load_backtest_request(adapter).map_err(|e| fail(&e, None))
}

fn run_backtest(config_path: &Path, output_path: Option<&Path>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let request = match load_request(&adapter) {
        Ok(r) => r,
        Err(code) => return code,
    };

    eprintln!(
        "Running backtest: {} {} from {} to {}",
        request.symbol, request.timeframe, request.start_date, request.end_date
    );
    let result = match engine::run_backtest(&data_port(&adapter), &request) {
        Ok(r) => r,
        Err(e) => return fail(&e, Some(&request.strategy)),
    };

    print_summary(&result);

    let written = match output_path {
        Some(path) => write_trades_csv(path, &result.trades).map(|()| {
            eprintln!("\nTrades written to: {}", path.display());
        }),
        None => write_trades(io::stdout().lock(), &result.trades),
    };
    match written {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => fail(&e, None),
    }
}

fn print_summary(result: &BacktestResult) {
    let stats = &result.stats;
    eprintln!("\n=== Results ===");
    eprintln!("Total Return:     {:.2}%", stats.total_return);
    eprintln!("Final Equity:     {:.2}", stats.final_equity);
    eprintln!("Sharpe Ratio:     {:.2}", stats.sharpe_ratio);
    eprintln!("Max Drawdown:     -{:.2}%", stats.max_drawdown);
    eprintln!(
        "Total Trades:     {} ({} won, {} lost)",
        stats.total_trades, stats.winning_trades, stats.losing_trades
    );
    eprintln!("Win Rate:         {:.1}%", stats.win_rate);
    eprintln!("Profit Factor:    {:.2}", stats.profit_factor);
    eprintln!("Avg Win / Loss:   {:.2} / {:.2}", stats.avg_win, stats.avg_loss);
    eprintln!(
        "Largest Win/Loss: {:.2} / {:.2}",
        stats.largest_win, stats.largest_loss
    );
}

pub fn run_dry_run(config_path: &Path) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let request = match load_request(&adapter) {
        Ok(r) => r,
        Err(code) => return code,
    };
    let strategy = match validate_request(&request) {
        Ok(s) => s,
        Err(e) => return fail(&e, Some(&request.strategy)),
    };
    eprintln!("Config validated successfully");

    eprintln!("\nStrategy rules (parsed):");
    for (field, expr) in strategy.conditions() {
        eprintln!("  {field}: {expr}");
    }

    eprintln!("\nIndicators to compute:");
    for spec in &request.indicators {
        eprintln!("  {} -> {}", spec, spec.output_names().join(", "));
    }
    eprintln!("Warm-up bars: {}", request.warmup());

    let csv = data_port(&adapter).csv_path(&request.symbol, request.timeframe);
    eprintln!("\nData file: {}", csv.display());
    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_optimize(config_path: &Path, top: Option<usize>) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let request = match load_optimization_request(&adapter) {
        Ok(r) => r,
        Err(e) => return fail(&e, None),
    };

    let entries = match engine::run_optimization(&data_port(&adapter), &request) {
        Ok(e) => e,
        Err(e) => return fail(&e, Some(&request.base.strategy)),
    };

    let failed = entries.iter().filter(|e| e.error.is_some()).count();
    eprintln!(
        "\n{} combinations evaluated, {} failed, ranked by {}",
        entries.len(),
        failed,
        request.metric
    );

    let shown = top.unwrap_or(entries.len()).min(entries.len());
    print!("{}", format_ranking(&entries[..shown], request.metric));
    ExitCode::SUCCESS
}

/// Ranked table, one row per combination.
pub fn format_ranking(entries: &[OptimizationEntry], metric: Metric) -> String {
    let mut out = format!(
        "{:>4}  {:>14}  {:>8}  {:>10}  {:>8}  params\n",
        "rank",
        metric.as_str(),
        "trades",
        "return%",
        "maxdd%"
    );
    for (i, entry) in entries.iter().enumerate() {
        let params = format_params(&entry.params);
        match (&entry.stats, &entry.error) {
            (Some(stats), _) => out.push_str(&format_row(i + 1, entry.score, stats, &params)),
            (None, error) => out.push_str(&format!(
                "{:>4}  {:>14}  {:>8}  {:>10}  {:>8}  {}  (failed: {})\n",
                i + 1,
                "-",
                "-",
                "-",
                "-",
                params,
                error.as_deref().unwrap_or("unknown error")
            )),
        }
    }
    out
}

fn format_row(rank: usize, score: f64, stats: &Stats, params: &str) -> String {
    format!(
        "{:>4}  {:>14.4}  {:>8}  {:>10.2}  {:>8.2}  {}\n",
        rank, score, stats.total_trades, stats.total_return, stats.max_drawdown, params
    )
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    let request = match load_request(&adapter) {
        Ok(r) => r,
        Err(code) => return code,
    };
    let strategy = match validate_request(&request) {
        Ok(s) => s,
        Err(e) => return fail(&e, Some(&request.strategy)),
    };

    for (field, expr) in strategy.conditions() {
        eprintln!("\n{field}:");
        eprintln!("  Parsed: {expr}");
        eprintln!("  Raw:    {}", condition_source(&request.strategy, field).unwrap_or(""));
    }

    let unknown = unknown_identifiers(&strategy, &request.indicators);
    if !unknown.is_empty() {
        eprintln!("\nUnknown identifiers (always undefined):");
        for (field, name) in &unknown {
            eprintln!("  {field}: {name}");
        }
    }

    if !adapter.keys("optimize").is_empty() {
        match load_optimization_request(&adapter)
            .and_then(|opt| validate_ranges(&opt.ranges).map(|()| opt))
        {
            Ok(opt) => {
                eprintln!(
                    "\nOptimization: {} parameter(s), ranked by {}",
                    opt.ranges.len(),
                    opt.metric
                );
                for (param, range) in &opt.ranges {
                    eprintln!(
                        "  {param}: {} to {} step {} ({} values)",
                        range.min,
                        range.max,
                        range.step,
                        range.count()
                    );
                }
            }
            Err(e) => return fail(&e, None),
        }
    }

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}
