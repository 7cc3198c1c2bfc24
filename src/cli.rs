//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::adapters::csv_adapter::CsvPriceAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::backtest::{self as backtest_engine, BacktestConfig, BacktestResult};
use crate::domain::config_validation::{
    parse_count, parse_date, strategy_sections, validate_backtest_config,
    validate_strategy_sections,
};
use crate::domain::error::AllocsimError;
use crate::domain::meta::{CurrentAllocation, MetaConfig};
use crate::domain::metrics::Metrics;
use crate::domain::strategy::{AllocationRule, rule_from_config};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::PriceDataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "allocsim", about = "Multi-strategy asset allocation backtester")]
pub struct Cli {
    /// Verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a backtest
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        /// Price CSV, overrides [backtest] prices
        #[arg(short, long)]
        prices: Option<PathBuf>,
        /// Report directory, overrides [backtest] output_dir
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show data coverage of a price file
    Info {
        #[arg(short, long)]
        prices: PathBuf,
        #[arg(long)]
        ticker: Option<String>,
    },
}

impl Cli {
    /// Log to stderr at a level derived from the `-v` count.
    pub fn init_logging(&self) {
        let level = match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            2 => Level::DEBUG,
            _ => Level::TRACE,
        };

        let subscriber = FmtSubscriber::builder()
            .with_max_level(level)
            .with_target(false)
            .with_writer(std::io::stderr)
            .finish();

        // already installed when run() is called more than once in-process
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

pub fn run(cli: Cli) -> ExitCode {
    cli.init_logging();
    match cli.command {
        Command::Backtest {
            config,
            prices,
            output,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config)
            } else {
                run_backtest(&config, prices.as_ref(), output.as_ref())
            }
        }
        Command::Validate { config } => run_validate(&config),
        Command::Info { prices, ticker } => run_info(&prices, ticker.as_deref()),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = AllocsimError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

pub fn build_backtest_config(adapter: &dyn ConfigPort) -> Result<BacktestConfig, AllocsimError> {
    let warmup = parse_count(adapter, "backtest", "warmup_months", 24)?;
    Ok(BacktestConfig {
        start_date: parse_date(adapter, "backtest", "start_date")?,
        end_date: parse_date(adapter, "backtest", "end_date")?,
        warmup_months: u32::try_from(warmup).map_err(|_| {
            AllocsimError::invalid("backtest", "warmup_months", "warm-up is too long")
        })?,
    })
}

/// One rule per `[strategy.<id>]` section, in file order.
pub fn build_rules(adapter: &dyn ConfigPort) -> Result<Vec<Box<dyn AllocationRule>>, AllocsimError> {
    strategy_sections(adapter)
        .iter()
        .map(|section| rule_from_config(adapter, section))
        .collect()
}

/// Every instrument any rule reads, in order of first appearance.
pub fn required_tickers(rules: &[Box<dyn AllocationRule>]) -> Vec<String> {
    let mut tickers: Vec<String> = Vec::new();
    for rule in rules {
        for ticker in rule.required_instruments() {
            if !tickers.contains(&ticker) {
                tickers.push(ticker);
            }
        }
    }
    tickers
}

/// Everything a backtest needs from the config file.
pub struct RunPlan {
    pub backtest: BacktestConfig,
    pub rules: Vec<Box<dyn AllocationRule>>,
    pub meta: MetaConfig,
}

pub fn build_plan(adapter: &dyn ConfigPort) -> Result<RunPlan, AllocsimError> {
    validate_backtest_config(adapter)?;
    validate_strategy_sections(adapter)?;
    let backtest = build_backtest_config(adapter)?;
    let rules = build_rules(adapter)?;
    let meta = MetaConfig::from_config(adapter, &strategy_sections(adapter))?;
    Ok(RunPlan {
        backtest,
        rules,
        meta,
    })
}

fn run_backtest(
    config_path: &PathBuf,
    prices_override: Option<&PathBuf>,
    output_override: Option<&PathBuf>,
) -> ExitCode {
    // Stage 1: Load config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    // Stage 2-3: Validate and build rules
    let plan = match build_plan(&adapter) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 4: Fetch prices
    let prices_path = match prices_override
        .cloned()
        .or_else(|| adapter.get_string("backtest", "prices").map(PathBuf::from))
    {
        Some(p) => p,
        None => {
            let err = AllocsimError::missing("backtest", "prices");
            eprintln!("error: {err} (or pass --prices)");
            return (&err).into();
        }
    };
    let data_port = CsvPriceAdapter::new(prices_path);
    let tickers = required_tickers(&plan.rules);
    let bt_config = &plan.backtest;
    let prices = match data_port.fetch_prices(&tickers, bt_config.data_start(), bt_config.end_date)
    {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 5: Run backtest
    eprintln!(
        "Running backtest: {} strategies, {} tickers, {} to {}",
        plan.rules.len(),
        tickers.len(),
        bt_config.start_date,
        bt_config.end_date,
    );
    eprintln!("  Loaded: {} dates", prices.len());
    let result = match backtest_engine::run_backtest(prices, &plan.rules, &plan.meta, bt_config) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 6: Print summary
    print_summary(&result);

    // Stage 7: Write reports
    let output = output_override
        .cloned()
        .or_else(|| adapter.get_string("backtest", "output_dir").map(PathBuf::from));
    if let Some(dir) = output {
        let written = CsvReportAdapter::new(dir.clone()).and_then(|r| r.write(&result));
        if let Err(e) = written {
            eprintln!("error: failed to write reports: {e}");
            return (&e).into();
        }
        eprintln!("\nReports written to: {}", dir.display());
    }
    ExitCode::SUCCESS
}

fn print_metrics_header() {
    eprintln!(
        "{:<28} {:>9} {:>8} {:>7} {:>8} {:>8} {:>6}",
        "", "Return", "CAGR", "Sharpe", "Sortino", "MaxDD", "MAR"
    );
}

fn print_metrics_row(label: &str, metrics: &Metrics) {
    eprintln!(
        "{:<28} {:>8.2}% {:>7.2}% {:>7.2} {:>8.2} {:>7.1}% {:>6.2}",
        label,
        metrics.total_return * 100.0,
        metrics.cagr * 100.0,
        metrics.sharpe_ratio,
        metrics.sortino_ratio,
        -metrics.max_drawdown * 100.0,
        metrics.mar_ratio,
    );
}

pub fn print_summary(result: &BacktestResult) {
    eprintln!("\n=== Sub-strategy Results ===");
    print_metrics_header();
    for strategy in &result.strategies {
        print_metrics_row(
            &strategy.name,
            &Metrics::compute(&strategy.simulation.nav_points()),
        );
        print_metrics_row(
            &format!("  {} (equal weight)", strategy.name),
            &Metrics::compute(&strategy.benchmark.nav_points()),
        );
    }

    eprintln!("\n=== Meta Results ===");
    print_metrics_header();
    for variant in &result.meta.variants {
        print_metrics_row(&variant.label, &Metrics::compute(&variant.simulation.nav_points()));
    }
    print_metrics_row(
        "equal weight benchmark",
        &Metrics::compute(&result.meta.benchmark.nav_points()),
    );

    for variant in &result.meta.variants {
        print_current(&variant.label, &variant.current);
    }
}

/// Current allocation goes to stdout so it can be piped on.
fn print_current(label: &str, current: &CurrentAllocation) {
    let date = current
        .date
        .map(|d| d.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!("\n[{label}] current allocation as of {date}");
    for (instrument, weight) in current.weights.iter() {
        if weight.abs() < 1e-12 {
            continue;
        }
        let parts: Vec<String> = current
            .contributions
            .iter()
            .filter(|c| c.weights.weight(instrument).abs() >= 1e-12)
            .map(|c| format!("{} {:.1}%", c.strategy, c.weights.weight(instrument) * 100.0))
            .collect();
        println!("  {:<10} {:>6.2}%  ({})", instrument, weight * 100.0, parts.join(", "));
    }
    println!("  {:<10} {:>6.2}%", "cash", current.weights.cash() * 100.0);
}

fn describe_plan(plan: &RunPlan) {
    eprintln!(
        "\nBacktest: {} to {} (warm-up {} months from {})",
        plan.backtest.start_date,
        plan.backtest.end_date,
        plan.backtest.warmup_months,
        plan.backtest.data_start(),
    );
    eprintln!("\nStrategies:");
    for rule in &plan.rules {
        eprintln!("  {} [{}]", rule.name(), rule.calendar());
        eprintln!("    traded:   {}", rule.traded_instruments().join(", "));
        let signal_only: Vec<String> = rule
            .required_instruments()
            .into_iter()
            .filter(|t| !rule.traded_instruments().contains(t))
            .collect();
        if !signal_only.is_empty() {
            eprintln!("    signals:  {}", signal_only.join(", "));
        }
    }
    eprintln!("\nMeta [{}]:", plan.meta.calendar);
    let labels: Vec<&str> = plan.meta.allocations.iter().map(|a| a.label()).collect();
    eprintln!("  allocations: {}", labels.join(", "));
    eprintln!("\nTickers: {}", required_tickers(&plan.rules).join(", "));
}

pub fn run_dry_run(config_path: &PathBuf) -> ExitCode {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let plan = match build_plan(&adapter) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    eprintln!("Config validated successfully");
    describe_plan(&plan);

    eprintln!("\nDry run complete: configuration is valid");
    ExitCode::SUCCESS
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    match build_plan(&adapter) {
        Ok(plan) => describe_plan(&plan),
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    }

    eprintln!("\nConfiguration is valid.");
    ExitCode::SUCCESS
}

fn run_info(prices_path: &PathBuf, ticker: Option<&str>) -> ExitCode {
    let adapter = CsvPriceAdapter::new(prices_path.clone());
    let tickers = match ticker {
        Some(t) => vec![t.to_string()],
        None => match adapter.list_tickers() {
            Ok(t) => t,
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        },
    };

    for t in &tickers {
        match adapter.get_data_range(t) {
            Ok(Some((min_date, max_date, count))) => {
                println!("{}: {} quotes, {} to {}", t, count, min_date, max_date);
            }
            Ok(None) => {
                eprintln!("{}: no data found", t);
            }
            Err(e) => {
                eprintln!("error: {e}");
                return (&e).into();
            }
        }
    }
    ExitCode::SUCCESS
}
