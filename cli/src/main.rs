//! `quant` — command-line driver for backtests, grid-search optimization,
//! and live/paper runs, matching the teacher's `main.rs` shape: one
//! `tracing-subscriber` init at the process edge, `dotenv` loaded before
//! `AppConfig::from_env()`, engine errors wrapped in `anyhow::Context`.
use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use quant_core::backtest::run_backtest;
use quant_core::candle::{Candle, CandleBuffer};
use quant_core::config::AppConfig;
use quant_core::decimal::Decimal;
use quant_core::optimize::{run_grid_search, Objective, OptimizationConfig};
use quant_core::performance::analyze;
use quant_core::strategy::factory::{build_strategy, StrategyConfig};
use quant_core::strategy::StrategyParameter;
use quant_core::time::{Timeframe, Timestamp, TradingPair};
use quant_core::types::BacktestConfig;

#[derive(Parser)]
#[command(name = "quant", about = "Backtest, optimize, and run trading strategies")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a single backtest from a strategy config and a candle CSV file.
    Backtest {
        #[arg(long)]
        strategy_config: PathBuf,
        #[arg(long)]
        candles: PathBuf,
        #[arg(long, default_value = "10000")]
        initial_capital: String,
        #[arg(long, default_value = "0.0004")]
        commission_rate: f64,
        #[arg(long, default_value = "0.0001")]
        slippage: f64,
        #[arg(long, default_value = "1m")]
        timeframe: String,
    },
    /// Grid-search a strategy's optimized parameters over a candle CSV file.
    Optimize {
        #[arg(long)]
        strategy_config: PathBuf,
        #[arg(long)]
        candles: PathBuf,
        #[arg(long, default_value = "maximize_sharpe_ratio")]
        objective: String,
        #[arg(long)]
        output_csv: Option<PathBuf>,
    },
}

/// Minimal CSV reader: `timestamp_ms,open,high,low,close,volume` with a
/// header row.
fn load_candles(path: &PathBuf) -> Result<CandleBuffer> {
    let mut reader = csv::Reader::from_path(path).with_context(|| format!("opening candle file {path:?}"))?;
    let mut buffer = CandleBuffer::new();
    for record in reader.records() {
        let record = record.with_context(|| format!("reading candle row from {path:?}"))?;
        let timestamp = Timestamp::from_millis(record[0].parse()?);
        let candle = Candle {
            timestamp,
            open: Decimal::from_string(&record[1])?,
            high: Decimal::from_string(&record[2])?,
            low: Decimal::from_string(&record[3])?,
            close: Decimal::from_string(&record[4])?,
            volume: Decimal::from_string(&record[5])?,
        };
        buffer.append(candle)?;
    }
    Ok(buffer)
}

fn parse_objective(name: &str) -> Result<Objective> {
    Ok(match name {
        "maximize_sharpe_ratio" => Objective::MaximizeSharpeRatio,
        "maximize_profit_factor" => Objective::MaximizeProfitFactor,
        "maximize_win_rate" => Objective::MaximizeWinRate,
        "minimize_max_drawdown" => Objective::MinimizeMaxDrawdown,
        "maximize_net_profit" => Objective::MaximizeNetProfit,
        "maximize_total_return" => Objective::MaximizeTotalReturn,
        "maximize_sortino_ratio" => Objective::MaximizeSortinoRatio,
        "maximize_calmar_ratio" => Objective::MaximizeCalmarRatio,
        "maximize_omega_ratio" => Objective::MaximizeOmegaRatio,
        "maximize_tail_ratio" => Objective::MaximizeTailRatio,
        "maximize_stability" => Objective::MaximizeStability,
        "maximize_risk_adjusted_return" => Objective::MaximizeRiskAdjustedReturn,
        other => anyhow::bail!("unknown objective {other:?}"),
    })
}

fn load_strategy_config(path: &PathBuf) -> Result<StrategyConfig> {
    let raw: serde_json::Value =
        serde_json::from_reader(File::open(path).with_context(|| format!("opening {path:?}"))?)
            .with_context(|| format!("parsing strategy config {path:?}"))?;
    StrategyConfig::from_json(&raw).map_err(anyhow::Error::from)
}

/// Reads the `optimize_parameters` array out of the same config file, used
/// only by the `optimize` subcommand (the `backtest` path ignores it).
fn load_optimize_parameters(path: &PathBuf) -> Result<Vec<StrategyParameter>> {
    let raw: serde_json::Value =
        serde_json::from_reader(File::open(path).with_context(|| format!("opening {path:?}"))?)?;
    let params = raw.get("optimize_parameters").cloned().unwrap_or(serde_json::Value::Array(vec![]));
    Ok(serde_json::from_value(params).with_context(|| "parsing optimize_parameters")?)
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();
    dotenv::dotenv().ok();
    let _config = AppConfig::from_env()?;

    let cli = Cli::parse();
    match cli.command {
        Command::Backtest { strategy_config, candles, initial_capital, commission_rate, slippage, timeframe } => {
            let config = load_strategy_config(&strategy_config)?;
            let strategy = build_strategy(&config)?;
            let buffer = load_candles(&candles)?;
            let pair = TradingPair::new(config.pair_base, config.pair_quote);
            let tf = Timeframe::from_string(&timeframe).map_err(|e| anyhow::anyhow!(e.message()))?;

            let start_time = buffer.get(0).map(|c| c.timestamp).unwrap_or(Timestamp::from_millis(0));
            let end_time = buffer.last().map(|c| c.timestamp).unwrap_or(Timestamp::from_millis(0));

            let backtest_config = BacktestConfig {
                pair,
                timeframe: tf,
                start_time,
                end_time,
                initial_capital: Decimal::from_string(&initial_capital)?,
                commission_rate,
                slippage,
                data_file: Some(candles.display().to_string()),
            };

            info!(strategy = strategy.name(), bars = buffer.len(), "running backtest");
            let result = run_backtest(strategy.as_ref(), buffer, backtest_config)?;
            let report = analyze(&result, 365.0 * 24.0 * 60.0);
            println!("{report}");
            println!("trades: {}  rejected_entries: {}", result.trades.len(), result.rejected_entries);
        }
        Command::Optimize { strategy_config, candles, objective, output_csv } => {
            let config = load_strategy_config(&strategy_config)?;
            let parameters = load_optimize_parameters(&strategy_config)?;
            let buffer = load_candles(&candles)?;
            let pair = TradingPair::new(config.pair_base.clone(), config.pair_quote.clone());

            let start_time = buffer.get(0).map(|c| c.timestamp).unwrap_or(Timestamp::from_millis(0));
            let end_time = buffer.last().map(|c| c.timestamp).unwrap_or(Timestamp::from_millis(0));
            let backtest_config = BacktestConfig {
                pair,
                timeframe: Timeframe::M1,
                start_time,
                end_time,
                initial_capital: Decimal::from_int(10_000),
                commission_rate: 0.0004,
                slippage: 0.0001,
                data_file: Some(candles.display().to_string()),
            };

            let opt_config = OptimizationConfig {
                objective: parse_objective(&objective)?,
                backtest_config,
                parameters,
                max_combinations: None,
                enable_parallel: true,
                bars_per_year: 365.0 * 24.0 * 60.0,
            };

            let strategy_name = config.strategy.clone();
            let base_params = config.parameters.clone();
            let build = move |overrides: &quant_core::strategy::ParameterSet| {
                let mut merged = base_params.clone();
                for (k, v) in overrides {
                    merged.insert(k.clone(), parameter_to_json(v));
                }
                let cfg = StrategyConfig {
                    strategy: strategy_name.clone(),
                    pair_base: config.pair_base.clone(),
                    pair_quote: config.pair_quote.clone(),
                    parameters: merged,
                };
                build_strategy(&cfg).map_err(Into::into)
            };

            info!(total = opt_config.parameters.len(), "starting grid search");
            let start = std::time::Instant::now();
            let result = run_grid_search(&opt_config, &buffer, build, move || start.elapsed().as_millis() as u64)?;

            println!("best_score: {:.6}", result.best_score);
            println!("best_params: {:?}", result.best_params);
            println!("total_combinations: {}", result.total_combinations);

            if let Some(path) = output_csv {
                let file = File::create(&path).with_context(|| format!("creating {path:?}"))?;
                quant_core::optimize::write_csv_report(&result, file)?;
            }
        }
    }
    Ok(())
}

fn parameter_to_json(value: &quant_core::strategy::ParameterValue) -> serde_json::Value {
    use quant_core::strategy::ParameterValue;
    match value {
        ParameterValue::Integer(v) => serde_json::json!(v),
        ParameterValue::Decimal(v) => serde_json::json!(v.to_float()),
        ParameterValue::Boolean(v) => serde_json::json!(v),
        ParameterValue::Discrete(v) => serde_json::json!(v),
    }
}
