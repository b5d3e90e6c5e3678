//! End-to-end scenario tests seeding the suite.
//!
//! These exercise the public API the way a caller outside the crate would:
//! build a candle buffer, run a backtest or grid search against it, drive a
//! live engine through a full start/tick/pause/stop cycle.

use std::sync::Arc;

use quant_core::backtest::run_backtest;
use quant_core::candle::{Candle, CandleBuffer};
use quant_core::decimal::Decimal;
use quant_core::exchange::{MockDataProvider, MockExecutionClient, Quote};
use quant_core::live::{LiveEngine, LiveEngineConfig, LiveState, SchedulingModel};
use quant_core::optimize::{generate_combinations, run_grid_search, Objective, OptimizationConfig};
use quant_core::runner::{RunKind, Runner};
use quant_core::strategy::dual_ma::DualMaStrategy;
use quant_core::strategy::{ParameterRange, ParameterSet, ParameterValue, Strategy, StrategyParameter};
use quant_core::time::{Timeframe, Timestamp, TradingPair};
use quant_core::types::BacktestConfig;

fn monotone_buffer(n: i64, start_close: i64) -> CandleBuffer {
    let mut buf = CandleBuffer::new();
    for i in 0..n {
        let close = Decimal::from_int(start_close + i);
        buf.append(Candle {
            timestamp: Timestamp::from_millis(i),
            open: close,
            high: close,
            low: close,
            close,
            volume: Decimal::from_int(1),
        })
        .unwrap();
    }
    buf
}

fn base_backtest_config() -> BacktestConfig {
    BacktestConfig {
        pair: TradingPair::new("BTC", "USDT"),
        timeframe: Timeframe::M1,
        start_time: Timestamp::from_millis(0),
        end_time: Timestamp::from_millis(0),
        initial_capital: Decimal::from_int(10_000),
        commission_rate: 0.0,
        slippage: 0.0,
        data_file: None,
    }
}

fn int_param(name: &str, min: i64, max: i64, step: i64) -> StrategyParameter {
    StrategyParameter {
        name: name.to_string(),
        default: ParameterValue::Integer(min),
        optimize: true,
        range: Some(ParameterRange::Integer { min, max, step }),
    }
}

fn build_dual_ma(params: &ParameterSet) -> Result<Box<dyn Strategy>, quant_core::EngineError> {
    let fast = params.get("fast").and_then(ParameterValue::as_i64).unwrap_or(5) as usize;
    let slow = params.get("slow").and_then(ParameterValue::as_i64).unwrap_or(20) as usize;
    Ok(Box::new(DualMaStrategy::new(fast, slow)))
}

// Scenario 3: optimizer over 2 ranges, 9 combinations, parallel == sequential.
#[test]
fn optimizer_over_two_ranges_is_exhaustive_and_deterministic_under_parallelism() {
    let parameters = vec![int_param("fast", 5, 15, 5), int_param("slow", 20, 30, 5)];
    let combos = generate_combinations(&parameters).unwrap();
    assert_eq!(combos.len(), 9);

    let buffer = monotone_buffer(60, 100);

    let mut config = OptimizationConfig {
        objective: Objective::MaximizeProfitFactor,
        backtest_config: base_backtest_config(),
        parameters,
        max_combinations: None,
        enable_parallel: true,
        bars_per_year: 365.0 * 24.0 * 60.0,
    };

    let parallel = run_grid_search(&config, &buffer, build_dual_ma, || 0).unwrap();
    assert_eq!(parallel.total_combinations, 9);
    assert_eq!(parallel.all_results.len(), 9);
    let max_score = parallel.all_results.iter().map(|r| r.score).fold(f64::MIN, f64::max);
    assert_eq!(parallel.best_score, max_score);

    config.enable_parallel = false;
    let sequential = run_grid_search(&config, &buffer, build_dual_ma, || 0).unwrap();
    assert_eq!(sequential.best_params, parallel.best_params);
}

// Scenario 5: live runner crash-safety — start, tick through the synthetic
// candle fallback, pause, stop, and confirm the runner's status machine
// lands back in `Stopped` with no orders submitted.
#[tokio::test]
async fn live_runner_handles_start_tick_pause_stop_without_a_provider_quote() {
    let runner = Runner::new(RunKind::Live);
    runner.begin().unwrap();

    let provider = Arc::new(MockDataProvider::new());
    let pair = TradingPair::new("BTC", "USDT");
    provider.push_quote(
        &pair,
        Quote {
            bid: Decimal::from_int(99),
            ask: Decimal::from_int(101),
            last: Decimal::from_int(100),
            timestamp: Timestamp::from_millis(0),
        },
    );
    let client = Arc::new(MockExecutionClient::new(Decimal::from_int(10_000), Decimal::from_int(100)));

    let config = LiveEngineConfig {
        pair: pair.clone(),
        scheduling: SchedulingModel::ClockDriven,
        tick_interval_ms: 100,
        balance_update_interval_ms: 10_000,
        heartbeat_interval_ms: 1_000,
        max_reconnect_attempts: 3,
    };
    let mut engine = LiveEngine::new(config, provider, client, None);
    engine.start().await.unwrap();
    assert_eq!(engine.state(), LiveState::Running);

    engine.tick(Timestamp::from_millis(0)).await.unwrap();
    assert_eq!(engine.stats().orders_submitted, 0);

    engine.pause().unwrap();
    assert_eq!(engine.state(), LiveState::Paused);
    engine.resume().unwrap();

    let engine = Arc::new(tokio::sync::Mutex::new(engine));
    runner.spawn(move |_runner| {
        let engine = Arc::clone(&engine);
        async move { engine.lock().await.tick(Timestamp::from_millis(0)).await.map(|_| ()) }
    });

    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    let status = tokio::time::timeout(std::time::Duration::from_millis(200), async {
        runner.stop().await;
        runner.status()
    })
    .await
    .expect("runner joined in time");
    assert_eq!(status, quant_core::runner::RunnerStatus::Stopped);
}
