/// optimize.rs — Combination generator & parallel grid search
///
/// Workers partition the combination index space into contiguous ranges and
/// own their own strategy/engine instances (`rayon`'s scoped thread pool);
/// the only shared state is an atomic progress counter and the disjoint
/// result slots each worker writes into. The winning-score scan happens
/// single-threaded after the join, same discipline the teacher's
/// `backtest.rs` uses for its own single-run reporting, generalized here to
/// many runs.
use std::sync::atomic::{AtomicU64, Ordering};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::backtest::run_backtest;
use crate::candle::CandleBuffer;
use crate::error::EngineError;
use crate::performance::analyze;
use crate::strategy::{ParameterSet, ParameterValue, Strategy, StrategyParameter};
use crate::types::{BacktestConfig, BacktestResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Objective {
    MaximizeSharpeRatio,
    MaximizeProfitFactor,
    MaximizeWinRate,
    MinimizeMaxDrawdown,
    MaximizeNetProfit,
    MaximizeTotalReturn,
    MaximizeSortinoRatio,
    MaximizeCalmarRatio,
    MaximizeOmegaRatio,
    MaximizeTailRatio,
    MaximizeStability,
    MaximizeRiskAdjustedReturn,
}

impl Objective {
    fn score(self, result: &BacktestResult, bars_per_year: f64) -> f64 {
        let metrics = analyze(result, bars_per_year);
        match self {
            Objective::MaximizeSharpeRatio => metrics.sharpe_ratio,
            Objective::MaximizeProfitFactor => metrics.profit_factor,
            Objective::MaximizeWinRate => metrics.win_rate,
            Objective::MinimizeMaxDrawdown => -metrics.max_drawdown,
            Objective::MaximizeNetProfit => metrics.net_profit,
            Objective::MaximizeTotalReturn => metrics.total_return,
            Objective::MaximizeSortinoRatio => metrics.sortino_ratio,
            Objective::MaximizeCalmarRatio => metrics.calmar_ratio,
            Objective::MaximizeOmegaRatio => metrics.omega_ratio,
            Objective::MaximizeTailRatio => metrics.tail_ratio,
            Objective::MaximizeStability => metrics.stability_r2,
            Objective::MaximizeRiskAdjustedReturn => {
                0.5 * metrics.sharpe_ratio.max(0.0)
                    + 0.3 * metrics.profit_factor.min(3.0) / 3.0
                    + 0.2 * metrics.win_rate
            }
        }
    }
}

/// Upper bound on `generate_combinations`'s output; beyond this the
/// generator fails fast rather than allocate an unreasonable vector.
const MAX_GENERATED_COMBINATIONS: u64 = 1u64 << 32;

/// Enumerates the Cartesian product over the optimized parameters, holding
/// the rest at their defaults. The first declared optimized parameter is
/// the slowest-varying axis.
pub fn generate_combinations(params: &[StrategyParameter]) -> Result<Vec<ParameterSet>, EngineError> {
    for p in params {
        p.validate()?;
    }

    let optimized: Vec<&StrategyParameter> = params.iter().filter(|p| p.optimize).collect();
    let fixed: Vec<&StrategyParameter> = params.iter().filter(|p| !p.optimize).collect();

    if optimized.is_empty() {
        let mut set = ParameterSet::new();
        for p in &fixed {
            set.insert(p.name.clone(), p.default.clone());
        }
        return Ok(vec![set]);
    }

    let mut total: u64 = 1;
    let mut axes: Vec<Vec<ParameterValue>> = Vec::with_capacity(optimized.len());
    for p in &optimized {
        let range = p.range.as_ref().expect("validate() guarantees range present when optimize");
        let count = range
            .count()
            .ok_or_else(|| EngineError::configuration(format!("parameter {:?} has an invalid range", p.name)))?;
        total = total
            .checked_mul(count)
            .ok_or_else(|| EngineError::backtest("too many combinations: overflow"))?;
        if total > MAX_GENERATED_COMBINATIONS {
            return Err(EngineError::backtest(format!(
                "too many combinations: {total} exceeds the 2^32 limit"
            )));
        }
        axes.push(range.values());
    }

    let mut combinations = Vec::with_capacity(total as usize);
    let mut indices = vec![0usize; axes.len()];
    loop {
        let mut set = ParameterSet::new();
        for p in &fixed {
            set.insert(p.name.clone(), p.default.clone());
        }
        for (axis_idx, p) in optimized.iter().enumerate() {
            set.insert(p.name.clone(), axes[axis_idx][indices[axis_idx]].clone());
        }
        combinations.push(set);

        // Advance like an odometer; the *last* axis is fastest-varying so
        // the first declared parameter changes slowest.
        let mut cursor = indices.len();
        loop {
            if cursor == 0 {
                return Ok(combinations);
            }
            cursor -= 1;
            indices[cursor] += 1;
            if indices[cursor] < axes[cursor].len() {
                break;
            }
            indices[cursor] = 0;
            if cursor == 0 {
                return Ok(combinations);
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParameterResult {
    pub params: ParameterSet,
    pub backtest_result: BacktestResult,
    pub score: f64,
}

#[derive(Debug, Clone)]
pub struct OptimizationConfig {
    pub objective: Objective,
    pub backtest_config: BacktestConfig,
    pub parameters: Vec<StrategyParameter>,
    pub max_combinations: Option<u64>,
    pub enable_parallel: bool,
    pub bars_per_year: f64,
}

pub struct OptimizationResult {
    pub objective: Objective,
    pub best_params: ParameterSet,
    pub best_score: f64,
    pub all_results: Vec<ParameterResult>,
    pub total_combinations: u64,
    pub elapsed_ms: u64,
}

/// Runs a full grid search. `build_strategy` and `candles` are cloned per
/// combination so each worker owns an independent strategy instance and
/// buffer; the engine never shares mutable state across workers.
pub fn run_grid_search(
    config: &OptimizationConfig,
    candles: &CandleBuffer,
    build_strategy: impl Fn(&ParameterSet) -> Result<Box<dyn Strategy>, EngineError> + Sync,
    elapsed_ms: impl FnOnce() -> u64,
) -> Result<OptimizationResult, EngineError> {
    let combinations = generate_combinations(&config.parameters)?;
    let total_combinations = combinations.len() as u64;

    if let Some(max) = config.max_combinations {
        if total_combinations > max {
            return Err(EngineError::backtest(format!(
                "combination count {total_combinations} exceeds max_combinations {max}"
            )));
        }
    }

    let progress = AtomicU64::new(0);
    let run_one = |params: &ParameterSet| -> Result<ParameterResult, EngineError> {
        let strategy = build_strategy(params)?;
        let result = run_backtest(strategy.as_ref(), candles.clone(), config.backtest_config.clone())?;
        let score = config.objective.score(&result, config.bars_per_year);
        progress.fetch_add(1, Ordering::Relaxed);
        Ok(ParameterResult { params: params.clone(), backtest_result: result, score })
    };

    let all_results: Vec<ParameterResult> = if config.enable_parallel {
        combinations
            .par_iter()
            .map(run_one)
            .collect::<Result<Vec<_>, _>>()?
    } else {
        combinations.iter().map(run_one).collect::<Result<Vec<_>, _>>()?
    };

    let mut best_idx = 0usize;
    let mut best_score = f64::MIN;
    for (i, r) in all_results.iter().enumerate() {
        if r.score > best_score {
            best_score = r.score;
            best_idx = i;
        }
    }

    Ok(OptimizationResult {
        objective: config.objective,
        best_params: all_results[best_idx].params.clone(),
        best_score,
        all_results,
        total_combinations,
        elapsed_ms: elapsed_ms(),
    })
}

/// Writes a grid-search result to CSV: one row per combination, its score,
/// and its headline backtest metrics.
pub fn write_csv_report<W: std::io::Write>(result: &OptimizationResult, writer: W) -> Result<(), EngineError> {
    let mut wtr = csv::Writer::from_writer(writer);
    let mut param_names: Vec<&String> = result
        .all_results
        .first()
        .map(|r| r.params.keys().collect())
        .unwrap_or_default();
    param_names.sort();

    let mut header: Vec<String> = param_names.iter().map(|s| s.to_string()).collect();
    header.extend(["score".to_string(), "net_profit".to_string(), "win_rate".to_string(), "trades".to_string()]);
    wtr.write_record(&header).map_err(|e| EngineError::internal(format!("csv header write failed: {e}")))?;

    for r in &result.all_results {
        let mut row: Vec<String> = param_names.iter().map(|name| format_param(&r.params, name)).collect();
        row.push(format!("{:.6}", r.score));
        row.push(r.backtest_result.net_profit.to_string());
        row.push(format!("{:.4}", r.backtest_result.win_rate));
        row.push(r.backtest_result.trades.len().to_string());
        wtr.write_record(&row).map_err(|e| EngineError::internal(format!("csv row write failed: {e}")))?;
    }
    wtr.flush().map_err(|e| EngineError::internal(format!("csv flush failed: {e}")))
}

fn format_param(params: &ParameterSet, name: &str) -> String {
    match params.get(name) {
        Some(ParameterValue::Integer(v)) => v.to_string(),
        Some(ParameterValue::Decimal(v)) => v.to_string(),
        Some(ParameterValue::Boolean(v)) => v.to_string(),
        Some(ParameterValue::Discrete(v)) => v.clone(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::ParameterRange;

    fn int_param(name: &str, min: i64, max: i64, step: i64, optimize: bool) -> StrategyParameter {
        StrategyParameter {
            name: name.to_string(),
            default: ParameterValue::Integer(min),
            optimize,
            range: if optimize { Some(ParameterRange::Integer { min, max, step }) } else { None },
        }
    }

    #[test]
    fn generates_full_cartesian_product_in_declared_order() {
        let params = vec![int_param("fast", 5, 15, 5, true), int_param("slow", 20, 30, 5, true)];
        let combos = generate_combinations(&params).unwrap();
        assert_eq!(combos.len(), 9);
        assert_eq!(combos[0].get("fast").unwrap().as_i64(), Some(5));
        assert_eq!(combos[0].get("slow").unwrap().as_i64(), Some(20));
        // slow (last declared) is fastest-varying
        assert_eq!(combos[1].get("fast").unwrap().as_i64(), Some(5));
        assert_eq!(combos[1].get("slow").unwrap().as_i64(), Some(25));
        assert_eq!(combos[3].get("fast").unwrap().as_i64(), Some(10));
        assert_eq!(combos[3].get("slow").unwrap().as_i64(), Some(20));
    }

    #[test]
    fn no_optimized_parameters_yields_single_default_combination() {
        let params = vec![int_param("fast", 5, 5, 1, false)];
        let combos = generate_combinations(&params).unwrap();
        assert_eq!(combos.len(), 1);
        assert_eq!(combos[0].get("fast").unwrap().as_i64(), Some(5));
    }

    #[test]
    fn overflow_beyond_limit_is_rejected() {
        let params = vec![
            int_param("a", 0, 1_000_000, 1, true),
            int_param("b", 0, 1_000_000, 1, true),
            int_param("c", 0, 1_000_000, 1, true),
            int_param("d", 0, 1_000_000, 1, true),
        ];
        assert!(generate_combinations(&params).is_err());
    }
}
