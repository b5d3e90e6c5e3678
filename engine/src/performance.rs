/// performance.rs — Performance analyzer
///
/// Turns a `BacktestResult`'s equity curve and trade list into the standard
/// risk-adjusted report. Formulas and fallback thresholds follow the same
/// shape as the teacher's `metrics.rs::compute_metrics`, extended with the
/// additional ratios the platform's reporting surface exposes.
use std::fmt;

use crate::types::BacktestResult;

const EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerformanceReport {
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub omega_ratio: f64,
    pub tail_ratio: f64,
    pub stability_r2: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub net_profit: f64,
    pub avg_trade_pnl: f64,
}

impl fmt::Display for PerformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Performance Report")?;
        writeln!(f, "  total_return     : {:.4}", self.total_return)?;
        writeln!(f, "  sharpe_ratio     : {:.4}", self.sharpe_ratio)?;
        writeln!(f, "  sortino_ratio    : {:.4}", self.sortino_ratio)?;
        writeln!(f, "  calmar_ratio     : {:.4}", self.calmar_ratio)?;
        writeln!(f, "  omega_ratio      : {:.4}", self.omega_ratio)?;
        writeln!(f, "  tail_ratio       : {:.4}", self.tail_ratio)?;
        writeln!(f, "  stability_r2     : {:.4}", self.stability_r2)?;
        writeln!(f, "  max_drawdown     : {:.4}", self.max_drawdown)?;
        writeln!(f, "  win_rate         : {:.4}", self.win_rate)?;
        writeln!(f, "  profit_factor    : {:.4}", self.profit_factor)?;
        writeln!(f, "  net_profit       : {:.4}", self.net_profit)?;
        write!(f, "  avg_trade_pnl    : {:.4}", self.avg_trade_pnl)
    }
}

fn mean(xs: &[f64]) -> f64 {
    if xs.is_empty() {
        0.0
    } else {
        xs.iter().sum::<f64>() / xs.len() as f64
    }
}

fn std_dev(xs: &[f64]) -> f64 {
    if xs.len() < 2 {
        return 0.0;
    }
    let m = mean(xs);
    let variance = xs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    variance.sqrt()
}

/// Per-bar equity log-differences.
fn bar_returns(equity: &[f64]) -> Vec<f64> {
    equity
        .windows(2)
        .map(|w| if w[0] <= EPSILON || w[1] <= EPSILON { 0.0 } else { (w[1] / w[0]).ln() })
        .collect()
}

fn trade_pnls(result: &BacktestResult) -> Vec<f64> {
    result.trades.iter().map(|t| t.realized_pnl.to_float()).collect()
}

fn max_drawdown(equity: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut worst = 0.0;
    for &e in equity {
        if e > peak {
            peak = e;
        }
        if peak > EPSILON {
            let dd = (peak - e) / peak;
            if dd > worst {
                worst = dd;
            }
        }
    }
    worst
}

/// Ordinary least-squares R² of the equity curve against a straight line —
/// how close the growth path is to steady and monotone.
fn stability_r2(equity: &[f64]) -> f64 {
    let n = equity.len();
    if n < 3 {
        return 0.0;
    }
    let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let x_mean = mean(&xs);
    let y_mean = mean(equity);

    let mut ss_xy = 0.0;
    let mut ss_xx = 0.0;
    for i in 0..n {
        ss_xy += (xs[i] - x_mean) * (equity[i] - y_mean);
        ss_xx += (xs[i] - x_mean).powi(2);
    }
    if ss_xx < EPSILON {
        return 0.0;
    }
    let slope = ss_xy / ss_xx;
    let intercept = y_mean - slope * x_mean;

    let ss_tot: f64 = equity.iter().map(|y| (y - y_mean).powi(2)).sum();
    if ss_tot < EPSILON {
        return 1.0;
    }
    let ss_res: f64 = equity.iter().enumerate().map(|(i, &y)| (y - (slope * xs[i] + intercept)).powi(2)).sum();
    (1.0 - ss_res / ss_tot).clamp(0.0, 1.0)
}

/// Omega ratio over trade PnLs: sum of winning trade PnL over sum of losing
/// trade PnL magnitude. Falls back to `positive_sum * 10` when there are no
/// losing trades to divide by.
fn omega_ratio(pnls: &[f64]) -> f64 {
    let (positive_sum, negative_sum) = pnls.iter().fold((0.0, 0.0), |(g, l), &p| {
        if p > 0.0 { (g + p, l) } else { (g, l + -p) }
    });
    if negative_sum < EPSILON { positive_sum * 10.0 } else { positive_sum / negative_sum }
}

/// Ratio of the 95th-percentile positive tail to the 5th-percentile negative
/// tail of the trade PnL distribution. Needs at least 10 trades to be
/// meaningful.
fn tail_ratio(pnls: &[f64]) -> f64 {
    if pnls.len() < 10 {
        return 1.0;
    }
    let mut sorted = pnls.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    let n = sorted.len();
    let hi_idx = ((n as f64) * 0.95).floor().min((n - 1) as f64) as usize;
    let lo_idx = ((n as f64) * 0.05).floor() as usize;
    let hi = sorted[hi_idx].abs();
    let lo = sorted[lo_idx].abs();
    if lo < EPSILON {
        if hi < EPSILON {
            1.0
        } else {
            f64::MAX / 1e6
        }
    } else {
        hi / lo
    }
}

/// Computes the full performance report from a backtest result.
///
/// `bars_per_year` is accepted for call-site compatibility with callers that
/// annotate the bar frequency (teacher's `metrics.rs` takes the same
/// parameter), but none of these ratios annualize on it.
pub fn analyze(result: &BacktestResult, _bars_per_year: f64) -> PerformanceReport {
    let initial = result.config.initial_capital.to_float();
    let equity: Vec<f64> = result.equity_curve.iter().map(|(_, e)| e.to_float()).collect();
    let pnls = trade_pnls(result);

    let total_return = if initial.abs() < EPSILON {
        0.0
    } else {
        result.net_profit.to_float() / initial
    };

    let returns = bar_returns(&equity);
    let avg_return = mean(&returns);
    let return_std = std_dev(&returns);

    let sharpe_ratio = if return_std < EPSILON { total_return * 10.0 } else { avg_return / return_std };

    let downside: Vec<f64> = pnls.iter().copied().filter(|&p| p < 0.0).collect();
    let downside_std = std_dev(&downside);
    let sortino_ratio = if downside_std < EPSILON { total_return * 10.0 } else { avg_return / downside_std };

    let mdd = max_drawdown(&equity);
    let calmar_ratio = if mdd < EPSILON { total_return * 10.0 } else { total_return / mdd };

    let avg_trade_pnl = if result.trades.is_empty() {
        0.0
    } else {
        result.net_profit.to_float() / result.trades.len() as f64
    };

    PerformanceReport {
        total_return,
        sharpe_ratio,
        sortino_ratio,
        calmar_ratio,
        omega_ratio: omega_ratio(&pnls),
        tail_ratio: tail_ratio(&pnls),
        stability_r2: stability_r2(&equity),
        max_drawdown: mdd,
        win_rate: result.win_rate,
        profit_factor: result.profit_factor,
        net_profit: result.net_profit.to_float(),
        avg_trade_pnl,
    }
}
