/// backtest.rs — Deterministic Bar-by-Bar Backtest Engine
///
/// ARCHITECTURE
///   Candle buffer (already populated) ──▶ populate_indicators (once)
///                                               │
///                         for i in first-valid-index..len:
///                           no position? entry_signal(i)
///                           position open? exit_signal(i)
///                               │
///                      simulate fill (slippage + commission)
///                               │
///                      push (timestamp, equity) to the equity curve
///
/// A pure function of (strategy, candles, config): no wall-clock, no
/// randomness. Exit always takes precedence over entry when a position is
/// open — both conditions can never fire in the same bar.
use tracing::info;

use crate::candle::CandleBuffer;
use crate::decimal::Decimal;
use crate::error::EngineError;
use crate::strategy::{Signal, SignalType, Strategy};
use crate::types::{BacktestConfig, BacktestResult, Position, PositionSide, Trade, PROFIT_FACTOR_SENTINEL};

/// Fraction of equity risked per trade when a signal doesn't specify `size`.
const DEFAULT_RISK_FRACTION: f64 = 0.02;

struct OpenLot {
    side: PositionSide,
    size: Decimal,
    entry_price: Decimal,
    opened_at: crate::time::Timestamp,
}

/// Runs a complete backtest over an already-populated candle buffer.
pub fn run_backtest(
    strategy: &dyn Strategy,
    mut buffer: CandleBuffer,
    config: BacktestConfig,
) -> Result<BacktestResult, EngineError> {
    if buffer.is_empty() {
        return Ok(empty_result(config, strategy.name()));
    }

    strategy.populate_indicators(&mut buffer);

    let mut cash = config.initial_capital;
    let mut open_lot: Option<OpenLot> = None;
    let mut trades = Vec::new();
    let mut equity_curve = Vec::with_capacity(buffer.len());
    let mut win_count = 0u64;
    let mut loss_count = 0u64;
    let mut gross_profit = Decimal::ZERO;
    let mut gross_loss = Decimal::ZERO;
    let mut rejected_entries = 0u64;

    info!(bars = buffer.len(), strategy = strategy.name(), "starting backtest run");

    for i in 0..buffer.len() {
        let candle = *buffer.get(i).ok_or_else(|| EngineError::internal("candle index out of range"))?;

        match &open_lot {
            Some(lot) => {
                // Exit takes precedence over entry whenever a position is open.
                if let Some(signal) = strategy.exit_signal(&buffer, i, &as_position(lot, candle.close)) {
                    let fill_price = adjusted_fill_price(&signal, candle.close, config.slippage, Side::Close(lot.side));
                    let notional = fill_price * lot.size;
                    let commission = Decimal::from_float(notional.to_float() * config.commission_rate);
                    let pnl = match lot.side {
                        PositionSide::Long => (fill_price - lot.entry_price) * lot.size,
                        PositionSide::Short => (lot.entry_price - fill_price) * lot.size,
                    } - commission;

                    if pnl.is_positive() {
                        win_count += 1;
                        gross_profit = gross_profit + pnl;
                    } else if pnl.is_negative() {
                        loss_count += 1;
                        gross_loss = gross_loss + pnl.abs();
                    }

                    cash = cash + pnl;
                    trades.push(Trade {
                        pair: config.pair.clone(),
                        side: lot.side,
                        entry_price: lot.entry_price,
                        exit_price: fill_price,
                        size: lot.size,
                        opened_at: lot.opened_at,
                        closed_at: candle.timestamp,
                        realized_pnl: pnl,
                    });
                    open_lot = None;
                }
            }
            None => {
                if let Some(signal) = strategy.entry_signal(&buffer, i) {
                    let side = match signal.signal_type {
                        SignalType::EntryLong => Some(PositionSide::Long),
                        SignalType::EntryShort => Some(PositionSide::Short),
                        _ => None,
                    };
                    if let Some(side) = side {
                        let fill_price = adjusted_fill_price(&signal, candle.close, config.slippage, Side::Open(side));
                        let size = signal.size.unwrap_or_else(|| {
                            let risk_notional = cash.to_float() * DEFAULT_RISK_FRACTION;
                            Decimal::from_float(risk_notional / fill_price.to_float().max(1e-12))
                        });
                        let notional = fill_price * size;
                        let commission = Decimal::from_float(notional.to_float() * config.commission_rate);
                        let required = notional + commission;

                        if required.to_float() > cash.to_float() {
                            rejected_entries += 1;
                        } else {
                            cash = cash - commission;
                            open_lot = Some(OpenLot {
                                side,
                                size,
                                entry_price: fill_price,
                                opened_at: candle.timestamp,
                            });
                        }
                    }
                }
            }
        }

        let mark = open_lot.as_ref().map(|lot| match lot.side {
            PositionSide::Long => (candle.close - lot.entry_price) * lot.size,
            PositionSide::Short => (lot.entry_price - candle.close) * lot.size,
        });
        let equity = cash + mark.unwrap_or(Decimal::ZERO);
        equity_curve.push((candle.timestamp, equity));
    }

    // Force-close any remaining position at the final candle's close.
    if let Some(lot) = open_lot.take() {
        let last = buffer.last().expect("non-empty buffer checked above");
        let notional = last.close * lot.size;
        let commission = Decimal::from_float(notional.to_float() * config.commission_rate);
        let pnl = match lot.side {
            PositionSide::Long => (last.close - lot.entry_price) * lot.size,
            PositionSide::Short => (lot.entry_price - last.close) * lot.size,
        } - commission;

        if pnl.is_positive() {
            win_count += 1;
            gross_profit = gross_profit + pnl;
        } else if pnl.is_negative() {
            loss_count += 1;
            gross_loss = gross_loss + pnl.abs();
        }
        cash = cash + pnl;
        trades.push(Trade {
            pair: config.pair.clone(),
            side: lot.side,
            entry_price: lot.entry_price,
            exit_price: last.close,
            size: lot.size,
            opened_at: lot.opened_at,
            closed_at: last.timestamp,
            realized_pnl: pnl,
        });
        if let Some(last_point) = equity_curve.last_mut() {
            last_point.1 = cash;
        }
    }

    let net_profit = cash - config.initial_capital;
    let profit_factor = compute_profit_factor(gross_profit, gross_loss);
    let win_rate = if trades.is_empty() { 0.0 } else { win_count as f64 / trades.len() as f64 };

    let result = BacktestResult {
        config,
        strategy_name: strategy.name().to_string(),
        trades,
        equity_curve,
        win_count,
        loss_count,
        gross_profit,
        gross_loss,
        net_profit,
        profit_factor,
        win_rate,
        rejected_entries,
    };

    info!(
        trades = result.trades.len(),
        net_profit = %result.net_profit,
        win_rate = result.win_rate,
        "backtest run complete"
    );
    Ok(result)
}

enum Side {
    Open(PositionSide),
    Close(PositionSide),
}

/// Applies the slippage penalty: buys pay +slippage, sells receive −slippage.
/// Opening a long and closing a short are both buys; opening a short and
/// closing a long are both sells.
fn adjusted_fill_price(signal: &Signal, market_close: Decimal, slippage: f64, side: Side) -> Decimal {
    let _ = signal;
    let buys_pay_more = match side {
        Side::Open(PositionSide::Long) => true,
        Side::Open(PositionSide::Short) => false,
        Side::Close(PositionSide::Long) => false,
        Side::Close(PositionSide::Short) => true,
    };
    let factor = if buys_pay_more { 1.0 + slippage } else { 1.0 - slippage };
    Decimal::from_float(market_close.to_float() * factor)
}

fn as_position(lot: &OpenLot, mark_price: Decimal) -> Position {
    let mut pos = Position {
        pair: crate::time::TradingPair::new("", ""),
        side: lot.side,
        size: lot.size,
        entry_price: lot.entry_price,
        opened_at: lot.opened_at,
        unrealized_pnl: Decimal::ZERO,
        mark_price: None,
    };
    pos.mark_to_market(mark_price);
    pos
}

/// 0/0 ⇒ 0; x/0 with x>0 ⇒ the documented large-finite sentinel.
fn compute_profit_factor(gross_profit: Decimal, gross_loss: Decimal) -> f64 {
    if gross_loss.is_zero() {
        if gross_profit.is_zero() {
            0.0
        } else {
            PROFIT_FACTOR_SENTINEL
        }
    } else {
        gross_profit.to_float() / gross_loss.to_float()
    }
}

fn empty_result(config: BacktestConfig, strategy_name: &str) -> BacktestResult {
    BacktestResult {
        config,
        strategy_name: strategy_name.to_string(),
        trades: Vec::new(),
        equity_curve: Vec::new(),
        win_count: 0,
        loss_count: 0,
        gross_profit: Decimal::ZERO,
        gross_loss: Decimal::ZERO,
        net_profit: Decimal::ZERO,
        profit_factor: 0.0,
        win_rate: 0.0,
        rejected_entries: 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle::Candle;
    use crate::time::{Timeframe, Timestamp, TradingPair};

    fn candle(i: i64, close: i64) -> Candle {
        Candle {
            timestamp: Timestamp::from_millis(i),
            open: Decimal::from_int(close),
            high: Decimal::from_int(close),
            low: Decimal::from_int(close),
            close: Decimal::from_int(close),
            volume: Decimal::from_int(1),
        }
    }

    fn config() -> BacktestConfig {
        BacktestConfig {
            pair: TradingPair::new("BTC", "USDT"),
            timeframe: Timeframe::M1,
            start_time: Timestamp::from_millis(0),
            end_time: Timestamp::from_millis(100),
            initial_capital: Decimal::from_int(10_000),
            commission_rate: 0.0,
            slippage: 0.0,
            data_file: None,
        }
    }

    struct NeverSignals;
    impl Strategy for NeverSignals {
        fn populate_indicators(&self, _buf: &mut CandleBuffer) {}
        fn entry_signal(&self, _buf: &CandleBuffer, _i: usize) -> Option<Signal> {
            None
        }
        fn exit_signal(&self, _buf: &CandleBuffer, _i: usize, _p: &Position) -> Option<Signal> {
            None
        }
        fn name(&self) -> &str {
            "never"
        }
    }

    #[test]
    fn no_signals_produces_zero_trades_and_flat_equity() {
        let mut buf = CandleBuffer::new();
        for i in 0..20 {
            buf.append(candle(i, 100 + i)).unwrap();
        }
        let result = run_backtest(&NeverSignals, buf, config()).unwrap();
        assert_eq!(result.trades.len(), 0);
        assert_eq!(result.equity_curve.len(), 20);
        for (_, equity) in &result.equity_curve {
            assert_eq!(*equity, Decimal::from_int(10_000));
        }
    }

    #[test]
    fn empty_buffer_yields_zero_trade_zero_length_result() {
        let result = run_backtest(&NeverSignals, CandleBuffer::new(), config()).unwrap();
        assert_eq!(result.trades.len(), 0);
        assert_eq!(result.equity_curve.len(), 0);
    }

    #[test]
    fn dual_ma_on_monotone_series_has_one_trade_and_full_win_rate() {
        use crate::strategy::dual_ma::DualMaStrategy;

        let mut buf = CandleBuffer::new();
        for (i, price) in (100..150).enumerate() {
            buf.append(candle(i as i64, price)).unwrap();
        }
        let strat = DualMaStrategy::new(3, 10);
        let result = run_backtest(&strat, buf, config()).unwrap();

        assert_eq!(result.trades.len(), 1);
        assert!(result.net_profit.is_positive());
        assert_eq!(result.win_rate, 1.0);
        assert_eq!(result.profit_factor, PROFIT_FACTOR_SENTINEL);
    }

    #[test]
    fn trade_pnls_sum_to_net_profit() {
        use crate::strategy::dual_ma::DualMaStrategy;

        let mut buf = CandleBuffer::new();
        let prices = [100, 101, 102, 101, 100, 99, 98, 100, 105, 110, 108, 106, 104, 102, 100];
        for (i, price) in prices.iter().enumerate() {
            buf.append(candle(i as i64, *price)).unwrap();
        }
        let strat = DualMaStrategy::new(2, 4);
        let result = run_backtest(&strat, buf, config()).unwrap();

        let sum: f64 = result.trades.iter().map(|t| t.realized_pnl.to_float()).sum();
        assert!((sum - result.net_profit.to_float()).abs() < 1e-6);
    }
}
