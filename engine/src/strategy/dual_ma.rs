/// strategy/dual_ma.rs — Fast/slow moving-average crossover
use crate::candle::indicators::sma;
use crate::candle::CandleBuffer;
use crate::decimal::Decimal;
use crate::types::{Position, PositionSide};

use super::{Signal, SignalType, Strategy};

pub struct DualMaStrategy {
    pub fast_period: usize,
    pub slow_period: usize,
}

impl DualMaStrategy {
    pub fn new(fast_period: usize, slow_period: usize) -> Self {
        Self { fast_period, slow_period }
    }

    fn closes(buf: &CandleBuffer) -> Vec<Decimal> {
        buf.candles().iter().map(|c| c.close).collect()
    }
}

impl Strategy for DualMaStrategy {
    fn populate_indicators(&self, buf: &mut CandleBuffer) {
        let closes = Self::closes(buf);
        let fast = sma(&closes, self.fast_period);
        let slow = sma(&closes, self.slow_period);
        let _ = buf.set_indicator("fast_ma", fast);
        let _ = buf.set_indicator("slow_ma", slow);
    }

    fn entry_signal(&self, buf: &CandleBuffer, i: usize) -> Option<Signal> {
        if i == 0 || i < self.slow_period {
            return None;
        }
        let fast_now = buf.get_indicator("fast_ma", i)?;
        let slow_now = buf.get_indicator("slow_ma", i)?;
        let fast_prev = buf.get_indicator("fast_ma", i - 1)?;
        let slow_prev = buf.get_indicator("slow_ma", i - 1)?;

        let crossed_above = fast_prev <= slow_prev && fast_now > slow_now;
        if crossed_above {
            let price = buf.get(i)?.close;
            return Some(Signal {
                signal_type: SignalType::EntryLong,
                price,
                size: None,
                stop_loss: None,
                take_profit: None,
            });
        }
        None
    }

    fn exit_signal(&self, buf: &CandleBuffer, i: usize, position: &Position) -> Option<Signal> {
        if position.side != PositionSide::Long {
            return None;
        }
        let fast_now = buf.get_indicator("fast_ma", i)?;
        let slow_now = buf.get_indicator("slow_ma", i)?;
        let fast_prev = buf.get_indicator("fast_ma", i.saturating_sub(1))?;
        let slow_prev = buf.get_indicator("slow_ma", i.saturating_sub(1))?;

        let crossed_below = fast_prev >= slow_prev && fast_now < slow_now;
        if crossed_below {
            let price = buf.get(i)?.close;
            return Some(Signal {
                signal_type: SignalType::ExitLong,
                price,
                size: None,
                stop_loss: None,
                take_profit: None,
            });
        }
        None
    }

    fn name(&self) -> &str {
        "dual_ma"
    }
}
