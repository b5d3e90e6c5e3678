/// strategy/rsi.rs — RSI mean-reversion
///
/// Entry long when RSI < `oversold`, exit long when RSI > `overbought`. The
/// threshold-crossing style mirrors the teacher's Z-score entry/exit gates
/// in its Ornstein-Uhlenbeck signal engine, generalized from a z-score band
/// to an RSI band.
use crate::candle::indicators::rsi as rsi_indicator;
use crate::candle::CandleBuffer;
use crate::decimal::Decimal;
use crate::types::{Position, PositionSide};

use super::{Signal, SignalType, Strategy};

pub struct RsiMeanReversionStrategy {
    pub period: usize,
    pub oversold: Decimal,
    pub overbought: Decimal,
}

impl RsiMeanReversionStrategy {
    pub fn new(period: usize, oversold: Decimal, overbought: Decimal) -> Self {
        Self { period, oversold, overbought }
    }
}

impl Strategy for RsiMeanReversionStrategy {
    fn populate_indicators(&self, buf: &mut CandleBuffer) {
        let closes: Vec<Decimal> = buf.candles().iter().map(|c| c.close).collect();
        let col = rsi_indicator(&closes, self.period);
        let _ = buf.set_indicator("rsi", col);
    }

    fn entry_signal(&self, buf: &CandleBuffer, i: usize) -> Option<Signal> {
        if i < self.period {
            return None;
        }
        let rsi = buf.get_indicator("rsi", i)?;
        if rsi < self.oversold {
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
        let rsi = buf.get_indicator("rsi", i)?;
        if rsi > self.overbought {
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
        "rsi_mean_reversion"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle::Candle;
    use crate::time::Timestamp;

    #[test]
    fn entry_fires_when_rsi_below_oversold() {
        let mut buf = CandleBuffer::new();
        // A sharp decline pushes RSI toward 0.
        let closes: Vec<i64> = (0..30).map(|i| 200 - i).collect();
        for (i, c) in closes.iter().enumerate() {
            buf.append(Candle {
                timestamp: Timestamp::from_millis(i as i64),
                open: Decimal::from_int(*c),
                high: Decimal::from_int(*c),
                low: Decimal::from_int(*c),
                close: Decimal::from_int(*c),
                volume: Decimal::from_int(1),
            })
            .unwrap();
        }
        let strat = RsiMeanReversionStrategy::new(14, Decimal::from_int(30), Decimal::from_int(70));
        strat.populate_indicators(&mut buf);
        assert!(strat.entry_signal(&buf, 29).is_some());
    }
}
