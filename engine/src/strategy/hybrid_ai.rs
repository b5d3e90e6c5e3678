/// strategy/hybrid_ai.rs — Technical strategy + external advisor second opinion
///
/// The LLM advisor's own internals are out of scope here (it is an external
/// collaborator reached through a narrow capability contract, the same way
/// `DataProvider`/`ExecutionClient` are specified by interface in
/// `exchange.rs`). The advisor call is best-effort: a failure falls back to
/// the technical sub-strategy's signal unchanged.
use crate::candle::CandleBuffer;
use crate::error::EngineError;
use crate::types::Position;

use super::{Signal, SignalType, Strategy};

/// A second-opinion capability: given the same view the technical strategy
/// has, returns a directional score in `[-1.0, 1.0]` (positive = bullish).
pub trait AdvisorCapability: Send + Sync {
    fn opinion(&self, buf: &CandleBuffer, i: usize) -> Result<f64, EngineError>;
}

/// Default advisor used when no real client is wired up: always abstains,
/// which the weighted combination treats as "defer entirely to technicals".
pub struct NoOpAdvisor;

impl AdvisorCapability for NoOpAdvisor {
    fn opinion(&self, _buf: &CandleBuffer, _i: usize) -> Result<f64, EngineError> {
        Ok(0.0)
    }
}

pub struct HybridAiStrategy {
    technical: Box<dyn Strategy>,
    advisor: Box<dyn AdvisorCapability>,
    /// Weight on the technical signal; `1.0 - technical_weight` on the advisor.
    technical_weight: f64,
}

impl HybridAiStrategy {
    pub fn new(
        technical: Box<dyn Strategy>,
        advisor: Box<dyn AdvisorCapability>,
        technical_weight: f64,
    ) -> Self {
        Self { technical, advisor, technical_weight: technical_weight.clamp(0.0, 1.0) }
    }

    fn technical_score(signal: &Signal) -> f64 {
        match signal.signal_type {
            SignalType::EntryLong => 1.0,
            SignalType::EntryShort => -1.0,
            _ => 0.0,
        }
    }

    fn combined_score(&self, technical: f64, advisor_opinion: f64) -> f64 {
        self.technical_weight * technical + (1.0 - self.technical_weight) * advisor_opinion
    }
}

impl Strategy for HybridAiStrategy {
    fn populate_indicators(&self, buf: &mut CandleBuffer) {
        self.technical.populate_indicators(buf);
    }

    fn entry_signal(&self, buf: &CandleBuffer, i: usize) -> Option<Signal> {
        let technical_signal = self.technical.entry_signal(buf, i)?;
        let technical_score = Self::technical_score(&technical_signal);

        // Best-effort: on advisor failure, use the technical signal unchanged.
        let advisor_opinion = match self.advisor.opinion(buf, i) {
            Ok(v) => v,
            Err(_) => return Some(technical_signal),
        };

        let score = self.combined_score(technical_score, advisor_opinion);
        if score > 0.0 && technical_signal.signal_type == SignalType::EntryLong {
            Some(technical_signal)
        } else if score < 0.0 && technical_signal.signal_type == SignalType::EntryShort {
            Some(technical_signal)
        } else {
            None
        }
    }

    fn exit_signal(&self, buf: &CandleBuffer, i: usize, position: &Position) -> Option<Signal> {
        self.technical.exit_signal(buf, i, position)
    }

    fn name(&self) -> &str {
        "hybrid_ai"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candle::Candle;
    use crate::decimal::Decimal;
    use crate::strategy::dual_ma::DualMaStrategy;
    use crate::time::Timestamp;

    struct FailingAdvisor;
    impl AdvisorCapability for FailingAdvisor {
        fn opinion(&self, _buf: &CandleBuffer, _i: usize) -> Result<f64, EngineError> {
            Err(EngineError::internal("advisor unreachable"))
        }
    }

    fn buffer_from_closes(closes: &[i64]) -> CandleBuffer {
        let mut buf = CandleBuffer::new();
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
        buf
    }

    #[test]
    fn falls_back_to_technical_signal_when_advisor_fails() {
        let closes: Vec<i64> = (100..150).collect();
        let mut buf = buffer_from_closes(&closes);
        let hybrid = HybridAiStrategy::new(
            Box::new(DualMaStrategy::new(3, 10)),
            Box::new(FailingAdvisor),
            0.7,
        );
        hybrid.populate_indicators(&mut buf);

        let mut entries = 0;
        for i in 0..buf.len() {
            if hybrid.entry_signal(&buf, i).is_some() {
                entries += 1;
            }
        }
        assert_eq!(entries, 1);
    }

    #[test]
    fn noop_advisor_defers_entirely_to_technical() {
        let closes: Vec<i64> = (100..150).collect();
        let mut buf = buffer_from_closes(&closes);
        let hybrid = HybridAiStrategy::new(Box::new(DualMaStrategy::new(3, 10)), Box::new(NoOpAdvisor), 0.5);
        hybrid.populate_indicators(&mut buf);

        let mut entries = 0;
        for i in 0..buf.len() {
            if hybrid.entry_signal(&buf, i).is_some() {
                entries += 1;
            }
        }
        assert_eq!(entries, 1);
    }
}
