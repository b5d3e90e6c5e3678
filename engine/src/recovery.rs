/// recovery.rs — Recovery manager (§4.L)
///
/// Holds a bounded queue of `SystemState` checkpoints and reconciles the
/// most recent one against live exchange state on restart. The mismatch
/// taxonomy (orphan/stale orders, position mismatches/missing positions)
/// mirrors how the teacher's `live.rs::close_all_positions` treats the
/// exchange, not the local book, as ground truth for anything it reports.
use std::collections::VecDeque;
use std::sync::Mutex;

use tracing::info;

use crate::error::EngineError;
use crate::exchange::ExecutionClient;
use crate::time::Timestamp;
use crate::types::SystemState;

const DEFAULT_MAX_CHECKPOINTS: usize = 10;
const DEFAULT_MAX_CHECKPOINT_AGE_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy)]
pub struct RecoveryConfig {
    pub max_checkpoints: usize,
    pub max_checkpoint_age_hours: i64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self { max_checkpoints: DEFAULT_MAX_CHECKPOINTS, max_checkpoint_age_hours: DEFAULT_MAX_CHECKPOINT_AGE_HOURS }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub position_mismatches: u32,
    pub missing_positions: u32,
    pub orphan_orders: u32,
    pub stale_orders: u32,
    pub cancelled_orphans: u32,
}

pub struct RecoveryManager {
    config: RecoveryConfig,
    checkpoints: Mutex<VecDeque<SystemState>>,
}

impl RecoveryManager {
    pub fn new(config: RecoveryConfig) -> Self {
        Self { config, checkpoints: Mutex::new(VecDeque::new()) }
    }

    /// Deep-clones the given state (its strings are owned already), stamps
    /// it with `now`, enqueues, then evicts anything too old or beyond
    /// `max_checkpoints`.
    pub fn checkpoint(&self, mut state: SystemState, now: Timestamp) {
        state.timestamp = now;
        let mut checkpoints = self.checkpoints.lock().unwrap();
        checkpoints.push_back(state);

        let cutoff = now.millis() - self.config.max_checkpoint_age_hours * 3_600_000;
        checkpoints.retain(|c| c.timestamp.millis() >= cutoff);

        while checkpoints.len() > self.config.max_checkpoints {
            checkpoints.pop_front();
        }
        info!(count = checkpoints.len(), "checkpoint recorded");
    }

    pub fn recover(&self) -> Result<SystemState, EngineError> {
        self.checkpoints
            .lock()
            .unwrap()
            .back()
            .cloned()
            .ok_or_else(|| EngineError::recovery("no checkpoint available"))
    }

    /// Recovers the latest checkpoint, then reconciles it against live
    /// exchange state. When `cancel_orphan_orders` is set, cancels every
    /// orphan exactly once.
    pub async fn recover_with_sync(
        &self,
        execution_client: &dyn ExecutionClient,
        cancel_orphan_orders: bool,
    ) -> Result<(SystemState, SyncReport), EngineError> {
        let snapshot = self.recover()?;

        let live_positions = execution_client.positions().await?;
        let live_orders = execution_client.open_orders(None).await?;

        let mut report = SyncReport::default();

        for live_pos in &live_positions {
            match snapshot.positions.iter().find(|p| p.pair.symbol() == live_pos.pair.symbol()) {
                Some(snap_pos) if snap_pos.size != live_pos.size => report.position_mismatches += 1,
                Some(_) => {}
                None => report.missing_positions += 1,
            }
        }

        for live_order in &live_orders {
            let known = snapshot.open_orders.iter().any(|o| o.exchange_order_id == live_order.exchange_order_id);
            if !known {
                report.orphan_orders += 1;
                if cancel_orphan_orders {
                    execution_client.cancel_order(&live_order.exchange_order_id).await?;
                    report.cancelled_orphans += 1;
                }
            }
        }

        for snap_order in &snapshot.open_orders {
            let still_open = live_orders.iter().any(|o| o.exchange_order_id == snap_order.exchange_order_id);
            if !still_open {
                report.stale_orders += 1;
            }
        }

        Ok((snapshot, report))
    }

    pub fn checkpoint_count(&self) -> usize {
        self.checkpoints.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Decimal;
    use crate::exchange::MockExecutionClient;
    use crate::time::TradingPair;
    use crate::types::{OpenOrder, Position, PositionSide, Side};

    fn sample_state(order_id: &str, position_size: i64) -> SystemState {
        SystemState {
            timestamp: Timestamp::from_millis(0),
            equity: Decimal::from_int(10_000),
            balance: Decimal::from_int(10_000),
            available: Decimal::from_int(10_000),
            margin: Decimal::ZERO,
            unrealized_pnl: Decimal::ZERO,
            positions: vec![Position {
                pair: TradingPair::new("BTC", "USDT"),
                side: PositionSide::Long,
                size: Decimal::from_int(position_size),
                entry_price: Decimal::from_int(100),
                opened_at: Timestamp::from_millis(0),
                unrealized_pnl: Decimal::ZERO,
                mark_price: None,
            }],
            open_orders: vec![OpenOrder {
                exchange_order_id: order_id.to_string(),
                pair: TradingPair::new("BTC", "USDT"),
                side: Side::Buy,
                quantity: Decimal::from_int(1),
                price: None,
            }],
        }
    }

    #[test]
    fn recover_without_checkpoint_is_an_error() {
        let manager = RecoveryManager::new(RecoveryConfig::default());
        assert!(manager.recover().is_err());
    }

    #[test]
    fn checkpoint_queue_is_bounded() {
        let manager = RecoveryManager::new(RecoveryConfig { max_checkpoints: 2, max_checkpoint_age_hours: 24 });
        for i in 0..5 {
            manager.checkpoint(sample_state("1", 1), Timestamp::from_millis(i));
        }
        assert_eq!(manager.checkpoint_count(), 2);
    }

    #[tokio::test]
    async fn recover_with_sync_reports_orphan_and_mismatched_position() {
        let manager = RecoveryManager::new(RecoveryConfig::default());
        manager.checkpoint(sample_state("42", 1), Timestamp::from_millis(0));

        let client = MockExecutionClient::new(Decimal::from_int(10_000), Decimal::from_int(100));
        client.seed_open_order(OpenOrder {
            exchange_order_id: "42".into(),
            pair: TradingPair::new("BTC", "USDT"),
            side: Side::Buy,
            quantity: Decimal::from_int(1),
            price: None,
        });
        client.seed_open_order(OpenOrder {
            exchange_order_id: "99".into(),
            pair: TradingPair::new("BTC", "USDT"),
            side: Side::Buy,
            quantity: Decimal::from_int(1),
            price: None,
        });
        client.seed_position(Position {
            pair: TradingPair::new("BTC", "USDT"),
            side: PositionSide::Long,
            size: Decimal::from_string("1.5").unwrap(),
            entry_price: Decimal::from_int(100),
            opened_at: Timestamp::from_millis(0),
            unrealized_pnl: Decimal::ZERO,
            mark_price: None,
        });

        let (_, report) = manager.recover_with_sync(&client, true).await.unwrap();
        assert_eq!(report.orphan_orders, 1);
        assert_eq!(report.stale_orders, 0);
        assert_eq!(report.position_mismatches, 1);
        assert_eq!(report.missing_positions, 0);
        assert_eq!(report.cancelled_orphans, 1);
    }
}
