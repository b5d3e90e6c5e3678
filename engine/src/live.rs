/// live.rs — Live trading engine (§4.I)
///
/// Composed of a price cache, a data-provider driver, an execution-client
/// driver (with a risk pre-check), an optional strategy, and a heartbeat
/// timer. The tick cycle is the same ingest → refresh → evaluate → submit →
/// heartbeat ordering the teacher's `live.rs` follows for its own
/// order-submission path, generalized here into a full strategy loop.
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::candle::{Candle, CandleBuffer};
use crate::decimal::Decimal;
use crate::error::EngineError;
use crate::exchange::{DataProvider, ExecutionClient};
use crate::strategy::{SignalType, Strategy};
use crate::time::{Timestamp, TradingPair};
use crate::types::{Balance, OrderRequest, OrderResult, Position, PositionSide, Side};

const DEFAULT_RISK_FRACTION: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveState {
    Stopped,
    Starting,
    Running,
    Paused,
    Stopping,
    Reconnecting,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingModel {
    EventDriven,
    ClockDriven,
    Hybrid,
}

#[derive(Debug, Clone)]
pub struct LiveEngineConfig {
    pub pair: TradingPair,
    pub scheduling: SchedulingModel,
    pub tick_interval_ms: u64,
    pub balance_update_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub max_reconnect_attempts: u32,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LiveStats {
    pub orders_submitted: u64,
    pub orders_filled: u64,
    pub orders_rejected: u64,
    pub heartbeats_emitted: u64,
}

/// Owns the running state for a single (pair, strategy) live session. Not
/// `Sync` by itself — `runner.rs` wraps an instance behind its own mutex.
pub struct LiveEngine {
    config: LiveEngineConfig,
    data_provider: Arc<dyn DataProvider>,
    execution_client: Arc<dyn ExecutionClient>,
    strategy: Option<Box<dyn Strategy>>,
    state: LiveState,
    buffer: CandleBuffer,
    position: Option<Position>,
    initial_equity: Option<Decimal>,
    balance: Option<Balance>,
    last_balance_refresh: Option<Timestamp>,
    last_heartbeat: Option<Timestamp>,
    reconnect_attempts: u32,
    stats: LiveStats,
}

impl LiveEngine {
    pub fn new(
        config: LiveEngineConfig,
        data_provider: Arc<dyn DataProvider>,
        execution_client: Arc<dyn ExecutionClient>,
        strategy: Option<Box<dyn Strategy>>,
    ) -> Self {
        Self {
            config,
            data_provider,
            execution_client,
            strategy,
            state: LiveState::Stopped,
            buffer: CandleBuffer::new(),
            position: None,
            initial_equity: None,
            balance: None,
            last_balance_refresh: None,
            last_heartbeat: None,
            reconnect_attempts: 0,
            stats: LiveStats::default(),
        }
    }

    pub fn state(&self) -> LiveState {
        self.state
    }

    pub fn stats(&self) -> LiveStats {
        self.stats
    }

    pub async fn start(&mut self) -> Result<(), EngineError> {
        if self.state != LiveState::Stopped {
            return Err(EngineError::live("start called outside the stopped state"));
        }
        self.state = LiveState::Starting;
        self.data_provider.subscribe(&self.config.pair).await?;
        self.state = LiveState::Running;
        info!(pair = %self.config.pair, "live engine started");
        Ok(())
    }

    pub fn pause(&mut self) -> Result<(), EngineError> {
        if self.state != LiveState::Running {
            return Err(EngineError::live("pause requires the running state"));
        }
        self.state = LiveState::Paused;
        Ok(())
    }

    pub fn resume(&mut self) -> Result<(), EngineError> {
        if self.state != LiveState::Paused {
            return Err(EngineError::live("resume requires the paused state"));
        }
        self.state = LiveState::Running;
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<(), EngineError> {
        self.state = LiveState::Stopping;
        let _ = self.data_provider.unsubscribe(&self.config.pair).await;
        self.state = LiveState::Stopped;
        info!(pair = %self.config.pair, "live engine stopped");
        Ok(())
    }

    /// Runs one full tick: ingest → balance refresh → strategy evaluation →
    /// order submission → heartbeat. Returns the order result, if any order
    /// was submitted this tick.
    pub async fn tick(&mut self, now: Timestamp) -> Result<Option<OrderResult>, EngineError> {
        if self.state == LiveState::Reconnecting {
            return self.attempt_reconnect(now).await;
        }
        if !matches!(self.state, LiveState::Running | LiveState::Paused) {
            return Err(EngineError::live("tick called outside an active state"));
        }

        if let Err(e) = self.ingest(now).await {
            warn!(error = %e, "data provider ingest failed, entering reconnecting state");
            self.state = LiveState::Reconnecting;
            self.reconnect_attempts = 0;
            return Ok(None);
        }

        self.maybe_refresh_balance(now).await?;

        let mut order_result = None;
        if self.state == LiveState::Running {
            if let Some(request) = self.evaluate_strategy()? {
                order_result = Some(self.submit(request).await?);
            }
        }

        self.maybe_heartbeat(now);
        Ok(order_result)
    }

    async fn ingest(&mut self, now: Timestamp) -> Result<(), EngineError> {
        let quote = self.data_provider.poll_quote(&self.config.pair).await?;
        let price = match quote {
            Some(q) => q.last,
            None => return Ok(()),
        };

        if self.buffer.is_empty() {
            // Documented fallback: synthesize a 2-candle stub so a strategy
            // with a minimum lookback can still evaluate on the first tick.
            self.buffer.append(Candle { timestamp: now, open: price, high: price, low: price, close: price, volume: Decimal::ZERO })?;
            self.buffer.append(Candle { timestamp: now, open: price, high: price, low: price, close: price, volume: Decimal::ZERO })?;
        } else {
            let mut last = *self.buffer.last().expect("checked non-empty above");
            last.timestamp = now;
            last.close = price;
            last.high = last.high.max(price);
            last.low = last.low.min(price);
            self.buffer.update_last(last)?;
        }
        Ok(())
    }

    async fn maybe_refresh_balance(&mut self, now: Timestamp) -> Result<(), EngineError> {
        let due = match self.last_balance_refresh {
            None => true,
            Some(last) => (now.millis() - last.millis()) as u64 >= self.config.balance_update_interval_ms,
        };
        if !due {
            return Ok(());
        }
        let balance = self.execution_client.balance().await?;
        if self.initial_equity.is_none() || self.initial_equity == Some(Decimal::ZERO) {
            self.initial_equity = Some(balance.total);
        }
        self.balance = Some(balance);
        self.last_balance_refresh = Some(now);
        Ok(())
    }

    fn evaluate_strategy(&mut self) -> Result<Option<OrderRequest>, EngineError> {
        let strategy = match self.strategy.as_ref() {
            Some(s) => s,
            None => return Ok(None),
        };
        if self.buffer.is_empty() {
            return Ok(None);
        }
        let mut buffer = std::mem::take(&mut self.buffer);
        strategy.populate_indicators(&mut buffer);
        let i = buffer.len() - 1;

        let signal = match &self.position {
            Some(position) => strategy.exit_signal(&buffer, i, position),
            None => strategy.entry_signal(&buffer, i),
        };
        self.buffer = buffer;

        let signal = match signal {
            Some(s) if s.signal_type != SignalType::Hold => s,
            _ => return Ok(None),
        };

        let side = match signal.signal_type {
            SignalType::EntryLong | SignalType::ExitShort => Side::Buy,
            SignalType::EntryShort | SignalType::ExitLong => Side::Sell,
            SignalType::Hold => return Ok(None),
        };

        let size = signal.size.unwrap_or_else(|| {
            let equity = self.balance.as_ref().map(|b| b.available.to_float()).unwrap_or(0.0);
            Decimal::from_float(equity * DEFAULT_RISK_FRACTION / signal.price.to_float().max(1e-12))
        });

        if !self.risk_precheck(size) {
            self.stats.orders_rejected += 1;
            return Ok(None);
        }

        Ok(Some(OrderRequest::new_market(self.config.pair.clone(), side, size)))
    }

    /// Minimal pre-trade guard: reject non-positive sizes and sizes beyond
    /// the available balance's notional capacity, before ever reaching the
    /// execution client.
    fn risk_precheck(&self, size: Decimal) -> bool {
        if !size.is_positive() {
            return false;
        }
        match &self.balance {
            Some(b) => size.to_float() <= b.available.to_float().max(0.0) * 1e6, // coarse sanity bound
            None => true,
        }
    }

    async fn submit(&mut self, request: OrderRequest) -> Result<OrderResult, EngineError> {
        self.stats.orders_submitted += 1;
        let result = self.execution_client.submit_order(&request).await?;
        if result.success {
            self.stats.orders_filled += 1;
            self.apply_fill(&request, &result);
        } else {
            self.stats.orders_rejected += 1;
        }
        Ok(result)
    }

    fn apply_fill(&mut self, request: &OrderRequest, result: &OrderResult) {
        let fill_price = result.avg_fill_price.unwrap_or(Decimal::ZERO);
        match &self.position {
            None => {
                let side = match request.side {
                    Side::Buy => PositionSide::Long,
                    Side::Sell => PositionSide::Short,
                };
                self.position = Some(Position {
                    pair: request.pair.clone(),
                    side,
                    size: request.quantity,
                    entry_price: fill_price,
                    opened_at: result.timestamp,
                    unrealized_pnl: Decimal::ZERO,
                    mark_price: Some(fill_price),
                });
            }
            Some(_) => {
                self.position = None;
            }
        }
    }

    fn maybe_heartbeat(&mut self, now: Timestamp) {
        let due = match self.last_heartbeat {
            None => true,
            Some(last) => (now.millis() - last.millis()) as u64 >= self.config.heartbeat_interval_ms,
        };
        if due {
            self.last_heartbeat = Some(now);
            self.stats.heartbeats_emitted += 1;
        }
    }

    async fn attempt_reconnect(&mut self, now: Timestamp) -> Result<Option<OrderResult>, EngineError> {
        if self.reconnect_attempts >= self.config.max_reconnect_attempts {
            self.state = LiveState::Failed;
            return Err(EngineError::live("reconnect attempts exhausted"));
        }
        let backoff_ms = 2u64.saturating_pow(self.reconnect_attempts) * 100;
        tokio::time::sleep(Duration::from_millis(backoff_ms.min(30_000))).await;
        self.reconnect_attempts += 1;

        match self.data_provider.subscribe(&self.config.pair).await {
            Ok(()) => {
                self.state = LiveState::Running;
                self.reconnect_attempts = 0;
                info!(pair = %self.config.pair, "reconnected to data provider");
                self.ingest(now).await.ok();
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, attempt = self.reconnect_attempts, "reconnect attempt failed");
                Ok(None)
            }
        }
    }
}

/// Price cache keyed by symbol; a thin convenience layer over repeated
/// `poll_quote` calls for components that want the latest price without
/// going through the full engine (e.g. a dashboard or the CLI's `status`).
#[derive(Default)]
pub struct PriceCache {
    last: HashMap<String, Decimal>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, pair: &TradingPair, price: Decimal) {
        self.last.insert(pair.symbol(), price);
    }

    pub fn get(&self, pair: &TradingPair) -> Option<Decimal> {
        self.last.get(&pair.symbol()).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{MockDataProvider, MockExecutionClient, Quote};

    fn config() -> LiveEngineConfig {
        LiveEngineConfig {
            pair: TradingPair::new("BTC", "USDT"),
            scheduling: SchedulingModel::ClockDriven,
            tick_interval_ms: 1000,
            balance_update_interval_ms: 10_000,
            heartbeat_interval_ms: 30_000,
            max_reconnect_attempts: 3,
        }
    }

    #[tokio::test]
    async fn start_transitions_to_running() {
        let provider = Arc::new(MockDataProvider::new());
        let client = Arc::new(MockExecutionClient::new(Decimal::from_int(10_000), Decimal::from_int(100)));
        let mut engine = LiveEngine::new(config(), provider, client, None);
        engine.start().await.unwrap();
        assert_eq!(engine.state(), LiveState::Running);
    }

    #[tokio::test]
    async fn tick_without_quote_is_a_no_op_and_stays_running() {
        let provider = Arc::new(MockDataProvider::new());
        let client = Arc::new(MockExecutionClient::new(Decimal::from_int(10_000), Decimal::from_int(100)));
        let mut engine = LiveEngine::new(config(), provider, client, None);
        engine.start().await.unwrap();
        engine.tick(Timestamp::from_millis(1)).await.unwrap();
        assert_eq!(engine.state(), LiveState::Running);
    }

    #[tokio::test]
    async fn heartbeat_fires_once_interval_elapsed() {
        let provider = Arc::new(MockDataProvider::new());
        provider.push_quote(
            &config().pair,
            Quote { bid: Decimal::from_int(99), ask: Decimal::from_int(101), last: Decimal::from_int(100), timestamp: Timestamp::from_millis(0) },
        );
        let client = Arc::new(MockExecutionClient::new(Decimal::from_int(10_000), Decimal::from_int(100)));
        let mut engine = LiveEngine::new(config(), provider, client, None);
        engine.start().await.unwrap();
        engine.tick(Timestamp::from_millis(0)).await.unwrap();
        assert_eq!(engine.stats().heartbeats_emitted, 1);
        engine.tick(Timestamp::from_millis(1000)).await.unwrap();
        assert_eq!(engine.stats().heartbeats_emitted, 1);
        engine.tick(Timestamp::from_millis(31_000)).await.unwrap();
        assert_eq!(engine.stats().heartbeats_emitted, 2);
    }
}
