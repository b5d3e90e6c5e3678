/// exchange.rs — DataProvider / ExecutionClient contracts (§4.H)
///
/// The backtest engine depends on neither (it synthesizes fills internally);
/// the live engine depends on both. Concrete adapters (`exchange_binance.rs`)
/// and the in-memory mocks below both satisfy these traits, the way the
/// teacher's `data.rs`/`live.rs` pair a fetch-side client with an
/// order-side client against the same exchange.
use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::candle::Candle;
use crate::decimal::Decimal;
use crate::error::EngineError;
use crate::time::{Timeframe, Timestamp, TradingPair};
use crate::types::{Balance, OpenOrder, OrderRequest, OrderResult, Position};

#[derive(Debug, Clone, Copy)]
pub struct Quote {
    pub bid: Decimal,
    pub ask: Decimal,
    pub last: Decimal,
    pub timestamp: Timestamp,
}

#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn subscribe(&self, pair: &TradingPair) -> Result<(), EngineError>;
    async fn unsubscribe(&self, pair: &TradingPair) -> Result<(), EngineError>;

    /// Cache-backed; `None` if no quote has arrived yet for `pair`.
    async fn poll_quote(&self, pair: &TradingPair) -> Result<Option<Quote>, EngineError>;

    /// Fails with `EngineError::Live` (`NoHistoricalData`-shaped message)
    /// when the exchange returns zero candles for the window.
    async fn historical_candles(
        &self,
        pair: &TradingPair,
        timeframe: Timeframe,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<Candle>, EngineError>;
}

#[async_trait]
pub trait ExecutionClient: Send + Sync {
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderResult, EngineError>;
    async fn cancel_order(&self, exchange_order_id: &str) -> Result<(), EngineError>;
    async fn cancel_all(&self, pair: Option<&TradingPair>) -> Result<(), EngineError>;
    async fn open_orders(&self, pair: Option<&TradingPair>) -> Result<Vec<OpenOrder>, EngineError>;
    async fn positions(&self) -> Result<Vec<Position>, EngineError>;
    async fn balance(&self) -> Result<Balance, EngineError>;

    /// Optional capability; adapters that can't set leverage no-op.
    async fn set_leverage(&self, _pair: &TradingPair, _multiplier: u32, _cross: bool) -> Result<(), EngineError> {
        Ok(())
    }
}

/// In-memory data provider for tests and paper runs: quotes and history are
/// preloaded by the caller, never fetched over the network.
#[derive(Default)]
pub struct MockDataProvider {
    quotes: Mutex<HashMap<String, Quote>>,
    history: Mutex<HashMap<String, Vec<Candle>>>,
}

impl MockDataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_quote(&self, pair: &TradingPair, quote: Quote) {
        self.quotes.lock().unwrap().insert(pair.symbol(), quote);
    }

    pub fn set_history(&self, pair: &TradingPair, candles: Vec<Candle>) {
        self.history.lock().unwrap().insert(pair.symbol(), candles);
    }
}

#[async_trait]
impl DataProvider for MockDataProvider {
    async fn subscribe(&self, _pair: &TradingPair) -> Result<(), EngineError> {
        Ok(())
    }

    async fn unsubscribe(&self, _pair: &TradingPair) -> Result<(), EngineError> {
        Ok(())
    }

    async fn poll_quote(&self, pair: &TradingPair) -> Result<Option<Quote>, EngineError> {
        Ok(self.quotes.lock().unwrap().get(&pair.symbol()).copied())
    }

    async fn historical_candles(
        &self,
        pair: &TradingPair,
        _timeframe: Timeframe,
        _start: Timestamp,
        _end: Timestamp,
    ) -> Result<Vec<Candle>, EngineError> {
        let history = self.history.lock().unwrap();
        match history.get(&pair.symbol()) {
            Some(candles) if !candles.is_empty() => Ok(candles.clone()),
            _ => Err(EngineError::live(format!("no historical data for {pair}"))),
        }
    }
}

/// In-memory execution client: fills market orders immediately at the
/// caller-supplied reference price, tracks a single-pair position book.
pub struct MockExecutionClient {
    reference_price: Mutex<Decimal>,
    balance: Mutex<Balance>,
    positions: Mutex<HashMap<String, Position>>,
    open_orders: Mutex<Vec<OpenOrder>>,
    next_order_id: Mutex<u64>,
}

impl MockExecutionClient {
    pub fn new(initial_balance: Decimal, reference_price: Decimal) -> Self {
        Self {
            reference_price: Mutex::new(reference_price),
            balance: Mutex::new(Balance { total: initial_balance, available: initial_balance, locked: Decimal::ZERO }),
            positions: Mutex::new(HashMap::new()),
            open_orders: Mutex::new(Vec::new()),
            next_order_id: Mutex::new(1),
        }
    }

    pub fn set_reference_price(&self, price: Decimal) {
        *self.reference_price.lock().unwrap() = price;
    }

    pub fn seed_position(&self, position: Position) {
        self.positions.lock().unwrap().insert(position.pair.symbol(), position);
    }

    pub fn seed_open_order(&self, order: OpenOrder) {
        self.open_orders.lock().unwrap().push(order);
    }
}

#[async_trait]
impl ExecutionClient for MockExecutionClient {
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderResult, EngineError> {
        let price = *self.reference_price.lock().unwrap();
        let mut next_id = self.next_order_id.lock().unwrap();
        let order_id = next_id.to_string();
        *next_id += 1;

        Ok(OrderResult {
            success: true,
            exchange_order_id: Some(order_id),
            filled_quantity: request.quantity,
            avg_fill_price: Some(price),
            timestamp: Timestamp::now(),
            error_code: None,
            error_message: None,
        })
    }

    async fn cancel_order(&self, exchange_order_id: &str) -> Result<(), EngineError> {
        self.open_orders.lock().unwrap().retain(|o| o.exchange_order_id != exchange_order_id);
        Ok(())
    }

    async fn cancel_all(&self, pair: Option<&TradingPair>) -> Result<(), EngineError> {
        let mut orders = self.open_orders.lock().unwrap();
        match pair {
            Some(p) => orders.retain(|o| o.pair.symbol() != p.symbol()),
            None => orders.clear(),
        }
        Ok(())
    }

    async fn open_orders(&self, pair: Option<&TradingPair>) -> Result<Vec<OpenOrder>, EngineError> {
        let orders = self.open_orders.lock().unwrap();
        Ok(match pair {
            Some(p) => orders.iter().filter(|o| o.pair.symbol() == p.symbol()).cloned().collect(),
            None => orders.clone(),
        })
    }

    async fn positions(&self) -> Result<Vec<Position>, EngineError> {
        Ok(self.positions.lock().unwrap().values().cloned().collect())
    }

    async fn balance(&self) -> Result<Balance, EngineError> {
        Ok(self.balance.lock().unwrap().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair() -> TradingPair {
        TradingPair::new("BTC", "USDT")
    }

    #[tokio::test]
    async fn mock_data_provider_errors_on_empty_history() {
        let provider = MockDataProvider::new();
        let result = provider
            .historical_candles(&pair(), Timeframe::M1, Timestamp::from_millis(0), Timestamp::from_millis(1))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn mock_execution_client_fills_market_orders_at_reference_price() {
        let client = MockExecutionClient::new(Decimal::from_int(10_000), Decimal::from_int(100));
        let request = OrderRequest::new_market(pair(), crate::types::Side::Buy, Decimal::from_int(1));
        let result = client.submit_order(&request).await.unwrap();
        assert!(result.success);
        assert_eq!(result.avg_fill_price, Some(Decimal::from_int(100)));
    }

    #[tokio::test]
    async fn cancel_all_clears_open_orders_for_pair() {
        let client = MockExecutionClient::new(Decimal::from_int(10_000), Decimal::from_int(100));
        client.seed_open_order(OpenOrder {
            exchange_order_id: "1".into(),
            pair: pair(),
            side: crate::types::Side::Buy,
            quantity: Decimal::from_int(1),
            price: None,
        });
        client.cancel_all(Some(&pair())).await.unwrap();
        assert!(client.open_orders(None).await.unwrap().is_empty());
    }
}
