/// types.rs — Order, position, trade and backtest data model (§3)
///
/// Shared by the backtest engine, the live engine, and the exchange-facing
/// traits, kept in one file the way the teacher keeps its kline/tick shapes
/// in `data.rs` next to the client that produces them.
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Decimal;
use crate::time::{TradingPair, Timestamp};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionSide {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    Market,
    Limit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    Gtc,
    Ioc,
    Fok,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderRequest {
    pub pair: TradingPair,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub time_in_force: Option<TimeInForce>,
    pub reduce_only: bool,
    pub client_order_id: String,
}

impl OrderRequest {
    pub fn new_market(pair: TradingPair, side: Side, quantity: Decimal) -> Self {
        OrderRequest {
            pair,
            side,
            order_type: OrderType::Market,
            quantity,
            price: None,
            time_in_force: None,
            reduce_only: false,
            client_order_id: Uuid::new_v4().to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    pub exchange_order_id: Option<String>,
    pub filled_quantity: Decimal,
    pub avg_fill_price: Option<Decimal>,
    pub timestamp: Timestamp,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenOrder {
    pub exchange_order_id: String,
    pub pair: TradingPair,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
}

/// Size is always positive; `side` carries direction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub pair: TradingPair,
    pub side: PositionSide,
    pub size: Decimal,
    pub entry_price: Decimal,
    pub opened_at: Timestamp,
    pub unrealized_pnl: Decimal,
    pub mark_price: Option<Decimal>,
}

impl Position {
    pub fn mark_to_market(&mut self, price: Decimal) {
        self.mark_price = Some(price);
        let diff = price - self.entry_price;
        let signed = match self.side {
            PositionSide::Long => diff,
            PositionSide::Short => -diff,
        };
        self.unrealized_pnl = signed * self.size;
    }
}

/// A closed round-trip, emitted by the backtest engine on each exit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub pair: TradingPair,
    pub side: PositionSide,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub size: Decimal,
    pub opened_at: Timestamp,
    pub closed_at: Timestamp,
    pub realized_pnl: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub total: Decimal,
    pub available: Decimal,
    pub locked: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestConfig {
    pub pair: TradingPair,
    pub timeframe: crate::time::Timeframe,
    pub start_time: Timestamp,
    pub end_time: Timestamp,
    pub initial_capital: Decimal,
    pub commission_rate: f64,
    pub slippage: f64,
    pub data_file: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub config: BacktestConfig,
    pub strategy_name: String,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<(Timestamp, Decimal)>,
    pub win_count: u64,
    pub loss_count: u64,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub net_profit: Decimal,
    pub profit_factor: f64,
    pub win_rate: f64,
    /// Entries skipped for insufficient cash (§4.E, does not fail the run).
    pub rejected_entries: u64,
}

/// A large-but-finite stand-in for "infinite" profit factor (wins, zero
/// losses). Chosen so downstream arithmetic and serialization never have to
/// special-case `f64::INFINITY`/NaN.
pub const PROFIT_FACTOR_SENTINEL: f64 = f64::MAX / 1e6;

/// Checkpoint of the full account/order/position state (§3, §4.L).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemState {
    pub timestamp: Timestamp,
    pub equity: Decimal,
    pub balance: Decimal,
    pub available: Decimal,
    pub margin: Decimal,
    pub unrealized_pnl: Decimal,
    pub positions: Vec<Position>,
    pub open_orders: Vec<OpenOrder>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mark_to_market_long_and_short() {
        let mut long = Position {
            pair: TradingPair::new("BTC", "USDT"),
            side: PositionSide::Long,
            size: Decimal::from_int(2),
            entry_price: Decimal::from_int(100),
            opened_at: Timestamp::from_millis(0),
            unrealized_pnl: Decimal::ZERO,
            mark_price: None,
        };
        long.mark_to_market(Decimal::from_int(110));
        assert_eq!(long.unrealized_pnl, Decimal::from_int(20));

        let mut short = long.clone();
        short.side = PositionSide::Short;
        short.mark_to_market(Decimal::from_int(110));
        assert_eq!(short.unrealized_pnl, Decimal::from_int(-20));
    }
}
