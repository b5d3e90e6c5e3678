//! `quant_core` — the trading-platform core: backtest engine, strategy
//! contract, performance analyzer, grid-search optimizer, exchange-facing
//! interfaces, live trading engine, grid-trading state machine, runner
//! supervision, and recovery manager.

pub mod backtest;
pub mod candle;
pub mod config;
pub mod decimal;
pub mod error;
pub mod exchange;
pub mod exchange_binance;
pub mod grid_trading;
pub mod live;
pub mod optimize;
pub mod performance;
pub mod recovery;
pub mod runner;
pub mod strategy;
pub mod time;
pub mod types;

pub use decimal::Decimal;
pub use error::{EngineError, FactoryError};
