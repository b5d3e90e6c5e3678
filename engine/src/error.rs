/// error.rs — Engine error taxonomy
///
/// Kinds, not exhaustive names: each variant groups the failures §7 of the
/// design calls out for that subsystem. Library code returns `EngineError`;
/// `cli` and other callers wrap it in `anyhow::Result` with `.context(...)`.
use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum EngineError {
    /// Invalid range/step, type mismatch, missing range, empty discrete set,
    /// no parameters to optimize, invalid grid prices/count, invalid
    /// price/size/take-profit. Fails fast at construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// No candle data, non-monotonic candle timestamps, all backtests
    /// failed, too many combinations.
    #[error("backtest error: {0}")]
    Backtest(String),

    /// Provider disconnected, reconnect exhausted, execution rejected,
    /// insufficient balance, risk check failed, rate limited, exchange
    /// payload parse error.
    #[error("live trading error: {0}")]
    Live(String),

    /// No checkpoint, corrupted snapshot, sync failed.
    #[error("recovery error: {0}")]
    Recovery(String),

    /// Bugs: zero-price signal, undersized candle buffer, double-write to
    /// an optimization slot. Distinct from the other kinds so callers never
    /// mistake a logic error for a recoverable one.
    #[error("internal invariant violated: {0}")]
    Internal(String),
}

impl EngineError {
    /// Short machine code for the user-visible failure surface (§7).
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Configuration(_) => "configuration_error",
            EngineError::Backtest(_) => "backtest_error",
            EngineError::Live(_) => "live_error",
            EngineError::Recovery(_) => "recovery_error",
            EngineError::Internal(_) => "internal_error",
        }
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        EngineError::Configuration(msg.into())
    }

    pub fn backtest(msg: impl Into<String>) -> Self {
        EngineError::Backtest(msg.into())
    }

    pub fn live(msg: impl Into<String>) -> Self {
        EngineError::Live(msg.into())
    }

    pub fn recovery(msg: impl Into<String>) -> Self {
        EngineError::Recovery(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        EngineError::Internal(msg.into())
    }
}

/// Named factory errors surfaced by `strategy::factory` (§4.D).
#[derive(Debug, Error, Clone)]
pub enum FactoryError {
    #[error("unknown strategy: {0}")]
    StrategyNotFound(String),
    #[error("invalid strategy config: {0}")]
    InvalidStrategyConfig(String),
    #[error("missing strategy parameter: {0}")]
    MissingStrategyParam(String),
    #[error("invalid strategy parameter {name}: {reason}")]
    InvalidStrategyParam { name: String, reason: String },
}

impl From<FactoryError> for EngineError {
    fn from(e: FactoryError) -> Self {
        EngineError::Configuration(e.to_string())
    }
}
