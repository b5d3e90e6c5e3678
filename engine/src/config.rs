/// config.rs — Centralised configuration loaded from the environment
///
/// Loading happens once at startup (`cli`'s `main()`, after `dotenv::dotenv()`);
/// every module that needs it borrows `&AppConfig`.
use anyhow::Result;
use std::env;

#[derive(Debug, Clone)]
pub struct AppConfig {
    // ── Exchange credentials / endpoints ──────────────────────────────
    pub api_key: String,
    pub api_secret: String,
    pub use_testnet: bool,
    pub rest_url: String,

    // ── Capital & risk defaults ────────────────────────────────────────
    /// Used when a backtest config doesn't set its own.
    pub default_initial_capital: f64,
    /// Default position-sizing rule when a signal doesn't specify `size`:
    /// risk this fraction of current equity divided by price.
    pub default_risk_fraction: f64,
    pub default_commission_rate: f64,
    pub default_slippage: f64,

    // ── Runner bounded-history sizes ────────────────────────────────────
    pub order_history_capacity: usize,
    pub signal_history_capacity: usize,

    // ── Live engine defaults ─────────────────────────────────────────────
    pub balance_update_interval_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub tick_interval_ms: u64,
    pub max_reconnect_attempts: u32,

    // ── Recovery manager defaults ────────────────────────────────────────
    pub max_checkpoints: usize,
    pub max_checkpoint_age_hours: i64,
}

impl AppConfig {
    /// Load configuration from environment variables (after dotenv).
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok(); // ignore missing .env

        let api_key = env::var("EXCHANGE_API_KEY").unwrap_or_default();
        let api_secret = env::var("EXCHANGE_API_SECRET").unwrap_or_default();
        let use_testnet = env::var("EXCHANGE_USE_TESTNET")
            .unwrap_or_else(|_| "true".into())
            .to_lowercase()
            == "true";
        let rest_url = env::var("EXCHANGE_REST_URL").unwrap_or_else(|_| {
            if use_testnet {
                "https://testnet.binancefuture.com".into()
            } else {
                "https://fapi.binance.com".into()
            }
        });

        Ok(Self {
            api_key,
            api_secret,
            use_testnet,
            rest_url,

            default_initial_capital: parse_env("DEFAULT_INITIAL_CAPITAL", 10_000.0)?,
            default_risk_fraction: parse_env("DEFAULT_RISK_FRACTION", 0.02)?,
            default_commission_rate: parse_env("DEFAULT_COMMISSION_RATE", 0.0005)?,
            default_slippage: parse_env("DEFAULT_SLIPPAGE", 0.0003)?,

            order_history_capacity: parse_env("ORDER_HISTORY_CAPACITY", 1_000usize)?,
            signal_history_capacity: parse_env("SIGNAL_HISTORY_CAPACITY", 1_000usize)?,

            balance_update_interval_ms: parse_env("BALANCE_UPDATE_INTERVAL_MS", 10_000u64)?,
            heartbeat_interval_ms: parse_env("HEARTBEAT_INTERVAL_MS", 5_000u64)?,
            tick_interval_ms: parse_env("TICK_INTERVAL_MS", 1_000u64)?,
            max_reconnect_attempts: parse_env("MAX_RECONNECT_ATTEMPTS", 5u32)?,

            max_checkpoints: parse_env("MAX_CHECKPOINTS", 10usize)?,
            max_checkpoint_age_hours: parse_env("MAX_CHECKPOINT_AGE_HOURS", 24i64)?,
        })
    }
}

fn parse_env<T>(key: &str, default: T) -> Result<T>
where
    T: std::str::FromStr + Copy,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(v) => v.parse::<T>().map_err(|e| anyhow::anyhow!("config key {key}: {e}")),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_falls_back_to_default_when_unset() {
        std::env::remove_var("__QUANT_TEST_UNSET__");
        let v: i64 = parse_env("__QUANT_TEST_UNSET__", 42).unwrap();
        assert_eq!(v, 42);
    }

    #[test]
    fn from_env_succeeds_with_no_env_vars_set() {
        let cfg = AppConfig::from_env().unwrap();
        assert!(cfg.default_initial_capital > 0.0);
        assert!(cfg.max_checkpoints > 0);
    }
}
