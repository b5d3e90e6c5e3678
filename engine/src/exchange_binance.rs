/// exchange_binance.rs — Binance REST adapters
///
/// Two clients mirroring the teacher's split between `data.rs`'s
/// `BinanceDataClient` (public market data, unsigned) and `live.rs`'s
/// `LiveOrderClient` (private trading endpoints, HMAC-SHA256 signed). Both
/// implement the `DataProvider`/`ExecutionClient` contracts from
/// `exchange.rs` so the live engine never depends on Binance directly.
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;

use crate::candle::Candle;
use crate::decimal::Decimal;
use crate::error::EngineError;
use crate::exchange::{DataProvider, ExecutionClient, Quote};
use crate::time::{Timeframe, Timestamp, TradingPair};
use crate::types::{Balance, OpenOrder, OrderRequest, OrderResult, Position, PositionSide, Side};

type HmacSha256 = Hmac<Sha256>;

const DEFAULT_BASE_URL: &str = "https://fapi.binance.com";

fn parse_decimal(raw: &str) -> Decimal {
    Decimal::from_string(raw).unwrap_or(Decimal::ZERO)
}

/// Public market data. Unsigned requests; no API credentials needed.
pub struct BinanceDataClient {
    http: Client,
    base_url: String,
    last_quotes: Mutex<HashMap<String, Quote>>,
}

/// Binance returns 12 elements per kline; only the leading OHLCV fields are
/// read here and the rest of the array is left unconsumed.
#[derive(Debug, Deserialize)]
struct RawKline(i64, String, String, String, String, String);

impl BinanceDataClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { http: Client::new(), base_url: base_url.into(), last_quotes: Mutex::new(HashMap::new()) }
    }

    pub fn default_endpoint() -> Self {
        Self::new(DEFAULT_BASE_URL)
    }
}

#[async_trait]
impl DataProvider for BinanceDataClient {
    async fn subscribe(&self, _pair: &TradingPair) -> Result<(), EngineError> {
        // REST polling adapter; subscription is a no-op, poll_quote does the work.
        Ok(())
    }

    async fn unsubscribe(&self, pair: &TradingPair) -> Result<(), EngineError> {
        self.last_quotes.lock().unwrap().remove(&pair.symbol());
        Ok(())
    }

    async fn poll_quote(&self, pair: &TradingPair) -> Result<Option<Quote>, EngineError> {
        let url = format!("{}/fapi/v1/ticker/bookTicker", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("symbol", pair.symbol())])
            .send()
            .await
            .map_err(|e| EngineError::live(format!("quote request failed: {e}")))?;

        #[derive(Deserialize)]
        struct BookTicker {
            #[serde(rename = "bidPrice")]
            bid_price: String,
            #[serde(rename = "askPrice")]
            ask_price: String,
        }

        let ticker: BookTicker = response
            .json()
            .await
            .map_err(|e| EngineError::live(format!("quote payload parse failed: {e}")))?;
        let bid = parse_decimal(&ticker.bid_price);
        let ask = parse_decimal(&ticker.ask_price);
        let last = Decimal::from_float((bid.to_float() + ask.to_float()) / 2.0);
        let quote = Quote { bid, ask, last, timestamp: Timestamp::now() };
        self.last_quotes.lock().unwrap().insert(pair.symbol(), quote);
        Ok(Some(quote))
    }

    async fn historical_candles(
        &self,
        pair: &TradingPair,
        timeframe: Timeframe,
        start: Timestamp,
        end: Timestamp,
    ) -> Result<Vec<Candle>, EngineError> {
        let url = format!("{}/fapi/v1/klines", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("symbol", pair.symbol()),
                ("interval", timeframe.as_str().to_string()),
                ("startTime", start.millis().to_string()),
                ("endTime", end.millis().to_string()),
                ("limit", "1500".to_string()),
            ])
            .send()
            .await
            .map_err(|e| EngineError::live(format!("klines request failed: {e}")))?;

        let raw: Vec<RawKline> = response
            .json()
            .await
            .map_err(|e| EngineError::live(format!("klines payload parse failed: {e}")))?;

        if raw.is_empty() {
            return Err(EngineError::live(format!("no historical data for {pair} in requested window")));
        }

        Ok(raw
            .into_iter()
            .map(|k| Candle {
                timestamp: Timestamp::from_millis(k.0),
                open: parse_decimal(&k.1),
                high: parse_decimal(&k.2),
                low: parse_decimal(&k.3),
                close: parse_decimal(&k.4),
                volume: parse_decimal(&k.5),
            })
            .collect())
    }
}

/// Private trading endpoints. Every request is signed per Binance's HMAC
/// convention: query string (sorted insertion order, `timestamp` last) is
/// HMAC-SHA256'd with the API secret and appended as `signature`.
pub struct BinanceExecutionClient {
    http: Client,
    base_url: String,
    api_key: String,
    api_secret: String,
}

impl BinanceExecutionClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, api_secret: impl Into<String>) -> Self {
        Self { http: Client::new(), base_url: base_url.into(), api_key: api_key.into(), api_secret: api_secret.into() }
    }

    fn sign(&self, query: &str) -> String {
        let mut mac = HmacSha256::new_from_slice(self.api_secret.as_bytes()).expect("HMAC accepts keys of any length");
        mac.update(query.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    fn timestamp_ms() -> i64 {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
    }

    async fn signed_post(&self, path: &str, mut params: Vec<(String, String)>) -> Result<serde_json::Value, EngineError> {
        params.push(("timestamp".to_string(), Self::timestamp_ms().to_string()));
        let query = params.iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join("&");
        let signature = self.sign(&query);
        let url = format!("{}{path}?{query}&signature={signature}", self.base_url);

        let response = self
            .http
            .post(&url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(|e| EngineError::live(format!("signed request failed: {e}")))?;

        response.json().await.map_err(|e| EngineError::live(format!("response parse failed: {e}")))
    }
}

#[async_trait]
impl ExecutionClient for BinanceExecutionClient {
    async fn submit_order(&self, request: &OrderRequest) -> Result<OrderResult, EngineError> {
        let side = match request.side {
            Side::Buy => "BUY",
            Side::Sell => "SELL",
        };
        let params = vec![
            ("symbol".to_string(), request.pair.symbol()),
            ("side".to_string(), side.to_string()),
            ("type".to_string(), "MARKET".to_string()),
            ("quantity".to_string(), request.quantity.to_string()),
            ("newClientOrderId".to_string(), request.client_order_id.clone()),
        ];
        let payload = self.signed_post("/fapi/v1/order", params).await?;

        if let Some(code) = payload.get("code").and_then(|v| v.as_i64()) {
            let msg = payload.get("msg").and_then(|v| v.as_str()).unwrap_or("unknown exchange error").to_string();
            return Ok(OrderResult {
                success: false,
                exchange_order_id: None,
                filled_quantity: Decimal::ZERO,
                avg_fill_price: None,
                timestamp: Timestamp::now(),
                error_code: Some(code.to_string()),
                error_message: Some(msg),
            });
        }

        let order_id = payload.get("orderId").map(|v| v.to_string());
        let filled = payload.get("executedQty").and_then(|v| v.as_str()).map(parse_decimal).unwrap_or(Decimal::ZERO);
        let avg_price = payload.get("avgPrice").and_then(|v| v.as_str()).map(parse_decimal);

        Ok(OrderResult {
            success: true,
            exchange_order_id: order_id,
            filled_quantity: filled,
            avg_fill_price: avg_price,
            timestamp: Timestamp::now(),
            error_code: None,
            error_message: None,
        })
    }

    async fn cancel_order(&self, exchange_order_id: &str) -> Result<(), EngineError> {
        self.signed_post("/fapi/v1/order", vec![("orderId".to_string(), exchange_order_id.to_string())])
            .await
            .map(|_| ())
    }

    async fn cancel_all(&self, pair: Option<&TradingPair>) -> Result<(), EngineError> {
        let params = match pair {
            Some(p) => vec![("symbol".to_string(), p.symbol())],
            None => vec![],
        };
        self.signed_post("/fapi/v1/allOpenOrders", params).await.map(|_| ())
    }

    async fn open_orders(&self, pair: Option<&TradingPair>) -> Result<Vec<OpenOrder>, EngineError> {
        let params = match pair {
            Some(p) => vec![("symbol".to_string(), p.symbol())],
            None => vec![],
        };
        let payload = self.signed_post("/fapi/v1/openOrders", params).await?;
        let raw = payload.as_array().cloned().unwrap_or_default();
        Ok(raw
            .into_iter()
            .filter_map(|o| {
                let symbol = o.get("symbol")?.as_str()?.to_string();
                let side = if o.get("side")?.as_str()? == "BUY" { Side::Buy } else { Side::Sell };
                Some(OpenOrder {
                    exchange_order_id: o.get("orderId")?.to_string(),
                    pair: TradingPair::parse(&symbol).ok()?,
                    side,
                    quantity: parse_decimal(o.get("origQty")?.as_str()?),
                    price: o.get("price").and_then(|v| v.as_str()).map(parse_decimal),
                })
            })
            .collect())
    }

    async fn positions(&self) -> Result<Vec<Position>, EngineError> {
        let payload = self.signed_post("/fapi/v2/positionRisk", vec![]).await?;
        let raw = payload.as_array().cloned().unwrap_or_default();
        Ok(raw
            .into_iter()
            .filter_map(|p| {
                let symbol = p.get("symbol")?.as_str()?.to_string();
                let amount = parse_decimal(p.get("positionAmt")?.as_str()?);
                if amount.is_zero() {
                    return None;
                }
                Some(Position {
                    pair: TradingPair::parse(&symbol).ok()?,
                    side: if amount.is_positive() { PositionSide::Long } else { PositionSide::Short },
                    size: amount.abs(),
                    entry_price: parse_decimal(p.get("entryPrice")?.as_str()?),
                    opened_at: Timestamp::now(),
                    unrealized_pnl: Decimal::ZERO,
                    mark_price: None,
                })
            })
            .collect())
    }

    async fn balance(&self) -> Result<Balance, EngineError> {
        let payload = self.signed_post("/fapi/v2/balance", vec![]).await?;
        let raw = payload.as_array().cloned().unwrap_or_default();
        let usdt = raw.into_iter().find(|b| b.get("asset").and_then(|v| v.as_str()) == Some("USDT"));
        match usdt {
            Some(b) => {
                let total = b.get("balance").and_then(|v| v.as_str()).map(parse_decimal).unwrap_or(Decimal::ZERO);
                let available =
                    b.get("availableBalance").and_then(|v| v.as_str()).map(parse_decimal).unwrap_or(total);
                Ok(Balance { total, available, locked: total - available })
            }
            None => Err(EngineError::live("USDT balance not present in exchange response")),
        }
    }

    async fn set_leverage(&self, pair: &TradingPair, multiplier: u32, _cross: bool) -> Result<(), EngineError> {
        let params = vec![("symbol".to_string(), pair.symbol()), ("leverage".to_string(), multiplier.to_string())];
        self.signed_post("/fapi/v1/leverage", params).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_for_the_same_query_and_secret() {
        let client = BinanceExecutionClient::new(DEFAULT_BASE_URL, "key", "secret");
        let sig_a = client.sign("symbol=BTCUSDT&side=BUY&timestamp=1");
        let sig_b = client.sign("symbol=BTCUSDT&side=BUY&timestamp=1");
        assert_eq!(sig_a, sig_b);
        assert_eq!(sig_a.len(), 64); // hex-encoded SHA-256 digest
    }

    #[test]
    fn parse_decimal_falls_back_to_zero_on_garbage_input() {
        assert_eq!(parse_decimal("not-a-number"), Decimal::ZERO);
        assert_eq!(parse_decimal("12.5"), Decimal::from_string("12.5").unwrap());
    }
}
