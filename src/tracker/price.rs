// 价格源 / Price feed
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::perps::errors::{Result, TradeError};
use crate::perps::registry;

/// 按市场符号提供 USD 价格 / USD price per market symbol
#[async_trait]
pub trait PriceFeed: Send + Sync {
    async fn get_price(&self, symbol: &str) -> Result<f64>;
}

/// Jupiter Price API v2 价格源 / Jupiter Price API v2 feed
pub struct JupiterPriceFeed {
    endpoint: String,
    client: Client,
}

impl JupiterPriceFeed {
    pub fn new(endpoint: String, timeout: Duration) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { endpoint, client })
    }

    fn unavailable(symbol: &str, reason: impl Into<String>) -> TradeError {
        TradeError::PriceUnavailable {
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }
}

/// 从 `{"data": {"<mint>": {"price": ...}}}` 中取价格，价格可能是字符串
/// Extract the price from `{"data": {"<mint>": {"price": ...}}}`; the price may be a string
pub fn parse_price_response(body: &Value, mint: &str) -> Option<f64> {
    let price = body.get("data")?.get(mint)?.get("price")?;
    let value = match price {
        Value::String(s) => s.parse::<f64>().ok()?,
        Value::Number(n) => n.as_f64()?,
        _ => return None,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

#[async_trait]
impl PriceFeed for JupiterPriceFeed {
    async fn get_price(&self, symbol: &str) -> Result<f64> {
        let market = registry::market(symbol)?;
        if market.is_stable() {
            return Ok(1.0);
        }

        let mint = market.mint.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("ids", mint.as_str())])
            .send()
            .await
            .map_err(|e| Self::unavailable(market.symbol, e.to_string()))?;

        if !response.status().is_success() {
            return Err(Self::unavailable(
                market.symbol,
                format!("HTTP status {}", response.status()),
            ));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Self::unavailable(market.symbol, e.to_string()))?;

        let price = parse_price_response(&body, &mint)
            .ok_or_else(|| Self::unavailable(market.symbol, "no price in response"))?;
        debug!("💲 {} = {}", market.symbol, price);
        Ok(price)
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_price_accepts_string_and_number() {
        let mint = "So11111111111111111111111111111111111111112";
        let body = json!({ "data": { mint: { "id": mint, "price": "142.57" } } });
        assert_eq!(parse_price_response(&body, mint), Some(142.57));

        let body = json!({ "data": { mint: { "price": 99.5 } } });
        assert_eq!(parse_price_response(&body, mint), Some(99.5));
    }

    #[test]
    fn test_parse_price_rejects_missing_or_invalid() {
        let mint = "So11111111111111111111111111111111111111112";
        assert_eq!(parse_price_response(&json!({ "data": {} }), mint), None);
        assert_eq!(
            parse_price_response(&json!({ "data": { mint: null } }), mint),
            None
        );
        assert_eq!(
            parse_price_response(&json!({ "data": { mint: { "price": "0" } } }), mint),
            None
        );
    }
}
