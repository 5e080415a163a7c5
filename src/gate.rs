//! Gate spot REST connector (venue A).
//!
//! Public endpoints (pair meta, order book) work unsigned; order and
//! account endpoints carry the v4 HMAC-SHA512 signature. All responses are
//! parsed as JSON values with tolerant field fallbacks because the venue
//! mixes strings and numbers across endpoints.

use std::collections::HashMap;
use std::time::Duration;

use hmac::{Hmac, Mac};
use serde_json::{json, Value};
use sha2::{Digest, Sha512};
use uuid::Uuid;

use crate::strategy::config::GateCredentials;
use crate::strategy::error::VenueError;
use crate::strategy::types::{
    split_symbol, AssetBalance, BookLevel, GateMeta, OrderBook, SpotOrderDetail, SpotSide,
};
use crate::strategy::venue::SpotVenue;
use crate::utils::{value_f64, value_str};

const GATE_REST_BASE: &str = "https://api.gateio.ws";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

pub struct GateSpotClient {
    client: reqwest::Client,
    base_url: String,
    credentials: Option<GateCredentials>,
}

fn transport_error(e: reqwest::Error) -> VenueError {
    if e.is_timeout() {
        VenueError::Transient("gate request timeout".into())
    } else {
        VenueError::Transient(format!("gate request failed: {}", e))
    }
}

impl GateSpotClient {
    pub fn new(credentials: Option<GateCredentials>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: GATE_REST_BASE.to_string(),
            credentials,
        }
    }

    pub fn with_base_url(credentials: Option<GateCredentials>, base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            credentials,
        }
    }

    /// v4 signature: HMAC-SHA512 over
    /// `METHOD\npath\nquery\nSHA512(body)\ntimestamp`, hex-encoded.
    fn signed_headers(
        &self,
        method: &str,
        path: &str,
        query: &str,
        body: &str,
    ) -> Result<[(&'static str, String); 3], VenueError> {
        let creds = self
            .credentials
            .as_ref()
            .ok_or_else(|| VenueError::Auth("gate credentials not configured".into()))?;
        let timestamp = chrono::Utc::now().timestamp().to_string();

        let mut hasher = Sha512::new();
        hasher.update(body.as_bytes());
        let body_hash = hex::encode(hasher.finalize());

        let payload = format!("{}\n{}\n{}\n{}\n{}", method, path, query, body_hash, timestamp);
        let mut mac = Hmac::<Sha512>::new_from_slice(creds.api_secret.as_bytes())
            .expect("HMAC accepts any key size");
        mac.update(payload.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok([
            ("KEY", creds.api_key.clone()),
            ("Timestamp", timestamp),
            ("SIGN", signature),
        ])
    }

    async fn handle_response(resp: reqwest::Response) -> Result<Value, VenueError> {
        let status = resp.status();
        let text = resp.text().await.map_err(transport_error)?;

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(VenueError::Auth(format!("gate {}: {}", status, text)));
        }
        if !status.is_success() {
            let Ok(body) = serde_json::from_str::<Value>(&text) else {
                return Err(VenueError::Transient(format!(
                    "gate {} with non-JSON body: {}",
                    status, text
                )));
            };
            let label = value_str(&body, &["label"]).unwrap_or_default();
            let message =
                value_str(&body, &["message", "detail"]).unwrap_or_else(|| text.clone());
            if label == "ORDER_NOT_FOUND" {
                return Err(VenueError::NotFound(message));
            }
            return Err(VenueError::Business(format!("{} {}", label, message)));
        }

        serde_json::from_str(&text)
            .map_err(|e| VenueError::Transient(format!("gate non-JSON body: {}", e)))
    }

    async fn get_public(&self, path: &str, query: &str) -> Result<Value, VenueError> {
        let url = format!("{}{}?{}", self.base_url, path, query);
        let resp = self
            .client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)?;
        Self::handle_response(resp).await
    }

    async fn request_signed(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &str,
        body: Option<&Value>,
    ) -> Result<Value, VenueError> {
        let body_str = body.map(|b| b.to_string()).unwrap_or_default();
        let headers = self.signed_headers(method.as_str(), path, query, &body_str)?;

        let url = if query.is_empty() {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}{}?{}", self.base_url, path, query)
        };
        let mut req = self.client.request(method, url).timeout(REQUEST_TIMEOUT);
        for (name, val) in headers {
            req = req.header(name, val);
        }
        if !body_str.is_empty() {
            req = req
                .header("Content-Type", "application/json")
                .body(body_str);
        }
        let resp = req.send().await.map_err(transport_error)?;
        Self::handle_response(resp).await
    }
}

fn parse_levels(value: Option<&Value>) -> Vec<BookLevel> {
    let Some(Value::Array(levels)) = value else {
        return Vec::new();
    };
    levels
        .iter()
        .filter_map(|level| {
            let arr = level.as_array()?;
            let price = arr.first().and_then(json_num)?;
            let qty = arr.get(1).and_then(json_num)?;
            Some(BookLevel { price, qty })
        })
        .collect()
}

fn json_num(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[async_trait::async_trait]
impl SpotVenue for GateSpotClient {
    async fn pair_meta(&self, symbol: &str) -> Result<GateMeta, VenueError> {
        let body = self
            .get_public(
                "/api/v4/spot/currency_pairs",
                &format!("currency_pair={}", symbol),
            )
            .await?;
        let item = match &body {
            Value::Array(items) => items
                .first()
                .ok_or_else(|| VenueError::Business(format!("unknown pair {}", symbol)))?,
            other => other,
        };
        Ok(GateMeta {
            price_scale: value_f64(item, &["precision", "trade_price_precision"])
                .unwrap_or(GateMeta::FALLBACK.price_scale as f64) as u32,
            qty_scale: value_f64(item, &["amount_precision", "trade_amount_precision"])
                .unwrap_or(GateMeta::FALLBACK.qty_scale as f64) as u32,
            min_qty: value_f64(item, &["min_base_amount"]).unwrap_or(0.0),
            min_quote: value_f64(item, &["min_quote_amount"]).unwrap_or(0.0),
        })
    }

    async fn order_book(&self, symbol: &str) -> Result<OrderBook, VenueError> {
        let body = self
            .get_public(
                "/api/v4/spot/order_book",
                &format!("currency_pair={}", symbol),
            )
            .await?;
        Ok(OrderBook {
            bids: parse_levels(body.get("bids")),
            asks: parse_levels(body.get("asks")),
        })
    }

    async fn place_limit_order(
        &self,
        symbol: &str,
        side: SpotSide,
        price: &str,
        amount: &str,
    ) -> Result<String, VenueError> {
        let client_id = Uuid::new_v4().simple().to_string();
        let order = json!({
            "currency_pair": symbol,
            "type": "limit",
            "account": "spot",
            "side": side.as_str(),
            "price": price,
            "amount": amount,
            "text": format!("t-{}", &client_id[..16]),
        });
        eprintln!("[GATE] placing order: {}", order);
        let body = self
            .request_signed(reqwest::Method::POST, "/api/v4/spot/orders", "", Some(&order))
            .await?;
        value_str(&body, &["id", "order_id", "orderId"])
            .ok_or_else(|| VenueError::Business(format!("order id missing in response: {}", body)))
    }

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), VenueError> {
        eprintln!("[GATE] cancelling order {}", order_id);
        self.request_signed(
            reqwest::Method::DELETE,
            &format!("/api/v4/spot/orders/{}", order_id),
            &format!("currency_pair={}", symbol),
            None,
        )
        .await?;
        Ok(())
    }

    async fn order_detail(
        &self,
        symbol: &str,
        order_id: &str,
    ) -> Result<SpotOrderDetail, VenueError> {
        let body = self
            .request_signed(
                reqwest::Method::GET,
                &format!("/api/v4/spot/orders/{}", order_id),
                &format!("currency_pair={}", symbol),
                None,
            )
            .await?;
        let amount = value_f64(&body, &["amount"]).unwrap_or(0.0);
        let filled_amount = value_f64(&body, &["filledAmount", "filled_amount"]).unwrap_or(0.0);
        let left = value_f64(&body, &["left", "left_amount"])
            .unwrap_or_else(|| (amount - filled_amount).max(0.0));
        Ok(SpotOrderDetail {
            amount,
            filled_amount,
            left,
            avg_deal_price: value_f64(
                &body,
                &["avgDealPrice", "avg_deal_price", "fill_price", "avgFillPrice"],
            )
            .unwrap_or(0.0),
            status: value_str(&body, &["status"]).unwrap_or_default(),
        })
    }

    async fn balances(&self, symbol: &str) -> Result<HashMap<String, AssetBalance>, VenueError> {
        let body = self
            .request_signed(reqwest::Method::GET, "/api/v4/spot/accounts", "", None)
            .await?;
        let Value::Array(accounts) = body else {
            return Err(VenueError::Transient(format!(
                "unexpected accounts payload: {}",
                body
            )));
        };

        let mut wanted: Vec<String> = vec!["USDT".to_string()];
        if let Some((base, quote)) = split_symbol(symbol) {
            wanted.push(base.to_string());
            wanted.push(quote.to_string());
        }

        let mut out = HashMap::new();
        for account in &accounts {
            let Some(currency) = value_str(account, &["currency"]) else {
                continue;
            };
            if !wanted.iter().any(|w| w == &currency) {
                continue;
            }
            out.insert(
                currency,
                AssetBalance {
                    available: value_f64(account, &["available"]).unwrap_or(0.0),
                    locked: value_f64(account, &["locked"]).unwrap_or(0.0),
                },
            );
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_levels_string_pairs() {
        let book = json!({"asks": [["1.5", "100"], ["1.6", "50"]], "bids": []});
        let asks = parse_levels(book.get("asks"));
        assert_eq!(asks.len(), 2);
        assert_eq!(asks[0].price, 1.5);
        assert_eq!(asks[0].qty, 100.0);
    }

    #[test]
    fn test_parse_levels_tolerates_garbage() {
        let book = json!({"asks": [["x", "100"], ["1.6"], 42]});
        assert!(parse_levels(book.get("asks")).is_empty());
        assert!(parse_levels(None).is_empty());
    }

    #[test]
    fn test_signed_headers_requires_credentials() {
        let client = GateSpotClient::new(None);
        let err = client
            .signed_headers("GET", "/api/v4/spot/accounts", "", "")
            .unwrap_err();
        assert!(matches!(err, VenueError::Auth(_)));
    }

    #[test]
    fn test_signed_headers_shape() {
        let client = GateSpotClient::new(Some(GateCredentials {
            api_key: "key".into(),
            api_secret: "secret".into(),
        }));
        let headers = client
            .signed_headers("POST", "/api/v4/spot/orders", "", "{}")
            .unwrap();
        assert_eq!(headers[0].0, "KEY");
        assert_eq!(headers[0].1, "key");
        assert_eq!(headers[2].0, "SIGN");
        // HMAC-SHA512 hex digest is 128 chars
        assert_eq!(headers[2].1.len(), 128);
    }
}
