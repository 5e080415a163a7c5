//! MEXC USDT-futures REST connector (venue B).
//!
//! Public contract endpoints are tried on both documented hosts; private
//! order/account endpoints authenticate with the web token in the
//! Authorization header. The venue's field names vary between deployments,
//! so every numeric is read through a fallback chain.

use std::time::Duration;

use serde_json::{json, Value};

use crate::strategy::error::VenueError;
use crate::strategy::types::{
    BookLevel, FuturesOrderDetail, FuturesOrderRequest, MexcMeta, OrderBook,
};
use crate::strategy::venue::FuturesVenue;
use crate::utils::{value_f64, value_str};

const MEXC_FUTURES_BASE: &str = "https://futures.mexc.com";
const MEXC_CONTRACT_BASE: &str = "https://contract.mexc.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(8);

pub struct MexcFuturesClient {
    client: reqwest::Client,
    futures_base: String,
    contract_base: String,
    auth_token: Option<String>,
}

fn transport_error(e: reqwest::Error) -> VenueError {
    if e.is_timeout() {
        VenueError::Transient("mexc request timeout".into())
    } else {
        VenueError::Transient(format!("mexc request failed: {}", e))
    }
}

/// Classify a venue error message the way operators read them.
fn classify_message(msg: &str) -> VenueError {
    let lower = msg.to_lowercase();
    if lower.contains("token") && lower.contains("expire") {
        return VenueError::Auth("token expired".into());
    }
    if lower.contains("sign") && lower.contains("invalid") {
        return VenueError::Auth("invalid signature".into());
    }
    if lower.contains("param") || lower.contains("invalid") {
        return VenueError::Business(format!("invalid parameters: {}", msg));
    }
    VenueError::Business(msg.to_string())
}

impl MexcFuturesClient {
    pub fn new(auth_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            futures_base: MEXC_FUTURES_BASE.to_string(),
            contract_base: MEXC_CONTRACT_BASE.to_string(),
            auth_token,
        }
    }

    pub fn with_base_urls(
        auth_token: Option<String>,
        futures_base: impl Into<String>,
        contract_base: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            futures_base: futures_base.into(),
            contract_base: contract_base.into(),
            auth_token,
        }
    }

    fn token(&self) -> Result<&str, VenueError> {
        self.auth_token
            .as_deref()
            .ok_or_else(|| VenueError::Auth("no_web_token".into()))
    }

    async fn handle_response(resp: reqwest::Response) -> Result<Value, VenueError> {
        let status = resp.status();
        let text = resp.text().await.map_err(transport_error)?;

        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(VenueError::Auth(format!("mexc {}: {}", status, text)));
        }
        let Ok(body) = serde_json::from_str::<Value>(&text) else {
            return Err(VenueError::Transient(format!(
                "mexc {} with non-JSON body: {}",
                status, text
            )));
        };
        if !status.is_success() {
            let msg = value_str(&body, &["msg", "message"]).unwrap_or(text);
            return Err(classify_message(&msg));
        }

        // Envelope: {success, code, data, msg}; code 0 means ok.
        if let Some(code) = body.get("code").and_then(|c| c.as_i64()) {
            if code != 0 {
                let msg = value_str(&body, &["msg", "message"])
                    .unwrap_or_else(|| format!("code {}", code));
                return Err(classify_message(&msg));
            }
        }
        if let Some(false) = body.get("success").and_then(|s| s.as_bool()) {
            let msg = value_str(&body, &["msg", "message"]).unwrap_or_else(|| "success=false".into());
            return Err(classify_message(&msg));
        }
        Ok(body)
    }

    async fn get_public(&self, url: String) -> Result<Value, VenueError> {
        let resp = self
            .client
            .get(url)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport_error)?;
        Self::handle_response(resp).await
    }

    async fn request_private(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, VenueError> {
        let token = self.token()?;
        let url = format!("{}{}", self.futures_base, path);
        let mut req = self
            .client
            .request(method, url)
            .timeout(REQUEST_TIMEOUT)
            .header("Authorization", token)
            .header("Content-Type", "application/json");
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await.map_err(transport_error)?;
        Self::handle_response(resp).await
    }
}

/// Unwrap the `data` envelope when present.
fn data_of(body: &Value) -> &Value {
    body.get("data").unwrap_or(body)
}

fn parse_contract_meta(item: &Value) -> MexcMeta {
    MexcMeta {
        price_scale: value_f64(item, &["priceScale", "price_scale", "price_digit"])
            .unwrap_or(MexcMeta::FALLBACK.price_scale as f64) as u32,
        vol_precision: value_f64(item, &["volPrecision", "quantity_scale"])
            .unwrap_or(MexcMeta::FALLBACK.vol_precision as f64) as u32,
        contract_size: value_f64(item, &["contractSize", "contract_value", "value", "multiplier"])
            .unwrap_or(MexcMeta::FALLBACK.contract_size),
        min_contracts: value_f64(item, &["minVol", "min_volume"])
            .unwrap_or(MexcMeta::FALLBACK.min_contracts),
    }
}

/// Depth levels arrive as `[price, contracts, order_count]` arrays.
fn parse_depth_levels(value: Option<&Value>) -> Vec<BookLevel> {
    let Some(Value::Array(levels)) = value else {
        return Vec::new();
    };
    levels
        .iter()
        .filter_map(|level| {
            let arr = level.as_array()?;
            let price = arr.first().and_then(Value::as_f64)?;
            let qty = arr.get(1).and_then(Value::as_f64)?;
            Some(BookLevel { price, qty })
        })
        .collect()
}

pub(crate) fn parse_order_detail(body: &Value) -> FuturesOrderDetail {
    let d = data_of(body);
    let deal_vol =
        value_f64(d, &["dealVol", "filledQty", "filled", "deal_volume", "cumQty"]).unwrap_or(0.0);
    let vol = value_f64(d, &["vol", "volume", "quantity", "origQty"]).unwrap_or(0.0);
    let remain_vol = value_f64(d, &["remainVol", "remaining_volume"])
        .unwrap_or_else(|| (vol - deal_vol).max(0.0));
    FuturesOrderDetail {
        vol,
        deal_vol: deal_vol.max(0.0),
        remain_vol,
        price_avg: value_f64(
            d,
            &["priceAvg", "avgPrice", "avg_price", "avgDealPrice", "fill_price"],
        )
        .unwrap_or(0.0),
        state: value_str(d, &["state", "status", "orderStatus", "orderState"]).unwrap_or_default(),
    }
}

pub(crate) fn pick_usdt_available(body: &Value) -> Option<f64> {
    let assets = match data_of(body) {
        Value::Array(items) => items.as_slice(),
        _ => return None,
    };
    for asset in assets {
        let currency = value_str(asset, &["currency"]).unwrap_or_default();
        if currency.to_uppercase() == "USDT" {
            return value_f64(
                asset,
                &[
                    "availableBalance",
                    "availableCash",
                    "availableOpen",
                    "balanceAvailable",
                    "available",
                ],
            );
        }
    }
    None
}

#[async_trait::async_trait]
impl FuturesVenue for MexcFuturesClient {
    async fn contract_meta(&self, symbol: &str) -> Result<MexcMeta, VenueError> {
        let mut last_err = VenueError::Transient("contract detail unavailable".into());
        for base in [&self.futures_base, &self.contract_base] {
            let url = format!("{}/api/v1/contract/detail?symbol={}", base, symbol);
            match self.get_public(url).await {
                Ok(body) => {
                    let item = match data_of(&body) {
                        Value::Array(items) => items.first().cloned(),
                        other => Some(other.clone()),
                    };
                    if let Some(item) = item.filter(|v| v.is_object()) {
                        return Ok(parse_contract_meta(&item));
                    }
                    last_err =
                        VenueError::Business(format!("no contract detail for {}", symbol));
                }
                Err(e) => last_err = e,
            }
        }
        Err(last_err)
    }

    async fn depth(&self, symbol: &str) -> Result<OrderBook, VenueError> {
        let url = format!("{}/api/v1/contract/depth/{}?limit=5", self.contract_base, symbol);
        let body = self.get_public(url).await?;
        let d = data_of(&body);
        Ok(OrderBook {
            bids: parse_depth_levels(d.get("bids")),
            asks: parse_depth_levels(d.get("asks")),
        })
    }

    async fn submit_order(&self, req: &FuturesOrderRequest) -> Result<String, VenueError> {
        let leverage = if req.leverage > 0.0 { req.leverage } else { 1.0 };
        let payload = json!({
            "symbol": req.symbol,
            "price": req.price,
            "vol": req.contracts,
            "side": req.side_code,
            // isolated margin, limit order
            "openType": 1,
            "leverage": leverage,
            "type": 1,
        });
        eprintln!("[MEXC] submitting order: {}", payload);
        let body = self
            .request_private(
                reqwest::Method::POST,
                "/api/v1/private/order/submit",
                Some(&payload),
            )
            .await?;
        let order_id = value_str(&body, &["orderId", "id"])
            .or_else(|| value_str(data_of(&body), &["orderId", "id"]))
            .or_else(|| match data_of(&body) {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            });
        order_id
            .ok_or_else(|| VenueError::Business(format!("order id missing in response: {}", body)))
    }

    async fn cancel_order(&self, _symbol: &str, order_id: &str) -> Result<(), VenueError> {
        eprintln!("[MEXC] cancelling order {}", order_id);
        let payload = json!([order_id]);
        self.request_private(
            reqwest::Method::POST,
            "/api/v1/private/order/cancel",
            Some(&payload),
        )
        .await?;
        Ok(())
    }

    async fn order_detail(
        &self,
        _symbol: &str,
        order_id: &str,
    ) -> Result<FuturesOrderDetail, VenueError> {
        if !order_id.chars().all(|c| c.is_ascii_digit()) {
            return Err(VenueError::Business(format!(
                "non-numeric mexc order id: {}",
                order_id
            )));
        }
        let body = self
            .request_private(
                reqwest::Method::GET,
                &format!("/api/v1/private/order/get/{}", order_id),
                None,
            )
            .await?;
        Ok(parse_order_detail(&body))
    }

    async fn available_usdt(&self) -> Result<Option<f64>, VenueError> {
        let body = self
            .request_private(reqwest::Method::GET, "/api/v1/private/account/assets", None)
            .await?;
        Ok(pick_usdt_available(&body))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_contract_meta_fallback_names() {
        let item = json!({"price_scale": 5, "quantity_scale": 2, "contract_value": 0.5, "min_volume": 3});
        let meta = parse_contract_meta(&item);
        assert_eq!(meta.price_scale, 5);
        assert_eq!(meta.vol_precision, 2);
        assert_eq!(meta.contract_size, 0.5);
        assert_eq!(meta.min_contracts, 3.0);
    }

    #[test]
    fn test_parse_contract_meta_defaults() {
        let meta = parse_contract_meta(&json!({}));
        assert_eq!(meta.price_scale, 4);
        assert_eq!(meta.contract_size, 10.0);
        assert_eq!(meta.min_contracts, 1.0);
    }

    #[test]
    fn test_parse_order_detail_nested_data() {
        let body = json!({"code": 0, "data": {"dealVol": "7", "vol": 10, "state": 2, "priceAvg": "1.25"}});
        let detail = parse_order_detail(&body);
        assert_eq!(detail.deal_vol, 7.0);
        assert_eq!(detail.vol, 10.0);
        assert_eq!(detail.remain_vol, 3.0);
        assert_eq!(detail.price_avg, 1.25);
        assert_eq!(detail.state, "2");
    }

    #[test]
    fn test_pick_usdt_available() {
        let body = json!({"data": [
            {"currency": "BTC", "availableBalance": 1.0},
            {"currency": "usdt", "availableCash": 250.5}
        ]});
        assert_eq!(pick_usdt_available(&body), Some(250.5));
        assert_eq!(pick_usdt_available(&json!({"data": []})), None);
    }

    #[test]
    fn test_classify_message() {
        assert!(matches!(
            classify_message("your token has expired"),
            VenueError::Auth(_)
        ));
        assert!(matches!(
            classify_message("sign invalid"),
            VenueError::Auth(_)
        ));
        assert!(matches!(
            classify_message("param error: vol"),
            VenueError::Business(_)
        ));
        assert!(matches!(
            classify_message("insufficient balance"),
            VenueError::Business(_)
        ));
    }
}
