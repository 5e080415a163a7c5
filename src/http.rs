//! Operator HTTP surface: a thin axum adapter over the trade desk.
//!
//! Handlers parse, delegate, and serialize; every decision lives in the
//! strategy layer.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::strategy::engine::TradeDesk;
use crate::strategy::error::OpError;
use crate::strategy::types::TradeMode;
use crate::DynError;

pub struct ApiError(OpError);

impl From<OpError> for ApiError {
    fn from(e: OpError) -> Self {
        ApiError(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            OpError::Validation(_) => StatusCode::BAD_REQUEST,
            OpError::UnknownTrade(_) => StatusCode::NOT_FOUND,
            OpError::Venue(_) => StatusCode::BAD_GATEWAY,
            OpError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

#[derive(Deserialize)]
struct SymbolBody {
    symbol: String,
}

#[derive(Deserialize)]
struct MetaQuery {
    symbol: Option<String>,
}

#[derive(Deserialize)]
struct OverrideBody {
    symbol: String,
    #[serde(rename = "override")]
    patch: Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TargetBody {
    target_qty: f64,
}

#[derive(Deserialize)]
struct ModeBody {
    #[serde(default)]
    mode: Option<TradeMode>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelBody {
    local_id: String,
}

async fn get_symbol(State(desk): State<Arc<TradeDesk>>) -> ApiResult {
    Ok(Json(json!({ "symbol": desk.current_symbol().await })))
}

async fn set_symbol(State(desk): State<Arc<TradeDesk>>, Json(body): Json<SymbolBody>) -> ApiResult {
    let (symbol, meta) = desk.set_symbol(&body.symbol).await?;
    Ok(Json(json!({ "symbol": symbol, "meta": meta })))
}

async fn get_market_meta(
    State(desk): State<Arc<TradeDesk>>,
    Query(query): Query<MetaQuery>,
) -> ApiResult {
    let report = desk.market_meta(query.symbol.as_deref()).await;
    Ok(Json(serde_json::to_value(report).map_err(|e| OpError::Storage(e.to_string()))?))
}

async fn set_meta_override(
    State(desk): State<Arc<TradeDesk>>,
    Json(body): Json<OverrideBody>,
) -> ApiResult {
    let (symbol, merged) = desk.set_meta_override(&body.symbol, &body.patch).await?;
    Ok(Json(json!({ "symbol": symbol, "merged": merged })))
}

async fn get_data(State(desk): State<Arc<TradeDesk>>) -> ApiResult {
    let report = desk.market_data().await?;
    Ok(Json(serde_json::to_value(report).map_err(|e| OpError::Storage(e.to_string()))?))
}

async fn get_balances(State(desk): State<Arc<TradeDesk>>) -> ApiResult {
    let report = desk.balances().await;
    Ok(Json(serde_json::to_value(report).map_err(|e| OpError::Storage(e.to_string()))?))
}

async fn set_position_target(
    State(desk): State<Arc<TradeDesk>>,
    Json(body): Json<TargetBody>,
) -> ApiResult {
    let target = desk.set_position_target(body.target_qty).await?;
    Ok(Json(json!({ "targetQty": target })))
}

async fn get_position_progress(State(desk): State<Arc<TradeDesk>>) -> ApiResult {
    let position = desk.position_progress().await;
    Ok(Json(serde_json::to_value(position).map_err(|e| OpError::Storage(e.to_string()))?))
}

async fn post_precheck(State(desk): State<Arc<TradeDesk>>, Json(body): Json<ModeBody>) -> ApiResult {
    let report = desk.precheck(body.mode.unwrap_or(TradeMode::Open)).await?;
    Ok(Json(serde_json::to_value(report).map_err(|e| OpError::Storage(e.to_string()))?))
}

async fn post_execute(State(desk): State<Arc<TradeDesk>>, Json(body): Json<ModeBody>) -> ApiResult {
    let report = desk.execute_trade(body.mode.unwrap_or(TradeMode::Open)).await?;
    Ok(Json(serde_json::to_value(report).map_err(|e| OpError::Storage(e.to_string()))?))
}

async fn post_cancel(State(desk): State<Arc<TradeDesk>>, Json(body): Json<CancelBody>) -> ApiResult {
    let report = desk.cancel_trade(&body.local_id).await?;
    Ok(Json(serde_json::to_value(report).map_err(|e| OpError::Storage(e.to_string()))?))
}

async fn get_history(State(desk): State<Arc<TradeDesk>>) -> ApiResult {
    let history = desk.history().await;
    Ok(Json(serde_json::to_value(history).map_err(|e| OpError::Storage(e.to_string()))?))
}

pub fn router(desk: Arc<TradeDesk>) -> Router {
    Router::new()
        .route("/symbol", get(get_symbol).post(set_symbol))
        .route("/market-meta", get(get_market_meta))
        .route("/market-meta-override", post(set_meta_override))
        .route("/data", get(get_data))
        .route("/balances", get(get_balances))
        .route("/position-target", post(set_position_target))
        .route("/position-progress", get(get_position_progress))
        .route("/precheck", post(post_precheck))
        .route("/execute-trade", post(post_execute))
        .route("/cancel-order", post(post_cancel))
        .route("/history", get(get_history))
        .with_state(desk)
}

/// Serve the operator surface until ctrl-c.
pub async fn serve(desk: Arc<TradeDesk>, port: u16) -> Result<(), DynError> {
    let addr = format!("127.0.0.1:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    eprintln!("[HTTP] listening on http://{}", addr);
    axum::serve(listener, router(desk))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    eprintln!("[HTTP] server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        eprintln!("[HTTP] failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    eprintln!("[HTTP] shutdown requested");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_body_defaults_to_open() {
        let body: ModeBody = serde_json::from_str("{}").unwrap();
        assert_eq!(body.mode.unwrap_or(TradeMode::Open), TradeMode::Open);
        let body: ModeBody = serde_json::from_str("{\"mode\":\"close\"}").unwrap();
        assert_eq!(body.mode, Some(TradeMode::Close));
    }

    #[test]
    fn test_override_body_keyword_field() {
        let body: OverrideBody = serde_json::from_str(
            "{\"symbol\":\"WMTX_USDT\",\"override\":{\"gate\":{\"priceScale\":8}}}",
        )
        .unwrap();
        assert_eq!(body.symbol, "WMTX_USDT");
        assert!(body.patch.get("gate").is_some());
    }
}
