//! Fixed, statically-typed interfaces for the two venues.
//!
//! Every capability the desk relies on is declared here; connectors
//! implement the full trait or fail a call with a typed error. Nothing
//! discovers venue capability at runtime.

use std::collections::HashMap;

use crate::strategy::error::VenueError;
use crate::strategy::types::{
    AssetBalance, FuturesOrderDetail, FuturesOrderRequest, GateMeta, MexcMeta, OrderBook,
    SpotOrderDetail, SpotSide,
};

/// The spot leg (Gate-style venue): base-asset quantities, string-formatted
/// limit orders.
#[async_trait::async_trait]
pub trait SpotVenue: Send + Sync {
    /// Market rules for one currency pair.
    async fn pair_meta(&self, symbol: &str) -> Result<GateMeta, VenueError>;

    /// Current order book snapshot.
    async fn order_book(&self, symbol: &str) -> Result<OrderBook, VenueError>;

    /// Place a limit order; price and amount are pre-formatted to the
    /// venue's declared scales. Returns the venue order id.
    async fn place_limit_order(
        &self,
        symbol: &str,
        side: SpotSide,
        price: &str,
        amount: &str,
    ) -> Result<String, VenueError>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), VenueError>;

    async fn order_detail(
        &self,
        symbol: &str,
        order_id: &str,
    ) -> Result<SpotOrderDetail, VenueError>;

    /// Available/locked balance per currency relevant to `symbol`.
    async fn balances(&self, symbol: &str) -> Result<HashMap<String, AssetBalance>, VenueError>;
}

/// The leveraged derivatives leg (MEXC-style venue): contract counts,
/// numeric payloads, short-side directional codes.
#[async_trait::async_trait]
pub trait FuturesVenue: Send + Sync {
    /// Contract rules for one symbol.
    async fn contract_meta(&self, symbol: &str) -> Result<MexcMeta, VenueError>;

    /// Current depth snapshot (sizes in contracts).
    async fn depth(&self, symbol: &str) -> Result<OrderBook, VenueError>;

    /// Submit a limit order, isolated margin. Returns the venue order id.
    async fn submit_order(&self, req: &FuturesOrderRequest) -> Result<String, VenueError>;

    async fn cancel_order(&self, symbol: &str, order_id: &str) -> Result<(), VenueError>;

    async fn order_detail(
        &self,
        symbol: &str,
        order_id: &str,
    ) -> Result<FuturesOrderDetail, VenueError>;

    /// Available USDT margin. `Ok(None)` means the venue answered but the
    /// USDT row was absent; errors carry the reason the balance is unknown.
    async fn available_usdt(&self) -> Result<Option<f64>, VenueError>;
}
