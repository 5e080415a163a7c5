use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ============================================================================
// Symbols
// ============================================================================

/// Split a `BASE_QUOTE` pair into its assets. Returns None when the
/// separator is missing or either side is empty.
pub fn split_symbol(symbol: &str) -> Option<(&str, &str)> {
    let (base, quote) = symbol.split_once('_')?;
    if base.is_empty() || quote.is_empty() {
        return None;
    }
    Some((base, quote))
}

// ============================================================================
// Market metadata
// ============================================================================

/// Gate spot market rules for one currency pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GateMeta {
    pub price_scale: u32,
    pub qty_scale: u32,
    pub min_qty: f64,
    pub min_quote: f64,
}

impl GateMeta {
    /// Documented fallback when pair discovery fails; quotes must stay
    /// available even while metadata discovery is degraded.
    pub const FALLBACK: GateMeta = GateMeta {
        price_scale: 11,
        qty_scale: 0,
        min_qty: 0.0,
        min_quote: 3.0,
    };
}

/// MEXC futures contract rules for one symbol.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MexcMeta {
    pub price_scale: u32,
    pub vol_precision: u32,
    pub contract_size: f64,
    pub min_contracts: f64,
}

impl MexcMeta {
    pub const FALLBACK: MexcMeta = MexcMeta {
        price_scale: 4,
        vol_precision: 0,
        contract_size: 10.0,
        min_contracts: 1.0,
    };

    /// Contract size with the venue quirk of 0 meaning "unset" guarded away.
    pub fn effective_contract_size(&self) -> f64 {
        if self.contract_size > 0.0 {
            self.contract_size
        } else {
            1.0
        }
    }
}

/// Execution policy knobs layered into the merged meta.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecSettings {
    pub margin_pct: f64,
    pub leverage: f64,
}

/// Effective per-symbol market rules: auto-discovered baseline with the
/// operator override deep-merged on top.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketMeta {
    pub symbol: String,
    pub gate: GateMeta,
    pub mexc: MexcMeta,
    pub settings: ExecSettings,
}

/// Payload for `GET /market-meta`: the layers plus the merged result.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaReport {
    pub symbol: String,
    pub auto: MarketMeta,
    #[serde(rename = "override")]
    pub override_patch: Option<Value>,
    pub merged: MarketMeta,
}

// ============================================================================
// Order books and quotes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: f64,
    pub qty: f64,
}

/// Ephemeral top-of-book snapshot; recomputed on demand, never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

impl OrderBook {
    pub fn best_bid(&self) -> Option<BookLevel> {
        self.bids.first().copied()
    }

    pub fn best_ask(&self) -> Option<BookLevel> {
        self.asks.first().copied()
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VenueTopOfBook {
    pub bid: f64,
    pub bid_qty: f64,
    pub ask: f64,
    pub ask_qty: f64,
}

/// `GET /data`: numeric top-of-book for both venues plus the open/close
/// spread percentages. MEXC quantities are reported in base units.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketDataReport {
    pub symbol: String,
    pub gate: VenueTopOfBook,
    pub mexc: VenueTopOfBook,
    pub diff_open: f64,
    pub diff_close: f64,
}

// ============================================================================
// Trade lifecycle
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeMode {
    Open,
    Close,
}

impl TradeMode {
    pub fn gate_side(self) -> SpotSide {
        match self {
            TradeMode::Open => SpotSide::Buy,
            TradeMode::Close => SpotSide::Sell,
        }
    }

    /// MEXC directional code: 3 = open short, 4 = close short.
    pub fn mexc_side_code(self) -> u8 {
        match self {
            TradeMode::Open => 3,
            TradeMode::Close => 4,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpotSide {
    Buy,
    Sell,
}

impl SpotSide {
    pub fn as_str(self) -> &'static str {
        match self {
            SpotSide::Buy => "buy",
            SpotSide::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LegStatus {
    Creating,
    Open,
    Filled,
    Cancelled,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeStatus {
    Creating,
    Open,
    GateFilled,
    MexcFilled,
    GateError,
    MexcError,
    Filled,
    Cancelled,
    Error,
}

impl TradeStatus {
    /// Statuses the reconciliation poller still cares about.
    pub fn is_unsettled(self) -> bool {
        matches!(
            self,
            TradeStatus::Creating
                | TradeStatus::Open
                | TradeStatus::GateFilled
                | TradeStatus::MexcFilled
                | TradeStatus::GateError
                | TradeStatus::MexcError
        )
    }
}

/// Post-submission aggregate over the two leg acknowledgements.
pub fn submission_status(gate_ok: bool, mexc_ok: bool) -> TradeStatus {
    match (gate_ok, mexc_ok) {
        (true, true) => TradeStatus::Open,
        (true, false) => TradeStatus::MexcError,
        (false, true) => TradeStatus::GateError,
        (false, false) => TradeStatus::Error,
    }
}

/// Whether a trade's fill has been folded into the position, as an explicit
/// state rather than a side flag: the fold happens at most once, atomically
/// with the transition.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum Settlement {
    Pending,
    #[serde(rename_all = "camelCase")]
    Folded { at: i64, qty: f64, avg_price: f64 },
}

impl Default for Settlement {
    fn default() -> Self {
        Settlement::Pending
    }
}

impl Settlement {
    pub fn is_folded(&self) -> bool {
        matches!(self, Settlement::Folded { .. })
    }
}

/// One paired-leg order record. Identity fields are immutable once created;
/// only statuses, settlement, and the terminal timestamps mutate afterwards.
/// Append-only history, never deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub local_id: String,
    pub created_at: i64,
    pub symbol: String,
    pub mode: TradeMode,
    pub price_used_gate: f64,
    pub price_used_mexc: f64,
    /// Base-asset units; authoritative quantity at rest.
    pub volume: f64,
    /// Contract count actually sent to MEXC, kept for audit.
    pub contracts: f64,
    pub gate_order_id: Option<String>,
    pub mexc_order_id: Option<String>,
    pub gate_status: LegStatus,
    pub mexc_status: LegStatus,
    pub status: TradeStatus,
    #[serde(default)]
    pub settlement: Settlement,
    /// Set when reconciliation hits an ambiguity (e.g. the gate order id is
    /// unknown to the venue) that the operator has to resolve by hand.
    #[serde(default)]
    pub needs_review: bool,
    #[serde(default)]
    pub executed_at: Option<i64>,
    #[serde(default)]
    pub filled_at: Option<i64>,
    #[serde(default)]
    pub cancelled_at: Option<i64>,
}

impl Trade {
    /// Spread captured by this trade, relative to the gate leg price.
    pub fn arb_pct(&self) -> f64 {
        if self.price_used_gate == 0.0 {
            return 0.0;
        }
        (self.price_used_mexc - self.price_used_gate) / self.price_used_gate * 100.0
    }
}

// ============================================================================
// Venue call payloads
// ============================================================================

/// Normalized spot order detail; the client flattens the venue's
/// inconsistent field names into this before it crosses the boundary.
#[derive(Debug, Clone, Default)]
pub struct SpotOrderDetail {
    pub amount: f64,
    pub filled_amount: f64,
    pub left: f64,
    pub avg_deal_price: f64,
    pub status: String,
}

/// Normalized futures order detail.
#[derive(Debug, Clone, Default)]
pub struct FuturesOrderDetail {
    pub vol: f64,
    pub deal_vol: f64,
    pub remain_vol: f64,
    pub price_avg: f64,
    pub state: String,
}

#[derive(Debug, Clone)]
pub struct FuturesOrderRequest {
    pub symbol: String,
    pub price: f64,
    pub contracts: f64,
    pub leverage: f64,
    /// 3 = open short, 4 = close short.
    pub side_code: u8,
}

// ============================================================================
// Balances
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetBalance {
    pub available: f64,
    pub locked: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum SpotBalances {
    Ok(HashMap<String, AssetBalance>),
    Error { error: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum FuturesBalance {
    #[serde(rename_all = "camelCase")]
    Available { available_usdt: f64 },
    Unknown { unknown: bool, reason: String },
}

impl FuturesBalance {
    pub fn unknown(reason: impl Into<String>) -> Self {
        FuturesBalance::Unknown {
            unknown: true,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BalancesReport {
    pub gate: SpotBalances,
    pub mexc: FuturesBalance,
}

// ============================================================================
// Operator operation results
// ============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrecheckDetails {
    pub mode: TradeMode,
    pub symbol: String,
    pub gate_price: f64,
    pub mexc_price: f64,
    pub contracts: f64,
    pub contract_size: f64,
    pub volume: f64,
    pub leverage: f64,
    pub margin_pct: f64,
    pub required_usdt: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_usdt: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum PrecheckReport {
    #[serde(rename_all = "camelCase")]
    Blocked {
        blocked: bool,
        reason: String,
        min_quote: f64,
        gate_quote: f64,
        mode: TradeMode,
    },
    #[serde(rename_all = "camelCase")]
    Evaluated {
        need_confirm: bool,
        unknown_balance: bool,
        details: PrecheckDetails,
    },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegAck {
    pub id: Option<String>,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    pub local_id: String,
    pub mode: TradeMode,
    pub gate: LegAck,
    pub mexc: LegAck,
    pub status: TradeStatus,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelLegOutcome {
    pub attempted: bool,
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CancelLegOutcome {
    pub fn skipped() -> Self {
        CancelLegOutcome {
            attempted: false,
            ok: false,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelReport {
    pub local_id: String,
    pub status: TradeStatus,
    pub gate: CancelLegOutcome,
    pub mexc: CancelLegOutcome,
    /// Gate base units filled before the cancel landed.
    pub captured_fill: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_symbol() {
        assert_eq!(split_symbol("WMTX_USDT"), Some(("WMTX", "USDT")));
        assert_eq!(split_symbol("BTCUSDT"), None);
        assert_eq!(split_symbol("_USDT"), None);
        assert_eq!(split_symbol("BTC_"), None);
    }

    #[test]
    fn test_status_wire_names() {
        let s = serde_json::to_string(&TradeStatus::GateFilled).unwrap();
        assert_eq!(s, "\"gate_filled\"");
        let s = serde_json::to_string(&TradeStatus::MexcError).unwrap();
        assert_eq!(s, "\"mexc_error\"");
        let parsed: TradeStatus = serde_json::from_str("\"cancelled\"").unwrap();
        assert_eq!(parsed, TradeStatus::Cancelled);
    }

    #[test]
    fn test_unsettled_set() {
        for s in [
            TradeStatus::Creating,
            TradeStatus::Open,
            TradeStatus::GateFilled,
            TradeStatus::MexcFilled,
            TradeStatus::GateError,
            TradeStatus::MexcError,
        ] {
            assert!(s.is_unsettled(), "{:?} should be unsettled", s);
        }
        for s in [TradeStatus::Filled, TradeStatus::Cancelled, TradeStatus::Error] {
            assert!(!s.is_unsettled(), "{:?} should be terminal", s);
        }
    }

    #[test]
    fn test_submission_status_truth_table() {
        assert_eq!(submission_status(true, true), TradeStatus::Open);
        assert_eq!(submission_status(true, false), TradeStatus::MexcError);
        assert_eq!(submission_status(false, true), TradeStatus::GateError);
        assert_eq!(submission_status(false, false), TradeStatus::Error);
    }

    #[test]
    fn test_settlement_roundtrip() {
        let folded = Settlement::Folded {
            at: 1_700_000_000_000,
            qty: 120.0,
            avg_price: 0.0021,
        };
        let json = serde_json::to_string(&folded).unwrap();
        assert!(json.contains("\"state\":\"folded\""));
        assert!(json.contains("avgPrice"));
        let back: Settlement = serde_json::from_str(&json).unwrap();
        assert_eq!(back, folded);
    }

    #[test]
    fn test_trade_arb_pct() {
        let trade = Trade {
            local_id: "1".into(),
            created_at: 0,
            symbol: "WMTX_USDT".into(),
            mode: TradeMode::Open,
            price_used_gate: 2.0,
            price_used_mexc: 2.1,
            volume: 10.0,
            contracts: 1.0,
            gate_order_id: None,
            mexc_order_id: None,
            gate_status: LegStatus::Creating,
            mexc_status: LegStatus::Creating,
            status: TradeStatus::Creating,
            settlement: Settlement::Pending,
            needs_review: false,
            executed_at: None,
            filled_at: None,
            cancelled_at: None,
        };
        assert!((trade.arb_pct() - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_mode_leg_directions() {
        assert_eq!(TradeMode::Open.gate_side(), SpotSide::Buy);
        assert_eq!(TradeMode::Close.gate_side(), SpotSide::Sell);
        assert_eq!(TradeMode::Open.mexc_side_code(), 3);
        assert_eq!(TradeMode::Close.mexc_side_code(), 4);
    }
}
