//! The trade desk: process-wide state owner and operator surface.
//!
//! All shared mutable state lives behind one mutex so request handlers and
//! the reconciliation poller interleave as a single logical writer; venue
//! I/O always happens outside the lock.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::strategy::config::DeskConfig;
use crate::strategy::error::OpError;
use crate::strategy::meta::MetaRepository;
use crate::strategy::position::PositionState;
use crate::strategy::sizing::to_base;
use crate::strategy::store::DeskStore;
use crate::strategy::types::{
    split_symbol, BalancesReport, FuturesBalance, MarketDataReport, MarketMeta, MetaReport,
    SpotBalances, Trade, TradeMode, VenueTopOfBook,
};
use crate::strategy::venue::{FuturesVenue, SpotVenue};
use crate::utils::now_ms;

/// Touch prices recorded at precheck time, backing the execute-time
/// staleness guard.
#[derive(Debug, Clone)]
pub struct PrecheckSnapshot {
    pub symbol: String,
    pub mode: TradeMode,
    pub gate_touch: f64,
    pub mexc_touch: f64,
    pub at_ms: i64,
}

pub struct DeskState {
    pub symbol: String,
    /// Newest first, append-only.
    pub history: Vec<Trade>,
    pub position: PositionState,
    pub last_precheck: Option<PrecheckSnapshot>,
}

pub struct TradeDesk {
    pub(crate) spot: Arc<dyn SpotVenue>,
    pub(crate) futures: Arc<dyn FuturesVenue>,
    pub(crate) store: Arc<dyn DeskStore>,
    pub(crate) meta: MetaRepository,
    pub(crate) cfg: DeskConfig,
    pub(crate) state: Mutex<DeskState>,
}

impl TradeDesk {
    /// Build the desk and load persisted overrides and history. Store
    /// failures degrade to an empty boot with a warning, mirroring the
    /// at-least-once contract of the persistence collaborator.
    pub async fn bootstrap(
        spot: Arc<dyn SpotVenue>,
        futures: Arc<dyn FuturesVenue>,
        store: Arc<dyn DeskStore>,
        cfg: DeskConfig,
    ) -> Self {
        let meta = MetaRepository::new(
            spot.clone(),
            futures.clone(),
            store.clone(),
            crate::strategy::types::ExecSettings {
                margin_pct: cfg.margin_pct,
                leverage: cfg.leverage,
            },
        );

        let overrides = match store.load_overrides().await {
            Ok(map) => map,
            Err(e) => {
                eprintln!("[BOOT] failed to load overrides: {} (starting empty)", e);
                HashMap::new()
            }
        };
        let history = match store.load_history().await {
            Ok(list) => list,
            Err(e) => {
                eprintln!("[BOOT] failed to load history: {} (starting empty)", e);
                Vec::new()
            }
        };
        eprintln!(
            "[BOOT] loaded {} override(s) and {} history item(s)",
            overrides.len(),
            history.len()
        );
        meta.load_persisted(overrides).await;

        Self {
            spot,
            futures,
            store,
            meta,
            state: Mutex::new(DeskState {
                symbol: cfg.default_symbol.clone(),
                history,
                position: PositionState::default(),
                last_precheck: None,
            }),
            cfg,
        }
    }

    pub async fn current_symbol(&self) -> String {
        self.state.lock().await.symbol.clone()
    }

    /// Set the active trading symbol. Rejected before any network call when
    /// the base/quote separator is missing.
    pub async fn set_symbol(&self, symbol: &str) -> Result<(String, MarketMeta), OpError> {
        let symbol = symbol.trim().to_uppercase();
        if split_symbol(&symbol).is_none() {
            return Err(OpError::Validation(
                "invalid symbol, expected BASE_QUOTE".into(),
            ));
        }
        {
            let mut state = self.state.lock().await;
            state.symbol = symbol.clone();
        }
        let meta = self.meta.resolve(&symbol).await;
        Ok((symbol, meta))
    }

    pub async fn market_meta(&self, symbol: Option<&str>) -> MetaReport {
        let symbol = match symbol {
            Some(s) => s.trim().to_uppercase(),
            None => self.current_symbol().await,
        };
        self.meta.report(&symbol).await
    }

    pub async fn set_meta_override(
        &self,
        symbol: &str,
        patch: &Value,
    ) -> Result<(String, MarketMeta), OpError> {
        let symbol = symbol.trim().to_uppercase();
        if split_symbol(&symbol).is_none() {
            return Err(OpError::Validation(
                "invalid symbol, expected BASE_QUOTE".into(),
            ));
        }
        let merged = self.meta.set_override(&symbol, patch).await?;
        Ok((symbol, merged))
    }

    /// Current top-of-book on both venues plus open/close spread
    /// percentages. MEXC sizes are converted from contracts to base units.
    pub async fn market_data(&self) -> Result<MarketDataReport, OpError> {
        let symbol = self.current_symbol().await;
        let meta = self.meta.resolve(&symbol).await;

        let gate_book = self.spot.order_book(&symbol).await?;
        let mexc_book = self.futures.depth(&symbol).await?;

        let gate_bid = gate_book.best_bid();
        let gate_ask = gate_book.best_ask();
        let mexc_bid = mexc_book.best_bid();
        let mexc_ask = mexc_book.best_ask();

        let gate = VenueTopOfBook {
            bid: gate_bid.map(|l| l.price).unwrap_or(0.0),
            bid_qty: gate_bid.map(|l| l.qty).unwrap_or(0.0),
            ask: gate_ask.map(|l| l.price).unwrap_or(0.0),
            ask_qty: gate_ask.map(|l| l.qty).unwrap_or(0.0),
        };
        let mexc = VenueTopOfBook {
            bid: mexc_bid.map(|l| l.price).unwrap_or(0.0),
            bid_qty: mexc_bid.map(|l| to_base(l.qty.trunc(), &meta.mexc)).unwrap_or(0.0),
            ask: mexc_ask.map(|l| l.price).unwrap_or(0.0),
            ask_qty: mexc_ask.map(|l| to_base(l.qty.trunc(), &meta.mexc)).unwrap_or(0.0),
        };

        let diff_open = if gate.ask > 0.0 {
            (mexc.bid - gate.ask) / gate.ask * 100.0
        } else {
            0.0
        };
        let diff_close = if gate.bid > 0.0 {
            (mexc.ask - gate.bid) / gate.bid * 100.0
        } else {
            0.0
        };

        Ok(MarketDataReport {
            symbol,
            gate,
            mexc,
            diff_open,
            diff_close,
        })
    }

    /// Available balance per venue. Shapes vary by outcome: numeric, error
    /// object, or unknown-with-reason; a failed venue never fails the call.
    pub async fn balances(&self) -> BalancesReport {
        let symbol = self.current_symbol().await;
        let gate = match self.spot.balances(&symbol).await {
            Ok(map) => SpotBalances::Ok(map),
            Err(e) => SpotBalances::Error {
                error: e.to_string(),
            },
        };
        let mexc = match self.futures.available_usdt().await {
            Ok(Some(available)) => FuturesBalance::Available {
                available_usdt: available,
            },
            Ok(None) => FuturesBalance::unknown("not_found"),
            Err(e) => FuturesBalance::unknown(e.to_string()),
        };
        BalancesReport { gate, mexc }
    }

    pub async fn set_position_target(&self, target_qty: f64) -> Result<f64, OpError> {
        if !target_qty.is_finite() || target_qty < 0.0 {
            return Err(OpError::Validation("invalid targetQty".into()));
        }
        let mut state = self.state.lock().await;
        state.position.target_qty = target_qty;
        Ok(target_qty)
    }

    pub async fn position_progress(&self) -> PositionState {
        self.state.lock().await.position.clone()
    }

    /// All trades, newest first. Triggers a reconciliation pass first so
    /// the caller observes fresh statuses.
    pub async fn history(&self) -> Vec<Trade> {
        self.poll_open_orders().await;
        self.state.lock().await.history.clone()
    }

    /// Time-derived unique local id; bumps by a millisecond on collision.
    pub(crate) fn next_local_id(history: &[Trade], now: i64) -> String {
        let mut candidate = now;
        while history.iter().any(|t| t.local_id == candidate.to_string()) {
            candidate += 1;
        }
        candidate.to_string()
    }

    pub(crate) fn log_store_failure(context: &str, err: &str) {
        eprintln!("[STORE] save failed ({}): {}", context, err);
    }

    pub(crate) fn now(&self) -> i64 {
        now_ms()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::types::{LegStatus, Settlement, TradeStatus};

    fn trade_with_id(local_id: &str) -> Trade {
        Trade {
            local_id: local_id.to_string(),
            created_at: 0,
            symbol: "WMTX_USDT".into(),
            mode: TradeMode::Open,
            price_used_gate: 1.0,
            price_used_mexc: 1.1,
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
        }
    }

    #[test]
    fn test_next_local_id_bumps_on_collision() {
        let history = vec![trade_with_id("1000"), trade_with_id("1001")];
        assert_eq!(TradeDesk::next_local_id(&history, 1000), "1002");
        assert_eq!(TradeDesk::next_local_id(&history, 999), "999");
    }
}
