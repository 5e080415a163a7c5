//! Reconciliation poller: re-derives true order state from venue queries.
//!
//! Each leg's fill state is only ever known by polling; the pass advances
//! leg and aggregate statuses, folds completed fills into the position
//! exactly once, and persists a trade only when something observable
//! changed. A failure on one trade never blocks reconciliation of others.

use std::sync::Arc;

use crate::strategy::engine::TradeDesk;
use crate::strategy::error::VenueError;
use crate::strategy::types::{
    FuturesOrderDetail, LegStatus, Settlement, SpotOrderDetail, Trade, TradeStatus,
};
use crate::utils::ts_hm;

/// Gate leg is filled when nothing is left resting or the venue reports a
/// terminal status.
pub fn spot_leg_filled(detail: &SpotOrderDetail) -> bool {
    let status = detail.status.to_lowercase();
    detail.left <= 0.0
        || matches!(
            status.as_str(),
            "closed" | "finished" | "done" | "filled" | "completed"
        )
}

/// MEXC leg is filled on a terminal state string/code, a cumulative fill
/// reaching the order volume, or zero remaining volume.
pub fn futures_leg_filled(detail: &FuturesOrderDetail) -> bool {
    let state = detail.state.to_lowercase();
    let terminal = state.contains("filled")
        || matches!(
            state.as_str(),
            "done" | "closed" | "success" | "finished" | "3" | "7"
        );
    terminal || (detail.vol > 0.0 && detail.deal_vol >= detail.vol) || detail.remain_vol == 0.0
}

/// Aggregate over the two legs' fill classification for this pass.
pub fn aggregate_status(gate_filled: bool, mexc_filled: bool) -> TradeStatus {
    match (gate_filled, mexc_filled) {
        (true, true) => TradeStatus::Filled,
        (true, false) => TradeStatus::GateFilled,
        (false, true) => TradeStatus::MexcFilled,
        (false, false) => TradeStatus::Open,
    }
}

/// Outcome of one leg's venue lookup within a pass.
struct GateLegResult {
    filled: bool,
    fill_qty: f64,
    avg_price: f64,
    needs_review: bool,
}

impl TradeDesk {
    async fn poll_gate_leg(&self, trade: &Trade) -> GateLegResult {
        let mut result = GateLegResult {
            filled: false,
            fill_qty: 0.0,
            avg_price: trade.price_used_gate,
            needs_review: false,
        };
        let Some(order_id) = &trade.gate_order_id else {
            return result;
        };
        match self.spot.order_detail(&trade.symbol, order_id).await {
            Ok(detail) => {
                result.filled = spot_leg_filled(&detail);
                result.fill_qty = detail.filled_amount.max(0.0);
                if detail.avg_deal_price > 0.0 {
                    result.avg_price = detail.avg_deal_price;
                }
            }
            Err(VenueError::NotFound(_)) => {
                // The order vanished from the book. Guessing "filled" can
                // book a fill that never happened, so the default policy
                // hands the trade to the operator instead.
                if self.cfg.assume_filled_on_not_found {
                    eprintln!(
                        "[RECONCILE] gate order {} not found; assuming executed and removed",
                        order_id
                    );
                    result.filled = true;
                    result.fill_qty = trade.volume;
                    result.avg_price = trade.price_used_gate;
                } else {
                    eprintln!(
                        "[RECONCILE] gate order {} not found; flagging trade {} for manual review",
                        order_id, trade.local_id
                    );
                    result.needs_review = true;
                }
            }
            Err(VenueError::Auth(e)) => {
                eprintln!("[RECONCILE] gate auth error for order {}: {}", order_id, e);
            }
            Err(e) => {
                eprintln!("[RECONCILE] gate lookup failed for order {}: {}", order_id, e);
            }
        }
        result
    }

    async fn poll_mexc_leg(&self, trade: &Trade) -> bool {
        let Some(order_id) = &trade.mexc_order_id else {
            return false;
        };
        match self.futures.order_detail(&trade.symbol, order_id).await {
            Ok(detail) => futures_leg_filled(&detail),
            Err(VenueError::Auth(e)) => {
                eprintln!("[RECONCILE] mexc auth error for order {}: {}", order_id, e);
                false
            }
            Err(e) => {
                eprintln!("[RECONCILE] mexc lookup failed for order {}: {}", order_id, e);
                false
            }
        }
    }

    /// One reconciliation pass over every unsettled trade. Venue lookups
    /// run outside the state lock; mutation and the settlement fold happen
    /// under a single acquisition per trade.
    pub async fn poll_open_orders(&self) {
        let candidates: Vec<Trade> = {
            let state = self.state.lock().await;
            state
                .history
                .iter()
                .filter(|t| t.status.is_unsettled())
                .cloned()
                .collect()
        };

        for trade in candidates {
            let gate = self.poll_gate_leg(&trade).await;
            let mexc_filled = self.poll_mexc_leg(&trade).await;

            let now = self.now();
            let changed = {
                let mut state = self.state.lock().await;
                let Some(idx) = state
                    .history
                    .iter()
                    .position(|t| t.local_id == trade.local_id)
                else {
                    continue;
                };
                if !state.history[idx].status.is_unsettled() {
                    // Raced with a cancel between snapshot and now.
                    continue;
                }

                let arb = state.history[idx].arb_pct();
                let prev = {
                    let t = &state.history[idx];
                    (t.status, t.gate_status, t.mexc_status, t.settlement, t.needs_review)
                };

                let mut fold: Option<(f64, f64)> = None;
                {
                    let t = &mut state.history[idx];
                    if gate.filled {
                        t.gate_status = LegStatus::Filled;
                    } else if t.gate_status == LegStatus::Creating {
                        t.gate_status = LegStatus::Open;
                    }
                    if mexc_filled {
                        t.mexc_status = LegStatus::Filled;
                    } else if t.mexc_status == LegStatus::Creating {
                        t.mexc_status = LegStatus::Open;
                    }
                    if gate.needs_review {
                        t.needs_review = true;
                    }
                    t.status = aggregate_status(gate.filled, mexc_filled);
                    if t.status == TradeStatus::Filled {
                        if t.filled_at.is_none() {
                            t.filled_at = Some(now);
                        }
                        if !t.settlement.is_folded() {
                            let qty = if gate.fill_qty > 0.0 { gate.fill_qty } else { t.volume };
                            let price = if gate.avg_price > 0.0 {
                                gate.avg_price
                            } else {
                                t.price_used_gate
                            };
                            t.settlement = Settlement::Folded {
                                at: now,
                                qty,
                                avg_price: price,
                            };
                            fold = Some((qty, price));
                        }
                    }
                }
                if let Some((qty, price)) = fold {
                    state.position.accumulate(qty, price, arb, now);
                }

                let t = &state.history[idx];
                let next = (t.status, t.gate_status, t.mexc_status, t.settlement, t.needs_review);
                if next != prev {
                    Some(t.clone())
                } else {
                    None
                }
            };

            if let Some(snapshot) = changed {
                if let Err(e) = self.store.save_trade(&snapshot).await {
                    Self::log_store_failure("poll", &e);
                }
            }
        }
    }
}

/// Run reconciliation on a fixed interval for the process lifetime.
pub fn spawn_reconcile_loop(desk: Arc<TradeDesk>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let period = std::time::Duration::from_secs(desk.cfg.poll_interval_secs.max(1));
        let mut tick = tokio::time::interval(period);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        eprintln!(
            "[{}] [RECONCILE] poller started, interval {}s",
            ts_hm(),
            period.as_secs()
        );
        loop {
            tick.tick().await;
            desk.poll_open_orders().await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spot_detail(left: f64, status: &str) -> SpotOrderDetail {
        SpotOrderDetail {
            amount: 100.0,
            filled_amount: 100.0 - left,
            left,
            avg_deal_price: 1.0,
            status: status.to_string(),
        }
    }

    #[test]
    fn test_spot_leg_filled_by_remaining() {
        assert!(spot_leg_filled(&spot_detail(0.0, "open")));
        assert!(!spot_leg_filled(&spot_detail(25.0, "open")));
    }

    #[test]
    fn test_spot_leg_filled_by_terminal_status() {
        assert!(spot_leg_filled(&spot_detail(25.0, "closed")));
        assert!(spot_leg_filled(&spot_detail(25.0, "FINISHED")));
        assert!(!spot_leg_filled(&spot_detail(25.0, "cancelled")));
    }

    #[test]
    fn test_futures_leg_filled_by_state_code() {
        let mut detail = FuturesOrderDetail {
            vol: 10.0,
            deal_vol: 2.0,
            remain_vol: 8.0,
            price_avg: 1.1,
            state: "3".to_string(),
        };
        assert!(futures_leg_filled(&detail));
        detail.state = "2".to_string();
        assert!(!futures_leg_filled(&detail));
        detail.state = "Filled".to_string();
        assert!(futures_leg_filled(&detail));
    }

    #[test]
    fn test_futures_leg_filled_by_quantities() {
        let detail = FuturesOrderDetail {
            vol: 10.0,
            deal_vol: 10.0,
            remain_vol: 0.0,
            price_avg: 1.1,
            state: "2".to_string(),
        };
        assert!(futures_leg_filled(&detail));
        let partial = FuturesOrderDetail {
            vol: 10.0,
            deal_vol: 4.0,
            remain_vol: 6.0,
            price_avg: 1.1,
            state: "2".to_string(),
        };
        assert!(!futures_leg_filled(&partial));
    }

    #[test]
    fn test_aggregate_status_invariant() {
        // status == filled iff both legs are filled
        assert_eq!(aggregate_status(true, true), TradeStatus::Filled);
        assert_eq!(aggregate_status(true, false), TradeStatus::GateFilled);
        assert_eq!(aggregate_status(false, true), TradeStatus::MexcFilled);
        assert_eq!(aggregate_status(false, false), TradeStatus::Open);
    }
}
