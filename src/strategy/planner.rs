//! Shared price/size derivation for precheck and execution.
//!
//! Both paths run the same plan against fresh books; execution never trusts
//! a precheck snapshot for anything but the staleness guard.

use crate::strategy::error::{OpError, VenueError};
use crate::strategy::position::PositionState;
use crate::strategy::sizing::{round_price, round_qty_down, to_base, to_contracts};
use crate::strategy::types::{MarketMeta, OrderBook, TradeMode};

pub const MIN_QUOTE_NOT_MET: &str = "min_quote_not_met";

/// A fully derived, venue-rounded order pair ready for submission.
#[derive(Debug, Clone)]
pub struct TradePlan {
    pub mode: TradeMode,
    pub gate_price: f64,
    pub mexc_price: f64,
    /// Base units, rounded down to the gate quantity scale.
    pub volume: f64,
    pub contracts: f64,
    /// Raw touch prices the plan was derived from, for staleness checks.
    pub gate_touch: f64,
    pub mexc_touch: f64,
}

#[derive(Debug, Clone)]
pub enum PlanOutcome {
    Ready(TradePlan),
    Blocked {
        reason: &'static str,
        min_quote: f64,
        gate_quote: f64,
    },
}

/// Derive the executable price/quantity pair for `mode`:
///
/// 1. touch selection (open: gate ask / mexc bid; close: the opposite),
/// 2. symmetric margin offset pushing each leg away from its touch so
///    neither resting order is immediately marketable,
/// 3. tradable base = min(gate depth, mexc depth in base units, remaining
///    target when one is set),
/// 4. raise the contract count to the venue minimums (count and gate
///    notional), then clamp back to available depth and remaining target,
/// 5. round price to nearest and quantity down,
/// 6. block when the rounded gate notional is still below the minimum.
pub fn build_plan(
    mode: TradeMode,
    gate_book: &OrderBook,
    mexc_book: &OrderBook,
    meta: &MarketMeta,
    position: &PositionState,
) -> Result<PlanOutcome, OpError> {
    let (gate_level, mexc_level) = match mode {
        TradeMode::Open => (gate_book.best_ask(), mexc_book.best_bid()),
        TradeMode::Close => (gate_book.best_bid(), mexc_book.best_ask()),
    };
    let gate_level = gate_level
        .ok_or_else(|| VenueError::Transient("gate order book is empty".into()))?;
    let mexc_level = mexc_level
        .ok_or_else(|| VenueError::Transient("mexc depth is empty".into()))?;

    let offset = meta.settings.margin_pct / 100.0;
    let (gate_price, mexc_price) = match mode {
        // Buy below the ask, short above the bid.
        TradeMode::Open => (gate_level.price * (1.0 - offset), mexc_level.price * (1.0 + offset)),
        // Sell above the bid, close-short below the ask.
        TradeMode::Close => (gate_level.price * (1.0 + offset), mexc_level.price * (1.0 - offset)),
    };

    // Depth is read as whole units at the touch level.
    let gate_avail = gate_level.qty.trunc().max(0.0);
    let mexc_contracts_avail = mexc_level.qty.trunc().max(0.0);
    let mexc_avail_base = to_base(mexc_contracts_avail, &meta.mexc);

    let mut tradable_base = gate_avail.min(mexc_avail_base);
    if let Some(remaining) = position.remaining_target() {
        tradable_base = tradable_base.min(remaining);
    }
    let mut contracts = to_contracts(tradable_base, &meta.mexc);

    // Venue minimums: the smallest contract count satisfying both the mexc
    // minimum and the gate minimum notional, clamped back to what depth and
    // the remaining target actually allow.
    let contract_size = meta.mexc.effective_contract_size();
    let mut min_acceptable = meta.mexc.min_contracts;
    if meta.gate.min_quote > 0.0 && gate_price > 0.0 {
        min_acceptable = min_acceptable.max((meta.gate.min_quote / (gate_price * contract_size)).ceil());
    }
    if contracts < min_acceptable {
        contracts = min_acceptable;
    }
    contracts = contracts.min(mexc_contracts_avail);
    if let Some(remaining) = position.remaining_target() {
        contracts = contracts.min(to_contracts(remaining, &meta.mexc));
    }

    let gate_px = round_price(gate_price, meta.gate.price_scale);
    let mexc_px = round_price(mexc_price, meta.mexc.price_scale);
    let volume = round_qty_down(to_base(contracts, &meta.mexc), meta.gate.qty_scale);

    if meta.gate.min_quote > 0.0 && volume * gate_px < meta.gate.min_quote {
        return Ok(PlanOutcome::Blocked {
            reason: MIN_QUOTE_NOT_MET,
            min_quote: meta.gate.min_quote,
            gate_quote: round_price(volume * gate_px, 6),
        });
    }

    Ok(PlanOutcome::Ready(TradePlan {
        mode,
        gate_price: gate_px,
        mexc_price: mexc_px,
        volume,
        contracts,
        gate_touch: gate_level.price,
        mexc_touch: mexc_level.price,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::types::{BookLevel, ExecSettings, GateMeta, MexcMeta};

    fn meta() -> MarketMeta {
        MarketMeta {
            symbol: "WMTX_USDT".into(),
            gate: GateMeta {
                price_scale: 6,
                qty_scale: 0,
                min_qty: 0.0,
                min_quote: 0.0,
            },
            mexc: MexcMeta {
                price_scale: 4,
                vol_precision: 0,
                contract_size: 10.0,
                min_contracts: 1.0,
            },
            settings: ExecSettings {
                margin_pct: 10.0,
                leverage: 1.0,
            },
        }
    }

    fn book(bid: (f64, f64), ask: (f64, f64)) -> OrderBook {
        OrderBook {
            bids: vec![BookLevel { price: bid.0, qty: bid.1 }],
            asks: vec![BookLevel { price: ask.0, qty: ask.1 }],
        }
    }

    fn plan_of(outcome: PlanOutcome) -> TradePlan {
        match outcome {
            PlanOutcome::Ready(plan) => plan,
            PlanOutcome::Blocked { reason, .. } => panic!("unexpected block: {}", reason),
        }
    }

    #[test]
    fn test_depth_min_across_venues_and_target() {
        // gate ask depth 100 base, mexc bid depth 50 contracts * 10 = 500,
        // remaining target 300 -> tradable base 100 -> 10 contracts.
        let mut position = PositionState::default();
        position.target_qty = 300.0;
        let outcome = build_plan(
            TradeMode::Open,
            &book((0.9, 1000.0), (1.0, 100.0)),
            &book((1.05, 50.0), (1.1, 1000.0)),
            &meta(),
            &position,
        )
        .unwrap();
        let plan = plan_of(outcome);
        assert_eq!(plan.contracts, 10.0);
        assert_eq!(plan.volume, 100.0);
    }

    #[test]
    fn test_open_prices_push_away_from_touch() {
        let outcome = build_plan(
            TradeMode::Open,
            &book((0.9, 1000.0), (1.0, 100.0)),
            &book((1.05, 50.0), (1.1, 1000.0)),
            &meta(),
            &PositionState::default(),
        )
        .unwrap();
        let plan = plan_of(outcome);
        // Buy 10% below the gate ask, short 10% above the mexc bid.
        assert!((plan.gate_price - 0.9).abs() < 1e-9);
        assert!((plan.mexc_price - 1.155).abs() < 1e-9);
        assert_eq!(plan.gate_touch, 1.0);
        assert_eq!(plan.mexc_touch, 1.05);
    }

    #[test]
    fn test_close_uses_opposite_sides() {
        let outcome = build_plan(
            TradeMode::Close,
            &book((0.9, 1000.0), (1.0, 100.0)),
            &book((1.05, 50.0), (1.1, 1000.0)),
            &meta(),
            &PositionState::default(),
        )
        .unwrap();
        let plan = plan_of(outcome);
        // Sell 10% above the gate bid, close-short 10% below the mexc ask.
        assert!((plan.gate_price - 0.99).abs() < 1e-9);
        assert!((plan.mexc_price - 0.99).abs() < 1e-9);
        assert_eq!(plan.gate_touch, 0.9);
        assert_eq!(plan.mexc_touch, 1.1);
    }

    #[test]
    fn test_min_quote_raises_contract_count() {
        let mut m = meta();
        m.gate.min_quote = 50.0;
        // Depth alone would give 2 contracts (20 base at price ~1), but 50
        // USDT of notional needs ceil(50 / (0.9 * 10)) = 6 contracts.
        let outcome = build_plan(
            TradeMode::Open,
            &book((0.9, 1000.0), (1.0, 20.0)),
            &book((1.05, 40.0), (1.1, 1000.0)),
            &m,
            &PositionState::default(),
        )
        .unwrap();
        let plan = plan_of(outcome);
        assert_eq!(plan.contracts, 6.0);
        assert_eq!(plan.volume, 60.0);
    }

    #[test]
    fn test_min_quote_raise_clamped_by_depth() {
        let mut m = meta();
        m.gate.min_quote = 500.0;
        // The raise wants 56 contracts but mexc depth only has 4; the clamp
        // leaves 4, whose notional fails the minimum -> blocked.
        let outcome = build_plan(
            TradeMode::Open,
            &book((0.9, 1000.0), (1.0, 20.0)),
            &book((1.05, 4.0), (1.1, 1000.0)),
            &m,
            &PositionState::default(),
        )
        .unwrap();
        match outcome {
            PlanOutcome::Blocked { reason, min_quote, gate_quote } => {
                assert_eq!(reason, MIN_QUOTE_NOT_MET);
                assert_eq!(min_quote, 500.0);
                assert!(gate_quote < min_quote);
            }
            PlanOutcome::Ready(plan) => panic!("expected block, got {:?}", plan),
        }
    }

    #[test]
    fn test_min_quote_not_met_example() {
        // minNotional 3, rounded quantity 0.0001, rounded price 1 -> blocked.
        let mut m = meta();
        m.gate.min_quote = 3.0;
        m.gate.qty_scale = 4;
        m.mexc.contract_size = 0.0001;
        m.mexc.vol_precision = 0;
        let outcome = build_plan(
            TradeMode::Open,
            &book((0.9, 1.0), (1.0, 0.9)),
            &book((1.0, 1.0), (1.1, 1.0)),
            &m,
            &PositionState::default(),
        )
        .unwrap();
        match outcome {
            PlanOutcome::Blocked { reason, .. } => assert_eq!(reason, MIN_QUOTE_NOT_MET),
            PlanOutcome::Ready(plan) => panic!("expected block, got {:?}", plan),
        }
    }

    #[test]
    fn test_met_target_yields_no_size() {
        let mut position = PositionState::default();
        position.target_qty = 100.0;
        position.filled_qty = 100.0;
        let outcome = build_plan(
            TradeMode::Open,
            &book((0.9, 1000.0), (1.0, 100.0)),
            &book((1.05, 50.0), (1.1, 1000.0)),
            &meta(),
            &position,
        )
        .unwrap();
        let plan = plan_of(outcome);
        assert_eq!(plan.contracts, 0.0);
        assert_eq!(plan.volume, 0.0);
    }

    #[test]
    fn test_empty_book_is_transient_error() {
        let empty = OrderBook::default();
        let result = build_plan(
            TradeMode::Open,
            &empty,
            &book((1.05, 50.0), (1.1, 1000.0)),
            &meta(),
            &PositionState::default(),
        );
        assert!(result.is_err());
    }
}
