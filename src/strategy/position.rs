//! Running position estimate: weighted-average fill price and arbitrage
//! margin, plus an append-only snapshot series.

use serde::{Deserialize, Serialize};

use crate::strategy::sizing::round_price;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionPoint {
    pub t: i64,
    pub filled_qty: f64,
    pub avg_price: f64,
    pub arb_pct_avg: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionState {
    pub target_qty: f64,
    pub filled_qty: f64,
    pub avg_price: f64,
    pub arb_pct_avg: f64,
    pub series: Vec<PositionPoint>,
}

impl PositionState {
    /// Base units still to fill, when a target is set.
    pub fn remaining_target(&self) -> Option<f64> {
        if self.target_qty > 0.0 {
            Some((self.target_qty - self.filled_qty).max(0.0))
        } else {
            None
        }
    }

    /// Fold one fill into the running averages and append a snapshot.
    /// Callers guarantee at-most-once per trade via the trade's settlement
    /// state; a non-positive quantity is a no-op.
    pub fn accumulate(&mut self, fill_qty: f64, fill_price: f64, arb_pct: f64, now_ms: i64) {
        if !(fill_qty > 0.0) {
            return;
        }
        let prev_qty = self.filled_qty;
        let new_qty = prev_qty + fill_qty;
        let new_avg = if new_qty > 0.0 {
            (self.avg_price * prev_qty + fill_price * fill_qty) / new_qty
        } else {
            0.0
        };
        let new_arb = if new_qty > 0.0 {
            (self.arb_pct_avg * prev_qty + arb_pct * fill_qty) / new_qty
        } else {
            0.0
        };
        self.filled_qty = new_qty;
        self.avg_price = new_avg;
        self.arb_pct_avg = new_arb;
        self.series.push(PositionPoint {
            t: now_ms,
            filled_qty: new_qty,
            avg_price: round_price(new_avg, 11),
            arb_pct_avg: round_price(new_arb, 6),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weighted_average_two_fills() {
        let mut pos = PositionState::default();
        pos.accumulate(10.0, 1.0, 2.0, 1);
        pos.accumulate(10.0, 2.0, 4.0, 2);
        assert_eq!(pos.filled_qty, 20.0);
        assert!((pos.avg_price - 1.5).abs() < 1e-12);
        assert!((pos.arb_pct_avg - 3.0).abs() < 1e-12);
        assert_eq!(pos.series.len(), 2);
    }

    #[test]
    fn test_zero_or_negative_fill_is_noop() {
        let mut pos = PositionState::default();
        pos.accumulate(5.0, 2.0, 1.0, 1);
        let before = pos.clone();
        pos.accumulate(0.0, 99.0, 99.0, 2);
        pos.accumulate(-3.0, 99.0, 99.0, 3);
        assert_eq!(pos, before);
    }

    #[test]
    fn test_nan_fill_is_noop() {
        let mut pos = PositionState::default();
        pos.accumulate(f64::NAN, 1.0, 1.0, 1);
        assert_eq!(pos.filled_qty, 0.0);
        assert!(pos.series.is_empty());
    }

    #[test]
    fn test_remaining_target() {
        let mut pos = PositionState::default();
        assert_eq!(pos.remaining_target(), None);
        pos.target_qty = 300.0;
        pos.accumulate(120.0, 1.0, 0.0, 1);
        assert_eq!(pos.remaining_target(), Some(180.0));
        pos.accumulate(500.0, 1.0, 0.0, 2);
        assert_eq!(pos.remaining_target(), Some(0.0));
    }

    #[test]
    fn test_series_snapshot_rounding() {
        let mut pos = PositionState::default();
        pos.accumulate(3.0, 0.123456789012345, 1.23456789, 42);
        let point = pos.series[0];
        assert_eq!(point.t, 42);
        assert_eq!(point.avg_price, 0.12345678901);
        assert_eq!(point.arb_pct_avg, 1.234568);
        // The running state keeps full precision; only snapshots round.
        assert!((pos.avg_price - 0.123456789012345).abs() < 1e-15);
    }
}
