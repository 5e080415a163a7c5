//! Quantity/price normalization between the two venues.
//!
//! The asymmetry is deliberate: prices round to nearest, quantities only
//! ever round down, so the desk never commits to more size than the
//! validated depth or balance supports.

use crate::strategy::types::MexcMeta;

/// Round-half-up to `scale` decimal digits. Idempotent.
pub fn round_price(p: f64, scale: u32) -> f64 {
    let factor = 10f64.powi(scale as i32);
    (p * factor).round() / factor
}

/// Floor to `scale` decimal digits. Never exceeds the input.
pub fn round_qty_down(q: f64, scale: u32) -> f64 {
    let factor = 10f64.powi(scale as i32);
    (q * factor).floor() / factor
}

/// Convert base-asset quantity to a contract count: floor at the venue's
/// volume precision. Never exceeds `base_qty / contract_size`; venue
/// minimum-count enforcement is the planner's job, where depth and target
/// clamps can take it back out.
pub fn to_contracts(base_qty: f64, meta: &MexcMeta) -> f64 {
    let raw = base_qty / meta.effective_contract_size();
    round_qty_down(raw, meta.vol_precision)
}

/// Convert a contract count back to base-asset quantity.
pub fn to_base(contracts: f64, meta: &MexcMeta) -> f64 {
    contracts * meta.effective_contract_size()
}

/// Fixed-point wire format for venues that take prices/amounts as strings.
pub fn format_scaled(v: f64, scale: u32) -> String {
    format!("{:.*}", scale as usize, v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(contract_size: f64, vol_precision: u32, min_contracts: f64) -> MexcMeta {
        MexcMeta {
            price_scale: 4,
            vol_precision,
            contract_size,
            min_contracts,
        }
    }

    #[test]
    fn test_round_price_half_up() {
        assert_eq!(round_price(1.25, 1), 1.3);
        assert_eq!(round_price(0.00215, 4), 0.0022);
        assert_eq!(round_price(2.0, 4), 2.0);
    }

    #[test]
    fn test_round_price_idempotent() {
        let once = round_price(0.123456789, 6);
        assert_eq!(round_price(once, 6), once);
    }

    #[test]
    fn test_round_qty_down_never_rounds_up() {
        assert_eq!(round_qty_down(99.999, 0), 99.0);
        assert_eq!(round_qty_down(0.1239, 3), 0.123);
        assert!(round_qty_down(12.34567, 2) <= 12.34567);
    }

    #[test]
    fn test_to_contracts_floors_at_precision() {
        // 105 base units at contract size 10 = 10.5 raw, floored to 10
        assert_eq!(to_contracts(105.0, &meta(10.0, 0, 1.0)), 10.0);
        // fractional precision keeps one decimal
        assert_eq!(to_contracts(105.0, &meta(10.0, 1, 1.0)), 10.5);
        assert_eq!(to_contracts(105.49, &meta(10.0, 1, 1.0)), 10.5);
    }

    #[test]
    fn test_to_contracts_never_exceeds_input() {
        let m = meta(10.0, 0, 5.0);
        // Below one contract resolves to zero, not the venue minimum.
        assert_eq!(to_contracts(4.0, &m), 0.0);
        assert_eq!(to_contracts(0.0, &m), 0.0);
    }

    #[test]
    fn test_to_base_roundtrip() {
        let m = meta(10.0, 0, 1.0);
        assert_eq!(to_base(7.0, &m), 70.0);
        // Zero contract size is guarded to 1
        assert_eq!(to_base(7.0, &meta(0.0, 0, 1.0)), 7.0);
    }

    #[test]
    fn test_format_scaled() {
        assert_eq!(format_scaled(0.00215, 4), "0.0022");
        assert_eq!(format_scaled(123.0, 0), "123");
        assert_eq!(format_scaled(1.5, 3), "1.500");
    }
}
