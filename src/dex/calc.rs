use bigdecimal::BigDecimal;
use ethers::types::U256;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use std::str::FromStr;

/// One whole token in raw units (`10^decimals`).
pub fn one_unit(decimals: u8) -> U256 {
    U256::exp10(decimals as usize)
}

/// Converts a raw token amount to a float in whole-token terms.
///
/// Goes through a decimal string so amounts wider than 128 bits keep
/// their leading digits.
pub fn units_to_f64(amount: U256, decimals: u8) -> Option<f64> {
    let raw = BigInt::from_str(&amount.to_string()).ok()?;
    BigDecimal::new(raw, decimals as i64).to_f64()
}

/// Implied price of one base unit from a router `getAmountsOut` result.
/// The last element is the output amount.
pub fn price_from_amounts(amounts: &[U256], quote_decimals: u8) -> Option<f64> {
    if amounts.len() < 2 {
        return None;
    }
    let out = *amounts.last()?;
    units_to_f64(out, quote_decimals).filter(|p| p.is_finite() && *p > 0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_unit_matches_decimals() {
        assert_eq!(one_unit(6), U256::from(1_000_000u64));
        assert_eq!(one_unit(18), U256::from(1_000_000_000_000_000_000u128));
    }

    #[test]
    fn converts_with_decimals() {
        let v = units_to_f64(U256::from(2_500_000u64), 6).expect("finite");
        assert!((v - 2.5).abs() < 1e-12);
    }

    #[test]
    fn wide_amounts_keep_magnitude() {
        let big = U256::exp10(40);
        let v = units_to_f64(big, 18).expect("finite");
        assert!((v / 1e22 - 1.0).abs() < 1e-9);
    }

    #[test]
    fn price_uses_last_amount() {
        let amounts = vec![U256::exp10(18), U256::from(3_141_590_000u64)];
        let p = price_from_amounts(&amounts, 6).expect("price");
        assert!((p - 3141.59).abs() < 1e-6);
    }

    #[test]
    fn short_or_zero_results_are_rejected() {
        assert_eq!(price_from_amounts(&[U256::from(1u8)], 6), None);
        assert_eq!(price_from_amounts(&[U256::from(1u8), U256::zero()], 6), None);
    }
}
