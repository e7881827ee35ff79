//! Legacy stable and meta stable pools. Neither holds its own BPT among the
//! swappable tokens, so every swap is a regular one.

use {
    super::common::{RegularSwap, RegularSwapResult},
    crate::swap::{Bfp, Error, stable_math},
    alloy::primitives::U256,
};

/// Meta stable pools fold their token rates into the scaling factors, so both
/// legacy pool types share this state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PoolState {
    pub amplification_parameter: U256,
    pub swap_fee: Bfp,
    pub scaling_factors: Vec<Bfp>,
}

/// Legacy pools compute the invariant rounding up for swaps.
fn invariant(amplification_parameter: U256, balances: &[Bfp]) -> Result<Bfp, Error> {
    stable_math::calculate_invariant_v1(amplification_parameter, balances, true)
}

impl PoolState {
    fn regular(&self) -> RegularSwap<'_> {
        RegularSwap {
            amplification_parameter: self.amplification_parameter,
            swap_fee: self.swap_fee,
            scaling_factors: &self.scaling_factors,
            bpt_index: None,
            invariant,
        }
    }

    pub fn swap_given_in(
        &self,
        balances: &[U256],
        index_in: usize,
        index_out: usize,
        amount_in: U256,
    ) -> Result<RegularSwapResult, Error> {
        self.regular()
            .given_in(balances, index_in, index_out, amount_in)
    }

    pub fn swap_given_out(
        &self,
        balances: &[U256],
        index_in: usize,
        index_out: usize,
        amount_out: U256,
    ) -> Result<RegularSwapResult, Error> {
        self.regular()
            .given_out(balances, index_in, index_out, amount_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn u256(s: &str) -> U256 {
        s.parse().unwrap()
    }

    fn pool(amp: u64, swap_fee: u64, scaling_factors: &[&str]) -> PoolState {
        PoolState {
            amplification_parameter: U256::from(amp),
            swap_fee: Bfp::from_wei(U256::from(swap_fee)),
            scaling_factors: scaling_factors
                .iter()
                .map(|factor| Bfp::from_wei(u256(factor)))
                .collect(),
        }
    }

    #[test]
    fn swap_given_in() {
        let state = pool(1_390_000, 50_000_000_000_000, &["100", "1", "100"]);
        let balances = [
            u256("9999991000000000000000"),
            u256("9999991000000000005613"),
            u256("13288977911102200123456"),
        ];
        let result = state
            .swap_given_in(&balances, 2, 1, u256("12000000000000000000"))
            .unwrap();
        assert_eq!(result.amount, u256("1000000000000000000"));
        assert_eq!(result.fee, u256("600000000000000"));

        let state = pool(1_390_000, 53_332_221_119_995, &["100", "1000", "100"]);
        let balances = [
            u256("9999991000000000013314124321"),
            u256("9999991000000123120010005613"),
            u256("1328897131447911102200123456"),
        ];
        let result = state
            .swap_given_in(&balances, 0, 2, u256("12111222333444555666"))
            .unwrap();
        assert_eq!(result.amount, u256("590000000000000000"));
    }

    #[test]
    fn meta_stable_swap_given_in() {
        let state = pool(
            1_000_000,
            400_000_000_000_000,
            &["1151532794526553114", "1000000000000000000"],
        );
        let balances = [u256("1152882153159026494"), u256("873225053252443292")];
        let result = state
            .swap_given_in(&balances, 1, 0, u256("73183418984294781"))
            .unwrap();
        assert_eq!(result.amount, u256("63551050657042642"));
    }

    #[test]
    fn meta_stable_swap_given_out() {
        let state = pool(
            1_000_000,
            400_000_000_000_000,
            &["1151532794526553114", "1000000000000000000"],
        );
        let balances = [u256("1152882153159026494"), u256("873225053252443292")];
        let result = state
            .swap_given_out(&balances, 1, 0, u256("63551050657042642"))
            .unwrap();
        assert_eq!(result.amount, u256("73154145616700748"));
        assert_eq!(result.fee, u256("29273367593718"));
    }

    #[test]
    fn degenerate_balances_do_not_converge() {
        let state = pool(5000, 50_000_000_000_000, &["100", "1", "100"]);
        let balances = [
            u256("9999991000000000000"),
            u256("99999910000000000056"),
            u256("8897791020011100123456"),
        ];
        assert_eq!(
            state
                .swap_given_in(&balances, 0, 2, u256("99999910000000"))
                .unwrap_err(),
            Error::StableGetBalanceDidntConverge
        );
        assert_eq!(
            state
                .swap_given_out(&balances, 1, 0, u256("999999100000"))
                .unwrap_err(),
            Error::StableGetBalanceDidntConverge
        );
    }
}
