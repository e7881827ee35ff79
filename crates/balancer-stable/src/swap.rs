//! Contract-exact arithmetic used by Balancer V2 stable pools.

use alloy::primitives::U256;

pub mod error;
pub mod fixed_point;
pub mod math;
pub mod stable_math;

pub use self::{error::Error, fixed_point::Bfp};

/// Applies `scaling_factor` to `amount`, resulting in a larger or equal value
/// depending on whether it needed scaling or not. Rounds down.
// https://github.com/balancer-labs/balancer-v2-monorepo/blob/c18ff2686c61a8cbad72cdcfc65e9b11476fdbc3/pkg/pool-utils/contracts/BasePool.sol#L671
pub fn upscale(amount: U256, scaling_factor: Bfp) -> Result<Bfp, Error> {
    Bfp::from_wei(amount).mul_down(scaling_factor)
}

pub fn upscale_array(amounts: &[U256], scaling_factors: &[Bfp]) -> Result<Vec<Bfp>, Error> {
    amounts
        .iter()
        .zip(scaling_factors)
        .map(|(amount, scaling_factor)| upscale(*amount, *scaling_factor))
        .collect()
}

/// Reverses the `scaling_factor` applied to `amount`, rounding down.
pub fn downscale_down(amount: Bfp, scaling_factor: Bfp) -> Result<U256, Error> {
    amount.div_down(scaling_factor).map(Bfp::as_uint256)
}

/// Reverses the `scaling_factor` applied to `amount`, rounding up.
pub fn downscale_up(amount: Bfp, scaling_factor: Bfp) -> Result<U256, Error> {
    amount.div_up(scaling_factor).map(Bfp::as_uint256)
}

/// Returns the amount left after charging `swap_fee` on `amount` together with
/// the fee itself.
pub fn subtract_swap_fee_amount(amount: U256, swap_fee: Bfp) -> Result<(U256, U256), Error> {
    // https://github.com/balancer-labs/balancer-v2-monorepo/blob/6c9e24e22d0c46cca6dd15861d3d33da61a60b98/pkg/core/contracts/pools/BasePool.sol#L462-L466
    let amount = Bfp::from_wei(amount);
    let fee_amount = amount.mul_up(swap_fee)?;
    let amount_without_fees = amount.sub(fee_amount)?;
    Ok((amount_without_fees.as_uint256(), fee_amount.as_uint256()))
}

/// Grosses `amount` up so that charging `swap_fee` on the result leaves
/// `amount`.
pub fn add_swap_fee_amount(amount: U256, swap_fee: Bfp) -> Result<U256, Error> {
    // https://github.com/balancer-labs/balancer-v2-monorepo/blob/6c9e24e22d0c46cca6dd15861d3d33da61a60b98/pkg/core/contracts/pools/BasePool.sol#L454-L457
    Bfp::from_wei(amount)
        .div_up(swap_fee.complement())
        .map(Bfp::as_uint256)
}

/// Removes the pool token slot from a per-token array.
pub fn drop_bpt_item<T: Copy>(items: &[T], bpt_index: usize) -> Vec<T> {
    items
        .iter()
        .enumerate()
        .filter(|(index, _)| *index != bpt_index)
        .map(|(_, item)| *item)
        .collect()
}

/// Maps a registered token index onto the array returned by
/// [`drop_bpt_item`]. Must not be called with `bpt_index` itself.
pub fn skip_bpt_index(index: usize, bpt_index: usize) -> usize {
    if index < bpt_index { index } else { index - 1 }
}
