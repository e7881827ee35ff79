//! Token-for-token swaps shared by every stable pool flavour.

use {
    crate::swap::{
        self,
        Bfp,
        Error,
        drop_bpt_item,
        math::BalU256,
        skip_bpt_index,
        stable_math,
    },
    alloy::primitives::U256,
};

/// Computes the invariant of a set of upscaled balances for a given
/// amplification parameter. Legacy and composable pools round it differently.
pub type InvariantFn = fn(U256, &[Bfp]) -> Result<Bfp, Error>;

/// Which side of a swap the caller fixes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SwapKind {
    GivenIn,
    GivenOut,
}

/// Amount computed by a regular swap together with the swap fee charged on
/// the input token, both in the tokens' native units.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct RegularSwapResult {
    pub amount: U256,
    pub fee: U256,
}

/// Parameters of a swap between two pool tokens that are not the pool's own
/// BPT.
#[derive(Clone, Copy, Debug)]
pub struct RegularSwap<'a> {
    pub amplification_parameter: U256,
    pub swap_fee: Bfp,
    pub scaling_factors: &'a [Bfp],
    /// Index of the BPT among the registered tokens, if the pool has one.
    pub bpt_index: Option<usize>,
    pub invariant: InvariantFn,
}

impl RegularSwap<'_> {
    /// Upscales `balances` and removes the BPT, returning the balances the
    /// invariant is computed over and the remapped token indices.
    fn prepare(
        &self,
        balances: &[U256],
        index_in: usize,
        index_out: usize,
    ) -> Result<(Vec<Bfp>, usize, usize), Error> {
        let upscaled = swap::upscale_array(balances, self.scaling_factors)?;
        Ok(match self.bpt_index {
            Some(bpt_index) => (
                drop_bpt_item(&upscaled, bpt_index),
                skip_bpt_index(index_in, bpt_index),
                skip_bpt_index(index_out, bpt_index),
            ),
            None => (upscaled, index_in, index_out),
        })
    }

    /// The swap fee is charged on `amount_in` before it is upscaled.
    // https://github.com/balancer-labs/balancer-v2-monorepo/blob/c18ff2686c61a8cbad72cdcfc65e9b11476fdbc3/pkg/pool-utils/contracts/BaseGeneralPool.sol#L49-L61
    pub fn given_in(
        &self,
        balances: &[U256],
        index_in: usize,
        index_out: usize,
        amount_in: U256,
    ) -> Result<RegularSwapResult, Error> {
        let (amount_in, fee) = swap::subtract_swap_fee_amount(amount_in, self.swap_fee)?;
        let (balances, token_in, token_out) = self.prepare(balances, index_in, index_out)?;
        let amount_in = swap::upscale(amount_in, self.scaling_factors[index_in])?;

        let invariant = (self.invariant)(self.amplification_parameter, &balances)?;
        let amount_out = stable_math::calc_out_given_in(
            self.amplification_parameter,
            &balances,
            token_in,
            token_out,
            amount_in,
            invariant,
        )?;

        Ok(RegularSwapResult {
            amount: swap::downscale_down(amount_out, self.scaling_factors[index_out])?,
            fee,
        })
    }

    /// Returns the amount of `index_in` the invariant requires. The swap fee
    /// the vault charges on top of it is reported separately.
    // https://github.com/balancer-labs/balancer-v2-monorepo/blob/c18ff2686c61a8cbad72cdcfc65e9b11476fdbc3/pkg/pool-utils/contracts/BaseGeneralPool.sol#L63-L75
    pub fn given_out(
        &self,
        balances: &[U256],
        index_in: usize,
        index_out: usize,
        amount_out: U256,
    ) -> Result<RegularSwapResult, Error> {
        let (balances, token_in, token_out) = self.prepare(balances, index_in, index_out)?;
        let amount_out = swap::upscale(amount_out, self.scaling_factors[index_out])?;

        let invariant = (self.invariant)(self.amplification_parameter, &balances)?;
        let amount_in = stable_math::calc_in_given_out(
            self.amplification_parameter,
            &balances,
            token_in,
            token_out,
            amount_out,
            invariant,
        )?;
        let amount_in = swap::downscale_up(amount_in, self.scaling_factors[index_in])?;

        let amount_with_fee = swap::add_swap_fee_amount(amount_in, self.swap_fee)?;
        Ok(RegularSwapResult {
            amount: amount_in,
            fee: amount_with_fee.bsub(amount_in)?,
        })
    }
}
