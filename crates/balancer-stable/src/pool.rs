//! Quoting entry point for a single pool snapshot. Resolves tokens to
//! indices, refuses quotes the contracts would revert on and dispatches to
//! the regular or BPT swap path.

use {
    crate::{
        pools::{
            common::{RegularSwapResult, SwapKind},
            composable_stable::{self, LastJoinExit},
            stable,
        },
        swap::{self, math::BalU256},
    },
    alloy::primitives::{Address, B256, U256},
    num::BigUint,
    serde::Serialize,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq, thiserror::Error)]
pub enum QuoteError {
    #[error("token {0} is not traded by the pool")]
    UnknownToken(Address),
    #[error("reserve does not fit into 256 bits")]
    Overflow,
    #[error("pool is paused")]
    PoolPaused,
    #[error("token rates could not be updated before join or exit")]
    BeforeSwapJoinExit,
    #[error("token {0} can not be swapped for itself")]
    SameToken(Address),
    #[error(transparent)]
    Math(#[from] swap::Error),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PoolKind {
    Stable(stable::PoolState),
    ComposableStable(composable_stable::PoolState),
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct TokenAmount {
    pub token: Address,
    pub amount: U256,
}

/// Result of a quote. `amount` is denominated in the output token for
/// [`Pool::quote_given_in`] and in the input token for
/// [`Pool::quote_given_out`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Quote {
    pub amount: TokenAmount,
    /// Swap fee charged on the input token. BPT swaps charge their fee inside
    /// the join or exit math and report none.
    pub fee: Option<TokenAmount>,
    pub gas: u64,
    /// Join exit state to persist once a BPT swap is executed.
    pub swap_info: Option<LastJoinExit>,
}

/// A swap the caller decided to execute against the pool.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct AcceptedSwap {
    pub token_in: TokenAmount,
    pub token_out: TokenAmount,
    pub swap_info: Option<LastJoinExit>,
}

/// Information routers need to encode a swap through the vault.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetaInfo {
    pub dex_id: String,
    pub vault: Address,
    pub pool_id: B256,
    pub token_out_index: Option<usize>,
    pub block_number: u64,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Pool {
    pub address: Address,
    pub tokens: Vec<Address>,
    pub(crate) reserves: Vec<U256>,
    pub block_number: u64,
    pub vault: Address,
    pub pool_id: B256,
    pub paused: bool,
    /// Set when a rate provider call failed, in which case joins and exits
    /// would revert on chain.
    pub can_not_update_token_rates: bool,
    pub dex_id: String,
    pub swap_gas: u64,
    pub kind: PoolKind,
}

/// Converts arbitrary precision reserves into 256 bit balances.
pub fn decode_reserves(reserves: &[BigUint]) -> Result<Vec<U256>, QuoteError> {
    reserves
        .iter()
        .map(|reserve| {
            U256::try_from_be_slice(&reserve.to_bytes_be()).ok_or(QuoteError::Overflow)
        })
        .collect()
}

impl Pool {
    pub fn reserves(&self) -> &[U256] {
        &self.reserves
    }

    /// Replaces the reserves with freshly fetched ones. The pool is left
    /// untouched if any of them doesn't fit into 256 bits.
    pub fn set_reserves(&mut self, reserves: &[BigUint]) -> anyhow::Result<()> {
        anyhow::ensure!(
            reserves.len() == self.tokens.len(),
            "expected {} reserves but got {}",
            self.tokens.len(),
            reserves.len()
        );
        self.reserves = decode_reserves(reserves)?;
        Ok(())
    }

    pub fn token_index(&self, token: Address) -> Option<usize> {
        self.tokens.iter().position(|candidate| *candidate == token)
    }

    /// Computes how much of `token_out` the pool returns for `amount_in` of
    /// `token_in`.
    pub fn quote_given_in(
        &self,
        token_in: Address,
        token_out: Address,
        amount_in: U256,
    ) -> Result<Quote, QuoteError> {
        self.quote(SwapKind::GivenIn, token_in, token_out, amount_in)
            .inspect_err(|err| {
                tracing::debug!(?err, ?token_in, ?token_out, ?amount_in, "refused quote")
            })
    }

    /// Computes how much of `token_in` has to be sent to receive `amount_out`
    /// of `token_out`. The swap fee due on top of it is reported in
    /// [`Quote::fee`].
    pub fn quote_given_out(
        &self,
        token_in: Address,
        token_out: Address,
        amount_out: U256,
    ) -> Result<Quote, QuoteError> {
        self.quote(SwapKind::GivenOut, token_in, token_out, amount_out)
            .inspect_err(|err| {
                tracing::debug!(?err, ?token_in, ?token_out, ?amount_out, "refused quote")
            })
    }

    fn quote(
        &self,
        kind: SwapKind,
        token_in: Address,
        token_out: Address,
        amount: U256,
    ) -> Result<Quote, QuoteError> {
        if self.paused {
            return Err(QuoteError::PoolPaused);
        }
        if self.can_not_update_token_rates {
            return Err(QuoteError::BeforeSwapJoinExit);
        }
        let index_in = self
            .token_index(token_in)
            .ok_or(QuoteError::UnknownToken(token_in))?;
        let index_out = self
            .token_index(token_out)
            .ok_or(QuoteError::UnknownToken(token_out))?;
        if index_in == index_out {
            return Err(QuoteError::SameToken(token_in));
        }

        let regular = |result: RegularSwapResult| {
            (
                result.amount,
                Some(TokenAmount {
                    token: token_in,
                    amount: result.fee,
                }),
                None::<LastJoinExit>,
            )
        };
        let (calculated, fee, swap_info) = match (&self.kind, kind) {
            (PoolKind::ComposableStable(state), _) if self.is_bpt_swap(token_in, token_out) => {
                let result =
                    state.swap_with_bpt(kind, &self.reserves, index_in, index_out, amount)?;
                (result.amount, None, Some(result.last_join_exit))
            }
            (PoolKind::ComposableStable(state), SwapKind::GivenIn) => {
                regular(state.swap_given_in(&self.reserves, index_in, index_out, amount)?)
            }
            (PoolKind::ComposableStable(state), SwapKind::GivenOut) => {
                regular(state.swap_given_out(&self.reserves, index_in, index_out, amount)?)
            }
            (PoolKind::Stable(state), SwapKind::GivenIn) => {
                regular(state.swap_given_in(&self.reserves, index_in, index_out, amount)?)
            }
            (PoolKind::Stable(state), SwapKind::GivenOut) => {
                regular(state.swap_given_out(&self.reserves, index_in, index_out, amount)?)
            }
        };

        Ok(Quote {
            amount: TokenAmount {
                token: match kind {
                    SwapKind::GivenIn => token_out,
                    SwapKind::GivenOut => token_in,
                },
                amount: calculated,
            },
            fee,
            gas: self.swap_gas,
            swap_info,
        })
    }

    /// Updates the pool to the state after `swap` executed. Nothing changes
    /// if the swap can't be applied.
    pub fn apply_accepted(&mut self, swap: &AcceptedSwap) -> Result<(), QuoteError> {
        let index_in = self
            .token_index(swap.token_in.token)
            .ok_or(QuoteError::UnknownToken(swap.token_in.token))?;
        let index_out = self
            .token_index(swap.token_out.token)
            .ok_or(QuoteError::UnknownToken(swap.token_out.token))?;

        let mut reserves = self.reserves.clone();
        reserves[index_in] = reserves[index_in].badd(swap.token_in.amount)?;
        reserves[index_out] = reserves[index_out].bsub(swap.token_out.amount)?;
        self.reserves = reserves;

        let is_bpt_swap = self.is_bpt_swap(swap.token_in.token, swap.token_out.token);
        match &mut self.kind {
            PoolKind::ComposableStable(state) if is_bpt_swap => {
                if swap.swap_info.is_none() {
                    tracing::debug!(pool = ?self.address, "bpt swap applied without join exit state");
                }
                state.apply_bpt_swap(swap.swap_info);
            }
            _ => (),
        }
        tracing::debug!(pool = ?self.address, ?swap, "applied swap");
        Ok(())
    }

    pub fn meta_info(&self, token_out: Address) -> MetaInfo {
        MetaInfo {
            dex_id: self.dex_id.clone(),
            vault: self.vault,
            pool_id: self.pool_id,
            token_out_index: self.token_index(token_out),
            block_number: self.block_number,
        }
    }

    fn is_bpt_swap(&self, token_in: Address, token_out: Address) -> bool {
        matches!(self.kind, PoolKind::ComposableStable(_))
            && (token_in == self.address || token_out == self.address)
    }
}
