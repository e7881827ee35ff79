//! Composable stable pools register their own BPT as one of the pool tokens.
//! Swaps between two regular tokens use plain stable math over the other
//! balances. Swaps involving the BPT are single token joins and exits, which
//! first settle the protocol fees accrued since the last join or exit.
// https://github.com/balancer-labs/balancer-v2-monorepo/blob/c18ff2686c61a8cbad72cdcfc65e9b11476fdbc3/pkg/pool-stable/contracts/ComposableStablePool.sol

use {
    super::common::{RegularSwap, RegularSwapResult, SwapKind},
    crate::{
        serialization::HexOrDecimalU256,
        swap::{self, Bfp, Error, drop_bpt_item, math::BalU256, skip_bpt_index, stable_math},
    },
    alloy::primitives::{Address, U256},
    serde::{Deserialize, Serialize},
    serde_with::serde_as,
};

/// Amplification and invariant recorded by the most recent join or exit.
/// Protocol fees are owed on any invariant growth past this point.
#[serde_as]
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct LastJoinExit {
    #[serde(rename = "lastJoinExitAmplification")]
    #[serde_as(as = "HexOrDecimalU256")]
    pub amplification: U256,
    #[serde(rename = "lastPostJoinExitInvariant")]
    #[serde_as(as = "HexOrDecimalU256")]
    pub post_join_exit_invariant: U256,
}

impl LastJoinExit {
    fn invariant(&self) -> Bfp {
        Bfp::from_wei(self.post_join_exit_invariant)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct TokenRateCache {
    pub rate: U256,
    pub old_rate: U256,
    pub duration: U256,
    pub expires: U256,
}

impl TokenRateCache {
    /// Scales `balance` back to the rate of the previous rate cache update,
    /// removing the yield accrued since.
    fn adjusted_balance(&self, balance: Bfp) -> Result<Bfp, Error> {
        balance
            .as_uint256()
            .bmul(self.old_rate)?
            .bdiv_down(self.rate)
            .map(Bfp::from_wei)
    }
}

/// Cached protocol fee percentages, keyed by fee type in the contracts
/// (`0` for swap fees and `2` for yield fees).
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ProtocolFeePercentages {
    pub swap: Bfp,
    pub yield_: Bfp,
}

/// How yield is exempted from protocol fees. The two layouts come with
/// different growth invariant formulas.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FeeSchema {
    /// Pool versions before 5 flag individual tokens, indexed like the
    /// registered tokens (BPT included).
    V1 { exempt_tokens: Vec<bool> },
    /// Version 5 pools exempt either all or none of the yield.
    V5 { exempt: bool },
}

impl FeeSchema {
    pub fn new(pool_type_version: u64, exempt_tokens: Vec<bool>, exempt: bool) -> Self {
        if pool_type_version == 5 {
            Self::V5 { exempt }
        } else {
            Self::V1 { exempt_tokens }
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PoolState {
    pub bpt_index: usize,
    pub amplification_parameter: U256,
    pub swap_fee: Bfp,
    pub scaling_factors: Vec<Bfp>,
    pub bpt_total_supply: Bfp,
    pub last_join_exit: LastJoinExit,
    pub rate_providers: Vec<Option<Address>>,
    pub token_rate_caches: Vec<TokenRateCache>,
    pub protocol_fee_percentages: ProtocolFeePercentages,
    pub fee_schema: FeeSchema,
    pub pool_type_version: u64,
    pub in_recovery_mode: bool,
}

/// Amount computed by a BPT swap in the tokens' native units and the join
/// exit state the pool will be in once the swap is executed.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct BptSwapResult {
    pub amount: U256,
    pub last_join_exit: LastJoinExit,
}

/// State a join or exit starts from once protocol fees are settled.
#[derive(Debug)]
struct PreJoinExit {
    supply: Bfp,
    balances: Vec<Bfp>,
    invariant: Bfp,
}

#[derive(Debug)]
struct GrowthInvariants {
    swap_fee: Bfp,
    total_non_exempt: Bfp,
    total: Bfp,
}

impl PoolState {
    fn regular(&self) -> RegularSwap<'_> {
        RegularSwap {
            amplification_parameter: self.amplification_parameter,
            swap_fee: self.swap_fee,
            scaling_factors: &self.scaling_factors,
            bpt_index: Some(self.bpt_index),
            invariant: stable_math::calculate_invariant,
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

    /// Swap where either `index_in` or `index_out` is the BPT, executed as a
    /// single token join or exit. `amount` is in the units of `index_in` for
    /// [`SwapKind::GivenIn`] and of `index_out` otherwise.
    // https://github.com/balancer-labs/balancer-v2-monorepo/blob/c18ff2686c61a8cbad72cdcfc65e9b11476fdbc3/pkg/pool-stable/contracts/ComposableStablePool.sol#L301-L347
    pub fn swap_with_bpt(
        &self,
        kind: SwapKind,
        balances: &[U256],
        index_in: usize,
        index_out: usize,
        amount: U256,
    ) -> Result<BptSwapResult, Error> {
        let registered_balances = swap::upscale_array(balances, &self.scaling_factors)?;
        let request_index = match kind {
            SwapKind::GivenIn => index_in,
            SwapKind::GivenOut => index_out,
        };
        let amount = swap::upscale(amount, self.scaling_factors[request_index])?;

        let PreJoinExit {
            supply,
            mut balances,
            invariant,
        } = self.before_join_exit(&registered_balances)?;

        let (amount_calculated, post_join_exit_supply) = if index_out == self.bpt_index {
            self.join_swap(
                kind,
                amount,
                &mut balances,
                skip_bpt_index(index_in, self.bpt_index),
                supply,
                invariant,
            )?
        } else {
            self.exit_swap(
                kind,
                amount,
                &mut balances,
                skip_bpt_index(index_out, self.bpt_index),
                supply,
                invariant,
            )?
        };

        let amount = match kind {
            SwapKind::GivenIn => {
                swap::downscale_down(amount_calculated, self.scaling_factors[index_out])?
            }
            SwapKind::GivenOut => {
                swap::downscale_up(amount_calculated, self.scaling_factors[index_in])?
            }
        };

        let post_join_exit_invariant =
            stable_math::calculate_invariant(self.amplification_parameter, &balances)?;
        tracing::trace!(
            ?amount,
            ?post_join_exit_supply,
            ?post_join_exit_invariant,
            "bpt swap"
        );

        Ok(BptSwapResult {
            amount,
            last_join_exit: LastJoinExit {
                amplification: self.amplification_parameter,
                post_join_exit_invariant: post_join_exit_invariant.as_uint256(),
            },
        })
    }

    /// Returns the amount calculated for the join and the BPT supply after it.
    /// `balances` are updated to the post join balances.
    fn join_swap(
        &self,
        kind: SwapKind,
        amount: Bfp,
        balances: &mut [Bfp],
        index_in: usize,
        supply: Bfp,
        invariant: Bfp,
    ) -> Result<(Bfp, Bfp), Error> {
        let (amount_in, bpt_out) = match kind {
            SwapKind::GivenIn => {
                let mut amounts_in = vec![Bfp::zero(); balances.len()];
                amounts_in[index_in] = amount;
                let bpt_out = stable_math::calc_bpt_out_given_exact_tokens_in(
                    self.amplification_parameter,
                    balances,
                    &amounts_in,
                    supply,
                    invariant,
                    self.swap_fee,
                )?;
                (amount, bpt_out)
            }
            SwapKind::GivenOut => {
                let amount_in = stable_math::calc_token_in_given_exact_bpt_out(
                    self.amplification_parameter,
                    balances,
                    index_in,
                    amount,
                    supply,
                    invariant,
                    self.swap_fee,
                )?;
                (amount_in, amount)
            }
        };

        balances[index_in] = balances[index_in].add(amount_in)?;
        let post_join_supply = supply.add(bpt_out)?;
        Ok(match kind {
            SwapKind::GivenIn => (bpt_out, post_join_supply),
            SwapKind::GivenOut => (amount_in, post_join_supply),
        })
    }

    /// Returns the amount calculated for the exit and the BPT supply after it.
    /// `balances` are updated to the post exit balances.
    fn exit_swap(
        &self,
        kind: SwapKind,
        amount: Bfp,
        balances: &mut [Bfp],
        index_out: usize,
        supply: Bfp,
        invariant: Bfp,
    ) -> Result<(Bfp, Bfp), Error> {
        let (bpt_in, amount_out) = match kind {
            SwapKind::GivenIn => {
                let amount_out = stable_math::calc_token_out_given_exact_bpt_in(
                    self.amplification_parameter,
                    balances,
                    index_out,
                    amount,
                    supply,
                    invariant,
                    self.swap_fee,
                )?;
                (amount, amount_out)
            }
            SwapKind::GivenOut => {
                let mut amounts_out = vec![Bfp::zero(); balances.len()];
                amounts_out[index_out] = amount;
                let bpt_in = stable_math::calc_bpt_in_given_exact_tokens_out(
                    self.amplification_parameter,
                    balances,
                    &amounts_out,
                    supply,
                    invariant,
                    self.swap_fee,
                )?;
                (bpt_in, amount)
            }
        };

        balances[index_out] = balances[index_out].sub(amount_out)?;
        let post_exit_supply = supply.sub(bpt_in)?;
        Ok(match kind {
            SwapKind::GivenIn => (amount_out, post_exit_supply),
            SwapKind::GivenOut => (bpt_in, post_exit_supply),
        })
    }

    // https://github.com/balancer-labs/balancer-v2-monorepo/blob/c18ff2686c61a8cbad72cdcfc65e9b11476fdbc3/pkg/pool-stable/contracts/ComposableStablePool.sol#L716-L742
    fn before_join_exit(&self, registered_balances: &[Bfp]) -> Result<PreJoinExit, Error> {
        let virtual_supply = self
            .bpt_total_supply
            .sub(registered_balances[self.bpt_index])?;
        let balances = drop_bpt_item(registered_balances, self.bpt_index);

        let (ownership_percentage, total_growth_invariant) =
            self.protocol_pool_ownership_percentage(&balances)?;
        let protocol_fee_amount = self.protocol_fee_amount(virtual_supply, ownership_percentage)?;
        if !protocol_fee_amount.is_zero() {
            tracing::debug!(
                ?ownership_percentage,
                ?protocol_fee_amount,
                "settling protocol fees before join or exit"
            );
        }
        let supply = virtual_supply.add(protocol_fee_amount)?;

        // The growth invariant is computed with the last join exit
        // amplification and can only be reused while it is unchanged.
        let invariant = if self.amplification_parameter == self.last_join_exit.amplification {
            total_growth_invariant
        } else {
            stable_math::calculate_invariant(self.amplification_parameter, &balances)?
        };
        tracing::trace!(?virtual_supply, ?supply, ?invariant, "pre join exit state");

        Ok(PreJoinExit {
            supply,
            balances,
            invariant,
        })
    }

    /// Share of the pool owed to the protocol, together with the total growth
    /// invariant it was derived from.
    fn protocol_pool_ownership_percentage(&self, balances: &[Bfp]) -> Result<(Bfp, Bfp), Error> {
        let last_invariant = self.last_join_exit.invariant();
        let (swap_fee_delta, non_exempt_yield_delta, total) = match &self.fee_schema {
            FeeSchema::V1 { exempt_tokens } => {
                let growth = self.growth_invariants_v1(balances, exempt_tokens)?;
                let swap_fee_delta = if growth.swap_fee > last_invariant {
                    growth.swap_fee.sub(last_invariant)?
                } else {
                    Bfp::zero()
                };
                let non_exempt_yield_delta = if growth.total_non_exempt > growth.swap_fee {
                    growth.total_non_exempt.sub(growth.swap_fee)?
                } else {
                    Bfp::zero()
                };
                (swap_fee_delta, non_exempt_yield_delta, growth.total)
            }
            FeeSchema::V5 { exempt } => {
                let growth = self.growth_invariants_v2(balances, *exempt)?;
                if growth.total <= last_invariant {
                    return Ok((Bfp::zero(), growth.total));
                }
                (
                    growth.swap_fee.sub(last_invariant)?,
                    growth.total_non_exempt.sub(growth.swap_fee)?,
                    growth.total,
                )
            }
        };
        tracing::trace!(?swap_fee_delta, ?non_exempt_yield_delta, ?total, "invariant growth");

        let fees = self.protocol_fee_percentages();
        let swap_percentage = swap_fee_delta.div_down(total)?.mul_down(fees.swap)?;
        let yield_percentage = non_exempt_yield_delta.div_down(total)?.mul_down(fees.yield_)?;
        Ok((swap_percentage.add(yield_percentage)?, total))
    }

    // https://github.com/balancer-labs/balancer-v2-monorepo/blob/c18ff2686c61a8cbad72cdcfc65e9b11476fdbc3/pkg/pool-stable/contracts/ComposableStableProtocolFees.sol#L145-L182
    fn growth_invariants_v1(
        &self,
        balances: &[Bfp],
        exempt_tokens: &[bool],
    ) -> Result<GrowthInvariants, Error> {
        let amp = self.last_join_exit.amplification;
        let is_exempt = |index: usize| exempt_tokens.get(index).copied().unwrap_or_default();

        let adjusted = self.adjusted_balances(balances, |index| {
            is_exempt(index) || self.has_rate_provider(index)
        })?;
        let swap_fee = stable_math::calculate_invariant(amp, &adjusted)?;

        Ok(if exempt_tokens.iter().all(|exempt| !exempt) {
            let total = stable_math::calculate_invariant(amp, balances)?;
            GrowthInvariants {
                swap_fee,
                total_non_exempt: total,
                total,
            }
        } else if exempt_tokens.iter().all(|exempt| *exempt) {
            GrowthInvariants {
                swap_fee,
                total_non_exempt: swap_fee,
                total: stable_math::calculate_invariant(amp, balances)?,
            }
        } else {
            let adjusted = self.adjusted_balances(balances, is_exempt)?;
            GrowthInvariants {
                swap_fee,
                total_non_exempt: stable_math::calculate_invariant(amp, &adjusted)?,
                total: stable_math::calculate_invariant(amp, balances)?,
            }
        })
    }

    // https://github.com/balancer-labs/balancer-v2-monorepo/blob/c18ff2686c61a8cbad72cdcfc65e9b11476fdbc3/pkg/pool-stable/contracts/ComposableStableProtocolFees.sol#L188-L219
    fn growth_invariants_v2(&self, balances: &[Bfp], exempt: bool) -> Result<GrowthInvariants, Error> {
        let amp = self.last_join_exit.amplification;
        let last_invariant = self.last_join_exit.invariant();

        let total = stable_math::calculate_invariant(amp, balances)?;
        if total <= last_invariant {
            return Ok(GrowthInvariants {
                swap_fee: total,
                total_non_exempt: total,
                total,
            });
        }

        let adjusted = self.adjusted_balances(balances, |index| self.has_rate_provider(index))?;
        let swap_fee = stable_math::calculate_invariant(amp, &adjusted)?
            .min(total)
            .max(last_invariant);

        Ok(GrowthInvariants {
            swap_fee,
            total_non_exempt: if exempt { swap_fee } else { total },
            total,
        })
    }

    /// Adjusts the balances of the tokens selected by `adjust`, which receives
    /// registered token indices.
    fn adjusted_balances(
        &self,
        balances: &[Bfp],
        adjust: impl Fn(usize) -> bool,
    ) -> Result<Vec<Bfp>, Error> {
        balances
            .iter()
            .enumerate()
            .map(|(index, balance)| {
                let registered = if index >= self.bpt_index { index + 1 } else { index };
                if adjust(registered) {
                    self.token_rate_caches[registered].adjusted_balance(*balance)
                } else {
                    Ok(*balance)
                }
            })
            .collect()
    }

    fn has_rate_provider(&self, registered_index: usize) -> bool {
        self.rate_providers
            .get(registered_index)
            .is_some_and(|provider| provider.is_some())
    }

    /// Protocol fees are suspended in recovery mode.
    fn protocol_fee_percentages(&self) -> ProtocolFeePercentages {
        if self.in_recovery_mode {
            ProtocolFeePercentages::default()
        } else {
            self.protocol_fee_percentages
        }
    }

    /// BPT to mint so that the protocol owns `ownership_percentage` of the
    /// pool. Only the very first pool version rounds this in fixed point.
    fn protocol_fee_amount(&self, supply: Bfp, ownership_percentage: Bfp) -> Result<Bfp, Error> {
        if self.pool_type_version == 1 {
            supply
                .mul_down(ownership_percentage)?
                .div_down(ownership_percentage.complement())
        } else {
            supply
                .as_uint256()
                .bmul(ownership_percentage.as_uint256())?
                .bdiv_down(ownership_percentage.complement().as_uint256())
                .map(Bfp::from_wei)
        }
    }

    /// Records an executed BPT swap. The rate caches of all rate providers are
    /// brought up to date as the contract does on every join and exit, even
    /// when the caller has no join exit state to record.
    pub fn apply_bpt_swap(&mut self, last_join_exit: Option<LastJoinExit>) {
        for (provider, cache) in self.rate_providers.iter().zip(&mut self.token_rate_caches) {
            if provider.is_some() {
                cache.old_rate = cache.rate;
            }
        }
        if let Some(last_join_exit) = last_join_exit {
            self.last_join_exit = last_join_exit;
        }
    }
}

#[cfg(test)]
mod tests {
    use {super::*, alloy::primitives::address};

    fn u256(s: &str) -> U256 {
        s.parse().unwrap()
    }

    fn wei(s: &str) -> Bfp {
        Bfp::from_wei(u256(s))
    }

    fn balances(values: &[&str]) -> Vec<U256> {
        values.iter().map(|value| u256(value)).collect()
    }

    /// Pool type version 1 pool in recovery mode with a yield exempt rate
    /// token. BPT at index 1.
    fn v1_pool() -> PoolState {
        PoolState {
            bpt_index: 1,
            amplification_parameter: U256::from(600_000),
            swap_fee: wei("100000000000000"),
            scaling_factors: vec![Bfp::one(), Bfp::one(), wei("366332019912307")],
            bpt_total_supply: wei("2596148429267348624180999930418421"),
            last_join_exit: LastJoinExit {
                amplification: U256::from(600_000),
                post_join_exit_invariant: u256("114012967613307699384"),
            },
            rate_providers: vec![
                None,
                None,
                Some(address!("A13a9247ea42D743238089903570127DdA72fE44")),
            ],
            token_rate_caches: vec![
                TokenRateCache::default(),
                TokenRateCache::default(),
                TokenRateCache {
                    rate: u256("1003857034775170156"),
                    old_rate: u256("1000977462514719154"),
                    duration: U256::from(1000),
                    expires: U256::from(1_677_904_371),
                },
            ],
            protocol_fee_percentages: ProtocolFeePercentages::default(),
            fee_schema: FeeSchema::V1 {
                exempt_tokens: vec![false, false, true],
            },
            pool_type_version: 1,
            in_recovery_mode: true,
        }
    }

    /// Pool type version 5 pool charging protocol fees. BPT at index 0.
    fn v5_pool() -> PoolState {
        PoolState {
            bpt_index: 0,
            amplification_parameter: U256::from(200_000),
            swap_fee: wei("500000000000000"),
            scaling_factors: vec![
                Bfp::one(),
                Bfp::one(),
                Bfp::exp10(12),
                wei("1008208139884891050"),
            ],
            bpt_total_supply: wei("2596148429318671447367809085209495"),
            last_join_exit: LastJoinExit {
                amplification: U256::from(200_000),
                post_join_exit_invariant: u256("51369044740270984486699"),
            },
            rate_providers: vec![
                None,
                None,
                None,
                Some(address!("d8689E8740C23d73136744817347fd6aC464E842")),
            ],
            token_rate_caches: vec![
                TokenRateCache::default(),
                TokenRateCache::default(),
                TokenRateCache::default(),
                TokenRateCache {
                    rate: u256("1008130755672919714"),
                    old_rate: u256("1008130755672919714"),
                    duration: U256::from(10_800),
                    expires: U256::from(1_700_764_235),
                },
            ],
            protocol_fee_percentages: ProtocolFeePercentages {
                swap: "0.5".parse().unwrap(),
                yield_: "0.5".parse().unwrap(),
            },
            fee_schema: FeeSchema::V5 { exempt: false },
            pool_type_version: 5,
            in_recovery_mode: false,
        }
    }

    fn v5_balances() -> Vec<U256> {
        balances(&[
            "2596148429267353763156769271943231",
            "20405000000000000000000",
            "10406089385",
            "20404838434804858833196",
        ])
    }

    #[test]
    fn v1_join_and_exit() {
        let pool = v1_pool();
        let reserves = balances(&[
            "414101427485347",
            "2596148429267348622595662702661260",
            "1170046233780600",
        ]);
        let swap = |index_in, index_out, amount| {
            pool.swap_with_bpt(SwapKind::GivenIn, &reserves, index_in, index_out, u256(amount))
                .unwrap()
                .amount
        };

        assert_eq!(swap(2, 1, "170046233780600"), u256("22005850083674"));
        assert_eq!(swap(1, 2, "95662702661260"), u256("473156052715491"));
        assert_eq!(swap(1, 0, "59566270266126"), u256("17329834826337"));
    }

    #[test]
    fn v1_join_with_other_reserves() {
        let pool = v1_pool();
        let reserves = balances(&[
            "1414101427485347",
            "1596148429267348622595662702661260",
            "2170046233780600",
        ]);
        let result = pool
            .swap_with_bpt(SwapKind::GivenIn, &reserves, 0, 1, u256("214101427485347"))
            .unwrap();
        assert_eq!(result.amount, u256("128189688116719916203223884786015"));
    }

    #[test]
    fn v5_join_and_exit() {
        let pool = v5_pool();
        let reserves = v5_balances();
        let swap = |index_in, index_out, amount| {
            pool.swap_with_bpt(SwapKind::GivenIn, &reserves, index_in, index_out, u256(amount))
                .unwrap()
        };

        assert_eq!(
            swap(2, 0, "2040500000000000").amount,
            u256("72153658150470669505066070")
        );
        assert_eq!(
            swap(3, 0, "4048384348048588331").amount,
            u256("4071333855617864209")
        );
        assert_eq!(
            swap(0, 3, "2040500000000000").amount,
            u256("2027780845478092")
        );
        assert_eq!(
            swap(0, 3, "4048384348048588331").amount,
            u256("4023147984636196801")
        );

        assert_eq!(
            swap(0, 3, "2040500000000000").last_join_exit,
            LastJoinExit {
                amplification: U256::from(200_000),
                post_join_exit_invariant: u256("51370619807795266619389"),
            }
        );
        assert_eq!(
            swap(2, 0, "2040500000000000")
                .last_join_exit
                .post_join_exit_invariant,
            u256("72292896601733759177512422")
        );
    }

    #[test]
    fn v5_given_out_requires_at_least_given_in_amount() {
        let pool = v5_pool();
        let reserves = v5_balances();

        let bpt_out = pool
            .swap_with_bpt(SwapKind::GivenIn, &reserves, 2, 0, u256("2040500000000000"))
            .unwrap()
            .amount;
        let token_in = pool
            .swap_with_bpt(SwapKind::GivenOut, &reserves, 2, 0, bpt_out)
            .unwrap()
            .amount;
        assert_eq!(token_in, u256("2040500082428815"));

        let token_out = pool
            .swap_with_bpt(SwapKind::GivenIn, &reserves, 0, 3, u256("2040500000000000"))
            .unwrap()
            .amount;
        let bpt_in = pool
            .swap_with_bpt(SwapKind::GivenOut, &reserves, 0, 3, token_out)
            .unwrap()
            .amount;
        assert_eq!(bpt_in, u256("2040500122517692"));
    }

    #[test]
    fn no_protocol_fee_without_growth() {
        let mut pool = v5_pool();
        let registered = swap::upscale_array(&v5_balances(), &pool.scaling_factors).unwrap();
        let balances = drop_bpt_item(&registered, pool.bpt_index);
        let total = stable_math::calculate_invariant(pool.amplification_parameter, &balances)
            .unwrap();

        pool.last_join_exit.post_join_exit_invariant = total.as_uint256();
        let (percentage, growth) = pool.protocol_pool_ownership_percentage(&balances).unwrap();
        assert_eq!(percentage, Bfp::zero());
        assert_eq!(growth, total);

        pool.last_join_exit.post_join_exit_invariant = total.as_uint256() - U256::from(1_000_000);
        let (percentage, _) = pool.protocol_pool_ownership_percentage(&balances).unwrap();
        assert!(percentage > Bfp::zero());

        pool.in_recovery_mode = true;
        let (percentage, _) = pool.protocol_pool_ownership_percentage(&balances).unwrap();
        assert_eq!(percentage, Bfp::zero());
    }

    #[test]
    fn v1_growth_invariants_by_exemption() {
        let mut pool = v1_pool();
        let balances = vec![wei("414101427485347"), wei("428632106939014")];
        let amp = pool.last_join_exit.amplification;
        let total = stable_math::calculate_invariant(amp, &balances).unwrap();

        let FeeSchema::V1 { exempt_tokens } = pool.fee_schema.clone() else {
            unreachable!()
        };
        let mixed = pool.growth_invariants_v1(&balances, &exempt_tokens).unwrap();
        assert_eq!(mixed.total, total);
        assert!(mixed.swap_fee < total);
        assert_eq!(mixed.total_non_exempt, mixed.swap_fee);

        let none = pool.growth_invariants_v1(&balances, &[false; 3]).unwrap();
        assert_eq!(none.total, total);
        assert_eq!(none.total_non_exempt, total);
        assert_eq!(none.swap_fee, mixed.swap_fee);

        pool.token_rate_caches[0] = TokenRateCache {
            rate: Bfp::one().as_uint256(),
            old_rate: Bfp::one().as_uint256(),
            ..Default::default()
        };
        let all = pool.growth_invariants_v1(&balances, &[true; 3]).unwrap();
        assert_eq!(all.total, total);
        assert_eq!(all.swap_fee, mixed.swap_fee);
        assert_eq!(all.total_non_exempt, all.swap_fee);

        pool.rate_providers[2] = None;
        let unadjusted = pool.growth_invariants_v1(&balances, &[false; 3]).unwrap();
        assert_eq!(unadjusted.swap_fee, total);
    }

    #[test]
    fn protocol_fee_amount_rounding_by_version() {
        let mut pool = v5_pool();
        let supply = wei("999999999999999999999");
        let percentage = wei("123456789123456789");

        let raw = pool.protocol_fee_amount(supply, percentage).unwrap();
        pool.pool_type_version = 1;
        let fixed = pool.protocol_fee_amount(supply, percentage).unwrap();
        assert_eq!(raw, wei("140845069121007736582"));
        assert_eq!(fixed, wei("140845069121007736581"));

        assert_eq!(
            pool.protocol_fee_amount(supply, Bfp::zero()).unwrap(),
            Bfp::zero()
        );
    }

    #[test]
    fn apply_rolls_rates_forward() {
        let mut pool = v1_pool();
        let last_join_exit = LastJoinExit {
            amplification: U256::from(600_000),
            post_join_exit_invariant: u256("114012967613307699999"),
        };
        pool.apply_bpt_swap(Some(last_join_exit));

        assert_eq!(pool.last_join_exit, last_join_exit);
        assert_eq!(
            pool.token_rate_caches[2].old_rate,
            pool.token_rate_caches[2].rate
        );
        assert_eq!(pool.token_rate_caches[0], TokenRateCache::default());
    }

    #[test]
    fn apply_without_join_exit_state_still_rolls_rates() {
        let mut pool = v1_pool();
        let before = pool.last_join_exit;
        pool.apply_bpt_swap(None);

        assert_eq!(pool.last_join_exit, before);
        assert_eq!(
            pool.token_rate_caches[2].old_rate,
            pool.token_rate_caches[2].rate
        );
    }

    #[test]
    fn last_join_exit_serialization() {
        let last_join_exit: LastJoinExit = serde_json::from_value(serde_json::json!({
            "lastJoinExitAmplification": "0x30d40",
            "lastPostJoinExitInvariant": "51369044740270984486699",
        }))
        .unwrap();
        assert_eq!(last_join_exit.amplification, U256::from(200_000));
        assert_eq!(
            serde_json::to_value(last_join_exit).unwrap(),
            serde_json::json!({
                "lastJoinExitAmplification": "200000",
                "lastPostJoinExitInvariant": "51369044740270984486699",
            })
        );
    }
}
