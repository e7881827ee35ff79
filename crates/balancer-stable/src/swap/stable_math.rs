//! StableSwap invariant math as implemented by the Balancer stable pools.
//!
//! All balances and amounts are upscaled 18 decimal values. The invariant
//! iterations deliberately mix raw integer operations ([`BalU256`]) with
//! fixed point ones ([`Bfp`]) in exactly the same places as the contracts:
//! https://github.com/balancer-labs/balancer-v2-monorepo/blob/c18ff2686c61a8cbad72cdcfc65e9b11476fdbc3/pkg/pool-stable/contracts/StableMath.sol

use {
    super::{error::Error, fixed_point::Bfp, math::BalU256},
    alloy::primitives::U256,
};

/// Precision of the amplification parameter.
pub const AMP_PRECISION: U256 = U256::from_limbs([1000, 0, 0, 0]);

const MAX_ITERATIONS: usize = 255;

fn has_converged(current: U256, previous: U256) -> bool {
    let one = U256::from(1);
    if current > previous {
        current - previous <= one
    } else {
        previous - current <= one
    }
}

fn sum(balances: &[Bfp]) -> Result<Bfp, Error> {
    balances
        .iter()
        .try_fold(Bfp::zero(), |sum, balance| sum.add(*balance))
}

/// Computes the invariant rounding down, as done by composable stable pools.
pub fn calculate_invariant(amplification_parameter: U256, balances: &[Bfp]) -> Result<Bfp, Error> {
    let sum = sum(balances)?.as_uint256();
    if sum.is_zero() {
        return Ok(Bfp::zero());
    }

    let num_tokens = U256::from(balances.len());
    let amp_times_total = amplification_parameter.bmul(num_tokens)?;

    let mut invariant = sum;
    for _ in 0..MAX_ITERATIONS {
        let mut d_p = invariant;
        for balance in balances {
            d_p = d_p
                .bmul(invariant)?
                .bdiv_down(balance.as_uint256().bmul(num_tokens)?)?;
        }

        let previous_invariant = invariant;

        let numerator = amp_times_total
            .bmul(sum)?
            .bdiv_down(AMP_PRECISION)?
            .badd(d_p.bmul(num_tokens)?)?
            .bmul(invariant)?;
        let denominator = amp_times_total
            .bsub(AMP_PRECISION)?
            .bmul(invariant)?
            .bdiv_down(AMP_PRECISION)?
            .badd(num_tokens.badd(U256::from(1))?.bmul(d_p)?)?;
        invariant = numerator.bdiv_down(denominator)?;

        if has_converged(invariant, previous_invariant) {
            return Ok(Bfp::from_wei(invariant));
        }
    }

    Err(Error::StableGetBalanceDidntConverge)
}

/// Computes the invariant the way legacy stable and meta stable pools do,
/// where the caller chooses the rounding direction.
pub fn calculate_invariant_v1(
    amplification_parameter: U256,
    balances: &[Bfp],
    round_up: bool,
) -> Result<Bfp, Error> {
    let sum = sum(balances)?.as_uint256();
    if sum.is_zero() {
        return Ok(Bfp::zero());
    }

    let num_tokens = U256::from(balances.len());
    let amp_times_total = amplification_parameter.bmul(num_tokens)?;

    let mut invariant = sum;
    for _ in 0..MAX_ITERATIONS {
        let mut p_d = balances[0].as_uint256().bmul(num_tokens)?;
        for balance in &balances[1..] {
            p_d = p_d
                .bmul(balance.as_uint256())?
                .bmul(num_tokens)?
                .bdiv(invariant, round_up)?;
        }

        let previous_invariant = invariant;

        let numerator = num_tokens.bmul(invariant)?.bmul(invariant)?.badd(
            amp_times_total
                .bmul(sum)?
                .bmul(p_d)?
                .bdiv(AMP_PRECISION, round_up)?,
        )?;
        let denominator = num_tokens.badd(U256::from(1))?.bmul(invariant)?.badd(
            amp_times_total
                .bsub(AMP_PRECISION)?
                .bmul(p_d)?
                .bdiv(AMP_PRECISION, !round_up)?,
        )?;
        invariant = numerator.bdiv(denominator, round_up)?;

        if has_converged(invariant, previous_invariant) {
            return Ok(Bfp::from_wei(invariant));
        }
    }

    Err(Error::StableGetBalanceDidntConverge)
}

/// Solves the balance of `token_index` that keeps the pool at `invariant`
/// given all other balances. The current balance of `token_index` is ignored.
/// Rounds up.
pub fn get_token_balance_given_invariant_and_all_other_balances(
    amplification_parameter: U256,
    balances: &[Bfp],
    invariant: Bfp,
    token_index: usize,
) -> Result<Bfp, Error> {
    let invariant = invariant.as_uint256();
    let num_tokens = U256::from(balances.len());
    let amp_times_total = amplification_parameter.bmul(num_tokens)?;

    let mut sum = balances[0];
    let mut p_d = balances[0].as_uint256().bmul(num_tokens)?;
    for balance in &balances[1..] {
        p_d = p_d
            .bmul(balance.as_uint256())?
            .bmul(num_tokens)?
            .bdiv_down(invariant)?;
        sum = sum.add(*balance)?;
    }
    let sum = sum.sub(balances[token_index])?.as_uint256();

    let invariant_squared = invariant.bmul(invariant)?;
    let c = invariant_squared
        .bdiv_up(amp_times_total.bmul(p_d)?)?
        .bmul(AMP_PRECISION)?
        .bmul(balances[token_index].as_uint256())?;
    let b = sum.badd(
        invariant
            .bdiv_down(amp_times_total)?
            .bmul(AMP_PRECISION)?,
    )?;

    let mut token_balance = invariant_squared
        .badd(c)?
        .bdiv_up(invariant.badd(b)?)?;
    for _ in 0..MAX_ITERATIONS {
        let previous_token_balance = token_balance;
        token_balance = token_balance
            .bmul(token_balance)?
            .badd(c)?
            .bdiv_up(
                token_balance
                    .bmul(U256::from(2))?
                    .badd(b)?
                    .bsub(invariant)?,
            )?;

        if has_converged(token_balance, previous_token_balance) {
            return Ok(Bfp::from_wei(token_balance));
        }
    }

    Err(Error::StableGetBalanceDidntConverge)
}

/// Amount of `token_index_out` received for `token_amount_in`, rounded down.
pub fn calc_out_given_in(
    amplification_parameter: U256,
    balances: &[Bfp],
    token_index_in: usize,
    token_index_out: usize,
    token_amount_in: Bfp,
    invariant: Bfp,
) -> Result<Bfp, Error> {
    let mut balances = balances.to_vec();
    balances[token_index_in] = balances[token_index_in].add(token_amount_in)?;

    let final_balance_out = get_token_balance_given_invariant_and_all_other_balances(
        amplification_parameter,
        &balances,
        invariant,
        token_index_out,
    )?;

    // The pool is favoured by one wei.
    balances[token_index_out]
        .sub(final_balance_out)?
        .sub(Bfp::from_wei(U256::from(1)))
}

/// Amount of `token_index_in` required to receive `token_amount_out`, rounded
/// up.
pub fn calc_in_given_out(
    amplification_parameter: U256,
    balances: &[Bfp],
    token_index_in: usize,
    token_index_out: usize,
    token_amount_out: Bfp,
    invariant: Bfp,
) -> Result<Bfp, Error> {
    let mut balances = balances.to_vec();
    balances[token_index_out] = balances[token_index_out].sub(token_amount_out)?;

    let final_balance_in = get_token_balance_given_invariant_and_all_other_balances(
        amplification_parameter,
        &balances,
        invariant,
        token_index_in,
    )?;

    final_balance_in
        .sub(balances[token_index_in])?
        .add(Bfp::from_wei(U256::from(1)))
}

/// BPT minted for depositing `amounts_in`. Swap fees are only charged on the
/// part of each deposit that exceeds the proportional share.
pub fn calc_bpt_out_given_exact_tokens_in(
    amplification_parameter: U256,
    balances: &[Bfp],
    amounts_in: &[Bfp],
    bpt_total_supply: Bfp,
    current_invariant: Bfp,
    swap_fee: Bfp,
) -> Result<Bfp, Error> {
    let sum_balances = sum(balances)?;

    let mut balance_ratios_with_fee = Vec::with_capacity(balances.len());
    let mut invariant_ratio_with_fees = Bfp::zero();
    for (balance, amount_in) in balances.iter().zip(amounts_in) {
        let current_weight = balance.div_down(sum_balances)?;
        let balance_ratio = balance.add(*amount_in)?.div_down(*balance)?;
        invariant_ratio_with_fees =
            invariant_ratio_with_fees.add(balance_ratio.mul_down(current_weight)?)?;
        balance_ratios_with_fee.push(balance_ratio);
    }

    let mut new_balances = Vec::with_capacity(balances.len());
    for ((balance, amount_in), balance_ratio) in
        balances.iter().zip(amounts_in).zip(&balance_ratios_with_fee)
    {
        let amount_in_without_fee = if *balance_ratio > invariant_ratio_with_fees {
            let non_taxable_amount =
                balance.mul_down(invariant_ratio_with_fees.sub(Bfp::one())?)?;
            let taxable_amount = amount_in.sub(non_taxable_amount)?;
            non_taxable_amount.add(taxable_amount.mul_down(swap_fee.complement())?)?
        } else {
            *amount_in
        };
        new_balances.push(balance.add(amount_in_without_fee)?);
    }

    let new_invariant = calculate_invariant(amplification_parameter, &new_balances)?;
    let invariant_ratio = new_invariant.div_down(current_invariant)?;
    if invariant_ratio > Bfp::one() {
        bpt_total_supply.mul_down(invariant_ratio.sub(Bfp::one())?)
    } else {
        Ok(Bfp::zero())
    }
}

/// Amount of `token_index` to deposit in order to mint exactly
/// `bpt_amount_out`. Rounds up.
pub fn calc_token_in_given_exact_bpt_out(
    amplification_parameter: U256,
    balances: &[Bfp],
    token_index: usize,
    bpt_amount_out: Bfp,
    bpt_total_supply: Bfp,
    current_invariant: Bfp,
    swap_fee: Bfp,
) -> Result<Bfp, Error> {
    let new_invariant = bpt_total_supply
        .add(bpt_amount_out)?
        .div_up(bpt_total_supply)?
        .mul_up(current_invariant)?;

    let new_balance = get_token_balance_given_invariant_and_all_other_balances(
        amplification_parameter,
        balances,
        new_invariant,
        token_index,
    )?;
    let amount_in_without_fee = new_balance.sub(balances[token_index])?;

    let current_weight = balances[token_index].div_down(sum(balances)?)?;
    let taxable_amount = amount_in_without_fee.mul_up(current_weight.complement())?;
    let non_taxable_amount = amount_in_without_fee.sub(taxable_amount)?;

    non_taxable_amount.add(taxable_amount.div_up(swap_fee.complement())?)
}

/// BPT to burn in order to withdraw exactly `amounts_out`. Rounds up.
pub fn calc_bpt_in_given_exact_tokens_out(
    amplification_parameter: U256,
    balances: &[Bfp],
    amounts_out: &[Bfp],
    bpt_total_supply: Bfp,
    current_invariant: Bfp,
    swap_fee: Bfp,
) -> Result<Bfp, Error> {
    let sum_balances = sum(balances)?;

    let mut balance_ratios_without_fee = Vec::with_capacity(balances.len());
    let mut invariant_ratio_without_fees = Bfp::zero();
    for (balance, amount_out) in balances.iter().zip(amounts_out) {
        let current_weight = balance.div_up(sum_balances)?;
        let balance_ratio = balance.sub(*amount_out)?.div_up(*balance)?;
        invariant_ratio_without_fees =
            invariant_ratio_without_fees.add(balance_ratio.mul_up(current_weight)?)?;
        balance_ratios_without_fee.push(balance_ratio);
    }

    // There is no token in, so the fee is charged on the excess token out.
    let mut new_balances = Vec::with_capacity(balances.len());
    for ((balance, amount_out), balance_ratio) in balances
        .iter()
        .zip(amounts_out)
        .zip(&balance_ratios_without_fee)
    {
        let amount_out_with_fee = if invariant_ratio_without_fees > *balance_ratio {
            let non_taxable_amount =
                balance.mul_down(invariant_ratio_without_fees.complement())?;
            let taxable_amount = amount_out.sub(non_taxable_amount)?;
            non_taxable_amount.add(taxable_amount.div_up(swap_fee.complement())?)?
        } else {
            *amount_out
        };
        new_balances.push(balance.sub(amount_out_with_fee)?);
    }

    let new_invariant = calculate_invariant(amplification_parameter, &new_balances)?;
    let invariant_ratio = new_invariant.div_down(current_invariant)?;
    bpt_total_supply.mul_up(invariant_ratio.complement())
}

/// Amount of `token_index` received for burning exactly `bpt_amount_in`.
/// Rounds down.
pub fn calc_token_out_given_exact_bpt_in(
    amplification_parameter: U256,
    balances: &[Bfp],
    token_index: usize,
    bpt_amount_in: Bfp,
    bpt_total_supply: Bfp,
    current_invariant: Bfp,
    swap_fee: Bfp,
) -> Result<Bfp, Error> {
    let new_invariant = bpt_total_supply
        .sub(bpt_amount_in)?
        .div_up(bpt_total_supply)?
        .mul_up(current_invariant)?;

    let new_balance = get_token_balance_given_invariant_and_all_other_balances(
        amplification_parameter,
        balances,
        new_invariant,
        token_index,
    )?;
    let amount_out_without_fee = balances[token_index].sub(new_balance)?;

    let current_weight = balances[token_index].div_down(sum(balances)?)?;
    let taxable_amount = amount_out_without_fee.mul_up(current_weight.complement())?;
    let non_taxable_amount = amount_out_without_fee.sub(taxable_amount)?;

    non_taxable_amount.add(taxable_amount.mul_down(swap_fee.complement())?)
}

/// Protocol share of the swap fees accumulated in `token_index` since the
/// invariant was `last_invariant`. Used by legacy stable pools which pay
/// protocol fees in a single token.
pub fn calc_due_token_protocol_swap_fee_amount(
    amplification_parameter: U256,
    balances: &[Bfp],
    last_invariant: Bfp,
    token_index: usize,
    protocol_swap_fee_percentage: Bfp,
) -> Result<Bfp, Error> {
    let final_balance = get_token_balance_given_invariant_and_all_other_balances(
        amplification_parameter,
        balances,
        last_invariant,
        token_index,
    )?;

    if balances[token_index] <= final_balance {
        return Ok(Bfp::zero());
    }
    balances[token_index]
        .sub(final_balance)?
        .mul_down(protocol_swap_fee_percentage)
}
