//! Exponentiation of 18 decimal fixed point numbers, reproducing the
//! contract's `LogExpMath` library to the last wei. Contract code:
//! https://github.com/balancer-labs/balancer-v2-monorepo/blob/c18ff2686c61a8cbad72cdcfc65e9b11476fdbc3/pkg/solidity-utils/contracts/math/LogExpMath.sol

use {
    super::super::error::Error,
    alloy::primitives::{I256, U256},
    std::sync::LazyLock,
};

fn i256(value: u128) -> I256 {
    I256::from_raw(U256::from(value))
}

static ONE_18: LazyLock<I256> = LazyLock::new(|| i256(10_u128.pow(18)));
static ONE_20: LazyLock<I256> = LazyLock::new(|| i256(10_u128.pow(20)));
static ONE_36: LazyLock<I256> = LazyLock::new(|| i256(10_u128.pow(36)));
static MAX_NATURAL_EXPONENT: LazyLock<I256> = LazyLock::new(|| i256(130 * 10_u128.pow(18)));
static MIN_NATURAL_EXPONENT: LazyLock<I256> = LazyLock::new(|| -i256(41 * 10_u128.pow(18)));
static LN_36_LOWER_BOUND: LazyLock<I256> = LazyLock::new(|| i256(9 * 10_u128.pow(17)));
static LN_36_UPPER_BOUND: LazyLock<I256> = LazyLock::new(|| i256(11 * 10_u128.pow(17)));
/// 2^254 / 10^20, so that `ln(x) * y` cannot overflow a signed 256 bit value.
static MILD_EXPONENT_BOUND: LazyLock<U256> =
    LazyLock::new(|| (U256::from(1) << 254) / U256::from(10_u128.pow(20)));

/// `x_n = 2^(7-n)` with 20 decimals, for n in 2..=11.
const X_20: [u128; 10] = [
    3_200_000_000_000_000_000_000,
    1_600_000_000_000_000_000_000,
    800_000_000_000_000_000_000,
    400_000_000_000_000_000_000,
    200_000_000_000_000_000_000,
    100_000_000_000_000_000_000,
    50_000_000_000_000_000_000,
    25_000_000_000_000_000_000,
    12_500_000_000_000_000_000,
    6_250_000_000_000_000_000,
];

/// `a_n = e^(x_n)` with 20 decimals, for n in 2..=11.
const A_20: [u128; 10] = [
    7_896_296_018_268_069_516_100_000_000_000_000,
    888_611_052_050_787_263_676_000_000,
    298_095_798_704_172_827_474_000,
    5_459_815_003_314_423_907_810,
    738_905_609_893_065_022_723,
    271_828_182_845_904_523_536,
    164_872_127_070_012_814_685,
    128_402_541_668_774_148_407,
    113_314_845_306_682_631_683,
    106_449_445_891_785_942_956,
];

/// `x_0 = 2^7` and `x_1 = 2^6` with 18 decimals.
const X_18: [u128; 2] = [128_000_000_000_000_000_000, 64_000_000_000_000_000_000];

/// `e^(x_0)` without decimals does not fit 128 bits.
static A_18_0: LazyLock<I256> = LazyLock::new(|| {
    I256::from_raw(U256::from(388_770_840_599_459_509_222_u128) * U256::from(10).pow(U256::from(35)))
});
const A_18_1: u128 = 6_235_149_080_811_616_882_910_000_000;

fn x_20(n: usize) -> I256 {
    i256(X_20[n - 2])
}

fn a_20(n: usize) -> I256 {
    i256(A_20[n - 2])
}

fn x_18(n: usize) -> I256 {
    i256(X_18[n])
}

fn a_18(n: usize) -> I256 {
    match n {
        0 => *A_18_0,
        _ => i256(A_18_1),
    }
}

/// `x^y` for 18 decimal fixed point values.
pub fn pow(x: U256, y: U256) -> Result<U256, Error> {
    if y.is_zero() {
        return Ok(ONE_18.into_raw());
    }
    if x.is_zero() {
        return Ok(U256::ZERO);
    }

    if x.bit(255) {
        return Err(Error::XOutOfBounds);
    }
    let x = I256::from_raw(x);

    if y >= *MILD_EXPONENT_BOUND {
        return Err(Error::YOutOfBounds);
    }
    let y = I256::from_raw(y);

    let mut logx_times_y = if *LN_36_LOWER_BOUND < x && x < *LN_36_UPPER_BOUND {
        let ln_36_x = ln_36(x);
        (ln_36_x / *ONE_18) * y + ((ln_36_x % *ONE_18) * y) / *ONE_18
    } else {
        ln(x) * y
    };
    logx_times_y /= *ONE_18;

    if !(*MIN_NATURAL_EXPONENT <= logx_times_y && logx_times_y <= *MAX_NATURAL_EXPONENT) {
        return Err(Error::ProductOutOfBounds);
    }

    exp(logx_times_y).map(I256::into_raw)
}

fn exp(mut x: I256) -> Result<I256, Error> {
    if !(*MIN_NATURAL_EXPONENT <= x && x <= *MAX_NATURAL_EXPONENT) {
        return Err(Error::InvalidExponent);
    }

    if x < I256::ZERO {
        return Ok((*ONE_18 * *ONE_18) / exp(-x)?);
    }

    let first_an = if x >= x_18(0) {
        x -= x_18(0);
        a_18(0)
    } else if x >= x_18(1) {
        x -= x_18(1);
        a_18(1)
    } else {
        i256(1)
    };

    x *= i256(100);

    let mut product = *ONE_20;
    for n in 2..=9 {
        if x >= x_20(n) {
            x -= x_20(n);
            product = (product * a_20(n)) / *ONE_20;
        }
    }

    // Taylor series with 12 terms for the remainder.
    let mut series_sum = *ONE_20;
    let mut term = x;
    series_sum += term;
    for i in 2..=12_u32 {
        term = ((term * x) / *ONE_20) / i256(i.into());
        series_sum += term;
    }

    Ok((((product * series_sum) / *ONE_20) * first_an) / i256(100))
}

fn ln(mut a: I256) -> I256 {
    if a < *ONE_18 {
        return -ln((*ONE_18 * *ONE_18) / a);
    }

    let mut sum = I256::ZERO;
    for n in 0..=1 {
        if a >= a_18(n) * *ONE_18 {
            a /= a_18(n);
            sum += x_18(n);
        }
    }

    sum *= i256(100);
    a *= i256(100);

    for n in 2..=11 {
        if a >= a_20(n) {
            a = (a * *ONE_20) / a_20(n);
            sum += x_20(n);
        }
    }

    let z = ((a - *ONE_20) * *ONE_20) / (a + *ONE_20);
    let z_squared = (z * z) / *ONE_20;

    let mut num = z;
    let mut series_sum = num;
    for i in (3..=11_u32).step_by(2) {
        num = (num * z_squared) / *ONE_20;
        series_sum += num / i256(i.into());
    }
    series_sum *= i256(2);

    (sum + series_sum) / i256(100)
}

/// Natural logarithm with 36 decimals of precision, only accurate close to
/// one.
fn ln_36(mut x: I256) -> I256 {
    x *= *ONE_18;

    let z = ((x - *ONE_36) * *ONE_36) / (x + *ONE_36);
    let z_squared = (z * z) / *ONE_36;

    let mut num = z;
    let mut series_sum = num;
    for i in (3..=15_u32).step_by(2) {
        num = (num * z_squared) / *ONE_36;
        series_sum += num / i256(i.into());
    }

    series_sum * i256(2)
}
