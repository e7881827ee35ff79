//! Module emulating the operations on fixed points with exactly 18 decimals as
//! used in the Balancer smart contracts. The original contract code can be
//! found at:
//! https://github.com/balancer-labs/balancer-v2-monorepo/blob/c18ff2686c61a8cbad72cdcfc65e9b11476fdbc3/pkg/solidity-utils/contracts/math/FixedPoint.sol

use {
    super::{error::Error, math::BalU256},
    alloy::primitives::U256,
    anyhow::{Context, Result, ensure},
    std::{
        fmt::{self, Debug, Formatter},
        str::FromStr,
    },
};

mod logexpmath;

const ONE_18: U256 = U256::from_limbs([1_000_000_000_000_000_000, 0, 0, 0]);
const TWO_18: U256 = U256::from_limbs([2_000_000_000_000_000_000, 0, 0, 0]);
const FOUR_18: U256 = U256::from_limbs([4_000_000_000_000_000_000, 0, 0, 0]);

/// Relative error bound of [`logexpmath::pow`], in wei of the result.
const MAX_POW_RELATIVE_ERROR: Bfp = Bfp(U256::from_limbs([10_000, 0, 0, 0]));

/// Fixed point numbers that represent exactly any rational number that can be
/// represented with up to 18 decimals as long as it can be stored in 256 bits.
/// It corresponds to Solidity's `ufixed256x18`.
/// Operations on this type are implemented as in Balancer's FixedPoint library,
/// including error codes, from which the name (Balancer Fixed Point).
#[derive(Clone, Copy, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Bfp(U256);

impl From<usize> for Bfp {
    fn from(num: usize) -> Self {
        Self(U256::from(num) * ONE_18)
    }
}

impl FromStr for Bfp {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        let (units, decimals) = s.split_once('.').unwrap_or((s, "0"));
        ensure!(
            !units.is_empty() && !decimals.is_empty(),
            "missing digits in {s:?}"
        );
        ensure!(
            units.bytes().chain(decimals.bytes()).all(|b| b.is_ascii_digit()),
            "invalid decimal number {s:?}"
        );
        ensure!(decimals.len() <= 18, "too many decimals in {s:?}");

        let units = U256::from_str_radix(units, 10)?;
        let decimals = U256::from_str_radix(&format!("{decimals:0<18}"), 10)?;
        units
            .checked_mul(ONE_18)
            .and_then(|units| units.checked_add(decimals))
            .map(Self)
            .with_context(|| format!("{s:?} does not fit in 256 bits"))
    }
}

impl Debug for Bfp {
    fn fmt(&self, formatter: &mut Formatter) -> fmt::Result {
        write!(
            formatter,
            "{}.{:0>18}",
            self.0 / ONE_18,
            (self.0 % ONE_18).to_string()
        )
    }
}

impl Bfp {
    /// 10^exp as a fixed point number. Exponents above 59 overflow.
    pub fn exp10(exp: u8) -> Self {
        Self(U256::from(10).pow(U256::from(18 + u32::from(exp))))
    }

    pub fn as_uint256(self) -> U256 {
        self.0
    }

    pub const fn zero() -> Self {
        Self(U256::ZERO)
    }

    pub const fn one() -> Self {
        Self(ONE_18)
    }

    pub const fn from_wei(num: U256) -> Self {
        Self(num)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn add(self, other: Self) -> Result<Self, Error> {
        Ok(Self(self.0.badd(other.0)?))
    }

    pub fn sub(self, other: Self) -> Result<Self, Error> {
        Ok(Self(self.0.bsub(other.0)?))
    }

    pub fn mul_down(self, other: Self) -> Result<Self, Error> {
        Ok(Self(self.0.bmul(other.0)? / ONE_18))
    }

    pub fn mul_up(self, other: Self) -> Result<Self, Error> {
        let product = self.0.bmul(other.0)?;
        if product.is_zero() {
            return Ok(Self::zero());
        }
        let one = U256::from(1);
        Ok(Self((product - one) / ONE_18 + one))
    }

    pub fn div_down(self, other: Self) -> Result<Self, Error> {
        if other.is_zero() {
            return Err(Error::ZeroDivision);
        }
        if self.is_zero() {
            return Ok(Self::zero());
        }
        let inflated = self.0.checked_mul(ONE_18).ok_or(Error::DivInternal)?;
        Ok(Self(inflated / other.0))
    }

    pub fn div_up(self, other: Self) -> Result<Self, Error> {
        if other.is_zero() {
            return Err(Error::ZeroDivision);
        }
        if self.is_zero() {
            return Ok(Self::zero());
        }
        let inflated = self.0.checked_mul(ONE_18).ok_or(Error::DivInternal)?;
        let one = U256::from(1);
        Ok(Self((inflated - one) / other.0 + one))
    }

    /// `1 - self`, clamped at zero.
    pub fn complement(self) -> Self {
        if self.0 < ONE_18 {
            Self(ONE_18 - self.0)
        } else {
            Self::zero()
        }
    }

    /// Upper bound of `self^exp`. Small integer exponents are computed exactly,
    /// everything else goes through [`logexpmath::pow`] plus its error margin.
    pub fn pow_up(self, exp: Self) -> Result<Self, Error> {
        if exp.0 == ONE_18 {
            Ok(self)
        } else if exp.0 == TWO_18 {
            self.mul_up(self)
        } else if exp.0 == FOUR_18 {
            let square = self.mul_up(self)?;
            square.mul_up(square)
        } else {
            let raw = Self(logexpmath::pow(self.0, exp.0)?);
            let max_error = raw
                .mul_up(MAX_POW_RELATIVE_ERROR)?
                .add(Self(U256::from(1)))?;
            raw.add(max_error)
        }
    }
}
