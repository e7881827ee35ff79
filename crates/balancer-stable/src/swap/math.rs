//! Unscaled integer helpers mirroring the contracts' `Math` library. The
//! stable invariant iteration mixes these with [`super::fixed_point::Bfp`]
//! operations and the exact choice matters for bit-for-bit parity.

use {super::error::Error, alloy::primitives::U256};

pub trait BalU256: Sized {
    fn bmul(self, other: Self) -> Result<Self, Error>;
    fn badd(self, other: Self) -> Result<Self, Error>;
    fn bsub(self, other: Self) -> Result<Self, Error>;
    fn bdiv_down(self, other: Self) -> Result<Self, Error>;
    fn bdiv_up(self, other: Self) -> Result<Self, Error>;

    fn bdiv(self, other: Self, round_up: bool) -> Result<Self, Error> {
        if round_up {
            self.bdiv_up(other)
        } else {
            self.bdiv_down(other)
        }
    }
}

impl BalU256 for U256 {
    fn bmul(self, other: Self) -> Result<Self, Error> {
        self.checked_mul(other).ok_or(Error::MulOverflow)
    }

    fn badd(self, other: Self) -> Result<Self, Error> {
        self.checked_add(other).ok_or(Error::AddOverflow)
    }

    fn bsub(self, other: Self) -> Result<Self, Error> {
        self.checked_sub(other).ok_or(Error::SubOverflow)
    }

    fn bdiv_down(self, other: Self) -> Result<Self, Error> {
        if other.is_zero() {
            return Err(Error::ZeroDivision);
        }
        Ok(self / other)
    }

    fn bdiv_up(self, other: Self) -> Result<Self, Error> {
        if other.is_zero() {
            return Err(Error::ZeroDivision);
        }
        if self.is_zero() {
            return Ok(U256::ZERO);
        }
        let one = U256::from(1);
        Ok(one + (self - one) / other)
    }
}
