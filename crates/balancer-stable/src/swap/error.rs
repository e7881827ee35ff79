//! Errors raised by the Balancer math libraries that the stable pools rely
//! on. The codes match the contract error table:
//! https://github.com/balancer-labs/balancer-v2-monorepo/blob/c18ff2686c61a8cbad72cdcfc65e9b11476fdbc3/pkg/interfaces/contracts/solidity-utils/helpers/BalancerErrors.sol

use std::fmt;

macro_rules! balancer_errors {
    ( $( ( $variant:ident, $code:literal ) ),+ $(,)? ) => {
        #[derive(thiserror::Error, Clone, Copy, Debug, PartialEq, Eq)]
        pub enum Error {
            $(
                $variant,
            )*
        }

        impl Error {
            /// Numeric code of the error in the Balancer contracts.
            pub fn code(&self) -> u16 {
                match self {
                    $(
                        Self::$variant => $code,
                    )*
                }
            }

            fn name(&self) -> &'static str {
                match self {
                    $(
                        Self::$variant => stringify!($variant),
                    )*
                }
            }
        }

        #[cfg(test)]
        impl From<&str> for Error {
            fn from(code: &str) -> Self {
                match code.parse::<u16>().unwrap() {
                    $(
                        $code => Self::$variant,
                    )*
                    _ => panic!("unknown Balancer error code {code}"),
                }
            }
        }
    }
}

balancer_errors!(
    (AddOverflow, 0),
    (SubOverflow, 1),
    (MulOverflow, 3),
    (ZeroDivision, 4),
    (DivInternal, 5),
    (XOutOfBounds, 6),
    (YOutOfBounds, 7),
    (ProductOutOfBounds, 8),
    (InvalidExponent, 9),
    (StableGetBalanceDidntConverge, 322),
);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "BAL#{:0>3}: {}", self.code(), self.name())
    }
}
