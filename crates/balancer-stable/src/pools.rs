//! Swap simulation for the supported stable pool types. Balances and amounts
//! handed to the pools are in the tokens' native units.

pub mod common;
pub mod composable_stable;
pub mod stable;
