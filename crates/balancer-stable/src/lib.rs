//! Off-chain pricing of Balancer V2 stable, meta stable and composable stable
//! pools, reproducing the contracts' fixed point arithmetic exactly.

pub mod config;
pub mod metadata;
pub mod pool;
pub mod pools;
pub mod serialization;
pub mod swap;

pub use {
    config::Config,
    pool::{AcceptedSwap, Pool, Quote, QuoteError, TokenAmount},
};
