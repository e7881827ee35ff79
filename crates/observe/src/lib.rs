//! Logging setup shared by binaries and tests that price pools with
//! `balancer-stable`.
pub mod config;
pub mod tracing;

pub use config::Config;
