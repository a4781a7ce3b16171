//! Loop Engine - Leveraged Positions over Pluggable Markets
//!
//! Builds and unwinds leveraged positions on a lending market by looping
//! borrow -> swap -> deposit, with every collaborator behind a trait from
//! `leverloop_common::market`.
//!
//! ## Core Operations
//!
//! - **execute_loop**: Pull margin, supply it, loop until the target leverage
//! - **preview_loop**: Same arithmetic against quotes, no state change
//! - **unwind_loop**: Sell collateral to repay debt, release collateral
//!
//! ## Market Adapters
//!
//! Lending markets attribute positions in one of two ways:
//! - [`BeneficiaryAddressed`]: the market accepts an explicit on-behalf-of account
//! - [`CallerAddressed`]: the position belongs to whoever calls; the adapter
//!   is bound to a single beneficiary
//!
//! ## Guarantees
//!
//! Every invocation is checkpointed. A failure at any step restores the host
//! and publishes no events. At most one loop or unwind runs per beneficiary.

pub mod adapters;
pub mod config;
pub mod engine;
pub mod locks;
pub mod sim;
pub mod unwind;

#[cfg(test)]
mod integration_tests;

pub use adapters::{BeneficiaryAddressed, CallerAddressed, DelegatedPool, SessionPool};
pub use config::{CapPolicy, ConfigParam, EngineConfig};
pub use engine::{short_key, LoopEngine};
pub use locks::{BeneficiaryGuard, BeneficiaryLocks};
pub use sim::SimChain;
