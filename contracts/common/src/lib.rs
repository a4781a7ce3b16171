//! leverloop Common Library
//!
//! Shared types, constants, math and collaborator contracts for the
//! leverage loop engine and its order layer.
//!
//! ## Layers
//!
//! - **Price normalization** ([`math`]): native amounts at any precision up to
//!   30 decimals to and from canonical 8-decimal values
//! - **Loop sizing** ([`sizer`]): the next borrow that keeps the projected
//!   health factor above the caller's minimum
//! - **Collaborators** ([`market`]): lending market, exchange, price source,
//!   token ledger and checkpoint traits the engines drive
//! - **Events** ([`events`]): typed records published when an invocation commits
//!
//! All ratios are basis points (`10_000` = 1.0). Values never leave `u128`;
//! overflow is reported as [`LoopError::Overflow`] instead of panicking.
//!
//! This crate is `no_std` compatible when built without the default `std`
//! feature.

#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(not(feature = "std"))]
extern crate alloc;

// Re-export Vec and Box for submodules based on feature
#[cfg(not(feature = "std"))]
pub use alloc::{boxed::Box, vec::Vec};
#[cfg(feature = "std")]
pub use std::{boxed::Box, vec::Vec};

pub mod constants;
pub mod errors;
pub mod types;
pub mod math;
pub mod sizer;
pub mod market;
pub mod events;
pub mod validation;


// Re-exports for convenience
pub use constants::*;
pub use errors::*;
pub use types::*;
pub use math::*;
pub use sizer::*;
pub use market::*;
pub use events::*;
