//! Shared primitives for the Velella sequence-model ecosystem.
//!
//! `velella-core` provides the foundation that the other Velella crates
//! build on:
//!
//! - **Error types** — [`VelellaError`] and [`Result`] for structured error
//!   handling
//! - **Random numbers** — the [`UnitRng`] capability trait, the seedable
//!   [`Xorshift64`] generator, and the process-wide [`DefaultRng`] handle

pub mod error;
pub mod rng;

pub use error::{Result, VelellaError};
pub use rng::{DefaultRng, UnitRng, Xorshift64};
