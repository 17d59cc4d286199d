//! Fittable probability distributions for the Velella sequence-model
//! ecosystem.
//!
//! Provides the [`Distribution`] capability trait with finite categorical,
//! integer-range, and Gaussian implementations, plus the input-conditioned
//! [`TransitionDistribution`] layer used by the hidden Markov model engine:
//!
//! - **Evaluation** — probability density/mass queries with domain checking
//! - **Sampling** — cumulative binary-search sampling for categoricals,
//!   Box-Muller for the Gaussian, against any [`velella_core::UnitRng`]
//! - **Fitting** — weighted maximum-likelihood blending with a coefficient
//!   `eta` in `[0, 1]`
//! - **Transitions** — one owned output distribution per input, with
//!   per-input slice fitting
//!
//! # Quick start
//!
//! ```
//! use velella_dist::{Distribution, IntegerRangeDistribution};
//!
//! let mut die = IntegerRangeDistribution::new(1, 6).unwrap();
//! assert!((die.pdf(&3).unwrap() - 1.0 / 6.0).abs() < 1e-9);
//!
//! // Blend a point mass a quarter of the way in.
//! die.fit(&[(6, 1.0)], 0.25).unwrap();
//! assert!((die.pdf(&6).unwrap() - 0.375).abs() < 1e-9);
//! ```

pub mod distribution;
pub mod finite;
pub mod normal;
pub mod transition;

pub use distribution::{Distribution, PROB_TOLERANCE};
pub use finite::{FiniteDistribution, IntegerRangeDistribution};
pub use normal::NormalDistribution;
pub use transition::{
    FiniteTransitionDistribution, IntegerRangeTransitionDistribution, TransitionDistribution,
};
