//! Input-output hidden Markov models for the Velella sequence-model
//! ecosystem.
//!
//! Provides the Mealy-flavor IOHMM, where an externally supplied input token
//! conditions both the hidden-state transition and the emission at every
//! time step:
//!
//! - **Evaluation** — lazy forward (α) and backward (β) recurrences and the
//!   joint sequence probability, in linear probability space
//! - **Training** — Baum-Welch re-estimation that pushes weighted
//!   pseudo-observations into the plug-in transition and emission
//!   distributions from `velella-dist`
//! - **Generation** — model-directed sampling of hidden paths and outputs
//!   for a given input sequence

pub mod mealy;

pub use mealy::{Alphas, BetasReverse, MealyIohmm, TrainStats};
