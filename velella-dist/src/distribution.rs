//! The distribution capability trait.
//!
//! [`Distribution`] is the contract every Velella distribution family
//! implements: evaluate a density, draw a sample, re-estimate from weighted
//! observations, and return to a canonical state. Families whose fit is
//! scale-invariant override [`Distribution::fit_unnormalized`] to delegate
//! straight to [`Distribution::fit`]; the default renormalizes the weights
//! first.

use velella_core::{DefaultRng, Result, UnitRng, VelellaError};

/// Tolerance for probability-sum validation throughout the crate.
pub const PROB_TOLERANCE: f64 = 1e-6;

/// A probability distribution over a domain `T` that can be evaluated,
/// sampled, and re-estimated from weighted observations.
pub trait Distribution<T: Clone> {
    /// Probability density (or mass) at `x`.
    ///
    /// # Errors
    ///
    /// Returns [`VelellaError::OutOfDomain`] when `x` lies outside the
    /// declared domain.
    fn pdf(&self, x: &T) -> Result<f64>;

    /// Draw one sample distributed according to [`pdf`](Self::pdf).
    fn sample(&self, rng: &mut dyn UnitRng) -> T;

    /// Draw one sample using the process-wide default generator.
    fn sample_default(&self) -> T {
        self.sample(&mut DefaultRng)
    }

    /// Re-estimate from weighted observations, blending the maximum
    /// likelihood estimate into the current parameters:
    /// `new = (1 - eta) * old + eta * mle`.
    ///
    /// The weights are expected to be non-negative and sum to 1 (within
    /// [`PROB_TOLERANCE`]). An empty or all-zero-weight sequence leaves the
    /// distribution unchanged. No mutation occurs if an error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`VelellaError::InvalidInput`] for `eta` outside `[0, 1]`,
    /// negative or non-finite weights, or observations outside the domain.
    fn fit(&mut self, weighted: &[(T, f64)], eta: f64) -> Result<()>;

    /// Like [`fit`](Self::fit), but the weights need not sum to 1; the total
    /// mass is renormalized internally before blending.
    fn fit_unnormalized(&mut self, weighted: &[(T, f64)], eta: f64) -> Result<()> {
        check_eta(eta)?;
        let mut total = 0.0;
        for &(_, w) in weighted {
            check_weight(w)?;
            total += w;
        }
        if total <= 0.0 {
            return Ok(());
        }
        let scaled: Vec<(T, f64)> = weighted
            .iter()
            .map(|(x, w)| (x.clone(), w / total))
            .collect();
        self.fit(&scaled, eta)
    }

    /// Return the distribution to its canonical initial state.
    fn reset(&mut self);

    /// Strongly perturb the parameters, e.g. to escape a degenerate model.
    /// The distribution remains valid afterwards.
    fn randomize(&mut self, rng: &mut dyn UnitRng);
}

/// Validate a blending coefficient.
pub(crate) fn check_eta(eta: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&eta) {
        return Err(VelellaError::InvalidInput(format!(
            "blending coefficient eta = {eta} must be in [0, 1]"
        )));
    }
    Ok(())
}

/// Validate a single observation weight.
pub(crate) fn check_weight(w: f64) -> Result<()> {
    if !w.is_finite() || w < 0.0 {
        return Err(VelellaError::InvalidInput(format!(
            "observation weight {w} must be finite and non-negative"
        )));
    }
    Ok(())
}
