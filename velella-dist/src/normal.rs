//! One-dimensional Gaussian distribution with weighted-moment fitting.

use core::f64::consts::PI;

use velella_core::{Result, UnitRng, VelellaError};

use crate::distribution::{check_eta, check_weight, Distribution};

/// Error function via Abramowitz & Stegun 7.1.26 (max error ~1.5e-7).
pub fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.3275911 * x);
    let poly = t
        * (0.254829592
            + t * (-0.284496736 + t * (1.421413741 + t * (-1.453152027 + t * 1.061405429))));
    sign * (1.0 - poly * (-x * x).exp())
}

/// Normal (Gaussian) distribution with parameters μ and σ.
///
/// Fitting blends weighted sample moments into the current parameters; the
/// standard deviation is blended linearly, matching the documented contract
/// (a point mass fitted with full blending drives σ to zero).
#[derive(Debug, Clone, Copy)]
pub struct NormalDistribution {
    mu: f64,
    sigma: f64,
}

impl NormalDistribution {
    /// Create a new Gaussian. `sigma` must be positive and finite.
    ///
    /// # Errors
    ///
    /// Returns an error if `sigma <= 0` or either parameter is non-finite.
    pub fn new(mu: f64, sigma: f64) -> Result<Self> {
        if !mu.is_finite() {
            return Err(VelellaError::InvalidInput(format!(
                "mu must be finite, got {mu}"
            )));
        }
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(VelellaError::InvalidInput(format!(
                "sigma must be positive, got {sigma}"
            )));
        }
        Ok(Self { mu, sigma })
    }

    /// Standard normal distribution N(0, 1).
    pub fn standard() -> Self {
        Self {
            mu: 0.0,
            sigma: 1.0,
        }
    }

    /// Location parameter μ.
    pub fn mu(&self) -> f64 {
        self.mu
    }

    /// Scale parameter σ.
    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    /// Set the location parameter.
    pub fn set_mu(&mut self, mu: f64) {
        self.mu = mu;
    }

    /// Set the scale parameter.
    ///
    /// # Errors
    ///
    /// Returns an error if `sigma` is non-positive or non-finite.
    pub fn set_sigma(&mut self, sigma: f64) -> Result<()> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(VelellaError::InvalidInput(format!(
                "sigma must be positive, got {sigma}"
            )));
        }
        self.sigma = sigma;
        Ok(())
    }

    /// Distribution mean.
    pub fn mean(&self) -> f64 {
        self.mu
    }

    /// Distribution variance.
    pub fn variance(&self) -> f64 {
        self.sigma * self.sigma
    }

    /// Distribution standard deviation.
    pub fn std_dev(&self) -> f64 {
        self.sigma
    }

    /// Cumulative distribution function at `x`.
    pub fn cdf(&self, x: f64) -> f64 {
        let z = (x - self.mu) / self.sigma;
        0.5 * (1.0 + erf(z / core::f64::consts::SQRT_2))
    }
}

impl Distribution<f64> for NormalDistribution {
    fn pdf(&self, x: &f64) -> Result<f64> {
        if !x.is_finite() {
            return Err(VelellaError::OutOfDomain(format!(
                "density queried at non-finite value {x}"
            )));
        }
        let z = (x - self.mu) / self.sigma;
        Ok((-0.5 * z * z).exp() / (self.sigma * (2.0 * PI).sqrt()))
    }

    fn sample(&self, rng: &mut dyn UnitRng) -> f64 {
        // Box-Muller; the max guards against log(0).
        let u1 = rng.next_unit().max(1e-300);
        let u2 = rng.next_unit();
        self.mu + self.sigma * (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).sin()
    }

    fn fit(&mut self, weighted: &[(f64, f64)], eta: f64) -> Result<()> {
        check_eta(eta)?;
        let mut total = 0.0;
        for &(x, w) in weighted {
            check_weight(w)?;
            if !x.is_finite() {
                return Err(VelellaError::InvalidInput(format!(
                    "observed value {x} is not finite"
                )));
            }
            total += w;
        }
        if total <= 0.0 {
            return Ok(());
        }

        // Pass 1: weighted mean.
        let mu_new: f64 = weighted.iter().map(|&(x, w)| w * x).sum();
        // Pass 2: weighted second central moment around the new mean.
        let var_new: f64 = weighted
            .iter()
            .map(|&(x, w)| w * (x * x - mu_new * mu_new))
            .sum();
        let sigma_new = var_new.max(0.0).sqrt();

        self.mu = eta * mu_new + (1.0 - eta) * self.mu;
        self.sigma = eta * sigma_new + (1.0 - eta) * self.sigma;
        Ok(())
    }

    fn reset(&mut self) {
        self.mu = 0.0;
        self.sigma = 1.0;
    }

    fn randomize(&mut self, rng: &mut dyn UnitRng) {
        // Recenter on a draw from the current distribution and rescale by a
        // factor in [0.5, 1.5); sigma stays positive.
        self.mu = self.sample(rng);
        self.sigma *= 0.5 + rng.next_unit();
    }
}

// ===========================================================================
// Tests
// ===========================================================================
