//! Finite categorical distributions.
//!
//! [`FiniteDistribution`] is a discrete distribution over the category
//! indices `{0..n-1}`, stored as the cumulative probabilities of the first
//! `n-1` categories (the last category's mass is implied). The cumulative
//! form gives `O(log n)` sampling by binary search at the cost of `O(n)`
//! updates during fitting.
//!
//! [`IntegerRangeDistribution`] bijects a finite distribution onto the
//! integer interval `[lower..upper]` via `index = value - lower`.
//!
//! # Quick start
//!
//! ```
//! use velella_dist::{Distribution, IntegerRangeDistribution};
//!
//! let d = IntegerRangeDistribution::new(1, 5).unwrap();
//! assert!((d.pdf(&3).unwrap() - 0.2).abs() < 1e-12);
//! ```

use velella_core::{Result, UnitRng, VelellaError};

use crate::distribution::{check_eta, check_weight, Distribution, PROB_TOLERANCE};

// ---------------------------------------------------------------------------
// FiniteDistribution
// ---------------------------------------------------------------------------

/// A discrete distribution over the category indices `{0..n-1}`.
#[derive(Debug, Clone)]
pub struct FiniteDistribution {
    /// Cumulative probabilities of the first `n-1` categories, strictly
    /// non-decreasing with every entry in `[0, 1]`.
    cum: Vec<f64>,
    /// Number of categories, at least 1.
    n: usize,
}

impl FiniteDistribution {
    /// Create a uniform distribution over `n` categories.
    ///
    /// # Errors
    ///
    /// Returns an error if `n` is zero.
    pub fn uniform(n: usize) -> Result<Self> {
        if n == 0 {
            return Err(VelellaError::InvalidInput(
                "a finite distribution needs at least one category".into(),
            ));
        }
        let cum = (1..n).map(|k| k as f64 / n as f64).collect();
        Ok(Self { cum, n })
    }

    /// Create a distribution from an explicit probability vector.
    ///
    /// # Errors
    ///
    /// Returns an error if the vector is empty, contains a negative or
    /// non-finite entry, or does not sum to 1 within [`PROB_TOLERANCE`].
    pub fn from_probabilities(probs: &[f64]) -> Result<Self> {
        if probs.is_empty() {
            return Err(VelellaError::InvalidInput(
                "a finite distribution needs at least one category".into(),
            ));
        }
        let mut sum = 0.0;
        for (k, &p) in probs.iter().enumerate() {
            if !p.is_finite() || p < 0.0 {
                return Err(VelellaError::InvalidInput(format!(
                    "probability for category {k} is {p}, expected non-negative"
                )));
            }
            sum += p;
        }
        if (sum - 1.0).abs() > PROB_TOLERANCE {
            return Err(VelellaError::InvalidInput(format!(
                "probabilities sum to {sum}, expected ~1.0"
            )));
        }
        let n = probs.len();
        let mut cum = Vec::with_capacity(n - 1);
        let mut prefix = 0.0;
        for &p in &probs[..n - 1] {
            prefix += p;
            cum.push(prefix);
        }
        Ok(Self { cum, n })
    }

    /// Number of categories.
    pub fn num_categories(&self) -> usize {
        self.n
    }

    /// Per-category masses in index order.
    pub fn probabilities(&self) -> Vec<f64> {
        (0..self.n).map(|k| self.mass(k)).collect()
    }

    /// Mass of category `k` (caller guarantees `k < n`).
    fn mass(&self, k: usize) -> f64 {
        let upper = if k + 1 < self.n { self.cum[k] } else { 1.0 };
        let lower = if k == 0 { 0.0 } else { self.cum[k - 1] };
        upper - lower
    }
}

impl Distribution<usize> for FiniteDistribution {
    fn pdf(&self, x: &usize) -> Result<f64> {
        if *x >= self.n {
            return Err(VelellaError::OutOfDomain(format!(
                "category {x} outside [0, {})",
                self.n
            )));
        }
        Ok(self.mass(*x))
    }

    fn sample(&self, rng: &mut dyn UnitRng) -> usize {
        let u = rng.next_unit();
        // Smallest k with u < cum[k]; the last category absorbs the tail.
        self.cum.partition_point(|&c| c <= u)
    }

    fn fit(&mut self, weighted: &[(usize, f64)], eta: f64) -> Result<()> {
        check_eta(eta)?;
        let mut acc = vec![0.0; self.n];
        let mut total = 0.0;
        for &(k, w) in weighted {
            check_weight(w)?;
            if k >= self.n {
                return Err(VelellaError::InvalidInput(format!(
                    "observed category {k} outside [0, {})",
                    self.n
                )));
            }
            acc[k] += w;
            total += w;
        }
        if total <= 0.0 {
            return Ok(());
        }
        let mut prefix = 0.0;
        for k in 0..self.n - 1 {
            prefix += acc[k] / total;
            self.cum[k] = (1.0 - eta) * self.cum[k] + eta * prefix;
        }
        Ok(())
    }

    /// The weighted fit divides by the total mass, so it is scale-invariant.
    fn fit_unnormalized(&mut self, weighted: &[(usize, f64)], eta: f64) -> Result<()> {
        self.fit(weighted, eta)
    }

    fn reset(&mut self) {
        for k in 0..self.n - 1 {
            self.cum[k] = (k + 1) as f64 / self.n as f64;
        }
    }

    fn randomize(&mut self, rng: &mut dyn UnitRng) {
        let weights: Vec<f64> = (0..self.n).map(|_| rng.next_unit().max(1e-12)).collect();
        let total: f64 = weights.iter().sum();
        let mut prefix = 0.0;
        for k in 0..self.n - 1 {
            prefix += weights[k] / total;
            self.cum[k] = prefix;
        }
    }
}

// ---------------------------------------------------------------------------
// IntegerRangeDistribution
// ---------------------------------------------------------------------------

/// A finite distribution over the integer interval `[lower..upper]`.
///
/// Internally this is a [`FiniteDistribution`] with the bijection
/// `index = value - lower`; probabilities and iteration order are invariant
/// under shifts of `lower`.
#[derive(Debug, Clone)]
pub struct IntegerRangeDistribution {
    lower: i64,
    inner: FiniteDistribution,
}

impl IntegerRangeDistribution {
    /// Create a uniform distribution over `[lower..upper]`.
    ///
    /// # Errors
    ///
    /// Returns an error if `upper < lower`.
    pub fn new(lower: i64, upper: i64) -> Result<Self> {
        if upper < lower {
            return Err(VelellaError::InvalidInput(format!(
                "upper bound {upper} below lower bound {lower}"
            )));
        }
        let n = (upper - lower + 1) as usize;
        Ok(Self {
            lower,
            inner: FiniteDistribution::uniform(n)?,
        })
    }

    /// Create a distribution over `[lower..lower + probs.len() - 1]` from an
    /// explicit probability vector.
    ///
    /// # Errors
    ///
    /// Returns an error under the same conditions as
    /// [`FiniteDistribution::from_probabilities`].
    pub fn from_probabilities(lower: i64, probs: &[f64]) -> Result<Self> {
        Ok(Self {
            lower,
            inner: FiniteDistribution::from_probabilities(probs)?,
        })
    }

    /// Smallest value in the support.
    pub fn lower(&self) -> i64 {
        self.lower
    }

    /// Largest value in the support.
    pub fn upper(&self) -> i64 {
        self.lower + self.inner.num_categories() as i64 - 1
    }

    /// Per-value masses in value order (`lower` first).
    pub fn probabilities(&self) -> Vec<f64> {
        self.inner.probabilities()
    }

    fn index(&self, x: i64) -> Option<usize> {
        if x < self.lower || x > self.upper() {
            None
        } else {
            Some((x - self.lower) as usize)
        }
    }
}

impl Distribution<i64> for IntegerRangeDistribution {
    fn pdf(&self, x: &i64) -> Result<f64> {
        match self.index(*x) {
            Some(k) => self.inner.pdf(&k),
            None => Err(VelellaError::OutOfDomain(format!(
                "value {x} outside [{}, {}]",
                self.lower,
                self.upper()
            ))),
        }
    }

    fn sample(&self, rng: &mut dyn UnitRng) -> i64 {
        self.lower + self.inner.sample(rng) as i64
    }

    fn fit(&mut self, weighted: &[(i64, f64)], eta: f64) -> Result<()> {
        let mut mapped = Vec::with_capacity(weighted.len());
        for &(x, w) in weighted {
            match self.index(x) {
                Some(k) => mapped.push((k, w)),
                None => {
                    return Err(VelellaError::InvalidInput(format!(
                        "observed value {x} outside [{}, {}]",
                        self.lower,
                        self.upper()
                    )))
                }
            }
        }
        self.inner.fit(&mapped, eta)
    }

    fn fit_unnormalized(&mut self, weighted: &[(i64, f64)], eta: f64) -> Result<()> {
        self.fit(weighted, eta)
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn randomize(&mut self, rng: &mut dyn UnitRng) {
        self.inner.randomize(rng);
    }
}

// ===========================================================================
// Tests
// ===========================================================================
