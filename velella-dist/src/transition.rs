//! Input-conditioned transition distributions.
//!
//! A [`TransitionDistribution`] is a joint distribution over `(I, O)` pairs
//! exposed through its input-conditioned form: for every valid input there
//! is a full distribution over outputs. The finite implementations keep one
//! owned sub-distribution per input index and fit each input's slice of a
//! weighted observation stream independently.

use velella_core::{DefaultRng, Result, UnitRng, VelellaError};

use crate::distribution::{check_eta, Distribution};

/// A distribution over `(I, O)` pairs, queried and sampled per input.
pub trait TransitionDistribution<I, O: Clone> {
    /// Probability density (or mass) of output `output` under `input`.
    ///
    /// # Errors
    ///
    /// Returns [`VelellaError::OutOfDomain`] when `input` has no associated
    /// sub-distribution or `output` lies outside that sub-distribution's
    /// domain.
    fn pdf(&self, input: &I, output: &O) -> Result<f64>;

    /// Draw one output for the given input.
    ///
    /// # Errors
    ///
    /// Returns [`VelellaError::OutOfDomain`] when `input` has no associated
    /// sub-distribution.
    fn sample(&self, input: &I, rng: &mut dyn UnitRng) -> Result<O>;

    /// Draw one output using the process-wide default generator.
    fn sample_default(&self, input: &I) -> Result<O> {
        self.sample(input, &mut DefaultRng)
    }

    /// Re-estimate from a weighted stream of `(input, output)` pairs.
    ///
    /// Each input's slice of the stream is fitted into that input's
    /// sub-distribution with the slice weights renormalized locally, so the
    /// stream as a whole need not carry unit mass. Pairs whose input maps to
    /// no sub-distribution are ignored.
    fn fit(&mut self, weighted: &[((I, O), f64)], eta: f64) -> Result<()>;

    /// Identical to [`fit`](Self::fit): the per-slice renormalization makes
    /// the transition-level fit scale-invariant.
    fn fit_unnormalized(&mut self, weighted: &[((I, O), f64)], eta: f64) -> Result<()>;

    /// Reset every sub-distribution to its canonical initial state.
    fn reset(&mut self);

    /// Strongly perturb every sub-distribution.
    fn randomize(&mut self, rng: &mut dyn UnitRng);
}

// ---------------------------------------------------------------------------
// FiniteTransitionDistribution
// ---------------------------------------------------------------------------

/// A transition distribution over a finite input set, with the index↔input
/// bijection supplied as a pair of functions.
///
/// Sub-distribution `k` serves exactly the inputs that map to index `k`;
/// during fitting, slice membership is decided by structural equality with
/// the canonical input reconstructed from the index.
pub struct FiniteTransitionDistribution<I, O: Clone> {
    subs: Vec<Box<dyn Distribution<O>>>,
    input_index: Box<dyn Fn(&I) -> Option<usize>>,
    index_input: Box<dyn Fn(usize) -> I>,
}

impl<I, O: Clone> FiniteTransitionDistribution<I, O> {
    /// Create a transition distribution from owned sub-distributions and an
    /// index↔input mapping. `input_index` must return `Some(k)` with
    /// `k < subs.len()` exactly for the inputs served by sub-distribution
    /// `k`, and `index_input` must invert it.
    ///
    /// # Errors
    ///
    /// Returns an error if `subs` is empty.
    pub fn new(
        subs: Vec<Box<dyn Distribution<O>>>,
        input_index: impl Fn(&I) -> Option<usize> + 'static,
        index_input: impl Fn(usize) -> I + 'static,
    ) -> Result<Self> {
        if subs.is_empty() {
            return Err(VelellaError::InvalidInput(
                "a transition distribution needs at least one sub-distribution".into(),
            ));
        }
        Ok(Self {
            subs,
            input_index: Box::new(input_index),
            index_input: Box::new(index_input),
        })
    }

    /// Number of input slots.
    pub fn num_inputs(&self) -> usize {
        self.subs.len()
    }

    fn index_of(&self, input: &I) -> Result<usize> {
        match (self.input_index)(input) {
            Some(k) if k < self.subs.len() => Ok(k),
            _ => Err(VelellaError::OutOfDomain(
                "input outside the transition distribution's domain".into(),
            )),
        }
    }
}

impl<I: PartialEq, O: Clone> TransitionDistribution<I, O> for FiniteTransitionDistribution<I, O> {
    fn pdf(&self, input: &I, output: &O) -> Result<f64> {
        let k = self.index_of(input)?;
        self.subs[k].pdf(output)
    }

    fn sample(&self, input: &I, rng: &mut dyn UnitRng) -> Result<O> {
        let k = self.index_of(input)?;
        Ok(self.subs[k].sample(rng))
    }

    fn fit(&mut self, weighted: &[((I, O), f64)], eta: f64) -> Result<()> {
        check_eta(eta)?;
        for k in 0..self.subs.len() {
            let input_k = (self.index_input)(k);
            let slice: Vec<(O, f64)> = weighted
                .iter()
                .filter(|((x, _), _)| *x == input_k)
                .map(|((_, y), w)| (y.clone(), *w))
                .collect();
            self.subs[k].fit_unnormalized(&slice, eta)?;
        }
        Ok(())
    }

    fn fit_unnormalized(&mut self, weighted: &[((I, O), f64)], eta: f64) -> Result<()> {
        self.fit(weighted, eta)
    }

    fn reset(&mut self) {
        for sub in &mut self.subs {
            sub.reset();
        }
    }

    fn randomize(&mut self, rng: &mut dyn UnitRng) {
        for sub in &mut self.subs {
            sub.randomize(rng);
        }
    }
}

// ---------------------------------------------------------------------------
// IntegerRangeTransitionDistribution
// ---------------------------------------------------------------------------

/// A transition distribution over the integer inputs `[lower..upper]` with
/// the bijection `index = input - lower`.
pub struct IntegerRangeTransitionDistribution<O: Clone> {
    lower: i64,
    subs: Vec<Box<dyn Distribution<O>>>,
}

impl<O: Clone> IntegerRangeTransitionDistribution<O> {
    /// Create a transition distribution over
    /// `[lower..lower + subs.len() - 1]` from owned sub-distributions.
    ///
    /// # Errors
    ///
    /// Returns an error if `subs` is empty.
    pub fn new(lower: i64, subs: Vec<Box<dyn Distribution<O>>>) -> Result<Self> {
        if subs.is_empty() {
            return Err(VelellaError::InvalidInput(
                "a transition distribution needs at least one sub-distribution".into(),
            ));
        }
        Ok(Self { lower, subs })
    }

    /// Create a transition distribution over `[lower..upper]`, generating
    /// one sub-distribution per input.
    ///
    /// # Errors
    ///
    /// Returns an error if `upper < lower`.
    pub fn from_fn(
        lower: i64,
        upper: i64,
        mut generator: impl FnMut(i64) -> Box<dyn Distribution<O>>,
    ) -> Result<Self> {
        if upper < lower {
            return Err(VelellaError::InvalidInput(format!(
                "upper bound {upper} below lower bound {lower}"
            )));
        }
        let subs = (lower..=upper).map(&mut generator).collect();
        Self::new(lower, subs)
    }

    /// Smallest valid input.
    pub fn lower(&self) -> i64 {
        self.lower
    }

    /// Largest valid input.
    pub fn upper(&self) -> i64 {
        self.lower + self.subs.len() as i64 - 1
    }

    fn index(&self, input: i64) -> Option<usize> {
        if input < self.lower || input > self.upper() {
            None
        } else {
            Some((input - self.lower) as usize)
        }
    }

    fn index_of(&self, input: i64) -> Result<usize> {
        self.index(input).ok_or_else(|| {
            VelellaError::OutOfDomain(format!(
                "input {input} outside [{}, {}]",
                self.lower,
                self.upper()
            ))
        })
    }
}

impl<O: Clone> TransitionDistribution<i64, O> for IntegerRangeTransitionDistribution<O> {
    fn pdf(&self, input: &i64, output: &O) -> Result<f64> {
        let k = self.index_of(*input)?;
        self.subs[k].pdf(output)
    }

    fn sample(&self, input: &i64, rng: &mut dyn UnitRng) -> Result<O> {
        let k = self.index_of(*input)?;
        Ok(self.subs[k].sample(rng))
    }

    fn fit(&mut self, weighted: &[((i64, O), f64)], eta: f64) -> Result<()> {
        check_eta(eta)?;
        let mut slices: Vec<Vec<(O, f64)>> = vec![Vec::new(); self.subs.len()];
        for ((x, y), w) in weighted {
            if let Some(k) = self.index(*x) {
                slices[k].push((y.clone(), *w));
            }
        }
        for (sub, slice) in self.subs.iter_mut().zip(&slices) {
            sub.fit_unnormalized(slice, eta)?;
        }
        Ok(())
    }

    fn fit_unnormalized(&mut self, weighted: &[((i64, O), f64)], eta: f64) -> Result<()> {
        self.fit(weighted, eta)
    }

    fn reset(&mut self) {
        for sub in &mut self.subs {
            sub.reset();
        }
    }

    fn randomize(&mut self, rng: &mut dyn UnitRng) {
        for sub in &mut self.subs {
            sub.randomize(rng);
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
