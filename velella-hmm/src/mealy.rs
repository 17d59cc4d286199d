//! Mealy-flavor input-output hidden Markov models.
//!
//! At every time step an externally supplied input token conditions both the
//! hidden-state transition and the emission of the observable output, so an
//! observation sequence is a list of `(input, output)` pairs. The model
//! holds an initial-state vector π, one transition distribution per state
//! (over next-state indices, conditioned on the input), and one emission
//! distribution per state (over outputs, conditioned on the input).
//!
//! All computation is in linear probability space; forward and backward
//! variables are produced lazily, one time step per request.
//!
//! # Quick start
//!
//! ```
//! use velella_dist::{
//!     Distribution, FiniteDistribution, IntegerRangeDistribution,
//!     IntegerRangeTransitionDistribution, TransitionDistribution,
//! };
//! use velella_hmm::MealyIohmm;
//!
//! // Two hidden states driven by inputs {1, 2}; outputs are {0, 1}.
//! let a_rows = [[0.5, 0.5], [0.3, 0.7]];
//! let b_rows = [[0.3, 0.7], [0.8, 0.2]];
//!
//! let transitions: Vec<Box<dyn TransitionDistribution<i64, usize>>> = a_rows
//!     .iter()
//!     .map(|row| {
//!         Box::new(
//!             IntegerRangeTransitionDistribution::from_fn(1, 2, |_| {
//!                 Box::new(FiniteDistribution::from_probabilities(row).unwrap())
//!                     as Box<dyn Distribution<usize>>
//!             })
//!             .unwrap(),
//!         ) as Box<dyn TransitionDistribution<i64, usize>>
//!     })
//!     .collect();
//! let emissions: Vec<Box<dyn TransitionDistribution<i64, i64>>> = b_rows
//!     .iter()
//!     .map(|row| {
//!         Box::new(
//!             IntegerRangeTransitionDistribution::from_fn(1, 2, |_| {
//!                 Box::new(IntegerRangeDistribution::from_probabilities(0, row).unwrap())
//!                     as Box<dyn Distribution<i64>>
//!             })
//!             .unwrap(),
//!         ) as Box<dyn TransitionDistribution<i64, i64>>
//!     })
//!     .collect();
//!
//! let model = MealyIohmm::new(vec![0.2, 0.8], transitions, emissions).unwrap();
//! let p = model.probability(&[(1, 0)]).unwrap();
//! assert!((p - 0.70).abs() < 1e-9);
//! ```

use velella_core::{DefaultRng, Result, UnitRng, VelellaError};
use velella_dist::{TransitionDistribution, PROB_TOLERANCE};

/// Summary of one Baum-Welch iteration.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TrainStats {
    /// Joint probability of the observation sequence under the parameters
    /// the iteration started from.
    pub probability: f64,
    /// Time steps skipped because they carried zero posterior mass.
    pub degenerate_steps: usize,
}

/// Validate a blending coefficient.
fn check_eta(eta: f64) -> Result<()> {
    if !(0.0..=1.0).contains(&eta) {
        return Err(VelellaError::InvalidInput(format!(
            "blending coefficient eta = {eta} must be in [0, 1]"
        )));
    }
    Ok(())
}

/// A Mealy-flavor input-output hidden Markov model over inputs `I` and
/// outputs `O`.
///
/// The model owns its parameters; the only mutating operations are
/// [`train`](Self::train) (and its variants), [`reset_pi`](Self::reset_pi),
/// and [`randomize`](Self::randomize).
pub struct MealyIohmm<I, O: Clone> {
    /// Initial-state probabilities, length `N`.
    pi: Vec<f64>,
    /// Per-state transition distributions over next-state indices.
    transitions: Vec<Box<dyn TransitionDistribution<I, usize>>>,
    /// Per-state emission distributions over outputs.
    emissions: Vec<Box<dyn TransitionDistribution<I, O>>>,
}

impl<I, O: Clone> MealyIohmm<I, O> {
    /// Create a model from an initial-state vector and per-state transition
    /// and emission distributions. Entries beyond the state count are
    /// discarded.
    ///
    /// # Errors
    ///
    /// Returns an error if `pi` is empty, contains a negative or non-finite
    /// entry, or does not sum to 1 within [`PROB_TOLERANCE`], or if fewer
    /// transition or emission distributions than states are supplied.
    pub fn new(
        pi: Vec<f64>,
        mut transitions: Vec<Box<dyn TransitionDistribution<I, usize>>>,
        mut emissions: Vec<Box<dyn TransitionDistribution<I, O>>>,
    ) -> Result<Self> {
        let n = pi.len();
        if n == 0 {
            return Err(VelellaError::InvalidInput(
                "a model needs at least one hidden state".into(),
            ));
        }
        for (i, &p) in pi.iter().enumerate() {
            if !p.is_finite() || p < 0.0 {
                return Err(VelellaError::InvalidInput(format!(
                    "initial probability for state {i} is {p}, expected non-negative"
                )));
            }
        }
        let sum: f64 = pi.iter().sum();
        if (sum - 1.0).abs() > PROB_TOLERANCE {
            return Err(VelellaError::InvalidInput(format!(
                "initial probabilities sum to {sum}, expected ~1.0"
            )));
        }
        if transitions.len() < n {
            return Err(VelellaError::InvalidInput(format!(
                "{} transition distributions for {n} states",
                transitions.len()
            )));
        }
        if emissions.len() < n {
            return Err(VelellaError::InvalidInput(format!(
                "{} emission distributions for {n} states",
                emissions.len()
            )));
        }
        transitions.truncate(n);
        emissions.truncate(n);
        Ok(Self {
            pi,
            transitions,
            emissions,
        })
    }

    /// Create a model generating the per-state distributions from the state
    /// index.
    ///
    /// # Errors
    ///
    /// Returns an error under the same conditions as [`new`](Self::new).
    pub fn from_fn(
        pi: Vec<f64>,
        mut transition_for: impl FnMut(usize) -> Box<dyn TransitionDistribution<I, usize>>,
        mut emission_for: impl FnMut(usize) -> Box<dyn TransitionDistribution<I, O>>,
    ) -> Result<Self> {
        let n = pi.len();
        let transitions = (0..n).map(&mut transition_for).collect();
        let emissions = (0..n).map(&mut emission_for).collect();
        Self::new(pi, transitions, emissions)
    }

    /// Number of hidden states.
    pub fn num_states(&self) -> usize {
        self.pi.len()
    }

    fn check_state(&self, i: usize) -> Result<()> {
        if i >= self.pi.len() {
            return Err(VelellaError::OutOfDomain(format!(
                "state {i} outside [0, {})",
                self.pi.len()
            )));
        }
        Ok(())
    }

    /// Initial probability of state `i`.
    ///
    /// # Errors
    ///
    /// Returns an error if `i` is not a valid state index.
    pub fn pi(&self, i: usize) -> Result<f64> {
        self.check_state(i)?;
        Ok(self.pi[i])
    }

    /// Probability of the hidden transition `i -> j` under input `x`.
    ///
    /// # Errors
    ///
    /// Returns an error if `i` or `j` is not a valid state index or `x` is
    /// outside the transition distribution's domain.
    pub fn a(&self, x: &I, i: usize, j: usize) -> Result<f64> {
        self.check_state(i)?;
        self.check_state(j)?;
        self.transitions[i].pdf(x, &j)
    }

    /// Probability of emitting `y` from state `i` under input `x`.
    ///
    /// # Errors
    ///
    /// Returns an error if `i` is not a valid state index or `(x, y)` is
    /// outside the emission distribution's domain.
    pub fn b(&self, x: &I, i: usize, y: &O) -> Result<f64> {
        self.check_state(i)?;
        self.emissions[i].pdf(x, y)
    }

    /// Restore the uniform initial-state vector.
    pub fn reset_pi(&mut self) {
        let n = self.pi.len();
        for p in &mut self.pi {
            *p = 1.0 / n as f64;
        }
    }

    /// Strongly perturb π and every transition and emission distribution,
    /// e.g. to escape a degenerate model. The model remains valid.
    pub fn randomize(&mut self, rng: &mut dyn UnitRng) {
        let weights: Vec<f64> = self.pi.iter().map(|_| rng.next_unit().max(1e-12)).collect();
        let total: f64 = weights.iter().sum();
        for (p, w) in self.pi.iter_mut().zip(&weights) {
            *p = w / total;
        }
        for t in &mut self.transitions {
            t.randomize(rng);
        }
        for e in &mut self.emissions {
            e.randomize(rng);
        }
    }

    fn sample_initial_state(&self, rng: &mut dyn UnitRng) -> usize {
        let u = rng.next_unit();
        let mut cumulative = 0.0;
        for (i, &p) in self.pi.iter().enumerate() {
            cumulative += p;
            if u < cumulative {
                return i;
            }
        }
        self.pi.len() - 1
    }

    /// Generate a hidden-state path and an output sequence for the given
    /// inputs: the start state is drawn from π, then each step emits through
    /// the current state's emission distribution and moves through its
    /// transition distribution, both conditioned on that step's input.
    ///
    /// # Errors
    ///
    /// Returns an error if an input is outside a distribution's domain.
    pub fn sample_with_states(
        &self,
        inputs: &[I],
        rng: &mut dyn UnitRng,
    ) -> Result<(Vec<usize>, Vec<O>)> {
        let mut states = Vec::with_capacity(inputs.len());
        let mut outputs = Vec::with_capacity(inputs.len());
        if inputs.is_empty() {
            return Ok((states, outputs));
        }
        let mut state = self.sample_initial_state(rng);
        for x in inputs {
            states.push(state);
            outputs.push(self.emissions[state].sample(x, rng)?);
            state = self.transitions[state].sample(x, rng)?;
        }
        Ok((states, outputs))
    }

    /// Generate an output sequence for the given inputs.
    ///
    /// # Errors
    ///
    /// Returns an error if an input is outside a distribution's domain.
    pub fn sample(&self, inputs: &[I], rng: &mut dyn UnitRng) -> Result<Vec<O>> {
        self.sample_with_states(inputs, rng).map(|(_, o)| o)
    }

    /// Generate an output sequence using the process-wide default generator.
    pub fn sample_default(&self, inputs: &[I]) -> Result<Vec<O>> {
        self.sample(inputs, &mut DefaultRng)
    }

    /// Lazy forward variables: element `t` is the length-`N` vector
    /// `alpha_t[i] = P(o_0..o_t, s_t = i)`.
    ///
    /// The sequence is produced one time step per request and supports
    /// infinite input streams. A domain error at step `t` surfaces at that
    /// element and ends the sequence.
    pub fn alphas<It>(&self, observations: It) -> Alphas<'_, I, O, It::IntoIter>
    where
        It: IntoIterator<Item = (I, O)>,
    {
        Alphas {
            model: self,
            observations: observations.into_iter(),
            prev: None,
            failed: false,
        }
    }

    /// Lazy backward variables in time-decreasing order, driven by an
    /// already-reversed observation stream (`o_{T-1}` first): the first
    /// element is `beta_{T-1}` (all ones), the `k`-th is `beta_{T-1-k}`.
    ///
    /// A domain error at a step surfaces at that element and ends the
    /// sequence.
    pub fn betas_reverse<It>(&self, reversed: It) -> BetasReverse<'_, I, O, It::IntoIter>
    where
        It: IntoIterator<Item = (I, O)>,
    {
        BetasReverse {
            model: self,
            reversed: reversed.into_iter(),
            ahead: None,
            failed: false,
        }
    }

    /// `alpha_0[i] = pi_i * b_i(x_0, y_0)`.
    fn alpha_init(&self, x: &I, y: &O) -> Result<Vec<f64>> {
        let n = self.num_states();
        let mut alpha = vec![0.0; n];
        for i in 0..n {
            alpha[i] = self.pi[i] * self.emissions[i].pdf(x, y)?;
        }
        Ok(alpha)
    }

    /// `alpha_{t+1}[j] = (sum_i alpha_t[i] * a_ij(x_t)) * b_j(x_{t+1}, y_{t+1})`.
    fn alpha_step(&self, prev: &[f64], prev_x: &I, x: &I, y: &O) -> Result<Vec<f64>> {
        let n = self.num_states();
        let mut alpha = vec![0.0; n];
        for j in 0..n {
            let mut acc = 0.0;
            for i in 0..n {
                acc += prev[i] * self.transitions[i].pdf(prev_x, &j)?;
            }
            alpha[j] = acc * self.emissions[j].pdf(x, y)?;
        }
        Ok(alpha)
    }

    /// `beta_t[i] = sum_j a_ij(x_t) * b_j(x_{t+1}, y_{t+1}) * beta_{t+1}[j]`.
    fn beta_step(
        &self,
        x: &I,
        next_x: &I,
        next_y: &O,
        next_beta: &[f64],
    ) -> Result<Vec<f64>> {
        let n = self.num_states();
        let mut emit = vec![0.0; n];
        for j in 0..n {
            emit[j] = self.emissions[j].pdf(next_x, next_y)?;
        }
        let mut beta = vec![0.0; n];
        for i in 0..n {
            let mut acc = 0.0;
            for j in 0..n {
                acc += self.transitions[i].pdf(x, &j)? * emit[j] * next_beta[j];
            }
            beta[i] = acc;
        }
        Ok(beta)
    }
}

impl<I: Clone, O: Clone> MealyIohmm<I, O> {
    /// Backward variables in time-increasing order for a finite observation
    /// sequence; element `t` is `beta_t`.
    ///
    /// # Errors
    ///
    /// Returns an error if an observation is outside a distribution's domain.
    pub fn betas(&self, observations: &[(I, O)]) -> Result<Vec<Vec<f64>>> {
        let mut rows: Vec<Vec<f64>> = self
            .betas_reverse(observations.iter().rev().cloned())
            .collect::<Result<_>>()?;
        rows.reverse();
        Ok(rows)
    }

    /// Joint probability of a finite observation sequence:
    /// `P(o) = sum_i alpha_{T-1}[i]`. The empty sequence has probability 1.
    ///
    /// # Errors
    ///
    /// Returns an error if an observation is outside a distribution's domain.
    pub fn probability(&self, observations: &[(I, O)]) -> Result<f64> {
        let mut last: Option<Vec<f64>> = None;
        for alpha in self.alphas(observations.iter().cloned()) {
            last = Some(alpha?);
        }
        Ok(match last {
            Some(alpha) => alpha.iter().sum(),
            None => 1.0,
        })
    }

    /// One Baum-Welch re-estimation iteration.
    ///
    /// Computes the forward and backward variables, then blends the
    /// posterior re-estimates into π and into every state's transition and
    /// emission distribution with coefficient `eta`. Time steps whose
    /// posterior normalizer is zero contribute nothing and are counted in
    /// the returned [`TrainStats`]. An empty sequence leaves the model
    /// unchanged.
    ///
    /// All posterior weights are computed before any parameter is touched,
    /// so a failed call leaves the model exactly as it was.
    ///
    /// # Errors
    ///
    /// Returns an error if `eta` is outside `[0, 1]` or an observation is
    /// outside a distribution's domain.
    pub fn train(&mut self, observations: &[(I, O)], eta: f64) -> Result<TrainStats> {
        check_eta(eta)?;
        let t_len = observations.len();
        if t_len == 0 {
            return Ok(TrainStats {
                probability: 1.0,
                degenerate_steps: 0,
            });
        }
        let n = self.num_states();

        let alphas: Vec<Vec<f64>> = self
            .alphas(observations.iter().cloned())
            .collect::<Result<_>>()?;
        // betas_rev[k] is beta at time t_len - 1 - k.
        let betas_rev: Vec<Vec<f64>> = self
            .betas_reverse(observations.iter().rev().cloned())
            .collect::<Result<_>>()?;

        // Posterior normalizer per time step; equal to P(o) in exact
        // arithmetic, zero when the model cannot explain the step.
        let mut norms = vec![0.0; t_len];
        for t in 0..t_len {
            norms[t] = (0..n)
                .map(|i| alphas[t][i] * betas_rev[t_len - 1 - t][i])
                .sum();
        }
        let degenerate_steps = norms.iter().filter(|&&s| s == 0.0).count();
        let probability = norms[t_len - 1];

        // Emission densities b_j(x_t, y_t), reused by the transition weights.
        let mut emit = vec![vec![0.0; n]; t_len];
        for (t, (x, y)) in observations.iter().enumerate() {
            for j in 0..n {
                emit[t][j] = self.emissions[j].pdf(x, y)?;
            }
        }

        // Weighted pseudo-observation streams, assembled in full before any
        // parameter update.
        let mut transition_streams: Vec<Vec<((I, usize), f64)>> =
            (0..n).map(|_| Vec::new()).collect();
        for t in 0..t_len - 1 {
            if norms[t] == 0.0 {
                continue;
            }
            let x = &observations[t].0;
            let next_beta = &betas_rev[t_len - 2 - t];
            for i in 0..n {
                for j in 0..n {
                    let w = alphas[t][i] * self.transitions[i].pdf(x, &j)? * emit[t + 1][j]
                        / norms[t]
                        * next_beta[j];
                    transition_streams[i].push(((x.clone(), j), w));
                }
            }
        }

        let mut emission_streams: Vec<Vec<((I, O), f64)>> = (0..n).map(|_| Vec::new()).collect();
        for (t, (x, y)) in observations.iter().enumerate() {
            let beta_t = &betas_rev[t_len - 1 - t];
            for i in 0..n {
                emission_streams[i].push(((x.clone(), y.clone()), alphas[t][i] * beta_t[i]));
            }
        }

        if norms[0] > 0.0 {
            for i in 0..n {
                let gamma0 = alphas[0][i] * betas_rev[t_len - 1][i] / norms[0];
                self.pi[i] = (1.0 - eta) * self.pi[i] + eta * gamma0;
            }
        }
        for (transition, stream) in self.transitions.iter_mut().zip(&transition_streams) {
            transition.fit_unnormalized(stream, eta)?;
        }
        for (emission, stream) in self.emissions.iter_mut().zip(&emission_streams) {
            emission.fit_unnormalized(stream, eta)?;
        }

        Ok(TrainStats {
            probability,
            degenerate_steps,
        })
    }

    /// Apply [`train`](Self::train) to each sequence in turn with the same
    /// `eta`, returning one [`TrainStats`] per sequence. No normalization is
    /// performed across sequences.
    ///
    /// # Errors
    ///
    /// Returns the first error encountered; earlier sequences' updates
    /// remain applied.
    pub fn train_many<S: AsRef<[(I, O)]>>(
        &mut self,
        sequences: &[S],
        eta: f64,
    ) -> Result<Vec<TrainStats>> {
        sequences
            .iter()
            .map(|s| self.train(s.as_ref(), eta))
            .collect()
    }

    /// Repeat [`train`](Self::train) until the sequence probability improves
    /// by less than `tolerance` or `max_iter` iterations have run. Returns
    /// the last iteration's statistics.
    ///
    /// # Errors
    ///
    /// Returns [`VelellaError::Degenerate`] if an iteration skips every
    /// time step (no parameter update is possible), or any error `train`
    /// reports.
    pub fn train_iterated(
        &mut self,
        observations: &[(I, O)],
        eta: f64,
        max_iter: usize,
        tolerance: f64,
    ) -> Result<TrainStats> {
        let mut stats = TrainStats {
            probability: self.probability(observations)?,
            degenerate_steps: 0,
        };
        let mut prev = f64::NEG_INFINITY;
        for _ in 0..max_iter {
            stats = self.train(observations, eta)?;
            if !observations.is_empty() && stats.degenerate_steps == observations.len() {
                return Err(VelellaError::Degenerate(format!(
                    "every time step of a length-{} sequence carried zero posterior mass",
                    observations.len()
                )));
            }
            if (stats.probability - prev).abs() < tolerance {
                break;
            }
            prev = stats.probability;
        }
        Ok(stats)
    }
}

// ---------------------------------------------------------------------------
// Lazy forward/backward iterators
// ---------------------------------------------------------------------------

/// Lazy producer of forward variables; see [`MealyIohmm::alphas`].
pub struct Alphas<'a, I, O: Clone, It> {
    model: &'a MealyIohmm<I, O>,
    observations: It,
    prev: Option<(Vec<f64>, I)>,
    failed: bool,
}

impl<I, O: Clone, It> Iterator for Alphas<'_, I, O, It>
where
    It: Iterator<Item = (I, O)>,
{
    type Item = Result<Vec<f64>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let (x, y) = self.observations.next()?;
        let computed = match &self.prev {
            None => self.model.alpha_init(&x, &y),
            Some((prev, prev_x)) => self.model.alpha_step(prev, prev_x, &x, &y),
        };
        match computed {
            Ok(alpha) => {
                self.prev = Some((alpha.clone(), x));
                Some(Ok(alpha))
            }
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

/// Lazy producer of backward variables in time-decreasing order; see
/// [`MealyIohmm::betas_reverse`].
pub struct BetasReverse<'a, I, O: Clone, It> {
    model: &'a MealyIohmm<I, O>,
    reversed: It,
    /// Observation and backward vector for time `t + 1`.
    ahead: Option<((I, O), Vec<f64>)>,
    failed: bool,
}

impl<I, O: Clone, It> Iterator for BetasReverse<'_, I, O, It>
where
    It: Iterator<Item = (I, O)>,
{
    type Item = Result<Vec<f64>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let (x, y) = self.reversed.next()?;
        match self.ahead.take() {
            None => {
                let terminal = vec![1.0; self.model.num_states()];
                self.ahead = Some(((x, y), terminal.clone()));
                Some(Ok(terminal))
            }
            Some(((next_x, next_y), next_beta)) => {
                match self.model.beta_step(&x, &next_x, &next_y, &next_beta) {
                    Ok(beta) => {
                        self.ahead = Some(((x, y), beta.clone()));
                        Some(Ok(beta))
                    }
                    Err(e) => {
                        self.failed = true;
                        Some(Err(e))
                    }
                }
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use velella_core::Xorshift64;
    use velella_dist::{
        Distribution, FiniteDistribution, IntegerRangeDistribution,
        IntegerRangeTransitionDistribution, NormalDistribution,
    };

    const TOL: f64 = 1e-6;

    fn state_transition(row: [f64; 2]) -> Box<dyn TransitionDistribution<i64, usize>> {
        Box::new(
            IntegerRangeTransitionDistribution::from_fn(1, 2, |_| {
                Box::new(FiniteDistribution::from_probabilities(&row).unwrap())
                    as Box<dyn Distribution<usize>>
            })
            .unwrap(),
        )
    }

    fn output_emission(row: [f64; 2]) -> Box<dyn TransitionDistribution<i64, i64>> {
        Box::new(
            IntegerRangeTransitionDistribution::from_fn(1, 2, |_| {
                Box::new(IntegerRangeDistribution::from_probabilities(0, &row).unwrap())
                    as Box<dyn Distribution<i64>>
            })
            .unwrap(),
        )
    }

    /// Two-state model on inputs {1, 2} and outputs {0, 1}.
    fn model() -> MealyIohmm<i64, i64> {
        MealyIohmm::new(
            vec![0.2, 0.8],
            vec![state_transition([0.5, 0.5]), state_transition([0.3, 0.7])],
            vec![output_emission([0.3, 0.7]), output_emission([0.8, 0.2])],
        )
        .unwrap()
    }

    // ── Construction ───────────────────────────────────────────────────

    #[test]
    fn construction_validates_pi() {
        let err = MealyIohmm::<i64, i64>::new(vec![], vec![], vec![]);
        assert!(matches!(err, Err(VelellaError::InvalidInput(_))));

        let err = MealyIohmm::new(
            vec![0.5, 0.6],
            vec![state_transition([0.5, 0.5]), state_transition([0.5, 0.5])],
            vec![output_emission([0.5, 0.5]), output_emission([0.5, 0.5])],
        );
        assert!(err.is_err());

        let err = MealyIohmm::new(
            vec![-0.2, 1.2],
            vec![state_transition([0.5, 0.5]), state_transition([0.5, 0.5])],
            vec![output_emission([0.5, 0.5]), output_emission([0.5, 0.5])],
        );
        assert!(err.is_err());
    }

    #[test]
    fn construction_rejects_short_distribution_lists() {
        let err = MealyIohmm::new(
            vec![0.5, 0.5],
            vec![state_transition([0.5, 0.5])],
            vec![output_emission([0.5, 0.5]), output_emission([0.5, 0.5])],
        );
        assert!(err.is_err());

        let err = MealyIohmm::new(
            vec![0.5, 0.5],
            vec![state_transition([0.5, 0.5]), state_transition([0.5, 0.5])],
            vec![output_emission([0.5, 0.5])],
        );
        assert!(err.is_err());
    }

    #[test]
    fn construction_discards_extra_entries() {
        let m = MealyIohmm::new(
            vec![0.5, 0.5],
            vec![
                state_transition([0.5, 0.5]),
                state_transition([0.5, 0.5]),
                state_transition([0.9, 0.1]),
            ],
            vec![
                output_emission([0.5, 0.5]),
                output_emission([0.5, 0.5]),
                output_emission([0.9, 0.1]),
            ],
        )
        .unwrap();
        assert_eq!(m.num_states(), 2);
        assert!(m.a(&1, 2, 0).is_err());
    }

    #[test]
    fn from_fn_generates_per_state() {
        let m = MealyIohmm::from_fn(
            vec![0.25; 4],
            |_| {
                Box::new(
                    IntegerRangeTransitionDistribution::from_fn(0, 0, |_| {
                        Box::new(FiniteDistribution::uniform(4).unwrap())
                            as Box<dyn Distribution<usize>>
                    })
                    .unwrap(),
                ) as Box<dyn TransitionDistribution<i64, usize>>
            },
            |i| {
                let mut probs = [0.0; 4];
                probs[i] = 1.0;
                Box::new(
                    IntegerRangeTransitionDistribution::from_fn(0, 0, move |_| {
                        Box::new(IntegerRangeDistribution::from_probabilities(0, &probs).unwrap())
                            as Box<dyn Distribution<i64>>
                    })
                    .unwrap(),
                ) as Box<dyn TransitionDistribution<i64, i64>>
            },
        )
        .unwrap();
        assert_eq!(m.num_states(), 4);
        assert!((m.b(&0, 2, &2).unwrap() - 1.0).abs() < TOL);
        assert!(m.b(&0, 2, &1).unwrap().abs() < TOL);
    }

    // ── Accessors ──────────────────────────────────────────────────────

    #[test]
    fn parameter_accessors() {
        let m = model();
        assert_eq!(m.num_states(), 2);
        assert!((m.pi(0).unwrap() - 0.2).abs() < TOL);
        assert!((m.pi(1).unwrap() - 0.8).abs() < TOL);
        assert!(m.pi(2).is_err());

        assert!((m.a(&1, 0, 1).unwrap() - 0.5).abs() < TOL);
        assert!((m.a(&2, 1, 0).unwrap() - 0.3).abs() < TOL);
        assert!(m.a(&3, 0, 0).is_err());
        assert!(m.a(&1, 5, 0).is_err());

        assert!((m.b(&1, 0, &1).unwrap() - 0.7).abs() < TOL);
        assert!((m.b(&1, 1, &0).unwrap() - 0.8).abs() < TOL);
        assert!(m.b(&1, 0, &7).is_err());
    }

    #[test]
    fn transition_rows_are_stochastic() {
        let m = model();
        for x in 1..=2 {
            for i in 0..2 {
                let sum: f64 = (0..2).map(|j| m.a(&x, i, j).unwrap()).sum();
                assert!((sum - 1.0).abs() < TOL);
            }
        }
        let pi_sum = m.pi(0).unwrap() + m.pi(1).unwrap();
        assert!((pi_sum - 1.0).abs() < TOL);
    }

    // ── Probability ────────────────────────────────────────────────────

    #[test]
    fn single_step_probabilities() {
        let m = model();
        assert!((m.probability(&[(1, 0)]).unwrap() - 0.70).abs() < TOL);
        assert!((m.probability(&[(1, 1)]).unwrap() - 0.30).abs() < TOL);
    }

    #[test]
    fn two_step_probabilities() {
        let m = model();
        assert!((m.probability(&[(1, 0), (1, 0)]).unwrap() - 0.449).abs() < TOL);
        assert!((m.probability(&[(1, 0), (1, 1)]).unwrap() - 0.251).abs() < TOL);
        assert!((m.probability(&[(1, 1), (1, 0)]).unwrap() - 0.181).abs() < TOL);
        assert!((m.probability(&[(1, 1), (1, 1)]).unwrap() - 0.119).abs() < TOL);
    }

    #[test]
    fn empty_sequence_has_probability_one() {
        let m = model();
        assert!((m.probability(&[]).unwrap() - 1.0).abs() < TOL);
    }

    #[test]
    fn probability_propagates_domain_errors() {
        let m = model();
        assert!(matches!(
            m.probability(&[(9, 0)]),
            Err(VelellaError::OutOfDomain(_))
        ));
        assert!(m.probability(&[(1, 9)]).is_err());
    }

    // ── Forward variables ──────────────────────────────────────────────

    #[test]
    fn alpha_values() {
        let m = model();
        let alphas: Vec<Vec<f64>> = m
            .alphas([(1, 0), (1, 0)])
            .collect::<Result<_>>()
            .unwrap();
        assert!((alphas[0][0] - 0.06).abs() < TOL);
        assert!((alphas[0][1] - 0.64).abs() < TOL);
        assert!((alphas[1][0] - 0.0666).abs() < TOL);
        assert!((alphas[1][1] - 0.3824).abs() < TOL);

        let alphas: Vec<Vec<f64>> = m
            .alphas([(1, 0), (1, 1)])
            .collect::<Result<_>>()
            .unwrap();
        assert!((alphas[1][0] - 0.1554).abs() < TOL);
        assert!((alphas[1][1] - 0.0956).abs() < TOL);
    }

    #[test]
    fn alphas_support_infinite_streams() {
        let m = model();
        let alphas: Vec<Vec<f64>> = m
            .alphas(std::iter::repeat((1i64, 0i64)))
            .take(3)
            .collect::<Result<_>>()
            .unwrap();
        assert_eq!(alphas.len(), 3);
        assert!((alphas[0][0] - 0.06).abs() < TOL);
    }

    #[test]
    fn alphas_surface_domain_error_at_offending_step() {
        let m = model();
        let mut it = m.alphas([(1, 0), (9, 0), (1, 0)]);
        assert!(it.next().unwrap().is_ok());
        assert!(it.next().unwrap().is_err());
        assert!(it.next().is_none());
    }

    // ── Backward variables ─────────────────────────────────────────────

    #[test]
    fn beta_values() {
        let m = model();
        let betas = m.betas(&[(1, 0), (1, 0)]).unwrap();
        assert!((betas[0][0] - 0.55).abs() < TOL);
        assert!((betas[0][1] - 0.65).abs() < TOL);
        assert!((betas[1][0] - 1.0).abs() < TOL);
        assert!((betas[1][1] - 1.0).abs() < TOL);

        let betas = m.betas(&[(1, 0), (1, 1)]).unwrap();
        assert!((betas[0][0] - 0.45).abs() < TOL);
        assert!((betas[0][1] - 0.35).abs() < TOL);
    }

    #[test]
    fn betas_reverse_yields_terminal_first() {
        let m = model();
        let obs = [(1, 0), (1, 0)];
        let rows: Vec<Vec<f64>> = m
            .betas_reverse(obs.iter().rev().cloned())
            .collect::<Result<_>>()
            .unwrap();
        assert!((rows[0][0] - 1.0).abs() < TOL);
        assert!((rows[1][0] - 0.55).abs() < TOL);
    }

    #[test]
    fn betas_empty_sequence() {
        let m = model();
        assert!(m.betas(&[]).unwrap().is_empty());
    }

    #[test]
    fn forward_backward_consistency() {
        let m = model();
        let obs = [(1, 0), (1, 1), (2, 0), (1, 1)];
        let alphas: Vec<Vec<f64>> = m.alphas(obs.iter().cloned()).collect::<Result<_>>().unwrap();
        let betas = m.betas(&obs).unwrap();
        let p = m.probability(&obs).unwrap();
        for t in 0..obs.len() {
            let z: f64 = (0..2).map(|i| alphas[t][i] * betas[t][i]).sum();
            assert!((z - p).abs() < TOL, "t = {t}: {z} vs {p}");
        }
    }

    // ── Training ───────────────────────────────────────────────────────

    #[test]
    fn train_preserves_stochastic_invariants() {
        let mut m = model();
        let obs = [(1, 0), (1, 1), (1, 0), (1, 1)];

        // Fresh-model forward variables, before any parameter moves.
        let alphas: Vec<Vec<f64>> = m.alphas(obs.iter().cloned()).collect::<Result<_>>().unwrap();
        assert!((alphas[0][0] - 0.06).abs() < TOL);
        assert!((alphas[0][1] - 0.64).abs() < TOL);

        let stats = m.train(&obs, 1.0).unwrap();
        assert_eq!(stats.degenerate_steps, 0);
        assert!(stats.probability > 0.0);

        let pi_sum = m.pi(0).unwrap() + m.pi(1).unwrap();
        assert!((pi_sum - 1.0).abs() < TOL);
        for x in 1..=2 {
            for i in 0..2 {
                let a_sum: f64 = (0..2).map(|j| m.a(&x, i, j).unwrap()).sum();
                assert!((a_sum - 1.0).abs() < TOL, "a row {i} input {x}");
                let b_sum: f64 = (0..=1).map(|y| m.b(&x, i, &y).unwrap()).sum();
                assert!((b_sum - 1.0).abs() < TOL, "b row {i} input {x}");
            }
        }
    }

    #[test]
    fn train_improves_sequence_probability() {
        let mut m = model();
        let obs = [(1, 0), (1, 1), (1, 0), (1, 1), (1, 0), (1, 0)];
        let before = m.probability(&obs).unwrap();
        m.train(&obs, 1.0).unwrap();
        let after = m.probability(&obs).unwrap();
        assert!(
            after >= before - 1e-12,
            "probability decreased: {before} -> {after}"
        );
    }

    #[test]
    fn train_reports_starting_probability() {
        let mut m = model();
        let obs = [(1, 0), (1, 1)];
        let expected = m.probability(&obs).unwrap();
        let stats = m.train(&obs, 0.5).unwrap();
        assert!((stats.probability - expected).abs() < TOL);
    }

    #[test]
    fn train_with_eta_zero_is_noop() {
        let mut m = model();
        let obs = [(1, 0), (1, 1), (1, 0)];
        m.train(&obs, 0.0).unwrap();
        assert!((m.pi(0).unwrap() - 0.2).abs() < 1e-12);
        assert!((m.a(&1, 0, 0).unwrap() - 0.5).abs() < 1e-12);
        assert!((m.b(&1, 1, &0).unwrap() - 0.8).abs() < 1e-12);
    }

    #[test]
    fn train_empty_sequence_is_noop() {
        let mut m = model();
        let stats = m.train(&[], 1.0).unwrap();
        assert!((stats.probability - 1.0).abs() < TOL);
        assert_eq!(stats.degenerate_steps, 0);
        assert!((m.pi(0).unwrap() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn train_rejects_bad_eta() {
        let mut m = model();
        assert!(m.train(&[(1, 0)], 1.5).is_err());
        assert!(m.train(&[(1, 0)], f64::NAN).is_err());
        // Model untouched after the failed call.
        assert!((m.pi(0).unwrap() - 0.2).abs() < 1e-12);
    }

    #[test]
    fn train_single_observation() {
        let mut m = model();
        let stats = m.train(&[(1, 0)], 1.0).unwrap();
        assert!((stats.probability - 0.70).abs() < TOL);
        // With one step, pi becomes the emission posterior.
        assert!((m.pi(0).unwrap() - 0.06 / 0.70).abs() < TOL);
        assert!((m.pi(1).unwrap() - 0.64 / 0.70).abs() < TOL);
        // No transition evidence: rows unchanged.
        assert!((m.a(&1, 0, 0).unwrap() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn train_many_applies_sequentially() {
        let mut m = model();
        let seqs = [vec![(1, 0), (1, 1)], vec![(1, 1), (1, 0)]];
        let stats = m.train_many(&seqs, 0.5).unwrap();
        assert_eq!(stats.len(), 2);
        let pi_sum = m.pi(0).unwrap() + m.pi(1).unwrap();
        assert!((pi_sum - 1.0).abs() < TOL);
    }

    #[test]
    fn train_iterated_converges() {
        let mut m = model();
        let obs = [(1, 0), (1, 1), (1, 0), (1, 0), (2, 1), (1, 0)];
        let before = m.probability(&obs).unwrap();
        let stats = m.train_iterated(&obs, 1.0, 50, 1e-10).unwrap();
        assert!(stats.probability >= before - 1e-12);
        // Converged parameters still form valid distributions.
        let pi_sum = m.pi(0).unwrap() + m.pi(1).unwrap();
        assert!((pi_sum - 1.0).abs() < TOL);
    }

    #[test]
    fn train_skips_degenerate_steps() {
        // State 0 can only emit 0, state 1 can only emit 1, and pi is
        // concentrated on state 0 with an absorbing transition; observing a
        // 1 is impossible, so every step carries zero posterior mass.
        let mut m = MealyIohmm::new(
            vec![1.0, 0.0],
            vec![state_transition([1.0, 0.0]), state_transition([1.0, 0.0])],
            vec![output_emission([1.0, 0.0]), output_emission([0.0, 1.0])],
        )
        .unwrap();
        let stats = m.train(&[(1, 1)], 1.0).unwrap();
        assert_eq!(stats.degenerate_steps, 1);
        assert!(stats.probability.abs() < TOL);
        // Nothing was updated.
        assert!((m.pi(0).unwrap() - 1.0).abs() < 1e-12);
        assert!((m.b(&1, 0, &0).unwrap() - 1.0).abs() < 1e-12);

        assert!(matches!(
            m.train_iterated(&[(1, 1)], 1.0, 5, 1e-10),
            Err(VelellaError::Degenerate(_))
        ));
    }

    // ── Gaussian emissions ─────────────────────────────────────────────

    #[test]
    fn gaussian_emissions_train_and_evaluate() {
        let emission = |mu: f64| -> Box<dyn TransitionDistribution<i64, f64>> {
            Box::new(
                IntegerRangeTransitionDistribution::from_fn(0, 0, move |_| {
                    Box::new(NormalDistribution::new(mu, 1.0).unwrap())
                        as Box<dyn Distribution<f64>>
                })
                .unwrap(),
            )
        };
        let mut m = MealyIohmm::new(
            vec![0.5, 0.5],
            vec![state_transition_single([0.9, 0.1]), state_transition_single([0.1, 0.9])],
            vec![emission(-2.0), emission(2.0)],
        )
        .unwrap();

        let obs: Vec<(i64, f64)> = vec![
            (0, -2.1),
            (0, -1.9),
            (0, -2.2),
            (0, 2.0),
            (0, 2.1),
            (0, 1.8),
        ];
        let before = m.probability(&obs).unwrap();
        assert!(before > 0.0);
        let stats = m.train(&obs, 0.5).unwrap();
        assert_eq!(stats.degenerate_steps, 0);
        let after = m.probability(&obs).unwrap();
        assert!(after > 0.0);
    }

    fn state_transition_single(row: [f64; 2]) -> Box<dyn TransitionDistribution<i64, usize>> {
        Box::new(
            IntegerRangeTransitionDistribution::from_fn(0, 0, move |_| {
                Box::new(FiniteDistribution::from_probabilities(&row).unwrap())
                    as Box<dyn Distribution<usize>>
            })
            .unwrap(),
        )
    }

    // ── Mutation helpers ───────────────────────────────────────────────

    #[test]
    fn reset_pi_restores_uniform() {
        let mut m = model();
        m.reset_pi();
        assert!((m.pi(0).unwrap() - 0.5).abs() < TOL);
        assert!((m.pi(1).unwrap() - 0.5).abs() < TOL);
        m.reset_pi();
        assert!((m.pi(0).unwrap() - 0.5).abs() < TOL);
    }

    #[test]
    fn randomize_keeps_model_valid() {
        let mut m = model();
        let mut rng = Xorshift64::new(19);
        m.randomize(&mut rng);
        let pi_sum = m.pi(0).unwrap() + m.pi(1).unwrap();
        assert!((pi_sum - 1.0).abs() < TOL);
        for x in 1..=2 {
            for i in 0..2 {
                let a_sum: f64 = (0..2).map(|j| m.a(&x, i, j).unwrap()).sum();
                assert!((a_sum - 1.0).abs() < TOL);
            }
        }
    }

    // ── Sampling ───────────────────────────────────────────────────────

    #[test]
    fn sampling_stays_in_support() {
        let m = model();
        let inputs = vec![1i64; 200];
        let mut rng = Xorshift64::new(23);
        let (states, outputs) = m.sample_with_states(&inputs, &mut rng).unwrap();
        assert_eq!(states.len(), 200);
        assert_eq!(outputs.len(), 200);
        assert!(states.iter().all(|&s| s < 2));
        assert!(outputs.iter().all(|&y| y == 0 || y == 1));
    }

    #[test]
    fn sampling_rejects_unknown_input() {
        let m = model();
        let mut rng = Xorshift64::new(29);
        assert!(m.sample(&[9], &mut rng).is_err());
    }

    #[test]
    fn sampling_empty_inputs() {
        let m = model();
        let mut rng = Xorshift64::new(31);
        let (states, outputs) = m.sample_with_states(&[], &mut rng).unwrap();
        assert!(states.is_empty());
        assert!(outputs.is_empty());
    }

    #[test]
    fn sampling_tracks_emission_law() {
        // Deterministic start in state 1, absorbing; emissions 0.8/0.2.
        let m = MealyIohmm::new(
            vec![0.0, 1.0],
            vec![state_transition([1.0, 0.0]), state_transition([0.0, 1.0])],
            vec![output_emission([0.3, 0.7]), output_emission([0.8, 0.2])],
        )
        .unwrap();
        let inputs = vec![1i64; 20_000];
        let mut rng = Xorshift64::new(37);
        let outputs = m.sample(&inputs, &mut rng).unwrap();
        let zeros = outputs.iter().filter(|&&y| y == 0).count() as f64;
        let freq = zeros / outputs.len() as f64;
        assert!((freq - 0.8).abs() < 0.02, "freq = {freq}");
    }
}
