//! Global stopping criterion
//!
//! Each rank measures the largest change of its owned entries during a round;
//! the global change Δ is the maximum over all ranks. Since max is exact and
//! order independent, Δ does not depend on the number of ranks.

use crate::comm::Communicator;
use crate::error::JacobiError;
use ndarray::ArrayView1;

/// Why the iteration stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Δ < tolerance
    Converged,
    /// The round cap was reached first; the iterate is the best available
    MaxIterationsReached,
}

impl Termination {
    /// Whether the tolerance was met
    pub fn is_converged(&self) -> bool {
        matches!(self, Termination::Converged)
    }
}

/// Outcome of one convergence check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Continue,
    Stop(Termination),
}

/// Local change max |x_new_i - x_old_i| over the owned rows.
///
/// Returns 0 for an empty block and +∞ if any entry is NaN, so that a
/// max-reduction can never drop a non-finite value.
pub fn local_change(x_old: ArrayView1<f64>, x_new: &[f64]) -> f64 {
    assert_eq!(x_old.len(), x_new.len(), "Owned slices must match");
    x_old
        .iter()
        .zip(x_new.iter())
        .map(|(&old, &new)| {
            let diff = (new - old).abs();
            if diff.is_nan() { f64::INFINITY } else { diff }
        })
        .fold(0.0, f64::max)
}

/// Combines per-rank changes and decides whether to keep iterating
pub struct ConvergenceChecker<'c, C> {
    comm: &'c C,
    tolerance: f64,
    max_iterations: usize,
}

impl<'c, C: Communicator> ConvergenceChecker<'c, C> {
    pub fn new(comm: &'c C, tolerance: f64, max_iterations: usize) -> Self {
        Self {
            comm,
            tolerance,
            max_iterations,
        }
    }

    /// Decide on a globally reduced change after `iteration` completed rounds
    pub fn verdict(&self, delta: f64, iteration: usize) -> Result<Verdict, JacobiError> {
        if !delta.is_finite() {
            return Err(JacobiError::NonFinite { iteration });
        }
        // Strict: a change equal to the tolerance keeps iterating
        if delta < self.tolerance {
            return Ok(Verdict::Stop(Termination::Converged));
        }
        if iteration >= self.max_iterations {
            return Ok(Verdict::Stop(Termination::MaxIterationsReached));
        }
        Ok(Verdict::Continue)
    }

    /// Reduce the local change and decide.
    ///
    /// Blocking: one all-reduce. Every rank gets the same Δ and verdict.
    pub fn check(&self, local_delta: f64, iteration: usize) -> Result<(f64, Verdict), JacobiError> {
        let delta = self.comm.all_reduce_max(local_delta)?;
        let verdict = self.verdict(delta, iteration)?;
        Ok((delta, verdict))
    }
}
