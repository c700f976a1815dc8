//! Jacobi iteration engine
//!
//! Every rank holds the full previous iterate `x_old` and updates its owned
//! rows with
//!
//! ```text
//! x_i_new = (b_i - Σ_{j≠i} a_ij * x_j_old) / a_ii
//! ```
//!
//! No row reads a value updated in the same round. A round ends with an
//! all-gather of the updated slices, after which every rank replaces
//! `x_old` as a whole.
//!
//! Round `k` (starting at 0) proceeds as:
//! 1. local sweep from `x_old`, local change, all-reduce of the change Δ
//! 2. Δ not finite: fail; Δ < tolerance: converged with `x_old`;
//!    `k` = max_iterations: stop with `x_old`
//! 3. otherwise exchange the slices and advance to round `k + 1`
//!
//! The reported iteration count is the number of completed exchanges.

use crate::blas_helpers::off_diagonal_dot;
use crate::comm::Communicator;
use crate::convergence::{ConvergenceChecker, Termination, Verdict, local_change};
use crate::error::JacobiError;
use crate::partition::{LocalBlock, RowPartition};
use crate::solver::JacobiConfig;
use ndarray::{Array1, ArrayView1, s};

/// Minimum number of local matrix entries before rows are updated in parallel
/// (feature `rayon`)
pub const PARALLEL_MIN_WORK: usize = 1 << 14;

/// Starting iterate x_0
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum InitialGuess {
    /// x_0 = 0
    #[default]
    Zero,
    /// Every entry of x_0 equals the given value
    Constant(f64),
}

impl InitialGuess {
    fn vector(&self, n: usize) -> Array1<f64> {
        match *self {
            InitialGuess::Zero => Array1::zeros(n),
            InitialGuess::Constant(value) => Array1::from_elem(n, value),
        }
    }
}

/// Result of running the iteration loop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunSummary {
    /// Why the loop stopped
    pub termination: Termination,
    /// Number of completed rounds
    pub iterations: usize,
    /// Last globally reduced change Δ
    pub delta: f64,
}

/// Per-rank iteration state
pub struct JacobiEngine<'c, C> {
    comm: &'c C,
    block: LocalBlock,
    /// Full previous iterate, identical on every rank
    x: Array1<f64>,
}

impl<'c, C: Communicator> JacobiEngine<'c, C> {
    pub fn new(comm: &'c C, block: LocalBlock, initial_guess: InitialGuess) -> Self {
        let x = initial_guess.vector(block.partition().n());
        Self { comm, block, x }
    }

    /// Rows owned by this rank
    pub fn block(&self) -> &LocalBlock {
        &self.block
    }

    /// Partition shared by all ranks
    pub fn partition(&self) -> &RowPartition {
        self.block.partition()
    }

    /// Current full iterate
    pub fn iterate(&self) -> ArrayView1<'_, f64> {
        self.x.view()
    }

    /// Current values of the owned rows
    pub fn owned_values(&self) -> Vec<f64> {
        let range = self.block.range();
        self.x.slice(s![range.start..range.end]).to_vec()
    }

    /// Compute x_new for the owned rows from the current iterate.
    ///
    /// Purely local; the iterate itself is not modified.
    pub fn sweep(&self) -> Vec<f64> {
        let rows = self.block.rows();
        let rhs = self.block.rhs();
        let start = self.block.range().start;
        let x = self.x.view();

        let update = |local: usize| {
            let i = start + local;
            let row = rows.row(local);
            (rhs[local] - off_diagonal_dot(row, x, i)) / row[i]
        };

        #[cfg(feature = "rayon")]
        {
            use rayon::prelude::*;
            if rows.len() >= PARALLEL_MIN_WORK {
                return (0..rows.nrows()).into_par_iter().map(update).collect();
            }
        }

        (0..rows.nrows()).map(update).collect()
    }

    /// Replace the iterate with the concatenation of every rank's update.
    ///
    /// Blocking: one all-gather. The iterate is only replaced once the slices
    /// of all ranks have arrived.
    pub fn exchange(&mut self, local_new: &[f64]) -> Result<(), JacobiError> {
        let gathered = self
            .comm
            .all_gather_varcount(local_new, &self.partition().row_counts())?;
        self.x = Array1::from_vec(gathered);
        Ok(())
    }

    /// Iterate until convergence or the round cap
    pub fn run(&mut self, config: &JacobiConfig) -> Result<RunSummary, JacobiError> {
        let checker = ConvergenceChecker::new(self.comm, config.tolerance, config.max_iterations);
        let range = self.block.range();
        let mut iteration = 0;

        loop {
            let local_new = self.sweep();
            let local_delta = local_change(self.x.slice(s![range.start..range.end]), &local_new);
            let (delta, verdict) = checker.check(local_delta, iteration)?;

            if self.comm.is_root()
                && config.print_interval > 0
                && iteration % config.print_interval == 0
            {
                log::info!("Jacobi round {}: max change = {:.6e}", iteration, delta);
            }

            match verdict {
                Verdict::Stop(termination) => {
                    return Ok(RunSummary {
                        termination,
                        iterations: iteration,
                        delta,
                    });
                }
                Verdict::Continue => {
                    self.exchange(&local_new)?;
                    iteration += 1;
                }
            }
        }
    }
}
