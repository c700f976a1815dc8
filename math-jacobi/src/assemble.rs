//! Result assembly
//!
//! After the loop stops, each rank's owned slice of the final iterate is
//! gathered on the coordinator in index order.

use crate::comm::Communicator;
use crate::convergence::Termination;
use crate::error::JacobiError;
use crate::partition::RowPartition;
use ndarray::Array1;

/// Outcome of a solve, available on every rank
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JacobiReport {
    /// Converged, or stopped at the round cap
    pub termination: Termination,
    /// Number of completed rounds
    pub iterations: usize,
    /// Final global change Δ
    pub delta: f64,
    /// ||A x - b||_∞ of the returned solution (coordinator only)
    pub residual: Option<f64>,
}

impl JacobiReport {
    /// Whether the tolerance was met
    pub fn converged(&self) -> bool {
        self.termination.is_converged()
    }
}

/// Gather the owned slices on the coordinator.
///
/// Blocking: one gather. Returns the full solution on the coordinator and
/// `None` elsewhere.
pub fn assemble<C: Communicator>(
    comm: &C,
    partition: &RowPartition,
    owned: &[f64],
) -> Result<Option<Array1<f64>>, JacobiError> {
    let gathered = comm.gather_varcount(owned, &partition.row_counts())?;
    Ok(gathered.map(Array1::from_vec))
}
