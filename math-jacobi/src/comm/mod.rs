//! Message-passing layer between cooperating ranks
//!
//! Every operation on [`Communicator`] is a *collective*: all ranks of a
//! communicator must issue the same collectives in the same order. Each call
//! blocks the calling rank until its part of the exchange has completed, so a
//! call sequence reads as the synchronization schedule of the algorithm:
//!
//! | Operation                   | Blocks until                                     |
//! |-----------------------------|--------------------------------------------------|
//! | [`broadcast_words`]         | the root's words have arrived                    |
//! | [`scatter_varcount`]        | this rank's block has arrived from the root      |
//! | [`all_gather_varcount`]     | the blocks of *all* ranks have arrived           |
//! | [`gather_varcount`]         | root: all blocks arrived; others: block sent     |
//! | [`all_reduce_max`]          | the contributions of all ranks have arrived      |
//! | [`barrier`]                 | every rank has entered the barrier               |
//!
//! Available transports:
//! - [`SingleProcess`]: one rank, every collective is a local copy
//! - [`LocalCluster`] / [`LocalComm`]: several ranks on threads of one process
//! - `MpiComm` (feature `mpi`): ranks are MPI processes
//!
//! [`broadcast_words`]: Communicator::broadcast_words
//! [`scatter_varcount`]: Communicator::scatter_varcount
//! [`all_gather_varcount`]: Communicator::all_gather_varcount
//! [`gather_varcount`]: Communicator::gather_varcount
//! [`all_reduce_max`]: Communicator::all_reduce_max
//! [`barrier`]: Communicator::barrier

mod local;
#[cfg(feature = "mpi")]
mod mpi_comm;
mod single;

pub use local::{LocalCluster, LocalComm};
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;
pub use single::SingleProcess;

use thiserror::Error;

/// Rank of the coordinating process, which owns the full input and output buffers
pub const ROOT: usize = 0;

/// Transport-level failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommError {
    #[error("rank {peer} disconnected")]
    Disconnected { peer: usize },
    #[error("expected {expected} values in collective, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
    #[error("counts describe {counts} ranks but the communicator has {size}")]
    CountsMismatch { counts: usize, size: usize },
    #[error("unexpected message kind from rank {peer}")]
    Protocol { peer: usize },
}

/// Blocking collective operations over a fixed group of ranks.
///
/// Block sizes are given as `counts`, one entry per rank in rank order. The
/// counts must be identical on every rank.
pub trait Communicator {
    /// Rank of the calling process in `0..size()`
    fn rank(&self) -> usize;

    /// Number of ranks in the group
    fn size(&self) -> usize;

    /// Whether the calling process is the coordinator
    fn is_root(&self) -> bool {
        self.rank() == ROOT
    }

    /// Copy `words` from the root into `words` on every other rank.
    ///
    /// The buffer must have the same length on every rank.
    fn broadcast_words(&self, words: &mut [u64]) -> Result<(), CommError>;

    /// Split the root's `send` buffer into consecutive blocks of `counts[r]`
    /// values and deliver block `r` to rank `r`.
    ///
    /// `send` is only read on the root.
    fn scatter_varcount(&self, send: &[f64], counts: &[usize]) -> Result<Vec<f64>, CommError>;

    /// Concatenate every rank's `local` block in rank order, on every rank.
    fn all_gather_varcount(&self, local: &[f64], counts: &[usize])
    -> Result<Vec<f64>, CommError>;

    /// Concatenate every rank's `local` block in rank order on the root.
    ///
    /// Returns `None` on every other rank.
    fn gather_varcount(
        &self,
        local: &[f64],
        counts: &[usize],
    ) -> Result<Option<Vec<f64>>, CommError>;

    /// Global maximum of one value per rank, available on every rank.
    fn all_reduce_max(&self, local: f64) -> Result<f64, CommError>;

    /// `true` on every rank if `flag` is set on at least one rank.
    fn all_reduce_any(&self, flag: bool) -> Result<bool, CommError> {
        let reduced = self.all_reduce_max(if flag { 1.0 } else { 0.0 })?;
        Ok(reduced > 0.5)
    }

    /// Wait until every rank has reached the barrier.
    fn barrier(&self) -> Result<(), CommError>;
}

/// Start offset of each rank's block for the given counts
pub fn displacements(counts: &[usize]) -> Vec<usize> {
    counts
        .iter()
        .scan(0usize, |offset, &count| {
            let start = *offset;
            *offset += count;
            Some(start)
        })
        .collect()
}

pub(crate) fn check_counts(counts: &[usize], size: usize) -> Result<(), CommError> {
    if counts.len() != size {
        return Err(CommError::CountsMismatch {
            counts: counts.len(),
            size,
        });
    }
    Ok(())
}

pub(crate) fn check_len(expected: usize, actual: usize) -> Result<(), CommError> {
    if expected != actual {
        return Err(CommError::SizeMismatch { expected, actual });
    }
    Ok(())
}
