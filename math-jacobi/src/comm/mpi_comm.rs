//! MPI transport
//!
//! Each rank is an MPI process. MPI reports transport failures by aborting
//! the job, so the collectives here only fail on local argument checks.

use super::{CommError, Communicator, ROOT, check_counts, check_len, displacements};
use mpi::Count;
use mpi::collective::SystemOperation;
use mpi::datatype::{Partition, PartitionMut};
use mpi::topology::SimpleCommunicator;
use mpi::traits::{Communicator as _, CommunicatorCollectives, Root};

/// Communicator backed by an MPI communicator (usually `universe.world()`)
pub struct MpiComm {
    world: SimpleCommunicator,
    rank: usize,
    size: usize,
}

impl MpiComm {
    /// Wrap an MPI communicator
    pub fn new(world: SimpleCommunicator) -> Self {
        let rank = world.rank() as usize;
        let size = world.size() as usize;
        Self { world, rank, size }
    }
}

fn to_counts(counts: &[usize]) -> (Vec<Count>, Vec<Count>) {
    let displs = displacements(counts)
        .into_iter()
        .map(|d| d as Count)
        .collect();
    (counts.iter().map(|&c| c as Count).collect(), displs)
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn broadcast_words(&self, words: &mut [u64]) -> Result<(), CommError> {
        self.world
            .process_at_rank(ROOT as i32)
            .broadcast_into(words);
        Ok(())
    }

    fn scatter_varcount(&self, send: &[f64], counts: &[usize]) -> Result<Vec<f64>, CommError> {
        check_counts(counts, self.size)?;
        let root = self.world.process_at_rank(ROOT as i32);
        let mut block = vec![0.0; counts[self.rank]];

        if self.rank == ROOT {
            check_len(counts.iter().sum(), send.len())?;
            let (counts, displs) = to_counts(counts);
            let partition = Partition::new(send, counts, displs);
            root.scatter_varcount_into_root(&partition, &mut block[..]);
        } else {
            root.scatter_varcount_into(&mut block[..]);
        }
        Ok(block)
    }

    fn all_gather_varcount(
        &self,
        local: &[f64],
        counts: &[usize],
    ) -> Result<Vec<f64>, CommError> {
        check_counts(counts, self.size)?;
        check_len(counts[self.rank], local.len())?;

        let mut gathered = vec![0.0; counts.iter().sum()];
        {
            let (counts, displs) = to_counts(counts);
            let mut partition = PartitionMut::new(&mut gathered[..], counts, displs);
            self.world.all_gather_varcount_into(local, &mut partition);
        }
        Ok(gathered)
    }

    fn gather_varcount(
        &self,
        local: &[f64],
        counts: &[usize],
    ) -> Result<Option<Vec<f64>>, CommError> {
        check_counts(counts, self.size)?;
        check_len(counts[self.rank], local.len())?;
        let root = self.world.process_at_rank(ROOT as i32);

        if self.rank != ROOT {
            root.gather_varcount_into(local);
            return Ok(None);
        }

        let mut gathered = vec![0.0; counts.iter().sum()];
        {
            let (counts, displs) = to_counts(counts);
            let mut partition = PartitionMut::new(&mut gathered[..], counts, displs);
            root.gather_varcount_into_root(local, &mut partition);
        }
        Ok(Some(gathered))
    }

    fn all_reduce_max(&self, local: f64) -> Result<f64, CommError> {
        let mut global = local;
        self.world
            .all_reduce_into(&local, &mut global, SystemOperation::max());
        Ok(global)
    }

    fn barrier(&self) -> Result<(), CommError> {
        self.world.barrier();
        Ok(())
    }
}
