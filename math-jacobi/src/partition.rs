//! Row partitioning and distribution
//!
//! Rows are split into contiguous blocks, one per rank, like the contiguous
//! subdomains of a block-Jacobi decomposition. The first `n % P` ranks get one
//! extra row, so block sizes differ by at most one. When `P > n` the trailing
//! ranks own empty blocks but still take part in every collective.

use crate::buffers::SystemView;
use crate::comm::{CommError, Communicator};
use crate::error::{JacobiError, Stage};
use crate::validate::check_diagonal;
use ndarray::{Array1, Array2, ArrayView, ArrayView1, ArrayView2, Dimension};
use std::borrow::Cow;
use std::ops::Range;

/// Half-open row range owned by each rank
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowPartition {
    n: usize,
    ranges: Vec<Range<usize>>,
}

impl RowPartition {
    /// Split `0..n` into `parts` contiguous, balanced ranges (`parts` >= 1)
    pub fn new(n: usize, parts: usize) -> Self {
        let parts = parts.max(1);
        let base_size = n / parts;
        let remainder = n % parts;

        let mut ranges = Vec::with_capacity(parts);
        let mut start = 0;
        for i in 0..parts {
            let size = base_size + if i < remainder { 1 } else { 0 };
            ranges.push(start..start + size);
            start += size;
        }

        Self { n, ranges }
    }

    /// System dimension
    pub fn n(&self) -> usize {
        self.n
    }

    /// Number of parts (ranks)
    pub fn num_parts(&self) -> usize {
        self.ranges.len()
    }

    /// Rows owned by `rank`
    pub fn range(&self, rank: usize) -> Range<usize> {
        self.ranges[rank].clone()
    }

    /// All ranges in rank order
    pub fn ranges(&self) -> &[Range<usize>] {
        &self.ranges
    }

    /// Number of rows per rank
    pub fn row_counts(&self) -> Vec<usize> {
        self.ranges.iter().map(|r| r.len()).collect()
    }

    /// Number of values per rank when each row carries `width` values
    pub fn scaled_counts(&self, width: usize) -> Vec<usize> {
        self.ranges.iter().map(|r| r.len() * width).collect()
    }

    /// Rank owning global row `row`
    pub fn owner(&self, row: usize) -> Option<usize> {
        self.ranges.iter().position(|r| r.contains(&row))
    }
}

/// Rows of A and entries of b owned by one rank
#[derive(Debug, Clone)]
pub struct LocalBlock {
    partition: RowPartition,
    rank: usize,
    rows: Array2<f64>,
    rhs: Array1<f64>,
}

impl LocalBlock {
    /// Build a block from already distributed data
    pub fn new(
        partition: RowPartition,
        rank: usize,
        rows: Array2<f64>,
        rhs: Array1<f64>,
    ) -> Result<Self, JacobiError> {
        let range = partition.range(rank);
        let expected = (range.len(), partition.n());
        if rows.dim() != expected || rhs.len() != range.len() {
            return Err(JacobiError::Comm(CommError::SizeMismatch {
                expected: range.len() * partition.n(),
                actual: rows.len(),
            }));
        }
        Ok(Self {
            partition,
            rank,
            rows,
            rhs,
        })
    }

    /// Partition shared by all ranks
    pub fn partition(&self) -> &RowPartition {
        &self.partition
    }

    /// Global rows owned by this rank
    pub fn range(&self) -> Range<usize> {
        self.partition.range(self.rank)
    }

    /// Number of owned rows
    pub fn len(&self) -> usize {
        self.rows.nrows()
    }

    /// Whether this rank owns no rows
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Owned rows of A, `len() x n`
    pub fn rows(&self) -> ArrayView2<'_, f64> {
        self.rows.view()
    }

    /// Owned entries of b
    pub fn rhs(&self) -> ArrayView1<'_, f64> {
        self.rhs.view()
    }

    /// Diagonal entry of local row `local`
    #[inline]
    pub fn diagonal(&self, local: usize) -> f64 {
        self.rows[[local, self.range().start + local]]
    }

    /// Check the owned diagonal entries before they are used as divisors
    pub fn check_diagonal(&self, tolerance: f64) -> Result<(), JacobiError> {
        check_diagonal(self.rows.view(), self.range().start, tolerance)
    }
}

/// Partition the system over all ranks and ship each rank its rows.
///
/// `system` is only read on the coordinator. Blocking: one scatter of the
/// matrix rows and one scatter of the right-hand side.
pub fn distribute<C: Communicator>(
    comm: &C,
    n: usize,
    system: Option<SystemView<'_>>,
) -> Result<LocalBlock, JacobiError> {
    let partition = RowPartition::new(n, comm.size());

    let (matrix, rhs) = match system.filter(|_| comm.is_root()) {
        Some(view) => (contiguous(view.matrix), contiguous(view.rhs)),
        None => (Cow::Borrowed(&[][..]), Cow::Borrowed(&[][..])),
    };

    let rows = comm.scatter_varcount(&matrix, &partition.scaled_counts(n))?;
    let rhs = comm.scatter_varcount(&rhs, &partition.row_counts())?;

    let range = partition.range(comm.rank());
    log::debug!(
        "rank {}: owns rows {}..{} of {}",
        comm.rank(),
        range.start,
        range.end,
        n
    );

    let received = rows.len();
    let rows = Array2::from_shape_vec((range.len(), n), rows).map_err(|_| {
        CommError::SizeMismatch {
            expected: range.len() * n,
            actual: received,
        }
    })?;
    LocalBlock::new(partition, comm.rank(), rows, Array1::from_vec(rhs))
}

/// Row-major values of a view, borrowed when already contiguous
fn contiguous<'v, D: Dimension>(view: ArrayView<'v, f64, D>) -> Cow<'v, [f64]> {
    match view.to_slice() {
        Some(values) => Cow::Borrowed(values),
        None => Cow::Owned(view.iter().copied().collect()),
    }
}

/// Defensive per-rank diagonal check, agreed on by all ranks.
///
/// Blocking: one all-reduce.
pub fn check_distributed_diagonal<C: Communicator>(
    comm: &C,
    block: &LocalBlock,
    tolerance: f64,
) -> Result<(), JacobiError> {
    let local = block.check_diagonal(tolerance);
    let any_failed = comm.all_reduce_any(local.is_err())?;
    local?;
    if any_failed {
        return Err(JacobiError::Aborted {
            stage: Stage::Initialization,
        });
    }
    Ok(())
}
