//! Single-rank communicator
//!
//! All collectives degenerate to local copies.

use super::{CommError, Communicator, check_counts, check_len};

/// Communicator for a group of exactly one rank
#[derive(Clone, Debug, Default)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn broadcast_words(&self, _words: &mut [u64]) -> Result<(), CommError> {
        Ok(())
    }

    fn scatter_varcount(&self, send: &[f64], counts: &[usize]) -> Result<Vec<f64>, CommError> {
        check_counts(counts, 1)?;
        check_len(counts[0], send.len())?;
        Ok(send.to_vec())
    }

    fn all_gather_varcount(
        &self,
        local: &[f64],
        counts: &[usize],
    ) -> Result<Vec<f64>, CommError> {
        check_counts(counts, 1)?;
        check_len(counts[0], local.len())?;
        Ok(local.to_vec())
    }

    fn gather_varcount(
        &self,
        local: &[f64],
        counts: &[usize],
    ) -> Result<Option<Vec<f64>>, CommError> {
        self.all_gather_varcount(local, counts).map(Some)
    }

    fn all_reduce_max(&self, local: f64) -> Result<f64, CommError> {
        Ok(local)
    }

    fn barrier(&self) -> Result<(), CommError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_rank_and_size() {
        let comm = SingleProcess;
        assert_eq!(comm.rank(), 0);
        assert_eq!(comm.size(), 1);
        assert!(comm.is_root());
    }

    #[test]
    fn test_single_collectives_are_copies() {
        let comm = SingleProcess;
        let data = [1.0, 2.0, 3.0];
        assert_eq!(comm.scatter_varcount(&data, &[3]).unwrap(), data.to_vec());
        assert_eq!(comm.all_gather_varcount(&data, &[3]).unwrap(), data.to_vec());
        assert_eq!(
            comm.gather_varcount(&data, &[3]).unwrap(),
            Some(data.to_vec())
        );
        assert_eq!(comm.all_reduce_max(-2.5).unwrap(), -2.5);
        assert!(comm.all_reduce_any(true).unwrap());
        assert!(!comm.all_reduce_any(false).unwrap());
    }

    #[test]
    fn test_single_rejects_wrong_counts() {
        let comm = SingleProcess;
        assert_eq!(
            comm.all_gather_varcount(&[1.0], &[2]),
            Err(CommError::SizeMismatch {
                expected: 2,
                actual: 1
            })
        );
        assert!(comm.scatter_varcount(&[1.0], &[1, 0]).is_err());
    }
}
