//! Distributed Jacobi solver for dense linear systems
//!
//! This crate solves A x = b for dense, diagonally dominant matrices with the
//! Jacobi iteration, with the rows of A split across cooperating ranks.
//!
//! # Features
//!
//! - **Row partitioning**: contiguous balanced blocks, one per rank
//! - **Synchronous rounds**: every rank updates its rows from the previous
//!   full iterate, then all slices are exchanged
//! - **Global convergence**: max-change all-reduce, identical on every rank
//! - **Transports**: single process, threads of one process (`LocalCluster`),
//!   or MPI processes (feature `mpi`)
//! - **Boundary buffers**: `f64` slices or little-endian byte buffers
//!
//! Results do not depend on the number of ranks: every row is computed with
//! the same arithmetic regardless of which rank owns it.
//!
//! # Example
//!
//! ```
//! use math_jacobi::{JacobiConfig, SingleProcess, SystemBuffers, jacobi};
//!
//! let a = [4.0, 1.0, 2.0, 3.0];
//! let b = [1.0, 2.0];
//! let mut x = [0.0; 2];
//!
//! let report = jacobi(
//!     &SingleProcess,
//!     SystemBuffers::coordinator(2, &a, &b, &mut x),
//!     &JacobiConfig::default(),
//! )?;
//! assert!(report.converged());
//! # Ok::<(), math_jacobi::JacobiError>(())
//! ```

pub mod assemble;
pub mod blas_helpers;
pub mod buffers;
pub mod comm;
pub mod convergence;
pub mod engine;
pub mod error;
pub mod partition;
pub mod solver;
pub mod validate;

// Re-export main types
pub use assemble::JacobiReport;
pub use buffers::{InputValues, OutputBuffer, SystemBuffers};
pub use comm::{CommError, Communicator, LocalCluster, LocalComm, ROOT, SingleProcess};
pub use convergence::Termination;
pub use engine::InitialGuess;
pub use error::{JacobiError, ShapeField, Stage};
pub use partition::RowPartition;
pub use solver::{JacobiConfig, JacobiSolver, SolverState, jacobi};
pub use validate::DominanceCheck;

#[cfg(feature = "mpi")]
pub use comm::MpiComm;
