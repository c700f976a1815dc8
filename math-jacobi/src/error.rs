//! Error types for the distributed Jacobi solver
//!
//! Validation failures are detected on the coordinator only, but every rank
//! must fail with the same error. They are therefore encoded into a fixed
//! number of status words which the coordinator broadcasts
//! (see [`JacobiError::encode_status`]).

use crate::comm::CommError;
use crate::solver::SolverState;
use std::fmt;
use thiserror::Error;

/// Boundary buffer a shape failure refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeField {
    Matrix,
    Rhs,
    Output,
}

impl fmt::Display for ShapeField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeField::Matrix => write!(f, "matrix"),
            ShapeField::Rhs => write!(f, "right-hand side"),
            ShapeField::Output => write!(f, "output"),
        }
    }
}

/// Collective step during which a peer rank failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validation,
    Initialization,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Validation => write!(f, "validation"),
            Stage::Initialization => write!(f, "initialization"),
        }
    }
}

/// Errors that can occur while solving
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JacobiError {
    #[error("{field} buffer has {actual} elements, expected {expected}")]
    Shape {
        field: ShapeField,
        expected: usize,
        actual: usize,
    },
    #[error("output buffer holds {capacity} values, need at least {required}")]
    OutputTooSmall { required: usize, capacity: usize },
    #[error("system dimension must be at least 1")]
    EmptySystem,
    #[error("{field} byte buffer length {len} is not a multiple of 8")]
    MisalignedBytes { field: ShapeField, len: usize },
    #[error("diagonal entry a[{row}][{row}] = {value:e} is zero or below tolerance")]
    SingularDiagonal { row: usize, value: f64 },
    #[error("row {row} is not diagonally dominant")]
    NotDiagonallyDominant { row: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("solver is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: SolverState,
        actual: SolverState,
    },
    #[error("iterate is no longer finite at round {iteration}")]
    NonFinite { iteration: usize },
    #[error("a peer rank failed during {stage}")]
    Aborted { stage: Stage },
    #[error(transparent)]
    Comm(#[from] CommError),
}

/// Number of `u64` words in an encoded validation status
pub const STATUS_WORDS: usize = 4;

const STATUS_OK: u64 = 0;
const STATUS_SHAPE: u64 = 1;
const STATUS_OUTPUT: u64 = 2;
const STATUS_EMPTY: u64 = 3;
const STATUS_MISALIGNED: u64 = 4;
const STATUS_SINGULAR: u64 = 5;
const STATUS_NOT_DOMINANT: u64 = 6;
const STATUS_ABORTED: u64 = 7;

fn field_code(field: ShapeField) -> u64 {
    match field {
        ShapeField::Matrix => 0,
        ShapeField::Rhs => 1,
        ShapeField::Output => 2,
    }
}

fn field_from_code(code: u64) -> Option<ShapeField> {
    match code {
        0 => Some(ShapeField::Matrix),
        1 => Some(ShapeField::Rhs),
        2 => Some(ShapeField::Output),
        _ => None,
    }
}

impl JacobiError {
    /// Encode a validation outcome (the system dimension on success).
    ///
    /// Errors without a wire form (configuration, transport) are sent as
    /// [`JacobiError::Aborted`].
    pub fn encode_status(status: &Result<usize, JacobiError>) -> [u64; STATUS_WORDS] {
        match status {
            Ok(n) => [STATUS_OK, *n as u64, 0, 0],
            Err(JacobiError::Shape {
                field,
                expected,
                actual,
            }) => [
                STATUS_SHAPE,
                field_code(*field),
                *expected as u64,
                *actual as u64,
            ],
            Err(JacobiError::OutputTooSmall { required, capacity }) => {
                [STATUS_OUTPUT, *required as u64, *capacity as u64, 0]
            }
            Err(JacobiError::EmptySystem) => [STATUS_EMPTY, 0, 0, 0],
            Err(JacobiError::MisalignedBytes { field, len }) => {
                [STATUS_MISALIGNED, field_code(*field), *len as u64, 0]
            }
            Err(JacobiError::SingularDiagonal { row, value }) => {
                [STATUS_SINGULAR, *row as u64, value.to_bits(), 0]
            }
            Err(JacobiError::NotDiagonallyDominant { row }) => {
                [STATUS_NOT_DOMINANT, *row as u64, 0, 0]
            }
            Err(_) => [STATUS_ABORTED, 0, 0, 0],
        }
    }

    /// Inverse of [`JacobiError::encode_status`]
    pub fn decode_status(words: &[u64; STATUS_WORDS]) -> Result<usize, JacobiError> {
        let aborted = JacobiError::Aborted {
            stage: Stage::Validation,
        };
        match words[0] {
            STATUS_OK => Ok(words[1] as usize),
            STATUS_SHAPE => Err(match field_from_code(words[1]) {
                Some(field) => JacobiError::Shape {
                    field,
                    expected: words[2] as usize,
                    actual: words[3] as usize,
                },
                None => aborted,
            }),
            STATUS_OUTPUT => Err(JacobiError::OutputTooSmall {
                required: words[1] as usize,
                capacity: words[2] as usize,
            }),
            STATUS_EMPTY => Err(JacobiError::EmptySystem),
            STATUS_MISALIGNED => Err(match field_from_code(words[1]) {
                Some(field) => JacobiError::MisalignedBytes {
                    field,
                    len: words[2] as usize,
                },
                None => aborted,
            }),
            STATUS_SINGULAR => Err(JacobiError::SingularDiagonal {
                row: words[1] as usize,
                value: f64::from_bits(words[2]),
            }),
            STATUS_NOT_DOMINANT => Err(JacobiError::NotDiagonallyDominant {
                row: words[1] as usize,
            }),
            _ => Err(aborted),
        }
    }
}
