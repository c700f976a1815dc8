//! Boundary buffers
//!
//! The coordinator hands the solver its input and output either as `f64`
//! slices or as raw little-endian byte buffers. Both are converted here into
//! length-checked values; the numerical code only ever sees typed
//! `ndarray` views.

use crate::error::{JacobiError, ShapeField};
use byteorder::{ByteOrder, LittleEndian};
use ndarray::{ArrayView1, ArrayView2};
use std::borrow::Cow;

const F64_BYTES: usize = std::mem::size_of::<f64>();

/// Read-only input values
#[derive(Debug, Clone, Copy)]
pub enum InputValues<'a> {
    /// Native `f64` values
    Typed(&'a [f64]),
    /// Little-endian encoded `f64` values
    Bytes(&'a [u8]),
}

impl<'a> InputValues<'a> {
    /// Number of encoded values (bytes are rounded down)
    pub fn len(&self) -> usize {
        match self {
            InputValues::Typed(values) => values.len(),
            InputValues::Bytes(bytes) => bytes.len() / F64_BYTES,
        }
    }

    /// Whether the buffer holds no values
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Decode into `f64` values, borrowing when no conversion is needed
    pub fn decode(&self, field: ShapeField) -> Result<Cow<'a, [f64]>, JacobiError> {
        match *self {
            InputValues::Typed(values) => Ok(Cow::Borrowed(values)),
            InputValues::Bytes(bytes) => {
                if bytes.len() % F64_BYTES != 0 {
                    return Err(JacobiError::MisalignedBytes {
                        field,
                        len: bytes.len(),
                    });
                }
                let mut values = vec![0.0; bytes.len() / F64_BYTES];
                LittleEndian::read_f64_into(bytes, &mut values);
                Ok(Cow::Owned(values))
            }
        }
    }
}

/// Writable output buffer
#[derive(Debug)]
pub enum OutputBuffer<'a> {
    /// Native `f64` values
    Typed(&'a mut [f64]),
    /// Little-endian encoded `f64` values
    Bytes(&'a mut [u8]),
}

impl OutputBuffer<'_> {
    /// Number of `f64` values the buffer can hold
    pub fn capacity(&self) -> Result<usize, JacobiError> {
        match self {
            OutputBuffer::Typed(values) => Ok(values.len()),
            OutputBuffer::Bytes(bytes) => {
                if bytes.len() % F64_BYTES != 0 {
                    return Err(JacobiError::MisalignedBytes {
                        field: ShapeField::Output,
                        len: bytes.len(),
                    });
                }
                Ok(bytes.len() / F64_BYTES)
            }
        }
    }

    /// Write `values` to the front of the buffer
    pub fn write(&mut self, values: &[f64]) -> Result<(), JacobiError> {
        let capacity = self.capacity()?;
        if capacity < values.len() {
            return Err(JacobiError::OutputTooSmall {
                required: values.len(),
                capacity,
            });
        }
        match self {
            OutputBuffer::Typed(out) => out[..values.len()].copy_from_slice(values),
            OutputBuffer::Bytes(out) => {
                LittleEndian::write_f64_into(values, &mut out[..values.len() * F64_BYTES])
            }
        }
        Ok(())
    }
}

/// Buffers one rank passes to the solver.
///
/// The coordinator provides the dimension, the full matrix (row-major,
/// `n * n` values), the right-hand side (`n` values) and the output buffer.
/// Worker ranks provide nothing; they learn the dimension and receive their
/// rows from the coordinator.
#[derive(Debug)]
pub struct SystemBuffers<'a> {
    pub(crate) n: usize,
    pub(crate) matrix: Option<InputValues<'a>>,
    pub(crate) rhs: Option<InputValues<'a>>,
    pub(crate) output: Option<OutputBuffer<'a>>,
}

impl<'a> SystemBuffers<'a> {
    /// Coordinator buffers from `f64` slices
    pub fn coordinator(n: usize, matrix: &'a [f64], rhs: &'a [f64], output: &'a mut [f64]) -> Self {
        Self {
            n,
            matrix: Some(InputValues::Typed(matrix)),
            rhs: Some(InputValues::Typed(rhs)),
            output: Some(OutputBuffer::Typed(output)),
        }
    }

    /// Coordinator buffers from little-endian byte buffers
    pub fn coordinator_bytes(
        n: usize,
        matrix: &'a [u8],
        rhs: &'a [u8],
        output: &'a mut [u8],
    ) -> Self {
        Self {
            n,
            matrix: Some(InputValues::Bytes(matrix)),
            rhs: Some(InputValues::Bytes(rhs)),
            output: Some(OutputBuffer::Bytes(output)),
        }
    }

    /// Empty buffers for a worker rank
    pub fn worker() -> Self {
        Self {
            n: 0,
            matrix: None,
            rhs: None,
            output: None,
        }
    }

    /// Declared system dimension (0 on workers)
    pub fn n(&self) -> usize {
        self.n
    }
}

/// Typed view of a validated system on the coordinator
#[derive(Debug, Clone, Copy)]
pub struct SystemView<'v> {
    pub matrix: ArrayView2<'v, f64>,
    pub rhs: ArrayView1<'v, f64>,
}

impl<'v> SystemView<'v> {
    /// Wrap flat row-major storage, checking every length
    pub fn new(n: usize, matrix: &'v [f64], rhs: &'v [f64]) -> Result<Self, JacobiError> {
        let matrix_shape = JacobiError::Shape {
            field: ShapeField::Matrix,
            expected: n.saturating_mul(n),
            actual: matrix.len(),
        };
        let rhs_shape = JacobiError::Shape {
            field: ShapeField::Rhs,
            expected: n,
            actual: rhs.len(),
        };
        if n.checked_mul(n) != Some(matrix.len()) {
            return Err(matrix_shape);
        }
        if rhs.len() != n {
            return Err(rhs_shape);
        }

        let matrix = ArrayView2::from_shape((n, n), matrix).map_err(|_| matrix_shape)?;
        let rhs = ArrayView1::from_shape(n, rhs).map_err(|_| rhs_shape)?;
        Ok(Self { matrix, rhs })
    }

    /// System dimension
    pub fn n(&self) -> usize {
        self.rhs.len()
    }
}
