//! Input validation
//!
//! The coordinator checks buffer shapes, the diagonal and (optionally)
//! diagonal dominance before any data is distributed. The outcome is
//! broadcast so that every rank fails or proceeds together; worker ranks only
//! contribute their local configuration check. Once everyone has passed, the
//! coordinator's shared settings are broadcast so that all ranks take the
//! same stopping decisions.

use crate::blas_helpers::off_diagonal_abs_sum;
use crate::buffers::{SystemBuffers, SystemView};
use crate::comm::Communicator;
use crate::error::{JacobiError, STATUS_WORDS, ShapeField, Stage};
use crate::solver::{JacobiConfig, SETTINGS_WORDS};
use ndarray::ArrayView2;
use std::borrow::Cow;

/// What to do with rows that are not diagonally dominant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DominanceCheck {
    /// Skip the check
    Ignore,
    /// Log a warning and continue (convergence is then not guaranteed)
    #[default]
    Warn,
    /// Reject the system with [`JacobiError::NotDiagonallyDominant`]
    Enforce,
}

/// Check buffer lengths against the declared dimension
pub fn check_shapes(
    n: usize,
    matrix_len: usize,
    rhs_len: usize,
    output_capacity: usize,
) -> Result<(), JacobiError> {
    if n == 0 {
        return Err(JacobiError::EmptySystem);
    }
    let expected = n.saturating_mul(n);
    if matrix_len != expected {
        return Err(JacobiError::Shape {
            field: ShapeField::Matrix,
            expected,
            actual: matrix_len,
        });
    }
    if rhs_len != n {
        return Err(JacobiError::Shape {
            field: ShapeField::Rhs,
            expected: n,
            actual: rhs_len,
        });
    }
    if output_capacity < n {
        return Err(JacobiError::OutputTooSmall {
            required: n,
            capacity: output_capacity,
        });
    }
    Ok(())
}

/// Reject the first diagonal entry with |a_ii| <= `tolerance`.
///
/// `row_offset` is added to local row indices so that errors report global rows.
pub fn check_diagonal(
    rows: ArrayView2<f64>,
    row_offset: usize,
    tolerance: f64,
) -> Result<(), JacobiError> {
    for (local, row) in rows.outer_iter().enumerate() {
        let i = row_offset + local;
        let value = row[i];
        // Negated so that NaN is rejected as well
        if !(value.abs() > tolerance) {
            return Err(JacobiError::SingularDiagonal { row: i, value });
        }
    }
    Ok(())
}

/// Rows with |a_ii| < Σ_{j≠i} |a_ij|
pub fn non_dominant_rows(matrix: ArrayView2<f64>) -> Vec<usize> {
    matrix
        .outer_iter()
        .enumerate()
        .filter(|(i, row)| !(row[*i].abs() >= off_diagonal_abs_sum(row.view(), *i)))
        .map(|(i, _)| i)
        .collect()
}

/// Apply the configured dominance policy
pub fn check_dominance(matrix: ArrayView2<f64>, mode: DominanceCheck) -> Result<(), JacobiError> {
    if mode == DominanceCheck::Ignore {
        return Ok(());
    }
    let rows = non_dominant_rows(matrix);
    let Some(&first) = rows.first() else {
        return Ok(());
    };
    match mode {
        DominanceCheck::Enforce => Err(JacobiError::NotDiagonallyDominant { row: first }),
        _ => {
            log::warn!(
                "{} of {} rows are not diagonally dominant (first: row {}); Jacobi may diverge",
                rows.len(),
                matrix.nrows(),
                first
            );
            Ok(())
        }
    }
}

/// Coordinator input that passed validation
#[derive(Debug, Clone)]
pub struct ValidatedSystem<'a> {
    n: usize,
    config: JacobiConfig,
    data: Option<(Cow<'a, [f64]>, Cow<'a, [f64]>)>,
}

impl<'a> ValidatedSystem<'a> {
    /// System dimension, known on every rank
    pub fn n(&self) -> usize {
        self.n
    }

    /// Local configuration with the coordinator's shared settings
    pub fn config(&self) -> &JacobiConfig {
        &self.config
    }

    /// Typed view of the full system (coordinator only)
    pub fn view(&self) -> Option<SystemView<'_>> {
        let (matrix, rhs) = self.data.as_ref()?;
        SystemView::new(self.n, matrix, rhs).ok()
    }
}

fn validate_coordinator<'a>(
    buffers: &SystemBuffers<'a>,
    config: &JacobiConfig,
) -> Result<ValidatedSystem<'a>, JacobiError> {
    config.validate()?;

    let n = buffers.n;
    if n == 0 {
        return Err(JacobiError::EmptySystem);
    }
    let matrix = match &buffers.matrix {
        Some(values) => values.decode(ShapeField::Matrix)?,
        None => Cow::Borrowed(&[][..]),
    };
    let rhs = match &buffers.rhs {
        Some(values) => values.decode(ShapeField::Rhs)?,
        None => Cow::Borrowed(&[][..]),
    };
    let capacity = match &buffers.output {
        Some(output) => output.capacity()?,
        None => 0,
    };
    check_shapes(n, matrix.len(), rhs.len(), capacity)?;

    let view = SystemView::new(n, &matrix, &rhs)?;
    check_diagonal(view.matrix, 0, config.diagonal_tolerance)?;
    check_dominance(view.matrix, config.dominance)?;

    Ok(ValidatedSystem {
        n,
        config: config.clone(),
        data: Some((matrix, rhs)),
    })
}

/// Validate the input collectively.
///
/// Blocking: one broadcast of the coordinator's status, one all-reduce of the
/// local outcomes and, on success, one broadcast of the shared settings. On
/// return every rank holds the same verdict and the same shared settings.
pub fn validate_system<'a, C: Communicator>(
    comm: &C,
    buffers: &SystemBuffers<'a>,
    config: &JacobiConfig,
) -> Result<ValidatedSystem<'a>, JacobiError> {
    let local = if comm.is_root() {
        validate_coordinator(buffers, config)
    } else {
        config.validate().map(|_| ValidatedSystem {
            n: 0,
            config: config.clone(),
            data: None,
        })
    };

    let mut words = if comm.is_root() {
        let status = local
            .as_ref()
            .map(|system| system.n)
            .map_err(|err| err.clone());
        JacobiError::encode_status(&status)
    } else {
        [0; STATUS_WORDS]
    };
    comm.broadcast_words(&mut words)?;
    let coordinator = JacobiError::decode_status(&words);

    let any_failed = comm.all_reduce_any(local.is_err())?;

    let mut system = local?;
    let n = coordinator?;
    if any_failed {
        return Err(JacobiError::Aborted {
            stage: Stage::Validation,
        });
    }

    let mut settings = if comm.is_root() {
        config.shared_words()
    } else {
        [0; SETTINGS_WORDS]
    };
    comm.broadcast_words(&mut settings)?;
    system.n = n;
    system.config = config.with_shared_words(&settings);

    log::debug!("rank {}: validated system of dimension {}", comm.rank(), n);
    Ok(system)
}
