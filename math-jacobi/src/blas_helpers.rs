//! Dense kernels used by the Jacobi sweep and its diagnostics
//!
//! Summation order is fixed (ascending column index) so a row produces the
//! same bits no matter which rank or thread evaluates it.

use ndarray::{ArrayView1, ArrayView2};

/// Compute Σ_{j≠skip} row_j * x_j
#[inline]
pub fn off_diagonal_dot(row: ArrayView1<f64>, x: ArrayView1<f64>, skip: usize) -> f64 {
    assert_eq!(row.len(), x.len(), "Row and iterate lengths must match");
    let mut sum = 0.0;
    for (j, (&a, &xj)) in row.iter().zip(x.iter()).enumerate() {
        if j != skip {
            sum += a * xj;
        }
    }
    sum
}

/// Compute Σ_{j≠skip} |row_j|
#[inline]
pub fn off_diagonal_abs_sum(row: ArrayView1<f64>, skip: usize) -> f64 {
    row.iter()
        .enumerate()
        .filter(|&(j, _)| j != skip)
        .map(|(_, a)| a.abs())
        .sum()
}

/// Maximum-norm: ||x||_∞ = max |x_i| (0 for an empty vector)
#[inline]
pub fn inf_norm(x: ArrayView1<f64>) -> f64 {
    x.iter().fold(0.0, |acc, &xi| acc.max(xi.abs()))
}

/// Residual maximum-norm: ||A x - b||_∞
pub fn residual_inf_norm(a: ArrayView2<f64>, x: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    assert_eq!(a.ncols(), x.len(), "Matrix columns must match x");
    assert_eq!(a.nrows(), b.len(), "Matrix rows must match b");
    let residual = a.dot(&x) - b;
    inf_norm(residual.view())
}
