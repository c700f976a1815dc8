//! Shared helpers for the integration tests

#![allow(dead_code)]

use math_jacobi::{
    Communicator, JacobiConfig, JacobiError, JacobiReport, LocalCluster, SystemBuffers, jacobi,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Dense system in row-major storage
#[derive(Debug, Clone)]
pub struct TestSystem {
    pub n: usize,
    pub a: Vec<f64>,
    pub b: Vec<f64>,
}

impl TestSystem {
    pub fn new(n: usize, a: Vec<f64>, b: Vec<f64>) -> Self {
        Self { n, a, b }
    }

    /// Largest |a_ii|
    pub fn max_diagonal(&self) -> f64 {
        (0..self.n)
            .map(|i| self.a[i * self.n + i].abs())
            .fold(0.0, f64::max)
    }

    /// ||A x - b||_∞
    pub fn residual(&self, x: &[f64]) -> f64 {
        (0..self.n)
            .map(|i| {
                let row = &self.a[i * self.n..(i + 1) * self.n];
                let ax: f64 = row.iter().zip(x).map(|(a, x)| a * x).sum();
                (ax - self.b[i]).abs()
            })
            .fold(0.0, f64::max)
    }
}

/// Strictly diagonally dominant random system.
///
/// Off-diagonals are uniform in [-10, 10]; each diagonal is the absolute row
/// sum plus a random margin in [1, 11).
pub fn diagonally_dominant(n: usize, seed: u64) -> TestSystem {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut a = vec![0.0; n * n];
    let mut b = vec![0.0; n];

    for i in 0..n {
        let mut row_sum = 0.0;
        for j in 0..n {
            if i != j {
                let value: f64 = rng.random_range(-10.0..=10.0);
                a[i * n + j] = value;
                row_sum += value.abs();
            }
        }
        let margin: f64 = rng.random_range(-10.0..10.0);
        a[i * n + i] = row_sum + margin.abs() + 1.0;
        b[i] = rng.random_range(-10.0..=10.0);
    }

    TestSystem::new(n, a, b)
}

/// n x n identity with right-hand side `b`
pub fn identity(b: &[f64]) -> TestSystem {
    let n = b.len();
    let mut a = vec![0.0; n * n];
    for i in 0..n {
        a[i * n + i] = 1.0;
    }
    TestSystem::new(n, a, b.to_vec())
}

/// Outcome of one distributed solve
pub struct ClusterRun {
    /// Result on each rank, in rank order
    pub results: Vec<Result<JacobiReport, JacobiError>>,
    /// Coordinator output buffer
    pub x: Vec<f64>,
}

impl ClusterRun {
    /// Coordinator report, panicking if any rank failed
    pub fn report(&self) -> JacobiReport {
        for (rank, result) in self.results.iter().enumerate() {
            assert!(result.is_ok(), "rank {rank} failed: {result:?}");
        }
        self.results[0].clone().unwrap()
    }
}

/// Solve `system` on `ranks` threads
pub fn solve_on(ranks: usize, system: &TestSystem, config: &JacobiConfig) -> ClusterRun {
    let outputs = LocalCluster::new(ranks).run(|comm| {
        if comm.is_root() {
            let mut x = vec![0.0; system.n];
            let buffers = SystemBuffers::coordinator(system.n, &system.a, &system.b, &mut x);
            let result = jacobi(comm, buffers, config);
            (result, Some(x))
        } else {
            (jacobi(comm, SystemBuffers::worker(), config), None)
        }
    });

    let mut x = Vec::new();
    let mut results = Vec::with_capacity(outputs.len());
    for (result, output) in outputs {
        if let Some(output) = output {
            x = output;
        }
        results.push(result);
    }
    ClusterRun { results, x }
}

/// Install a test logger once; repeated calls are ignored
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}
