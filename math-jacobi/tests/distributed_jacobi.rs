//! Integration tests for the distributed Jacobi solver
//!
//! Every scenario runs on in-process rank clusters of several sizes and checks
//! that all ranks agree on the outcome.

mod common;

use approx::assert_relative_eq;
use common::{TestSystem, diagonally_dominant, identity, init_logging, solve_on};
use math_jacobi::{
    Communicator, DominanceCheck, InitialGuess, JacobiConfig, JacobiError, JacobiSolver,
    LocalCluster, ShapeField, SingleProcess, SolverState, Stage, SystemBuffers, Termination,
    jacobi,
};

const RANK_COUNTS: [usize; 4] = [1, 2, 4, 8];

#[test]
fn test_two_by_two_system() {
    init_logging();
    let system = TestSystem::new(2, vec![4.0, 1.0, 2.0, 3.0], vec![1.0, 2.0]);
    let config = JacobiConfig::default();

    for ranks in [1, 2] {
        let run = solve_on(ranks, &system, &config);
        let report = run.report();
        assert!(report.converged());
        assert!(report.delta < config.tolerance);
        assert_relative_eq!(run.x[0], 0.1, epsilon = 1e-5);
        assert_relative_eq!(run.x[1], 0.6, epsilon = 1e-5);
    }
}

#[test]
fn test_identity_converges_in_one_round() {
    let v = [3.5, -1.0, 0.0, 2.25, 7.0];
    let system = identity(&v);

    for ranks in RANK_COUNTS {
        let run = solve_on(ranks, &system, &JacobiConfig::default());
        let report = run.report();
        assert_eq!(report.termination, Termination::Converged);
        assert_eq!(report.iterations, 1);
        assert_eq!(run.x, v.to_vec(), "ranks = {ranks}");
        assert_eq!(report.residual, Some(0.0));
    }
}

#[test]
fn test_single_unknown() {
    let system = TestSystem::new(1, vec![5.0], vec![10.0]);
    for ranks in [1, 3] {
        let run = solve_on(ranks, &system, &JacobiConfig::default());
        let report = run.report();
        assert!(report.converged());
        assert_eq!(report.iterations, 1);
        assert_eq!(run.x, vec![2.0]);
    }
}

#[test]
fn test_zero_diagonal_fails_on_every_rank() {
    let mut system = diagonally_dominant(3, 7);
    system.a[4] = 0.0;

    for ranks in [1, 3, 4] {
        let run = solve_on(ranks, &system, &JacobiConfig::default());
        for result in &run.results {
            assert_eq!(
                *result,
                Err(JacobiError::SingularDiagonal { row: 1, value: 0.0 })
            );
        }
        // No iteration ran, so the output is untouched
        assert_eq!(run.x, vec![0.0; 3]);
    }
}

#[test]
fn test_round_cap_reports_unconverged() {
    // Spectral radius 0.9: dominant, but slow
    let system = TestSystem::new(2, vec![1.0, 0.9, 0.9, 1.0], vec![1.0, 1.0]);
    let config = JacobiConfig {
        max_iterations: 1,
        ..JacobiConfig::default()
    };
    let exact = 1.0 / 1.9;

    for ranks in [1, 2] {
        let run = solve_on(ranks, &system, &config);
        for result in &run.results {
            let report = result.as_ref().unwrap();
            assert_eq!(report.termination, Termination::MaxIterationsReached);
            assert_eq!(report.iterations, 1);
        }
        assert_eq!(run.x, vec![1.0, 1.0]);
        assert!((run.x[0] - exact).abs() > config.tolerance);
    }
}

#[test]
fn test_residual_bound_on_random_systems() {
    let config = JacobiConfig::default();
    for (n, seed) in [(10, 1), (50, 42), (101, 3)] {
        let system = diagonally_dominant(n, seed);
        let bound = config.tolerance * system.max_diagonal();

        let run = solve_on(4, &system, &config);
        let report = run.report();
        assert!(report.converged());
        assert!(system.residual(&run.x) < bound, "n = {n}");
        assert!(report.residual.unwrap() < bound);
    }
}

#[test]
fn test_results_independent_of_rank_count() {
    let system = diagonally_dominant(37, 2024);
    let config = JacobiConfig {
        tolerance: 1e-10,
        ..JacobiConfig::default()
    };

    let reference = solve_on(1, &system, &config);
    let expected_iterations = reference.report().iterations;

    for ranks in RANK_COUNTS {
        let run = solve_on(ranks, &system, &config);
        assert_eq!(run.report().iterations, expected_iterations);
        assert_eq!(run.x, reference.x, "ranks = {ranks}");
    }
}

#[test]
fn test_repeated_solves_are_identical() {
    let system = diagonally_dominant(20, 99);
    let config = JacobiConfig::default();

    let first = solve_on(3, &system, &config);
    let second = solve_on(3, &system, &config);
    assert_eq!(first.report(), second.report());
    assert_eq!(first.x, second.x);
}

#[test]
fn test_more_ranks_than_rows() {
    let system = diagonally_dominant(3, 5);
    let config = JacobiConfig::default();

    let reference = solve_on(1, &system, &config);
    let run = solve_on(8, &system, &config);
    assert!(run.report().converged());
    assert_eq!(run.x, reference.x);
    for result in &run.results[3..] {
        assert!(result.as_ref().unwrap().residual.is_none());
    }
}

#[test]
fn test_byte_buffers_match_typed_buffers() {
    let system = diagonally_dominant(6, 11);
    let config = JacobiConfig::default();
    let typed = solve_on(2, &system, &config);

    let to_bytes = |values: &[f64]| -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    };
    let a = to_bytes(&system.a);
    let b = to_bytes(&system.b);
    let mut out = vec![0u8; system.n * 8];

    let report = jacobi(
        &SingleProcess,
        SystemBuffers::coordinator_bytes(system.n, &a, &b, &mut out),
        &config,
    )
    .unwrap();
    assert!(report.converged());

    let x: Vec<f64> = out
        .chunks_exact(8)
        .map(|chunk| f64::from_le_bytes(chunk.try_into().unwrap()))
        .collect();
    assert_eq!(x, typed.x);
}

#[test]
fn test_shape_errors_on_every_rank() {
    let mut system = diagonally_dominant(4, 8);
    system.a.pop();

    let run = solve_on(3, &system, &JacobiConfig::default());
    for result in &run.results {
        assert_eq!(
            *result,
            Err(JacobiError::Shape {
                field: ShapeField::Matrix,
                expected: 16,
                actual: 15
            })
        );
    }
}

#[test]
fn test_output_buffer_too_small() {
    let system = identity(&[1.0, 2.0, 3.0]);
    let mut x = [0.0; 2];
    let result = jacobi(
        &SingleProcess,
        SystemBuffers::coordinator(3, &system.a, &system.b, &mut x),
        &JacobiConfig::default(),
    );
    assert_eq!(
        result,
        Err(JacobiError::OutputTooSmall {
            required: 3,
            capacity: 2
        })
    );
}

#[test]
fn test_empty_system_rejected() {
    let mut x: [f64; 0] = [];
    let result = jacobi(
        &SingleProcess,
        SystemBuffers::coordinator(0, &[], &[], &mut x),
        &JacobiConfig::default(),
    );
    assert_eq!(result, Err(JacobiError::EmptySystem));
}

#[test]
fn test_nan_input_is_non_finite() {
    let mut system = diagonally_dominant(5, 13);
    system.b[4] = f64::NAN;

    let run = solve_on(2, &system, &JacobiConfig::default());
    for result in &run.results {
        assert_eq!(*result, Err(JacobiError::NonFinite { iteration: 0 }));
    }
}

#[test]
fn test_change_equal_to_tolerance_is_not_converged() {
    let system = identity(&[0.5]);

    // First change is exactly 0.5: one more round is needed
    let config = JacobiConfig {
        tolerance: 0.5,
        ..JacobiConfig::default()
    };
    let run = solve_on(1, &system, &config);
    assert_eq!(run.report().iterations, 1);
    assert_eq!(run.x, vec![0.5]);

    // Below the tolerance the initial guess is accepted as is
    let config = JacobiConfig {
        tolerance: 0.6,
        ..JacobiConfig::default()
    };
    let run = solve_on(1, &system, &config);
    assert_eq!(run.report().iterations, 0);
    assert_eq!(run.x, vec![0.0]);
}

#[test]
fn test_enforced_dominance_rejects_on_every_rank() {
    let system = TestSystem::new(2, vec![1.0, 2.0, 0.0, 1.0], vec![1.0, 1.0]);
    let config = JacobiConfig {
        dominance: DominanceCheck::Enforce,
        ..JacobiConfig::default()
    };
    let run = solve_on(2, &system, &config);
    for result in &run.results {
        assert_eq!(*result, Err(JacobiError::NotDiagonallyDominant { row: 0 }));
    }

    // Upper triangular: Jacobi still converges under the default warning
    let run = solve_on(2, &system, &JacobiConfig::default());
    assert!(run.report().converged());
    assert_relative_eq!(run.x[0], -1.0, epsilon = 1e-9);
    assert_relative_eq!(run.x[1], 1.0, epsilon = 1e-9);
}

#[test]
fn test_constant_initial_guess() {
    let system = TestSystem::new(2, vec![4.0, 1.0, 2.0, 3.0], vec![1.0, 2.0]);
    let config = JacobiConfig {
        initial_guess: InitialGuess::Constant(10.0),
        tolerance: 1e-10,
        ..JacobiConfig::default()
    };
    let run = solve_on(2, &system, &config);
    assert!(run.report().converged());
    assert_relative_eq!(run.x[0], 0.1, epsilon = 1e-9);
    assert_relative_eq!(run.x[1], 0.6, epsilon = 1e-9);
}

#[test]
fn test_worker_config_error_aborts_coordinator() {
    let system = identity(&[1.0, 2.0]);
    let results = LocalCluster::new(2).run(|comm| {
        let mut config = JacobiConfig::default();
        let mut x = [0.0; 2];
        let buffers = if comm.is_root() {
            SystemBuffers::coordinator(2, &system.a, &system.b, &mut x)
        } else {
            config.diagonal_tolerance = -1.0;
            SystemBuffers::worker()
        };
        jacobi(comm, buffers, &config)
    });
    assert_eq!(
        results[0],
        Err(JacobiError::Aborted {
            stage: Stage::Validation
        })
    );
    assert!(matches!(results[1], Err(JacobiError::InvalidConfig(_))));
}

#[test]
fn test_step_by_step_lifecycle_on_cluster() {
    let system = diagonally_dominant(9, 21);
    let states = LocalCluster::new(3).run(|comm| {
        let mut x = vec![0.0; system.n];
        let buffers = if comm.is_root() {
            SystemBuffers::coordinator(system.n, &system.a, &system.b, &mut x)
        } else {
            SystemBuffers::worker()
        };
        let mut solver = JacobiSolver::new(comm, buffers, JacobiConfig::default());

        let mut states = vec![solver.state()];
        // Skipping a step is rejected without touching the communicator
        assert!(matches!(
            solver.initialize(),
            Err(JacobiError::InvalidState { .. })
        ));
        solver.validate().unwrap();
        states.push(solver.state());
        solver.initialize().unwrap();
        states.push(solver.state());
        solver.execute().unwrap();
        states.push(solver.state());
        solver.finalize().unwrap();
        states.push(solver.state());
        states
    });

    for rank_states in states {
        assert_eq!(
            rank_states,
            vec![
                SolverState::Uninitialized,
                SolverState::Validated,
                SolverState::Partitioned,
                SolverState::Converged,
                SolverState::Assembled,
            ]
        );
    }
}

#[test]
fn test_workers_follow_coordinator_stopping_settings() {
    let system = TestSystem::new(2, vec![1.0, 0.9, 0.9, 1.0], vec![1.0, 1.0]);
    let coordinator = JacobiConfig::default();
    let worker = JacobiConfig {
        tolerance: 0.5,
        max_iterations: 3,
        initial_guess: InitialGuess::Constant(4.0),
        ..JacobiConfig::default()
    };
    let reference = solve_on(1, &system, &coordinator);

    let results = LocalCluster::new(2).run(|comm| {
        let mut x = [0.0; 2];
        let result = if comm.is_root() {
            let buffers = SystemBuffers::coordinator(2, &system.a, &system.b, &mut x);
            jacobi(comm, buffers, &coordinator)
        } else {
            jacobi(comm, SystemBuffers::worker(), &worker)
        };
        (result, x)
    });

    let expected = reference.report();
    assert!(expected.converged());
    for (result, _) in &results {
        let report = result.as_ref().unwrap();
        assert_eq!(report.termination, expected.termination);
        assert_eq!(report.iterations, expected.iterations);
        assert_eq!(report.delta, expected.delta);
    }
    assert_eq!(results[0].1.to_vec(), reference.x);
}

#[test]
fn test_large_local_block_matches_split_blocks() {
    // A single rank holds n² >= PARALLEL_MIN_WORK entries and takes the
    // parallel sweep when the rayon feature is enabled
    let n = 140;
    assert!(n * n >= math_jacobi::engine::PARALLEL_MIN_WORK);
    let system = diagonally_dominant(n, 77);
    let config = JacobiConfig {
        tolerance: 1e-10,
        ..JacobiConfig::default()
    };

    let whole = solve_on(1, &system, &config);
    assert!(whole.report().converged());
    for ranks in [2, 4, 8] {
        let split = solve_on(ranks, &system, &config);
        assert_eq!(split.report().iterations, whole.report().iterations);
        let bits = |x: &[f64]| x.iter().map(|v| v.to_bits()).collect::<Vec<_>>();
        assert_eq!(bits(&split.x), bits(&whole.x), "ranks = {ranks}");
    }
}
