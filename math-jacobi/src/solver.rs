//! Distributed Jacobi solver
//!
//! [`JacobiSolver`] drives one solve through its lifecycle:
//!
//! ```text
//! Uninitialized --validate--> Validated --initialize--> Partitioned
//!     --execute--> Iterating --> Converged | MaxIterationsReached
//!     --finalize--> Assembled
//! ```
//!
//! Every lifecycle call is collective: all ranks must call it in the same
//! order. Only the coordinator passes real buffers; workers pass
//! [`SystemBuffers::worker`]. The settings that steer the iteration are taken
//! from the coordinator's [`JacobiConfig`] during validation.
//!
//! # Example
//!
//! ```
//! use math_jacobi::{JacobiConfig, LocalCluster, SystemBuffers, jacobi};
//! use math_jacobi::comm::Communicator;
//!
//! let a = [4.0, 1.0, 2.0, 3.0];
//! let b = [1.0, 2.0];
//! let config = JacobiConfig::default();
//!
//! let results = LocalCluster::new(2).run(|comm| {
//!     let mut x = [0.0; 2];
//!     let buffers = if comm.is_root() {
//!         SystemBuffers::coordinator(2, &a, &b, &mut x)
//!     } else {
//!         SystemBuffers::worker()
//!     };
//!     let report = jacobi(comm, buffers, &config).unwrap();
//!     (report.converged(), x)
//! });
//!
//! let (converged, x) = results[0];
//! assert!(converged);
//! assert!((x[0] - 0.1).abs() < 1e-5 && (x[1] - 0.6).abs() < 1e-5);
//! ```

use crate::assemble::{JacobiReport, assemble};
use crate::blas_helpers::residual_inf_norm;
use crate::buffers::SystemBuffers;
use crate::comm::Communicator;
use crate::convergence::Termination;
use crate::engine::{InitialGuess, JacobiEngine, RunSummary};
use crate::error::JacobiError;
use crate::partition::{check_distributed_diagonal, distribute};
use crate::validate::{DominanceCheck, ValidatedSystem, validate_system};

/// Number of `u64` words in the encoded shared settings
pub(crate) const SETTINGS_WORDS: usize = 5;

/// Jacobi solver configuration
///
/// `max_iterations`, `tolerance`, `diagonal_tolerance` and `initial_guess` are
/// shared: on a successful validation every rank adopts the coordinator's
/// values. `print_interval` and `dominance` only act on the coordinator.
#[derive(Debug, Clone)]
pub struct JacobiConfig {
    /// Maximum number of rounds (K_max)
    pub max_iterations: usize,
    /// Convergence tolerance ε on the maximum change between rounds (> 0)
    pub tolerance: f64,
    /// Log progress every N rounds (0 = no output)
    pub print_interval: usize,
    /// Diagonal entries with |a_ii| at or below this are rejected as singular
    pub diagonal_tolerance: f64,
    /// Policy for rows that are not diagonally dominant
    pub dominance: DominanceCheck,
    /// Starting iterate
    pub initial_guess: InitialGuess,
}

impl Default for JacobiConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-6,
            print_interval: 0,
            diagonal_tolerance: 1e-30,
            dominance: DominanceCheck::Warn,
            initial_guess: InitialGuess::Zero,
        }
    }
}

impl JacobiConfig {
    /// Reject values the iteration cannot work with
    pub fn validate(&self) -> Result<(), JacobiError> {
        // Convergence needs Δ < tolerance, which no Δ meets for tolerance 0
        if !(self.tolerance > 0.0) {
            return Err(JacobiError::InvalidConfig(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if !(self.diagonal_tolerance >= 0.0) {
            return Err(JacobiError::InvalidConfig(format!(
                "diagonal tolerance must be non-negative, got {}",
                self.diagonal_tolerance
            )));
        }
        if let InitialGuess::Constant(value) = self.initial_guess {
            if !value.is_finite() {
                return Err(JacobiError::InvalidConfig(format!(
                    "initial guess must be finite, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Encode the shared settings
    pub(crate) fn shared_words(&self) -> [u64; SETTINGS_WORDS] {
        let (guess_kind, guess_value) = match self.initial_guess {
            InitialGuess::Zero => (0, 0),
            InitialGuess::Constant(value) => (1, value.to_bits()),
        };
        [
            self.max_iterations as u64,
            self.tolerance.to_bits(),
            self.diagonal_tolerance.to_bits(),
            guess_kind,
            guess_value,
        ]
    }

    /// Copy of this configuration with the shared settings taken from `words`
    pub(crate) fn with_shared_words(&self, words: &[u64; SETTINGS_WORDS]) -> Self {
        let initial_guess = match words[3] {
            0 => InitialGuess::Zero,
            _ => InitialGuess::Constant(f64::from_bits(words[4])),
        };
        Self {
            max_iterations: words[0] as usize,
            tolerance: f64::from_bits(words[1]),
            diagonal_tolerance: f64::from_bits(words[2]),
            initial_guess,
            ..self.clone()
        }
    }
}

/// Lifecycle state of a [`JacobiSolver`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    Uninitialized,
    Validated,
    Partitioned,
    Iterating,
    Converged,
    MaxIterationsReached,
    Assembled,
    /// A lifecycle step returned an error; the solver cannot continue
    Failed,
}

/// One distributed solve on one rank
pub struct JacobiSolver<'a, 'c, C: Communicator> {
    comm: &'c C,
    config: JacobiConfig,
    buffers: SystemBuffers<'a>,
    state: SolverState,
    system: Option<ValidatedSystem<'a>>,
    engine: Option<JacobiEngine<'c, C>>,
    summary: Option<RunSummary>,
}

impl<'a, 'c, C: Communicator> JacobiSolver<'a, 'c, C> {
    pub fn new(comm: &'c C, buffers: SystemBuffers<'a>, config: JacobiConfig) -> Self {
        Self {
            comm,
            config,
            buffers,
            state: SolverState::Uninitialized,
            system: None,
            engine: None,
            summary: None,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> SolverState {
        self.state
    }

    /// Configuration in use (the coordinator's shared settings once validated)
    pub fn config(&self) -> &JacobiConfig {
        &self.config
    }

    fn require(&self, expected: SolverState) -> Result<(), JacobiError> {
        if self.state != expected {
            return Err(JacobiError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    fn track<T>(&mut self, result: Result<T, JacobiError>) -> Result<T, JacobiError> {
        if result.is_err() {
            self.state = SolverState::Failed;
        }
        result
    }

    /// Check shapes, diagonal and configuration on every rank.
    ///
    /// `validate().is_ok()` is the boolean validation contract.
    pub fn validate(&mut self) -> Result<(), JacobiError> {
        self.require(SolverState::Uninitialized)?;
        let result = validate_system(self.comm, &self.buffers, &self.config);
        let system = self.track(result)?;
        self.config = system.config().clone();
        self.system = Some(system);
        self.state = SolverState::Validated;
        Ok(())
    }

    /// Partition the rows and distribute them from the coordinator
    pub fn initialize(&mut self) -> Result<(), JacobiError> {
        self.require(SolverState::Validated)?;
        let result = self.distribute();
        let engine = self.track(result)?;
        self.engine = Some(engine);
        self.state = SolverState::Partitioned;
        Ok(())
    }

    fn distribute(&self) -> Result<JacobiEngine<'c, C>, JacobiError> {
        let system = self.system.as_ref().ok_or(JacobiError::InvalidState {
            expected: SolverState::Validated,
            actual: self.state,
        })?;
        let block = distribute(self.comm, system.n(), system.view())?;
        check_distributed_diagonal(self.comm, &block, self.config.diagonal_tolerance)?;
        if self.comm.is_root() {
            log::debug!(
                "Partitioned {} rows over {} ranks (parallel row updates: {})",
                system.n(),
                self.comm.size(),
                cfg!(feature = "rayon")
            );
        }
        Ok(JacobiEngine::new(
            self.comm,
            block,
            self.config.initial_guess,
        ))
    }

    /// Run rounds until convergence or the round cap
    pub fn execute(&mut self) -> Result<RunSummary, JacobiError> {
        self.require(SolverState::Partitioned)?;
        self.state = SolverState::Iterating;

        let result = match self.engine.as_mut() {
            Some(engine) => engine.run(&self.config),
            None => Err(JacobiError::InvalidState {
                expected: SolverState::Partitioned,
                actual: SolverState::Iterating,
            }),
        };
        let summary = self.track(result)?;

        self.state = match summary.termination {
            Termination::Converged => SolverState::Converged,
            Termination::MaxIterationsReached => SolverState::MaxIterationsReached,
        };
        if self.comm.is_root() {
            match summary.termination {
                Termination::Converged => log::info!(
                    "Jacobi converged after {} rounds (max change {:.3e})",
                    summary.iterations,
                    summary.delta
                ),
                Termination::MaxIterationsReached => log::warn!(
                    "Jacobi stopped after {} rounds without converging (max change {:.3e}, tolerance {:.3e})",
                    summary.iterations,
                    summary.delta,
                    self.config.tolerance
                ),
            }
        }
        self.summary = Some(summary);
        Ok(summary)
    }

    /// Gather the solution into the coordinator's output buffer
    pub fn finalize(&mut self) -> Result<JacobiReport, JacobiError> {
        if self.state != SolverState::MaxIterationsReached {
            self.require(SolverState::Converged)?;
        }
        let result = self.assemble();
        let report = self.track(result)?;
        self.state = SolverState::Assembled;
        Ok(report)
    }

    fn assemble(&mut self) -> Result<JacobiReport, JacobiError> {
        let (Some(engine), Some(summary)) = (self.engine.as_ref(), self.summary) else {
            return Err(JacobiError::InvalidState {
                expected: SolverState::Converged,
                actual: self.state,
            });
        };

        let solution = assemble(self.comm, engine.partition(), &engine.owned_values())?;

        let mut residual = None;
        if let Some(x) = solution {
            if let Some(output) = self.buffers.output.as_mut() {
                output.write(&x.to_vec())?;
            }
            residual = self
                .system
                .as_ref()
                .and_then(|system| system.view())
                .map(|view| residual_inf_norm(view.matrix, x.view(), view.rhs));
        }

        Ok(JacobiReport {
            termination: summary.termination,
            iterations: summary.iterations,
            delta: summary.delta,
            residual,
        })
    }

    /// Run validate, initialize, execute and finalize in order
    pub fn solve(&mut self) -> Result<JacobiReport, JacobiError> {
        self.validate()?;
        self.initialize()?;
        self.execute()?;
        self.finalize()
    }
}

/// Solve A x = b with the Jacobi method across all ranks of `comm`
pub fn jacobi<C: Communicator>(
    comm: &C,
    buffers: SystemBuffers<'_>,
    config: &JacobiConfig,
) -> Result<JacobiReport, JacobiError> {
    JacobiSolver::new(comm, buffers, config.clone()).solve()
}
