//! The black-box MIP solver contract (C4): add variables and linear
//! constraints, set solver parameters, optimise, read primal values. The rest
//! of the crate never names a concrete solver type, only [`SolverBackend`].

#[cfg(feature = "gurobi")]
mod gurobi;
#[cfg(feature = "gurobi")]
pub use gurobi::GurobiBackend;

#[cfg(not(feature = "gurobi"))]
mod stub;
#[cfg(not(feature = "gurobi"))]
pub use stub::GurobiBackend;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarKind {
    Integer,
    Continuous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    LessEq,
    Equal,
    GreaterEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveStatus {
    Optimal,
    Feasible,
    Infeasible,
    Unbounded,
    TimeLimit,
    SolutionLimit,
}

impl SolveStatus {
    /// Whether this status carries a usable primal solution.
    pub fn has_solution(&self) -> bool {
        matches!(self, SolveStatus::Optimal | SolveStatus::Feasible | SolveStatus::TimeLimit | SolveStatus::SolutionLimit)
    }
}

#[derive(Debug, Clone)]
pub enum SolveError {
    Backend(String),
}

impl std::fmt::Display for SolveError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SolveError::Backend(msg) => write!(f, "solver error: {}", msg),
        }
    }
}

impl std::error::Error for SolveError {}

/// A sparse linear expression over a backend's variable handles.
#[derive(Debug, Clone)]
pub struct LinExpr<V> {
    pub terms: Vec<(V, f64)>,
}

impl<V: Copy> Default for LinExpr<V> {
    fn default() -> Self {
        LinExpr { terms: Vec::new() }
    }
}

impl<V: Copy> LinExpr<V> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_term(&mut self, var: V, coeff: f64) -> &mut Self {
        self.terms.push((var, coeff));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

impl<V: Copy> FromIterator<(V, f64)> for LinExpr<V> {
    fn from_iter<I: IntoIterator<Item = (V, f64)>>(iter: I) -> Self {
        LinExpr { terms: iter.into_iter().collect() }
    }
}

/// The black-box contract the model builder (C3) and refinement loop (C5)
/// talk to. One concrete implementation (behind the `gurobi` feature) wraps
/// the vendored MIP solver; without that feature, a stub implementation
/// reports a descriptive error, so the rest of the crate remains fully
/// testable without a local solver installation.
pub trait SolverBackend {
    type Var: Copy;

    fn add_var(&mut self, kind: VarKind, obj: f64, lb: f64, ub: f64, name: &str) -> Result<Self::Var, SolveError>;
    fn set_start(&mut self, var: Self::Var, value: f64) -> Result<(), SolveError>;
    fn add_constr(&mut self, expr: &LinExpr<Self::Var>, sense: Sense, rhs: f64, name: &str) -> Result<(), SolveError>;
    fn set_time_limit(&mut self, seconds: f64) -> Result<(), SolveError>;
    fn set_solution_limit(&mut self, limit: Option<u32>) -> Result<(), SolveError>;
    fn set_threads(&mut self, threads: u32) -> Result<(), SolveError>;
    fn set_mip_focus(&mut self, focus: u32) -> Result<(), SolveError>;
    fn optimize(&mut self) -> Result<SolveStatus, SolveError>;
    fn value(&self, var: Self::Var) -> Result<f64, SolveError>;
}

/// Two-phase invocation (§4.4): first optimise with `solutionLimit = 1` to
/// obtain any feasible solution within `time_limit`, then clear the solution
/// limit and continue for up to `solution_time_limit` more seconds (bounded
/// by whatever remains of `time_limit`) to improve the incumbent.
pub fn run_two_phase<B: SolverBackend>(
    backend: &mut B,
    time_limit: f64,
    solution_time_limit: f64,
) -> Result<SolveStatus, SolveError> {
    let start = std::time::Instant::now();
    backend.set_solution_limit(Some(1))?;
    backend.set_time_limit(time_limit)?;
    let status = backend.optimize()?;
    if !status.has_solution() {
        return Ok(status);
    }

    backend.set_solution_limit(None)?;
    let elapsed = start.elapsed().as_secs_f64();
    let remaining = (time_limit - elapsed).max(0.0).min(solution_time_limit);
    backend.set_time_limit(remaining)?;
    backend.optimize()
}
