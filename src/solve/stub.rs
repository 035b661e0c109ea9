//! Stub `SolverBackend` for builds without the `gurobi` feature, so the rest
//! of the crate (discretisation, preprocessing, serialisation, the model
//! builder's structural checks) compiles and tests run without a local
//! solver installation.

use super::{LinExpr, Sense, SolveError, SolveStatus, SolverBackend, VarKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StubVar(usize);

#[derive(Default)]
pub struct GurobiBackend {
    var_count: usize,
}

impl GurobiBackend {
    pub fn new(_name: &str) -> Result<Self, SolveError> {
        Ok(GurobiBackend::default())
    }
}

impl SolverBackend for GurobiBackend {
    type Var = StubVar;

    fn add_var(&mut self, _kind: VarKind, _obj: f64, _lb: f64, _ub: f64, _name: &str) -> Result<Self::Var, SolveError> {
        let idx = self.var_count;
        self.var_count += 1;
        Ok(StubVar(idx))
    }

    fn set_start(&mut self, _var: Self::Var, _value: f64) -> Result<(), SolveError> {
        Ok(())
    }

    fn add_constr(&mut self, _expr: &LinExpr<Self::Var>, _sense: Sense, _rhs: f64, _name: &str) -> Result<(), SolveError> {
        Ok(())
    }

    fn set_time_limit(&mut self, _seconds: f64) -> Result<(), SolveError> {
        Ok(())
    }

    fn set_solution_limit(&mut self, _limit: Option<u32>) -> Result<(), SolveError> {
        Ok(())
    }

    fn set_threads(&mut self, _threads: u32) -> Result<(), SolveError> {
        Ok(())
    }

    fn set_mip_focus(&mut self, _focus: u32) -> Result<(), SolveError> {
        Ok(())
    }

    fn optimize(&mut self) -> Result<SolveStatus, SolveError> {
        Err(SolveError::Backend("Gurobi feature not enabled in this build".to_string()))
    }

    fn value(&self, _var: Self::Var) -> Result<f64, SolveError> {
        Err(SolveError::Backend("Gurobi feature not enabled in this build".to_string()))
    }
}
