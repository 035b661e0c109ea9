//! `SolverBackend` implementation over the vendored Gurobi bindings.

use super::{LinExpr, Sense, SolveError, SolveStatus, SolverBackend, VarKind};
use grb::prelude::*;

pub struct GurobiBackend {
    model: Model,
    constr_count: usize,
}

impl GurobiBackend {
    pub fn new(name: &str) -> Result<Self, SolveError> {
        let env = Env::new("").map_err(|e| SolveError::Backend(format!("failed to create environment: {}", e)))?;
        let model = Model::with_env(name, env).map_err(|e| SolveError::Backend(format!("failed to create model: {}", e)))?;
        Ok(GurobiBackend { model, constr_count: 0 })
    }

    fn build_expr(terms: &[(Var, f64)]) -> Expr {
        terms.iter().map(|(v, c)| *v * *c).grb_sum()
    }
}

impl SolverBackend for GurobiBackend {
    type Var = Var;

    fn add_var(&mut self, kind: VarKind, obj: f64, lb: f64, ub: f64, name: &str) -> Result<Self::Var, SolveError> {
        let vtype = match kind {
            VarKind::Integer => VarType::Integer,
            VarKind::Continuous => VarType::Continuous,
        };
        self.model
            .add_var(name, vtype, obj, lb, ub, std::iter::empty())
            .map_err(|e| SolveError::Backend(format!("failed to add variable {}: {}", name, e)))
    }

    fn set_start(&mut self, var: Self::Var, value: f64) -> Result<(), SolveError> {
        self.model
            .set_obj_attr(attr::Start, &var, value)
            .map_err(|e| SolveError::Backend(format!("failed to set warm-start value: {}", e)))
    }

    fn add_constr(&mut self, expr: &LinExpr<Self::Var>, sense: Sense, rhs: f64, name: &str) -> Result<(), SolveError> {
        let lhs = Self::build_expr(&expr.terms);
        let constr_name = if name.is_empty() {
            self.constr_count += 1;
            format!("c{}", self.constr_count)
        } else {
            name.to_string()
        };
        let constraint = match sense {
            Sense::LessEq => c!(lhs <= rhs),
            Sense::Equal => c!(lhs == rhs),
            Sense::GreaterEq => c!(lhs >= rhs),
        };
        self.model
            .add_constr(&constr_name, constraint)
            .map(|_| ())
            .map_err(|e| SolveError::Backend(format!("failed to add constraint {}: {}", constr_name, e)))
    }

    fn set_time_limit(&mut self, seconds: f64) -> Result<(), SolveError> {
        self.model
            .set_param(param::TimeLimit, seconds)
            .map_err(|e| SolveError::Backend(format!("failed to set time limit: {}", e)))
    }

    fn set_solution_limit(&mut self, limit: Option<u32>) -> Result<(), SolveError> {
        // Gurobi has no "unset" for SolutionLimit; a very large bound is the
        // conventional way to clear it after an initial solutionLimit=1 phase.
        self.model
            .set_param(param::SolutionLimit, limit.unwrap_or(i32::MAX as u32) as i32)
            .map_err(|e| SolveError::Backend(format!("failed to set solution limit: {}", e)))
    }

    fn set_threads(&mut self, threads: u32) -> Result<(), SolveError> {
        self.model
            .set_param(param::Threads, threads as i32)
            .map_err(|e| SolveError::Backend(format!("failed to set thread count: {}", e)))
    }

    fn set_mip_focus(&mut self, focus: u32) -> Result<(), SolveError> {
        self.model
            .set_param(param::MIPFocus, focus as i32)
            .map_err(|e| SolveError::Backend(format!("failed to set MIP focus: {}", e)))
    }

    fn optimize(&mut self) -> Result<SolveStatus, SolveError> {
        self.model.update().map_err(|e| SolveError::Backend(format!("model update failed: {}", e)))?;
        self.model.optimize().map_err(|e| SolveError::Backend(format!("optimize failed: {}", e)))?;
        let status = self.model.status().map_err(|e| SolveError::Backend(format!("failed to read status: {}", e)))?;
        Ok(match status {
            Status::Optimal => SolveStatus::Optimal,
            Status::SubOptimal => SolveStatus::Feasible,
            Status::Infeasible => SolveStatus::Infeasible,
            Status::Unbounded | Status::InfOrUnbd => SolveStatus::Unbounded,
            Status::TimeLimit => SolveStatus::TimeLimit,
            Status::SolutionLimit => SolveStatus::SolutionLimit,
            other => return Err(SolveError::Backend(format!("unexpected solver status: {:?}", other))),
        })
    }

    fn value(&self, var: Self::Var) -> Result<f64, SolveError> {
        self.model.get_obj_attr(attr::X, &var).map_err(|e| SolveError::Backend(format!("failed to read variable value: {}", e)))
    }
}
