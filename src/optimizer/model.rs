//! Thin MILP modelling layer over `good_lp`.
//!
//! `good_lp` builds a problem in one shot and offers no way to drop a
//! constraint once added. This layer keeps the definitions itself (variables,
//! named constraints, objective) and hands a fresh problem to the `microlp`
//! backend on every [`LinearModel::solve`], so a named constraint can be
//! located, removed and re-added between solves.

use std::iter::Sum;
use std::ops::{Add, Mul, Sub};

use good_lp::{
    constraint, microlp, variable, Expression, ProblemVariables, ResolutionError, Solution,
    SolverModel, Variable,
};
use tracing::{debug, warn};

use crate::domain::SolverStatus;

/// Handle to a variable of a [`LinearModel`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VarId(usize);

#[derive(Debug, Clone, Copy, PartialEq)]
enum VarKind {
    Continuous { lower: Option<f64>, upper: Option<f64> },
    Binary,
}

/// Affine expression `sum(coef * var) + constant`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearExpr {
    terms: Vec<(VarId, f64)>,
    constant: f64,
}

impl LinearExpr {
    pub fn constant(value: f64) -> Self {
        Self {
            terms: Vec::new(),
            constant: value,
        }
    }

    fn to_expression(&self, vars: &[Variable]) -> Expression {
        self.terms
            .iter()
            .map(|(var, coef)| *coef * vars[var.0])
            .sum::<Expression>()
            + self.constant
    }
}

impl From<VarId> for LinearExpr {
    fn from(var: VarId) -> Self {
        Self {
            terms: vec![(var, 1.0)],
            constant: 0.0,
        }
    }
}

impl From<f64> for LinearExpr {
    fn from(value: f64) -> Self {
        Self::constant(value)
    }
}

impl<T: Into<LinearExpr>> Add<T> for LinearExpr {
    type Output = LinearExpr;

    fn add(mut self, rhs: T) -> LinearExpr {
        let rhs = rhs.into();
        self.terms.extend(rhs.terms);
        self.constant += rhs.constant;
        self
    }
}

impl<T: Into<LinearExpr>> Sub<T> for LinearExpr {
    type Output = LinearExpr;

    fn sub(self, rhs: T) -> LinearExpr {
        self + rhs.into() * -1.0
    }
}

impl Mul<f64> for LinearExpr {
    type Output = LinearExpr;

    fn mul(mut self, rhs: f64) -> LinearExpr {
        for (_, coef) in &mut self.terms {
            *coef *= rhs;
        }
        self.constant *= rhs;
        self
    }
}

impl Mul<VarId> for f64 {
    type Output = LinearExpr;

    fn mul(self, rhs: VarId) -> LinearExpr {
        LinearExpr::from(rhs) * self
    }
}

impl Mul<LinearExpr> for f64 {
    type Output = LinearExpr;

    fn mul(self, rhs: LinearExpr) -> LinearExpr {
        rhs * self
    }
}

impl<T: Into<LinearExpr>> Sum<T> for LinearExpr {
    fn sum<I: Iterator<Item = T>>(iter: I) -> Self {
        iter.fold(LinearExpr::default(), |acc, e| acc + e)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    LessOrEqual,
    GreaterOrEqual,
    Equal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sense {
    Minimise,
    Maximise,
}

/// `expr <relation> rhs`, optionally named so it can be found again
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraint {
    pub expr: LinearExpr,
    pub relation: Relation,
    pub rhs: f64,
    pub name: Option<String>,
}

impl LinearConstraint {
    fn to_constraint(&self, vars: &[Variable]) -> good_lp::Constraint {
        let lhs = self.expr.to_expression(vars);
        let rhs = self.rhs;
        match self.relation {
            Relation::LessOrEqual => constraint!(lhs <= rhs),
            Relation::GreaterOrEqual => constraint!(lhs >= rhs),
            Relation::Equal => constraint!(lhs == rhs),
        }
    }
}

/// Mutable MILP definition with value read-back after [`solve`](Self::solve).
#[derive(Debug, Clone, Default)]
pub struct LinearModel {
    variables: Vec<VarKind>,
    constraints: Vec<LinearConstraint>,
    objective: Option<(Sense, LinearExpr)>,
    values: Option<Vec<f64>>,
}

impl LinearModel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continuous variable; `None` leaves that side unbounded
    pub fn add_continuous_variable(&mut self, lower: Option<f64>, upper: Option<f64>) -> VarId {
        self.variables.push(VarKind::Continuous { lower, upper });
        VarId(self.variables.len() - 1)
    }

    pub fn add_binary_variable(&mut self) -> VarId {
        self.variables.push(VarKind::Binary);
        VarId(self.variables.len() - 1)
    }

    pub fn add_constraint(
        &mut self,
        expr: impl Into<LinearExpr>,
        relation: Relation,
        rhs: f64,
        name: Option<&str>,
    ) {
        self.constraints.push(LinearConstraint {
            expr: expr.into(),
            relation,
            rhs,
            name: name.map(str::to_string),
        });
    }

    pub fn find_constraint_by_name(&self, name: &str) -> Option<&LinearConstraint> {
        self.constraints
            .iter()
            .find(|c| c.name.as_deref() == Some(name))
    }

    /// Remove every constraint carrying `name`; returns how many were removed
    pub fn remove_constraint(&mut self, name: &str) -> usize {
        let before = self.constraints.len();
        self.constraints.retain(|c| c.name.as_deref() != Some(name));
        before - self.constraints.len()
    }

    pub fn set_objective(&mut self, sense: Sense, expr: impl Into<LinearExpr>) {
        self.objective = Some((sense, expr.into()));
    }

    pub fn num_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn num_constraints(&self) -> usize {
        self.constraints.len()
    }

    /// Value of `var` in the last solution, if the last solve produced one
    pub fn value(&self, var: VarId) -> Option<f64> {
        self.values.as_ref().and_then(|v| v.get(var.0).copied())
    }

    pub fn solve(&mut self) -> SolverStatus {
        self.values = None;

        let mut problem = ProblemVariables::new();
        let vars: Vec<Variable> = self
            .variables
            .iter()
            .map(|kind| match *kind {
                VarKind::Binary => problem.add(variable().binary()),
                VarKind::Continuous { lower, upper } => {
                    let mut def = variable();
                    if let Some(lower) = lower {
                        def = def.min(lower);
                    }
                    if let Some(upper) = upper {
                        def = def.max(upper);
                    }
                    problem.add(def)
                }
            })
            .collect();

        let (sense, objective) = match &self.objective {
            Some((sense, expr)) => (*sense, expr.to_expression(&vars)),
            None => (Sense::Minimise, LinearExpr::default().to_expression(&vars)),
        };

        let unsolved = match sense {
            Sense::Minimise => problem.minimise(objective),
            Sense::Maximise => problem.maximise(objective),
        };

        let mut solver = unsolved.using(microlp);
        for c in &self.constraints {
            solver = solver.with(c.to_constraint(&vars));
        }

        debug!(
            variables = vars.len(),
            constraints = self.constraints.len(),
            "solving MILP"
        );

        match solver.solve() {
            Ok(solution) => {
                self.values = Some(vars.iter().map(|v| solution.value(*v)).collect());
                SolverStatus::Optimal
            }
            Err(ResolutionError::Infeasible) => SolverStatus::Infeasible,
            Err(ResolutionError::Unbounded) => SolverStatus::Unbounded,
            Err(err) => {
                warn!(error = %err, "solver returned no solution");
                SolverStatus::NoSolutionFound
            }
        }
    }
}
