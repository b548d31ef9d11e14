//! MILP (Mixed-Integer Linear Programming) Optimizer
//!
//! Allocates a total demand across the fleet at minimum total power.
//!
//! The formulation, per compressor `i`:
//! - `on_i` binary, `flow_i >= 0`, `power_i` free
//! - `flow_i <= qmax_i * on_i` and `flow_i >= qmin_i * on_i`
//! - `power_i = alpha_i * flow_i + beta_i - beta_i * (1 - on_i)`
//!
//! plus one named, replaceable constraint `sum(flow_i) = Q` and the objective
//! `min sum(power_i)`. The binary zeroes the intercept of an idle unit, so no
//! big-M or separate fixed-cost term is needed.

use tracing::{debug, info};

use super::model::{LinearExpr, LinearModel, Relation, Sense, VarId};
use super::types::DispatchStrategy;
use crate::domain::{cost_models, AllocationResult, Compressor, SolverStatus, UnitAllocation};
use crate::error::{check_demand, DispatchError, DispatchResult};

/// Name of the demand constraint replaced on every solve
pub const DEMAND_CONSTRAINT: &str = "total_demand";

/// Solver output closer than this to zero is reported as exactly zero
const VALUE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy)]
struct UnitVars {
    on: VarId,
    flow: VarId,
    power: VarId,
}

/// The built model: variables and per-unit constraints, fixed after setup
#[derive(Debug, Clone)]
struct FleetModel {
    model: LinearModel,
    units: Vec<UnitVars>,
}

impl FleetModel {
    fn build(compressors: &[Compressor]) -> DispatchResult<Self> {
        let costs = cost_models(compressors)?;
        let mut model = LinearModel::new();
        let mut units = Vec::with_capacity(compressors.len());

        for (compressor, cost) in compressors.iter().zip(&costs) {
            let on = model.add_binary_variable();
            let flow = model.add_continuous_variable(Some(0.0), None);
            let power = model.add_continuous_variable(None, None);

            // flow <= qmax * on
            model.add_constraint(
                LinearExpr::from(flow) - compressor.qmax * on,
                Relation::LessOrEqual,
                0.0,
                None,
            );

            // flow >= qmin * on
            model.add_constraint(
                LinearExpr::from(flow) - compressor.qmin * on,
                Relation::GreaterOrEqual,
                0.0,
                None,
            );

            // power = alpha * flow + beta - beta * (1 - on)
            let affine = cost.alpha * flow + cost.beta
                - cost.beta * (LinearExpr::constant(1.0) - on);
            model.add_constraint(
                LinearExpr::from(power) - affine,
                Relation::Equal,
                0.0,
                None,
            );

            units.push(UnitVars { on, flow, power });
        }

        let total_power: LinearExpr = units.iter().map(|u| u.power).sum();
        model.set_objective(Sense::Minimise, total_power);

        Ok(Self { model, units })
    }

    /// Swap in the demand constraint for `demand`. Exclusive access through
    /// `&mut self` keeps the remove/add pair invisible to any other caller.
    fn replace_demand(&mut self, demand: f64) {
        if self.model.find_constraint_by_name(DEMAND_CONSTRAINT).is_some() {
            self.model.remove_constraint(DEMAND_CONSTRAINT);
        }

        let total_flow: LinearExpr = self.units.iter().map(|u| u.flow).sum();
        self.model
            .add_constraint(total_flow, Relation::Equal, demand, Some(DEMAND_CONSTRAINT));
    }

    fn read_result(&self, compressors: &[Compressor], status: SolverStatus) -> AllocationResult {
        let units = self
            .units
            .iter()
            .map(|vars| UnitAllocation {
                on: self.model.value(vars.on).map(|v| v.round() == 1.0),
                flow: self.model.value(vars.flow).map(snap_to_zero),
                power: self.model.value(vars.power).map(snap_to_zero),
            })
            .collect();

        AllocationResult::from_units(compressors, units, status.is_optimal(), status)
    }
}

fn snap_to_zero(value: f64) -> f64 {
    if value.abs() < VALUE_TOLERANCE {
        0.0
    } else {
        value
    }
}

/// Lifecycle of the optimizer's model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelPhase {
    Unbuilt,
    Built,
    Solved,
}

#[derive(Debug, Default)]
enum ModelState {
    #[default]
    Unbuilt,
    Built(FleetModel),
    Solved(FleetModel),
}

/// MILP optimizer over a fixed fleet.
///
/// Call [`setup`](Self::setup) once, then [`solve`](Self::solve) as often as
/// needed. Only the demand constraint changes between solves.
#[derive(Debug)]
pub struct MilpOptimizer {
    compressors: Vec<Compressor>,
    state: ModelState,
}

impl MilpOptimizer {
    pub fn new(compressors: Vec<Compressor>) -> Self {
        Self {
            compressors,
            state: ModelState::Unbuilt,
        }
    }

    pub fn compressors(&self) -> &[Compressor] {
        &self.compressors
    }

    pub fn phase(&self) -> ModelPhase {
        match self.state {
            ModelState::Unbuilt => ModelPhase::Unbuilt,
            ModelState::Built(_) => ModelPhase::Built,
            ModelState::Solved(_) => ModelPhase::Solved,
        }
    }

    /// Build variables and per-unit constraints. Envelope errors surface here,
    /// never at solve time. Calling it again rebuilds from scratch.
    pub fn setup(&mut self) -> DispatchResult<()> {
        let fleet_model = FleetModel::build(&self.compressors)?;
        info!(
            units = self.compressors.len(),
            variables = fleet_model.model.num_variables(),
            constraints = fleet_model.model.num_constraints(),
            "MILP model built"
        );
        self.state = ModelState::Built(fleet_model);
        Ok(())
    }

    /// Minimum-power allocation of `demand`.
    ///
    /// Infeasible or unproven outcomes come back as `success = false` with the
    /// solver status attached; only usage errors are returned as `Err`.
    pub fn solve(&mut self, demand: f64) -> DispatchResult<AllocationResult> {
        check_demand(demand)?;

        let mut fleet_model = match std::mem::take(&mut self.state) {
            ModelState::Unbuilt => return Err(DispatchError::ModelNotBuilt),
            ModelState::Built(m) | ModelState::Solved(m) => m,
        };

        fleet_model.replace_demand(demand);
        let status = fleet_model.model.solve();
        let result = fleet_model.read_result(&self.compressors, status);
        self.state = ModelState::Solved(fleet_model);

        debug!(
            demand,
            status = %status,
            total_power = ?result.total_power,
            "MILP dispatch solved"
        );

        Ok(result)
    }

    #[cfg(test)]
    fn constraint_count(&self) -> Option<usize> {
        match &self.state {
            ModelState::Unbuilt => None,
            ModelState::Built(m) | ModelState::Solved(m) => Some(m.model.num_constraints()),
        }
    }
}

impl DispatchStrategy for MilpOptimizer {
    fn label(&self) -> &str {
        "milp"
    }

    fn dispatch(&mut self, demand: f64) -> DispatchResult<AllocationResult> {
        if self.phase() == ModelPhase::Unbuilt {
            self.setup()?;
        }
        self.solve(demand)
    }
}
