use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::{AffineCostModel, Compressor};

/// Outcome reported by the solver, or `NotApplicable` when no solver ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SolverStatus {
    Optimal,
    Infeasible,
    Unbounded,
    NoSolutionFound,
    NotApplicable,
}

impl SolverStatus {
    /// Only a proven optimum counts as success.
    pub fn is_optimal(&self) -> bool {
        matches!(self, SolverStatus::Optimal)
    }
}

/// Per-unit dispatch. `None` means unknown, which is distinct from a valid 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitAllocation {
    pub on: Option<bool>,
    pub flow: Option<f64>,
    pub power: Option<f64>,
}

impl UnitAllocation {
    pub const UNKNOWN: Self = Self {
        on: None,
        flow: None,
        power: None,
    };

    /// Derive on/off state and power from an assigned flow
    pub fn from_flow(flow: Option<f64>, model: &AffineCostModel) -> Self {
        match flow {
            Some(flow) => {
                let on = flow > 0.0;
                Self {
                    on: Some(on),
                    flow: Some(flow),
                    power: Some(model.power(flow, on)),
                }
            }
            None => Self::UNKNOWN,
        }
    }
}

/// Common result shape of the optimizer and the counterfactual generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AllocationResult {
    pub compressors: BTreeMap<String, UnitAllocation>,
    pub total_flow: Option<f64>,
    pub total_power: Option<f64>,
    pub success: bool,
    pub solver_status: SolverStatus,
}

impl AllocationResult {
    /// A failed allocation: every unit and both totals are unknown.
    pub fn infeasible(fleet: &[Compressor], solver_status: SolverStatus) -> Self {
        Self {
            compressors: fleet
                .iter()
                .map(|c| (c.name.clone(), UnitAllocation::UNKNOWN))
                .collect(),
            total_flow: None,
            total_power: None,
            success: false,
            solver_status,
        }
    }

    /// Assemble a result from per-unit values given in fleet order.
    ///
    /// An unsuccessful outcome discards whatever values were passed in.
    /// Totals are only reported when every unit's flow is known.
    pub fn from_units(
        fleet: &[Compressor],
        units: Vec<UnitAllocation>,
        success: bool,
        solver_status: SolverStatus,
    ) -> Self {
        if !success {
            return Self::infeasible(fleet, solver_status);
        }

        let total_flow = units.iter().map(|u| u.flow).sum::<Option<f64>>();
        let total_power = match total_flow {
            Some(_) => units.iter().map(|u| u.power).sum::<Option<f64>>(),
            None => None,
        };

        Self {
            compressors: fleet.iter().map(|c| c.name.clone()).zip(units).collect(),
            total_flow,
            total_power,
            success,
            solver_status,
        }
    }

    pub fn unit(&self, name: &str) -> Option<&UnitAllocation> {
        self.compressors.get(name)
    }

    /// Number of units switched on, when known
    pub fn units_on(&self) -> Option<usize> {
        self.compressors
            .values()
            .map(|u| u.on)
            .try_fold(0, |acc, on| on.map(|on| acc + usize::from(on)))
    }
}
