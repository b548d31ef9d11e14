//! Compressor fleet dispatch.
//!
//! Splits a total flow demand across compressor units either optimally, with
//! a MILP that minimises total power, or with one of two rule-based
//! counterfactual heuristics for comparison.

pub mod config;
pub mod domain;
pub mod error;
pub mod optimizer;
pub mod sweep;
pub mod telemetry;

pub use domain::{AffineCostModel, AllocationResult, Compressor, SolverStatus, UnitAllocation};
pub use error::{DispatchError, DispatchResult};
pub use optimizer::{
    CounterfactualDispatch, CounterfactualGenerator, CounterfactualPolicy, DispatchStrategy,
    MilpOptimizer, PolicyKind,
};
