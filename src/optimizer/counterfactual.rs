//! Rule-based counterfactual dispatch.
//!
//! Answers "what would a simple dispatch rule have done?" for the same fleet
//! and demand, without a solver, so the result can be set against the MILP
//! optimum. Two rules are available:
//! - ordered sequence: fill units one after another in a preferred order
//! - proportional: split demand by capacity share, then exclude units whose
//!   share falls under their minimum and hand their share to the rest

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use tracing::debug;

use super::types::DispatchStrategy;
use crate::domain::{
    cost_models, total_capacity, AffineCostModel, AllocationResult, Compressor, SolverStatus,
    UnitAllocation,
};
use crate::error::{check_demand, DispatchError, DispatchResult};

/// Remaining demand below this is treated as fully served
const FLOW_TOLERANCE: f64 = 1e-9;

/// Selector for the two heuristics, parseable from `1`/`sequence` and
/// `2`/`proportional`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum PolicyKind {
    #[strum(to_string = "sequence", serialize = "1")]
    Sequence,
    #[strum(to_string = "proportional", serialize = "2")]
    Proportional,
}

impl TryFrom<u8> for PolicyKind {
    type Error = DispatchError;

    fn try_from(selector: u8) -> DispatchResult<Self> {
        match selector {
            1 => Ok(PolicyKind::Sequence),
            2 => Ok(PolicyKind::Proportional),
            other => Err(DispatchError::InvalidPolicy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CounterfactualPolicy {
    /// Fill units in the given order of names
    OrderedSequence(Vec<String>),
    /// Capacity-proportional split with one repair pass
    Proportional,
}

impl CounterfactualPolicy {
    /// Build a policy from a textual selector. `sequence` is only used by the
    /// ordered-sequence policy.
    pub fn from_selector(selector: &str, sequence: &[String]) -> DispatchResult<Self> {
        let kind = PolicyKind::from_str(selector.trim())
            .map_err(|_| DispatchError::InvalidPolicy(selector.to_string()))?;
        Ok(Self::from_kind(kind, sequence))
    }

    pub fn from_kind(kind: PolicyKind, sequence: &[String]) -> Self {
        match kind {
            PolicyKind::Sequence => CounterfactualPolicy::OrderedSequence(sequence.to_vec()),
            PolicyKind::Proportional => CounterfactualPolicy::Proportional,
        }
    }

    pub fn kind(&self) -> PolicyKind {
        match self {
            CounterfactualPolicy::OrderedSequence(_) => PolicyKind::Sequence,
            CounterfactualPolicy::Proportional => PolicyKind::Proportional,
        }
    }
}

/// Heuristic allocator over a validated fleet.
///
/// Holds no per-call state: every [`solve`](Self::solve) starts from a fresh
/// working array and returns a freshly built result.
#[derive(Debug, Clone)]
pub struct CounterfactualGenerator {
    compressors: Vec<Compressor>,
    costs: Vec<AffineCostModel>,
}

impl CounterfactualGenerator {
    /// Validates the fleet up front, so a degenerate envelope fails here
    pub fn new(compressors: Vec<Compressor>) -> DispatchResult<Self> {
        let costs = cost_models(&compressors)?;
        Ok(Self { compressors, costs })
    }

    pub fn compressors(&self) -> &[Compressor] {
        &self.compressors
    }

    pub fn solve(
        &self,
        demand: f64,
        policy: &CounterfactualPolicy,
    ) -> DispatchResult<AllocationResult> {
        check_demand(demand)?;

        // A bad sequence is a caller mistake even when demand is infeasible
        let order = match policy {
            CounterfactualPolicy::OrderedSequence(order) => Some(self.resolve_order(order)?),
            CounterfactualPolicy::Proportional => None,
        };

        let capacity = total_capacity(&self.compressors);
        let flows = if demand - capacity > FLOW_TOLERANCE {
            debug!(demand, capacity, "demand exceeds fleet capacity");
            None
        } else {
            match order {
                Some(order) => self.sequence_fill(demand, &order),
                None => self.proportional(demand, capacity),
            }
        };

        debug!(
            demand,
            policy = %policy.kind(),
            feasible = flows.is_some(),
            "counterfactual allocation computed"
        );

        Ok(self.post_process(flows))
    }

    /// Resolve names to fleet indices, rejecting unknown and repeated names
    fn resolve_order(&self, order: &[String]) -> DispatchResult<Vec<usize>> {
        let index: HashMap<&str, usize> = self
            .compressors
            .iter()
            .enumerate()
            .map(|(i, c)| (c.name.as_str(), i))
            .collect();

        let mut seen = HashSet::with_capacity(order.len());
        order
            .iter()
            .map(|name| {
                let i = *index
                    .get(name.as_str())
                    .ok_or_else(|| DispatchError::UnknownCompressor(name.clone()))?;
                if !seen.insert(i) {
                    return Err(DispatchError::DuplicateInSequence(name.clone()));
                }
                Ok(i)
            })
            .collect()
    }

    /// Fill units in order. A remainder that is positive but under the next
    /// unit's minimum makes the whole call infeasible; there is no recovery
    /// by trying later units. Units not reached, or not listed, run at 0.
    fn sequence_fill(&self, demand: f64, order: &[usize]) -> Option<Vec<f64>> {
        let mut flows = vec![0.0; self.compressors.len()];
        let mut remaining = demand;

        for &i in order {
            let c = &self.compressors[i];

            if remaining > 0.0 && remaining < c.qmin {
                debug!(unit = %c.name, remaining, qmin = c.qmin, "remainder below unit minimum");
                return None;
            }

            if remaining > c.qmax {
                flows[i] = c.qmax;
                remaining -= c.qmax;
            } else {
                flows[i] = remaining;
                remaining = 0.0;
            }

            if remaining <= FLOW_TOLERANCE {
                remaining = 0.0;
            }
        }

        if remaining > 0.0 {
            debug!(remaining, "sequence exhausted before demand was met");
            return None;
        }

        Some(flows)
    }

    /// Split by capacity share; units whose share is below their minimum are
    /// zeroed and their share goes to the remaining units. One repair pass
    /// only, the redistributed shares are not checked again.
    fn proportional(&self, demand: f64, capacity: f64) -> Option<Vec<f64>> {
        let mut denominator = capacity;
        let mut excluded = vec![false; self.compressors.len()];
        let mut flows: Vec<f64> = self
            .compressors
            .iter()
            .map(|c| demand * c.qmax / capacity)
            .collect();

        for (i, c) in self.compressors.iter().enumerate() {
            if flows[i] < c.qmin {
                excluded[i] = true;
                flows[i] = 0.0;
                denominator -= c.qmax;
            }
        }

        if !excluded.contains(&true) {
            return Some(flows);
        }

        if denominator <= FLOW_TOLERANCE {
            // Nothing left to carry the demand
            return (demand <= FLOW_TOLERANCE).then(|| vec![0.0; self.compressors.len()]);
        }

        for (i, c) in self.compressors.iter().enumerate() {
            if !excluded[i] {
                flows[i] = demand * c.qmax / denominator;
            }
        }

        Some(flows)
    }

    fn post_process(&self, flows: Option<Vec<f64>>) -> AllocationResult {
        match flows {
            Some(flows) => {
                let units = flows
                    .into_iter()
                    .zip(&self.costs)
                    .map(|(flow, cost)| UnitAllocation::from_flow(Some(flow), cost))
                    .collect();
                AllocationResult::from_units(
                    &self.compressors,
                    units,
                    true,
                    SolverStatus::NotApplicable,
                )
            }
            None => AllocationResult::infeasible(&self.compressors, SolverStatus::NotApplicable),
        }
    }
}

/// A generator bound to one policy, usable wherever a [`DispatchStrategy`] is
#[derive(Debug, Clone)]
pub struct CounterfactualDispatch {
    generator: CounterfactualGenerator,
    policy: CounterfactualPolicy,
    label: String,
}

impl CounterfactualDispatch {
    pub fn new(generator: CounterfactualGenerator, policy: CounterfactualPolicy) -> Self {
        let label = format!("counterfactual:{}", policy.kind());
        Self {
            generator,
            policy,
            label,
        }
    }

    pub fn policy(&self) -> &CounterfactualPolicy {
        &self.policy
    }
}

impl DispatchStrategy for CounterfactualDispatch {
    fn label(&self) -> &str {
        &self.label
    }

    fn dispatch(&mut self, demand: f64) -> DispatchResult<AllocationResult> {
        self.generator.solve(demand, &self.policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const TOL: f64 = 1e-9;

    fn fleet() -> Vec<Compressor> {
        vec![
            Compressor::new("A", 1.0, 5.0, 10.0, 20.0),
            Compressor::new("B", 2.0, 8.0, 12.0, 30.0),
            Compressor::new("C", 1.0, 4.0, 8.0, 20.0),
        ]
    }

    fn generator() -> CounterfactualGenerator {
        CounterfactualGenerator::new(fleet()).unwrap()
    }

    fn order(names: &[&str]) -> CounterfactualPolicy {
        CounterfactualPolicy::OrderedSequence(names.iter().map(|s| s.to_string()).collect())
    }

    fn flow(result: &AllocationResult, name: &str) -> Option<f64> {
        result.unit(name).and_then(|u| u.flow)
    }

    #[test]
    fn test_sequence_fill_saturates_then_tops_up() {
        let result = generator().solve(10.0, &order(&["A", "B", "C"])).unwrap();

        assert!(result.success);
        assert_eq!(result.solver_status, SolverStatus::NotApplicable);
        assert_eq!(flow(&result, "A"), Some(5.0));
        assert_eq!(flow(&result, "B"), Some(5.0));
        // Not reached: explicit zero, not unknown
        assert_eq!(flow(&result, "C"), Some(0.0));
        assert_eq!(result.unit("C").unwrap().on, Some(false));
        assert_eq!(result.unit("C").unwrap().power, Some(0.0));

        assert_eq!(result.total_flow, Some(10.0));
        assert!((result.total_power.unwrap() - 41.0).abs() < TOL);
    }

    #[test]
    fn test_sequence_remainder_below_minimum_is_fatal() {
        // A takes 5, the remaining 1 is under B's minimum of 2
        let result = generator().solve(6.0, &order(&["A", "B", "C"])).unwrap();

        assert!(!result.success);
        assert!(result.compressors.values().all(|u| *u == UnitAllocation::UNKNOWN));
        assert_eq!(result.total_flow, None);
        assert_eq!(result.total_power, None);
    }

    #[test]
    fn test_sequence_omitted_units_get_zero() {
        let result = generator().solve(10.0, &order(&["B", "A"])).unwrap();
        assert!(result.success);
        assert_eq!(flow(&result, "B"), Some(8.0));
        assert_eq!(flow(&result, "A"), Some(2.0));
        assert_eq!(flow(&result, "C"), Some(0.0));
    }

    #[test]
    fn test_sequence_short_of_capacity_is_infeasible() {
        // B and A together hold 13, C is never offered the last unit
        let result = generator().solve(14.0, &order(&["B", "A"])).unwrap();
        assert!(!result.success);
    }

    #[test]
    fn test_sequence_rejects_bad_names() {
        let g = generator();
        assert_eq!(
            g.solve(3.0, &order(&["A", "X"])),
            Err(DispatchError::UnknownCompressor("X".to_string()))
        );
        assert_eq!(
            g.solve(3.0, &order(&["A", "B", "A"])),
            Err(DispatchError::DuplicateInSequence("A".to_string()))
        );
    }

    #[test]
    fn test_bad_sequence_reported_even_over_capacity() {
        assert_eq!(
            generator().solve(99.0, &order(&["Z"])),
            Err(DispatchError::UnknownCompressor("Z".to_string()))
        );
    }

    #[test]
    fn test_sequence_zero_demand() {
        let result = generator().solve(0.0, &order(&["A", "B", "C"])).unwrap();
        assert!(result.success);
        assert_eq!(result.total_flow, Some(0.0));
        assert_eq!(result.total_power, Some(0.0));
        assert_eq!(result.units_on(), Some(0));
    }

    #[test]
    fn test_proportional_split_by_capacity() {
        let result = generator().solve(6.0, &CounterfactualPolicy::Proportional).unwrap();

        assert!(result.success);
        assert!((flow(&result, "A").unwrap() - 30.0 / 17.0).abs() < TOL);
        assert!((flow(&result, "B").unwrap() - 48.0 / 17.0).abs() < TOL);
        assert!((flow(&result, "C").unwrap() - 24.0 / 17.0).abs() < TOL);
        assert!((result.total_flow.unwrap() - 6.0).abs() < TOL);

        for c in fleet() {
            let f = flow(&result, &c.name).unwrap();
            assert!(f == 0.0 || (f >= c.qmin && f <= c.qmax));
        }
    }

    #[test]
    fn test_proportional_repair_redistributes() {
        // Shares 20/17, 32/17, 16/17: B and C fall under their minimum
        let result = generator().solve(4.0, &CounterfactualPolicy::Proportional).unwrap();

        assert!(result.success);
        assert!((flow(&result, "A").unwrap() - 4.0).abs() < TOL);
        assert_eq!(flow(&result, "B"), Some(0.0));
        assert_eq!(flow(&result, "C"), Some(0.0));
        assert_eq!(result.unit("B").unwrap().on, Some(false));
        assert!((result.total_flow.unwrap() - 4.0).abs() < TOL);
    }

    #[test]
    fn test_proportional_everyone_excluded() {
        let result = generator().solve(3.0, &CounterfactualPolicy::Proportional).unwrap();
        assert!(!result.success);

        let zero = generator().solve(0.0, &CounterfactualPolicy::Proportional).unwrap();
        assert!(zero.success);
        assert_eq!(zero.total_power, Some(0.0));
    }

    #[test]
    fn test_proportional_repair_is_single_pass() {
        let fleet = vec![
            Compressor::new("small", 0.0, 1.0, 1.0, 2.0),
            Compressor::new("big", 5.0, 10.0, 10.0, 20.0),
        ];
        let g = CounterfactualGenerator::new(fleet).unwrap();
        let result = g.solve(5.0, &CounterfactualPolicy::Proportional).unwrap();

        // big is excluded at 50/11; its share moves to small without a re-check
        assert!(result.success);
        assert_eq!(flow(&result, "big"), Some(0.0));
        assert!((flow(&result, "small").unwrap() - 5.0).abs() < TOL);
    }

    #[rstest]
    #[case(order(&["A", "B", "C"]))]
    #[case(CounterfactualPolicy::Proportional)]
    fn test_over_capacity_is_infeasible(#[case] policy: CounterfactualPolicy) {
        let result = generator().solve(17.5, &policy).unwrap();
        assert!(!result.success);
        assert_eq!(result.solver_status, SolverStatus::NotApplicable);
        assert!(result.compressors.values().all(|u| *u == UnitAllocation::UNKNOWN));
    }

    #[rstest]
    #[case("1", PolicyKind::Sequence)]
    #[case("sequence", PolicyKind::Sequence)]
    #[case("2", PolicyKind::Proportional)]
    #[case(" Proportional ", PolicyKind::Proportional)]
    fn test_selector_parsing(#[case] selector: &str, #[case] expected: PolicyKind) {
        let policy = CounterfactualPolicy::from_selector(selector, &["A".to_string()]).unwrap();
        assert_eq!(policy.kind(), expected);
    }

    #[rstest]
    #[case("3")]
    #[case("")]
    #[case("round_robin")]
    fn test_invalid_selector_is_reported(#[case] selector: &str) {
        assert_eq!(
            CounterfactualPolicy::from_selector(selector, &[]),
            Err(DispatchError::InvalidPolicy(selector.to_string()))
        );
    }

    #[test]
    fn test_numeric_selector() {
        assert_eq!(PolicyKind::try_from(2), Ok(PolicyKind::Proportional));
        assert_eq!(
            PolicyKind::try_from(3),
            Err(DispatchError::InvalidPolicy("3".to_string()))
        );
    }

    #[test]
    fn test_degenerate_fleet_rejected_at_construction() {
        let err = CounterfactualGenerator::new(vec![Compressor::new("K", 2.0, 2.0, 1.0, 1.0)])
            .unwrap_err();
        assert!(matches!(err, DispatchError::DegenerateEnvelope { .. }));
    }

    #[test]
    fn test_calls_do_not_share_state() {
        let g = generator();
        let policy = order(&["A", "B", "C"]);

        let failed = g.solve(6.0, &policy).unwrap();
        let ok = g.solve(3.0, &policy).unwrap();
        assert!(!failed.success);
        assert!(ok.success);
        assert_eq!(flow(&ok, "A"), Some(3.0));
    }

    #[test]
    fn test_dispatch_label() {
        let mut d = CounterfactualDispatch::new(generator(), CounterfactualPolicy::Proportional);
        assert_eq!(d.label(), "counterfactual:proportional");
        assert!(d.dispatch(6.0).unwrap().success);
    }
}
