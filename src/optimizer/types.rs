use crate::domain::AllocationResult;
use crate::error::DispatchResult;

/// Anything that can split a total demand across the fleet.
///
/// Implementations may hold mutable model state, hence `&mut self`; a sweep
/// drives one instance strictly sequentially.
pub trait DispatchStrategy {
    /// Short identifier used in reports and logs
    fn label(&self) -> &str;

    fn dispatch(&mut self, demand: f64) -> DispatchResult<AllocationResult>;
}
