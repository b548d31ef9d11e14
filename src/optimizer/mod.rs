pub mod counterfactual;
pub mod milp;
pub mod model;
pub mod types;

pub use counterfactual::*;
pub use milp::*;
pub use types::*;
