pub mod driver;
pub mod oc;
pub mod params;

pub use driver::{DriverState, OptimizationResult, SimpDriver, SolverFrame};
pub use oc::{compliance_sensitivity, heaviside_project, oc_update, OcUpdate};
pub use params::SimpParams;
