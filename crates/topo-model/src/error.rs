//! Error taxonomy shared by every crate in the topology optimization engine.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, TopoError>;

/// Failure kinds raised anywhere in the SIMP pipeline, one variant per
/// failure kind in the error taxonomy: grid/model construction, the FE
/// solve, the OC update, geometry extraction, and cooperative cancellation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TopoError {
    #[error("invalid domain: {0}")]
    InvalidDomain(String),

    #[error("invalid parameter {name}: {reason}")]
    InvalidParam { name: String, reason: String },

    #[error("volume constraint infeasible: target {target} below floor {floor}")]
    ConstraintInfeasible { target: f64, floor: f64 },

    #[error("FE solve failed to converge: {0}")]
    FeDiverged(String),

    #[error("FE solve produced non-finite values: {0}")]
    FeNumerical(String),

    #[error("isosurface extraction produced no geometry above threshold {threshold}")]
    ExtractionEmpty { threshold: f64 },

    #[error("optimization cancelled at iteration {iter}")]
    Cancelled { iter: usize },
}
