//! Binds a domain mesh's bounding box to a uniform element lattice, and
//! maps anchor/load markers onto that lattice's degrees of freedom.

pub mod fe_model;
pub mod grid;

pub use fe_model::FEModel;
pub use grid::{Grid, Problem};
