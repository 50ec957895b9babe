pub mod isosurface;
pub mod mesh;
pub mod skeleton;
pub mod smoothing;

pub use isosurface::extract_isosurface;
pub use mesh::TriMesh;
pub use skeleton::{curve_network, multipipe, point_cloud, SkeletonParams};
pub use smoothing::{plastic_wrap, PlasticWrapParams};
