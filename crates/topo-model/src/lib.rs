//! Domain types shared across the topology optimization engine: the
//! bounding mesh and goal markers fed in by external collaborators
//! (dashboard, project-state store), plus the error taxonomy they can
//! observe.

pub mod error;

pub use error::{Result, TopoError};

use nalgebra::{Point3, Vector3};

/// An indexed triangle mesh used only to derive an axis-aligned bounding
/// box for the optimization domain. Positions and indices are otherwise
/// opaque to the core.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainMesh {
    pub positions: Vec<Point3<f64>>,
    pub triangles: Vec<[u32; 3]>,
}

impl DomainMesh {
    pub fn new(positions: Vec<Point3<f64>>, triangles: Vec<[u32; 3]>) -> Self {
        Self {
            positions,
            triangles,
        }
    }

    /// Axis-aligned bounding box `(min, max)` of the mesh positions.
    ///
    /// Returns `None` for an empty mesh; the caller is responsible for
    /// turning that into `TopoError::InvalidDomain`.
    pub fn bounding_box(&self) -> Option<(Point3<f64>, Point3<f64>)> {
        let mut iter = self.positions.iter();
        let first = *iter.next()?;
        let (mut min, mut max) = (first, first);
        for p in iter {
            min.x = min.x.min(p.x);
            min.y = min.y.min(p.y);
            min.z = min.z.min(p.z);
            max.x = max.x.max(p.x);
            max.y = max.y.max(p.y);
            max.z = max.z.max(p.z);
        }
        Some((min, max))
    }
}

/// A prescribed fixed support: all translational DOFs at this position
/// are clamped to zero.
pub type Anchor = Point3<f64>;

/// A concentrated force applied at a position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Load {
    pub position: Point3<f64>,
    pub force: Vector3<f64>,
}

/// Anchors and loads that drive boundary-condition construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GoalMarkers {
    pub anchors: Vec<Anchor>,
    pub loads: Vec<Load>,
}

impl GoalMarkers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_anchor(mut self, p: Point3<f64>) -> Self {
        self.anchors.push(p);
        self
    }

    pub fn with_load(mut self, p: Point3<f64>, f: Vector3<f64>) -> Self {
        self.loads.push(Load {
            position: p,
            force: f,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounding_box_of_unit_cube() {
        let mesh = DomainMesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(1.0, 1.0, 1.0),
                Point3::new(0.5, -0.5, 2.0),
            ],
            vec![[0, 1, 2]],
        );
        let (min, max) = mesh.bounding_box().unwrap();
        assert_eq!(min, Point3::new(0.0, -0.5, 0.0));
        assert_eq!(max, Point3::new(1.0, 1.0, 2.0));
    }

    #[test]
    fn bounding_box_of_empty_mesh_is_none() {
        let mesh = DomainMesh::new(vec![], vec![]);
        assert!(mesh.bounding_box().is_none());
    }

    #[test]
    fn goal_markers_builder() {
        let markers = GoalMarkers::new()
            .with_anchor(Point3::new(0.0, 0.0, 0.0))
            .with_load(Point3::new(2.0, 0.5, 0.0), Vector3::new(0.0, -1.0, 0.0));
        assert_eq!(markers.anchors.len(), 1);
        assert_eq!(markers.loads.len(), 1);
        assert_eq!(markers.loads[0].force.y, -1.0);
    }
}
