//! Maps `GoalMarkers` onto the grid's DOF space, producing the `FEModel`
//! boundary-condition and load bookkeeping that `topo-assembly` consumes.

use std::collections::BTreeSet;

use nalgebra::DVector;
use topo_model::GoalMarkers;

use crate::grid::{Grid, Problem};

/// Degree-of-freedom bookkeeping derived from a grid and a set of goal
/// markers: which DOFs are fixed, and the accumulated nodal force vector.
#[derive(Debug, Clone)]
pub struct FEModel {
    pub n_elem: usize,
    pub n_node: usize,
    pub n_dof: usize,
    pub dofs_per_node: usize,
    pub fixed_dofs: BTreeSet<usize>,
    pub forces: DVector<f64>,
    /// Non-fatal diagnostics recorded while building the model, e.g. the
    /// under-constrained-BC corner-augmentation warning.
    pub warnings: Vec<String>,
}

impl FEModel {
    /// Build the FE bookkeeping for `grid` from `markers`.
    ///
    /// Markers are snapped to the nearest lattice node; anchors fix all
    /// translational DOFs at their node, loads accumulate into the force
    /// vector. If the resulting fixed-DOF set is smaller than the minimum
    /// needed to prevent rigid-body motion, grid corners are added in a
    /// deterministic order until the minimum is met (a recoverable
    /// warning, not an error).
    pub fn build(grid: &Grid, markers: &GoalMarkers) -> Self {
        let dofs_per_node = grid.problem.dofs_per_node();
        let n_elem = grid.element_count();
        let n_node = grid.node_count();
        let n_dof = grid.dof_count();

        let mut fixed_dofs = BTreeSet::new();
        let mut forces = DVector::<f64>::zeros(n_dof);
        let mut warnings = Vec::new();

        for anchor in &markers.anchors {
            let (ix, iy, iz) = grid.snap_to_node(*anchor);
            let node = grid.node_index(ix, iy, iz);
            for axis in 0..dofs_per_node {
                fixed_dofs.insert(node * dofs_per_node + axis);
            }
        }

        for load in &markers.loads {
            let (ix, iy, iz) = grid.snap_to_node(load.position);
            let node = grid.node_index(ix, iy, iz);
            let components = [load.force.x, load.force.y, load.force.z];
            for axis in 0..dofs_per_node {
                forces[node * dofs_per_node + axis] += components[axis];
            }
        }

        let min_fixed = match grid.problem {
            Problem::Planar => dofs_per_node,
            Problem::Volumetric => 2 * dofs_per_node,
        };

        if fixed_dofs.len() < min_fixed {
            warnings.push(format!(
                "under-constrained model ({} fixed dofs < minimum {}); \
                 augmenting with grid corners",
                fixed_dofs.len(),
                min_fixed
            ));
            for (ix, iy, iz) in grid.corner_nodes() {
                if fixed_dofs.len() >= min_fixed {
                    break;
                }
                let node = grid.node_index(ix, iy, iz);
                for axis in 0..dofs_per_node {
                    fixed_dofs.insert(node * dofs_per_node + axis);
                }
            }
        }

        Self {
            n_elem,
            n_node,
            n_dof,
            dofs_per_node,
            fixed_dofs,
            forces,
            warnings,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point3, Vector3};
    use topo_model::GoalMarkers;

    fn grid_2d() -> Grid {
        Grid::from_bounds(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
            4,
            2,
            1,
        )
        .unwrap()
    }

    #[test]
    fn anchors_and_loads_map_to_dofs() {
        let grid = grid_2d();
        let markers = GoalMarkers::new()
            .with_anchor(Point3::new(0.0, 0.0, 0.0))
            .with_anchor(Point3::new(0.0, 1.0, 0.0))
            .with_load(Point3::new(2.0, 0.5, 0.0), Vector3::new(0.0, -1.0, 0.0));
        let fem = FEModel::build(&grid, &markers);
        assert_eq!(fem.fixed_dofs.len(), 4); // two anchors x 2 dofs
        assert!(fem.forces.iter().any(|&f| f == -1.0));
    }

    #[test]
    fn single_anchor_triggers_corner_augmentation() {
        let grid = grid_2d();
        let markers = GoalMarkers::new().with_anchor(Point3::new(1.0, 0.5, 0.0));
        let fem = FEModel::build(&grid, &markers);
        assert!(fem.fixed_dofs.len() >= fem.dofs_per_node);
        assert!(!fem.warnings.is_empty());
    }

    #[test]
    fn fully_constrained_model_has_no_warnings() {
        let grid = grid_2d();
        let markers = GoalMarkers::new()
            .with_anchor(Point3::new(0.0, 0.0, 0.0))
            .with_anchor(Point3::new(0.0, 1.0, 0.0));
        let fem = FEModel::build(&grid, &markers);
        assert!(fem.warnings.is_empty());
    }

    #[test]
    fn accumulated_loads_sum_at_shared_node() {
        let grid = grid_2d();
        let markers = GoalMarkers::new()
            .with_anchor(Point3::new(0.0, 0.0, 0.0))
            .with_anchor(Point3::new(0.0, 1.0, 0.0))
            .with_load(Point3::new(2.0, 0.5, 0.0), Vector3::new(0.0, -1.0, 0.0))
            .with_load(Point3::new(2.0, 0.5, 0.0), Vector3::new(0.0, -2.0, 0.0));
        let fem = FEModel::build(&grid, &markers);
        let total: f64 = fem.forces.iter().sum();
        assert!((total - (-3.0)).abs() < 1e-12);
    }
}
