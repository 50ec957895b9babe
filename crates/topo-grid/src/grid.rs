//! Uniform hexahedral/quadrilateral grid binding a bounding mesh to a
//! regular element lattice, generated from `(nx, ny, nz)` rather than
//! parsed from an input deck.

use nalgebra::Point3;
use topo_model::{DomainMesh, Result, TopoError};

/// Whether the grid spans one element layer in z (plane-stress) or a full
/// volumetric lattice. Selected once at construction from `nz` so shared
/// code dispatches on this tag rather than on a runtime branch scattered
/// through every module.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Problem {
    Planar,
    Volumetric,
}

impl Problem {
    pub fn dofs_per_node(self) -> usize {
        match self {
            Problem::Planar => 2,
            Problem::Volumetric => 3,
        }
    }

    pub fn nodes_per_element(self) -> usize {
        match self {
            Problem::Planar => 4,
            Problem::Volumetric => 8,
        }
    }
}

/// Regular element grid over an axis-aligned bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,
    pub min: Point3<f64>,
    pub max: Point3<f64>,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
    pub problem: Problem,
}

impl Grid {
    /// Build a grid from a domain mesh's bounding box and the requested
    /// element counts. `nz == 1` signals a 2D plane-stress problem.
    pub fn from_domain(mesh: &DomainMesh, nx: usize, ny: usize, nz: usize) -> Result<Self> {
        let (min, max) = mesh
            .bounding_box()
            .ok_or_else(|| TopoError::InvalidDomain("domain mesh has no vertices".into()))?;
        Self::from_bounds(min, max, nx, ny, nz)
    }

    pub fn from_bounds(
        min: Point3<f64>,
        max: Point3<f64>,
        nx: usize,
        ny: usize,
        nz: usize,
    ) -> Result<Self> {
        if nx == 0 || ny == 0 || nz == 0 {
            return Err(TopoError::InvalidDomain(
                "element counts (nx, ny, nz) must all be >= 1".into(),
            ));
        }
        let problem = if nz == 1 {
            Problem::Planar
        } else {
            Problem::Volumetric
        };

        let span_x = max.x - min.x;
        let span_y = max.y - min.y;
        let span_z = max.z - min.z;

        if span_x <= 0.0 || span_y <= 0.0 {
            return Err(TopoError::InvalidDomain(format!(
                "zero or negative span in x/y: span=({span_x}, {span_y})"
            )));
        }
        if matches!(problem, Problem::Volumetric) && span_z <= 0.0 {
            return Err(TopoError::InvalidDomain(format!(
                "zero or negative span in z for a volumetric domain: span_z={span_z}"
            )));
        }

        let dx = span_x / nx as f64;
        let dy = span_y / ny as f64;
        let dz = if matches!(problem, Problem::Planar) {
            0.0
        } else {
            span_z / nz as f64
        };

        Ok(Self {
            nx,
            ny,
            nz,
            min,
            max,
            dx,
            dy,
            dz,
            problem,
        })
    }

    pub fn element_count(&self) -> usize {
        self.nx * self.ny * self.nz
    }

    /// Node lattice dimensions `(nx+1, ny+1, nz+1)`, collapsed to a single
    /// layer in z for the planar case.
    pub fn node_dims(&self) -> (usize, usize, usize) {
        match self.problem {
            Problem::Planar => (self.nx + 1, self.ny + 1, 1),
            Problem::Volumetric => (self.nx + 1, self.ny + 1, self.nz + 1),
        }
    }

    pub fn node_count(&self) -> usize {
        let (nix, niy, niz) = self.node_dims();
        nix * niy * niz
    }

    pub fn dof_count(&self) -> usize {
        self.node_count() * self.problem.dofs_per_node()
    }

    /// Flattened node index for lattice coordinates `(ix, iy, iz)`.
    pub fn node_index(&self, ix: usize, iy: usize, iz: usize) -> usize {
        let (nix, niy, _) = self.node_dims();
        debug_assert!(ix < nix && iy < niy);
        ix + iy * nix + iz * nix * niy
    }

    /// Element index for element lattice coordinates `(ex, ey, ez)`.
    pub fn element_index(&self, ex: usize, ey: usize, ez: usize) -> usize {
        debug_assert!(ex < self.nx && ey < self.ny && ez < self.nz);
        ex + ey * self.nx + ez * self.nx * self.ny
    }

    pub fn element_coords(&self, elem: usize) -> (usize, usize, usize) {
        let ex = elem % self.nx;
        let ey = (elem / self.nx) % self.ny;
        let ez = elem / (self.nx * self.ny);
        (ex, ey, ez)
    }

    /// Center of element `(ex, ey, ez)` in model-space coordinates.
    pub fn element_center(&self, ex: usize, ey: usize, ez: usize) -> Point3<f64> {
        let x = self.min.x + (ex as f64 + 0.5) * self.dx;
        let y = self.min.y + (ey as f64 + 0.5) * self.dy;
        let z = match self.problem {
            Problem::Planar => self.min.z,
            Problem::Volumetric => self.min.z + (ez as f64 + 0.5) * self.dz,
        };
        Point3::new(x, y, z)
    }

    /// Global node indices of element `(ex, ey, ez)`, in the canonical
    /// ordering `topo-elements` expects: bottom face then top face for
    /// hexes (matching `C3D8`'s natural-coordinate table), bilinear
    /// counter-clockwise for quads.
    pub fn element_node_indices(&self, ex: usize, ey: usize, ez: usize) -> Vec<usize> {
        match self.problem {
            Problem::Planar => vec![
                self.node_index(ex, ey, 0),
                self.node_index(ex + 1, ey, 0),
                self.node_index(ex + 1, ey + 1, 0),
                self.node_index(ex, ey + 1, 0),
            ],
            Problem::Volumetric => vec![
                self.node_index(ex, ey, ez),
                self.node_index(ex + 1, ey, ez),
                self.node_index(ex + 1, ey + 1, ez),
                self.node_index(ex, ey + 1, ez),
                self.node_index(ex, ey, ez + 1),
                self.node_index(ex + 1, ey, ez + 1),
                self.node_index(ex + 1, ey + 1, ez + 1),
                self.node_index(ex, ey + 1, ez + 1),
            ],
        }
    }

    /// Coordinates of a node in the lattice, in model space.
    pub fn node_position(&self, ix: usize, iy: usize, iz: usize) -> Point3<f64> {
        let x = self.min.x + ix as f64 * self.dx;
        let y = self.min.y + iy as f64 * self.dy;
        let z = match self.problem {
            Problem::Planar => self.min.z,
            Problem::Volumetric => self.min.z + iz as f64 * self.dz,
        };
        Point3::new(x, y, z)
    }

    /// Snap a model-space point to the nearest lattice node coordinate,
    /// clamped to the grid bounds.
    pub fn snap_to_node(&self, p: Point3<f64>) -> (usize, usize, usize) {
        let (nix, niy, niz) = self.node_dims();
        let clamp_round = |v: f64, n: usize| -> usize {
            let r = v.round();
            if r < 0.0 {
                0
            } else if r as usize >= n {
                n - 1
            } else {
                r as usize
            }
        };
        let ix = clamp_round((p.x - self.min.x) / self.dx, nix);
        let iy = clamp_round((p.y - self.min.y) / self.dy, niy);
        let iz = match self.problem {
            Problem::Planar => 0,
            Problem::Volumetric => clamp_round((p.z - self.min.z) / self.dz, niz),
        };
        (ix, iy, iz)
    }

    /// The `node_dims()`-sized corner list, in a deterministic order,
    /// used to augment under-constrained boundary conditions.
    pub fn corner_nodes(&self) -> Vec<(usize, usize, usize)> {
        let (nix, niy, niz) = self.node_dims();
        let xs = [0, nix - 1];
        let ys = [0, niy - 1];
        match self.problem {
            Problem::Planar => {
                let mut out = Vec::with_capacity(4);
                for &y in &ys {
                    for &x in &xs {
                        out.push((x, y, 0));
                    }
                }
                out
            }
            Problem::Volumetric => {
                let zs = [0, niz - 1];
                let mut out = Vec::with_capacity(8);
                for &z in &zs {
                    for &y in &ys {
                        for &x in &xs {
                            out.push((x, y, z));
                        }
                    }
                }
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_cube_mesh() -> DomainMesh {
        DomainMesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
                Point3::new(2.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
                Point3::new(0.0, 0.0, 1.0),
                Point3::new(2.0, 0.0, 1.0),
                Point3::new(2.0, 1.0, 1.0),
                Point3::new(0.0, 1.0, 1.0),
            ],
            vec![],
        )
    }

    #[test]
    fn volumetric_grid_dims() {
        let mesh = unit_cube_mesh();
        let grid = Grid::from_domain(&mesh, 4, 2, 2).unwrap();
        assert_eq!(grid.problem, Problem::Volumetric);
        assert_eq!(grid.element_count(), 16);
        assert_eq!(grid.node_count(), 5 * 3 * 3);
        assert_eq!(grid.dof_count(), 5 * 3 * 3 * 3);
    }

    #[test]
    fn planar_grid_collapses_z() {
        let mesh = unit_cube_mesh();
        let grid = Grid::from_bounds(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
            60,
            20,
            1,
        )
        .unwrap();
        assert_eq!(grid.problem, Problem::Planar);
        assert_eq!(grid.node_dims(), (61, 21, 1));
        assert_eq!(grid.dof_count(), 61 * 21 * 2);
    }

    #[test]
    fn zero_span_domain_is_invalid() {
        let mesh = DomainMesh::new(vec![Point3::new(0.0, 0.0, 0.0)], vec![]);
        assert!(matches!(
            Grid::from_domain(&mesh, 4, 4, 4),
            Err(TopoError::InvalidDomain(_))
        ));
    }

    #[test]
    fn hex_element_node_indices_match_canonical_ordering() {
        let grid = Grid::from_bounds(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
            1,
            1,
            1,
        )
        .unwrap();
        let nodes = grid.element_node_indices(0, 0, 0);
        assert_eq!(nodes.len(), 8);
        // Bottom face then top face, as in C3D8's natural-coordinate table.
        assert_eq!(nodes[0], grid.node_index(0, 0, 0));
        assert_eq!(nodes[4], grid.node_index(0, 0, 1));
    }

    #[test]
    fn snap_clamps_to_bounds() {
        let grid = Grid::from_bounds(
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
            4,
            2,
            1,
        )
        .unwrap();
        let (ix, iy, _) = grid.snap_to_node(Point3::new(-5.0, 10.0, 0.0));
        assert_eq!((ix, iy), (0, 2));
    }
}
