//! Isosurface extraction: the primary geometry output of a converged SIMP
//! run.
//!
//! Each hexahedral element is split into 6 tetrahedra by the Kuhn
//! (Freudenthal) diagonal decomposition — the main diagonal from local
//! `(0,0,0)` to `(1,1,1)` shared by all six — and each tetrahedron is
//! marched independently: corners are classified solid/void against
//! `threshold`, and any cut edge is resolved by linear interpolation of its
//! two endpoint densities, so every emitted vertex lands on the level set
//! of the node-sampled density field rather than on a raw lattice node.
//! The decomposition is fixed rather than alternated between cubes, so the
//! diagonal of every interior face agrees between the two cubes sharing it
//! and the surface welds without cracks.

use std::collections::HashMap;

use nalgebra::{Point3, Vector3};
use topo_grid::Grid;
use topo_model::{Result, TopoError};

use crate::mesh::TriMesh;

/// A 3D node lattice used for extraction geometry. For a planar `Grid`
/// (dz == 0) a nominal slab thickness is synthesized so the extractor has
/// a true volumetric cell to march, rather than branching the whole module
/// on problem dimensionality.
struct ExtractionLattice {
    nix: usize,
    niy: usize,
    positions: Vec<Point3<f64>>,
}

impl ExtractionLattice {
    fn build(grid: &Grid) -> Self {
        let nix = grid.nx + 1;
        let niy = grid.ny + 1;
        let niz = if grid.dz > 0.0 { grid.nz + 1 } else { 2 };

        let (z0, dz) = if grid.dz > 0.0 {
            (grid.min.z, grid.dz)
        } else {
            let thickness = grid.dx.min(grid.dy);
            (grid.min.z - thickness / 2.0, thickness)
        };

        let mut positions = Vec::with_capacity(nix * niy * niz);
        for iz in 0..niz {
            for iy in 0..niy {
                for ix in 0..nix {
                    let x = grid.min.x + ix as f64 * grid.dx;
                    let y = grid.min.y + iy as f64 * grid.dy;
                    let z = z0 + iz as f64 * dz;
                    positions.push(Point3::new(x, y, z));
                }
            }
        }
        Self { nix, niy, positions }
    }

    fn node_index(&self, ix: usize, iy: usize, iz: usize) -> usize {
        ix + iy * self.nix + iz * self.nix * self.niy
    }

    /// Corners of element `(ex, ey, ez)` in the fixed order `(lx, ly, lz) ∈
    /// {0,1}³` addressed by [`local_corner_slot`]: bottom face then top
    /// face, each visited counter-clockwise from the low corner.
    fn element_corners(&self, ex: usize, ey: usize, ez: usize) -> [usize; 8] {
        [
            self.node_index(ex, ey, ez),
            self.node_index(ex + 1, ey, ez),
            self.node_index(ex + 1, ey + 1, ez),
            self.node_index(ex, ey + 1, ez),
            self.node_index(ex, ey, ez + 1),
            self.node_index(ex + 1, ey, ez + 1),
            self.node_index(ex + 1, ey + 1, ez + 1),
            self.node_index(ex, ey + 1, ez + 1),
        ]
    }
}

/// Local `(lx, ly, lz)` corner coordinates to the `element_corners()` slot
/// they occupy.
fn local_corner_slot(lx: u8, ly: u8, lz: u8) -> usize {
    match (lx, ly, lz) {
        (0, 0, 0) => 0,
        (1, 0, 0) => 1,
        (1, 1, 0) => 2,
        (0, 1, 0) => 3,
        (0, 0, 1) => 4,
        (1, 0, 1) => 5,
        (1, 1, 1) => 6,
        (0, 1, 1) => 7,
        _ => unreachable!("local corner coordinates are binary"),
    }
}

/// The 6 tetrahedra of the Kuhn/Freudenthal decomposition of a unit cube,
/// one per permutation of the axes, each a monotone staircase from
/// `(0,0,0)` to `(1,1,1)` along the cube's main diagonal.
const KUHN_TETS: [[(u8, u8, u8); 4]; 6] = [
    [(0, 0, 0), (1, 0, 0), (1, 1, 0), (1, 1, 1)],
    [(0, 0, 0), (1, 0, 0), (1, 0, 1), (1, 1, 1)],
    [(0, 0, 0), (0, 1, 0), (1, 1, 0), (1, 1, 1)],
    [(0, 0, 0), (0, 1, 0), (0, 1, 1), (1, 1, 1)],
    [(0, 0, 0), (0, 0, 1), (1, 0, 1), (1, 1, 1)],
    [(0, 0, 0), (0, 0, 1), (0, 1, 1), (1, 1, 1)],
];

/// Interpolated-vertex cache, keyed by the unordered pair of global lattice
/// node indices a cut edge connects. A cut edge is shared by several
/// tetrahedra — the main diagonal by all six in a cube, a face diagonal by
/// the two straddling that face, including the matching tet in the
/// neighboring cube — so keying on the node pair rather than on which tet
/// produced the cut welds all of them to one vertex.
struct VertexCache {
    by_edge: HashMap<(usize, usize), u32>,
}

impl VertexCache {
    fn new() -> Self {
        Self { by_edge: HashMap::new() }
    }

    #[allow(clippy::too_many_arguments)]
    fn get_or_insert(
        &mut self,
        mesh: &mut TriMesh,
        node_a: usize,
        node_b: usize,
        density_a: f64,
        density_b: f64,
        pos_a: Point3<f64>,
        pos_b: Point3<f64>,
        threshold: f64,
    ) -> u32 {
        let key = if node_a < node_b { (node_a, node_b) } else { (node_b, node_a) };
        if let Some(&v) = self.by_edge.get(&key) {
            return v;
        }
        let span = density_b - density_a;
        let t = if span.abs() < 1e-12 {
            0.5
        } else {
            ((threshold - density_a) / span).clamp(0.0, 1.0)
        };
        let pos = pos_a + (pos_b - pos_a) * t;
        let id = mesh.vertices.len() as u32;
        mesh.vertices.push(pos);
        self.by_edge.insert(key, id);
        id
    }
}

/// Emit `tri` (vertex ids already resolved) oriented so its normal points
/// from material toward void, flipping winding if the as-built normal
/// points the other way.
fn push_oriented(mesh: &mut TriMesh, tri: [u32; 3], into_void: Vector3<f64>) {
    let p0 = mesh.vertices[tri[0] as usize];
    let p1 = mesh.vertices[tri[1] as usize];
    let p2 = mesh.vertices[tri[2] as usize];
    let n = (p1 - p0).cross(&(p2 - p0));
    if n.dot(&into_void) < 0.0 {
        mesh.triangles.push([tri[0], tri[2], tri[1]]);
    } else {
        mesh.triangles.push(tri);
    }
}

/// March a single tetrahedron given its 4 corners' global node index,
/// position, and density, emitting 0, 1, or 2 triangles into `mesh`.
fn march_tet(
    nodes: [usize; 4],
    positions: [Point3<f64>; 4],
    densities: [f64; 4],
    threshold: f64,
    cache: &mut VertexCache,
    mesh: &mut TriMesh,
) {
    let solid = densities.map(|d| d >= threshold);
    let solid_count = solid.iter().filter(|&&s| s).count();
    if solid_count == 0 || solid_count == 4 {
        return;
    }

    let mut solid_centroid = Vector3::zeros();
    let mut void_centroid = Vector3::zeros();
    for i in 0..4 {
        if solid[i] {
            solid_centroid += positions[i].coords;
        } else {
            void_centroid += positions[i].coords;
        }
    }
    solid_centroid /= solid_count as f64;
    void_centroid /= (4 - solid_count) as f64;
    let into_void = void_centroid - solid_centroid;

    let edge_vertex = |a: usize, b: usize, cache: &mut VertexCache, mesh: &mut TriMesh| -> u32 {
        cache.get_or_insert(
            mesh,
            nodes[a],
            nodes[b],
            densities[a],
            densities[b],
            positions[a],
            positions[b],
            threshold,
        )
    };

    let solid_idx: Vec<usize> = (0..4).filter(|&i| solid[i]).collect();
    let void_idx: Vec<usize> = (0..4).filter(|&i| !solid[i]).collect();

    match solid_count {
        1 => {
            let s = solid_idx[0];
            let e0 = edge_vertex(s, void_idx[0], cache, mesh);
            let e1 = edge_vertex(s, void_idx[1], cache, mesh);
            let e2 = edge_vertex(s, void_idx[2], cache, mesh);
            push_oriented(mesh, [e0, e1, e2], into_void);
        }
        3 => {
            let v = void_idx[0];
            let e0 = edge_vertex(v, solid_idx[0], cache, mesh);
            let e1 = edge_vertex(v, solid_idx[1], cache, mesh);
            let e2 = edge_vertex(v, solid_idx[2], cache, mesh);
            push_oriented(mesh, [e0, e1, e2], into_void);
        }
        2 => {
            let (s0, s1) = (solid_idx[0], solid_idx[1]);
            let (v0, v1) = (void_idx[0], void_idx[1]);
            let e_s0v0 = edge_vertex(s0, v0, cache, mesh);
            let e_s0v1 = edge_vertex(s0, v1, cache, mesh);
            let e_s1v0 = edge_vertex(s1, v0, cache, mesh);
            let e_s1v1 = edge_vertex(s1, v1, cache, mesh);
            push_oriented(mesh, [e_s0v0, e_s0v1, e_s1v1], into_void);
            push_oriented(mesh, [e_s0v0, e_s1v1, e_s1v0], into_void);
        }
        _ => unreachable!("solid_count is neither 0 nor 4 here"),
    }
}

/// Extract the isosurface of `rho_bar` (element-centered filtered density)
/// at `threshold`, by first interpolating to node values (averaged over
/// incident elements, with missing neighbors beyond the domain boundary
/// implicitly treated as void so the surface closes there) and then
/// marching each element's Kuhn tetrahedra.
pub fn extract_isosurface(grid: &Grid, rho_bar: &[f64], threshold: f64) -> Result<TriMesh> {
    let lattice = ExtractionLattice::build(grid);
    let nx = grid.nx;
    let ny = grid.ny;
    let nz = grid.nz;

    let mut node_sum = vec![0.0_f64; lattice.positions.len()];
    for ez in 0..nz {
        for ey in 0..ny {
            for ex in 0..nx {
                let elem = grid.element_index(ex, ey, ez);
                let rho = rho_bar[elem];
                for corner in lattice.element_corners(ex, ey, ez) {
                    node_sum[corner] += rho;
                }
            }
        }
    }
    // A node interior to an axis with >= 2 elements along it sees 2
    // choices of element index on that axis; an axis only 1 element deep
    // (including a planar grid's synthesized z-extrusion, which always
    // draws from the single real z-layer) only ever sees 1. Dividing by
    // this fixed per-axis maximum, not the node's actual incident-element
    // count, is what implicitly treats missing neighbors past the domain
    // edge as void and closes the surface there.
    let full_neighborhood = (nx.min(2) * ny.min(2) * nz.min(2)) as f64;
    let node_density: Vec<f64> = node_sum.iter().map(|&s| s / full_neighborhood).collect();

    let mut mesh = TriMesh::new();
    let mut cache = VertexCache::new();

    for ez in 0..nz {
        for ey in 0..ny {
            for ex in 0..nx {
                let corners = lattice.element_corners(ex, ey, ez);
                for tet in KUHN_TETS {
                    let slots = tet.map(|(lx, ly, lz)| local_corner_slot(lx, ly, lz));
                    let nodes = slots.map(|s| corners[s]);
                    let positions = nodes.map(|n| lattice.positions[n]);
                    let densities = nodes.map(|n| node_density[n]);
                    march_tet(nodes, positions, densities, threshold, &mut cache, &mut mesh);
                }
            }
        }
    }

    if mesh.triangles.is_empty() {
        return Err(TopoError::ExtractionEmpty { threshold });
    }

    mesh.recompute_normals();
    Ok(mesh)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3 as P3;
    use std::f64::consts::PI;

    #[test]
    fn sphere_volume_round_trip() {
        let n = 40usize;
        let radius = 20.0;
        let grid = Grid::from_bounds(
            P3::new(-20.0, -20.0, -20.0),
            P3::new(20.0, 20.0, 20.0),
            n,
            n,
            n,
        )
        .unwrap();

        let mut rho = vec![0.0; grid.element_count()];
        for ez in 0..n {
            for ey in 0..n {
                for ex in 0..n {
                    let c = grid.element_center(ex, ey, ez);
                    let r = (c.x * c.x + c.y * c.y + c.z * c.z).sqrt();
                    let elem = grid.element_index(ex, ey, ez);
                    rho[elem] = if r <= radius { 1.0 } else { 0.0 };
                }
            }
        }

        let mesh = extract_isosurface(&grid, &rho, 0.5).unwrap();
        let extracted = mesh.enclosed_volume();
        let analytic = 4.0 / 3.0 * PI * radius.powi(3);
        let rel_err = (extracted - analytic).abs() / analytic;
        assert!(rel_err < 0.02, "rel_err={rel_err}");
    }

    #[test]
    fn empty_density_field_errors() {
        let grid = Grid::from_bounds(P3::new(0.0, 0.0, 0.0), P3::new(1.0, 1.0, 1.0), 4, 4, 4)
            .unwrap();
        let rho = vec![0.0; grid.element_count()];
        assert!(matches!(
            extract_isosurface(&grid, &rho, 0.5),
            Err(TopoError::ExtractionEmpty { .. })
        ));
    }

    #[test]
    fn planar_grid_produces_closed_slab() {
        let grid =
            Grid::from_bounds(P3::new(0.0, 0.0, 0.0), P3::new(2.0, 1.0, 0.0), 8, 4, 1).unwrap();
        let rho = vec![1.0; grid.element_count()];
        let mesh = extract_isosurface(&grid, &rho, 0.5).unwrap();
        assert!(!mesh.is_empty());
        assert!(mesh.surface_area() > 0.0);
    }

    #[test]
    fn vertices_land_on_interpolated_edge_crossings() {
        // One solid element next to one void element: the node between
        // them (ix=1) averages to density 0.5, the node past it (ix=2) to
        // 0.0, so threshold 0.3 cuts that edge 40% of the way from node to
        // node, at x=1.4 — off any integer lattice line, unlike a
        // voxel-hull extractor that could only ever emit a vertex at x=0,
        // 1, or 2.
        let grid =
            Grid::from_bounds(P3::new(0.0, 0.0, 0.0), P3::new(2.0, 1.0, 1.0), 2, 1, 1).unwrap();
        let rho = vec![1.0, 0.0];
        let mesh = extract_isosurface(&grid, &rho, 0.3).unwrap();
        assert!(!mesh.is_empty());
        assert!(mesh
            .vertices
            .iter()
            .any(|v| (v.x - v.x.round()).abs() > 0.05));
    }
}
