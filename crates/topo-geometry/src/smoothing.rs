//! Plastic-wrap post-smoothing: alternating-sign Taubin Laplacian
//! smoothing with a per-vertex displacement cap, kept small and
//! dependency-free.

use nalgebra::Vector3;

use crate::mesh::TriMesh;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlasticWrapParams {
    pub passes: usize,
    pub lambda: f64,
    pub wrap_distance: f64,
}

impl Default for PlasticWrapParams {
    fn default() -> Self {
        Self {
            passes: 10,
            lambda: 0.5,
            wrap_distance: f64::INFINITY,
        }
    }
}

fn vertex_adjacency(mesh: &TriMesh) -> Vec<Vec<usize>> {
    let mut neighbors = vec![Vec::new(); mesh.vertices.len()];
    let mut seen = vec![std::collections::HashSet::new(); mesh.vertices.len()];
    for tri in &mesh.triangles {
        let idx = tri.map(|i| i as usize);
        for i in 0..3 {
            let a = idx[i];
            let b = idx[(i + 1) % 3];
            if seen[a].insert(b) {
                neighbors[a].push(b);
            }
            if seen[b].insert(a) {
                neighbors[b].push(a);
            }
        }
    }
    neighbors
}

/// Alternating (λ, μ = −λ/(1+ε)) Laplacian smoothing, each vertex capped
/// at `wrap_distance` from its pre-smoothing position, followed by normal
/// recomputation and removal of triangles the smoothing made degenerate.
/// Returns the number of triangles removed for the caller to log.
pub fn plastic_wrap(mesh: &mut TriMesh, params: PlasticWrapParams) -> usize {
    if mesh.vertices.is_empty() {
        return 0;
    }
    let epsilon = 0.1;
    let mu = -params.lambda / (1.0 + epsilon);
    let originals = mesh.vertices.clone();
    let neighbors = vertex_adjacency(mesh);

    for pass in 0..params.passes {
        let factor = if pass % 2 == 0 { params.lambda } else { mu };
        let mut next = mesh.vertices.clone();
        for (v, adj) in neighbors.iter().enumerate() {
            if adj.is_empty() {
                continue;
            }
            let mut avg = Vector3::zeros();
            for &n in adj {
                avg += mesh.vertices[n].coords;
            }
            avg /= adj.len() as f64;
            let laplacian = avg - mesh.vertices[v].coords;
            let candidate = mesh.vertices[v] + factor * laplacian;

            let drift = candidate - originals[v];
            let drift_len = drift.norm();
            next[v] = if drift_len > params.wrap_distance && drift_len > 1e-15 {
                originals[v] + drift * (params.wrap_distance / drift_len)
            } else {
                candidate
            };
        }
        mesh.vertices = next;
    }

    let removed = mesh.remove_degenerate_triangles(1e-12);
    mesh.recompute_normals();
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    fn tetrahedron() -> TriMesh {
        let mut mesh = TriMesh::new();
        mesh.vertices = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
            Point3::new(0.0, 0.0, 1.0),
        ];
        mesh.triangles = vec![[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]];
        mesh
    }

    #[test]
    fn smoothing_respects_wrap_distance_cap() {
        let mut mesh = tetrahedron();
        let originals = mesh.vertices.clone();
        let params = PlasticWrapParams {
            passes: 20,
            lambda: 0.9,
            wrap_distance: 0.05,
        };
        plastic_wrap(&mut mesh, params);
        for (orig, now) in originals.iter().zip(mesh.vertices.iter()) {
            assert!((now - orig).norm() <= 0.05 + 1e-9);
        }
    }

    #[test]
    fn smoothing_recomputes_normals() {
        let mut mesh = tetrahedron();
        let params = PlasticWrapParams::default();
        plastic_wrap(&mut mesh, params);
        assert_eq!(mesh.normals.len(), mesh.vertices.len());
    }
}
