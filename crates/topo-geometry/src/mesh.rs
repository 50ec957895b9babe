//! Indexed triangle mesh shared by the isosurface extractor, skeleton
//! builders, and the plastic-wrap smoother.

use nalgebra::{Point3, Vector3};

/// An indexed triangle mesh with area-weighted per-vertex normals.
///
/// Mirrors the positions/indices split `ccx-io::vtk_writer` uses for its
/// cell data, instead of a flat facet soup.
#[derive(Debug, Clone, Default)]
pub struct TriMesh {
    pub vertices: Vec<Point3<f64>>,
    pub normals: Vec<Vector3<f64>>,
    pub triangles: Vec<[u32; 3]>,
}

impl TriMesh {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// Recompute per-vertex normals as the area-weighted sum of incident
    /// triangle normals.
    pub fn recompute_normals(&mut self) {
        let mut acc = vec![Vector3::zeros(); self.vertices.len()];
        for tri in &self.triangles {
            let [a, b, c] = tri.map(|i| i as usize);
            let (pa, pb, pc) = (self.vertices[a], self.vertices[b], self.vertices[c]);
            // Cross product magnitude is twice the triangle area; using it
            // unnormalized directly gives the area weighting.
            let n = (pb - pa).cross(&(pc - pa));
            acc[a] += n;
            acc[b] += n;
            acc[c] += n;
        }
        self.normals = acc
            .into_iter()
            .map(|n| {
                let norm = n.norm();
                if norm > 1e-15 {
                    n / norm
                } else {
                    Vector3::zeros()
                }
            })
            .collect();
    }

    pub fn surface_area(&self) -> f64 {
        self.triangles
            .iter()
            .map(|tri| {
                let [a, b, c] = tri.map(|i| i as usize);
                let (pa, pb, pc) = (self.vertices[a], self.vertices[b], self.vertices[c]);
                0.5 * (pb - pa).cross(&(pc - pa)).norm()
            })
            .sum()
    }

    /// Signed enclosed volume via the divergence theorem (sum of signed
    /// tetrahedron volumes from the origin to each triangle).
    pub fn enclosed_volume(&self) -> f64 {
        self.triangles
            .iter()
            .map(|tri| {
                let [a, b, c] = tri.map(|i| i as usize);
                let (pa, pb, pc) = (self.vertices[a], self.vertices[b], self.vertices[c]);
                pa.coords.dot(&pb.coords.cross(&pc.coords)) / 6.0
            })
            .sum::<f64>()
            .abs()
    }

    /// Drop triangles with (near-)zero area or a repeated vertex index,
    /// returning how many were removed so callers can log it.
    pub fn remove_degenerate_triangles(&mut self, area_eps: f64) -> usize {
        let before = self.triangles.len();
        self.triangles.retain(|tri| {
            if tri[0] == tri[1] || tri[1] == tri[2] || tri[0] == tri[2] {
                return false;
            }
            let [a, b, c] = tri.map(|i| i as usize);
            let (pa, pb, pc) = (self.vertices[a], self.vertices[b], self.vertices[c]);
            0.5 * (pb - pa).cross(&(pc - pa)).norm() > area_eps
        });
        before - self.triangles.len()
    }
}
