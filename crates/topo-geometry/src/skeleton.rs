//! Secondary skeletal outputs: a representative point cloud, a curve
//! network linking nearby points, and a multipipe sweep along that
//! network. All optional and derived from the same element-centered
//! density field used by the primary isosurface.

use nalgebra::{Point3, Vector3};
use topo_grid::Grid;

use crate::mesh::TriMesh;

/// Parameters governing the skeletal outputs, mirrored 1:1 from the
/// `SimpParams` extraction fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkeletonParams {
    pub max_points_per_cell: usize,
    pub max_span_length: f64,
    pub max_links_per_point: usize,
    pub pipe_radius: f64,
    pub pipe_segments: usize,
}

/// One representative point per connected dense region above `threshold`,
/// split into chunks of at most `max_points_per_cell` elements so large
/// regions still get multiple representative points.
pub fn point_cloud(grid: &Grid, rho: &[f64], threshold: f64, max_points_per_cell: usize) -> Vec<Point3<f64>> {
    let nx = grid.nx;
    let ny = grid.ny;
    let nz = grid.nz;
    let n = grid.element_count();
    let solid = |e: usize| rho[e] > threshold;

    let mut visited = vec![false; n];
    let mut points = Vec::new();

    for start in 0..n {
        if visited[start] || !solid(start) {
            continue;
        }
        // Flood fill over face-adjacent solid elements (6-connectivity).
        let mut stack = vec![start];
        visited[start] = true;
        let mut component = Vec::new();
        while let Some(e) = stack.pop() {
            component.push(e);
            let (ex, ey, ez) = grid.element_coords(e);
            let neighbors = [
                (ex as i64 + 1, ey as i64, ez as i64),
                (ex as i64 - 1, ey as i64, ez as i64),
                (ex as i64, ey as i64 + 1, ez as i64),
                (ex as i64, ey as i64 - 1, ez as i64),
                (ex as i64, ey as i64, ez as i64 + 1),
                (ex as i64, ey as i64, ez as i64 - 1),
            ];
            for (nx_, ny_, nz_) in neighbors {
                if nx_ < 0 || ny_ < 0 || nz_ < 0 {
                    continue;
                }
                let (nx_, ny_, nz_) = (nx_ as usize, ny_ as usize, nz_ as usize);
                if nx_ >= nx || ny_ >= ny || nz_ >= nz {
                    continue;
                }
                let ne = grid.element_index(nx_, ny_, nz_);
                if !visited[ne] && solid(ne) {
                    visited[ne] = true;
                    stack.push(ne);
                }
            }
        }

        component.sort_unstable();
        let chunks = component.chunks(max_points_per_cell.max(1));
        for chunk in chunks {
            let mut centroid = Vector3::zeros();
            for &e in chunk {
                let (ex, ey, ez) = grid.element_coords(e);
                centroid += grid.element_center(ex, ey, ez).coords;
            }
            centroid /= chunk.len() as f64;
            points.push(Point3::from(centroid));
        }
    }

    points
}

/// Edges connecting points within `max_span_length`, greedily capping
/// each point's degree at `max_links_per_point`. Candidate edges are
/// considered shortest-first so the cap favors the closest neighbors.
pub fn curve_network(points: &[Point3<f64>], max_span_length: f64, max_links_per_point: usize) -> Vec<(usize, usize)> {
    let mut candidates = Vec::new();
    for i in 0..points.len() {
        for j in (i + 1)..points.len() {
            let d = (points[i] - points[j]).norm();
            if d <= max_span_length {
                candidates.push((d, i, j));
            }
        }
    }
    candidates.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

    let mut degree = vec![0usize; points.len()];
    let mut edges = Vec::new();
    for (_, i, j) in candidates {
        if degree[i] < max_links_per_point && degree[j] < max_links_per_point {
            edges.push((i, j));
            degree[i] += 1;
            degree[j] += 1;
        }
    }
    edges
}

/// Sweep a circular cross-section of `pipe_radius`, tessellated with
/// `pipe_segments` around the ring, along every edge of the network.
pub fn multipipe(points: &[Point3<f64>], edges: &[(usize, usize)], params: SkeletonParams) -> TriMesh {
    let segs = params.pipe_segments.max(3);
    let mut mesh = TriMesh::new();

    for &(i, j) in edges {
        let p0 = points[i];
        let p1 = points[j];
        let axis = p1 - p0;
        let len = axis.norm();
        if len < 1e-12 {
            continue;
        }
        let axis = axis / len;
        // Any vector not parallel to axis, used to build an orthonormal frame.
        let helper = if axis.x.abs() < 0.9 {
            Vector3::x()
        } else {
            Vector3::y()
        };
        let u = axis.cross(&helper).normalize();
        let v = axis.cross(&u);

        let base = mesh.vertices.len() as u32;
        for ring in 0..2 {
            let center = if ring == 0 { p0 } else { p1 };
            for s in 0..segs {
                let theta = 2.0 * std::f64::consts::PI * (s as f64) / (segs as f64);
                let offset = u * (params.pipe_radius * theta.cos()) + v * (params.pipe_radius * theta.sin());
                mesh.vertices.push(center + offset);
            }
        }
        for s in 0..segs {
            let s_next = (s + 1) % segs;
            let a = base + s as u32;
            let b = base + s_next as u32;
            let c = base + segs as u32 + s_next as u32;
            let d = base + segs as u32 + s as u32;
            mesh.triangles.push([a, b, c]);
            mesh.triangles.push([a, c, d]);
        }
    }

    mesh.recompute_normals();
    mesh
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3 as P3;

    #[test]
    fn point_cloud_finds_two_disjoint_blobs() {
        let grid = Grid::from_bounds(P3::new(0.0, 0.0, 0.0), P3::new(10.0, 1.0, 0.0), 10, 1, 1)
            .unwrap();
        let mut rho = vec![0.0; grid.element_count()];
        rho[0] = 1.0;
        rho[9] = 1.0;
        let points = point_cloud(&grid, &rho, 0.5, 100);
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn curve_network_respects_degree_cap() {
        let points = vec![
            P3::new(0.0, 0.0, 0.0),
            P3::new(1.0, 0.0, 0.0),
            P3::new(2.0, 0.0, 0.0),
            P3::new(3.0, 0.0, 0.0),
        ];
        let edges = curve_network(&points, 10.0, 1);
        let mut degree = vec![0usize; points.len()];
        for (i, j) in &edges {
            degree[*i] += 1;
            degree[*j] += 1;
        }
        assert!(degree.iter().all(|&d| d <= 1));
    }

    #[test]
    fn multipipe_produces_closed_tube_per_edge() {
        let points = vec![P3::new(0.0, 0.0, 0.0), P3::new(1.0, 0.0, 0.0)];
        let params = SkeletonParams {
            max_points_per_cell: 1,
            max_span_length: 2.0,
            max_links_per_point: 4,
            pipe_radius: 0.1,
            pipe_segments: 8,
        };
        let mesh = multipipe(&points, &[(0, 1)], params);
        assert_eq!(mesh.triangles.len(), 8 * 2);
    }
}
