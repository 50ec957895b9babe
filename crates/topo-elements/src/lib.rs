//! Reference hex/quad element stiffness matrices: the unit-modulus
//! `Kₑ⁰` computed once per grid from `(ν, dx, dy[, dz])`. SIMP
//! interpolation scales it later during assembly.
//!
//! The hex path uses the standard 8-node natural coordinate table,
//! Jacobian/B-matrix/constitutive-matrix construction and 2x2x2 Gauss
//! quadrature, generalized to a bare `(dx, dy, dz)` box rather than an
//! arbitrary node list; the 2D plane-stress case uses a bilinear `Quad4`.

use nalgebra::{DMatrix, Matrix3, SMatrix, Vector3};
use topo_grid::Problem;

/// A reference element stiffness matrix at unit modulus, dense because its
/// natural size (8x8 or 24x24) is tiny and it is evaluated only once per
/// grid construction: a deterministic function of (ν,dx,dy,dz), always
/// symmetric and positive semidefinite.
#[derive(Debug, Clone)]
pub struct ElementStencil {
    pub matrix: DMatrix<f64>,
    pub dofs: usize,
}

impl ElementStencil {
    /// Compute `Kₑ⁰` for the given problem dimensionality, Poisson ratio,
    /// and element spacing.
    pub fn compute(problem: Problem, nu: f64, dx: f64, dy: f64, dz: f64) -> Self {
        match problem {
            Problem::Planar => Self::quad4(nu, dx, dy),
            Problem::Volumetric => Self::hex8(nu, dx, dy, dz),
        }
    }

    fn quad4(nu: f64, dx: f64, dy: f64) -> Self {
        let hx = dx / 2.0;
        let hy = dy / 2.0;
        // Canonical ordering matching Grid::element_node_indices for the
        // planar case: (ex,ey) -> (ex+1,ey) -> (ex+1,ey+1) -> (ex,ey+1).
        let nodes = [(-hx, -hy), (hx, -hy), (hx, hy), (-hx, hy)];
        let xi_n = [-1.0, 1.0, 1.0, -1.0];
        let eta_n = [-1.0, -1.0, 1.0, 1.0];

        let d = plane_stress_constitutive(nu);

        let gp = 1.0 / f64::sqrt(3.0);
        let gauss = [(-gp, -gp), (gp, -gp), (gp, gp), (-gp, gp)];

        let mut k = DMatrix::<f64>::zeros(8, 8);
        for &(xi, eta) in &gauss {
            let mut dn_dxi = [0.0; 4];
            let mut dn_deta = [0.0; 4];
            for i in 0..4 {
                dn_dxi[i] = xi_n[i] * (1.0 + eta * eta_n[i]) / 4.0;
                dn_deta[i] = (1.0 + xi * xi_n[i]) * eta_n[i] / 4.0;
            }

            let mut j = Matrix3::<f64>::identity();
            let mut j00 = 0.0;
            let mut j01 = 0.0;
            let mut j10 = 0.0;
            let mut j11 = 0.0;
            for i in 0..4 {
                j00 += dn_dxi[i] * nodes[i].0;
                j01 += dn_dxi[i] * nodes[i].1;
                j10 += dn_deta[i] * nodes[i].0;
                j11 += dn_deta[i] * nodes[i].1;
            }
            j[(0, 0)] = j00;
            j[(0, 1)] = j01;
            j[(1, 0)] = j10;
            j[(1, 1)] = j11;
            let det_j = j00 * j11 - j01 * j10;
            debug_assert!(det_j > 0.0, "non-positive Jacobian in reference quad");
            let inv_det = 1.0 / det_j;

            let mut b = DMatrix::<f64>::zeros(3, 8);
            for i in 0..4 {
                let dn_dx = inv_det * (j11 * dn_dxi[i] - j01 * dn_deta[i]);
                let dn_dy = inv_det * (-j10 * dn_dxi[i] + j00 * dn_deta[i]);
                let c = i * 2;
                b[(0, c)] = dn_dx;
                b[(1, c + 1)] = dn_dy;
                b[(2, c)] = dn_dy;
                b[(2, c + 1)] = dn_dx;
            }

            k += b.transpose() * &d * &b * det_j;
        }

        Self { matrix: k, dofs: 8 }
    }

    fn hex8(nu: f64, dx: f64, dy: f64, dz: f64) -> Self {
        let hx = dx / 2.0;
        let hy = dy / 2.0;
        let hz = dz / 2.0;
        let xi_n = [-1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0, -1.0];
        let eta_n = [-1.0, -1.0, 1.0, 1.0, -1.0, -1.0, 1.0, 1.0];
        let zeta_n = [-1.0, -1.0, -1.0, -1.0, 1.0, 1.0, 1.0, 1.0];
        let nodes: Vec<Vector3<f64>> = (0..8)
            .map(|i| Vector3::new(xi_n[i] * hx, eta_n[i] * hy, zeta_n[i] * hz))
            .collect();

        let d = solid_constitutive(nu);

        let gp = 1.0 / f64::sqrt(3.0);
        let gauss: Vec<(f64, f64, f64)> = (0..8)
            .map(|i| {
                (
                    if i & 1 == 0 { -gp } else { gp },
                    if i & 2 == 0 { -gp } else { gp },
                    if i & 4 == 0 { -gp } else { gp },
                )
            })
            .collect();

        let mut k = DMatrix::<f64>::zeros(24, 24);
        for &(xi, eta, zeta) in &gauss {
            let mut dn = [[0.0; 8]; 3];
            for i in 0..8 {
                dn[0][i] = xi_n[i] * (1.0 + eta * eta_n[i]) * (1.0 + zeta * zeta_n[i]) / 8.0;
                dn[1][i] = (1.0 + xi * xi_n[i]) * eta_n[i] * (1.0 + zeta * zeta_n[i]) / 8.0;
                dn[2][i] = (1.0 + xi * xi_n[i]) * (1.0 + eta * eta_n[i]) * zeta_n[i] / 8.0;
            }

            let mut j = Matrix3::<f64>::zeros();
            for i in 0..8 {
                for r in 0..3 {
                    j[(r, 0)] += dn[r][i] * nodes[i].x;
                    j[(r, 1)] += dn[r][i] * nodes[i].y;
                    j[(r, 2)] += dn[r][i] * nodes[i].z;
                }
            }
            let det_j = j.determinant();
            debug_assert!(det_j > 0.0, "non-positive Jacobian in reference hex");
            let j_inv = j.try_inverse().expect("reference hex Jacobian is invertible");

            let mut b = DMatrix::<f64>::zeros(6, 24);
            for i in 0..8 {
                let local = Vector3::new(dn[0][i], dn[1][i], dn[2][i]);
                let global = j_inv * local;
                let (dx_, dy_, dz_) = (global.x, global.y, global.z);
                let c = i * 3;
                b[(0, c)] = dx_;
                b[(1, c + 1)] = dy_;
                b[(2, c + 2)] = dz_;
                b[(3, c)] = dy_;
                b[(3, c + 1)] = dx_;
                b[(4, c + 1)] = dz_;
                b[(4, c + 2)] = dy_;
                b[(5, c)] = dz_;
                b[(5, c + 2)] = dx_;
            }

            k += b.transpose() * &d * &b * det_j;
        }

        Self {
            matrix: k,
            dofs: 24,
        }
    }

    /// Strain energy `uᵀ K u` for a given element displacement vector,
    /// used directly by compliance sensitivity analysis.
    pub fn strain_energy(&self, u: &[f64]) -> f64 {
        debug_assert_eq!(u.len(), self.dofs);
        let uv = DMatrix::from_row_slice(self.dofs, 1, u);
        let e = (uv.transpose() * &self.matrix * &uv)[(0, 0)];
        e
    }
}

fn plane_stress_constitutive(nu: f64) -> DMatrix<f64> {
    let factor = 1.0 / (1.0 - nu * nu);
    let shear = (1.0 - nu) / 2.0;
    DMatrix::from_row_slice(
        3,
        3,
        &[
            factor,
            factor * nu,
            0.0,
            factor * nu,
            factor,
            0.0,
            0.0,
            0.0,
            factor * shear,
        ],
    )
}

fn solid_constitutive(nu: f64) -> SMatrix<f64, 6, 6> {
    let factor = 1.0 / ((1.0 + nu) * (1.0 - 2.0 * nu));
    let diag = 1.0 - nu;
    let shear = (1.0 - 2.0 * nu) / 2.0;
    let mut d = SMatrix::<f64, 6, 6>::zeros();
    d[(0, 0)] = diag * factor;
    d[(0, 1)] = nu * factor;
    d[(0, 2)] = nu * factor;
    d[(1, 0)] = nu * factor;
    d[(1, 1)] = diag * factor;
    d[(1, 2)] = nu * factor;
    d[(2, 0)] = nu * factor;
    d[(2, 1)] = nu * factor;
    d[(2, 2)] = diag * factor;
    d[(3, 3)] = shear * factor;
    d[(4, 4)] = shear * factor;
    d[(5, 5)] = shear * factor;
    d
}
