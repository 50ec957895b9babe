//! Jacobi-preconditioned conjugate gradient with boundary-condition-aware
//! residual projection and warm starting.
//!
//! `SolveInfo`-style diagnostics and a fatal/non-fatal error split follow
//! the native backend's solver shape; the CG algorithm itself is new —
//! the backend it's modeled on only implements dense LU and a
//! Cholesky-based eigensolver.

use std::collections::BTreeSet;

use nalgebra::DVector;
use nalgebra_sparse::CsrMatrix;
use topo_model::TopoError;

/// Diagnostics from a single CG solve (mirrors `backend::traits::SolveInfo`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolveInfo {
    pub iterations: usize,
    pub residual_norm: f64,
    pub converged: bool,
}

/// Solver knobs, independent of the outer SIMP continuation schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PcgConfig {
    pub tol: f64,
    pub max_iter: usize,
}

fn spmv(k: &CsrMatrix<f64>, x: &DVector<f64>) -> DVector<f64> {
    let mut out = DVector::<f64>::zeros(x.len());
    for (row_idx, row) in k.row_iter().enumerate() {
        let mut acc = 0.0;
        for (&col, &v) in row.col_indices().iter().zip(row.values().iter()) {
            acc += v * x[col];
        }
        out[row_idx] = acc;
    }
    out
}

fn jacobi_diag(k: &CsrMatrix<f64>) -> DVector<f64> {
    let n = k.nrows();
    let mut diag = DVector::<f64>::zeros(n);
    for (row_idx, row) in k.row_iter().enumerate() {
        for (&col, &v) in row.col_indices().iter().zip(row.values().iter()) {
            if col == row_idx {
                diag[row_idx] = v;
            }
        }
    }
    // Zero diagonals (over-elimination artifacts) are replaced by 1 so the
    // preconditioner never divides by zero.
    for d in diag.iter_mut() {
        if d.abs() < 1e-300 {
            *d = 1.0;
        }
    }
    diag
}

fn project_fixed(v: &mut DVector<f64>, fixed_dofs: &BTreeSet<usize>) {
    for &d in fixed_dofs {
        v[d] = 0.0;
    }
}

/// Solve `K u = f` with Jacobi-preconditioned CG, honoring boundary
/// conditions via the caller-supplied fixed-dof set as defense-in-depth
/// against assembly rounding. Returns `Err(TopoError::FeNumerical)`
/// only when the iterate becomes non-finite — ordinary non-convergence is
/// reported via `SolveInfo::converged = false` and is the driver's call
/// to escalate.
pub fn pcg_solve(
    k: &CsrMatrix<f64>,
    f: &DVector<f64>,
    fixed_dofs: &BTreeSet<usize>,
    warm_start: Option<&DVector<f64>>,
    cfg: PcgConfig,
) -> Result<(DVector<f64>, SolveInfo), TopoError> {
    let n = f.len();
    let f_norm = f.norm();
    if f_norm < 1e-300 {
        return Ok((
            DVector::zeros(n),
            SolveInfo {
                iterations: 0,
                residual_norm: 0.0,
                converged: true,
            },
        ));
    }

    let mut x = warm_start.cloned().unwrap_or_else(|| DVector::zeros(n));
    project_fixed(&mut x, fixed_dofs);

    let mut r = f - spmv(k, &x);
    project_fixed(&mut r, fixed_dofs);

    let diag = jacobi_diag(k);
    let apply_preconditioner =
        |v: &DVector<f64>| -> DVector<f64> { v.component_div(&diag) };

    let mut z = apply_preconditioner(&r);
    let mut p = z.clone();
    let mut rz_old = r.dot(&z);

    let mut iterations = 0;
    let mut converged = r.norm() / f_norm < cfg.tol;

    while !converged && iterations < cfg.max_iter {
        iterations += 1;
        let mut ap = spmv(k, &p);
        project_fixed(&mut ap, fixed_dofs);

        let pap = p.dot(&ap);
        if pap.abs() < 1e-300 {
            break;
        }
        let alpha = rz_old / pap;
        x += alpha * &p;
        r -= alpha * &ap;
        project_fixed(&mut r, fixed_dofs);

        let res_norm = r.norm();
        if res_norm / f_norm < cfg.tol {
            converged = true;
            break;
        }

        z = apply_preconditioner(&r);
        let rz_new = r.dot(&z);
        let beta = rz_new / rz_old;
        p = &z + beta * &p;
        rz_old = rz_new;
    }

    project_fixed(&mut x, fixed_dofs);

    if x.iter().any(|v| !v.is_finite()) {
        return Err(TopoError::FeNumerical(
            "solution vector contains NaN or Inf".into(),
        ));
    }

    let residual_norm = (f - spmv(k, &x)).norm() / f_norm;
    Ok((
        x,
        SolveInfo {
            iterations,
            residual_norm,
            converged,
        },
    ))
}
