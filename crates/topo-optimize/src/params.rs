//! SIMP run configuration: a plain data struct with a `Default` impl for
//! the common case, validated once up front rather than defensively
//! re-checked on every access.

use topo_model::{Result, TopoError};

#[derive(Debug, Clone, PartialEq)]
pub struct SimpParams {
    pub nx: usize,
    pub ny: usize,
    pub nz: usize,

    pub vol_frac: f64,
    pub rho_min: f64,

    pub penal_start: f64,
    pub penal_end: f64,
    pub penal_ramp_iters: usize,

    pub r_min: f64,
    pub move_limit: f64,

    pub max_iters: usize,
    pub min_iterations: usize,
    pub tol_change: f64,
    pub gray_tol: Option<f64>,

    pub e0: f64,
    pub e_min: f64,
    pub nu: f64,

    pub cg_tol: f64,
    pub cg_max_iters: usize,
    pub cg_boost_factor: f64,

    pub emit_every: usize,
    pub yield_every: usize,
    pub strict_convergence: bool,

    /// Heaviside projection sharpness. Opt-in: only applied when > 0.
    pub beta_max: f64,

    pub density_threshold: f64,
    pub pipe_radius: f64,
    pub pipe_segments: usize,
    pub max_links_per_point: usize,
    pub max_span_length: f64,
    pub max_points_per_cell: usize,

    pub plasticwrap_enabled: bool,
    pub plasticwrap_distance: f64,
    pub plasticwrap_passes: usize,
}

impl Default for SimpParams {
    fn default() -> Self {
        Self {
            nx: 1,
            ny: 1,
            nz: 1,
            vol_frac: 0.5,
            rho_min: 1e-3,
            penal_start: 1.0,
            penal_end: 3.0,
            penal_ramp_iters: 50,
            r_min: 1.5,
            move_limit: 0.2,
            max_iters: 200,
            min_iterations: 10,
            tol_change: 1e-3,
            gray_tol: None,
            e0: 1.0,
            e_min: 1e-9,
            nu: 0.3,
            cg_tol: 1e-6,
            cg_max_iters: 400,
            cg_boost_factor: 4.0,
            emit_every: 1,
            yield_every: 1,
            strict_convergence: false,
            beta_max: 0.0,
            density_threshold: 0.5,
            pipe_radius: 0.05,
            pipe_segments: 12,
            max_links_per_point: 4,
            max_span_length: 2.0,
            max_points_per_cell: 64,
            plasticwrap_enabled: false,
            plasticwrap_distance: f64::INFINITY,
            plasticwrap_passes: 10,
        }
    }
}

impl SimpParams {
    /// Validate every recognized option once at driver construction,
    /// rather than on every access.
    pub fn validate(&self) -> Result<()> {
        let invalid = |name: &str, reason: &str| -> TopoError {
            TopoError::InvalidParam {
                name: name.to_string(),
                reason: reason.to_string(),
            }
        };

        if self.nx == 0 || self.ny == 0 || self.nz == 0 {
            return Err(invalid("nx/ny/nz", "element counts must be >= 1"));
        }
        if !(self.vol_frac > 0.0 && self.vol_frac <= 1.0) {
            return Err(invalid("volFrac", "must lie in (0, 1]"));
        }
        if !(self.rho_min > 0.0 && self.rho_min < 1.0) {
            return Err(invalid("rhoMin", "must lie in (0, 1)"));
        }
        if self.penal_start <= 0.0 || self.penal_end <= 0.0 {
            return Err(invalid("penalStart/penalEnd", "penalty must be positive"));
        }
        if self.r_min <= 0.0 {
            return Err(invalid("rmin", "filter radius must be positive"));
        }
        if !(self.move_limit > 0.0 && self.move_limit <= 1.0) {
            return Err(invalid("move", "OC move limit must lie in (0, 1]"));
        }
        if self.max_iters == 0 {
            return Err(invalid("maxIters", "must be >= 1"));
        }
        if self.tol_change <= 0.0 {
            return Err(invalid("tolChange", "must be positive"));
        }
        if let Some(gt) = self.gray_tol {
            if !(0.0..=1.0).contains(&gt) {
                return Err(invalid("grayTol", "must lie in [0, 1]"));
            }
        }
        if self.e0 <= 0.0 {
            return Err(invalid("E0", "must be positive"));
        }
        if self.e_min < 0.0 {
            return Err(invalid("Emin", "must be non-negative"));
        }
        if !(-1.0..1.0).contains(&self.nu) {
            return Err(invalid("nu", "Poisson ratio must lie in (-1, 1)"));
        }
        if self.cg_tol <= 0.0 {
            return Err(invalid("cgTol", "must be positive"));
        }
        if self.cg_max_iters == 0 {
            return Err(invalid("cgMaxIters", "must be >= 1"));
        }
        if self.cg_boost_factor < 1.0 {
            return Err(invalid("cgBoostFactor", "must be >= 1"));
        }
        if self.emit_every == 0 || self.yield_every == 0 {
            return Err(invalid("emitEvery/yieldEvery", "must be >= 1"));
        }
        if self.beta_max < 0.0 {
            return Err(invalid("betaMax", "must be non-negative"));
        }
        if self.pipe_segments < 3 {
            return Err(invalid("pipeSegments", "must be >= 3"));
        }

        // Infeasible when the target volume fraction sits below the
        // per-element density floor.
        if self.vol_frac < self.rho_min {
            return Err(TopoError::ConstraintInfeasible {
                target: self.vol_frac,
                floor: self.rho_min,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        SimpParams::default().validate().unwrap();
    }

    #[test]
    fn infeasible_target_is_rejected() {
        let params = SimpParams {
            vol_frac: 1e-6,
            rho_min: 1e-3,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(TopoError::ConstraintInfeasible { .. })
        ));
    }

    #[test]
    fn zero_element_count_is_rejected() {
        let params = SimpParams {
            nx: 0,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(TopoError::InvalidParam { .. })));
    }
}
