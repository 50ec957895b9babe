//! SIMP driver: a single-threaded, cooperative state machine presenting a
//! lazy iterator of `SolverFrame`s, one per `advance()` call. Generalizes
//! a config-then-run analysis pipeline into a resumable iterator so an
//! external caller can pause, inspect, and resume between iterations.

use nalgebra::{DVector, Point3};

use topo_assembly::SimpAssembler;
use topo_elements::ElementStencil;
use topo_filter::FilterKernel;
use topo_geometry::{
    curve_network, extract_isosurface, multipipe, plastic_wrap, point_cloud, PlasticWrapParams,
    SkeletonParams, TriMesh,
};
use topo_grid::{FEModel, Grid};
use topo_model::{DomainMesh, GoalMarkers, Result, TopoError};
use topo_solver::{pcg_solve, PcgConfig};

use crate::oc::{compliance_sensitivity, heaviside_project, oc_update};
use crate::params::SimpParams;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Idle,
    Running,
    Paused,
    Converged,
    Error,
    Stopped,
}

/// One immutable snapshot of the optimization, emitted per the driver's
/// emit schedule.
#[derive(Debug, Clone)]
pub struct SolverFrame {
    pub iter: usize,
    pub compliance: f64,
    pub change: f64,
    pub vol: f64,
    pub densities_snapshot: Vec<f64>,
    pub converged: bool,
    pub fe_iters: usize,
    pub fe_converged: bool,
}

/// Final geometry and scalar metrics produced only on successful
/// termination.
#[derive(Debug, Clone)]
pub struct OptimizationResult {
    pub isosurface: TriMesh,
    pub point_cloud: Option<Vec<Point3<f64>>>,
    pub curve_network: Option<Vec<(usize, usize)>>,
    pub multipipe: Option<TriMesh>,
    pub volume: f64,
    pub surface_area: f64,
    pub final_compliance: f64,
    pub iterations: usize,
    pub converged: bool,
}

pub struct SimpDriver {
    grid: Grid,
    fe: FEModel,
    stencil: ElementStencil,
    assembler: SimpAssembler,
    filter: FilterKernel,
    params: SimpParams,

    rho: Vec<f64>,
    rho_bar: Vec<f64>,
    u_prev: Option<DVector<f64>>,

    iter: usize,
    prev_compliance: Option<f64>,
    stable_count: usize,
    state: DriverState,
    final_converged: bool,
}

impl SimpDriver {
    pub fn new(mesh: &DomainMesh, markers: &GoalMarkers, params: SimpParams) -> Result<Self> {
        params.validate()?;

        let grid = Grid::from_domain(mesh, params.nx, params.ny, params.nz)?;
        let fe = FEModel::build(&grid, markers);
        let stencil = ElementStencil::compute(grid.problem, params.nu, grid.dx, grid.dy, grid.dz);
        let assembler = SimpAssembler::new(&grid, &fe);
        let filter = FilterKernel::build(&grid, params.r_min);
        let rho = vec![params.vol_frac; grid.element_count()];
        let rho_bar = rho.clone();

        Ok(Self {
            grid,
            fe,
            stencil,
            assembler,
            filter,
            params,
            rho,
            rho_bar,
            u_prev: None,
            iter: 0,
            prev_compliance: None,
            stable_count: 0,
            state: DriverState::Idle,
            final_converged: false,
        })
    }

    pub fn state(&self) -> DriverState {
        self.state
    }

    pub fn iteration(&self) -> usize {
        self.iter
    }

    pub fn densities(&self) -> &[f64] {
        &self.rho
    }

    pub fn warnings(&self) -> &[String] {
        &self.fe.warnings
    }

    pub fn pause(&mut self) {
        if self.state == DriverState::Running {
            self.state = DriverState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if self.state == DriverState::Paused {
            self.state = DriverState::Running;
        }
    }

    /// Request a stop; honored immediately since the driver never yields
    /// mid-iteration. ρ is preserved for inspection.
    pub fn stop(&mut self) {
        if matches!(
            self.state,
            DriverState::Idle | DriverState::Running | DriverState::Paused
        ) {
            self.state = DriverState::Stopped;
        }
    }

    fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            DriverState::Converged | DriverState::Error | DriverState::Stopped
        )
    }

    /// Whether the caller should yield cooperatively at the current
    /// iteration count, per the `yield_every` hint. The driver itself has
    /// no concurrency runtime to yield to; this exposes the schedule for
    /// an async wrapper to act on.
    pub fn should_yield(&self) -> bool {
        self.iter % self.params.yield_every == 0
    }

    /// Perform exactly one SIMP iteration and return at
    /// most one frame. Returns `Ok(None)` when paused or already
    /// terminal; the sequence is non-restartable after a terminal state.
    pub fn advance(&mut self) -> Result<Option<SolverFrame>> {
        match self.state {
            DriverState::Idle => self.state = DriverState::Running,
            DriverState::Running => {}
            DriverState::Paused | DriverState::Converged | DriverState::Error
            | DriverState::Stopped => return Ok(None),
        }

        self.iter += 1;
        let iter = self.iter;

        // 1. penalty schedule.
        let ramp = self.params.penal_ramp_iters.max(1) as f64;
        let t = (iter as f64 / ramp).min(1.0);
        let penalty = self.params.penal_start + (self.params.penal_end - self.params.penal_start) * t;

        // 2. filter, with optional Heaviside sharpening.
        let mut rho_bar = self.filter.apply(&self.rho);
        if self.params.beta_max > 0.0 {
            heaviside_project(&mut rho_bar, self.params.beta_max);
        }

        // 3. assemble K(ρ̄, p). Cloned immediately so the CSR borrow
        // doesn't outlive the call and block later `&self.assembler` use.
        let e_min_eff = self.params.e_min.max(self.params.e0.abs() * 1e-9);
        let k = self
            .assembler
            .assemble(&rho_bar, penalty, self.params.e0, self.params.e_min, &self.stencil)
            .clone();

        // 4. solve K u = f, warm-started, with one boost retry.
        let cfg = PcgConfig {
            tol: self.params.cg_tol,
            max_iter: self.params.cg_max_iters,
        };
        let (mut u, mut info) =
            match pcg_solve(&k, &self.assembler.bc_force, &self.fe.fixed_dofs, self.u_prev.as_ref(), cfg) {
                Ok(result) => result,
                Err(err) => {
                    self.state = DriverState::Error;
                    return Err(err);
                }
            };

        if !info.converged {
            let boosted_max = ((self.params.cg_max_iters as f64) * self.params.cg_boost_factor) as usize;
            if boosted_max > cfg.max_iter {
                let boosted_cfg = PcgConfig {
                    tol: self.params.cg_tol,
                    max_iter: boosted_max,
                };
                let (u2, info2) =
                    match pcg_solve(&k, &self.assembler.bc_force, &self.fe.fixed_dofs, Some(&u), boosted_cfg) {
                        Ok(result) => result,
                        Err(err) => {
                            self.state = DriverState::Error;
                            return Err(err);
                        }
                    };
                u = u2;
                info = info2;
            }
            if !info.converged {
                if self.params.strict_convergence {
                    self.state = DriverState::Error;
                    return Err(TopoError::FeDiverged(format!(
                        "CG residual {} did not reach tolerance {} within the boost budget",
                        info.residual_norm, self.params.cg_tol
                    )));
                }
                // Non-strict: continue with the last iterate, flagged on the frame.
            }
        }
        self.u_prev = Some(u.clone());

        // 5. sensitivities.
        let sens_rho_bar = compliance_sensitivity(
            &self.assembler,
            &u,
            &self.stencil,
            &rho_bar,
            penalty,
            self.params.e0,
            e_min_eff,
        );
        let sens_rho = self.filter.adjoint(&sens_rho_bar);

        // 6. OC update (double-buffer ρ / ρ_next; swap).
        let oc = oc_update(
            &self.rho,
            &sens_rho,
            self.params.rho_min,
            self.params.move_limit,
            self.params.vol_frac,
        );

        // 7. change / volume / compliance. Compliance C = f^T u since K u = f.
        let change = oc.max_change;
        let vol = oc.mean_volume;
        let compliance = self.assembler.bc_force.dot(&u);

        self.rho = oc.rho_next;
        self.rho_bar = rho_bar;

        // Convergence bookkeeping.
        let compliance_change = match self.prev_compliance {
            Some(prev) => (compliance - prev).abs() / compliance.max(1.0),
            None => f64::INFINITY,
        };
        self.prev_compliance = Some(compliance);

        let primary_ok = compliance_change < self.params.tol_change && change < self.params.tol_change;
        self.stable_count = if primary_ok { self.stable_count + 1 } else { 0 };
        let stabilized = self.stable_count >= 3;

        let converged_now = stabilized && iter >= self.params.min_iterations;
        let at_max_iters = iter >= self.params.max_iters;

        let should_emit =
            iter == 1 || iter % self.params.emit_every == 0 || converged_now || at_max_iters;

        let frame = should_emit.then(|| SolverFrame {
            iter,
            compliance,
            change,
            vol,
            densities_snapshot: self.rho.clone(),
            converged: converged_now,
            fe_iters: info.iterations,
            fe_converged: info.converged,
        });

        if converged_now {
            self.state = DriverState::Converged;
            self.final_converged = true;
        } else if at_max_iters {
            self.state = DriverState::Converged;
            self.final_converged = false;
        }

        Ok(frame)
    }

    /// Extraction and post-smoothing, available once the driver has
    /// reached a terminal, non-error state. `None` while
    /// running/paused/stopped/error, since only success produces a
    /// result.
    pub fn result(&self) -> Option<Result<OptimizationResult>> {
        if self.state != DriverState::Converged {
            return None;
        }

        let isosurface = match extract_isosurface(&self.grid, &self.rho_bar, self.params.density_threshold) {
            Ok(mut mesh) => {
                if self.params.plasticwrap_enabled {
                    let pw = PlasticWrapParams {
                        passes: self.params.plasticwrap_passes,
                        lambda: 0.5,
                        wrap_distance: self.params.plasticwrap_distance,
                    };
                    plastic_wrap(&mut mesh, pw);
                }
                mesh
            }
            // An empty extraction is surfaced as a zero-vertex mesh, not a fatal error.
            Err(TopoError::ExtractionEmpty { .. }) => TriMesh::new(),
            Err(e) => return Some(Err(e)),
        };

        let points = point_cloud(
            &self.grid,
            &self.rho_bar,
            self.params.density_threshold,
            self.params.max_points_per_cell,
        );
        let edges = curve_network(&points, self.params.max_span_length, self.params.max_links_per_point);
        let pipes = multipipe(
            &points,
            &edges,
            SkeletonParams {
                max_points_per_cell: self.params.max_points_per_cell,
                max_span_length: self.params.max_span_length,
                max_links_per_point: self.params.max_links_per_point,
                pipe_radius: self.params.pipe_radius,
                pipe_segments: self.params.pipe_segments,
            },
        );

        let volume = isosurface.enclosed_volume();
        let surface_area = isosurface.surface_area();

        Some(Ok(OptimizationResult {
            isosurface,
            point_cloud: Some(points),
            curve_network: Some(edges),
            multipipe: Some(pipes),
            volume,
            surface_area,
            final_compliance: self.prev_compliance.unwrap_or(0.0),
            iterations: self.iter,
            converged: self.final_converged,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use topo_model::DomainMesh;

    fn mbb_like() -> (DomainMesh, GoalMarkers, SimpParams) {
        let mesh = DomainMesh::new(
            vec![
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(2.0, 0.0, 0.0),
                Point3::new(2.0, 1.0, 0.0),
                Point3::new(0.0, 1.0, 0.0),
            ],
            vec![],
        );
        let markers = GoalMarkers::new()
            .with_anchor(Point3::new(0.0, 0.0, 0.0))
            .with_anchor(Point3::new(0.0, 1.0, 0.0))
            .with_load(Point3::new(2.0, 0.5, 0.0), nalgebra::Vector3::new(0.0, -1.0, 0.0));
        let params = SimpParams {
            nx: 12,
            ny: 6,
            nz: 1,
            vol_frac: 0.5,
            max_iters: 40,
            min_iterations: 5,
            penal_ramp_iters: 15,
            ..Default::default()
        };
        (mesh, markers, params)
    }

    #[test]
    fn driver_runs_to_a_terminal_state() {
        let (mesh, markers, params) = mbb_like();
        let max_iters = params.max_iters;
        let mut driver = SimpDriver::new(&mesh, &markers, params).unwrap();
        let mut frames = 0;
        loop {
            match driver.advance().unwrap() {
                Some(_) => frames += 1,
                None => {}
            }
            if driver.state() != DriverState::Running && driver.state() != DriverState::Idle {
                break;
            }
            if driver.iteration() > max_iters + 1 {
                panic!("driver did not reach a terminal state");
            }
        }
        assert!(frames > 0);
        assert_eq!(driver.state(), DriverState::Converged);
        for &rho in driver.densities() {
            assert!(rho >= 1e-3 - 1e-9 && rho <= 1.0 + 1e-9);
        }
    }

    #[test]
    fn pause_resume_matches_uninterrupted_run() {
        let (mesh, markers, params) = mbb_like();
        let mut uninterrupted = SimpDriver::new(&mesh, &markers, params.clone()).unwrap();
        while uninterrupted.state() == DriverState::Idle || uninterrupted.state() == DriverState::Running {
            uninterrupted.advance().unwrap();
        }

        let mut paused_run = SimpDriver::new(&mesh, &markers, params).unwrap();
        for _ in 0..5 {
            paused_run.advance().unwrap();
        }
        paused_run.pause();
        assert!(paused_run.advance().unwrap().is_none());
        paused_run.resume();
        while paused_run.state() == DriverState::Running {
            paused_run.advance().unwrap();
        }

        assert_eq!(uninterrupted.densities(), paused_run.densities());
    }

    #[test]
    fn stop_preserves_densities_and_halts() {
        let (mesh, markers, params) = mbb_like();
        let mut driver = SimpDriver::new(&mesh, &markers, params).unwrap();
        driver.advance().unwrap();
        driver.advance().unwrap();
        let snapshot = driver.densities().to_vec();
        driver.stop();
        assert!(driver.advance().unwrap().is_none());
        assert_eq!(driver.state(), DriverState::Stopped);
        assert_eq!(driver.densities(), snapshot.as_slice());
    }

    #[test]
    fn construction_rejects_infeasible_volume_target() {
        let (mesh, markers, _) = mbb_like();
        let params = SimpParams {
            vol_frac: 1e-6,
            rho_min: 1e-3,
            ..Default::default()
        };
        assert!(matches!(
            SimpDriver::new(&mesh, &markers, params),
            Err(TopoError::ConstraintInfeasible { .. })
        ));
    }
}
