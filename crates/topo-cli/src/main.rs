//! Demo driver binary. The engine's real interface is the typed
//! `SimpDriver` API, not this CLI — it just runs one of the canonical
//! scenarios to completion and prints a summary.

use std::process::ExitCode;

use nalgebra::{Point3, Vector3};
use topo_model::{DomainMesh, GoalMarkers};
use topo_optimize::{DriverState, SimpDriver, SimpParams};

fn usage() {
    eprintln!("usage:");
    eprintln!("  topo-cli mbb-beam-2d");
    eprintln!("  topo-cli cantilever-3d");
    eprintln!("  topo-cli --help");
}

fn box_mesh(min: Point3<f64>, max: Point3<f64>) -> DomainMesh {
    DomainMesh::new(vec![min, max], vec![])
}

fn mbb_beam_2d() -> (DomainMesh, GoalMarkers, SimpParams) {
    let mesh = box_mesh(Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 1.0, 0.0));
    let mut markers = GoalMarkers::new();
    for i in 0..=20 {
        let y = i as f64 / 20.0;
        markers = markers.with_anchor(Point3::new(0.0, y, 0.0));
    }
    markers = markers.with_load(Point3::new(2.0, 0.5, 0.0), Vector3::new(0.0, -1.0, 0.0));

    let params = SimpParams {
        nx: 60,
        ny: 20,
        nz: 1,
        vol_frac: 0.5,
        penal_start: 1.0,
        penal_end: 3.0,
        penal_ramp_iters: 50,
        max_iters: 120,
        ..Default::default()
    };
    (mesh, markers, params)
}

fn cantilever_3d() -> (DomainMesh, GoalMarkers, SimpParams) {
    let mesh = box_mesh(Point3::new(0.0, 0.0, 0.0), Point3::new(4.0, 1.0, 1.0));
    let mut markers = GoalMarkers::new();
    for iy in 0..=10 {
        for iz in 0..=10 {
            let y = iy as f64 / 10.0;
            let z = iz as f64 / 10.0;
            markers = markers.with_anchor(Point3::new(0.0, y, z));
        }
    }
    markers = markers.with_load(Point3::new(4.0, 0.5, 0.5), Vector3::new(0.0, 0.0, -1.0));

    let params = SimpParams {
        nx: 40,
        ny: 10,
        nz: 10,
        vol_frac: 0.3,
        penal_start: 1.0,
        penal_end: 3.0,
        penal_ramp_iters: 50,
        max_iters: 150,
        ..Default::default()
    };
    (mesh, markers, params)
}

fn run_scenario(name: &str, mesh: DomainMesh, markers: GoalMarkers, params: SimpParams) -> ExitCode {
    let mut driver = match SimpDriver::new(&mesh, &markers, params) {
        Ok(d) => d,
        Err(err) => {
            eprintln!("{name}: failed to construct driver: {err}");
            return ExitCode::from(1);
        }
    };

    for warning in driver.warnings() {
        eprintln!("{name}: warning: {warning}");
    }

    loop {
        match driver.advance() {
            Ok(Some(frame)) => println!(
                "{name}: iter={} compliance={:.4} change={:.6} vol={:.4} fe_converged={}",
                frame.iter, frame.compliance, frame.change, frame.vol, frame.fe_converged
            ),
            Ok(None) => {}
            Err(err) => {
                eprintln!("{name}: failed: {err}");
                return ExitCode::from(1);
            }
        }
        if !matches!(driver.state(), DriverState::Idle | DriverState::Running) {
            break;
        }
    }

    match driver.state() {
        DriverState::Converged => match driver.result() {
            Some(Ok(result)) => {
                println!(
                    "{name}: done converged={} iterations={} compliance={:.4} volume={:.4} surface_area={:.4}",
                    result.converged, result.iterations, result.final_compliance, result.volume, result.surface_area
                );
                ExitCode::SUCCESS
            }
            Some(Err(err)) => {
                eprintln!("{name}: extraction failed: {err}");
                ExitCode::from(1)
            }
            None => {
                eprintln!("{name}: converged but no result available");
                ExitCode::from(1)
            }
        },
        other => {
            eprintln!("{name}: terminated in state {other:?}");
            ExitCode::from(1)
        }
    }
}

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("help") | Some("-h") | Some("--help") | None => {
            usage();
            ExitCode::SUCCESS
        }
        Some("mbb-beam-2d") => {
            let (mesh, markers, params) = mbb_beam_2d();
            run_scenario("mbb-beam-2d", mesh, markers, params)
        }
        Some("cantilever-3d") => {
            let (mesh, markers, params) = cantilever_3d();
            run_scenario("cantilever-3d", mesh, markers, params)
        }
        Some(other) => {
            eprintln!("unknown subcommand: {other}");
            usage();
            ExitCode::from(2)
        }
    }
}
