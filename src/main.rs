//! Headless runner.
//!
//! ```text
//! sporefield [preset.json] [ticks]
//! ```
//!
//! Runs the simulation without a window, logging the framerate once per
//! second and a trail occupancy summary at the end. Set `RUST_LOG` to change
//! verbosity.

use std::process::ExitCode;

use env_logger::Env;
use sporefield::prelude::*;

const DEFAULT_TICKS: u64 = 600;

struct RunnerArgs {
    preset: Option<String>,
    ticks: u64,
}

fn parse_args() -> RunnerArgs {
    let mut args = RunnerArgs {
        preset: None,
        ticks: DEFAULT_TICKS,
    };
    for arg in std::env::args().skip(1) {
        match arg.parse::<u64>() {
            Ok(ticks) => args.ticks = ticks,
            Err(_) => args.preset = Some(arg),
        }
    }
    args
}

fn run(args: RunnerArgs) -> Result<(), SimulationError> {
    let params = match &args.preset {
        Some(path) => match SimulationParameters::load_json(path) {
            Ok(params) => {
                log::info!("loaded preset {}", path);
                params
            }
            Err(e) => {
                log::warn!("could not load preset {}: {}; using defaults", path, e);
                SimulationParameters::default()
            }
        },
        None => SimulationParameters::default(),
    };

    let mut device = WgpuDevice::new_headless()?;
    let kernels = device.build_kernels()?;
    let mut sim = SimulationContext::new(&device, kernels, params)?;
    log::info!(
        "{} agents, grid {}^3, distance field {}^3",
        sim.params().agent_count,
        sim.params().grid_resolution,
        sim.params().field_resolution()
    );

    let mut clock = FrameClock::new();
    for _ in 0..args.ticks {
        let dt = clock.tick();
        sim.camera_mut().rotate(0.1, 0.0, dt);
        sim.tick(&mut device, dt)?;
        if let Some(fps) = clock.take_fps_report() {
            log::info!("{:.1} fps (tick {})", fps, sim.ticks());
        }
    }

    let grid = sim.read_trail_grid(&mut device)?;
    let occupied = grid.iter().filter(|&&v| v > 0.0).count();
    log::info!(
        "finished {} ticks, {} dispatches; {} of {} voxels carry trail ({:.2}%)",
        sim.ticks(),
        sim.dispatches(),
        occupied,
        grid.len(),
        100.0 * occupied as f64 / grid.len().max(1) as f64
    );
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    match run(parse_args()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}{}", if e.is_fatal() { "fatal: " } else { "" }, e);
            ExitCode::FAILURE
        }
    }
}
