use std::path::{Path, PathBuf};
use std::process::ExitCode;

use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use floodsim::{Scenario, list_flood_zones};

fn write_json<T: Serialize + ?Sized>(dir: &Path, name: &str, value: &T) -> Result<(), String> {
    let path = dir.join(name);
    let file = std::fs::File::create(&path)
        .map_err(|e| format!("failed to create {}: {e}", path.display()))?;
    serde_json::to_writer_pretty(std::io::BufWriter::new(file), value)
        .map_err(|e| format!("failed to write {}: {e}", path.display()))?;
    info!("Saved {}", path.display());
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    let defaults = Scenario::default();

    let seed: u64 = args.get(1).and_then(|s| s.parse().ok()).unwrap_or(42);
    let grid_size: usize = args.get(2).and_then(|s| s.parse().ok()).unwrap_or(defaults.grid_size);
    let total_time: f64 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(defaults.total_time);
    let time_step: f64 = args.get(4).and_then(|s| s.parse().ok()).unwrap_or(defaults.time_step);
    let out_dir: PathBuf = args
        .get(5)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("artifacts"));

    let scenario = Scenario {
        grid_size,
        total_time,
        time_step,
        ..defaults
    };

    info!(
        "Simulating {}x{} grid with seed={}, {} min in {} min steps",
        grid_size, grid_size, seed, total_time, time_step
    );

    let output = match floodsim::simulate(seed, &scenario) {
        Ok(output) => output,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    info!("Timings:");
    for t in &output.timings {
        info!("  {:20} {:8.1} ms", t.name, t.ms);
    }
    info!(
        "{} trace points, {} critical, clock at {} min",
        output.status.total_points, output.status.critical_points, output.status.current_time
    );

    if let Err(e) = std::fs::create_dir_all(&out_dir) {
        error!("failed to create output directory {}: {e}", out_dir.display());
        return ExitCode::FAILURE;
    }

    let writes = [
        write_json(&out_dir, "trace.json", &output.trace),
        write_json(&out_dir, "status.json", &output.status),
        write_json(&out_dir, "zones.json", list_flood_zones()),
    ];
    for r in writes {
        if let Err(e) = r {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    }

    info!("Done.");
    ExitCode::SUCCESS
}
