use clap::Parser;
use nalgebra::{Point3, Vector3};
use ocean_sim_core::{
    BackendPreference, CameraSettings, HeadlessRenderer, LayoutKind, OceanConfig,
    OceanSimulation, SurfaceField, ViewerCamera, ViewerId, WaterPlane,
};
use tracing_subscriber::EnvFilter;

/// Ocean simulation demo with configurable parameters
#[derive(Parser, Debug)]
#[command(name = "ocean-sim-demo")]
#[command(about = "Headless FFT ocean simulation demo", long_about = None)]
struct Args {
    /// FFT grid size (power of two, 32 to 1024)
    #[arg(short, long, default_value_t = 256)]
    map_size: u32,

    /// Number of frames to simulate
    #[arg(short, long, default_value_t = 240)]
    frames: u32,

    /// Frame time in seconds
    #[arg(long, default_value_t = 1.0 / 60.0)]
    dt: f32,

    /// Wind speed in m/s (0-32)
    #[arg(short, long, default_value_t = 16.0)]
    wind_speed: f32,

    /// Wind direction in degrees (0 = +x)
    #[arg(long, default_value_t = 0.0)]
    wind_direction: f32,

    /// Time multiplier (0.5-2)
    #[arg(long, default_value_t = 1.0)]
    speed: f32,

    /// Seed for the initial spectrum
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Backend (auto, cpu, gpu)
    #[arg(short, long, default_value = "auto")]
    backend: String,

    /// CPU storage layout (linear, tiled)
    #[arg(long, default_value = "linear")]
    layout: String,

    /// Read the height field back and probe it every report
    #[arg(short, long)]
    readback: bool,

    /// Render reflection/refraction captures with a headless renderer
    #[arg(long)]
    captures: bool,

    /// Report interval in frames
    #[arg(long, default_value_t = 30)]
    report_interval: u32,

    /// Grow the grid to this size halfway through the run
    #[arg(long)]
    resize_to: Option<u32>,
}

struct FieldStats {
    min: f32,
    max: f32,
    rms: f32,
}

fn field_stats(values: &[f32]) -> FieldStats {
    let mut min = f32::MAX;
    let mut max = f32::MIN;
    let mut sum_sq = 0.0f64;
    for &v in values {
        min = min.min(v);
        max = max.max(v);
        sum_sq += f64::from(v * v);
    }
    FieldStats {
        min,
        max,
        rms: (sum_sq / values.len().max(1) as f64).sqrt() as f32,
    }
}

fn foam_coverage(values: &[f32]) -> f32 {
    let foamy = values.iter().filter(|&&f| f > 0.5).count();
    100.0 * foamy as f32 / values.len().max(1) as f32
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    println!("=== Ocean Simulation Demo ===\n");

    let preference = match args.backend.to_lowercase().as_str() {
        "cpu" => BackendPreference::Cpu,
        "gpu" => BackendPreference::Gpu,
        "auto" => BackendPreference::Auto,
        other => {
            println!("Unknown backend '{}', using auto", other);
            BackendPreference::Auto
        }
    };
    let storage_layout = match args.layout.to_lowercase().as_str() {
        "tiled" => LayoutKind::Tiled,
        "linear" => LayoutKind::Linear,
        other => {
            println!("Unknown layout '{}', using linear", other);
            LayoutKind::Linear
        }
    };

    let mut config = OceanConfig {
        map_size: args.map_size,
        wind_speed: args.wind_speed,
        wind_direction_degrees: args.wind_direction,
        speed: args.speed,
        seed: args.seed,
        storage_layout,
        height_readback: args.readback,
        ..OceanConfig::default()
    };
    config.capture.reflection = args.captures;
    config.capture.refraction = args.captures;

    let mut sim = match OceanSimulation::new(config, preference) {
        Ok(sim) => sim,
        Err(e) => {
            eprintln!("Failed to create ocean simulation: {}", e);
            std::process::exit(1);
        }
    };

    let gpu = sim.solver().is_some_and(|solver| solver.is_gpu_accelerated());
    println!(
        "Grid: {0}x{0}, domain: {1:.0}m, wind: {2:.1} m/s @ {3:.0}°, backend: {4}",
        sim.grid().size(),
        sim.config().domain_size(),
        sim.config().wind_speed,
        sim.config().wind_direction_degrees,
        if gpu { "GPU" } else { "CPU" }
    );
    println!("Allocated resources: {}\n", sim.live_allocations());

    let mut renderer = HeadlessRenderer::new();
    let water = WaterPlane::default();
    let camera = ViewerCamera::looking_at(
        ViewerId(1),
        Point3::new(0.0, 20.0, -60.0),
        Point3::new(0.0, 0.0, 0.0),
        CameraSettings::default(),
    );
    let viewer = args.captures.then_some(&camera);

    println!(" Frame | Time(s) | Height min | Height max | Height rms | Foam(%) | Probe(m) | ms");
    println!("-------|---------|------------|------------|------------|---------|----------|------");

    for frame in 1..=args.frames {
        if let Some(size) = args.resize_to {
            if frame == args.frames / 2 {
                match sim.resize(size) {
                    Ok(()) => println!(
                        "-- resized to {0}x{0} (generation {1})",
                        size,
                        sim.generation()
                    ),
                    Err(e) => println!("-- resize to {} failed: {}", size, e),
                }
            }
        }

        if let Err(e) = sim.update(args.dt, viewer, &water, &mut renderer) {
            eprintln!("Frame {} failed: {}", frame, e);
            std::process::exit(1);
        }

        if frame % args.report_interval.max(1) == 0 || frame == args.frames {
            if let Err(e) = sim.sync_readback() {
                eprintln!("Readback failed: {}", e);
            }
            let heights = match sim.read_field(SurfaceField::Height) {
                Ok(values) => field_stats(&values),
                Err(e) => {
                    eprintln!("Height read failed: {}", e);
                    continue;
                }
            };
            let foam = sim
                .read_field(SurfaceField::Foam)
                .map(|values| foam_coverage(&values))
                .unwrap_or(0.0);
            let probe = sim.height_at(&Vector3::new(12.0, 0.0, 34.0));

            println!(
                "{:6} | {:7.2} | {:10.3} | {:10.3} | {:10.3} | {:7.2} | {:8.3} | {:5.2}",
                frame,
                sim.time(),
                heights.min,
                heights.max,
                heights.rms,
                foam,
                probe,
                sim.frame_timer().last_frame_time_ms()
            );
        }
    }

    println!("\n=== Simulation Complete ===");
    println!("Frames: {}", sim.frame());
    println!("Simulated time: {:.2}s", sim.time());
    println!(
        "Average frame time: {:.2} ms",
        sim.frame_timer().average_frame_time_ms()
    );
    if args.captures {
        println!(
            "Captures rendered: {} (live targets: {})",
            renderer.renders().len(),
            renderer.live_targets()
        );
    }

    let released = sim.disable(&mut renderer);
    println!(
        "Disabled: released {} resources, {} still live",
        released,
        sim.live_allocations()
    );
}
