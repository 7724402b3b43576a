//! End-to-end ocean scenarios on the CPU backend
//!
//! These tests drive `OceanSimulation` through whole frames and check the
//! statistical and lifecycle guarantees of the published fields:
//! - Zero-mean height at t=0 and a perfectly flat sea without wind
//! - Foam stays inside [0, 1] under aggressive growth and decay
//! - Linear and tiled storage publish identical fields
//! - Disable/enable cycles never leak backend or capture resources

use nalgebra::{Point3, Vector3};
use ocean_sim_core::{
    BackendPreference, CameraSettings, HeadlessRenderer, LayoutKind, OceanConfig, OceanError,
    OceanSimulation, ParameterChange, SurfaceField, ViewerCamera, ViewerId, WaterPlane,
};

#[ctor::ctor]
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

fn config(map_size: u32, wind_speed: f32) -> OceanConfig {
    OceanConfig {
        map_size,
        wind_speed,
        ..OceanConfig::default()
    }
}

fn viewer() -> ViewerCamera {
    ViewerCamera::looking_at(
        ViewerId(7),
        Point3::new(0.0, 12.0, -30.0),
        Point3::new(0.0, 0.0, 0.0),
        CameraSettings::default(),
    )
}

fn mean_and_rms(values: &[f32]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().map(|&v| f64::from(v)).sum::<f64>() / n;
    let rms = (values.iter().map(|&v| f64::from(v).powi(2)).sum::<f64>() / n).sqrt();
    (mean, rms)
}

#[test]
fn test_height_field_is_zero_mean_at_time_zero() {
    let mut sim = OceanSimulation::new(config(64, 10.0), BackendPreference::Cpu).unwrap();
    let mut renderer = HeadlessRenderer::new();

    let output = sim
        .update(0.0, None, &WaterPlane::default(), &mut renderer)
        .unwrap();
    assert_eq!(output.time, 0.0);

    let heights = sim.read_field(SurfaceField::Height).unwrap();
    assert_eq!(heights.len(), 64 * 64);
    let (mean, rms) = mean_and_rms(&heights);
    assert!(rms > 0.0, "A 10 m/s wind must raise waves");
    assert!(
        mean.abs() < 1e-3 * rms + 1e-6,
        "Height mean {mean} should vanish next to rms {rms}"
    );

    for field in [SurfaceField::DisplacementX, SurfaceField::DisplacementY] {
        let values = sim.read_field(field).unwrap();
        let (mean, rms) = mean_and_rms(&values);
        assert!(mean.abs() < 1e-3 * rms + 1e-6, "{field:?} mean {mean}");
    }
}

#[test]
fn test_waves_move_over_time() {
    let mut sim = OceanSimulation::new(config(64, 10.0), BackendPreference::Cpu).unwrap();
    let mut renderer = HeadlessRenderer::new();
    let water = WaterPlane::default();

    sim.update(0.0, None, &water, &mut renderer).unwrap();
    let before = sim.read_field(SurfaceField::Height).unwrap().into_owned();
    sim.update(0.5, None, &water, &mut renderer).unwrap();
    let after = sim.read_field(SurfaceField::Height).unwrap().into_owned();

    let changed = before
        .iter()
        .zip(&after)
        .filter(|(a, b)| (*a - *b).abs() > 1e-6)
        .count();
    assert!(changed > before.len() / 2, "Only {changed} texels moved");
}

#[test]
fn test_calm_sea_stays_flat() {
    let mut sim = OceanSimulation::new(config(32, 0.0), BackendPreference::Cpu).unwrap();
    let mut renderer = HeadlessRenderer::new();
    let water = WaterPlane::default();

    for _ in 0..5 {
        sim.update(1.0 / 30.0, None, &water, &mut renderer).unwrap();
    }
    for field in [
        SurfaceField::Height,
        SurfaceField::DisplacementX,
        SurfaceField::DisplacementY,
        SurfaceField::Foam,
    ] {
        let values = sim.read_field(field).unwrap();
        assert!(values.iter().all(|&v| v == 0.0), "{field:?} is not flat");
    }
    // Flat water points straight up
    let normals = sim.read_field(SurfaceField::Normal).unwrap();
    assert!(normals.iter().all(|&v| v.abs() < 1e-6));
}

#[test]
fn test_foam_stays_in_unit_range() {
    let config = OceanConfig {
        wind_speed: 32.0,
        foam_up_speed: 10.0,
        foam_down_speed: 10.0,
        foam_threshold: 0.0,
        tile_size: 1.0,
        ..config(64, 32.0)
    };
    let mut sim = OceanSimulation::new(config, BackendPreference::Cpu).unwrap();
    let mut renderer = HeadlessRenderer::new();
    let water = WaterPlane::default();

    let mut saw_foam = false;
    for frame in 0..40 {
        // Alternate long and short frames so both clamps get hit
        let dt = if frame % 2 == 0 { 0.5 } else { 0.01 };
        sim.update(dt, None, &water, &mut renderer).unwrap();
        let foam = sim.read_field(SurfaceField::Foam).unwrap();
        for &f in foam.iter() {
            assert!((0.0..=1.0).contains(&f), "Foam {f} out of range at frame {frame}");
        }
        saw_foam |= foam.iter().any(|&f| f > 0.0);
    }
    assert!(saw_foam, "A 32 m/s wind with zero threshold must produce foam");
}

#[test]
fn test_storage_layouts_publish_identical_fields() {
    let linear_config = OceanConfig {
        storage_layout: LayoutKind::Linear,
        ..config(64, 12.0)
    };
    let tiled_config = OceanConfig {
        storage_layout: LayoutKind::Tiled,
        ..linear_config
    };
    let mut linear = OceanSimulation::new(linear_config, BackendPreference::Cpu).unwrap();
    let mut tiled = OceanSimulation::new(tiled_config, BackendPreference::Cpu).unwrap();
    let mut renderer = HeadlessRenderer::new();
    let water = WaterPlane::default();

    for _ in 0..4 {
        linear.update(0.1, None, &water, &mut renderer).unwrap();
        tiled.update(0.1, None, &water, &mut renderer).unwrap();
    }

    for field in SurfaceField::ALL {
        let a = linear.read_field(field).unwrap();
        let b = tiled.read_field(field).unwrap();
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(b.iter()) {
            approx::assert_abs_diff_eq!(*x, *y, epsilon = 1e-6);
        }
    }
}

#[test]
fn test_same_seed_is_reproducible() {
    let mut first = OceanSimulation::new(config(32, 9.0), BackendPreference::Cpu).unwrap();
    let mut second = OceanSimulation::new(config(32, 9.0), BackendPreference::Cpu).unwrap();
    let reseeded = OceanConfig {
        seed: 1234,
        ..config(32, 9.0)
    };
    let mut third = OceanSimulation::new(reseeded, BackendPreference::Cpu).unwrap();
    let mut renderer = HeadlessRenderer::new();
    let water = WaterPlane::default();

    for sim in [&mut first, &mut second, &mut third] {
        sim.update(0.25, None, &water, &mut renderer).unwrap();
    }
    let a = first.read_field(SurfaceField::Height).unwrap();
    let b = second.read_field(SurfaceField::Height).unwrap();
    let c = third.read_field(SurfaceField::Height).unwrap();
    assert_eq!(a, b);
    assert_ne!(a, c);

    // Different draws, same envelope
    let (_, rms_a) = mean_and_rms(&a);
    let (_, rms_c) = mean_and_rms(&c);
    assert!(rms_c > 0.3 * rms_a && rms_c < 3.0 * rms_a);
}

#[test]
fn test_wind_change_rebuilds_spectrum_on_next_frame() {
    let mut sim = OceanSimulation::new(config(32, 4.0), BackendPreference::Cpu).unwrap();
    let mut renderer = HeadlessRenderer::new();
    let water = WaterPlane::default();

    sim.update(0.1, None, &water, &mut renderer).unwrap();
    let (_, calm_rms) = mean_and_rms(&sim.read_field(SurfaceField::Height).unwrap());

    sim.apply(ParameterChange::WindSpeed(20.0));
    assert!(sim.reinit_pending());
    sim.update(0.1, None, &water, &mut renderer).unwrap();
    assert!(!sim.reinit_pending());

    let (_, storm_rms) = mean_and_rms(&sim.read_field(SurfaceField::Height).unwrap());
    assert!(storm_rms > calm_rms, "Stronger wind must raise bigger waves");
}

#[test]
fn test_height_query_follows_readback() {
    let config = OceanConfig {
        height_readback: true,
        ..config(32, 10.0)
    };
    let mut sim = OceanSimulation::new(config, BackendPreference::Cpu).unwrap();
    let mut renderer = HeadlessRenderer::new();
    sim.update(0.2, None, &WaterPlane::default(), &mut renderer)
        .unwrap();

    // Nothing read back yet
    assert_eq!(sim.height_at(&Vector3::new(3.0, 0.0, 5.0)), 0.0);

    sim.sync_readback().unwrap();
    let heights = sim.read_field(SurfaceField::Height).unwrap().into_owned();
    let tile = sim.config().tile_size;
    let expected = heights[sim.grid().index(3, 5)];
    assert_eq!(
        sim.height_at(&Vector3::new(3.5 * tile, 100.0, 5.5 * tile)),
        expected
    );

    sim.apply(ParameterChange::HeightReadback(false));
    assert_eq!(sim.height_at(&Vector3::new(3.5 * tile, 0.0, 5.5 * tile)), 0.0);
}

#[test]
fn test_disable_releases_everything_and_enable_restores_one_generation() {
    let mut sim = OceanSimulation::new(config(32, 10.0), BackendPreference::Cpu).unwrap();
    let mut renderer = HeadlessRenderer::new();
    let water = WaterPlane::default();
    let camera = viewer();

    let output = sim.update(0.1, Some(&camera), &water, &mut renderer).unwrap();
    assert!(output.reflection.is_some());
    assert!(output.refraction.is_some());
    let allocated = sim.live_allocations();
    let targets = renderer.live_targets();
    assert!(allocated > 0);
    assert_eq!(targets, 2);

    for cycle in 0..3 {
        let released = sim.disable(&mut renderer);
        assert_eq!(released, allocated, "cycle {cycle}");
        assert!(!sim.is_enabled());
        assert_eq!(sim.live_allocations(), 0);
        assert_eq!(renderer.live_targets(), 0);
        assert_eq!(sim.height_at(&Vector3::new(1.0, 0.0, 1.0)), 0.0);
        assert!(matches!(
            sim.update(0.1, Some(&camera), &water, &mut renderer),
            Err(OceanError::Disabled)
        ));

        sim.enable().unwrap();
        sim.update(0.1, Some(&camera), &water, &mut renderer).unwrap();
        assert_eq!(sim.live_allocations(), allocated, "cycle {cycle}");
        assert_eq!(renderer.live_targets(), targets, "cycle {cycle}");
    }
    assert_eq!(sim.generation(), 4);
}
