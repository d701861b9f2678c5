//! Fitter integration tests: generate synthetic spots with known ground truth
//! and verify the fitter recovers them.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use laserspot::{
    estimate_initial, evaluate, fit, fit_auto, focus, generate_with, BeamMetrics, CoordinateGrid,
    FitConfig, IntensityField, SpotParams, SyntheticConfig, MIN_LEVEL,
};

fn sorted_sigmas(p: &SpotParams) -> (f64, f64) {
    (p.sigma0.min(p.sigma1), p.sigma0.max(p.sigma1))
}

/// Generate bright spots with the default sensor model and recover them.
#[test]
fn test_recover_synthetic_ground_truth() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    let grid = CoordinateGrid::mgrid(64, 64).unwrap();
    let config = SyntheticConfig {
        zscale_range: (120.0, 255.0),
        ..Default::default()
    };
    let mut rng = StdRng::seed_from_u64(56);

    for trial in 0..10 {
        let (image, truth) = generate_with(&grid, &mut rng, &config).unwrap();
        let result = fit_auto(&grid, &image, Some(255.0), &FitConfig::default()).unwrap();
        println!(
            "trial {}: status {:?}, {} iterations, rmse {:.3}, {} pixels",
            trial, result.status, result.iterations, result.rmse, result.n_pixels
        );
        assert!(result.is_converged(), "trial {}: {:?}", trial, result.status);

        let fitted = result.params;
        assert!(
            (fitted.xoff - truth.xoff).abs() < 0.5 && (fitted.yoff - truth.yoff).abs() < 0.5,
            "trial {}: center ({:.2}, {:.2}) vs ({:.2}, {:.2})",
            trial,
            fitted.xoff,
            fitted.yoff,
            truth.xoff,
            truth.yoff
        );

        let (fit_lo, fit_hi) = sorted_sigmas(&fitted);
        let (true_lo, true_hi) = sorted_sigmas(&truth);
        assert!(
            (fit_lo - true_lo).abs() < 0.05 * true_lo && (fit_hi - true_hi).abs() < 0.05 * true_hi,
            "trial {}: sigmas ({:.2}, {:.2}) vs ({:.2}, {:.2})",
            trial,
            fit_lo,
            fit_hi,
            true_lo,
            true_hi
        );

        assert!(
            (fitted.zscale - truth.zscale).abs() < 0.05 * truth.zscale,
            "trial {}: zscale {:.1} vs {:.1}",
            trial,
            fitted.zscale,
            truth.zscale
        );
        // uniform [0, 8) noise has mean 4, which lands in the background
        assert!(
            (fitted.zoff - (truth.zoff + 4.0)).abs() < 1.0,
            "trial {}: zoff {:.2} vs {:.2}",
            trial,
            fitted.zoff,
            truth.zoff
        );
        assert!(result.rmse < 3.0, "trial {}: rmse {}", trial, result.rmse);
        assert!(fitted.phi > -std::f64::consts::PI && fitted.phi <= std::f64::consts::PI);
        assert_eq!(fitted.zmax, Some(255.0));
    }
}

/// Gaussian sensor noise on a tilted, elongated spot.
#[test]
fn test_fit_with_gaussian_noise() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    let grid = CoordinateGrid::mgrid(80, 64).unwrap();
    let truth = SpotParams::new(-0.8, 6.0, 14.0)
        .unwrap()
        .with_center(41.7, 30.2)
        .with_scale(220.0)
        .with_offset(12.0);
    let clean = evaluate(&grid, &truth).unwrap();

    let mut rng = StdRng::seed_from_u64(4242);
    let normal = Normal::new(0.0, 2.0).unwrap();
    let noisy = clean.as_matrix().map(|v| v + normal.sample(&mut rng));
    let observed = IntensityField::from_matrix(noisy);

    let result = fit_auto(&grid, &observed, None, &FitConfig::default()).unwrap();
    assert!(result.is_converged(), "status {:?}", result.status);
    let f = result.params;

    // Compare through the quadratic form so the axis labelling does not matter
    let (pt, pf) = (truth.precision(), f.precision());
    for (name, t, v) in [("A", pt.a, pf.a), ("B", pt.b, pf.b), ("C", pt.c, pf.c)] {
        assert!((t - v).abs() < 0.03 * pt.a.max(pt.b), "{}: {} vs {}", name, v, t);
    }
    assert!((f.xoff - truth.xoff).abs() < 0.1, "xoff {}", f.xoff);
    assert!((f.yoff - truth.yoff).abs() < 0.1, "yoff {}", f.yoff);
    assert!((f.zscale - truth.zscale).abs() < 3.0, "zscale {}", f.zscale);
    assert!((f.zoff - truth.zoff).abs() < 0.5, "zoff {}", f.zoff);
    assert!((result.rmse - 2.0).abs() < 0.2, "rmse {}", result.rmse);
}

/// A focused beam saturates the sensor; masking the plateau still recovers the
/// unsaturated amplitude.
#[test]
fn test_fit_saturated_focused_spot() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    let grid = CoordinateGrid::mgrid(64, 64).unwrap();
    let wide = SpotParams::new(0.35, 12.0, 9.0)
        .unwrap()
        .with_center(32.4, 31.1)
        .with_scale(150.0)
        .with_offset(2.0);
    let narrow = focus(&wide, 4.0).unwrap().with_saturation(255.0);
    let observed = evaluate(&grid, &narrow).unwrap();
    assert_eq!(observed.max(), 255.0);

    let result = fit_auto(&grid, &observed, Some(255.0), &FitConfig::default()).unwrap();
    assert!(result.is_converged(), "status {:?}", result.status);
    assert!(result.n_pixels < 64 * 64);
    let f = result.params;
    assert!(
        (f.zscale - 600.0).abs() < 1.0,
        "zscale {} should recover the unsaturated 600",
        f.zscale
    );
    let (lo, hi) = sorted_sigmas(&f);
    assert!((lo - 4.5).abs() < 0.01, "minor sigma {}", lo);
    assert!((hi - 6.0).abs() < 0.01, "major sigma {}", hi);

    // energy of the recovered spot matches the unfocused beam
    let energy = BeamMetrics::from_params(&f).unwrap().energy;
    assert!((energy - wide.energy()).abs() < 1e-2 * wide.energy());
}

/// A poor initial guess with a two-iteration budget reports non-convergence
/// but still returns usable parameters.
#[test]
fn test_non_convergence_is_reported() {
    let grid = CoordinateGrid::mgrid(64, 64).unwrap();
    let truth = SpotParams::new(0.2, 10.0, 8.0)
        .unwrap()
        .with_center(30.0, 34.0)
        .with_scale(180.0);
    let observed = evaluate(&grid, &truth).unwrap();

    let initial = SpotParams::new(0.0, 3.0, 3.0)
        .unwrap()
        .with_center(20.0, 40.0)
        .with_scale(50.0);
    let config = FitConfig {
        max_iterations: 2,
        ..Default::default()
    };
    let result = fit(&grid, &observed, &initial, &config).unwrap();
    assert!(!result.is_converged());
    assert_eq!(result.iterations, 2);
    assert!(result.cost.is_finite());
    assert!(result.params.validate().is_ok());

    // Retrying from a moment-based guess succeeds
    let guess = estimate_initial(&grid, &observed, MIN_LEVEL).unwrap();
    let retry = fit(&grid, &observed, &guess, &FitConfig::default()).unwrap();
    assert!(retry.is_converged(), "status {:?}", retry.status);
    assert!((retry.params.zscale - 180.0).abs() < 1e-3);
}

#[test]
fn test_windowed_fit() -> anyhow::Result<()> {
    let grid = CoordinateGrid::mgrid(96, 96)?;
    let truth = SpotParams::new(1.0, 5.0, 7.0)?
        .with_center(47.2, 50.6)
        .with_scale(90.0)
        .with_offset(4.0);
    let observed = evaluate(&grid, &truth)?;
    let config = FitConfig {
        window_level: Some(0.2),
        window_margin: 6,
        ..Default::default()
    };
    let result = fit_auto(&grid, &observed, None, &config)?;
    assert!(result.is_converged(), "status {:?}", result.status);
    assert!(result.n_pixels < 96 * 96 / 4, "window kept {} pixels", result.n_pixels);
    assert!((result.params.xoff - 47.2).abs() < 1e-4);
    assert!((result.params.yoff - 50.6).abs() < 1e-4);
    assert!((result.params.zoff - 4.0).abs() < 1e-3);
    Ok(())
}
