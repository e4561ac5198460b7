//! Full runs against the simulated focus rig

use autofocus::{
    FocusController, FocusRunReport, ModelKind, ReportError, ScanConfig, SimFrameMeasurement,
};
use hardware::sim::{sim_rig, SimOptics, SimRigOptions};

fn run_sim(optics: SimOptics, options: SimRigOptions, config: &ScanConfig) -> FocusRunReport {
    let (mut focuser, mut camera) = sim_rig(optics, options);
    let report = FocusController::new(config, &mut focuser, &mut camera, &SimFrameMeasurement)
        .run()
        .unwrap();
    assert_eq!(focuser.baseline().unwrap(), report.committed_position);
    report
}

fn scan_config() -> ScanConfig {
    ScanConfig {
        exposure_time_s: 1.0,
        step_size: 20,
        attempt_count: 9,
        ..Default::default()
    }
}

#[test]
fn test_converges_near_best_focus() {
    let optics = SimOptics {
        best_focus: 60,
        ..Default::default()
    };
    let report = run_sim(optics, SimRigOptions::default(), &scan_config());

    assert!(!report.fallback_used());
    assert!(
        (report.committed_position - 60).abs() <= 20,
        "committed {}",
        report.committed_position
    );
}

#[test]
fn test_noisy_quartic_run() {
    let optics = SimOptics {
        best_focus: -25,
        fwhm_noise: 0.02,
        ..Default::default()
    };
    let options = SimRigOptions {
        seed: 7,
        backlash: 3,
        ..Default::default()
    };
    let config = ScanConfig {
        attempt_count: 15,
        default_model: ModelKind::Quartic,
        ..scan_config()
    };
    let report = run_sim(optics, options, &config);

    assert_eq!(report.default_model, ModelKind::Quartic);
    assert!(
        (report.committed_position + 25).abs() <= 20,
        "committed {}",
        report.committed_position
    );
}

#[test]
fn test_far_focus_recovers_through_fallback() {
    // Best focus well outside the first scan
    let optics = SimOptics {
        best_focus: 900,
        defocus_rate: 0.01,
        max_stars: 200,
        ..Default::default()
    };
    let config = ScanConfig {
        target_fwhm: 3.0,
        ..scan_config()
    };
    let report = run_sim(optics, SimRigOptions::default(), &config);

    assert!(report.passes[0].fallback);
    assert_eq!(report.passes.len(), 2);
    // The linear estimate undershoots the hyperbola but moves most of the way
    let first_target = report.passes[1].baseline.unwrap();
    assert!((500..900).contains(&first_target), "moved to {first_target}");
    assert!(report.committed_position > first_target);
}

#[test]
fn test_report_json() {
    let report = run_sim(SimOptics::default(), SimRigOptions::default(), &scan_config());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("report.json");
    report.save_to_file(&path).unwrap();

    let json: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(json["focuser_id"], "F0");
    assert_eq!(json["starting_position"], 0);
    assert_eq!(json["default_model"], "quadratic");
    assert_eq!(json["passes"][0]["fit"]["model"]["kind"], "quadratic");
    assert_eq!(
        json["passes"][0]["samples"]["samples"].as_array().unwrap().len(),
        9
    );
}

#[test]
fn test_report_write_failure_names_the_report() {
    let report = run_sim(SimOptics::default(), SimRigOptions::default(), &scan_config());

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("missing").join("report.json");
    let err = report.save_to_file(&path).unwrap_err();

    assert!(matches!(err, ReportError::Io(_)));
    assert!(err.to_string().starts_with("Failed to write report"));
}
