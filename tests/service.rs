use std::fs;
use std::path::Path;

use approx::assert_abs_diff_eq;
use beacon_locator::api::{CalibrationSample, EstimateOutcome};
use beacon_locator::utils::SystemConfig;
use beacon_locator::{rssi_from_distance, EstimationError, PositioningService, ReceiverLocation};
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::tempdir;

const FLOOR_PLAN: &str = r#"
[building]
walls = [[0, 0], [20, 0], [20, 10], [0, 10]]

[[building.room]]
name = "office"
walls = [[0, 0], [10, 0], [10, 10], [0, 10]]

[[building.room]]
name = "lab"
walls = [[10, 0], [20, 0], [20, 10], [10, 10]]

[[building.receiver]]
device_id = "rx-sw"
position = { x = 0.0, y = 0.0 }

[[building.receiver]]
device_id = "rx-se"
position = { x = 20.0, y = 0.0 }
"#;

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
}

fn write_config(dir: &Path) -> SystemConfig {
    fs::write(dir.join("floor.toml"), FLOOR_PLAN).unwrap();
    let text = format!(
        r#"
        [path_loss]
        tx_power_dbm = -45.0
        path_loss_exponent = 2.5

        [paths]
        floor_plan = "{floor}"
        receivers = "{receivers}"
        calibration_log = "{calibration}"
        "#,
        floor = dir.join("floor.toml").display(),
        receivers = dir.join("receivers.json").display(),
        calibration = dir.join("calibration.jsonl").display(),
    );
    fs::write(dir.join("config.toml"), text).unwrap();
    SystemConfig::load(dir.join("config.toml")).unwrap()
}

fn scan(receiver: &str, address: &str, rssi: i32, name: &str, time: DateTime<Utc>) -> String {
    serde_json::json!({
        "device_id": receiver,
        "address": address,
        "rssi": rssi,
        "manufacture_id": 76,
        "name": name,
        "time": time.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string(),
    })
    .to_string()
}

/// Noiseless RSSI for a beacon at `(x, y)` heard by a receiver at `(rx, ry)`
fn synthetic_rssi(x: f64, y: f64, rx: f64, ry: f64) -> i32 {
    let distance = ((x - rx).powi(2) + (y - ry).powi(2)).sqrt();
    rssi_from_distance(distance, -45.0, 2.5).round() as i32
}

#[test]
fn test_end_to_end_positioning() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());
    let service = PositioningService::from_config(config).unwrap();

    // Floor-plan receivers seed the registry and are persisted
    assert_eq!(service.registry().len(), 2);
    assert!(dir.path().join("receivers.json").exists());

    let total = service
        .register_receivers(r#"{"devices": [{"device_id": "rx-n", "position": {"x": 10, "y": 10, "z": 2.4}}]}"#)
        .unwrap();
    assert_eq!(total, 3);

    let truth = (6.0, 4.0);
    let receivers = [("rx-sw", 0.0, 0.0), ("rx-se", 20.0, 0.0), ("rx-n", 10.0, 10.0)];
    for (id, rx, ry) in receivers {
        let rssi = synthetic_rssi(truth.0, truth.1, rx, ry);
        service
            .handle_scan(&scan(id, "tag-1", rssi, "asset", now() - Duration::seconds(2)), now())
            .unwrap();
    }
    // Second beacon heard by two receivers only
    service.handle_scan(&scan("rx-sw", "tag-2", -70, "asset", now()), now()).unwrap();
    service.handle_scan(&scan("rx-se", "tag-2", -72, "asset", now()), now()).unwrap();

    let report = service.estimate_positions(now());
    assert_eq!(report.located, 1);
    assert_eq!(report.unavailable, 1);

    let position = report.positions["tag-1"].position().unwrap();
    assert_abs_diff_eq!(position.x, truth.0, epsilon = 0.5);
    assert_abs_diff_eq!(position.y, truth.1, epsilon = 0.5);
    assert!(matches!(
        report.positions["tag-2"],
        EstimateOutcome::Unavailable(EstimationError::InsufficientCoverage { usable: 2, required: 3, .. })
    ));

    let view = service.positions_view(now());
    assert_eq!(view.receivers["rx-n"], ReceiverLocation { x: 10.0, y: 10.0, z: Some(2.4) });
    assert_eq!(view.senders.len(), 1);

    let groups = service.rssi_groups(now());
    assert_eq!(groups["tag-1"].len(), 3);
    assert_eq!(service.valid_device_count(now()), 2);
}

#[test]
fn test_registry_survives_restart() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());

    let first = PositioningService::from_config(config.clone()).unwrap();
    first
        .register_receivers(r#"[{"device_id": "rx-sw", "position": {"x": 1, "y": 1}}]"#)
        .unwrap();
    drop(first);

    // The persisted position wins over the floor-plan declaration
    let second = PositioningService::from_config(config).unwrap();
    assert_eq!(second.registry().get("rx-sw"), Some(ReceiverLocation::planar(1.0, 1.0)));
    assert_eq!(second.registry().len(), 2);
}

#[test]
fn test_calibration_samples_logged() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path());
    let service = PositioningService::from_config(config).unwrap();

    let point = service.resample_calibration_point(&mut StdRng::seed_from_u64(9)).unwrap();
    assert!(point.place == "office" || point.place == "lab");

    service
        .handle_scan(&scan("rx-sw", "cal", -61, "ble_calibration", now()), now())
        .unwrap();
    service.handle_scan(&scan("rx-se", "tag", -61, "asset", now()), now()).unwrap();

    let log = fs::read_to_string(dir.path().join("calibration.jsonl")).unwrap();
    let samples: Vec<CalibrationSample> = log.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
    assert_eq!(samples.len(), 1);
    assert_eq!(samples[0].device_id, "rx-sw");
    assert_eq!(samples[0].rssi, -61);
    assert_eq!(samples[0].place, point.place);
    assert_eq!(samples[0].position, point.position);
}

#[test]
fn test_stale_beacons_drop_out() {
    let dir = tempdir().unwrap();
    let service = PositioningService::from_config(write_config(dir.path())).unwrap();

    let early = now() - Duration::minutes(40);
    service.handle_scan(&scan("rx-sw", "gone", -60, "asset", early), early).unwrap();
    assert_eq!(service.scanned_devices().len(), 1);

    let accepted = service.handle_scan(&scan("rx-sw", "here", -60, "asset", now()), now()).unwrap();
    assert_eq!(accepted.evicted, 1);
    let addresses: Vec<String> = service.scanned_devices().into_iter().map(|e| e.address).collect();
    assert_eq!(addresses, vec!["here"]);
}

#[test]
fn test_shipped_configuration_loads() {
    let config = SystemConfig::load("config/beacon-locator.toml").unwrap();
    assert_eq!(config, SystemConfig { paths: config.paths.clone(), ..SystemConfig::default() });

    let plan = beacon_locator::FloorPlan::load("config/cafeteria.toml").unwrap();
    assert_eq!(plan.building.rooms().len(), 3);
    assert_eq!(plan.receivers.len(), 3);
}
