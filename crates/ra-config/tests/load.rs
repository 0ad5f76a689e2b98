use std::fs;

use ra_automation::AutomationConfig;
use ra_config::{load_config, ConfigError};
use tempfile::TempDir;

const ROOMS: &str = r#"
service_account_id: automation-user
storage_dir: state
dry_run: true

devices:
  lights:
    desk:
    ceiling:
      name: Ceiling
  covers:
    office:
  binary_sensors:
    office_motion:
  sun:
    above_horizon: false

rooms:
  - name: office
    secondary_light:
      lights: [light.desk]
      motion_sensors: [binary_sensor.office_motion]
      schedule: { start: "18:00", stop: "06:00" }
    main_light:
      lights: [light.ceiling]
      motion_sensors: [binary_sensor.office_motion]
      wait_for_off_seconds: 900
    blinds:
      blinds: [cover.office]
      open_at: "07:30"
      close_at: "21:00"
"#;

#[test]
fn test_load_full_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rooms.yaml");
    fs::write(&path, ROOMS).unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(config.service_account_id, "automation-user");
    assert_eq!(config.storage_dir, dir.path().join("state"));
    assert!(config.dry_run);
    assert_eq!(config.devices.lights.len(), 2);
    assert!(!config.devices.sun.above_horizon);

    let automations = config.rooms[0].automations().unwrap();
    assert_eq!(automations.len(), 3);
    assert!(matches!(automations[0], AutomationConfig::SecondaryLight(_)));
    match &automations[1] {
        AutomationConfig::MainLight(main) => {
            assert_eq!(main.wait_for_off.as_secs(), 900);
        }
        other => panic!("unexpected automation {:?}", other),
    }
    assert!(matches!(automations[2], AutomationConfig::Blinds(_)));
}

#[test]
fn test_missing_file() {
    let dir = TempDir::new().unwrap();
    let result = load_config(dir.path().join("nope.yaml"));
    assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
}

#[test]
fn test_absolute_storage_dir_is_kept() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rooms.yaml");
    fs::write(
        &path,
        "service_account_id: svc\nstorage_dir: /var/lib/room-automation\n",
    )
    .unwrap();

    let config = load_config(&path).unwrap();
    assert_eq!(
        config.storage_dir,
        std::path::PathBuf::from("/var/lib/room-automation")
    );
}

#[test]
fn test_file_without_service_account_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rooms.yaml");
    fs::write(&path, ROOMS.replace("service_account_id: automation-user\n", "")).unwrap();

    let result = load_config(&path);
    assert!(matches!(result, Err(ConfigError::MissingField { .. })));
}
