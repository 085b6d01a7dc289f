use std::sync::Mutex;

use tempfile::NamedTempFile;

use dataset_harvester::config::HarvestConfig;
use dataset_harvester::predicate::AcceptancePolicy;
use dataset_harvester::ExportFormat;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "HARVEST_CONFIG",
        "HARVEST_TARGET_FPS",
        "HARVEST_COOLDOWN_FRAMES",
        "HARVEST_MAX_ACCEPTED",
        "HARVEST_MIN_DETECTIONS",
        "HARVEST_DATASET_ROOT",
        "HARVEST_DATASET_FORMAT",
        "HARVEST_DATASET_VERSION",
        "HARVEST_SPOOL_PATH",
        "HARVEST_MEDIA_DIR",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "sampling": {
                "target_fps": 5,
                "cooldown_frames": 120,
                "max_accepted": 40
            },
            "detection": {
                "min_detections": 2,
                "confidence_threshold": 0.3,
                "crop_padding": 40,
                "policy": {
                    "kind": "count",
                    "class_id": 2,
                    "target": 3
                }
            },
            "models": [
                {
                    "name": "vehicles",
                    "path": "stub://vehicles",
                    "class_names": ["car", "truck", "bus"]
                }
            ],
            "dataset": {
                "root": "/data/harvest",
                "format": "flat",
                "version": 7,
                "annotated": true
            },
            "queue": {
                "spool_path": "/var/spool/harvest.ndjson",
                "delete_after_harvest": true,
                "idle_wait_secs": 1
            }
        }"#,
    );

    std::env::set_var("HARVEST_CONFIG", file.path());
    std::env::set_var("HARVEST_DATASET_FORMAT", "yolov8");
    std::env::set_var("HARVEST_MAX_ACCEPTED", "10");

    let cfg = HarvestConfig::load().expect("load config");

    assert_eq!(cfg.sampling.target_fps, 5);
    assert_eq!(cfg.sampling.cooldown_frames, 120);
    assert_eq!(cfg.sampling.max_accepted, 10);
    assert_eq!(cfg.detection.min_detections, 2);
    assert_eq!(cfg.detection.crop_padding, 40);
    assert_eq!(
        cfg.detection.policy,
        AcceptancePolicy::Count { class_id: 2, target: 3 }
    );
    assert_eq!(cfg.models.len(), 1);
    assert_eq!(cfg.models[0].name, "vehicles");
    // Omitted allowed_classes defaults to the full vocabulary.
    assert_eq!(cfg.models[0].allowed_classes, vec![0, 1, 2]);
    assert_eq!(cfg.dataset.format, ExportFormat::Yolov8);
    assert_eq!(cfg.dataset.version, 7);
    assert!(cfg.dataset.annotated);
    assert!(cfg.queue.delete_after_harvest);
    assert!(!cfg.queue.upload_after_harvest);
    assert_eq!(cfg.queue.idle_wait_secs, 1);

    clear_env();
}

#[test]
fn defaults_apply_when_sections_are_omitted() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "models": [
                { "name": "m", "path": "stub://m", "class_names": ["person"] }
            ]
        }"#,
    );
    std::env::set_var("HARVEST_CONFIG", file.path());

    let cfg = HarvestConfig::load().expect("load config");
    assert_eq!(cfg.sampling.target_fps, 3);
    assert_eq!(cfg.sampling.cooldown_frames, 50);
    assert_eq!(cfg.detection.min_detections, 1);
    assert_eq!(cfg.detection.crop_padding, 100);
    assert_eq!(cfg.dataset.format, ExportFormat::Yolov8);

    clear_env();
}

#[test]
fn rejects_inconsistent_configuration() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    // Allowed class id outside the model vocabulary.
    let file = write_config(
        r#"{
            "models": [
                {
                    "name": "people",
                    "path": "stub://people",
                    "class_names": ["person"],
                    "allowed_classes": [0, 5]
                }
            ]
        }"#,
    );
    std::env::set_var("HARVEST_CONFIG", file.path());
    assert!(HarvestConfig::load().is_err());

    // No models at all.
    let file = write_config(r#"{ "sampling": { "target_fps": 3 } }"#);
    std::env::set_var("HARVEST_CONFIG", file.path());
    assert!(HarvestConfig::load().is_err());

    // Zero sampling rate.
    let file = write_config(
        r#"{
            "sampling": { "target_fps": 0 },
            "models": [
                { "name": "m", "path": "stub://m", "class_names": ["person"] }
            ]
        }"#,
    );
    std::env::set_var("HARVEST_CONFIG", file.path());
    assert!(HarvestConfig::load().is_err());

    clear_env();
}

#[test]
fn unknown_policy_kind_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "detection": { "policy": { "kind": "mystery" } },
            "models": [
                { "name": "m", "path": "stub://m", "class_names": ["person"] }
            ]
        }"#,
    );
    std::env::set_var("HARVEST_CONFIG", file.path());
    assert!(HarvestConfig::load().is_err());

    clear_env();
}
