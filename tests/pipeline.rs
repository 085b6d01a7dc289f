//! End-to-end pipeline runs over synthetic video with scripted adapters.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

use tempfile::TempDir;

use dataset_harvester::config::{
    DatasetSettings, DetectionSettings, HarvestConfig, QueueSettings, SamplingSettings,
};
use dataset_harvester::crop::parse_labels;
use dataset_harvester::detect::{
    AdapterSettings, Detection, DetectorAdapter, PixelBox, StubAdapter, StubStep,
};
use dataset_harvester::ingest::FileSource;
use dataset_harvester::{AcceptancePolicy, DatasetSink, ExportFormat, HarvestService};

fn config(
    root: &Path,
    policy: AcceptancePolicy,
    min_detections: usize,
    cooldown_frames: u32,
    format: ExportFormat,
    annotated: bool,
) -> HarvestConfig {
    HarvestConfig {
        sampling: SamplingSettings {
            target_fps: 3,
            cooldown_frames,
            max_accepted: 5,
        },
        detection: DetectionSettings {
            min_detections,
            confidence_threshold: 0.25,
            iou_threshold: 0.85,
            crop_padding: 100,
            policy,
        },
        models: Vec::new(),
        dataset: DatasetSettings {
            root: root.to_path_buf(),
            format,
            version: 1,
            annotated,
        },
        queue: QueueSettings {
            spool_path: None,
            media_dir: PathBuf::from("media"),
            delete_after_harvest: false,
            upload_after_harvest: false,
            idle_wait_secs: 1,
        },
    }
}

/// Detection on a 640x480 frame with the given normalized center x.
fn det(class_id: u32, cx: f32) -> Detection {
    let px = cx * 640.0;
    Detection::from_pixel_box(
        class_id,
        0.9,
        PixelBox::new(px - 20.0, 96.0, px + 20.0, 192.0),
        640,
        480,
    )
}

fn settings(allowed: Vec<u32>) -> AdapterSettings {
    AdapterSettings {
        allowed_classes: allowed,
        confidence_threshold: 0.25,
        iou_threshold: 0.85,
    }
}

fn read_only_file(dir: &Path) -> String {
    let mut entries = fs::read_dir(dir).unwrap();
    let entry = entries.next().unwrap().unwrap();
    assert!(entries.next().is_none(), "expected exactly one file");
    fs::read_to_string(entry.path()).unwrap()
}

#[test]
fn two_adapter_harvest_deduplicates_and_exports_once() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(
        tmp.path(),
        AcceptancePolicy::MinFused { min_detections: 2 },
        2,
        50,
        ExportFormat::Yolov8,
        true,
    );

    // Primary sees "person" as class 0; the secondary spells it differently
    // in its vocabulary (local id 1).
    let primary = StubAdapter::new("people-a", vec!["person".to_string()], settings(vec![0]))
        .with_script(vec![
            // Frame 10: both adapters agree on one person, fuses to a single
            // box, below the minimum of two.
            StubStep::Detections(vec![det(0, 0.3)]),
            // Frame 20: two distinct people; the secondary's duplicate of the
            // first one is dropped.
            StubStep::Detections(vec![det(0, 0.3), det(0, 0.6)]),
        ]);
    let secondary = StubAdapter::new(
        "people-b",
        vec!["helmet".to_string(), "person".to_string()],
        settings(vec![0, 1]),
    )
    .with_script(vec![
        StubStep::Detections(vec![det(1, 0.302)]),
        StubStep::Detections(vec![det(1, 0.303)]),
    ]);

    let adapters: Vec<Box<dyn DetectorAdapter>> = vec![Box::new(primary), Box::new(secondary)];
    let mut service = HarvestService::new(adapters, &cfg).unwrap();

    // 31 frames at 30 fps, sampled at 3 fps: inference at frames 10 and 20;
    // the acceptance at 20 starts a 50-frame cooldown that outlasts the video.
    let mut source = FileSource::open("stub://31x30").unwrap();
    let mut sink = DatasetSink::new(cfg.sink_config());
    sink.initialize().unwrap();

    let stop = AtomicBool::new(false);
    let summary = service
        .process_video(&mut source, &mut sink, &stop)
        .unwrap();
    sink.write_manifest(&service.canonical_names()).unwrap();

    assert_eq!(summary.frames_seen, 31);
    assert_eq!(summary.frames_inferred, 2);
    assert_eq!(summary.accepted, 1);

    // One cropped image, one label file, annotated copy alongside.
    let result_dir = tmp.path().join("yolov8-v1");
    let labels = read_only_file(&result_dir.join("labels"));
    let parsed = parse_labels(&labels).unwrap();
    assert_eq!(parsed.len(), 2);
    // Everything fused into the canonical class space of the primary adapter.
    assert!(parsed.iter().all(|(class_id, _)| *class_id == 0));
    for (_, b) in &parsed {
        assert!(b.cx >= 0.0 && b.cx <= 1.0);
        assert!(b.cy >= 0.0 && b.cy <= 1.0);
    }
    assert_eq!(fs::read_dir(result_dir.join("images")).unwrap().count(), 1);
    assert_eq!(
        fs::read_dir(tmp.path().join("yolov8-v1-labeled")).unwrap().count(),
        1
    );

    let manifest = fs::read_to_string(result_dir.join("data.yaml")).unwrap();
    assert!(manifest.contains("- person"));
    assert!(manifest.contains("nc: 1"));
}

#[test]
fn count_policy_exports_only_the_exact_match() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(
        tmp.path(),
        AcceptancePolicy::Count { class_id: 0, target: 3 },
        1,
        10,
        ExportFormat::Flat,
        false,
    );

    let cars = StubAdapter::new(
        "traffic",
        vec!["car".to_string(), "truck".to_string()],
        settings(vec![0, 1]),
    )
    .with_script(vec![
        StubStep::Detections(vec![det(0, 0.2), det(0, 0.5)]),
        StubStep::Detections(vec![det(0, 0.2), det(0, 0.4), det(0, 0.6), det(0, 0.8)]),
        StubStep::Detections(vec![det(0, 0.2), det(0, 0.5), det(0, 0.8)]),
    ]);

    let adapters: Vec<Box<dyn DetectorAdapter>> = vec![Box::new(cars)];
    let mut service = HarvestService::new(adapters, &cfg).unwrap();

    // 61 frames at 30 fps: inference at 10 (two cars), 20 (four cars) and 30
    // (exactly three, accepted). The 10-frame cooldown skips 31..=40, then
    // frames 50 and 60 hit an exhausted script and are rejected as empty.
    let mut source = FileSource::open("stub://61x30").unwrap();
    let mut sink = DatasetSink::new(cfg.sink_config());
    sink.initialize().unwrap();

    let stop = AtomicBool::new(false);
    let summary = service
        .process_video(&mut source, &mut sink, &stop)
        .unwrap();

    assert_eq!(summary.frames_seen, 61);
    assert_eq!(summary.frames_inferred, 5);
    assert_eq!(summary.accepted, 1);

    let result_dir = tmp.path().join("flat-v1");
    let entries: Vec<PathBuf> = fs::read_dir(&result_dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(entries.len(), 2);

    let label_path = entries
        .iter()
        .find(|p| p.extension().is_some_and(|e| e == "txt"))
        .unwrap();
    let parsed = parse_labels(&fs::read_to_string(label_path).unwrap()).unwrap();
    assert_eq!(parsed.len(), 3);
}

#[test]
fn failing_adapter_rejects_the_frame_without_aborting_the_video() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(
        tmp.path(),
        AcceptancePolicy::MinFused { min_detections: 1 },
        1,
        0,
        ExportFormat::Flat,
        false,
    );

    let flaky = StubAdapter::new("flaky", vec!["person".to_string()], settings(vec![0]))
        .with_script(vec![
            StubStep::Fail("inference backend hiccup".to_string()),
            StubStep::Detections(vec![det(0, 0.5)]),
        ]);

    let adapters: Vec<Box<dyn DetectorAdapter>> = vec![Box::new(flaky)];
    let mut service = HarvestService::new(adapters, &cfg).unwrap();

    // Inference at frames 10 and 20; the first call fails and is skipped,
    // the second succeeds and exports.
    let mut source = FileSource::open("stub://21x30").unwrap();
    let mut sink = DatasetSink::new(cfg.sink_config());
    sink.initialize().unwrap();

    let stop = AtomicBool::new(false);
    let summary = service
        .process_video(&mut source, &mut sink, &stop)
        .unwrap();

    assert_eq!(summary.frames_inferred, 2);
    assert_eq!(summary.accepted, 1);
}

#[test]
fn shutdown_flag_stops_between_frames() {
    let tmp = TempDir::new().unwrap();
    let cfg = config(
        tmp.path(),
        AcceptancePolicy::MinFused { min_detections: 1 },
        1,
        0,
        ExportFormat::Flat,
        false,
    );

    let adapters: Vec<Box<dyn DetectorAdapter>> = vec![Box::new(StubAdapter::new(
        "idle",
        vec!["person".to_string()],
        settings(vec![0]),
    ))];
    let mut service = HarvestService::new(adapters, &cfg).unwrap();

    let mut source = FileSource::open("stub://1000x30").unwrap();
    let mut sink = DatasetSink::new(cfg.sink_config());
    sink.initialize().unwrap();

    let stop = AtomicBool::new(true);
    let summary = service
        .process_video(&mut source, &mut sink, &stop)
        .unwrap();
    assert_eq!(summary.frames_seen, 0);
    assert_eq!(summary.accepted, 0);
}
