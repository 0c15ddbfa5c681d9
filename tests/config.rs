use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::{Builder, NamedTempFile};

use live_detect::config::DemoConfig;
use live_detect::ingest::SourceSpec;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "LIVE_DETECT_CONFIG",
        "LIVE_DETECT_SOURCE",
        "LIVE_DETECT_MODEL",
        "LIVE_DETECT_MODELS_DIR",
        "LIVE_DETECT_CONF",
        "LIVE_DETECT_IOU",
        "LIVE_DETECT_OUT_DIR",
        "LIVE_DETECT_MAX_FRAMES",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = DemoConfig::load().expect("load defaults");
    cfg.validate().expect("defaults are valid");
    assert_eq!(cfg.source, SourceSpec::Camera(0));
    assert_eq!(cfg.model, "YOLOv8n");
    assert_eq!(cfg.confidence, 0.25);
    assert_eq!(cfg.overlap, 0.45);
    assert_eq!(cfg.out_dir, PathBuf::from("live_detect_out"));
    assert_eq!(cfg.max_frames, None);
}

#[test]
fn loads_json_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "source": "clips/street.mp4",
        "model": { "id": "YOLOv8s", "dir": "/opt/models" },
        "thresholds": { "confidence": 0.4, "overlap": 0.5 },
        "output": { "dir": "panels", "max_frames": 120 }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("LIVE_DETECT_CONFIG", file.path());
    std::env::set_var("LIVE_DETECT_MODEL", "stub");
    std::env::set_var("LIVE_DETECT_IOU", "0.3");

    let cfg = DemoConfig::load().expect("load config");

    assert_eq!(cfg.source, SourceSpec::File("clips/street.mp4".to_string()));
    assert_eq!(cfg.model, "stub");
    assert_eq!(cfg.models_dir, PathBuf::from("/opt/models"));
    assert_eq!(cfg.confidence, 0.4);
    assert_eq!(cfg.overlap, 0.3);
    assert_eq!(cfg.out_dir, PathBuf::from("panels"));
    assert_eq!(cfg.max_frames, Some(120));
    let thresholds = cfg.thresholds().unwrap();
    assert_eq!((thresholds.confidence(), thresholds.overlap()), (0.4, 0.3));

    clear_env();
}

#[test]
fn loads_toml_file_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
source = "2"

[model]
id = "YOLOv8m-Pose"

[thresholds]
confidence = 0.6
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("LIVE_DETECT_CONFIG", file.path());
    std::env::set_var("LIVE_DETECT_SOURCE", "webcam");

    let cfg = DemoConfig::load().expect("load config");
    assert_eq!(cfg.source, SourceSpec::Camera(0));
    assert_eq!(cfg.model, "YOLOv8m-Pose");
    assert_eq!(cfg.confidence, 0.6);
    assert_eq!(cfg.overlap, 0.45);

    clear_env();
}

#[test]
fn rejects_out_of_range_thresholds_from_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("LIVE_DETECT_CONF", "1.5");
    let cfg = DemoConfig::load().expect("range is checked by validate");
    assert!(cfg.validate().is_err());

    std::env::set_var("LIVE_DETECT_CONF", "high");
    assert!(DemoConfig::load().is_err());

    clear_env();
}

#[test]
fn bad_env_threshold_can_be_overridden_before_validation() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("LIVE_DETECT_CONF", "2");
    let mut cfg = DemoConfig::load().expect("load config");
    assert_eq!(cfg.confidence, 2.0);

    // what --conf 0.5 does in the binary
    cfg.confidence = 0.5;
    cfg.validate().expect("overridden config is valid");
    assert_eq!(cfg.thresholds().unwrap().confidence(), 0.5);

    clear_env();
}

#[test]
fn rejects_unknown_model_and_zero_frame_cap() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("LIVE_DETECT_MODEL", "yolov9z");
    let err = DemoConfig::load().unwrap().validate().unwrap_err();
    assert!(err.to_string().contains("unknown model"));

    std::env::set_var("LIVE_DETECT_MODEL", "stub");
    std::env::set_var("LIVE_DETECT_MAX_FRAMES", "0");
    assert!(DemoConfig::load().unwrap().validate().is_err());

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("LIVE_DETECT_CONFIG", "/nonexistent/live_detect.json");
    let err = DemoConfig::load().unwrap_err();
    assert!(err.to_string().contains("failed to read config file"));

    clear_env();
}
