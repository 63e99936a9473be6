// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for configuration module

use camera_preview::Config;
use camera_preview::backends::camera::{AspectPolicy, CameraPosition};
use camera_preview::constants::render;
use std::path::PathBuf;

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("camera-preview-test-{}", uuid::Uuid::new_v4()))
        .join(name)
}

#[test]
fn test_config_default() {
    let config = Config::default();

    // Check sensible defaults
    assert!(
        config.mirror_front,
        "Front camera should be mirrored by default"
    );
    assert_eq!(config.default_position, CameraPosition::Back);
    assert_eq!(config.refresh_hz, render::DEFAULT_REFRESH_HZ);
}

#[test]
fn test_config_save_and_load() {
    let path = temp_path("config.json");
    let config = Config {
        default_position: CameraPosition::Front,
        target_size: 720,
        aspect: AspectPolicy::Ratio16x9,
        ..Config::default()
    };
    config.save_to(&path).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded, config);
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_missing_file_uses_defaults() {
    let loaded = Config::load_from(&temp_path("missing.json")).unwrap();
    assert_eq!(loaded, Config::default());
}

#[test]
fn test_loaded_values_are_sanitized() {
    let path = temp_path("config.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, r#"{ "refresh_hz": 100000, "jpeg_quality": 0 }"#).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded.refresh_hz, render::MAX_REFRESH_HZ);
    assert_eq!(loaded.jpeg_quality, 1);
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}

#[test]
fn test_invalid_file_is_an_error() {
    let path = temp_path("config.json");
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, "not json").unwrap();

    assert!(Config::load_from(&path).is_err());
    let _ = std::fs::remove_dir_all(path.parent().unwrap());
}
