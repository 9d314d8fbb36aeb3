// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::assignment::BuildUrls;
use dv_core::FakeClock;
use std::path::Path;
use std::time::Duration;

fn settings() -> CoordinatorSettings {
    CoordinatorSettings {
        urls: BuildUrls { console_base: String::new(), artifact_base: String::new() },
        lost_contact_after: Duration::from_secs(60),
        auto_register: true,
    }
}

fn config(dir: &Path) -> Config {
    Config::in_dir(dir.to_path_buf(), "127.0.0.1:0".to_string())
}

const ONE_PIPELINE: &str = r#"
[[pipelines]]
name = "up42"

[[pipelines.stages]]
name = "dev"

[[pipelines.stages.jobs]]
name = "unit"
"#;

#[tokio::test]
async fn startup_writes_pid_and_binds() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());

    let started = startup(&config, FakeClock::new(), settings()).await.unwrap();

    let pid = std::fs::read_to_string(&config.lock_path).unwrap();
    assert_eq!(pid.trim(), std::process::id().to_string());
    assert_ne!(started.listener.local_addr().unwrap().port(), 0);
}

#[tokio::test]
async fn second_server_cannot_take_the_lock() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let _first = startup(&config, FakeClock::new(), settings()).await.unwrap();

    let second = startup(&config, FakeClock::new(), settings()).await;

    assert!(matches!(second, Err(LifecycleError::LockFailed(_))));
    let pid = std::fs::read_to_string(&config.lock_path).unwrap();
    assert_eq!(pid.trim(), std::process::id().to_string());
}

#[tokio::test]
async fn missing_configuration_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    let started = startup(&config(dir.path()), FakeClock::new(), settings()).await.unwrap();

    assert!(started.server.coordinator.latest_pipeline("up42").is_none());
    assert!(started.server.coordinator.agents().is_empty());
}

#[tokio::test]
async fn invalid_configuration_fails_startup() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    std::fs::write(&config.config_path, "pipelines = 7").unwrap();

    let result = startup(&config, FakeClock::new(), settings()).await;
    assert!(matches!(result, Err(LifecycleError::Config(ConfigError::Parse { .. }))));
}

#[tokio::test]
async fn reload_picks_up_new_pipelines_and_reports_bad_files() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let started = startup(&config, FakeClock::new(), settings()).await.unwrap();
    let server = started.server;

    std::fs::write(&config.config_path, ONE_PIPELINE).unwrap();
    server.reload_config().unwrap();
    assert!(server.coordinator.trigger("up42", dv_core::BuildCause::manual("admin")).is_ok());

    std::fs::write(&config.config_path, "[[pipelines]]\nstages = 3").unwrap();
    assert!(server.reload_config().is_err());
    assert_eq!(server.coordinator.health().len(), 1);
    assert_eq!(server.coordinator.config_version(), crate::config::config_version(ONE_PIPELINE));
}

#[tokio::test]
async fn shutdown_removes_pid_file() {
    let dir = tempfile::tempdir().unwrap();
    let config = config(dir.path());
    let started = startup(&config, FakeClock::new(), settings()).await.unwrap();

    started.server.shutdown();
    assert!(!config.lock_path.exists());
}
