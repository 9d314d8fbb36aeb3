// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dv_core::{ApprovalType, JobRunType, TaskConfig};

const SAMPLE: &str = r#"
[[agents]]
uuid = "a1"
hostname = "builder-1"
resources = ["linux", "docker"]

[[pipelines]]
name = "up42"
label_template = "1.0.${COUNT}"

[[pipelines.environment_variables]]
name = "FOO"
value = "bar"

[[pipelines.stages]]
name = "dev"

[[pipelines.stages.jobs]]
name = "unit"
resources = ["linux"]
run_instance_count = 2

[[pipelines.stages.jobs.tasks]]
type = "exec"
command = "make"
args = ["test"]

[[pipelines.stages.jobs.tasks]]
type = "echo"
text = "done"

[[pipelines.stages]]
name = "prod"
approval = "manual"

[[pipelines.stages.jobs]]
name = "deploy"
"#;

#[test]
fn parses_pipelines_stages_and_jobs() {
    let loaded = LoadedConfig::parse(SAMPLE, Path::new("drover.toml")).unwrap();
    let pipeline = loaded.config.pipeline("up42").unwrap();

    assert_eq!(pipeline.label_template, "1.0.${COUNT}");
    assert_eq!(pipeline.environment_variables.get("FOO"), Some("bar"));
    assert_eq!(pipeline.stages.len(), 2);
    assert_eq!(pipeline.stage("prod").unwrap().approval, ApprovalType::Manual);

    let unit = pipeline.stage("dev").unwrap().job("unit").unwrap();
    assert_eq!(unit.run_type(), JobRunType::RunMultipleInstance(2));
    assert_eq!(
        unit.tasks[0],
        TaskConfig::Exec { command: "make".into(), args: vec!["test".into()], working_dir: None }
    );
    assert_eq!(unit.tasks[1], TaskConfig::Echo { text: "done".into() });
}

#[test]
fn parses_agents() {
    let loaded = LoadedConfig::parse(SAMPLE, Path::new("drover.toml")).unwrap();
    let agent = loaded.config.agent("a1").unwrap();
    assert_eq!(agent.hostname, "builder-1");
    assert!(agent.resources.contains("DOCKER"));
    assert!(!agent.disabled);
}

#[test]
fn version_is_the_sha256_of_the_text() {
    let loaded = LoadedConfig::parse("", Path::new("empty.toml")).unwrap();
    assert_eq!(loaded.version, "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855");
    assert_ne!(config_version(SAMPLE), config_version(&format!("{}\n", SAMPLE)));
}

#[test]
fn invalid_toml_names_the_file() {
    let err = LoadedConfig::parse("[[pipelines]]\nstages = 3", Path::new("bad.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Parse { .. }));
    assert!(err.to_string().contains("bad.toml"));
}

#[test]
fn load_reads_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("drover.toml");
    std::fs::write(&path, SAMPLE).unwrap();

    let loaded = LoadedConfig::load(&path).unwrap();
    assert_eq!(loaded.version, config_version(SAMPLE));

    let missing = LoadedConfig::load(&dir.path().join("missing.toml")).unwrap_err();
    assert!(matches!(missing, ConfigError::Io { .. }));
}
