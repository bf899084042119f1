mod common;
use crate::common::*;

use std::error::Error;
use std::fs;
use std::time::Duration;

use rundag::config::{load_and_validate, load_or_default, ReconcilerConfig};
use rundag::errors::RundagError;
use rundag::load_state;
use rundag::store::Objects;
use tempfile::tempdir;

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn toml_config_overrides_defaults() -> TestResult {
    init_tracing();
    let dir = tempdir()?;
    let path = dir.path().join("Rundag.toml");
    fs::write(
        &path,
        r#"
[defaults]
timeout = "1h30m"
service_account = "builder"

[artifacts]
base_path = "/workspace/artifacts"
storage_class = "standard"

[controller]
workers = 4
backoff_base = "50ms"
"#,
    )?;

    let cfg = load_and_validate(&path)?;

    assert_eq!(cfg.defaults.timeout, Duration::from_secs(90 * 60));
    assert_eq!(cfg.defaults.service_account.as_deref(), Some("builder"));
    assert_eq!(cfg.defaults.condition_image, "busybox");
    assert_eq!(cfg.artifacts.base_path, "/workspace/artifacts");
    assert_eq!(cfg.artifacts.storage_size, "5Gi");
    assert_eq!(cfg.artifacts.storage_class.as_deref(), Some("standard"));
    assert_eq!(cfg.controller.workers, 4);
    assert_eq!(cfg.controller.backoff_base, Duration::from_millis(50));
    assert_eq!(cfg.controller.backoff_max, Duration::from_secs(30));
    Ok(())
}

#[test]
fn missing_file_yields_defaults() -> TestResult {
    let dir = tempdir()?;
    let cfg = load_or_default(dir.path().join("absent.toml"))?;
    assert_eq!(cfg, ReconcilerConfig::default());
    Ok(())
}

#[test]
fn empty_file_yields_defaults() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("Rundag.toml");
    fs::write(&path, "")?;
    assert_eq!(load_and_validate(&path)?, ReconcilerConfig::default());
    Ok(())
}

#[test]
fn invalid_values_are_rejected() -> TestResult {
    let dir = tempdir()?;
    let cases = [
        ("[controller]\nworkers = 0\n", "workers"),
        ("[defaults]\ntimeout = \"ten minutes\"\n", "defaults.timeout"),
        ("[artifacts]\nbase_path = \"relative/path\"\n", "base_path"),
        (
            "[controller]\nbackoff_base = \"1m\"\nbackoff_max = \"1s\"\n",
            "backoff_base",
        ),
        ("[controller]\nresync_interval = \"0\"\n", "resync_interval"),
    ];

    for (i, (contents, needle)) in cases.into_iter().enumerate() {
        let path = dir.path().join(format!("bad-{i}.toml"));
        fs::write(&path, contents)?;
        match load_and_validate(&path) {
            Err(RundagError::ConfigError(msg)) => {
                assert!(msg.contains(needle), "case {i}: '{msg}' should mention {needle}")
            }
            other => panic!("case {i}: expected a config error, got {other:?}"),
        }
    }
    Ok(())
}

#[test]
fn malformed_toml_is_a_parse_error() -> TestResult {
    let dir = tempdir()?;
    let path = dir.path().join("Rundag.toml");
    fs::write(&path, "[controller\nworkers = 2")?;
    assert!(matches!(load_and_validate(&path), Err(RundagError::TomlError(_))));
    Ok(())
}

#[test]
fn state_file_loads_from_json_and_toml() -> TestResult {
    let dir = tempdir()?;
    let objects = two_step_objects();

    let json = dir.path().join("state.json");
    fs::write(&json, serde_json::to_string_pretty(&objects)?)?;
    let loaded = load_state(&json)?;
    assert_eq!(loaded, objects);

    let toml_path = dir.path().join("state.toml");
    fs::write(
        &toml_path,
        r#"
[[pipelines]]
metadata = { name = "pipe", namespace = "foo" }
spec = { tasks = [ { name = "a", task = { named = { name = "hello" } } } ] }

[[pipelineRuns]]
metadata = { name = "run", namespace = "foo" }
spec = { pipeline = { ref = { name = "pipe" } } }
"#,
    )?;
    let loaded: Objects = load_state(&toml_path)?;
    assert_eq!(loaded.pipelines.len(), 1);
    assert_eq!(loaded.pipelines[0].spec.tasks[0].name, "a");
    assert_eq!(loaded.pipeline_runs[0].metadata.key(), "foo/run");
    Ok(())
}

#[test]
fn unreadable_state_file_is_an_io_error() {
    let dir = tempdir().unwrap();
    let err = load_state(dir.path().join("nope.json")).unwrap_err();
    assert!(matches!(err, RundagError::IoError(_)));
}
