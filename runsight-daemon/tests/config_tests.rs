//! Configuration layering tests: file, then environment, then CLI flags.

use std::io::Write;

use clap::Parser;
use serial_test::serial;

use runsight_daemon::cli::DaemonCli;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("should create temp file");
    file.write_all(contents.as_bytes()).expect("should write config");
    file
}

fn clear_env() {
    // SAFETY: tests touching the environment are serialized with #[serial].
    unsafe {
        std::env::remove_var("LISTEN_ADDR");
        std::env::remove_var("BPF_OBJECT");
        std::env::remove_var("POD_NAMESPACE");
        std::env::remove_var("RUNSIGHT_GENERAL_LOG_LEVEL");
    }
}

#[tokio::test]
#[serial]
async fn test_defaults_without_file() {
    clear_env();
    let cli = DaemonCli::try_parse_from(["runsight-daemon"]).unwrap();
    let config = cli.load_config().await.expect("defaults should validate");

    assert_eq!(config.stream.listen_addr, ":8090");
    assert_eq!(config.ebpf.object_path, "../ebpf/process_monitor.bpf.o");
    assert_eq!(config.general.log_format, "json");
}

#[tokio::test]
#[serial]
async fn test_env_overrides_file_and_flags_override_env() {
    clear_env();
    let file = write_config(
        r#"
[general]
log_level = "debug"

[stream]
listen_addr = "127.0.0.1:7000"

[pod]
namespace = "from-file"
"#,
    );

    // SAFETY: serialized with #[serial].
    unsafe {
        std::env::set_var("LISTEN_ADDR", "127.0.0.1:7100");
        std::env::set_var("POD_NAMESPACE", "from-env");
    }

    let path = file.path().to_str().unwrap().to_owned();
    let cli = DaemonCli::try_parse_from([
        "runsight-daemon",
        "--config",
        path.as_str(),
        "--listen-addr",
        ":7200",
    ])
    .unwrap();
    let config = cli.load_config().await;
    clear_env();
    let config = config.expect("layered config should validate");

    assert_eq!(config.general.log_level, "debug");
    assert_eq!(config.pod.namespace, "from-env");
    assert_eq!(config.stream.listen_addr, ":7200");
}

#[tokio::test]
#[serial]
async fn test_empty_env_counts_as_unset() {
    clear_env();
    // SAFETY: serialized with #[serial].
    unsafe { std::env::set_var("BPF_OBJECT", "") };

    let config = DaemonCli::default().load_config().await;
    clear_env();

    assert_eq!(
        config.unwrap().ebpf.object_path,
        "../ebpf/process_monitor.bpf.o"
    );
}

#[tokio::test]
#[serial]
async fn test_invalid_flag_value_fails_validation() {
    clear_env();
    let cli = DaemonCli {
        log_format: Some("xml".to_owned()),
        ..Default::default()
    };
    let err = cli.load_config().await.unwrap_err();
    assert!(format!("{err:#}").contains("log_format"));
}

#[tokio::test]
#[serial]
async fn test_missing_file_reported() {
    clear_env();
    let cli = DaemonCli {
        config: Some("/nonexistent/runsight.toml".into()),
        ..Default::default()
    };
    let err = cli.load_config().await.unwrap_err();
    assert!(format!("{err:#}").contains("/nonexistent/runsight.toml"));
}
