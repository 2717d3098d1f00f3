use std::io::Write as _;
use std::path::Path;
use ticklog::config::{Config, ConfigOverrides, MAX_INTERVAL_SECS};
use ticklog::error::Error;

// Environment variables are process-wide, so every env case lives in this
// one test.
#[test]
fn config_from_env() {
    unsafe {
        std::env::remove_var("TICKLOG_DESTINATION");
        std::env::remove_var("TICKLOG_INTERVAL_SECS");
        std::env::remove_var("TICKLOG_WORKERS");
    }
    assert!(matches!(Config::from_env(), Err(Error::Config(_))));

    unsafe {
        std::env::set_var("TICKLOG_DESTINATION", "/tmp/ticklog-env.log");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.engine.destination, Path::new("/tmp/ticklog-env.log"));
    assert_eq!(config.engine.interval_secs, 5);
    assert_eq!(config.engine.workers, 1);
    assert!(!config.log_level.is_empty());

    unsafe {
        std::env::set_var("TICKLOG_INTERVAL_SECS", "60");
        std::env::set_var("TICKLOG_WORKERS", "2");
    }
    let config = Config::from_env().unwrap();
    assert_eq!(config.engine.interval_secs, 60);
    assert_eq!(config.engine.workers, 2);

    unsafe {
        std::env::set_var("TICKLOG_INTERVAL_SECS", "soon");
    }
    let err = Config::from_env().unwrap_err();
    assert!(err.to_string().contains("TICKLOG_INTERVAL_SECS"), "{err}");

    unsafe {
        std::env::set_var("TICKLOG_INTERVAL_SECS", "7200");
    }
    assert!(matches!(Config::from_env(), Err(Error::Config(_))));

    // Flags fill in a missing destination and correct a bad interval.
    unsafe {
        std::env::remove_var("TICKLOG_DESTINATION");
        std::env::set_var("TICKLOG_INTERVAL_SECS", "0");
    }
    assert!(matches!(
        Config::resolve(None, &ConfigOverrides::default()),
        Err(Error::Config(_))
    ));
    let only_destination = ConfigOverrides {
        destination: Some("/tmp/ticklog-flag.log".into()),
        ..ConfigOverrides::default()
    };
    let err = Config::resolve(None, &only_destination).unwrap_err();
    assert!(err.to_string().contains("interval"), "{err}");

    let config = Config::resolve(
        None,
        &ConfigOverrides {
            interval_secs: Some(5),
            ..only_destination
        },
    )
    .unwrap();
    assert_eq!(config.engine.destination, Path::new("/tmp/ticklog-flag.log"));
    assert_eq!(config.engine.interval_secs, 5);
    assert_eq!(config.engine.workers, 2);

    unsafe {
        std::env::remove_var("TICKLOG_DESTINATION");
        std::env::remove_var("TICKLOG_INTERVAL_SECS");
        std::env::remove_var("TICKLOG_WORKERS");
    }
}

#[test]
fn toml_with_engine_table() {
    let config = Config::from_toml_str(
        r#"
        log_level = "debug"
        otel_endpoint = "http://localhost:4317"

        [engine]
        destination = "/var/tmp/ticklog/out.log"
        interval_secs = 10
        message = "tick"
        "#,
    )
    .unwrap();

    assert_eq!(config.log_level, "debug");
    assert_eq!(config.otel_endpoint.as_deref(), Some("http://localhost:4317"));
    assert_eq!(config.engine.destination, Path::new("/var/tmp/ticklog/out.log"));
    assert_eq!(config.engine.interval_secs, 10);
    assert_eq!(config.engine.message, "tick");
    assert_eq!(config.engine.workers, 1);
}

#[test]
fn toml_defaults_when_empty() {
    let config = Config::from_toml_str("").unwrap();
    assert_eq!(config.log_level, "info");
    assert_eq!(config.engine.interval_secs, 5);
    assert!(config.otel_endpoint.is_none());
}

#[test]
fn toml_rejects_out_of_range_interval() {
    let err = Config::from_toml_str(&format!(
        "[engine]\ninterval_secs = {}\n",
        MAX_INTERVAL_SECS + 1
    ))
    .unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn toml_rejects_malformed_document() {
    let err = Config::from_toml_str("[engine\ninterval_secs = 1").unwrap_err();
    assert!(err.to_string().contains("bad config"), "{err}");
}

#[test]
fn load_reads_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[engine]\ndestination = \"/tmp/from-file.log\"\ninterval_secs = 2").unwrap();

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.engine.destination, Path::new("/tmp/from-file.log"));
    assert_eq!(config.engine.interval_secs, 2);
}

#[test]
fn load_missing_file_is_config_error() {
    let err = Config::load(Path::new("/nonexistent/ticklog.toml")).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn flags_override_an_invalid_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[engine]\ndestination = \"/tmp/from-file.log\"\ninterval_secs = 0").unwrap();

    assert!(matches!(Config::load(file.path()), Err(Error::Config(_))));

    let config = Config::resolve(
        Some(file.path()),
        &ConfigOverrides {
            destination: Some("/tmp/from-flag.log".into()),
            interval_secs: Some(2),
            workers: None,
        },
    )
    .unwrap();
    assert_eq!(config.engine.destination, Path::new("/tmp/from-flag.log"));
    assert_eq!(config.engine.interval_secs, 2);
    assert_eq!(config.engine.workers, 1);
}
