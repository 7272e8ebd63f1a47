//! Tests for `src/logging.rs`.

use cx_router::config::LoggingConfig;
use cx_router::logging::{self, LoggingGuard};

#[test]
fn logging_guard_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<LoggingGuard>();
}

#[test]
fn init_with_configured_dir_creates_it() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let logs_dir = tmp.path().join("logs");
    assert!(!logs_dir.exists());

    let config = LoggingConfig {
        dir: Some(logs_dir.clone()),
        filter: Some("cx_router=debug".to_owned()),
    };
    // Only one global subscriber per process; a later call may return Err,
    // but the directory is created first either way.
    let _result = logging::init(&config);
    assert!(logs_dir.exists(), "logs directory should be created");
}

#[test]
fn init_cli_twice_is_harmless() {
    logging::init_cli(None);
    logging::init_cli(Some("warn"));
}

#[test]
fn default_filter_quiets_sqlx() {
    assert_eq!(logging::filter_directive(None, None), "info,sqlx=warn");
}
