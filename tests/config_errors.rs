// tests/config_errors.rs

use std::io::Write;
use std::time::Duration;

use tempfile::NamedTempFile;
use trialwatch::config::load_and_validate;
use trialwatch::errors::TrialwatchError;

const ATLASSIAN: &str = r#"
[atlassian.account.plain]
username = "me@example.com"
password = "secret"
"#;

fn config_file(body: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    write!(file, "{ATLASSIAN}{body}").unwrap();
    file
}

fn expect_config_error(body: &str) -> String {
    let file = config_file(body);
    match load_and_validate(file.path()) {
        Err(TrialwatchError::ConfigError(msg)) => msg,
        Err(e) => panic!("Expected ConfigError, got: {:?}", e),
        Ok(_) => panic!("Expected error, got Ok"),
    }
}

#[test]
fn test_defaults_are_applied() {
    let file = config_file(
        r#"
[[instance]]
base_url = "https://jira.example.com/"
[instance.account.env]
username = "JIRA_USER"
password = "JIRA_PASSWORD"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.browser.connect_url, None);
    assert_eq!(cfg.browser.executable, None);
    assert!(!cfg.browser.headful);
    assert_eq!(cfg.browser.poll_interval, Duration::from_millis(250));
    assert_eq!(cfg.browser.action_timeout, Duration::from_secs(30));
    assert_eq!(cfg.renewal.threshold_days, 7);
    assert_eq!(cfg.renewal.error_probe, Duration::from_millis(1000));
    assert_eq!(cfg.renewal.instance_deadline, None);
    assert!(cfg.renewal.remember_me);

    assert_eq!(cfg.instances.len(), 1);
    let instance = &cfg.instances[0];
    assert_eq!(instance.base_url, "https://jira.example.com");
    assert_eq!(instance.application_key, "jira-software");
    assert!(instance.account.env.is_some());
    assert!(cfg.instance("https://jira.example.com/").is_some());
}

#[test]
fn test_overrides_are_parsed() {
    let file = config_file(
        r#"
[browser]
connect_url = "http://127.0.0.1:9222/"
headful = true
poll_interval = "100ms"
action_timeout = "1m"

[renewal]
threshold_days = 3
error_probe = "2s"
instance_deadline = "10m"
remember_me = false

[[instance]]
base_url = "http://jira.internal:8080"
application_key = "jira-servicedesk"
[instance.account.plain]
username = "admin"
password = "admin"
"#,
    );

    let cfg = load_and_validate(file.path()).unwrap();

    assert_eq!(cfg.browser.connect_url.as_deref(), Some("http://127.0.0.1:9222"));
    assert!(cfg.browser.headful);
    assert_eq!(cfg.browser.poll_interval, Duration::from_millis(100));
    assert_eq!(cfg.browser.action_timeout, Duration::from_secs(60));
    assert_eq!(cfg.renewal.threshold_days, 3);
    assert_eq!(cfg.renewal.error_probe, Duration::from_secs(2));
    assert_eq!(cfg.renewal.instance_deadline, Some(Duration::from_secs(600)));
    assert!(!cfg.renewal.remember_me);
    assert_eq!(cfg.instances[0].application_key, "jira-servicedesk");
}

#[test]
fn test_missing_instances_returns_config_error() {
    let msg = expect_config_error("");
    assert!(msg.contains("at least one [[instance]]"));
}

#[test]
fn test_non_http_base_url_returns_config_error() {
    let msg = expect_config_error(
        r#"
[[instance]]
base_url = "jira.example.com"
[instance.account.plain]
username = "admin"
password = "admin"
"#,
    );
    assert!(msg.contains("http:// or https://"));
}

#[test]
fn test_duplicate_instances_return_config_error() {
    let msg = expect_config_error(
        r#"
[[instance]]
base_url = "https://jira.example.com"
[instance.account.plain]
username = "admin"
password = "admin"

[[instance]]
base_url = "https://jira.example.com/"
[instance.account.plain]
username = "admin"
password = "admin"
"#,
    );
    assert!(msg.contains("more than once"));
}

#[test]
fn test_bad_duration_returns_config_error() {
    let msg = expect_config_error(
        r#"
[renewal]
error_probe = "soon"

[[instance]]
base_url = "https://jira.example.com"
[instance.account.plain]
username = "admin"
password = "admin"
"#,
    );
    assert!(msg.contains("[renewal].error_probe"));
}

#[test]
fn test_overflowing_duration_returns_config_error() {
    let msg = expect_config_error(
        r#"
[browser]
action_timeout = "18446744073709551615s"

[[instance]]
base_url = "https://jira.example.com"
[instance.account.plain]
username = "admin"
password = "admin"
"#,
    );
    assert!(msg.contains("[browser].action_timeout"));
    assert!(msg.contains("too large"));
}

#[test]
fn test_oversized_duration_returns_config_error() {
    let msg = expect_config_error(
        r#"
[renewal]
instance_deadline = "1000h"

[[instance]]
base_url = "https://jira.example.com"
[instance.account.plain]
username = "admin"
password = "admin"
"#,
    );
    assert!(msg.contains("[renewal].instance_deadline must be at most 168h"));
}

#[test]
fn test_bad_connect_url_returns_config_error() {
    let msg = expect_config_error(
        r#"
[browser]
connect_url = "localhost:9222"

[[instance]]
base_url = "https://jira.example.com"
[instance.account.plain]
username = "admin"
password = "admin"
"#,
    );
    assert!(msg.contains("[browser].connect_url"));
}

#[test]
fn test_connect_url_with_executable_returns_config_error() {
    let msg = expect_config_error(
        r#"
[browser]
connect_url = "ws://127.0.0.1:9222/devtools/browser/abc"
executable = "/usr/bin/chromium"

[[instance]]
base_url = "https://jira.example.com"
[instance.account.plain]
username = "admin"
password = "admin"
"#,
    );
    assert!(msg.contains("mutually exclusive"));
}

#[test]
fn test_zero_poll_interval_returns_config_error() {
    let msg = expect_config_error(
        r#"
[browser]
poll_interval = "0ms"

[[instance]]
base_url = "https://jira.example.com"
[instance.account.plain]
username = "admin"
password = "admin"
"#,
    );
    assert!(msg.contains("greater than zero"));
}

#[test]
fn test_account_without_source_returns_config_error() {
    let msg = expect_config_error(
        r#"
[[instance]]
base_url = "https://jira.example.com"
[instance.account]
"#,
    );
    assert!(msg.contains("account source"));
    assert!(msg.contains("https://jira.example.com"));
}

#[test]
fn test_negative_threshold_returns_config_error() {
    let msg = expect_config_error(
        r#"
[renewal]
threshold_days = -1

[[instance]]
base_url = "https://jira.example.com"
[instance.account.plain]
username = "admin"
password = "admin"
"#,
    );
    assert!(msg.contains("threshold_days"));
}

#[test]
fn test_invalid_toml_returns_toml_error() {
    let file = config_file("[[instance]\nbase_url = ");
    assert!(matches!(
        load_and_validate(file.path()),
        Err(TrialwatchError::TomlError(_))
    ));
}

#[test]
fn test_missing_file_returns_io_error() {
    assert!(matches!(
        load_and_validate("/definitely/not/here/Trialwatch.toml"),
        Err(TrialwatchError::IoError(_))
    ));
}
