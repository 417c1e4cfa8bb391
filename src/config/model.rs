// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [browser]
/// headful = true
///
/// [renewal]
/// threshold_days = 7
/// error_probe = "1000ms"
///
/// [atlassian.account.plain]
/// username = "me@example.com"
/// password = "secret"
///
/// [[instance]]
/// base_url = "https://jira.example.com"
/// [instance.account.env]
/// username = "JIRA_USER"
/// password = "JIRA_PASSWORD"
/// ```
///
/// Durations are kept as strings here; [`ConfigFile`] holds the parsed form.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub browser: RawBrowserSection,

    #[serde(default)]
    pub renewal: RawRenewalSection,

    /// Account used on my.atlassian.com to generate evaluation licenses.
    pub atlassian: AtlassianSection,

    /// All `[[instance]]` tables.
    #[serde(default, rename = "instance")]
    pub instances: Vec<InstanceConfig>,
}

/// `[browser]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawBrowserSection {
    /// DevTools endpoint of an already running Chrome (`http://` or `ws://`).
    /// When unset, a Chrome is launched for the run.
    #[serde(default)]
    pub connect_url: Option<String>,

    /// Chrome binary to launch instead of the auto-detected one.
    #[serde(default)]
    pub executable: Option<PathBuf>,

    /// Show the browser window instead of running headless.
    #[serde(default)]
    pub headful: bool,

    /// How often registered locators are checked for visibility.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,

    /// Default bound for actions waiting on an element.
    #[serde(default = "default_action_timeout")]
    pub action_timeout: String,
}

fn default_poll_interval() -> String {
    "250ms".to_string()
}

fn default_action_timeout() -> String {
    "30s".to_string()
}

impl Default for RawBrowserSection {
    fn default() -> Self {
        Self {
            connect_url: None,
            executable: None,
            headful: false,
            poll_interval: default_poll_interval(),
            action_timeout: default_action_timeout(),
        }
    }
}

/// `[renewal]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RawRenewalSection {
    /// Renew when the trial ends in fewer than this many days.
    #[serde(default = "default_threshold_days")]
    pub threshold_days: i64,

    /// How long to look for a login error banner after submitting.
    #[serde(default = "default_error_probe")]
    pub error_probe: String,

    /// Optional outer deadline for processing one instance.
    #[serde(default)]
    pub instance_deadline: Option<String>,

    /// Tick "remember me" on the Jira login form.
    #[serde(default = "default_remember_me")]
    pub remember_me: bool,
}

fn default_threshold_days() -> i64 {
    7
}

fn default_error_probe() -> String {
    "1000ms".to_string()
}

fn default_remember_me() -> bool {
    true
}

impl Default for RawRenewalSection {
    fn default() -> Self {
        Self {
            threshold_days: default_threshold_days(),
            error_probe: default_error_probe(),
            instance_deadline: None,
            remember_me: default_remember_me(),
        }
    }
}

/// `[atlassian]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct AtlassianSection {
    pub account: Account,
}

/// One `[[instance]]` table: a Jira server to keep licensed.
#[derive(Debug, Clone, Deserialize)]
pub struct InstanceConfig {
    /// Jira base URL, without trailing slash after validation.
    pub base_url: String,

    /// Application whose license is renewed.
    #[serde(default = "default_application_key")]
    pub application_key: String,

    /// Jira administrator account (also used for websudo).
    pub account: Account,
}

pub fn default_application_key() -> String {
    "jira-software".to_string()
}

/// Where an account's username and password come from.
///
/// Exactly one of the sources is used; `plain` wins if both are set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Account {
    #[serde(default)]
    pub plain: Option<PlainAccount>,

    #[serde(default)]
    pub env: Option<EnvAccount>,
}

impl Account {
    pub fn has_source(&self) -> bool {
        self.plain.is_some() || self.env.is_some()
    }
}

#[derive(Clone, Deserialize)]
pub struct PlainAccount {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for PlainAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlainAccount")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Names of the environment variables holding the credentials.
#[derive(Debug, Clone, Deserialize)]
pub struct EnvAccount {
    pub username: String,
    pub password: String,
}

/// Validated configuration.
///
/// Built from [`RawConfigFile`] via `TryFrom` (see `validate.rs`).
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub browser: BrowserConfig,
    pub renewal: RenewalConfig,
    pub atlassian: AtlassianSection,
    pub instances: Vec<InstanceConfig>,
}

#[derive(Debug, Clone)]
pub struct BrowserConfig {
    pub connect_url: Option<String>,
    pub executable: Option<PathBuf>,
    pub headful: bool,
    pub poll_interval: Duration,
    pub action_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct RenewalConfig {
    pub threshold_days: i64,
    pub error_probe: Duration,
    pub instance_deadline: Option<Duration>,
    pub remember_me: bool,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            threshold_days: default_threshold_days(),
            error_probe: Duration::from_millis(1000),
            instance_deadline: None,
            remember_me: default_remember_me(),
        }
    }
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        browser: BrowserConfig,
        renewal: RenewalConfig,
        atlassian: AtlassianSection,
        instances: Vec<InstanceConfig>,
    ) -> Self {
        Self {
            browser,
            renewal,
            atlassian,
            instances,
        }
    }

    pub fn instance(&self, base_url: &str) -> Option<&InstanceConfig> {
        let wanted = base_url.trim_end_matches('/');
        self.instances.iter().find(|i| i.base_url == wanted)
    }
}
