// src/config/validate.rs

use std::collections::HashSet;
use std::time::Duration;

use crate::config::model::{
    Account, BrowserConfig, ConfigFile, RawBrowserSection, RawConfigFile, RawRenewalSection,
    RenewalConfig,
};
use crate::errors::{Result, TrialwatchError};
use crate::types::{MAX_DURATION, parse_duration};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = crate::errors::TrialwatchError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        ensure_has_instances(&raw)?;
        let browser = validate_browser(&raw.browser)?;
        let renewal = validate_renewal(&raw.renewal)?;
        validate_account("[atlassian].account", &raw.atlassian.account)?;

        let mut instances = raw.instances;
        for instance in instances.iter_mut() {
            instance.base_url = normalize_base_url(&instance.base_url)?;
            validate_account(&format!("instance '{}'", instance.base_url), &instance.account)?;
            if instance.application_key.trim().is_empty() {
                return Err(TrialwatchError::ConfigError(format!(
                    "instance '{}' has an empty application_key",
                    instance.base_url
                )));
            }
        }
        ensure_unique_instances(instances.iter().map(|i| i.base_url.as_str()))?;

        Ok(ConfigFile::new_unchecked(
            browser,
            renewal,
            raw.atlassian,
            instances,
        ))
    }
}

fn ensure_has_instances(cfg: &RawConfigFile) -> Result<()> {
    if cfg.instances.is_empty() {
        return Err(TrialwatchError::ConfigError(
            "config must contain at least one [[instance]] table".to_string(),
        ));
    }
    Ok(())
}

const DEVTOOLS_SCHEMES: [&str; 4] = ["http://", "https://", "ws://", "wss://"];

fn validate_browser(raw: &RawBrowserSection) -> Result<BrowserConfig> {
    let connect_url = match raw.connect_url.as_deref().map(str::trim) {
        Some(url) if DEVTOOLS_SCHEMES.iter().any(|scheme| url.starts_with(scheme)) => {
            Some(url.trim_end_matches('/').to_string())
        }
        Some(url) => {
            return Err(config_error(format!(
                "[browser].connect_url must be an http(s) or ws(s) URL (got '{url}')"
            )));
        }
        None => None,
    };
    if connect_url.is_some() && raw.executable.is_some() {
        return Err(config_error(
            "[browser].connect_url and [browser].executable are mutually exclusive".to_string(),
        ));
    }

    Ok(BrowserConfig {
        connect_url,
        executable: raw.executable.clone(),
        headful: raw.headful,
        poll_interval: non_zero("[browser].poll_interval", duration("[browser].poll_interval", &raw.poll_interval)?)?,
        action_timeout: duration("[browser].action_timeout", &raw.action_timeout)?,
    })
}

fn validate_renewal(raw: &RawRenewalSection) -> Result<RenewalConfig> {
    if raw.threshold_days < 0 {
        return Err(config_error(format!(
            "[renewal].threshold_days must be >= 0 (got {})",
            raw.threshold_days
        )));
    }

    let instance_deadline = match raw.instance_deadline.as_deref() {
        Some(s) => Some(non_zero(
            "[renewal].instance_deadline",
            duration("[renewal].instance_deadline", s)?,
        )?),
        None => None,
    };

    Ok(RenewalConfig {
        threshold_days: raw.threshold_days,
        error_probe: non_zero("[renewal].error_probe", duration("[renewal].error_probe", &raw.error_probe)?)?,
        instance_deadline,
        remember_me: raw.remember_me,
    })
}

fn validate_account(owner: &str, account: &Account) -> Result<()> {
    if !account.has_source() {
        return Err(config_error(format!(
            "{owner} needs an account source ([...account.plain] or [...account.env])"
        )));
    }
    Ok(())
}

fn ensure_unique_instances<'a>(urls: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut seen = HashSet::new();
    for url in urls {
        if !seen.insert(url) {
            return Err(config_error(format!("instance '{url}' is listed more than once")));
        }
    }
    Ok(())
}

/// Require an http(s) URL and strip trailing slashes.
fn normalize_base_url(url: &str) -> Result<String> {
    let url = url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(config_error(format!(
            "base_url must start with http:// or https:// (got '{url}')"
        )));
    }
    Ok(url.trim_end_matches('/').to_string())
}

fn duration(field: &str, value: &str) -> Result<Duration> {
    let parsed = parse_duration(value).map_err(|e| config_error(format!("{field}: {e}")))?;
    if parsed > MAX_DURATION {
        return Err(config_error(format!(
            "{field} must be at most {}h (got '{value}')",
            MAX_DURATION.as_secs() / 3600
        )));
    }
    Ok(parsed)
}

fn non_zero(field: &str, value: Duration) -> Result<Duration> {
    if value.is_zero() {
        return Err(config_error(format!("{field} must be greater than zero")));
    }
    Ok(value)
}

fn config_error(msg: String) -> TrialwatchError {
    TrialwatchError::ConfigError(msg)
}
