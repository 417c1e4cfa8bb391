#![allow(dead_code)]

use trialwatch::config::{
    Account, AtlassianSection, ConfigFile, InstanceConfig, PlainAccount, RawBrowserSection,
    RawConfigFile, RawRenewalSection, default_application_key,
};

pub fn plain_account(username: &str, password: &str) -> Account {
    Account {
        plain: Some(PlainAccount {
            username: username.to_string(),
            password: password.to_string(),
        }),
        env: None,
    }
}

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile {
                browser: RawBrowserSection::default(),
                renewal: RawRenewalSection::default(),
                atlassian: AtlassianSection {
                    account: plain_account("me@example.com", "atlassian-secret"),
                },
                instances: Vec::new(),
            },
        }
    }

    pub fn with_instance(mut self, instance: InstanceConfig) -> Self {
        self.config.instances.push(instance);
        self
    }

    pub fn with_threshold_days(mut self, days: i64) -> Self {
        self.config.renewal.threshold_days = days;
        self
    }

    pub fn with_error_probe(mut self, probe: &str) -> Self {
        self.config.renewal.error_probe = probe.to_string();
        self
    }

    pub fn with_instance_deadline(mut self, deadline: &str) -> Self {
        self.config.renewal.instance_deadline = Some(deadline.to_string());
        self
    }

    pub fn with_connect_url(mut self, url: &str) -> Self {
        self.config.browser.connect_url = Some(url.to_string());
        self
    }

    pub fn raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `InstanceConfig`.
pub struct InstanceBuilder {
    instance: InstanceConfig,
}

impl InstanceBuilder {
    pub fn new(base_url: &str) -> Self {
        Self {
            instance: InstanceConfig {
                base_url: base_url.to_string(),
                application_key: default_application_key(),
                account: plain_account("admin", "jira-secret"),
            },
        }
    }

    pub fn application_key(mut self, key: &str) -> Self {
        self.instance.application_key = key.to_string();
        self
    }

    pub fn account(mut self, account: Account) -> Self {
        self.instance.account = account;
        self
    }

    pub fn build(self) -> InstanceConfig {
        self.instance
    }
}
