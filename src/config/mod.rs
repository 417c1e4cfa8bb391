// src/config/mod.rs

//! Configuration loading and validation for trialwatch.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate and convert the raw model (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path};
pub use model::{
    Account, AtlassianSection, BrowserConfig, ConfigFile, EnvAccount, InstanceConfig,
    PlainAccount, RawBrowserSection, RawConfigFile, RawRenewalSection, RenewalConfig,
    default_application_key,
};
