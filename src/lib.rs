// src/lib.rs

pub mod cli;
pub mod config;
pub mod credentials;
pub mod engine;
pub mod errors;
pub mod flows;
pub mod logging;
pub mod page;
pub mod types;
pub mod watch;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, InstanceConfig, load_and_validate};
use crate::credentials::{AccountResolver, CredentialsResolver, PasswordOf, StdinCodeResolver, UsernameOf};
use crate::engine::{AtlassianSession, Renewer};
use crate::flows::atlassian::AtlassianLogin;
use crate::page::{Browser, ChromiumBrowser};
use crate::watch::{Cause, Scope};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - the Chrome browser and the shared Jira page
/// - the lazily opened Atlassian session
/// - the renewer
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;
    let instances = select_instances(&cfg, args.instance.as_deref())?;

    if args.dry_run {
        print_dry_run(&cfg, &instances, args.force);
        return Ok(());
    }

    let root = Scope::root();

    // Ctrl-C → cancel everything in flight.
    {
        let root = root.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            warn!("Ctrl-C received; cancelling");
            root.cancel(Cause::Canceled);
        });
    }

    let chrome = Arc::new(ChromiumBrowser::start(cfg.browser.clone()).await?);
    let browser: Arc<dyn Browser> = chrome.clone();
    let jira_page = match browser.new_page().await {
        Ok(page) => page,
        Err(err) => {
            chrome.close().await;
            return Err(err.into());
        }
    };

    let atlassian_account: Arc<dyn CredentialsResolver> =
        Arc::new(AccountResolver::new("atlassian", cfg.atlassian.account.clone()));
    let login = AtlassianLogin {
        username: Arc::new(UsernameOf(Arc::clone(&atlassian_account))),
        password: Arc::new(PasswordOf(atlassian_account)),
        otp: Arc::new(StdinCodeResolver::otp()),
    };
    let atlassian = Arc::new(AtlassianSession::new(Arc::clone(&browser), login, &root));

    let renewer = Renewer::new(Arc::clone(&jira_page), Arc::clone(&atlassian), cfg.renewal.clone())
        .force(args.force);

    info!(instances = instances.len(), "starting renewal run");
    let summary = renewer.run_all(&instances, &root).await;
    info!(
        renewed = summary.renewed(),
        skipped = summary.skipped(),
        failed = summary.failed(),
        "renewal run finished"
    );

    atlassian.shutdown().await;
    if let Err(err) = jira_page.close().await {
        warn!(error = %err, "closing jira page");
    }
    chrome.close().await;
    root.cancel(Cause::Done);

    summary.into_result().map_err(Into::into)
}

/// All instances, or only the one named by `--instance`.
fn select_instances(cfg: &ConfigFile, only: Option<&str>) -> Result<Vec<InstanceConfig>> {
    match only {
        None => Ok(cfg.instances.clone()),
        Some(url) => cfg
            .instance(url)
            .map(|instance| vec![instance.clone()])
            .ok_or_else(|| anyhow!("no instance with base_url '{url}' in config")),
    }
}

/// Simple dry-run output: print browser settings and the instances.
fn print_dry_run(cfg: &ConfigFile, instances: &[InstanceConfig], force: bool) {
    println!("trialwatch dry-run");
    match (&cfg.browser.connect_url, &cfg.browser.executable) {
        (Some(url), _) => println!("  browser.connect_url = {url}"),
        (None, Some(path)) => println!("  browser.executable = {}", path.display()),
        (None, None) => println!("  browser = auto-detected chrome"),
    }
    println!("  browser.headful = {}", cfg.browser.headful);
    println!("  renewal.threshold_days = {}", cfg.renewal.threshold_days);
    println!("  renewal.error_probe = {:?}", cfg.renewal.error_probe);
    if let Some(deadline) = cfg.renewal.instance_deadline {
        println!("  renewal.instance_deadline = {deadline:?}");
    }
    if force {
        println!("  force = true (threshold ignored)");
    }
    println!();

    println!("instances ({}):", instances.len());
    for instance in instances {
        println!("  - {}", instance.base_url);
        println!("      application_key: {}", instance.application_key);
        let source = if instance.account.plain.is_some() {
            "plain"
        } else {
            "env"
        };
        println!("      account: {source}");
    }

    debug!("dry-run complete (no browser opened)");
}
