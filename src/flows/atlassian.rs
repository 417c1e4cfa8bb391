// src/flows/atlassian.rs

//! my.atlassian.com: login and evaluation license generation.
//!
//! The Atlassian login is a multi-step form whose steps appear in an order
//! that depends on the account (username first, then password; sometimes a
//! two-step verification prompt, sometimes an offer to skip it). Each step
//! gets its own watcher and they all run in one group.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::credentials::SecretResolver;
use crate::errors::HandlerError;
use crate::page::{Locator, Page, PageRef, xpath_literal};
use crate::watch::{GroupPolicy, Scope, WatchGroup, Watcher, absorb_timeout};

use super::step;

pub mod selectors {
    pub const USERNAME: &str = r#"//form[@data-testid="form-login"]//input[@data-testid="username"]"#;
    pub const PASSWORD: &str = r#"//form[@data-testid="form-login"]//input[@data-testid="password"]"#;
    pub const SUBMIT: &str = r#"//form[@data-testid="form-login"]//*[@type="submit"]"#;
    pub const OTP: &str = r#"//form//input[@id="two-step-verification-otp-code-input" and not(@disabled)]"#;
    pub const SKIP_OTP: &str = r#"//*[text()="Continue without two-step verification"]"#;

    pub const PRODUCT_SELECT: &str = r#"//select[@id="product-select"]"#;
    pub const DATA_CENTER_SELECT: &str = r#"//*[@data="jira-software.data-center"]//*[text()="Select"]"#;
    pub const DATA_CENTER_PRIMARY: &str = r#"//*[@data="jira-software.data-center"]//*[contains(concat(" ", text(), " "), " aui-button-primary ")]"#;
    pub const SERVER_ID_INPUT: &str = r#"//input[@name="sid"]"#;
    pub const GENERATE: &str = r#"//input[@name="_action_evaluation"]"#;
}

pub const EVALUATION_URL: &str = "https://my.atlassian.com/license/evaluation";

/// Product picked on the evaluation page.
const PRODUCT: &str = "Jira";

/// Pause between product selection steps while the page re-renders.
const SETTLE_PAUSE: Duration = Duration::from_secs(1);

/// Bound for the optional "primary" data-center button.
const PRIMARY_CLICK_BOUND: Duration = Duration::from_millis(2);

/// How long to wait for the generated license to be linked in the URL.
const GENERATED_WAIT: Duration = Duration::from_secs(30);

/// The textarea holding the license generated for the row `row_id`.
pub fn generated_license(row_id: &str) -> Locator {
    Locator::new(format!(
        r#"//tr[@id={}]/following::tr[@class="evaluation"][1]//textarea"#,
        xpath_literal(row_id)
    ))
}

/// Answers whichever login step my.atlassian.com shows.
#[derive(Clone)]
pub struct AtlassianLogin {
    pub username: Arc<dyn SecretResolver>,
    pub password: Arc<dyn SecretResolver>,
    pub otp: Arc<dyn SecretResolver>,
}

impl AtlassianLogin {
    /// All four login watchers; every one must complete for the group to
    /// settle, so it normally runs until its scope is ended from outside.
    pub fn group(&self, page: &PageRef) -> WatchGroup {
        WatchGroup::new("atlassian-login")
            .with_policy(GroupPolicy::AllSettled)
            .with(fill_and_submit(
                "atlassian-username",
                page,
                selectors::USERNAME,
                "atlassian username",
                Arc::clone(&self.username),
                true,
            ))
            .with(fill_and_submit(
                "atlassian-password",
                page,
                selectors::PASSWORD,
                "atlassian password",
                Arc::clone(&self.password),
                true,
            ))
            .with(fill_and_submit(
                "atlassian-otp",
                page,
                selectors::OTP,
                "OTP code",
                Arc::clone(&self.otp),
                false,
            ))
            .with(skip_otp(page))
    }
}

fn fill_and_submit(
    name: &str,
    page: &PageRef,
    field: &'static str,
    what: &'static str,
    resolver: Arc<dyn SecretResolver>,
    submit: bool,
) -> Watcher {
    let page = Arc::clone(page);
    Watcher::new(name, Locator::new(field), move |scope: Scope, _matched: Locator| {
        let page = Arc::clone(&page);
        let resolver = Arc::clone(&resolver);
        async move {
            let value = scope
                .run_until_cancelled(resolver.resolve())
                .await?
                .map_err(|e| HandlerError::resolver(what, e))?;
            step(&scope, page.fill(&Locator::new(field), &value)).await?;
            if submit {
                step(&scope, page.click(&Locator::new(selectors::SUBMIT), None)).await?;
            }
            debug!(step = what, "atlassian login step answered");
            Ok::<(), HandlerError>(())
        }
    })
}

fn skip_otp(page: &PageRef) -> Watcher {
    let page = Arc::clone(page);
    Watcher::new(
        "atlassian-skip-otp",
        Locator::new(selectors::SKIP_OTP),
        move |scope: Scope, link: Locator| {
            let page = Arc::clone(&page);
            async move {
                step(&scope, page.click(&link, None)).await?;
                debug!("skipped two-step verification");
                Ok::<(), HandlerError>(())
            }
        },
    )
}

/// Generate a Jira Data Center evaluation license for `server_id`.
pub async fn get_license_key(scope: &Scope, page: &dyn Page, server_id: &str) -> Result<String, HandlerError> {
    step(scope, page.goto(EVALUATION_URL)).await?;

    let product = Locator::new(selectors::PRODUCT_SELECT);
    step(scope, page.click(&product, None)).await?;
    step(scope, page.select_option(&product, PRODUCT)).await?;
    scope.sleep(SETTLE_PAUSE).await?;

    step(scope, page.click(&Locator::new(selectors::DATA_CENTER_SELECT), None)).await?;
    scope.sleep(SETTLE_PAUSE).await?;

    // The primary button only exists in some page variants; try twice and
    // carry on if it never shows.
    let primary = Locator::new(selectors::DATA_CENTER_PRIMARY);
    step(scope, async { absorb_timeout(page.click(&primary, Some(PRIMARY_CLICK_BOUND)).await) }).await?;
    scope.sleep(SETTLE_PAUSE).await?;
    step(scope, async { absorb_timeout(page.click(&primary, Some(PRIMARY_CLICK_BOUND)).await) }).await?;

    step(scope, page.fill(&Locator::new(selectors::SERVER_ID_INPUT), server_id)).await?;
    step(scope, page.click(&Locator::new(selectors::GENERATE), None)).await?;

    let row_id = generated_row(scope, page).await?;
    let raw = step(scope, page.input_value(&generated_license(&row_id))).await?;
    let license_key: String = raw.chars().filter(|c| *c != '\n' && *c != '\r').collect();
    if license_key.trim().is_empty() {
        return Err(HandlerError::Parse {
            what: "license key",
            value: raw,
        });
    }

    info!(%server_id, "generated evaluation license");
    Ok(license_key)
}

/// After generating, the page links the new license row in the URL fragment.
async fn generated_row(scope: &Scope, page: &dyn Page) -> Result<String, HandlerError> {
    let deadline = tokio::time::Instant::now() + GENERATED_WAIT;
    loop {
        let url = step(scope, page.url()).await?;
        let fragment = url.split_once('#').map(|(_, f)| f).filter(|f| !f.is_empty());
        if let Some(fragment) = fragment {
            return Ok(fragment.to_string());
        }
        if tokio::time::Instant::now() >= deadline {
            return Err(HandlerError::Parse {
                what: "generated license id",
                value: url,
            });
        }
        scope.sleep(Duration::from_millis(250)).await?;
    }
}
