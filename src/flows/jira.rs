// src/flows/jira.rs

//! Jira Data Center: login, websudo, license inspection and update.
//!
//! The login and websudo forms can show up at any point while an instance is
//! processed (session expiry, admin pages asking for confirmation), so they
//! are handled by watchers running alongside the renewal steps rather than by
//! the steps themselves.

use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use tracing::{debug, info};

use crate::credentials::{CredentialsResolver, SecretResolver};
use crate::errors::HandlerError;
use crate::page::{ElementState, Locator, Page, PageRef, xpath_literal};
use crate::watch::{Probe, Scope, WatchGroup, Watcher, absorb_timeout, probe_absence};

use super::step;

/// XPath selectors for the Jira pages this module drives.
pub mod selectors {
    pub const LOGIN_FORM: &str = r#"//form[contains(@action, "/login.jsp")]"#;
    /// Relative to [`LOGIN_FORM`].
    pub const LOGIN_USERNAME: &str = r#"//*[@name="os_username"]"#;
    /// Relative to [`LOGIN_FORM`].
    pub const LOGIN_PASSWORD: &str = r#"//*[@name="os_password"]"#;
    /// Relative to [`LOGIN_FORM`].
    pub const LOGIN_REMEMBER_ME: &str = r#"//input[@id="login-form-remember-me"]"#;
    /// Relative to [`LOGIN_FORM`].
    pub const LOGIN_SUBMIT: &str = r#"//*[@name="login"]"#;
    pub const LOGIN_ERROR: &str = r#"//form[@id="login-form"]//div[contains(concat(' ', @class, ' '), ' aui-message-error ')]"#;

    pub const SUDO_FORM: &str = r#"//form[contains(@action, "/WebSudoAuthenticate.jspa")]"#;
    /// Relative to [`SUDO_FORM`].
    pub const SUDO_PASSWORD: &str = r#"//*[@name="webSudoPassword"]"#;
    /// Relative to [`SUDO_FORM`].
    pub const SUDO_SUBMIT: &str = r#"//*[@type="submit"]"#;

    pub const SERVER_ID_CELL: &str = "//tr[td[@class='cell-type-key']/strong[text()='Server ID']]/td[@class='cell-type-value']";

    /// Relative to an application block.
    pub const LICENSE_DETAIL_FIELD: &str =
        "//*[contains(concat(' ', normalize-space(@class), ' '), ' license-detail-field ')]";
    /// Relative to a license detail field.
    pub const LICENSE_DETAIL_NAME: &str = "//dt";
    /// Relative to a license detail field.
    pub const LICENSE_DETAIL_RAW: &str =
        "//*[contains(concat(' ', normalize-space(@class), ' '), ' license-string-raw ')]";
    /// Relative to a license detail field.
    pub const LICENSE_DETAIL_VALUE: &str = "//dd";

    /// Relative to an application block.
    pub const UPDATE_LICENSE_LINK: &str = r#"//*[@class="update-license-key"]"#;
    /// Relative to an application block.
    pub const UPDATE_LICENSE_TEXTAREA: &str =
        "//textarea[contains(concat(' ', normalize-space(@class), ' '), ' license-update-textarea ')]";
    /// Relative to an application block.
    pub const UPDATE_LICENSE_SUBMIT: &str =
        "//*[contains(concat(' ', normalize-space(@class), ' '), ' license-update-submit ')]";
    pub const UPDATE_LICENSE_FINISH: &str = r#"//*[@id="multiple-license-dialog"]//button[text()="Finish" and not(contains(concat(" ", @class, " "), " hidden "))]"#;
}

/// The block for one application on the versions & licenses page.
pub fn application(application_key: &str) -> Locator {
    Locator::new(format!(
        "//div[@data-application-key={}]",
        xpath_literal(application_key)
    ))
}

pub fn system_info_url(base_url: &str) -> String {
    format!("{base_url}/secure/admin/ViewSystemInfo.jspa")
}

pub fn licenses_url(base_url: &str) -> String {
    format!("{base_url}/plugins/servlet/applications/versions-licenses")
}

/// Formats the "Trial expires" field is rendered in, depending on locale.
const TRIAL_DATE_FORMATS: &[&str] = &["%d/%b/%y", "%d %b %Y"];

/// Logs into Jira whenever its login form shows up.
#[derive(Clone)]
pub struct JiraLogin {
    pub credentials: Arc<dyn CredentialsResolver>,
    pub remember_me: bool,
    /// How long to look for the error banner after submitting.
    pub error_probe: Duration,
}

impl JiraLogin {
    pub fn watcher(&self, page: &PageRef) -> Watcher {
        let page = Arc::clone(page);
        let login = self.clone();
        Watcher::new(
            "jira-login",
            Locator::new(selectors::LOGIN_FORM),
            move |scope: Scope, form: Locator| {
                let page = Arc::clone(&page);
                let login = login.clone();
                async move { login.submit(&scope, page.as_ref(), &form).await }
            },
        )
    }

    pub fn group(&self, page: &PageRef) -> WatchGroup {
        WatchGroup::new("jira-login").with(self.watcher(page))
    }

    async fn submit(&self, scope: &Scope, page: &dyn Page, form: &Locator) -> Result<(), HandlerError> {
        let creds = scope
            .run_until_cancelled(self.credentials.resolve())
            .await?
            .map_err(|e| HandlerError::resolver("jira credentials", e))?;

        step(scope, page.fill(&form.child(selectors::LOGIN_PASSWORD), &creds.password)).await?;
        step(
            scope,
            page.fill(&form.child(selectors::LOGIN_USERNAME).first(), &creds.username),
        )
        .await?;
        if self.remember_me {
            step(scope, page.check(&form.child(selectors::LOGIN_REMEMBER_ME))).await?;
        }
        step(scope, page.click(&form.child(selectors::LOGIN_SUBMIT), None)).await?;
        step(scope, page.wait_for(form, ElementState::Hidden, None)).await?;

        let banner = Locator::new(selectors::LOGIN_ERROR);
        match step(scope, probe_absence(page, &banner, self.error_probe)).await? {
            Probe::Absent => {
                info!(user = %creds.username, "logged into jira");
                Ok(())
            }
            Probe::Present(message) => Err(HandlerError::Rejected {
                stage: "login",
                message: message.trim().to_string(),
            }),
        }
    }
}

/// Confirms the administrator password whenever Jira asks for websudo.
#[derive(Clone)]
pub struct JiraSudo {
    pub password: Arc<dyn SecretResolver>,
}

impl JiraSudo {
    pub fn watcher(&self, page: &PageRef) -> Watcher {
        let page = Arc::clone(page);
        let password = Arc::clone(&self.password);
        Watcher::new(
            "jira-websudo",
            Locator::new(selectors::SUDO_FORM),
            move |scope: Scope, form: Locator| {
                let page = Arc::clone(&page);
                let password = Arc::clone(&password);
                async move {
                    let password = scope
                        .run_until_cancelled(password.resolve())
                        .await?
                        .map_err(|e| HandlerError::resolver("websudo password", e))?;
                    step(&scope, page.fill(&form.child(selectors::SUDO_PASSWORD), &password)).await?;
                    step(&scope, page.click(&form.child(selectors::SUDO_SUBMIT), None)).await?;
                    debug!("websudo confirmed");
                    Ok::<(), HandlerError>(())
                }
            },
        )
    }
}

/// Read the server ID from the system info page.
pub async fn resolve_server_id(scope: &Scope, page: &dyn Page, base_url: &str) -> Result<String, HandlerError> {
    step(scope, page.goto(&system_info_url(base_url))).await?;

    let cell = Locator::new(selectors::SERVER_ID_CELL);
    // Clicking waits for the cell to render (the page may be behind websudo).
    step(scope, page.click(&cell, None)).await?;
    let server_id = step(scope, page.text_content(&cell)).await?.trim().to_string();
    if server_id.is_empty() {
        return Err(HandlerError::Parse {
            what: "server id",
            value: server_id,
        });
    }
    Ok(server_id)
}

/// License fields shown for one application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LicenseDetails {
    pub trial_expires_at: Option<NaiveDate>,
    pub sen: String,
    pub license_type: String,
    pub organisation_name: String,
    pub license_key: String,
}

/// Read the license detail fields of `application_key`.
pub async fn resolve_license_details(
    scope: &Scope,
    page: &dyn Page,
    base_url: &str,
    application_key: &str,
) -> Result<LicenseDetails, HandlerError> {
    step(scope, page.goto(&licenses_url(base_url))).await?;

    let app = application(application_key);
    step(scope, page.click(&app, None)).await?;

    let fields = app.child(selectors::LICENSE_DETAIL_FIELD);
    let count = step(scope, page.count(&fields)).await?;
    debug!(application = %application_key, fields = count, "reading license details");

    let mut details = LicenseDetails::default();
    for index in 0..count {
        let field = fields.nth(index);
        let name = step(
            scope,
            page.inner_text(&field.child(selectors::LICENSE_DETAIL_NAME), None),
        )
        .await?;
        let value_locator = field
            .child(selectors::LICENSE_DETAIL_RAW)
            .or(&field.child(selectors::LICENSE_DETAIL_VALUE));
        let value = step(scope, page.text_content(&value_locator)).await?.trim().to_string();

        match name.trim() {
            "Trial expires" => details.trial_expires_at = Some(parse_trial_date(&value)?),
            "Support entitlement number (SEN)" => details.sen = value,
            "License type" => details.license_type = value,
            "Organisation name" => details.organisation_name = value,
            "License key" => details.license_key = value,
            other => debug!(field = %other, "ignoring license field"),
        }
    }
    Ok(details)
}

/// Parse the "Trial expires" value (`05/Mar/25` or `5 Mar 2025`).
pub fn parse_trial_date(value: &str) -> Result<NaiveDate, HandlerError> {
    let value = value.trim();
    TRIAL_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .ok_or_else(|| HandlerError::Parse {
            what: "trial expiry date",
            value: value.to_string(),
        })
}

/// Whether a trial ending on `expires_at` should be renewed on `today`.
///
/// Unknown expiry always renews; otherwise renew when fewer than
/// `threshold_days` are left.
pub fn needs_renewal(expires_at: Option<NaiveDate>, today: NaiveDate, threshold_days: i64) -> bool {
    let Some(expires_at) = expires_at else {
        return true;
    };
    let days = u64::try_from(threshold_days).unwrap_or(0);
    match today.checked_add_days(Days::new(days)) {
        Some(limit) => expires_at < limit,
        None => false,
    }
}

/// Paste `license_key` into the update dialog of `application_key`.
pub async fn update_license_key(
    scope: &Scope,
    page: &dyn Page,
    base_url: &str,
    application_key: &str,
    license_key: &str,
) -> Result<(), HandlerError> {
    step(scope, page.goto(&licenses_url(base_url))).await?;

    let app = application(application_key);
    let textarea = app.child(selectors::UPDATE_LICENSE_TEXTAREA);

    step(scope, page.click(&app.child(selectors::UPDATE_LICENSE_LINK), None)).await?;
    step(scope, page.fill(&textarea, license_key)).await?;
    step(scope, page.click(&app.child(selectors::UPDATE_LICENSE_SUBMIT), None)).await?;

    // Only shown when several applications share the license.
    let finish = Locator::new(selectors::UPDATE_LICENSE_FINISH);
    if step(scope, async { absorb_timeout(page.click(&finish, None).await) })
        .await?
        .is_none()
    {
        debug!("no license confirmation dialog");
    }

    step(scope, page.wait_for(&textarea, ElementState::Hidden, None)).await?;
    Ok(())
}
