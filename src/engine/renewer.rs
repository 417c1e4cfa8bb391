// src/engine/renewer.rs

use std::sync::Arc;

use chrono::NaiveDate;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::config::{InstanceConfig, RenewalConfig};
use crate::credentials::{AccountResolver, CredentialsResolver, PasswordOf};
use crate::errors::{HandlerError, TrialwatchError};
use crate::flows::jira::{
    JiraLogin, JiraSudo, needs_renewal, resolve_license_details, resolve_server_id,
    update_license_key,
};
use crate::page::PageRef;
use crate::watch::{Cause, Scope, WatchError, WatchGroup};

use super::{AtlassianSession, InstanceOutcome};

/// Processes Jira instances one after another on a shared Jira page.
pub struct Renewer {
    jira_page: PageRef,
    atlassian: Arc<AtlassianSession>,
    renewal: RenewalConfig,
    force: bool,
    today: Option<NaiveDate>,
}

impl std::fmt::Debug for Renewer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renewer")
            .field("renewal", &self.renewal)
            .field("force", &self.force)
            .field("today", &self.today)
            .finish_non_exhaustive()
    }
}

impl Renewer {
    pub fn new(jira_page: PageRef, atlassian: Arc<AtlassianSession>, renewal: RenewalConfig) -> Self {
        Self {
            jira_page,
            atlassian,
            renewal,
            force: false,
            today: None,
        }
    }

    /// Renew even when the trial has more than `threshold_days` left.
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Pin the date expiry is compared against (defaults to the local date).
    pub fn today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    fn current_date(&self) -> NaiveDate {
        self.today
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    /// Process every instance in order until done or `root` ends.
    pub async fn run_all(&self, instances: &[InstanceConfig], root: &Scope) -> RunSummary {
        let mut summary = RunSummary::default();

        for instance in instances {
            if let Some(cause) = root.cause() {
                warn!(%cause, "run interrupted; remaining instances not processed");
                summary.interrupted = Some(cause);
                break;
            }

            let span = info_span!("instance", instance = %instance.base_url);
            let res = self.renew_instance(instance, root).instrument(span.clone()).await;
            span.in_scope(|| match &res {
                Ok(outcome) => info!(?outcome, "processing done"),
                Err(err) => error!(error = %err, "processing failed"),
            });
            summary.results.push((instance.base_url.clone(), res));
        }

        if summary.interrupted.is_none() {
            summary.interrupted = root.cause();
        }
        summary
    }

    /// Log in (if asked to), inspect the license and renew it when needed.
    pub async fn renew_instance(
        &self,
        instance: &InstanceConfig,
        root: &Scope,
    ) -> Result<InstanceOutcome, TrialwatchError> {
        let scope = match self.renewal.instance_deadline {
            Some(deadline) => root.child_with_deadline(deadline),
            None => root.child(),
        };
        let auth_scope = scope.child();

        let credentials: Arc<dyn CredentialsResolver> = Arc::new(AccountResolver::new(
            instance.base_url.clone(),
            instance.account.clone(),
        ));
        let auth = WatchGroup::new("jira-auth")
            .with(
                JiraLogin {
                    credentials: Arc::clone(&credentials),
                    remember_me: self.renewal.remember_me,
                    error_probe: self.renewal.error_probe,
                }
                .watcher(&self.jira_page),
            )
            .with(
                JiraSudo {
                    password: Arc::new(PasswordOf(credentials)),
                }
                .watcher(&self.jira_page),
            );

        info!("processing instance");

        let watch_auth = async {
            let res = auth.run(self.jira_page.as_ref(), &auth_scope).await;
            if let Err(err) = &res {
                if !err.is_external() {
                    scope.cancel(Cause::Failed(Arc::new(err.clone())));
                }
            }
            res
        };
        let renew = async {
            let res = self.renew(instance, &scope).await;
            auth_scope.cancel(Cause::Done);
            res
        };

        let (auth_res, renew_res) = tokio::join!(watch_auth, renew);
        scope.cancel(Cause::Done);

        merge_outcome(auth_res, renew_res)
    }

    async fn renew(&self, instance: &InstanceConfig, scope: &Scope) -> Result<InstanceOutcome, TrialwatchError> {
        let page = self.jira_page.as_ref();
        let base_url = instance.base_url.as_str();

        info!("resolving license details");
        let details = resolve_license_details(scope, page, base_url, &instance.application_key)
            .await
            .map_err(staged("resolving license details"))?;

        info!(
            trial_expires_at = %details
                .trial_expires_at
                .map_or_else(|| "-".to_string(), |d| d.to_string()),
            sen = %details.sen,
            license_type = %details.license_type,
            organisation_name = %details.organisation_name,
            "license details"
        );
        debug!(license_key = %details.license_key, "current license key");

        let today = self.current_date();
        if !self.force && !needs_renewal(details.trial_expires_at, today, self.renewal.threshold_days) {
            if let Some(expires_at) = details.trial_expires_at {
                warn!(
                    %expires_at,
                    threshold_days = self.renewal.threshold_days,
                    "skipping: enough trial time left"
                );
                return Ok(InstanceOutcome::Skipped { expires_at });
            }
        }

        info!("resolving server id");
        let server_id = resolve_server_id(scope, page, base_url)
            .await
            .map_err(staged("resolving server id"))?;
        info!(%server_id, "server id");

        info!("resolving license key");
        let license_key = self
            .atlassian
            .license_key(scope, &server_id)
            .await
            .map_err(staged("resolving license key"))?;
        debug!(%license_key, "new license key");

        update_license_key(scope, page, base_url, &instance.application_key, &license_key)
            .await
            .map_err(staged("updating license key"))?;
        info!("license key updated");

        Ok(InstanceOutcome::Renewed {
            server_id,
            previous_expiry: details.trial_expires_at,
        })
    }
}

/// Attach `stage` to a step failure; interruptions keep their cause.
fn staged(stage: &'static str) -> impl FnOnce(HandlerError) -> TrialwatchError {
    move |err| match err {
        HandlerError::Interrupted(cause) => TrialwatchError::Interrupted(cause),
        other => TrialwatchError::stage(stage, other),
    }
}

/// Combine the auth watchers' result with the renewal steps' result.
///
/// An auth failure is the root cause of any interruption it produced, so it
/// takes precedence.
fn merge_outcome(
    auth: Result<(), WatchError>,
    renew: Result<InstanceOutcome, TrialwatchError>,
) -> Result<InstanceOutcome, TrialwatchError> {
    match (auth, renew) {
        (Err(err), _) if !err.is_external() => Err(TrialwatchError::Watch(err)),
        (_, Err(TrialwatchError::Interrupted(Cause::Failed(err)))) => {
            Err(TrialwatchError::Watch(err.as_ref().clone()))
        }
        (_, res) => res,
    }
}

/// Per-instance results of one run.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub results: Vec<(String, Result<InstanceOutcome, TrialwatchError>)>,
    /// Set when the root scope ended before or during the run.
    pub interrupted: Option<Cause>,
}

impl RunSummary {
    pub fn renewed(&self) -> usize {
        self.count(|res| matches!(res, Ok(InstanceOutcome::Renewed { .. })))
    }

    pub fn skipped(&self) -> usize {
        self.count(|res| matches!(res, Ok(InstanceOutcome::Skipped { .. })))
    }

    pub fn failed(&self) -> usize {
        self.count(Result::is_err)
    }

    fn count(&self, pred: impl Fn(&Result<InstanceOutcome, TrialwatchError>) -> bool) -> usize {
        self.results.iter().filter(|(_, res)| pred(res)).count()
    }

    /// The run's overall result: a root-level failure or interruption first,
    /// then any failed instance.
    pub fn into_result(self) -> Result<(), TrialwatchError> {
        match self.interrupted {
            Some(Cause::Failed(err)) => return Err(TrialwatchError::Watch(err.as_ref().clone())),
            Some(Cause::Done) | None => {}
            Some(cause) => return Err(TrialwatchError::Interrupted(cause)),
        }
        match self.failed() {
            0 => Ok(()),
            n => Err(TrialwatchError::InstancesFailed(n)),
        }
    }
}
