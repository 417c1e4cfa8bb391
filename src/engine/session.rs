// src/engine/session.rs

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::OnceCell;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::errors::{ActionError, HandlerError};
use crate::flows::atlassian::{AtlassianLogin, get_license_key};
use crate::flows::step;
use crate::page::{Browser, PageRef};
use crate::watch::{Cause, Scope, WatchError};

/// Name the session reports under when its page cannot be opened.
pub const SESSION_WATCHER: &str = "atlassian-session";

/// The my.atlassian.com page shared by every instance of a run.
///
/// The page is opened on the first [`license_key`](Self::license_key) call;
/// concurrent first calls open it once and the outcome is kept for the rest
/// of the run. Opening it also starts the Atlassian login watchers in the
/// background, under a child of the run's root scope.
///
/// The root scope is cancelled with the failure when the page cannot be
/// opened or when the login watchers fail (e.g. a resolver error).
pub struct AtlassianSession {
    browser: Arc<dyn Browser>,
    login: AtlassianLogin,
    root: Scope,
    login_scope: Scope,
    page: OnceCell<Result<PageRef, ActionError>>,
    tasks: Mutex<JoinSet<()>>,
}

impl std::fmt::Debug for AtlassianSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AtlassianSession")
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}

impl AtlassianSession {
    pub fn new(browser: Arc<dyn Browser>, login: AtlassianLogin, root: &Scope) -> Self {
        Self {
            browser,
            login,
            root: root.clone(),
            login_scope: root.child(),
            page: OnceCell::new(),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.page.get(), Some(Ok(_)))
    }

    /// The session page, opened on first use.
    ///
    /// A failed open is returned to every later caller as well.
    pub async fn page(&self) -> Result<PageRef, ActionError> {
        self.page
            .get_or_init(|| async {
                info!("opening atlassian page");
                match self.browser.new_page().await {
                    Ok(page) => {
                        self.start_login(&page);
                        Ok(page)
                    }
                    Err(err) => {
                        error!(error = %err, "opening atlassian page failed; cancelling run");
                        self.root.cancel(Cause::Failed(Arc::new(WatchError::Failed {
                            watcher: SESSION_WATCHER.to_string(),
                            source: Arc::new(HandlerError::Action(err.clone())),
                        })));
                        Err(err)
                    }
                }
            })
            .await
            .clone()
    }

    /// Generate an evaluation license for `server_id` on the session page.
    pub async fn license_key(&self, scope: &Scope, server_id: &str) -> Result<String, HandlerError> {
        let page = step(scope, self.page()).await?;
        get_license_key(scope, page.as_ref(), server_id).await
    }

    fn start_login(&self, page: &PageRef) {
        let group = self.login.group(page);
        let page = Arc::clone(page);
        let root = self.root.clone();
        let scope = self.login_scope.clone();

        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .spawn(async move {
                match group.run(page.as_ref(), &scope).await {
                    Ok(()) => info!("atlassian login watchers settled"),
                    Err(err) if err.is_external() => {
                        debug!(error = %err, "atlassian login watchers stopped");
                    }
                    Err(err) => {
                        error!(error = %err, "atlassian login failed; cancelling run");
                        root.cancel(Cause::Failed(Arc::new(err)));
                    }
                }
            });
    }

    /// Stop the login watchers and close the page, if it was ever opened.
    pub async fn shutdown(&self) {
        self.login_scope.cancel(Cause::Done);

        let mut tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        while let Some(res) = tasks.join_next().await {
            if let Err(err) = res {
                warn!(error = %err, "atlassian login task ended abnormally");
            }
        }

        if let Some(Ok(page)) = self.page.get() {
            if let Err(err) = page.close().await {
                warn!(error = %err, "closing atlassian page");
            }
        }
    }
}
