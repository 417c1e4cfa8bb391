// tests/watch_single.rs

use std::sync::Arc;
use std::time::Duration;

use trialwatch::errors::{ActionError, HandlerError, ResolveError};
use trialwatch::flows::jira::JiraSudo;
use trialwatch::page::{HandlerId, Locator, ObservableTarget, Page, PageRef};
use trialwatch::watch::{Cause, Scope, WatchError, Watcher, run_watch};
use trialwatch_test_utils::fixtures;
use trialwatch_test_utils::resolvers::{MissingSecret, StaticSecret};
use trialwatch_test_utils::{Action, FakePage, init_tracing, with_timeout};

const FIELD: &str = "//input[@name='field']";

/// Fills the matched field with `value`.
fn fill_watcher(page: &Arc<FakePage>, value: &'static str) -> Watcher {
    let page = Arc::clone(page);
    Watcher::new("fill", Locator::new(FIELD), move |_scope: Scope, field: Locator| {
        let page = Arc::clone(&page);
        async move {
            page.fill(&field, value).await?;
            Ok::<(), HandlerError>(())
        }
    })
}

#[tokio::test]
async fn test_successful_reaction_completes_and_deregisters() {
    init_tracing();
    let page = FakePage::shared();
    let watcher = fill_watcher(&page, "hello");
    let scope = Scope::root();

    let (res, ()) = with_timeout(async {
        tokio::join!(run_watch(page.as_ref(), &watcher, &scope), async {
            tokio::task::yield_now().await;
            page.show(FIELD);
        })
    })
    .await;

    assert!(res.is_ok(), "expected success, got {res:?}");
    assert_eq!(page.registered(), 0);
    assert_eq!(page.value_of(FIELD).as_deref(), Some("hello"));
    assert_eq!(page.invocations(FIELD), 1);

    // The pattern matching again must not reach the finished watcher.
    page.hide(FIELD);
    page.show(FIELD);
    tokio::task::yield_now().await;
    assert_eq!(page.invocations(FIELD), 1);
    // The parent is untouched by the watcher finishing.
    assert!(!scope.is_cancelled());
}

#[tokio::test]
async fn test_pattern_visible_before_registration_still_fires() {
    let page = FakePage::shared();
    page.show(FIELD);
    let watcher = fill_watcher(&page, "early");

    let res = with_timeout(run_watch(page.as_ref(), &watcher, &Scope::root())).await;

    assert!(res.is_ok());
    assert_eq!(page.value_of(FIELD).as_deref(), Some("early"));
}

#[tokio::test]
async fn test_reaction_error_is_returned_wrapped() {
    let page = FakePage::shared();
    page.show(FIELD);
    let watcher = Watcher::new("reject", Locator::new(FIELD), |_scope: Scope, _field: Locator| async {
        Err::<(), HandlerError>(HandlerError::Rejected {
            stage: "login",
            message: "Invalid username or password".into(),
        })
    });

    let err = with_timeout(run_watch(page.as_ref(), &watcher, &Scope::root()))
        .await
        .unwrap_err();

    assert!(!err.is_external());
    assert_eq!(err.watcher(), "reject");
    match err.handler_error() {
        Some(HandlerError::Rejected { stage, message }) => {
            assert_eq!(*stage, "login");
            assert_eq!(message, "Invalid username or password");
        }
        other => panic!("expected the reaction's Rejected error, got {other:?}"),
    }
    assert!(err.to_string().contains("Invalid username or password"));
    assert_eq!(page.registered(), 0);
}

#[tokio::test]
async fn test_parent_cancel_is_distinct_from_failure() {
    let page = FakePage::shared();
    let watcher = fill_watcher(&page, "never");
    let scope = Scope::root();

    let (res, ()) = with_timeout(async {
        tokio::join!(run_watch(page.as_ref(), &watcher, &scope), async {
            tokio::task::yield_now().await;
            scope.cancel(Cause::Canceled);
        })
    })
    .await;

    let err = res.unwrap_err();
    assert!(err.is_external());
    assert!(matches!(err.interrupt_cause(), Some(Cause::Canceled)));
    assert!(err.handler_error().is_none());
    assert_eq!(page.registered(), 0);
    assert_eq!(page.invocations(FIELD), 0);
}

#[tokio::test(start_paused = true)]
async fn test_caller_deadline_surfaces_as_deadline_exceeded() {
    let page = FakePage::shared();
    let watcher = fill_watcher(&page, "never");
    let scope = Scope::root().child_with_deadline(Duration::from_millis(300));

    let err = run_watch(page.as_ref(), &watcher, &scope).await.unwrap_err();

    assert!(matches!(
        err,
        WatchError::Interrupted { cause: Cause::DeadlineExceeded(d), .. } if d == Duration::from_millis(300)
    ));
    assert_eq!(page.registered(), 0);
}

#[tokio::test]
async fn test_suspended_reaction_is_interrupted_by_parent() {
    let page = FakePage::shared();
    page.show(FIELD);
    let watcher = Watcher::new("stuck", Locator::new(FIELD), |scope: Scope, _field: Locator| async move {
        // Suspends until the watch ends.
        scope.run_until_cancelled(std::future::pending::<()>()).await?;
        Ok::<(), HandlerError>(())
    });
    let scope = Scope::root();

    let (res, ()) = with_timeout(async {
        tokio::join!(run_watch(page.as_ref(), &watcher, &scope), async {
            while page.invocations(FIELD) == 0 {
                tokio::task::yield_now().await;
            }
            scope.cancel(Cause::Canceled);
        })
    })
    .await;

    assert!(res.unwrap_err().is_external());
}

#[tokio::test]
async fn test_dropping_the_watch_removes_the_handler() {
    let page = FakePage::shared();
    let watcher = fill_watcher(&page, "never");

    let res = tokio::time::timeout(
        Duration::from_millis(20),
        run_watch(page.as_ref(), &watcher, &Scope::root()),
    )
    .await;

    assert!(res.is_err(), "watch should still have been pending");
    assert_eq!(page.registered(), 0);
}

#[tokio::test]
async fn test_registration_failure_is_reported() {
    let page = FakePage::shared();
    page.close().await.unwrap();
    let watcher = fill_watcher(&page, "x");

    let err = run_watch(page.as_ref(), &watcher, &Scope::root())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        WatchError::Register { source: ActionError::Closed, .. }
    ));
}

#[test]
fn test_removing_unknown_or_removed_handler_is_noop() {
    let page = FakePage::new();
    page.remove_handler(HandlerId(42));
    page.remove_handler(HandlerId(42));
    assert_eq!(page.registered(), 0);
}

#[tokio::test]
async fn test_sudo_prompt_confirms_password() {
    let page = FakePage::shared();
    fixtures::jira_sudo(&page);
    let page_ref: PageRef = page.clone();
    let secret = StaticSecret::shared("jira-secret");
    let watcher = JiraSudo {
        password: secret.clone(),
    }
    .watcher(&page_ref);

    page.show(fixtures::jira_sudo_form());
    with_timeout(watcher.run(page.as_ref(), &Scope::root()))
        .await
        .unwrap();

    assert_eq!(secret.calls(), 1);
    assert!(page.actions().contains(&Action::Fill {
        locator: fixtures::jira_sudo_form()
            .child(trialwatch::flows::jira::selectors::SUDO_PASSWORD)
            .to_string(),
        value: "jira-secret".into(),
    }));
}

#[tokio::test]
async fn test_sudo_resolver_failure_names_the_step_up_stage() {
    let page = FakePage::shared();
    fixtures::jira_sudo(&page);
    let page_ref: PageRef = page.clone();
    let watcher = JiraSudo {
        password: Arc::new(MissingSecret("jira admin")),
    }
    .watcher(&page_ref);

    page.show(fixtures::jira_sudo_form());
    let err = with_timeout(watcher.run(page.as_ref(), &Scope::root()))
        .await
        .unwrap_err();

    assert_eq!(err.watcher(), "jira-websudo");
    match err.handler_error() {
        Some(HandlerError::Resolver {
            what,
            source: ResolveError::Missing(owner),
        }) => {
            assert_eq!(*what, "websudo password");
            assert_eq!(owner, "jira admin");
        }
        other => panic!("expected resolver error, got {other:?}"),
    }
    // Nothing was typed.
    assert!(page.actions().is_empty());
}
