// tests/watch_group.rs

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use trialwatch::credentials::SecretResolver;
use trialwatch::errors::HandlerError;
use trialwatch::page::{Locator, Page};
use trialwatch::watch::{Cause, GroupPolicy, Probe, Scope, WatchError, WatchGroup, Watcher, probe_absence};
use trialwatch_test_utils::resolvers::PendingSecret;
use trialwatch_test_utils::{FakePage, init_tracing, with_timeout};

const FORM: &str = "//form[@id='login']";
const USERNAME: &str = "//form[@id='login']//input[@name='username']";
const PASSWORD: &str = "//form[@id='login']//input[@name='password']";
const SUBMIT: &str = "//form[@id='login']//button";
const BANNER: &str = "//div[@class='error']";

/// Fill `field` with `value` and submit.
fn fill_and_submit(page: &Arc<FakePage>, name: &str, field: &'static str, value: &'static str) -> Watcher {
    let page = Arc::clone(page);
    Watcher::new(name, Locator::new(field), move |_scope: Scope, matched: Locator| {
        let page = Arc::clone(&page);
        async move {
            page.fill(&matched, value).await?;
            page.click(&Locator::new(SUBMIT), None).await?;
            Ok::<(), HandlerError>(())
        }
    })
}

/// Once the form is up, look for the error banner for `bound`.
fn banner_probe(page: &Arc<FakePage>, bound: Duration) -> Watcher {
    let page = Arc::clone(page);
    Watcher::new("error-banner", Locator::new(FORM), move |_scope: Scope, _form: Locator| {
        let page = Arc::clone(&page);
        async move {
            match probe_absence(page.as_ref(), &Locator::new(BANNER), bound).await? {
                Probe::Absent => Ok::<(), HandlerError>(()),
                Probe::Present(message) => Err(HandlerError::Rejected {
                    stage: "login",
                    message,
                }),
            }
        }
    })
}

fn failing(name: &str, field: &'static str) -> Watcher {
    Watcher::new(name, Locator::new(field), |_scope: Scope, _matched: Locator| async {
        Err::<(), HandlerError>(HandlerError::Parse {
            what: "field",
            value: "garbage".into(),
        })
    })
}

fn login_group(page: &Arc<FakePage>) -> WatchGroup {
    WatchGroup::new("login")
        .with(fill_and_submit(page, "username", USERNAME, "admin"))
        .with(fill_and_submit(page, "password", PASSWORD, "hunter2"))
        .with(banner_probe(page, Duration::from_millis(1000)))
}

fn render_login(page: &FakePage) {
    page.show(FORM);
    page.show(USERNAME);
    page.show(PASSWORD);
    page.show(SUBMIT);
}

#[tokio::test(start_paused = true)]
async fn test_login_group_settles_after_probe_bound() {
    init_tracing();
    let page = FakePage::shared();
    render_login(&page);
    let started = Instant::now();

    let res = with_timeout(login_group(&page).run(page.as_ref(), &Scope::root())).await;

    assert!(res.is_ok(), "expected success, got {res:?}");
    assert!(started.elapsed() >= Duration::from_millis(1000));
    assert_eq!(page.value_of(USERNAME).as_deref(), Some("admin"));
    assert_eq!(page.value_of(PASSWORD).as_deref(), Some("hunter2"));
    assert_eq!(page.clicks_on(SUBMIT), 2);
    assert_eq!(page.registered(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_login_group_reports_banner_text() {
    let page = FakePage::shared();
    render_login(&page);
    page.on_click(SUBMIT, |page| {
        page.show_with_text(BANNER, "Invalid username or password");
    });

    let err = with_timeout(login_group(&page).run(page.as_ref(), &Scope::root()))
        .await
        .unwrap_err();

    assert_eq!(err.watcher(), "error-banner");
    assert!(
        err.to_string().contains("Invalid username or password"),
        "unexpected error: {err}"
    );
    // The field watchers completed before the banner was found.
    assert_eq!(page.value_of(USERNAME).as_deref(), Some("admin"));
    assert_eq!(page.value_of(PASSWORD).as_deref(), Some("hunter2"));
    assert_eq!(page.registered(), 0);
}

#[tokio::test]
async fn test_single_failure_wins_over_completed_members() {
    let page = FakePage::shared();
    page.show(USERNAME);
    page.show(SUBMIT);
    page.show(PASSWORD);

    let group = WatchGroup::new("mixed")
        .with(fill_and_submit(&page, "username", USERNAME, "admin"))
        .with(failing("password", PASSWORD))
        .with(fill_and_submit(&page, "never", "//input[@name='never']", "x"));

    let err = with_timeout(group.run(page.as_ref(), &Scope::root()))
        .await
        .unwrap_err();

    assert!(matches!(&err, WatchError::Failed { watcher, .. } if watcher == "password"));
    assert!(matches!(
        err.handler_error(),
        Some(HandlerError::Parse { what: "field", .. })
    ));
    assert_eq!(page.registered(), 0);
}

#[tokio::test]
async fn test_failure_interrupts_pending_resolver() {
    let page = FakePage::shared();
    page.show(USERNAME);
    page.show(PASSWORD);

    let pending = {
        let page = Arc::clone(&page);
        Watcher::new("username", Locator::new(USERNAME), move |scope: Scope, field: Locator| {
            let page = Arc::clone(&page);
            async move {
                let value = scope.run_until_cancelled(PendingSecret.resolve()).await?;
                page.fill(&field, &value.map_err(|e| HandlerError::resolver("username", e))?)
                    .await?;
                Ok::<(), HandlerError>(())
            }
        })
    };
    let group = WatchGroup::new("login")
        .with(pending)
        .with(failing("password", PASSWORD));

    let err = with_timeout(group.run(page.as_ref(), &Scope::root()))
        .await
        .unwrap_err();

    assert_eq!(err.watcher(), "password");
    assert_eq!(page.invocations(USERNAME), 1);
    assert!(page.actions().is_empty());
}

#[tokio::test]
async fn test_parent_cancel_interrupts_whole_group() {
    let page = FakePage::shared();
    page.show(USERNAME);
    page.show(SUBMIT);
    let parent = Scope::root();

    let group = WatchGroup::new("login")
        .with(fill_and_submit(&page, "username", USERNAME, "admin"))
        .with(fill_and_submit(&page, "password", PASSWORD, "hunter2"));

    let (res, ()) = with_timeout(async {
        tokio::join!(group.run(page.as_ref(), &parent), async {
            while page.clicks_on(SUBMIT) == 0 {
                tokio::task::yield_now().await;
            }
            parent.cancel(Cause::Canceled);
        })
    })
    .await;

    let err = res.unwrap_err();
    assert!(err.is_external());
    assert_eq!(err.watcher(), "login");
    assert!(matches!(err.interrupt_cause(), Some(Cause::Canceled)));
    assert_eq!(page.registered(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_caller_deadline_reaches_every_member() {
    let page = FakePage::shared();
    let scope = Scope::root().child_with_deadline(Duration::from_secs(2));

    let group = WatchGroup::new("login")
        .with(fill_and_submit(&page, "username", USERNAME, "admin"))
        .with(fill_and_submit(&page, "password", PASSWORD, "hunter2"));

    let err = group.run(page.as_ref(), &scope).await.unwrap_err();

    assert!(matches!(
        err,
        WatchError::Interrupted { cause: Cause::DeadlineExceeded(_), .. }
    ));
    assert_eq!(page.registered(), 0);
}

#[tokio::test]
async fn test_first_settled_ends_on_first_success() {
    let page = FakePage::shared();
    page.show(PASSWORD);
    page.show(SUBMIT);

    let group = WatchGroup::new("either")
        .with_policy(GroupPolicy::FirstSettled)
        .with(fill_and_submit(&page, "username", USERNAME, "admin"))
        .with(fill_and_submit(&page, "password", PASSWORD, "hunter2"));

    with_timeout(group.run(page.as_ref(), &Scope::root()))
        .await
        .unwrap();

    assert_eq!(page.value_of(PASSWORD).as_deref(), Some("hunter2"));
    assert_eq!(page.registered(), 0);

    // The loser stays quiet even when its field shows up later.
    page.show(USERNAME);
    tokio::task::yield_now().await;
    assert_eq!(page.invocations(USERNAME), 0);
}

#[tokio::test]
async fn test_empty_group_settles_immediately() {
    let page = FakePage::new();
    let group = WatchGroup::new("nothing");
    assert!(group.is_empty());
    group.run(&page, &Scope::root()).await.unwrap();
}
