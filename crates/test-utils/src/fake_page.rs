use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;

use trialwatch::errors::ActionError;
use trialwatch::page::{
    Browser, ElementState, Handler, HandlerFuture, HandlerId, HandlerTable, Locator,
    ObservableTarget, Page, PageRef,
};

/// Something a test did to a [`FakePage`], in call order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Goto(String),
    Fill { locator: String, value: String },
    Click(String),
    Check(String),
    Select { locator: String, value: String },
}

#[derive(Debug, Clone)]
struct Element {
    visible: bool,
    text: String,
    value: String,
    checked: bool,
    count: usize,
}

impl Element {
    fn new(visible: bool) -> Self {
        Self {
            visible,
            text: String::new(),
            value: String::new(),
            checked: false,
            count: 1,
        }
    }
}

type Hook = Arc<dyn Fn(&FakePage) + Send + Sync>;

#[derive(Default)]
struct State {
    url: String,
    closed: bool,
    elements: HashMap<String, Element>,
    failures: HashMap<String, ActionError>,
    click_hooks: HashMap<String, Hook>,
    goto_hooks: HashMap<String, Hook>,
    actions: Vec<Action>,
}

/// In-memory [`Page`] keyed by exact locator strings.
///
/// - Elements are shown/hidden by the test; showing an element fires the
///   handlers registered on the same locator through a real
///   [`HandlerTable`], on their own tasks.
/// - Actions wait (on a change notification, not by polling) for the element
///   state they need, up to the action timeout, and are recorded in order.
/// - Click and navigation hooks let a test script page transitions.
pub struct FakePage {
    handlers: HandlerTable,
    state: Mutex<State>,
    changed: watch::Sender<u64>,
    invocations: Arc<Mutex<HashMap<String, usize>>>,
    action_timeout: Duration,
}

impl Default for FakePage {
    fn default() -> Self {
        Self::new()
    }
}

impl FakePage {
    pub fn new() -> Self {
        Self::with_action_timeout(Duration::from_secs(5))
    }

    pub fn with_action_timeout(action_timeout: Duration) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            handlers: HandlerTable::new(),
            state: Mutex::new(State::default()),
            changed,
            invocations: Arc::default(),
            action_timeout,
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    fn notify(&self) {
        self.changed.send_modify(|v| *v += 1);
    }

    // ---- scripting -------------------------------------------------------

    /// Make `locator` visible, firing its handlers on a rising edge.
    pub fn show(&self, locator: impl Into<Locator>) {
        self.set_visible(locator.into(), true);
    }

    pub fn show_with_text(&self, locator: impl Into<Locator>, text: &str) {
        let locator = locator.into();
        self.element(&locator, |el| el.text = text.to_string());
        self.set_visible(locator, true);
    }

    /// Keep the element attached but not displayed.
    pub fn hide(&self, locator: impl Into<Locator>) {
        self.set_visible(locator.into(), false);
    }

    /// Attach a hidden element (e.g. a styled checkbox).
    pub fn attach(&self, locator: impl Into<Locator>) {
        let locator = locator.into();
        self.element(&locator, |_| {});
    }

    /// Detach the element entirely.
    pub fn remove(&self, locator: impl Into<Locator>) {
        let locator = locator.into();
        self.lock().elements.remove(locator.as_str());
        self.observe(&locator, false);
        self.notify();
    }

    pub fn set_text(&self, locator: impl Into<Locator>, text: &str) {
        self.element(&locator.into(), |el| el.text = text.to_string());
    }

    pub fn set_value(&self, locator: impl Into<Locator>, value: &str) {
        self.element(&locator.into(), |el| el.value = value.to_string());
    }

    pub fn set_count(&self, locator: impl Into<Locator>, count: usize) {
        self.element(&locator.into(), |el| el.count = count);
    }

    pub fn set_url(&self, url: &str) {
        self.lock().url = url.to_string();
        self.notify();
    }

    /// Every action on `locator` fails with `err` from now on.
    pub fn fail_on(&self, locator: impl Into<Locator>, err: ActionError) {
        self.lock().failures.insert(locator.into().to_string(), err);
    }

    /// Run `hook` after every successful click on `locator`.
    pub fn on_click(&self, locator: impl Into<Locator>, hook: impl Fn(&FakePage) + Send + Sync + 'static) {
        self.lock()
            .click_hooks
            .insert(locator.into().to_string(), Arc::new(hook));
    }

    /// Run `hook` after every navigation to exactly `url`.
    pub fn on_goto(&self, url: &str, hook: impl Fn(&FakePage) + Send + Sync + 'static) {
        self.lock().goto_hooks.insert(url.to_string(), Arc::new(hook));
    }

    // ---- inspection ------------------------------------------------------

    pub fn actions(&self) -> Vec<Action> {
        self.lock().actions.clone()
    }

    pub fn clicks_on(&self, locator: impl Into<Locator>) -> usize {
        let locator = locator.into().to_string();
        self.lock()
            .actions
            .iter()
            .filter(|a| matches!(a, Action::Click(l) if *l == locator))
            .count()
    }

    pub fn value_of(&self, locator: impl Into<Locator>) -> Option<String> {
        self.lock()
            .elements
            .get(locator.into().as_str())
            .map(|el| el.value.clone())
    }

    pub fn is_checked(&self, locator: impl Into<Locator>) -> bool {
        self.lock()
            .elements
            .get(locator.into().as_str())
            .is_some_and(|el| el.checked)
    }

    /// How many times handlers registered on `locator` were invoked.
    pub fn invocations(&self, locator: impl Into<Locator>) -> usize {
        self.invocations
            .lock()
            .unwrap()
            .get(locator.into().as_str())
            .copied()
            .unwrap_or(0)
    }

    /// Number of live handler registrations.
    pub fn registered(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    // ---- internals -------------------------------------------------------

    fn element(&self, locator: &Locator, f: impl FnOnce(&mut Element)) {
        {
            let mut state = self.lock();
            let el = state
                .elements
                .entry(locator.to_string())
                .or_insert_with(|| Element::new(false));
            f(el);
        }
        self.notify();
    }

    fn set_visible(&self, locator: Locator, visible: bool) {
        self.element(&locator, |el| el.visible = visible);
        self.observe(&locator, visible);
    }

    fn observe(&self, locator: &Locator, visible: bool) {
        for dispatch in self.handlers.observe_locator(locator, visible) {
            dispatch.spawn();
        }
    }

    fn record(&self, action: Action) {
        self.lock().actions.push(action);
    }

    fn check_open(&self, locator: Option<&Locator>) -> Result<(), ActionError> {
        let state = self.lock();
        if state.closed {
            return Err(ActionError::Closed);
        }
        if let Some(err) = locator.and_then(|l| state.failures.get(l.as_str())) {
            return Err(err.clone());
        }
        Ok(())
    }

    /// Wait until `pred` holds for the element behind `locator`.
    async fn wait_until(
        &self,
        locator: &Locator,
        timeout: Option<Duration>,
        pred: impl Fn(Option<&Element>) -> bool,
    ) -> Result<(), ActionError> {
        let after = timeout.unwrap_or(self.action_timeout);
        let deadline = Instant::now() + after;
        let mut rx = self.changed.subscribe();
        loop {
            self.check_open(Some(locator))?;
            let ready = pred(self.lock().elements.get(locator.as_str()));
            if ready {
                return Ok(());
            }
            match tokio::time::timeout_at(deadline, rx.changed()).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) | Err(_) => {
                    return Err(ActionError::Timeout {
                        what: locator.to_string(),
                        after,
                    });
                }
            }
        }
    }

    async fn wait_visible(&self, locator: &Locator, timeout: Option<Duration>) -> Result<(), ActionError> {
        self.wait_until(locator, timeout, |el| el.is_some_and(|el| el.visible))
            .await
    }

    async fn wait_attached(&self, locator: &Locator) -> Result<(), ActionError> {
        self.wait_until(locator, None, |el| el.is_some()).await
    }

    fn run_hook(&self, hook: Option<Hook>) {
        if let Some(hook) = hook {
            hook(self);
        }
    }
}

impl ObservableTarget for FakePage {
    fn add_handler(&self, locator: Locator, handler: Handler) -> Result<HandlerId, ActionError> {
        self.check_open(None)?;

        let key = locator.to_string();
        let counts = Arc::clone(&self.invocations);
        let counted_key = key.clone();
        let counted: Handler = Arc::new(move |matched: Locator| -> HandlerFuture {
            *counts.lock().unwrap().entry(counted_key.clone()).or_default() += 1;
            handler(matched)
        });

        let id = self.handlers.insert(locator.clone(), counted);
        let visible = self
            .lock()
            .elements
            .get(key.as_str())
            .is_some_and(|el| el.visible);
        if visible {
            if let Some(dispatch) = self.handlers.observe(id, true) {
                dispatch.spawn();
            }
        }
        Ok(id)
    }

    fn remove_handler(&self, id: HandlerId) {
        self.handlers.remove(id);
    }
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &str) -> Result<(), ActionError> {
        self.check_open(None)?;
        let hook = {
            let mut state = self.lock();
            state.url = url.to_string();
            state.actions.push(Action::Goto(url.to_string()));
            state.goto_hooks.get(url).cloned()
        };
        self.notify();
        self.run_hook(hook);
        Ok(())
    }

    async fn url(&self) -> Result<String, ActionError> {
        self.check_open(None)?;
        Ok(self.lock().url.clone())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<(), ActionError> {
        self.wait_visible(locator, None).await?;
        self.element(locator, |el| el.value = value.to_string());
        self.record(Action::Fill {
            locator: locator.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn click(&self, locator: &Locator, timeout: Option<Duration>) -> Result<(), ActionError> {
        self.wait_visible(locator, timeout).await?;
        let hook = {
            let mut state = self.lock();
            state.actions.push(Action::Click(locator.to_string()));
            state.click_hooks.get(locator.as_str()).cloned()
        };
        self.run_hook(hook);
        Ok(())
    }

    async fn check(&self, locator: &Locator) -> Result<(), ActionError> {
        self.wait_attached(locator).await?;
        self.element(locator, |el| el.checked = true);
        self.record(Action::Check(locator.to_string()));
        Ok(())
    }

    async fn select_option(&self, locator: &Locator, value: &str) -> Result<(), ActionError> {
        self.wait_attached(locator).await?;
        self.element(locator, |el| el.value = value.to_string());
        self.record(Action::Select {
            locator: locator.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn wait_for(
        &self,
        locator: &Locator,
        state: ElementState,
        timeout: Option<Duration>,
    ) -> Result<(), ActionError> {
        match state {
            ElementState::Visible => self.wait_visible(locator, timeout).await,
            ElementState::Hidden => {
                self.wait_until(locator, timeout, |el| !el.is_some_and(|el| el.visible))
                    .await
            }
        }
    }

    async fn inner_text(
        &self,
        locator: &Locator,
        timeout: Option<Duration>,
    ) -> Result<String, ActionError> {
        self.wait_visible(locator, timeout).await?;
        Ok(self.text_of(locator))
    }

    async fn text_content(&self, locator: &Locator) -> Result<String, ActionError> {
        self.wait_attached(locator).await?;
        Ok(self.text_of(locator))
    }

    async fn input_value(&self, locator: &Locator) -> Result<String, ActionError> {
        self.wait_attached(locator).await?;
        Ok(self.value_of(locator.clone()).unwrap_or_default())
    }

    async fn count(&self, locator: &Locator) -> Result<usize, ActionError> {
        self.check_open(Some(locator))?;
        Ok(self
            .lock()
            .elements
            .get(locator.as_str())
            .map_or(0, |el| el.count))
    }

    async fn close(&self) -> Result<(), ActionError> {
        self.lock().closed = true;
        self.notify();
        Ok(())
    }
}

impl FakePage {
    fn text_of(&self, locator: &Locator) -> String {
        self.lock()
            .elements
            .get(locator.as_str())
            .map(|el| el.text.clone())
            .unwrap_or_default()
    }
}

/// Hands out queued [`FakePage`]s (fresh ones once the queue is empty) and
/// counts how many pages were opened.
#[derive(Default)]
pub struct FakeBrowser {
    queued: Mutex<VecDeque<Arc<FakePage>>>,
    opened: AtomicUsize,
    fail_next: Mutex<Option<ActionError>>,
}

impl FakeBrowser {
    pub fn new() -> Self {
        Self::default()
    }

    /// `page` is returned by the next `new_page` call.
    pub fn queue(&self, page: Arc<FakePage>) {
        self.queued.lock().unwrap().push_back(page);
    }

    pub fn fail_next_open(&self, err: ActionError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn new_page(&self) -> Result<PageRef, ActionError> {
        if let Some(err) = self.fail_next.lock().unwrap().take() {
            return Err(err);
        }
        // Yield so concurrent first openers really overlap.
        tokio::task::yield_now().await;
        self.opened.fetch_add(1, Ordering::SeqCst);
        let page = self
            .queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(FakePage::shared);
        Ok(page)
    }
}
