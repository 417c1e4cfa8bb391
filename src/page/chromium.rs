// src/page/chromium.rs

//! Chrome page driver on top of `chromiumoxide` (Chrome DevTools Protocol).
//!
//! [`ChromiumBrowser`] either launches a Chrome for the run or connects to a
//! running one, and drains the CDP event handler on its own task. Each
//! [`ChromiumPage`] is one tab.
//!
//! CDP has no "locator became visible" event, so a background task per page
//! evaluates every registered locator at `poll_interval` and feeds the
//! visibility it sees into the page's [`HandlerTable`]. Handlers therefore
//! run on their own Tokio tasks, never on the task that registered them.
//!
//! Element actions auto-wait: they poll until the locator resolves to a
//! visible element or the action timeout expires ([`ActionError::Timeout`]).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser as Cdp, BrowserConfig as LaunchConfig};
use chromiumoxide::element::Element;
use chromiumoxide::error::CdpError;
use futures::StreamExt;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::BrowserConfig;
use crate::errors::ActionError;
use crate::types::MAX_DURATION;

use super::{
    Browser, ElementState, Handler, HandlerId, HandlerTable, Locator, ObservableTarget, Page,
    PageRef, xpath_literal,
};

/// `el` is rendered with a non-empty box and not hidden by style.
const IS_VISIBLE: &str = "(el) => {\
    const style = window.getComputedStyle(el);\
    if (style.visibility === 'hidden' || style.display === 'none') return false;\
    const rect = el.getBoundingClientRect();\
    return rect.width > 0 && rect.height > 0;\
}";

fn driver_error(err: CdpError) -> ActionError {
    ActionError::Driver(err.to_string())
}

/// A Chrome instance, launched or connected over CDP.
pub struct ChromiumBrowser {
    browser: Mutex<Cdp>,
    handler_task: JoinHandle<()>,
    disconnected: Arc<AtomicBool>,
    config: BrowserConfig,
}

impl std::fmt::Debug for ChromiumBrowser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumBrowser")
            .field("connect_url", &self.config.connect_url)
            .field("disconnected", &self.disconnected.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl ChromiumBrowser {
    /// Connect to `config.connect_url`, or launch Chrome when it is unset.
    pub async fn start(config: BrowserConfig) -> Result<Self, ActionError> {
        let (browser, mut handler) = match &config.connect_url {
            Some(url) => {
                let ws_url = devtools_ws_url(url).await?;
                info!(%ws_url, "connecting to chrome");
                Cdp::connect(ws_url).await.map_err(driver_error)?
            }
            None => {
                info!(headful = config.headful, "launching chrome");
                Cdp::launch(launch_config(&config)?).await.map_err(driver_error)?
            }
        };

        let disconnected = Arc::new(AtomicBool::new(false));
        let handler_task = {
            let disconnected = Arc::clone(&disconnected);
            tokio::spawn(async move {
                while let Some(event) = handler.next().await {
                    if let Err(err) = event {
                        debug!(error = %err, "cdp handler event error");
                    }
                }
                disconnected.store(true, Ordering::Release);
                debug!("cdp connection closed");
            })
        };

        Ok(Self {
            browser: Mutex::new(browser),
            handler_task,
            disconnected,
            config,
        })
    }

    /// Close the browser (or the connection to it) and stop the handler task.
    pub async fn close(&self) {
        let mut browser = self.browser.lock().await;
        if self.config.connect_url.is_none() {
            if let Err(err) = browser.close().await {
                warn!(error = %err, "closing chrome");
            }
            if let Err(err) = browser.wait().await {
                warn!(error = %err, "waiting for chrome to exit");
            }
        }
        self.handler_task.abort();
    }
}

fn launch_config(config: &BrowserConfig) -> Result<LaunchConfig, ActionError> {
    let mut builder = LaunchConfig::builder();
    if config.headful {
        builder = builder.with_head();
    }
    if let Some(executable) = &config.executable {
        builder = builder.chrome_executable(executable);
    }
    builder
        .build()
        .map_err(|e| ActionError::Driver(format!("chrome launch config: {e}")))
}

/// Resolve an `http(s)://host:port` DevTools endpoint to its websocket URL.
/// `ws(s)://` URLs are used as they are.
async fn devtools_ws_url(url: &str) -> Result<String, ActionError> {
    if url.starts_with("ws://") || url.starts_with("wss://") {
        return Ok(url.to_string());
    }
    let version: Value = reqwest::get(format!("{url}/json/version"))
        .await
        .map_err(|e| ActionError::Driver(format!("querying {url}/json/version: {e}")))?
        .json()
        .await
        .map_err(|e| ActionError::Driver(format!("decoding {url}/json/version: {e}")))?;
    version
        .get("webSocketDebuggerUrl")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ActionError::Driver(format!("{url}/json/version has no webSocketDebuggerUrl")))
}

#[async_trait]
impl Browser for ChromiumBrowser {
    async fn new_page(&self) -> Result<PageRef, ActionError> {
        if self.disconnected.load(Ordering::Acquire) {
            return Err(ActionError::Closed);
        }
        let page = self
            .browser
            .lock()
            .await
            .new_page("about:blank")
            .await
            .map_err(driver_error)?;
        debug!("opened chrome tab");
        Ok(Arc::new(ChromiumPage::start(
            page,
            Arc::clone(&self.disconnected),
            &self.config,
        )))
    }
}

/// JavaScript string literal for `s`.
fn js_string(s: &str) -> String {
    Value::from(s).to_string()
}

/// Expression evaluating `locator` to an ordered node snapshot.
fn xpath_snapshot(locator: &Locator) -> String {
    format!(
        "document.evaluate({}, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null)",
        js_string(locator.as_str())
    )
}

/// Script reporting how many nodes match `locator` and which one is the
/// first visible element.
fn matches_script(locator: &Locator) -> String {
    format!(
        "(() => {{\
            const found = {snapshot};\
            const isVisible = {IS_VISIBLE};\
            let visible = null;\
            for (let i = 0; i < found.snapshotLength; i++) {{\
                const el = found.snapshotItem(i);\
                if (el.nodeType === Node.ELEMENT_NODE && isVisible(el)) {{ visible = i; break; }}\
            }}\
            return {{ count: found.snapshotLength, visible }};\
        }})()",
        snapshot = xpath_snapshot(locator),
    )
}

/// Script running `body` (a function body over `el`) on match `index` of
/// `locator`.
fn element_script(locator: &Locator, index: usize, body: &str) -> String {
    format!(
        "(() => {{\
            const el = {snapshot}.snapshotItem({index});\
            if (!el) return {{ found: false, value: null }};\
            return {{ found: true, value: ((el) => {{ {body} }})(el) }};\
        }})()",
        snapshot = xpath_snapshot(locator),
    )
}

#[derive(Debug, Default, Deserialize)]
struct Matches {
    count: usize,
    visible: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct ElementReply<T> {
    found: bool,
    value: Option<T>,
}

async fn evaluate<T: DeserializeOwned>(page: &chromiumoxide::Page, script: String) -> Result<T, ActionError> {
    page.evaluate(script)
        .await
        .map_err(driver_error)?
        .into_value::<T>()
        .map_err(|e| ActionError::Driver(format!("decoding script result: {e}")))
}

async fn matches(page: &chromiumoxide::Page, locator: &Locator) -> Result<Matches, ActionError> {
    evaluate(page, matches_script(locator)).await
}

/// A Chrome tab.
pub struct ChromiumPage {
    page: chromiumoxide::Page,
    handlers: Arc<HandlerTable>,
    poll_interval: Duration,
    action_timeout: Duration,
    closed: AtomicBool,
    disconnected: Arc<AtomicBool>,
    poller: CancellationToken,
}

impl std::fmt::Debug for ChromiumPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChromiumPage")
            .field("handlers", &self.handlers)
            .field("closed", &self.closed.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Drop for ChromiumPage {
    fn drop(&mut self) {
        self.poller.cancel();
    }
}

impl ChromiumPage {
    fn start(page: chromiumoxide::Page, disconnected: Arc<AtomicBool>, config: &BrowserConfig) -> Self {
        let handlers = Arc::new(HandlerTable::new());
        let poller = CancellationToken::new();

        tokio::spawn(poll_handlers(
            page.clone(),
            Arc::clone(&handlers),
            Arc::clone(&disconnected),
            config.poll_interval,
            poller.clone(),
        ));

        Self {
            page,
            handlers,
            poll_interval: config.poll_interval,
            action_timeout: config.action_timeout,
            closed: AtomicBool::new(false),
            disconnected,
            poller,
        }
    }

    fn ensure_open(&self) -> Result<(), ActionError> {
        if self.closed.load(Ordering::Acquire) || self.disconnected.load(Ordering::Acquire) {
            return Err(ActionError::Closed);
        }
        Ok(())
    }

    fn deadline(&self, timeout: Option<Duration>) -> (Instant, Duration) {
        let after = timeout.unwrap_or(self.action_timeout).min(MAX_DURATION);
        (Instant::now() + after, after)
    }

    async fn pause_until(&self, deadline: Instant, locator: &Locator, after: Duration) -> Result<(), ActionError> {
        let now = Instant::now();
        if now >= deadline {
            return Err(ActionError::Timeout {
                what: locator.to_string(),
                after,
            });
        }
        tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        Ok(())
    }

    /// Poll until `locator` has a visible match; returns its index.
    async fn wait_visible(&self, locator: &Locator, timeout: Option<Duration>) -> Result<usize, ActionError> {
        let (deadline, after) = self.deadline(timeout);
        loop {
            self.ensure_open()?;
            if let Some(index) = matches(&self.page, locator).await?.visible {
                return Ok(index);
            }
            self.pause_until(deadline, locator, after).await?;
        }
    }

    async fn wait_hidden(&self, locator: &Locator, timeout: Option<Duration>) -> Result<(), ActionError> {
        let (deadline, after) = self.deadline(timeout);
        loop {
            self.ensure_open()?;
            if matches(&self.page, locator).await?.visible.is_none() {
                return Ok(());
            }
            self.pause_until(deadline, locator, after).await?;
        }
    }

    /// Poll until `locator` matches anything, visible or not.
    async fn wait_attached(&self, locator: &Locator) -> Result<(), ActionError> {
        let (deadline, after) = self.deadline(None);
        loop {
            self.ensure_open()?;
            if matches(&self.page, locator).await?.count > 0 {
                return Ok(());
            }
            self.pause_until(deadline, locator, after).await?;
        }
    }

    /// Run `body` on match `index` of `locator`.
    async fn on_element<T: DeserializeOwned>(
        &self,
        locator: &Locator,
        index: usize,
        body: &str,
    ) -> Result<T, ActionError> {
        let reply: ElementReply<T> = evaluate(&self.page, element_script(locator, index, body)).await?;
        if !reply.found {
            return Err(ActionError::NotFound(locator.to_string()));
        }
        reply
            .value
            .ok_or_else(|| ActionError::Driver(format!("script on {locator} returned nothing")))
    }

    /// Run `op` on the visible match of `locator`, retrying until the
    /// deadline while the element is re-rendered or not ready for input.
    async fn interact<F, Fut>(&self, locator: &Locator, timeout: Option<Duration>, op: F) -> Result<(), ActionError>
    where
        F: Fn(Element, usize) -> Fut,
        Fut: std::future::Future<Output = Result<(), ActionError>>,
    {
        let (deadline, after) = self.deadline(timeout);
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            let index = self.wait_visible(locator, Some(remaining)).await.map_err(|err| match err {
                ActionError::Timeout { what, .. } => ActionError::Timeout { what, after },
                other => other,
            })?;
            let attempt = match self.page.find_xpath(locator.nth(index).as_str()).await {
                Ok(element) => op(element, index).await,
                Err(err) => Err(driver_error(err)),
            };
            match attempt {
                Ok(()) => return Ok(()),
                Err(err) if Instant::now() < deadline => {
                    trace!(%locator, error = %err, "element not ready; retrying");
                    self.ensure_open()?;
                    self.pause_until(deadline, locator, after).await?;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl ObservableTarget for ChromiumPage {
    fn add_handler(&self, locator: Locator, handler: Handler) -> Result<HandlerId, ActionError> {
        self.ensure_open()?;
        Ok(self.handlers.insert(locator, handler))
    }

    fn remove_handler(&self, id: HandlerId) {
        self.handlers.remove(id);
    }
}

#[async_trait]
impl Page for ChromiumPage {
    async fn goto(&self, url: &str) -> Result<(), ActionError> {
        self.ensure_open()?;
        debug!(%url, "navigating");
        self.page.goto(url).await.map_err(driver_error)?;
        Ok(())
    }

    async fn url(&self) -> Result<String, ActionError> {
        self.ensure_open()?;
        Ok(self.page.url().await.map_err(driver_error)?.unwrap_or_default())
    }

    async fn fill(&self, locator: &Locator, value: &str) -> Result<(), ActionError> {
        self.interact(locator, None, |element, index| async move {
            element.click().await.map_err(driver_error)?;
            let _: bool = self
                .on_element(
                    locator,
                    index,
                    "el.value = '';\
                     el.dispatchEvent(new Event('input', { bubbles: true }));\
                     return true;",
                )
                .await?;
            element.type_str(value).await.map_err(driver_error)?;
            Ok(())
        })
        .await
    }

    async fn click(&self, locator: &Locator, timeout: Option<Duration>) -> Result<(), ActionError> {
        self.interact(locator, timeout, |element, _| async move {
            element.click().await.map_err(driver_error)?;
            Ok(())
        })
        .await
    }

    async fn check(&self, locator: &Locator) -> Result<(), ActionError> {
        // Styled checkboxes are often not rendered themselves; toggle through
        // the DOM instead of a pointer click.
        self.wait_attached(locator).await?;
        let _: bool = self
            .on_element(locator, 0, "if (!el.checked) el.click(); return true;")
            .await?;
        Ok(())
    }

    async fn select_option(&self, locator: &Locator, value: &str) -> Result<(), ActionError> {
        let literal = xpath_literal(value);
        let option = locator.child(&format!(
            "/option[@value={literal} or normalize-space(.)={literal}]"
        ));
        self.wait_attached(&option).await?;
        let _: bool = self
            .on_element(
                &option,
                0,
                "el.selected = true;\
                 el.parentElement.dispatchEvent(new Event('change', { bubbles: true }));\
                 return true;",
            )
            .await?;
        Ok(())
    }

    async fn wait_for(
        &self,
        locator: &Locator,
        state: ElementState,
        timeout: Option<Duration>,
    ) -> Result<(), ActionError> {
        match state {
            ElementState::Visible => self.wait_visible(locator, timeout).await.map(|_| ()),
            ElementState::Hidden => self.wait_hidden(locator, timeout).await,
        }
    }

    async fn inner_text(
        &self,
        locator: &Locator,
        timeout: Option<Duration>,
    ) -> Result<String, ActionError> {
        let index = self.wait_visible(locator, timeout).await?;
        self.on_element(locator, index, "return el.innerText ?? '';").await
    }

    async fn text_content(&self, locator: &Locator) -> Result<String, ActionError> {
        self.wait_attached(locator).await?;
        self.on_element(locator, 0, "return el.textContent ?? '';").await
    }

    async fn input_value(&self, locator: &Locator) -> Result<String, ActionError> {
        self.wait_attached(locator).await?;
        self.on_element(locator, 0, "return el.value ?? '';").await
    }

    async fn count(&self, locator: &Locator) -> Result<usize, ActionError> {
        self.ensure_open()?;
        Ok(matches(&self.page, locator).await?.count)
    }

    async fn close(&self) -> Result<(), ActionError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.poller.cancel();
        if self.disconnected.load(Ordering::Acquire) {
            return Ok(());
        }
        debug!("closing chrome tab");
        self.page.clone().close().await.map_err(driver_error)
    }
}

/// Feed the visibility of every registered locator into `handlers` until
/// `stop` fires or the connection goes away.
async fn poll_handlers(
    page: chromiumoxide::Page,
    handlers: Arc<HandlerTable>,
    disconnected: Arc<AtomicBool>,
    poll_interval: Duration,
    stop: CancellationToken,
) {
    debug!(?poll_interval, "handler poller started");
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(poll_interval) => {}
        }
        if disconnected.load(Ordering::Acquire) {
            warn!("chrome connection gone; stopping handler poller");
            return;
        }

        for (id, locator) in handlers.snapshot() {
            if stop.is_cancelled() {
                break;
            }
            match matches(&page, &locator).await {
                Ok(found) => {
                    if let Some(dispatch) = handlers.observe(id, found.visible.is_some()) {
                        dispatch.spawn();
                    }
                }
                Err(err) => trace!(handler = %id, %locator, error = %err, "visibility check failed"),
            }
        }
    }
    debug!("handler poller stopped");
}
