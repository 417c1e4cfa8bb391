// src/page/mod.rs

//! The observable surface the watchers run against.
//!
//! - [`ObservableTarget`] is all the watch core needs: register a handler for
//!   a [`Locator`] and remove it again.
//! - [`Page`] adds the field-level actions reactions perform.
//! - [`Browser`] opens pages.
//!
//! [`handlers`] holds the registry shared by page implementations and
//! [`chromium`] is the production driver. Tests use the fake page from the
//! `trialwatch-test-utils` crate.

pub mod chromium;
pub mod handlers;

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::ActionError;

pub use handlers::{Dispatch, HandlerTable};
pub use chromium::{ChromiumBrowser, ChromiumPage};

/// An XPath expression identifying a UI state of interest.
///
/// Immutable and cheap to clone.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator(Arc<str>);

impl Locator {
    pub fn new(xpath: impl AsRef<str>) -> Self {
        Self(Arc::from(xpath.as_ref()))
    }

    /// Descend into `relative`, which must start with `/` or `//`.
    pub fn child(&self, relative: &str) -> Self {
        Self::new(format!("{}{}", self.0, relative))
    }

    /// The `index`-th (zero based) match of this locator.
    pub fn nth(&self, index: usize) -> Self {
        Self::new(format!("({})[{}]", self.0, index + 1))
    }

    pub fn first(&self) -> Self {
        self.nth(0)
    }

    /// First match of either `self` or `other`, in document order.
    pub fn or(&self, other: &Locator) -> Self {
        Self::new(format!("({} | {})[1]", self.0, other.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Locator {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Locator {
    fn from(s: String) -> Self {
        Self(Arc::from(s))
    }
}

/// Quote `value` as an XPath string literal.
///
/// XPath 1.0 has no escape sequences, so values holding both quote kinds are
/// spliced together with `concat()`.
pub fn xpath_literal(value: &str) -> String {
    if !value.contains('"') {
        return format!("\"{value}\"");
    }
    if !value.contains('\'') {
        return format!("'{value}'");
    }
    let parts: Vec<String> = value
        .split('"')
        .map(|part| format!("\"{part}\""))
        .collect();
    format!("concat({})", parts.join(", '\"', "))
}

/// Element states `wait_for` can wait on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Visible,
    Hidden,
}

/// Boxed future returned by a [`Handler`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Callback a target invokes when a registered locator becomes visible.
pub type Handler = Arc<dyn Fn(Locator) -> HandlerFuture + Send + Sync>;

/// Identifies one registration on a target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u64);

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Something that can notify when a locator appears.
///
/// Implementations must tolerate concurrent registration and removal from
/// multiple tasks.
pub trait ObservableTarget: Send + Sync {
    /// Invoke `handler` asynchronously each time `locator` appears, until
    /// removed.
    fn add_handler(&self, locator: Locator, handler: Handler) -> Result<HandlerId, ActionError>;

    /// Remove a registration. Removing an unknown or already removed id is a
    /// no-op.
    fn remove_handler(&self, id: HandlerId);
}

/// Field-level actions on a rendered page.
///
/// Actions that take an element wait for it to become visible first, up to
/// `timeout` or the implementation's default action timeout.
#[async_trait]
pub trait Page: ObservableTarget {
    async fn goto(&self, url: &str) -> Result<(), ActionError>;

    async fn url(&self) -> Result<String, ActionError>;

    async fn fill(&self, locator: &Locator, value: &str) -> Result<(), ActionError>;

    async fn click(&self, locator: &Locator, timeout: Option<Duration>) -> Result<(), ActionError>;

    /// Tick a checkbox unless it is already ticked.
    async fn check(&self, locator: &Locator) -> Result<(), ActionError>;

    /// Pick the option of a `<select>` whose value or label is `value`.
    async fn select_option(&self, locator: &Locator, value: &str) -> Result<(), ActionError>;

    async fn wait_for(
        &self,
        locator: &Locator,
        state: ElementState,
        timeout: Option<Duration>,
    ) -> Result<(), ActionError>;

    /// Rendered text of a visible element.
    async fn inner_text(
        &self,
        locator: &Locator,
        timeout: Option<Duration>,
    ) -> Result<String, ActionError>;

    /// Raw text content of an attached element, visible or not.
    async fn text_content(&self, locator: &Locator) -> Result<String, ActionError>;

    async fn input_value(&self, locator: &Locator) -> Result<String, ActionError>;

    /// Number of attached elements matching `locator`, without waiting.
    async fn count(&self, locator: &Locator) -> Result<usize, ActionError>;

    async fn close(&self) -> Result<(), ActionError>;
}

/// Shared handle to a page.
pub type PageRef = Arc<dyn Page>;

/// Opens pages.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn new_page(&self) -> Result<PageRef, ActionError>;
}
