//! Browser automation seam: launching a browser and the page primitives the
//! site driver is written against.
//!
//! The primitives mirror what a person does on a page: go somewhere, find
//! something by its role, label, text or a CSS selector, click it, type into
//! it, and wait for the page to settle. Every call is an `.await` point bounded
//! by a timeout.

use std::time::Duration;

use async_trait::async_trait;

mod error;
mod locator;

pub use error::BrowserError;
pub use locator::{Locator, Role};

#[cfg(feature = "webdriver")]
pub mod webdriver;
#[cfg(feature = "webdriver")]
pub use webdriver::{WebDriverBrowser, WebDriverPage};

/// How far a navigation must have progressed before a wait returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    DomContentLoaded,
    Load,
    /// Load finished and no requests in flight for a short quiet period.
    NetworkIdle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Visible,
    Hidden,
}

/// Which `<option>` to pick in a `<select>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Choice {
    Label(String),
    Index(usize),
}

#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    /// Turn off the browser's own autofill and password manager so saved
    /// credentials never leak into the login form.
    pub disable_autofill: bool,
    /// Accept native `alert`/`confirm` dialogs automatically.
    pub accept_dialogs: bool,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: false,
            disable_autofill: true,
            accept_dialogs: true,
        }
    }
}

/// Starts browser instances. Each launch yields an independent page.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn launch(&self) -> Result<Box<dyn Page>, BrowserError>;
}

/// One open page in one browser instance.
///
/// Element actions wait for their target to become visible, up to the page's
/// action timeout, before acting.
#[async_trait]
pub trait Page: Send + Sync {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    async fn wait_for_load(&self, state: LoadState, timeout: Duration)
    -> Result<(), BrowserError>;

    async fn wait_for(
        &self,
        locator: &Locator,
        state: ElementState,
        timeout: Duration,
    ) -> Result<(), BrowserError>;

    async fn click(&self, locator: &Locator) -> Result<(), BrowserError>;

    async fn fill(&self, locator: &Locator, value: &str) -> Result<(), BrowserError>;

    /// Select an option and return the selected option's trimmed text.
    async fn select(&self, locator: &Locator, choice: &Choice) -> Result<String, BrowserError>;

    /// Number of matching elements, visible or not. Does not wait.
    async fn count(&self, locator: &Locator) -> Result<usize, BrowserError>;

    /// Whether any matching element is currently visible. Does not wait.
    async fn is_visible(&self, locator: &Locator) -> Result<bool, BrowserError>;

    /// Rendered text of every matching element, in document order.
    async fn texts(&self, locator: &Locator) -> Result<Vec<String>, BrowserError>;

    /// Shut the browser instance down. Calling it twice is harmless.
    async fn close(&self) -> Result<(), BrowserError>;
}
