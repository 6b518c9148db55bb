//! Browsing session capability.
//!
//! Everything the scrape loop needs from a browser goes through
//! [`BrowsingSession`]. The chromiumoxide-backed implementation lives in
//! [`crate::browser`]; tests drive the pipeline with [`fake::FakeSession`].

use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

/// A clickable element found by [`BrowsingSession::find_clickable_by_text`].
///
/// `selector` is opaque to callers and only meaningful to the session that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Control {
    pub selector: String,
    pub label: String,
    pub enabled: bool,
    pub displayed: bool,
}

impl Control {
    pub fn is_usable(&self) -> bool {
        self.enabled && self.displayed
    }
}

#[allow(async_fn_in_trait)]
pub trait BrowsingSession {
    /// Navigates to `url`. Errors on navigation failure or timeout.
    async fn navigate(&mut self, url: &str) -> Result<()>;

    /// Polls until an element with `tag` exists. `Ok(false)` on timeout.
    async fn wait_for_element(&mut self, tag: &str, timeout: Duration) -> Result<bool>;

    /// Serialized HTML of the document currently shown.
    async fn current_document_html(&mut self) -> Result<String>;

    /// Every `a`/`button` whose text, or `a` whose aria-label, contains
    /// `text`, in document order.
    async fn find_clickable_by_text(&mut self, text: &str) -> Result<Vec<Control>>;

    /// Programmatic click that bypasses hit-testing.
    async fn click(&mut self, control: &Control) -> Result<()>;

    /// Picks `value` in the `<select name=...>` element. `Ok(false)` when
    /// the element does not show up within `timeout`.
    async fn select_option(&mut self, name: &str, value: &str, timeout: Duration) -> Result<bool>;

    /// Releases the browser. Failures are logged, never returned.
    async fn close(&mut self);
}
