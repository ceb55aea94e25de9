//! UI automation surface consumed by the sync pipeline.
//!
//! The pipeline never talks to a browser directly. It drives a [`PortalPage`]
//! through element [`Locator`]s taken from configuration, inside a [`Scope`]
//! that is either the outer page or one resolved frame. Every operation is a
//! single awaited step; waiting and retry policy live in `sync::frames`.

#[cfg(feature = "browser")]
pub mod chromium;

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::credentials::StoredCookie;

/// Element descriptor: a CSS selector, optionally narrowed to elements whose
/// normalized text contains `text`, then optionally descending into `child`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locator {
    pub css: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child: Option<String>,
}

impl Locator {
    pub fn css(css: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            text: None,
            child: None,
        }
    }

    /// Any element of `css` whose text contains `text`.
    pub fn with_text(css: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            css: css.into(),
            text: Some(text.into()),
            child: None,
        }
    }

    /// Shorthand for "an element showing this text", like a menu entry.
    pub fn text(text: impl Into<String>) -> Self {
        Self::with_text("a, li, span, button, td", text)
    }

    pub fn child(mut self, css: impl Into<String>) -> Self {
        self.child = Some(css.into());
        self
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "`{}`", self.css)?;
        if let Some(text) = &self.text {
            write!(f, " containing {text:?}")?;
        }
        if let Some(child) = &self.child {
            write!(f, " > `{child}`")?;
        }
        Ok(())
    }
}

/// Which frame to look for: exact name or a URL substring, whichever hits first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameTarget {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_contains: Option<String>,
}

impl FrameTarget {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            url_contains: None,
        }
    }

    pub fn or_url(mut self, fragment: impl Into<String>) -> Self {
        self.url_contains = Some(fragment.into());
        self
    }

    pub fn matches(&self, frame: &FrameInfo) -> bool {
        let by_name = self.name.as_deref().is_some_and(|name| frame.name == name);
        let by_url = self
            .url_contains
            .as_deref()
            .is_some_and(|fragment| !fragment.is_empty() && frame.url.contains(fragment));
        by_name || by_url
    }
}

impl fmt::Display for FrameTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.url_contains) {
            (Some(name), Some(url)) => write!(f, "name={name:?} or url~{url:?}"),
            (Some(name), None) => write!(f, "name={name:?}"),
            (None, Some(url)) => write!(f, "url~{url:?}"),
            (None, None) => write!(f, "<empty target>"),
        }
    }
}

/// A frame attached to the page at the time `frames()` was called.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameInfo {
    pub id: String,
    pub name: String,
    pub url: String,
}

/// Where an operation runs. A `Frame` scope is only valid until the next
/// navigation of that frame or its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Page,
    Frame(FrameInfo),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Page => write!(f, "page"),
            Scope::Frame(frame) => write!(f, "frame {:?}", frame.name),
        }
    }
}

/// Attached versus actually rendered matches of a locator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElementCount {
    pub attached: usize,
    pub visible: usize,
}

impl ElementCount {
    pub fn new(attached: usize, visible: usize) -> Self {
        Self { attached, visible }
    }
}

/// One `<tr>` with at least one data cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRow {
    /// Position in the table's `rows` collection, used to click back into it.
    pub index: usize,
    pub cells: Vec<String>,
    /// Text of the first link in the row.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

/// Bulk snapshot of one `<table>`, taken in a single read.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSnapshot {
    /// Position among the scope's tables in document order.
    pub index: usize,
    /// Whole-table text content, whitespace collapsed.
    pub text: String,
    /// Cells of the first header row (`<th>` cells), if any.
    pub headers: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl TableSnapshot {
    pub fn contains_text(&self, needle: &str) -> bool {
        self.text.contains(needle)
    }
}

/// An open page of the portal.
#[async_trait]
pub trait PortalPage: Send + Sync {
    async fn goto(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// All frames currently attached below the main frame.
    async fn frames(&self) -> Result<Vec<FrameInfo>>;

    async fn fill(&self, scope: &Scope, locator: &Locator, value: &str) -> Result<()>;

    /// Click the first match of `locator`.
    async fn click(&self, scope: &Scope, locator: &Locator) -> Result<()> {
        self.click_nth(scope, locator, 0, false).await
    }

    /// Click the `nth` match, counting only rendered elements when `visible_only`.
    async fn click_nth(
        &self,
        scope: &Scope,
        locator: &Locator,
        nth: usize,
        visible_only: bool,
    ) -> Result<()>;

    async fn select_option(&self, scope: &Scope, locator: &Locator, value: &str) -> Result<()>;

    async fn count(&self, scope: &Scope, locator: &Locator) -> Result<ElementCount>;

    /// Trimmed text of the first match, `None` when nothing matches.
    async fn read_text(&self, scope: &Scope, locator: &Locator) -> Result<Option<String>>;

    /// Snapshot of the first table matching `locator`.
    async fn read_table(&self, scope: &Scope, locator: &Locator) -> Result<Option<TableSnapshot>>;

    /// Snapshots of every table in the scope.
    async fn read_tables(&self, scope: &Scope) -> Result<Vec<TableSnapshot>>;

    /// Click the first link of row `row` in table `table` (indices from a snapshot).
    async fn click_row_link(&self, scope: &Scope, table: usize, row: usize) -> Result<()>;

    /// Browser-level history back. `Ok(false)` when there is nothing to go back to
    /// or the navigation did not complete within `timeout`.
    async fn go_back(&self, timeout: Duration) -> Result<bool>;

    async fn evaluate(&self, scope: &Scope, expression: &str) -> Result<serde_json::Value>;

    async fn cookies(&self) -> Result<Vec<StoredCookie>>;

    async fn set_cookies(&self, cookies: &[StoredCookie]) -> Result<()>;
}

/// A browser able to open pages sharing one cookie context.
#[async_trait]
pub trait PortalBrowser: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn PortalPage>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(name: &str, url: &str) -> FrameInfo {
        FrameInfo {
            id: "F1".to_string(),
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn frame_target_matches_name_or_url() {
        let target = FrameTarget::named("iframeApplication").or_url("consultaDeclaracion");
        assert!(target.matches(&frame("iframeApplication", "about:blank")));
        assert!(target.matches(&frame("", "https://x/consultaDeclaracionInternet")));
        assert!(!target.matches(&frame("iframeApplicationX", "https://x/other")));
    }

    #[test]
    fn empty_url_fragment_never_matches() {
        let target = FrameTarget {
            name: None,
            url_contains: Some(String::new()),
        };
        assert!(!target.matches(&frame("a", "https://x")));
    }

    #[test]
    fn locator_display() {
        let locator = Locator::with_text("tr", "Total").child("td:last-child");
        assert_eq!(locator.to_string(), "`tr` containing \"Total\" > `td:last-child`");
    }
}
