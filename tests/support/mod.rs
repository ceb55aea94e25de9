#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use sunatsync::config::{ResolvedConfig, Timeouts};
use sunatsync::credentials::StoredCookie;
use sunatsync::portal::{
    ElementCount, FrameInfo, Locator, PortalBrowser, PortalPage, Scope, TableRow, TableSnapshot,
};

/// Config with the default selectors and timeouts short enough for tests.
pub fn test_config(dir: &Path) -> ResolvedConfig {
    let mut config = ResolvedConfig::default();
    config.timeouts = Timeouts {
        page_load: Duration::from_millis(50),
        element_wait: Duration::from_millis(50),
        frame_resolve: Duration::from_millis(50),
        poll_interval: Duration::from_millis(1),
        submit_settle: Duration::ZERO,
        detail_settle: Duration::ZERO,
        restore_rows: Duration::from_millis(50),
        back_navigation: Duration::from_millis(50),
        popup_wait: Duration::from_millis(5),
    };
    config.session_file = dir.join("session.json");
    config
}

pub fn frame(name: &str, url: &str) -> FrameInfo {
    FrameInfo {
        id: format!("frame-{name}"),
        name: name.to_string(),
        url: url.to_string(),
    }
}

pub fn row(index: usize, cells: &[&str], link: Option<&str>) -> TableRow {
    TableRow {
        index,
        cells: cells.iter().map(|c| c.to_string()).collect(),
        link: link.map(str::to_string),
    }
}

pub fn table(index: usize, headers: &[&str], rows: Vec<TableRow>) -> TableSnapshot {
    let mut text: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    for row in &rows {
        text.extend(row.cells.iter().cloned());
    }
    TableSnapshot {
        index,
        text: text.join(" "),
        headers: headers.iter().map(|h| h.to_string()).collect(),
        rows,
    }
}

/// Result-link counts that depend on the period currently selected in the form.
#[derive(Debug, Clone)]
pub struct PeriodCounts {
    pub locator: Locator,
    pub month: Locator,
    pub year: Locator,
    /// Keyed by "MM/YYYY"; periods not listed have one visible link.
    pub counts: HashMap<String, ElementCount>,
}

/// What `history.back()` does when evaluated in a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryBehavior {
    Restores,
    NoOp,
    Fails,
}

#[derive(Debug)]
pub struct FakeState {
    pub events: Vec<String>,
    pub url: String,
    pub frames: Vec<FrameInfo>,
    /// `frames()` calls answered with no frames before `frames` shows up.
    pub frames_hidden_polls: usize,
    /// Overrides of the default count of one visible element.
    pub counts: HashMap<Locator, ElementCount>,
    /// Locators with no element: counts are zero and interactions fail.
    pub missing: HashSet<Locator>,
    /// Locators that go missing once a row link is clicked.
    pub missing_after_open: HashSet<Locator>,
    pub period_counts: Option<PeriodCounts>,
    pub texts: HashMap<Locator, String>,
    pub named_tables: HashMap<Locator, TableSnapshot>,
    /// Tables shown while no detail is open.
    pub listing: Vec<TableSnapshot>,
    /// Detail tables per listing row index.
    pub details: HashMap<usize, Vec<TableSnapshot>>,
    pub opened_row: Option<usize>,
    pub selected: HashMap<Locator, String>,
    pub browser_back: bool,
    pub page_history: HistoryBehavior,
    pub frame_history: HistoryBehavior,
    pub cookies: Vec<StoredCookie>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            events: Vec::new(),
            url: "https://e-menu.sunat.gob.pe/cl-ti-itmenu/MenuInternet.htm".to_string(),
            frames: vec![frame("iframeApplication", "https://e-menu.sunat.gob.pe/app")],
            frames_hidden_polls: 0,
            counts: HashMap::new(),
            missing: HashSet::new(),
            missing_after_open: HashSet::new(),
            period_counts: None,
            texts: HashMap::new(),
            named_tables: HashMap::new(),
            listing: Vec::new(),
            details: HashMap::new(),
            opened_row: None,
            selected: HashMap::new(),
            browser_back: true,
            page_history: HistoryBehavior::Restores,
            frame_history: HistoryBehavior::Restores,
            cookies: Vec::new(),
        }
    }
}

impl FakeState {
    fn count(&self, locator: &Locator) -> ElementCount {
        if self.missing.contains(locator) {
            return ElementCount::new(0, 0);
        }
        if let Some(rule) = &self.period_counts {
            if &rule.locator == locator {
                let month = self.selected.get(&rule.month).cloned().unwrap_or_default();
                let year = self.selected.get(&rule.year).cloned().unwrap_or_default();
                return rule
                    .counts
                    .get(&format!("{month}/{year}"))
                    .copied()
                    .unwrap_or(ElementCount::new(1, 1));
            }
        }
        self.counts
            .get(locator)
            .copied()
            .unwrap_or(ElementCount::new(1, 1))
    }

    fn require(&self, locator: &Locator) -> Result<()> {
        let count = self.count(locator);
        if count.attached == 0 {
            anyhow::bail!("no element {locator}");
        }
        Ok(())
    }

    fn history_back(&mut self, behavior: HistoryBehavior) -> Result<Value> {
        match behavior {
            HistoryBehavior::Restores => {
                self.opened_row = None;
                Ok(Value::Null)
            }
            HistoryBehavior::NoOp => Ok(Value::Null),
            HistoryBehavior::Fails => anyhow::bail!("history.back is not available"),
        }
    }
}

/// Scripted page. Every page of a [`FakeBrowser`] shares one state.
#[derive(Clone)]
pub struct FakePage {
    state: Arc<Mutex<FakeState>>,
}

impl FakePage {
    pub fn new(state: FakeState) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn events(&self) -> Vec<String> {
        self.state().events.clone()
    }

    fn record(&self, event: String) -> MutexGuard<'_, FakeState> {
        let mut state = self.state();
        state.events.push(event);
        state
    }
}

#[async_trait]
impl PortalPage for FakePage {
    async fn goto(&self, url: &str) -> Result<()> {
        drop(self.record(format!("goto {url}")));
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.state().url.clone())
    }

    async fn frames(&self) -> Result<Vec<FrameInfo>> {
        let mut state = self.state();
        if state.frames_hidden_polls > 0 {
            state.frames_hidden_polls -= 1;
            return Ok(Vec::new());
        }
        Ok(state.frames.clone())
    }

    async fn fill(&self, _scope: &Scope, locator: &Locator, value: &str) -> Result<()> {
        let state = self.record(format!("fill {locator} {value}"));
        state.require(locator)
    }

    async fn click_nth(
        &self,
        _scope: &Scope,
        locator: &Locator,
        nth: usize,
        visible_only: bool,
    ) -> Result<()> {
        let state = self.record(format!("click {locator}"));
        let count = state.count(locator);
        let available = if visible_only {
            count.visible
        } else {
            count.attached
        };
        if nth >= available {
            anyhow::bail!("no element {locator} at {nth}");
        }
        Ok(())
    }

    async fn select_option(&self, _scope: &Scope, locator: &Locator, value: &str) -> Result<()> {
        let mut state = self.record(format!("select {locator}={value}"));
        state.require(locator)?;
        state.selected.insert(locator.clone(), value.to_string());
        Ok(())
    }

    async fn count(&self, _scope: &Scope, locator: &Locator) -> Result<ElementCount> {
        let state = self.record(format!("count {locator}"));
        Ok(state.count(locator))
    }

    async fn read_text(&self, _scope: &Scope, locator: &Locator) -> Result<Option<String>> {
        let state = self.record(format!("read_text {locator}"));
        Ok(state.texts.get(locator).cloned())
    }

    async fn read_table(&self, _scope: &Scope, locator: &Locator) -> Result<Option<TableSnapshot>> {
        let state = self.record(format!("read_table {locator}"));
        Ok(state.named_tables.get(locator).cloned())
    }

    async fn read_tables(&self, _scope: &Scope) -> Result<Vec<TableSnapshot>> {
        let state = self.record("read_tables".to_string());
        Ok(match state.opened_row {
            Some(row) => state.details.get(&row).cloned().unwrap_or_default(),
            None => state.listing.clone(),
        })
    }

    async fn click_row_link(&self, _scope: &Scope, table: usize, row: usize) -> Result<()> {
        let mut state = self.record(format!("click_row {table}/{row}"));
        state.opened_row = Some(row);
        let gone: Vec<Locator> = state.missing_after_open.drain().collect();
        state.missing.extend(gone);
        Ok(())
    }

    async fn go_back(&self, _timeout: Duration) -> Result<bool> {
        let mut state = self.record("go_back".to_string());
        if state.browser_back {
            state.opened_row = None;
        }
        Ok(state.browser_back)
    }

    async fn evaluate(&self, scope: &Scope, expression: &str) -> Result<Value> {
        let mut state = self.record(format!("eval {scope}: {expression}"));
        let behavior = match scope {
            Scope::Page => state.page_history,
            Scope::Frame(_) => state.frame_history,
        };
        state.history_back(behavior)
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>> {
        Ok(self.state().cookies.clone())
    }

    async fn set_cookies(&self, cookies: &[StoredCookie]) -> Result<()> {
        let mut state = self.record(format!("set_cookies {}", cookies.len()));
        state.cookies = cookies.to_vec();
        Ok(())
    }
}

/// Hands out pages over one shared scripted state.
pub struct FakeBrowser {
    page: FakePage,
}

impl FakeBrowser {
    pub fn new(state: FakeState) -> Self {
        Self {
            page: FakePage::new(state),
        }
    }

    pub fn page(&self) -> &FakePage {
        &self.page
    }
}

#[async_trait]
impl PortalBrowser for FakeBrowser {
    async fn new_page(&self) -> Result<Box<dyn PortalPage>> {
        drop(self.page.record("new_page".to_string()));
        Ok(Box::new(self.page.clone()))
    }
}
