//! Chrome DevTools implementation of the automation surface.
//!
//! DOM work is done with small scripts sent through `Runtime.evaluate`. Frame
//! scoped scripts run in an isolated world created for the frame on every call,
//! so a frame that navigated away or detached fails loudly instead of answering
//! from stale state.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{CookieParam, TimeSinceEpoch};
use chromiumoxide::cdp::browser_protocol::page::{
    CreateIsolatedWorldParams, FrameId, FrameTree, GetFrameTreeParams,
    GetNavigationHistoryParams, NavigateToHistoryEntryParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{EvaluateParams, ExecutionContextId};
use chromiumoxide::Page;
use futures::StreamExt;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::task::JoinHandle;

use super::{
    ElementCount, FrameInfo, Locator, PortalBrowser, PortalPage, Scope, TableSnapshot,
};
use crate::config::BrowserSettings;
use crate::credentials::StoredCookie;

const ISOLATED_WORLD: &str = "sunatsync";

/// Helpers shared by every script. `__loc` and `__args` are spliced in ahead of it.
const PRELUDE: &str = r#"
const __norm = (s) => (s || '').replace(/\s+/g, ' ').trim();
const __visible = (el) => {
  if (!el.isConnected) return false;
  const style = window.getComputedStyle(el);
  if (style.display === 'none' || style.visibility === 'hidden' || style.opacity === '0') return false;
  return el.getClientRects().length > 0;
};
const __find = () => {
  let els = Array.from(document.querySelectorAll(__loc.css));
  if (__loc.text) {
    els = els.filter((el) => __norm(el.textContent).includes(__loc.text));
    // Keep the innermost matches so "Consultas" hits the entry, not its menu.
    els = els.filter((el) => !els.some((other) => other !== el && el.contains(other)));
  }
  if (__loc.child) els = els.flatMap((el) => Array.from(el.querySelectorAll(__loc.child)));
  return els;
};
const __snapshot = (table, index) => {
  let headers = [];
  const rows = [];
  Array.from(table.rows).forEach((tr, i) => {
    const cells = Array.from(tr.cells);
    const texts = cells.map((c) => __norm(c.textContent));
    if (!cells.some((c) => c.tagName === 'TD')) {
      if (headers.length === 0) headers = texts;
      return;
    }
    const link = tr.querySelector('a');
    rows.push({ index: i, cells: texts, link: link ? __norm(link.textContent) : null });
  });
  return { index, text: __norm(table.textContent), headers, rows };
};
"#;

fn script(locator: &Locator, args: Value, body: &str) -> Result<String> {
    let loc = serde_json::to_string(locator).context("Failed to encode locator")?;
    Ok([
        "(() => {\nconst __loc = ",
        &loc,
        ";\nconst __args = ",
        &args.to_string(),
        ";\n",
        PRELUDE,
        body,
        "\n})()",
    ]
    .concat())
}

/// A launched Chrome instance with its event handler task.
pub struct ChromiumBrowser {
    browser: Browser,
    handler_task: JoinHandle<()>,
    _profile: TempDir,
}

impl ChromiumBrowser {
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        let chrome_path = match &settings.chrome_path {
            Some(path) => path.clone(),
            None => find_chrome().context(
                "Chrome/Chromium not found. Please install Chrome or Chromium, or set browser.chrome_path.",
            )?,
        };
        let profile = TempDir::new().context("Failed to create browser profile dir")?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .viewport(None)
            .user_data_dir(profile.path())
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--disable-infobars")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--disable-dev-shm-usage")
            .arg("--lang=es-PE");
        if !settings.headless {
            builder = builder.with_head();
        }
        for arg in &settings.args {
            builder = builder.arg(arg.as_str());
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to configure browser: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;
        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        Ok(Self {
            browser,
            handler_task,
            _profile: profile,
        })
    }

    pub async fn close(mut self) -> Result<()> {
        self.browser.close().await.context("Failed to close browser")?;
        Ok(())
    }
}

impl Drop for ChromiumBrowser {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

#[async_trait]
impl PortalBrowser for ChromiumBrowser {
    async fn new_page(&self) -> Result<Box<dyn PortalPage>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("Failed to open page")?;
        Ok(Box::new(ChromiumPage { page }))
    }
}

/// One browser tab.
pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    async fn context_id(&self, scope: &Scope) -> Result<Option<ExecutionContextId>> {
        let frame = match scope {
            Scope::Page => return Ok(None),
            Scope::Frame(frame) => frame,
        };

        let params = CreateIsolatedWorldParams::builder()
            .frame_id(FrameId::new(frame.id.clone()))
            .world_name(ISOLATED_WORLD)
            .build()
            .map_err(anyhow::Error::msg)?;
        let world = self
            .page
            .execute(params)
            .await
            .with_context(|| format!("Frame {:?} is no longer attached", frame.name))?;

        Ok(Some(world.result.execution_context_id.clone()))
    }

    async fn eval(&self, scope: &Scope, expression: String) -> Result<Value> {
        let mut builder = EvaluateParams::builder()
            .expression(expression)
            .return_by_value(true)
            .await_promise(true);
        if let Some(context_id) = self.context_id(scope).await? {
            builder = builder.context_id(context_id);
        }
        let params = builder.build().map_err(anyhow::Error::msg)?;

        let response = self
            .page
            .execute(params)
            .await
            .with_context(|| format!("Script evaluation failed in {scope}"))?;

        if let Some(exception) = &response.result.exception_details {
            let detail = exception
                .exception
                .as_ref()
                .and_then(|e| e.description.clone())
                .unwrap_or_default();
            anyhow::bail!("Script raised in {scope}: {} {detail}", exception.text);
        }

        Ok(response.result.result.value.clone().unwrap_or(Value::Null))
    }

    async fn run(
        &self,
        scope: &Scope,
        locator: &Locator,
        args: Value,
        body: &str,
    ) -> Result<Value> {
        self.eval(scope, script(locator, args, body)?).await
    }
}

fn flatten_frames(tree: &FrameTree, out: &mut Vec<FrameInfo>) {
    for child in tree.child_frames.iter().flatten() {
        out.push(FrameInfo {
            id: child.frame.id.inner().clone(),
            name: child.frame.name.clone().unwrap_or_default(),
            url: child.frame.url.clone(),
        });
        flatten_frames(child, out);
    }
}

fn expect_true(value: Value, what: &str, scope: &Scope, locator: &Locator) -> Result<()> {
    match value {
        Value::Bool(true) => Ok(()),
        Value::Null => anyhow::bail!("{what}: option not found for {locator} in {scope}"),
        _ => anyhow::bail!("{what}: no element {locator} in {scope}"),
    }
}

#[async_trait]
impl PortalPage for ChromiumPage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("Failed to navigate to {url}"))?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn frames(&self) -> Result<Vec<FrameInfo>> {
        let response = self
            .page
            .execute(GetFrameTreeParams::default())
            .await
            .context("Failed to read frame tree")?;
        let mut frames = Vec::new();
        flatten_frames(&response.result.frame_tree, &mut frames);
        Ok(frames)
    }

    async fn fill(&self, scope: &Scope, locator: &Locator, value: &str) -> Result<()> {
        let result = self
            .run(
                scope,
                locator,
                json!({ "value": value }),
                r#"
const el = __find()[0];
if (!el) return false;
el.focus();
el.value = __args.value;
for (const type of ['input', 'keyup', 'change']) el.dispatchEvent(new Event(type, { bubbles: true }));
return true;"#,
            )
            .await?;
        expect_true(result, "fill", scope, locator)
    }

    async fn click_nth(
        &self,
        scope: &Scope,
        locator: &Locator,
        nth: usize,
        visible_only: bool,
    ) -> Result<()> {
        let result = self
            .run(
                scope,
                locator,
                json!({ "nth": nth, "visibleOnly": visible_only }),
                r#"
const all = __find();
const els = __args.visibleOnly ? all.filter(__visible) : all;
const el = els[__args.nth];
if (!el) return false;
el.scrollIntoView({ block: 'center' });
el.click();
return true;"#,
            )
            .await?;
        expect_true(result, "click", scope, locator)
    }

    async fn select_option(&self, scope: &Scope, locator: &Locator, value: &str) -> Result<()> {
        let result = self
            .run(
                scope,
                locator,
                json!({ "value": value }),
                r#"
const el = __find()[0];
if (!el) return false;
const option = Array.from(el.options || [])
  .find((o) => o.value === __args.value || __norm(o.textContent) === __args.value);
if (!option) return null;
el.value = option.value;
el.dispatchEvent(new Event('change', { bubbles: true }));
return true;"#,
            )
            .await?;
        expect_true(result, "select", scope, locator)
    }

    async fn count(&self, scope: &Scope, locator: &Locator) -> Result<ElementCount> {
        let result = self
            .run(
                scope,
                locator,
                Value::Null,
                r#"
const els = __find();
return { attached: els.length, visible: els.filter(__visible).length };"#,
            )
            .await?;
        let attached = result["attached"].as_u64().unwrap_or(0) as usize;
        let visible = result["visible"].as_u64().unwrap_or(0) as usize;
        Ok(ElementCount::new(attached, visible))
    }

    async fn read_text(&self, scope: &Scope, locator: &Locator) -> Result<Option<String>> {
        let result = self
            .run(
                scope,
                locator,
                Value::Null,
                r#"
const el = __find()[0];
return el ? __norm(el.textContent) : null;"#,
            )
            .await?;
        Ok(result.as_str().map(str::to_string))
    }

    async fn read_table(&self, scope: &Scope, locator: &Locator) -> Result<Option<TableSnapshot>> {
        let result = self
            .run(
                scope,
                locator,
                Value::Null,
                r#"
const el = __find()[0];
if (!el) return null;
return __snapshot(el, Array.from(document.querySelectorAll('table')).indexOf(el));"#,
            )
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        let table = serde_json::from_value(result).context("Unexpected table snapshot shape")?;
        Ok(Some(table))
    }

    async fn read_tables(&self, scope: &Scope) -> Result<Vec<TableSnapshot>> {
        let result = self
            .run(
                scope,
                &Locator::css("table"),
                Value::Null,
                "return Array.from(document.querySelectorAll('table')).map(__snapshot);",
            )
            .await?;
        serde_json::from_value(result).context("Unexpected table snapshot shape")
    }

    async fn click_row_link(&self, scope: &Scope, table: usize, row: usize) -> Result<()> {
        let locator = Locator::css("table");
        let result = self
            .run(
                scope,
                &locator,
                json!({ "table": table, "row": row }),
                r#"
const table = document.querySelectorAll('table')[__args.table];
const tr = table && table.rows[__args.row];
const link = tr && tr.querySelector('a');
if (!link) return false;
link.click();
return true;"#,
            )
            .await?;
        expect_true(result, "row link", scope, &locator)
    }

    async fn go_back(&self, timeout: Duration) -> Result<bool> {
        let history = self
            .page
            .execute(GetNavigationHistoryParams::default())
            .await
            .context("Failed to read navigation history")?;
        let current = history.result.current_index;
        if current <= 0 {
            return Ok(false);
        }
        let Some(entry) = history.result.entries.get((current - 1) as usize) else {
            return Ok(false);
        };

        self.page
            .execute(NavigateToHistoryEntryParams::new(entry.id))
            .await
            .context("Failed to navigate back")?;

        match tokio::time::timeout(timeout, self.page.wait_for_navigation()).await {
            Ok(result) => {
                result.context("Back navigation failed")?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn evaluate(&self, scope: &Scope, expression: &str) -> Result<Value> {
        self.eval(scope, expression.to_string()).await
    }

    async fn cookies(&self) -> Result<Vec<StoredCookie>> {
        let cookies = self.page.get_cookies().await.context("Failed to read cookies")?;
        Ok(cookies
            .into_iter()
            .map(|c| StoredCookie {
                name: c.name,
                value: c.value,
                domain: c.domain,
                path: c.path,
                expires: c.expires,
                http_only: c.http_only,
                secure: c.secure,
            })
            .collect())
    }

    async fn set_cookies(&self, cookies: &[StoredCookie]) -> Result<()> {
        let params: Vec<CookieParam> = cookies
            .iter()
            .map(|c| {
                let mut param = CookieParam::new(c.name.clone(), c.value.clone());
                param.domain = Some(c.domain.clone());
                param.path = Some(c.path.clone());
                param.http_only = Some(c.http_only);
                param.secure = Some(c.secure);
                if c.expires > 0.0 {
                    param.expires = Some(TimeSinceEpoch::new(c.expires));
                }
                param
            })
            .collect();

        if !params.is_empty() {
            self.page
                .set_cookies(params)
                .await
                .context("Failed to restore cookies")?;
        }
        Ok(())
    }
}

/// Find Chrome/Chromium executable.
fn find_chrome() -> Option<PathBuf> {
    for binary in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(output) = std::process::Command::new("which").arg(binary).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(PathBuf::from(path));
                }
            }
        }
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/run/current-system/sw/bin/google-chrome",
        "/run/current-system/sw/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    candidates
        .iter()
        .map(PathBuf::from)
        .find(|candidate| candidate.exists())
}
