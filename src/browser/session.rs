//! A live Chromium tab driven over CDP.
//!
//! Elements are resolved inside the page by a small script prelude, so CSS
//! and XPath alternatives share one code path and no element handle ever
//! leaves the page. All commands go through one `Mutex<Page>`, which keeps
//! supervisor checks and worker actions from interleaving mid-command.

use super::browser_manager::{build_launch_config, find_chrome_executable};
use super::locators::{locate, signal_selectors, Selector};
use crate::core::capabilities::{ActionExecutor, Locator, PageObserver, Signal};
use crate::core::config::BotSettings;
use crate::core::error::{BotError, Result};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::InsertTextParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::error::CdpError;
use chromiumoxide::layout::Point;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Handler, Page};
use futures::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const SIGNAL_POLL: Duration = Duration::from_millis(100);

const PRELUDE: &str = r#"
const __all = (s) => {
  if (s.css !== undefined) return Array.from(document.querySelectorAll(s.css));
  const r = document.evaluate(s.xpath, document, null, XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null);
  const out = [];
  for (let i = 0; i < r.snapshotLength; i++) out.push(r.snapshotItem(i));
  return out;
};
const __visible = (el) => !!(el && (el.offsetWidth || el.offsetHeight || el.getClientRects().length));
const __resolve = (sels) => {
  let first = null;
  for (const s of sels) {
    for (const el of __all(s)) {
      if (__visible(el)) return el;
      if (!first) first = el;
    }
  }
  return first;
};
const __setValue = (el, v) => {
  const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
  const desc = Object.getOwnPropertyDescriptor(proto, 'value');
  if (desc && desc.set && (el instanceof HTMLInputElement || el instanceof HTMLTextAreaElement)) {
    desc.set.call(el, v);
  } else {
    el.value = v;
  }
  el.dispatchEvent(new Event('input', { bubbles: true }));
  el.dispatchEvent(new Event('change', { bubbles: true }));
};
"#;

/// JSON string literal usable inside a script.
fn js_string(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| "\"\"".to_string())
}

/// Script that resolves `selectors` to `el` and runs `body`, or yields
/// `null` when nothing matches.
fn element_script(selectors: &[Selector], body: &str) -> String {
    let sels = serde_json::to_string(selectors).unwrap_or_else(|_| "[]".to_string());
    format!(
        "(() => {{ {} const el = __resolve({}); if (!el) return null; {} }})()",
        PRELUDE, sels, body
    )
}

/// Focuses the element and reports whether it kept focus; null when absent.
fn focus_script(locator: &Locator) -> String {
    element_script(
        &locate(locator),
        "el.focus(); return document.activeElement === el;",
    )
}

fn signal_script(signal: Signal) -> String {
    let sels = serde_json::to_string(&signal_selectors(signal)).unwrap_or_else(|_| "[]".to_string());
    format!(
        "(() => {{ {} return {}.some((s) => __all(s).some(__visible)); }})()",
        PRELUDE, sels
    )
}

const CLICK_TARGET: &str = r#"
el.scrollIntoView({ block: 'center', inline: 'center' });
const r = el.getBoundingClientRect();
if (r.width === 0 && r.height === 0) return { hidden: true };
const x = r.left + r.width / 2;
const y = r.top + r.height / 2;
const top = document.elementFromPoint(x, y);
return { x, y, covered: !!top && top !== el && !el.contains(top) };
"#;

const ACTIVATE: &str = r#"
el.scrollIntoView({ block: 'center' });
(el.querySelector('.p-radiobutton-box, .p-dropdown-trigger, .p-checkbox-box') || el).click();
return true;
"#;

#[derive(Debug, Default, Deserialize)]
struct ClickTarget {
    #[serde(default)]
    hidden: bool,
    #[serde(default)]
    x: f64,
    #[serde(default)]
    y: f64,
    #[serde(default)]
    covered: bool,
}

#[derive(Debug, Deserialize)]
struct SelectOutcome {
    ok: bool,
    #[serde(default)]
    reason: Option<String>,
}

fn spawn_handler_task(mut handler: Handler, closed: Arc<AtomicBool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                debug!("CDP handler event error: {}", e);
            }
        }
        closed.store(true, Ordering::SeqCst);
    })
}

pub struct ChromeSession {
    account: String,
    browser: Mutex<Browser>,
    page: Mutex<Page>,
    handler_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    closed: Arc<AtomicBool>,
}

impl ChromeSession {
    /// Launch a browser for `account` and open its working tab.
    pub async fn launch(settings: &BotSettings, account: &str) -> Result<Self> {
        let exe = find_chrome_executable(settings.chrome_executable.as_deref()).ok_or_else(|| {
            BotError::Config(
                "browser executable not found (tried Chrome, Chromium, Brave); set CHROME_EXECUTABLE"
                    .into(),
            )
        })?;
        info!(
            "🚀 launching {} browser for {} ({})",
            if settings.headless { "headless" } else { "headful" },
            account,
            exe
        );

        let config = build_launch_config(&exe, settings, account)?;
        let (browser, handler) = Browser::launch(config)
            .await
            .map_err(|e| BotError::Driver(format!("failed to launch {}: {}", exe, e)))?;
        let closed = Arc::new(AtomicBool::new(false));
        let handler_task = spawn_handler_task(handler, Arc::clone(&closed));

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| BotError::Driver(format!("failed to open tab: {}", e)))?;

        Ok(Self {
            account: account.to_string(),
            browser: Mutex::new(browser),
            page: Mutex::new(page),
            handler_task: std::sync::Mutex::new(Some(handler_task)),
            closed,
        })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(BotError::SessionLost(format!(
                "browser for {} is gone",
                self.account
            )));
        }
        Ok(())
    }

    fn cdp_error(&self, e: CdpError) -> BotError {
        if self.is_closed() {
            return BotError::SessionLost(e.to_string());
        }
        if matches!(e, CdpError::Timeout) {
            return BotError::Timeout(e.to_string());
        }
        let msg = e.to_string();
        // The document was replaced while the command was in flight.
        if msg.contains("Cannot find context")
            || msg.contains("No node")
            || msg.contains("Could not find node")
            || msg.contains("Execution context was destroyed")
        {
            return BotError::StaleElement(msg);
        }
        BotError::Driver(msg)
    }

    async fn eval(&self, script: String) -> Result<Value> {
        self.ensure_open()?;
        let page = self.page.lock().await;
        self.eval_on(&page, script).await
    }

    /// Evaluate on a page the caller has already locked.
    async fn eval_on(&self, page: &Page, script: String) -> Result<Value> {
        let result = page.evaluate(script).await.map_err(|e| self.cdp_error(e))?;
        Ok(result.into_value::<Value>().unwrap_or(Value::Null))
    }

    /// Run `body` against the element behind `locator`.
    async fn on_element(&self, locator: &Locator, body: &str) -> Result<Value> {
        let value = self.eval(element_script(&locate(locator), body)).await?;
        if value.is_null() {
            return Err(BotError::ElementNotFound(locator.to_string()));
        }
        Ok(value)
    }
}

#[async_trait]
impl PageObserver for ChromeSession {
    async fn is_signal_present(&self, signal: Signal, timeout: Duration) -> Result<bool> {
        let deadline = Instant::now() + timeout;
        let script = signal_script(signal);
        loop {
            if self.eval(script.clone()).await?.as_bool().unwrap_or(false) {
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(SIGNAL_POLL.min(deadline - now)).await;
        }
    }
}

#[async_trait]
impl ActionExecutor for ChromeSession {
    async fn click(&self, locator: &Locator) -> Result<()> {
        let target: ClickTarget =
            serde_json::from_value(self.on_element(locator, CLICK_TARGET).await?).unwrap_or_default();
        if target.hidden {
            return Err(BotError::ElementNotFound(format!("{} (not visible)", locator)));
        }
        if target.covered {
            return Err(BotError::Driver(format!("click on {} intercepted", locator)));
        }

        self.ensure_open()?;
        let page = self.page.lock().await;
        page.click(Point {
            x: target.x,
            y: target.y,
        })
        .await
        .map_err(|e| self.cdp_error(e))?;
        Ok(())
    }

    async fn activate_fallback(&self, locator: &Locator) -> Result<()> {
        self.on_element(locator, ACTIVATE).await.map(|_| ())
    }

    async fn clear(&self, locator: &Locator) -> Result<()> {
        self.on_element(locator, "el.focus(); __setValue(el, ''); return true;")
            .await
            .map(|_| ())
    }

    async fn type_text(&self, locator: &Locator, text: &str) -> Result<()> {
        self.ensure_open()?;
        // Focus and insert under one guard: no other command may land between.
        let page = self.page.lock().await;
        let focused = self.eval_on(&page, focus_script(locator)).await?;
        if focused.is_null() {
            return Err(BotError::ElementNotFound(locator.to_string()));
        }
        if !focused.as_bool().unwrap_or(false) {
            return Err(BotError::StaleElement(format!("{} lost focus", locator)));
        }
        page.execute(InsertTextParams::new(text))
            .await
            .map_err(|e| self.cdp_error(e))?;
        Ok(())
    }

    async fn read_attribute(&self, locator: &Locator, name: &str) -> Result<Option<String>> {
        let body = format!(
            "const n = {}; \
             const v = ['checked', 'value', 'src', 'href', 'disabled'].includes(n) ? el[n] : el.getAttribute(n); \
             return [v === null || v === undefined ? null : String(v)];",
            js_string(name)
        );
        let value = self.on_element(locator, &body).await?;
        Ok(value
            .get(0)
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    async fn set_value(&self, locator: &Locator, value: &str) -> Result<()> {
        let body = format!(
            "el.focus(); __setValue(el, {}); el.dispatchEvent(new Event('blur')); return true;",
            js_string(value)
        );
        self.on_element(locator, &body).await.map(|_| ())
    }

    async fn select_option(&self, locator: &Locator, visible_text: &str) -> Result<()> {
        let body = format!(
            r#"if (!(el instanceof HTMLSelectElement)) return {{ ok: false, reason: 'not a select' }};
            const want = {}.trim().toLowerCase();
            const opts = Array.from(el.options);
            const opt = opts.find((o) => o.text.trim().toLowerCase() === want)
                || opts.find((o) => o.text.trim().toLowerCase().includes(want));
            if (!opt) return {{ ok: false, reason: 'no matching option' }};
            el.value = opt.value;
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return {{ ok: true }};"#,
            js_string(visible_text)
        );
        let outcome: SelectOutcome = serde_json::from_value(self.on_element(locator, &body).await?)
            .map_err(|e| BotError::Driver(format!("unexpected select result: {}", e)))?;
        if outcome.ok {
            return Ok(());
        }
        Err(BotError::ElementNotFound(format!(
            "{} option '{}' ({})",
            locator,
            visible_text,
            outcome.reason.unwrap_or_default()
        )))
    }

    async fn navigate(&self, url: &str) -> Result<()> {
        self.ensure_open()?;
        let page = self.page.lock().await;
        page.goto(url).await.map_err(|e| match self.cdp_error(e) {
            BotError::SessionLost(m) => BotError::SessionLost(m),
            other => BotError::Navigation(format!("{}: {}", url, other)),
        })?;
        debug!("navigated to {}", url);
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.ensure_open()?;
        let page = self.page.lock().await;
        page.screenshot(
            ScreenshotParams::builder()
                .format(CaptureScreenshotFormat::Png)
                .build(),
        )
        .await
        .map_err(|e| self.cdp_error(e))
    }

    async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        if !self.closed.swap(true, Ordering::SeqCst) {
            if let Err(e) = browser.close().await {
                warn!("browser for {} did not close cleanly: {}", self.account, e);
            }
            let _ = browser.wait().await;
        }
        let task = self
            .handler_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
        info!("🛑 browser closed for {}", self.account);
        Ok(())
    }
}

impl Drop for ChromeSession {
    fn drop(&mut self) {
        let task = self
            .handler_task
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            task.abort();
        }
    }
}
