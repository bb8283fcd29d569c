//! Chrome implementation of the driver contract, over the DevTools protocol.
//!
//! All site specifics come in through [`SelectorConfig`]; the driver itself
//! only knows the shape of the flow (listing → card → reply widget →
//! submit → confirmation).

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, InsertTextParams, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use outreach_config::{Credentials, SelectorConfig};
use outreach_llm::{ComputerAction, LlmClient};

use crate::extract::profile_text;
use crate::planner::{
    ActionSurface, ComputerUsePlanner, DISPLAY_HEIGHT, DISPLAY_WIDTH, LlmPlanner, PlannerLoop,
};
use crate::{BrowserDriver, BrowserError, LoginPath};

/// Poll interval while waiting for a selector to appear.
const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Settle delay after actions that trigger page mutations.
const SETTLE_DELAY: Duration = Duration::from_millis(400);

/// Everything needed to stand up a driver for one run.
pub struct ChromeDriverConfig {
    pub headless: bool,
    pub selectors: SelectorConfig,
    pub operation_timeout: Duration,
    pub verify_window: Duration,
    pub credentials: Option<Credentials>,
    /// `(client, model, max_turns, turn_timeout)` enables planner mode.
    pub planner: Option<(LlmClient, String, u32, Duration)>,
}

struct PlannerRig {
    planner: Box<dyn ComputerUsePlanner>,
    looper: PlannerLoop,
}

#[derive(Default)]
struct PageState {
    /// Text already extracted for the current profile.  Invalidated on
    /// every operation that can change which profile is on screen, so a
    /// read never returns a previous profile's text.
    cached_text: Option<String>,
    /// URL captured just before submit, for the URL-change heuristic.
    pre_submit_url: Option<String>,
}

pub struct ChromeDriver {
    browser: Mutex<Browser>,
    page: Page,
    handler_task: Mutex<Option<JoinHandle<()>>>,
    selectors: SelectorConfig,
    operation_timeout: Duration,
    verify_window: Duration,
    credentials: Option<Credentials>,
    planner: Option<PlannerRig>,
    stop: Arc<dyn Fn() -> bool + Send + Sync>,
    state: Mutex<PageState>,
}

impl ChromeDriver {
    /// Launch a browser and open a blank page.  `stop` is the cooperative
    /// stop check, polled between planner turns.
    pub async fn launch(
        config: ChromeDriverConfig,
        stop: Arc<dyn Fn() -> bool + Send + Sync>,
    ) -> Result<Self, BrowserError> {
        let mut builder = BrowserConfig::builder()
            .window_size(DISPLAY_WIDTH, DISPLAY_HEIGHT);
        if !config.headless {
            builder = builder.with_head();
        }
        let browser_config = builder
            .build()
            .map_err(BrowserError::Launch)?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser.new_page("about:blank").await?;

        let planner = config.planner.map(|(client, model, max_turns, turn_timeout)| {
            PlannerRig {
                planner: Box::new(LlmPlanner::new(client, model)) as Box<dyn ComputerUsePlanner>,
                looper: PlannerLoop::new(max_turns, turn_timeout),
            }
        });

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            handler_task: Mutex::new(Some(handler_task)),
            selectors: config.selectors,
            operation_timeout: config.operation_timeout,
            verify_window: config.verify_window,
            credentials: config.credentials,
            planner,
            stop,
            state: Mutex::new(PageState::default()),
        })
    }

    async fn invalidate_cache(&self) {
        self.state.lock().await.cached_text = None;
    }

    async fn eval_bool(&self, js: &str) -> Result<bool, BrowserError> {
        let result = self.page.evaluate(js).await?;
        result
            .into_value::<bool>()
            .map_err(|err| BrowserError::Session(err.to_string()))
    }

    async fn probe(&self, selector: &str) -> Result<bool, BrowserError> {
        self.eval_bool(&build_probe_js(selector)).await
    }

    /// Wait for `selector` to appear, polling up to the operation timeout.
    /// A stop signal ends the wait early (reported as "not found").
    async fn wait_for(&self, selector: &str) -> Result<bool, BrowserError> {
        let deadline = tokio::time::Instant::now() + self.operation_timeout;
        loop {
            if self.probe(selector).await? {
                return Ok(true);
            }
            if (*self.stop)() || tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn current_url(&self) -> Result<Option<String>, BrowserError> {
        Ok(self.page.url().await?)
    }

    async fn run_planner(&self, instruction: &str) -> Result<(), BrowserError> {
        let Some(rig) = &self.planner else {
            return Ok(());
        };
        let stop = self.stop.clone();
        let check = move || (*stop)();
        let outcome = rig
            .looper
            .run(rig.planner.as_ref(), self, instruction, &check)
            .await?;
        tracing::debug!(
            turns = outcome.turns_used,
            completed = outcome.completed,
            stopped = outcome.stopped,
            "planner operation finished"
        );
        Ok(())
    }

    async fn scripted_login(&self, credentials: &Credentials) -> Result<(), BrowserError> {
        let user_field = self
            .page
            .find_element(self.selectors.login_user_field.as_str())
            .await
            .map_err(|_| {
                BrowserError::LoginFailed(format!(
                    "login form field `{}` not found",
                    self.selectors.login_user_field
                ))
            })?;
        user_field.click().await?;
        user_field.type_str(&credentials.username).await?;

        let pass_field = self
            .page
            .find_element(self.selectors.login_pass_field.as_str())
            .await
            .map_err(|_| {
                BrowserError::LoginFailed(format!(
                    "login form field `{}` not found",
                    self.selectors.login_pass_field
                ))
            })?;
        pass_field.click().await?;
        pass_field.type_str(&credentials.password).await?;

        let submit = self
            .page
            .find_element(self.selectors.login_submit.as_str())
            .await
            .map_err(|_| BrowserError::LoginFailed("login submit control not found".to_string()))?;
        submit.click().await?;

        let _ = self.page.wait_for_navigation().await;
        tokio::time::sleep(SETTLE_DELAY).await;

        if self.wait_for(&self.selectors.login_probe).await? {
            Ok(())
        } else {
            Err(BrowserError::LoginFailed(
                "login probe still absent after scripted login".to_string(),
            ))
        }
    }

    async fn submit_via_label_chain(&self) -> Result<(), BrowserError> {
        // Localized labels first.
        if self
            .eval_bool(&build_submit_label_js(&self.selectors.submit_labels))
            .await?
        {
            return Ok(());
        }
        // Generic submit-type buttons.
        if self.eval_bool(CLICK_SUBMIT_TYPE_JS).await? {
            return Ok(());
        }
        // Last resort: Enter in the focused input.
        self.press_key("Enter").await
    }

    async fn click_at(&self, x: i64, y: i64) -> Result<(), BrowserError> {
        for kind in [
            DispatchMouseEventType::MousePressed,
            DispatchMouseEventType::MouseReleased,
        ] {
            let params = DispatchMouseEventParams::builder()
                .r#type(kind)
                .x(x as f64)
                .y(y as f64)
                .button(MouseButton::Left)
                .click_count(1)
                .build()
                .map_err(BrowserError::Session)?;
            self.page.execute(params).await?;
        }
        Ok(())
    }

    async fn press_key(&self, key: &str) -> Result<(), BrowserError> {
        let text = key_text(key);
        for kind in [DispatchKeyEventType::KeyDown, DispatchKeyEventType::KeyUp] {
            let is_down = matches!(kind, DispatchKeyEventType::KeyDown);
            let mut builder = DispatchKeyEventParams::builder().r#type(kind).key(key);
            if is_down {
                if let Some(text) = text {
                    builder = builder.text(text);
                }
            }
            let params = builder.build().map_err(BrowserError::Session)?;
            self.page.execute(params).await?;
        }
        Ok(())
    }

    async fn scroll_by(&self, x: i64, y: i64, dx: i64, dy: i64) -> Result<(), BrowserError> {
        let params = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseWheel)
            .x(x as f64)
            .y(y as f64)
            .delta_x(dx as f64)
            .delta_y(dy as f64)
            .build()
            .map_err(BrowserError::Session)?;
        self.page.execute(params).await?;
        Ok(())
    }

    async fn insert_text(&self, text: &str) -> Result<(), BrowserError> {
        self.page.execute(InsertTextParams::new(text)).await?;
        Ok(())
    }
}

#[async_trait]
impl BrowserDriver for ChromeDriver {
    async fn open(&self, url: &str) -> Result<LoginPath, BrowserError> {
        self.invalidate_cache().await;

        self.page
            .goto(url)
            .await
            .map_err(|err| BrowserError::Navigation(err.to_string()))?;
        let _ = self.page.wait_for_navigation().await;
        tokio::time::sleep(SETTLE_DELAY).await;

        if self.probe(&self.selectors.login_probe).await? {
            return Ok(LoginPath::AlreadySignedIn);
        }
        match &self.credentials {
            Some(credentials) => {
                self.scripted_login(credentials).await?;
                Ok(LoginPath::ScriptedLogin)
            }
            None => Err(BrowserError::LoginRequired),
        }
    }

    async fn open_next_profile(&self) -> Result<bool, BrowserError> {
        self.invalidate_cache().await;

        if self.planner.is_some() {
            self.run_planner(
                "Open the next unseen candidate profile card in this co-founder listing. \
                 If a profile is already fully visible, expand any collapsed sections and stop.",
            )
            .await?;
            return self.probe(&self.selectors.profile_card).await;
        }

        // A landing page may already show a profile card.
        if !self.wait_for(&self.selectors.profile_card).await? {
            return Ok(false);
        }

        // Expand collapsed sections so the whole card is in the DOM.
        if self.probe(&self.selectors.card_expand).await? {
            if let Ok(expand) = self
                .page
                .find_element(self.selectors.card_expand.as_str())
                .await
            {
                let _ = expand.click().await;
                tokio::time::sleep(SETTLE_DELAY).await;
            }
        }

        Ok(true)
    }

    async fn read_profile_text(&self) -> Result<String, BrowserError> {
        {
            let state = self.state.lock().await;
            if let Some(text) = &state.cached_text {
                return Ok(text.clone());
            }
        }

        let html = tokio::time::timeout(self.operation_timeout, self.page.content())
            .await
            .map_err(|_| BrowserError::Timeout { op: "read_profile_text" })??;
        let text = profile_text(&html, &self.selectors.profile_card);

        if !text.trim().is_empty() {
            self.state.lock().await.cached_text = Some(text.clone());
        }
        Ok(text)
    }

    async fn focus_input(&self) -> Result<(), BrowserError> {
        if self.planner.is_some() {
            self.run_planner(
                "Click into the reply/invite message box for this profile so it has \
                 keyboard focus, then stop.",
            )
            .await?;
        }

        let focused = self
            .eval_bool(&build_focus_js(&self.selectors.reply_placeholder_hints))
            .await?;
        if focused {
            Ok(())
        } else {
            Err(BrowserError::SelectorNotFound("reply input".to_string()))
        }
    }

    async fn fill(&self, text: &str) -> Result<(), BrowserError> {
        let cleared = self.eval_bool(CLEAR_ACTIVE_JS).await?;
        if !cleared {
            return Err(BrowserError::SelectorNotFound(
                "focused reply input".to_string(),
            ));
        }
        self.insert_text(text).await
    }

    async fn submit(&self) -> Result<(), BrowserError> {
        self.state.lock().await.pre_submit_url = self.current_url().await?;
        self.submit_via_label_chain().await
    }

    async fn verify_sent(&self) -> Result<bool, BrowserError> {
        tokio::time::sleep(self.verify_window).await;

        if self
            .eval_bool(&build_marker_js(&self.selectors.sent_markers))
            .await?
        {
            return Ok(true);
        }

        let before = self.state.lock().await.pre_submit_url.clone();
        let now = self.current_url().await?;
        Ok(matches!((before, now), (Some(a), Some(b)) if a != b))
    }

    async fn skip(&self) -> Result<(), BrowserError> {
        self.invalidate_cache().await;

        match self
            .page
            .find_element(self.selectors.skip_control.as_str())
            .await
        {
            Ok(control) => {
                control.click().await?;
                tokio::time::sleep(SETTLE_DELAY).await;
            }
            Err(_) => {
                // Some flows auto-advance after a decision; dedupe catches
                // any re-encounter.
                tracing::warn!(
                    selector = %self.selectors.skip_control,
                    "skip control not found — relying on listing to advance"
                );
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), BrowserError> {
        let mut browser = self.browser.lock().await;
        browser
            .close()
            .await
            .map_err(|err| BrowserError::Session(err.to_string()))?;
        if let Some(task) = self.handler_task.lock().await.take() {
            task.abort();
        }
        Ok(())
    }

    fn engine(&self) -> &'static str {
        if self.planner.is_some() {
            "planner"
        } else {
            "selector"
        }
    }
}

#[async_trait]
impl ActionSurface for ChromeDriver {
    async fn screenshot_png(&self) -> Result<Vec<u8>, BrowserError> {
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(false)
            .build();
        Ok(self.page.screenshot(params).await?)
    }

    async fn execute_action(&self, action: &ComputerAction) -> Result<(), BrowserError> {
        match action {
            ComputerAction::Click { x, y, .. } => self.click_at(*x, *y).await,
            ComputerAction::DoubleClick { x, y } => {
                self.click_at(*x, *y).await?;
                self.click_at(*x, *y).await
            }
            ComputerAction::Type { text } => self.insert_text(text).await,
            ComputerAction::Keypress { keys } => {
                for key in keys {
                    self.press_key(key).await?;
                }
                Ok(())
            }
            ComputerAction::Scroll {
                x,
                y,
                scroll_x,
                scroll_y,
            } => self.scroll_by(*x, *y, *scroll_x, *scroll_y).await,
            ComputerAction::Move { .. } | ComputerAction::Wait => {
                tokio::time::sleep(SETTLE_DELAY).await;
                Ok(())
            }
            ComputerAction::Screenshot => Ok(()),
            ComputerAction::Unknown => {
                tracing::warn!("planner requested an unrecognized action — ignoring");
                Ok(())
            }
        }
    }
}

// ── JS builders ──────────────────────────────────────────────────────────────
// Selector strings and label lists are injected as JSON so quoting in the
// config can never break out of the script.

fn build_probe_js(selector: &str) -> String {
    format!(
        "!!document.querySelector({})",
        serde_json::to_string(selector).unwrap_or_else(|_| "\"\"".to_string())
    )
}

fn build_focus_js(placeholder_hints: &[String]) -> String {
    let hints = serde_json::to_string(
        &placeholder_hints
            .iter()
            .map(|h| h.to_lowercase())
            .collect::<Vec<_>>(),
    )
    .unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"(() => {{
  const hints = {hints};
  const visible = el => !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
  const fields = Array.from(document.querySelectorAll('textarea, input[type="text"], [contenteditable="true"]')).filter(visible);
  let target = fields.find(el => {{
    const ph = (el.getAttribute('placeholder') || el.getAttribute('aria-label') || '').toLowerCase();
    return hints.some(h => ph.includes(h));
  }});
  if (!target) target = fields.find(el => el.tagName === 'TEXTAREA');
  if (!target) target = fields[0];
  if (!target) return false;
  target.focus();
  return document.activeElement === target;
}})()"#
    )
}

fn build_submit_label_js(labels: &[String]) -> String {
    let labels = serde_json::to_string(
        &labels.iter().map(|l| l.to_lowercase()).collect::<Vec<_>>(),
    )
    .unwrap_or_else(|_| "[]".to_string());
    format!(
        r#"(() => {{
  const labels = {labels};
  const visible = el => !!(el.offsetWidth || el.offsetHeight || el.getClientRects().length);
  const controls = Array.from(document.querySelectorAll('button, [role="button"], input[type="submit"]')).filter(visible);
  const target = controls.find(el => labels.includes(((el.innerText || el.value || '')).trim().toLowerCase()));
  if (!target) return false;
  target.click();
  return true;
}})()"#
    )
}

const CLICK_SUBMIT_TYPE_JS: &str = r#"(() => {
  const el = document.querySelector('button[type="submit"], input[type="submit"]');
  if (!el) return false;
  el.click();
  return true;
})()"#;

const CLEAR_ACTIVE_JS: &str = r#"(() => {
  const el = document.activeElement;
  if (!el || el === document.body) return false;
  if ('value' in el) { el.value = ''; } else { el.textContent = ''; }
  el.dispatchEvent(new Event('input', { bubbles: true }));
  return true;
})()"#;

fn build_marker_js(markers: &[String]) -> String {
    let markers =
        serde_json::to_string(markers).unwrap_or_else(|_| "[]".to_string());
    format!(
        "(() => {{ const markers = {markers}; \
         return markers.some(m => {{ try {{ return !!document.querySelector(m); }} catch (e) {{ return false; }} }}); }})()"
    )
}

/// Printable text payload for a key-down event, when the key has one.
fn key_text(key: &str) -> Option<&str> {
    match key {
        "Enter" => Some("\r"),
        "Tab" => Some("\t"),
        "Space" | " " => Some(" "),
        _ if key.chars().count() == 1 => Some(key),
        _ => None,
    }
}
