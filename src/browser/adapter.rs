//! Page driving over CDP
//!
//! Workers attach to a remote browser through its control URL and drive a
//! single page: screenshots, coordinate-level input, and navigation. All
//! coordinates entering [`PageDriver::execute`] are normalized 0..999 and
//! denormalized here against the configured viewport.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chromiumoxide::Browser;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchKeyEventParams, DispatchKeyEventType, DispatchMouseEventParams,
    DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams,
};
use chromiumoxide::page::Page;
use futures_util::StreamExt;
use log::{debug, info, warn};
use rand::Rng;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::actions::{Action, ActionOutcome, ScrollDirection, denormalize};
use super::interception::{InterceptionPolicy, install_request_interception};
use crate::config::Viewport;
use crate::session::SessionHandle;

/// Deadline applied to navigations triggered by workers.
pub const NAVIGATION_DEADLINE: Duration = Duration::from_secs(300);

const NETWORK_IDLE_WAIT: Duration = Duration::from_secs(5);
const INTER_KEY_DELAY: Duration = Duration::from_millis(35);

/// Screenshot plus the URL it was taken at.
#[derive(Debug, Clone)]
pub struct Screenshot {
    pub data: Vec<u8>,
    pub url: String,
}

/// Abstract page surface used by the worker, prober, extractor, and
/// CAPTCHA delegator.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Capture the current viewport as PNG plus the page URL.
    async fn screenshot(&self) -> Result<Screenshot>;

    /// Current page URL, empty while unresolvable.
    async fn current_url(&self) -> String;

    /// Viewport dimensions the driver denormalizes against.
    fn viewport(&self) -> Viewport;

    /// Dispatch one action. Never errors: failures come back structured.
    async fn execute(&self, action: &Action) -> ActionOutcome;

    /// Navigate and wait for load, bounded by `deadline`. A timeout is an
    /// error for the caller to tolerate.
    async fn navigate(&self, url: &str, deadline: Duration) -> Result<()>;
}

/// Opens CDP connections to remote sessions.
#[async_trait]
pub trait BrowserConnector: Send + Sync {
    async fn attach(&self, handle: &SessionHandle) -> Result<Box<dyn PageDriver>>;
}

/// Messages marking DOM probes that raced a navigation. These are
/// transient: callers get empty data instead of an error.
fn is_transient_page_error(message: &str) -> bool {
    let lower = message.to_lowercase();
    ["context destroyed", "target closed", "navigation"]
        .iter()
        .any(|needle| lower.contains(needle))
}

/// Page driven over a remote CDP websocket.
///
/// Holds the CDP event handler task; dropping the driver aborts it, which
/// detaches from the remote browser without tearing the session down (the
/// provider owns session teardown).
pub struct CdpPage {
    page: Page,
    _browser: Browser,
    handler_task: JoinHandle<()>,
    viewport: Viewport,
}

impl Drop for CdpPage {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

impl CdpPage {
    /// Attach to a session's control URL and prepare its first page.
    pub async fn connect(
        control_url: &str,
        viewport: Viewport,
        interception: &InterceptionPolicy,
    ) -> Result<Self> {
        let parsed = url::Url::parse(control_url).context("Invalid control URL")?;
        if !matches!(parsed.scheme(), "ws" | "wss") {
            return Err(anyhow!(
                "control URL must be a websocket endpoint, got scheme {:?}",
                parsed.scheme()
            ));
        }

        info!("Attaching to remote browser at control URL");
        let (browser, mut handler) = Browser::connect(control_url)
            .await
            .context("Failed to connect to remote browser control URL")?;

        let handler_task = tokio::task::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    log::error!("Browser handler error: {e:?}");
                }
            }
            debug!("Browser event handler task completed");
        });

        let existing = browser.pages().await.ok().and_then(|mut pages| {
            if pages.is_empty() {
                None
            } else {
                Some(pages.remove(0))
            }
        });
        let page = match existing {
            Some(page) => page,
            None => browser
                .new_page("about:blank")
                .await
                .context("Failed to open page on remote browser")?,
        };

        install_request_interception(&page, interception).await?;

        Ok(Self {
            page,
            _browser: browser,
            handler_task,
            viewport,
        })
    }

    /// Post-action settle: bounded network-idle wait plus a short jittered
    /// pause for rendering.
    async fn settle(&self) {
        let _ = tokio::time::timeout(NETWORK_IDLE_WAIT, self.page.wait_for_navigation()).await;
        let pause = rand::rng().random_range(500..=1000);
        tokio::time::sleep(Duration::from_millis(pause)).await;
    }

    async fn dispatch_mouse(
        &self,
        kind: DispatchMouseEventType,
        x: i64,
        y: i64,
        button: Option<MouseButton>,
    ) -> Result<()> {
        let mut builder = DispatchMouseEventParams::builder()
            .r#type(kind)
            .x(x as f64)
            .y(y as f64);
        if let Some(button) = button {
            builder = builder.button(button).click_count(1);
        }
        let params = builder.build().map_err(|e| anyhow!("{e}"))?;
        self.page.execute(params).await?;
        Ok(())
    }

    async fn click_at(&self, x: i64, y: i64) -> Result<()> {
        self.dispatch_mouse(DispatchMouseEventType::MouseMoved, x, y, None)
            .await?;
        self.dispatch_mouse(
            DispatchMouseEventType::MousePressed,
            x,
            y,
            Some(MouseButton::Left),
        )
        .await?;
        self.dispatch_mouse(
            DispatchMouseEventType::MouseReleased,
            x,
            y,
            Some(MouseButton::Left),
        )
        .await?;
        Ok(())
    }

    async fn press_key(&self, key: &str, code: &str, vkey: i64, text: Option<&str>) -> Result<()> {
        let mut down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .key(key)
            .code(code)
            .windows_virtual_key_code(vkey);
        if let Some(text) = text {
            down = down.text(text);
        }
        self.page
            .execute(down.build().map_err(|e| anyhow!("{e}"))?)
            .await?;

        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .key(key)
            .code(code)
            .windows_virtual_key_code(vkey)
            .build()
            .map_err(|e| anyhow!("{e}"))?;
        self.page.execute(up).await?;
        Ok(())
    }

    /// Remote sessions present a desktop fingerprint, so select-all is
    /// Ctrl+A rather than the host platform's chord.
    async fn clear_field(&self) -> Result<()> {
        let select_all = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .modifiers(2) // Ctrl
            .key("a")
            .code("KeyA")
            .windows_virtual_key_code(65)
            .build()
            .map_err(|e| anyhow!("{e}"))?;
        self.page.execute(select_all).await?;
        let release = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .modifiers(2)
            .key("a")
            .code("KeyA")
            .windows_virtual_key_code(65)
            .build()
            .map_err(|e| anyhow!("{e}"))?;
        self.page.execute(release).await?;
        self.press_key("Backspace", "Backspace", 8, None).await?;
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        for ch in text.chars() {
            let params = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::Char)
                .text(ch.to_string())
                .build()
                .map_err(|e| anyhow!("{e}"))?;
            self.page.execute(params).await?;
            tokio::time::sleep(INTER_KEY_DELAY).await;
        }
        Ok(())
    }

    async fn scroll(
        &self,
        direction: ScrollDirection,
        magnitude: Option<i64>,
        x: Option<i64>,
        y: Option<i64>,
    ) -> Result<()> {
        let viewport = self.viewport;
        let at_x = x
            .map(|v| denormalize(v, viewport.width))
            .unwrap_or_else(|| i64::from(viewport.width) / 2);
        let at_y = y
            .map(|v| denormalize(v, viewport.height))
            .unwrap_or_else(|| i64::from(viewport.height) / 2);
        let amount = magnitude.unwrap_or(500) as f64;
        let (dx, dy) = match direction {
            ScrollDirection::Up => (0.0, -amount),
            ScrollDirection::Down => (0.0, amount),
            ScrollDirection::Left => (-amount, 0.0),
            ScrollDirection::Right => (amount, 0.0),
        };
        let params = DispatchMouseEventParams::builder()
            .r#type(DispatchMouseEventType::MouseWheel)
            .x(at_x as f64)
            .y(at_y as f64)
            .delta_x(dx)
            .delta_y(dy)
            .build()
            .map_err(|e| anyhow!("{e}"))?;
        self.page.execute(params).await?;
        Ok(())
    }

    async fn key_chord(&self, chord: &str) -> Result<()> {
        let mut modifiers = 0i64;
        let mut key = "";
        for part in chord.split('+') {
            match part.trim() {
                "Control" | "Ctrl" => modifiers |= 2,
                "Alt" => modifiers |= 1,
                "Shift" => modifiers |= 8,
                "Meta" | "Cmd" => modifiers |= 4,
                other => key = other,
            }
        }
        if key.is_empty() {
            return Err(anyhow!("key chord {chord:?} has no terminal key"));
        }
        let (code, vkey, text) = key_metadata(key);
        let mut down = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyDown)
            .modifiers(modifiers)
            .key(key)
            .code(code)
            .windows_virtual_key_code(vkey);
        if let Some(text) = text {
            down = down.text(text);
        }
        self.page
            .execute(down.build().map_err(|e| anyhow!("{e}"))?)
            .await?;
        let up = DispatchKeyEventParams::builder()
            .r#type(DispatchKeyEventType::KeyUp)
            .modifiers(modifiers)
            .key(key)
            .code(code)
            .windows_virtual_key_code(vkey)
            .build()
            .map_err(|e| anyhow!("{e}"))?;
        self.page.execute(up).await?;
        Ok(())
    }

    async fn dispatch(&self, action: &Action) -> Result<()> {
        let viewport = self.viewport;
        let px = |v: i64| denormalize(v, viewport.width);
        let py = |v: i64| denormalize(v, viewport.height);

        match action {
            Action::Click { x, y } => self.click_at(px(*x), py(*y)).await,
            Action::Type {
                x,
                y,
                text,
                press_enter,
                clear_first,
            } => {
                self.click_at(px(*x), py(*y)).await?;
                if *clear_first {
                    self.clear_field().await?;
                }
                self.type_text(text).await?;
                if *press_enter {
                    self.press_key("Enter", "Enter", 13, Some("\r")).await?;
                }
                Ok(())
            }
            Action::Drag { x0, y0, x1, y1 } => {
                self.dispatch_mouse(DispatchMouseEventType::MouseMoved, px(*x0), py(*y0), None)
                    .await?;
                self.dispatch_mouse(
                    DispatchMouseEventType::MousePressed,
                    px(*x0),
                    py(*y0),
                    Some(MouseButton::Left),
                )
                .await?;
                self.dispatch_mouse(DispatchMouseEventType::MouseMoved, px(*x1), py(*y1), None)
                    .await?;
                self.dispatch_mouse(
                    DispatchMouseEventType::MouseReleased,
                    px(*x1),
                    py(*y1),
                    Some(MouseButton::Left),
                )
                .await?;
                Ok(())
            }
            Action::Scroll {
                direction,
                magnitude,
                x,
                y,
            } => self.scroll(*direction, *magnitude, *x, *y).await,
            Action::Key { chord } => self.key_chord(chord).await,
            Action::Navigate { url } => {
                self.page.goto(url.as_str()).await?;
                Ok(())
            }
            Action::Wait { seconds } => {
                // Model-requested waits are capped; the worker deadline is
                // the real time bound.
                let capped = seconds.clamp(0.0, 30.0);
                tokio::time::sleep(Duration::from_secs_f64(capped)).await;
                Ok(())
            }
            Action::Hover { x, y } | Action::Move { x, y } => {
                self.dispatch_mouse(DispatchMouseEventType::MouseMoved, px(*x), py(*y), None)
                    .await
            }
            Action::Unsupported { name } => Err(anyhow!("unsupported action {name}")),
        }
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn screenshot(&self) -> Result<Screenshot> {
        let params = CaptureScreenshotParams {
            format: Some(CaptureScreenshotFormat::Png),
            ..Default::default()
        };
        let url = self.current_url().await;
        match self.page.screenshot(params).await {
            Ok(data) => Ok(Screenshot { data, url }),
            Err(e) if is_transient_page_error(&e.to_string()) => {
                debug!("Screenshot raced a navigation, returning empty capture: {e}");
                Ok(Screenshot {
                    data: Vec::new(),
                    url,
                })
            }
            Err(e) => Err(anyhow!("Failed to capture screenshot: {e}")),
        }
    }

    async fn current_url(&self) -> String {
        match self.page.url().await {
            Ok(url) => url.unwrap_or_default(),
            Err(e) => {
                if !is_transient_page_error(&e.to_string()) {
                    warn!("Failed to read page URL: {e}");
                }
                String::new()
            }
        }
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    async fn execute(&self, action: &Action) -> ActionOutcome {
        if let Action::Unsupported { name } = action {
            debug!("Refusing unknown action variant {name:?}");
            return ActionOutcome::unimplemented();
        }
        match self.dispatch(action).await {
            Ok(()) => {
                self.settle().await;
                ActionOutcome::success()
            }
            Err(e) if is_transient_page_error(&e.to_string()) => {
                debug!("Action {} raced a navigation: {e}", action.kind());
                self.settle().await;
                ActionOutcome::success()
            }
            Err(e) => ActionOutcome::failure(e.to_string()),
        }
    }

    async fn navigate(&self, url: &str, deadline: Duration) -> Result<()> {
        let navigation = async {
            self.page
                .goto(url)
                .await
                .map_err(|e| anyhow!("navigation failed: {e}"))?;
            self.page
                .wait_for_navigation()
                .await
                .map_err(|e| anyhow!("page load failed: {e}"))?;
            Ok::<_, anyhow::Error>(())
        };
        tokio::time::timeout(deadline, navigation)
            .await
            .map_err(|_| anyhow!("navigation timed out after {deadline:?}"))?
    }
}

/// CDP connector used in production.
pub struct CdpConnector {
    viewport: Viewport,
    interception: InterceptionPolicy,
}

impl CdpConnector {
    #[must_use]
    pub fn new(viewport: Viewport, interception: InterceptionPolicy) -> Self {
        Self {
            viewport,
            interception,
        }
    }
}

#[async_trait]
impl BrowserConnector for CdpConnector {
    async fn attach(&self, handle: &SessionHandle) -> Result<Box<dyn PageDriver>> {
        let driver =
            CdpPage::connect(&handle.control_url, self.viewport, &self.interception).await?;
        Ok(Box::new(driver))
    }
}

/// Code, Windows virtual key, and text payload for common named keys.
fn key_metadata(key: &str) -> (&'static str, i64, Option<&'static str>) {
    match key {
        "Enter" => ("Enter", 13, Some("\r")),
        "Tab" => ("Tab", 9, None),
        "Escape" => ("Escape", 27, None),
        "Backspace" => ("Backspace", 8, None),
        "Delete" => ("Delete", 46, None),
        "ArrowUp" => ("ArrowUp", 38, None),
        "ArrowDown" => ("ArrowDown", 40, None),
        "ArrowLeft" => ("ArrowLeft", 37, None),
        "ArrowRight" => ("ArrowRight", 39, None),
        "PageUp" => ("PageUp", 33, None),
        "PageDown" => ("PageDown", 34, None),
        "Home" => ("Home", 36, None),
        "End" => ("End", 35, None),
        _ => ("", 0, None),
    }
}
