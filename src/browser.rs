//! Chromium-backed [`PageAccessor`] over the DevTools protocol

use crate::config::Config;
use crate::error::{Error, Result};
use crate::page::{Key, PageAccessor};
use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::input::{DispatchKeyEventParams, DispatchKeyEventType};
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use serde_json::Value;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// CDP modifier bit for Shift
const MODIFIER_SHIFT: i64 = 8;

/// Interval between selector checks while waiting
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// A single Chromium page with a persistent profile
pub struct ChromePage {
    browser: Mutex<Browser>,
    page: Page,
    handler: JoinHandle<()>,
    /// Modifier keys currently held down
    modifiers: AtomicI64,
}

impl ChromePage {
    /// Launch Chromium with the configured profile directory and open one page
    pub async fn launch(config: &Config) -> Result<Self> {
        std::fs::create_dir_all(&config.user_data_dir)?;

        let mut builder = BrowserConfig::builder().user_data_dir(&config.user_data_dir);

        // chromiumoxide runs headless unless asked for a window
        if !config.headless {
            builder = builder.with_head();
        }

        if let Some(ref path) = config.chrome_path {
            builder = builder.chrome_executable(path);
        }

        let browser_config = builder
            .arg("--no-sandbox")
            .arg("--disable-setuid-sandbox")
            .arg("--disable-dev-shm-usage")
            .build()
            .map_err(|e| Error::Browser(format!("failed to build browser config: {}", e)))?;

        let (browser, mut handler) = Browser::launch(browser_config)
            .await
            .map_err(|e| Error::Browser(format!("browser launch failed: {}", e)))?;

        let handler = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler event error");
                }
            }
        });

        let page = browser.new_page("about:blank").await?;

        info!(
            profile = %config.user_data_dir.display(),
            headless = config.headless,
            "browser started"
        );

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            handler,
            modifiers: AtomicI64::new(0),
        })
    }

    /// Close the browser and stop the event handler
    pub async fn close(&self) -> Result<()> {
        let mut browser = self.browser.lock().await;
        browser.close().await?;
        self.handler.abort();
        info!("browser closed");
        Ok(())
    }

    async fn dispatch_key(&self, event: DispatchKeyEventType, key: Key) -> Result<()> {
        let (code, virtual_key) = match key {
            Key::Enter => ("Enter", 13),
            Key::Escape => ("Escape", 27),
            Key::Shift => ("ShiftLeft", 16),
        };

        let mut builder = DispatchKeyEventParams::builder()
            .r#type(event.clone())
            .key(key.name())
            .code(code)
            .windows_virtual_key_code(virtual_key)
            .modifiers(self.modifiers.load(Ordering::SeqCst));

        if key == Key::Enter && event == DispatchKeyEventType::KeyDown {
            builder = builder.text("\r").unmodified_text("\r");
        }

        let params = builder.build().map_err(Error::Browser)?;
        self.page.execute(params).await?;
        Ok(())
    }

    fn modifier_bit(key: Key) -> i64 {
        match key {
            Key::Shift => MODIFIER_SHIFT,
            Key::Enter | Key::Escape => 0,
        }
    }
}

#[async_trait]
impl PageAccessor for ChromePage {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.page.goto(url).await?;
        debug!(url, "navigated");
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| Error::Script(e.to_string()))?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self.page.find_element(selector).await?;
        element.click().await?;
        debug!(selector, "clicked element");
        Ok(())
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        for c in text.chars() {
            let key_down = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::KeyDown)
                .text(c.to_string())
                .build()
                .map_err(Error::Browser)?;
            self.page.execute(key_down).await?;

            let key_up = DispatchKeyEventParams::builder()
                .r#type(DispatchKeyEventType::KeyUp)
                .text(c.to_string())
                .build()
                .map_err(Error::Browser)?;
            self.page.execute(key_up).await?;
        }
        Ok(())
    }

    async fn key_down(&self, key: Key) -> Result<()> {
        self.modifiers
            .fetch_or(Self::modifier_bit(key), Ordering::SeqCst);
        self.dispatch_key(DispatchKeyEventType::KeyDown, key).await
    }

    async fn key_up(&self, key: Key) -> Result<()> {
        self.modifiers
            .fetch_and(!Self::modifier_bit(key), Ordering::SeqCst);
        self.dispatch_key(DispatchKeyEventType::KeyUp, key).await
    }

    async fn press_key(&self, key: Key) -> Result<()> {
        self.dispatch_key(DispatchKeyEventType::KeyDown, key).await?;
        self.dispatch_key(DispatchKeyEventType::KeyUp, key).await
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let check = format!(
            "document.querySelector({}) !== null",
            Value::String(selector.to_string())
        );
        let deadline = Instant::now() + timeout;

        loop {
            if self.evaluate(&check).await? == Value::Bool(true) {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "selector {} not found after {}ms",
                    selector,
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }
}
