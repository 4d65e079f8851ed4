//! Configuration: timings, paths and DOM selectors

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default chat client location
pub const DEFAULT_CHAT_URL: &str = "https://web.whatsapp.com";

/// Character that opens a routing directive and separates its target names
pub const DEFAULT_CONTACT_PREFIX: char = '#';

/// All configurable paths and constants
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub chat_url: String,
    pub user_data_dir: PathBuf,
    pub chrome_path: Option<PathBuf>,
    pub headless: bool,
    pub contact_prefix: char,
    pub poll_interval_ms: u64,
    pub qr_interval_ms: u64,
    pub qr_wait_ms: u64,
    pub login_wait_ms: u64,
    pub scroll_step_px: u32,
    pub scroll_delay_ms: u64,
    pub composer_wait_ms: u64,
    pub selectors: Selectors,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs::data_dir().unwrap_or_else(|| PathBuf::from("."));

        Self {
            chat_url: DEFAULT_CHAT_URL.to_string(),
            user_data_dir: data_dir.join("broadcast-relay/user_data"),
            chrome_path: None,
            headless: true,
            contact_prefix: DEFAULT_CONTACT_PREFIX,
            poll_interval_ms: 5_000,
            qr_interval_ms: 10_000,
            qr_wait_ms: 60_000,
            login_wait_ms: 5 * 60_000,
            scroll_step_px: 100,
            scroll_delay_ms: 100,
            composer_wait_ms: 30_000,
            selectors: Selectors::default(),
        }
    }
}

impl Config {
    /// Load config from a JSON file, or defaults when no path is given.
    /// Fields missing from the file keep their default values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)?;
                serde_json::from_str(&content)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Create config for testing: no artificial delays, short waits
    pub fn for_test() -> Self {
        Self {
            chat_url: "about:blank".to_string(),
            user_data_dir: std::env::temp_dir().join("broadcast-relay-test"),
            poll_interval_ms: 50,
            qr_interval_ms: 50,
            qr_wait_ms: 10,
            login_wait_ms: 10,
            scroll_delay_ms: 0,
            composer_wait_ms: 10,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(Error::Config("poll_interval_ms must be positive".into()));
        }
        if self.qr_interval_ms == 0 {
            return Err(Error::Config("qr_interval_ms must be positive".into()));
        }
        if self.scroll_step_px == 0 {
            return Err(Error::Config("scroll_step_px must be positive".into()));
        }
        if self.contact_prefix.is_whitespace() {
            return Err(Error::Config(format!(
                "contact_prefix {:?} must not be whitespace",
                self.contact_prefix
            )));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn qr_interval(&self) -> Duration {
        Duration::from_millis(self.qr_interval_ms)
    }

    pub fn qr_wait(&self) -> Duration {
        Duration::from_millis(self.qr_wait_ms)
    }

    pub fn login_wait(&self) -> Duration {
        Duration::from_millis(self.login_wait_ms)
    }

    pub fn scroll_delay(&self) -> Duration {
        Duration::from_millis(self.scroll_delay_ms)
    }

    pub fn composer_wait(&self) -> Duration {
        Duration::from_millis(self.composer_wait_ms)
    }
}

/// CSS selectors identifying regions of the chat client UI.
///
/// These track the markup of one client version and are the values most
/// likely to need updating when the client ships a new build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    /// Scrollable container of the (virtualized) contact list
    pub contact_scroller: String,
    /// One rendered contact/chat row
    pub contact_row: String,
    /// Element inside a row holding the display name
    pub contact_row_name: String,
    /// Chat list pane
    pub chat_list: String,
    /// Unread-message badge inside a chat row
    pub unread_badge: String,
    /// Top row of the chat list (the relay chat when it has news)
    pub top_chat: String,
    /// Appears once a chat is open and its messages are rendered
    pub composer_marker: String,
    /// One message bubble in an open chat
    pub message_block: String,
    /// Text container inside a message bubble
    pub message_text: String,
    /// Login QR code element
    pub qr_code: String,
    /// Attribute of the QR element carrying its payload
    pub qr_attribute: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            contact_scroller: ".x1n2onr6._ak9y".to_string(),
            contact_row: "._ak73".to_string(),
            contact_row_name: "._ak8q .x1iyjqo2".to_string(),
            chat_list: "#pane-side".to_string(),
            unread_badge: ".x1rg5ohu.x173ssrc.x1xaadd7.x682dto.x1e01kqd.x12j7j87.x9bpaai.x1pg5gke.x1s688f.xo5v014.x1u28eo4.x2b8uid.x16dsc37.x18ba5f9.x1sbl2l.xy9co9w.x5r174s.x7h3shv".to_string(),
            top_chat: r#"div[class="_ak72 _ak73 _ak7n"]"#.to_string(),
            composer_marker: ".x1iyjqo2.x6ikm8r.x10wlt62.x1n2onr6.xlyipyv.xuxw1ft.x1rg5ohu._ao3e, .x9f619.x1hx0egp.x1yrsyyn.x1sxyh0.xwib8y2.xohu8s8".to_string(),
            message_block: "._amk4._amkd".to_string(),
            message_text: "._ao3e.selectable-text.copyable-text".to_string(),
            qr_code: "._akau".to_string(),
            qr_attribute: "data-ref".to_string(),
        }
    }
}

impl Selectors {
    /// Selector for the contact entry whose title is exactly `name`
    pub fn contact_title(&self, name: &str) -> String {
        format!("span[title={}]", css_string(name))
    }
}

/// Quote a value as a CSS string literal
pub fn css_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\a "),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
