//! Handle into a live, authenticated chat-client page

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Keys the relay presses on its own (text goes through `type_text`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Enter,
    Escape,
    Shift,
}

impl Key {
    /// DOM `KeyboardEvent.key` value
    pub fn name(self) -> &'static str {
        match self {
            Key::Enter => "Enter",
            Key::Escape => "Escape",
            Key::Shift => "Shift",
        }
    }
}

/// Browser page operations. Every call is awaited to completion before the
/// next one is issued; the page is a single shared mutable resource.
#[async_trait]
pub trait PageAccessor: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    /// Evaluate a JavaScript expression and return its JSON value
    /// (`Value::Null` for `null`/`undefined`).
    async fn evaluate(&self, script: &str) -> Result<Value>;

    async fn click(&self, selector: &str) -> Result<()>;

    /// Type literal text into the focused element
    async fn type_text(&self, text: &str) -> Result<()>;

    async fn key_down(&self, key: Key) -> Result<()>;

    async fn key_up(&self, key: Key) -> Result<()>;

    async fn press_key(&self, key: Key) -> Result<()>;

    /// Wait until `selector` matches, failing with `Error::Timeout`
    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()>;
}

#[async_trait]
impl<T: PageAccessor + ?Sized> PageAccessor for Arc<T> {
    async fn navigate(&self, url: &str) -> Result<()> {
        (**self).navigate(url).await
    }

    async fn evaluate(&self, script: &str) -> Result<Value> {
        (**self).evaluate(script).await
    }

    async fn click(&self, selector: &str) -> Result<()> {
        (**self).click(selector).await
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        (**self).type_text(text).await
    }

    async fn key_down(&self, key: Key) -> Result<()> {
        (**self).key_down(key).await
    }

    async fn key_up(&self, key: Key) -> Result<()> {
        (**self).key_up(key).await
    }

    async fn press_key(&self, key: Key) -> Result<()> {
        (**self).press_key(key).await
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        (**self).wait_for_selector(selector, timeout).await
    }
}
