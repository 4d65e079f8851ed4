//! DOM-shape queries against the chat client
//!
//! Everything that knows how the client's markup looks lives behind
//! [`ChatDom`], so the relay logic can run against an in-memory fake.

use crate::config::Selectors;
use crate::error::{Error, Result};
use crate::page::PageAccessor;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

/// Scroll position of the contact list container
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ScrollMetrics {
    pub top: f64,
    pub client_height: f64,
    pub scroll_height: f64,
}

impl ScrollMetrics {
    /// True once the visible window reaches the bottom of the content
    pub fn at_end(&self) -> bool {
        self.top + self.client_height >= self.scroll_height
    }
}

/// Read and scroll operations. None of these change chat state.
#[async_trait]
pub trait ChatDom: Send + Sync {
    /// `None` when the contact list container is not rendered
    async fn contact_scroll_metrics(&self) -> Result<Option<ScrollMetrics>>;

    async fn scroll_contacts_by(&self, px: u32) -> Result<()>;

    async fn scroll_contacts_to_top(&self) -> Result<()>;

    /// Whether an entry titled exactly `name` is currently rendered
    async fn contact_rendered(&self, name: &str) -> Result<bool>;

    /// Display names of the currently rendered rows
    async fn rendered_contact_names(&self) -> Result<Vec<String>>;

    /// Whether the top chat row carries an unread-message badge
    async fn has_unread_marker(&self) -> Result<bool>;

    /// Full text of the last message in the open chat: its text spans
    /// joined with newlines. `None` when no message is rendered.
    async fn latest_message_text(&self) -> Result<Option<String>>;

    /// Payload of the login QR code, if one is displayed
    async fn qr_payload(&self) -> Result<Option<String>>;
}

/// [`ChatDom`] over a real page, via JavaScript evaluation
#[derive(Debug, Clone)]
pub struct WebChatDom<P> {
    page: P,
    selectors: Selectors,
}

impl<P: PageAccessor> WebChatDom<P> {
    pub fn new(page: P, selectors: Selectors) -> Self {
        Self { page, selectors }
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    async fn eval_bool(&self, script: &str) -> Result<bool> {
        match self.page.evaluate(script).await? {
            Value::Bool(b) => Ok(b),
            Value::Null => Ok(false),
            other => Err(Error::Script(format!("expected boolean, got {}", other))),
        }
    }

    async fn eval_opt_string(&self, script: &str) -> Result<Option<String>> {
        match self.page.evaluate(script).await? {
            Value::String(s) => Ok(Some(s)),
            Value::Null => Ok(None),
            other => Err(Error::Script(format!("expected string, got {}", other))),
        }
    }
}

/// Quote a value as a JavaScript string literal
fn js(value: &str) -> String {
    Value::String(value.to_string()).to_string()
}

#[async_trait]
impl<P: PageAccessor> ChatDom for WebChatDom<P> {
    async fn contact_scroll_metrics(&self) -> Result<Option<ScrollMetrics>> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({scroller});
                if (!el) return null;
                return {{ top: el.scrollTop, client_height: el.clientHeight, scroll_height: el.scrollHeight }};
            }})()"#,
            scroller = js(&self.selectors.contact_scroller)
        );

        match self.page.evaluate(&script).await? {
            Value::Null => Ok(None),
            value => Ok(Some(serde_json::from_value(value)?)),
        }
    }

    async fn scroll_contacts_by(&self, px: u32) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({scroller});
                if (el) el.scrollBy(0, {px});
                return !!el;
            }})()"#,
            scroller = js(&self.selectors.contact_scroller)
        );
        self.page.evaluate(&script).await?;
        Ok(())
    }

    async fn scroll_contacts_to_top(&self) -> Result<()> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({scroller});
                if (el) el.scrollTo(0, 0);
                return !!el;
            }})()"#,
            scroller = js(&self.selectors.contact_scroller)
        );
        self.page.evaluate(&script).await?;
        Ok(())
    }

    async fn contact_rendered(&self, name: &str) -> Result<bool> {
        let script = format!(
            "document.querySelector({}) !== null",
            js(&self.selectors.contact_title(name))
        );
        self.eval_bool(&script).await
    }

    async fn rendered_contact_names(&self) -> Result<Vec<String>> {
        let script = format!(
            r#"Array.from(document.querySelectorAll({row}))
                .map(row => {{
                    const el = row.querySelector({name});
                    if (!el) return null;
                    return el.getAttribute("title") || el.textContent;
                }})
                .filter(Boolean)"#,
            row = js(&self.selectors.contact_row),
            name = js(&self.selectors.contact_row_name)
        );

        match self.page.evaluate(&script).await? {
            Value::Null => Ok(Vec::new()),
            value => Ok(serde_json::from_value(value)?),
        }
    }

    async fn has_unread_marker(&self) -> Result<bool> {
        let script = format!(
            r#"(() => {{
                const list = document.querySelector({list});
                if (!list) return false;
                const row = list.querySelector({row});
                return !!(row && row.querySelector({badge}));
            }})()"#,
            list = js(&self.selectors.chat_list),
            row = js(&self.selectors.contact_row),
            badge = js(&self.selectors.unread_badge)
        );
        self.eval_bool(&script).await
    }

    async fn latest_message_text(&self) -> Result<Option<String>> {
        let script = format!(
            r#"(() => {{
                const blocks = document.querySelectorAll({block});
                const last = blocks[blocks.length - 1];
                const container = last && last.querySelector({text});
                if (!container) return null;
                return Array.from(container.querySelectorAll("span"))
                    .map(span => span.innerText)
                    .join("\n");
            }})()"#,
            block = js(&self.selectors.message_block),
            text = js(&self.selectors.message_text)
        );
        self.eval_opt_string(&script).await
    }

    async fn qr_payload(&self) -> Result<Option<String>> {
        let script = format!(
            r#"(() => {{
                const el = document.querySelector({qr});
                return el ? el.getAttribute({attr}) : null;
            }})()"#,
            qr = js(&self.selectors.qr_code),
            attr = js(&self.selectors.qr_attribute)
        );
        self.eval_opt_string(&script).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::Key;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Answers every evaluation with one canned value and keeps the scripts
    struct CannedPage {
        answer: Value,
        scripts: Mutex<Vec<String>>,
    }

    impl CannedPage {
        fn new(answer: Value) -> Self {
            Self {
                answer,
                scripts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl PageAccessor for CannedPage {
        async fn navigate(&self, _url: &str) -> Result<()> {
            Ok(())
        }

        async fn evaluate(&self, script: &str) -> Result<Value> {
            self.scripts.lock().unwrap().push(script.to_string());
            Ok(self.answer.clone())
        }

        async fn click(&self, _selector: &str) -> Result<()> {
            Ok(())
        }

        async fn type_text(&self, _text: &str) -> Result<()> {
            Ok(())
        }

        async fn key_down(&self, _key: Key) -> Result<()> {
            Ok(())
        }

        async fn key_up(&self, _key: Key) -> Result<()> {
            Ok(())
        }

        async fn press_key(&self, _key: Key) -> Result<()> {
            Ok(())
        }

        async fn wait_for_selector(&self, _selector: &str, _timeout: Duration) -> Result<()> {
            Ok(())
        }
    }

    fn dom(answer: Value) -> WebChatDom<CannedPage> {
        WebChatDom::new(CannedPage::new(answer), Selectors::default())
    }

    #[test]
    fn test_scroll_metrics_at_end() {
        let m = ScrollMetrics {
            top: 0.0,
            client_height: 500.0,
            scroll_height: 1000.0,
        };
        assert!(!m.at_end());

        let m = ScrollMetrics { top: 500.0, ..m };
        assert!(m.at_end());

        // Short list that fits entirely
        let m = ScrollMetrics {
            top: 0.0,
            client_height: 500.0,
            scroll_height: 200.0,
        };
        assert!(m.at_end());
    }

    #[tokio::test]
    async fn test_missing_scroller_is_none() {
        let dom = dom(Value::Null);
        assert_eq!(dom.contact_scroll_metrics().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_scroll_metrics_parsed() {
        let dom = dom(serde_json::json!({
            "top": 100.5, "client_height": 400, "scroll_height": 2000
        }));
        let m = dom.contact_scroll_metrics().await.unwrap().unwrap();
        assert_eq!(m.top, 100.5);
        assert_eq!(m.client_height, 400.0);
        assert!(!m.at_end());
    }

    #[tokio::test]
    async fn test_contact_rendered_uses_title_selector() {
        let dom = dom(Value::Bool(true));
        assert!(dom.contact_rendered("Alice").await.unwrap());

        let scripts = dom.page().scripts.lock().unwrap();
        assert!(scripts[0].contains(r#"span[title=\"Alice\"]"#));
    }

    #[tokio::test]
    async fn test_rendered_names_parsed() {
        let dom = dom(serde_json::json!(["Alice", "Bob"]));
        assert_eq!(
            dom.rendered_contact_names().await.unwrap(),
            vec!["Alice".to_string(), "Bob".to_string()]
        );
    }

    #[tokio::test]
    async fn test_unexpected_shape_is_script_error() {
        let dom = dom(serde_json::json!(42));
        assert!(matches!(
            dom.has_unread_marker().await,
            Err(Error::Script(_))
        ));
        assert!(matches!(
            dom.latest_message_text().await,
            Err(Error::Script(_))
        ));
    }

    #[tokio::test]
    async fn test_latest_message_text() {
        let dom = dom(Value::String("#Alice\nhello".into()));
        assert_eq!(
            dom.latest_message_text().await.unwrap().as_deref(),
            Some("#Alice\nhello")
        );
    }

    #[tokio::test]
    async fn test_qr_payload_absent() {
        let dom = dom(Value::Null);
        assert_eq!(dom.qr_payload().await.unwrap(), None);
    }
}
