//! Retype a payload into a contact's chat

use crate::config::{Config, Selectors};
use crate::directory::ContactDirectory;
use crate::dom::ChatDom;
use crate::error::Result;
use crate::page::{Key, PageAccessor};
use std::time::Duration;
use tracing::{info, warn};

/// Result of one send attempt that did not error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    Sent,
    ContactNotFound,
}

/// Opens contact chats and replays payloads as keystrokes
#[derive(Debug, Clone)]
pub struct MessageSender {
    directory: ContactDirectory,
    selectors: Selectors,
    composer_wait: Duration,
}

impl MessageSender {
    pub fn new(config: &Config) -> Self {
        Self {
            directory: ContactDirectory::new(config),
            selectors: config.selectors.clone(),
            composer_wait: config.composer_wait(),
        }
    }

    pub fn directory(&self) -> &ContactDirectory {
        &self.directory
    }

    /// Send `payload` to `contact` as a single message.
    ///
    /// A missing contact is a normal outcome and touches no keys. Once the
    /// chat has been clicked, Escape is always pressed at the end, and any
    /// failure in between (such as the composer never appearing) is
    /// returned to the caller.
    pub async fn send<P, D>(&self, page: &P, dom: &D, contact: &str, payload: &str) -> Result<SendOutcome>
    where
        P: PageAccessor + ?Sized,
        D: ChatDom + ?Sized,
    {
        if !self.directory.exists(dom, contact).await? {
            info!(contact = %contact, "contact not found");
            return Ok(SendOutcome::ContactNotFound);
        }

        let typed = self.open_and_type(page, contact, payload).await;

        if let Err(e) = page.press_key(Key::Escape).await {
            warn!(contact = %contact, error = %e, "failed to dismiss chat");
        }

        typed?;
        info!(contact = %contact, "message sent");
        Ok(SendOutcome::Sent)
    }

    async fn open_and_type<P>(&self, page: &P, contact: &str, payload: &str) -> Result<()>
    where
        P: PageAccessor + ?Sized,
    {
        page.click(&self.selectors.contact_title(contact)).await?;
        page.wait_for_selector(&self.selectors.composer_marker, self.composer_wait)
            .await?;
        replay(page, payload).await
    }
}

/// Type `payload` line by line. Lines are joined with Shift+Enter so they
/// stay in one message; a plain Enter after the last line submits it.
pub async fn replay<P: PageAccessor + ?Sized>(page: &P, payload: &str) -> Result<()> {
    let lines: Vec<&str> = payload.split('\n').collect();

    for (i, line) in lines.iter().enumerate() {
        if !line.is_empty() {
            page.type_text(line).await?;
        }
        if i + 1 < lines.len() {
            soft_line_break(page).await?;
        }
    }

    page.press_key(Key::Enter).await
}

async fn soft_line_break<P: PageAccessor + ?Sized>(page: &P) -> Result<()> {
    page.key_down(Key::Shift).await?;
    let pressed = page.press_key(Key::Enter).await;
    page.key_up(Key::Shift).await?;
    pressed
}
