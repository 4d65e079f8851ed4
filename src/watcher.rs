//! Inbound message detection on the relay chat

use crate::config::{Config, Selectors};
use crate::dom::ChatDom;
use crate::error::Result;
use crate::page::PageAccessor;
use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

/// A message read from the relay chat. Read once per detection.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub raw_text: String,
    pub observed_at: DateTime<Utc>,
}

/// Stateless sampler for the relay chat's unread badge.
///
/// Correctness relies on the client keeping the badge visible until the
/// chat is opened; nothing is remembered between polls.
#[derive(Debug, Clone)]
pub struct InboundWatcher {
    interval: Duration,
    composer_wait: Duration,
    selectors: Selectors,
}

impl InboundWatcher {
    pub fn new(config: &Config) -> Self {
        Self {
            interval: config.poll_interval(),
            composer_wait: config.composer_wait(),
            selectors: config.selectors.clone(),
        }
    }

    /// How often the relay should sample
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Check once for a new-message marker. Pure read.
    pub async fn poll_once<D: ChatDom + ?Sized>(&self, dom: &D) -> Result<bool> {
        let found = dom.has_unread_marker().await?;
        if found {
            debug!("new message marker present");
        }
        Ok(found)
    }

    /// Open the relay chat and read its latest message.
    ///
    /// Fails with a timeout if the chat does not render in time. Returns
    /// `None` when the chat opened but shows no readable message.
    pub async fn open_latest<P, D>(&self, page: &P, dom: &D) -> Result<Option<InboundMessage>>
    where
        P: PageAccessor + ?Sized,
        D: ChatDom + ?Sized,
    {
        page.click(&self.selectors.top_chat).await?;
        page.wait_for_selector(&self.selectors.composer_marker, self.composer_wait)
            .await?;

        let message = dom.latest_message_text().await?.map(|raw_text| InboundMessage {
            raw_text,
            observed_at: Utc::now(),
        });
        Ok(message)
    }
}
