//! Contact lookup over the virtualized contact list
//!
//! The client only renders the rows inside the visible window, so both
//! lookups walk the list by scrolling a fixed step and giving lazy rows a
//! moment to render after each step.

use crate::config::Config;
use crate::dom::{ChatDom, ScrollMetrics};
use crate::error::Result;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

/// Scroll-driven contact lookups. Reads and scrolls only.
#[derive(Debug, Clone)]
pub struct ContactDirectory {
    step_px: u32,
    delay: Duration,
}

impl ContactDirectory {
    pub fn new(config: &Config) -> Self {
        Self {
            step_px: config.scroll_step_px,
            delay: config.scroll_delay(),
        }
    }

    /// Check whether a contact titled exactly `name` exists.
    ///
    /// Stops scrolling as soon as the entry is rendered, leaving it on
    /// screen so it can be clicked. When the list is exhausted without a
    /// match the list is scrolled back to the top.
    pub async fn exists<D: ChatDom + ?Sized>(&self, dom: &D, name: &str) -> Result<bool> {
        let Some(mut metrics) = self.start_from_top(dom).await? else {
            debug!(contact = %name, "contact list not rendered");
            return Ok(false);
        };

        while !metrics.at_end() {
            if dom.contact_rendered(name).await? {
                return Ok(true);
            }
            match self.advance(dom, metrics).await? {
                Some(next) => metrics = next,
                None => break,
            }
        }

        // Final check against the fully scrolled state
        let found = dom.contact_rendered(name).await?;
        if !found {
            dom.scroll_contacts_to_top().await?;
            self.settle().await;
        }
        Ok(found)
    }

    /// Collect every contact display name, scrolling the list top to bottom
    /// once. Names accumulate across steps since rows scrolled past are
    /// unrendered again.
    pub async fn list_all<D: ChatDom + ?Sized>(&self, dom: &D) -> Result<HashSet<String>> {
        let mut names = HashSet::new();

        let Some(mut metrics) = self.start_from_top(dom).await? else {
            return Ok(names);
        };

        while !metrics.at_end() {
            names.extend(dom.rendered_contact_names().await?);
            match self.advance(dom, metrics).await? {
                Some(next) => metrics = next,
                None => break,
            }
        }
        names.extend(dom.rendered_contact_names().await?);

        dom.scroll_contacts_to_top().await?;
        self.settle().await;
        debug!(count = names.len(), "listed contacts");
        Ok(names)
    }

    async fn start_from_top<D: ChatDom + ?Sized>(&self, dom: &D) -> Result<Option<ScrollMetrics>> {
        match dom.contact_scroll_metrics().await? {
            Some(metrics) if metrics.top > 0.0 => {
                dom.scroll_contacts_to_top().await?;
                self.settle().await;
                dom.contact_scroll_metrics().await
            }
            other => Ok(other),
        }
    }

    /// Scroll one step and wait for lazy rows. `None` when the list stopped
    /// moving or disappeared.
    async fn advance<D: ChatDom + ?Sized>(
        &self,
        dom: &D,
        before: ScrollMetrics,
    ) -> Result<Option<ScrollMetrics>> {
        dom.scroll_contacts_by(self.step_px).await?;
        self.settle().await;

        Ok(dom
            .contact_scroll_metrics()
            .await?
            .filter(|after| after.top > before.top))
    }

    /// Give lazily rendered rows time to appear after any scroll
    async fn settle(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}
