//! Relay engine: detect, parse, dispatch
//!
//! One cycle per watcher tick:
//!
//! ```text
//! Idle -> Detecting -> Parsing -> Dispatching(0..n) -> Idle
//! ```
//!
//! A cycle never fails outward. Errors are logged and the engine returns
//! to `Idle`, ready for the next tick.

use crate::config::Config;
use crate::directive::DirectiveParser;
use crate::dom::ChatDom;
use crate::error::Result;
use crate::page::{Key, PageAccessor};
use crate::scheduler::PeriodicTask;
use crate::sender::{MessageSender, SendOutcome};
use crate::watcher::InboundWatcher;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Where the engine is within a cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Detecting,
    Parsing,
    /// Sending to the target at this index
    Dispatching(usize),
}

/// Outcome of sending to one target of a directive
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Sent,
    ContactNotFound,
    Failed(String),
}

/// One (directive, target) unit of work. Logged, never stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayAttempt {
    pub target: String,
    pub outcome: AttemptOutcome,
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Previous tick still in flight
    Skipped,
    NoNewMessage,
    /// Latest message was not a directive
    Ignored,
    /// Directive with no usable target names
    NotActionable,
    Dispatched(Vec<RelayAttempt>),
    /// Cycle ended early on an error
    Aborted(String),
}

pub struct RelayEngine<P, D> {
    page: P,
    dom: D,
    watcher: InboundWatcher,
    parser: DirectiveParser,
    sender: MessageSender,
    state: Mutex<RelayState>,
    in_flight: tokio::sync::Mutex<()>,
}

impl<P, D> RelayEngine<P, D>
where
    P: PageAccessor + 'static,
    D: ChatDom + 'static,
{
    pub fn new(config: &Config, page: P, dom: D) -> Self {
        Self {
            page,
            dom,
            watcher: InboundWatcher::new(config),
            parser: DirectiveParser::from_config(config),
            sender: MessageSender::new(config),
            state: Mutex::new(RelayState::Idle),
            in_flight: tokio::sync::Mutex::new(()),
        }
    }

    pub fn state(&self) -> RelayState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: RelayState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    /// Run one cycle. Never fails; overlapping calls are skipped.
    pub async fn tick(&self) -> TickOutcome {
        let Ok(_guard) = self.in_flight.try_lock() else {
            debug!("previous relay tick still running, skipping");
            return TickOutcome::Skipped;
        };

        let outcome = match self.cycle().await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, state = ?self.state(), "relay tick failed");
                TickOutcome::Aborted(e.to_string())
            }
        };

        self.set_state(RelayState::Idle);
        outcome
    }

    async fn cycle(&self) -> Result<TickOutcome> {
        self.set_state(RelayState::Detecting);
        if !self.watcher.poll_once(&self.dom).await? {
            return Ok(TickOutcome::NoNewMessage);
        }

        let message = self.watcher.open_latest(&self.page, &self.dom).await?;

        self.set_state(RelayState::Parsing);
        let Some(message) = message else {
            debug!("relay chat opened without a readable message");
            self.dismiss().await?;
            return Ok(TickOutcome::Ignored);
        };

        let Some(directive) = self.parser.parse(&message.raw_text) else {
            debug!(observed_at = %message.observed_at, "not a directive, ignoring");
            self.dismiss().await?;
            return Ok(TickOutcome::Ignored);
        };

        if !directive.is_actionable() {
            info!("directive names no targets, ignoring");
            self.dismiss().await?;
            return Ok(TickOutcome::NotActionable);
        }

        info!(
            targets = directive.target_names.len(),
            observed_at = %message.observed_at,
            "relaying directive"
        );

        let mut attempts = Vec::with_capacity(directive.target_names.len());
        for (i, target) in directive.target_names.iter().enumerate() {
            self.set_state(RelayState::Dispatching(i));

            let outcome = match self
                .sender
                .send(&self.page, &self.dom, target, &directive.payload)
                .await
            {
                Ok(SendOutcome::Sent) => AttemptOutcome::Sent,
                Ok(SendOutcome::ContactNotFound) => AttemptOutcome::ContactNotFound,
                Err(e) => {
                    warn!(contact = %target, error = %e, "send attempt failed");
                    AttemptOutcome::Failed(e.to_string())
                }
            };

            attempts.push(RelayAttempt {
                target: target.clone(),
                outcome,
            });
        }

        Ok(TickOutcome::Dispatched(attempts))
    }

    async fn dismiss(&self) -> Result<()> {
        self.page.press_key(Key::Escape).await
    }

    /// Start polling on the watcher's interval
    pub fn start(self: Arc<Self>) -> PeriodicTask {
        let interval = self.watcher.interval();
        info!(interval_ms = interval.as_millis() as u64, "relay started");

        PeriodicTask::spawn("relay", interval, move || {
            let engine = Arc::clone(&self);
            async move {
                engine.tick().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Action, FakeChat, RELAY_CHAT};

    fn engine(chat: &FakeChat) -> RelayEngine<FakeChat, FakeChat> {
        RelayEngine::new(&Config::for_test(), chat.clone(), chat.clone())
    }

    #[tokio::test]
    async fn test_idle_without_message() {
        let chat = FakeChat::with_contacts(&["Alice"]);
        let engine = engine(&chat);
        assert_eq!(engine.tick().await, TickOutcome::NoNewMessage);
        assert_eq!(engine.state(), RelayState::Idle);
        assert!(chat.actions().is_empty());
    }

    #[tokio::test]
    async fn test_non_directive_dismissed() {
        let chat = FakeChat::with_contacts(&["Alice"]);
        chat.receive("just chatting");
        let engine = engine(&chat);

        assert_eq!(engine.tick().await, TickOutcome::Ignored);
        assert_eq!(chat.actions().last(), Some(&Action::Press(Key::Escape)));
        assert_eq!(chat.open_chat(), None);
        assert!(chat.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_single_line_with_prefix_is_not_directive() {
        let chat = FakeChat::with_contacts(&["Alice"]);
        chat.receive("#Alice");
        assert_eq!(engine(&chat).tick().await, TickOutcome::Ignored);
        assert!(chat.delivered().is_empty());
    }

    #[tokio::test]
    async fn test_empty_target_list_dismissed() {
        let chat = FakeChat::with_contacts(&["Alice"]);
        chat.receive("# # \npayload");
        let engine = engine(&chat);

        assert_eq!(engine.tick().await, TickOutcome::NotActionable);
        assert_eq!(chat.open_chat(), None);
        assert_eq!(chat.count(&Action::Press(Key::Escape)), 1);
    }

    #[tokio::test]
    async fn test_dispatch_sends_to_each_target() {
        let chat = FakeChat::with_contacts(&["Alice", "Bob"]);
        chat.receive("#Alice#Bob\nhello");
        let engine = engine(&chat);

        let TickOutcome::Dispatched(attempts) = engine.tick().await else {
            panic!("expected dispatch");
        };
        assert_eq!(attempts.len(), 2);
        assert!(attempts.iter().all(|a| a.outcome == AttemptOutcome::Sent));

        let delivered = chat.delivered();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].chat, "Alice");
        assert_eq!(delivered[1].chat, "Bob");
        assert!(delivered.iter().all(|d| d.text == "hello"));
        assert!(delivered.iter().all(|d| d.chat != RELAY_CHAT));
        assert_eq!(engine.state(), RelayState::Idle);
    }

    #[tokio::test]
    async fn test_failed_send_does_not_stop_dispatch() {
        let chat = FakeChat::with_contacts(&["Alice", "Bob", "Carol"]);
        chat.stall_chat("Bob");
        chat.receive("#Alice#Bob#Carol\nhi");

        let TickOutcome::Dispatched(attempts) = engine(&chat).tick().await else {
            panic!("expected dispatch");
        };
        assert_eq!(attempts[0].outcome, AttemptOutcome::Sent);
        assert!(matches!(attempts[1].outcome, AttemptOutcome::Failed(_)));
        assert_eq!(attempts[2].outcome, AttemptOutcome::Sent);
        assert_eq!(chat.delivered().len(), 2);
    }

    #[tokio::test]
    async fn test_dom_error_aborts_tick_only() {
        let chat = FakeChat::with_contacts(&["Alice"]);
        chat.receive("#Alice\nhi");
        chat.break_dom(Some("document detached"));
        let engine = engine(&chat);

        let outcome = engine.tick().await;
        assert!(matches!(outcome, TickOutcome::Aborted(ref e) if e.contains("document detached")));
        assert_eq!(engine.state(), RelayState::Idle);

        // Next tick recovers
        chat.break_dom(None);
        assert!(matches!(engine.tick().await, TickOutcome::Dispatched(_)));
        assert_eq!(chat.delivered().len(), 1);
    }

    #[tokio::test]
    async fn test_relay_chat_timeout_aborts_then_recovers() {
        let chat = FakeChat::with_contacts(&["Alice"]);
        chat.receive("#Alice\nhi");
        chat.stall_relay(true);
        let engine = engine(&chat);

        assert!(matches!(engine.tick().await, TickOutcome::Aborted(_)));
        assert_eq!(engine.state(), RelayState::Idle);
        assert!(chat.delivered().is_empty());

        chat.stall_relay(false);
        assert!(matches!(engine.tick().await, TickOutcome::Dispatched(_)));
        assert_eq!(chat.delivered()[0].chat, "Alice");
    }

    #[tokio::test]
    async fn test_message_handled_once() {
        let chat = FakeChat::with_contacts(&["Alice"]);
        chat.receive("#Alice\nhi");
        let engine = engine(&chat);

        assert!(matches!(engine.tick().await, TickOutcome::Dispatched(_)));
        assert_eq!(engine.tick().await, TickOutcome::NoNewMessage);
        assert_eq!(chat.delivered().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_polls_on_interval() {
        let chat = FakeChat::with_contacts(&["Alice"]);
        let engine = Arc::new(engine(&chat));
        let task = Arc::clone(&engine).start();

        chat.receive("#Alice\nfrom the timer");
        tokio::time::sleep(Config::for_test().poll_interval() * 2).await;
        task.shutdown().await;

        assert_eq!(chat.delivered().len(), 1);
        assert_eq!(chat.delivered()[0].text, "from the timer");
        assert_eq!(engine.state(), RelayState::Idle);
    }
}
