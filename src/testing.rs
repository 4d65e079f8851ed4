//! In-memory chat client for tests
//!
//! [`FakeChat`] implements both [`PageAccessor`] and [`ChatDom`]: a
//! virtualized contact list that only renders the rows inside its visible
//! window, a relay chat that can receive one inbound message, and a
//! composer that turns keystrokes into delivered messages.

use crate::config::Selectors;
use crate::dom::{ChatDom, ScrollMetrics};
use crate::error::{Error, Result};
use crate::page::{Key, PageAccessor};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Height of one contact row in pixels
pub const ROW_HEIGHT: f64 = 50.0;

/// Rows visible at once
pub const VISIBLE_ROWS: usize = 10;

/// Chat name recorded for messages submitted inside the relay chat
pub const RELAY_CHAT: &str = "relay";

/// How often a pending `wait_for_selector` re-checks the page
const WAIT_POLL: Duration = Duration::from_millis(5);

/// Input operation issued against the page
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Navigate(String),
    Click(String),
    Type(String),
    KeyDown(Key),
    KeyUp(Key),
    Press(Key),
}

/// A message submitted with a plain Enter
#[derive(Debug, Clone, PartialEq)]
pub struct Delivered {
    pub chat: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
enum OpenChat {
    Relay,
    Contact(String),
}

#[derive(Debug)]
struct State {
    selectors: Selectors,
    contacts: Vec<String>,
    scroll_top: f64,
    scroll_steps: usize,
    inbound: Option<String>,
    relay_last: Option<String>,
    open_chat: Option<OpenChat>,
    draft: String,
    shift_held: bool,
    stalled: HashSet<String>,
    relay_stalled: bool,
    scroll_jammed: bool,
    delivered: Vec<Delivered>,
    actions: Vec<Action>,
    qr: Option<String>,
    qr_reads: usize,
    logged_in: bool,
    dom_failure: Option<String>,
}

/// Shared handle; clones observe the same state
#[derive(Debug, Clone)]
pub struct FakeChat {
    state: Arc<Mutex<State>>,
}

impl FakeChat {
    /// A logged-in client whose contact list holds `contacts` in order
    pub fn new(contacts: Vec<String>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                selectors: Selectors::default(),
                contacts,
                scroll_top: 0.0,
                scroll_steps: 0,
                inbound: None,
                relay_last: None,
                open_chat: None,
                draft: String::new(),
                shift_held: false,
                stalled: HashSet::new(),
                relay_stalled: false,
                scroll_jammed: false,
                delivered: Vec::new(),
                actions: Vec::new(),
                qr: None,
                qr_reads: 0,
                logged_in: true,
                dom_failure: None,
            })),
        }
    }

    pub fn with_contacts(names: &[&str]) -> Self {
        Self::new(names.iter().map(|s| s.to_string()).collect())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Deliver a new message to the relay chat and raise its unread badge
    pub fn receive(&self, text: &str) {
        self.lock().inbound = Some(text.to_string());
    }

    /// The composer of this contact's chat never appears
    pub fn stall_chat(&self, name: &str) {
        self.lock().stalled.insert(name.to_string());
    }

    /// While set, the relay chat never finishes opening: its composer does
    /// not appear and its unread message stays unread
    pub fn stall_relay(&self, stalled: bool) {
        self.lock().relay_stalled = stalled;
    }

    /// While set, scrolling the contact list does nothing although its
    /// metrics still report more content below
    pub fn jam_scroll(&self, jammed: bool) {
        self.lock().scroll_jammed = jammed;
    }

    /// Show a login QR code carrying `payload`, or hide it with `None`
    pub fn set_qr(&self, payload: Option<&str>) {
        self.lock().qr = payload.map(str::to_string);
    }

    pub fn set_logged_in(&self, logged_in: bool) {
        self.lock().logged_in = logged_in;
    }

    /// Make every DOM read fail with a script error until cleared
    pub fn break_dom(&self, reason: Option<&str>) {
        self.lock().dom_failure = reason.map(str::to_string);
    }

    pub fn actions(&self) -> Vec<Action> {
        self.lock().actions.clone()
    }

    pub fn count(&self, action: &Action) -> usize {
        self.lock().actions.iter().filter(|a| *a == action).count()
    }

    pub fn delivered(&self) -> Vec<Delivered> {
        self.lock().delivered.clone()
    }

    pub fn scroll_steps(&self) -> usize {
        self.lock().scroll_steps
    }

    pub fn scroll_top(&self) -> f64 {
        self.lock().scroll_top
    }

    pub fn qr_reads(&self) -> usize {
        self.lock().qr_reads
    }

    /// Name of the open chat, if any
    pub fn open_chat(&self) -> Option<String> {
        self.lock().open_chat.as_ref().map(|chat| match chat {
            OpenChat::Relay => RELAY_CHAT.to_string(),
            OpenChat::Contact(name) => name.clone(),
        })
    }

    pub fn is_rendered(&self, name: &str) -> bool {
        let state = self.lock();
        let found = rendered(&state).any(|n| n == name);
        found
    }
}

impl State {
    fn client_height(&self) -> f64 {
        VISIBLE_ROWS as f64 * ROW_HEIGHT
    }

    fn scroll_height(&self) -> f64 {
        self.contacts.len() as f64 * ROW_HEIGHT
    }

    fn max_scroll(&self) -> f64 {
        (self.scroll_height() - self.client_height()).max(0.0)
    }

    /// Whether `selector` currently matches something on the page
    fn shows(&self, selector: &str) -> bool {
        if selector == self.selectors.composer_marker {
            match &self.open_chat {
                Some(OpenChat::Contact(name)) => !self.stalled.contains(name),
                Some(OpenChat::Relay) => !self.relay_stalled,
                None => false,
            }
        } else if selector == self.selectors.qr_code {
            self.qr.is_some()
        } else if selector == self.selectors.contact_row {
            self.logged_in && !self.contacts.is_empty()
        } else {
            false
        }
    }

    fn check_dom(&self) -> Result<()> {
        match &self.dom_failure {
            Some(reason) => Err(Error::Script(reason.clone())),
            None => Ok(()),
        }
    }
}

/// Rows intersecting the visible window
fn rendered(state: &State) -> impl Iterator<Item = &String> {
    let top = state.scroll_top;
    let bottom = top + state.client_height();
    state.contacts.iter().enumerate().filter_map(move |(i, name)| {
        let row_top = i as f64 * ROW_HEIGHT;
        (row_top < bottom && row_top + ROW_HEIGHT > top).then_some(name)
    })
}

#[async_trait]
impl PageAccessor for FakeChat {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.lock().actions.push(Action::Navigate(url.to_string()));
        Ok(())
    }

    async fn evaluate(&self, _script: &str) -> Result<Value> {
        Ok(Value::Null)
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let mut state = self.lock();
        state.actions.push(Action::Click(selector.to_string()));

        if selector == state.selectors.top_chat {
            if !state.relay_stalled {
                if let Some(text) = state.inbound.take() {
                    state.relay_last = Some(text);
                }
            }
            state.open_chat = Some(OpenChat::Relay);
            state.draft.clear();
            return Ok(());
        }

        let target = rendered(&state)
            .find(|name| state.selectors.contact_title(name) == selector)
            .cloned();
        match target {
            Some(name) => {
                state.open_chat = Some(OpenChat::Contact(name));
                state.draft.clear();
                Ok(())
            }
            None => Err(Error::Browser(format!("no element matches {}", selector))),
        }
    }

    async fn type_text(&self, text: &str) -> Result<()> {
        let mut state = self.lock();
        state.actions.push(Action::Type(text.to_string()));
        if state.open_chat.is_some() {
            state.draft.push_str(text);
        }
        Ok(())
    }

    async fn key_down(&self, key: Key) -> Result<()> {
        let mut state = self.lock();
        state.actions.push(Action::KeyDown(key));
        if key == Key::Shift {
            state.shift_held = true;
        }
        Ok(())
    }

    async fn key_up(&self, key: Key) -> Result<()> {
        let mut state = self.lock();
        state.actions.push(Action::KeyUp(key));
        if key == Key::Shift {
            state.shift_held = false;
        }
        Ok(())
    }

    async fn press_key(&self, key: Key) -> Result<()> {
        let mut state = self.lock();
        state.actions.push(Action::Press(key));

        match key {
            Key::Enter if state.shift_held => state.draft.push('\n'),
            Key::Enter => {
                let chat = match &state.open_chat {
                    Some(OpenChat::Relay) => Some(RELAY_CHAT.to_string()),
                    Some(OpenChat::Contact(name)) => Some(name.clone()),
                    None => None,
                };
                if let Some(chat) = chat {
                    let text = std::mem::take(&mut state.draft);
                    state.delivered.push(Delivered { chat, text });
                }
            }
            Key::Escape => {
                state.open_chat = None;
                state.draft.clear();
            }
            Key::Shift => {}
        }
        Ok(())
    }

    async fn wait_for_selector(&self, selector: &str, timeout: Duration) -> Result<()> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let shown = self.lock().shows(selector);
            if shown {
                return Ok(());
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(Error::Timeout(format!(
                    "selector {} not found after {}ms",
                    selector,
                    timeout.as_millis()
                )));
            }
            tokio::time::sleep(WAIT_POLL).await;
        }
    }
}

#[async_trait]
impl ChatDom for FakeChat {
    async fn contact_scroll_metrics(&self) -> Result<Option<ScrollMetrics>> {
        let state = self.lock();
        state.check_dom()?;
        if state.contacts.is_empty() {
            return Ok(None);
        }
        Ok(Some(ScrollMetrics {
            top: state.scroll_top,
            client_height: state.client_height(),
            scroll_height: state.scroll_height(),
        }))
    }

    async fn scroll_contacts_by(&self, px: u32) -> Result<()> {
        let mut state = self.lock();
        state.check_dom()?;
        if !state.scroll_jammed {
            state.scroll_top = (state.scroll_top + f64::from(px)).min(state.max_scroll());
        }
        state.scroll_steps += 1;
        Ok(())
    }

    async fn scroll_contacts_to_top(&self) -> Result<()> {
        let mut state = self.lock();
        state.check_dom()?;
        state.scroll_top = 0.0;
        Ok(())
    }

    async fn contact_rendered(&self, name: &str) -> Result<bool> {
        let state = self.lock();
        state.check_dom()?;
        let found = rendered(&state).any(|n| n == name);
        Ok(found)
    }

    async fn rendered_contact_names(&self) -> Result<Vec<String>> {
        let state = self.lock();
        state.check_dom()?;
        let names = rendered(&state).cloned().collect();
        Ok(names)
    }

    async fn has_unread_marker(&self) -> Result<bool> {
        let state = self.lock();
        state.check_dom()?;
        Ok(state.inbound.is_some())
    }

    async fn latest_message_text(&self) -> Result<Option<String>> {
        let state = self.lock();
        state.check_dom()?;
        match state.open_chat {
            Some(OpenChat::Relay) => Ok(state.relay_last.clone()),
            _ => Ok(None),
        }
    }

    async fn qr_payload(&self) -> Result<Option<String>> {
        let mut state = self.lock();
        state.check_dom()?;
        state.qr_reads += 1;
        Ok(state.qr.clone())
    }
}
