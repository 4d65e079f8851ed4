//! Broadcast Relay - web chat broadcast daemon
//!
//! Watches a designated relay chat in a web chat client for messages of the
//! form `#Alice#Bob\n<payload>` and retypes the payload into each named
//! contact's chat, as an operator would.

pub mod config;
pub mod error;
pub mod page;
pub mod dom;
pub mod browser;
pub mod directory;
pub mod watcher;
pub mod directive;
pub mod sender;
pub mod engine;
pub mod scheduler;
pub mod bootstrap;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::{Error, Result};
