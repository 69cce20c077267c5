//! Drumline Core Library
//!
//! Block rules with daily time windows, their persistence, and the messages
//! exchanged between the authority, the control panel and page agents.

pub mod authority;
pub mod codec;
pub mod config;
pub mod database;
pub mod dispatch;
pub mod error;
pub mod page_agent;
pub mod panel;
pub mod protocol;
pub mod rule_engine;
pub mod types;

pub use authority::{AuthorityService, Outcome};
pub use config::Config;
pub use error::{DrumlineError, ErrorKind, Result};
pub use types::*;
