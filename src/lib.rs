//! Ad-hoc command gateway - XEP-0050 command sessions for an XMPP identity
//!
//! This library provides:
//! - Command registration per owner, with allow/deny access rules
//! - The ad-hoc command protocol engine and its session table
//! - Discovery data for the command list
//! - A built-in status command and requesting-side helpers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Transport (stream)                  │
//! │        inbound stanzas  │  StanzaSink (outbound)     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                      Daemon                          │
//! │   owner lifecycle  │  disco  │  session sweeping     │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  ProtocolEngine                      │
//! │  CommandRegistry │ AccessRules │ SessionTable │ ...  │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod commands;
pub mod config;
pub mod daemon;
pub mod error;
pub mod jid;
pub mod roster;
pub mod stanza;
pub mod transport;

pub use commands::{
    Action, CommandDefinition, CommandError, CommandHandler, CommandRegistry, CommandRequest,
    CommandResult, Invocation, Note, NoteKind, ProtocolEngine, SessionTable, Status, StepData,
};
pub use config::Config;
pub use daemon::Daemon;
pub use error::{Error, Result};
pub use jid::Jid;
pub use roster::{GroupLookup, Roster};
pub use stanza::Element;
pub use transport::{ChannelSink, PresenceControl, StanzaSink};
