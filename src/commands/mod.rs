//! Ad-hoc commands (XEP-0050)
//!
//! Owners register [`CommandDefinition`]s in a [`CommandRegistry`]; the
//! [`ProtocolEngine`] answers requests for them, keeping multi-step state in
//! a [`SessionTable`].

pub mod client;
mod definition;
pub mod disco;
mod engine;
mod error;
pub mod policy;
mod registry;
pub mod session;
mod status;
mod types;

pub use definition::{
    CommandDefinition, CommandHandler, DEFAULT_TIMEOUT, FnHandler, Invocation, handler_fn,
};
pub use engine::ProtocolEngine;
pub use error::CommandError;
pub use policy::{AccessRules, MAGIC_ALL, MAGIC_OWNER_BARE_JID};
pub use registry::CommandRegistry;
pub use session::{CommandSession, SessionHandle, SessionTable};
pub use status::{STATUS_NODE, StatusCommand};
pub use types::{Action, CommandRequest, CommandResult, Note, NoteKind, Status, StepData};
