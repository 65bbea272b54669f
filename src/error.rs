//! Error types for the ad-hoc command gateway

use thiserror::Error;

use crate::commands::CommandError;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur outside the command protocol itself
///
/// Protocol-level failures that are reported back to the requesting entity
/// live in [`CommandError`]; this type covers everything the gateway has to
/// surface to its own callers.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Malformed JID
    #[error("invalid jid: {0}")]
    Jid(String),

    /// XML encoding or decoding error
    #[error("xml error: {0}")]
    Xml(String),

    /// Stanza that is not a well-formed command request or response
    #[error("malformed stanza: {0}")]
    Stanza(String),

    /// A command with this node is already registered for the owner
    #[error("command node already registered for {owner}: {node}")]
    DuplicateNode {
        /// Owner the node was registered under
        owner: String,
        /// Conflicting node identifier
        node: String,
    },

    /// No command registered under this node
    #[error("command not found: {0}")]
    CommandNotFound(String),

    /// Roster group does not exist
    #[error("unknown roster group: {0}")]
    UnknownGroup(String),

    /// Outbound transport failure
    #[error("transport error: {0}")]
    Transport(String),

    /// Error reply received from a remote command provider
    #[error("remote command error: {0}")]
    Remote(CommandError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<quick_xml::Error> for Error {
    fn from(e: quick_xml::Error) -> Self {
        Self::Xml(e.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(e: quick_xml::events::attributes::AttrError) -> Self {
        Self::Xml(e.to_string())
    }
}
