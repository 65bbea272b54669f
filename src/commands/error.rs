//! Protocol errors reported to the requesting entity
//!
//! Each variant maps to a fixed pair of stanza error condition and optional
//! ad-hoc specific condition (XEP-0050 §4.4, table 5).

use thiserror::Error;

use crate::stanza::{Element, NS_COMMANDS, stanza_error};

/// Tagged ad-hoc command error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum CommandError {
    /// The responding entity does not understand the action
    #[error("malformed action")]
    MalformedAction,

    /// The action is not allowed at the current stage
    #[error("bad action")]
    BadAction,

    /// The requested `xml:lang` is not supported
    #[error("bad locale")]
    BadLocale,

    /// The submitted payload is invalid
    #[error("bad payload")]
    BadPayload,

    /// The session id is malformed
    #[error("bad session id")]
    BadSessionId,

    /// The session is unknown or timed out
    #[error("session expired")]
    SessionExpired,

    /// The requestor may not execute this command or step
    #[error("forbidden")]
    Forbidden,

    /// No such command
    #[error("item not found")]
    ItemNotFound,

    /// The command or action is not implemented
    #[error("feature not implemented")]
    FeatureNotImplemented,

    /// Unexpected failure while executing the command
    #[error("internal server error")]
    Internal,
}

impl CommandError {
    /// Every tagged error, in table order
    pub const ALL: [Self; 10] = [
        Self::MalformedAction,
        Self::BadAction,
        Self::BadLocale,
        Self::BadPayload,
        Self::BadSessionId,
        Self::SessionExpired,
        Self::Forbidden,
        Self::ItemNotFound,
        Self::FeatureNotImplemented,
        Self::Internal,
    ];

    /// Stanza error condition and ad-hoc condition
    #[must_use]
    pub const fn conditions(self) -> (&'static str, Option<&'static str>) {
        match self {
            Self::MalformedAction => ("bad-request", Some("malformed-action")),
            Self::BadAction => ("bad-request", Some("bad-action")),
            Self::BadLocale => ("bad-request", Some("bad-locale")),
            Self::BadPayload => ("bad-request", Some("bad-payload")),
            Self::BadSessionId => ("bad-request", Some("bad-sessionid")),
            Self::SessionExpired => ("not-allowed", Some("session-expired")),
            Self::Forbidden => ("forbidden", None),
            Self::ItemNotFound => ("item-not-found", None),
            Self::FeatureNotImplemented => ("feature-not-implemented", None),
            Self::Internal => ("internal-server-error", None),
        }
    }

    /// RFC 6120 error type associated with the stanza condition
    #[must_use]
    pub const fn error_type(self) -> &'static str {
        match self {
            Self::MalformedAction
            | Self::BadAction
            | Self::BadLocale
            | Self::BadPayload
            | Self::BadSessionId => "modify",
            Self::Forbidden => "auth",
            Self::Internal => "wait",
            Self::SessionExpired | Self::ItemNotFound | Self::FeatureNotImplemented => "cancel",
        }
    }

    /// Whether the session can no longer be used after this error
    ///
    /// Recoverable errors such as `BadPayload` keep the session so the
    /// requestor may retry the step.
    #[must_use]
    pub const fn ends_session(self) -> bool {
        matches!(
            self,
            Self::SessionExpired | Self::Forbidden | Self::ItemNotFound
        )
    }

    /// Recover the tagged error from the conditions of an error reply
    #[must_use]
    pub fn from_conditions(condition: &str, command_condition: Option<&str>) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|e| e.conditions() == (condition, command_condition))
    }

    /// Build the `<error/>` element for this error
    #[must_use]
    pub fn to_element(self) -> Element {
        let (condition, command_condition) = self.conditions();
        stanza_error(
            self.error_type(),
            condition,
            command_condition.map(|c| Element::with_ns(c, NS_COMMANDS)),
        )
    }
}

impl From<crate::Error> for CommandError {
    fn from(e: crate::Error) -> Self {
        tracing::warn!(error = %e, "command failed with internal error");
        Self::Internal
    }
}
