//! Ad-hoc command protocol types

use std::fmt;

use serde::{Deserialize, Serialize};

use super::CommandError;
use crate::Jid;
use crate::stanza::{Element, IqHeader, NS_COMMANDS};

/// Free-form state carried between the steps of one session
pub type StepData = serde_json::Map<String, serde_json::Value>;

/// Action requested by the remote entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Execute the current stage (default)
    Execute,
    /// Abandon the session
    Cancel,
    /// Advance to the next stage
    Next,
    /// Return to the previous stage
    Prev,
}

impl Action {
    /// Parse a wire value
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "execute" => Some(Self::Execute),
            "cancel" => Some(Self::Cancel),
            "next" => Some(Self::Next),
            "prev" => Some(Self::Prev),
            _ => None,
        }
    }

    /// Wire value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Execute => "execute",
            Self::Cancel => "cancel",
            Self::Next => "next",
            Self::Prev => "prev",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Executing,
    Completed,
    Canceled,
}

impl Status {
    /// Parse a wire value
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "executing" => Some(Self::Executing),
            "completed" => Some(Self::Completed),
            "canceled" => Some(Self::Canceled),
            _ => None,
        }
    }

    /// Wire value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Canceled => "canceled",
        }
    }

    /// Whether this status ends the session
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Canceled)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity of a note attached to a response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteKind {
    Info,
    Warn,
    Error,
}

impl NoteKind {
    /// Parse a wire value
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "info" => Some(Self::Info),
            "warn" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Wire value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Human-readable note attached to a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub kind: NoteKind,
    pub text: String,
}

impl Note {
    /// Informational note
    #[must_use]
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            kind: NoteKind::Info,
            text: text.into(),
        }
    }

    /// Warning note
    #[must_use]
    pub fn warn(text: impl Into<String>) -> Self {
        Self {
            kind: NoteKind::Warn,
            text: text.into(),
        }
    }

    /// Error note
    #[must_use]
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: NoteKind::Error,
            text: text.into(),
        }
    }
}

/// Outcome of one command step, returned by a handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    /// Payload embedded in the response, usually a data form
    pub payload: Option<Element>,
    pub status: Status,
    /// Permitted next actions; the first is the default. Empty means
    /// `[Execute]`.
    pub actions: Vec<Action>,
    pub note: Option<Note>,
}

impl CommandResult {
    /// Intermediate step presenting `payload`
    #[must_use]
    pub const fn executing(payload: Element) -> Self {
        Self {
            payload: Some(payload),
            status: Status::Executing,
            actions: Vec::new(),
            note: None,
        }
    }

    /// Final step
    #[must_use]
    pub const fn completed() -> Self {
        Self {
            payload: None,
            status: Status::Completed,
            actions: Vec::new(),
            note: None,
        }
    }

    /// Session abandoned
    #[must_use]
    pub const fn canceled() -> Self {
        Self {
            payload: None,
            status: Status::Canceled,
            actions: Vec::new(),
            note: None,
        }
    }

    /// Attach a payload
    #[must_use]
    pub fn with_payload(mut self, payload: Element) -> Self {
        self.payload = Some(payload);
        self
    }

    /// Set the permitted next actions
    #[must_use]
    pub fn with_actions(mut self, actions: Vec<Action>) -> Self {
        self.actions = actions;
        self
    }

    /// Attach a note
    #[must_use]
    pub fn with_note(mut self, note: Note) -> Self {
        self.note = Some(note);
        self
    }

    /// Actions as they go on the wire
    #[must_use]
    pub fn effective_actions(&self) -> Vec<Action> {
        if self.actions.is_empty() {
            vec![Action::Execute]
        } else {
            self.actions.clone()
        }
    }

    /// Encode the `<command/>` element of the response
    ///
    /// `<actions/>` is only written for a session that is still executing;
    /// the payload is dropped from a canceled response.
    #[must_use]
    pub fn to_command_element(&self, session_id: &str, node: &str) -> Element {
        let mut command = Element::with_ns("command", NS_COMMANDS)
            .attr_set("sessionid", session_id)
            .attr_set("node", node)
            .attr_set("status", self.status.as_str());

        if !self.status.is_terminal() {
            let actions = self.effective_actions();
            let mut actions_elt = Element::new("actions").attr_set("execute", actions[0].as_str());
            for action in &actions {
                actions_elt.push_child(Element::new(action.as_str()));
            }
            command.push_child(actions_elt);
        }

        if let Some(note) = &self.note {
            command.push_child(
                Element::new("note")
                    .attr_set("type", note.kind.as_str())
                    .text_add(note.text.as_str()),
            );
        }

        if self.status != Status::Canceled {
            if let Some(payload) = &self.payload {
                command.push_child(payload.clone());
            }
        }

        command
    }
}

/// A parsed inbound command request
#[derive(Debug, Clone)]
pub struct CommandRequest {
    /// Stanza addressing, used to route the reply
    pub header: IqHeader,
    /// Target command node
    pub node: String,
    pub action: Action,
    pub session_id: Option<String>,
    /// Child elements of `<command/>`, e.g. a submitted form
    pub payload: Vec<Element>,
}

impl CommandRequest {
    /// Build a request directly, without going through the wire format
    #[must_use]
    pub fn new(id: impl Into<String>, from: Jid, node: impl Into<String>, action: Action) -> Self {
        Self {
            header: IqHeader {
                id: id.into(),
                iq_type: "set".to_string(),
                from,
                to: None,
            },
            node: node.into(),
            action,
            session_id: None,
            payload: Vec::new(),
        }
    }

    /// Continue an existing session
    #[must_use]
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Attach a payload element
    #[must_use]
    pub fn with_payload(mut self, payload: Element) -> Self {
        self.payload.push(payload);
        self
    }

    /// Identity making the request
    #[must_use]
    pub const fn requestor(&self) -> &Jid {
        &self.header.from
    }

    /// Whether a stanza is an ad-hoc command request at all
    #[must_use]
    pub fn is_command_stanza(stanza: &Element) -> bool {
        stanza.name() == "iq"
            && stanza.attr("type") == Some("set")
            && stanza.child("command", NS_COMMANDS).is_some()
    }

    /// Decode the `<command/>` of an already addressed request
    ///
    /// # Errors
    ///
    /// Returns `MalformedAction` for an unknown action and `ItemNotFound`
    /// when no node is given
    pub fn from_command(header: IqHeader, command: &Element) -> Result<Self, CommandError> {
        let action = match command.attr("action") {
            None => Action::Execute,
            Some(a) => Action::parse(a).ok_or(CommandError::MalformedAction)?,
        };
        let node = command
            .attr("node")
            .filter(|n| !n.is_empty())
            .ok_or(CommandError::ItemNotFound)?;
        let session_id = command
            .attr("sessionid")
            .filter(|s| !s.is_empty())
            .map(ToString::to_string);

        Ok(Self {
            header,
            node: node.to_string(),
            action,
            session_id,
            payload: command.children().cloned().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stanza::{Form, FormType};

    #[test]
    fn empty_actions_default_to_execute() {
        let result = CommandResult::executing(Form::new(FormType::Form).to_element());
        let command = result.to_command_element("s1", "status");

        let actions = command.child("actions", NS_COMMANDS).unwrap();
        assert_eq!(actions.attr("execute"), Some("execute"));
        let names: Vec<&str> = actions.children().map(Element::name).collect();
        assert_eq!(names, vec!["execute"]);
    }

    #[test]
    fn first_action_is_default() {
        let result = CommandResult::executing(Element::new("x"))
            .with_actions(vec![Action::Next, Action::Prev]);
        let command = result.to_command_element("s1", "wizard");

        let actions = command.child("actions", NS_COMMANDS).unwrap();
        assert_eq!(actions.attr("execute"), Some("next"));
        assert_eq!(actions.children().count(), 2);
    }

    #[test]
    fn completed_omits_actions_keeps_note() {
        let result = CommandResult::completed().with_note(Note::info("Status updated"));
        let command = result.to_command_element("s1", "status");

        assert!(command.child("actions", NS_COMMANDS).is_none());
        let note = command.child("note", NS_COMMANDS).unwrap();
        assert_eq!(note.attr("type"), Some("info"));
        assert_eq!(note.text(), "Status updated");
    }

    #[test]
    fn canceled_drops_payload() {
        let result = CommandResult::canceled().with_payload(Element::new("x"));
        let command = result.to_command_element("s1", "status");

        assert_eq!(command.attr("status"), Some("canceled"));
        assert_eq!(command.children().count(), 0);
    }

    #[test]
    fn command_attributes() {
        let xml = CommandResult::completed()
            .to_command_element("abc", "status")
            .to_xml()
            .unwrap();
        assert_eq!(
            xml,
            r#"<command xmlns="http://jabber.org/protocol/commands" sessionid="abc" node="status" status="completed"/>"#
        );
    }

    #[test]
    fn parse_request_defaults() {
        let stanza = Element::parse(
            r#"<iq type="set" id="1" from="a@b/c"><command xmlns="http://jabber.org/protocol/commands" node="status"/></iq>"#,
        )
        .unwrap();
        assert!(CommandRequest::is_command_stanza(&stanza));

        let header = IqHeader::parse(&stanza).unwrap();
        let command = stanza.child("command", NS_COMMANDS).unwrap();
        let request = CommandRequest::from_command(header, command).unwrap();
        assert_eq!(request.action, Action::Execute);
        assert_eq!(request.node, "status");
        assert!(request.session_id.is_none());
        assert!(request.payload.is_empty());
    }

    #[test]
    fn parse_request_rejects_unknown_action() {
        let stanza = Element::parse(
            r#"<iq type="set" id="1" from="a@b"><command xmlns="http://jabber.org/protocol/commands" node="n" action="explode"/></iq>"#,
        )
        .unwrap();
        let header = IqHeader::parse(&stanza).unwrap();
        let command = stanza.child("command", NS_COMMANDS).unwrap();
        assert_eq!(
            CommandRequest::from_command(header, command).unwrap_err(),
            CommandError::MalformedAction
        );
    }
}
