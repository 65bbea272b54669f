//! Requesting side of the ad-hoc command protocol
//!
//! Builds the stanzas sent to a command provider and decodes its replies.

use super::disco::DiscoItem;
use super::{Action, CommandError, Note, NoteKind, Status};
use crate::stanza::{Element, Form, NS_COMMANDS, NS_DISCO_ITEMS, NS_STANZAS, NS_X_DATA};
use crate::{Error, Jid, Result};

/// Build a command request to `to`
#[must_use]
pub fn command_request(
    id: &str,
    to: &Jid,
    node: &str,
    action: Action,
    session_id: Option<&str>,
    payload: Option<Element>,
) -> Element {
    let mut command = Element::with_ns("command", NS_COMMANDS)
        .attr_set("node", node)
        .attr_set("action", action.as_str());
    if let Some(session_id) = session_id {
        command.set_attr("sessionid", session_id);
    }
    if let Some(payload) = payload {
        command.push_child(payload);
    }

    Element::new("iq")
        .attr_set("type", "set")
        .attr_set("id", id)
        .attr_set("to", to.to_string())
        .child_add(command)
}

/// Build a disco#items request for the command list of `to`
#[must_use]
pub fn items_request(id: &str, to: &Jid) -> Element {
    Element::new("iq")
        .attr_set("type", "get")
        .attr_set("id", id)
        .attr_set("to", to.to_string())
        .child_add(Element::with_ns("query", NS_DISCO_ITEMS).attr_set("node", NS_COMMANDS))
}

/// Decode the command list from a disco#items reply
///
/// # Errors
///
/// Returns `Stanza` if the reply has no items query, or an item lacks a
/// valid `jid` or a `node`
pub fn parse_items(stanza: &Element) -> Result<Vec<DiscoItem>> {
    check_error(stanza)?;
    let query = stanza
        .child("query", NS_DISCO_ITEMS)
        .ok_or_else(|| Error::Stanza("missing disco#items query".to_string()))?;

    query
        .children_named("item", NS_DISCO_ITEMS)
        .map(|item| {
            let jid = item
                .attr("jid")
                .ok_or_else(|| Error::Stanza("disco item without jid".to_string()))
                .and_then(Jid::parse)?;
            let node = item
                .attr("node")
                .ok_or_else(|| Error::Stanza("disco item without node".to_string()))?;
            Ok(DiscoItem {
                jid,
                node: node.to_string(),
                name: item.attr("name").unwrap_or(node).to_string(),
            })
        })
        .collect()
}

/// A decoded command reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResponse {
    pub status: Status,
    pub session_id: Option<String>,
    pub node: Option<String>,
    /// Permitted next actions, in the order given
    pub actions: Vec<Action>,
    pub default_action: Option<Action>,
    pub notes: Vec<Note>,
    /// Data form payload, if any
    pub form: Option<Form>,
}

impl CommandResponse {
    /// Decode a reply to a command request
    ///
    /// # Errors
    ///
    /// Returns `Remote` for an error reply and `Stanza` for a reply that is
    /// not a well-formed command result
    pub fn from_stanza(stanza: &Element) -> Result<Self> {
        check_error(stanza)?;
        let command = stanza
            .child("command", NS_COMMANDS)
            .ok_or_else(|| Error::Stanza("result without <command/>".to_string()))?;

        let status = match command.attr("status") {
            None => Status::Executing,
            Some(s) => Status::parse(s)
                .ok_or_else(|| Error::Stanza(format!("unknown command status '{s}'")))?,
        };

        let (actions, default_action) = match command.child("actions", NS_COMMANDS) {
            Some(el) => {
                let actions: Vec<Action> = el.children().filter_map(|a| Action::parse(a.name())).collect();
                let default_action = el
                    .attr("execute")
                    .and_then(Action::parse)
                    .or_else(|| actions.first().copied());
                (actions, default_action)
            }
            None => (Vec::new(), None),
        };

        let notes = command
            .children_named("note", NS_COMMANDS)
            .map(|note| Note {
                kind: note_kind(note.attr("type")),
                text: note.text(),
            })
            .collect();

        let form = command
            .children()
            .find(|el| el.is("x", NS_X_DATA))
            .map(Form::from_element)
            .transpose()?;

        Ok(Self {
            status,
            session_id: command.attr("sessionid").map(ToString::to_string),
            node: command.attr("node").map(ToString::to_string),
            actions,
            default_action,
            notes,
            form,
        })
    }
}

fn note_kind(value: Option<&str>) -> NoteKind {
    match value {
        None => NoteKind::Info,
        Some(v) => NoteKind::parse(v).unwrap_or_else(|| {
            tracing::warn!(note_type = v, "invalid note type, using info");
            NoteKind::Info
        }),
    }
}

/// Turn an error reply into `Error::Remote`
fn check_error(stanza: &Element) -> Result<()> {
    if stanza.attr("type") != Some("error") {
        return Ok(());
    }
    let Some(error) = stanza.children().find(|c| c.name() == "error") else {
        return Err(Error::Stanza("error reply without <error/>".to_string()));
    };
    let condition = error
        .children()
        .find(|c| c.ns() == Some(NS_STANZAS))
        .map(Element::name);
    let command_condition = error
        .children()
        .find(|c| c.ns() == Some(NS_COMMANDS))
        .map(Element::name);

    match condition.and_then(|c| CommandError::from_conditions(c, command_condition)) {
        Some(e) => Err(Error::Remote(e)),
        None => Err(Error::Stanza(format!(
            "unrecognized error condition {}",
            condition.unwrap_or("(none)")
        ))),
    }
}

/// Render notes for display, prefixing warnings and errors
#[must_use]
pub fn merged_notes(notes: &[Note]) -> Vec<String> {
    notes
        .iter()
        .map(|note| match note.kind {
            NoteKind::Info => note.text.clone(),
            NoteKind::Warn => format!("WARNING: {}", note.text),
            NoteKind::Error => format!("ERROR: {}", note.text),
        })
        .collect()
}

/// Requesting-side state of one command run against a remote entity
///
/// Remembers the session id the provider assigned and stops producing
/// requests once the provider reported a terminal status.
#[derive(Debug, Clone)]
pub struct ClientSession {
    to: Jid,
    node: String,
    remote_id: Option<String>,
    status: Status,
    sent: u64,
}

impl ClientSession {
    /// Start a run of `node` on `to`
    #[must_use]
    pub fn new(to: Jid, node: impl Into<String>) -> Self {
        Self {
            to,
            node: node.into(),
            remote_id: None,
            status: Status::Executing,
            sent: 0,
        }
    }

    /// Session id assigned by the provider
    #[must_use]
    pub fn remote_id(&self) -> Option<&str> {
        self.remote_id.as_deref()
    }

    /// Last status reported by the provider
    #[must_use]
    pub const fn status(&self) -> Status {
        self.status
    }

    /// Whether the provider ended the session
    #[must_use]
    pub const fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }

    /// Build the next request
    ///
    /// # Errors
    ///
    /// Returns `Stanza` once the session is finished
    pub fn request(&mut self, action: Action, payload: Option<Element>) -> Result<Element> {
        if self.is_finished() {
            return Err(Error::Stanza(format!(
                "command session on {} already {}",
                self.node, self.status
            )));
        }
        self.sent += 1;
        let id = format!("adhoc-{}", self.sent);
        Ok(command_request(
            &id,
            &self.to,
            &self.node,
            action,
            self.remote_id.as_deref(),
            payload,
        ))
    }

    /// Decode a reply and advance the session
    ///
    /// # Errors
    ///
    /// Same as [`CommandResponse::from_stanza`]; a remote error that ends
    /// the session marks it canceled
    pub fn handle_reply(&mut self, stanza: &Element) -> Result<CommandResponse> {
        let response = match CommandResponse::from_stanza(stanza) {
            Ok(response) => response,
            Err(Error::Remote(e)) => {
                if e.ends_session() {
                    self.status = Status::Canceled;
                }
                return Err(Error::Remote(e));
            }
            Err(e) => return Err(e),
        };

        if let Some(id) = &response.session_id {
            self.remote_id = Some(id.clone());
        }
        self.status = response.status;
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::CommandResult;
    use crate::stanza::{Field, FormType, IqHeader};

    fn jid(s: &str) -> Jid {
        Jid::parse(s).unwrap()
    }

    fn reply_to(request: &Element, command: Element) -> Element {
        let mut request = request.clone();
        request.set_attr("from", "requestor@example.com/a");
        IqHeader::parse(&request).unwrap().result().child_add(command)
    }

    #[test]
    fn request_layout() {
        let iq = command_request("1", &jid("bot@example.com"), "status", Action::Execute, Some("s1"), None);
        assert_eq!(
            iq.to_xml().unwrap(),
            concat!(
                r#"<iq type="set" id="1" to="bot@example.com">"#,
                r#"<command xmlns="http://jabber.org/protocol/commands" node="status" action="execute" sessionid="s1"/>"#,
                r#"</iq>"#
            )
        );
    }

    #[test]
    fn decodes_executing_response() {
        let form = Form::new(FormType::Form)
            .with_field(Field::new("list-single", "show"))
            .to_element();
        let command = CommandResult::executing(form)
            .with_actions(vec![Action::Next, Action::Prev])
            .with_note(Note::warn("careful"))
            .to_command_element("s9", "status");
        let stanza = IqHeader::parse(
            &Element::parse(r#"<iq type="set" id="1" from="a@b/c"/>"#).unwrap(),
        )
        .unwrap()
        .result()
        .child_add(command);

        let response = CommandResponse::from_stanza(&stanza).unwrap();
        assert_eq!(response.status, Status::Executing);
        assert_eq!(response.session_id.as_deref(), Some("s9"));
        assert_eq!(response.actions, vec![Action::Next, Action::Prev]);
        assert_eq!(response.default_action, Some(Action::Next));
        assert_eq!(merged_notes(&response.notes), vec!["WARNING: careful".to_string()]);
        assert!(response.form.unwrap().field("show").is_some());
    }

    #[test]
    fn error_reply_maps_back() {
        let stanza = IqHeader::parse(
            &Element::parse(r#"<iq type="set" id="1" from="a@b/c"/>"#).unwrap(),
        )
        .unwrap()
        .error(CommandError::SessionExpired.to_element());

        let Err(Error::Remote(e)) = CommandResponse::from_stanza(&stanza) else {
            panic!("expected a remote error");
        };
        assert_eq!(e, CommandError::SessionExpired);
    }

    #[test]
    fn unknown_note_type_reads_as_info() {
        let stanza = Element::parse(concat!(
            r#"<iq type="result" id="1"><command xmlns="http://jabber.org/protocol/commands" status="completed">"#,
            r#"<note type="shout">hi</note><note>plain</note><note type="error">bad</note></command></iq>"#
        ))
        .unwrap();
        let response = CommandResponse::from_stanza(&stanza).unwrap();
        assert_eq!(
            merged_notes(&response.notes),
            vec!["hi".to_string(), "plain".to_string(), "ERROR: bad".to_string()]
        );
    }

    #[test]
    fn client_session_tracks_remote_id() {
        let mut session = ClientSession::new(jid("bot@example.com"), "status");

        let first = session.request(Action::Execute, None).unwrap();
        assert!(first.child("command", NS_COMMANDS).unwrap().attr("sessionid").is_none());

        let executing = CommandResult::executing(Form::new(FormType::Form).to_element())
            .to_command_element("remote-1", "status");
        session.handle_reply(&reply_to(&first, executing)).unwrap();
        assert_eq!(session.remote_id(), Some("remote-1"));

        let second = session.request(Action::Execute, None).unwrap();
        assert_eq!(
            second.child("command", NS_COMMANDS).unwrap().attr("sessionid"),
            Some("remote-1")
        );
        assert_ne!(first.attr("id"), second.attr("id"));

        let done = CommandResult::completed().to_command_element("remote-1", "status");
        session.handle_reply(&reply_to(&second, done)).unwrap();
        assert!(session.is_finished());
        assert!(session.request(Action::Execute, None).is_err());
    }

    #[test]
    fn parses_items() {
        let stanza = Element::parse(concat!(
            r#"<iq type="result" id="d"><query xmlns="http://jabber.org/protocol/disco#items" node="http://jabber.org/protocol/commands">"#,
            r#"<item jid="bot@example.com" node="status" name="Status"/></query></iq>"#
        ))
        .unwrap();
        let items = parse_items(&stanza).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].node, "status");
        assert_eq!(items[0].name, "Status");
        assert_eq!(items_request("d", &jid("bot@example.com")).attr("type"), Some("get"));
    }
}
