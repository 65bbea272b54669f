//! Shared test utilities

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use adhoc_gateway::commands::{AccessRules, StatusCommand};
use adhoc_gateway::stanza::{Element, Field, Form, FormType, NS_COMMANDS};
use adhoc_gateway::transport::Show;
use adhoc_gateway::{
    CommandRegistry, Jid, PresenceControl, ProtocolEngine, Roster, SessionTable, StanzaSink,
};
use async_trait::async_trait;
use tokio::sync::Notify;

/// Sink that keeps every stanza sent through it
#[derive(Default)]
pub struct RecordingSink {
    sent: Mutex<Vec<Element>>,
    held: Mutex<HashMap<String, Arc<Notify>>>,
}

impl RecordingSink {
    /// Make the reply with this `id` wait in `send` until the returned
    /// handle is notified
    pub fn hold(&self, id: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.held
            .lock()
            .unwrap()
            .insert(id.to_string(), Arc::clone(&gate));
        gate
    }

    /// Remove and return everything sent so far
    pub fn take(&self) -> Vec<Element> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    /// Remove and return the single stanza sent so far
    pub fn take_one(&self) -> Element {
        let mut sent = self.take();
        assert_eq!(sent.len(), 1, "expected exactly one stanza, got {sent:?}");
        sent.remove(0)
    }
}

#[async_trait]
impl StanzaSink for RecordingSink {
    async fn send(&self, stanza: Element) -> adhoc_gateway::Result<()> {
        let gate = stanza
            .attr("id")
            .and_then(|id| self.held.lock().unwrap().remove(id));
        if let Some(gate) = gate {
            gate.notified().await;
        }
        self.sent.lock().unwrap().push(stanza);
        Ok(())
    }
}

/// Presence control that records what it was asked to do
#[derive(Default)]
pub struct RecordingPresence {
    pub shows: Mutex<Vec<Show>>,
    pub disconnects: Mutex<usize>,
}

#[async_trait]
impl PresenceControl for RecordingPresence {
    async fn set_show(&self, show: Show) -> adhoc_gateway::Result<()> {
        self.shows.lock().unwrap().push(show);
        Ok(())
    }

    async fn disconnect(&self) -> adhoc_gateway::Result<()> {
        *self.disconnects.lock().unwrap() += 1;
        Ok(())
    }
}

/// Engine wired to in-memory collaborators
pub struct Harness {
    pub owner: Jid,
    pub registry: Arc<CommandRegistry>,
    pub sessions: Arc<SessionTable>,
    pub roster: Arc<Roster>,
    pub sink: Arc<RecordingSink>,
    pub presence: Arc<RecordingPresence>,
    pub engine: Arc<ProtocolEngine>,
}

impl Harness {
    pub fn new() -> Self {
        let registry = Arc::new(CommandRegistry::new());
        let sessions = Arc::new(SessionTable::new());
        let roster = Arc::new(Roster::new());
        let sink = Arc::new(RecordingSink::default());
        let engine = Arc::new(ProtocolEngine::new(
            Arc::clone(&registry),
            Arc::clone(&sessions),
            roster.clone(),
            sink.clone(),
        ));

        Self {
            owner: jid("owner@example.com/desktop"),
            registry,
            sessions,
            roster,
            sink,
            presence: Arc::new(RecordingPresence::default()),
            engine,
        }
    }

    /// Register the status command with the given access rules
    pub fn register_status(&self, access: AccessRules) {
        let definition = StatusCommand::definition(self.presence.clone(), access);
        self.registry.register(&self.owner, definition).unwrap();
    }

    /// Send a stanza through the engine and return the single reply
    pub async fn exchange(&self, stanza: &Element) -> Element {
        self.engine.handle_stanza(&self.owner, stanza).await.unwrap();
        self.sink.take_one()
    }
}

pub fn jid(s: &str) -> Jid {
    Jid::parse(s).unwrap()
}

/// Build an inbound command request
pub fn command_iq(
    id: &str,
    from: &str,
    node: &str,
    action: Option<&str>,
    session_id: Option<&str>,
    payload: Option<Element>,
) -> Element {
    let mut command = Element::with_ns("command", NS_COMMANDS).attr_set("node", node);
    if let Some(action) = action {
        command.set_attr("action", action);
    }
    if let Some(session_id) = session_id {
        command.set_attr("sessionid", session_id);
    }
    if let Some(payload) = payload {
        command.push_child(payload);
    }

    Element::new("iq")
        .attr_set("type", "set")
        .attr_set("id", id)
        .attr_set("from", from)
        .attr_set("to", "owner@example.com/desktop")
        .child_add(command)
}

/// Submitted status form
pub fn show_form(show: &str) -> Element {
    Form::new(FormType::Submit)
        .with_field(Field::new("list-single", "show").with_value(show))
        .to_element()
}

/// The `<command/>` of a result reply
pub fn command_of(reply: &Element) -> &Element {
    assert_eq!(reply.attr("type"), Some("result"), "not a result: {reply}");
    reply.child("command", NS_COMMANDS).unwrap()
}

/// Stanza and command conditions of an error reply
pub fn error_of(reply: &Element) -> (String, Option<String>, String) {
    assert_eq!(reply.attr("type"), Some("error"), "not an error: {reply}");
    let error = reply.children().find(|c| c.name() == "error").unwrap();
    let mut names = error.children().map(|c| c.name().to_string());
    let condition = names.next().unwrap();
    let command_condition = names.next();
    (
        condition,
        command_condition,
        error.attr("type").unwrap().to_string(),
    )
}
