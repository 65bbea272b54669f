//! Ad-hoc command protocol engine
//!
//! Turns inbound `<iq type="set"><command/></iq>` requests into exactly one
//! reply each. A request goes through two phases:
//!
//! ```text
//! begin:  lookup node -> authorize -> resolve or open session -> lock row
//! finish: cancel or invoke handler -> encode reply -> update or delete row
//! ```
//!
//! Errors raised in `begin` never touch session state, not even the idle
//! timer. The row lock is held from the end of `begin` until the reply has
//! been handed to the sink, which serializes the requests of one session
//! and their replies.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;

use super::definition::{CommandDefinition, Invocation};
use super::disco::{self, DiscoInfo, DiscoItem};
use super::registry::CommandRegistry;
use super::session::{CommandSession, SessionTable};
use super::{Action, CommandError, CommandRequest, CommandResult, Status};
use crate::roster::GroupLookup;
use crate::stanza::{Element, IqHeader, NS_COMMANDS};
use crate::transport::StanzaSink;
use crate::{Error, Jid, Result};

/// A request that passed lookup, authorization and session resolution
struct Turn {
    definition: Arc<CommandDefinition>,
    session_id: String,
    /// Whether this request opened the session
    created: bool,
    session: OwnedMutexGuard<CommandSession>,
}

/// Outcome of decoding an inbound stanza
enum Inbound {
    Request(CommandRequest),
    /// Decoding failed in a way the sender must hear about
    Reject(Element),
}

/// Server side of the ad-hoc command protocol
pub struct ProtocolEngine {
    registry: Arc<CommandRegistry>,
    sessions: Arc<SessionTable>,
    groups: Arc<dyn GroupLookup>,
    sink: Arc<dyn StanzaSink>,
}

impl ProtocolEngine {
    /// Create an engine over shared state and collaborators
    pub fn new(
        registry: Arc<CommandRegistry>,
        sessions: Arc<SessionTable>,
        groups: Arc<dyn GroupLookup>,
        sink: Arc<dyn StanzaSink>,
    ) -> Self {
        Self {
            registry,
            sessions,
            groups,
            sink,
        }
    }

    /// Command registry the engine reads from
    #[must_use]
    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// Session table the engine writes to
    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionTable> {
        &self.sessions
    }

    /// Decode and handle one inbound stanza, sending its reply
    ///
    /// # Errors
    ///
    /// Returns `Stanza` if the stanza is not an addressable command request
    /// (nothing is sent), or the sink's error if the reply cannot be sent
    pub async fn handle_stanza(&self, owner: &Jid, stanza: &Element) -> Result<()> {
        match read_request(stanza)? {
            Inbound::Request(request) => self.on_request(owner, request).await,
            Inbound::Reject(reply) => self.sink.send(reply).await,
        }
    }

    /// Handle a decoded request and send its reply
    ///
    /// # Errors
    ///
    /// Returns the sink's error if the reply cannot be sent
    pub async fn on_request(&self, owner: &Jid, request: CommandRequest) -> Result<()> {
        match self.begin(owner, &request).await {
            Ok(mut turn) => {
                let reply = self.finish(owner, &request, &mut turn).await;
                let sent = self.sink.send(reply).await;
                drop(turn);
                sent
            }
            Err(e) => self.sink.send(request.header.error(e.to_element())).await,
        }
    }

    /// Handle a decoded request and return its reply without sending it
    pub async fn process(&self, owner: &Jid, request: &CommandRequest) -> Element {
        match self.begin(owner, request).await {
            Ok(mut turn) => self.finish(owner, request, &mut turn).await,
            Err(e) => request.header.error(e.to_element()),
        }
    }

    /// Handle a stanza from a receive loop
    ///
    /// Lookup, authorization and session resolution run before this returns,
    /// so requests for one session keep their receipt order; the handler
    /// runs on a spawned task. Returns the task, if one was spawned.
    ///
    /// # Errors
    ///
    /// Same as [`ProtocolEngine::handle_stanza`]
    pub async fn dispatch(
        self: &Arc<Self>,
        owner: &Jid,
        stanza: &Element,
    ) -> Result<Option<JoinHandle<()>>> {
        let request = match read_request(stanza)? {
            Inbound::Request(request) => request,
            Inbound::Reject(reply) => {
                self.sink.send(reply).await?;
                return Ok(None);
            }
        };

        let turn = match self.begin(owner, &request).await {
            Ok(turn) => turn,
            Err(e) => {
                self.sink.send(request.header.error(e.to_element())).await?;
                return Ok(None);
            }
        };

        let engine = Arc::clone(self);
        let owner = owner.clone();
        Ok(Some(tokio::spawn(async move {
            let mut turn = turn;
            let reply = engine.finish(&owner, &request, &mut turn).await;
            if let Err(e) = engine.sink.send(reply).await {
                tracing::warn!(owner = %owner, id = %request.header.id, error = %e, "failed to send command reply");
            }
            drop(turn);
        })))
    }

    /// Features advertised for `owner`
    #[must_use]
    pub fn features(&self, owner: &Jid) -> Vec<String> {
        disco::features(&self.registry, owner)
    }

    /// Commands of `owner` visible to `requestor`
    #[must_use]
    pub fn items(&self, owner: &Jid, requestor: &Jid) -> Vec<DiscoItem> {
        disco::items(&self.registry, self.groups.as_ref(), owner, requestor)
    }

    /// Disco info for the command list or a command node
    #[must_use]
    pub fn info(&self, owner: &Jid, requestor: &Jid, node: &str) -> Option<DiscoInfo> {
        disco::info(&self.registry, self.groups.as_ref(), owner, requestor, node)
    }

    /// Answer a disco query about commands, if `stanza` is one
    ///
    /// # Errors
    ///
    /// Returns `Stanza` if the iq envelope is malformed
    pub async fn answer_disco(&self, owner: &Jid, stanza: &Element) -> Result<bool> {
        let header = IqHeader::parse(stanza)?;
        match disco::answer(&self.registry, self.groups.as_ref(), owner, &header, stanza) {
            Some(reply) => {
                self.sink.send(reply).await?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn begin(&self, owner: &Jid, request: &CommandRequest) -> std::result::Result<Turn, CommandError> {
        let requestor = request.requestor();

        let definition = self.registry.lookup(owner, &request.node).map_err(|e| {
            tracing::debug!(owner = %owner, node = %request.node, error = %e, "command lookup failed");
            CommandError::ItemNotFound
        })?;

        if !definition.is_authorized(requestor, self.groups.as_ref()) {
            tracing::debug!(owner = %owner, node = %request.node, requestor = %requestor, "command not authorized");
            return Err(CommandError::Forbidden);
        }

        let Some(session_id) = request.session_id.clone() else {
            let (session_id, row) = self.sessions.new_session(
                owner,
                definition.node(),
                requestor,
                definition.timeout(),
            );
            let session = row.lock_owned().await;
            return Ok(Turn {
                definition,
                session_id,
                created: true,
                session,
            });
        };

        let row = self.sessions.get(&session_id)?;
        let session = row.lock_owned().await;
        if row.is_closed() {
            // ended while this request waited for the row
            return Err(CommandError::SessionExpired);
        }
        if session.owner != *owner || session.node != definition.node() {
            tracing::debug!(session_id = %session_id, node = %request.node, "session belongs to another command");
            return Err(CommandError::SessionExpired);
        }
        if session.requestor != *requestor {
            tracing::warn!(
                session_id = %session_id,
                requestor = %requestor,
                expected = %session.requestor,
                "rejected request from another entity"
            );
            return Err(CommandError::Forbidden);
        }
        self.sessions.touch(&session_id);

        Ok(Turn {
            definition,
            session_id,
            created: false,
            session,
        })
    }

    /// Run the step and build its reply
    ///
    /// The turn keeps the row locked; callers hold it until the reply is
    /// sent so replies of one session leave in order.
    async fn finish(&self, owner: &Jid, request: &CommandRequest, turn: &mut Turn) -> Element {
        let Turn {
            definition,
            session_id,
            created,
            session,
        } = turn;

        let outcome = if request.action == Action::Cancel {
            Ok(CommandResult::canceled())
        } else {
            let call = Invocation {
                payload: &request.payload,
                action: request.action,
                node: definition.node(),
                owner,
                requestor: request.requestor(),
            };
            let handler = definition.handler();
            match AssertUnwindSafe(handler.invoke(call, &mut session.data))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome.and_then(check_result),
                Err(_) => {
                    tracing::error!(owner = %owner, node = definition.node(), session_id = %session_id, "command handler panicked");
                    Err(CommandError::Internal)
                }
            }
        };

        match outcome {
            Ok(result) => {
                session.status = result.status;
                let command = result.to_command_element(session_id, definition.node());
                if result.status.is_terminal() {
                    self.sessions.delete(session_id);
                }
                tracing::debug!(
                    owner = %owner,
                    node = definition.node(),
                    session_id = %session_id,
                    action = %request.action,
                    status = %result.status,
                    "command step done"
                );
                request.header.result().child_add(command)
            }
            Err(e) => {
                if *created || e.ends_session() {
                    self.sessions.delete(session_id);
                }
                tracing::debug!(
                    owner = %owner,
                    node = definition.node(),
                    session_id = %session_id,
                    error = %e,
                    "command step failed"
                );
                request.header.error(e.to_element())
            }
        }
    }
}

/// An executing step must present something to act on
fn check_result(result: CommandResult) -> std::result::Result<CommandResult, CommandError> {
    if result.status == Status::Executing && result.payload.is_none() {
        tracing::warn!("handler returned an executing step without payload");
        return Err(CommandError::Internal);
    }
    Ok(result)
}

fn read_request(stanza: &Element) -> Result<Inbound> {
    if !CommandRequest::is_command_stanza(stanza) {
        return Err(Error::Stanza(format!(
            "<{}/> is not a command request",
            stanza.name()
        )));
    }
    let header = IqHeader::parse(stanza)?;
    let Some(command) = stanza.child("command", NS_COMMANDS) else {
        return Err(Error::Stanza("missing <command/>".to_string()));
    };

    match CommandRequest::from_command(header.clone(), command) {
        Ok(request) => Ok(Inbound::Request(request)),
        Err(e) => {
            tracing::debug!(id = %header.id, from = %header.from, error = %e, "rejected malformed command request");
            Ok(Inbound::Reject(header.error(e.to_element())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executing_without_payload_is_internal() {
        let mut result = CommandResult::completed();
        result.status = Status::Executing;
        assert_eq!(check_result(result), Err(CommandError::Internal));
        assert!(check_result(CommandResult::canceled()).is_ok());
        assert!(check_result(CommandResult::executing(Element::new("x"))).is_ok());
    }

    #[test]
    fn non_command_stanzas_are_not_answered() {
        let message = Element::parse(r#"<message from="a@b" id="1"/>"#).unwrap();
        assert!(matches!(read_request(&message), Err(Error::Stanza(_))));

        let get = Element::parse(&format!(
            r#"<iq type="get" id="1" from="a@b"><command xmlns="{NS_COMMANDS}" node="n"/></iq>"#
        ))
        .unwrap();
        assert!(matches!(read_request(&get), Err(Error::Stanza(_))));

        let anonymous = Element::parse(&format!(
            r#"<iq type="set" id="1"><command xmlns="{NS_COMMANDS}" node="n"/></iq>"#
        ))
        .unwrap();
        assert!(read_request(&anonymous).is_err());
    }

    #[test]
    fn missing_node_is_rejected_with_reply() {
        let stanza = Element::parse(&format!(
            r#"<iq type="set" id="7" from="a@b/c"><command xmlns="{NS_COMMANDS}"/></iq>"#
        ))
        .unwrap();
        let Ok(Inbound::Reject(reply)) = read_request(&stanza) else {
            panic!("expected a rejection");
        };
        assert_eq!(reply.attr("type"), Some("error"));
        assert_eq!(reply.attr("id"), Some("7"));
        let error = reply.children().next().unwrap();
        assert_eq!(error.name(), "error");
        assert_eq!(error.attr("type"), Some("cancel"));
    }
}
