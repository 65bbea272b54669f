//! Daemon - the owner's command service
//!
//! Registers the owner's built-in commands at connect, feeds inbound
//! stanzas to the engine, sweeps idle sessions, and tears everything down
//! again at disconnect.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::commands::{CommandRegistry, ProtocolEngine, SessionTable, StatusCommand};
use crate::roster::Roster;
use crate::stanza::Element;
use crate::transport::{SinkPresence, StanzaSink};
use crate::{Config, Error, Jid, Result};

/// Command service for one owner
pub struct Daemon {
    config: Config,
    owner: Jid,
    engine: Arc<ProtocolEngine>,
    sink: Arc<dyn StanzaSink>,
}

impl Daemon {
    /// Create a daemon writing its stanzas to `sink`
    ///
    /// # Errors
    ///
    /// Returns error if no owner is configured
    pub fn new(config: Config, sink: Arc<dyn StanzaSink>) -> Result<Self> {
        let owner = config
            .owner
            .clone()
            .ok_or_else(|| Error::Config("owner JID required (--owner or ADHOC_OWNER)".to_string()))?;

        let roster = Arc::new(Roster::from_groups(config.roster_groups.clone()));
        let engine = Arc::new(ProtocolEngine::new(
            Arc::new(CommandRegistry::new()),
            Arc::new(SessionTable::new()),
            roster,
            Arc::clone(&sink),
        ));

        Ok(Self {
            config,
            owner,
            engine,
            sink,
        })
    }

    /// Owner the commands are registered under
    #[must_use]
    pub fn owner(&self) -> &Jid {
        &self.owner
    }

    /// Engine answering command requests
    #[must_use]
    pub fn engine(&self) -> &Arc<ProtocolEngine> {
        &self.engine
    }

    /// Register the owner's built-in commands
    ///
    /// Returns a handle notified when a command asks to disconnect.
    ///
    /// # Errors
    ///
    /// Returns error if a built-in command is already registered
    pub fn connect(&self) -> Result<Arc<Notify>> {
        let presence = SinkPresence::new(self.owner.clone(), Arc::clone(&self.sink));
        let disconnected = presence.disconnected();

        if self.config.status.enabled {
            let definition =
                StatusCommand::definition(Arc::new(presence), self.config.status.access.clone())
                    .with_timeout(self.config.session_timeout);
            self.engine.registry().register(&self.owner, definition)?;
        }

        tracing::info!(
            owner = %self.owner,
            commands = self.engine.registry().list(&self.owner).len(),
            "owner connected"
        );
        Ok(disconnected)
    }

    /// Drop the owner's commands and sessions
    pub fn disconnect(&self) {
        let commands = self.engine.registry().unregister_all(&self.owner);
        let sessions = self.engine.sessions().purge_owner(&self.owner);
        tracing::info!(owner = %self.owner, commands, sessions, "owner disconnected");
    }

    /// Route one inbound stanza
    ///
    /// Command requests are dispatched to the engine; disco queries about
    /// commands are answered inline. Anything else is dropped.
    pub async fn handle(&self, stanza: &Element) -> Option<JoinHandle<()>> {
        if stanza.name() == "iq" && stanza.attr("type") == Some("get") {
            match self.engine.answer_disco(&self.owner, stanza).await {
                Ok(true) => {}
                Ok(false) => tracing::debug!(id = ?stanza.attr("id"), "ignoring unsupported query"),
                Err(e) => tracing::warn!(error = %e, "dropped malformed query"),
            }
            return None;
        }

        match self.engine.dispatch(&self.owner, stanza).await {
            Ok(task) => task,
            Err(Error::Stanza(reason)) => {
                tracing::warn!(reason = %reason, "dropped stanza");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to handle stanza");
                None
            }
        }
    }

    /// Serve until the inbound stream ends, `shutdown` resolves, or a
    /// command disconnects the owner
    ///
    /// # Errors
    ///
    /// Returns error if the built-in commands cannot be registered
    pub async fn run(
        self,
        mut inbound: mpsc::Receiver<Element>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<()> {
        let disconnected = self.connect()?;

        let mut sweep = tokio::time::interval(self.config.sweep_interval);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
        tokio::pin!(shutdown);

        'serve: loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("shutdown requested");
                    break;
                }
                () = disconnected.notified() => {
                    tracing::info!(owner = %self.owner, "disconnect requested by command");
                    break;
                }
                _ = sweep.tick() => {
                    let expired = self.engine.sessions().sweep();
                    if expired > 0 {
                        tracing::debug!(expired, "swept idle command sessions");
                    }
                    in_flight.retain(|task| !task.is_finished());
                }
                stanza = inbound.recv() => {
                    let Some(stanza) = stanza else {
                        tracing::info!("inbound stream closed");
                        break;
                    };
                    // routing may wait on a busy session
                    tokio::select! {
                        task = self.handle(&stanza) => {
                            if let Some(task) = task {
                                in_flight.push(task);
                            }
                        }
                        () = &mut shutdown => {
                            tracing::info!("shutdown requested");
                            break 'serve;
                        }
                        () = disconnected.notified() => {
                            tracing::info!(owner = %self.owner, "disconnect requested by command");
                            break 'serve;
                        }
                    }
                }
            }
        }

        drain(in_flight, self.config.drain_timeout).await;
        self.disconnect();
        Ok(())
    }
}

/// Let running steps deliver their replies, aborting those still running
/// when `grace` runs out
async fn drain(tasks: Vec<JoinHandle<()>>, grace: Duration) {
    let deadline = Instant::now() + grace;
    for mut task in tasks {
        match tokio::time::timeout_at(deadline, &mut task).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "command task failed"),
            Err(_) => {
                task.abort();
                tracing::warn!("aborted command step still running at shutdown");
            }
        }
    }
}
