//! Outbound stanza transport and presence control
//!
//! The engine never talks to a stream directly. Replies go through a
//! [`StanzaSink`]; the Status command changes presence through
//! [`PresenceControl`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Notify, mpsc};

use crate::stanza::Element;
use crate::{Error, Jid, Result};

/// Destination for outbound stanzas
#[async_trait]
pub trait StanzaSink: Send + Sync {
    /// Send one stanza
    async fn send(&self, stanza: Element) -> Result<()>;
}

/// Sink feeding an mpsc channel, drained by the writer task
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<Element>,
}

impl ChannelSink {
    /// Create a sink and the receiver it feeds
    #[must_use]
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Element>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

#[async_trait]
impl StanzaSink for ChannelSink {
    async fn send(&self, stanza: Element) -> Result<()> {
        self.tx
            .send(stanza)
            .await
            .map_err(|_| Error::Transport("outbound channel closed".to_string()))
    }
}

/// Presence availability (RFC 6121 `<show/>`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Show {
    /// Plain available presence, no `<show/>`
    Default,
    Away,
    Chat,
    Dnd,
    Xa,
}

impl Show {
    /// Parse a `<show/>` value; `default` maps to plain availability
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "default" => Some(Self::Default),
            "away" => Some(Self::Away),
            "chat" => Some(Self::Chat),
            "dnd" => Some(Self::Dnd),
            "xa" => Some(Self::Xa),
            _ => None,
        }
    }

    /// Wire value
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Away => "away",
            Self::Chat => "chat",
            Self::Dnd => "dnd",
            Self::Xa => "xa",
        }
    }
}

impl fmt::Display for Show {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Control over the owner's own presence
#[async_trait]
pub trait PresenceControl: Send + Sync {
    /// Broadcast a new availability
    async fn set_show(&self, show: Show) -> Result<()>;

    /// End the owner's session
    async fn disconnect(&self) -> Result<()>;
}

/// Presence control that writes `<presence/>` stanzas to a sink
///
/// `disconnect` sends unavailable presence and wakes whoever waits on
/// [`SinkPresence::disconnected`].
pub struct SinkPresence {
    owner: Jid,
    sink: Arc<dyn StanzaSink>,
    disconnected: Arc<Notify>,
}

impl SinkPresence {
    /// Create presence control for `owner`
    #[must_use]
    pub fn new(owner: Jid, sink: Arc<dyn StanzaSink>) -> Self {
        Self {
            owner,
            sink,
            disconnected: Arc::new(Notify::new()),
        }
    }

    /// Notified once the owner asked to disconnect
    #[must_use]
    pub fn disconnected(&self) -> Arc<Notify> {
        Arc::clone(&self.disconnected)
    }
}

#[async_trait]
impl PresenceControl for SinkPresence {
    async fn set_show(&self, show: Show) -> Result<()> {
        let mut presence = Element::new("presence").attr_set("from", self.owner.to_string());
        if show != Show::Default {
            presence.push_child(Element::new("show").text_add(show.as_str()));
        }
        tracing::info!(owner = %self.owner, show = %show, "presence changed");
        self.sink.send(presence).await
    }

    async fn disconnect(&self) -> Result<()> {
        let presence = Element::new("presence")
            .attr_set("from", self.owner.to_string())
            .attr_set("type", "unavailable");
        self.sink.send(presence).await?;
        tracing::info!(owner = %self.owner, "disconnect requested");
        self.disconnected.notify_one();
        Ok(())
    }
}
