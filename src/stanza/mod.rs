//! Stanza model and XML codec
//!
//! The gateway only needs the `<iq/>` request/response envelope, the
//! ad-hoc `<command/>` payload and data forms, so the model is a small
//! element tree rather than a full XMPP library.

mod element;
pub mod form;

pub use element::{Element, Node};
pub use form::{Field, FieldOption, Form, FormType};

use crate::{Error, Jid, Result};

/// Ad-hoc commands namespace (XEP-0050)
pub const NS_COMMANDS: &str = "http://jabber.org/protocol/commands";

/// Data forms namespace (XEP-0004)
pub const NS_X_DATA: &str = "jabber:x:data";

/// Stanza error conditions namespace (RFC 6120)
pub const NS_STANZAS: &str = "urn:ietf:params:xml:ns:xmpp-stanzas";

/// Service discovery items namespace (XEP-0030)
pub const NS_DISCO_ITEMS: &str = "http://jabber.org/protocol/disco#items";

/// Service discovery info namespace (XEP-0030)
pub const NS_DISCO_INFO: &str = "http://jabber.org/protocol/disco#info";

/// Addressing of an `<iq/>` stanza
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IqHeader {
    pub id: String,
    pub iq_type: String,
    pub from: Jid,
    pub to: Option<Jid>,
}

impl IqHeader {
    /// Read the envelope of an `<iq/>` stanza
    ///
    /// # Errors
    ///
    /// Returns error if the element is not an iq, or lacks `id`, `type` or a
    /// valid `from`
    pub fn parse(stanza: &Element) -> Result<Self> {
        if stanza.name() != "iq" {
            return Err(Error::Stanza(format!("expected <iq/>, got <{}/>", stanza.name())));
        }
        let id = stanza
            .attr("id")
            .ok_or_else(|| Error::Stanza("iq without id".to_string()))?;
        let iq_type = stanza
            .attr("type")
            .ok_or_else(|| Error::Stanza("iq without type".to_string()))?;
        let from = stanza
            .attr("from")
            .ok_or_else(|| Error::Stanza("iq without from".to_string()))
            .and_then(Jid::parse)?;
        let to = stanza.attr("to").map(Jid::parse).transpose()?;

        Ok(Self {
            id: id.to_string(),
            iq_type: iq_type.to_string(),
            from,
            to,
        })
    }

    /// Empty `type="result"` reply addressed back to the sender
    #[must_use]
    pub fn result(&self) -> Element {
        self.reply("result")
    }

    /// `type="error"` reply carrying the given `<error/>` child
    #[must_use]
    pub fn error(&self, error: Element) -> Element {
        self.reply("error").child_add(error)
    }

    fn reply(&self, iq_type: &str) -> Element {
        let mut iq = Element::new("iq")
            .attr_set("type", iq_type)
            .attr_set("id", self.id.as_str())
            .attr_set("to", self.from.to_string());
        if let Some(to) = &self.to {
            iq.set_attr("from", to.to_string());
        }
        iq
    }
}

/// Build an RFC 6120 `<error/>` element
///
/// `app_condition` is an optional application-specific condition element
/// placed after the defined condition.
#[must_use]
pub fn stanza_error(error_type: &str, condition: &str, app_condition: Option<Element>) -> Element {
    let mut error = Element::new("error")
        .attr_set("type", error_type)
        .child_add(Element::with_ns(condition, NS_STANZAS));
    if let Some(app) = app_condition {
        error.push_child(app);
    }
    error
}
