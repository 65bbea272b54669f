//! Jabber identifiers
//!
//! Only the structure needed for routing and access checks is modeled:
//! `node@domain/resource`, with node and domain case-folded. Full
//! stringprep is left to the transport.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// An XMPP address
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Jid {
    node: Option<String>,
    domain: String,
    resource: Option<String>,
}

impl Jid {
    /// Parse a JID from its string form
    ///
    /// # Errors
    ///
    /// Returns error if the domain is missing or a present part is empty
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (bare, resource) = match s.split_once('/') {
            Some((bare, resource)) => (bare, Some(resource)),
            None => (s, None),
        };
        let (node, domain) = match bare.split_once('@') {
            Some((node, domain)) => (Some(node), domain),
            None => (None, bare),
        };

        if domain.is_empty() {
            return Err(Error::Jid(format!("missing domain in '{s}'")));
        }
        if node.is_some_and(str::is_empty) {
            return Err(Error::Jid(format!("empty node in '{s}'")));
        }
        if resource.is_some_and(str::is_empty) {
            return Err(Error::Jid(format!("empty resource in '{s}'")));
        }

        Ok(Self {
            node: node.map(str::to_lowercase),
            domain: domain.to_lowercase(),
            resource: resource.map(ToString::to_string),
        })
    }

    /// Local part, if any
    #[must_use]
    pub fn node(&self) -> Option<&str> {
        self.node.as_deref()
    }

    /// Domain part
    #[must_use]
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Resource part, if any
    #[must_use]
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// This JID without its resource
    #[must_use]
    pub fn bare(&self) -> Self {
        Self {
            node: self.node.clone(),
            domain: self.domain.clone(),
            resource: None,
        }
    }

    /// Whether this JID carries no resource
    #[must_use]
    pub const fn is_bare(&self) -> bool {
        self.resource.is_none()
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(node) = &self.node {
            write!(f, "{node}@")?;
        }
        write!(f, "{}", self.domain)?;
        if let Some(resource) = &self.resource {
            write!(f, "/{resource}")?;
        }
        Ok(())
    }
}

impl FromStr for Jid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Jid {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        Self::parse(&s)
    }
}

impl From<Jid> for String {
    fn from(jid: Jid) -> Self {
        jid.to_string()
    }
}
