//! Roster group membership lookup
//!
//! Access rules may name roster groups. The roster store itself belongs to
//! the transport layer; the engine only needs to resolve a group name to the
//! bare JIDs in it.

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use crate::{Error, Jid, Result};

/// Resolves roster groups to their members
pub trait GroupLookup: Send + Sync {
    /// Bare JIDs belonging to `group`
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnknownGroup`] if the group does not exist
    fn group_members(&self, group: &str) -> Result<HashSet<Jid>>;
}

/// In-memory roster keyed by group name
#[derive(Debug, Default)]
pub struct Roster {
    groups: RwLock<HashMap<String, HashSet<Jid>>>,
}

impl Roster {
    /// Create an empty roster
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a roster from a group → members map
    #[must_use]
    pub fn from_groups(groups: HashMap<String, Vec<Jid>>) -> Self {
        let groups = groups
            .into_iter()
            .map(|(name, members)| (name, members.iter().map(Jid::bare).collect()))
            .collect();
        Self {
            groups: RwLock::new(groups),
        }
    }

    /// Add a contact to a group, creating the group if needed
    pub fn add_to_group(&self, group: &str, jid: &Jid) {
        let mut groups = self.groups.write().unwrap_or_else(|e| e.into_inner());
        groups.entry(group.to_string()).or_default().insert(jid.bare());
    }

    /// Remove a contact from a group
    ///
    /// Returns true if the contact was a member
    pub fn remove_from_group(&self, group: &str, jid: &Jid) -> bool {
        let mut groups = self.groups.write().unwrap_or_else(|e| e.into_inner());
        groups
            .get_mut(group)
            .is_some_and(|members| members.remove(&jid.bare()))
    }

    /// Names of all known groups
    #[must_use]
    pub fn group_names(&self) -> Vec<String> {
        let groups = self.groups.read().unwrap_or_else(|e| e.into_inner());
        groups.keys().cloned().collect()
    }
}

impl GroupLookup for Roster {
    fn group_members(&self, group: &str) -> Result<HashSet<Jid>> {
        let groups = self.groups.read().unwrap_or_else(|e| e.into_inner());
        groups
            .get(group)
            .cloned()
            .ok_or_else(|| Error::UnknownGroup(group.to_string()))
    }
}
