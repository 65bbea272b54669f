//! Access rules for ad-hoc commands
//!
//! Deny entries always win over allow entries, including the `@ALL@` magic
//! key which otherwise opens the command to everybody.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::Jid;
use crate::roster::GroupLookup;

/// Magic key allowing every requestor
pub const MAGIC_ALL: &str = "@ALL@";

/// Magic key allowing the owner's own bare JID
pub const MAGIC_OWNER_BARE_JID: &str = "@PROFILE_BAREJID@";

/// Allow and deny lists attached to a command definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessRules {
    pub allowed_jids: HashSet<Jid>,
    pub allowed_groups: Vec<String>,
    pub allowed_magics: HashSet<String>,
    pub denied_jids: HashSet<Jid>,
    pub denied_groups: Vec<String>,
}

impl Default for AccessRules {
    /// Only the owner may run the command
    fn default() -> Self {
        Self {
            allowed_jids: HashSet::new(),
            allowed_groups: Vec::new(),
            allowed_magics: HashSet::from([MAGIC_OWNER_BARE_JID.to_string()]),
            denied_jids: HashSet::new(),
            denied_groups: Vec::new(),
        }
    }
}

impl AccessRules {
    /// Rules with no entries at all: nobody is authorized
    #[must_use]
    pub fn empty() -> Self {
        Self {
            allowed_magics: HashSet::new(),
            ..Self::default()
        }
    }

    /// Rules authorizing everybody
    #[must_use]
    pub fn everyone() -> Self {
        Self {
            allowed_magics: HashSet::from([MAGIC_ALL.to_string()]),
            ..Self::default()
        }
    }

    /// Resolve owner-relative magic keys for a concrete owner
    ///
    /// `@PROFILE_BAREJID@` becomes an explicit allowed JID.
    #[must_use]
    pub fn bind_owner(mut self, owner: &Jid) -> Self {
        if self.allowed_magics.contains(MAGIC_OWNER_BARE_JID) {
            self.allowed_jids.insert(owner.bare());
        }
        self
    }

    /// Decide whether `requestor` may use the command
    ///
    /// Evaluated in order, first match wins:
    /// 1. deny list (JIDs and roster groups)
    /// 2. `@ALL@` magic key
    /// 3. allow list (JIDs and roster groups)
    ///
    /// The deny list deliberately comes before `@ALL@`: a command opened to
    /// everyone can still shut out individual JIDs or groups.
    ///
    /// Unknown groups are logged and treated as empty.
    #[must_use]
    pub fn is_authorized(&self, requestor: &Jid, groups: &dyn GroupLookup) -> bool {
        let requestor = requestor.bare();

        let denied = expand(&self.denied_jids, &self.denied_groups, groups);
        if denied.contains(&requestor) {
            tracing::debug!(requestor = %requestor, "requestor is on the deny list");
            return false;
        }

        if self.allowed_magics.contains(MAGIC_ALL) {
            return true;
        }

        let allowed = expand(&self.allowed_jids, &self.allowed_groups, groups);
        allowed.contains(&requestor)
    }
}

fn expand(jids: &HashSet<Jid>, group_names: &[String], groups: &dyn GroupLookup) -> HashSet<Jid> {
    let mut set: HashSet<Jid> = jids.iter().map(Jid::bare).collect();
    for group in group_names {
        match groups.group_members(group) {
            Ok(members) => set.extend(members.iter().map(Jid::bare)),
            Err(e) => tracing::warn!(group = %group, error = %e, "skipping unresolvable roster group"),
        }
    }
    set
}
