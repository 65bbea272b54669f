//! Registry of command definitions, keyed by owner and node

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use super::definition::CommandDefinition;
use crate::{Error, Jid, Result};

/// Per-owner table of registered commands
#[derive(Debug, Default)]
pub struct CommandRegistry {
    owners: RwLock<HashMap<Jid, HashMap<String, Arc<CommandDefinition>>>>,
}

impl CommandRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command for `owner` and return its node
    ///
    /// An empty node is replaced by a generated `COMMANDS_<uuid>` node.
    ///
    /// # Errors
    ///
    /// Returns `DuplicateNode` if the owner already has a command on that node
    pub fn register(&self, owner: &Jid, definition: CommandDefinition) -> Result<String> {
        let definition = definition.bind(owner);
        let node = definition.node().to_string();

        let mut owners = self.owners.write().unwrap_or_else(|e| e.into_inner());
        let commands = owners.entry(owner.clone()).or_default();
        if commands.contains_key(&node) {
            return Err(Error::DuplicateNode {
                owner: owner.to_string(),
                node,
            });
        }

        tracing::info!(owner = %owner, node = %node, label = definition.label(), "registered command");
        commands.insert(node.clone(), Arc::new(definition));
        Ok(node)
    }

    /// Remove a command; absent nodes are ignored
    pub fn unregister(&self, owner: &Jid, node: &str) {
        let mut owners = self.owners.write().unwrap_or_else(|e| e.into_inner());
        if let Some(commands) = owners.get_mut(owner) {
            if commands.remove(node).is_some() {
                tracing::info!(owner = %owner, node, "unregistered command");
            }
            if commands.is_empty() {
                owners.remove(owner);
            }
        }
    }

    /// Remove every command of `owner`, returning how many were dropped
    pub fn unregister_all(&self, owner: &Jid) -> usize {
        let mut owners = self.owners.write().unwrap_or_else(|e| e.into_inner());
        let count = owners.remove(owner).map_or(0, |commands| commands.len());
        if count > 0 {
            tracing::info!(owner = %owner, count, "unregistered all commands");
        }
        count
    }

    /// Find the command registered on `node`
    ///
    /// # Errors
    ///
    /// Returns `CommandNotFound` if there is none
    pub fn lookup(&self, owner: &Jid, node: &str) -> Result<Arc<CommandDefinition>> {
        let owners = self.owners.read().unwrap_or_else(|e| e.into_inner());
        owners
            .get(owner)
            .and_then(|commands| commands.get(node))
            .cloned()
            .ok_or_else(|| Error::CommandNotFound(node.to_string()))
    }

    /// Snapshot of the owner's commands, ordered by node
    #[must_use]
    pub fn list(&self, owner: &Jid) -> Vec<Arc<CommandDefinition>> {
        let owners = self.owners.read().unwrap_or_else(|e| e.into_inner());
        let mut list: Vec<_> = owners
            .get(owner)
            .map(|commands| commands.values().cloned().collect())
            .unwrap_or_default();
        list.sort_by(|a, b| a.node().cmp(b.node()));
        list
    }

    /// Whether `owner` has at least one command
    #[must_use]
    pub fn has_commands(&self, owner: &Jid) -> bool {
        let owners = self.owners.read().unwrap_or_else(|e| e.into_inner());
        owners.get(owner).is_some_and(|commands| !commands.is_empty())
    }
}
