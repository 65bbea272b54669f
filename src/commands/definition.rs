//! Command definitions and the handler capability

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::policy::AccessRules;
use super::{Action, CommandError, CommandResult, StepData};
use crate::Jid;
use crate::roster::GroupLookup;
use crate::stanza::{Element, NS_X_DATA};

/// Default session inactivity timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(600);

/// Everything a handler gets to see about the current step
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    /// Child elements of the request's `<command/>`
    pub payload: &'a [Element],
    pub action: Action,
    pub node: &'a str,
    /// Identity the command is registered under
    pub owner: &'a Jid,
    pub requestor: &'a Jid,
}

/// Behavior of an ad-hoc command
///
/// Called once per non-cancel step. `data` persists between the steps of
/// a session. Returning an error sends the matching error reply instead of
/// a result.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Run one step of the command
    async fn invoke(
        &self,
        call: Invocation<'_>,
        data: &mut StepData,
    ) -> Result<CommandResult, CommandError>;
}

/// Handler backed by a synchronous closure, see [`handler_fn`]
pub struct FnHandler<F>(F);

#[async_trait]
impl<F> CommandHandler for FnHandler<F>
where
    F: Fn(Invocation<'_>, &mut StepData) -> Result<CommandResult, CommandError> + Send + Sync,
{
    async fn invoke(
        &self,
        call: Invocation<'_>,
        data: &mut StepData,
    ) -> Result<CommandResult, CommandError> {
        (self.0)(call, data)
    }
}

/// Wrap a closure as a [`CommandHandler`]
pub const fn handler_fn<F>(f: F) -> FnHandler<F>
where
    F: Fn(Invocation<'_>, &mut StepData) -> Result<CommandResult, CommandError> + Send + Sync,
{
    FnHandler(f)
}

/// Registration record of one ad-hoc command
#[derive(Clone)]
pub struct CommandDefinition {
    node: String,
    label: String,
    features: Vec<String>,
    timeout: Duration,
    access: AccessRules,
    handler: Arc<dyn CommandHandler>,
}

impl fmt::Debug for CommandDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDefinition")
            .field("node", &self.node)
            .field("label", &self.label)
            .field("features", &self.features)
            .field("timeout", &self.timeout)
            .field("access", &self.access)
            .finish_non_exhaustive()
    }
}

impl CommandDefinition {
    /// Create a definition with an auto-generated node, data form feature,
    /// default timeout and owner-only access
    pub fn new(label: impl Into<String>, handler: impl CommandHandler + 'static) -> Self {
        Self {
            node: String::new(),
            label: label.into(),
            features: vec![NS_X_DATA.to_string()],
            timeout: DEFAULT_TIMEOUT,
            access: AccessRules::default(),
            handler: Arc::new(handler),
        }
    }

    /// Set the disco node; empty means auto-generate at registration
    #[must_use]
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = node.into().trim().to_string();
        self
    }

    /// Replace the advertised payload features
    #[must_use]
    pub fn with_features(mut self, features: Vec<String>) -> Self {
        self.features = features;
        self
    }

    /// Set the session inactivity timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Replace the access rules
    #[must_use]
    pub fn with_access(mut self, access: AccessRules) -> Self {
        self.access = access;
        self
    }

    /// Add an allowed JID
    #[must_use]
    pub fn allow_jid(mut self, jid: Jid) -> Self {
        self.access.allowed_jids.insert(jid);
        self
    }

    /// Add an allowed roster group
    #[must_use]
    pub fn allow_group(mut self, group: impl Into<String>) -> Self {
        self.access.allowed_groups.push(group.into());
        self
    }

    /// Add an allowed magic key such as `@ALL@`
    #[must_use]
    pub fn allow_magic(mut self, magic: impl Into<String>) -> Self {
        self.access.allowed_magics.insert(magic.into());
        self
    }

    /// Add a denied JID
    #[must_use]
    pub fn deny_jid(mut self, jid: Jid) -> Self {
        self.access.denied_jids.insert(jid);
        self
    }

    /// Add a denied roster group
    #[must_use]
    pub fn deny_group(mut self, group: impl Into<String>) -> Self {
        self.access.denied_groups.push(group.into());
        self
    }

    /// Disco node
    #[must_use]
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Human-readable name
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Payload features
    #[must_use]
    pub fn features(&self) -> &[String] {
        &self.features
    }

    /// Session inactivity timeout
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Access rules
    #[must_use]
    pub const fn access(&self) -> &AccessRules {
        &self.access
    }

    /// Handler capability
    #[must_use]
    pub fn handler(&self) -> Arc<dyn CommandHandler> {
        Arc::clone(&self.handler)
    }

    /// Whether `requestor` may run this command
    #[must_use]
    pub fn is_authorized(&self, requestor: &Jid, groups: &dyn GroupLookup) -> bool {
        self.access.is_authorized(requestor, groups)
    }

    /// Fix the node and owner-relative rules for registration under `owner`
    pub(crate) fn bind(mut self, owner: &Jid) -> Self {
        if self.node.is_empty() {
            self.node = format!("COMMANDS_{}", uuid::Uuid::new_v4());
        }
        self.access = self.access.bind_owner(owner);
        self
    }
}
