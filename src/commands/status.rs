//! Built-in command changing the owner's presence
//!
//! Step one presents a form with a single `show` list; step two applies
//! the submitted choice and completes.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::definition::{CommandDefinition, CommandHandler, Invocation};
use super::policy::AccessRules;
use super::{CommandError, CommandResult, Note, StepData};
use crate::stanza::{Field, FieldOption, Form, FormType};
use crate::transport::{PresenceControl, Show};

/// Node the command is registered under
pub const STATUS_NODE: &str = "status";

/// Choices offered in the form, in display order
const SHOWS: [(&str, &str); 6] = [
    ("default", "Online"),
    ("away", "Away"),
    ("chat", "Free for chat"),
    ("dnd", "Do not disturb"),
    ("xa", "Left"),
    ("disconnect", "Disconnect"),
];

/// Handler of the status command
pub struct StatusCommand {
    presence: Arc<dyn PresenceControl>,
}

impl StatusCommand {
    /// Create the handler
    #[must_use]
    pub fn new(presence: Arc<dyn PresenceControl>) -> Self {
        Self { presence }
    }

    /// Definition on the `status` node with the given access rules
    #[must_use]
    pub fn definition(presence: Arc<dyn PresenceControl>, access: AccessRules) -> CommandDefinition {
        CommandDefinition::new("Status", Self::new(presence))
            .with_node(STATUS_NODE)
            .with_access(access)
    }

    fn selection_form() -> Form {
        let options = SHOWS
            .iter()
            .map(|(value, label)| FieldOption::new(*value, *label))
            .collect();
        Form::new(FormType::Form)
            .with_title("status selection")
            .with_field(Field::new("list-single", "show").required().with_options(options))
    }

    async fn apply(&self, call: Invocation<'_>) -> Result<CommandResult, CommandError> {
        let form = Form::find(call.payload)
            .map_err(|_| CommandError::BadPayload)?
            .ok_or(CommandError::BadPayload)?;
        let show = form.value("show").ok_or(CommandError::BadPayload)?;

        if show == "disconnect" {
            self.presence.disconnect().await?;
        } else {
            let show = Show::parse(show).ok_or(CommandError::BadPayload)?;
            self.presence.set_show(show).await?;
        }

        tracing::info!(owner = %call.owner, requestor = %call.requestor, show, "status changed by command");
        Ok(CommandResult::completed().with_note(Note::info("Status updated")))
    }
}

#[async_trait]
impl CommandHandler for StatusCommand {
    async fn invoke(
        &self,
        call: Invocation<'_>,
        data: &mut StepData,
    ) -> Result<CommandResult, CommandError> {
        let done = match data.get("actions") {
            None => 0,
            Some(Value::Array(actions)) => actions.len(),
            Some(_) => return Err(CommandError::Internal),
        };

        let result = match done {
            0 => CommandResult::executing(Self::selection_form().to_element()),
            1 => self.apply(call).await?,
            _ => return Err(CommandError::Internal),
        };

        // only successful steps count, so a rejected submission can be retried
        if let Value::Array(actions) = data
            .entry("actions")
            .or_insert_with(|| Value::Array(Vec::new()))
        {
            actions.push(Value::from(call.action.as_str()));
        }
        Ok(result)
    }
}
