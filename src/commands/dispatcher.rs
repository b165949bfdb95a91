use super::{
    handler::{HelpCommand, HistoryCommand, ModelCommand},
    registry::CommandRegistry,
};
use crate::core::error::QllamaError;
use crate::session::ChatSession;
use std::sync::Arc;

#[derive(Clone)]
pub struct CommandDispatcher {
    registry: Arc<CommandRegistry>,
}

impl CommandDispatcher {
    pub fn new(registry: Arc<CommandRegistry>) -> Self {
        Self { registry }
    }

    /// Registered commands are handled here; other `/...` input is ordinary text.
    pub fn handles(&self, command: &str) -> bool {
        self.registry.contains(command)
    }

    pub fn execute(
        &self,
        command: &str,
        args: &[&str],
        session: &ChatSession,
    ) -> Result<Option<String>, QllamaError> {
        self.registry.execute(command, args, session)
    }

    pub fn get_command_names(&self) -> Vec<String> {
        self.registry.get_command_names()
    }
}

pub fn create_command_registry() -> CommandDispatcher {
    let mut registry = CommandRegistry::new();

    registry.register("help", HelpCommand);
    registry.register("history", HistoryCommand);
    registry.register("model", ModelCommand);

    CommandDispatcher::new(Arc::new(registry))
}
