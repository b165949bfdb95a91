use crate::commands::handler::CommandHandler;
use crate::core::error::QllamaError;
use crate::session::ChatSession;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct CommandRegistry {
    handlers: BTreeMap<String, Arc<dyn CommandHandler>>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            handlers: BTreeMap::new(),
        }
    }

    pub fn register<C: CommandHandler + 'static>(&mut self, name: &str, command: C) {
        self.handlers.insert(name.to_string(), Arc::new(command));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    pub fn execute(
        &self,
        name: &str,
        args: &[&str],
        session: &ChatSession,
    ) -> Result<Option<String>, QllamaError> {
        self.handlers
            .get(name)
            .ok_or_else(|| QllamaError::Input(format!("Unknown command: {}", name)))
            .and_then(|handler| handler.execute(session, args))
    }

    pub fn get_command_names(&self) -> Vec<String> {
        self.handlers.keys().cloned().collect()
    }
}
