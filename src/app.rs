use crate::attachments::{self, ParsedInput};
use crate::cli::RunArgs;
use crate::commands::{CommandDispatcher, split_command};
use crate::config::Config;
use crate::core::error::QllamaError;
use crate::display;
use crate::handlers::registry::{HandlerContext, registry};
use crate::input::{InputEvent, LineReader};
use crate::session::ChatSession;
use is_terminal::IsTerminal;
use std::io::{self, Read};

/// Whether the read loop keeps going after a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub struct Application {
    session: ChatSession,
    commands: CommandDispatcher,
}

impl Application {
    pub fn new(session: ChatSession, commands: CommandDispatcher) -> Self {
        Self { session, commands }
    }

    /// Resolves the handler for `run.model` and loads it.
    pub async fn start(
        run: &RunArgs,
        config: &Config,
        commands: CommandDispatcher,
    ) -> Result<Self, QllamaError> {
        let registry = registry();
        let canonical = registry.canonical_name(&run.model)?;
        let session_config = config.session(canonical, run.overrides())?;

        let context = HandlerContext {
            backend: &session_config.backend,
            device: session_config.device.clone(),
            model_id: session_config.model_id.clone(),
        };
        let handler = registry.resolve(canonical, &context)?;
        tracing::info!(
            model = canonical,
            model_id = handler.model_id(),
            device = %handler.device(),
            "handler resolved"
        );

        let mut session = ChatSession::new(handler, session_config);
        display::display_loading(session.handler().model_id());
        session.load().await?;
        display::display_loaded(session.handler().model_id());

        Ok(Self::new(session, commands))
    }

    pub async fn run(&mut self) -> Result<(), QllamaError> {
        if !io::stdin().is_terminal() {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .map_err(|e| QllamaError::Input(format!("Failed to read from stdin: {}", e)))?;
            return self.handle_piped(&buffer).await;
        }

        self.handle_interactive().await
    }

    /// Piped stdin is one turn.
    async fn handle_piped(&mut self, input: &str) -> Result<(), QllamaError> {
        match attachments::parse(input) {
            ParsedInput::Terminate => Ok(()),
            ParsedInput::Content(items) if items.is_empty() => {
                Err(QllamaError::Input("No input provided on stdin".to_string()))
            }
            ParsedInput::Content(items) => {
                let response = self.session.submit(items).await?;
                println!("{}", response);
                Ok(())
            }
        }
    }

    async fn handle_interactive(&mut self) -> Result<(), QllamaError> {
        let handler = self.session.handler();
        display::display_banner(
            &self.session.config().model,
            handler.model_id(),
            handler.kind(),
            &handler.device().to_string(),
        );

        let mut reader = LineReader::new(self.commands.clone(), Config::input_history_path())?;
        tracing::debug!("input history at {}", reader.history_path().display());

        loop {
            match reader.read()? {
                InputEvent::Line(line) => {
                    if self.handle_line(&line).await == Flow::Exit {
                        break;
                    }
                }
                InputEvent::Interrupted => display::display_interrupt_hint(),
                InputEvent::Eof => {
                    display::display_goodbye();
                    break;
                }
            }
        }

        Ok(())
    }

    /// One line of interactive input. Turn errors are shown, never returned.
    pub async fn handle_line(&mut self, line: &str) -> Flow {
        if line.trim().is_empty() {
            return Flow::Continue;
        }
        if attachments::is_exit_token(line) {
            display::display_goodbye();
            return Flow::Exit;
        }

        if let Some(command) = split_command(line) {
            if self.commands.handles(command.name) {
                match self
                    .commands
                    .execute(command.name, &command.args, &self.session)
                {
                    Ok(Some(output)) => display::display_command_output(&output),
                    Ok(None) => {}
                    Err(e) => display::display_error(&e),
                }
                return Flow::Continue;
            }
        }

        let items = match attachments::parse(line) {
            ParsedInput::Terminate => {
                display::display_goodbye();
                return Flow::Exit;
            }
            ParsedInput::Content(items) => items,
        };
        if items.is_empty() {
            return Flow::Continue;
        }

        match self.session.submit(items).await {
            Ok(response) => display::display_response(&response),
            Err(e) if e.is_interrupt() => display::display_interrupted(),
            Err(e) => display::display_error(&e),
        }
        Flow::Continue
    }

    #[cfg(test)]
    fn session(&self) -> &ChatSession {
        &self.session
    }
}
