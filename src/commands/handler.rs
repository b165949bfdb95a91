use crate::conversation::{ContentItem, Message, Role};
use crate::core::error::QllamaError;
use crate::session::ChatSession;

use console::style;

pub trait CommandHandler: Send + Sync {
    fn execute(&self, session: &ChatSession, args: &[&str]) -> Result<Option<String>, QllamaError>;
    fn help(&self) -> &'static str;
}

pub struct HelpCommand;
pub struct HistoryCommand;
pub struct ModelCommand;

impl CommandHandler for HelpCommand {
    fn execute(&self, _session: &ChatSession, _args: &[&str]) -> Result<Option<String>, QllamaError> {
        let title = style("Available Commands").bold().underlined();
        let help_text = vec![
            title.to_string(),
            style(HelpCommand.help()).to_string(),
            style(HistoryCommand.help()).to_string(),
            style(ModelCommand.help()).to_string(),
            "exit, quit, /exit, /quit - End the session".to_string(),
            String::new(),
            style("Attachments").bold().underlined().to_string(),
            "<image:path-or-url> - Attach an image".to_string(),
            "<video:path-or-url> - Attach a video".to_string(),
        ]
        .join("\n");

        Ok(Some(help_text))
    }

    fn help(&self) -> &'static str {
        "/help - Show available commands"
    }
}

/// One-line rendering of a message's content.
fn summarize(message: &Message) -> String {
    message
        .content
        .iter()
        .map(|item| match item {
            ContentItem::Text { text } => text.clone(),
            ContentItem::ImageRef { locator } => format!("[image: {}]", locator),
            ContentItem::VideoRef { locator } => format!("[video: {}]", locator),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl CommandHandler for HistoryCommand {
    fn execute(&self, session: &ChatSession, _args: &[&str]) -> Result<Option<String>, QllamaError> {
        let history = session.history();
        if history.is_empty() {
            return Ok(Some("No turns yet.".to_string()));
        }

        let mut lines = Vec::with_capacity(history.len());
        let mut turn = 0;
        for message in history.messages() {
            match message.role {
                Role::User => {
                    turn += 1;
                    lines.push(format!(
                        "{} {} {}",
                        style(format!("[{}]", turn)).dim(),
                        style("you:").bold().cyan(),
                        summarize(message)
                    ));
                }
                Role::Assistant => {
                    lines.push(format!(
                        "    {} {}",
                        style("model:").bold().blue(),
                        summarize(message)
                    ));
                }
                Role::System => {
                    lines.push(format!("    {} {}", style("system:").dim(), summarize(message)));
                }
            }
        }
        Ok(Some(lines.join("\n")))
    }

    fn help(&self) -> &'static str {
        "/history - List the turns of this session"
    }
}

impl CommandHandler for ModelCommand {
    fn execute(&self, session: &ChatSession, _args: &[&str]) -> Result<Option<String>, QllamaError> {
        let handler = session.handler();
        let config = session.config();
        let options = config.generation.apply(handler.default_options());

        let lines = [
            format!("Model:       {} ({})", config.model, handler.kind()),
            format!("Backend id:  {}", handler.model_id()),
            format!(
                "Endpoint:    {}",
                handler.endpoint().unwrap_or("(not loaded)")
            ),
            format!("Device:      {}", handler.device()),
            format!(
                "Loaded:      {}",
                if handler.is_loaded() { "yes" } else { "no" }
            ),
            format!(
                "Generation:  max_new_tokens={} temperature={} top_p={} sampling={}",
                options.max_new_tokens, options.temperature, options.top_p, options.sampling_enabled
            ),
        ];
        Ok(Some(lines.join("\n")))
    }

    fn help(&self) -> &'static str {
        "/model - Show the current model and generation settings"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::{create_command_registry, split_command};
    use crate::config::{CliOverrides, Config};
    use crate::handlers::GenerationOverrides;
    use crate::testing::{Outcome, ScriptedHandler};

    fn session(outcome: Outcome) -> ChatSession {
        let cli = CliOverrides {
            generation: GenerationOverrides {
                max_new_tokens: Some(42),
                ..Default::default()
            },
            ..Default::default()
        };
        let config = Config::default().session("mistral", cli).unwrap();
        ChatSession::new(Box::new(ScriptedHandler::new(outcome)), config)
    }

    #[test]
    fn only_registered_commands_are_handled() {
        let dispatcher = create_command_registry();
        assert!(dispatcher.handles("help"));
        assert!(dispatcher.handles("history"));
        assert!(dispatcher.handles("model"));
        assert!(!dispatcher.handles("xyz"));
        assert!(!dispatcher.handles("quit"));
    }

    #[test]
    fn model_shows_effective_options() {
        let dispatcher = create_command_registry();
        let session = session(Outcome::Fail);

        let output = dispatcher.execute("model", &[], &session).unwrap().unwrap();

        assert!(output.contains("mistral"));
        assert!(output.contains("max_new_tokens=42"));
        assert!(output.contains("sampling=false"));
        assert!(output.contains("(not loaded)"));
    }

    #[tokio::test]
    async fn model_shows_the_endpoint_the_model_was_loaded_from() {
        let dispatcher = create_command_registry();
        let mut session = session(Outcome::Fail);
        session.load().await.unwrap();

        let output = dispatcher.execute("model", &[], &session).unwrap().unwrap();

        assert!(output.contains("Endpoint:    scripted://endpoint"));
        assert!(!output.contains(&session.config().backend.base_url));
    }

    #[tokio::test]
    async fn history_lists_turns() {
        let dispatcher = create_command_registry();
        let mut session = session(Outcome::Reply("A bee.".to_string()));

        let empty = dispatcher.execute("history", &[], &session).unwrap().unwrap();
        assert_eq!(empty, "No turns yet.");

        session
            .submit_until(
                vec![ContentItem::image("bee.jpg"), ContentItem::text("what?")],
                std::future::pending(),
            )
            .await
            .unwrap();

        let command = split_command("/history").unwrap();
        let output = dispatcher
            .execute(command.name, &command.args, &session)
            .unwrap()
            .unwrap();
        assert!(output.contains("[image: bee.jpg] what?"));
        assert!(output.contains("A bee."));
    }
}
