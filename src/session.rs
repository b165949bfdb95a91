use crate::config::SessionConfig;
use crate::conversation::{ContentItem, ConversationHistory, Message, MessageBuilder};
use crate::core::error::QllamaError;
use crate::handlers::ModelHandler;
use std::future::Future;

/// One interactive conversation with a single handler.
pub struct ChatSession {
    handler: Box<dyn ModelHandler>,
    history: ConversationHistory,
    config: SessionConfig,
}

impl ChatSession {
    pub fn new(handler: Box<dyn ModelHandler>, config: SessionConfig) -> Self {
        Self {
            handler,
            history: ConversationHistory::new(),
            config,
        }
    }

    pub fn handler(&self) -> &dyn ModelHandler {
        self.handler.as_ref()
    }

    pub fn history(&self) -> &ConversationHistory {
        &self.history
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub async fn load(&mut self) -> Result<(), QllamaError> {
        self.handler.load().await
    }

    /// Runs one turn; Ctrl-C while generating abandons it.
    pub async fn submit(&mut self, items: Vec<ContentItem>) -> Result<String, QllamaError> {
        self.submit_until(items, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Could not listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Runs one turn unless `cancel` completes first.
    ///
    /// History gains the user/assistant pair only when generation succeeds;
    /// failed and interrupted turns leave it untouched.
    pub async fn submit_until<F>(
        &mut self,
        items: Vec<ContentItem>,
        cancel: F,
    ) -> Result<String, QllamaError>
    where
        F: Future<Output = ()>,
    {
        if items.is_empty() {
            return Err(QllamaError::Input("Nothing to send".to_string()));
        }
        let user = Message::user(items.clone());
        let messages = MessageBuilder::build(items, &self.history);
        tracing::debug!(
            turns = self.history.turns(),
            messages = messages.len(),
            "submitting turn"
        );

        let result = tokio::select! {
            result = self.handler.generate(&messages, &self.config.generation) => result,
            _ = cancel => Err(QllamaError::Interrupted),
        };

        match result {
            Ok(response) => {
                self.history.record_turn(user, response.clone())?;
                Ok(response)
            }
            Err(e) => {
                if e.is_interrupt() {
                    tracing::info!("generation interrupted");
                } else {
                    tracing::error!("turn failed: {}", e);
                }
                Err(e)
            }
        }
    }
}
