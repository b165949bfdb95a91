use crate::core::error::QllamaError;
use std::fmt;

/// One piece of a message's content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentItem {
    Text { text: String },
    ImageRef { locator: String },
    VideoRef { locator: String },
}

impl ContentItem {
    pub fn text(text: impl Into<String>) -> Self {
        ContentItem::Text { text: text.into() }
    }

    pub fn image(locator: impl Into<String>) -> Self {
        ContentItem::ImageRef {
            locator: locator.into(),
        }
    }

    pub fn video(locator: impl Into<String>) -> Self {
        ContentItem::VideoRef {
            locator: locator.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub role: Role,
    pub content: Vec<ContentItem>,
}

impl Message {
    pub fn user(content: Vec<ContentItem>) -> Self {
        Self {
            role: Role::User,
            content,
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: vec![ContentItem::text(text)],
        }
    }
}

/// Append-only log of completed turns.
///
/// Messages only enter the log in user/assistant pairs through [`record_turn`],
/// so an abandoned turn never leaves a dangling user message behind.
///
/// [`record_turn`]: ConversationHistory::record_turn
#[derive(Debug, Default, Clone)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Number of completed user/assistant exchanges.
    pub fn turns(&self) -> usize {
        self.messages.len() / 2
    }

    /// Rejects anything but a user message with content.
    pub fn record_turn(
        &mut self,
        user: Message,
        response: impl Into<String>,
    ) -> Result<(), QllamaError> {
        if user.role != Role::User {
            return Err(QllamaError::Input(format!(
                "a turn must start with a user message, got {}",
                user.role
            )));
        }
        if user.content.is_empty() {
            return Err(QllamaError::Input("a turn needs some content".to_string()));
        }
        self.messages.push(user);
        self.messages.push(Message::assistant(response));
        Ok(())
    }
}

pub struct MessageBuilder;

impl MessageBuilder {
    /// Full message list for the next request: the history, unchanged, followed by
    /// a new user message wrapping `items`.
    pub fn build(items: Vec<ContentItem>, history: &ConversationHistory) -> Vec<Message> {
        let mut messages = Vec::with_capacity(history.len() + 1);
        messages.extend_from_slice(history.messages());
        messages.push(Message::user(items));
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn history_with_turns(n: usize) -> ConversationHistory {
        let mut history = ConversationHistory::new();
        for i in 0..n {
            history.record_turn(
                Message::user(vec![ContentItem::text(format!("question {}", i))]),
                format!("answer {}", i),
            )
            .unwrap();
        }
        history
    }

    #[test]
    fn build_appends_user_message_after_history() {
        for n in 0..4 {
            let history = history_with_turns(n);
            let items = vec![ContentItem::image("cat.png"), ContentItem::text("what is this?")];

            let messages = MessageBuilder::build(items.clone(), &history);

            assert_eq!(messages.len(), 2 * n + 1);
            let last = messages.last().unwrap();
            assert_eq!(last.role, Role::User);
            assert_eq!(last.content, items);
            assert_eq!(&messages[..2 * n], history.messages());
        }
    }

    #[test]
    fn build_leaves_history_untouched() {
        let history = history_with_turns(2);
        let before = history.messages().to_vec();

        let _ = MessageBuilder::build(vec![ContentItem::text("again")], &history);

        assert_eq!(history.messages(), before.as_slice());
    }

    #[test]
    fn record_turn_alternates_roles() {
        let history = history_with_turns(3);

        assert_eq!(history.len(), 6);
        assert_eq!(history.turns(), 3);
        for (i, message) in history.messages().iter().enumerate() {
            let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
            assert_eq!(message.role, expected);
        }
        assert_eq!(
            history.messages()[5].content,
            vec![ContentItem::text("answer 2")]
        );
    }

    #[test]
    fn record_turn_rejects_empty_or_non_user_messages() {
        let mut history = history_with_turns(1);

        let err = history.record_turn(Message::user(vec![]), "reply").unwrap_err();
        assert!(matches!(err, QllamaError::Input(_)));

        let err = history
            .record_turn(Message::assistant("not a question"), "reply")
            .unwrap_err();
        assert!(matches!(err, QllamaError::Input(_)));

        assert_eq!(history.len(), 2);
    }

    #[test]
    fn role_display_is_lowercase() {
        assert_eq!(Role::System.to_string(), "system");
        assert_eq!(Role::Assistant.to_string(), "assistant");
    }
}
