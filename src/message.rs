use serde::{Deserialize, Serialize};

/// One entry in a session's conversation.
///
/// Messages carry a role (`"user"` or `"assistant"` in this crate) and text
/// content. The conversation is append-only and insertion order is
/// significant; the pipeline consumes the accumulated slice on every run.
///
/// # Examples
///
/// ```
/// use session_relay::message::Message;
///
/// let question = Message::user("What changed in the EU AI Act this year?");
/// let reply = Message::assistant("Which member states are you interested in?");
///
/// assert!(question.has_role(Message::USER));
/// assert!(!reply.has_role(Message::USER));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Message {
    /// The role of the message author.
    ///
    /// Use the constants on [`Message`] for standardized values.
    pub role: String,
    /// The text content of the message.
    pub content: String,
}

impl Message {
    /// End-user input message role.
    pub const USER: &'static str = "user";
    /// Pipeline-produced response message role.
    pub const ASSISTANT: &'static str = "assistant";

    /// Creates a new message with the specified role and content.
    #[must_use]
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: content.to_string(),
        }
    }

    /// Creates a user message with the specified content.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Self::USER.to_string(),
            content: content.into(),
        }
    }

    /// Creates an assistant message with the specified content.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Self::ASSISTANT.to_string(),
            content: content.into(),
        }
    }

    /// Returns true if this message has the given role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }
}
