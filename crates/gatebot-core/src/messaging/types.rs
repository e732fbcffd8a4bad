use crate::domain::{ChatId, MessageRef, UserId};

pub const START_COMMAND: &str = "start";

/// Cross-messenger incoming update model.
///
/// Telegram-specific fields live in the Telegram adapter; only what the
/// dispatcher routes on is carried here.
#[derive(Clone, Debug)]
pub enum IncomingUpdate {
    Command(Command),
    Text(TextMessage),
    Callback(CallbackQuery),
}

impl IncomingUpdate {
    /// Classify a text message. Only `/start` is a command; any other text,
    /// slash-prefixed or not, is a prompt.
    pub fn from_text(
        message: MessageRef,
        user_id: UserId,
        username: Option<String>,
        text: String,
    ) -> Self {
        match Command::parse(message.chat_id, user_id, &text) {
            Some(cmd) if cmd.name == START_COMMAND => Self::Command(cmd),
            _ => Self::Text(TextMessage {
                chat_id: message.chat_id,
                user_id,
                username,
                message,
                text,
            }),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Command {
    pub chat_id: ChatId,
    pub user_id: UserId,
    /// Command name without the leading `/` or `@botname` suffix. Case is kept.
    pub name: String,
}

impl Command {
    /// Parse `/name@bot args` style text, ignoring the arguments. Returns
    /// `None` for non-command text.
    pub fn parse(chat_id: ChatId, user_id: UserId, text: &str) -> Option<Self> {
        let rest = text.strip_prefix('/')?;
        let head = rest.split(char::is_whitespace).next().unwrap_or_default();
        let name = head.split('@').next().unwrap_or_default();
        if name.is_empty() {
            return None;
        }
        Some(Self {
            chat_id,
            user_id,
            name: name.to_string(),
        })
    }
}

#[derive(Clone, Debug)]
pub struct TextMessage {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    /// The message itself, so answers can be sent as replies to it.
    pub message: MessageRef,
    pub text: String,
}

#[derive(Clone, Debug)]
pub struct CallbackQuery {
    pub chat_id: ChatId,
    pub user_id: UserId,
    pub username: Option<String>,
    pub callback_id: String,
    pub data: String,
    /// Message that carried the inline keyboard, when Telegram still has it.
    pub message: Option<MessageRef>,
}

/// Outgoing "chat action" (typing indicator).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatAction {
    Typing,
}

/// Inline keyboard, one row per entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineKeyboard {
    pub rows: Vec<Vec<InlineButton>>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineButton {
    pub label: String,
    pub action: ButtonAction,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ButtonAction {
    Url(String),
    Callback(String),
}

impl InlineKeyboard {
    /// Convenience for "one button per row" layouts.
    pub fn one_per_row(buttons: impl IntoIterator<Item = InlineButton>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }

    pub fn button_count(&self) -> usize {
        self.rows.iter().map(Vec::len).sum()
    }
}

/// Capabilities / feature flags of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_chat_actions: bool,
    pub max_message_len: usize,
}
