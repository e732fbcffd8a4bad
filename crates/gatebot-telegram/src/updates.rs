//! Conversion from Telegram updates to the core update model.

use teloxide::types::{CallbackQuery, Message, Update, UpdateKind};

use gatebot_core::{
    domain::{ChatId, MessageId, MessageRef, UserId},
    messaging::types::{self, IncomingUpdate},
};

/// `None` for update kinds the bot does not handle (edits, photos, channel posts, ...).
pub fn to_incoming(update: &Update) -> Option<IncomingUpdate> {
    match &update.kind {
        UpdateKind::Message(msg) => from_message(msg),
        UpdateKind::CallbackQuery(q) => Some(from_callback(q)),
        _ => None,
    }
}

fn message_ref(msg: &Message) -> MessageRef {
    MessageRef {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(msg.id.0),
    }
}

fn from_message(msg: &Message) -> Option<IncomingUpdate> {
    let user = msg.from()?;
    let text = msg.text()?;
    Some(IncomingUpdate::from_text(
        message_ref(msg),
        UserId(user.id.0 as i64),
        user.username.clone(),
        text.to_string(),
    ))
}

fn from_callback(q: &CallbackQuery) -> IncomingUpdate {
    let user_id = UserId(q.from.id.0 as i64);
    let message = q.message.as_ref().map(message_ref);
    // Without the originating message, answer in the user's private chat.
    let chat_id = message.map(|m| m.chat_id).unwrap_or(ChatId(user_id.0));

    IncomingUpdate::Callback(types::CallbackQuery {
        chat_id,
        user_id,
        username: q.from.username.clone(),
        callback_id: q.id.clone(),
        data: q.data.clone().unwrap_or_default(),
        message,
    })
}
