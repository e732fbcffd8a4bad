use async_trait::async_trait;

use crate::{
    domain::{ChatId, MembershipStatus, MessageRef, UserId},
    messaging::types::{ChatAction, InlineKeyboard, MessagingCapabilities},
    Result,
};

/// Cross-messenger port.
///
/// Telegram is the only implementation; the dispatcher talks exclusively to
/// this trait so tests can script every platform answer.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    /// Membership of `user_id` in `channel` (`@username` or numeric id).
    async fn membership_status(&self, channel: &str, user_id: UserId)
        -> Result<MembershipStatus>;

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;
    async fn reply_text(&self, to: MessageRef, text: &str) -> Result<MessageRef>;
    async fn delete_message(&self, msg: MessageRef) -> Result<()>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()>;

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef>;

    async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<()>;
}

/// Webhook registration, only meaningful for push delivery.
#[async_trait]
pub trait WebhookRegistrar: Send + Sync {
    async fn set_webhook(&self, url: &str) -> Result<()>;
    async fn delete_webhook(&self) -> Result<()>;
}
