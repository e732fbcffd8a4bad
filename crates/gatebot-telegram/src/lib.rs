//! Telegram adapter (teloxide).
//!
//! Implements the `gatebot-core` messaging and webhook ports over the Telegram
//! Bot API, plus the two update transports (webhook and long polling).

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;

use teloxide::{
    prelude::*,
    types::{ChatMemberStatus, InlineKeyboardButton, InlineKeyboardMarkup, Recipient},
};

pub mod polling;
pub mod updates;
pub mod webhook;

use gatebot_core::{
    config::{Config, TransportMode},
    domain::{ChatId, MembershipStatus, MessageId, MessageRef, UserId},
    errors::Error,
    messaging::{
        port::{MessagingPort, WebhookRegistrar},
        types::{ButtonAction, ChatAction, InlineKeyboard, MessagingCapabilities},
    },
    transport::TransportAdapter,
    Result,
};

/// Telegram's hard cap on message text length.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4096;

/// Build a bot whose HTTP client outlives a full long-poll round trip.
pub fn build_bot(cfg: &Config) -> Result<Bot> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(5))
        .timeout(cfg.poll_timeout + Duration::from_secs(10))
        .build()
        .map_err(|e| Error::Config(format!("telegram http client: {e}")))?;
    Ok(Bot::with_client(cfg.telegram_token.clone(), client))
}

/// Pick the transport configured for this process.
pub fn transport_for(cfg: &Config, messenger: Arc<TelegramMessenger>) -> Box<dyn TransportAdapter> {
    match &cfg.transport {
        TransportMode::Webhook { .. } => Box::new(webhook::WebhookTransport::new(
            messenger,
            cfg.telegram_token.clone(),
            cfg.webhook_url().unwrap_or_default(),
            cfg.port,
        )),
        TransportMode::Polling => Box::new(polling::PollingTransport::new(
            messenger,
            cfg.poll_timeout,
            cfg.poll_restart_delay,
        )),
    }
}

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    fn sent(chat_id: ChatId, msg: &Message) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        }
    }
}

/// `@username` handles and numeric ids both address a channel.
fn channel_recipient(channel: &str) -> Recipient {
    match channel.trim().parse::<i64>() {
        Ok(id) => Recipient::Id(teloxide::types::ChatId(id)),
        Err(_) => {
            let name = channel.trim();
            let name = if name.starts_with('@') {
                name.to_string()
            } else {
                format!("@{name}")
            };
            Recipient::ChannelUsername(name)
        }
    }
}

fn membership_from_tg(status: ChatMemberStatus) -> MembershipStatus {
    match status {
        ChatMemberStatus::Owner => MembershipStatus::Creator,
        ChatMemberStatus::Administrator => MembershipStatus::Administrator,
        ChatMemberStatus::Member => MembershipStatus::Member,
        ChatMemberStatus::Restricted => MembershipStatus::Restricted,
        ChatMemberStatus::Left => MembershipStatus::Left,
        ChatMemberStatus::Banned => MembershipStatus::Kicked,
    }
}

fn markup_from(keyboard: InlineKeyboard) -> Result<InlineKeyboardMarkup> {
    let mut rows = Vec::with_capacity(keyboard.rows.len());
    for row in keyboard.rows {
        let mut buttons = Vec::with_capacity(row.len());
        for b in row {
            let button = match b.action {
                ButtonAction::Url(url) => {
                    let url = reqwest::Url::parse(&url)
                        .map_err(|e| Error::External(format!("invalid button url {url}: {e}")))?;
                    InlineKeyboardButton::url(b.label, url)
                }
                ButtonAction::Callback(data) => InlineKeyboardButton::callback(b.label, data),
            };
            buttons.push(button);
        }
        rows.push(buttons);
    }
    Ok(InlineKeyboardMarkup::new(rows))
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_chat_actions: true,
            max_message_len: TELEGRAM_MAX_MESSAGE_LEN,
        }
    }

    async fn membership_status(
        &self,
        channel: &str,
        user_id: UserId,
    ) -> Result<MembershipStatus> {
        let member = self
            .bot
            .get_chat_member(
                channel_recipient(channel),
                teloxide::types::UserId(user_id.0 as u64),
            )
            .await
            .map_err(Self::map_err)?;
        Ok(membership_from_tg(member.kind.status()))
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let msg = self
            .bot
            .send_message(Self::tg_chat(chat_id), text.to_string())
            .await
            .map_err(Self::map_err)?;
        Ok(Self::sent(chat_id, &msg))
    }

    async fn reply_text(&self, to: MessageRef, text: &str) -> Result<MessageRef> {
        let msg = self
            .bot
            .send_message(Self::tg_chat(to.chat_id), text.to_string())
            .reply_to_message_id(Self::tg_msg_id(to.message_id))
            .allow_sending_without_reply(true)
            .await
            .map_err(Self::map_err)?;
        Ok(Self::sent(to.chat_id, &msg))
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.bot
            .delete_message(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        let tg_action = match action {
            ChatAction::Typing => teloxide::types::ChatAction::Typing,
        };
        self.bot
            .send_chat_action(Self::tg_chat(chat_id), tg_action)
            .await
            .map_err(Self::map_err)?;
        Ok(())
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        let markup = markup_from(keyboard)?;
        let msg = self
            .bot
            .send_message(Self::tg_chat(chat_id), text.to_string())
            .reply_markup(markup)
            .await
            .map_err(Self::map_err)?;
        Ok(Self::sent(chat_id, &msg))
    }

    async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<()> {
        let mut req = self.bot.answer_callback_query(callback_id.to_string());
        if let Some(t) = text {
            req = req.text(t.to_string());
        }
        if show_alert {
            req = req.show_alert(true);
        }
        req.await.map_err(Self::map_err)?;
        Ok(())
    }
}

#[async_trait]
impl WebhookRegistrar for TelegramMessenger {
    async fn set_webhook(&self, url: &str) -> Result<()> {
        let url = reqwest::Url::parse(url)
            .map_err(|e| Error::Config(format!("invalid webhook url: {e}")))?;
        self.bot.set_webhook(url).await.map_err(Self::map_err)?;
        Ok(())
    }

    async fn delete_webhook(&self) -> Result<()> {
        self.bot.delete_webhook().await.map_err(Self::map_err)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gatebot_core::keyboard::subscription_keyboard;

    #[test]
    fn channel_handles_and_ids_map_to_recipients() {
        assert_eq!(
            channel_recipient("@focuspt"),
            Recipient::ChannelUsername("@focuspt".to_string())
        );
        assert_eq!(
            channel_recipient("focuspt"),
            Recipient::ChannelUsername("@focuspt".to_string())
        );
        assert_eq!(
            channel_recipient("-1001234567890"),
            Recipient::Id(teloxide::types::ChatId(-1001234567890))
        );
    }

    #[test]
    fn banned_means_kicked() {
        assert_eq!(
            membership_from_tg(ChatMemberStatus::Banned),
            MembershipStatus::Kicked
        );
        assert_eq!(
            membership_from_tg(ChatMemberStatus::Left),
            MembershipStatus::Left
        );
        assert_eq!(
            membership_from_tg(ChatMemberStatus::Owner),
            MembershipStatus::Creator
        );
    }

    #[test]
    fn subscription_keyboard_converts_to_markup() {
        let channels = vec!["@focuspt18".to_string(), "@focuspt".to_string()];
        let markup = markup_from(subscription_keyboard(&channels)).unwrap();
        assert_eq!(markup.inline_keyboard.len(), 3);
        assert!(markup.inline_keyboard.iter().all(|row| row.len() == 1));
        assert_eq!(markup.inline_keyboard[0][0].text, "Subscribe to @focuspt18");
        assert_eq!(markup.inline_keyboard[2][0].text, "✅ I've subscribed");
    }
}
