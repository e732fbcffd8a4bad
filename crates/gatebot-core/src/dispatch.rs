use std::{sync::Arc, time::Duration};

use tracing::{debug, info, warn};

use crate::{
    chunking::split_message,
    config::Config,
    domain::ChatId,
    errors::with_timeout,
    generation::TextGenerator,
    keyboard::{subscription_keyboard, CHECK_SUBSCRIPTION},
    messaging::{
        port::MessagingPort,
        types::{CallbackQuery, ChatAction, Command, IncomingUpdate, TextMessage, START_COMMAND},
    },
    subscription::SubscriptionChecker,
    Result,
};

pub const WELCOME_TEXT: &str = "👋 Hi! I'm ready to work. Ask me a question!";
pub const START_GATE_TEXT: &str = "🔒 To use the bot, subscribe to these channels:";
pub const TEXT_GATE_TEXT: &str = "🔒 A subscription is required:";
pub const CONFIRMED_TEXT: &str = "✅ Thanks! Subscription confirmed. Ask away.";
pub const NOT_ALL_CHANNELS_TEXT: &str = "❌ You are not subscribed to all channels!";
pub const API_ERROR_PREFIX: &str = "❌ API error: ";

/// Routes each inbound update through the subscription gate.
///
/// Holds no per-user state: every update is gated afresh.
pub struct MessageDispatcher {
    messenger: Arc<dyn MessagingPort>,
    generator: Arc<dyn TextGenerator>,
    checker: SubscriptionChecker,
    chunk_limit: usize,
    generation_timeout: Duration,
}

impl MessageDispatcher {
    pub fn new(
        cfg: &Config,
        messenger: Arc<dyn MessagingPort>,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let checker = SubscriptionChecker::from_config(cfg, messenger.clone());
        let chunk_limit = cfg
            .telegram_safe_limit
            .min(messenger.capabilities().max_message_len);
        Self {
            messenger,
            generator,
            checker,
            chunk_limit,
            generation_timeout: cfg.generation_timeout,
        }
    }

    /// Handle one update. Send failures are returned to the transport unretried.
    pub async fn dispatch(&self, update: IncomingUpdate) -> Result<()> {
        match update {
            IncomingUpdate::Command(cmd) if cmd.name == START_COMMAND => self.on_start(cmd).await,
            IncomingUpdate::Command(cmd) => {
                debug!(command = %cmd.name, "ignoring unsupported command");
                Ok(())
            }
            IncomingUpdate::Text(msg) => self.on_text(msg).await,
            IncomingUpdate::Callback(q) if q.data == CHECK_SUBSCRIPTION => {
                self.on_confirm(q).await
            }
            IncomingUpdate::Callback(q) => {
                debug!(data = %q.data, "unknown callback data");
                self.messenger
                    .answer_callback_query(&q.callback_id, None, false)
                    .await
            }
        }
    }

    async fn on_start(&self, cmd: Command) -> Result<()> {
        if self.checker.is_subscribed(cmd.user_id).await {
            self.messenger.send_text(cmd.chat_id, WELCOME_TEXT).await?;
        } else {
            self.send_gate(cmd.chat_id, START_GATE_TEXT).await?;
        }
        Ok(())
    }

    async fn on_confirm(&self, q: CallbackQuery) -> Result<()> {
        debug!(user_id = q.user_id.0, username = ?q.username, "subscription confirm pressed");
        if !self.checker.is_subscribed(q.user_id).await {
            return self
                .messenger
                .answer_callback_query(&q.callback_id, Some(NOT_ALL_CHANNELS_TEXT), true)
                .await;
        }

        if let Some(gate) = q.message {
            self.messenger.delete_message(gate).await?;
        }
        self.messenger.send_text(q.chat_id, CONFIRMED_TEXT).await?;
        Ok(())
    }

    async fn on_text(&self, msg: TextMessage) -> Result<()> {
        if !self.checker.is_subscribed(msg.user_id).await {
            self.send_gate(msg.chat_id, TEXT_GATE_TEXT).await?;
            return Ok(());
        }
        info!(
            user_id = msg.user_id.0,
            username = ?msg.username,
            chars = msg.text.chars().count(),
            "prompt received"
        );

        if self.messenger.capabilities().supports_chat_actions {
            if let Err(e) = self
                .messenger
                .send_chat_action(msg.chat_id, ChatAction::Typing)
                .await
            {
                warn!(chat_id = msg.chat_id.0, "⚠️ Typing indicator failed: {e}");
            }
        }

        let answer = match with_timeout(
            "generation",
            self.generation_timeout,
            self.generator.generate(&msg.text),
        )
        .await
        {
            Ok(text) => text,
            Err(e) => {
                warn!(user_id = msg.user_id.0, "generation failed: {e}");
                format!("{API_ERROR_PREFIX}{}", e.detail())
            }
        };

        let chunks = split_message(&answer, self.chunk_limit);
        if chunks.is_empty() {
            info!(user_id = msg.user_id.0, "empty answer, nothing to send");
        }
        for chunk in chunks {
            self.messenger.reply_text(msg.message, chunk).await?;
        }
        Ok(())
    }

    async fn send_gate(&self, chat_id: ChatId, text: &str) -> Result<()> {
        let keyboard = subscription_keyboard(self.checker.channels());
        self.messenger
            .send_inline_keyboard(chat_id, text, keyboard)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{MembershipFailurePolicy, TransportMode},
        domain::{ChatId, MembershipStatus, MessageId, MessageRef, UserId},
        errors::Error,
        testing::{FakeGenerator, FakeMessenger, Membership, Outbound},
    };

    const CHAT: ChatId = ChatId(500);
    const USER: UserId = UserId(42);
    const INCOMING: MessageRef = MessageRef {
        chat_id: CHAT,
        message_id: MessageId(9),
    };

    fn test_config() -> Config {
        Config {
            telegram_token: "t".to_string(),
            gemini_api_key: "g".to_string(),
            transport: TransportMode::Polling,
            port: 0,
            poll_timeout: Duration::from_secs(1),
            poll_restart_delay: Duration::from_millis(1),
            gemini_model: "m".to_string(),
            gemini_api_base: "http://localhost".to_string(),
            generation_timeout: Duration::from_millis(200),
            required_channels: vec!["@focuspt18".to_string(), "@focuspt".to_string()],
            membership_failure_policy: MembershipFailurePolicy::FailOpen,
            membership_timeout: Duration::from_millis(200),
            telegram_message_limit: 4096,
            telegram_safe_limit: 4000,
        }
    }

    fn dispatcher(m: &Arc<FakeMessenger>, g: &Arc<FakeGenerator>) -> MessageDispatcher {
        MessageDispatcher::new(&test_config(), m.clone(), g.clone())
    }

    fn unsubscribed() -> FakeMessenger {
        FakeMessenger::new().with_membership("@focuspt", Membership::Status(MembershipStatus::Left))
    }

    fn text(t: &str) -> IncomingUpdate {
        IncomingUpdate::Text(TextMessage {
            chat_id: CHAT,
            user_id: USER,
            username: Some("alice".to_string()),
            message: INCOMING,
            text: t.to_string(),
        })
    }

    fn start() -> IncomingUpdate {
        IncomingUpdate::Command(Command {
            chat_id: CHAT,
            user_id: USER,
            name: "start".to_string(),
        })
    }

    fn confirm(data: &str) -> IncomingUpdate {
        IncomingUpdate::Callback(CallbackQuery {
            chat_id: CHAT,
            user_id: USER,
            username: None,
            callback_id: "cb-1".to_string(),
            data: data.to_string(),
            message: Some(MessageRef {
                chat_id: CHAT,
                message_id: MessageId(3),
            }),
        })
    }

    #[tokio::test]
    async fn subscribed_text_is_answered_with_one_reply() {
        let m = Arc::new(FakeMessenger::new());
        let g = Arc::new(FakeGenerator::answering("Hi there"));

        dispatcher(&m, &g).dispatch(text("Hello")).await.unwrap();

        assert_eq!(g.prompts(), vec!["Hello"]);
        assert_eq!(
            m.outbound(),
            vec![
                Outbound::ChatAction(CHAT, ChatAction::Typing),
                Outbound::Reply {
                    to: INCOMING,
                    text: "Hi there".to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn long_answer_is_split_into_ordered_replies() {
        let answer: String = (0..9000)
            .map(|i| char::from(b'0' + (i % 10) as u8))
            .collect();
        let m = Arc::new(FakeMessenger::new());
        let g = Arc::new(FakeGenerator::answering(answer.clone()));

        dispatcher(&m, &g).dispatch(text("long please")).await.unwrap();

        let replies = m.replies();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0], answer[0..4000]);
        assert_eq!(replies[1], answer[4000..8000]);
        assert_eq!(replies[2], answer[8000..9000]);
        assert_eq!(replies.concat(), answer);
        assert_eq!(g.calls(), 1);
    }

    #[tokio::test]
    async fn generation_error_is_sent_to_the_user() {
        let m = Arc::new(FakeMessenger::new());
        let g = Arc::new(FakeGenerator::failing("quota exceeded"));

        dispatcher(&m, &g).dispatch(text("Hello")).await.unwrap();

        assert_eq!(
            m.replies(),
            vec![format!("{API_ERROR_PREFIX}quota exceeded")]
        );
    }

    #[tokio::test]
    async fn slow_generation_times_out_into_an_error_reply() {
        let m = Arc::new(FakeMessenger::new());
        let g = Arc::new(FakeGenerator::answering("late").with_delay(Duration::from_secs(5)));

        dispatcher(&m, &g).dispatch(text("Hello")).await.unwrap();

        let replies = m.replies();
        assert_eq!(replies.len(), 1);
        assert!(replies[0].starts_with(API_ERROR_PREFIX));
        assert!(replies[0].contains("generation timed out"));
    }

    #[tokio::test]
    async fn empty_answer_sends_nothing() {
        let m = Arc::new(FakeMessenger::new());
        let g = Arc::new(FakeGenerator::answering(""));

        dispatcher(&m, &g).dispatch(text("Hello")).await.unwrap();

        assert!(m.replies().is_empty());
    }

    #[tokio::test]
    async fn typing_failure_does_not_block_the_answer() {
        let m = Arc::new(FakeMessenger::new().failing_chat_actions());
        let g = Arc::new(FakeGenerator::answering("ok"));

        dispatcher(&m, &g).dispatch(text("Hello")).await.unwrap();

        assert_eq!(m.replies(), vec!["ok"]);
    }

    #[tokio::test]
    async fn unsubscribed_text_gets_gate_and_no_generation() {
        let m = Arc::new(unsubscribed());
        let g = Arc::new(FakeGenerator::answering("never"));

        dispatcher(&m, &g).dispatch(text("Hello")).await.unwrap();

        assert_eq!(g.calls(), 0);
        let keyboards = m.keyboards();
        assert_eq!(keyboards.len(), 1);
        assert_eq!(keyboards[0].0, TEXT_GATE_TEXT);
        assert_eq!(keyboards[0].1.button_count(), 3);
        assert!(m.replies().is_empty());
    }

    #[tokio::test]
    async fn start_when_unsubscribed_shows_keyboard() {
        let m = Arc::new(unsubscribed());
        let g = Arc::new(FakeGenerator::answering("never"));

        dispatcher(&m, &g).dispatch(start()).await.unwrap();

        let keyboards = m.keyboards();
        assert_eq!(keyboards.len(), 1);
        assert_eq!(keyboards[0].0, START_GATE_TEXT);
        assert_eq!(keyboards[0].1.button_count(), test_config().required_channels.len() + 1);
        assert_eq!(g.calls(), 0);
    }

    #[tokio::test]
    async fn start_when_subscribed_welcomes() {
        let m = Arc::new(FakeMessenger::new());
        let g = Arc::new(FakeGenerator::answering("never"));

        dispatcher(&m, &g).dispatch(start()).await.unwrap();

        assert_eq!(
            m.outbound(),
            vec![Outbound::Text {
                chat_id: CHAT,
                text: WELCOME_TEXT.to_string()
            }]
        );
        assert_eq!(g.calls(), 0);
    }

    #[tokio::test]
    async fn confirm_when_subscribed_deletes_gate_and_confirms() {
        let m = Arc::new(FakeMessenger::new());
        let g = Arc::new(FakeGenerator::answering("never"));

        dispatcher(&m, &g).dispatch(confirm(CHECK_SUBSCRIPTION)).await.unwrap();

        assert_eq!(
            m.outbound(),
            vec![
                Outbound::Deleted(MessageRef {
                    chat_id: CHAT,
                    message_id: MessageId(3)
                }),
                Outbound::Text {
                    chat_id: CHAT,
                    text: CONFIRMED_TEXT.to_string()
                },
            ]
        );
    }

    #[tokio::test]
    async fn confirm_when_unsubscribed_shows_alert_only() {
        let m = Arc::new(unsubscribed());
        let g = Arc::new(FakeGenerator::answering("never"));

        dispatcher(&m, &g).dispatch(confirm(CHECK_SUBSCRIPTION)).await.unwrap();

        assert_eq!(
            m.outbound(),
            vec![Outbound::CallbackAnswer {
                callback_id: "cb-1".to_string(),
                text: Some(NOT_ALL_CHANNELS_TEXT.to_string()),
                show_alert: true,
            }]
        );
        assert_eq!(g.calls(), 0);
    }

    #[tokio::test]
    async fn unknown_callback_is_acknowledged_silently() {
        let m = Arc::new(FakeMessenger::new());
        let g = Arc::new(FakeGenerator::answering("never"));

        dispatcher(&m, &g).dispatch(confirm("something_else")).await.unwrap();

        assert_eq!(
            m.outbound(),
            vec![Outbound::CallbackAnswer {
                callback_id: "cb-1".to_string(),
                text: None,
                show_alert: false,
            }]
        );
        assert!(m.lookups().is_empty());
    }

    #[tokio::test]
    async fn membership_error_on_one_channel_still_passes() {
        let m = Arc::new(
            FakeMessenger::new()
                .with_membership("@focuspt18", Membership::Fail("not admin".to_string()))
                .with_membership("@focuspt", Membership::Status(MembershipStatus::Member)),
        );
        let g = Arc::new(FakeGenerator::answering("fine"));

        dispatcher(&m, &g).dispatch(text("q")).await.unwrap();

        assert_eq!(m.replies(), vec!["fine"]);
    }

    #[tokio::test]
    async fn send_failures_propagate_to_the_transport() {
        let m = Arc::new(FakeMessenger::new().failing_sends());
        let g = Arc::new(FakeGenerator::answering("ok"));

        let err = dispatcher(&m, &g).dispatch(text("Hello")).await.unwrap_err();

        assert!(matches!(err, Error::External(_)));
    }
}
