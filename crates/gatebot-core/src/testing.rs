//! In-memory fakes for the messaging and generation ports.
//!
//! Available to this crate's tests and, via the `testing` feature, to adapter crates.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicI32, Ordering},
        Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, MembershipStatus, MessageId, MessageRef, UserId},
    errors::Error,
    generation::TextGenerator,
    messaging::{
        port::{MessagingPort, WebhookRegistrar},
        types::{ChatAction, InlineKeyboard, MessagingCapabilities},
    },
    Result,
};

/// Scripted answer for one channel's membership lookup.
#[derive(Clone, Debug)]
pub enum Membership {
    Status(MembershipStatus),
    Fail(String),
    /// Never answers; exercises lookup timeouts.
    Hang,
}

/// Everything the fake messenger was asked to deliver, in order.
#[derive(Clone, Debug, PartialEq)]
pub enum Outbound {
    Text {
        chat_id: ChatId,
        text: String,
    },
    Reply {
        to: MessageRef,
        text: String,
    },
    Keyboard {
        chat_id: ChatId,
        text: String,
        keyboard: InlineKeyboard,
    },
    Deleted(MessageRef),
    ChatAction(ChatId, ChatAction),
    CallbackAnswer {
        callback_id: String,
        text: Option<String>,
        show_alert: bool,
    },
}

#[derive(Default)]
pub struct FakeMessenger {
    memberships: Mutex<HashMap<String, Membership>>,
    lookups: Mutex<Vec<(String, UserId)>>,
    outbound: Mutex<Vec<Outbound>>,
    fail_chat_actions: bool,
    fail_sends: bool,
    next_id: AtomicI32,
}

impl FakeMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Channels without a script report `Member`.
    pub fn with_membership(self, channel: &str, membership: Membership) -> Self {
        self.memberships
            .lock()
            .unwrap()
            .insert(channel.to_string(), membership);
        self
    }

    pub fn failing_chat_actions(mut self) -> Self {
        self.fail_chat_actions = true;
        self
    }

    pub fn failing_sends(mut self) -> Self {
        self.fail_sends = true;
        self
    }

    pub fn outbound(&self) -> Vec<Outbound> {
        self.outbound.lock().unwrap().clone()
    }

    pub fn lookups(&self) -> Vec<(String, UserId)> {
        self.lookups.lock().unwrap().clone()
    }

    /// Texts of all replies, in delivery order.
    pub fn replies(&self) -> Vec<String> {
        self.outbound()
            .into_iter()
            .filter_map(|o| match o {
                Outbound::Reply { text, .. } => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn keyboards(&self) -> Vec<(String, InlineKeyboard)> {
        self.outbound()
            .into_iter()
            .filter_map(|o| match o {
                Outbound::Keyboard { text, keyboard, .. } => Some((text, keyboard)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, o: Outbound) -> Result<()> {
        if self.fail_sends && !matches!(o, Outbound::ChatAction(..)) {
            return Err(Error::External("telegram error: send refused".to_string()));
        }
        self.outbound.lock().unwrap().push(o);
        Ok(())
    }

    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1000;
        MessageRef {
            chat_id,
            message_id: MessageId(id),
        }
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_chat_actions: true,
            max_message_len: 4096,
        }
    }

    async fn membership_status(
        &self,
        channel: &str,
        user_id: UserId,
    ) -> Result<MembershipStatus> {
        self.lookups
            .lock()
            .unwrap()
            .push((channel.to_string(), user_id));
        let script = self.memberships.lock().unwrap().get(channel).cloned();
        match script {
            None => Ok(MembershipStatus::Member),
            Some(Membership::Status(s)) => Ok(s),
            Some(Membership::Fail(msg)) => Err(Error::External(msg)),
            Some(Membership::Hang) => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(MembershipStatus::Member)
            }
        }
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.record(Outbound::Text {
            chat_id,
            text: text.to_string(),
        })?;
        Ok(self.alloc(chat_id))
    }

    async fn reply_text(&self, to: MessageRef, text: &str) -> Result<MessageRef> {
        self.record(Outbound::Reply {
            to,
            text: text.to_string(),
        })?;
        Ok(self.alloc(to.chat_id))
    }

    async fn delete_message(&self, msg: MessageRef) -> Result<()> {
        self.record(Outbound::Deleted(msg))
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        if self.fail_chat_actions {
            return Err(Error::External("telegram error: chat action".to_string()));
        }
        self.record(Outbound::ChatAction(chat_id, action))
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: ChatId,
        text: &str,
        keyboard: InlineKeyboard,
    ) -> Result<MessageRef> {
        self.record(Outbound::Keyboard {
            chat_id,
            text: text.to_string(),
            keyboard,
        })?;
        Ok(self.alloc(chat_id))
    }

    async fn answer_callback_query(
        &self,
        callback_id: &str,
        text: Option<&str>,
        show_alert: bool,
    ) -> Result<()> {
        self.record(Outbound::CallbackAnswer {
            callback_id: callback_id.to_string(),
            text: text.map(str::to_string),
            show_alert,
        })
    }
}

/// Generator returning a fixed answer (or error) and recording prompts.
pub struct FakeGenerator {
    answer: std::result::Result<String, String>,
    delay: Option<Duration>,
    prompts: Mutex<Vec<String>>,
}

impl FakeGenerator {
    pub fn answering(answer: impl Into<String>) -> Self {
        Self {
            answer: Ok(answer.into()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            answer: Err(message.into()),
            delay: None,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl TextGenerator for FakeGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if let Some(d) = self.delay {
            tokio::time::sleep(d).await;
        }
        self.answer.clone().map_err(Error::Generation)
    }
}

/// Registrar that records registrations and can be told to fail.
#[derive(Default)]
pub struct FakeRegistrar {
    pub fail: bool,
    registered: Mutex<Vec<String>>,
    deletes: AtomicI32,
}

impl FakeRegistrar {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn registered(&self) -> Vec<String> {
        self.registered.lock().unwrap().clone()
    }

    pub fn deletes(&self) -> i32 {
        self.deletes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebhookRegistrar for FakeRegistrar {
    async fn set_webhook(&self, url: &str) -> Result<()> {
        if self.fail {
            return Err(Error::External("telegram error: bad webhook".to_string()));
        }
        self.registered.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn delete_webhook(&self) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
