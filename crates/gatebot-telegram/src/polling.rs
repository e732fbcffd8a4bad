use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use teloxide::{prelude::*, types::Update};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use gatebot_core::{
    dispatch::MessageDispatcher, errors::Error, messaging::port::WebhookRegistrar,
    transport::TransportAdapter, Result,
};

use crate::{updates::to_incoming, TelegramMessenger};

/// Where long-polled updates come from.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Called before each polling cycle; Telegram rejects `getUpdates` while a webhook is set.
    async fn prepare(&self) -> Result<()>;

    async fn fetch(&self, offset: i32, timeout: Duration) -> Result<Vec<Update>>;
}

#[async_trait]
impl UpdateSource for TelegramMessenger {
    async fn prepare(&self) -> Result<()> {
        self.delete_webhook().await
    }

    async fn fetch(&self, offset: i32, timeout: Duration) -> Result<Vec<Update>> {
        self.bot()
            .get_updates()
            .offset(offset)
            .timeout(timeout.as_secs().min(u32::MAX as u64) as u32)
            .await
            .map_err(|e| Error::External(format!("telegram getUpdates failed: {e}")))
    }
}

/// Long-polling transport: one sequential worker, restarted after a fixed delay on failure.
pub struct PollingTransport {
    source: Arc<dyn UpdateSource>,
    poll_timeout: Duration,
    restart_delay: Duration,
}

impl PollingTransport {
    pub fn new(source: Arc<dyn UpdateSource>, poll_timeout: Duration, restart_delay: Duration) -> Self {
        Self {
            source,
            poll_timeout,
            restart_delay,
        }
    }

    /// Runs until the first error. The offset advances before dispatch, so an
    /// update whose handling failed is not delivered again after a restart.
    async fn poll_cycle(&self, dispatcher: &MessageDispatcher, offset: &mut i32) -> Result<()> {
        self.source.prepare().await?;
        loop {
            let updates = self.source.fetch(*offset, self.poll_timeout).await?;
            for update in updates {
                *offset = (*offset).max(update.id + 1);
                match to_incoming(&update) {
                    Some(incoming) => dispatcher.dispatch(incoming).await?,
                    None => debug!(update_id = update.id, "skipping unsupported update"),
                }
            }
        }
    }
}

#[async_trait]
impl TransportAdapter for PollingTransport {
    fn name(&self) -> &'static str {
        "polling"
    }

    async fn run(
        &self,
        dispatcher: Arc<MessageDispatcher>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        info!("🚀 Bot started (long-polling mode)");
        let mut offset = 0i32;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                res = self.poll_cycle(&dispatcher, &mut offset) => {
                    if let Err(e) = res {
                        error!(
                            "polling loop failed: {e}; restarting in {:.1}s",
                            self.restart_delay.as_secs_f64()
                        );
                    }
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.restart_delay) => {}
            }
        }

        info!("polling stopped");
        Ok(())
    }
}
