use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{dispatch::MessageDispatcher, Result};

/// Delivers inbound updates to the dispatcher until `shutdown` fires.
///
/// Webhook and long-polling delivery are the two implementations; exactly one
/// runs per process, chosen from configuration at startup.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    fn name(&self) -> &'static str;

    async fn run(
        &self,
        dispatcher: Arc<MessageDispatcher>,
        shutdown: CancellationToken,
    ) -> Result<()>;
}
