use std::{sync::Arc, time::Duration};

use tracing::{debug, warn};

use crate::{
    config::{Config, MembershipFailurePolicy},
    domain::UserId,
    errors::with_timeout,
    messaging::port::MessagingPort,
};

/// Checks that a user belongs to every required channel.
///
/// Statuses are looked up fresh on every call; nothing is cached.
#[derive(Clone)]
pub struct SubscriptionChecker {
    channels: Arc<[String]>,
    policy: MembershipFailurePolicy,
    lookup_timeout: Duration,
    messenger: Arc<dyn MessagingPort>,
}

impl SubscriptionChecker {
    pub fn new(
        channels: impl Into<Arc<[String]>>,
        policy: MembershipFailurePolicy,
        lookup_timeout: Duration,
        messenger: Arc<dyn MessagingPort>,
    ) -> Self {
        Self {
            channels: channels.into(),
            policy,
            lookup_timeout,
            messenger,
        }
    }

    pub fn from_config(cfg: &Config, messenger: Arc<dyn MessagingPort>) -> Self {
        Self::new(
            cfg.required_channels.clone(),
            cfg.membership_failure_policy,
            cfg.membership_timeout,
            messenger,
        )
    }

    pub fn channels(&self) -> &[String] {
        &self.channels
    }

    /// `false` as soon as one channel reports `left`/`kicked`.
    ///
    /// Lookup failures never propagate; the configured policy decides whether
    /// a failed channel counts as subscribed.
    pub async fn is_subscribed(&self, user_id: UserId) -> bool {
        for channel in self.channels.iter() {
            let lookup = with_timeout(
                "membership lookup",
                self.lookup_timeout,
                self.messenger.membership_status(channel, user_id),
            )
            .await;

            match lookup {
                Ok(status) if !status.counts_as_subscribed() => {
                    debug!(user_id = user_id.0, %channel, ?status, "user not subscribed");
                    return false;
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(user_id = user_id.0, %channel, "⚠️ Channel check failed for {channel}: {e}");
                    if self.policy == MembershipFailurePolicy::FailClosed {
                        return false;
                    }
                }
            }
        }
        true
    }
}
