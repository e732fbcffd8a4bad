use crate::messaging::types::{ButtonAction, InlineButton, InlineKeyboard};

/// Callback data carried by the "I've subscribed" button.
pub const CHECK_SUBSCRIPTION: &str = "check_sub";

pub const CONFIRM_LABEL: &str = "✅ I've subscribed";

/// Public link for a channel handle (`@name` -> `https://t.me/name`).
pub fn channel_link(channel: &str) -> String {
    format!("https://t.me/{}", channel.replace('@', ""))
}

/// One "subscribe" link per channel, then the confirmation button.
pub fn subscription_keyboard(channels: &[String]) -> InlineKeyboard {
    let links = channels.iter().map(|channel| InlineButton {
        label: format!("Subscribe to {channel}"),
        action: ButtonAction::Url(channel_link(channel)),
    });
    let confirm = InlineButton {
        label: CONFIRM_LABEL.to_string(),
        action: ButtonAction::Callback(CHECK_SUBSCRIPTION.to_string()),
    };
    InlineKeyboard::one_per_row(links.chain(std::iter::once(confirm)))
}
