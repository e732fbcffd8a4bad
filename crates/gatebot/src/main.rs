use std::sync::Arc;

use anyhow::Context;
use teloxide::prelude::Requester;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use gatebot_core::{config::Config, dispatch::MessageDispatcher};
use gatebot_gemini::GeminiClient;
use gatebot_telegram::{build_bot, transport_for, TelegramMessenger};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gatebot_core::logging::init("gatebot")?;

    let cfg = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            error!("❌ Configuration error: {e}");
            return Err(e.into());
        }
    };

    let bot = build_bot(&cfg)?;
    match bot.get_me().await {
        Ok(me) => info!("🤖 Logged in as @{}", me.username()),
        Err(e) => warn!("⚠️ getMe failed, continuing: {e}"),
    }
    let messenger = Arc::new(TelegramMessenger::new(bot));

    let generator = Arc::new(GeminiClient::from_config(&cfg)?);
    info!(model = generator.model(), channels = ?cfg.required_channels, "generation backend ready");

    let dispatcher = Arc::new(MessageDispatcher::new(
        &cfg,
        messenger.clone(),
        generator,
    ));
    let transport = transport_for(&cfg, messenger);

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("shutdown requested");
                shutdown.cancel();
            }
        });
    }

    transport
        .run(dispatcher, shutdown)
        .await
        .with_context(|| format!("{} transport failed", transport.name()))?;

    Ok(())
}
