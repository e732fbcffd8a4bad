use tracing_subscriber::{fmt, EnvFilter};

use crate::{errors::Error, Result};

/// Initialize logging/tracing for the bot.
///
/// Defaults to `info` for our crates and `warn` for everything else; can be
/// overridden with `RUST_LOG`.
pub fn init(service_name: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(service_name)));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(true)
        .try_init()
        .map_err(|e| Error::Config(format!("failed to install log subscriber: {e}")))
}

/// `warn` everywhere, `info` for the library crates and the binary itself.
fn default_directives(service_name: &str) -> String {
    let mut directives = vec!["warn".to_string()];
    for target in ["gatebot_core", "gatebot_telegram", "gatebot_gemini", service_name] {
        let directive = format!("{}=info", target.replace('-', "_"));
        if !directives.contains(&directive) {
            directives.push(directive);
        }
    }
    directives.join(",")
}
