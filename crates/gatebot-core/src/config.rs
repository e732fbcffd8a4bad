use std::{env, fs, path::Path, time::Duration};

use crate::{errors::Error, Result};

/// Channels a user must belong to before the bot answers.
pub const DEFAULT_REQUIRED_CHANNELS: [&str; 2] = ["@focuspt18", "@focuspt"];

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

/// How updates reach the bot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportMode {
    /// Telegram pushes updates to `<base_url>/<token>`.
    Webhook { base_url: String },
    /// The bot long-polls `getUpdates`.
    Polling,
}

/// What to do when a membership lookup cannot be completed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MembershipFailurePolicy {
    /// Treat the channel as subscribed, so a misconfigured channel does not lock everyone out.
    FailOpen,
    /// Treat the channel as not subscribed.
    FailClosed,
}

impl MembershipFailurePolicy {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "fail-open" | "open" => Some(Self::FailOpen),
            "fail-closed" | "closed" => Some(Self::FailClosed),
            _ => None,
        }
    }
}

/// Immutable process configuration, built once at startup and shared via `Arc`.
#[derive(Clone, Debug)]
pub struct Config {
    // Credentials
    pub telegram_token: String,
    pub gemini_api_key: String,

    // Delivery
    pub transport: TransportMode,
    pub port: u16,
    pub poll_timeout: Duration,
    pub poll_restart_delay: Duration,

    // Generation
    pub gemini_model: String,
    pub gemini_api_base: String,
    pub generation_timeout: Duration,

    // Subscription gate
    pub required_channels: Vec<String>,
    pub membership_failure_policy: MembershipFailurePolicy,
    pub membership_timeout: Duration,

    // Telegram limits
    pub telegram_message_limit: usize,
    pub telegram_safe_limit: usize,
}

impl Config {
    /// Load from the process environment, reading `.env` first if present.
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).and_then(non_empty);

        // Required values
        let telegram_token = get("TELEGRAM_TOKEN").ok_or_else(|| missing("TELEGRAM_TOKEN"))?;
        let gemini_api_key = get("GEMINI_API_KEY").ok_or_else(|| missing("GEMINI_API_KEY"))?;

        let transport = match get("TRANSPORT_MODE")
            .map(|s| s.trim().to_lowercase())
            .as_deref()
        {
            None | Some("webhook") => {
                let base_url = get("WEBHOOK_URL").ok_or_else(|| missing("WEBHOOK_URL"))?;
                TransportMode::Webhook {
                    base_url: base_url.trim().trim_end_matches('/').to_string(),
                }
            }
            Some("polling") => TransportMode::Polling,
            Some(other) => {
                return Err(Error::Config(format!(
                    "TRANSPORT_MODE must be `webhook` or `polling`, got `{other}`"
                )))
            }
        };

        let port = parse_or(&get, "PORT", 10_000u16)?;
        let poll_timeout = Duration::from_secs(parse_or(&get, "POLL_TIMEOUT_SECS", 30u64)?);
        let poll_restart_delay =
            Duration::from_millis(parse_or(&get, "POLL_RESTART_DELAY_MS", 5_000u64)?);

        let gemini_model = get("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
        let gemini_api_base = get("GEMINI_API_BASE")
            .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();
        let generation_timeout =
            Duration::from_millis(parse_or(&get, "GENERATION_TIMEOUT_MS", 60_000u64)?);

        let required_channels = get("REQUIRED_CHANNELS")
            .map(|v| parse_csv(&v))
            .unwrap_or_else(|| {
                DEFAULT_REQUIRED_CHANNELS
                    .iter()
                    .map(|s| s.to_string())
                    .collect()
            });
        let membership_failure_policy = match get("MEMBERSHIP_FAILURE_POLICY") {
            None => MembershipFailurePolicy::FailOpen,
            Some(raw) => MembershipFailurePolicy::parse(&raw).ok_or_else(|| {
                Error::Config(format!(
                    "MEMBERSHIP_FAILURE_POLICY must be `fail-open` or `fail-closed`, got `{raw}`"
                ))
            })?,
        };
        let membership_timeout =
            Duration::from_millis(parse_or(&get, "MEMBERSHIP_TIMEOUT_MS", 10_000u64)?);

        let telegram_message_limit = parse_or(&get, "TELEGRAM_MESSAGE_LIMIT", 4096usize)?;
        let telegram_safe_limit = parse_or(&get, "TELEGRAM_SAFE_LIMIT", 4000usize)?;
        if telegram_safe_limit == 0 || telegram_safe_limit > telegram_message_limit {
            return Err(Error::Config(format!(
                "TELEGRAM_SAFE_LIMIT must be between 1 and {telegram_message_limit}"
            )));
        }

        Ok(Self {
            telegram_token,
            gemini_api_key,
            transport,
            port,
            poll_timeout,
            poll_restart_delay,
            gemini_model,
            gemini_api_base,
            generation_timeout,
            required_channels,
            membership_failure_policy,
            membership_timeout,
            telegram_message_limit,
            telegram_safe_limit,
        })
    }

    /// Full webhook URL registered with Telegram, if running in webhook mode.
    pub fn webhook_url(&self) -> Option<String> {
        match &self.transport {
            TransportMode::Webhook { base_url } => {
                Some(format!("{base_url}/{}", self.telegram_token))
            }
            TransportMode::Polling => None,
        }
    }
}

fn missing(key: &str) -> Error {
    Error::Config(format!("{key} environment variable is required"))
}

fn parse_or<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T> {
    match get(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| Error::Config(format!("{key} has an invalid value: `{raw}`"))),
    }
}

fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };

    for raw in contents.lines() {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((k, v)) = line.split_once('=') else {
            continue;
        };

        let key = k.trim();
        if key.is_empty() {
            continue;
        }
        if env::var_os(key).is_some() {
            continue; // do not override existing env
        }

        env::set_var(key, strip_quotes(v.trim()));
    }
}

fn strip_quotes(val: &str) -> &str {
    if val.len() >= 2
        && ((val.starts_with('"') && val.ends_with('"'))
            || (val.starts_with('\'') && val.ends_with('\'')))
    {
        &val[1..val.len() - 1]
    } else {
        val
    }
}

fn parse_csv(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}
