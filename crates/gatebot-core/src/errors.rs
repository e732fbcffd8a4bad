use std::time::Duration;

/// Core error type for the bot.
///
/// Adapter crates map their specific errors into this type so the dispatcher
/// can decide consistently what is user-facing and what is only logged.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("{operation} timed out after {}s", after.as_secs_f64())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },
}

impl Error {
    /// The message without the variant prefix, for showing to end users.
    pub fn detail(&self) -> String {
        match self {
            Self::Config(msg) | Self::External(msg) | Self::Generation(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Await `fut` for at most `after`, mapping the elapsed case to [`Error::Timeout`].
pub async fn with_timeout<T>(
    operation: &'static str,
    after: Duration,
    fut: impl std::future::Future<Output = Result<T>>,
) -> Result<T> {
    match tokio::time::timeout(after, fut).await {
        Ok(res) => res,
        Err(_) => Err(Error::Timeout { operation, after }),
    }
}
