use std::{net::SocketAddr, sync::Arc};

use async_trait::async_trait;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use teloxide::types::Update;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use gatebot_core::{
    dispatch::MessageDispatcher, messaging::port::WebhookRegistrar, transport::TransportAdapter,
    Result,
};

use crate::updates::to_incoming;

pub const LIVENESS_TEXT: &str = "Bot is running!";

#[derive(Clone)]
pub struct WebhookState {
    pub dispatcher: Arc<MessageDispatcher>,
    pub registrar: Arc<dyn WebhookRegistrar>,
    pub webhook_url: String,
    /// Bot token, doubling as the secret update path. Never echoed back.
    pub token: String,
}

/// `POST /<token>` receives updates, `GET /` is a liveness probe and
/// `GET /setwebhook` re-registers the webhook with Telegram.
///
/// The token is compared in the handler, never used as a route pattern:
/// its `:` would otherwise start a path capture.
pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/setwebhook", get(set_webhook))
        .route("/:update_path", post(receive_update))
        .with_state(state)
}

async fn index() -> &'static str {
    LIVENESS_TEXT
}

async fn set_webhook(State(state): State<WebhookState>) -> (StatusCode, String) {
    let shown = redact(&state.webhook_url, &state.token);
    match state.registrar.set_webhook(&state.webhook_url).await {
        Ok(()) => {
            info!("✅ Webhook set: {shown}");
            (StatusCode::OK, format!("Webhook set: {shown}"))
        }
        Err(e) => {
            error!("webhook registration failed: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Webhook setup failed".to_string(),
            )
        }
    }
}

async fn receive_update(
    State(state): State<WebhookState>,
    Path(update_path): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    if state.token.is_empty() || update_path != state.token {
        return StatusCode::NOT_FOUND;
    }
    if !is_json(&headers) {
        return StatusCode::FORBIDDEN;
    }

    let update: Update = match serde_json::from_slice(&body) {
        Ok(u) => u,
        Err(e) => {
            warn!("⚠️ Malformed update body: {e}");
            return StatusCode::BAD_REQUEST;
        }
    };

    let Some(incoming) = to_incoming(&update) else {
        return StatusCode::OK;
    };

    // Telegram redelivers on non-2xx; a failed send is logged, not retried.
    if let Err(e) = state.dispatcher.dispatch(incoming).await {
        error!(update_id = update.id, "update handling failed: {e}");
    }
    StatusCode::OK
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(|essence| essence.trim().eq_ignore_ascii_case("application/json"))
        .unwrap_or(false)
}

fn redact(text: &str, token: &str) -> String {
    if token.is_empty() {
        return text.to_string();
    }
    text.replace(token, "<token>")
}

/// Push delivery: Telegram posts updates to `<WEBHOOK_URL>/<token>`.
pub struct WebhookTransport {
    registrar: Arc<dyn WebhookRegistrar>,
    token: String,
    webhook_url: String,
    port: u16,
}

impl WebhookTransport {
    pub fn new(
        registrar: Arc<dyn WebhookRegistrar>,
        token: String,
        webhook_url: String,
        port: u16,
    ) -> Self {
        Self {
            registrar,
            token,
            webhook_url,
            port,
        }
    }
}

#[async_trait]
impl TransportAdapter for WebhookTransport {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn run(
        &self,
        dispatcher: Arc<MessageDispatcher>,
        shutdown: CancellationToken,
    ) -> Result<()> {
        info!("🚀 Bot started (webhook mode)");

        // Drop any previous webhook/polling registration before setting ours.
        if let Err(e) = self.registrar.delete_webhook().await {
            warn!("⚠️ Failed to remove previous webhook: {e}");
        }
        let shown = redact(&self.webhook_url, &self.token);
        match self.registrar.set_webhook(&self.webhook_url).await {
            Ok(()) => info!("✅ Webhook set: {shown}"),
            Err(e) => error!("webhook registration failed ({shown}): {e}; retry via GET /setwebhook"),
        }

        let app = router(WebhookState {
            dispatcher,
            registrar: self.registrar.clone(),
            webhook_url: self.webhook_url.clone(),
            token: self.token.clone(),
        });

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "listening for webhook updates");

        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("webhook server stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use axum::{body::Body, http::Request};
    use tower::ServiceExt;

    use gatebot_core::{
        config::Config,
        testing::{FakeGenerator, FakeMessenger, FakeRegistrar},
    };

    use super::*;
    use crate::updates::tests::text_update_json;

    const TOKEN: &str = "123:secret";

    struct Harness {
        app: Router,
        messenger: Arc<FakeMessenger>,
        generator: Arc<FakeGenerator>,
        registrar: Arc<FakeRegistrar>,
    }

    fn harness(registrar: FakeRegistrar) -> Harness {
        let cfg = Config::from_lookup(|k| match k {
            "TELEGRAM_TOKEN" => Some(TOKEN.to_string()),
            "GEMINI_API_KEY" => Some("g".to_string()),
            "WEBHOOK_URL" => Some("https://bot.example.com".to_string()),
            _ => None,
        })
        .unwrap();
        let messenger = Arc::new(FakeMessenger::new());
        let generator = Arc::new(FakeGenerator::answering("Hi there"));
        let registrar = Arc::new(registrar);
        let dispatcher = Arc::new(MessageDispatcher::new(
            &cfg,
            messenger.clone(),
            generator.clone(),
        ));
        let app = router(WebhookState {
            dispatcher,
            registrar: registrar.clone(),
            webhook_url: cfg.webhook_url().unwrap(),
            token: TOKEN.to_string(),
        });
        Harness {
            app,
            messenger,
            generator,
            registrar,
        }
    }

    async fn body_text(resp: axum::response::Response) -> String {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn post_update(content_type: &str, body: String) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(format!("/{TOKEN}"))
            .header(CONTENT_TYPE, content_type)
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn root_is_a_liveness_probe() {
        let h = harness(FakeRegistrar::default());
        let resp = h
            .app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(body_text(resp).await, LIVENESS_TEXT);
    }

    #[tokio::test]
    async fn json_update_is_dispatched() {
        let h = harness(FakeRegistrar::default());
        let resp = h
            .app
            .oneshot(post_update(
                "application/json",
                text_update_json(1, "Hello").to_string(),
            ))
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(h.generator.prompts(), vec!["Hello"]);
        assert_eq!(h.messenger.replies(), vec!["Hi there"]);
    }

    #[tokio::test]
    async fn charset_parameter_is_accepted() {
        let h = harness(FakeRegistrar::default());
        let resp = h
            .app
            .oneshot(post_update(
                "application/json; charset=utf-8",
                text_update_json(1, "Hello").to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(h.generator.calls(), 1);
    }

    #[tokio::test]
    async fn non_json_content_type_is_forbidden() {
        let h = harness(FakeRegistrar::default());
        let resp = h
            .app
            .oneshot(post_update(
                "text/plain",
                text_update_json(1, "Hello").to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(h.generator.calls(), 0);
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let h = harness(FakeRegistrar::default());
        let resp = h
            .app
            .oneshot(post_update("application/json", "{not json".to_string()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn wrong_path_is_not_found() {
        let h = harness(FakeRegistrar::default());
        let resp = h
            .app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/not-the-token")
                    .header(CONTENT_TYPE, "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn paths_sharing_the_bot_id_are_not_found() {
        let h = harness(FakeRegistrar::default());
        for path in ["/123:WRONG", "/123guess", "/123", "/123:secretx"] {
            let resp = h
                .app
                .clone()
                .oneshot(
                    Request::builder()
                        .method("POST")
                        .uri(path)
                        .header(CONTENT_TYPE, "application/json")
                        .body(Body::from(text_update_json(1, "Hello").to_string()))
                        .unwrap(),
                )
                .await
                .unwrap();
            assert_eq!(resp.status(), StatusCode::NOT_FOUND, "{path}");
        }
        assert_eq!(h.generator.calls(), 0);
        assert!(h.messenger.outbound().is_empty());
    }

    #[tokio::test]
    async fn setwebhook_registers_url_without_leaking_token() {
        let h = harness(FakeRegistrar::default());
        let resp = h
            .app
            .oneshot(
                Request::builder()
                    .uri("/setwebhook")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_text(resp).await;
        assert_eq!(body, "Webhook set: https://bot.example.com/<token>");
        assert_eq!(
            h.registrar.registered(),
            vec![format!("https://bot.example.com/{TOKEN}")]
        );
    }

    #[tokio::test]
    async fn setwebhook_failure_is_500() {
        let h = harness(FakeRegistrar::failing());
        let resp = h
            .app
            .oneshot(
                Request::builder()
                    .uri("/setwebhook")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(resp).await, "Webhook setup failed");
    }

    #[tokio::test]
    async fn run_replaces_previous_registration_and_stops_on_shutdown() {
        let h = harness(FakeRegistrar::default());
        let dispatcher = Arc::new(MessageDispatcher::new(
            &Config::from_lookup(|k| match k {
                "TELEGRAM_TOKEN" => Some(TOKEN.to_string()),
                "GEMINI_API_KEY" => Some("g".to_string()),
                "TRANSPORT_MODE" => Some("polling".to_string()),
                _ => None,
            })
            .unwrap(),
            h.messenger.clone(),
            h.generator.clone(),
        ));
        let transport = WebhookTransport::new(
            h.registrar.clone(),
            TOKEN.to_string(),
            format!("https://bot.example.com/{TOKEN}"),
            0,
        );

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        tokio::time::timeout(
            std::time::Duration::from_secs(5),
            transport.run(dispatcher, shutdown),
        )
        .await
        .expect("server should stop once cancelled")
        .unwrap();

        assert_eq!(h.registrar.deletes(), 1);
        assert_eq!(
            h.registrar.registered(),
            vec![format!("https://bot.example.com/{TOKEN}")]
        );
    }

    #[test]
    fn redacts_every_occurrence_of_the_token() {
        assert_eq!(redact("https://x/123:secret", TOKEN), "https://x/<token>");
        assert_eq!(redact("plain", ""), "plain");
    }
}
