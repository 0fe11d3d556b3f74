//! The webhook HTTP server.

use crate::{
    dispatch::Dispatcher,
    errors::{PromoterError, PromoterResult},
    events::Event,
};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Router,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::{
    net::SocketAddr,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the HMAC-SHA256 signature of the body.
const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Header carrying the event type.
const EVENT_TYPE_HEADER: &str = "x-github-event";

/// Counters of webhook outcomes.
#[derive(Debug, Default)]
pub struct WebhookStats {
    validation_failed: AtomicU64,
    parsing_failed: AtomicU64,
    accepted: AtomicU64,
}

impl WebhookStats {
    /// Returns `(validation_failed, parsing_failed, accepted)`.
    pub fn snapshot(&self) -> (u64, u64, u64) {
        (
            self.validation_failed.load(Ordering::Relaxed),
            self.parsing_failed.load(Ordering::Relaxed),
            self.accepted.load(Ordering::Relaxed),
        )
    }
}

/// The state shared by the webhook handlers.
#[derive(Clone)]
pub struct AppState {
    dispatcher: Dispatcher,
    secret: Arc<[u8]>,
    stats: Arc<WebhookStats>,
}

impl AppState {
    /// Creates a new [AppState] that validates payloads with `secret`.
    pub fn new(dispatcher: Dispatcher, secret: &[u8]) -> Self {
        Self {
            dispatcher,
            secret: Arc::from(secret),
            stats: Arc::default(),
        }
    }
}

/// Builds the router: `POST /webhook` and the `GET /live` liveness check.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(receive_webhook))
        .route("/live", get(live))
        .with_state(state)
}

/// Binds `listen` and serves webhooks until Ctrl-C, then logs the webhook counters.
pub async fn serve(listen: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(listen).await?;
    let stats = state.stats.clone();
    info!(%listen, "Serving webhooks");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
        })
        .await?;

    let (validation_failed, parsing_failed, accepted) = stats.snapshot();
    info!(validation_failed, parsing_failed, accepted, "Webhook server stopped");
    Ok(())
}

async fn live() -> &'static str {
    "Ok"
}

async fn receive_webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    match accept(&state.secret, &state.stats, &headers, &body) {
        Ok(event) => {
            // The response does not wait for the event to be handled.
            state.dispatcher.spawn(event);
            StatusCode::OK
        }
        Err(PromoterError::InvalidSignature) => StatusCode::UNAUTHORIZED,
        Err(_) => StatusCode::BAD_REQUEST,
    }
}

/// Validates and parses one webhook delivery.
///
/// ## Returns
/// - `Ok(event)` - The parsed event.
/// - `Err(PromoterError::InvalidSignature)` - The signature is missing or does not match.
/// - `Err(PromoterError::Payload)` - The payload is malformed.
pub fn accept(secret: &[u8], stats: &WebhookStats, headers: &HeaderMap, body: &[u8]) -> PromoterResult<Event> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    if let Err(e) = verify_signature(secret, signature, body) {
        stats.validation_failed.fetch_add(1, Ordering::Relaxed);
        warn!("Rejected webhook with an invalid signature");
        return Err(e);
    }

    let event_type = headers
        .get(EVENT_TYPE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let event = Event::parse(event_type, body).inspect_err(|e| {
        stats.parsing_failed.fetch_add(1, Ordering::Relaxed);
        warn!(%event_type, error = %e, "Could not parse webhook");
    })?;

    stats.accepted.fetch_add(1, Ordering::Relaxed);
    debug!(event_type = event.kind(), "Accepted webhook");
    Ok(event)
}

/// Checks a `sha256=<hex>` signature against the HMAC-SHA256 of `body` under `secret`.
pub fn verify_signature(secret: &[u8], signature: Option<&str>, body: &[u8]) -> PromoterResult<()> {
    let expected = signature
        .and_then(|s| s.strip_prefix("sha256="))
        .and_then(|s| hex::decode(s).ok())
        .ok_or(PromoterError::InvalidSignature)?;

    let mut mac = HmacSha256::new_from_slice(secret).map_err(|_| PromoterError::InvalidSignature)?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| PromoterError::InvalidSignature)
}
