//! HTTP server for hookgate
//!
//! Adapts the framework-independent [`VerificationGate`] to axum. The
//! middleware buffers the raw body, hands it to the gate untouched, and
//! then either answers with the gate's rejection or rebuilds the request
//! from the same bytes for the downstream handler.

use anyhow::{Context, Result};
use axum::{
    Extension, Router,
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Request, State},
    http::{Method, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::signature::{
    Decision, KeyProvider, Reason, Rejection, RemoteKeyProvider, Scheme, VerificationGate,
    VerificationOutcome,
};

/// Request extension set by the gate when a request is forwarded after
/// verification. Absent for bypassed paths and when the gate is disabled.
#[derive(Debug, Clone, Copy)]
pub struct Verified(pub VerificationOutcome);

pub struct Server {
    config: Config,
}

struct GateState {
    gate: Arc<VerificationGate>,
    max_body_bytes: usize,
}

impl Server {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            config: config.clone(),
        })
    }

    pub async fn run(&self) -> Result<()> {
        let gate = build_gate(&self.config)?;
        let app = router(gate, self.config.server.max_body_bytes);

        let addr: SocketAddr = format!("{}:{}", self.config.server.bind, self.config.server.port)
            .parse()
            .context("Invalid server bind address")?;

        info!("Starting HTTP server on http://{}", addr);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind {}", addr))?;
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the gate described by `config`, or `None` when verification is disabled.
pub fn build_gate(config: &Config) -> Result<Option<Arc<VerificationGate>>> {
    if !config.verification.enabled {
        warn!("Signature verification is DISABLED. Every request is forwarded unverified.");
        return Ok(None);
    }

    let gate_config = config.gate_config();
    let provider: Option<Arc<dyn KeyProvider>> = match gate_config.scheme {
        Scheme::SharedSecret => {
            if gate_config.secret.is_none() {
                warn!(
                    "No shared secret configured (verification.secret). \
                     Requests will be rejected with 500 until one is set."
                );
            }
            None
        }
        Scheme::PublicKey => {
            let provider = RemoteKeyProvider::new(config.key_config())
                .context("Failed to create key provider")?;
            info!(url = %provider.url(), "Public-key verification enabled");
            Some(Arc::new(provider))
        }
    };

    info!(
        scheme = %gate_config.scheme,
        auto_reject = gate_config.auto_reject,
        bypass_paths = ?gate_config.bypass_paths,
        "Signature verification enabled"
    );

    Ok(Some(Arc::new(VerificationGate::new(gate_config, provider)?)))
}

/// Routes served by `hookgate serve`, with the gate installed in front of them.
pub fn router(gate: Option<Arc<VerificationGate>>, max_body_bytes: usize) -> Router {
    let app = Router::new()
        .route("/health", get(health_check))
        .route("/", post(receive))
        .fallback(receive);

    let app = match gate {
        Some(gate) => app.layer(middleware::from_fn_with_state(
            Arc::new(GateState {
                gate,
                max_body_bytes,
            }),
            verify_signature,
        )),
        None => app,
    };

    // Handlers extract the body again after the gate; keep their limit in
    // line with the configured one instead of axum's 2 MiB default.
    app.layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
}

async fn verify_signature(
    State(state): State<Arc<GateState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    // Exempt paths never have their body touched.
    if state.gate.is_bypassed(&path) {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => return body_error_response(&path, e),
    };

    let verification = state.gate.capture(&path, &parts.headers, bytes.clone());

    // A panic inside verification must not turn into a dropped connection
    // or a pass-through.
    let gate = state.gate.clone();
    let decision = match tokio::spawn(async move { gate.evaluate(&verification).await }).await {
        Ok(decision) => decision,
        Err(e) => {
            error!(path = %path, "Signature verification task failed: {}", e);
            Decision::Reject(Rejection::internal("Signature verification failed"))
        }
    };

    let outcome = match decision {
        Decision::Reject(rejection) => return rejection_response(&rejection),
        Decision::Forward(outcome) => Some(outcome),
        Decision::Bypass => None,
    };

    let mut request = Request::from_parts(parts, Body::from(bytes));
    if let Some(outcome) = outcome {
        request.extensions_mut().insert(Verified(outcome));
    }
    next.run(request).await
}

fn rejection_response(rejection: &Rejection) -> Response {
    (rejection.status, Json(rejection.body())).into_response()
}

fn body_error_response(path: &str, e: axum::Error) -> Response {
    let too_large = e
        .into_inner()
        .is::<http_body_util::LengthLimitError>();
    if too_large {
        warn!(path = %path, "Request body exceeds limit; rejected before verification");
        (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({"error": "Payload Too Large", "message": "Request body too large"})),
        )
            .into_response()
    } else {
        warn!(path = %path, "Failed to read request body");
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Bad Request", "message": "Could not read request body"})),
        )
            .into_response()
    }
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

#[derive(Serialize)]
struct ReceiveResponse {
    received: bool,
    method: String,
    path: String,
    bytes: usize,
    /// `None` when the gate did not run (disabled or bypassed)
    verified: Option<bool>,
    reason: Option<Reason>,
}

/// Stand-in for the downstream handler: acknowledges the callback and
/// reports how the gate annotated it.
async fn receive(
    verified: Option<Extension<Verified>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Json<ReceiveResponse> {
    let outcome = verified.map(|Extension(Verified(outcome))| outcome);
    debug!(
        path = %uri.path(),
        bytes = body.len(),
        valid = ?outcome.map(|o| o.is_valid()),
        "Callback received"
    );

    Json(ReceiveResponse {
        received: true,
        method: method.to_string(),
        path: uri.path().to_string(),
        bytes: body.len(),
        verified: outcome.map(|o| o.is_valid()),
        reason: outcome.map(|o| o.reason()),
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
