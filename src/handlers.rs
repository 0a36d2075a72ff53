use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, State},
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info, warn};

use crate::classify::{ClassifiedResult, classify};
use crate::error::{AppError, Outcome, panic_response};
use crate::models::{ChatReply, NormalizedReply, StatusResponse};
use crate::normalize::normalize;
use crate::state::AppState;
use crate::telemetry::{finish_request_span, start_request_span};
use crate::validate::validate_chat_request;

pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/api/chat", post(post_chat))
        .route("/", get(home));
    with_layers(routes, state)
}

/// Messages are forwarded whatever their size, so the body limit is off.
fn with_layers(routes: Router<AppState>, state: AppState) -> Router {
    let cors = cors_layer(&state.config.server.cors_allowed_origins);
    routes
        .layer(DefaultBodyLimit::disable())
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(cors)
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

pub async fn home() -> Json<StatusResponse> {
    Json(StatusResponse {
        status: "Proxy running successfully!",
    })
}

/// The body is taken raw so malformed JSON gets the same 400 reply as an
/// empty message.
pub async fn post_chat(State(state): State<AppState>, body: Bytes) -> Response {
    let request_id = next_request_id();
    let start = Instant::now();
    let model = state.config.upstream.model.as_str();
    let span = start_request_span(&request_id, model);
    state.metrics.record_request();

    let result = chat(&state, &request_id, &body).await;
    let (status, outcome) = match &result {
        Ok(reply) if reply.ok => (StatusCode::OK, Outcome::Success),
        Ok(_) => (StatusCode::OK, Outcome::SoftWarning),
        Err(err) => (err.status, err.outcome),
    };

    let elapsed = start.elapsed();
    state.metrics.record_outcome(outcome, elapsed);
    log_completion(
        &request_id,
        model,
        elapsed.as_millis(),
        status,
        outcome,
        result.as_ref().err(),
    );
    finish_request_span(span, outcome, status.as_u16());

    match result {
        Ok(reply) => Json(ChatReply::new(reply.text)).into_response(),
        Err(err) => err.into_response(),
    }
}

async fn chat(state: &AppState, request_id: &str, body: &[u8]) -> Result<NormalizedReply, AppError> {
    let request = validate_chat_request(body)?;
    let config = state.config.as_ref();
    if config.observability.dump_upstream {
        info!(request_id = %request_id, "upstream message: {}", request.message);
    }

    let outcome = state.upstream.generate(config, &request.message).await;
    match classify(outcome) {
        ClassifiedResult::Success(raw) => {
            if config.observability.dump_upstream {
                info!(
                    request_id = %request_id,
                    "upstream response: {}",
                    String::from_utf8_lossy(&raw)
                );
            }
            Ok(normalize(&raw)?)
        }
        ClassifiedResult::ModelLoading => Err(AppError::model_loading()),
        ClassifiedResult::ModelNotFound => Err(AppError::model_not_found(&config.upstream.model)),
        ClassifiedResult::UpstreamError { status, body } => Err(AppError::upstream_failure(
            status,
            &body,
            config.credential(),
        )),
        ClassifiedResult::Timeout => Err(AppError::timeout()),
        ClassifiedResult::Unreachable => Err(AppError::unreachable(&config.inference_url())),
    }
}

static REQUEST_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_request_id() -> String {
    let seq = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    format!("req-{}-{}", ts, seq)
}

/// One line per request; failures carry the log-only detail and the reply.
fn log_completion(
    request_id: &str,
    model: &str,
    latency_ms: u128,
    status: StatusCode,
    outcome: Outcome,
    err: Option<&AppError>,
) {
    let detail = err.and_then(|e| e.detail.as_deref()).unwrap_or("");
    let reply = err.map(|e| e.reply.as_str()).unwrap_or("");
    match outcome {
        Outcome::InternalError => error!(
            request_id = %request_id,
            model = %model,
            latency_ms = latency_ms,
            status = status.as_u16(),
            outcome = outcome.as_str(),
            detail = %detail,
            reply = %reply,
            "request completed"
        ),
        Outcome::UpstreamFailure | Outcome::FormatError | Outcome::ConfigError => warn!(
            request_id = %request_id,
            model = %model,
            latency_ms = latency_ms,
            status = status.as_u16(),
            outcome = outcome.as_str(),
            detail = %detail,
            reply = %reply,
            "request completed"
        ),
        _ => info!(
            request_id = %request_id,
            model = %model,
            latency_ms = latency_ms,
            status = status.as_u16(),
            outcome = outcome.as_str(),
            detail = %detail,
            "request completed"
        ),
    }
}
