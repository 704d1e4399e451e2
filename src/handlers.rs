// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP handlers for the form shield service.
//!
//! The browser-side script fetches a session, embeds the token and the
//! decoy field into the form, then posts the form to `/api/submit`.

use crate::config::{Config, CorsConfig};
use crate::error::{AppError, FieldIssue};
use crate::fields::{FieldError, FieldMap};
use crate::limiter::RateLimitResult;
use crate::metrics::Metrics;
use crate::orchestrator::{
    Classification, ClientInfo, SubmissionOrchestrator, SubmissionOutcome,
};
use crate::session::{InvalidReason, SessionStatus};
use crate::sink::SubmissionSink;
use crate::store::SharedStore;
use crate::validator::ValidationResult;
use axum::{
    body::Bytes,
    extract::{ConnectInfo, Path, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, warn};

const SUBMIT_MESSAGE: &str = "Thank you! Your submission has been received.";

const X_RATELIMIT_LIMIT: &str = "x-ratelimit-limit";
const X_RATELIMIT_REMAINING: &str = "x-ratelimit-remaining";
const X_RATELIMIT_RESET: &str = "x-ratelimit-reset";

/// Shared application state.
pub struct AppState {
    pub orchestrator: SubmissionOrchestrator,
    pub store: SharedStore,
    pub metrics: Metrics,
    pub config: Config,
}

impl AppState {
    pub fn new(
        store: SharedStore,
        sink: Arc<dyn SubmissionSink>,
        config: Config,
    ) -> Result<Self, prometheus::Error> {
        Ok(Self {
            orchestrator: SubmissionOrchestrator::from_config(store.clone(), sink, &config),
            store,
            metrics: Metrics::new()?,
            config,
        })
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub store: &'static str,
}

/// Session issuance response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionIssued {
    pub session_id: String,
    pub decoy_field_name: String,
    pub expires_in_seconds: u64,
    pub created_at: DateTime<Utc>,
}

/// Submission response. Identical for legitimate and spam submissions.
#[derive(Debug, Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub message: &'static str,
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/api/session", get(issue_session).post(issue_session))
        .route("/api/session/:id", get(session_status).delete(delete_session))
        .route("/api/submit", post(submit));

    if state.config.metrics.enabled {
        app = app.route(&state.config.metrics.path, get(metrics));
    }

    app.layer(cors_layer(&state.config.cors))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins
        .iter()
        .filter_map(|o| o.trim().parse().ok())
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .expose_headers([
            HeaderName::from_static(X_RATELIMIT_LIMIT),
            HeaderName::from_static(X_RATELIMIT_REMAINING),
            HeaderName::from_static(X_RATELIMIT_RESET),
            header::RETRY_AFTER,
        ])
}

/// Health check endpoint.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let store_ok = tokio::time::timeout(state.config.store.timeout(), state.store.ping())
        .await
        .is_ok_and(|r| r.is_ok());

    Json(HealthResponse {
        status: if store_ok { "healthy" } else { "degraded" },
        service: "form-shield",
        version: env!("CARGO_PKG_VERSION"),
        store: if store_ok { "ok" } else { "unavailable" },
    })
}

/// Issue a session. Fails closed when the store is unavailable.
pub async fn issue_session(State(state): State<Arc<AppState>>) -> Result<Response, AppError> {
    let sessions = state.orchestrator.sessions();

    let record = sessions.create_session().await.map_err(|e| {
        error!(error = %e, "Session issuance failed");
        state.metrics.session_issue_failed();
        AppError::BackingStoreUnavailable(e)
    })?;
    state.metrics.session_issued();

    let body = Json(SessionIssued {
        session_id: record.session_id.to_string(),
        decoy_field_name: record.decoy_field_name,
        expires_in_seconds: sessions.config().ttl_secs,
        created_at: record.created_at,
    });
    Ok(([(header::CACHE_CONTROL, "no-store")], body).into_response())
}

/// Read-only session status.
pub async fn session_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<SessionStatus>, AppError> {
    state
        .orchestrator
        .sessions()
        .status(&id)
        .await
        .map(Json)
        .ok_or(AppError::SessionNotFound)
}

/// Invalidate a session. Idempotent.
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> StatusCode {
    state.orchestrator.sessions().delete_session(&id).await;
    StatusCode::NO_CONTENT
}

/// Prometheus scrape endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.metrics.render() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, "Failed to render metrics");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

/// Accept a form submission.
///
/// The client is counted against its limit before the body is decoded.
pub async fn submit(
    State(state): State<Arc<AppState>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let orchestrator = &state.orchestrator;
    let limit = orchestrator.limiter().limit();
    let client = client_info(peer.map(|ConnectInfo(addr)| addr), &headers, &state.config);

    let rate_limit = orchestrator.admit(&client).await;
    let limit_headers = rate_limit_headers(&rate_limit, limit);
    if !rate_limit.is_allowed() {
        let rejected = SubmissionOrchestrator::rate_limited(rate_limit);
        record_metrics(&state.metrics, &rejected);
        return (limit_headers, outcome_response(rejected)).into_response();
    }

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let validator = orchestrator.validator();
    if let ValidationResult::Invalid(errors) = validator.validate_content_type(content_type) {
        debug!(content_type = ?content_type, "Rejected submission content type");
        record_malformed(&state.metrics, &rate_limit);
        let error = AppError::ValidationFailed(errors.iter().map(|e| e.issue()).collect());
        return (StatusCode::UNSUPPORTED_MEDIA_TYPE, limit_headers, error).into_response();
    }

    let fields = match parse_fields(content_type, &body, &state.config) {
        Ok(fields) => fields,
        Err(e) => {
            record_malformed(&state.metrics, &rate_limit);
            return (limit_headers, e).into_response();
        }
    };

    let outcome = orchestrator
        .process(&fields, orchestrator.session_id_from(&fields), &client, rate_limit)
        .await;

    record_metrics(&state.metrics, &outcome);
    (limit_headers, outcome_response(outcome)).into_response()
}

fn client_info(peer: Option<SocketAddr>, headers: &HeaderMap, config: &Config) -> ClientInfo {
    let ip = client_ip(peer, headers, config.security.trust_proxy_headers);
    ClientInfo {
        identity: ip.map_or_else(|| "unknown".to_string(), |ip| ip.to_string()),
        ip: ip.map(|ip| ip.to_string()),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    }
}

/// A body that never reached the pipeline still counts as a failed submission.
fn record_malformed(metrics: &Metrics, rate_limit: &RateLimitResult) {
    metrics.submission(Classification::ValidationFailed);
    if rate_limit.is_degraded() {
        metrics.limiter_degraded();
    }
}

fn record_metrics(metrics: &Metrics, outcome: &SubmissionOutcome) {
    metrics.submission(outcome.classification);
    if outcome.rate_limit.is_degraded() {
        metrics.limiter_degraded();
    }
    if outcome.accepted && !outcome.delivered {
        metrics.sink_failed();
    }
}

/// Map an outcome to its response. Spam and legitimate are indistinguishable.
fn outcome_response(outcome: SubmissionOutcome) -> Response {
    match outcome.classification {
        Classification::Legitimate | Classification::Spam => Json(SubmitResponse {
            success: true,
            message: SUBMIT_MESSAGE,
        })
        .into_response(),
        Classification::RateLimited => {
            let retry_after = match outcome.rate_limit {
                RateLimitResult::Limited { retry_after, .. } => retry_after,
                _ => Default::default(),
            };
            AppError::RateLimited { retry_after }.into_response()
        }
        Classification::SessionInvalid => {
            let reason = outcome
                .invalid_reason
                .unwrap_or(InvalidReason::InvalidOrExpired);
            AppError::SessionInvalid {
                code: reason.code(),
                message: reason.to_string(),
            }
            .into_response()
        }
        Classification::ValidationFailed => AppError::ValidationFailed(
            outcome.validation_errors.iter().map(|e| e.issue()).collect(),
        )
        .into_response(),
    }
}

fn rate_limit_headers(result: &RateLimitResult, limit: u32) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some((limit, remaining, reset)) = result.header_values(limit) {
        headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(limit));
        headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(remaining));
        headers.insert(X_RATELIMIT_RESET, HeaderValue::from(reset));
    }
    headers
}

/// Decode a flat urlencoded or JSON body into a bounded field map.
fn parse_fields(
    content_type: Option<&str>,
    body: &[u8],
    config: &Config,
) -> Result<FieldMap, AppError> {
    let is_json = content_type
        .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
        .is_some_and(|ct| ct.eq_ignore_ascii_case("application/json"));

    let pairs: Vec<(String, String)> = if is_json {
        let object: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(body)
            .map_err(|e| AppError::BadRequest(format!("Malformed JSON body: {e}")))?;
        object
            .into_iter()
            .map(|(name, value)| match value {
                serde_json::Value::String(s) => Ok((name, s)),
                serde_json::Value::Null => Ok((name, String::new())),
                serde_json::Value::Bool(b) => Ok((name, b.to_string())),
                serde_json::Value::Number(n) => Ok((name, n.to_string())),
                _ => Err(AppError::BadRequest(format!(
                    "Field {name} must be a scalar value"
                ))),
            })
            .collect::<Result<_, _>>()?
    } else {
        url::form_urlencoded::parse(body).into_owned().collect()
    };

    FieldMap::from_pairs(pairs, &config.fields).map_err(|e| {
        warn!(error = %e, "Rejected oversized field map");
        AppError::ValidationFailed(vec![field_issue(&e)])
    })
}

fn field_issue(error: &FieldError) -> FieldIssue {
    let (field, code) = match error {
        FieldError::TooManyFields { .. } => ("form".to_string(), "TOO_MANY_FIELDS"),
        FieldError::EmptyName => ("form".to_string(), "EMPTY_FIELD_NAME"),
        FieldError::NameTooLong { .. } => ("form".to_string(), "FIELD_NAME_TOO_LONG"),
        FieldError::ValueTooLong { name, .. } => (name.clone(), "TOO_LONG"),
    };
    FieldIssue { field, code }
}

/// Resolve the client address.
///
/// `X-Forwarded-For` is honoured only when enabled and the direct peer is a
/// loopback reverse proxy; loopback values inside the header are ignored.
pub fn client_ip(
    peer: Option<SocketAddr>,
    headers: &HeaderMap,
    trust_proxy: bool,
) -> Option<IpAddr> {
    let peer_ip = peer.map(|addr| addr.ip());

    if trust_proxy && peer_ip.is_some_and(|ip| ip.is_loopback()) {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .and_then(|first| first.trim().parse::<IpAddr>().ok());

        match forwarded {
            Some(ip) if ip.is_loopback() => {
                warn!(%ip, "Ignoring loopback address in X-Forwarded-For");
            }
            Some(ip) => return Some(ip),
            None => {}
        }
    } else if headers.contains_key("x-forwarded-for") {
        debug!(peer = ?peer_ip, "Ignoring X-Forwarded-For from untrusted peer");
    }

    peer_ip
}
