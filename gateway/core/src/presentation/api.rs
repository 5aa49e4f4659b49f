// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP boundary of the gateway.
//!
//! `POST /aggregate` maps a batch to `200` (no failures), `207` (only optional
//! calls failed) or `502` (a required call failed). The full aggregated body
//! is returned in every case.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Path, Request, State},
    http::{header::CONTENT_TYPE, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::application::aggregator::{AggregateError, BatchStatus, RequestAggregator};
use crate::application::health::HealthReport;
use crate::application::query_projector::QueryProjector;
use crate::domain::call::AggregatedRequest;
use crate::domain::endpoint::{ServiceEndpoint, ServiceRegistry};
use crate::domain::query::QueryRequest;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

pub struct AppState {
    pub aggregator: Arc<RequestAggregator>,
    pub projector: QueryProjector,
    pub registry: Arc<dyn ServiceRegistry>,
    pub started_at: Instant,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(aggregator: Arc<RequestAggregator>, registry: Arc<dyn ServiceRegistry>) -> Self {
        Self {
            projector: QueryProjector::new(Arc::clone(&aggregator)),
            aggregator,
            registry,
            started_at: Instant::now(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}

pub fn app(state: AppState) -> Router {
    let with_metrics = state.metrics.is_some();

    let mut router = Router::new()
        .route("/aggregate", post(aggregate_handler))
        .route("/query", post(query_handler))
        .route("/health", get(health_handler))
        .route("/services", get(list_services_handler))
        .route(
            "/services/{name}",
            put(register_service_handler).delete(unregister_service_handler),
        );

    if with_metrics {
        router = router.route("/metrics", get(metrics_handler));
    }

    router.layer(TraceLayer::new_for_http()).with_state(Arc::new(state))
}

/// Error body `{"error": "..."}` with an explicit status.
struct ApiError(StatusCode, String);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.0, Json(json!({ "error": self.1 }))).into_response()
    }
}

/// `Json` extractor whose rejections use the `{"error": ...}` body.
///
/// Malformed or schema-invalid bodies answer `400`; an oversized body keeps `413`.
struct JsonBody<T>(T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: serde::de::DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(rejection.into()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self(status, format!("invalid request body: {}", rejection.body_text()))
    }
}

impl From<AggregateError> for ApiError {
    fn from(error: AggregateError) -> Self {
        Self(StatusCode::BAD_REQUEST, error.to_string())
    }
}

async fn aggregate_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(request): JsonBody<AggregatedRequest>,
) -> Result<Response, ApiError> {
    // Dropping the handler (client went away) cancels the batch
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let required = request.required_ids();
    let response = state.aggregator.aggregate(request, &cancel).await?;

    let status = BatchStatus::evaluate(&response, &required);
    let code = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::OK);
    Ok((code, Json(response)).into_response())
}

async fn query_handler(
    State(state): State<Arc<AppState>>,
    JsonBody(query): JsonBody<QueryRequest>,
) -> Result<Response, ApiError> {
    let cancel = CancellationToken::new();
    let _guard = cancel.clone().drop_guard();

    let response = state.projector.project(query, &cancel).await?;
    Ok(Json(response).into_response())
}

async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthReport::from_registry(
        state.registry.as_ref(),
        state.started_at.elapsed(),
    ))
}

async fn list_services_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.list())
}

#[derive(Debug, Deserialize)]
pub struct RegisterServiceRequest {
    pub base_url: String,

    #[serde(default)]
    pub headers: HashMap<String, String>,

    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,

    #[serde(default)]
    pub health_path: Option<String>,
}

async fn register_service_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    JsonBody(body): JsonBody<RegisterServiceRequest>,
) -> Result<Response, ApiError> {
    match url::Url::parse(&body.base_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        Ok(url) => {
            return Err(ApiError(
                StatusCode::BAD_REQUEST,
                format!("base_url must use http or https, got '{}'", url.scheme()),
            ))
        }
        Err(e) => return Err(ApiError(StatusCode::BAD_REQUEST, format!("invalid base_url: {}", e))),
    }

    let endpoint = ServiceEndpoint {
        timeout: body.timeout,
        headers: body.headers,
        health_path: body.health_path,
        ..ServiceEndpoint::new(name, body.base_url)
    };
    state.registry.register(endpoint.clone());

    Ok(Json(endpoint).into_response())
}

async fn unregister_service_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, ApiError> {
    match state.registry.unregister(&name) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(ApiError(StatusCode::NOT_FOUND, format!("service not found: {}", name))),
    }
}

async fn metrics_handler(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics {
        Some(handle) => ([(CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], handle.render()).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
