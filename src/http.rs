//! HTTP surface for the CloudEvents ingress.

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::cloudevents::CloudEvent;
use crate::ingress::{CloudEventIngress, IngressResponse, IngressStatus, ProcessOutcome};
use crate::registry::CommandRegistry;

/// Shared state of the ingress router.
#[derive(Clone)]
pub struct AppState {
    /// The processor behind `POST /api/cloudevents` (direct or queued).
    pub ingress: Arc<dyn CloudEventIngress>,
    /// Registry backing `GET /api/cloudevents/schemas`; `None` in
    /// queued mode, where the endpoint answers 404.
    pub registry: Option<Arc<CommandRegistry>>,
}

/// Body of `GET /api/cloudevents/schemas`.
#[derive(Debug, Serialize, Deserialize)]
pub struct SchemasResponse {
    /// Registered command schema URNs, sorted.
    pub schemas: Vec<String>,
    /// Number of entries in `schemas`.
    pub count: usize,
}

/// Build the ingress router.
///
/// * `POST /api/cloudevents` - accepts an `application/cloudevents+json`
///   body; responds 202/400/422/500 with `{id, status, message?}`.
/// * `GET /api/cloudevents/schemas` - lists registered command schemas
///   (direct mode only).
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/cloudevents", post(post_cloud_event))
        .route("/api/cloudevents/schemas", get(get_schemas))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Parse the body ourselves: the CloudEvents content type
/// (`application/cloudevents+json`) is not `application/json`, so the
/// stock JSON extractor would refuse it.
async fn post_cloud_event(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<IngressResponse>) {
    let ce: CloudEvent = match serde_json::from_slice(&body) {
        Ok(ce) => ce,
        Err(e) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(IngressResponse {
                    id: String::new(),
                    status: IngressStatus::Rejected,
                    message: Some(format!("body is not a cloudevent: {e}")),
                }),
            );
        }
    };

    let outcome = state.ingress.process(&ce).await;
    let status = match &outcome {
        ProcessOutcome::Accepted => StatusCode::ACCEPTED,
        ProcessOutcome::Invalid(_) => StatusCode::BAD_REQUEST,
        ProcessOutcome::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ProcessOutcome::Failed(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(outcome.into_response(&ce.id)))
}

async fn get_schemas(State(state): State<AppState>) -> Response {
    match state.registry {
        Some(registry) => {
            let schemas = registry.schemas();
            let count = schemas.len();
            (StatusCode::OK, Json(SchemasResponse { schemas, count })).into_response()
        }
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
