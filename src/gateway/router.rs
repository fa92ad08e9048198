//! Gateway HTTP routes.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

use crate::addsvc::{ConcatRequest, ConcatResponse, Endpoints, SumRequest, SumResponse};
use crate::gateway::Gateway;
use crate::http::response::HttpError;
use crate::http::server::{call_json, health};

#[derive(Clone)]
struct GatewayState {
    gateway: Arc<Gateway>,
    endpoints: Endpoints,
}

/// `POST /addsvc/sum`, `POST /addsvc/concat`, `GET /instances`, `GET /health`.
pub fn gateway_router(gateway: Arc<Gateway>) -> Router {
    let state = GatewayState {
        endpoints: gateway.endpoints(),
        gateway,
    };
    Router::new()
        .route("/addsvc/sum", post(sum))
        .route("/addsvc/concat", post(concat))
        .route("/instances", get(instances))
        .route("/health", get(health))
        .with_state(state)
}

async fn sum(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(request): Json<SumRequest>,
) -> Result<Json<SumResponse>, HttpError> {
    call_json(&state.endpoints.sum, &headers, request).await
}

async fn concat(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    Json(request): Json<ConcatRequest>,
) -> Result<Json<ConcatResponse>, HttpError> {
    call_json(&state.endpoints.concat, &headers, request).await
}

async fn instances(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!(state.gateway.instances()))
}
