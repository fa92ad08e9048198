//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Wrap any axum `Router` in the common middleware (request id, trace, timeout)
//! - Serve it with graceful shutdown
//! - Route the add service's operations to its endpoint set
//!
//! # Design Decisions
//! - Handlers stay thin: extract context, invoke the composed endpoint,
//!   let `HttpError` pick the status code
//! - The request id is assigned before tracing so every span carries it

use std::future::Future;
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::addsvc::{ConcatRequest, ConcatResponse, Endpoints, SumRequest, SumResponse};
use crate::config::ListenerConfig;
use crate::endpoint::{BoxEndpoint, Endpoint};
use crate::http::request::context_from_headers;
use crate::http::response::HttpError;

/// An axum router with the common middleware applied.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Wrap `routes` in the common middleware layers.
    #[allow(deprecated)]
    pub fn new(routes: Router, listener: &ListenerConfig) -> Self {
        let router = routes
            .layer(TimeoutLayer::new(Duration::from_secs(listener.request_timeout_secs)))
            .layer(PropagateRequestIdLayer::x_request_id())
            .layer(TraceLayer::new_for_http())
            .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid));
        Self { router }
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` resolves, then drain in-flight requests.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<(), std::io::Error>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Invoke `endpoint` for one inbound JSON request.
pub async fn call_json<Req, Resp>(
    endpoint: &BoxEndpoint<Req, Resp>,
    headers: &HeaderMap,
    request: Req,
) -> Result<Json<Resp>, HttpError>
where
    Req: Send + 'static,
    Resp: Send + 'static,
{
    let ctx = context_from_headers(headers);
    let response = endpoint.invoke(ctx, request).await?;
    Ok(Json(response))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Routes of the add service: `POST /sum`, `POST /concat`, `GET /health`.
pub fn service_router(endpoints: Endpoints) -> Router {
    Router::new()
        .route("/sum", post(sum_handler))
        .route("/concat", post(concat_handler))
        .route("/health", get(health))
        .with_state(endpoints)
}

async fn sum_handler(
    State(endpoints): State<Endpoints>,
    headers: HeaderMap,
    Json(request): Json<SumRequest>,
) -> Result<Json<SumResponse>, HttpError> {
    call_json(&endpoints.sum, &headers, request).await
}

async fn concat_handler(
    State(endpoints): State<Endpoints>,
    headers: HeaderMap,
    Json(request): Json<ConcatRequest>,
) -> Result<Json<ConcatResponse>, HttpError> {
    call_json(&endpoints.concat, &headers, request).await
}
