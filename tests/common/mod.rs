//! Shared fixtures for the integration tests: mock add-service backends and
//! a gateway driven by a scripted instance publisher.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tokio::net::TcpListener;

use resilient_rpc::addsvc::{AddService, BasicService, ConcatRequest, ConcatResponse, SumRequest, SumResponse};
use resilient_rpc::addsvc::Endpoints;
use resilient_rpc::config::{GatewayConfig, ServiceConfig};
use resilient_rpc::discovery::InstancePublisher;
use resilient_rpc::gateway::Gateway;
use resilient_rpc::http::{service_router, ErrorBody, HttpServer};
use resilient_rpc::jsonrpc::rpc_router;
use resilient_rpc::lifecycle::Shutdown;

/// How a mock backend answers.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Runs the real add service.
    Healthy,
    /// Answers every call with this status and an empty body.
    Status(StatusCode),
    /// Runs the real add service after sleeping.
    Slow(Duration),
}

#[derive(Clone)]
struct BackendState {
    behavior: Behavior,
    hits: Arc<AtomicUsize>,
}

/// A running mock backend.
pub struct Backend {
    pub address: String,
    hits: Arc<AtomicUsize>,
}

impl Backend {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Start a backend on an ephemeral port.
pub async fn start_backend(behavior: Behavior) -> Backend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let hits = Arc::new(AtomicUsize::new(0));

    let state = BackendState {
        behavior,
        hits: hits.clone(),
    };
    let app = Router::new()
        .route("/sum", post(sum))
        .route("/concat", post(concat))
        .with_state(state);

    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });

    Backend { address, hits }
}

async fn sum(State(state): State<BackendState>, Json(req): Json<SumRequest>) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if let Behavior::Slow(delay) = state.behavior {
        tokio::time::sleep(delay).await;
    }
    match state.behavior {
        Behavior::Healthy | Behavior::Slow(_) => match BasicService.sum(req.a, req.b) {
            Ok(v) => Json(SumResponse { v }).into_response(),
            Err(e) => rejected(e.to_string()),
        },
        Behavior::Status(status) => status.into_response(),
    }
}

async fn concat(State(state): State<BackendState>, Json(req): Json<ConcatRequest>) -> Response {
    state.hits.fetch_add(1, Ordering::SeqCst);
    if let Behavior::Slow(delay) = state.behavior {
        tokio::time::sleep(delay).await;
    }
    match state.behavior {
        Behavior::Healthy | Behavior::Slow(_) => match BasicService.concat(&req.a, &req.b) {
            Ok(v) => Json(ConcatResponse { v }).into_response(),
            Err(e) => rejected(e.to_string()),
        },
        Behavior::Status(status) => status.into_response(),
    }
}

/// Start the real add service (HTTP and JSON-RPC routes) on an ephemeral port.
pub async fn start_service(config: ServiceConfig) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let address = listener.local_addr().unwrap().to_string();
    let endpoints = Endpoints::server(Arc::new(BasicService), &config.sum_limit, &config.concat_limit);
    let server = HttpServer::new(service_router(endpoints.clone()).merge(rpc_router(endpoints)), &config.listener);

    tokio::spawn(async move {
        let _ = server.run(listener, std::future::pending()).await;
    });
    address
}

fn rejected(error: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(ErrorBody { error })).into_response()
}

/// A gateway whose membership is scripted through `publisher`.
pub struct TestGateway {
    pub gateway: Arc<Gateway>,
    pub publisher: Arc<InstancePublisher>,
    pub shutdown: Shutdown,
}

impl TestGateway {
    pub fn start(config: GatewayConfig) -> Self {
        let publisher = Arc::new(InstancePublisher::new());
        let shutdown = Shutdown::new();
        let gateway = Gateway::new(&config, publisher.clone(), &shutdown).unwrap();
        Self {
            gateway: Arc::new(gateway),
            publisher,
            shutdown,
        }
    }

    /// Publish `addresses` and wait until the sum cache reflects them.
    pub async fn set_instances(&self, addresses: &[&str]) {
        self.publisher.publish(addresses.iter().copied());
        let mut expected: Vec<String> = addresses.iter().map(|a| a.to_string()).collect();
        expected.sort();
        expected.dedup();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let live = self.gateway.instances();
            if live["sum"] == expected && live["concat"] == expected {
                return;
            }
            assert!(tokio::time::Instant::now() < deadline, "instances never became {expected:?}");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        self.gateway.join().await;
    }
}

/// Gateway config with a generous budget and no backoff.
pub fn gateway_config() -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.retry.max_attempts = 3;
    config.retry.timeout_ms = 2_000;
    config.retry.base_delay_ms = 0;
    config
}
