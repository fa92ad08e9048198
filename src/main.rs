//! API gateway for the add service.
//!
//! ```text
//!     Client ──▶ POST /addsvc/{sum,concat}
//!                    │
//!                    ▼
//!        logging → instrument → Retry(max_attempts, timeout)
//!                    │
//!                    ▼
//!               RoundRobin ◀── EndpointCache ◀── discovery (static list / watched file)
//!                    │
//!                    ▼
//!        circuit_breaker → rate_limit → HTTP client ──▶ addsvc instance
//! ```

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use resilient_rpc::config::GatewayConfig;
use resilient_rpc::gateway::{gateway_router, instancer_from_config, Gateway};
use resilient_rpc::http::HttpServer;
use resilient_rpc::lifecycle::{init_observability, wait_for_signal, Shutdown, StartupArgs};

#[derive(Debug, Parser)]
#[command(name = "gateway", version, about = "Resilient API gateway for the add service")]
struct Cli {
    #[command(flatten)]
    startup: StartupArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config: GatewayConfig = cli.startup.load(|c: &mut GatewayConfig| &mut c.listener)?;
    init_observability(&config.observability);

    tracing::info!(
        bind_address = %config.listener.bind_address,
        service = %config.discovery.service,
        max_attempts = config.retry.max_attempts,
        timeout_ms = config.retry.timeout_ms,
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let instancer = instancer_from_config(&config.discovery)?;
    let gateway = Arc::new(Gateway::new(&config, instancer, &shutdown)?);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(gateway_router(gateway.clone()), &config.listener);

    tokio::spawn(wait_for_signal(shutdown.clone()));
    server.run(listener, shutdown.signalled()).await?;

    // Make sure the caches are closed even if the server stopped on its own.
    shutdown.trigger();
    gateway.join().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
