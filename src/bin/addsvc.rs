//! The add service: `sum` and `concat` over HTTP and JSON-RPC, rate limited per method.

use std::sync::Arc;

use clap::Parser;
use tokio::net::TcpListener;

use resilient_rpc::addsvc::{BasicService, Endpoints};
use resilient_rpc::config::ServiceConfig;
use resilient_rpc::http::{service_router, HttpServer};
use resilient_rpc::jsonrpc::rpc_router;
use resilient_rpc::lifecycle::{init_observability, wait_for_signal, Shutdown, StartupArgs};

#[derive(Debug, Parser)]
#[command(name = "addsvc", version, about = "Add service backend")]
struct Cli {
    #[command(flatten)]
    startup: StartupArgs,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config: ServiceConfig = cli.startup.load(|c: &mut ServiceConfig| &mut c.listener)?;
    init_observability(&config.observability);

    tracing::info!(
        bind_address = %config.listener.bind_address,
        sum_capacity = config.sum_limit.capacity,
        concat_capacity = config.concat_limit.capacity,
        "Configuration loaded"
    );

    let endpoints = Endpoints::server(Arc::new(BasicService), &config.sum_limit, &config.concat_limit);
    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let server = HttpServer::new(service_router(endpoints.clone()).merge(rpc_router(endpoints)), &config.listener);

    let shutdown = Shutdown::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));
    server.run(listener, shutdown.signalled()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
