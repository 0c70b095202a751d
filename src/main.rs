use std::net::SocketAddr;

use admission_gate::admission::AdmissionController;
use admission_gate::config::Args;
use admission_gate::handlers;
use admission_gate::identity::IdentitySource;
use admission_gate::logging;
use admission_gate::state::AppState;
use clap::Parser;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // parse cli arguments
    let args = Args::parse();
    logging::init(&args.log_level)?;

    let config = args.limiter_config()?;
    let admission = AdmissionController::start(config)?;
    let state = AppState::new(admission.clone(), IdentitySource::from(args.identity));

    let app = handlers::router(state);

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Listening on port: {}", args.port);
    info!(
        "Rate limit: {} requests per {} seconds, identity by {:?}",
        config.capacity, args.refill_window, args.identity
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    admission.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
