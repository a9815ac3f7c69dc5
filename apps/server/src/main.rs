#![warn(clippy::all, clippy::pedantic)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use tokio::sync::mpsc;
use tracing::{error, info};
use uppe_service::Orchestrator;
use uppe_service::config::Config;

mod error;
mod routes;

use error::AppError;

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    let config_path = std::env::var_os("UPPE_CONFIG").map(PathBuf::from);
    let config = Config::from_config(config_path)?;
    config.logging.init();

    let addr: SocketAddr = config.server.bind.parse()?;
    let orchestrator = Arc::new(Orchestrator::from_config(config).await?);

    let (_events_tx, events_rx) = mpsc::channel(64);
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let engine = {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            let shutdown = async {
                let _ = stop_rx.await;
            };
            if let Err(e) = orchestrator.run(events_rx, shutdown).await {
                error!(error = %e, "Orchestrator stopped");
            }
        })
    };

    info!(%addr, "Starting HTTP server");
    let served = run_server(addr, &orchestrator).await;

    stop_tx.send(()).ok();
    if let Err(e) = engine.await {
        error!(error = %e, "Orchestrator task failed");
    }
    served
}

async fn run_server(addr: SocketAddr, orchestrator: &Orchestrator) -> Result<(), AppError> {
    let ingress = web::Data::new(orchestrator.push_ingress());

    HttpServer::new(move || App::new().app_data(ingress.clone()).configure(routes::routes))
        .bind(addr)?
        .run()
        .await?;

    Ok(())
}
