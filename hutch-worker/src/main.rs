//! Hutch Worker - RabbitMQ email-sender subscription with a thin HTTP host.
//!
//! Consumes email requests from the `email_sender` queue, logs each one and
//! passes it to the email sender, acknowledging according to the outcome.

use std::io;
use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use hutch::consumer::status_channel;
use hutch::shutdown::listen_for_signals;
use hutch::web::{router, AppState};
use hutch::{
    shutdown_channel, telemetry, Config, ConsumerError, NoopSender, ShutdownTrigger, Topology, Worker,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    let _log_guard = telemetry::init(&config)?;

    info!("worker_starting");
    info!(
        amqp_url_set = !config.amqp_url.is_empty(),
        prefetch_count = config.prefetch_count,
        consumer_tag = %config.consumer_tag,
        reconnect_max_attempts = ?config.reconnect.max_attempts,
        requeue_max_delay_ms = config.requeue.max_delay.as_millis() as u64,
        port = config.port,
        file_log = config.log_directory.is_some(),
        "config_loaded"
    );

    let (trigger, shutdown) = shutdown_channel();
    tokio::spawn(listen_for_signals(trigger.clone()));

    let (status_tx, status_rx) = status_channel();
    let worker = Worker::new(&config, Topology::email(), NoopSender, status_tx);
    let worker = tokio::spawn(worker.run(shutdown.clone()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    let mut server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router(AppState::new(status_rx)))
            .with_graceful_shutdown(async move { server_shutdown.wait().await })
            .await
    });

    wait_for_exit(worker, server, trigger).await?;

    info!("process_exit");
    Ok(())
}

/// Wait for the worker and the web server; whichever fails first takes the
/// process down.
///
/// A failed worker aborts the server. When the server stops first the worker
/// is shut down cleanly so in-flight deliveries are still settled.
async fn wait_for_exit(
    mut worker: JoinHandle<Result<(), ConsumerError>>,
    mut server: JoinHandle<io::Result<()>>,
    trigger: ShutdownTrigger,
) -> Result<()> {
    tokio::select! {
        worker_result = &mut worker => {
            let worker_result = worker_result.context("Worker task panicked");
            if !matches!(worker_result, Ok(Ok(()))) {
                server.abort();
            }
            worker_result?.context("Email consumer stopped")?;

            server
                .await
                .context("Web server task panicked")?
                .context("Server error")
        }
        server_result = &mut server => {
            let server_result = server_result
                .context("Web server task panicked")
                .and_then(|r| r.context("Server error"));
            if let Err(e) = &server_result {
                error!(error = %e, "web_server_failed");
            }

            trigger.trigger();
            let worker_result = worker.await.context("Worker task panicked")?;

            server_result?;
            worker_result.context("Email consumer stopped")
        }
    }
}
