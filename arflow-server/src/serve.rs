//! Server lifecycle.
//!
//! Startup, signal-driven graceful drain, and final disconnect. The signal
//! handler is installed exactly once and only arms the drain; every piece of
//! real teardown runs on the runtime after the serve loop returns.

use std::net::SocketAddr;
use std::time::Duration;

use tonic::codec::CompressionEncoding;
use tonic::transport::Server;

use arflow_proto::v1::ar_flow_service_server::ArFlowServiceServer;

use crate::servicer::ArFlowServicer;

pub const DEFAULT_PORT: u16 = 8500;

/// In-flight RPCs get this long to finish once a termination signal lands.
const DRAIN_DEADLINE: Duration = Duration::from_secs(30);

/// Serve the RPC surface until SIGINT/SIGTERM, drain with a bounded
/// deadline, then disconnect every session stream.
pub async fn run_server(servicer: ArFlowServicer, port: u16) -> eyre::Result<()> {
    let addr: SocketAddr = format!("[::]:{port}").parse()?;

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(true);
    })?;

    let service = ArFlowServiceServer::new(servicer.clone())
        .accept_compressed(CompressionEncoding::Gzip)
        .send_compressed(CompressionEncoding::Gzip)
        .max_decoding_message_size(usize::MAX);

    let mut serve_rx = shutdown_rx.clone();
    let mut server = tokio::spawn(
        Server::builder()
            .add_service(service)
            .serve_with_shutdown(addr, async move {
                let _ = serve_rx.changed().await;
            }),
    );
    tracing::info!("server started, listening on {addr}");

    let mut signal_rx = shutdown_rx;
    tokio::select! {
        result = &mut server => result??,
        _ = signal_rx.changed() => {
            tracing::info!("shutting down gracefully");
            match tokio::time::timeout(DRAIN_DEADLINE, &mut server).await {
                Ok(result) => result??,
                Err(_) => {
                    tracing::warn!("drain deadline exceeded, aborting in-flight requests");
                    server.abort();
                }
            }
        }
    }

    servicer.on_program_exit();
    tracing::info!("server shut down gracefully");
    Ok(())
}
