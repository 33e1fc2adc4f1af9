use std::future::Future;
use std::sync::Arc;
use tgis::Dispatcher;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::info;

pub mod config;
pub mod convert;
pub mod service;
pub mod status;

pub use config::GrpcConfig;
pub use service::TgisService;

/// Generated `fmaas` protocol types
pub mod pb {
    tonic::include_proto!("fmaas");
}

use pb::generation_service_server::GenerationServiceServer;

/// Build the gRPC service
pub fn build_service(dispatcher: Arc<Dispatcher>) -> GenerationServiceServer<TgisService> {
    GenerationServiceServer::new(TgisService::new(dispatcher))
}

/// Serve on `listener` until `shutdown` resolves
pub async fn serve<F>(
    dispatcher: Arc<Dispatcher>,
    listener: TcpListener,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send,
{
    info!("Serving gRPC on {}", listener.local_addr()?);
    Server::builder()
        .add_service(build_service(dispatcher))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))
}
