//! gRPC server for the vision service.
//!
//! Wraps a [`RecognitionPipeline`] behind the wire service. Operation
//! verdicts always ride in the response payload; gRPC status codes are
//! reserved for lifecycle conditions such as shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::{RwLock, broadcast};
use tonic::{Request, Response, Status};
use tracing::{debug, error, info, instrument};

use vaxsight_proto::vision::vision_service_server::{VisionService, VisionServiceServer};
use vaxsight_proto::vision::{
    RecognizeRequest, RecognizeResponse, ScanRequest, ScanResponse, VerifyRequest, VerifyResponse,
};

use crate::pipeline::RecognitionPipeline;

/// Ceiling for request and reply payloads. Full frames ride the wire as
/// encoded images, so the transport default of 4 MiB is far too small.
pub const MAX_MESSAGE_BYTES: usize = 50 * 1024 * 1024;

/// The gRPC server for the vision service.
///
/// Owns the pipeline and the lifecycle state. `serve` blocks until the
/// supplied shutdown channel fires or the transport fails.
pub struct VisionGrpcServer {
    pipeline: RecognitionPipeline,
    max_concurrent_requests: usize,
    state: Arc<RwLock<ServerState>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created,
    Running,
    ShuttingDown,
    Stopped,
}

impl VisionGrpcServer {
    /// `max_concurrent_requests` caps in-flight requests per connection,
    /// mirroring the station's worker pool size.
    pub fn new(pipeline: RecognitionPipeline, max_concurrent_requests: usize) -> Self {
        Self {
            pipeline,
            max_concurrent_requests,
            state: Arc::new(RwLock::new(ServerState::Created)),
        }
    }

    /// Starts the server on the given address and runs until shutdown.
    ///
    /// In-flight requests are drained after the shutdown channel fires;
    /// requests arriving during the drain are rejected as unavailable.
    #[instrument(skip(self, shutdown), fields(addr = %addr))]
    pub async fn serve(
        self,
        addr: SocketAddr,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), tonic::transport::Error> {
        {
            let mut state = self.state.write().await;
            *state = ServerState::Running;
        }

        let service = VisionServiceImpl {
            pipeline: self.pipeline.clone(),
            state: Arc::clone(&self.state),
        };

        info!("starting vision gRPC server on {}", addr);

        let drain_state = Arc::clone(&self.state);
        let server = tonic::transport::Server::builder()
            .trace_fn(|_| tracing::info_span!("vision_grpc"))
            .concurrency_limit_per_connection(self.max_concurrent_requests)
            .add_service(
                VisionServiceServer::new(service)
                    .max_decoding_message_size(MAX_MESSAGE_BYTES)
                    .max_encoding_message_size(MAX_MESSAGE_BYTES),
            )
            .serve_with_shutdown(addr, async move {
                let _ = shutdown.recv().await;
                *drain_state.write().await = ServerState::ShuttingDown;
                info!("shutdown signal received, draining connections");
            });

        match server.await {
            Ok(()) => {
                info!("vision gRPC server stopped gracefully");
                let mut state = self.state.write().await;
                *state = ServerState::Stopped;
                Ok(())
            }
            Err(e) => {
                error!("vision gRPC server error: {}", e);
                Err(e)
            }
        }
    }

    /// Returns the current server state.
    pub async fn state(&self) -> ServerState {
        *self.state.read().await
    }
}

/// Internal gRPC service implementation.
struct VisionServiceImpl {
    pipeline: RecognitionPipeline,
    state: Arc<RwLock<ServerState>>,
}

impl VisionServiceImpl {
    async fn check_running(&self) -> Result<(), Status> {
        let state = self.state.read().await;
        match *state {
            ServerState::Running => Ok(()),
            ServerState::ShuttingDown => Err(Status::unavailable("server is shutting down")),
            _ => Err(Status::internal("server is not running")),
        }
    }
}

#[tonic::async_trait]
impl VisionService for VisionServiceImpl {
    #[instrument(skip(self, request), fields(expected = %request.get_ref().expected_product_code))]
    async fn recognize(
        &self,
        request: Request<RecognizeRequest>,
    ) -> Result<Response<RecognizeResponse>, Status> {
        self.check_running().await?;

        let req = request.into_inner();
        debug!(image_bytes = req.image.len(), "recognition requested");

        let outcome = self
            .pipeline
            .recognize(&req.image, &req.expected_product_code)
            .await;
        debug!(success = outcome.success, message = %outcome.message, "recognition answered");

        Ok(Response::new(RecognizeResponse {
            success: outcome.success,
            message: outcome.message,
            product_code: outcome.product_code,
            trace_code: outcome.trace_code,
            confidence: outcome.confidence,
            image_path: outcome.image_path,
        }))
    }

    #[instrument(skip(self, request))]
    async fn scan_barcode(
        &self,
        request: Request<ScanRequest>,
    ) -> Result<Response<ScanResponse>, Status> {
        self.check_running().await?;

        let req = request.into_inner();
        debug!(image_bytes = req.image.len(), "scan requested");

        let outcome = self.pipeline.scan_barcode(&req.image).await;
        debug!(success = outcome.success, message = %outcome.message, "scan answered");

        Ok(Response::new(ScanResponse {
            success: outcome.success,
            message: outcome.message,
            trace_code: outcome.trace_code,
        }))
    }

    #[instrument(skip(self, request), fields(expected = %request.get_ref().expected_trace_code))]
    async fn verify(
        &self,
        request: Request<VerifyRequest>,
    ) -> Result<Response<VerifyResponse>, Status> {
        self.check_running().await?;

        let req = request.into_inner();
        debug!(image_bytes = req.image.len(), "verification requested");

        let outcome = self
            .pipeline
            .verify(&req.image, &req.expected_trace_code)
            .await;
        debug!(matched = outcome.matched, message = %outcome.message, "verification answered");

        Ok(Response::new(VerifyResponse {
            matched: outcome.matched,
            message: outcome.message,
            actual_trace_code: outcome.actual_trace_code,
            confidence: outcome.confidence,
            image_path: outcome.image_path,
        }))
    }
}
