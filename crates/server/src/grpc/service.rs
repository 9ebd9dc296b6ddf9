//! `llm.LLMService` implementation
//!
//! Each `GenerateStream` call walks Idle → Streaming → {Completed, Failed,
//! Cancelled}. Requests are validated before any bridge is opened; the
//! stream itself is forwarded by a dedicated task so that client
//! cancellation and the terminate signal are noticed promptly.

use crate::bridge::{StreamHandle, StreamingBridge};
use crate::generation::StreamEvent;
use crate::lifecycle::ShutdownSignal;
use brick_common::{BrickError, Result, METRICS};
use brick_proto::{GenerateRequest, LlmService, LlmServiceServer, StopRequest, StopResponse, TokenChunk};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Request, Response, Status};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Acknowledgement returned by `StopServer`
pub const STOP_ACK: &str = "Server stopping...";

/// Per-call state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    Streaming,
    Completed,
    Failed,
    Cancelled,
}

/// gRPC front of the streaming bridge
pub struct InferenceService {
    /// Opens one handle per call
    bridge: StreamingBridge,

    /// Requests asking for more tokens are clamped to this
    max_tokens_limit: u32,

    /// Outbound buffer between the forwarding task and the transport
    outbound_capacity: usize,

    /// Set by `StopServer`
    shutdown: Arc<ShutdownSignal>,

    /// Set when the grace period expires; force-closes open streams
    terminate: Arc<ShutdownSignal>,
}

impl InferenceService {
    pub fn new(
        bridge: StreamingBridge,
        max_tokens_limit: u32,
        outbound_capacity: usize,
        shutdown: Arc<ShutdownSignal>,
        terminate: Arc<ShutdownSignal>,
    ) -> Self {
        Self {
            bridge,
            max_tokens_limit,
            outbound_capacity: outbound_capacity.max(1),
            shutdown,
            terminate,
        }
    }

    /// Wrap into the generated tonic server
    pub fn into_server(self) -> LlmServiceServer<Self> {
        LlmServiceServer::new(self)
    }

    /// Check a request and return the effective token budget
    fn validate(&self, request: &GenerateRequest) -> Result<u32> {
        if request.max_tokens <= 0 {
            return Err(BrickError::invalid_request(format!(
                "max_tokens must be positive, got {}",
                request.max_tokens
            )));
        }

        let requested = request.max_tokens as u32;
        if requested > self.max_tokens_limit {
            debug!(
                "Clamping max_tokens from {} to {}",
                requested, self.max_tokens_limit
            );
        }
        Ok(requested.min(self.max_tokens_limit))
    }

    fn open(&self, request: &GenerateRequest) -> Result<StreamHandle> {
        let max_tokens = self.validate(request)?;
        self.bridge.open(&request.prompt, max_tokens)
    }
}

#[tonic::async_trait]
impl LlmService for InferenceService {
    type GenerateStreamStream = ReceiverStream<std::result::Result<TokenChunk, Status>>;

    async fn generate_stream(
        &self,
        request: Request<GenerateRequest>,
    ) -> std::result::Result<Response<Self::GenerateStreamStream>, Status> {
        METRICS.streams.requests_total.inc();
        let request = request.into_inner();

        let handle = match self.open(&request) {
            Ok(handle) => handle,
            Err(e) => {
                METRICS.streams.requests_rejected.inc();
                warn!("Rejected GenerateStream request: {}", e);
                return Err(e.to_status());
            }
        };

        let session = StreamSession::start();
        let span = info_span!("generate_stream", request_id = %session.request_id);
        let (tx, rx) = mpsc::channel(self.outbound_capacity);

        tokio::spawn(forward(session, handle, tx, self.terminate.clone()).instrument(span));

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn stop_server(
        &self,
        request: Request<StopRequest>,
    ) -> std::result::Result<Response<StopResponse>, Status> {
        let reason = request.into_inner().reason;
        METRICS.lifecycle.stop_requests.inc();
        info!("Stop requested: {}", reason);

        if self.shutdown.trigger() {
            info!("Shutdown initiated");
        } else {
            debug!("Shutdown already in progress");
        }

        Ok(Response::new(StopResponse {
            message: STOP_ACK.to_string(),
        }))
    }
}

/// Relay handle events to the transport until a terminal state
async fn forward(
    mut session: StreamSession,
    mut handle: StreamHandle,
    tx: mpsc::Sender<std::result::Result<TokenChunk, Status>>,
    terminate: Arc<ShutdownSignal>,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = tx.closed() => {
                session.finish(StreamState::Cancelled);
                return;
            }
            _ = terminate.wait() => {
                terminated(&mut session, &tx);
                return;
            }
            event = handle.next() => event,
        };

        match event {
            StreamEvent::Fragment(token) => match deliver(&tx, Ok(TokenChunk { token }), &terminate).await {
                Delivery::Sent => {
                    session.fragments += 1;
                    METRICS.streams.fragments_total.inc();
                }
                Delivery::Closed => {
                    session.finish(StreamState::Cancelled);
                    return;
                }
                Delivery::Terminated => {
                    terminated(&mut session, &tx);
                    return;
                }
            },
            StreamEvent::End => {
                session.finish(StreamState::Completed);
                return;
            }
            StreamEvent::Error(detail) => {
                warn!("Generation failed mid-stream: {}", detail);
                let status = BrickError::generation(detail).to_status();
                if let Delivery::Terminated = deliver(&tx, Err(status), &terminate).await {
                    terminated(&mut session, &tx);
                } else {
                    session.finish(StreamState::Failed);
                }
                return;
            }
        }
    }
}

/// Outcome of handing one item to the transport
enum Delivery {
    Sent,
    Closed,
    Terminated,
}

/// Wait for outbound capacity, giving up when the terminate signal is set
async fn deliver(
    tx: &mpsc::Sender<std::result::Result<TokenChunk, Status>>,
    item: std::result::Result<TokenChunk, Status>,
    terminate: &ShutdownSignal,
) -> Delivery {
    tokio::select! {
        biased;
        _ = terminate.wait() => Delivery::Terminated,
        permit = tx.reserve() => match permit {
            Ok(permit) => {
                permit.send(item);
                Delivery::Sent
            }
            Err(_) => Delivery::Closed,
        },
    }
}

/// Close a stream on terminate without waiting on a slow client
fn terminated(
    session: &mut StreamSession,
    tx: &mpsc::Sender<std::result::Result<TokenChunk, Status>>,
) {
    if tx.try_send(Err(Status::unavailable("server shutting down"))).is_err() {
        debug!("Outbound buffer full, closing stream without status");
    }
    session.finish(StreamState::Cancelled);
}

/// Bookkeeping for one active call
struct StreamSession {
    request_id: Uuid,
    state: StreamState,
    started: Instant,
    fragments: u64,
}

impl StreamSession {
    fn start() -> Self {
        METRICS.streams.active_streams.inc();
        let session = Self {
            request_id: Uuid::new_v4(),
            state: StreamState::Streaming,
            started: Instant::now(),
            fragments: 0,
        };
        debug!("Stream {} opened", session.request_id);
        session
    }

    fn finish(&mut self, state: StreamState) {
        self.state = state;
        let elapsed = self.started.elapsed();

        match state {
            StreamState::Completed => METRICS.streams.streams_completed.inc(),
            StreamState::Failed => METRICS.streams.streams_failed.inc(),
            StreamState::Cancelled => METRICS.streams.streams_cancelled.inc(),
            StreamState::Idle | StreamState::Streaming => {}
        }
        METRICS.streams.stream_duration.observe(elapsed.as_secs_f64());

        info!(
            "Stream {:?}: {} fragments in {:?}",
            state, self.fragments, elapsed
        );
    }
}

impl Drop for StreamSession {
    fn drop(&mut self) {
        METRICS.streams.active_streams.dec();
        if self.state == StreamState::Streaming {
            // Forwarding task was torn down without reaching a terminal state
            self.finish(StreamState::Cancelled);
        }
    }
}
