//! Server lifecycle
//!
//! Owns the process-wide state: the model host and the shutdown signal.
//! The model is loaded exactly once before the transport starts; a stop
//! request drains in-flight streams for a bounded grace period, after which
//! remaining streams are force-closed and, failing that, their connections
//! are severed.

use crate::bridge::StreamingBridge;
use crate::connection;
use crate::generation::GenerationWorker;
use crate::grpc::InferenceService;
use crate::model::{ModelHost, ModelLoader};
use crate::template::ChatTemplate;
use brick_common::{BrickConfig, BrickError, Result, METRICS};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::time::timeout;
use tonic::transport::Server;
use tracing::{info, warn};

/// Time the transport gets to close after each escalation step
const FORCE_CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

/// Set-once, many-reader flag
#[derive(Debug, Default)]
pub struct ShutdownSignal {
    triggered: AtomicBool,
    notify: Notify,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the signal. Returns `true` only for the call that set it.
    pub fn trigger(&self) -> bool {
        let first = self
            .triggered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if first {
            self.notify.notify_waiters();
        }
        first
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::Acquire)
    }

    /// Wait until the signal is set; returns immediately if it already is
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a concurrent trigger is not missed
            notified.as_mut().enable();

            if self.is_triggered() {
                return;
            }
            notified.await;
        }
    }
}

/// Process-wide server state and the serve loop
pub struct ServerLifecycle {
    /// Server configuration
    config: BrickConfig,

    /// Model owner shared with every worker
    host: Arc<ModelHost>,

    /// Set by `StopServer` or an OS signal
    shutdown: Arc<ShutdownSignal>,

    /// Set when the grace period runs out
    terminate: Arc<ShutdownSignal>,

    /// Set when terminated streams still hold their connections open
    disconnect: Arc<ShutdownSignal>,
}

impl ServerLifecycle {
    pub fn new(config: BrickConfig, loader: Arc<dyn ModelLoader>) -> Self {
        let host = Arc::new(ModelHost::new(config.model.model_id.clone(), loader));

        Self {
            config,
            host,
            shutdown: Arc::new(ShutdownSignal::new()),
            terminate: Arc::new(ShutdownSignal::new()),
            disconnect: Arc::new(ShutdownSignal::new()),
        }
    }

    pub fn host(&self) -> &Arc<ModelHost> {
        &self.host
    }

    /// Handle for triggering shutdown from outside the RPC surface
    pub fn shutdown_signal(&self) -> Arc<ShutdownSignal> {
        self.shutdown.clone()
    }

    /// Load the model exactly once; a failure is fatal for startup
    pub async fn load_model_once(&self) -> Result<()> {
        self.host.load_model_once().await
    }

    /// Build the RPC service wired to this lifecycle's state
    pub fn service(&self) -> InferenceService {
        let worker = GenerationWorker::new(
            self.host.clone(),
            ChatTemplate::new(self.config.model.system_prompt.clone()),
        );
        let capacity = self.config.generation.channel_capacity;

        InferenceService::new(
            StreamingBridge::new(worker, capacity),
            self.config.generation.max_tokens_limit,
            capacity,
            self.shutdown.clone(),
            self.terminate.clone(),
        )
    }

    /// Bind the configured address and serve until shutdown completes
    pub async fn serve(&self) -> Result<()> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr).await?;
        self.serve_with_listener(listener).await
    }

    /// Serve on an already-bound listener until shutdown completes
    pub async fn serve_with_listener(&self, listener: TcpListener) -> Result<()> {
        self.load_model_once().await?;

        let addr = listener.local_addr()?;
        let shutdown = self.shutdown.clone();
        let mut transport = tokio::spawn(
            Server::builder()
                .add_service(self.service().into_server())
                .serve_with_incoming_shutdown(
                    connection::incoming(listener, self.disconnect.clone()),
                    async move { shutdown.wait().await },
                ),
        );

        info!("Server started on {}", addr);

        tokio::select! {
            _ = self.shutdown.wait() => {}
            result = &mut transport => {
                // Transport exited without a stop request
                return join_transport(result);
            }
        }

        let grace = self.config.grace_period();
        info!("Stopping server, grace period {:?}", grace);

        let stopped = match timeout(grace, &mut transport).await {
            Ok(result) => Some(result),
            Err(_) => {
                warn!(
                    "Grace period elapsed with {} streams open, terminating them",
                    METRICS.streams.active_streams.get()
                );
                self.terminate.trigger();

                match timeout(FORCE_CLOSE_TIMEOUT, &mut transport).await {
                    Ok(result) => Some(result),
                    Err(_) => {
                        // Clients that stopped reading keep undelivered data queued
                        warn!("Connections still open after {:?}, closing them", FORCE_CLOSE_TIMEOUT);
                        self.disconnect.trigger();
                        timeout(FORCE_CLOSE_TIMEOUT, &mut transport).await.ok()
                    }
                }
            }
        };

        match stopped {
            Some(result) => join_transport(result)?,
            None => {
                warn!("Transport did not stop, aborting");
                transport.abort();
                let _ = transport.await;
            }
        }

        info!(
            "Server stopped. streams: completed={} failed={} cancelled={} rejected={}",
            METRICS.streams.streams_completed.get(),
            METRICS.streams.streams_failed.get(),
            METRICS.streams.streams_cancelled.get(),
            METRICS.streams.requests_rejected.get()
        );
        Ok(())
    }
}

fn join_transport(
    result: std::result::Result<
        std::result::Result<(), tonic::transport::Error>,
        tokio::task::JoinError,
    >,
) -> Result<()> {
    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(BrickError::GrpcTransport(e)),
        Err(e) => Err(BrickError::internal(format!("transport task failed: {}", e))),
    }
}
