//! Configuration listener: accepts framed documents and applies them.
//!
//! # Responsibilities
//! - Bind to the configured address
//! - Accept connections, bounded by `max_connections` via semaphore
//! - Read one frame per connection within `read_timeout_ms`
//! - Verify, decode and apply the document to the engine
//! - Stop on request, waiting for in-flight connections
//!
//! # Security
//! There is no authentication beyond the optional verify hook. Only run a
//! listener where every peer that can reach the port is trusted: any peer can
//! replace the process's logging configuration, including file targets.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::config::schema::{ConfigDocument, Extensions, ListenerConfig};
use crate::config::validation::is_destructive;
use crate::engine::{ApplyReport, EngineError, LoggingEngine};
use crate::lifecycle::shutdown::{Shutdown, ShutdownListener};
use crate::net::codec::{read_frame, ProtocolError};
use crate::net::connection::ConnectionTracker;
use crate::observability::metrics;

/// Checks, and may transform, a raw payload before it is decoded.
/// Returning `None` rejects the payload.
pub type VerifyFn = Arc<dyn Fn(&[u8]) -> Option<Vec<u8>> + Send + Sync>;

/// Error type for listener operations.
#[derive(Debug, thiserror::Error)]
pub enum ListenerError {
    /// Failed to bind to address.
    #[error("failed to bind config listener: {0}")]
    Bind(std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("payload rejected by verify hook")]
    Rejected,

    #[error("payload is not a valid configuration document: {0}")]
    Decode(serde_json::Error),

    #[error("destructive configuration refused by listener")]
    Destructive,

    #[error("engine refused configuration: {0}")]
    Engine(#[from] EngineError),

    #[error("listener did not stop within {0} ms")]
    StopTimeout(u64),
}

impl ListenerError {
    fn outcome(&self) -> &'static str {
        match self {
            ListenerError::Protocol(_) => "protocol_error",
            ListenerError::Rejected => "rejected",
            ListenerError::Decode(_) => "decode_error",
            ListenerError::Destructive => "destructive",
            ListenerError::Engine(_) => "engine_error",
            ListenerError::Bind(_) | ListenerError::StopTimeout(_) => "listener_error",
        }
    }
}

/// State shared by every connection of one listener.
struct ConnectionContext {
    engine: Arc<dyn LoggingEngine>,
    verify: Option<VerifyFn>,
    read_timeout: Duration,
    max_payload_bytes: usize,
    guard_destructive: bool,
}

/// Entry point for starting a listener.
pub struct ConfigListener;

impl ConfigListener {
    /// Bind and spawn the accept loop. Returns once the socket is bound.
    pub async fn start(
        engine: Arc<dyn LoggingEngine>,
        config: ListenerConfig,
        verify: Option<VerifyFn>,
    ) -> Result<ListenerHandle, ListenerError> {
        let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
            ListenerError::Bind(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
        })?;

        let listener = TcpListener::bind(addr).await.map_err(ListenerError::Bind)?;
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;

        tracing::warn!(
            "---SECURITY NOTICE--- Never listen for config changes on machines with untrusted users! \
             Any peer that can reach {} can replace the logging configuration.",
            local_addr
        );

        let context = Arc::new(ConnectionContext {
            engine,
            verify,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            max_payload_bytes: config.max_payload_bytes,
            guard_destructive: config.guard_destructive,
        });
        let limit = Arc::new(Semaphore::new(config.max_connections.max(1)));
        let shutdown = Shutdown::new();
        let task = tokio::spawn(accept_loop(listener, context, limit, shutdown.subscribe()));

        tracing::info!(
            address = %local_addr,
            max_connections = config.max_connections,
            "Listening for config changes"
        );

        Ok(ListenerHandle {
            local_addr,
            shutdown,
            task: Some(task),
            stop_timeout: Duration::from_millis(config.stop_timeout_ms),
        })
    }
}

/// Owner of a running listener.
///
/// Dropping the handle signals the listener to stop without waiting for it.
#[derive(Debug)]
pub struct ListenerHandle {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    task: Option<JoinHandle<()>>,
    stop_timeout: Duration,
}

impl ListenerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Close the socket and wait, bounded, for in-flight connections.
    pub async fn stop(mut self) -> Result<(), ListenerError> {
        self.shutdown.trigger();
        let Some(mut task) = self.task.take() else {
            return Ok(());
        };
        match tokio::time::timeout(self.stop_timeout, &mut task).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Config listener task failed");
                Ok(())
            }
            Err(_) => {
                task.abort();
                Err(ListenerError::StopTimeout(self.stop_timeout.as_millis() as u64))
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

async fn accept_loop(
    listener: TcpListener,
    context: Arc<ConnectionContext>,
    limit: Arc<Semaphore>,
    mut shutdown: ShutdownListener,
) {
    let tracker = ConnectionTracker::new();

    loop {
        // Acquire permit first (backpressure)
        let permit = tokio::select! {
            _ = shutdown.recv() => break,
            permit = limit.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let (stream, peer) = tokio::select! {
            _ = shutdown.recv() => break,
            accepted = listener.accept() => match accepted {
                Ok(accepted) => accepted,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept config connection");
                    continue;
                }
            },
        };

        metrics::record_connection();
        let guard = tracker.track();
        let context = Arc::clone(&context);
        tokio::spawn(async move {
            let connection_id = guard.id();
            match handle_connection(stream, &context).await {
                Ok((report, extensions)) => {
                    metrics::record_reconfiguration("applied");
                    tracing::info!(
                        connection_id = %connection_id,
                        peer_addr = %peer,
                        mode = report.mode.as_str(),
                        handlers = report.handlers,
                        loggers = report.loggers,
                        disabled = report.disabled,
                        "Applied logging configuration"
                    );
                    report.log_warnings(extensions.show_warnings);
                }
                Err(e) => {
                    metrics::record_reconfiguration(e.outcome());
                    tracing::warn!(
                        connection_id = %connection_id,
                        peer_addr = %peer,
                        error = %e,
                        "Dropped config connection"
                    );
                }
            }
            drop(permit);
            drop(guard);
        });
    }

    // Closes the socket before waiting on in-flight connections.
    drop(listener);
    tracker.wait_idle().await;
    tracing::info!("Config listener stopped");
}

/// Read, verify, decode and apply one document.
///
/// The extension keys come back with the report so the caller can honour
/// `show_warnings`.
async fn handle_connection(
    mut stream: TcpStream,
    context: &ConnectionContext,
) -> Result<(ApplyReport, Extensions), ListenerError> {
    let timeout_ms = context.read_timeout.as_millis() as u64;
    let payload = tokio::time::timeout(
        context.read_timeout,
        read_frame(&mut stream, context.max_payload_bytes),
    )
    .await
    .map_err(|_| ProtocolError::Timeout(timeout_ms))??;
    metrics::record_payload_bytes(payload.len());

    let payload = match &context.verify {
        Some(verify) => verify(&payload).ok_or(ListenerError::Rejected)?,
        None => payload,
    };

    let document: ConfigDocument = serde_json::from_slice(&payload).map_err(ListenerError::Decode)?;
    if context.guard_destructive && is_destructive(&document) {
        return Err(ListenerError::Destructive);
    }

    let (document, extensions) = document.split_extensions();
    let report = context.engine.apply(&document)?;
    Ok((report, extensions))
}
