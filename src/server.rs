//! The streaming log server: lifecycle, accept loop, and the publish path.

use std::io::Write;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;

use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::client::{client_task, ClientRegistry, CLIENT_QUEUE_LEN};
use crate::error::{LogServerError, Result};
use crate::format;
use crate::severity::{Severity, SeverityFilter};

/// Most observers allowed at once; extras are refused in the handshake.
pub const MAX_CLIENTS: usize = 32;

/// Handshake sent to an accepted observer before any log line.
const HANDSHAKE_OK: &[u8] = b"0 OK\n";
/// Handshake refusing an observer when the registry is full.
const HANDSHAKE_FULL: &[u8] = b"1 too many connections\n";

/// Streaming log server and local logging front end.
///
/// Logging works in any lifecycle state and from any thread; only delivery
/// to remote observers requires [`start`](Self::start) to have succeeded.
/// No failure among observers ever reaches the logging caller.
pub struct LogServer {
    filter: SeverityFilter,
    registry: Arc<ClientRegistry>,
    port: AtomicU16,
    lifecycle: tokio::sync::Mutex<Lifecycle>,
}

#[derive(Default)]
struct Lifecycle {
    accept_task: Option<JoinHandle<()>>,
    shutdown: Option<watch::Sender<bool>>,
}

impl LogServer {
    pub fn new() -> Self {
        Self {
            filter: SeverityFilter::default(),
            registry: Arc::new(ClientRegistry::new()),
            port: AtomicU16::new(0),
            lifecycle: tokio::sync::Mutex::new(Lifecycle::default()),
        }
    }

    /// Start the network server. No-op if already running.
    ///
    /// Never fails: when the bind does not succeed the failure is reported
    /// to stderr once, [`port`](Self::port) stays 0, and local logging
    /// continues unaffected.
    pub async fn start(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        if lifecycle.accept_task.is_some() {
            return;
        }

        let (listener, port) = match Self::bind().await {
            Ok(bound) => bound,
            Err(e) => {
                error!("failed to start log server: {}", e);
                return;
            }
        };

        self.registry.reopen();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(accept_loop(
            listener,
            Arc::clone(&self.registry),
            shutdown_rx,
        ));

        self.port.store(port, Ordering::Release);
        lifecycle.accept_task = Some(task);
        lifecycle.shutdown = Some(shutdown_tx);
        info!("log server listening on port {}", port);
    }

    /// Stop the network server and disconnect every observer. No-op if not
    /// running.
    ///
    /// When this returns the accept loop and all per-client tasks have
    /// exited; no further bytes reach any observer.
    pub async fn stop(&self) {
        let mut lifecycle = self.lifecycle.lock().await;
        let Some(task) = lifecycle.accept_task.take() else {
            return;
        };

        self.port.store(0, Ordering::Release);
        if let Some(shutdown) = lifecycle.shutdown.take() {
            let _ = shutdown.send(true);
        }
        let _ = task.await;

        for client in self.registry.shutdown() {
            client.close().await;
        }
        info!("log server stopped");
    }

    /// Bound port, or 0 when the server is not running.
    pub fn port(&self) -> u16 {
        self.port.load(Ordering::Acquire)
    }

    /// Replace the minimum severity. Valid in any lifecycle state and
    /// affects local as well as streamed emission.
    pub fn set_level(&self, severity: Severity) {
        self.filter.set_level(severity);
    }

    /// Log one message: filter, render once, emit locally, fan out.
    ///
    /// Callable from any thread. Never blocks on observers and never
    /// surfaces their failures.
    pub fn log(&self, severity: Severity, domain: &str, message: &str) {
        if !self.filter.should_log(severity) {
            return;
        }
        let line: Arc<str> = format::render(severity, domain, message).into();
        let _ = std::io::stderr().write_all(line.as_bytes());
        self.registry.broadcast(&line);
    }

    pub fn debug(&self, domain: &str, message: &str) {
        self.log(Severity::Debug, domain, message);
    }

    pub fn info(&self, domain: &str, message: &str) {
        self.log(Severity::Info, domain, message);
    }

    pub fn warning(&self, domain: &str, message: &str) {
        self.log(Severity::Warning, domain, message);
    }

    pub fn error(&self, domain: &str, message: &str) {
        self.log(Severity::Error, domain, message);
    }

    pub fn fatal(&self, domain: &str, message: &str) {
        self.log(Severity::Fatal, domain, message);
    }

    async fn bind() -> std::io::Result<(TcpListener, u16)> {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let port = listener.local_addr()?.port();
        Ok((listener, port))
    }
}

impl Default for LogServer {
    fn default() -> Self {
        Self::new()
    }
}

async fn accept_loop(
    listener: TcpListener,
    registry: Arc<ClientRegistry>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    if let Err(e) = handshake(stream, &registry).await {
                        warn!("log client {} rejected: {}", addr, e);
                    }
                }
                Err(e) => warn!("failed to accept log client: {}", e),
            },
        }
    }
    info!("log server accept loop stopped");
}

/// Greet an accepted connection and register it as an observer.
///
/// The status line goes out before anything else. A connection that cannot
/// be greeted, or that arrives with the registry full or shut down, is
/// dropped without registration; other observers are unaffected.
async fn handshake(mut stream: TcpStream, registry: &Arc<ClientRegistry>) -> Result<()> {
    if registry.len() >= MAX_CLIENTS {
        let _ = stream.write_all(HANDSHAKE_FULL).await;
        return Err(LogServerError::TooManyConnections);
    }
    stream.write_all(HANDSHAKE_OK).await?;

    let (tx, rx) = mpsc::channel(CLIENT_QUEUE_LEN);
    let id = registry.add(tx)?;
    let (read_half, write_half) = stream.into_split();
    let task = tokio::spawn(client_task(
        write_half,
        read_half,
        rx,
        Arc::clone(registry),
        id,
    ));
    registry.attach(id, task);
    info!("log client {} connected ({} total)", id, registry.len());
    Ok(())
}
