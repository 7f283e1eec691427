//! Observer connections and the shared client registry.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{LogServerError, Result};

/// Lines queued per client before it is considered stalled and dropped.
pub(crate) const CLIENT_QUEUE_LEN: usize = 256;

/// Upper bound on a single socket write before the client is dropped.
const WRITE_TIMEOUT: Duration = Duration::from_secs(5);

pub(crate) type ClientId = u64;

/// One registered observer: its line queue and writer task.
///
/// Dropping the entry closes the queue, which ends the writer task and
/// releases the socket exactly once.
pub(crate) struct Client {
    tx: mpsc::Sender<Arc<str>>,
    task: Option<JoinHandle<()>>,
}

impl Client {
    /// Close the queue and wait for the writer task to finish, so that no
    /// bytes reach the observer after this returns.
    pub(crate) async fn close(self) {
        let Client { tx, task } = self;
        drop(tx);
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

/// Live observers, shared between the accept loop and every logging thread.
///
/// The mutex is a plain std mutex: nothing awaits while holding it, and
/// broadcast only performs non-blocking sends, so application threads
/// without a runtime can fan out directly.
pub(crate) struct ClientRegistry {
    inner: Mutex<Inner>,
}

struct Inner {
    clients: HashMap<ClientId, Client>,
    next_id: ClientId,
    closed: bool,
}

impl ClientRegistry {
    pub(crate) fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                clients: HashMap::new(),
                next_id: 1,
                closed: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().clients.len()
    }

    /// Register a new client queue. Fails once the registry is shut down.
    pub(crate) fn add(&self, tx: mpsc::Sender<Arc<str>>) -> Result<ClientId> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(LogServerError::ServerClosed);
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.clients.insert(id, Client { tx, task: None });
        Ok(id)
    }

    /// Attach the writer task handle for a client added moments before.
    /// If the client was already pruned the task winds down on its own
    /// once its queue closes, so the handle is simply dropped.
    pub(crate) fn attach(&self, id: ClientId, task: JoinHandle<()>) {
        if let Some(client) = self.lock().clients.get_mut(&id) {
            client.task = Some(task);
        }
    }

    /// Idempotent removal; safe concurrently with add and broadcast.
    pub(crate) fn remove(&self, id: ClientId) {
        self.lock().clients.remove(&id);
    }

    /// Deliver one rendered line to every registered client.
    ///
    /// Best effort: a client whose queue is full or whose writer has exited
    /// is deregistered in the same pass. Never blocks and never fails.
    pub(crate) fn broadcast(&self, line: &Arc<str>) {
        let mut inner = self.lock();
        let mut dead = Vec::new();
        for (id, client) in &inner.clients {
            if client.tx.try_send(Arc::clone(line)).is_err() {
                dead.push(*id);
            }
        }
        for id in dead {
            inner.clients.remove(&id);
            tracing::debug!(client = id, "dropped unresponsive log client");
        }
    }

    /// Close the registry and take every remaining client for shutdown.
    pub(crate) fn shutdown(&self) -> Vec<Client> {
        let mut inner = self.lock();
        inner.closed = true;
        inner.clients.drain().map(|(_, client)| client).collect()
    }

    /// Allow registrations again after a shutdown (server restart).
    pub(crate) fn reopen(&self) {
        self.lock().closed = false;
    }
}

/// Per-client task: drains the line queue to the socket and watches the
/// read side for disconnect. Observers have nothing to say after the
/// handshake, so any inbound bytes, EOF, or error all deregister the
/// client.
pub(crate) async fn client_task(
    mut write_half: OwnedWriteHalf,
    mut read_half: OwnedReadHalf,
    mut rx: mpsc::Receiver<Arc<str>>,
    registry: Arc<ClientRegistry>,
    id: ClientId,
) {
    let mut scratch = [0u8; 64];
    loop {
        tokio::select! {
            line = rx.recv() => {
                let Some(line) = line else { break };
                let write = tokio::time::timeout(WRITE_TIMEOUT, write_half.write_all(line.as_bytes()));
                if !matches!(write.await, Ok(Ok(()))) {
                    break;
                }
            }
            _ = read_half.read(&mut scratch) => break,
        }
    }
    registry.remove(id);
}
