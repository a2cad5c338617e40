//! Isolated parser host: tree-sitter parsing on a dedicated OS thread, reached only
//! through correlated request/response messages.

pub mod protocol;
pub mod worker;

pub use protocol::{RemoteFailure, Request, Response};
pub use worker::{HostBackend, TreeSitterBackend};

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, mpsc};
use std::time::Duration;

use tokio::sync::oneshot;

use crate::error::HostError;
use crate::parser::signatures::{InterfaceMember, Signature, SignatureDiff};
use crate::parser::{AnalyzerRegistry, FileAnalysis};
use protocol::{RequestEnvelope, ResponseEnvelope};

type Waiter = oneshot::Sender<Result<Response, HostError>>;
type BackendFactory = Arc<dyn Fn() -> Box<dyn HostBackend> + Send + Sync>;

#[derive(Default)]
struct PendingState {
    waiters: HashMap<u64, Waiter>,
    /// Set by the dispatcher once the worker is gone; no new waiter may be added.
    closed: bool,
}

type Pending = Arc<Mutex<PendingState>>;

fn lock_pending(pending: &Pending) -> MutexGuard<'_, PendingState> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One live worker: the request side of its channel plus its pending table.
#[derive(Clone)]
struct Connection {
    requests: mpsc::Sender<RequestEnvelope>,
    pending: Pending,
}

/// Client of the parser host worker.
///
/// The worker thread is started lazily on the first request and again after it
/// dies. Must be used from within a tokio runtime: each worker gets a dispatcher task
/// that routes responses to their waiters.
pub struct ParserHost {
    factory: BackendFactory,
    connection: Mutex<Option<Connection>>,
    next_id: AtomicU64,
    spawned: AtomicUsize,
}

impl Default for ParserHost {
    fn default() -> Self {
        Self::new(AnalyzerRegistry::with_defaults())
    }
}

impl ParserHost {
    /// Host backed by tree-sitter analyzers from `registry`.
    pub fn new(registry: AnalyzerRegistry) -> Self {
        Self::with_backend(move || -> Box<dyn HostBackend> {
            Box::new(TreeSitterBackend::new(registry.clone()))
        })
    }

    /// Host whose workers run the backend produced by `factory`.
    pub fn with_backend<F>(factory: F) -> Self
    where
        F: Fn() -> Box<dyn HostBackend> + Send + Sync + 'static,
    {
        Self {
            factory: Arc::new(factory),
            connection: Mutex::new(None),
            next_id: AtomicU64::new(1),
            spawned: AtomicUsize::new(0),
        }
    }

    /// Number of times a worker was started after a previous one died.
    pub fn restarts(&self) -> usize {
        self.spawned.load(Ordering::Relaxed).saturating_sub(1)
    }

    /// Whether a worker is currently running.
    pub fn is_alive(&self) -> bool {
        self.connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
            .is_some_and(|conn| !lock_pending(&conn.pending).closed)
    }

    fn spawn(&self) -> Result<Connection, HostError> {
        let (request_tx, request_rx) = mpsc::channel::<RequestEnvelope>();
        let (response_tx, mut response_rx) = tokio::sync::mpsc::unbounded_channel();
        let backend = (self.factory)();

        std::thread::Builder::new()
            .name("depgraph-parser-host".to_owned())
            .spawn(move || worker::run(backend, request_rx, response_tx))
            .map_err(|e| HostError::Unavailable(format!("failed to start worker: {e}")))?;

        let pending: Pending = Arc::default();
        let dispatcher_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(ResponseEnvelope { id, result }) = response_rx.recv().await {
                let waiter = lock_pending(&dispatcher_pending).waiters.remove(&id);
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(result.map_err(HostError::from));
                    }
                    None => tracing::debug!(id, "discarding response to an abandoned request"),
                }
            }

            let mut state = lock_pending(&dispatcher_pending);
            state.closed = true;
            let orphaned = state.waiters.len();
            for (_, tx) in state.waiters.drain() {
                let _ = tx.send(Err(HostError::Crashed));
            }
            if orphaned > 0 {
                tracing::warn!(orphaned, "parser host worker died with requests pending");
            } else {
                tracing::debug!("parser host worker exited");
            }
        });

        let count = self.spawned.fetch_add(1, Ordering::Relaxed);
        if count > 0 {
            tracing::info!(restarts = count, "parser host worker restarted");
        }
        Ok(Connection {
            requests: request_tx,
            pending,
        })
    }

    /// The live connection, starting a worker when there is none or the last one died.
    fn connection(&self) -> Result<Connection, HostError> {
        let mut slot = self
            .connection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(conn) = slot.as_ref()
            && !lock_pending(&conn.pending).closed
        {
            return Ok(conn.clone());
        }
        let conn = self.spawn()?;
        *slot = Some(conn.clone());
        Ok(conn)
    }

    fn submit(
        &self,
        request: Request,
    ) -> Result<(u64, oneshot::Receiver<Result<Response, HostError>>, Pending), HostError> {
        let conn = self.connection()?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut state = lock_pending(&conn.pending);
            if state.closed {
                return Err(HostError::Crashed);
            }
            state.waiters.insert(id, tx);
        }
        if conn.requests.send(RequestEnvelope { id, request }).is_err() {
            lock_pending(&conn.pending).waiters.remove(&id);
            return Err(HostError::Crashed);
        }
        Ok((id, rx, conn.pending))
    }

    /// Send `request` and wait for its response.
    pub async fn call(&self, request: Request) -> Result<Response, HostError> {
        let (_, rx, _) = self.submit(request)?;
        rx.await.unwrap_or(Err(HostError::Crashed))
    }

    /// Like [`ParserHost::call`], failing with `HostError::Timeout` after `timeout`. The
    /// worker is not interrupted; its late response is discarded.
    pub async fn call_with_timeout(
        &self,
        request: Request,
        timeout: Duration,
    ) -> Result<Response, HostError> {
        let (id, rx, pending) = self.submit(request)?;
        match tokio::time::timeout(timeout, rx).await {
            Ok(result) => result.unwrap_or(Err(HostError::Crashed)),
            Err(_) => {
                lock_pending(&pending).waiters.remove(&id);
                Err(HostError::Timeout(timeout))
            }
        }
    }

    async fn call_maybe_timeout(
        &self,
        request: Request,
        timeout: Option<Duration>,
    ) -> Result<Response, HostError> {
        match timeout {
            Some(t) => self.call_with_timeout(request, t).await,
            None => self.call(request).await,
        }
    }

    pub async fn analyze_file(
        &self,
        path: &Path,
        text: &str,
        timeout: Option<Duration>,
    ) -> Result<FileAnalysis, HostError> {
        let request = Request::AnalyzeFile {
            path: path.to_path_buf(),
            text: text.to_owned(),
        };
        match self.call_maybe_timeout(request, timeout).await? {
            Response::Analysis(analysis) => Ok(analysis),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn extract_signatures(
        &self,
        path: &Path,
        text: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<Signature>, HostError> {
        let request = Request::ExtractSignatures {
            path: path.to_path_buf(),
            text: text.to_owned(),
        };
        match self.call_maybe_timeout(request, timeout).await? {
            Response::Signatures(signatures) => Ok(signatures),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn extract_interface_members(
        &self,
        path: &Path,
        text: &str,
        timeout: Option<Duration>,
    ) -> Result<Vec<InterfaceMember>, HostError> {
        let request = Request::ExtractInterfaceMembers {
            path: path.to_path_buf(),
            text: text.to_owned(),
        };
        match self.call_maybe_timeout(request, timeout).await? {
            Response::InterfaceMembers(members) => Ok(members),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn compare_signatures(
        &self,
        old: Vec<Signature>,
        new: Vec<Signature>,
    ) -> Result<Vec<SignatureDiff>, HostError> {
        match self.call(Request::CompareSignatures { old, new }).await? {
            Response::SignatureDiffs(diffs) => Ok(diffs),
            other => Err(unexpected(&other)),
        }
    }

    /// Drop the worker's parsers. Returns the number of files parsed since the last reset.
    pub async fn reset(&self) -> Result<usize, HostError> {
        match self.call(Request::Reset).await? {
            Response::Reset { parsed_since_reset } => Ok(parsed_since_reset),
            other => Err(unexpected(&other)),
        }
    }
}

fn unexpected(response: &Response) -> HostError {
    HostError::Remote {
        message: "unexpected response from parser host".to_owned(),
        detail: Some(format!("{response:?}").chars().take(120).collect()),
    }
}

impl std::fmt::Debug for ParserHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParserHost")
            .field("alive", &self.is_alive())
            .field("restarts", &self.restarts())
            .finish_non_exhaustive()
    }
}
