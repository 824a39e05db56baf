//! One client session bound to one peer process.
//!
//! A connection owns the child process, the export table, the pending-call
//! registry and the id counter. A single reader task decodes the peer's
//! stdout line by line and dispatches each message; a second task drains
//! stderr into the diagnostics buffer. Everything else runs on caller
//! tasks.
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tokio::process::Child;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::rpc::diagnostics::{self, Diagnostics};
use crate::rpc::error::RpcError;
use crate::rpc::exports::ExportTable;
use crate::rpc::process::{self, PeerCommand};
use crate::rpc::registry::{OneShotCallback, PendingCalls, StreamCallback, StreamItem};
use crate::rpc::transport::{LineSink, LineSource};
use crate::rpc::wire::{self, Inbound};

pub struct Connection {
    peer: Option<PeerCommand>,
    inner: Arc<Inner>,
}

struct Inner {
    exports: ExportTable,
    pending: PendingCalls,
    diagnostics: Arc<Diagnostics>,
    writer: tokio::sync::Mutex<Option<Box<dyn LineSink>>>,
    child: Mutex<Option<Child>>,
    next_id: AtomicU64,
    running: AtomicBool,
    closing: AtomicBool,
}

impl Connection {
    /// Create a connection in the not-started state. Nothing is spawned
    /// until [`start`](Self::start).
    pub fn new(peer: PeerCommand, exports: ExportTable) -> Self {
        Connection {
            peer: Some(peer),
            inner: Arc::new(Inner::new(exports, None, false)),
        }
    }

    /// Adopt an already-connected stream pair instead of spawning a peer.
    /// The connection is running immediately; there is no process handle
    /// and no stderr to collect.
    pub fn attach<R, W>(reader: R, writer: W, exports: ExportTable) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let inner = Arc::new(Inner::new(exports, Some(Box::new(writer)), true));
        tokio::spawn(read_loop(inner.clone(), BufReader::new(reader)));
        Connection { peer: None, inner }
    }

    /// Spawn the peer and transition to running. On failure the connection
    /// stays not-started. Finishes by advertising the exported method
    /// names with a fire-and-forget `init` call; the peer may ignore it.
    pub async fn start(&self) -> anyhow::Result<()> {
        if self.is_running() {
            anyhow::bail!("connection already started");
        }
        let peer = self
            .peer
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("connection has no peer command"))?;
        let spawned = process::spawn(peer)?;

        *self.inner.writer.lock().await = Some(Box::new(spawned.stdin));
        *self.inner.child_lock() = Some(spawned.child);
        self.inner.running.store(true, Ordering::SeqCst);

        tokio::spawn(diagnostics::drain(
            spawned.stderr,
            self.inner.diagnostics.clone(),
        ));
        tokio::spawn(read_loop(self.inner.clone(), spawned.stdout));

        self.notify("init", Some(json!(self.inner.exports.method_names())))
            .await;
        Ok(())
    }

    /// True while the peer process (or attached stream) is alive.
    pub fn is_running(&self) -> bool {
        if !self.inner.running.load(Ordering::SeqCst) {
            return false;
        }
        let mut child = self.inner.child_lock();
        match child.as_mut() {
            Some(child) => matches!(child.try_wait(), Ok(None)),
            // Attached transport: reader end-of-stream clears `running`.
            None => true,
        }
    }

    /// Issue a one-shot call. Pass `None` to fire and forget. On a
    /// connection that is not running the callback is invoked
    /// synchronously with [`RpcError::NotRunning`]; no id is consumed and
    /// nothing is written.
    pub async fn call(
        &self,
        method: &str,
        params: Option<Value>,
        callback: Option<OneShotCallback>,
    ) {
        if !self.is_running() {
            if let Some(callback) = callback {
                callback(Some(RpcError::NotRunning), None);
            }
            return;
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        if let Some(callback) = callback {
            self.inner.pending.register_oneshot(id, callback);
        }
        let request = wire::Request::new(id, method, params, false);
        self.inner.write_message(&request).await;
    }

    /// Issue a streaming call. The callback fires for every partial
    /// response and one final time with `done == true`.
    pub async fn call_streaming(
        &self,
        method: &str,
        params: Option<Value>,
        mut callback: StreamCallback,
    ) {
        if !self.is_running() {
            callback(
                Some(RpcError::NotRunning),
                StreamItem {
                    value: Value::Null,
                    done: true,
                },
            );
            return;
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        self.inner.pending.register_stream(id, callback);
        let request = wire::Request::new(id, method, params, true);
        self.inner.write_message(&request).await;
    }

    /// Fire-and-forget call: consumes an id, expects no response.
    pub async fn notify(&self, method: &str, params: Option<Value>) {
        self.call(method, params, None).await;
    }

    /// One-shot call as a future. Peer errors and process failures arrive
    /// through the returned `Result`.
    pub async fn request(&self, method: &str, params: Option<Value>) -> Result<Value, RpcError> {
        let (tx, rx) = oneshot::channel();
        self.call(
            method,
            params,
            Some(Box::new(move |error, result| {
                let _ = tx.send(match error {
                    Some(error) => Err(error),
                    None => Ok(result.unwrap_or(Value::Null)),
                });
            })),
        )
        .await;
        rx.await.unwrap_or(Err(RpcError::Closed))
    }

    /// Number of calls still awaiting a response.
    pub fn pending_calls(&self) -> usize {
        self.inner.pending.len()
    }

    /// Shut the connection down. Idempotent. The closing flag is set
    /// before the process is touched so the reader does not treat the
    /// resulting end-of-stream as a failure.
    pub async fn stop(&self) {
        self.inner.closing.store(true, Ordering::SeqCst);
        self.inner.running.store(false, Ordering::SeqCst);

        let child = self.inner.child_lock().take();
        if let Some(child) = child {
            process::terminate(child).await;
        }
        // Dropping the writer closes the peer's stdin.
        self.inner.writer.lock().await.take();
    }
}

impl Inner {
    fn new(exports: ExportTable, writer: Option<Box<dyn LineSink>>, running: bool) -> Self {
        Inner {
            exports,
            pending: PendingCalls::new(),
            diagnostics: Arc::new(Diagnostics::new()),
            writer: tokio::sync::Mutex::new(writer),
            child: Mutex::new(None),
            next_id: AtomicU64::new(1),
            running: AtomicBool::new(running),
            closing: AtomicBool::new(false),
        }
    }

    fn child_lock(&self) -> MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Encode and write one message under the shared writer lock, so
    /// concurrent callers never interleave partial lines. Failures are
    /// logged and swallowed; the exit cascade settles any affected call.
    async fn write_message<T: Serialize>(&self, message: &T) {
        let line = match wire::encode(message) {
            Ok(line) => line,
            Err(e) => {
                warn!("failed to encode message: {e}");
                return;
            }
        };
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(writer) => {
                if let Err(e) = writer.write_line(&line).await {
                    warn!("write to peer failed: {e}");
                }
            }
            None => warn!("write dropped, connection has no transport"),
        }
    }
}

/// Reader task: decode and dispatch each line until the stream closes,
/// then reject every still-pending call unless the shutdown was asked for.
async fn read_loop<S>(inner: Arc<Inner>, mut source: S)
where
    S: LineSource + 'static,
{
    loop {
        match source.next_line().await {
            Ok(Some(line)) => dispatch(&inner, &line).await,
            Ok(None) => break,
            Err(e) => {
                debug!("peer stdout read failed: {e}");
                break;
            }
        }
    }

    inner.running.store(false, Ordering::SeqCst);
    if !inner.closing.load(Ordering::SeqCst) {
        let error = RpcError::exited(inner.diagnostics.snapshot());
        inner.pending.reject_all(&error);
    }
}

async fn dispatch(inner: &Inner, line: &str) {
    let Some(message) = wire::decode(line) else {
        if !line.trim().is_empty() {
            trace!(line = line.trim(), "dropped unrecognized line");
        }
        return;
    };

    match message {
        Inbound::Response {
            id,
            result,
            error,
            done,
        } => {
            inner
                .pending
                .resolve(id, error.map(RpcError::Peer), result, done);
        }
        Inbound::Call { id, method, params } => {
            let outcome = match inner.exports.get(&method) {
                None => Err(format!("Method not found: {method}")),
                Some(handler) => handler(params).map_err(|e| e.to_string()),
            };
            // A call without an id is a notification: no reply either way.
            let Some(id) = id else {
                if let Err(message) = outcome {
                    debug!("notification handler {method} failed: {message}");
                }
                return;
            };
            match outcome {
                Ok(result) => {
                    inner
                        .write_message(&wire::ResultReply::new(id, result))
                        .await;
                }
                Err(message) => {
                    inner
                        .write_message(&wire::ErrorReply::new(id, message))
                        .await;
                }
            }
        }
    }
}
