use serde_json::Value;
use thiserror::Error;

/// Failures a call can observe through its callback or future.
///
/// These never surface from the connection itself; `start` is the only
/// operation that fails synchronously.
#[derive(Debug, Clone, Error)]
pub enum RpcError {
    /// The call was issued while the peer process was not running.
    #[error("process not running")]
    NotRunning,

    /// The peer's response carried an `error` field, held verbatim.
    #[error("{}", peer_message(.0))]
    Peer(Value),

    /// The peer exited while the call was still pending. Carries the
    /// captured stderr lines when there are any.
    #[error("{0}")]
    ProcessExited(String),

    /// The connection was stopped before a response arrived.
    #[error("connection closed")]
    Closed,
}

impl RpcError {
    pub(crate) fn exited(diagnostics: String) -> Self {
        if diagnostics.is_empty() {
            RpcError::ProcessExited("process exited".to_string())
        } else {
            RpcError::ProcessExited(diagnostics)
        }
    }
}

fn peer_message(error: &Value) -> String {
    match error.get("message").and_then(Value::as_str) {
        Some(message) => message.to_string(),
        None => error.to_string(),
    }
}
