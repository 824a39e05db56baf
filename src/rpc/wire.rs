//! Wire codec: one JSON message per line, shapes told apart by field
//! presence rather than a tagged envelope.
use serde::Serialize;
use serde_json::Value;

#[derive(Serialize, Debug)]
pub struct Request {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    pub params: Option<Value>,
    pub stream: bool,
}

impl Request {
    pub fn new(id: u64, method: &str, params: Option<Value>, stream: bool) -> Self {
        Request {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.to_string(),
            params,
            stream,
        }
    }
}

/// Reply to an inbound call that carried an id. The id is echoed verbatim,
/// whatever JSON type the peer used.
#[derive(Serialize, Debug)]
pub struct ResultReply {
    pub jsonrpc: String,
    pub id: Value,
    pub result: Value,
}

impl ResultReply {
    pub fn new(id: Value, result: Value) -> Self {
        ResultReply {
            jsonrpc: "2.0".to_string(),
            id,
            result,
        }
    }
}

#[derive(Serialize, Debug)]
pub struct ErrorReply {
    pub jsonrpc: String,
    pub id: Value,
    pub error: ErrorBody,
}

#[derive(Serialize, Debug)]
pub struct ErrorBody {
    pub message: String,
}

impl ErrorReply {
    pub fn new(id: Value, message: String) -> Self {
        ErrorReply {
            jsonrpc: "2.0".to_string(),
            id,
            error: ErrorBody { message },
        }
    }
}

/// Serialize an outbound message. serde escapes embedded newlines, so the
/// result is always a single line.
pub fn encode<T: Serialize>(message: &T) -> serde_json::Result<String> {
    serde_json::to_string(message)
}

/// A decoded inbound line.
#[derive(Debug)]
pub enum Inbound {
    /// Carries an id plus at least one of `result`, `error`, `done`.
    Response {
        id: u64,
        result: Option<Value>,
        error: Option<Value>,
        done: bool,
    },
    /// Carries a method name; the id, when present, must be echoed in the
    /// reply.
    Call {
        id: Option<Value>,
        method: String,
        params: Option<Value>,
    },
}

/// Decode one inbound line. Returns `None` for empty lines, invalid JSON,
/// and anything matching neither message shape; such lines are dropped,
/// never surfaced as errors.
pub fn decode(line: &str) -> Option<Inbound> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let message: Value = serde_json::from_str(line).ok()?;
    let object = message.as_object()?;

    // Responses win over calls when a message somehow carries both shapes.
    if object.contains_key("id")
        && (object.contains_key("result")
            || object.contains_key("error")
            || object.contains_key("done"))
    {
        // The connection only ever allocates positive integer ids, so a
        // response with any other id type cannot match a pending call.
        let id = object.get("id").and_then(Value::as_u64)?;
        return Some(Inbound::Response {
            id,
            result: object.get("result").cloned(),
            error: object.get("error").cloned(),
            done: object
                .get("done")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        });
    }

    if let Some(method) = object.get("method").and_then(Value::as_str) {
        return Some(Inbound::Call {
            // An explicit null id means notification, same as no id.
            id: object.get("id").filter(|id| !id.is_null()).cloned(),
            method: method.to_string(),
            params: object.get("params").cloned(),
        });
    }

    None
}
