//! Correlation of outbound call ids to their callbacks.
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::Value;

use crate::rpc::error::RpcError;

/// Callback for a one-shot call. Invoked exactly once with the response's
/// error and result.
pub type OneShotCallback = Box<dyn FnOnce(Option<RpcError>, Option<Value>) + Send>;

/// Callback for a streaming call. Invoked once per partial response; only
/// the final invocation carries `done == true`.
pub type StreamCallback = Box<dyn FnMut(Option<RpcError>, StreamItem) + Send>;

/// One delivery on a streaming call.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamItem {
    pub value: Value,
    pub done: bool,
}

/// Calls that were written but have not seen their final response yet.
///
/// Registration happens on caller tasks, resolution on the reader task; one
/// lock keeps them mutually exclusive. Callbacks always run outside the
/// lock so they may issue further calls.
#[derive(Default)]
pub struct PendingCalls {
    inner: Mutex<Maps>,
}

#[derive(Default)]
struct Maps {
    oneshots: HashMap<u64, OneShotCallback>,
    streams: HashMap<u64, StreamCallback>,
}

impl PendingCalls {
    pub fn new() -> Self {
        PendingCalls::default()
    }

    pub fn register_oneshot(&self, id: u64, callback: OneShotCallback) {
        self.lock().oneshots.insert(id, callback);
    }

    pub fn register_stream(&self, id: u64, callback: StreamCallback) {
        self.lock().streams.insert(id, callback);
    }

    /// Number of calls still waiting on a response.
    pub fn len(&self) -> usize {
        let maps = self.lock();
        maps.oneshots.len() + maps.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Route one response to its callback. A one-shot entry is removed and
    /// invoked once; a streaming entry is kept until `done`. Unknown ids
    /// are ignored, so stale responses after resolution are harmless.
    pub fn resolve(&self, id: u64, error: Option<RpcError>, result: Option<Value>, done: bool) {
        let oneshot = self.lock().oneshots.remove(&id);
        if let Some(callback) = oneshot {
            callback(error, result);
            return;
        }

        let stream = self.lock().streams.remove(&id);
        if let Some(mut callback) = stream {
            callback(
                error,
                StreamItem {
                    value: result.unwrap_or(Value::Null),
                    done,
                },
            );
            if !done {
                self.lock().streams.insert(id, callback);
            }
        }
    }

    /// Fail every pending call with the same error, then clear both maps.
    /// Streaming callbacks receive a terminal empty item.
    pub fn reject_all(&self, error: &RpcError) {
        let maps = {
            let mut inner = self.lock();
            Maps {
                oneshots: std::mem::take(&mut inner.oneshots),
                streams: std::mem::take(&mut inner.streams),
            }
        };

        for (_, callback) in maps.oneshots {
            callback(Some(error.clone()), None);
        }
        for (_, mut callback) in maps.streams {
            callback(
                Some(error.clone()),
                StreamItem {
                    value: Value::String(String::new()),
                    done: true,
                },
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, Maps> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
