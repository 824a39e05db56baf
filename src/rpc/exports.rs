//! Methods the connection exposes to its peer.
use std::collections::HashMap;

use serde_json::Value;

/// A locally exported method. Handlers run synchronously on the reader
/// task, so a slow handler stalls all further inbound processing until it
/// returns.
pub type Handler = Box<dyn Fn(Option<Value>) -> anyhow::Result<Value> + Send + Sync>;

/// Method-name-to-handler bindings, populated before the connection starts
/// and immutable afterwards.
#[derive(Default)]
pub struct ExportTable {
    handlers: HashMap<String, Handler>,
}

impl ExportTable {
    pub fn new() -> Self {
        ExportTable::default()
    }

    pub fn register<F>(&mut self, method: &str, handler: F)
    where
        F: Fn(Option<Value>) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.handlers.insert(method.to_string(), Box::new(handler));
    }

    pub(crate) fn get(&self, method: &str) -> Option<&Handler> {
        self.handlers.get(method)
    }

    /// Exported method names, sorted, as advertised in the `init` call.
    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }
}
