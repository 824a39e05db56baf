//! Bounded capture of the peer's stderr for failure messages.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

/// Lines retained; older ones are discarded.
const MAX_LINES: usize = 200;

/// Ring buffer of the peer's most recent stderr lines.
#[derive(Default)]
pub struct Diagnostics {
    lines: Mutex<VecDeque<String>>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }

    pub fn push(&self, line: &str) {
        let mut lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        if lines.len() == MAX_LINES {
            lines.pop_front();
        }
        lines.push_back(line.to_string());
    }

    /// Buffer contents joined with newlines, oldest first.
    pub fn snapshot(&self) -> String {
        let lines = self.lines.lock().unwrap_or_else(PoisonError::into_inner);
        lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

/// Drain a stderr stream into the buffer until it closes.
pub(crate) async fn drain<R>(stderr: R, diagnostics: Arc<Diagnostics>)
where
    R: AsyncRead + Unpin + Send,
{
    let mut reader = BufReader::new(stderr);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {
                let trimmed = line.trim_end();
                debug!(target: "linerpc::peer", "stderr: {trimmed}");
                diagnostics.push(trimmed);
            }
        }
    }
}
