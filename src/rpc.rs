//! JSON-RPC 2.0 client over a child process's stdio, one message per line.
//!
//! A [`Connection`] spawns its peer, correlates outbound calls to
//! responses by integer id, supports streaming responses terminated by a
//! `done` marker, and dispatches peer-initiated calls into the handlers
//! registered in its [`ExportTable`].
pub mod connection;
pub mod diagnostics;
pub mod error;
pub mod exports;
pub mod process;
pub mod registry;
pub mod transport;
pub mod wire;

pub use connection::Connection;
pub use error::RpcError;
pub use exports::ExportTable;
pub use process::PeerCommand;
pub use registry::{OneShotCallback, StreamCallback, StreamItem};
