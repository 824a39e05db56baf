pub mod app;
pub mod cli;
pub mod rpc;

pub use rpc::{Connection, ExportTable, PeerCommand, RpcError};
