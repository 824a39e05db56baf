use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;

use crate::rpc::PeerCommand;

#[derive(Debug, Clone)]
pub struct Config {
    pub peer: PeerCommand,
    pub method: String,
    pub params: Value,
    pub stream: bool,
}

#[derive(Parser, Debug)]
#[command(name = "linerpc")]
#[command(about = "Call JSON-RPC methods on a child process over stdio", long_about = None)]
pub struct Cli {
    /// Method to invoke on the peer
    pub method: String,

    /// Params as a JSON document
    #[arg(default_value = "null")]
    pub params: String,

    /// Issue a streaming call and print each chunk as it arrives
    #[arg(long)]
    pub stream: bool,

    /// Working directory for the peer process
    #[arg(long)]
    pub cwd: Option<PathBuf>,

    /// Peer command, e.g. `-- my-peer --flag`
    #[arg(last = true, required = true)]
    pub peer: Vec<String>,
}

impl Cli {
    pub fn from_args() -> Self {
        Self::parse()
    }

    pub fn into_config(self) -> anyhow::Result<Config> {
        let params: Value = serde_json::from_str(&self.params)
            .map_err(|e| anyhow::anyhow!("params is not valid JSON: {e}"))?;

        let mut parts = self.peer.into_iter();
        let program = parts
            .next()
            .ok_or_else(|| anyhow::anyhow!("missing peer command"))?;
        let mut peer = PeerCommand::new(program);
        for arg in parts {
            peer = peer.arg(arg);
        }
        // An extra search path for the peer, passed through as `--path`.
        if let Ok(path) = std::env::var("LINERPC_PEER_PATH") {
            if !path.is_empty() {
                peer = peer.arg("--path").arg(path);
            }
        }
        if let Some(cwd) = self.cwd {
            peer = peer.current_dir(cwd);
        }

        Ok(Config {
            peer,
            method: self.method,
            params,
            stream: self.stream,
        })
    }
}
