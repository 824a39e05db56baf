use anyhow::Result;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::info;

use crate::cli::Config;
use crate::rpc::{Connection, ExportTable};

/// Handlers this binary exports to its peer.
fn exports() -> ExportTable {
    let mut exports = ExportTable::new();
    // Peers can probe liveness; the params come straight back.
    exports.register("ping", |params| Ok(params.unwrap_or(Value::Null)));
    exports
}

pub async fn run(config: Config) -> Result<()> {
    let connection = Connection::new(config.peer.clone(), exports());
    connection.start().await?;
    info!(program = %config.peer.program, "peer started");

    let outcome = if config.stream {
        run_streaming(&connection, &config.method, config.params).await
    } else {
        run_oneshot(&connection, &config.method, config.params).await
    };

    connection.stop().await;
    outcome
}

async fn run_oneshot(connection: &Connection, method: &str, params: Value) -> Result<()> {
    match connection.request(method, Some(params)).await {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => Err(anyhow::anyhow!("{method} failed: {e}")),
    }
}

async fn run_streaming(connection: &Connection, method: &str, params: Value) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    connection
        .call_streaming(
            method,
            Some(params),
            Box::new(move |error, item| {
                let _ = tx.send((error, item));
            }),
        )
        .await;

    while let Some((error, item)) = rx.recv().await {
        if let Some(error) = error {
            return Err(anyhow::anyhow!("{method} failed: {error}"));
        }
        if !item.value.is_null() {
            println!("{}", serde_json::to_string(&item.value)?);
        }
        if item.done {
            break;
        }
    }
    Ok(())
}
