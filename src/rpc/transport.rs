//! Line transport: newline-delimited messages over an async byte stream.
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

/// Write side. One message per line, UTF-8, `\n` terminated, flushed.
#[async_trait]
pub trait LineSink: Send {
    async fn write_line(&mut self, line: &str) -> anyhow::Result<()>;
}

/// Read side. `Ok(None)` signals end of stream.
#[async_trait]
pub trait LineSource: Send {
    async fn next_line(&mut self) -> anyhow::Result<Option<String>>;
}

// Blanket impls so child pipes and in-memory duplex streams can back a
// connection interchangeably.

#[async_trait]
impl<W> LineSink for W
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write_line(&mut self, line: &str) -> anyhow::Result<()> {
        self.write_all(line.as_bytes()).await?;
        self.write_all(b"\n").await?;
        self.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl<R> LineSource for R
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_line(&mut self) -> anyhow::Result<Option<String>> {
        let mut line = String::new();
        let read = self.read_line(&mut line).await?;
        if read == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}
