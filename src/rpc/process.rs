//! Peer process lifecycle: piped spawn and terminate-then-kill.
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::anyhow;
use tokio::io::BufReader;
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};

/// How long a terminated peer gets to exit before it is killed.
pub const STOP_GRACE: Duration = Duration::from_millis(500);

/// Command line and working directory a connection spawns its peer from.
#[derive(Debug, Clone)]
pub struct PeerCommand {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: Option<PathBuf>,
}

impl PeerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        PeerCommand {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }
}

#[derive(Debug)]
pub(crate) struct SpawnedPeer {
    pub child: Child,
    pub stdin: ChildStdin,
    pub stdout: BufReader<ChildStdout>,
    pub stderr: ChildStderr,
}

/// Spawn the peer with all three stdio streams piped. Failure leaves no
/// partial state behind.
pub(crate) fn spawn(peer: &PeerCommand) -> anyhow::Result<SpawnedPeer> {
    let mut cmd = Command::new(&peer.program);
    cmd.args(&peer.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(cwd) = &peer.cwd {
        cmd.current_dir(cwd);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| anyhow!("failed to start {}: {}", peer.program, e))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| anyhow!("failed to take child stdin"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("failed to take child stdout"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("failed to take child stderr"))?;

    Ok(SpawnedPeer {
        child,
        stdin,
        stdout: BufReader::new(stdout),
        stderr,
    })
}

/// Ask the child to exit, wait out the grace period, then kill it. Errors
/// are ignored; the handle is released either way.
pub(crate) async fn terminate(mut child: Child) {
    request_exit(&mut child);
    if tokio::time::timeout(STOP_GRACE, child.wait()).await.is_err() {
        let _ = child.kill().await;
    }
}

#[cfg(unix)]
fn request_exit(child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
    }
}

#[cfg(not(unix))]
fn request_exit(child: &mut Child) {
    let _ = child.start_kill();
}

#[cfg(test)]
mod tests {
    use super::{spawn, terminate, PeerCommand};

    #[tokio::test]
    async fn spawn_failure_is_descriptive() {
        let err = spawn(&PeerCommand::new("linerpc-no-such-binary")).unwrap_err();
        assert!(err.to_string().contains("failed to start linerpc-no-such-binary"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn terminate_reaps_a_stubborn_child() {
        let mut peer = spawn(&PeerCommand::new("sleep").arg("30")).unwrap();
        assert!(matches!(peer.child.try_wait(), Ok(None)));
        terminate(peer.child).await;
    }
}
