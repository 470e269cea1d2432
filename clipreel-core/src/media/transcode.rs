//! Transcoder child process relayed as a byte stream

use bytes::Bytes;
use futures::Stream;
use std::io;
use std::pin::Pin;
use std::process::Stdio;
use std::task::{Context, Poll};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tokio_util::io::ReaderStream;
use tracing::{debug, warn};

use crate::{Error, Result};

/// Stdout of a running transcoder. Dropping the stream kills the process.
pub struct TranscodeStream {
    stdout: ReaderStream<ChildStdout>,
    child: Child,
}

impl TranscodeStream {
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }
}

impl Stream for TranscodeStream {
    type Item = io::Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.stdout).poll_next(cx)
    }
}

impl Drop for TranscodeStream {
    fn drop(&mut self) {
        if let Err(e) = self.child.start_kill() {
            // Already exited on its own
            debug!(error = %e, "Transcoder kill skipped");
        }
    }
}

/// Start `bin` with `args`, stdout piped back as the stream and stderr
/// drained into the log.
pub fn spawn_transcoder(bin: &str, args: &[String]) -> Result<TranscodeStream> {
    let mut cmd = Command::new(bin);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|e| Error::Transcoder(format!("failed to start {bin}: {e}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| Error::Transcoder("transcoder stdout not captured".to_string()))?;
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(log_stderr(stderr));
    }

    debug!(bin, pid = child.id(), "Transcoder started");
    Ok(TranscodeStream {
        stdout: ReaderStream::new(stdout),
        child,
    })
}

async fn log_stderr(stderr: ChildStderr) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => warn!(target: "transcoder", "{line}"),
            Ok(None) => break,
            Err(e) => {
                warn!(target: "transcoder", error = %e, "stderr read failed");
                break;
            }
        }
    }
}
