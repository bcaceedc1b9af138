//! Executor that runs a task's image as a local program.
//!
//! The image names the program, the payload is written to its stdin, and the
//! group environment is injected. Stdout and stderr are appended to the task
//! log line by line while the program runs, so a killed run keeps what it
//! printed. No sandboxing is applied.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::executor::{ExecutionResult, Invocation, TaskExecutor};
use crate::core::logs::TaskLogWriter;
use crate::core::task::TaskId;

/// Runs images as child processes.
#[derive(Debug, Clone, Default)]
pub struct ProcessExecutor {
    args: Vec<String>,
}

impl ProcessExecutor {
    /// Executor passing no extra arguments.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arguments appended to every program invocation.
    #[must_use]
    pub fn with_args(mut self, args: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl TaskExecutor for ProcessExecutor {
    async fn execute(&self, invocation: Invocation, cancel: CancellationToken) -> ExecutionResult {
        let mut child = match Command::new(&invocation.image)
            .args(&self.args)
            .envs(&invocation.env_vars)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                tracing::warn!(
                    "task {} could not start {}: {}",
                    invocation.task_id,
                    invocation.image,
                    e
                );
                invocation
                    .log
                    .write_line(&format!("failed to start {}: {e}", invocation.image));
                return ExecutionResult::Killed(e.to_string());
            }
        };

        // Stdin is fed while output is drained; a full pipe must not stall the wait.
        if let Some(mut stdin) = child.stdin.take() {
            let payload = invocation.payload.clone();
            let task_id = invocation.task_id.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(payload.as_bytes()).await {
                    tracing::debug!("task {} closed stdin early: {}", task_id, e);
                }
            });
        }

        let pumps: Vec<JoinHandle<()>> = [
            child
                .stdout
                .take()
                .map(|out| pump(out, invocation.task_id.clone(), invocation.log.clone())),
            child
                .stderr
                .take()
                .map(|err| pump(err, invocation.task_id.clone(), invocation.log.clone())),
        ]
        .into_iter()
        .flatten()
        .collect();

        // Returning on cancellation drops the child, which kills it.
        let status = tokio::select! {
            status = child.wait() => status,
            () = cancel.cancelled() => {
                tracing::debug!("task {} cancelled, killing process", invocation.task_id);
                return ExecutionResult::Killed("cancelled".into());
            }
        };

        for pump in pumps {
            if let Err(e) = pump.await {
                tracing::debug!("task {} output reader failed: {}", invocation.task_id, e);
            }
        }

        match status {
            Ok(status) if status.success() => ExecutionResult::Success,
            Ok(status) => ExecutionResult::BadExit {
                code: status.code().unwrap_or(-1),
            },
            Err(e) => ExecutionResult::Killed(e.to_string()),
        }
    }
}

/// Copy a child's output stream into the task log as lines arrive.
fn pump<R>(stream: R, task_id: TaskId, log: TaskLogWriter) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut line = Vec::new();
        loop {
            line.clear();
            match reader.read_until(b'\n', &mut line).await {
                Ok(0) => break,
                Ok(_) => log.write(&String::from_utf8_lossy(&line)),
                Err(e) => {
                    tracing::debug!("task {} output stream closed: {}", task_id, e);
                    break;
                }
            }
        }
    })
}
