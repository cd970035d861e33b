//! One interactive session with a download tool.
//!
//! The tool is spawned with piped stdin/stdout and driven through a small
//! state machine: a query is written, output is accumulated until the
//! selection prompt appears, a selection is written, and output is read again
//! until a success or failure marker shows up. The whole session shares one
//! deadline; hitting it kills the child.

use super::{AcquireError, ToolSpec};
use anyhow::Context;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::Instant;
use tracing::debug;

// How long a tool gets to exit on its own after stdin is closed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    QuerySent,
    ResultsReceived,
    SelectionSent,
    Completed,
    Failed,
    TimedOut,
}

pub struct ToolSession {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    buffer: String,
    state: SessionState,
    deadline: Instant,
    prompt_marker: String,
    success_markers: Vec<String>,
    failure_markers: Vec<String>,
}

impl ToolSession {
    pub fn spawn(spec: &ToolSpec, timeout: Duration) -> Result<Self, AcquireError> {
        let mut child = Command::new(&spec.bin)
            .args(&spec.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn download tool '{}'", spec.bin))?;

        let stdin = child
            .stdin
            .take()
            .context("Download tool stdin not captured")?;
        let stdout = child
            .stdout
            .take()
            .context("Download tool stdout not captured")?;

        Ok(Self {
            child,
            stdin,
            stdout,
            buffer: String::new(),
            state: SessionState::Idle,
            deadline: Instant::now() + timeout,
            prompt_marker: spec.prompt_marker.clone(),
            success_markers: spec.success_markers.clone(),
            failure_markers: spec.failure_markers.clone(),
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Send the search query and wait for the selection prompt. Returns the
    /// output produced so far, which contains the result list.
    pub async fn submit_query(&mut self, query: &str) -> Result<String, AcquireError> {
        if self.state != SessionState::Idle {
            return Err(AcquireError::Tool(format!(
                "query submitted in state {:?}",
                self.state
            )));
        }
        self.write_line(query).await?;
        self.state = SessionState::QuerySent;

        let prompt = self.prompt_marker.clone();
        self.read_until(0, move |text| text.contains(prompt.as_str()))
            .await?;
        self.state = SessionState::ResultsReceived;
        Ok(self.buffer.clone())
    }

    /// Send the chosen ordinal and wait for the tool to report the outcome.
    pub async fn submit_selection(&mut self, ordinal: usize) -> Result<(), AcquireError> {
        if self.state != SessionState::ResultsReceived {
            return Err(AcquireError::Tool(format!(
                "selection submitted in state {:?}",
                self.state
            )));
        }
        let watermark = self.buffer.len();
        self.write_line(&ordinal.to_string()).await?;
        self.state = SessionState::SelectionSent;

        let success = self.success_markers.clone();
        let failure = self.failure_markers.clone();
        self.read_until(watermark, move |text| {
            success.iter().any(|m| text.contains(m.as_str()))
                || failure.iter().any(|m| text.contains(m.as_str()))
        })
        .await?;

        let tail = &self.buffer[watermark..];
        if self.failure_markers.iter().any(|m| tail.contains(m.as_str())) {
            self.state = SessionState::Failed;
            return Err(AcquireError::Tool(format!(
                "tool reported failure: {}",
                tail.trim()
            )));
        }
        self.state = SessionState::Completed;
        Ok(())
    }

    /// Close the tool's stdin so it can exit cleanly, then reap it. A tool
    /// that ignores the EOF is killed after [`SHUTDOWN_GRACE`].
    pub async fn shutdown(mut self) {
        drop(self.stdin);
        if tokio::time::timeout(SHUTDOWN_GRACE, self.child.wait())
            .await
            .is_err()
        {
            let _ = self.child.kill().await;
            let _ = self.child.wait().await;
        }
    }

    async fn write_line(&mut self, line: &str) -> Result<(), AcquireError> {
        debug!("tool <- {}", line);
        self.stdin
            .write_all(format!("{}\n", line).as_bytes())
            .await
            .map_err(|e| AcquireError::Tool(format!("failed to write to tool stdin: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| AcquireError::Tool(format!("failed to flush tool stdin: {}", e)))?;
        Ok(())
    }

    /// Accumulate stdout into the buffer until `done` matches the text after
    /// `watermark`, the tool exits, or the session deadline passes.
    async fn read_until<F>(&mut self, watermark: usize, done: F) -> Result<(), AcquireError>
    where
        F: Fn(&str) -> bool,
    {
        let mut chunk = [0u8; 4096];
        loop {
            if done(&self.buffer[watermark..]) {
                return Ok(());
            }
            let Some(remaining) = self.deadline.checked_duration_since(Instant::now()) else {
                return self.timed_out().await;
            };
            match tokio::time::timeout(remaining, self.stdout.read(&mut chunk)).await {
                Err(_) => return self.timed_out().await,
                Ok(Ok(0)) => {
                    self.state = SessionState::Failed;
                    return Err(AcquireError::Tool(
                        "tool exited before completing the session".to_string(),
                    ));
                }
                Ok(Ok(n)) => {
                    let text = String::from_utf8_lossy(&chunk[..n]);
                    debug!("tool -> {}", text.trim_end());
                    self.buffer.push_str(&text);
                }
                Ok(Err(e)) => {
                    self.state = SessionState::Failed;
                    return Err(AcquireError::Tool(format!(
                        "failed to read tool stdout: {}",
                        e
                    )));
                }
            }
        }
    }

    async fn timed_out(&mut self) -> Result<(), AcquireError> {
        self.state = SessionState::TimedOut;
        let _ = self.child.kill().await;
        let _ = self.child.wait().await;
        Err(AcquireError::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script_spec(script: &str) -> ToolSpec {
        ToolSpec {
            bin: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            output_dir: std::env::temp_dir(),
            prompt_marker: "Select a track:".to_string(),
            success_markers: vec!["Download complete".to_string()],
            failure_markers: vec!["Download failed".to_string()],
        }
    }

    const HAPPY_SCRIPT: &str = r#"
read query
echo "Results for $query:"
echo " 1. Daft Punk - One More Time (Extended Mix)"
echo " 2. Daft Punk - One More Time (Radio Edit)"
echo "Select a track:"
read sel
echo "Download complete: $sel"
"#;

    #[tokio::test]
    async fn test_happy_path_session() {
        let spec = script_spec(HAPPY_SCRIPT);
        let mut session = ToolSession::spawn(&spec, Duration::from_secs(10)).unwrap();
        assert_eq!(session.state(), SessionState::Idle);

        let results = session.submit_query("Daft Punk - One More Time").await.unwrap();
        assert_eq!(session.state(), SessionState::ResultsReceived);
        assert!(results.contains("1. Daft Punk - One More Time (Extended Mix)"));

        session.submit_selection(1).await.unwrap();
        assert_eq!(session.state(), SessionState::Completed);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_failure_marker() {
        let script = r#"
read query
echo "Select a track:"
read sel
echo "Download failed: region locked"
"#;
        let spec = script_spec(script);
        let mut session = ToolSession::spawn(&spec, Duration::from_secs(10)).unwrap();
        session.submit_query("anything").await.unwrap();
        let err = session.submit_selection(1).await.unwrap_err();
        assert!(matches!(err, AcquireError::Tool(_)));
        assert_eq!(session.state(), SessionState::Failed);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_timeout_kills_tool() {
        // Tool never prints the prompt.
        let spec = script_spec("read query\nsleep 60\n");
        let mut session = ToolSession::spawn(&spec, Duration::from_millis(200)).unwrap();
        let err = session.submit_query("anything").await.unwrap_err();
        assert!(matches!(err, AcquireError::Timeout));
        assert_eq!(session.state(), SessionState::TimedOut);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_early_exit_is_tool_error() {
        let spec = script_spec("read query\nexit 1\n");
        let mut session = ToolSession::spawn(&spec, Duration::from_secs(10)).unwrap();
        let err = session.submit_query("anything").await.unwrap_err();
        assert!(matches!(err, AcquireError::Tool(_)));
        assert_eq!(session.state(), SessionState::Failed);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_lets_tool_exit_on_stdin_eof() {
        // Tool drains stdin and exits once it is closed; shutdown must not
        // need the kill fallback.
        let spec = script_spec("cat > /dev/null\n");
        let session = ToolSession::spawn(&spec, Duration::from_secs(10)).unwrap();
        tokio::time::timeout(Duration::from_secs(2), session.shutdown())
            .await
            .expect("tool did not exit after stdin was closed");
    }

    #[tokio::test]
    async fn test_selection_requires_results() {
        let spec = script_spec(HAPPY_SCRIPT);
        let mut session = ToolSession::spawn(&spec, Duration::from_secs(10)).unwrap();
        let err = session.submit_selection(1).await.unwrap_err();
        assert!(matches!(err, AcquireError::Tool(_)));
        session.shutdown().await;
    }
}
