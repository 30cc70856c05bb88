//! Invocation of the host-management CLI.
//!
//! Two modes are supported: a one-shot capture that runs `ha <category> logs`
//! to completion and merges stdout and stderr, and a follow mode that keeps
//! `ha <category> logs --follow` running and hands out its stdout line by line.

use ha_logs_types::{LogCategory, LogMode, LogsResponse};
use std::fmt;
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Errors raised while running the CLI.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{}", describe_status(.0))]
    Exit(ExitStatus),

    #[error("I/O error on command output: {0}")]
    Io(#[from] io::Error),

    #[error("command did not finish within {}s", .0.as_secs_f64())]
    Timeout(Duration),
}

fn describe_status(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit status: {}", code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("terminated by signal {}", signal);
        }
    }

    status.to_string()
}

/// A fully resolved command line: program plus ordered arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    program: String,
    args: Vec<String>,
}

impl CommandInvocation {
    /// Build the invocation for a category in the given mode.
    ///
    /// `leading` arguments are placed before the category, for wrappers such
    /// as `ssh host ha` or `docker exec addon ha`.
    pub fn new(
        program: impl Into<String>,
        leading: &[String],
        category: LogCategory,
        mode: LogMode,
    ) -> Self {
        let mut args = leading.to_vec();
        args.push(category.as_str().to_string());
        args.push("logs".to_string());
        if mode == LogMode::Follow {
            args.push("--follow".to_string());
        }
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn spawn(&self) -> Result<Child, CommandError> {
        self.command().spawn().map_err(|source| CommandError::Spawn {
            program: self.program.clone(),
            source,
        })
    }
}

impl fmt::Display for CommandInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Runner for the logs subcommands of the CLI.
#[derive(Debug, Clone)]
pub struct LogCommand {
    program: String,
    leading_args: Vec<String>,
    timeout: Option<Duration>,
}

impl LogCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
            timeout: None,
        }
    }

    /// Arguments placed before `<category> logs` on every invocation.
    pub fn with_leading_args(mut self, args: Vec<String>) -> Self {
        self.leading_args = args;
        self
    }

    /// Kill one-shot captures that run longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn invocation(&self, category: LogCategory, mode: LogMode) -> CommandInvocation {
        CommandInvocation::new(self.program.clone(), &self.leading_args, category, mode)
    }

    /// Run `<program> <category> logs` to completion and capture its output.
    ///
    /// Never fails: spawn errors, failing exit statuses and timeouts all end
    /// up in the `error` field next to whatever output was captured.
    pub async fn capture(&self, category: LogCategory) -> LogsResponse {
        let invocation = self.invocation(category, LogMode::Snapshot);
        info!("Running '{}'", invocation);

        let mut output = Vec::new();
        let result = self.capture_into(&invocation, &mut output).await;
        let output = String::from_utf8_lossy(&output).into_owned();

        match result {
            Ok(()) => {
                debug!("'{}' produced {} bytes", invocation, output.len());
                LogsResponse::ok(output)
            }
            Err(e) => {
                warn!("'{}' failed: {}", invocation, e);
                LogsResponse::with_error(output, e.to_string())
            }
        }
    }

    async fn capture_into(
        &self,
        invocation: &CommandInvocation,
        output: &mut Vec<u8>,
    ) -> Result<(), CommandError> {
        let mut child = invocation.spawn()?;

        let finished = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, drain_and_wait(&mut child, output))
                .await
                .ok(),
            None => Some(drain_and_wait(&mut child, output).await),
        };

        match finished {
            Some(Ok(status)) if status.success() => Ok(()),
            Some(Ok(status)) => Err(CommandError::Exit(status)),
            Some(Err(e)) => Err(e),
            None => {
                if let Err(e) = child.kill().await {
                    debug!("Failed to kill timed out '{}': {}", invocation, e);
                }
                Err(CommandError::Timeout(self.timeout.unwrap_or_default()))
            }
        }
    }

    /// Start `<program> <category> logs --follow`.
    pub fn follow(&self, category: LogCategory) -> Result<FollowProcess, CommandError> {
        let invocation = self.invocation(category, LogMode::Follow);
        let mut child = invocation.spawn()?;

        let stdout = child.stdout.take().ok_or_else(|| {
            CommandError::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "stdout was not captured",
            ))
        })?;

        // Stderr is not relayed, but it must be drained so the child never
        // blocks on a full pipe.
        if let Some(stderr) = child.stderr.take() {
            let name = invocation.to_string();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stderr);
                let mut line = Vec::new();
                while let Ok(n) = reader.read_until(b'\n', &mut line).await {
                    if n == 0 {
                        break;
                    }
                    debug!(command = %name, "stderr: {}", String::from_utf8_lossy(&line).trim_end());
                    line.clear();
                }
            });
        }

        Ok(FollowProcess {
            invocation,
            child,
            stdout: BufReader::new(stdout),
            pending: Vec::new(),
        })
    }
}

impl Default for LogCommand {
    fn default() -> Self {
        Self::new(ha_logs_types::DEFAULT_COMMAND)
    }
}

/// Read stdout and stderr concurrently into `output`, in arrival order, then
/// reap the child.
async fn drain_and_wait(child: &mut Child, output: &mut Vec<u8>) -> Result<ExitStatus, CommandError> {
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    merge_streams(stdout, stderr, output).await?;
    Ok(child.wait().await?)
}

async fn merge_streams<A, B>(
    first: Option<A>,
    second: Option<B>,
    output: &mut Vec<u8>,
) -> io::Result<()>
where
    A: AsyncRead + Unpin,
    B: AsyncRead + Unpin,
{
    let mut first = first;
    let mut second = second;
    let mut first_buf = [0u8; 4096];
    let mut second_buf = [0u8; 4096];

    loop {
        let (Some(a), Some(b)) = (first.as_mut(), second.as_mut()) else {
            break;
        };
        tokio::select! {
            n = a.read(&mut first_buf) => match n? {
                0 => first = None,
                n => output.extend_from_slice(&first_buf[..n]),
            },
            n = b.read(&mut second_buf) => match n? {
                0 => second = None,
                n => output.extend_from_slice(&second_buf[..n]),
            },
        }
    }

    // At most one side is still open here.
    if let Some(mut rest) = first {
        rest.read_to_end(output).await?;
    }
    if let Some(mut rest) = second {
        rest.read_to_end(output).await?;
    }
    Ok(())
}

/// A running follow-mode process.
///
/// Dropping it kills the child.
pub struct FollowProcess {
    invocation: CommandInvocation,
    child: Child,
    stdout: BufReader<ChildStdout>,
    /// Bytes of the line currently being read
    pending: Vec<u8>,
}

impl FollowProcess {
    pub fn invocation(&self) -> &CommandInvocation {
        &self.invocation
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Next line of stdout with the line ending stripped, or `None` at EOF.
    ///
    /// Invalid UTF-8 is replaced lossily. Cancel safe, so it can sit in a
    /// `select!` next to the socket: partial reads stay in `pending`.
    pub async fn next_line(&mut self) -> Result<Option<String>, CommandError> {
        let read = self.stdout.read_until(b'\n', &mut self.pending).await?;
        if read == 0 && self.pending.is_empty() {
            return Ok(None);
        }

        let mut line = std::mem::take(&mut self.pending);
        if line.last() == Some(&b'\n') {
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
        }
        Ok(Some(String::from_utf8_lossy(&line).into_owned()))
    }

    /// Wait for the process to exit after stdout is exhausted.
    pub async fn wait(&mut self) -> Result<(), CommandError> {
        let status = self.child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(CommandError::Exit(status))
        }
    }

    /// Forcibly terminate the process and reap it.
    pub async fn kill(&mut self) {
        match self.child.kill().await {
            Ok(()) => info!("Killed '{}'", self.invocation),
            Err(e) => debug!("Failed to kill '{}': {}", self.invocation, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_invocation() {
        let inv = CommandInvocation::new("ha", &[], LogCategory::Core, LogMode::Snapshot);
        assert_eq!(inv.program(), "ha");
        assert_eq!(inv.args(), ["core", "logs"]);
        assert_eq!(inv.to_string(), "ha core logs");
    }

    #[test]
    fn test_follow_invocation() {
        let inv = CommandInvocation::new("ha", &[], LogCategory::Multicast, LogMode::Follow);
        assert_eq!(inv.args(), ["multicast", "logs", "--follow"]);
    }

    #[test]
    fn test_leading_args_come_first() {
        let runner = LogCommand::new("ssh").with_leading_args(vec!["homeassistant".into(), "ha".into()]);
        let inv = runner.invocation(LogCategory::Host, LogMode::Snapshot);
        assert_eq!(inv.args(), ["homeassistant", "ha", "host", "logs"]);
        assert_eq!(inv.to_string(), "ssh homeassistant ha host logs");
    }

    #[test]
    fn test_every_category_maps_to_its_token() {
        let runner = LogCommand::default();
        for category in LogCategory::ALL {
            let inv = runner.invocation(category, LogMode::Snapshot);
            assert_eq!(inv.args()[0], category.as_str());
        }
    }

    #[tokio::test]
    async fn test_merge_streams_keeps_both_sides() {
        let mut output = Vec::new();
        merge_streams(
            Some(&b"out\n"[..]),
            Some(&b"err\n"[..]),
            &mut output,
        )
        .await
        .unwrap();

        let text = String::from_utf8(output).unwrap();
        assert!(text.contains("out\n"));
        assert!(text.contains("err\n"));
        assert_eq!(text.len(), 8);
    }

    #[tokio::test]
    async fn test_merge_streams_with_one_side_missing() {
        let mut output = Vec::new();
        merge_streams::<&[u8], &[u8]>(Some(&b"only"[..]), None, &mut output)
            .await
            .unwrap();
        assert_eq!(output, b"only");
    }

    #[tokio::test]
    async fn test_capture_missing_program() {
        let runner = LogCommand::new("/nonexistent/ha-logs-proxy-test-binary");
        let response = runner.capture(LogCategory::Host).await;

        assert_eq!(response.output, "");
        let error = response.error.unwrap();
        assert!(error.starts_with("failed to start"), "got: {}", error);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_capture_exit_status_is_reported() {
        let runner = LogCommand::new("false");
        let response = runner.capture(LogCategory::Dns).await;
        assert_eq!(response.error.as_deref(), Some("exit status: 1"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_follow_keeps_invalid_utf8_lines() {
        let runner = LogCommand::new("sh").with_leading_args(vec![
            "-c".into(),
            "printf 'a\\n\\377\\r\\nlast'".into(),
            "sh".into(),
        ]);
        let mut process = runner.follow(LogCategory::Core).unwrap();

        assert_eq!(process.next_line().await.unwrap().as_deref(), Some("a"));
        assert_eq!(process.next_line().await.unwrap().as_deref(), Some("\u{FFFD}"));
        // A final line without a newline is still delivered.
        assert_eq!(process.next_line().await.unwrap().as_deref(), Some("last"));
        assert_eq!(process.next_line().await.unwrap(), None);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_follow_reads_lines() {
        // `echo` ignores its arguments' meaning and prints them on one line.
        let runner = LogCommand::new("echo");
        let mut process = runner.follow(LogCategory::Audio).unwrap();

        assert_eq!(
            process.next_line().await.unwrap().as_deref(),
            Some("audio logs --follow")
        );
        assert_eq!(process.next_line().await.unwrap(), None);
        process.wait().await.unwrap();
    }
}
