//! WebSocket endpoint streaming followed logs.

use axum::body::Bytes;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures::{Sink, SinkExt, Stream, StreamExt};
use ha_logs_types::{ErrorResponse, LogCategory};
use std::time::Duration;
use tokio::time::{interval_at, Instant, Interval};
use tracing::{debug, error, info, trace, warn};

use super::parse_category;
use crate::command::{CommandError, LogCommand};
use crate::state::AppState;

/// How a relay ended without a process error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The command exited successfully after its output was fully relayed.
    Completed,
    /// The client closed the connection or a write to it failed.
    ClientGone,
}

/// Stream the live logs of a category over a WebSocket.
///
/// Runs `ha <category> logs --follow` and sends every line of its stdout as
/// one text message, in order. The command is killed as soon as the client
/// goes away; the connection is closed once the command ends.
///
/// Example usage from JavaScript:
/// ```javascript
/// const ws = new WebSocket('ws://localhost:5642/api/logs/core/follow');
/// ws.onmessage = (event) => console.log(event.data);
/// ```
pub async fn follow_logs(
    State(state): State<AppState>,
    Path(category): Path<String>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let category = match parse_category(&category) {
        Ok(category) => category,
        Err(rejection) => return rejection.into_response(),
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => {
            warn!("WebSocket upgrade failed for {} logs: {}", category, rejection);
            return rejection.into_response();
        }
    };

    let permit = match state.try_acquire_stream() {
        Ok(permit) => permit,
        Err(e) => {
            warn!("Rejecting {} logs follow: {}", category, e);
            return (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse::new(e.to_string())),
            )
                .into_response();
        }
    };

    ws.on_upgrade(move |socket| async move {
        handle_socket(socket, state, category).await;
        drop(permit);
    })
}

/// Handle an individual follow connection.
async fn handle_socket(socket: WebSocket, state: AppState, category: LogCategory) {
    let (mut sender, receiver) = socket.split();

    info!("Client connected to {} logs follow", category);

    match relay(
        state.command(),
        category,
        state.keepalive(),
        &mut sender,
        receiver,
    )
    .await
    {
        Ok(StreamEnd::Completed) => info!("{} logs command finished", category),
        Ok(StreamEnd::ClientGone) => debug!("Client went away, stopped {} logs", category),
        Err(e) => error!("Error streaming {} logs: {}", category, e),
    }

    // Every path above ends here, so the connection is closed exactly once.
    let close = Message::Close(Some(CloseFrame {
        code: close_code::NORMAL,
        reason: "".into(),
    }));
    if let Err(e) = sender.send(close).await {
        debug!("Failed to send close frame: {}", e);
    }
    if let Err(e) = sender.close().await {
        debug!("Failed to close WebSocket: {}", e);
    }

    info!("Client disconnected from {} logs follow", category);
}

/// Relay the follow output of `category` into `sender` until the command
/// exits or the peer goes away.
///
/// `receiver` is only watched for the peer closing; its messages are ignored.
/// Whenever the relay stops before the command exits, the command is killed.
pub async fn relay<S, R, E>(
    command: &LogCommand,
    category: LogCategory,
    keepalive: Option<Duration>,
    sender: &mut S,
    mut receiver: R,
) -> Result<StreamEnd, CommandError>
where
    S: Sink<Message> + Unpin,
    R: Stream<Item = Result<Message, E>> + Unpin,
    E: std::fmt::Display,
{
    let mut process = command.follow(category)?;
    info!("Started '{}' (pid {:?})", process.invocation(), process.id());
    let mut keepalive = keepalive.map(|period| interval_at(Instant::now() + period, period));

    let end = loop {
        tokio::select! {
            line = process.next_line() => match line {
                Ok(Some(line)) => {
                    trace!("Relaying {} log line", category);
                    if sender.send(Message::Text(line.into())).await.is_err() {
                        debug!("Failed to send log line, client likely disconnected");
                        break StreamEnd::ClientGone;
                    }
                }
                Ok(None) => {
                    process.wait().await?;
                    break StreamEnd::Completed;
                }
                Err(e) => {
                    process.kill().await;
                    return Err(e);
                }
            },

            message = receiver.next() => match message {
                Some(Ok(Message::Close(_))) => {
                    info!("Client sent close message");
                    break StreamEnd::ClientGone;
                }
                Some(Ok(_)) => trace!("Ignoring message from follow client"),
                Some(Err(e)) => {
                    debug!("WebSocket error: {}", e);
                    break StreamEnd::ClientGone;
                }
                None => break StreamEnd::ClientGone,
            },

            _ = next_tick(&mut keepalive) => {
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    debug!("Failed to send ping, client likely disconnected");
                    break StreamEnd::ClientGone;
                }
            }
        }
    };

    if end == StreamEnd::ClientGone {
        process.kill().await;
    }
    Ok(end)
}

async fn next_tick(keepalive: &mut Option<Interval>) {
    match keepalive {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use futures::channel::mpsc;
    use futures::stream;
    use std::path::PathBuf;
    use tempfile::TempDir;

    /// A client that never sends anything and never disconnects.
    fn silent_client() -> stream::Pending<Result<Message, axum::Error>> {
        stream::pending()
    }

    /// Stand-in for the CLI: `sh <script> <category> logs --follow`.
    fn stub_command(dir: &TempDir, body: &str) -> LogCommand {
        let script = dir.path().join("ha.sh");
        std::fs::write(&script, body).unwrap();
        LogCommand::new("sh").with_leading_args(vec![script.to_string_lossy().into_owned()])
    }

    fn text(message: &Message) -> &str {
        match message {
            Message::Text(t) => t.as_str(),
            other => panic!("expected text message, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_relays_lines_in_order() {
        let dir = TempDir::new().unwrap();
        let command = stub_command(&dir, "printf 'a\\nb\\r\\nc\\n'");

        let (mut tx, rx) = mpsc::unbounded();
        let end = relay(
            &command,
            LogCategory::Core,
            None,
            &mut tx,
            silent_client(),
        )
        .await
        .unwrap();
        drop(tx);

        assert_eq!(end, StreamEnd::Completed);
        let messages: Vec<Message> = rx.collect().await;
        let lines: Vec<&str> = messages.iter().map(text).collect();
        assert_eq!(lines, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_invalid_utf8_does_not_end_the_stream() {
        let dir = TempDir::new().unwrap();
        let command = stub_command(&dir, "printf 'a\\n\\377\\nc\\n'");

        let (mut tx, rx) = mpsc::unbounded();
        let end = relay(
            &command,
            LogCategory::Host,
            None,
            &mut tx,
            silent_client(),
        )
        .await
        .unwrap();
        drop(tx);

        assert_eq!(end, StreamEnd::Completed);
        let messages: Vec<Message> = rx.collect().await;
        let lines: Vec<&str> = messages.iter().map(text).collect();
        assert_eq!(lines, ["a", "\u{FFFD}", "c"]);
    }

    #[tokio::test]
    async fn test_keepalive_pings_while_idle() {
        let dir = TempDir::new().unwrap();
        let command = stub_command(&dir, "sleep 0.4");

        let (mut tx, rx) = mpsc::unbounded();
        let end = relay(
            &command,
            LogCategory::Core,
            Some(Duration::from_millis(50)),
            &mut tx,
            silent_client(),
        )
        .await
        .unwrap();
        drop(tx);

        assert_eq!(end, StreamEnd::Completed);
        let messages: Vec<Message> = rx.collect().await;
        assert!(!messages.is_empty());
        assert!(messages.iter().all(|m| matches!(m, Message::Ping(_))));
    }

    #[tokio::test]
    async fn test_failed_ping_stops_a_silent_command() {
        let dir = TempDir::new().unwrap();
        let pid_file = dir.path().join("pid");
        let command = stub_command(
            &dir,
            &format!("echo $$ > '{}'\nexec sleep 30", pid_file.display()),
        );

        // The command never prints, so only the ping can notice the closed sink.
        let (mut tx, rx) = mpsc::unbounded::<Message>();
        drop(rx);

        let end = tokio::time::timeout(
            Duration::from_secs(5),
            relay(
                &command,
                LogCategory::Dns,
                Some(Duration::from_millis(200)),
                &mut tx,
                silent_client(),
            ),
        )
        .await
        .expect("relay should stop once a ping fails")
        .unwrap();
        assert_eq!(end, StreamEnd::ClientGone);

        #[cfg(target_os = "linux")]
        if let Ok(pid) = std::fs::read_to_string(&pid_file) {
            let proc_dir = PathBuf::from(format!("/proc/{}", pid.trim()));
            assert!(!proc_dir.exists(), "command should have been killed");
        }
    }

    #[tokio::test]
    async fn test_arguments_reach_the_command() {
        let dir = TempDir::new().unwrap();
        let command = stub_command(&dir, "echo \"$@\"");

        let (mut tx, rx) = mpsc::unbounded();
        relay(
            &command,
            LogCategory::Supervisor,
            None,
            &mut tx,
            silent_client(),
        )
        .await
        .unwrap();
        drop(tx);

        let messages: Vec<Message> = rx.collect().await;
        assert_eq!(text(&messages[0]), "supervisor logs --follow");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_an_error() {
        let dir = TempDir::new().unwrap();
        let command = stub_command(&dir, "echo partial\nexit 3");

        let (mut tx, rx) = mpsc::unbounded();
        let result = relay(
            &command,
            LogCategory::Host,
            None,
            &mut tx,
            silent_client(),
        )
        .await;
        drop(tx);

        match result {
            Err(CommandError::Exit(status)) => assert_eq!(status.code(), Some(3)),
            other => panic!("expected exit error, got {:?}", other),
        }
        // Lines relayed before the failure are kept.
        let messages: Vec<Message> = rx.collect().await;
        assert_eq!(messages.len(), 1);
    }

    #[tokio::test]
    async fn test_spawn_failure_is_an_error() {
        let command = LogCommand::new("/nonexistent/ha-logs-proxy-test-binary");
        let (mut tx, _rx) = mpsc::unbounded();
        let result = relay(
            &command,
            LogCategory::Dns,
            None,
            &mut tx,
            silent_client(),
        )
        .await;
        assert!(matches!(result, Err(CommandError::Spawn { .. })));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_failed_send_kills_the_command() {
        let dir = TempDir::new().unwrap();
        let pid_file = dir.path().join("pid");
        let command = stub_command(
            &dir,
            &format!(
                "echo $$ > '{}'\nwhile :; do echo tick; sleep 0.05; done",
                pid_file.display()
            ),
        );

        // A closed channel makes the very first send fail.
        let (mut tx, rx) = mpsc::unbounded::<Message>();
        drop(rx);

        let end = relay(
            &command,
            LogCategory::Audio,
            None,
            &mut tx,
            silent_client(),
        )
        .await
        .unwrap();
        assert_eq!(end, StreamEnd::ClientGone);

        let pid = std::fs::read_to_string(&pid_file).unwrap();
        let proc_dir = PathBuf::from(format!("/proc/{}", pid.trim()));
        assert!(!proc_dir.exists(), "command should have been killed");
    }

    #[tokio::test]
    async fn test_client_close_stops_the_relay() {
        let dir = TempDir::new().unwrap();
        let command = stub_command(&dir, "while :; do echo tick; sleep 0.05; done");

        let (mut tx, _rx) = mpsc::unbounded();
        let client = stream::iter(vec![Ok::<_, axum::Error>(Message::Close(None))]);

        let end = tokio::time::timeout(
            Duration::from_secs(5),
            relay(&command, LogCategory::Multicast, None, &mut tx, client),
        )
        .await
        .expect("relay should stop when the client closes")
        .unwrap();
        assert_eq!(end, StreamEnd::ClientGone);
    }
}
