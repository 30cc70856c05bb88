//! Application state management.

use crate::command::LogCommand;
use crate::config::Config;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Default interval between keep-alive pings on follow streams.
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(15);

/// Returned when every follow stream slot is taken.
#[derive(Debug, Error)]
#[error("maximum number of concurrent log streams ({0}) reached")]
pub struct StreamLimitReached(pub usize);

/// Shared application state.
///
/// Immutable after construction; handlers never coordinate through it.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    /// Runner for the CLI logs subcommands
    command: LogCommand,
    /// Follow stream slots, if the number of concurrent streams is capped
    stream_slots: Option<(Arc<Semaphore>, usize)>,
    /// Keep-alive ping interval for follow streams (None disables pings)
    keepalive: Option<Duration>,
}

impl AppState {
    /// Create new application state.
    pub fn new(command: LogCommand, max_streams: Option<usize>, keepalive: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                command,
                stream_slots: max_streams.map(|n| (Arc::new(Semaphore::new(n)), n)),
                keepalive,
            }),
        }
    }

    /// Create application state from the loaded configuration.
    pub fn from_config(config: &Config) -> Self {
        let command = LogCommand::new(config.command.clone())
            .with_leading_args(config.command_args.clone())
            .with_timeout(config.command_timeout);
        Self::new(command, config.max_streams, config.keepalive)
    }

    /// Get the CLI runner.
    pub fn command(&self) -> &LogCommand {
        &self.inner.command
    }

    /// Get the keep-alive ping interval.
    pub fn keepalive(&self) -> Option<Duration> {
        self.inner.keepalive
    }

    /// Reserve a follow stream slot.
    ///
    /// Returns `Ok(None)` when streams are not capped. The slot is released
    /// when the returned permit is dropped.
    pub fn try_acquire_stream(&self) -> Result<Option<OwnedSemaphorePermit>, StreamLimitReached> {
        let Some((slots, max)) = &self.inner.stream_slots else {
            return Ok(None);
        };
        match slots.clone().try_acquire_owned() {
            Ok(permit) => {
                debug!(
                    "Acquired log stream slot ({} of {} free)",
                    slots.available_permits(),
                    max
                );
                Ok(Some(permit))
            }
            Err(_) => Err(StreamLimitReached(*max)),
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(LogCommand::default(), None, Some(DEFAULT_KEEPALIVE))
    }
}
