//! Log categories exposed by the proxy.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[cfg(feature = "openapi")]
use utoipa::ToSchema;

/// A log source understood by the host-management CLI.
///
/// The set is closed: routing only ever turns a path segment into one of
/// these variants, so nothing from the request reaches the command line
/// except through this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum LogCategory {
    Core,
    Supervisor,
    Host,
    Audio,
    Dns,
    Multicast,
}

impl LogCategory {
    /// Every category, in the order the endpoint listing presents them.
    pub const ALL: [LogCategory; 6] = [
        LogCategory::Core,
        LogCategory::Supervisor,
        LogCategory::Host,
        LogCategory::Audio,
        LogCategory::Dns,
        LogCategory::Multicast,
    ];

    /// Token passed to the CLI as its first argument.
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Core => "core",
            LogCategory::Supervisor => "supervisor",
            LogCategory::Host => "host",
            LogCategory::Audio => "audio",
            LogCategory::Dns => "dns",
            LogCategory::Multicast => "multicast",
        }
    }

    /// REST path serving the one-shot logs for this category.
    pub fn path(&self) -> String {
        format!("{}/{}", crate::LOGS_BASE_PATH, self.as_str())
    }

    /// WebSocket path streaming the followed logs for this category.
    pub fn follow_path(&self) -> String {
        format!("{}/follow", self.path())
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a known category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCategory(pub String);

impl fmt::Display for UnknownCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown log category '{}'", self.0)
    }
}

impl std::error::Error for UnknownCategory {}

impl FromStr for LogCategory {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LogCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Whether the CLI should dump the current logs or keep following them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogMode {
    Snapshot,
    Follow,
}
