//! Child-agent records tracked by the health monitor.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Observed liveness status of a child agent, as reported by the
/// `AgentTracker` contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChildStatus {
    Starting,
    Idle,
    Busy,
    Unhealthy,
    Dead,
    Stopped,
    Failed,
    Unknown,
}

impl ChildStatus {
    /// Statuses the health monitor treats as "crashed" and eligible for
    /// reassignment of any task the child was holding.
    pub fn is_crashed(self) -> bool {
        matches!(
            self,
            Self::Dead | Self::Failed | Self::Stopped | Self::Unknown | Self::Unhealthy
        )
    }
}

impl fmt::Display for ChildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Starting => "starting",
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Unhealthy => "unhealthy",
            Self::Dead => "dead",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

impl FromStr for ChildStatus {
    type Err = ChildStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "starting" => Ok(Self::Starting),
            "idle" => Ok(Self::Idle),
            "busy" => Ok(Self::Busy),
            "unhealthy" => Ok(Self::Unhealthy),
            "dead" => Ok(Self::Dead),
            "stopped" => Ok(Self::Stopped),
            "failed" => Ok(Self::Failed),
            "unknown" => Ok(Self::Unknown),
            other => Err(ChildStatusParseError(other.to_owned())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChildStatusParseError(pub String);

impl fmt::Display for ChildStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid child status: {:?}", self.0)
    }
}

impl std::error::Error for ChildStatusParseError {}

/// A child agent the parent has spawned and is monitoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChildAgent {
    pub address: String,
    pub name: String,
    pub role: String,
    pub status: ChildStatus,
    pub sandbox_id: Option<String>,
    pub last_checked: DateTime<Utc>,
}
