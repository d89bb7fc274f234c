//! Captured console and network activity (spec §3, §6 "Observability feeds").

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warning,
    Error,
}

impl ConsoleLevel {
    pub fn from_cdp_type(raw: &str) -> Self {
        match raw {
            "error" => ConsoleLevel::Error,
            "warning" => ConsoleLevel::Warning,
            "info" => ConsoleLevel::Info,
            _ => ConsoleLevel::Log,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConsoleRecord {
    pub level: ConsoleLevel,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NetworkRecord {
    pub url: String,
    pub method: String,
    pub status: Option<u16>,
    /// `true` when a `mock_network` rule answered this request rather than
    /// the real network.
    pub mocked: bool,
    pub timestamp: DateTime<Utc>,
}
