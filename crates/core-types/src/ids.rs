//! Identifiers shared across the orchestrator crates.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a CDP target (tab/page) the client is attached to.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct TargetId(pub String);

/// Unique identifier for an iframe resolved during `switch_frame`.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct FrameId(pub String);

/// Caller-supplied identifier used to look up a reusable session target.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

/// Identifier for a single orchestrator run, minted by the Run Coordinator.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RunId(pub String);

impl RunId {
    /// `ISO-8601 start instant (colons/dots replaced) + random suffix`, per spec §4.6.
    pub fn new(started_at: chrono::DateTime<chrono::Utc>) -> Self {
        let stamp = started_at
            .to_rfc3339()
            .replace(':', "-")
            .replace('.', "-");
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!("{stamp}-{}", &suffix[..8]))
    }
}

impl std::fmt::Display for TargetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
