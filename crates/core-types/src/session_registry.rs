//! Session Registry contract (spec §4.7): maps a caller-supplied session
//! identifier to the CDP target currently serving it, so a second run
//! against the same session id can reuse a live tab instead of opening a
//! fresh one. Interface only — persistence and eviction policy belong to
//! whatever external collaborator implements it (`orchestrator-registry`
//! supplies an in-memory one).

use async_trait::async_trait;

use crate::ids::TargetId;

/// One entry in the Session Registry: a session id mapped to the CDP target
/// currently serving it.
#[derive(Clone, Debug)]
pub struct SessionEntry {
    pub target_id: TargetId,
}

#[async_trait]
pub trait SessionRegistry: Send + Sync {
    async fn get_target_id(&self, session_id: &str) -> Option<TargetId>;
    async fn register(&self, session_id: &str, entry: SessionEntry);
    async fn unregister(&self, session_id: &str);
    async fn list(&self) -> Vec<String>;
}

/// Default registry for callers that never pass a session id: every lookup
/// misses, so the CDP Tab Client always falls through to the non-session
/// branches of its target-selection algorithm.
pub struct NullSessionRegistry;

#[async_trait]
impl SessionRegistry for NullSessionRegistry {
    async fn get_target_id(&self, _session_id: &str) -> Option<TargetId> {
        None
    }

    async fn register(&self, _session_id: &str, _entry: SessionEntry) {}

    async fn unregister(&self, _session_id: &str) {}

    async fn list(&self) -> Vec<String> {
        Vec::new()
    }
}
