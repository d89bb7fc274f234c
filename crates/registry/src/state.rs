use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use orchestrator_core_types::TargetId;
use orchestrator_core_types::TestDefinition;
use step_flow::TestRepository;
use tracing::warn;

use crate::api::SessionRegistry;
use crate::errors::RegistryError;
use crate::model::SessionEntry;

/// In-memory [`SessionRegistry`] implementation used during Phase 1
/// bring-up. A single process only ever runs one test at a time today
/// (see `run-coordinator`), so contention here is expected to be light.
#[derive(Default)]
pub struct InMemorySessionRegistry {
    sessions: DashMap<String, SessionEntry>,
}

impl InMemorySessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionRegistry for InMemorySessionRegistry {
    async fn get_target_id(&self, session_id: &str) -> Option<TargetId> {
        self.sessions.get(session_id).map(|e| e.target_id.clone())
    }

    async fn register(&self, session_id: &str, entry: SessionEntry) {
        self.sessions.insert(session_id.to_string(), entry);
    }

    async fn unregister(&self, session_id: &str) {
        self.sessions.remove(session_id);
    }

    async fn list(&self) -> Vec<String> {
        self.sessions.iter().map(|e| e.key().clone()).collect()
    }
}

/// External Test Repository (spec §4.7): loads every `*.json` test
/// definition under a directory once at construction and serves
/// `run_test` lookups out of memory.
pub struct FilesystemTestRepository {
    tests: DashMap<String, TestDefinition>,
}

impl FilesystemTestRepository {
    /// Reads every `*.json` file directly under `dir` (non-recursive) and
    /// parses it as a [`TestDefinition`], keyed by its own `id` field.
    pub async fn load_dir(dir: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let dir = dir.as_ref();
        let mut entries = tokio::fs::read_dir(dir).await.map_err(|source| RegistryError::Io {
            path: dir.display().to_string(),
            source,
        })?;

        let tests = DashMap::new();
        while let Some(entry) = entries.next_entry().await.map_err(|source| RegistryError::Io {
            path: dir.display().to_string(),
            source,
        })? {
            let path: PathBuf = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let raw = tokio::fs::read_to_string(&path).await.map_err(|source| RegistryError::Io {
                path: path.display().to_string(),
                source,
            })?;
            let def: TestDefinition =
                serde_json::from_str(&raw).map_err(|source| RegistryError::Parse {
                    path: path.display().to_string(),
                    source,
                })?;

            if let Some(previous) = tests.insert(def.id.clone(), def) {
                warn!(test_id = %previous.id, "duplicate test id, last file wins");
            }
        }

        Ok(Self { tests })
    }

    pub fn get(&self, id: &str) -> Result<TestDefinition, RegistryError> {
        self.tests
            .get(id)
            .map(|e| e.value().clone())
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    pub fn ids(&self) -> Vec<String> {
        self.tests.iter().map(|e| e.key().clone()).collect()
    }
}

#[async_trait]
impl TestRepository for FilesystemTestRepository {
    async fn get_test(&self, id: &str) -> Option<TestDefinition> {
        self.tests.get(id).map(|e| e.value().clone())
    }
}

pub fn shared(repo: FilesystemTestRepository) -> Arc<dyn TestRepository> {
    Arc::new(repo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    #[tokio::test]
    async fn loads_tests_by_id() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("login.json"),
            json!({"id": "login", "steps": []}).to_string(),
        )
        .unwrap();

        let repo = FilesystemTestRepository::load_dir(dir.path()).await.unwrap();
        assert_eq!(repo.len(), 1);
        assert!(repo.get("login").is_ok());
        assert!(matches!(repo.get("missing"), Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn ignores_non_json_files() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("README.md"), "not a test").unwrap();
        let repo = FilesystemTestRepository::load_dir(dir.path()).await.unwrap();
        assert!(repo.is_empty());
    }
}
