//! Integration tests for the filesystem-backed test repository: no browser
//! required, just the public `orchestrator-registry` surface.

use orchestrator_registry::{FilesystemTestRepository, RegistryError};
use serde_json::json;
use tempfile::tempdir;

#[tokio::test]
async fn loads_every_json_file_in_the_directory() {
    let dir = tempdir().unwrap();
    std::fs::write(
        dir.path().join("login.json"),
        json!({"id": "login", "steps": [{"eval": "1", "as": "x"}]}).to_string(),
    )
    .unwrap();
    std::fs::write(
        dir.path().join("logout.json"),
        json!({"id": "logout", "steps": []}).to_string(),
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

    let repo = FilesystemTestRepository::load_dir(dir.path()).await.unwrap();

    let mut ids = repo.ids();
    ids.sort();
    assert_eq!(ids, vec!["login".to_string(), "logout".to_string()]);
}

#[tokio::test]
async fn missing_test_id_is_not_found() {
    let dir = tempdir().unwrap();
    let repo = FilesystemTestRepository::load_dir(dir.path()).await.unwrap();
    assert!(matches!(repo.get("nope"), Err(RegistryError::NotFound(id)) if id == "nope"));
}

#[tokio::test]
async fn missing_directory_surfaces_as_io_error() {
    let err = FilesystemTestRepository::load_dir("/no/such/directory/surely")
        .await
        .unwrap_err();
    assert!(matches!(err, RegistryError::Io { .. }));
}
