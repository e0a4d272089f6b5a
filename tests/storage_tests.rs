//! Integration tests for the file-backed snapshot store
//!
//! Covers key handling on disk and restoring a client from a saved snapshot.

mod common;

use std::sync::Arc;

use common::{FakeApi, FakeConnector, T0, quiet_config};
use docchat::{ChatClient, FileSnapshotStore, ManualScheduler, SnapshotStore};

mod file_store_tests {
    use super::*;

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut store = FileSnapshotStore::new(dir.path());
        let value = r#"[{"id":"1","content":"hi","sender":"bot","timestamp":"2025-06-01T09:00:00Z"}]"#;

        store.save("chat-messages", value).expect("Failed to save");
        assert_eq!(store.load("chat-messages"), Some(value.to_string()));
        assert!(dir.path().join("chat-messages.json").exists());
    }

    #[test]
    fn test_load_missing_key() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let store = FileSnapshotStore::new(dir.path());
        assert_eq!(store.load("nothing-here"), None);
    }

    #[test]
    fn test_save_creates_directory() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let nested = dir.path().join("a").join("b");
        let mut store = FileSnapshotStore::new(&nested);

        store.save("k", "v").expect("Failed to save");
        assert!(nested.is_dir());
        assert_eq!(store.dir(), nested.as_path());
    }

    #[test]
    fn test_overwrite() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut store = FileSnapshotStore::new(dir.path());

        store.save("k", "first").expect("Failed to save");
        store.save("k", "second").expect("Failed to save");
        assert_eq!(store.load("k"), Some("second".to_string()));
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut store = FileSnapshotStore::new(dir.path());

        store.save("to_delete", "value").expect("Failed to save");
        store.remove("to_delete").expect("Failed to remove");
        assert_eq!(store.load("to_delete"), None);

        // Removing again is fine
        store.remove("to_delete").expect("Failed to remove twice");
    }

    #[test]
    fn test_keys_stay_inside_directory() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let mut store = FileSnapshotStore::new(dir.path());

        store.save("../escape", "v").expect("Failed to save");
        assert!(dir.path().join("___escape.json").exists());
        assert_eq!(store.load("../escape"), Some("v".to_string()));
    }
}

mod restore_tests {
    use super::*;

    fn client_with(store: FileSnapshotStore) -> ChatClient {
        ChatClient::new(
            quiet_config(),
            Arc::new(FakeApi::default()),
            Box::new(FakeConnector::default()),
            Box::new(ManualScheduler::new(T0)),
            Box::new(store),
        )
    }

    #[tokio::test]
    async fn test_client_restores_from_disk() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");

        {
            let mut client = client_with(FileSnapshotStore::new(dir.path()));
            assert!(client.send_message("keep this").await);
        }

        let client = client_with(FileSnapshotStore::new(dir.path()));
        let messages = client.messages();
        assert_eq!(messages.len(), 2);
        assert!(messages[0].is_greeting());
        assert_eq!(messages[1].content, "keep this");
    }

    #[tokio::test]
    async fn test_client_ignores_corrupt_file() {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        std::fs::write(dir.path().join("chat-messages.json"), "{ broken")
            .expect("Failed to seed file");

        let client = client_with(FileSnapshotStore::new(dir.path()));
        assert_eq!(client.messages().len(), 1);
        assert!(client.messages()[0].is_greeting());
    }
}
