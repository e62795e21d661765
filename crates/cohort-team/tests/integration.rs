//! Integration tests for the cohort-team crate.
//!
//! These exercise the fabric end to end: inbox FIFO, broadcast exclusion,
//! graceful team shutdown, and inbox durability across manager instances.

use std::sync::Arc;

use cohort_team::{
    CreateTeamOutcome, InboxMessage, MessageKind, TeammateManager, TeammateRecord,
    TeammateRunner, TeammateStatus,
};

// ═══════════════════════════════════════════════════════════════════════
//  Messaging
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn inbox_fifo_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let manager = TeammateManager::new(dir.path()).await.unwrap();
    manager.create_team("alpha").await.unwrap();
    manager.spawn_teammate("alice", "alpha", "").await.unwrap();

    manager
        .send_message("alice", "First", MessageKind::Message, None, None)
        .await
        .unwrap();
    manager
        .send_message("alice", "Second", MessageKind::Message, None, None)
        .await
        .unwrap();

    let messages = manager.check_inbox("alice", None).await.unwrap();
    let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, vec!["First", "Second"]);

    assert!(manager.check_inbox("alice", None).await.unwrap().is_empty());
}

#[tokio::test]
async fn broadcast_reaches_everyone_but_the_sender() {
    let dir = tempfile::tempdir().unwrap();
    let manager = TeammateManager::new(dir.path()).await.unwrap();
    manager.create_team("alpha").await.unwrap();
    for name in ["lead", "worker1", "worker2"] {
        manager.spawn_teammate(name, "alpha", "").await.unwrap();
    }

    manager
        .send_message("", "hi", MessageKind::Broadcast, Some("lead"), Some("alpha"))
        .await
        .unwrap();

    assert!(manager.check_inbox("lead", None).await.unwrap().is_empty());
    for name in ["worker1", "worker2"] {
        let messages = manager.check_inbox(name, None).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hi");
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Shutdown
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn delete_team_shuts_members_down() {
    let dir = tempfile::tempdir().unwrap();
    let manager = TeammateManager::new(dir.path()).await.unwrap();
    manager.create_team("alpha").await.unwrap();
    manager.spawn_teammate("a", "alpha", "").await.unwrap();
    manager.spawn_teammate("b", "alpha", "").await.unwrap();

    let a = manager.find_teammate("a", Some("alpha")).unwrap();
    let b = manager.find_teammate("b", Some("alpha")).unwrap();

    manager.delete_team("alpha").await.unwrap();

    // Statuses flipped, team no longer listed.
    assert_eq!(a.status(), TeammateStatus::Shutdown);
    assert_eq!(b.status(), TeammateStatus::Shutdown);
    assert!(manager.list_teams().is_empty());

    // Each inbox holds at least one shutdown request.
    for record in [a, b] {
        let pending = record.inbox().drain().await.unwrap();
        assert!(
            pending.iter().any(|m| m.kind == MessageKind::ShutdownRequest),
            "missing shutdown_request for {}",
            record.name()
        );
    }
}

#[tokio::test]
async fn runner_observes_shutdown_via_record() {
    // A minimal runner that parks until its record reports shutdown.
    struct ParkedRunner(tokio::sync::mpsc::UnboundedSender<&'static str>);

    #[async_trait::async_trait]
    impl TeammateRunner for ParkedRunner {
        async fn run(&self, teammate: Arc<TeammateRecord>, _prompt: String) {
            while !teammate.is_shutdown() {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
            let _ = self.0.send("exited");
        }
    }

    let dir = tempfile::tempdir().unwrap();
    let manager = TeammateManager::new(dir.path()).await.unwrap();
    manager.create_team("alpha").await.unwrap();

    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    manager.set_runner(Arc::new(ParkedRunner(tx)));
    manager.spawn_teammate("alice", "alpha", "").await.unwrap();

    manager.delete_team("alpha").await.unwrap();

    // The detached worker notices the sticky flip and exits on its own.
    let exited = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
        .await
        .expect("runner should exit after delete_team");
    assert_eq!(exited, Some("exited"));
}

// ═══════════════════════════════════════════════════════════════════════
//  Durability
// ═══════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn inbox_files_survive_manager_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let manager = TeammateManager::new(dir.path()).await.unwrap();
        manager.create_team("alpha").await.unwrap();
        manager.spawn_teammate("alice", "alpha", "").await.unwrap();
        manager
            .send_message("alice", "persisted", MessageKind::Message, Some("lead"), None)
            .await
            .unwrap();
    }

    // A new manager instance over the same directory re-registers the
    // teammate; the undrained inbox file is still there.
    let manager = TeammateManager::new(dir.path()).await.unwrap();
    assert_eq!(
        manager.create_team("alpha").await.unwrap(),
        CreateTeamOutcome::Created
    );
    manager.spawn_teammate("alice", "alpha", "").await.unwrap();

    let messages = manager.check_inbox("alice", None).await.unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "persisted");
}

#[tokio::test]
async fn inbox_layout_matches_teams_directory_convention() {
    let dir = tempfile::tempdir().unwrap();
    let manager = TeammateManager::new(dir.path()).await.unwrap();
    manager.create_team("alpha").await.unwrap();
    manager.spawn_teammate("alice", "alpha", "").await.unwrap();

    manager
        .send_message("alice", "hello", MessageKind::Message, None, None)
        .await
        .unwrap();

    let inbox_path = dir.path().join("alpha").join("alice.jsonl");
    let raw = std::fs::read_to_string(&inbox_path).unwrap();
    let parsed: InboxMessage = serde_json::from_str(raw.lines().next().unwrap()).unwrap();
    assert_eq!(parsed.content, "hello");
}
