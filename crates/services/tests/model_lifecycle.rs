mod common;

use std::time::Duration;

use common::{TestWorkspace, fast_config, git_client};
use services::services::model::ModelEvent;
use vcs::{CommitOptions, OperationKind, RepositoryState, ResourceStatus};

#[tokio::test]
async fn test_init_add_commit_round() {
    let Some(client) = git_client().await else {
        return;
    };
    let ws = TestWorkspace::new(client, fast_config(false));
    let model = &ws.model;

    assert_eq!(model.state(), RepositoryState::Uninitialized);
    ws.init().await;
    assert_eq!(model.state(), RepositoryState::Idle);

    ws.write_file("a.txt", "hello\n");
    model.status().await.unwrap();
    let snapshot = model.snapshot();
    let working_tree = &snapshot.groups.working_tree.resources;
    assert_eq!(working_tree.len(), 1);
    assert!(working_tree[0].path.ends_with("a.txt"));
    assert_eq!(working_tree[0].status, ResourceStatus::Untracked);

    model.add(vec![ws.path("a.txt")]).await.unwrap();
    let snapshot = model.snapshot();
    assert!(snapshot.groups.working_tree.is_empty());
    let index = &snapshot.groups.index.resources;
    assert_eq!(index.len(), 1);
    assert!(index[0].path.ends_with("a.txt"));
    assert_eq!(index[0].status, ResourceStatus::IndexAdded);

    let before = ws.commit_count();
    model
        .commit("initial".into(), CommitOptions::default())
        .await
        .unwrap();
    let snapshot = model.snapshot();
    assert!(snapshot.groups.index.is_empty());
    assert!(snapshot.groups.working_tree.is_empty());
    assert_eq!(ws.commit_count(), before + 1);

    let head = snapshot.head.as_ref().expect("head after commit");
    assert_eq!(head.commit.as_deref(), Some(ws.head_oid().as_str()));
    assert!(model.operations().is_idle());
}

#[tokio::test]
async fn test_operation_events_bracket_run() {
    let Some(client) = git_client().await else {
        return;
    };
    let ws = TestWorkspace::new(client, fast_config(false));
    ws.init().await;

    let mut events = ws.model.subscribe();
    ws.model.status().await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            ModelEvent::OperationStarted(OperationKind::Status),
            ModelEvent::ResourcesChanged,
            ModelEvent::OperationCompleted(OperationKind::Status),
        ]
    );
}

#[tokio::test]
async fn test_clean_splits_untracked_and_tracked() {
    let Some(client) = git_client().await else {
        return;
    };
    let ws = TestWorkspace::new(client, fast_config(false));
    ws.init().await;
    let model = &ws.model;

    ws.write_file("tracked.txt", "v1\n");
    model.add(vec![]).await.unwrap();
    model
        .commit("base".into(), CommitOptions::default())
        .await
        .unwrap();

    ws.write_file("tracked.txt", "v2\n");
    ws.write_file("scratch.txt", "tmp\n");
    model.status().await.unwrap();
    assert_eq!(model.snapshot().groups.working_tree.len(), 2);

    model
        .clean(vec![ws.path("tracked.txt"), ws.path("scratch.txt")])
        .await
        .unwrap();

    assert!(model.snapshot().groups.working_tree.is_empty());
    assert!(!ws.path("scratch.txt").exists());
    assert_eq!(
        std::fs::read_to_string(ws.path("tracked.txt")).unwrap(),
        "v1\n"
    );
}

#[tokio::test]
async fn test_stage_and_revert() {
    let Some(client) = git_client().await else {
        return;
    };
    let ws = TestWorkspace::new(client, fast_config(false));
    ws.init().await;
    let model = &ws.model;

    ws.write_file("notes.md", "one\n");
    model.add(vec![]).await.unwrap();
    model
        .commit("notes".into(), CommitOptions::default())
        .await
        .unwrap();

    model
        .stage(ws.path("notes.md"), "one\ntwo\n".into())
        .await
        .unwrap();
    let snapshot = model.snapshot();
    assert_eq!(snapshot.groups.index.len(), 1);
    assert_eq!(
        snapshot.groups.index.resources[0].status,
        ResourceStatus::IndexModified
    );
    // Working copy untouched, so it now differs from the index
    assert_eq!(
        std::fs::read_to_string(ws.path("notes.md")).unwrap(),
        "one\n"
    );

    let repo = git2::Repository::open(&ws.root).unwrap();
    let entry = repo.index().unwrap().get_path(std::path::Path::new("notes.md"), 0).unwrap();
    let blob = repo.find_blob(entry.id).unwrap();
    assert_eq!(blob.content(), b"one\ntwo\n");

    model.revert(vec![ws.path("notes.md")]).await.unwrap();
    assert!(model.snapshot().groups.index.is_empty());
}

#[tokio::test]
async fn test_branch_and_show() {
    let Some(client) = git_client().await else {
        return;
    };
    let ws = TestWorkspace::new(client, fast_config(false));
    ws.init().await;
    let model = &ws.model;

    ws.write_file("lib.rs", "pub fn a() {}\n");
    model.add(vec![]).await.unwrap();
    model
        .commit("lib".into(), CommitOptions::default())
        .await
        .unwrap();

    model.branch("feature".into(), true).await.unwrap();
    let head = model.snapshot().head.clone().unwrap();
    assert_eq!(head.name.as_deref(), Some("feature"));
    assert!(model.snapshot().refs.iter().any(|r| r.name == "feature"));

    ws.write_file("lib.rs", "pub fn b() {}\n");
    let shown = model
        .show("HEAD".into(), ws.path("lib.rs"))
        .await
        .unwrap();
    assert_eq!(shown, "pub fn a() {}\n");
}

#[tokio::test]
async fn test_outside_repository() {
    let Some(client) = git_client().await else {
        return;
    };
    let ws = TestWorkspace::new(client, fast_config(false));

    let err = ws.model.add(vec![]).await.unwrap_err();
    assert!(err.is_not_a_repository());
    assert_eq!(ws.model.state(), RepositoryState::NotARepository);
    assert!(ws.model.operations().is_idle());
    assert!(ws.model.repository().await.is_none());
}

#[tokio::test]
async fn test_workspace_change_triggers_refresh() {
    let Some(client) = git_client().await else {
        return;
    };
    let ws = TestWorkspace::new(client, fast_config(true));
    ws.init().await;
    assert!(ws.model.snapshot().groups.working_tree.is_empty());

    ws.write_file("watched.txt", "x\n");

    let mut snapshots = ws.model.watch_snapshot();
    tokio::time::timeout(
        Duration::from_secs(10),
        snapshots.wait_for(|s| !s.groups.working_tree.is_empty()),
    )
    .await
    .expect("refresh after filesystem change")
    .unwrap();
}

#[tokio::test]
async fn test_repository_appearing_is_picked_up() {
    let Some(client) = git_client().await else {
        return;
    };
    let ws = TestWorkspace::new(client, fast_config(true));

    assert!(ws.model.status().await.is_err());
    assert_eq!(ws.model.state(), RepositoryState::NotARepository);

    git2::Repository::init(&ws.root).unwrap();

    let mut state = ws.model.watch_state();
    tokio::time::timeout(
        Duration::from_secs(10),
        state.wait_for(|s| *s == RepositoryState::Idle),
    )
    .await
    .expect("repository detected")
    .unwrap();
}
