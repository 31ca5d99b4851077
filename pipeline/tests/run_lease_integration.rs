//! Overlapping triggers are recorded as skipped and never touch storage.

mod common;

use std::time::Duration;

use common::fixtures::*;
use pipeline::database::status;
use pipeline::operation_tracker::LeaseError;
use pipeline::run_context::Trigger;

async fn wait_for_release(pipeline: &TestPipeline) {
    for _ in 0..100 {
        if !pipeline.leases.is_busy(WORKFLOW_ID).await.unwrap() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("run lease was never released");
}

#[tokio::test]
async fn test_trigger_while_lease_held_is_skipped() {
    let spotify = MockSpotifyServer::start().await;
    spotify
        .mock_recently_played(tokens::ACCESS_TOKEN, recently_played_payload(50))
        .await;
    let env = TestConfigBuilder::new(&spotify.uri()).build();
    let pipeline = env.pipeline().await;

    pipeline
        .leases
        .try_acquire(WORKFLOW_ID, "long-running", Trigger::Scheduled)
        .await
        .unwrap();

    let record = pipeline.run_at(reference_logical_date()).await;

    assert_eq!(record.status, status::SKIPPED);
    assert!(record.error_message.unwrap().contains("long-running"));
    assert!(spotify.recently_played_queries().await.is_empty());
    assert!(!env.object_path(reference_run::RAW_KEY).exists());
    assert!(pipeline.database.stage_runs(&record.run_id).await.unwrap().is_empty());

    // The holder keeps its lease
    assert_eq!(
        pipeline.leases.holder(WORKFLOW_ID).await.unwrap().unwrap().run_id,
        "long-running"
    );

    let stored = pipeline.database.get_run(&record.run_id).await.unwrap().unwrap();
    assert_eq!(stored.status, status::SKIPPED);
}

#[tokio::test]
async fn test_lease_released_after_failure() {
    let spotify = MockSpotifyServer::start().await;
    spotify.mock_recently_played_status(500).await;
    let env = TestConfigBuilder::new(&spotify.uri()).build();
    let pipeline = env.pipeline().await;

    let record = pipeline.run_at(reference_logical_date()).await;

    assert_eq!(record.status, status::FAILED);
    assert!(!pipeline.leases.is_busy(WORKFLOW_ID).await.unwrap());
}

#[tokio::test]
async fn test_manual_trigger_runs_in_background() {
    let spotify = MockSpotifyServer::start().await;
    spotify
        .mock_recently_played(tokens::ACCESS_TOKEN, recently_played_payload(50))
        .await;
    let env = TestConfigBuilder::new(&spotify.uri()).build();
    let pipeline = env.pipeline().await;

    let ctx = pipeline.runner.trigger_manual().await.unwrap();
    assert_eq!(ctx.trigger, Trigger::Manual);

    wait_for_release(&pipeline).await;

    let record = pipeline.database.get_run(&ctx.run_id).await.unwrap().unwrap();
    assert_eq!(record.status, status::SUCCESS, "{:?}", record.error_message);
    assert_eq!(record.trigger, "manual");
    assert!(env.object_path(&ctx.raw_key(&ctx.artifact_name())).exists());
}

#[tokio::test]
async fn test_manual_trigger_rejected_while_busy() {
    let spotify = MockSpotifyServer::start().await;
    let env = TestConfigBuilder::new(&spotify.uri()).build();
    let pipeline = env.pipeline().await;

    pipeline
        .leases
        .try_acquire(WORKFLOW_ID, "scheduled-run", Trigger::Scheduled)
        .await
        .unwrap();

    let held = match pipeline.runner.trigger_manual().await {
        Err(LeaseError::Held(held)) => held,
        other => panic!("expected a held lease, got {:?}", other.map(|ctx| ctx.run_id)),
    };
    assert_eq!(held.holder.run_id, "scheduled-run");

    let runs = pipeline.database.recent_runs(WORKFLOW_ID, 10).await.unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, status::SKIPPED);
    assert_eq!(runs[0].trigger, "manual");
}

#[tokio::test]
async fn test_stale_lease_cleanup_unblocks_workflow() {
    let spotify = MockSpotifyServer::start().await;
    spotify
        .mock_recently_played(tokens::ACCESS_TOKEN, recently_played_payload(50))
        .await;
    let env = TestConfigBuilder::new(&spotify.uri()).build();
    let pipeline = env.pipeline().await;

    pipeline
        .leases
        .try_acquire(WORKFLOW_ID, "crashed-run", Trigger::Scheduled)
        .await
        .unwrap();

    // Negative age treats every lease as stale
    assert_eq!(pipeline.leases.cleanup_stale(-1).await.unwrap(), 1);

    let record = pipeline.run_at(reference_logical_date()).await;
    assert_eq!(record.status, status::SUCCESS, "{:?}", record.error_message);
}

#[tokio::test]
async fn test_lease_is_shared_between_processes_on_one_database() {
    let spotify = MockSpotifyServer::start().await;
    spotify
        .mock_recently_played(tokens::ACCESS_TOKEN, recently_played_payload(50))
        .await;
    let env = TestConfigBuilder::new(&spotify.uri()).build();
    // Same config directory and database file, separate runner and tracker
    let serve = env.pipeline().await;
    let cli = env.pipeline().await;

    serve
        .leases
        .try_acquire(WORKFLOW_ID, "scheduled-run", Trigger::Scheduled)
        .await
        .unwrap();

    let record = cli.run_at(reference_logical_date()).await;

    assert_eq!(record.status, status::SKIPPED);
    assert!(record.error_message.unwrap().contains("scheduled-run"));
    assert!(spotify.recently_played_queries().await.is_empty());
    assert!(!env.object_path(reference_run::RAW_KEY).exists());

    serve.leases.release(WORKFLOW_ID, "scheduled-run").await;
    let record = cli.run_at(reference_logical_date()).await;
    assert_eq!(record.status, status::SUCCESS, "{:?}", record.error_message);
}

#[tokio::test]
async fn test_opening_database_keeps_runs_of_live_holder() {
    let spotify = MockSpotifyServer::start().await;
    let env = TestConfigBuilder::new(&spotify.uri()).build();
    let serve = env.pipeline().await;

    let ctx = serve
        .runner
        .context(reference_logical_date(), Trigger::Scheduled);
    serve
        .leases
        .try_acquire(WORKFLOW_ID, &ctx.run_id, Trigger::Scheduled)
        .await
        .unwrap();
    serve
        .database
        .store_run(&pipeline::database::RunRecord {
            run_id: ctx.run_id.clone(),
            workflow_id: WORKFLOW_ID.to_string(),
            logical_date: ctx.logical_date,
            trigger: "scheduled".to_string(),
            status: status::RUNNING.to_string(),
            started_at: chrono::Utc::now(),
            completed_at: None,
            error_message: None,
            source_key: None,
            archived_count: None,
        })
        .await
        .unwrap();

    // A second process starting up must not fail the live run
    let cli = env.pipeline().await;

    let stored = cli.database.get_run(&ctx.run_id).await.unwrap().unwrap();
    assert_eq!(stored.status, status::RUNNING);
}
