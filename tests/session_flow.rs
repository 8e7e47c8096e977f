mod support;

use claimwatch::history::{SortKey, SortOrder, HISTORY_CAPACITY};
use claimwatch::pipeline::PipelineEvent;
use claimwatch::settings::{FileStore, SimSpeed};
use claimwatch::types::Stage;
use claimwatch::{ExportError, Notice, NoticeLevel, PipelineError, Session, StageStatus, Verdict};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use support::{fixed_session, RecordingObserver, CLAIM};

#[tokio::test(start_paused = true)]
async fn full_run_reports_every_stage_in_order() {
    let (session, observer) = fixed_session(Verdict::False, 0.91);
    let result = session.analyze(CLAIM).await.unwrap();
    assert_eq!(result.verdict, Verdict::False);
    assert_eq!(result.confidence_percent(), 91);

    let completed: Vec<Stage> = observer
        .taken()
        .into_iter()
        .filter_map(|e| match e {
            PipelineEvent::StageComplete { stage } => Some(stage),
            _ => None,
        })
        .collect();
    assert_eq!(completed, Stage::ORDER.to_vec());
    assert!(session.stages().iter().all(|s| s.status == StageStatus::Complete));
    session.stop_graph();
}

#[tokio::test(start_paused = true)]
async fn second_request_is_rejected_while_running() {
    let (session, _) = fixed_session(Verdict::True, 0.9);
    let (first, second) = futures::join!(session.analyze(CLAIM), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        session.analyze("Another claim that is long enough").await
    });
    assert!(first.is_ok());
    assert_eq!(second.unwrap_err(), PipelineError::Concurrency);
    assert_eq!(session.history_count(), 1);
    assert_eq!(session.analysis_count(), 1);
    session.stop_graph();
}

#[tokio::test(start_paused = true)]
async fn short_claim_leaves_state_untouched() {
    let (session, observer) = fixed_session(Verdict::True, 0.9);
    let err = session.analyze("  too short ").await.unwrap_err();
    assert!(matches!(err, PipelineError::Validation { min: 10, .. }));
    assert!(observer.taken().is_empty());
    assert_eq!(session.history_count(), 0);
    assert!(!session.is_running());
}

#[tokio::test(start_paused = true)]
async fn low_confidence_run_recommends_review() {
    let (session, observer) = fixed_session(Verdict::Unverified, 0.55);
    session.analyze(CLAIM).await.unwrap();
    tokio::time::sleep(Duration::from_millis(600)).await;
    let events = observer.taken();
    assert!(events.contains(&PipelineEvent::HumanReviewRecommended { confidence: 0.55 }));
    session.stop_graph();
}

#[tokio::test(start_paused = true)]
async fn history_evicts_oldest_past_capacity_and_never_reuses_ids() {
    let (session, _) = fixed_session(Verdict::False, 0.8);
    for _ in 0..=HISTORY_CAPACITY {
        session.analyze(CLAIM).await.unwrap();
    }
    let history = session.history();
    assert_eq!(history.len(), HISTORY_CAPACITY);
    assert_eq!(history[0].id, HISTORY_CAPACITY as u64 + 1);
    assert!(session.view(1).is_none());

    assert!(session.delete(history[0].id));
    let next = session.analyze(CLAIM).await.unwrap();
    assert_eq!(next.id, HISTORY_CAPACITY as u64 + 2);
    session.stop_graph();
}

#[tokio::test(start_paused = true)]
async fn search_sort_and_reset() {
    let (session, _) = fixed_session(Verdict::False, 0.8);
    session.analyze(CLAIM).await.unwrap();
    session.analyze("Photo of a shark swimming on a highway").await.unwrap();

    assert_eq!(session.search("SHARK").len(), 1);
    assert_eq!(session.search("").len(), 2);
    let by_claim = session.sorted_history(SortKey::Claim, SortOrder::Ascending);
    assert!(by_claim[0].claim.starts_with("Photo"));
    // sorting is a view; stored order is newest first
    assert_eq!(session.history()[0].id, 2);

    // deleting an unknown id is a no-op that reports nothing removed
    assert!(!session.delete(999));
    assert_eq!(session.history_count(), 2);

    session.reset_history();
    assert_eq!(session.history_count(), 0);
    session.stop_graph();
}

#[tokio::test(start_paused = true)]
async fn csv_export_has_one_line_per_entry() {
    let (session, _) = fixed_session(Verdict::True, 0.88);
    session.analyze(CLAIM).await.unwrap();
    session.analyze("Claim with \"quotes\" and,\ncommas inside").await.unwrap();
    let (name, csv) = session.export_table(Utc::now()).unwrap();
    assert!(name.starts_with("claimwatch-history-"));
    assert_eq!(csv.lines().count(), 3);
    assert!(csv.contains("\"Claim with \"\"quotes\"\" and, commas inside\""));
    session.stop_graph();
}

#[test]
fn settings_survive_restart_through_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let open = || Session::new(Arc::new(FileStore::in_dir(dir.path())), Arc::new(RecordingObserver::default()), Some(1));

    let first = open();
    assert_eq!(first.settings().sim_speed, SimSpeed::Medium);
    first.set_sim_speed(SimSpeed::Slow);
    first.set_feedback_rating(4);
    drop(first);

    let second = open();
    assert_eq!(second.settings().sim_speed, SimSpeed::Slow);
    assert_eq!(second.settings().feedback_rating, 4);
    assert!(dir.path().join("storage.json").exists());
}

#[tokio::test]
async fn export_write_failure_is_reported_not_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, b"plain file").unwrap();
    let target = blocker.join("sub");

    let (session, _) = fixed_session(Verdict::False, 0.87);
    // history is checked before the filesystem is touched
    assert!(matches!(session.save_table(&target, Utc::now()).await, Err(ExportError::EmptyHistory)));

    tokio::time::pause();
    session.analyze(CLAIM).await.unwrap();
    tokio::time::resume();
    assert!(matches!(session.save_table(&target, Utc::now()).await, Err(ExportError::Io(_))));
    assert!(matches!(session.save_report(&target, Utc::now()).await, Err(ExportError::Io(_))));
    let notice = Notice::from(&session.save_table(&target, Utc::now()).await.unwrap_err());
    assert_eq!(notice.level, NoticeLevel::Error);

    // the session keeps working afterwards
    assert_eq!(session.history_count(), 1);
    let csv = session.save_table(dir.path(), Utc::now()).await.unwrap();
    assert!(std::fs::read_to_string(csv).unwrap().starts_with("ID,Claim,Verdict,Confidence,Timestamp"));
    let pdf = session.save_report(&dir.path().join("reports"), Utc::now()).await.unwrap();
    assert!(std::fs::read(pdf).unwrap().starts_with(b"%PDF"));
    session.stop_graph();
}
