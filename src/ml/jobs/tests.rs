use super::*;
use std::sync::Arc;

#[test]
fn test_create_running() {
    let registry = MemoryJobRegistry::new();
    let job = registry.create("job-1").unwrap();

    assert_eq!(job.state, JobState::Running);
    assert_eq!(job.progress, 0);
    assert!(job.started_at.is_some());
    assert!(job.finished_at.is_none());
    assert_eq!(registry.get("job-1"), Some(job));
}

#[test]
fn test_create_is_idempotent_while_running() {
    let registry = MemoryJobRegistry::new();
    let first = registry.create("job-1").unwrap();
    let second = registry.create("job-1").unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_complete() {
    let registry = MemoryJobRegistry::new();
    registry.create("job-1").unwrap();
    let job = registry.complete("job-1", "MODEL_RELOADED").unwrap();

    assert_eq!(job.state, JobState::Done);
    assert_eq!(job.progress, 100);
    assert_eq!(job.message.as_deref(), Some("MODEL_RELOADED"));
    assert!(job.finished_at.is_some());
}

#[test]
fn test_fail_keeps_progress() {
    let registry = MemoryJobRegistry::new();
    registry.create("job-1").unwrap();
    let job = registry.fail("job-1", "TRAIN_TIMEOUT").unwrap();

    assert_eq!(job.state, JobState::Error);
    assert_eq!(job.progress, 0);
    assert_eq!(job.message.as_deref(), Some("TRAIN_TIMEOUT"));
}

#[test]
fn test_no_transition_out_of_terminal() {
    let registry = MemoryJobRegistry::new();
    registry.create("job-1").unwrap();
    registry.complete("job-1", "ok").unwrap();

    let err = registry.fail("job-1", "late").unwrap_err();
    assert_eq!(
        err,
        Error::JobFinished {
            job_id: "job-1".to_string(),
            state: JobState::Done,
        }
    );
    assert!(registry.complete("job-1", "again").is_err());
    assert!(registry.create("job-1").is_err());

    let job = registry.get("job-1").unwrap();
    assert_eq!(job.state, JobState::Done);
    assert_eq!(job.message.as_deref(), Some("ok"));
}

#[test]
fn test_complete_unknown_job() {
    let registry = MemoryJobRegistry::new();
    let err = registry.complete("missing", "ok").unwrap_err();
    assert_eq!(err, Error::JobNotFound("missing".to_string()));
    assert!(registry.get("missing").is_none());
}

#[test]
fn test_fail_unknown_job_records_error() {
    let registry = MemoryJobRegistry::new();
    let job = registry.fail("ghost", "TRAIN_CALL_FAILED").unwrap();

    assert_eq!(job.state, JobState::Error);
    assert!(job.started_at.is_none());
    assert_eq!(registry.get("ghost"), Some(job));
}

#[test]
fn test_concurrent_terminal_transition_happens_once() {
    let registry = Arc::new(MemoryJobRegistry::new());
    registry.create("job-1").unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let registry = registry.clone();
            std::thread::spawn(move || {
                if i % 2 == 0 {
                    registry.complete("job-1", "done").is_ok()
                } else {
                    registry.fail("job-1", "error").is_ok()
                }
            })
        })
        .collect();

    let succeeded = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(succeeded, 1);
    assert!(registry.get("job-1").unwrap().state.is_terminal());
}

#[test]
fn test_job_serializes_camel_case() {
    let registry = MemoryJobRegistry::new();
    let job = registry.create("job-1").unwrap();
    let json = serde_json::to_value(&job).unwrap();

    assert_eq!(json["jobId"], "job-1");
    assert_eq!(json["state"], "RUNNING");
    assert!(json.get("finishedAt").is_none());
}
