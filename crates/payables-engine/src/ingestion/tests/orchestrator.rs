use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use super::common::*;
use crate::ingestion::{
    DocumentExtractor, DocumentType, Extraction, ExtractionError, IngestionItem, JobId, JobKind,
    JobLifecycleError, JobOrchestrator, JobStatus, ResultStatus,
};
use crate::notifications::{ListenerError, NotificationBus, SyncEvent, SyncEventKind};

#[test]
fn create_queues_job_and_announces_start() {
    let orchestrator = orchestrator();
    let log = Arc::new(EventLog::default());
    orchestrator.bus().subscribe(&log);

    let job = orchestrator.create(JobKind::Upload);

    assert_eq!(job.id, JobId("job-000001".to_string()));
    assert_eq!(job.status, JobStatus::Queued);
    assert!(job.summary.is_empty());
    assert!(job.completed_at.is_none());
    assert_eq!(log.for_job(&job.id), vec![SyncEventKind::SyncStarted]);
}

#[test]
fn first_result_moves_job_to_running() {
    let orchestrator = orchestrator();
    let job = orchestrator.create(JobKind::Sync);

    let running = orchestrator
        .append_result(&job.id, invoice("inv-1001.pdf"))
        .expect("append");

    assert_eq!(running.status, JobStatus::Running);
    assert_eq!(running.summary.len(), 1);
    assert!(running.updated_at >= job.created_at);
    assert_eq!(orchestrator.snapshot(&job.id).expect("snapshot"), running);
}

#[test]
fn finalize_aggregates_results() {
    let cases = [
        (vec![invoice("a.pdf"), invoice("b.pdf")], JobStatus::Succeeded),
        (vec![unreadable("a.pdf"), unreadable("b.pdf")], JobStatus::Failed),
        (vec![invoice("a.pdf"), unreadable("b.pdf")], JobStatus::PartiallyFailed),
    ];

    let orchestrator = orchestrator();
    for (results, expected) in cases {
        let job = orchestrator.create(JobKind::Upload);
        for result in results {
            orchestrator.append_result(&job.id, result).expect("append");
        }

        let frozen = orchestrator.finalize(&job.id).expect("finalize");
        assert_eq!(frozen.status, expected);
        assert_eq!(frozen.completed_at, Some(frozen.updated_at));
    }
}

#[test]
fn append_after_finalize_is_rejected_without_mutation() {
    let orchestrator = orchestrator();
    let job = orchestrator.create(JobKind::Upload);
    orchestrator
        .append_result(&job.id, invoice("inv-1.pdf"))
        .expect("append");
    let frozen = orchestrator.finalize(&job.id).expect("finalize");

    let err = orchestrator
        .append_result(&job.id, unreadable("late.pdf"))
        .expect_err("terminal job");

    assert_eq!(
        err,
        JobLifecycleError::AlreadyTerminal {
            job_id: job.id.clone(),
            status: JobStatus::Succeeded,
        }
    );
    assert_eq!(orchestrator.snapshot(&job.id).expect("snapshot"), frozen);
}

#[test]
fn finalize_twice_returns_identical_snapshot_and_announces_once() {
    let orchestrator = orchestrator();
    let log = Arc::new(EventLog::default());
    orchestrator.bus().subscribe(&log);

    let job = orchestrator.create(JobKind::Sync);
    orchestrator
        .append_result(&job.id, unreadable("statement.tif"))
        .expect("append");

    let first = orchestrator.finalize(&job.id).expect("first finalize");
    let second = orchestrator.finalize(&job.id).expect("second finalize");

    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).expect("serialize"),
        serde_json::to_string(&second).expect("serialize")
    );
    assert_eq!(
        log.for_job(&job.id),
        vec![SyncEventKind::SyncStarted, SyncEventKind::SyncCompleted]
    );
}

#[test]
fn finalize_without_results_leaves_job_queued() {
    let orchestrator = orchestrator();
    let log = Arc::new(EventLog::default());
    orchestrator.bus().subscribe(&log);
    let job = orchestrator.create(JobKind::Upload);

    let err = orchestrator.finalize(&job.id).expect_err("no results");

    assert_eq!(err, JobLifecycleError::NoResults(job.id.clone()));
    assert_eq!(orchestrator.snapshot(&job.id).expect("snapshot"), job);
    assert_eq!(log.for_job(&job.id), vec![SyncEventKind::SyncStarted]);
}

#[test]
fn late_subscriber_sees_no_events_for_finished_job() {
    let orchestrator = orchestrator();
    let job = orchestrator.create(JobKind::Upload);
    orchestrator
        .append_result(&job.id, invoice("inv-7.pdf"))
        .expect("append");
    orchestrator.finalize(&job.id).expect("finalize");

    let log = Arc::new(EventLog::default());
    orchestrator.bus().subscribe(&log);
    orchestrator.finalize(&job.id).expect("idempotent finalize");

    assert_eq!(log.len(), 0);
}

#[test]
fn unknown_jobs_are_not_found() {
    let orchestrator = orchestrator();
    let missing = JobId("job-999999".to_string());
    let not_found = JobLifecycleError::NotFound(missing.clone());

    assert_eq!(orchestrator.snapshot(&missing), Err(not_found.clone()));
    assert_eq!(
        orchestrator.append_result(&missing, invoice("a.pdf")),
        Err(not_found.clone())
    );
    assert_eq!(orchestrator.finalize(&missing), Err(not_found.clone()));
    assert_eq!(orchestrator.discard(&missing), Err(not_found));
}

#[test]
fn jobs_are_listed_in_id_order_and_discard_removes_them() {
    let orchestrator = orchestrator();
    let first = orchestrator.create(JobKind::Sync);
    let second = orchestrator.create(JobKind::Upload);
    let third = orchestrator.create(JobKind::Sync);

    let ids: Vec<JobId> = orchestrator.jobs().into_iter().map(|job| job.id).collect();
    assert_eq!(ids, vec![first.id.clone(), second.id.clone(), third.id.clone()]);

    let removed = orchestrator.discard(&second.id).expect("discard");
    assert_eq!(removed, second);

    let ids: Vec<JobId> = orchestrator.jobs().into_iter().map(|job| job.id).collect();
    assert_eq!(ids, vec![first.id, third.id]);
}

#[test]
fn ingest_runs_batch_through_extractor() {
    let orchestrator = orchestrator();
    let log = Arc::new(EventLog::default());
    orchestrator.bus().subscribe(&log);

    let items = vec![
        IngestionItem::new("inv-2044.pdf", b"%PDF-1.7".to_vec()),
        IngestionItem::new("po-7781.pdf", b"%PDF-1.4".to_vec()),
        IngestionItem::new("notes.docx", b"PK".to_vec()),
        IngestionItem::new("inv-blank.pdf", Vec::new()),
    ];

    let job = orchestrator
        .ingest(JobKind::Upload, &items, &PrefixExtractor)
        .expect("ingest");

    assert_eq!(job.status, JobStatus::PartiallyFailed);
    assert_eq!(job.succeeded_count(), 2);
    assert_eq!(job.failed_count(), 2);

    let filenames: Vec<&str> = job.summary.iter().map(|r| r.filename.as_str()).collect();
    assert_eq!(
        filenames,
        vec!["inv-2044.pdf", "po-7781.pdf", "notes.docx", "inv-blank.pdf"]
    );
    assert_eq!(job.summary[0].extracted_id.as_deref(), Some("INV-2044"));
    assert_eq!(job.summary[2].status, ResultStatus::Failure);
    assert!(job.summary[2].message.contains("unsupported file format"));
    assert_eq!(
        log.for_job(&job.id),
        vec![SyncEventKind::SyncStarted, SyncEventKind::SyncCompleted]
    );
}

#[test]
fn ingest_rejects_empty_batch_before_creating_a_job() {
    let orchestrator = orchestrator();
    let log = Arc::new(EventLog::default());
    orchestrator.bus().subscribe(&log);

    let err = orchestrator
        .ingest(JobKind::Sync, &[], &PrefixExtractor)
        .expect_err("empty batch");

    assert_eq!(err, JobLifecycleError::EmptyBatch);
    assert!(orchestrator.jobs().is_empty());
    assert_eq!(log.len(), 0);
}

#[test]
fn concurrent_appends_are_serialised_and_snapshots_never_torn() {
    let orchestrator = Arc::new(orchestrator());
    let job = orchestrator.create(JobKind::Sync);

    let writers: Vec<_> = (0..8)
        .map(|writer| {
            let orchestrator = Arc::clone(&orchestrator);
            let job_id = job.id.clone();
            thread::spawn(move || {
                for item in 0..25 {
                    let name = format!("w{writer}-{item}.pdf");
                    let result = if item % 5 == 0 {
                        unreadable(&name)
                    } else {
                        invoice(&name)
                    };
                    orchestrator.append_result(&job_id, result).expect("append");
                }
            })
        })
        .collect();

    let reader = {
        let orchestrator = Arc::clone(&orchestrator);
        let job_id = job.id.clone();
        thread::spawn(move || {
            for _ in 0..200 {
                let snapshot = orchestrator.snapshot(&job_id).expect("snapshot");
                let expected = if snapshot.summary.is_empty() {
                    JobStatus::Queued
                } else {
                    JobStatus::Running
                };
                assert_eq!(snapshot.status, expected);
            }
        })
    };

    for writer in writers {
        writer.join().expect("writer thread");
    }
    reader.join().expect("reader thread");

    let frozen = orchestrator.finalize(&job.id).expect("finalize");
    assert_eq!(frozen.summary.len(), 200);
    assert_eq!(frozen.failed_count(), 40);
    assert_eq!(frozen.status, JobStatus::PartiallyFailed);
}

#[test]
fn listeners_may_read_job_state_while_handling_events() {
    let bus = Arc::new(NotificationBus::new());
    let orchestrator = Arc::new(JobOrchestrator::new(Arc::clone(&bus)));
    let seen: Arc<Mutex<Vec<JobStatus>>> = Arc::new(Mutex::new(Vec::new()));

    let listener = {
        let orchestrator = Arc::downgrade(&orchestrator);
        let seen = Arc::clone(&seen);
        Arc::new(move |event: &SyncEvent| -> Result<(), ListenerError> {
            let orchestrator = orchestrator
                .upgrade()
                .ok_or_else(|| ListenerError::Unavailable("orchestrator gone".to_string()))?;
            let job = orchestrator
                .snapshot(&event.job_id)
                .map_err(|err| ListenerError::Rejected(err.to_string()))?;
            seen.lock().expect("seen poisoned").push(job.status);
            Ok(())
        })
    };
    bus.subscribe(&listener);

    let job = orchestrator.create(JobKind::Upload);
    orchestrator
        .append_result(&job.id, invoice("inv-5.pdf"))
        .expect("append");
    orchestrator.finalize(&job.id).expect("finalize");

    assert_eq!(
        *seen.lock().expect("seen poisoned"),
        vec![JobStatus::Queued, JobStatus::Succeeded]
    );
}

#[test]
fn poller_finalizing_during_slow_start_delivery_cannot_overtake_it() {
    let bus = Arc::new(NotificationBus::new());
    let orchestrator = Arc::new(JobOrchestrator::new(Arc::clone(&bus)));

    let slow = Arc::new(|event: &SyncEvent| -> Result<(), ListenerError> {
        if event.kind == SyncEventKind::SyncStarted {
            thread::sleep(Duration::from_millis(200));
        }
        Ok(())
    });
    let log = Arc::new(EventLog::default());
    bus.subscribe(&slow);
    bus.subscribe(&log);

    let poller = {
        let orchestrator = Arc::clone(&orchestrator);
        thread::spawn(move || loop {
            if let Some(job) = orchestrator.jobs().into_iter().next() {
                orchestrator
                    .append_result(&job.id, invoice("inv-race.pdf"))
                    .expect("append");
                orchestrator.finalize(&job.id).expect("finalize");
                break job.id;
            }
            thread::yield_now();
        })
    };

    let job = orchestrator.create(JobKind::Sync);
    let polled = poller.join().expect("poller thread");

    assert_eq!(polled, job.id);
    assert_eq!(
        log.for_job(&job.id),
        vec![SyncEventKind::SyncStarted, SyncEventKind::SyncCompleted]
    );
    assert_eq!(
        orchestrator.snapshot(&job.id).expect("snapshot").status,
        JobStatus::Succeeded
    );
}

/// Discards the running job on its second item.
struct DiscardingExtractor {
    orchestrator: Arc<JobOrchestrator>,
    calls: Mutex<usize>,
}

impl DocumentExtractor for DiscardingExtractor {
    fn extract(&self, _item: &IngestionItem) -> Result<Extraction, ExtractionError> {
        let mut calls = self.calls.lock().expect("calls poisoned");
        *calls += 1;
        if *calls == 2 {
            for job in self.orchestrator.jobs() {
                self.orchestrator.discard(&job.id).expect("discard");
            }
        }
        Ok(Extraction {
            document_type: DocumentType::Invoice,
            extracted_id: None,
        })
    }
}

#[test]
fn ingest_abandons_batch_when_job_is_discarded_midway() {
    let bus = Arc::new(NotificationBus::new());
    let orchestrator = Arc::new(JobOrchestrator::new(Arc::clone(&bus)));
    let log = Arc::new(EventLog::default());
    bus.subscribe(&log);

    let extractor = DiscardingExtractor {
        orchestrator: Arc::clone(&orchestrator),
        calls: Mutex::new(0),
    };
    let items = vec![
        IngestionItem::new("inv-1.pdf", b"%PDF".to_vec()),
        IngestionItem::new("inv-2.pdf", b"%PDF".to_vec()),
        IngestionItem::new("inv-3.pdf", b"%PDF".to_vec()),
    ];

    let err = orchestrator
        .ingest(JobKind::Upload, &items, &extractor)
        .expect_err("job vanished");

    let job_id = JobId("job-000001".to_string());
    assert_eq!(err, JobLifecycleError::NotFound(job_id.clone()));
    assert!(orchestrator.jobs().is_empty());
    assert_eq!(log.for_job(&job_id), vec![SyncEventKind::SyncStarted]);
}
