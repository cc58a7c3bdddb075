use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::extract::{result_for, DocumentExtractor, IngestionItem};
use super::job::{Job, JobId, JobKind, JobLifecycleError, JobResult};
use crate::notifications::{NotificationBus, SyncEvent};

/// Registry entry for one job.
///
/// `announce` is held for the whole of a milestone publish, so one job's events reach listeners
/// in lifecycle order. It is separate from `job` so listeners may take snapshots while an
/// event is being delivered.
struct JobSlot {
    job: Mutex<Job>,
    announce: Mutex<()>,
}

impl JobSlot {
    fn new(job: Job) -> Self {
        Self {
            job: Mutex::new(job),
            announce: Mutex::new(()),
        }
    }

    fn job(&self) -> MutexGuard<'_, Job> {
        self.job.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn announce(&self) -> MutexGuard<'_, ()> {
        self.announce.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owns every ingestion job for the lifetime of the process.
///
/// Mutations are serialised per job; different jobs never contend on the same lock. Callers only
/// ever see cloned snapshots. Listeners must not finalize the job whose event they are handling.
pub struct JobOrchestrator {
    jobs: RwLock<HashMap<JobId, Arc<JobSlot>>>,
    sequence: AtomicU64,
    bus: Arc<NotificationBus>,
}

impl JobOrchestrator {
    pub fn new(bus: Arc<NotificationBus>) -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
            sequence: AtomicU64::new(1),
            bus,
        }
    }

    pub fn bus(&self) -> &Arc<NotificationBus> {
        &self.bus
    }

    fn next_job_id(&self) -> JobId {
        let id = self.sequence.fetch_add(1, Ordering::Relaxed);
        JobId(format!("job-{id:06}"))
    }

    /// Register a queued job and announce it with `SyncStarted`.
    ///
    /// The job is visible to pollers as soon as it is registered, but its announcement lock is
    /// taken first and held until `SyncStarted` has been delivered, so a concurrent `finalize`
    /// cannot publish `SyncCompleted` ahead of it.
    pub fn create(&self, kind: JobKind) -> Job {
        let job = Job::queued(self.next_job_id(), kind, Utc::now());
        let snapshot = job.clone();
        let slot = Arc::new(JobSlot::new(job));

        let announcing = slot.announce();
        self.write_jobs()
            .insert(snapshot.id.clone(), Arc::clone(&slot));

        info!(job_id = %snapshot.id, kind = ?kind, "ingestion job created");
        self.bus
            .publish(SyncEvent::started(snapshot.id.clone(), kind));
        drop(announcing);

        snapshot
    }

    pub fn append_result(
        &self,
        job_id: &JobId,
        result: JobResult,
    ) -> Result<Job, JobLifecycleError> {
        let slot = self.slot(job_id)?;
        let mut job = slot.job();
        let filename = result.filename.clone();
        let status = result.status;

        if let Err(err) = job.record(result, Utc::now()) {
            warn!(job_id = %job_id, filename = %filename, error = %err, "result rejected");
            return Err(err);
        }

        debug!(
            job_id = %job_id,
            filename = %filename,
            result = ?status,
            results = job.summary.len(),
            "result appended"
        );
        Ok(job.clone())
    }

    /// Freeze the job's terminal status and announce `SyncCompleted`.
    ///
    /// Finalizing an already terminal job returns the frozen snapshot unchanged and publishes
    /// nothing.
    pub fn finalize(&self, job_id: &JobId) -> Result<Job, JobLifecycleError> {
        let slot = self.slot(job_id)?;
        let announcing = slot.announce();
        let (snapshot, newly_frozen) = {
            let mut job = slot.job();
            let newly_frozen = job.freeze(Utc::now())?;
            (job.clone(), newly_frozen)
        };

        if newly_frozen {
            info!(
                job_id = %job_id,
                status = %snapshot.status,
                succeeded = snapshot.succeeded_count(),
                failed = snapshot.failed_count(),
                "ingestion job finalized"
            );
            self.bus.publish(SyncEvent::completed(
                snapshot.id.clone(),
                snapshot.kind,
                snapshot.status,
            ));
        } else {
            debug!(job_id = %job_id, status = %snapshot.status, "job already finalized");
        }
        drop(announcing);

        Ok(snapshot)
    }

    /// Consistent copy of the job's current state.
    pub fn snapshot(&self, job_id: &JobId) -> Result<Job, JobLifecycleError> {
        let slot = self.slot(job_id)?;
        let job = slot.job().clone();
        Ok(job)
    }

    /// All job snapshots ordered by id.
    pub fn jobs(&self) -> Vec<Job> {
        let slots: Vec<Arc<JobSlot>> = self.read_jobs().values().cloned().collect();
        let mut jobs: Vec<Job> = slots.iter().map(|slot| slot.job().clone()).collect();
        jobs.sort_by(|left, right| left.id.cmp(&right.id));
        jobs
    }

    /// Forget a job, returning its last snapshot.
    pub fn discard(&self, job_id: &JobId) -> Result<Job, JobLifecycleError> {
        let slot = self
            .write_jobs()
            .remove(job_id)
            .ok_or_else(|| JobLifecycleError::NotFound(job_id.clone()))?;
        let job = slot.job().clone();
        debug!(job_id = %job_id, status = %job.status, "ingestion job discarded");
        Ok(job)
    }

    /// Run a whole batch through `extractor` as one job and return its terminal snapshot.
    ///
    /// If the job is discarded while the batch is running, the run is abandoned with
    /// `NotFound` and no `SyncCompleted` follows the `SyncStarted` already announced.
    pub fn ingest<E>(
        &self,
        kind: JobKind,
        items: &[IngestionItem],
        extractor: &E,
    ) -> Result<Job, JobLifecycleError>
    where
        E: DocumentExtractor + ?Sized,
    {
        if items.is_empty() {
            return Err(JobLifecycleError::EmptyBatch);
        }

        let job = self.create(kind);
        for (position, item) in items.iter().enumerate() {
            let result = result_for(item, extractor.extract(item));
            if let Err(err) = self.append_result(&job.id, result) {
                warn!(
                    job_id = %job.id,
                    processed = position,
                    remaining = items.len() - position,
                    error = %err,
                    "ingestion batch abandoned"
                );
                return Err(err);
            }
        }
        self.finalize(&job.id)
    }

    fn slot(&self, job_id: &JobId) -> Result<Arc<JobSlot>, JobLifecycleError> {
        self.read_jobs()
            .get(job_id)
            .cloned()
            .ok_or_else(|| JobLifecycleError::NotFound(job_id.clone()))
    }

    fn read_jobs(&self) -> RwLockReadGuard<'_, HashMap<JobId, Arc<JobSlot>>> {
        self.jobs.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_jobs(&self) -> RwLockWriteGuard<'_, HashMap<JobId, Arc<JobSlot>>> {
        self.jobs.write().unwrap_or_else(PoisonError::into_inner)
    }
}
