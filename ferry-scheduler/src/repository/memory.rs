//! In-memory store
//!
//! Holds every table in one mutex-guarded state value. Each trait method
//! takes the lock once, which gives it the same all-or-nothing behaviour as
//! a database transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::Mutex;
use uuid::Uuid;

use ferry_core::domain::code_import::{CodeImport, NextRun, ReviewStatus};
use ferry_core::domain::event::{EventType, ImportEvent, NewEvent};
use ferry_core::domain::job::{Job, JobState};
use ferry_core::domain::machine::{
    Admission, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_MAX_CONCURRENT_JOBS, Machine, MachineState,
    OfflineReason,
};
use ferry_core::domain::result::{ImportResult, ResultStatus};
use ferry_core::dto::import::CreateCodeImport;
use ferry_core::dto::machine::RegisterMachine;

use super::{
    Claim, FinishJob, Finished, ImportStore, JobStore, LogFileStore, MachineStore, StoreError,
    StoreResult, StoredLogFile, Transition,
};

/// Store that keeps everything in process memory
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

#[derive(Default)]
struct State {
    machines: BTreeMap<String, Machine>,
    imports: BTreeMap<i64, CodeImport>,
    jobs: BTreeMap<i64, Job>,
    results: Vec<ImportResult>,
    events: Vec<ImportEvent>,
    log_files: HashMap<Uuid, StoredLogFile>,
    last_id: i64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl State {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn record(&mut self, event: NewEvent, now: DateTime<Utc>) {
        let id = self.next_id();
        self.events.push(ImportEvent {
            id,
            event_type: event.event_type,
            code_import_id: event.code_import_id,
            machine: event.machine,
            message: event.message,
            date_created: now,
        });
    }

    fn running_on(&self, hostname: &str) -> u32 {
        let count = self
            .jobs
            .values()
            .filter(|job| job.state == JobState::Running && job.machine.as_deref() == Some(hostname))
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    fn queue_job(
        &mut self,
        code_import_id: i64,
        due: DateTime<Utc>,
        requested_by: Option<String>,
        now: DateTime<Utc>,
    ) -> Job {
        let id = self.next_id();
        let job = Job {
            id,
            code_import_id,
            state: JobState::Pending,
            machine: None,
            date_created: now,
            date_due: due,
            date_started: None,
            heartbeat: None,
            logtail: String::new(),
            requested_by,
        };
        self.jobs.insert(id, job.clone());
        job
    }

    fn go_offline(&mut self, hostname: &str, reason: OfflineReason, now: DateTime<Utc>) {
        if let Some(machine) = self.machines.get_mut(hostname) {
            machine.state = MachineState::Offline;
            machine.offline_reason = Some(reason);
        }
        self.record(
            NewEvent::for_machine(EventType::Offline, hostname).with_message(reason.as_str()),
            now,
        );
    }

    fn consecutive_failures(&self, code_import_id: i64) -> u32 {
        let count = self
            .results
            .iter()
            .rev()
            .filter(|result| result.code_import_id == code_import_id)
            .take_while(|result| !result.status.is_success())
            .count();
        u32::try_from(count).unwrap_or(u32::MAX)
    }

    /// Records the result of a RUNNING job, removes it and queues the next run
    fn finish(
        &mut self,
        job: Job,
        status: ResultStatus,
        log_file: Option<Uuid>,
        failure_limit: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<Finished> {
        let result = ImportResult {
            id: self.next_id(),
            code_import_id: job.code_import_id,
            machine: job.machine.clone(),
            status,
            log_file,
            log_excerpt: Some(job.logtail.clone()),
            date_job_started: job.date_started,
            date_created: now,
        };
        self.results.push(result.clone());
        self.jobs.remove(&job.id);

        let failure_count = self.consecutive_failures(job.code_import_id);
        let started = job.date_started.unwrap_or(now);
        let next_run = {
            let import = self.imports.get_mut(&job.code_import_id).ok_or_else(|| {
                StoreError::Corrupt(format!(
                    "job {} references missing import {}",
                    job.id, job.code_import_id
                ))
            })?;
            if status.is_success() {
                import.date_last_successful = Some(now);
            }
            import.next_run(status, failure_count, failure_limit, started, now)
        };

        let mut next_job_id = None;
        let mut import_failing = false;
        match next_run {
            NextRun::At(due) => {
                next_job_id = Some(self.queue_job(job.code_import_id, due, None, now).id);
            }
            NextRun::MarkFailing => {
                if let Some(import) = self.imports.get_mut(&job.code_import_id) {
                    import.review_status = ReviewStatus::Failing;
                }
                import_failing = true;
            }
            NextRun::Idle => {}
        }

        let event_type = if status == ResultStatus::Reclaimed {
            EventType::Reclaim
        } else {
            EventType::Finish
        };
        let mut event =
            NewEvent::for_import(event_type, job.code_import_id).with_message(status.as_str());
        if let Some(hostname) = &job.machine {
            event = event.on_machine(hostname);
        }
        self.record(event, now);

        let mut machine_offline = false;
        if let Some(hostname) = &job.machine {
            let quiescing = self
                .machines
                .get(hostname)
                .is_some_and(|m| m.state == MachineState::Quiescing);
            if quiescing && self.running_on(hostname) == 0 {
                self.go_offline(hostname, OfflineReason::Quiesced, now);
                machine_offline = true;
            }
        }

        Ok(Finished {
            result,
            next_job_id,
            import_failing,
            machine_offline,
        })
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn claim_job(
        &self,
        hostname: &str,
        worker_limit: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<Claim> {
        let mut state = self.state.lock().await;

        if !state.machines.contains_key(hostname) {
            state.machines.insert(
                hostname.to_string(),
                Machine {
                    hostname: hostname.to_string(),
                    state: MachineState::Online,
                    offline_reason: None,
                    heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
                    max_concurrent_jobs: worker_limit.max(DEFAULT_MAX_CONCURRENT_JOBS),
                    registered_at: now,
                },
            );
            state.record(
                NewEvent::for_machine(EventType::Online, hostname)
                    .with_message("registered on first job request"),
                now,
            );
        }

        let running = state.running_on(hostname);
        let (machine_state, admission) = match state.machines.get(hostname) {
            Some(machine) => (machine.state, machine.admission(running, worker_limit)),
            None => (MachineState::Offline, Admission::Refuse),
        };

        match admission {
            Admission::Refuse => return Ok(Claim::Refused(machine_state)),
            Admission::GoOffline => {
                state.go_offline(hostname, OfflineReason::Quiesced, now);
                return Ok(Claim::WentOffline);
            }
            Admission::Accept => {}
        }

        let next = state
            .jobs
            .values()
            .filter(|job| job.is_claimable(now))
            .min_by_key(|job| (job.requested_by.is_none(), job.date_due, job.id))
            .map(|job| job.id);

        let Some(job_id) = next else {
            return Ok(Claim::NothingDue);
        };

        let code_import_id = match state.jobs.get_mut(&job_id) {
            Some(job) => {
                job.state = JobState::Running;
                job.machine = Some(hostname.to_string());
                job.date_started = Some(now);
                job.heartbeat = Some(now);
                job.logtail = String::new();
                job.code_import_id
            }
            None => return Ok(Claim::NothingDue),
        };
        state.record(
            NewEvent::for_import(EventType::Start, code_import_id).on_machine(hostname),
            now,
        );

        Ok(Claim::Claimed(job_id))
    }

    async fn find_job(&self, id: i64) -> StoreResult<Option<Job>> {
        Ok(self.state.lock().await.jobs.get(&id).cloned())
    }

    async fn find_job_with_import(&self, id: i64) -> StoreResult<Option<(Job, CodeImport)>> {
        let state = self.state.lock().await;
        Ok(state.jobs.get(&id).and_then(|job| {
            state
                .imports
                .get(&job.code_import_id)
                .map(|import| (job.clone(), import.clone()))
        }))
    }

    async fn list_jobs(&self) -> StoreResult<Vec<Job>> {
        let state = self.state.lock().await;
        let mut jobs: Vec<Job> = state.jobs.values().cloned().collect();
        jobs.sort_by_key(|job| (job.date_due, job.id));
        Ok(jobs)
    }

    async fn update_heartbeat(
        &self,
        id: i64,
        log_tail: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.jobs.get_mut(&id) {
            Some(job) if job.state == JobState::Running => {
                job.heartbeat = Some(job.heartbeat.map_or(now, |beat| beat.max(now)));
                job.logtail = log_tail.to_string();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn finish_job(&self, finish: FinishJob) -> StoreResult<Option<Finished>> {
        let mut state = self.state.lock().await;
        let job = match state.jobs.get(&finish.job_id) {
            Some(job) if job.state == JobState::Running => job.clone(),
            _ => return Ok(None),
        };
        state
            .finish(
                job,
                finish.status,
                finish.log_file,
                finish.failure_limit,
                finish.now,
            )
            .map(Some)
    }

    async fn find_stale_jobs(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<i64>> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .values()
            .filter(|job| job.is_stale(cutoff))
            .map(|job| job.id)
            .collect())
    }

    async fn reclaim_job(
        &self,
        id: i64,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Finished>> {
        let mut state = self.state.lock().await;
        let job = match state.jobs.get(&id) {
            Some(job) if job.is_stale(cutoff) => job.clone(),
            _ => return Ok(None),
        };
        // Reclaimed jobs are re-queued regardless of the failure count
        state
            .finish(job, ResultStatus::Reclaimed, None, u32::MAX, now)
            .map(Some)
    }
}

#[async_trait]
impl MachineStore for MemoryStore {
    async fn register_machine(
        &self,
        req: &RegisterMachine,
        now: DateTime<Utc>,
    ) -> StoreResult<Machine> {
        let mut state = self.state.lock().await;
        if state.machines.contains_key(&req.hostname) {
            return Err(StoreError::Conflict(format!(
                "machine {} is already registered",
                req.hostname
            )));
        }

        let machine = Machine {
            hostname: req.hostname.clone(),
            state: MachineState::Offline,
            offline_reason: None,
            heartbeat_interval: req.heartbeat_interval.unwrap_or(DEFAULT_HEARTBEAT_INTERVAL),
            max_concurrent_jobs: req
                .max_concurrent_jobs
                .unwrap_or(DEFAULT_MAX_CONCURRENT_JOBS),
            registered_at: now,
        };
        state.machines.insert(machine.hostname.clone(), machine.clone());
        Ok(machine)
    }

    async fn find_machine(&self, hostname: &str) -> StoreResult<Option<Machine>> {
        Ok(self.state.lock().await.machines.get(hostname).cloned())
    }

    async fn list_machines(&self) -> StoreResult<Vec<Machine>> {
        Ok(self.state.lock().await.machines.values().cloned().collect())
    }

    async fn running_job_count(&self, hostname: &str) -> StoreResult<u32> {
        Ok(self.state.lock().await.running_on(hostname))
    }

    async fn transition_machine(
        &self,
        hostname: &str,
        next: MachineState,
        reason: Option<OfflineReason>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Transition>> {
        let mut state = self.state.lock().await;
        let Some(current) = state.machines.get(hostname).map(|m| m.state) else {
            return Ok(None);
        };
        if !current.can_transition_to(next) {
            return Ok(Some(Transition::Rejected { current }));
        }

        if next == MachineState::Offline {
            state.go_offline(hostname, reason.unwrap_or(OfflineReason::Stopped), now);
        } else {
            if let Some(machine) = state.machines.get_mut(hostname) {
                machine.state = next;
                machine.offline_reason = None;
            }
            let event_type = if next == MachineState::Online {
                EventType::Online
            } else {
                EventType::Quiesce
            };
            state.record(NewEvent::for_machine(event_type, hostname), now);
        }

        Ok(state
            .machines
            .get(hostname)
            .cloned()
            .map(Transition::Applied))
    }
}

#[async_trait]
impl ImportStore for MemoryStore {
    async fn create_import(
        &self,
        req: &CreateCodeImport,
        now: DateTime<Utc>,
    ) -> StoreResult<CodeImport> {
        let mut state = self.state.lock().await;
        if state
            .imports
            .values()
            .any(|import| import.target_name == req.target_name)
        {
            return Err(StoreError::Conflict(format!(
                "an import into {} already exists",
                req.target_name
            )));
        }

        let import = CodeImport {
            id: state.next_id(),
            target_name: req.target_name.clone(),
            rcs_type: req.rcs_type,
            target_rcs_type: req.target_rcs_type,
            url: req.url.clone(),
            cvs_root: req.cvs_root.clone(),
            cvs_module: req.cvs_module.clone(),
            review_status: ReviewStatus::Reviewed,
            update_interval: req.update_interval,
            date_created: now,
            date_last_successful: None,
        };
        state.imports.insert(import.id, import.clone());
        state.queue_job(import.id, now, None, now);
        state.record(NewEvent::for_import(EventType::Create, import.id), now);
        Ok(import)
    }

    async fn find_import(&self, id: i64) -> StoreResult<Option<CodeImport>> {
        Ok(self.state.lock().await.imports.get(&id).cloned())
    }

    async fn list_imports(&self) -> StoreResult<Vec<CodeImport>> {
        Ok(self.state.lock().await.imports.values().cloned().collect())
    }

    async fn request_import(
        &self,
        id: i64,
        requested_by: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Job>> {
        let mut state = self.state.lock().await;
        let Some(review_status) = state.imports.get(&id).map(|i| i.review_status) else {
            return Ok(None);
        };
        if review_status != ReviewStatus::Reviewed {
            return Err(StoreError::Conflict(format!(
                "import {} is {} and cannot be requested",
                id, review_status
            )));
        }

        let existing = state
            .jobs
            .values()
            .find(|job| job.code_import_id == id)
            .map(|job| (job.id, job.state));

        let job = match existing {
            Some((_, JobState::Running)) => {
                return Err(StoreError::Conflict(format!(
                    "import {} is already running",
                    id
                )));
            }
            Some((job_id, JobState::Pending)) => {
                let job = state
                    .jobs
                    .get_mut(&job_id)
                    .ok_or_else(|| StoreError::Corrupt(format!("job {} vanished", job_id)))?;
                job.requested_by = Some(requested_by.to_string());
                job.date_due = job.date_due.min(now);
                job.clone()
            }
            None => state.queue_job(id, now, Some(requested_by.to_string()), now),
        };

        state.record(
            NewEvent::for_import(EventType::Request, id).with_message(requested_by),
            now,
        );
        Ok(Some(job))
    }

    async fn list_results(&self, code_import_id: i64) -> StoreResult<Vec<ImportResult>> {
        let state = self.state.lock().await;
        Ok(state
            .results
            .iter()
            .rev()
            .filter(|result| result.code_import_id == code_import_id)
            .cloned()
            .collect())
    }

    async fn list_events(&self, limit: i64) -> StoreResult<Vec<ImportEvent>> {
        let state = self.state.lock().await;
        let limit = usize::try_from(limit).unwrap_or(0);
        Ok(state.events.iter().rev().take(limit).cloned().collect())
    }
}

#[async_trait]
impl LogFileStore for MemoryStore {
    async fn store_log_file(
        &self,
        filename: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<StoredLogFile> {
        let log_file = StoredLogFile {
            id: Uuid::new_v4(),
            filename: filename.to_string(),
            content: content.to_string(),
            date_created: now,
        };
        self.state
            .lock()
            .await
            .log_files
            .insert(log_file.id, log_file.clone());
        Ok(log_file)
    }

    async fn find_log_file(&self, id: Uuid) -> StoreResult<Option<StoredLogFile>> {
        Ok(self.state.lock().await.log_files.get(&id).cloned())
    }
}
