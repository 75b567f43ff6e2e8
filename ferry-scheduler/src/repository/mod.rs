//! Repository Module
//!
//! Data access layer for the scheduler. Every operation here runs as a single
//! storage transaction, so callers never see a half-applied state change.
//!
//! The stores are trait-based: `PgStore` backs the running service and
//! `MemoryStore` backs the test suite. Both apply the same rules from
//! `ferry_core::domain`.

mod memory;
mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ferry_core::domain::code_import::CodeImport;
use ferry_core::domain::event::ImportEvent;
use ferry_core::domain::job::Job;
use ferry_core::domain::machine::{Machine, MachineState, OfflineReason};
use ferry_core::domain::result::{ImportResult, ResultStatus};
use ferry_core::dto::import::CreateCodeImport;
use ferry_core::dto::machine::RegisterMachine;
use serde::Serialize;
use uuid::Uuid;

/// Storage error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The change would violate a uniqueness or state constraint
    #[error("{0}")]
    Conflict(String),

    /// A stored value could not be mapped back onto the domain
    #[error("corrupt stored value: {0}")]
    Corrupt(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Outcome of a machine asking for work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// The job was marked RUNNING on the machine
    Claimed(i64),

    /// The machine may not take work in its current state or load
    Refused(MachineState),

    /// The machine was quiescing with nothing running and went OFFLINE
    WentOffline,

    /// The machine may take work but no job is due
    NothingDue,
}

/// A request to finish a RUNNING job
#[derive(Debug, Clone)]
pub struct FinishJob {
    pub job_id: i64,
    pub status: ResultStatus,
    pub log_file: Option<Uuid>,
    /// Consecutive failures after which the import is marked FAILING
    pub failure_limit: u32,
    pub now: DateTime<Utc>,
}

/// What finishing a job changed
#[derive(Debug, Clone)]
pub struct Finished {
    pub result: ImportResult,

    /// Job queued for the next run, if any
    pub next_job_id: Option<i64>,

    /// The import crossed the failure limit and was marked FAILING
    pub import_failing: bool,

    /// The job's machine was quiescing and has now gone OFFLINE
    pub machine_offline: bool,
}

/// Outcome of a requested machine state change
#[derive(Debug, Clone)]
pub enum Transition {
    Applied(Machine),
    Rejected { current: MachineState },
}

/// Log file held by the librarian
#[derive(Debug, Clone, Serialize)]
pub struct StoredLogFile {
    pub id: Uuid,
    pub filename: String,
    pub content: String,
    pub date_created: DateTime<Utc>,
}

/// Job Store operations
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Applies the admission rule for `hostname` and, if it may take work,
    /// claims the next due job for it
    ///
    /// Unknown hostnames are registered ONLINE first.
    async fn claim_job(&self, hostname: &str, worker_limit: u32, now: DateTime<Utc>)
    -> StoreResult<Claim>;

    async fn find_job(&self, id: i64) -> StoreResult<Option<Job>>;

    /// Job together with the import it belongs to
    async fn find_job_with_import(&self, id: i64) -> StoreResult<Option<(Job, CodeImport)>>;

    async fn list_jobs(&self) -> StoreResult<Vec<Job>>;

    /// Records a heartbeat; returns false when no RUNNING job has this id
    async fn update_heartbeat(&self, id: i64, log_tail: &str, now: DateTime<Utc>)
    -> StoreResult<bool>;

    /// Finishes a RUNNING job; returns `None` when no RUNNING job has this id
    async fn finish_job(&self, finish: FinishJob) -> StoreResult<Option<Finished>>;

    /// Ids of RUNNING jobs whose last heartbeat is older than `cutoff`
    async fn find_stale_jobs(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<i64>>;

    /// Finishes a stale job as RECLAIMED
    ///
    /// Staleness is checked again under lock; a job that heartbeated in the
    /// meantime, or is already gone, yields `None`.
    async fn reclaim_job(
        &self,
        id: i64,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Finished>>;
}

/// Machine Registry operations
#[async_trait]
pub trait MachineStore: Send + Sync {
    /// Registers a new machine in the OFFLINE state
    async fn register_machine(
        &self,
        req: &RegisterMachine,
        now: DateTime<Utc>,
    ) -> StoreResult<Machine>;

    async fn find_machine(&self, hostname: &str) -> StoreResult<Option<Machine>>;

    async fn list_machines(&self) -> StoreResult<Vec<Machine>>;

    async fn running_job_count(&self, hostname: &str) -> StoreResult<u32>;

    /// Moves a machine to `next` if the state machine allows it
    async fn transition_machine(
        &self,
        hostname: &str,
        next: MachineState,
        reason: Option<OfflineReason>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Transition>>;
}

/// Import definition, result and event operations
#[async_trait]
pub trait ImportStore: Send + Sync {
    /// Creates a REVIEWED import with its first job due at `now`
    async fn create_import(
        &self,
        req: &CreateCodeImport,
        now: DateTime<Utc>,
    ) -> StoreResult<CodeImport>;

    async fn find_import(&self, id: i64) -> StoreResult<Option<CodeImport>>;

    async fn list_imports(&self) -> StoreResult<Vec<CodeImport>>;

    /// Moves the import's job to the front of the queue, creating one if
    /// the import has none
    async fn request_import(
        &self,
        id: i64,
        requested_by: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Job>>;

    /// Results for an import, newest first
    async fn list_results(&self, code_import_id: i64) -> StoreResult<Vec<ImportResult>>;

    /// Most recent events, newest first
    async fn list_events(&self, limit: i64) -> StoreResult<Vec<ImportEvent>>;
}

/// Librarian operations
#[async_trait]
pub trait LogFileStore: Send + Sync {
    async fn store_log_file(
        &self,
        filename: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<StoredLogFile>;

    async fn find_log_file(&self, id: Uuid) -> StoreResult<Option<StoredLogFile>>;
}

/// Everything the scheduler needs from storage
pub trait Store: JobStore + MachineStore + ImportStore + LogFileStore {}

impl<T> Store for T where T: JobStore + MachineStore + ImportStore + LogFileStore {}
