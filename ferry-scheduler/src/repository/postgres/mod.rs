//! PostgreSQL store
//!
//! Row types and the statements shared between the job, machine and import
//! repositories. Rows map onto domain types through `TryFrom`, since every
//! enum column is stored as text.

mod imports;
mod jobs;
mod log_files;
mod machines;

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use ferry_core::domain::code_import::CodeImport;
use ferry_core::domain::event::{EventType, ImportEvent, NewEvent};
use ferry_core::domain::job::Job;
use ferry_core::domain::machine::{Machine, MachineState, OfflineReason};
use ferry_core::domain::result::ImportResult;

use super::StoreError;

/// Store backed by a PostgreSQL connection pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// =============================================================================
// Shared Statements
// =============================================================================

const JOB_COLUMNS: &str = "id, code_import_id, state, machine, date_created, date_due, \
     date_started, heartbeat, logtail, requested_by";

const IMPORT_COLUMNS: &str = "id, target_name, rcs_type, target_rcs_type, url, \
     cvs_root, cvs_module, review_status, update_interval, date_created, date_last_successful";

const MACHINE_COLUMNS: &str =
    "hostname, state, offline_reason, heartbeat_interval, max_concurrent_jobs, registered_at";

const RESULT_COLUMNS: &str = "id, code_import_id, machine, status, log_file, \
     log_excerpt, date_job_started, date_created";

async fn insert_event(
    conn: &mut PgConnection,
    event: NewEvent,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO import_events (event_type, code_import_id, machine, message, date_created)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(event.event_type.as_str())
    .bind(event.code_import_id)
    .bind(event.machine)
    .bind(event.message)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

async fn count_running(conn: &mut PgConnection, hostname: &str) -> Result<u32, StoreError> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM import_jobs WHERE machine = $1 AND state = 'RUNNING'",
    )
    .bind(hostname)
    .fetch_one(&mut *conn)
    .await?;

    to_u32(count, "running job count")
}

async fn set_offline(
    conn: &mut PgConnection,
    hostname: &str,
    reason: OfflineReason,
    now: DateTime<Utc>,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE machines SET state = 'OFFLINE', offline_reason = $1 WHERE hostname = $2")
        .bind(reason.as_str())
        .bind(hostname)
        .execute(&mut *conn)
        .await?;

    insert_event(
        conn,
        NewEvent::for_machine(EventType::Offline, hostname).with_message(reason.as_str()),
        now,
    )
    .await
}

async fn lock_machine(
    conn: &mut PgConnection,
    hostname: &str,
) -> Result<Option<Machine>, StoreError> {
    let row = sqlx::query_as::<_, MachineRow>(&format!(
        "SELECT {} FROM machines WHERE hostname = $1 FOR UPDATE",
        MACHINE_COLUMNS
    ))
    .bind(hostname)
    .fetch_optional(&mut *conn)
    .await?;

    row.map(Machine::try_from).transpose()
}

// =============================================================================
// Helper Functions
// =============================================================================

fn parse<T: std::str::FromStr>(value: &str, what: &str) -> Result<T, StoreError> {
    value
        .parse()
        .map_err(|_| StoreError::Corrupt(format!("{} '{}'", what, value)))
}

fn to_u32(value: i64, what: &str) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{} {}", what, value)))
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct MachineRow {
    hostname: String,
    state: String,
    offline_reason: Option<String>,
    heartbeat_interval: i32,
    max_concurrent_jobs: i32,
    registered_at: DateTime<Utc>,
}

impl TryFrom<MachineRow> for Machine {
    type Error = StoreError;

    fn try_from(row: MachineRow) -> Result<Self, Self::Error> {
        Ok(Machine {
            state: parse::<MachineState>(&row.state, "machine state")?,
            offline_reason: row
                .offline_reason
                .as_deref()
                .map(|reason| parse::<OfflineReason>(reason, "offline reason"))
                .transpose()?,
            heartbeat_interval: to_u32(row.heartbeat_interval.into(), "heartbeat interval")?,
            max_concurrent_jobs: to_u32(row.max_concurrent_jobs.into(), "max concurrent jobs")?,
            hostname: row.hostname,
            registered_at: row.registered_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct JobRow {
    id: i64,
    code_import_id: i64,
    state: String,
    machine: Option<String>,
    date_created: DateTime<Utc>,
    date_due: DateTime<Utc>,
    date_started: Option<DateTime<Utc>>,
    heartbeat: Option<DateTime<Utc>>,
    logtail: String,
    requested_by: Option<String>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        Ok(Job {
            id: row.id,
            code_import_id: row.code_import_id,
            state: parse(&row.state, "job state")?,
            machine: row.machine,
            date_created: row.date_created,
            date_due: row.date_due,
            date_started: row.date_started,
            heartbeat: row.heartbeat,
            logtail: row.logtail,
            requested_by: row.requested_by,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ImportRow {
    id: i64,
    target_name: String,
    rcs_type: String,
    target_rcs_type: String,
    url: Option<String>,
    cvs_root: Option<String>,
    cvs_module: Option<String>,
    review_status: String,
    update_interval: Option<i64>,
    date_created: DateTime<Utc>,
    date_last_successful: Option<DateTime<Utc>>,
}

impl TryFrom<ImportRow> for CodeImport {
    type Error = StoreError;

    fn try_from(row: ImportRow) -> Result<Self, Self::Error> {
        Ok(CodeImport {
            id: row.id,
            target_name: row.target_name,
            rcs_type: parse(&row.rcs_type, "rcs type")?,
            target_rcs_type: parse(&row.target_rcs_type, "target rcs type")?,
            url: row.url,
            cvs_root: row.cvs_root,
            cvs_module: row.cvs_module,
            review_status: parse(&row.review_status, "review status")?,
            update_interval: row.update_interval,
            date_created: row.date_created,
            date_last_successful: row.date_last_successful,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ResultRow {
    id: i64,
    code_import_id: i64,
    machine: Option<String>,
    status: String,
    log_file: Option<Uuid>,
    log_excerpt: Option<String>,
    date_job_started: Option<DateTime<Utc>>,
    date_created: DateTime<Utc>,
}

impl TryFrom<ResultRow> for ImportResult {
    type Error = StoreError;

    fn try_from(row: ResultRow) -> Result<Self, Self::Error> {
        Ok(ImportResult {
            id: row.id,
            code_import_id: row.code_import_id,
            machine: row.machine,
            status: parse(&row.status, "result status")?,
            log_file: row.log_file,
            log_excerpt: row.log_excerpt,
            date_job_started: row.date_job_started,
            date_created: row.date_created,
        })
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: i64,
    event_type: String,
    code_import_id: Option<i64>,
    machine: Option<String>,
    message: Option<String>,
    date_created: DateTime<Utc>,
}

impl TryFrom<EventRow> for ImportEvent {
    type Error = StoreError;

    fn try_from(row: EventRow) -> Result<Self, Self::Error> {
        Ok(ImportEvent {
            id: row.id,
            event_type: parse::<EventType>(&row.event_type, "event type")?,
            code_import_id: row.code_import_id,
            machine: row.machine,
            message: row.message,
            date_created: row.date_created,
        })
    }
}
