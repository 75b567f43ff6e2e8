//! Job repository
//!
//! Claiming, heartbeats, finishing and reclaiming. Claims lock the machine
//! row first and then skip job rows other claimers hold, so concurrent
//! dispatchers never receive the same job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use uuid::Uuid;

use ferry_core::domain::code_import::{CodeImport, NextRun};
use ferry_core::domain::event::{EventType, NewEvent};
use ferry_core::domain::job::Job;
use ferry_core::domain::machine::{
    Admission, DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_MAX_CONCURRENT_JOBS, MachineState,
    OfflineReason,
};
use ferry_core::domain::result::{ImportResult, ResultStatus};

use super::{
    IMPORT_COLUMNS, ImportRow, JOB_COLUMNS, JobRow, PgStore, RESULT_COLUMNS, ResultRow,
    count_running, insert_event, lock_machine, set_offline,
};
use crate::repository::{Claim, FinishJob, Finished, JobStore, StoreError, StoreResult};

#[async_trait]
impl JobStore for PgStore {
    async fn claim_job(
        &self,
        hostname: &str,
        worker_limit: u32,
        now: DateTime<Utc>,
    ) -> StoreResult<Claim> {
        let mut tx = self.pool.begin().await?;

        let registered = sqlx::query(
            r#"
            INSERT INTO machines (hostname, state, offline_reason, heartbeat_interval,
                                  max_concurrent_jobs, registered_at)
            VALUES ($1, 'ONLINE', NULL, $2, $3, $4)
            ON CONFLICT (hostname) DO NOTHING
            "#,
        )
        .bind(hostname)
        .bind(DEFAULT_HEARTBEAT_INTERVAL as i32)
        .bind(i32::try_from(worker_limit.max(DEFAULT_MAX_CONCURRENT_JOBS)).unwrap_or(i32::MAX))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        if registered.rows_affected() > 0 {
            tracing::info!("Registered unknown machine {} as ONLINE", hostname);
            insert_event(
                &mut tx,
                NewEvent::for_machine(EventType::Online, hostname)
                    .with_message("registered on first job request"),
                now,
            )
            .await?;
        }

        let machine = lock_machine(&mut tx, hostname)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("machine {} vanished", hostname)))?;
        let running = count_running(&mut tx, hostname).await?;

        match machine.admission(running, worker_limit) {
            Admission::Refuse => {
                tx.commit().await?;
                return Ok(Claim::Refused(machine.state));
            }
            Admission::GoOffline => {
                set_offline(&mut tx, hostname, OfflineReason::Quiesced, now).await?;
                tx.commit().await?;
                return Ok(Claim::WentOffline);
            }
            Admission::Accept => {}
        }

        let job_id: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT id FROM import_jobs
            WHERE state = 'PENDING' AND machine IS NULL AND date_due <= $1
            ORDER BY requested_by IS NULL, date_due, id
            LIMIT 1
            FOR UPDATE SKIP LOCKED
            "#,
        )
        .bind(now)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job_id) = job_id else {
            tx.commit().await?;
            return Ok(Claim::NothingDue);
        };

        let code_import_id: i64 = sqlx::query_scalar(
            r#"
            UPDATE import_jobs
            SET state = 'RUNNING', machine = $1, date_started = $2, heartbeat = $2, logtail = ''
            WHERE id = $3
            RETURNING code_import_id
            "#,
        )
        .bind(hostname)
        .bind(now)
        .bind(job_id)
        .fetch_one(&mut *tx)
        .await?;

        insert_event(
            &mut tx,
            NewEvent::for_import(EventType::Start, code_import_id).on_machine(hostname),
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(Claim::Claimed(job_id))
    }

    async fn find_job(&self, id: i64) -> StoreResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM import_jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Job::try_from).transpose()
    }

    async fn find_job_with_import(&self, id: i64) -> StoreResult<Option<(Job, CodeImport)>> {
        let mut tx = self.pool.begin().await?;

        let job = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM import_jobs WHERE id = $1",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job) = job.map(Job::try_from).transpose()? else {
            tx.commit().await?;
            return Ok(None);
        };

        let import = sqlx::query_as::<_, ImportRow>(&format!(
            "SELECT {} FROM code_imports WHERE id = $1",
            IMPORT_COLUMNS
        ))
        .bind(job.code_import_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some((job, CodeImport::try_from(import)?)))
    }

    async fn list_jobs(&self) -> StoreResult<Vec<Job>> {
        let rows = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM import_jobs ORDER BY date_due, id",
            JOB_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Job::try_from).collect()
    }

    async fn update_heartbeat(
        &self,
        id: i64,
        log_tail: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE import_jobs
            SET heartbeat = GREATEST(heartbeat, $1), logtail = $2
            WHERE id = $3 AND state = 'RUNNING'
            "#,
        )
        .bind(now)
        .bind(log_tail)
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn finish_job(&self, finish: FinishJob) -> StoreResult<Option<Finished>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM import_jobs WHERE id = $1 AND state = 'RUNNING' FOR UPDATE",
            JOB_COLUMNS
        ))
        .bind(finish.job_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job) = row.map(Job::try_from).transpose()? else {
            return Ok(None);
        };

        let finished = finish_locked(
            &mut tx,
            job,
            finish.status,
            finish.log_file,
            finish.failure_limit,
            finish.now,
        )
        .await?;

        tx.commit().await?;
        Ok(Some(finished))
    }

    async fn find_stale_jobs(&self, cutoff: DateTime<Utc>) -> StoreResult<Vec<i64>> {
        let ids = sqlx::query_scalar(
            "SELECT id FROM import_jobs WHERE state = 'RUNNING' AND heartbeat < $1 ORDER BY id",
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;

        Ok(ids)
    }

    async fn reclaim_job(
        &self,
        id: i64,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Finished>> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM import_jobs \
             WHERE id = $1 AND state = 'RUNNING' AND heartbeat < $2 \
             FOR UPDATE SKIP LOCKED",
            JOB_COLUMNS
        ))
        .bind(id)
        .bind(cutoff)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(job) = row.map(Job::try_from).transpose()? else {
            return Ok(None);
        };

        let finished =
            finish_locked(&mut tx, job, ResultStatus::Reclaimed, None, u32::MAX, now).await?;

        tx.commit().await?;
        Ok(Some(finished))
    }
}

/// Records the result of a locked RUNNING job, removes it and queues the
/// next run
async fn finish_locked(
    conn: &mut PgConnection,
    job: Job,
    status: ResultStatus,
    log_file: Option<Uuid>,
    failure_limit: u32,
    now: DateTime<Utc>,
) -> StoreResult<Finished> {
    let result_row = sqlx::query_as::<_, ResultRow>(&format!(
        r#"
        INSERT INTO import_results (code_import_id, machine, status, log_file, log_excerpt,
                                    date_job_started, date_created)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {}
        "#,
        RESULT_COLUMNS
    ))
    .bind(job.code_import_id)
    .bind(&job.machine)
    .bind(status.as_str())
    .bind(log_file)
    .bind(&job.logtail)
    .bind(job.date_started)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;
    let result = ImportResult::try_from(result_row)?;

    sqlx::query("DELETE FROM import_jobs WHERE id = $1")
        .bind(job.id)
        .execute(&mut *conn)
        .await?;

    let import_row = sqlx::query_as::<_, ImportRow>(&format!(
        "SELECT {} FROM code_imports WHERE id = $1 FOR UPDATE",
        IMPORT_COLUMNS
    ))
    .bind(job.code_import_id)
    .fetch_one(&mut *conn)
    .await?;
    let import = CodeImport::try_from(import_row)?;

    if status.is_success() {
        sqlx::query("UPDATE code_imports SET date_last_successful = $1 WHERE id = $2")
            .bind(now)
            .bind(import.id)
            .execute(&mut *conn)
            .await?;
    }

    let success_names: Vec<&str> = ResultStatus::ALL
        .iter()
        .filter(|s| s.is_success())
        .map(|s| s.as_str())
        .collect();
    let failure_count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM import_results
        WHERE code_import_id = $1
          AND id > COALESCE(
              (SELECT MAX(id) FROM import_results
               WHERE code_import_id = $1 AND status = ANY($2)),
              0)
        "#,
    )
    .bind(import.id)
    .bind(&success_names)
    .fetch_one(&mut *conn)
    .await?;
    let failure_count = u32::try_from(failure_count).unwrap_or(u32::MAX);

    let started = job.date_started.unwrap_or(now);
    let mut next_job_id = None;
    let mut import_failing = false;
    match import.next_run(status, failure_count, failure_limit, started, now) {
        NextRun::At(due) => {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO import_jobs (code_import_id, state, date_created, date_due, logtail)
                VALUES ($1, 'PENDING', $2, $3, '')
                RETURNING id
                "#,
            )
            .bind(import.id)
            .bind(now)
            .bind(due)
            .fetch_one(&mut *conn)
            .await?;
            next_job_id = Some(id);
        }
        NextRun::MarkFailing => {
            sqlx::query("UPDATE code_imports SET review_status = 'FAILING' WHERE id = $1")
                .bind(import.id)
                .execute(&mut *conn)
                .await?;
            import_failing = true;
        }
        NextRun::Idle => {}
    }

    let event_type = if status == ResultStatus::Reclaimed {
        EventType::Reclaim
    } else {
        EventType::Finish
    };
    let mut event = NewEvent::for_import(event_type, import.id).with_message(status.as_str());
    if let Some(hostname) = &job.machine {
        event = event.on_machine(hostname);
    }
    insert_event(&mut *conn, event, now).await?;

    let mut machine_offline = false;
    if let Some(hostname) = &job.machine {
        let machine = lock_machine(&mut *conn, hostname).await?;
        if machine.is_some_and(|m| m.state == MachineState::Quiescing)
            && count_running(&mut *conn, hostname).await? == 0
        {
            set_offline(&mut *conn, hostname, OfflineReason::Quiesced, now).await?;
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
