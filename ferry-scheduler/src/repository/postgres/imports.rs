//! Import repository
//!
//! Import definitions, their results and the event log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ferry_core::domain::code_import::{CodeImport, ReviewStatus};
use ferry_core::domain::event::{EventType, ImportEvent, NewEvent};
use ferry_core::domain::job::{Job, JobState};
use ferry_core::domain::result::ImportResult;
use ferry_core::dto::import::CreateCodeImport;

use super::{
    EventRow, IMPORT_COLUMNS, ImportRow, JOB_COLUMNS, JobRow, PgStore, RESULT_COLUMNS, ResultRow,
    insert_event, is_unique_violation,
};
use crate::repository::{ImportStore, StoreError, StoreResult};

#[async_trait]
impl ImportStore for PgStore {
    async fn create_import(
        &self,
        req: &CreateCodeImport,
        now: DateTime<Utc>,
    ) -> StoreResult<CodeImport> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ImportRow>(&format!(
            r#"
            INSERT INTO code_imports (target_name, rcs_type, target_rcs_type, url, cvs_root,
                                      cvs_module, review_status, update_interval, date_created)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING {}
            "#,
            IMPORT_COLUMNS
        ))
        .bind(&req.target_name)
        .bind(req.rcs_type.as_str())
        .bind(req.target_rcs_type.as_str())
        .bind(&req.url)
        .bind(&req.cvs_root)
        .bind(&req.cvs_module)
        .bind(ReviewStatus::Reviewed.as_str())
        .bind(req.update_interval)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::Conflict(format!("an import into {} already exists", req.target_name))
            } else {
                StoreError::Database(err)
            }
        })?;
        let import = CodeImport::try_from(row)?;

        sqlx::query(
            r#"
            INSERT INTO import_jobs (code_import_id, state, date_created, date_due, logtail)
            VALUES ($1, 'PENDING', $2, $2, '')
            "#,
        )
        .bind(import.id)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        insert_event(&mut tx, NewEvent::for_import(EventType::Create, import.id), now).await?;

        tx.commit().await?;
        Ok(import)
    }

    async fn find_import(&self, id: i64) -> StoreResult<Option<CodeImport>> {
        let row = sqlx::query_as::<_, ImportRow>(&format!(
            "SELECT {} FROM code_imports WHERE id = $1",
            IMPORT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CodeImport::try_from).transpose()
    }

    async fn list_imports(&self) -> StoreResult<Vec<CodeImport>> {
        let rows = sqlx::query_as::<_, ImportRow>(&format!(
            "SELECT {} FROM code_imports ORDER BY id",
            IMPORT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(CodeImport::try_from).collect()
    }

    async fn request_import(
        &self,
        id: i64,
        requested_by: &str,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Job>> {
        let mut tx = self.pool.begin().await?;

        let import = sqlx::query_as::<_, ImportRow>(&format!(
            "SELECT {} FROM code_imports WHERE id = $1 FOR UPDATE",
            IMPORT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(import) = import.map(CodeImport::try_from).transpose()? else {
            return Ok(None);
        };

        if import.review_status != ReviewStatus::Reviewed {
            return Err(StoreError::Conflict(format!(
                "import {} is {} and cannot be requested",
                id, import.review_status
            )));
        }

        let existing = sqlx::query_as::<_, JobRow>(&format!(
            "SELECT {} FROM import_jobs WHERE code_import_id = $1 FOR UPDATE",
            JOB_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .map(Job::try_from)
        .transpose()?;

        let row = match existing {
            Some(job) if job.state == JobState::Running => {
                return Err(StoreError::Conflict(format!(
                    "import {} is already running",
                    id
                )));
            }
            Some(job) => {
                sqlx::query_as::<_, JobRow>(&format!(
                    r#"
                    UPDATE import_jobs
                    SET requested_by = $1, date_due = LEAST(date_due, $2)
                    WHERE id = $3
                    RETURNING {}
                    "#,
                    JOB_COLUMNS
                ))
                .bind(requested_by)
                .bind(now)
                .bind(job.id)
                .fetch_one(&mut *tx)
                .await?
            }
            None => {
                sqlx::query_as::<_, JobRow>(&format!(
                    r#"
                    INSERT INTO import_jobs (code_import_id, state, date_created, date_due,
                                             logtail, requested_by)
                    VALUES ($1, 'PENDING', $2, $2, '', $3)
                    RETURNING {}
                    "#,
                    JOB_COLUMNS
                ))
                .bind(id)
                .bind(now)
                .bind(requested_by)
                .fetch_one(&mut *tx)
                .await?
            }
        };
        let job = Job::try_from(row)?;

        insert_event(
            &mut tx,
            NewEvent::for_import(EventType::Request, id).with_message(requested_by),
            now,
        )
        .await?;

        tx.commit().await?;
        Ok(Some(job))
    }

    async fn list_results(&self, code_import_id: i64) -> StoreResult<Vec<ImportResult>> {
        let rows = sqlx::query_as::<_, ResultRow>(&format!(
            "SELECT {} FROM import_results WHERE code_import_id = $1 ORDER BY id DESC",
            RESULT_COLUMNS
        ))
        .bind(code_import_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ImportResult::try_from).collect()
    }

    async fn list_events(&self, limit: i64) -> StoreResult<Vec<ImportEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(
            r#"
            SELECT id, event_type, code_import_id, machine, message, date_created
            FROM import_events
            ORDER BY id DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ImportEvent::try_from).collect()
    }
}
