//! Log file repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::PgStore;
use crate::repository::{LogFileStore, StoreResult, StoredLogFile};

#[async_trait]
impl LogFileStore for PgStore {
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

        sqlx::query(
            r#"
            INSERT INTO log_files (id, filename, content, date_created)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(log_file.id)
        .bind(&log_file.filename)
        .bind(&log_file.content)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(log_file)
    }

    async fn find_log_file(&self, id: Uuid) -> StoreResult<Option<StoredLogFile>> {
        let row = sqlx::query_as::<_, LogFileRow>(
            "SELECT id, filename, content, date_created FROM log_files WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into()))
    }
}

#[derive(sqlx::FromRow)]
struct LogFileRow {
    id: Uuid,
    filename: String,
    content: String,
    date_created: DateTime<Utc>,
}

impl From<LogFileRow> for StoredLogFile {
    fn from(row: LogFileRow) -> Self {
        StoredLogFile {
            id: row.id,
            filename: row.filename,
            content: row.content,
            date_created: row.date_created,
        }
    }
}
