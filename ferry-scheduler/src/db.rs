use sqlx::{PgPool, postgres::PgPoolOptions};
use std::time::Duration;

pub async fn create_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    // Worker hosts
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS machines (
            hostname VARCHAR(255) PRIMARY KEY,
            state VARCHAR(20) NOT NULL,
            offline_reason VARCHAR(20),
            heartbeat_interval INTEGER NOT NULL,
            max_concurrent_jobs INTEGER NOT NULL,
            registered_at TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Import definitions
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS code_imports (
            id BIGSERIAL PRIMARY KEY,
            target_name TEXT NOT NULL UNIQUE,
            rcs_type VARCHAR(20) NOT NULL,
            target_rcs_type VARCHAR(20) NOT NULL,
            url TEXT,
            cvs_root TEXT,
            cvs_module TEXT,
            review_status VARCHAR(20) NOT NULL,
            update_interval BIGINT,
            date_created TIMESTAMPTZ NOT NULL,
            date_last_successful TIMESTAMPTZ
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS log_files (
            id UUID PRIMARY KEY,
            filename TEXT NOT NULL,
            content TEXT NOT NULL,
            date_created TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    // At most one job per import; a RUNNING job always names its machine
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_jobs (
            id BIGSERIAL PRIMARY KEY,
            code_import_id BIGINT NOT NULL UNIQUE REFERENCES code_imports(id) ON DELETE CASCADE,
            state VARCHAR(20) NOT NULL,
            machine VARCHAR(255) REFERENCES machines(hostname),
            date_created TIMESTAMPTZ NOT NULL,
            date_due TIMESTAMPTZ NOT NULL,
            date_started TIMESTAMPTZ,
            heartbeat TIMESTAMPTZ,
            logtail TEXT NOT NULL DEFAULT '',
            requested_by TEXT,
            CONSTRAINT running_job_has_machine CHECK ((state = 'RUNNING') = (machine IS NOT NULL))
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_results (
            id BIGSERIAL PRIMARY KEY,
            code_import_id BIGINT NOT NULL REFERENCES code_imports(id) ON DELETE CASCADE,
            machine VARCHAR(255) REFERENCES machines(hostname),
            status VARCHAR(40) NOT NULL,
            log_file UUID REFERENCES log_files(id),
            log_excerpt TEXT,
            date_job_started TIMESTAMPTZ,
            date_created TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS import_events (
            id BIGSERIAL PRIMARY KEY,
            event_type VARCHAR(20) NOT NULL,
            code_import_id BIGINT REFERENCES code_imports(id) ON DELETE CASCADE,
            machine VARCHAR(255) REFERENCES machines(hostname),
            message TEXT,
            date_created TIMESTAMPTZ NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_import_jobs_due ON import_jobs(state, date_due)")
        .execute(pool)
        .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_import_jobs_machine ON import_jobs(machine)")
        .execute(pool)
        .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_import_results_import ON import_results(code_import_id, id)",
    )
    .execute(pool)
    .await?;

    tracing::info!("Database migrations completed successfully");
    Ok(())
}
