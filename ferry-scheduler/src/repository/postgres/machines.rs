//! Machine repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use ferry_core::domain::event::{EventType, NewEvent};
use ferry_core::domain::machine::{
    DEFAULT_HEARTBEAT_INTERVAL, DEFAULT_MAX_CONCURRENT_JOBS, Machine, MachineState, OfflineReason,
};
use ferry_core::dto::machine::RegisterMachine;

use super::{
    MACHINE_COLUMNS, MachineRow, PgStore, count_running, insert_event, is_unique_violation,
    lock_machine, set_offline,
};
use crate::repository::{MachineStore, StoreError, StoreResult, Transition};

#[async_trait]
impl MachineStore for PgStore {
    async fn register_machine(
        &self,
        req: &RegisterMachine,
        now: DateTime<Utc>,
    ) -> StoreResult<Machine> {
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

        sqlx::query(
            r#"
            INSERT INTO machines (hostname, state, offline_reason, heartbeat_interval,
                                  max_concurrent_jobs, registered_at)
            VALUES ($1, $2, NULL, $3, $4, $5)
            "#,
        )
        .bind(&machine.hostname)
        .bind(machine.state.as_str())
        .bind(i32::try_from(machine.heartbeat_interval).unwrap_or(i32::MAX))
        .bind(i32::try_from(machine.max_concurrent_jobs).unwrap_or(i32::MAX))
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::Conflict(format!("machine {} is already registered", req.hostname))
            } else {
                StoreError::Database(err)
            }
        })?;

        Ok(machine)
    }

    async fn find_machine(&self, hostname: &str) -> StoreResult<Option<Machine>> {
        let row = sqlx::query_as::<_, MachineRow>(&format!(
            "SELECT {} FROM machines WHERE hostname = $1",
            MACHINE_COLUMNS
        ))
        .bind(hostname)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Machine::try_from).transpose()
    }

    async fn list_machines(&self) -> StoreResult<Vec<Machine>> {
        let rows = sqlx::query_as::<_, MachineRow>(&format!(
            "SELECT {} FROM machines ORDER BY hostname",
            MACHINE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Machine::try_from).collect()
    }

    async fn running_job_count(&self, hostname: &str) -> StoreResult<u32> {
        let mut conn = self.pool.acquire().await?;
        count_running(&mut conn, hostname).await
    }

    async fn transition_machine(
        &self,
        hostname: &str,
        next: MachineState,
        reason: Option<OfflineReason>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Transition>> {
        let mut tx = self.pool.begin().await?;

        let Some(mut machine) = lock_machine(&mut tx, hostname).await? else {
            return Ok(None);
        };

        if !machine.state.can_transition_to(next) {
            return Ok(Some(Transition::Rejected {
                current: machine.state,
            }));
        }

        if next == MachineState::Offline {
            let reason = reason.unwrap_or(OfflineReason::Stopped);
            set_offline(&mut tx, hostname, reason, now).await?;
            machine.offline_reason = Some(reason);
        } else {
            sqlx::query(
                "UPDATE machines SET state = $1, offline_reason = NULL WHERE hostname = $2",
            )
            .bind(next.as_str())
            .bind(hostname)
            .execute(&mut *tx)
            .await?;

            let event_type = if next == MachineState::Online {
                EventType::Online
            } else {
                EventType::Quiesce
            };
            insert_event(&mut tx, NewEvent::for_machine(event_type, hostname), now).await?;
            machine.offline_reason = None;
        }

        tx.commit().await?;

        machine.state = next;
        Ok(Some(Transition::Applied(machine)))
    }
}
