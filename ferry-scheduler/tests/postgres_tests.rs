//! Claim behaviour against a real PostgreSQL database
//!
//! These run only when `DATABASE_URL` points at a scratch database; without
//! it each test returns early. Names carry a fresh uuid so repeated runs
//! against the same database do not collide.

use std::sync::Arc;

use ferry_core::domain::source::{RcsType, TargetRcsType};
use ferry_core::dto::import::CreateCodeImport;
use ferry_scheduler::db;
use ferry_scheduler::repository::{JobStore, PgStore, Store};
use ferry_scheduler::service::{import_service, job_service};
use tokio::sync::Mutex;
use uuid::Uuid;

// Concurrent CREATE TABLE IF NOT EXISTS can still race on the catalog
static MIGRATIONS: Mutex<()> = Mutex::const_new(());

async fn pg_store() -> Option<PgStore> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };
    let pool = db::create_pool(&url).await.unwrap();
    {
        let _guard = MIGRATIONS.lock().await;
        db::run_migrations(&pool).await.unwrap();
    }
    Some(PgStore::new(pool))
}

fn unique(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4().simple())
}

async fn create_git_import(store: &dyn Store) -> i64 {
    let name = unique("widget");
    let import = import_service::create_import(
        store,
        CreateCodeImport {
            target_name: format!("~ci/{}/+git/main", name),
            rcs_type: RcsType::Git,
            target_rcs_type: TargetRcsType::Git,
            url: Some(format!("https://git.example.com/{}.git", name)),
            cvs_root: None,
            cvs_module: None,
            update_interval: None,
        },
    )
    .await
    .unwrap();
    import.id
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_never_share_a_job() {
    let Some(store) = pg_store().await else {
        return;
    };
    let store: Arc<dyn Store> = Arc::new(store);
    let import_id = create_git_import(store.as_ref()).await;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let store = Arc::clone(&store);
        let hostname = unique("machine");
        handles.push(tokio::spawn(async move {
            job_service::get_job_for_machine(store.as_ref(), &hostname, 4)
                .await
                .unwrap()
        }));
    }

    let mut claimed = Vec::new();
    for handle in handles {
        let job_id = handle.await.unwrap();
        if job_id != 0 {
            claimed.push(job_id);
        }
    }

    // Leftover due jobs from earlier runs may be handed out too, but never twice
    let mut distinct = claimed.clone();
    distinct.sort_unstable();
    distinct.dedup();
    assert_eq!(distinct.len(), claimed.len());

    let mut ours = 0;
    for job_id in claimed {
        let job = store.find_job(job_id).await.unwrap().unwrap();
        if job.code_import_id == import_id {
            ours += 1;
        }
    }
    assert_eq!(ours, 1);
}

#[tokio::test]
async fn test_worker_limit_refuses_a_second_claim() {
    let Some(store) = pg_store().await else {
        return;
    };
    create_git_import(&store).await;
    create_git_import(&store).await;
    let hostname = unique("machine");

    let first = job_service::get_job_for_machine(&store, &hostname, 1)
        .await
        .unwrap();
    assert_ne!(first, 0);

    let second = job_service::get_job_for_machine(&store, &hostname, 1)
        .await
        .unwrap();
    assert_eq!(second, 0);
}
