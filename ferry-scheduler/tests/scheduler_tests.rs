//! Job Runner behaviour against the in-memory store

use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;

use ferry_core::domain::code_import::{CodeImport, ReviewStatus};
use ferry_core::domain::event::EventType;
use ferry_core::domain::job::JobState;
use ferry_core::domain::machine::{MachineState, OfflineReason};
use ferry_core::domain::result::ResultStatus;
use ferry_core::domain::source::{RcsType, TargetRcsType};
use ferry_core::dto::import::{CreateCodeImport, RequestImport};
use ferry_core::dto::librarian::UploadLogFile;
use ferry_core::dto::machine::{RegisterMachine, SetMachineState};
use ferry_core::dto::rpc::FinishJobRequest;
use ferry_scheduler::config::Config;
use ferry_scheduler::repository::{
    Claim, ImportStore, JobStore, MachineStore, MemoryStore, Store,
};
use ferry_scheduler::service::job::JobError;
use ferry_scheduler::service::machine::MachineError;
use ferry_scheduler::service::{
    import_service, job_service, librarian_service, machine_service, reaper,
};

fn git_import(name: &str) -> CreateCodeImport {
    CreateCodeImport {
        target_name: format!("~alice/{}/+git/main", name),
        rcs_type: RcsType::Git,
        target_rcs_type: TargetRcsType::Git,
        url: Some(format!("https://git.example.com/{}.git", name)),
        cvs_root: None,
        cvs_module: None,
        update_interval: None,
    }
}

async fn create(store: &dyn Store, name: &str) -> CodeImport {
    import_service::create_import(store, git_import(name))
        .await
        .unwrap()
}

async fn job_id_for(store: &dyn Store, import: &CodeImport) -> i64 {
    store
        .list_jobs()
        .await
        .unwrap()
        .into_iter()
        .find(|job| job.code_import_id == import.id)
        .map(|job| job.id)
        .unwrap()
}

fn finish_request(job_id: i64, status: &str) -> FinishJobRequest {
    FinishJobRequest {
        job_id,
        status_name: status.to_string(),
        log_file_alias_url: None,
    }
}

#[tokio::test]
async fn test_unknown_machine_is_registered_online() {
    let store = MemoryStore::new();

    let job_id = job_service::get_job_for_machine(&store, "bender", 1)
        .await
        .unwrap();
    assert_eq!(job_id, 0);

    let machine = store.find_machine("bender").await.unwrap().unwrap();
    assert_eq!(machine.state, MachineState::Online);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_claims_hand_out_a_job_once() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    create(store.as_ref(), "widget").await;

    let mut handles = Vec::new();
    for i in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            job_service::get_job_for_machine(store.as_ref(), &format!("machine-{}", i), 4)
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
    assert_eq!(claimed.len(), 1);
}

#[tokio::test]
async fn test_worker_limit_one() {
    let store = MemoryStore::new();
    let config = Config::default();
    create(&store, "first").await;
    create(&store, "second").await;

    let first = job_service::get_job_for_machine(&store, "bender", 1)
        .await
        .unwrap();
    assert_ne!(first, 0);

    // Still running, so the limit refuses more work
    let refused = job_service::get_job_for_machine(&store, "bender", 1)
        .await
        .unwrap();
    assert_eq!(refused, 0);

    job_service::finish_job(&store, &config, finish_request(first, "SUCCESS"))
        .await
        .unwrap();

    let second = job_service::get_job_for_machine(&store, "bender", 1)
        .await
        .unwrap();
    assert_ne!(second, 0);
    assert_ne!(second, first);
}

#[tokio::test]
async fn test_requested_job_is_claimed_first() {
    let store = MemoryStore::new();
    create(&store, "older").await;
    let requested = create(&store, "newer").await;

    import_service::request_import(
        &store,
        requested.id,
        RequestImport {
            requested_by: "alice".to_string(),
        },
    )
    .await
    .unwrap();

    let job_id = job_service::get_job_for_machine(&store, "bender", 1)
        .await
        .unwrap();
    let job = store.find_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.code_import_id, requested.id);
    assert_eq!(job.requested_by.as_deref(), Some("alice"));
}

#[tokio::test]
async fn test_round_trip_records_one_result() {
    let store = MemoryStore::new();
    let config = Config::default();
    let import = create(&store, "widget").await;

    let job_id = job_service::get_job_for_machine(&store, "bender", 1)
        .await
        .unwrap();

    let data = job_service::get_import_data(&store, &config, job_id)
        .await
        .unwrap();
    assert_eq!(
        data.arguments,
        vec![
            "~alice/widget/+git/main".to_string(),
            "git:git".to_string(),
            "https://git.example.com/widget.git".to_string(),
        ]
    );
    assert_eq!(data.log_file_name, "alice-widget-+git-main.log");
    assert_eq!(
        data.target_url,
        format!("{}/~alice/widget/+git/main", config.hosted_base_url)
    );

    job_service::update_heartbeat(&store, job_id, "cloning\nfetching\n")
        .await
        .unwrap();

    let alias = librarian_service::upload_log_file(
        &store,
        &config.public_url,
        UploadLogFile {
            filename: data.log_file_name.clone(),
            content: "full log".to_string(),
        },
    )
    .await
    .unwrap();

    let finished = job_service::finish_job(
        &store,
        &config,
        FinishJobRequest {
            job_id,
            status_name: "SUCCESS".to_string(),
            log_file_alias_url: Some(alias.url.clone()),
        },
    )
    .await
    .unwrap();

    assert_eq!(finished.result.status, ResultStatus::Success);
    assert_eq!(finished.result.log_file, Some(alias.id));
    assert_eq!(
        finished.result.log_excerpt.as_deref(),
        Some("cloning\nfetching\n")
    );
    assert!(store.find_job(job_id).await.unwrap().is_none());

    let results = store.list_results(import.id).await.unwrap();
    assert_eq!(results.len(), 1);

    // The next run waits a full update interval
    let next = store
        .find_job(finished.next_job_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(next.state, JobState::Pending);
    assert!(next.date_due > Utc::now() + ChronoDuration::hours(5));

    let import = store.find_import(import.id).await.unwrap().unwrap();
    assert!(import.date_last_successful.is_some());
}

#[tokio::test]
async fn test_oversized_update_interval_is_rejected() {
    let store = MemoryStore::new();
    let mut request = git_import("widget");
    request.update_interval = Some(10_000_000_000_000);

    let err = import_service::create_import(&store, request)
        .await
        .unwrap_err();
    assert!(matches!(err, import_service::ImportError::ValidationError(_)));
}

#[tokio::test]
async fn test_stored_oversized_interval_still_finishes() {
    let store = MemoryStore::new();
    let config = Config::default();
    let mut request = git_import("widget");
    request.update_interval = Some(10_000_000_000_000);
    store.create_import(&request, Utc::now()).await.unwrap();

    let job_id = job_service::get_job_for_machine(&store, "bender", 1)
        .await
        .unwrap();
    let finished = job_service::finish_job(&store, &config, finish_request(job_id, "SUCCESS"))
        .await
        .unwrap();

    assert!(store.find_job(job_id).await.unwrap().is_none());
    let next = store
        .find_job(finished.next_job_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(next.date_due <= Utc::now() + ChronoDuration::days(366));
}

#[tokio::test]
async fn test_invalid_status_leaves_job_running() {
    let store = MemoryStore::new();
    let config = Config::default();
    let import = create(&store, "widget").await;
    let job_id = job_service::get_job_for_machine(&store, "bender", 1)
        .await
        .unwrap();

    let err = job_service::finish_job(&store, &config, finish_request(job_id, "MOSTLY_FINE"))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::InvalidStatus(name) if name == "MOSTLY_FINE"));

    let job = store.find_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Running);
    assert!(store.list_results(import.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unknown_log_file_leaves_job_running() {
    let store = MemoryStore::new();
    let config = Config::default();
    create(&store, "widget").await;
    let job_id = job_service::get_job_for_machine(&store, "bender", 1)
        .await
        .unwrap();

    let mut req = finish_request(job_id, "SUCCESS");
    req.log_file_alias_url = Some(format!(
        "{}/librarian/{}/widget.log",
        config.public_url,
        uuid::Uuid::new_v4()
    ));
    let err = job_service::finish_job(&store, &config, req)
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::LogFileNotFound(_)));

    let job = store.find_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Running);
}

#[tokio::test]
async fn test_finishing_twice_is_no_such_job() {
    let store = MemoryStore::new();
    let config = Config::default();
    create(&store, "widget").await;
    let job_id = job_service::get_job_for_machine(&store, "bender", 1)
        .await
        .unwrap();

    job_service::finish_job(&store, &config, finish_request(job_id, "FAILURE"))
        .await
        .unwrap();
    let err = job_service::finish_job(&store, &config, finish_request(job_id, "FAILURE"))
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::NoSuchJob(id) if id == job_id));
}

#[tokio::test]
async fn test_heartbeat_never_regresses() {
    let store = MemoryStore::new();
    let import = create(&store, "widget").await;
    let now = Utc::now();

    let Claim::Claimed(job_id) = store.claim_job("bender", 1, now).await.unwrap() else {
        panic!("expected a claim");
    };

    assert!(
        store
            .update_heartbeat(job_id, "late packet", now - ChronoDuration::minutes(5))
            .await
            .unwrap()
    );
    let job = store.find_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.heartbeat, Some(now));
    assert_eq!(job.logtail, "late packet");

    let later = now + ChronoDuration::seconds(30);
    store.update_heartbeat(job_id, "", later).await.unwrap();
    let job = store.find_job(job_id).await.unwrap().unwrap();
    assert_eq!(job.heartbeat, Some(later));
    assert_eq!(job.code_import_id, import.id);
}

#[tokio::test]
async fn test_heartbeat_for_finished_job_is_no_such_job() {
    let store = MemoryStore::new();
    let config = Config::default();
    create(&store, "widget").await;
    let job_id = job_service::get_job_for_machine(&store, "bender", 1)
        .await
        .unwrap();
    job_service::finish_job(&store, &config, finish_request(job_id, "SUCCESS"))
        .await
        .unwrap();

    let err = job_service::update_heartbeat(&store, job_id, "still here?")
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::NoSuchJob(_)));
}

#[tokio::test]
async fn test_heartbeat_on_pending_job_is_no_such_job() {
    let store = MemoryStore::new();
    let import = create(&store, "widget").await;
    let job_id = job_id_for(&store, &import).await;

    let err = job_service::update_heartbeat(&store, job_id, "")
        .await
        .unwrap_err();
    assert!(matches!(err, JobError::NoSuchJob(_)));
}

#[tokio::test]
async fn test_quiescing_machine_goes_offline_after_last_job() {
    let store = MemoryStore::new();
    let config = Config::default();
    create(&store, "first").await;
    create(&store, "second").await;

    let first = job_service::get_job_for_machine(&store, "bender", 2)
        .await
        .unwrap();
    let second = job_service::get_job_for_machine(&store, "bender", 2)
        .await
        .unwrap();
    assert_ne!(first, 0);
    assert_ne!(second, 0);

    machine_service::set_machine_state(
        &store,
        "bender",
        SetMachineState {
            state: MachineState::Quiescing,
            reason: None,
        },
    )
    .await
    .unwrap();

    // No new work while quiescing
    assert_eq!(
        job_service::get_job_for_machine(&store, "bender", 2)
            .await
            .unwrap(),
        0
    );

    let finished = job_service::finish_job(&store, &config, finish_request(first, "SUCCESS"))
        .await
        .unwrap();
    assert!(!finished.machine_offline);
    let machine = store.find_machine("bender").await.unwrap().unwrap();
    assert_eq!(machine.state, MachineState::Quiescing);

    let finished = job_service::finish_job(&store, &config, finish_request(second, "SUCCESS"))
        .await
        .unwrap();
    assert!(finished.machine_offline);
    let machine = store.find_machine("bender").await.unwrap().unwrap();
    assert_eq!(machine.state, MachineState::Offline);
    assert_eq!(machine.offline_reason, Some(OfflineReason::Quiesced));
}

#[tokio::test]
async fn test_idle_quiescing_machine_goes_offline_when_asking() {
    let store = MemoryStore::new();
    job_service::get_job_for_machine(&store, "bender", 1)
        .await
        .unwrap();
    store
        .transition_machine("bender", MachineState::Quiescing, None, Utc::now())
        .await
        .unwrap();

    let claim = store.claim_job("bender", 1, Utc::now()).await.unwrap();
    assert_eq!(claim, Claim::WentOffline);

    let machine = store.find_machine("bender").await.unwrap().unwrap();
    assert_eq!(machine.state, MachineState::Offline);
    assert_eq!(machine.offline_reason, Some(OfflineReason::Quiesced));
}

#[tokio::test]
async fn test_offline_machine_gets_no_work() {
    let store = MemoryStore::new();
    create(&store, "widget").await;
    machine_service::register_machine(
        &store,
        RegisterMachine {
            hostname: "bender".to_string(),
            heartbeat_interval: None,
            max_concurrent_jobs: None,
        },
    )
    .await
    .unwrap();

    let claim = store.claim_job("bender", 1, Utc::now()).await.unwrap();
    assert_eq!(claim, Claim::Refused(MachineState::Offline));
}

#[tokio::test]
async fn test_registered_ceiling_caps_the_offered_limit() {
    let store = MemoryStore::new();
    create(&store, "first").await;
    create(&store, "second").await;
    machine_service::register_machine(
        &store,
        RegisterMachine {
            hostname: "bender".to_string(),
            heartbeat_interval: None,
            max_concurrent_jobs: Some(1),
        },
    )
    .await
    .unwrap();
    machine_service::set_machine_state(
        &store,
        "bender",
        SetMachineState {
            state: MachineState::Online,
            reason: None,
        },
    )
    .await
    .unwrap();

    let first = job_service::get_job_for_machine(&store, "bender", 4)
        .await
        .unwrap();
    let second = job_service::get_job_for_machine(&store, "bender", 4)
        .await
        .unwrap();
    assert_ne!(first, 0);
    assert_eq!(second, 0);
}

#[tokio::test]
async fn test_auto_registered_machine_keeps_its_offered_limit() {
    let store = MemoryStore::new();
    create(&store, "widget").await;

    job_service::get_job_for_machine(&store, "bender", 3)
        .await
        .unwrap();

    let machine = store.find_machine("bender").await.unwrap().unwrap();
    assert_eq!(machine.max_concurrent_jobs, 3);
}

#[tokio::test]
async fn test_illegal_transition_is_rejected() {
    let store = MemoryStore::new();
    machine_service::register_machine(
        &store,
        RegisterMachine {
            hostname: "bender".to_string(),
            heartbeat_interval: Some(15),
            max_concurrent_jobs: Some(2),
        },
    )
    .await
    .unwrap();

    let err = machine_service::set_machine_state(
        &store,
        "bender",
        SetMachineState {
            state: MachineState::Quiescing,
            reason: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(
        err,
        MachineError::InvalidTransition {
            from: MachineState::Offline,
            to: MachineState::Quiescing
        }
    ));
}

#[tokio::test]
async fn test_duplicate_registration_is_rejected() {
    let store = MemoryStore::new();
    let req = RegisterMachine {
        hostname: "bender".to_string(),
        heartbeat_interval: None,
        max_concurrent_jobs: None,
    };
    machine_service::register_machine(&store, req.clone())
        .await
        .unwrap();

    let err = machine_service::register_machine(&store, req)
        .await
        .unwrap_err();
    assert!(matches!(err, MachineError::AlreadyRegistered(_)));
}

#[tokio::test]
async fn test_repeated_failures_mark_import_failing() {
    let store = MemoryStore::new();
    let config = Config {
        consecutive_failure_limit: 2,
        ..Config::default()
    };
    let import = create(&store, "widget").await;

    let job_id = job_service::get_job_for_machine(&store, "bender", 1)
        .await
        .unwrap();
    let finished = job_service::finish_job(&store, &config, finish_request(job_id, "FAILURE"))
        .await
        .unwrap();
    assert!(!finished.import_failing);

    // Run the rescheduled job straight away
    let retry = finished.next_job_id.unwrap();
    store
        .request_import(import.id, "alice", Utc::now())
        .await
        .unwrap();
    let claimed = job_service::get_job_for_machine(&store, "bender", 1)
        .await
        .unwrap();
    assert_eq!(claimed, retry);

    let finished = job_service::finish_job(
        &store,
        &config,
        finish_request(claimed, "FAILURE_REMOTE_BROKEN"),
    )
    .await
    .unwrap();
    assert!(finished.import_failing);
    assert!(finished.next_job_id.is_none());

    let import = store.find_import(import.id).await.unwrap().unwrap();
    assert_eq!(import.review_status, ReviewStatus::Failing);
    assert!(store.list_jobs().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_reaper_reclaims_silent_jobs_once() {
    let store = MemoryStore::new();
    let long_ago = Utc::now() - ChronoDuration::minutes(30);
    let import = store
        .create_import(&git_import("widget"), long_ago)
        .await
        .unwrap();

    let Claim::Claimed(job_id) = store.claim_job("bender", 1, long_ago).await.unwrap() else {
        panic!("expected a claim");
    };

    let reclaimed = reaper::reclaim_stale_jobs(&store, Duration::from_secs(600))
        .await
        .unwrap();
    assert_eq!(reclaimed.len(), 1);
    assert_eq!(reclaimed[0].result.status, ResultStatus::Reclaimed);
    assert!(reclaimed[0].result.log_file.is_none());
    assert!(store.find_job(job_id).await.unwrap().is_none());

    // Re-queued and due immediately
    let next = store
        .find_job(reclaimed[0].next_job_id.unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(next.date_due <= Utc::now());
    assert_eq!(next.code_import_id, import.id);

    let again = reaper::reclaim_stale_jobs(&store, Duration::from_secs(600))
        .await
        .unwrap();
    assert!(again.is_empty());

    let events = store.list_events(10).await.unwrap();
    assert!(events.iter().any(|e| e.event_type == EventType::Reclaim));
}

#[tokio::test]
async fn test_reaper_leaves_live_jobs_alone() {
    let store = MemoryStore::new();
    create(&store, "widget").await;
    let job_id = job_service::get_job_for_machine(&store, "bender", 1)
        .await
        .unwrap();

    let reclaimed = reaper::reclaim_stale_jobs(&store, Duration::from_secs(600))
        .await
        .unwrap();
    assert!(reclaimed.is_empty());
    assert!(store.find_job(job_id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_requesting_running_import_is_a_conflict() {
    let store = MemoryStore::new();
    let import = create(&store, "widget").await;
    job_service::get_job_for_machine(&store, "bender", 1)
        .await
        .unwrap();

    let err = import_service::request_import(
        &store,
        import.id,
        RequestImport {
            requested_by: "alice".to_string(),
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, import_service::ImportError::Conflict(_)));
}

#[tokio::test]
async fn test_duplicate_target_is_a_conflict() {
    let store = MemoryStore::new();
    create(&store, "widget").await;

    let err = import_service::create_import(&store, git_import("widget"))
        .await
        .unwrap_err();
    assert!(matches!(err, import_service::ImportError::Conflict(_)));
}
