//! Cross-crate scenarios over the in-memory world
//!
//! Each test drives the real gateway, event service, and worker pool the way
//! the HTTP layer and the worker binary do.

use std::time::Duration;

use rust_decimal_macros::dec;
use tokio::sync::watch;

use core_kernel::{ErrorKind, PatientId};
use domain_claims::{ClaimFilter, ClaimSort, ClaimStatus, Pagination, StatusUpdate};
use domain_jobs::queue::mock::QueueState;
use domain_jobs::{
    JobOutcome, JobQueue, JobStatus, PatientEventType, RecordPatientEvent, RetryPolicy,
};
use test_utils::{
    assert_history_consistent, assert_kind, assert_same_ids, ClaimBuilder, JobPayloadBuilder,
    TestWorld,
};

fn admission(patient_id: PatientId, key: &str) -> RecordPatientEvent {
    RecordPatientEvent {
        patient_id,
        event_type: PatientEventType::Admission,
        occurred_at: None,
        idempotency_key: Some(key.to_string()),
        notes: None,
    }
}

#[tokio::test]
async fn test_tenants_never_see_each_other() {
    let world = TestWorld::new();
    let acme = world.onboard_tenant().await;
    let globex = world.onboard_tenant().await;
    let acme_claim = world.seed_claim(&acme, ClaimStatus::Submitted).await;
    world.seed_claim(&globex, ClaimStatus::Submitted).await;
    world.seed_claim(&globex, ClaimStatus::UnderReview).await;

    let acme_admin = world.context_for(&acme.admin).await.unwrap();
    let globex_admin = world.context_for(&globex.admin).await.unwrap();

    assert_kind(
        world.gateway.find_by_id(&globex_admin, acme_claim.id).await,
        ErrorKind::NotFound,
    );
    assert_kind(
        world
            .gateway
            .update_status(&globex_admin, acme_claim.id, StatusUpdate::new(ClaimStatus::UnderReview))
            .await,
        ErrorKind::NotFound,
    );

    let filter = ClaimFilter::default();
    assert_eq!(world.gateway.count(&acme_admin, &filter).await.unwrap(), 1);
    assert_eq!(world.gateway.count(&globex_admin, &filter).await.unwrap(), 2);
    assert_eq!(world.status_of(acme_claim.id).await, Some(ClaimStatus::Submitted));
}

#[tokio::test]
async fn test_roles_see_only_their_slice() {
    let world = TestWorld::new();
    let tenant = world.onboard_tenant().await;
    let own = world.seed_claim(&tenant, ClaimStatus::Submitted).await;

    // Same tenant, different provider and patient
    let other_provider = test_utils::ReferenceFixtures::provider(tenant.organization.id);
    let other_patient = test_utils::ReferenceFixtures::patient(tenant.organization.id);
    let foreign = ClaimBuilder::new(tenant.organization.id, other_patient.id, other_provider.id).build();
    world.claims.seed(foreign.clone()).await;

    let provider = world.context_for(&tenant.provider_user).await.unwrap();
    let patient = world.context_for(&tenant.patient_user).await.unwrap();
    let admin = world.context_for(&tenant.admin).await.unwrap();

    let page = world
        .gateway
        .find_many(&provider, ClaimFilter::default(), ClaimSort::default(), Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, own.id);

    assert!(world.gateway.find_by_id(&patient, own.id).await.is_ok());
    assert_kind(world.gateway.find_by_id(&patient, foreign.id).await, ErrorKind::NotFound);

    let total = world
        .gateway
        .sum_amount(&admin, &ClaimFilter::default())
        .await
        .unwrap();
    assert_eq!(total, own.amount + foreign.amount);
}

#[tokio::test]
async fn test_processor_visibility_follows_live_assignments() {
    let world = TestWorld::new();
    let tenant = world.onboard_tenant().await;
    let claim = world.seed_claim(&tenant, ClaimStatus::Submitted).await;

    let unassigned = world.context_for(&tenant.processor).await.unwrap();
    assert_kind(world.gateway.find_by_id(&unassigned, claim.id).await, ErrorKind::NotFound);

    world.assign(&tenant.processor, &[claim.id]).await;
    let assigned = world.context_for(&tenant.processor).await.unwrap();
    let updated = world
        .gateway
        .update_status(&assigned, claim.id, StatusUpdate::new(ClaimStatus::UnderReview))
        .await
        .unwrap();
    assert_eq!(updated.status, ClaimStatus::UnderReview);

    world.assign(&tenant.processor, &[]).await;
    let revoked = world.context_for(&tenant.processor).await.unwrap();
    assert_kind(world.gateway.find_by_id(&revoked, claim.id).await, ErrorKind::NotFound);
}

#[tokio::test]
async fn test_deactivated_tenant_is_locked_out() {
    let world = TestWorld::new();
    let tenant = world.onboard_tenant().await;
    world.deactivate(&tenant).await;

    assert_kind(world.context_for(&tenant.admin).await, ErrorKind::TenantAccessDenied);
}

#[tokio::test]
async fn test_admission_event_moves_claims_through_the_worker() {
    let world = TestWorld::new();
    let tenant = world.onboard_tenant().await;
    let first = world.seed_claim(&tenant, ClaimStatus::Submitted).await;
    let second = world.seed_claim(&tenant, ClaimStatus::Submitted).await;
    let approved = world.seed_claim(&tenant, ClaimStatus::Approved).await;

    let provider = world.context_for(&tenant.provider_user).await.unwrap();
    let event = world
        .event_service
        .record(&provider, admission(tenant.patient.id, "adm-0001"))
        .await
        .unwrap();
    assert_eq!(event.job_status, Some(JobStatus::Pending));

    let outcomes = world.drain().await.unwrap();
    assert_eq!(outcomes, vec![JobOutcome::Completed]);

    for claim in [&first, &second] {
        let stored = world.claims.get(claim.id).await.unwrap();
        assert_eq!(stored.status, ClaimStatus::UnderReview);
        assert_history_consistent(&stored);
        assert!(stored.last_change().unwrap().changed_by.user_id().is_none());
    }
    assert_eq!(world.status_of(approved.id).await, Some(ClaimStatus::Approved));

    let stored_event = world.events.get(event.id).await.unwrap();
    assert_eq!(stored_event.job_status, Some(JobStatus::Completed));

    let entries = world.ledger.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, JobStatus::Completed);
    let result = entries[0].result.clone().unwrap();
    assert_eq!(result["claimsUpdated"], 2);
}

#[tokio::test]
async fn test_replayed_requests_and_duplicate_jobs_change_nothing() {
    let world = TestWorld::new();
    let tenant = world.onboard_tenant().await;
    world.seed_claim(&tenant, ClaimStatus::Submitted).await;
    let admin = world.context_for(&tenant.admin).await.unwrap();

    let first = world
        .event_service
        .record(&admin, admission(tenant.patient.id, "adm-replay"))
        .await
        .unwrap();
    let again = world
        .event_service
        .record(&admin, admission(tenant.patient.id, "adm-replay"))
        .await
        .unwrap();
    assert_eq!(again.id, first.id);
    assert_eq!(world.queue.jobs().await.len(), 1);

    world.drain().await.unwrap();
    let calls = world.claims.modify_calls();

    // A redelivered copy of the same job
    let duplicate = JobPayloadBuilder::new(PatientEventType::Admission, tenant.organization.id, tenant.patient.id)
        .with_idempotency_key("adm-replay")
        .build();
    let job_id = world.queue.enqueue(&duplicate).await.unwrap();
    assert_eq!(world.drain().await.unwrap(), vec![JobOutcome::Completed]);

    assert_eq!(world.queue.state(job_id).await, Some(QueueState::Done));
    assert_eq!(world.claims.modify_calls(), calls);
    assert_eq!(world.ledger.entries().await.len(), 1);
}

#[tokio::test]
async fn test_reused_key_for_another_event_type_is_rejected() {
    let world = TestWorld::new();
    let tenant = world.onboard_tenant().await;
    let admin = world.context_for(&tenant.admin).await.unwrap();

    world
        .event_service
        .record(&admin, admission(tenant.patient.id, "shared-key"))
        .await
        .unwrap();
    let mut discharge = admission(tenant.patient.id, "shared-key");
    discharge.event_type = PatientEventType::Discharge;

    assert_kind(
        world.event_service.record(&admin, discharge).await,
        ErrorKind::IdempotencyConflict,
    );
    assert_eq!(world.queue.jobs().await.len(), 1);
}

#[tokio::test]
async fn test_partial_failure_converges_on_retry() {
    let world = TestWorld::new();
    let tenant = world.onboard_tenant().await;
    let claims = [
        world.seed_claim(&tenant, ClaimStatus::Submitted).await,
        world.seed_claim(&tenant, ClaimStatus::Submitted).await,
        world.seed_claim(&tenant, ClaimStatus::Submitted).await,
    ];
    let admin = world.context_for(&tenant.admin).await.unwrap();
    world
        .event_service
        .record(&admin, admission(tenant.patient.id, "adm-flaky"))
        .await
        .unwrap();

    world.claims.fail_modifications_after(1);
    let outcomes = world.drain().await.unwrap();
    assert_eq!(
        outcomes,
        vec![JobOutcome::Retrying { next_attempt: 2 }, JobOutcome::Completed]
    );

    for claim in &claims {
        let stored = world.claims.get(claim.id).await.unwrap();
        assert_eq!(stored.status, ClaimStatus::UnderReview);
        // One opening entry and exactly one transition, never two
        assert_eq!(stored.status_history.len(), 2);
        assert_history_consistent(&stored);
    }

    let entries = world.ledger.entries().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].status, JobStatus::Completed);
    assert_eq!(entries[0].retry_count, 1);
}

#[tokio::test]
async fn test_persistent_failure_ends_dead() {
    let world = TestWorld::with_retry_policy(RetryPolicy {
        max_attempts: 2,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(10),
    });
    let tenant = world.onboard_tenant().await;
    world.seed_claim(&tenant, ClaimStatus::Submitted).await;

    // Processing is triggered by a patient, which no retry can fix
    let payload = JobPayloadBuilder::new(PatientEventType::Admission, tenant.organization.id, tenant.patient.id)
        .triggered_by(tenant.patient_user.id, domain_tenancy::Role::Patient)
        .build();
    let job_id = world.queue.enqueue(&payload).await.unwrap();

    assert_eq!(world.drain().await.unwrap(), vec![JobOutcome::Dead]);
    assert!(matches!(world.queue.state(job_id).await, Some(QueueState::Dead { .. })));
    assert!(world.ledger.entries().await.is_empty());
}

#[tokio::test]
async fn test_discharge_approves_and_locks_claims() {
    let world = TestWorld::new();
    let tenant = world.onboard_tenant().await;
    let claim = world.seed_claim(&tenant, ClaimStatus::UnderReview).await;
    let admin = world.context_for(&tenant.admin).await.unwrap();

    let mut discharge = admission(tenant.patient.id, "dis-0001");
    discharge.event_type = PatientEventType::Discharge;
    world.event_service.record(&admin, discharge).await.unwrap();
    world.drain().await.unwrap();

    let stored = world.claims.get(claim.id).await.unwrap();
    assert_eq!(stored.status, ClaimStatus::Approved);
    assert!(stored.processed_at.is_some());

    assert_kind(
        world
            .gateway
            .update_status(&admin, claim.id, StatusUpdate::new(ClaimStatus::Paid))
            .await,
        ErrorKind::ClaimNotModifiable,
    );
}

#[tokio::test]
async fn test_bulk_update_reports_each_claim() {
    let world = TestWorld::new();
    let tenant = world.onboard_tenant().await;
    let open = world.seed_claim(&tenant, ClaimStatus::UnderReview).await;
    let paid = world.seed_claim(&tenant, ClaimStatus::Paid).await;
    let other = world.onboard_tenant().await;
    let foreign = world.seed_claim(&other, ClaimStatus::UnderReview).await;
    let admin = world.context_for(&tenant.admin).await.unwrap();

    let result = world
        .gateway
        .bulk_update_status(
            &admin,
            &[open.id, paid.id, foreign.id, open.id],
            StatusUpdate::new(ClaimStatus::Rejected).with_reason("duplicate billing"),
        )
        .await
        .unwrap();

    let updated: Vec<_> = result.updated.iter().map(|claim| claim.id).collect();
    assert_same_ids(&updated, &[open.id]);
    let failed: Vec<_> = result.failed.iter().map(|failure| (failure.claim_id, failure.kind)).collect();
    assert_eq!(
        failed,
        vec![
            (paid.id, ErrorKind::ClaimNotModifiable),
            (foreign.id, ErrorKind::NotFound),
        ]
    );
    assert_eq!(
        world.claims.get(open.id).await.unwrap().denial_reason.as_deref(),
        Some("duplicate billing")
    );
}

#[tokio::test]
async fn test_created_claims_start_submitted() {
    let world = TestWorld::new();
    let tenant = world.onboard_tenant().await;
    let provider = world.context_for(&tenant.provider_user).await.unwrap();

    let request = ClaimBuilder::new(tenant.organization.id, tenant.patient.id, tenant.provider.id)
        .with_amount(dec!(1250.40))
        .with_diagnosis_code(" j06.9 ")
        .as_request();
    let claim = world.gateway.create(&provider, request).await.unwrap();

    assert_eq!(claim.status, ClaimStatus::Submitted);
    assert_eq!(claim.diagnosis_code, "J06.9");
    assert_eq!(claim.submitted_by, tenant.provider_user.id);
    assert!(claim.claim_number.starts_with("CLM-"));
    assert_history_consistent(&claim);
}

#[tokio::test]
async fn test_worker_pool_drains_and_stops_on_shutdown() {
    let world = TestWorld::new();
    let tenant = world.onboard_tenant().await;
    let claim = world.seed_claim(&tenant, ClaimStatus::Submitted).await;
    let admin = world.context_for(&tenant.admin).await.unwrap();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let pool = world.worker_pool(TestWorld::fast_settings());
    let running = tokio::spawn(async move { pool.run(shutdown_rx).await });

    world
        .event_service
        .record(&admin, admission(tenant.patient.id, "adm-live"))
        .await
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while world.status_of(claim.id).await != Some(ClaimStatus::UnderReview) {
        assert!(tokio::time::Instant::now() < deadline, "worker never processed the job");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), running)
        .await
        .expect("pool stops after shutdown")
        .unwrap();
    assert_eq!(world.queue.pending().await, 0);
}
