//! Write-time isolation guard tests.
//!
//! The guard must catch entities that never passed a scoped read, and a
//! single violation must abort the whole commit.

mod common;

use clinic_core::error::CoreError;
use common::{claims_for_tenant, Patient, StockItem, TestBed, TENANT_B};

async fn seed_patient(bed: &TestBed, id: &str, branch: i32) {
    let admin = bed.admin_uow();
    let patients = admin.repository::<Patient>().unwrap();
    patients.add(Patient::new(id, branch, "Seeded Patient"));
    admin.commit().await.unwrap();
}

#[tokio::test]
async fn update_outside_scope_aborts_and_persists_nothing() {
    let bed = TestBed::new();
    seed_patient(&bed, "p-1", 1).await;

    // The caller is scoped to branch 2 only; the entity arrives from outside
    // any scoped read (e.g. deserialized from an import payload).
    let uow = bed.uow(&[2]);
    let patients = uow.repository::<Patient>().unwrap();
    let mut smuggled = Patient::new("p-1", 1, "Seeded Patient");
    smuggled.phone = "999".to_string();
    patients.update(smuggled);

    let err = uow.commit().await.unwrap_err();
    assert!(matches!(err, CoreError::IsolationViolation { .. }));

    // A privileged re-read shows the row unchanged.
    let admin = bed.admin_uow();
    let patients = admin.repository::<Patient>().unwrap();
    let stored = patients.get_by_id_privileged("p-1").await.unwrap().unwrap();
    assert_eq!(stored.phone, "000");
}

#[tokio::test]
async fn add_into_unauthorized_branch_is_rejected() {
    let bed = TestBed::new();

    let uow = bed.uow(&[1, 2]);
    let patients = uow.repository::<Patient>().unwrap();
    patients.add(Patient::new("p-9", 3, "Wrong Branch"));

    let err = uow.commit().await.unwrap_err();
    assert!(matches!(err, CoreError::IsolationViolation { .. }));

    let admin = bed.admin_uow();
    let patients = admin.repository::<Patient>().unwrap();
    assert!(patients.get_by_id_privileged("p-9").await.unwrap().is_none());
}

#[tokio::test]
async fn one_violation_aborts_the_entire_commit() {
    let bed = TestBed::new();

    let uow = bed.uow(&[1]);
    let patients = uow.repository::<Patient>().unwrap();
    patients.add(Patient::new("p-ok", 1, "Authorized"));
    patients.add(Patient::new("p-bad", 3, "Unauthorized"));

    assert!(uow.commit().await.is_err());
    // The queue keeps its pre-commit state so the caller may fix and retry.
    assert_eq!(uow.pending_count(), 2);

    // Not even the authorized row was written.
    let admin = bed.admin_uow();
    let patients = admin.repository::<Patient>().unwrap();
    assert!(patients.get_by_id_privileged("p-ok").await.unwrap().is_none());
}

#[tokio::test]
async fn discarding_changes_empties_the_queue() {
    let bed = TestBed::new();

    let uow = bed.uow(&[1]);
    let patients = uow.repository::<Patient>().unwrap();
    patients.add(Patient::new("p-bad", 3, "Unauthorized"));
    assert!(uow.commit().await.is_err());

    uow.discard_changes();
    assert_eq!(uow.pending_count(), 0);
    assert_eq!(uow.commit().await.unwrap(), 0);
}

#[tokio::test]
async fn super_admin_bypasses_branch_and_tenant_checks() {
    let bed = TestBed::new();

    let admin = bed.admin_uow();
    let patients = admin.repository::<Patient>().unwrap();
    let mut foreign = Patient::new("p-f", 7, "Foreign");
    foreign.tenant_id = Some(TENANT_B);
    patients.add(foreign);
    // Missing branch id is also acceptable for a super-admin write.
    let mut unassigned = Patient::new("p-u", 1, "Unassigned");
    unassigned.branch_id = None;
    patients.add(unassigned);

    assert_eq!(admin.commit().await.unwrap(), 2);
}

#[tokio::test]
async fn foreign_tenant_write_is_rejected() {
    let bed = TestBed::new();

    // Branch 1 is in scope; the tenant is not.
    let uow = bed.uow_for(claims_for_tenant(TENANT_B, &[1], false));
    let patients = uow.repository::<Patient>().unwrap();
    // Patient::new stamps TENANT_A.
    patients.add(Patient::new("p-t", 1, "Cross Tenant"));

    let err = uow.commit().await.unwrap_err();
    assert!(matches!(err, CoreError::IsolationViolation { .. }));
}

#[tokio::test]
async fn missing_branch_id_fails_closed_at_write_time() {
    let bed = TestBed::new();

    let uow = bed.uow(&[1]);
    let items = uow.repository::<StockItem>().unwrap();
    let mut item = StockItem::new("s-1", 1, "Gauze", 10);
    item.branch_id = None;
    items.add(item);

    let err = uow.commit().await.unwrap_err();
    assert!(matches!(err, CoreError::IsolationViolation { .. }));
}

#[tokio::test]
async fn validation_failure_surfaces_before_the_guard() {
    let bed = TestBed::new();

    // Empty name violates the Patient validation rules; branch 3 would also
    // violate scope, but validation is checked first.
    let uow = bed.uow(&[1]);
    let patients = uow.repository::<Patient>().unwrap();
    patients.add(Patient::new("p-v", 3, ""));

    let err = uow.commit().await.unwrap_err();
    assert!(matches!(err, CoreError::ValidationError(_)));
}
