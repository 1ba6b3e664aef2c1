//! Integration tests for the convergence verifier.
//!
//! These run a full resource lifecycle against the in-memory cloud:
//! create a parent+child association, re-point the child at a new parent,
//! import by composite id with a round-trip check, then tear down and
//! confirm destruction.

use std::sync::Arc;

use converge_core::test_util::{DesiredResource, MemoryCloud};
use converge_core::{
    ConvergenceStep, DestroyCheck, ImportProbe, RemoteBackend, RemoteError, StepFailure, Verifier,
    checks, kinds,
};

/// Pre-create the surrounding resources the lifecycle under test refers
/// to. Configuration interpolation is the harness's job, not the core's.
async fn fixture(cloud: &MemoryCloud) -> (String, String, String) {
    let rtb_foo = cloud
        .apply(&DesiredResource::new("route_table", "rt-foo").attr("vpc_id", "vpc-1"))
        .await
        .expect("apply rt-foo");
    let rtb_bar = cloud
        .apply(&DesiredResource::new("route_table", "rt-bar").attr("vpc_id", "vpc-1"))
        .await
        .expect("apply rt-bar");
    let subnet = cloud
        .apply(&DesiredResource::new("subnet", "subnet-foo").attr("vpc_id", "vpc-1"))
        .await
        .expect("apply subnet");
    (rtb_foo, rtb_bar, subnet)
}

fn association_config(alias: &str, rtb: &str, subnet: &str) -> DesiredResource {
    DesiredResource::new("route_table_association", alias)
        .attr("route_table_id", rtb)
        .attr("subnet_id", subnet)
}

#[tokio::test]
async fn association_lifecycle_with_roundtrip_import() {
    let cloud = Arc::new(MemoryCloud::new());
    let (rtb_foo, rtb_bar, subnet) = fixture(&cloud).await;
    let verifier = Verifier::new(Arc::clone(&cloud));

    let steps = vec![
        // Create the association against the first route table.
        ConvergenceStep::new(association_config("assoc", &rtb_foo, &subnet))
            .check(checks::exists())
            .check(checks::attr_equals("route_table_id", &rtb_foo)),
        // Re-reading the parent through a convergent no-op apply must show
        // the association.
        ConvergenceStep::new(DesiredResource::new("route_table", "rt-foo").attr("vpc_id", "vpc-1"))
            .check(checks::has_associations()),
        // Re-point the child at the second route table, then import it by
        // composite id and require an exact round-trip.
        ConvergenceStep::new(association_config("assoc", &rtb_bar, &subnet))
            .check(checks::exists())
            .check(checks::attr_equals("route_table_id", &rtb_bar))
            .import_probe(ImportProbe::new(&kinds::ROUTE_TABLE_ASSOCIATION, |record| {
                format!(
                    "{}/{}",
                    record.attr("route_table_id").unwrap_or_default(),
                    record.attr("subnet_id").unwrap_or_default()
                )
            })),
        // The old parent must have no stale association left.
        ConvergenceStep::new(DesiredResource::new("route_table", "rt-foo").attr("vpc_id", "vpc-1"))
            .check(checks::no_associations()),
        // And the new parent must have exactly the moved one.
        ConvergenceStep::new(DesiredResource::new("route_table", "rt-bar").attr("vpc_id", "vpc-1"))
            .check(checks::has_associations()),
    ];

    let report = verifier.run(&steps).await.expect("run should pass");
    assert_eq!(report.steps_completed, 5);

    let assoc_id = cloud.id_for_alias("assoc").await.expect("assoc id");
    assert_eq!(report.tracked, vec![assoc_id.clone(), rtb_foo.clone(), rtb_bar.clone()]);

    // Teardown: the harness destroys, the verifier only confirms.
    assert!(cloud.remove(&assoc_id).await);
    assert!(cloud.remove(&rtb_foo).await);
    assert!(cloud.remove(&rtb_bar).await);

    verifier
        .confirm_destroyed(&[
            DestroyCheck::Absent(assoc_id),
            DestroyCheck::Absent(rtb_foo),
            DestroyCheck::Absent(rtb_bar),
        ])
        .await
        .expect("destruction should be confirmed");
}

#[tokio::test]
async fn bucket_roundtrip_pins_the_destroy_guard() {
    let cloud = Arc::new(MemoryCloud::new());
    let verifier = Verifier::new(Arc::clone(&cloud));

    // force_destroy is mutable-but-unknowable: the round-trip must come
    // back with the safe default, not the applied value.
    let steps = vec![
        ConvergenceStep::new(
            DesiredResource::new("bucket", "b")
                .attr("name", "bucket1")
                .attr("acl", "public-read")
                .attr("force_destroy", "true"),
        )
        .check(checks::exists())
        .check(checks::attr_equals("acl", "public-read"))
        .import_probe(ImportProbe::new(&kinds::BUCKET, |record| {
            format!("{}_{}", record.id, record.attr("acl").unwrap_or_default())
        })),
    ];

    verifier.run(&steps).await.expect("run should pass");

    cloud.remove("bucket1").await;
    verifier
        .confirm_destroyed(&[DestroyCheck::Absent("bucket1".to_string())])
        .await
        .expect("bucket should be gone");
}

#[tokio::test]
async fn first_failing_check_aborts_the_run() {
    let cloud = Arc::new(MemoryCloud::new());
    let verifier = Verifier::new(Arc::clone(&cloud));

    let steps = vec![
        ConvergenceStep::new(DesiredResource::new("route_table", "rt"))
            .check(checks::has_associations()),
        ConvergenceStep::new(DesiredResource::new("route_table", "rt-never")),
    ];

    let failure = verifier.run(&steps).await.unwrap_err();
    match failure {
        StepFailure::Check { step, check, .. } => {
            assert_eq!(step, 0);
            assert_eq!(check, "has_associations");
        }
        other => panic!("unexpected failure: {other}"),
    }

    // The run short-circuited: the second step was never applied.
    assert_eq!(cloud.id_for_alias("rt-never").await, None);
}

#[tokio::test]
async fn roundtrip_mismatch_reports_the_differing_attrs() {
    let cloud = Arc::new(MemoryCloud::new());
    let verifier = Verifier::new(Arc::clone(&cloud));

    // Probe deliberately imports with the wrong ACL part: the derived
    // attribute overlays the remote value, so the records must differ.
    let steps = vec![
        ConvergenceStep::new(
            DesiredResource::new("bucket", "b")
                .attr("name", "bucket1")
                .attr("acl", "public-read"),
        )
        .import_probe(ImportProbe::new(&kinds::BUCKET, |record| {
            record.id.clone() // primary-only form defaults acl to private
        })),
    ];

    let failure = verifier.run(&steps).await.unwrap_err();
    match failure {
        StepFailure::RoundTrip { step, diffs, .. } => {
            assert_eq!(step, 0);
            assert!(diffs.iter().any(|d| d.attr == "acl"), "diffs: {diffs:?}");
        }
        other => panic!("unexpected failure: {other}"),
    }
}

#[tokio::test]
async fn destruction_needs_the_typed_not_found() {
    let cloud = Arc::new(MemoryCloud::new());
    let verifier = Verifier::new(Arc::clone(&cloud));

    let rtb = cloud
        .apply(&DesiredResource::new("route_table", "rt"))
        .await
        .expect("apply");

    // Still present: a successful read fails the destruction check.
    let failure = verifier
        .confirm_destroyed(&[DestroyCheck::Absent(rtb.clone())])
        .await
        .unwrap_err();
    assert!(matches!(failure, StepFailure::StillExists { .. }));

    // A non-not-found error is fatal, not a confirmed absence.
    cloud
        .set_read_fault(Some(RemoteError::Unexpected("rate limited".to_string())))
        .await;
    let failure = verifier
        .confirm_destroyed(&[DestroyCheck::Absent(rtb.clone())])
        .await
        .unwrap_err();
    match failure {
        StepFailure::UnconfirmedAbsence { source, .. } => {
            assert_eq!(source, RemoteError::Unexpected("rate limited".to_string()));
        }
        other => panic!("unexpected failure: {other}"),
    }

    cloud.set_read_fault(None).await;
    cloud.remove(&rtb).await;
    verifier
        .confirm_destroyed(&[DestroyCheck::Absent(rtb)])
        .await
        .expect("now gone");
}

#[tokio::test]
async fn parent_destruction_requires_zero_associations() {
    let cloud = Arc::new(MemoryCloud::new());
    let verifier = Verifier::new(Arc::clone(&cloud));
    let (rtb_foo, _, subnet) = fixture(&cloud).await;

    let assoc = cloud
        .apply(&association_config("assoc", &rtb_foo, &subnet))
        .await
        .expect("apply assoc");

    let failure = verifier
        .confirm_destroyed(&[DestroyCheck::NoAssociations(rtb_foo.clone())])
        .await
        .unwrap_err();
    match failure {
        StepFailure::AssociationsRemain { count, .. } => assert_eq!(count, 1),
        other => panic!("unexpected failure: {other}"),
    }

    cloud.remove(&assoc).await;
    verifier
        .confirm_destroyed(&[DestroyCheck::NoAssociations(rtb_foo)])
        .await
        .expect("no associations remain");
}

#[tokio::test]
async fn transient_errors_are_terminal_for_the_run() {
    let cloud = Arc::new(MemoryCloud::new());
    let verifier = Verifier::new(Arc::clone(&cloud));

    cloud
        .set_read_fault(Some(RemoteError::Transient("throttled".to_string())))
        .await;

    let steps =
        vec![ConvergenceStep::new(DesiredResource::new("route_table", "rt")).check(checks::exists())];
    let failure = verifier.run(&steps).await.unwrap_err();
    assert!(matches!(failure, StepFailure::ReadBack { step: 0, .. }));
}
