use super::common::*;
use crate::config::PipelineConfig;
use crate::error::{ErrorKind, PipelineError};
use crate::workflows::applications::bulk::BulkCancellation;
use crate::workflows::applications::domain::{ApplicantDetailId, ApplicantStatus, Decision};
use crate::workflows::applications::memory::InMemoryPipelineRepository;
use crate::workflows::applications::service::ApplicationPipeline;

#[test]
fn one_bad_item_does_not_block_the_rest() {
    let (pipeline, _, notifier) = build_pipeline();
    let intake = intake(&pipeline, call_for_application(false, true));
    let first = in_review(&pipeline, &intake, "Ada");
    let pending = register(&pipeline, &intake, "Grace").id;
    let third = in_review(&pipeline, &intake, "Katherine");

    let outcome = pipeline
        .bulk_decide(
            &[first.clone(), pending.clone(), third.clone()],
            "approved",
            &reviewer(),
        )
        .expect("batch accepted");

    assert_eq!(outcome.succeeded, vec![first.clone(), third.clone()]);
    assert_eq!(outcome.failed_ids(), vec![&pending]);
    assert_eq!(outcome.failed[0].kind, ErrorKind::InvalidApplicantStatus);
    assert!(outcome.not_attempted.is_empty());

    assert_eq!(
        pipeline.applicant(&pending).expect("stored").status,
        ApplicantStatus::Pending
    );
    for approved in [&first, &third] {
        assert!(pipeline
            .approved_applicant(approved)
            .expect("readable")
            .is_some());
    }
    assert_eq!(notifier.events().len(), 2);
}

#[test]
fn missing_applicants_are_reported_per_item() {
    let (pipeline, _, _) = build_pipeline();
    let intake = intake(&pipeline, call_for_application(false, false));
    let known = in_review(&pipeline, &intake, "Ada");
    let missing = ApplicantDetailId::from("applicant-missing");

    let outcome = pipeline
        .bulk_decide(&[missing.clone(), known.clone()], "Rejected", &reviewer())
        .expect("batch accepted");

    assert_eq!(outcome.succeeded, vec![known]);
    assert_eq!(outcome.failed[0].applicant_id, missing);
    assert_eq!(outcome.failed[0].kind, ErrorKind::NotFound);
}

#[test]
fn malformed_batches_are_refused_up_front() {
    let (pipeline, _, notifier) = build_pipeline();
    let intake = intake(&pipeline, call_for_application(false, false));
    let applicant_id = in_review(&pipeline, &intake, "Ada");

    assert!(matches!(
        pipeline.bulk_decide(&[], "approved", &reviewer()),
        Err(PipelineError::EmptyBatch)
    ));
    match pipeline.bulk_decide(&[applicant_id.clone()], "graduated", &reviewer()) {
        Err(PipelineError::UnknownStatus(status)) => assert_eq!(status, "graduated"),
        other => panic!("expected unknown status, got {other:?}"),
    }

    assert_eq!(
        pipeline.applicant(&applicant_id).expect("stored").status,
        ApplicantStatus::InReview
    );
    assert!(notifier.events().is_empty());
}

#[test]
fn batches_above_the_configured_limit_are_refused() {
    let (pipeline, _, _) = build_pipeline_with(PipelineConfig {
        max_bulk_items: 2,
        ..PipelineConfig::default()
    });
    let intake = intake(&pipeline, call_for_application(false, false));
    let ids: Vec<ApplicantDetailId> = ["Ada", "Grace", "Katherine"]
        .into_iter()
        .map(|name| in_review(&pipeline, &intake, name))
        .collect();

    match pipeline.bulk_decide(&ids, "approved", &reviewer()) {
        Err(PipelineError::BatchTooLarge { max, received }) => {
            assert_eq!((max, received), (2, 3))
        }
        other => panic!("expected batch too large, got {other:?}"),
    }
    for id in &ids {
        assert_eq!(
            pipeline.applicant(id).expect("stored").status,
            ApplicantStatus::InReview
        );
    }
}

#[test]
fn a_cancelled_batch_attempts_nothing() {
    let (pipeline, _, _) = build_pipeline();
    let intake = intake(&pipeline, call_for_application(false, false));
    let ids = vec![
        in_review(&pipeline, &intake, "Ada"),
        in_review(&pipeline, &intake, "Grace"),
    ];
    let cancellation = BulkCancellation::default();
    cancellation.cancel();

    let outcome = pipeline
        .bulk_decide_with_cancellation(&ids, "approved", &reviewer(), &cancellation)
        .expect("batch accepted");

    assert!(outcome.succeeded.is_empty());
    assert!(outcome.failed.is_empty());
    assert_eq!(outcome.not_attempted, ids);
}

#[test]
fn cancellation_mid_batch_finishes_the_current_item_only() {
    let (pipeline, repository, _) = build_pipeline();
    let intake = intake(&pipeline, call_for_application(false, false));
    let ids = vec![
        in_review(&pipeline, &intake, "Ada"),
        in_review(&pipeline, &intake, "Grace"),
        in_review(&pipeline, &intake, "Katherine"),
    ];

    let cancellation = BulkCancellation::default();
    let cancelling: ApplicationPipeline<InMemoryPipelineRepository, CancellingNotifier, AllowAll> =
        pipeline_over(
            &repository,
            CancellingNotifier {
                cancellation: cancellation.clone(),
            },
            AllowAll,
        );

    let outcome = cancelling
        .bulk_decide_with_cancellation(&ids, "approved", &reviewer(), &cancellation)
        .expect("batch accepted");

    assert_eq!(outcome.succeeded, vec![ids[0].clone()]);
    assert_eq!(outcome.not_attempted, ids[1..].to_vec());
    assert_eq!(
        pipeline.applicant(&ids[1]).expect("stored").status,
        ApplicantStatus::InReview
    );
}

#[test]
fn bulk_stage_assignment_isolates_failures() {
    let (pipeline, _, _) = build_pipeline();
    let (intake, stages) = staged_intake(&pipeline, &["Screening", "Interview"]);
    let first = in_review(&pipeline, &intake, "Ada");
    let pending = register(&pipeline, &intake, "Grace").id;
    let decided = in_review(&pipeline, &intake, "Katherine");
    pipeline
        .decide(&decided, Decision::Rejected, &reviewer())
        .expect("rejected");

    let outcome = pipeline
        .bulk_assign_stage(&[first.clone(), pending.clone(), decided.clone()], &stages[1].id)
        .expect("batch accepted");

    assert_eq!(outcome.succeeded, vec![first.clone()]);
    assert_eq!(outcome.failed_ids(), vec![&pending, &decided]);
    assert!(outcome
        .failed
        .iter()
        .all(|failure| failure.kind == ErrorKind::InvalidApplicantStatus));
    assert_eq!(
        pipeline.applicant(&first).expect("stored").current_stage_id,
        Some(stages[1].id.clone())
    );
}

#[test]
fn cancellation_is_shared_across_clones() {
    let original = BulkCancellation::default();
    let shared = original.clone();

    assert!(!shared.is_cancelled());
    original.cancel();
    assert!(shared.is_cancelled());
}
