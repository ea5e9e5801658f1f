use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::domain::{ApplicantDetailId, AuthenticatedCaller, Decision, StageId};
use super::repository::{CapabilityCheck, NotificationDispatcher, PipelineRepository};
use super::stages::StagePipeline;
use super::status::ApplicantStatusMachine;
use crate::error::{ErrorKind, PipelineError};

/// Cooperative stop signal shared with a running bulk operation.
///
/// Checked before each item; an item that has started always runs to completion.
#[derive(Debug, Clone, Default)]
pub struct BulkCancellation {
    cancelled: Arc<AtomicBool>,
}

impl BulkCancellation {
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkFailure {
    pub applicant_id: ApplicantDetailId,
    pub kind: ErrorKind,
    pub message: String,
}

/// Full partition of a bulk request. Every requested id lands in exactly one list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BulkOutcome {
    pub succeeded: Vec<ApplicantDetailId>,
    pub failed: Vec<BulkFailure>,
    pub not_attempted: Vec<ApplicantDetailId>,
}

impl BulkOutcome {
    pub fn failed_ids(&self) -> Vec<&ApplicantDetailId> {
        self.failed.iter().map(|failure| &failure.applicant_id).collect()
    }
}

/// Applies one transition to many applicants with per-item isolation.
pub struct BulkOperationCoordinator<R, N, C> {
    machine: Arc<ApplicantStatusMachine<R, N, C>>,
    pipeline: Arc<StagePipeline<R>>,
    max_items: usize,
}

impl<R, N, C> BulkOperationCoordinator<R, N, C>
where
    R: PipelineRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    pub fn new(
        machine: Arc<ApplicantStatusMachine<R, N, C>>,
        pipeline: Arc<StagePipeline<R>>,
        max_items: usize,
    ) -> Self {
        Self {
            machine,
            pipeline,
            max_items,
        }
    }

    /// `status` is the raw decision string; an unknown value fails the whole request.
    pub fn bulk_decide(
        &self,
        applicant_ids: &[ApplicantDetailId],
        status: &str,
        caller: &AuthenticatedCaller,
        cancellation: &BulkCancellation,
    ) -> Result<BulkOutcome, PipelineError> {
        self.check_batch(applicant_ids)?;
        let decision = Decision::parse(status)
            .ok_or_else(|| PipelineError::UnknownStatus(status.to_string()))?;

        let outcome = self.run(applicant_ids, cancellation, |applicant_id| {
            self.machine
                .decide(applicant_id, decision, caller)
                .map(|_| ())
        });
        info!(
            operation = "bulk_decide",
            status = decision.status().code(),
            caller = %caller.user_id,
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            not_attempted = outcome.not_attempted.len(),
            "bulk operation finished"
        );
        Ok(outcome)
    }

    pub fn bulk_assign_stage(
        &self,
        applicant_ids: &[ApplicantDetailId],
        stage_id: &StageId,
        cancellation: &BulkCancellation,
    ) -> Result<BulkOutcome, PipelineError> {
        self.check_batch(applicant_ids)?;

        let outcome = self.run(applicant_ids, cancellation, |applicant_id| {
            self.pipeline
                .assign_stage(applicant_id, stage_id)
                .map(|_| ())
        });
        info!(
            operation = "bulk_assign_stage",
            stage_id = %stage_id,
            succeeded = outcome.succeeded.len(),
            failed = outcome.failed.len(),
            not_attempted = outcome.not_attempted.len(),
            "bulk operation finished"
        );
        Ok(outcome)
    }

    fn check_batch(&self, applicant_ids: &[ApplicantDetailId]) -> Result<(), PipelineError> {
        if applicant_ids.is_empty() {
            return Err(PipelineError::EmptyBatch);
        }
        if applicant_ids.len() > self.max_items {
            return Err(PipelineError::BatchTooLarge {
                max: self.max_items,
                received: applicant_ids.len(),
            });
        }
        Ok(())
    }

    fn run(
        &self,
        applicant_ids: &[ApplicantDetailId],
        cancellation: &BulkCancellation,
        mut operation: impl FnMut(&ApplicantDetailId) -> Result<(), PipelineError>,
    ) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();

        for (position, applicant_id) in applicant_ids.iter().enumerate() {
            if cancellation.is_cancelled() {
                outcome
                    .not_attempted
                    .extend(applicant_ids[position..].iter().cloned());
                break;
            }

            match operation(applicant_id) {
                Ok(()) => outcome.succeeded.push(applicant_id.clone()),
                Err(error) => outcome.failed.push(BulkFailure {
                    applicant_id: applicant_id.clone(),
                    kind: error.kind(),
                    message: error.to_string(),
                }),
            }
        }

        outcome
    }
}
