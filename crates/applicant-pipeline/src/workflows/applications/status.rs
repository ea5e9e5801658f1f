use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::domain::{
    Activity, ApplicantDetail, ApplicantDetailId, ApplicantStatus, ApprovedApplicant,
    ApprovedApplicantId, AuthenticatedCaller, Decision, StageId,
};
use super::repository::{
    ApplicantNotification, CapabilityCheck, NotificationDispatcher, PipelineRepository,
};
use crate::error::{EntityKind, PipelineError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Transition {
    Apply,
    NoOp,
}

/// Legal status moves. Anything absent from the table is refused.
pub(crate) fn check_transition(from: ApplicantStatus, to: ApplicantStatus) -> Option<Transition> {
    use ApplicantStatus::*;

    match (from, to) {
        (Pending, InReview) => Some(Transition::Apply),
        (InReview, InReview) => Some(Transition::NoOp),
        (InReview, Approved | Rejected | Failed) => Some(Transition::Apply),
        (Approved, Graduated) => Some(Transition::Apply),
        (Graduated, Graduated) => Some(Transition::NoOp),
        _ => None,
    }
}

fn refuse(detail: &ApplicantDetail, requested: ApplicantStatus) -> PipelineError {
    PipelineError::InvalidApplicantStatus {
        applicant_id: detail.id.clone(),
        current: detail.status,
        requested,
    }
}

/// Next revision of `detail` after an accepted submission.
///
/// The first submission moves a pending applicant into review and, for staged pipelines,
/// onto `first_stage`. Later submissions while in review only refresh the timestamp.
pub(crate) fn submitted(
    detail: &ApplicantDetail,
    first_stage: Option<&StageId>,
) -> Result<ApplicantDetail, PipelineError> {
    let transition = check_transition(detail.status, ApplicantStatus::InReview)
        .ok_or_else(|| refuse(detail, ApplicantStatus::InReview))?;

    let mut next = detail.next_revision();
    next.submitted_at = Some(next.updated_at);
    if transition == Transition::Apply {
        next.status = ApplicantStatus::InReview;
        next.current_stage_id = first_stage.cloned();
    }
    Ok(next)
}

/// Records review outcomes and the post-programme graduation step.
pub struct ApplicantStatusMachine<R, N, C> {
    repository: Arc<R>,
    notifier: Arc<N>,
    access: Arc<C>,
}

impl<R, N, C> ApplicantStatusMachine<R, N, C>
where
    R: PipelineRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    pub fn new(repository: Arc<R>, notifier: Arc<N>, access: Arc<C>) -> Self {
        Self {
            repository,
            notifier,
            access,
        }
    }

    /// Approve or reject an applicant that is in review.
    pub fn decide(
        &self,
        applicant_id: &ApplicantDetailId,
        decision: Decision,
        caller: &AuthenticatedCaller,
    ) -> Result<ApplicantDetail, PipelineError> {
        let detail = self.load(applicant_id)?;
        if !self.access.can_decide(caller, &detail.activity_id) {
            warn!(
                applicant_id = %applicant_id,
                caller = %caller.user_id,
                "decision refused by capability check"
            );
            return Err(PipelineError::Forbidden(caller.user_id.clone()));
        }

        self.transition(detail, decision.status(), Some(caller))
    }

    pub fn mark_failed(
        &self,
        applicant_id: &ApplicantDetailId,
    ) -> Result<ApplicantDetail, PipelineError> {
        let detail = self.load(applicant_id)?;
        self.transition(detail, ApplicantStatus::Failed, None)
    }

    /// Idempotent: graduating an already graduated applicant returns it unchanged.
    pub fn graduate(
        &self,
        applicant_id: &ApplicantDetailId,
    ) -> Result<ApplicantDetail, PipelineError> {
        let detail = self.load(applicant_id)?;
        self.transition(detail, ApplicantStatus::Graduated, None)
    }

    fn load(&self, applicant_id: &ApplicantDetailId) -> Result<ApplicantDetail, PipelineError> {
        self.repository
            .applicant(applicant_id)?
            .ok_or_else(|| PipelineError::not_found(EntityKind::Applicant, applicant_id))
    }

    fn transition(
        &self,
        detail: ApplicantDetail,
        target: ApplicantStatus,
        caller: Option<&AuthenticatedCaller>,
    ) -> Result<ApplicantDetail, PipelineError> {
        match check_transition(detail.status, target) {
            Some(Transition::Apply) => {}
            Some(Transition::NoOp) => return Ok(detail),
            None => return Err(refuse(&detail, target)),
        }

        let activity = self
            .repository
            .activity(&detail.activity_id)?
            .ok_or_else(|| PipelineError::not_found(EntityKind::Activity, &detail.activity_id))?;

        let mut updated = detail.next_revision();
        updated.status = target;
        if let Some(caller) = caller {
            updated.decided_by = Some(caller.user_id.clone());
        }

        let mut transaction = self.repository.begin()?;
        transaction.update_applicant(updated.clone(), detail.version)?;
        if let Some(snapshot) = self.approval_snapshot(&activity, &updated)? {
            transaction.insert_approved(snapshot)?;
        }
        transaction
            .commit()
            .map_err(|error| PipelineError::from_applicant_write(error, &detail.id))?;

        info!(
            applicant_id = %updated.id,
            activity_id = %updated.activity_id,
            from = detail.status.code(),
            status = target.code(),
            "applicant status changed"
        );

        self.notify(&activity, &updated);
        Ok(updated)
    }

    fn approval_snapshot(
        &self,
        activity: &Activity,
        updated: &ApplicantDetail,
    ) -> Result<Option<ApprovedApplicant>, PipelineError> {
        if updated.status != ApplicantStatus::Approved {
            return Ok(None);
        }
        let Some(programme) = &activity.programme else {
            return Ok(None);
        };
        if self.repository.approved_applicant(&updated.id)?.is_some() {
            return Ok(None);
        }

        Ok(Some(ApprovedApplicant {
            id: ApprovedApplicantId::generate(),
            applicant_detail_id: updated.id.clone(),
            activity_id: activity.id.clone(),
            programme_id: programme.programme_id.clone(),
            contact: updated.contact.clone(),
            approved_by: updated.decided_by.clone().unwrap_or_default(),
            approved_at: Utc::now(),
        }))
    }

    fn notify(&self, activity: &Activity, updated: &ApplicantDetail) {
        let mut details = BTreeMap::new();
        details.insert("name".to_string(), updated.contact.full_name());
        details.insert("activity".to_string(), activity.title.clone());
        details.insert("status".to_string(), updated.status.label().to_string());

        let notification = ApplicantNotification {
            template: format!("applicant_{}", updated.status.code()),
            applicant_id: updated.id.clone(),
            activity_id: updated.activity_id.clone(),
            recipient: updated.contact.email.clone(),
            details,
        };

        if let Err(error) = self.notifier.dispatch(notification) {
            warn!(
                applicant_id = %updated.id,
                status = updated.status.code(),
                %error,
                "applicant notification failed"
            );
        }
    }
}
