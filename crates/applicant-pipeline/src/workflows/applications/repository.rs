use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::domain::{
    Activity, ActivityId, ApplicantDetail, ApplicantDetailId, ApprovedApplicant,
    AuthenticatedCaller, Form, FormField, FormFieldId, FormFieldValue, FormId, Stage, StageId,
};

/// Read side of the persistence collaborator plus a transaction factory for writes.
pub trait PipelineRepository: Send + Sync {
    fn begin(&self) -> Result<Box<dyn RepositoryTransaction + '_>, RepositoryError>;

    fn activity(&self, id: &ActivityId) -> Result<Option<Activity>, RepositoryError>;
    fn form(&self, id: &FormId) -> Result<Option<Form>, RepositoryError>;
    fn forms_for_activity(&self, activity_id: &ActivityId) -> Result<Vec<Form>, RepositoryError>;
    fn form_fields(&self, form_id: &FormId) -> Result<Vec<FormField>, RepositoryError>;
    fn stages(&self, activity_id: &ActivityId) -> Result<Vec<Stage>, RepositoryError>;
    fn stage(&self, id: &StageId) -> Result<Option<Stage>, RepositoryError>;
    fn applicant(&self, id: &ApplicantDetailId) -> Result<Option<ApplicantDetail>, RepositoryError>;
    fn values_for(
        &self,
        applicant_id: &ApplicantDetailId,
    ) -> Result<Vec<FormFieldValue>, RepositoryError>;
    fn approved_applicant(
        &self,
        applicant_id: &ApplicantDetailId,
    ) -> Result<Option<ApprovedApplicant>, RepositoryError>;
}

/// Staged writes applied all-or-nothing on `commit`. Dropping without commit discards them.
pub trait RepositoryTransaction {
    fn insert_activity(&mut self, activity: Activity) -> Result<(), RepositoryError>;
    fn put_form(&mut self, form: Form) -> Result<(), RepositoryError>;
    fn put_field(&mut self, field: FormField) -> Result<(), RepositoryError>;
    fn insert_stage(&mut self, stage: Stage) -> Result<(), RepositoryError>;
    fn insert_applicant(&mut self, applicant: ApplicantDetail) -> Result<(), RepositoryError>;
    /// Fails at commit with `VersionConflict` unless the stored version equals `expected_version`.
    fn update_applicant(
        &mut self,
        applicant: ApplicantDetail,
        expected_version: u64,
    ) -> Result<(), RepositoryError>;
    /// Removes the applicant together with every value it owns.
    fn remove_applicant(
        &mut self,
        applicant_id: &ApplicantDetailId,
        expected_version: u64,
    ) -> Result<(), RepositoryError>;
    fn upsert_value(&mut self, value: FormFieldValue) -> Result<(), RepositoryError>;
    fn remove_value(
        &mut self,
        field_id: &FormFieldId,
        applicant_id: &ApplicantDetailId,
    ) -> Result<(), RepositoryError>;
    fn insert_approved(&mut self, approved: ApprovedApplicant) -> Result<(), RepositoryError>;

    fn commit(self: Box<Self>) -> Result<(), RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("stale write: expected version {expected}, found {found}")]
    VersionConflict { expected: u64, found: u64 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Capability check consulted before a reviewer decision is recorded.
pub trait CapabilityCheck: Send + Sync {
    fn can_decide(&self, caller: &AuthenticatedCaller, activity_id: &ActivityId) -> bool;
}

/// Outbound e-mail/SMS hook invoked after terminal status changes commit.
pub trait NotificationDispatcher: Send + Sync {
    fn dispatch(&self, notification: ApplicantNotification) -> Result<(), NotificationError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantNotification {
    pub template: String,
    pub applicant_id: ApplicantDetailId,
    pub activity_id: ActivityId,
    pub recipient: String,
    pub details: BTreeMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}
