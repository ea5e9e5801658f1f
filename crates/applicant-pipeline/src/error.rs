use serde::{Deserialize, Serialize};

use crate::workflows::applications::catalog::ValidationError;
use crate::workflows::applications::domain::{
    ActivityId, ApplicantDetailId, ApplicantStatus, FormId, StageId,
};
use crate::workflows::applications::repository::RepositoryError;
use crate::workflows::applications::schema::SchemaError;

/// Record families that can be looked up by id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Activity,
    Form,
    FormField,
    Stage,
    Applicant,
}

impl EntityKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Activity => "activity",
            Self::Form => "form",
            Self::FormField => "form field",
            Self::Stage => "stage",
            Self::Applicant => "applicant",
        }
    }
}

/// Errors surfaced by every pipeline entry point.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("applicant {applicant_id} cannot move from {current} to {requested}")]
    InvalidApplicantStatus {
        applicant_id: ApplicantDetailId,
        current: ApplicantStatus,
        requested: ApplicantStatus,
    },
    #[error(
        "stage {} is not part of the review pipeline of activity {activity_id}",
        .stage_id.as_ref().map_or("(none)", StageId::as_str)
    )]
    InvalidStageTransition {
        applicant_id: ApplicantDetailId,
        activity_id: ActivityId,
        stage_id: Option<StageId>,
    },
    #[error("applicant {applicant_id} is already at the final stage {stage_id}")]
    StageNotFound {
        applicant_id: ApplicantDetailId,
        stage_id: StageId,
    },
    #[error("applicant {0} was modified concurrently; reload and retry")]
    ConcurrentModification(ApplicantDetailId),
    #[error("{} {id} not found", .entity.label())]
    NotFound { entity: EntityKind, id: String },
    #[error("caller {0} may not record decisions for this activity")]
    Forbidden(String),
    #[error("applicant {applicant_id} answers form {expected}, not {found}")]
    FormMismatch {
        applicant_id: ApplicantDetailId,
        expected: FormId,
        found: FormId,
    },
    #[error("bulk operation requires at least one applicant")]
    EmptyBatch,
    #[error("bulk operation accepts at most {max} applicants (received {received})")]
    BatchTooLarge { max: usize, received: usize },
    #[error("unknown applicant status '{0}'")]
    UnknownStatus(String),
    #[error(transparent)]
    Repository(RepositoryError),
}

impl PipelineError {
    pub(crate) fn not_found(entity: EntityKind, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Translate a failed applicant write; a stale version means another writer won.
    pub(crate) fn from_applicant_write(
        error: RepositoryError,
        applicant_id: &ApplicantDetailId,
    ) -> Self {
        match error {
            RepositoryError::VersionConflict { .. } => {
                Self::ConcurrentModification(applicant_id.clone())
            }
            RepositoryError::NotFound => Self::not_found(EntityKind::Applicant, applicant_id),
            other => Self::Repository(other),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Schema(_) => ErrorKind::Schema,
            Self::Validation(_) => ErrorKind::Validation,
            Self::InvalidApplicantStatus { .. } => ErrorKind::InvalidApplicantStatus,
            Self::InvalidStageTransition { .. } => ErrorKind::InvalidStageTransition,
            Self::StageNotFound { .. } => ErrorKind::StageNotFound,
            Self::ConcurrentModification(_) => ErrorKind::ConcurrentModification,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden(_) => ErrorKind::Forbidden,
            Self::FormMismatch { .. } => ErrorKind::FormMismatch,
            Self::EmptyBatch => ErrorKind::EmptyBatch,
            Self::BatchTooLarge { .. } => ErrorKind::BatchTooLarge,
            Self::UnknownStatus(_) => ErrorKind::UnknownStatus,
            Self::Repository(_) => ErrorKind::Repository,
        }
    }
}

impl From<RepositoryError> for PipelineError {
    fn from(value: RepositoryError) -> Self {
        Self::Repository(value)
    }
}

/// Stable discriminant for reporting, e.g. in bulk failure lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Schema,
    Validation,
    InvalidApplicantStatus,
    InvalidStageTransition,
    StageNotFound,
    ConcurrentModification,
    NotFound,
    Forbidden,
    FormMismatch,
    EmptyBatch,
    BatchTooLarge,
    UnknownStatus,
    Repository,
}

impl ErrorKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Schema => "schema_error",
            Self::Validation => "validation_error",
            Self::InvalidApplicantStatus => "invalid_applicant_status",
            Self::InvalidStageTransition => "invalid_stage_transition",
            Self::StageNotFound => "stage_not_found",
            Self::ConcurrentModification => "concurrent_modification",
            Self::NotFound => "not_found",
            Self::Forbidden => "forbidden",
            Self::FormMismatch => "form_mismatch",
            Self::EmptyBatch => "empty_batch",
            Self::BatchTooLarge => "batch_too_large",
            Self::UnknownStatus => "unknown_status",
            Self::Repository => "repository_error",
        }
    }
}
