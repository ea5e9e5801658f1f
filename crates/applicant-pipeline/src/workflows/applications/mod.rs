//! Form schemas, applicant answers, review stages, and decisions for recruitment activities.

pub mod bulk;
pub mod catalog;
pub mod domain;
pub(crate) mod locks;
pub mod memory;
pub mod repository;
pub mod schema;
pub mod service;
pub mod stages;
pub mod status;
pub mod values;

#[cfg(test)]
mod tests;

pub use bulk::{BulkCancellation, BulkFailure, BulkOperationCoordinator, BulkOutcome};
pub use catalog::{
    CatalogError, FieldCatalog, FieldLimits, FileReference, ValidationContext, ValidationError,
    ValidationErrorKind,
};
pub use domain::{
    Activity, ActivityDraft, ActivityId, ActivityKind, AnswerPreview, ApplicantContact,
    ApplicantDetail, ApplicantDetailId, ApplicantFormStatus, ApplicantStatus, ApprovedApplicant,
    AuthenticatedCaller, Decision, FieldDraft, FieldOption, FieldType, FileConstraint, Form,
    FormField, FormFieldId, FormFieldValue, FormId, FormKind, NewApplicant, ProgrammeId,
    ProgrammeLink, ProgrammeStatus, Stage, StageId, SubmittedValue,
};
pub use memory::InMemoryPipelineRepository;
pub use repository::{
    ApplicantNotification, CapabilityCheck, NotificationDispatcher, NotificationError,
    PipelineRepository, RepositoryError, RepositoryTransaction,
};
pub use schema::{should_expose_file_constraint, FieldView, FormView, SchemaError};
pub use service::{ActivityRegistration, ApplicationPipeline};
pub use stages::StagePipeline;
pub use status::ApplicantStatusMachine;
pub use values::ApplicantValueStore;
