use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use super::bulk::{BulkCancellation, BulkOperationCoordinator, BulkOutcome};
use super::catalog::{CatalogError, FieldCatalog, FieldLimits, ValidationContext};
use super::domain::{
    Activity, ActivityDraft, ActivityId, ActivityKind, AnswerPreview, ApplicantDetail,
    ApplicantDetailId, ApplicantFormStatus, ApprovedApplicant, AuthenticatedCaller, Decision,
    FieldDraft, Form, FormId, FormKind, NewApplicant, Stage, StageId, SubmittedValue,
};
use super::locks::SchemaLocks;
use super::repository::{CapabilityCheck, NotificationDispatcher, PipelineRepository};
use super::schema::{default_form_fields, prepare_form, FormSchemaEngine, FormView, SchemaError};
use super::stages::StagePipeline;
use super::status::ApplicantStatusMachine;
use super::values::ApplicantValueStore;
use crate::config::PipelineConfig;
use crate::error::{EntityKind, PipelineError};

/// A freshly registered activity together with its seeded default form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActivityRegistration {
    pub activity: Activity,
    pub default_form: Form,
}

/// Facade composing the schema engine, value store, stage pipeline, status machine, and
/// bulk coordinator over one repository.
pub struct ApplicationPipeline<R, N, C> {
    repository: Arc<R>,
    schema: FormSchemaEngine<R>,
    values: ApplicantValueStore<R>,
    stages: Arc<StagePipeline<R>>,
    status: Arc<ApplicantStatusMachine<R, N, C>>,
    bulk: BulkOperationCoordinator<R, N, C>,
    locks: Arc<SchemaLocks>,
}

impl<R, N, C> ApplicationPipeline<R, N, C>
where
    R: PipelineRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    pub fn new(
        repository: Arc<R>,
        notifier: Arc<N>,
        access: Arc<C>,
        config: PipelineConfig,
    ) -> Result<Self, CatalogError> {
        let catalog = Arc::new(FieldCatalog::new(FieldLimits::from(&config))?);
        let locks = Arc::new(SchemaLocks::default());

        let stages = Arc::new(StagePipeline::new(repository.clone(), locks.clone()));
        let status = Arc::new(ApplicantStatusMachine::new(
            repository.clone(),
            notifier,
            access,
        ));
        let bulk = BulkOperationCoordinator::new(
            status.clone(),
            stages.clone(),
            config.max_bulk_items,
        );

        Ok(Self {
            schema: FormSchemaEngine::new(repository.clone(), locks.clone()),
            values: ApplicantValueStore::new(repository.clone(), locks.clone(), catalog),
            repository,
            stages,
            status,
            bulk,
            locks,
        })
    }

    /// Create an activity and, in the same commit, its default form.
    pub fn register_activity(
        &self,
        draft: ActivityDraft,
    ) -> Result<ActivityRegistration, PipelineError> {
        if draft.is_stage && draft.kind != ActivityKind::CallForApplication {
            return Err(SchemaError::StagingNotSupported { kind: draft.kind }.into());
        }
        if let Some(programme) = &draft.programme {
            if programme.ends_on < programme.starts_on {
                return Err(SchemaError::InvalidProgrammeWindow {
                    starts_on: programme.starts_on,
                    ends_on: programme.ends_on,
                }
                .into());
            }
        }

        let activity = Activity {
            id: ActivityId::generate(),
            kind: draft.kind,
            title: draft.title.trim().to_string(),
            is_stage: draft.is_stage,
            programme: draft.programme,
        };
        let (default_form, fields) =
            prepare_form(&activity.id, FormKind::Default, default_form_fields())?;

        self.locks.with_activity(&activity.id, || {
            let mut transaction = self.repository.begin()?;
            transaction.insert_activity(activity.clone())?;
            transaction.put_form(default_form.clone())?;
            for field in fields {
                transaction.put_field(field)?;
            }
            transaction.commit()?;
            Ok::<_, PipelineError>(())
        })?;

        info!(
            activity_id = %activity.id,
            kind = activity.kind.label(),
            staged = activity.is_stage,
            form_id = %default_form.id,
            "activity registered"
        );
        Ok(ActivityRegistration {
            activity,
            default_form,
        })
    }

    pub fn activity(&self, activity_id: &ActivityId) -> Result<Activity, PipelineError> {
        self.repository
            .activity(activity_id)?
            .ok_or_else(|| PipelineError::not_found(EntityKind::Activity, activity_id))
    }

    pub fn define_stages(
        &self,
        activity_id: &ActivityId,
        names: &[String],
    ) -> Result<Vec<Stage>, PipelineError> {
        self.stages.define_stages(activity_id, names)
    }

    pub fn stages(&self, activity_id: &ActivityId) -> Result<Vec<Stage>, PipelineError> {
        self.stages.stages(activity_id)
    }

    pub fn create_form(
        &self,
        activity_id: &ActivityId,
        kind: FormKind,
        fields: Vec<FieldDraft>,
    ) -> Result<Form, PipelineError> {
        self.schema.create_form(activity_id, kind, fields)
    }

    pub fn add_field_values(
        &self,
        form_id: &FormId,
        fields: Vec<FieldDraft>,
    ) -> Result<Form, PipelineError> {
        self.schema.add_field_values(form_id, fields)
    }

    pub fn get_form_by_type(
        &self,
        form_id: &FormId,
        kind: FormKind,
    ) -> Result<FormView, PipelineError> {
        self.schema.get_form_by_type(form_id, kind)
    }

    pub fn forms_for_activity(&self, activity_id: &ActivityId) -> Result<Vec<Form>, PipelineError> {
        self.schema.forms_for_activity(activity_id)
    }

    /// Open a pending record for `applicant.form_id`, which must belong to the activity.
    pub fn register_applicant(
        &self,
        applicant: NewApplicant,
    ) -> Result<ApplicantDetail, PipelineError> {
        self.activity(&applicant.activity_id)?;
        self.repository
            .form(&applicant.form_id)?
            .filter(|form| form.activity_id == applicant.activity_id)
            .ok_or_else(|| PipelineError::not_found(EntityKind::Form, &applicant.form_id))?;

        let detail = ApplicantDetail::pending(applicant);
        let mut transaction = self.repository.begin()?;
        transaction.insert_applicant(detail.clone())?;
        transaction.commit()?;

        info!(
            applicant_id = %detail.id,
            activity_id = %detail.activity_id,
            form_id = %detail.form_id,
            "applicant registered"
        );
        Ok(detail)
    }

    pub fn applicant(
        &self,
        applicant_id: &ApplicantDetailId,
    ) -> Result<ApplicantDetail, PipelineError> {
        self.repository
            .applicant(applicant_id)?
            .ok_or_else(|| PipelineError::not_found(EntityKind::Applicant, applicant_id))
    }

    /// Delete the applicant and its answers together. An approval snapshot is kept.
    pub fn remove_applicant(&self, applicant_id: &ApplicantDetailId) -> Result<(), PipelineError> {
        let detail = self.applicant(applicant_id)?;

        let mut transaction = self.repository.begin()?;
        transaction.remove_applicant(&detail.id, detail.version)?;
        transaction
            .commit()
            .map_err(|error| PipelineError::from_applicant_write(error, &detail.id))?;

        info!(applicant_id = %detail.id, "applicant removed");
        Ok(())
    }

    pub fn approved_applicant(
        &self,
        applicant_id: &ApplicantDetailId,
    ) -> Result<Option<ApprovedApplicant>, PipelineError> {
        Ok(self.repository.approved_applicant(applicant_id)?)
    }

    pub fn submit_values(
        &self,
        applicant_id: &ApplicantDetailId,
        form_id: &FormId,
        values: &[SubmittedValue],
    ) -> Result<ApplicantFormStatus, PipelineError> {
        self.values.submit_values(applicant_id, form_id, values)
    }

    pub fn submit_values_with(
        &self,
        applicant_id: &ApplicantDetailId,
        form_id: &FormId,
        values: &[SubmittedValue],
        context: &ValidationContext<'_>,
    ) -> Result<ApplicantFormStatus, PipelineError> {
        self.values
            .submit_values_with(applicant_id, form_id, values, context)
    }

    pub fn preview_answers(
        &self,
        applicant_id: &ApplicantDetailId,
    ) -> Result<Vec<AnswerPreview>, PipelineError> {
        self.values.preview_answers(applicant_id)
    }

    pub fn advance(&self, applicant_id: &ApplicantDetailId) -> Result<StageId, PipelineError> {
        self.stages.advance(applicant_id)
    }

    pub fn assign_stage(
        &self,
        applicant_id: &ApplicantDetailId,
        stage_id: &StageId,
    ) -> Result<ApplicantDetail, PipelineError> {
        self.stages.assign_stage(applicant_id, stage_id)
    }

    pub fn decide(
        &self,
        applicant_id: &ApplicantDetailId,
        decision: Decision,
        caller: &AuthenticatedCaller,
    ) -> Result<ApplicantDetail, PipelineError> {
        self.status.decide(applicant_id, decision, caller)
    }

    pub fn mark_failed(
        &self,
        applicant_id: &ApplicantDetailId,
    ) -> Result<ApplicantDetail, PipelineError> {
        self.status.mark_failed(applicant_id)
    }

    pub fn graduate(
        &self,
        applicant_id: &ApplicantDetailId,
    ) -> Result<ApplicantDetail, PipelineError> {
        self.status.graduate(applicant_id)
    }

    pub fn bulk_decide(
        &self,
        applicant_ids: &[ApplicantDetailId],
        status: &str,
        caller: &AuthenticatedCaller,
    ) -> Result<BulkOutcome, PipelineError> {
        self.bulk_decide_with_cancellation(
            applicant_ids,
            status,
            caller,
            &BulkCancellation::default(),
        )
    }

    pub fn bulk_decide_with_cancellation(
        &self,
        applicant_ids: &[ApplicantDetailId],
        status: &str,
        caller: &AuthenticatedCaller,
        cancellation: &BulkCancellation,
    ) -> Result<BulkOutcome, PipelineError> {
        self.bulk
            .bulk_decide(applicant_ids, status, caller, cancellation)
    }

    pub fn bulk_assign_stage(
        &self,
        applicant_ids: &[ApplicantDetailId],
        stage_id: &StageId,
    ) -> Result<BulkOutcome, PipelineError> {
        self.bulk_assign_stage_with_cancellation(
            applicant_ids,
            stage_id,
            &BulkCancellation::default(),
        )
    }

    pub fn bulk_assign_stage_with_cancellation(
        &self,
        applicant_ids: &[ApplicantDetailId],
        stage_id: &StageId,
        cancellation: &BulkCancellation,
    ) -> Result<BulkOutcome, PipelineError> {
        self.bulk
            .bulk_assign_stage(applicant_ids, stage_id, cancellation)
    }
}
