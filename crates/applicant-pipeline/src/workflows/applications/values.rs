use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tracing::{debug, info};

use super::catalog::{FieldCatalog, ValidationContext, ValidationError, ValidationErrorKind};
use super::domain::{
    AnswerPreview, ApplicantDetail, ApplicantDetailId, ApplicantFormStatus, FormField,
    FormFieldValue, FormId, StageId, SubmittedValue,
};
use super::locks::SchemaLocks;
use super::repository::PipelineRepository;
use super::status;
use crate::error::{EntityKind, PipelineError};

/// Binds submitted answers to a form schema and persists them all-or-nothing.
pub struct ApplicantValueStore<R> {
    repository: Arc<R>,
    locks: Arc<SchemaLocks>,
    catalog: Arc<FieldCatalog>,
}

impl<R> ApplicantValueStore<R>
where
    R: PipelineRepository + 'static,
{
    pub fn new(repository: Arc<R>, locks: Arc<SchemaLocks>, catalog: Arc<FieldCatalog>) -> Self {
        Self {
            repository,
            locks,
            catalog,
        }
    }

    pub fn submit_values(
        &self,
        applicant_id: &ApplicantDetailId,
        form_id: &FormId,
        values: &[SubmittedValue],
    ) -> Result<ApplicantFormStatus, PipelineError> {
        self.submit_values_with(applicant_id, form_id, values, &ValidationContext::default())
    }

    /// Validate every answer, then replace the applicant's stored answer set in one commit.
    pub fn submit_values_with(
        &self,
        applicant_id: &ApplicantDetailId,
        form_id: &FormId,
        values: &[SubmittedValue],
        context: &ValidationContext<'_>,
    ) -> Result<ApplicantFormStatus, PipelineError> {
        let detail = self.load(applicant_id)?;
        if &detail.form_id != form_id {
            return Err(PipelineError::FormMismatch {
                applicant_id: detail.id,
                expected: detail.form_id,
                found: form_id.clone(),
            });
        }

        self.locks
            .with_read(form_id, || self.apply_submission(detail, values, context))
    }

    fn apply_submission(
        &self,
        detail: ApplicantDetail,
        values: &[SubmittedValue],
        context: &ValidationContext<'_>,
    ) -> Result<ApplicantFormStatus, PipelineError> {
        let fields = self.ordered_fields(&detail.form_id)?;
        let answers = collect_answers(&fields, values)?;

        let first_stage = self.first_stage(&detail)?;
        let updated = status::submitted(&detail, first_stage.as_ref())?;

        if let Err(error) = self.validate(&fields, &answers, context) {
            debug!(
                applicant_id = %detail.id,
                form_id = %detail.form_id,
                field = %error.field_key,
                reason = error.kind.label(),
                "submission rejected"
            );
            return Err(error.into());
        }

        let existing = self.repository.values_for(&detail.id)?;
        let mut transaction = self.repository.begin()?;
        for stale in &existing {
            let still_answered = fields
                .iter()
                .any(|field| field.id == stale.form_field_id && answers.contains_key(&field.key));
            if !still_answered {
                transaction.remove_value(&stale.form_field_id, &detail.id)?;
            }
        }
        for field in &fields {
            if let Some(value) = answers.get(&field.key) {
                transaction.upsert_value(FormFieldValue {
                    form_field_id: field.id.clone(),
                    applicant_detail_id: detail.id.clone(),
                    value: (*value).to_string(),
                })?;
            }
        }
        transaction.update_applicant(updated.clone(), detail.version)?;
        transaction
            .commit()
            .map_err(|error| PipelineError::from_applicant_write(error, &detail.id))?;

        info!(
            applicant_id = %updated.id,
            form_id = %updated.form_id,
            status = updated.status.code(),
            answered = answers.len(),
            "submission accepted"
        );

        Ok(ApplicantFormStatus {
            applicant_id: updated.id,
            form_id: updated.form_id,
            status: updated.status,
            status_label: updated.status.label(),
            current_stage_id: updated.current_stage_id,
            answered_fields: answers.len(),
        })
    }

    /// Every field of the applicant's form in index order, with the stored answer if any.
    pub fn preview_answers(
        &self,
        applicant_id: &ApplicantDetailId,
    ) -> Result<Vec<AnswerPreview>, PipelineError> {
        let detail = self.load(applicant_id)?;
        let fields = self.ordered_fields(&detail.form_id)?;
        let mut stored: HashMap<_, _> = self
            .repository
            .values_for(&detail.id)?
            .into_iter()
            .map(|value| (value.form_field_id, value.value))
            .collect();

        Ok(fields
            .into_iter()
            .map(|field| AnswerPreview {
                value: stored.remove(&field.id),
                field_id: field.id,
                key: field.key,
                label: field.label,
                field_type: field.field_type,
                index: field.index,
                required: field.required,
            })
            .collect())
    }

    fn load(&self, applicant_id: &ApplicantDetailId) -> Result<ApplicantDetail, PipelineError> {
        self.repository
            .applicant(applicant_id)?
            .ok_or_else(|| PipelineError::not_found(EntityKind::Applicant, applicant_id))
    }

    fn ordered_fields(&self, form_id: &FormId) -> Result<Vec<FormField>, PipelineError> {
        self.repository
            .form(form_id)?
            .ok_or_else(|| PipelineError::not_found(EntityKind::Form, form_id))?;
        let mut fields = self.repository.form_fields(form_id)?;
        fields.sort_by_key(|field| field.index);
        Ok(fields)
    }

    fn first_stage(&self, detail: &ApplicantDetail) -> Result<Option<StageId>, PipelineError> {
        let activity = self
            .repository
            .activity(&detail.activity_id)?
            .ok_or_else(|| PipelineError::not_found(EntityKind::Activity, &detail.activity_id))?;
        if !activity.runs_stages() {
            return Ok(None);
        }

        let stages = self.repository.stages(&activity.id)?;
        Ok(stages
            .into_iter()
            .min_by_key(|stage| stage.index)
            .map(|stage| stage.id))
    }

    fn validate(
        &self,
        fields: &[FormField],
        answers: &HashMap<String, &str>,
        context: &ValidationContext<'_>,
    ) -> Result<(), ValidationError> {
        for field in fields {
            match answers.get(&field.key) {
                Some(value) => self.catalog.validate(field, value, context)?,
                None if field.required => {
                    return Err(ValidationError::new(
                        ValidationErrorKind::EnterValue,
                        &field.key,
                    ))
                }
                None => {}
            }
        }
        Ok(())
    }
}

/// Non-blank answers keyed by field key. Blank answers count as not provided.
fn collect_answers<'a>(
    fields: &[FormField],
    values: &'a [SubmittedValue],
) -> Result<HashMap<String, &'a str>, PipelineError> {
    let known: HashSet<&str> = fields.iter().map(|field| field.key.as_str()).collect();
    let mut seen = HashSet::new();
    let mut answers = HashMap::new();

    for submitted in values {
        let key = submitted.field_key.trim();
        if !known.contains(key) {
            return Err(PipelineError::not_found(EntityKind::FormField, key));
        }
        if !seen.insert(key) {
            return Err(ValidationError::new(ValidationErrorKind::DuplicateAnswer, key).into());
        }

        let value = submitted.value.trim();
        if !value.is_empty() {
            answers.insert(key.to_string(), value);
        }
    }

    Ok(answers)
}
