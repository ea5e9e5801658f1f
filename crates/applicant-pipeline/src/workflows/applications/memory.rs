use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use super::domain::{
    Activity, ActivityId, ApplicantDetail, ApplicantDetailId, ApprovedApplicant, Form, FormField,
    FormFieldId, FormFieldValue, FormId, Stage, StageId,
};
use super::repository::{PipelineRepository, RepositoryError, RepositoryTransaction};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    activities: HashMap<ActivityId, Activity>,
    forms: HashMap<FormId, Form>,
    fields: HashMap<FormFieldId, FormField>,
    stages: HashMap<StageId, Stage>,
    applicants: HashMap<ApplicantDetailId, ApplicantDetail>,
    values: HashMap<(FormFieldId, ApplicantDetailId), FormFieldValue>,
    approved: HashMap<ApplicantDetailId, ApprovedApplicant>,
}

#[derive(Debug)]
enum StagedWrite {
    InsertActivity(Activity),
    PutForm(Form),
    PutField(FormField),
    InsertStage(Stage),
    InsertApplicant(ApplicantDetail),
    UpdateApplicant {
        applicant: ApplicantDetail,
        expected_version: u64,
    },
    RemoveApplicant {
        applicant_id: ApplicantDetailId,
        expected_version: u64,
    },
    UpsertValue(FormFieldValue),
    RemoveValue {
        field_id: FormFieldId,
        applicant_id: ApplicantDetailId,
    },
    InsertApproved(ApprovedApplicant),
}

fn check_version(stored: &ApplicantDetail, expected: u64) -> Result<(), RepositoryError> {
    if stored.version == expected {
        Ok(())
    } else {
        Err(RepositoryError::VersionConflict {
            expected,
            found: stored.version,
        })
    }
}

impl MemoryState {
    fn apply(&mut self, write: StagedWrite) -> Result<(), RepositoryError> {
        match write {
            StagedWrite::InsertActivity(activity) => {
                if self.activities.contains_key(&activity.id) {
                    return Err(RepositoryError::Conflict);
                }
                self.activities.insert(activity.id.clone(), activity);
            }
            StagedWrite::PutForm(form) => {
                if !self.activities.contains_key(&form.activity_id) {
                    return Err(RepositoryError::NotFound);
                }
                let kind_taken = self.forms.values().any(|stored| {
                    stored.id != form.id
                        && stored.activity_id == form.activity_id
                        && stored.kind == form.kind
                });
                if kind_taken {
                    return Err(RepositoryError::Conflict);
                }
                self.forms.insert(form.id.clone(), form);
            }
            StagedWrite::PutField(field) => {
                self.fields.insert(field.id.clone(), field);
            }
            StagedWrite::InsertStage(stage) => {
                let index_taken = self.stages.values().any(|stored| {
                    stored.activity_id == stage.activity_id && stored.index == stage.index
                });
                if index_taken || self.stages.contains_key(&stage.id) {
                    return Err(RepositoryError::Conflict);
                }
                self.stages.insert(stage.id.clone(), stage);
            }
            StagedWrite::InsertApplicant(applicant) => {
                if self.applicants.contains_key(&applicant.id) {
                    return Err(RepositoryError::Conflict);
                }
                self.applicants.insert(applicant.id.clone(), applicant);
            }
            StagedWrite::UpdateApplicant {
                applicant,
                expected_version,
            } => {
                let stored = self
                    .applicants
                    .get_mut(&applicant.id)
                    .ok_or(RepositoryError::NotFound)?;
                check_version(stored, expected_version)?;
                *stored = applicant;
            }
            StagedWrite::RemoveApplicant {
                applicant_id,
                expected_version,
            } => {
                let stored = self
                    .applicants
                    .get(&applicant_id)
                    .ok_or(RepositoryError::NotFound)?;
                check_version(stored, expected_version)?;
                self.applicants.remove(&applicant_id);
                self.values
                    .retain(|(_, owner), _| owner != &applicant_id);
            }
            StagedWrite::UpsertValue(value) => {
                if !self.applicants.contains_key(&value.applicant_detail_id)
                    || !self.fields.contains_key(&value.form_field_id)
                {
                    return Err(RepositoryError::NotFound);
                }
                let key = (
                    value.form_field_id.clone(),
                    value.applicant_detail_id.clone(),
                );
                self.values.insert(key, value);
            }
            StagedWrite::RemoveValue {
                field_id,
                applicant_id,
            } => {
                self.values.remove(&(field_id, applicant_id));
            }
            StagedWrite::InsertApproved(approved) => {
                if self.approved.contains_key(&approved.applicant_detail_id) {
                    return Err(RepositoryError::Conflict);
                }
                self.approved
                    .insert(approved.applicant_detail_id.clone(), approved);
            }
        }
        Ok(())
    }
}

/// Process-local repository used by the demo server and tests.
///
/// Commits apply staged writes to a copy of the state and swap it in only when every
/// write succeeds, so a failed commit leaves nothing behind.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPipelineRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryPipelineRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<MutexGuard<'_, MemoryState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("memory state poisoned".to_string()))
    }
}

impl PipelineRepository for InMemoryPipelineRepository {
    fn begin(&self) -> Result<Box<dyn RepositoryTransaction + '_>, RepositoryError> {
        Ok(Box::new(MemoryTransaction {
            state: self.state.clone(),
            writes: Vec::new(),
        }))
    }

    fn activity(&self, id: &ActivityId) -> Result<Option<Activity>, RepositoryError> {
        Ok(self.read()?.activities.get(id).cloned())
    }

    fn form(&self, id: &FormId) -> Result<Option<Form>, RepositoryError> {
        Ok(self.read()?.forms.get(id).cloned())
    }

    fn forms_for_activity(&self, activity_id: &ActivityId) -> Result<Vec<Form>, RepositoryError> {
        let state = self.read()?;
        let mut forms: Vec<Form> = state
            .forms
            .values()
            .filter(|form| &form.activity_id == activity_id)
            .cloned()
            .collect();
        forms.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(forms)
    }

    fn form_fields(&self, form_id: &FormId) -> Result<Vec<FormField>, RepositoryError> {
        let state = self.read()?;
        let Some(form) = state.forms.get(form_id) else {
            return Ok(Vec::new());
        };
        Ok(form
            .field_ids
            .iter()
            .filter_map(|field_id| state.fields.get(field_id).cloned())
            .collect())
    }

    fn stages(&self, activity_id: &ActivityId) -> Result<Vec<Stage>, RepositoryError> {
        let state = self.read()?;
        let mut stages: Vec<Stage> = state
            .stages
            .values()
            .filter(|stage| &stage.activity_id == activity_id)
            .cloned()
            .collect();
        stages.sort_by_key(|stage| stage.index);
        Ok(stages)
    }

    fn stage(&self, id: &StageId) -> Result<Option<Stage>, RepositoryError> {
        Ok(self.read()?.stages.get(id).cloned())
    }

    fn applicant(&self, id: &ApplicantDetailId) -> Result<Option<ApplicantDetail>, RepositoryError> {
        Ok(self.read()?.applicants.get(id).cloned())
    }

    fn values_for(
        &self,
        applicant_id: &ApplicantDetailId,
    ) -> Result<Vec<FormFieldValue>, RepositoryError> {
        let state = self.read()?;
        let mut values: Vec<FormFieldValue> = state
            .values
            .values()
            .filter(|value| &value.applicant_detail_id == applicant_id)
            .cloned()
            .collect();
        values.sort_by(|left, right| left.form_field_id.cmp(&right.form_field_id));
        Ok(values)
    }

    fn approved_applicant(
        &self,
        applicant_id: &ApplicantDetailId,
    ) -> Result<Option<ApprovedApplicant>, RepositoryError> {
        Ok(self.read()?.approved.get(applicant_id).cloned())
    }
}

struct MemoryTransaction {
    state: Arc<Mutex<MemoryState>>,
    writes: Vec<StagedWrite>,
}

impl MemoryTransaction {
    fn stage(&mut self, write: StagedWrite) -> Result<(), RepositoryError> {
        self.writes.push(write);
        Ok(())
    }
}

impl RepositoryTransaction for MemoryTransaction {
    fn insert_activity(&mut self, activity: Activity) -> Result<(), RepositoryError> {
        self.stage(StagedWrite::InsertActivity(activity))
    }

    fn put_form(&mut self, form: Form) -> Result<(), RepositoryError> {
        self.stage(StagedWrite::PutForm(form))
    }

    fn put_field(&mut self, field: FormField) -> Result<(), RepositoryError> {
        self.stage(StagedWrite::PutField(field))
    }

    fn insert_stage(&mut self, stage: Stage) -> Result<(), RepositoryError> {
        self.stage(StagedWrite::InsertStage(stage))
    }

    fn insert_applicant(&mut self, applicant: ApplicantDetail) -> Result<(), RepositoryError> {
        self.stage(StagedWrite::InsertApplicant(applicant))
    }

    fn update_applicant(
        &mut self,
        applicant: ApplicantDetail,
        expected_version: u64,
    ) -> Result<(), RepositoryError> {
        self.stage(StagedWrite::UpdateApplicant {
            applicant,
            expected_version,
        })
    }

    fn remove_applicant(
        &mut self,
        applicant_id: &ApplicantDetailId,
        expected_version: u64,
    ) -> Result<(), RepositoryError> {
        self.stage(StagedWrite::RemoveApplicant {
            applicant_id: applicant_id.clone(),
            expected_version,
        })
    }

    fn upsert_value(&mut self, value: FormFieldValue) -> Result<(), RepositoryError> {
        self.stage(StagedWrite::UpsertValue(value))
    }

    fn remove_value(
        &mut self,
        field_id: &FormFieldId,
        applicant_id: &ApplicantDetailId,
    ) -> Result<(), RepositoryError> {
        self.stage(StagedWrite::RemoveValue {
            field_id: field_id.clone(),
            applicant_id: applicant_id.clone(),
        })
    }

    fn insert_approved(&mut self, approved: ApprovedApplicant) -> Result<(), RepositoryError> {
        self.stage(StagedWrite::InsertApproved(approved))
    }

    fn commit(mut self: Box<Self>) -> Result<(), RepositoryError> {
        let writes = std::mem::take(&mut self.writes);
        let mut guard = self
            .state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("memory state poisoned".to_string()))?;

        let mut next = guard.clone();
        let staged = writes.len();
        for write in writes {
            next.apply(write)?;
        }
        *guard = next;

        debug!(writes = staged, "memory transaction committed");
        Ok(())
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if !self.writes.is_empty() {
            debug!(writes = self.writes.len(), "memory transaction discarded");
        }
    }
}
