use std::collections::HashSet;
use std::sync::Arc;

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use super::domain::{
    ActivityId, ActivityKind, FieldDraft, FieldOption, FieldType, FileConstraint, Form,
    FormField, FormFieldId, FormId, FormKind,
};
use super::locks::SchemaLocks;
use super::repository::PipelineRepository;
use crate::error::{EntityKind, PipelineError};

const MIN_RATING_LEVELS: u8 = 2;
const MAX_RATING_LEVELS: u8 = 10;

/// Malformed schema or pipeline definitions, rejected before anything is persisted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchemaError {
    #[error("field at index {index} has an empty key")]
    EmptyFieldKey { index: u32 },
    #[error("field index {index} is used more than once")]
    DuplicateFieldIndex { index: u32 },
    #[error("field key '{key}' is used more than once")]
    DuplicateFieldKey { key: String },
    #[error("field '{field_key}' has an option with an empty key")]
    EmptyOptionKey { field_key: String },
    #[error("field '{field_key}' repeats option key '{option_key}'")]
    DuplicateOptionKey {
        field_key: String,
        option_key: String,
    },
    #[error("{} field '{field_key}' needs at least one option", .field_type.label())]
    MissingOptions {
        field_key: String,
        field_type: FieldType,
    },
    #[error("{} field '{field_key}' cannot carry options", .field_type.label())]
    UnexpectedOptions {
        field_key: String,
        field_type: FieldType,
    },
    #[error("file upload field '{field_key}' needs a file constraint")]
    MissingFileConstraint { field_key: String },
    #[error("file upload field '{field_key}' allows zero files or zero bytes")]
    ZeroFileLimit { field_key: String },
    #[error("{} field '{field_key}' cannot carry file constraints", .field_type.label())]
    UnexpectedFileConstraint {
        field_key: String,
        field_type: FieldType,
    },
    #[error("{} field '{field_key}' cannot declare rating levels", .field_type.label())]
    UnexpectedRatingLevels {
        field_key: String,
        field_type: FieldType,
    },
    #[error("rating field '{field_key}' declares {levels} levels (allowed 2..=10)")]
    InvalidRatingLevels { field_key: String, levels: u8 },
    #[error("activity {activity_id} already has a {} form", .kind.label())]
    FormAlreadyExists {
        activity_id: ActivityId,
        kind: FormKind,
    },
    #[error("{} activities cannot run a staged review", .kind.label())]
    StagingNotSupported { kind: ActivityKind },
    #[error("programme window ends on {ends_on}, before it starts on {starts_on}")]
    InvalidProgrammeWindow {
        starts_on: NaiveDate,
        ends_on: NaiveDate,
    },
    #[error("activity {activity_id} does not run a staged review")]
    NotStaged { activity_id: ActivityId },
    #[error("activity {activity_id} already defines its stages")]
    StagesAlreadyDefined { activity_id: ActivityId },
    #[error("a stage pipeline needs at least one stage")]
    NoStages,
    #[error("stage names must be non-empty and unique (offending name '{name}')")]
    InvalidStageName { name: String },
}

/// Field as rendered for a given form kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldView {
    pub id: FormFieldId,
    pub key: String,
    pub label: String,
    pub field_type: FieldType,
    pub type_label: &'static str,
    pub index: u32,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating_levels: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileConstraint>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<FieldOption>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FormView {
    pub id: FormId,
    pub activity_id: ActivityId,
    pub kind: FormKind,
    pub fields: Vec<FieldView>,
}

/// A field exposes its file sub-object only when some file attribute is actually set.
/// An attribute-less constraint renders exactly like a field with no file capability.
pub fn should_expose_file_constraint(field: &FormField) -> bool {
    field
        .file
        .as_ref()
        .map_or(false, FileConstraint::has_attributes)
}

/// Standard applicant fields every activity's default form starts with.
pub fn default_form_fields() -> Vec<FieldDraft> {
    vec![
        FieldDraft::new("first_name", "First name", FieldType::ShortAnswer, 0).required(),
        FieldDraft::new("last_name", "Last name", FieldType::ShortAnswer, 1).required(),
        FieldDraft::new("email", "Email address", FieldType::Email, 2).required(),
        FieldDraft::new("phone_number", "Phone number", FieldType::PhoneNumber, 3),
        FieldDraft::new("date_of_birth", "Date of birth", FieldType::Date, 4),
        FieldDraft::new("gender", "Gender", FieldType::Select, 5).with_options(&[
            ("female", "Female"),
            ("male", "Male"),
            ("prefer_not_to_say", "Prefer not to say"),
        ]),
    ]
}

/// Validate `drafts` as an addition to `existing` fields of the same form.
pub fn validate_drafts(drafts: &[FieldDraft], existing: &[FormField]) -> Result<(), SchemaError> {
    let mut indices: HashSet<u32> = existing.iter().map(|field| field.index).collect();
    let mut keys: HashSet<String> = existing.iter().map(|field| field.key.clone()).collect();

    for draft in drafts {
        let key = draft.key.trim();
        if key.is_empty() {
            return Err(SchemaError::EmptyFieldKey { index: draft.index });
        }
        if !indices.insert(draft.index) {
            return Err(SchemaError::DuplicateFieldIndex { index: draft.index });
        }
        if !keys.insert(key.to_string()) {
            return Err(SchemaError::DuplicateFieldKey {
                key: key.to_string(),
            });
        }
        validate_options(key, draft)?;
        validate_file_constraint(key, draft)?;
        validate_rating_levels(key, draft)?;
    }

    Ok(())
}

fn validate_options(key: &str, draft: &FieldDraft) -> Result<(), SchemaError> {
    let field_type = draft.field_type;
    match (field_type.requires_options(), draft.options.is_empty()) {
        (true, true) => {
            return Err(SchemaError::MissingOptions {
                field_key: key.to_string(),
                field_type,
            })
        }
        (false, false) => {
            return Err(SchemaError::UnexpectedOptions {
                field_key: key.to_string(),
                field_type,
            })
        }
        _ => {}
    }

    let mut option_keys = HashSet::new();
    for option in &draft.options {
        let option_key = option.key.trim();
        if option_key.is_empty() {
            return Err(SchemaError::EmptyOptionKey {
                field_key: key.to_string(),
            });
        }
        if !option_keys.insert(option_key) {
            return Err(SchemaError::DuplicateOptionKey {
                field_key: key.to_string(),
                option_key: option_key.to_string(),
            });
        }
    }

    Ok(())
}

fn validate_file_constraint(key: &str, draft: &FieldDraft) -> Result<(), SchemaError> {
    match (draft.field_type, draft.file.is_some()) {
        (FieldType::FileUpload, false) => Err(SchemaError::MissingFileConstraint {
            field_key: key.to_string(),
        }),
        (field_type, true) if field_type != FieldType::FileUpload => {
            Err(SchemaError::UnexpectedFileConstraint {
                field_key: key.to_string(),
                field_type,
            })
        }
        _ => {
            let zero_limit = draft.file.as_ref().is_some_and(|file| {
                file.max_count == Some(0) || file.max_size_bytes == Some(0)
            });
            if zero_limit {
                return Err(SchemaError::ZeroFileLimit {
                    field_key: key.to_string(),
                });
            }
            Ok(())
        }
    }
}

fn validate_rating_levels(key: &str, draft: &FieldDraft) -> Result<(), SchemaError> {
    let Some(levels) = draft.rating_levels else {
        return Ok(());
    };
    if draft.field_type != FieldType::Rating {
        return Err(SchemaError::UnexpectedRatingLevels {
            field_key: key.to_string(),
            field_type: draft.field_type,
        });
    }
    if !(MIN_RATING_LEVELS..=MAX_RATING_LEVELS).contains(&levels) {
        return Err(SchemaError::InvalidRatingLevels {
            field_key: key.to_string(),
            levels,
        });
    }
    Ok(())
}

/// Build a form and its fields without touching storage.
pub(crate) fn prepare_form(
    activity_id: &ActivityId,
    kind: FormKind,
    drafts: Vec<FieldDraft>,
) -> Result<(Form, Vec<FormField>), SchemaError> {
    validate_drafts(&drafts, &[])?;

    let form_id = FormId::generate();
    let fields: Vec<FormField> = drafts
        .into_iter()
        .map(|draft| FormField::from_draft(&form_id, draft))
        .collect();

    let form = Form {
        id: form_id,
        activity_id: activity_id.clone(),
        kind,
        field_ids: ordered_ids(&fields),
    };

    Ok((form, fields))
}

fn ordered_ids(fields: &[FormField]) -> Vec<FormFieldId> {
    let mut ordered: Vec<&FormField> = fields.iter().collect();
    ordered.sort_by_key(|field| field.index);
    ordered.into_iter().map(|field| field.id.clone()).collect()
}

/// Creates and evolves per-activity form schemas.
pub struct FormSchemaEngine<R> {
    repository: Arc<R>,
    locks: Arc<SchemaLocks>,
}

impl<R> FormSchemaEngine<R>
where
    R: PipelineRepository + 'static,
{
    pub fn new(repository: Arc<R>, locks: Arc<SchemaLocks>) -> Self {
        Self { repository, locks }
    }

    /// All-or-nothing: a schema violation or failed commit leaves no form behind.
    pub fn create_form(
        &self,
        activity_id: &ActivityId,
        kind: FormKind,
        fields: Vec<FieldDraft>,
    ) -> Result<Form, PipelineError> {
        self.repository
            .activity(activity_id)?
            .ok_or_else(|| PipelineError::not_found(EntityKind::Activity, activity_id))?;

        let (form, fields) = prepare_form(activity_id, kind, fields)?;

        self.locks.with_activity(activity_id, || -> Result<(), PipelineError> {
            let existing = self.repository.forms_for_activity(activity_id)?;
            if existing.iter().any(|form| form.kind == kind) {
                return Err(SchemaError::FormAlreadyExists {
                    activity_id: activity_id.clone(),
                    kind,
                }
                .into());
            }

            let mut transaction = self.repository.begin()?;
            transaction.put_form(form.clone())?;
            for field in fields {
                transaction.put_field(field)?;
            }
            transaction.commit()?;
            Ok(())
        })?;

        info!(
            form_id = %form.id,
            activity_id = %activity_id,
            kind = kind.label(),
            fields = form.field_ids.len(),
            "form created"
        );
        Ok(form)
    }

    /// Append fields; existing fields keep their ids and indices so stored answers stay valid.
    pub fn add_field_values(
        &self,
        form_id: &FormId,
        fields: Vec<FieldDraft>,
    ) -> Result<Form, PipelineError> {
        self.locks.with_write(form_id, || -> Result<Form, PipelineError> {
            let mut form = self
                .repository
                .form(form_id)?
                .ok_or_else(|| PipelineError::not_found(EntityKind::Form, form_id))?;
            if fields.is_empty() {
                return Ok(form);
            }

            let existing = self.repository.form_fields(form_id)?;
            validate_drafts(&fields, &existing)?;

            let added: Vec<FormField> = fields
                .into_iter()
                .map(|draft| FormField::from_draft(form_id, draft))
                .collect();
            form.field_ids.extend(ordered_ids(&added));

            let mut transaction = self.repository.begin()?;
            for field in &added {
                transaction.put_field(field.clone())?;
            }
            transaction.put_form(form.clone())?;
            transaction.commit()?;

            info!(form_id = %form_id, added = added.len(), "form fields appended");
            Ok(form)
        })
    }

    /// Resolve a form for rendering as `kind`; asking for the wrong kind is a miss.
    pub fn get_form_by_type(
        &self,
        form_id: &FormId,
        kind: FormKind,
    ) -> Result<FormView, PipelineError> {
        let form = self
            .repository
            .form(form_id)?
            .filter(|form| form.kind == kind)
            .ok_or_else(|| PipelineError::not_found(EntityKind::Form, form_id))?;

        let mut fields = self.repository.form_fields(form_id)?;
        fields.sort_by_key(|field| field.index);

        let fields = fields
            .into_iter()
            .map(|field| {
                let file = if should_expose_file_constraint(&field) {
                    field.file.clone()
                } else {
                    None
                };
                FieldView {
                    type_label: field.field_type.label(),
                    id: field.id,
                    key: field.key,
                    label: field.label,
                    field_type: field.field_type,
                    index: field.index,
                    required: field.required,
                    rating_levels: field.rating_levels,
                    file,
                    options: field.options,
                }
            })
            .collect();

        Ok(FormView {
            id: form.id,
            activity_id: form.activity_id,
            kind: form.kind,
            fields,
        })
    }

    pub fn forms_for_activity(&self, activity_id: &ActivityId) -> Result<Vec<Form>, PipelineError> {
        Ok(self.repository.forms_for_activity(activity_id)?)
    }
}
