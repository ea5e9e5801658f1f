use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

static ID_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_id(prefix: &str) -> String {
    let id = ID_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{id:06}")
}

macro_rules! record_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn generate() -> Self {
                Self(next_id($prefix))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

record_id!(
    /// Identifier of a recruitment or engagement activity.
    ActivityId,
    "act"
);
record_id!(FormId, "form");
record_id!(FormFieldId, "field");
record_id!(StageId, "stage");
record_id!(
    /// Identifier of an applicant's in-flight record against one activity.
    ApplicantDetailId,
    "applicant"
);
record_id!(ApprovedApplicantId, "approved");
record_id!(ProgrammeId, "prog");

/// Recruitment or engagement mechanism an activity represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    CallForApplication,
    Assessment,
    Survey,
    Training,
    Event,
    Form,
}

impl ActivityKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::CallForApplication => "Call For Application",
            Self::Assessment => "Assessment",
            Self::Survey => "Survey",
            Self::Training => "Training",
            Self::Event => "Event",
            Self::Form => "Form",
        }
    }
}

/// Where a programme sits relative to a reference date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgrammeStatus {
    NotStarted,
    Ongoing,
    Completed,
}

impl ProgrammeStatus {
    pub const fn label(self) -> &'static str {
        match self {
            Self::NotStarted => "Not Started",
            Self::Ongoing => "Ongoing",
            Self::Completed => "Completed",
        }
    }
}

/// Programme an activity recruits for; approval snapshots are created only for these.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgrammeLink {
    pub programme_id: ProgrammeId,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
}

impl ProgrammeLink {
    /// Both bounds are inclusive days of the programme.
    pub fn status(&self, today: NaiveDate) -> ProgrammeStatus {
        if today < self.starts_on {
            ProgrammeStatus::NotStarted
        } else if today > self.ends_on {
            ProgrammeStatus::Completed
        } else {
            ProgrammeStatus::Ongoing
        }
    }
}

/// Operator input for a new activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityDraft {
    pub kind: ActivityKind,
    pub title: String,
    #[serde(default)]
    pub is_stage: bool,
    #[serde(default)]
    pub programme: Option<ProgrammeLink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: ActivityId,
    pub kind: ActivityKind,
    pub title: String,
    pub is_stage: bool,
    pub programme: Option<ProgrammeLink>,
}

impl Activity {
    /// Only staged calls for application populate `current_stage_id`.
    pub fn runs_stages(&self) -> bool {
        self.kind == ActivityKind::CallForApplication && self.is_stage
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormKind {
    Default,
    Custom,
}

impl FormKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Default => "Default",
            Self::Custom => "Custom",
        }
    }
}

/// Schema container. Fields live in their own collection and are referenced by id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    pub id: FormId,
    pub activity_id: ActivityId,
    pub kind: FormKind,
    pub field_ids: Vec<FormFieldId>,
}

/// Closed set of capture types understood by the field catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    ShortAnswer,
    LongAnswer,
    SingleAnswer,
    MultipleAnswer,
    Select,
    Rating,
    Date,
    FileUpload,
    Links,
    PhoneNumber,
    Email,
}

impl FieldType {
    pub const fn label(self) -> &'static str {
        match self {
            Self::ShortAnswer => "Short Answer",
            Self::LongAnswer => "Long Answer",
            Self::SingleAnswer => "Single Answer",
            Self::MultipleAnswer => "Multiple Answer",
            Self::Select => "Select",
            Self::Rating => "Rating",
            Self::Date => "Date",
            Self::FileUpload => "File Upload",
            Self::Links => "Links",
            Self::PhoneNumber => "Phone Number",
            Self::Email => "Email",
        }
    }

    pub const fn requires_options(self) -> bool {
        matches!(
            self,
            Self::SingleAnswer | Self::MultipleAnswer | Self::Select
        )
    }
}

/// Upload limits for a `FileUpload` field. Unset attributes fall back to catalog defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileConstraint {
    #[serde(default)]
    pub max_count: Option<u32>,
    #[serde(default)]
    pub max_size_bytes: Option<u64>,
    #[serde(default)]
    pub allowed_types: Vec<String>,
}

impl FileConstraint {
    pub fn has_attributes(&self) -> bool {
        self.max_count.is_some() || self.max_size_bytes.is_some() || !self.allowed_types.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldOption {
    pub key: String,
    pub value: String,
    pub label: String,
}

/// Operator input describing one schema entry before it is assigned an id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDraft {
    pub key: String,
    pub label: String,
    pub field_type: FieldType,
    pub index: u32,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub rating_levels: Option<u8>,
    #[serde(default)]
    pub file: Option<FileConstraint>,
    #[serde(default)]
    pub options: Vec<FieldOption>,
}

impl FieldDraft {
    pub fn new(key: &str, label: &str, field_type: FieldType, index: u32) -> Self {
        Self {
            key: key.to_string(),
            label: label.to_string(),
            field_type,
            index,
            required: false,
            rating_levels: None,
            file: None,
            options: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_options(mut self, options: &[(&str, &str)]) -> Self {
        self.options = options
            .iter()
            .map(|(key, label)| FieldOption {
                key: key.to_string(),
                value: key.to_string(),
                label: label.to_string(),
            })
            .collect();
        self
    }

    pub fn with_rating_levels(mut self, levels: u8) -> Self {
        self.rating_levels = Some(levels);
        self
    }

    pub fn with_file(mut self, constraint: FileConstraint) -> Self {
        self.file = Some(constraint);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormField {
    pub id: FormFieldId,
    pub form_id: FormId,
    pub key: String,
    pub label: String,
    pub field_type: FieldType,
    pub index: u32,
    pub required: bool,
    pub rating_levels: Option<u8>,
    pub file: Option<FileConstraint>,
    pub options: Vec<FieldOption>,
}

impl FormField {
    pub(crate) fn from_draft(form_id: &FormId, draft: FieldDraft) -> Self {
        Self {
            id: FormFieldId::generate(),
            form_id: form_id.clone(),
            key: draft.key.trim().to_string(),
            label: draft.label,
            field_type: draft.field_type,
            index: draft.index,
            required: draft.required,
            rating_levels: draft.rating_levels,
            file: draft.file,
            options: draft
                .options
                .into_iter()
                .map(|option| FieldOption {
                    key: option.key.trim().to_string(),
                    ..option
                })
                .collect(),
        }
    }

    pub fn has_option(&self, key: &str) -> bool {
        self.options.iter().any(|option| option.key == key)
    }
}

/// One applicant's stored answer to one field; unique per (field, applicant).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormFieldValue {
    pub form_field_id: FormFieldId,
    pub applicant_detail_id: ApplicantDetailId,
    pub value: String,
}

/// Raw answer as submitted, keyed by the field's key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmittedValue {
    pub field_key: String,
    pub value: String,
}

impl SubmittedValue {
    pub fn new(field_key: &str, value: &str) -> Self {
        Self {
            field_key: field_key.to_string(),
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    pub id: StageId,
    pub activity_id: ActivityId,
    pub name: String,
    pub index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicantStatus {
    Pending,
    InReview,
    Approved,
    Rejected,
    Failed,
    Graduated,
}

impl ApplicantStatus {
    pub const fn ordered() -> [Self; 6] {
        [
            Self::Pending,
            Self::InReview,
            Self::Approved,
            Self::Rejected,
            Self::Failed,
            Self::Graduated,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pending",
            Self::InReview => "In Review",
            Self::Approved => "Approved",
            Self::Rejected => "Rejected",
            Self::Failed => "Failed",
            Self::Graduated => "Graduated",
        }
    }

    pub const fn code(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InReview => "in_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
            Self::Graduated => "graduated",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Approved | Self::Rejected | Self::Failed | Self::Graduated
        )
    }
}

impl fmt::Display for ApplicantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Reviewer verdict accepted by `decide`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Approved,
    Rejected,
}

impl Decision {
    /// Accepts the status code or its label, case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "approved" | "approve" => Some(Self::Approved),
            "rejected" | "reject" => Some(Self::Rejected),
            _ => None,
        }
    }

    pub const fn status(self) -> ApplicantStatus {
        match self {
            Self::Approved => ApplicantStatus::Approved,
            Self::Rejected => ApplicantStatus::Rejected,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantContact {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone_number: Option<String>,
}

impl ApplicantContact {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewApplicant {
    pub activity_id: ActivityId,
    pub form_id: FormId,
    pub contact: ApplicantContact,
}

/// Applicant record against one activity. `version` is bumped by every committed mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicantDetail {
    pub id: ApplicantDetailId,
    pub activity_id: ActivityId,
    pub form_id: FormId,
    pub current_stage_id: Option<StageId>,
    pub status: ApplicantStatus,
    pub contact: ApplicantContact,
    pub decided_by: Option<String>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    pub version: u64,
}

impl ApplicantDetail {
    pub(crate) fn pending(applicant: NewApplicant) -> Self {
        Self {
            id: ApplicantDetailId::generate(),
            activity_id: applicant.activity_id,
            form_id: applicant.form_id,
            current_stage_id: None,
            status: ApplicantStatus::Pending,
            contact: applicant.contact,
            decided_by: None,
            submitted_at: None,
            updated_at: Utc::now(),
            version: 1,
        }
    }

    /// Copy carrying the next version; callers commit it against `self.version`.
    pub(crate) fn next_revision(&self) -> Self {
        let mut next = self.clone();
        next.version = self.version + 1;
        next.updated_at = Utc::now();
        next
    }
}

/// Snapshot taken once at approval for programme-bearing activities. Never re-synced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovedApplicant {
    pub id: ApprovedApplicantId,
    pub applicant_detail_id: ApplicantDetailId,
    pub activity_id: ActivityId,
    pub programme_id: ProgrammeId,
    pub contact: ApplicantContact,
    pub approved_by: String,
    pub approved_at: DateTime<Utc>,
}

/// Reviewer identity passed explicitly into decisions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticatedCaller {
    pub user_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl AuthenticatedCaller {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            display_name: None,
        }
    }
}

/// Result of a successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplicantFormStatus {
    pub applicant_id: ApplicantDetailId,
    pub form_id: FormId,
    pub status: ApplicantStatus,
    pub status_label: &'static str,
    pub current_stage_id: Option<StageId>,
    pub answered_fields: usize,
}

/// One row of the read-only answer summary, ordered by field index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnswerPreview {
    pub field_id: FormFieldId,
    pub key: String,
    pub label: String,
    pub field_type: FieldType,
    pub index: u32,
    pub required: bool,
    pub value: Option<String>,
}
