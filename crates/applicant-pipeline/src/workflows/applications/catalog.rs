use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::domain::{FieldType, FileConstraint, FormField};
use crate::config::PipelineConfig;

const LINK_PATTERN: &str =
    r"^(https?://)?([A-Za-z0-9]([A-Za-z0-9-]*[A-Za-z0-9])?\.)+[A-Za-z]{2,}(:[0-9]{1,5})?(/\S*)?$";
const PHONE_PATTERN: &str = r"^\+?[0-9(][0-9 ()-]{5,18}[0-9]$";
const EMAIL_PATTERN: &str = r"^[A-Za-z0-9._%+-]+@([A-Za-z0-9-]+\.)+[A-Za-z]{2,}$";

/// Why a submitted value was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationErrorKind {
    EnterValue,
    DuplicateAnswer,
    TooLong,
    UnknownOption,
    InvalidSelection,
    DuplicateSelection,
    InvalidRating,
    InvalidDate,
    DateOutOfRange,
    InvalidFilePayload,
    TooManyFiles,
    FileTooLarge,
    FileTypeNotAllowed,
    InvalidLink,
    InvalidPhoneNumber,
    InvalidEmail,
}

impl ValidationErrorKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::EnterValue => "a value is required",
            Self::DuplicateAnswer => "answered more than once",
            Self::TooLong => "answer is too long",
            Self::UnknownOption => "not one of the field's options",
            Self::InvalidSelection => "selection could not be read",
            Self::DuplicateSelection => "an option was selected more than once",
            Self::InvalidRating => "rating is outside the allowed levels",
            Self::InvalidDate => "not a valid ISO-8601 date",
            Self::DateOutOfRange => "date is outside the accepted range",
            Self::InvalidFilePayload => "file list could not be read",
            Self::TooManyFiles => "too many files",
            Self::FileTooLarge => "a file exceeds the size limit",
            Self::FileTypeNotAllowed => "a file type is not accepted",
            Self::InvalidLink => "not a valid link",
            Self::InvalidPhoneNumber => "not a valid phone number",
            Self::InvalidEmail => "not a valid email address",
        }
    }
}

/// First offending field of a rejected submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("field '{field_key}': {}", .kind.label())]
pub struct ValidationError {
    pub kind: ValidationErrorKind,
    pub field_key: String,
}

impl ValidationError {
    pub fn new(kind: ValidationErrorKind, field_key: &str) -> Self {
        Self {
            kind,
            field_key: field_key.to_string(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("format pattern failed to compile: {0}")]
    Pattern(#[from] regex::Error),
}

/// Caller-supplied extras for a single validation pass.
#[derive(Default)]
pub struct ValidationContext<'a> {
    date_rule: Option<&'a (dyn Fn(NaiveDate) -> bool + Sync)>,
}

impl<'a> ValidationContext<'a> {
    pub fn with_date_rule(rule: &'a (dyn Fn(NaiveDate) -> bool + Sync)) -> Self {
        Self {
            date_rule: Some(rule),
        }
    }

    fn accepts_date(&self, date: NaiveDate) -> bool {
        self.date_rule.map_or(true, |rule| rule(date))
    }
}

impl fmt::Debug for ValidationContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationContext")
            .field("date_rule", &self.date_rule.is_some())
            .finish()
    }
}

/// Size limits the catalog falls back to when a field does not declare its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldLimits {
    pub short_answer_max_chars: usize,
    pub long_answer_max_chars: usize,
    pub default_rating_levels: u8,
    pub default_max_file_bytes: u64,
}

impl From<&PipelineConfig> for FieldLimits {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            short_answer_max_chars: config.short_answer_max_chars,
            long_answer_max_chars: config.long_answer_max_chars,
            default_rating_levels: config.default_rating_levels,
            default_max_file_bytes: config.default_max_file_bytes,
        }
    }
}

impl Default for FieldLimits {
    fn default() -> Self {
        Self::from(&PipelineConfig::default())
    }
}

/// Reference to an uploaded file as carried in a `FileUpload` answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileReference {
    pub name: String,
    pub size_bytes: u64,
    #[serde(default)]
    pub content_type: Option<String>,
    pub storage_key: String,
}

/// Maps each field type to its value rules. Pure: no storage, no clock.
#[derive(Debug, Clone)]
pub struct FieldCatalog {
    limits: FieldLimits,
    link: Regex,
    phone: Regex,
    email: Regex,
}

impl FieldCatalog {
    pub fn new(limits: FieldLimits) -> Result<Self, CatalogError> {
        Ok(Self {
            limits,
            link: Regex::new(LINK_PATTERN)?,
            phone: Regex::new(PHONE_PATTERN)?,
            email: Regex::new(EMAIL_PATTERN)?,
        })
    }

    pub fn limits(&self) -> &FieldLimits {
        &self.limits
    }

    /// Check one non-blank answer against its field. Required-ness is the caller's concern.
    pub fn validate(
        &self,
        field: &FormField,
        raw: &str,
        context: &ValidationContext<'_>,
    ) -> Result<(), ValidationError> {
        let fail = |kind| Err(ValidationError::new(kind, &field.key));
        let value = raw.trim();

        match field.field_type {
            FieldType::ShortAnswer => {
                if value.chars().count() > self.limits.short_answer_max_chars {
                    return fail(ValidationErrorKind::TooLong);
                }
            }
            FieldType::LongAnswer => {
                if value.chars().count() > self.limits.long_answer_max_chars {
                    return fail(ValidationErrorKind::TooLong);
                }
            }
            FieldType::SingleAnswer | FieldType::Select => {
                if !field.has_option(value) {
                    return fail(ValidationErrorKind::UnknownOption);
                }
            }
            FieldType::MultipleAnswer => {
                let Some(keys) = parse_selection(value) else {
                    return fail(ValidationErrorKind::InvalidSelection);
                };
                if keys.is_empty() {
                    return fail(ValidationErrorKind::EnterValue);
                }
                let mut seen = HashSet::new();
                for key in &keys {
                    if !field.has_option(key) {
                        return fail(ValidationErrorKind::UnknownOption);
                    }
                    if !seen.insert(key.as_str()) {
                        return fail(ValidationErrorKind::DuplicateSelection);
                    }
                }
            }
            FieldType::Rating => {
                let levels = field
                    .rating_levels
                    .unwrap_or(self.limits.default_rating_levels);
                match value.parse::<i64>() {
                    Ok(rating) if (1..=i64::from(levels)).contains(&rating) => {}
                    _ => return fail(ValidationErrorKind::InvalidRating),
                }
            }
            FieldType::Date => {
                let Some(date) = parse_iso_date(value) else {
                    return fail(ValidationErrorKind::InvalidDate);
                };
                if !context.accepts_date(date) {
                    return fail(ValidationErrorKind::DateOutOfRange);
                }
            }
            FieldType::FileUpload => {
                if let Err(kind) = self.check_files(field.file.as_ref(), value) {
                    return fail(kind);
                }
            }
            FieldType::Links => {
                let links: Vec<&str> = value
                    .split(|c: char| c == ',' || c.is_whitespace())
                    .filter(|link| !link.is_empty())
                    .collect();
                if links.is_empty() {
                    return fail(ValidationErrorKind::EnterValue);
                }
                if !links.iter().all(|link| self.link.is_match(link)) {
                    return fail(ValidationErrorKind::InvalidLink);
                }
            }
            FieldType::PhoneNumber => {
                if !self.phone.is_match(value) {
                    return fail(ValidationErrorKind::InvalidPhoneNumber);
                }
            }
            FieldType::Email => {
                if !self.email.is_match(value) {
                    return fail(ValidationErrorKind::InvalidEmail);
                }
            }
        }

        Ok(())
    }

    fn check_files(
        &self,
        constraint: Option<&FileConstraint>,
        value: &str,
    ) -> Result<(), ValidationErrorKind> {
        let files: Vec<FileReference> =
            serde_json::from_str(value).map_err(|_| ValidationErrorKind::InvalidFilePayload)?;
        if files.is_empty() {
            return Err(ValidationErrorKind::EnterValue);
        }

        let fallback = FileConstraint::default();
        let constraint = constraint.unwrap_or(&fallback);

        if let Some(max_count) = constraint.max_count {
            if files.len() > max_count as usize {
                return Err(ValidationErrorKind::TooManyFiles);
            }
        }

        let max_size = constraint
            .max_size_bytes
            .unwrap_or(self.limits.default_max_file_bytes);
        let allowed: Vec<String> = constraint
            .allowed_types
            .iter()
            .map(|kind| kind.trim().trim_start_matches('.').to_ascii_lowercase())
            .collect();

        for file in &files {
            if file.size_bytes > max_size {
                return Err(ValidationErrorKind::FileTooLarge);
            }
            if !allowed.is_empty() && !file_type_allowed(file, &allowed) {
                return Err(ValidationErrorKind::FileTypeNotAllowed);
            }
        }

        Ok(())
    }
}

/// Accepts a JSON array of keys or a comma separated list.
fn parse_selection(value: &str) -> Option<Vec<String>> {
    if value.starts_with('[') {
        let keys: Vec<String> = serde_json::from_str(value).ok()?;
        return Some(keys.into_iter().map(|key| key.trim().to_string()).collect());
    }

    Some(
        value
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

pub(crate) fn parse_iso_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|timestamp| timestamp.date_naive())
        })
}

fn file_type_allowed(file: &FileReference, allowed: &[String]) -> bool {
    let extension = file
        .name
        .rsplit_once('.')
        .map(|(_, extension)| extension.to_ascii_lowercase());
    let content_type = file
        .content_type
        .as_deref()
        .map(|content_type| content_type.trim().to_ascii_lowercase());

    allowed.iter().any(|kind| {
        extension.as_deref() == Some(kind.as_str()) || content_type.as_deref() == Some(kind.as_str())
    })
}
