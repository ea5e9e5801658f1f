use std::fmt;

use applicant_pipeline::config::ConfigError;
use applicant_pipeline::error::{ErrorKind, PipelineError};
use applicant_pipeline::telemetry::TelemetryError;
use applicant_pipeline::workflows::applications::CatalogError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

#[derive(Debug)]
pub enum AppError {
    Config(ConfigError),
    Telemetry(TelemetryError),
    Catalog(CatalogError),
    Io(std::io::Error),
    Server(axum::Error),
    Pipeline(PipelineError),
    MissingReviewer,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Pipeline(err) => status_for(err.kind()),
            AppError::MissingReviewer => StatusCode::UNAUTHORIZED,
            AppError::Config(_)
            | AppError::Telemetry(_)
            | AppError::Catalog(_)
            | AppError::Io(_)
            | AppError::Server(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Schema | ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::InvalidApplicantStatus
        | ErrorKind::InvalidStageTransition
        | ErrorKind::StageNotFound
        | ErrorKind::ConcurrentModification => StatusCode::CONFLICT,
        ErrorKind::Forbidden => StatusCode::FORBIDDEN,
        ErrorKind::EmptyBatch
        | ErrorKind::BatchTooLarge
        | ErrorKind::UnknownStatus
        | ErrorKind::FormMismatch => StatusCode::BAD_REQUEST,
        ErrorKind::Repository => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "configuration error: {}", err),
            AppError::Telemetry(err) => write!(f, "telemetry error: {}", err),
            AppError::Catalog(err) => write!(f, "field catalog error: {}", err),
            AppError::Io(err) => write!(f, "io error: {}", err),
            AppError::Server(err) => write!(f, "server error: {}", err),
            AppError::Pipeline(err) => write!(f, "{}", err),
            AppError::MissingReviewer => write!(f, "x-reviewer-id header is required"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Telemetry(err) => Some(err),
            AppError::Catalog(err) => Some(err),
            AppError::Io(err) => Some(err),
            AppError::Server(err) => Some(err),
            AppError::Pipeline(err) => Some(err),
            AppError::MissingReviewer => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let kind = match &self {
            AppError::Pipeline(err) => err.kind().label(),
            AppError::MissingReviewer => "unauthenticated",
            _ => "internal_error",
        };

        let body = Json(json!({ "error": self.to_string(), "kind": kind }));
        (status, body).into_response()
    }
}

impl From<ConfigError> for AppError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<TelemetryError> for AppError {
    fn from(value: TelemetryError) -> Self {
        Self::Telemetry(value)
    }
}

impl From<CatalogError> for AppError {
    fn from(value: CatalogError) -> Self {
        Self::Catalog(value)
    }
}

impl From<std::io::Error> for AppError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<axum::Error> for AppError {
    fn from(value: axum::Error) -> Self {
        Self::Server(value)
    }
}

impl From<PipelineError> for AppError {
    fn from(value: PipelineError) -> Self {
        Self::Pipeline(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use applicant_pipeline::error::EntityKind;
    use applicant_pipeline::workflows::applications::{ValidationError, ValidationErrorKind};

    #[test]
    fn pipeline_errors_map_to_http_statuses() {
        let validation = AppError::from(PipelineError::Validation(ValidationError::new(
            ValidationErrorKind::EnterValue,
            "name",
        )));
        let missing = AppError::from(PipelineError::NotFound {
            entity: EntityKind::Applicant,
            id: "applicant-000042".to_string(),
        });
        let forbidden = AppError::from(PipelineError::Forbidden("intern".to_string()));

        assert_eq!(validation.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            AppError::from(PipelineError::EmptyBatch).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::MissingReviewer.status(),
            StatusCode::UNAUTHORIZED
        );
    }
}
