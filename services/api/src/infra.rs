use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use applicant_pipeline::config::PipelineConfig;
use applicant_pipeline::workflows::applications::{
    ActivityId, ApplicantNotification, ApplicationPipeline, AuthenticatedCaller, CapabilityCheck,
    InMemoryPipelineRepository, NotificationDispatcher, NotificationError,
};
use chrono::NaiveDate;
use metrics_exporter_prometheus::PrometheusHandle;
use tracing::info;

use crate::error::AppError;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Any identified reviewer may decide. Role checks belong to the upstream gateway.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct OpenReviewerAccess;

impl CapabilityCheck for OpenReviewerAccess {
    fn can_decide(&self, caller: &AuthenticatedCaller, _activity_id: &ActivityId) -> bool {
        !caller.user_id.trim().is_empty()
    }
}

/// Writes outbound applicant notifications to the log instead of a mail relay.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct LoggingNotificationDispatcher;

impl NotificationDispatcher for LoggingNotificationDispatcher {
    fn dispatch(&self, notification: ApplicantNotification) -> Result<(), NotificationError> {
        info!(
            template = %notification.template,
            applicant_id = %notification.applicant_id,
            activity_id = %notification.activity_id,
            recipient = %notification.recipient,
            "applicant notification queued"
        );
        Ok(())
    }
}

pub(crate) type ServicePipeline = ApplicationPipeline<
    InMemoryPipelineRepository,
    LoggingNotificationDispatcher,
    OpenReviewerAccess,
>;

pub(crate) fn build_pipeline(config: PipelineConfig) -> Result<Arc<ServicePipeline>, AppError> {
    let pipeline = ApplicationPipeline::new(
        Arc::new(InMemoryPipelineRepository::new()),
        Arc::new(LoggingNotificationDispatcher),
        Arc::new(OpenReviewerAccess),
        config,
    )?;
    Ok(Arc::new(pipeline))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_reviewers_cannot_decide() {
        let activity = ActivityId::from("act-000001");
        assert!(OpenReviewerAccess.can_decide(&AuthenticatedCaller::new("lead-amara"), &activity));
        assert!(!OpenReviewerAccess.can_decide(&AuthenticatedCaller::new("  "), &activity));
    }

    #[test]
    fn dates_parse_as_iso_days() {
        assert_eq!(
            parse_date(" 2025-03-03 "),
            Ok(NaiveDate::from_ymd_opt(2025, 3, 3).expect("valid"))
        );
        assert!(parse_date("03/03/2025").is_err());
    }
}
