use std::sync::atomic::Ordering;
use std::sync::Arc;

use applicant_pipeline::error::PipelineError;
use applicant_pipeline::workflows::applications::{
    ActivityDraft, ActivityId, ActivityRegistration, AnswerPreview, ApplicantDetail,
    ApplicantDetailId, ApplicantFormStatus, ApplicationPipeline, AuthenticatedCaller,
    BulkOutcome, CapabilityCheck, Decision, FieldDraft, Form, FormId, FormKind, FormView,
    NewApplicant, NotificationDispatcher, PipelineRepository, Stage, StageId, SubmittedValue,
};
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::AppError;
use crate::infra::AppState;

const REVIEWER_HEADER: &str = "x-reviewer-id";
const REVIEWER_NAME_HEADER: &str = "x-reviewer-name";

type Pipeline<R, N, C> = Arc<ApplicationPipeline<R, N, C>>;

#[derive(Debug, Deserialize)]
pub(crate) struct StageNamesRequest {
    pub(crate) names: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateFormRequest {
    pub(crate) activity_id: ActivityId,
    pub(crate) kind: FormKind,
    #[serde(default)]
    pub(crate) fields: Vec<FieldDraft>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AddFieldsRequest {
    pub(crate) fields: Vec<FieldDraft>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FormKindQuery {
    pub(crate) kind: FormKind,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SubmissionRequest {
    pub(crate) form_id: FormId,
    pub(crate) values: Vec<SubmittedValue>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct StageRequest {
    pub(crate) stage_id: StageId,
}

#[derive(Debug, Serialize)]
pub(crate) struct AdvanceResponse {
    pub(crate) applicant_id: ApplicantDetailId,
    pub(crate) stage_id: StageId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct DecisionRequest {
    pub(crate) status: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BulkDecisionRequest {
    pub(crate) applicant_ids: Vec<ApplicantDetailId>,
    pub(crate) status: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BulkStageRequest {
    pub(crate) applicant_ids: Vec<ApplicantDetailId>,
    pub(crate) stage_id: StageId,
}

pub(crate) fn pipeline_router<R, N, C>(pipeline: Pipeline<R, N, C>) -> Router
where
    R: PipelineRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    Router::new()
        .route("/api/v1/activities", post(register_activity::<R, N, C>))
        .route(
            "/api/v1/activities/:activity_id/stages",
            post(define_stages::<R, N, C>).get(list_stages::<R, N, C>),
        )
        .route("/api/v1/forms", post(create_form::<R, N, C>))
        .route("/api/v1/forms/:form_id", get(form_by_type::<R, N, C>))
        .route(
            "/api/v1/forms/:form_id/fields",
            post(add_field_values::<R, N, C>),
        )
        .route("/api/v1/applicants", post(register_applicant::<R, N, C>))
        .route(
            "/api/v1/applicants/bulk/decision",
            post(bulk_decide::<R, N, C>),
        )
        .route(
            "/api/v1/applicants/bulk/stage",
            post(bulk_assign_stage::<R, N, C>),
        )
        .route(
            "/api/v1/applicants/:applicant_id",
            get(applicant::<R, N, C>),
        )
        .route(
            "/api/v1/applicants/:applicant_id/submission",
            post(submit_values::<R, N, C>),
        )
        .route(
            "/api/v1/applicants/:applicant_id/answers",
            get(preview_answers::<R, N, C>),
        )
        .route(
            "/api/v1/applicants/:applicant_id/advance",
            post(advance::<R, N, C>),
        )
        .route(
            "/api/v1/applicants/:applicant_id/stage",
            post(assign_stage::<R, N, C>),
        )
        .route(
            "/api/v1/applicants/:applicant_id/decision",
            post(decide::<R, N, C>),
        )
        .route(
            "/api/v1/applicants/:applicant_id/fail",
            post(mark_failed::<R, N, C>),
        )
        .route(
            "/api/v1/applicants/:applicant_id/graduate",
            post(graduate::<R, N, C>),
        )
        .with_state(pipeline)
}

pub(crate) fn with_operational_routes(router: Router) -> Router {
    router
        .route("/health", get(healthcheck))
        .route("/ready", get(readiness_endpoint))
        .route("/metrics", get(metrics_endpoint))
}

/// Reviewer identity comes from the gateway-authenticated headers, never from the body.
fn reviewer(headers: &HeaderMap) -> Result<AuthenticatedCaller, AppError> {
    let user_id = headers
        .get(REVIEWER_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or(AppError::MissingReviewer)?;

    let mut caller = AuthenticatedCaller::new(user_id);
    caller.display_name = headers
        .get(REVIEWER_NAME_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string);
    Ok(caller)
}

fn parse_decision(status: &str) -> Result<Decision, AppError> {
    Decision::parse(status).ok_or_else(|| PipelineError::UnknownStatus(status.to_string()).into())
}

async fn register_activity<R, N, C>(
    State(pipeline): State<Pipeline<R, N, C>>,
    Json(draft): Json<ActivityDraft>,
) -> Result<(StatusCode, Json<ActivityRegistration>), AppError>
where
    R: PipelineRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    let registration = pipeline.register_activity(draft)?;
    Ok((StatusCode::CREATED, Json(registration)))
}

async fn define_stages<R, N, C>(
    State(pipeline): State<Pipeline<R, N, C>>,
    Path(activity_id): Path<String>,
    Json(request): Json<StageNamesRequest>,
) -> Result<(StatusCode, Json<Vec<Stage>>), AppError>
where
    R: PipelineRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    let stages = pipeline.define_stages(&ActivityId(activity_id), &request.names)?;
    Ok((StatusCode::CREATED, Json(stages)))
}

async fn list_stages<R, N, C>(
    State(pipeline): State<Pipeline<R, N, C>>,
    Path(activity_id): Path<String>,
) -> Result<Json<Vec<Stage>>, AppError>
where
    R: PipelineRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    Ok(Json(pipeline.stages(&ActivityId(activity_id))?))
}

async fn create_form<R, N, C>(
    State(pipeline): State<Pipeline<R, N, C>>,
    Json(request): Json<CreateFormRequest>,
) -> Result<(StatusCode, Json<Form>), AppError>
where
    R: PipelineRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    let form = pipeline.create_form(&request.activity_id, request.kind, request.fields)?;
    Ok((StatusCode::CREATED, Json(form)))
}

async fn add_field_values<R, N, C>(
    State(pipeline): State<Pipeline<R, N, C>>,
    Path(form_id): Path<String>,
    Json(request): Json<AddFieldsRequest>,
) -> Result<Json<Form>, AppError>
where
    R: PipelineRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    Ok(Json(
        pipeline.add_field_values(&FormId(form_id), request.fields)?,
    ))
}

async fn form_by_type<R, N, C>(
    State(pipeline): State<Pipeline<R, N, C>>,
    Path(form_id): Path<String>,
    Query(query): Query<FormKindQuery>,
) -> Result<Json<FormView>, AppError>
where
    R: PipelineRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    Ok(Json(pipeline.get_form_by_type(&FormId(form_id), query.kind)?))
}

async fn register_applicant<R, N, C>(
    State(pipeline): State<Pipeline<R, N, C>>,
    Json(applicant): Json<NewApplicant>,
) -> Result<(StatusCode, Json<ApplicantDetail>), AppError>
where
    R: PipelineRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    let detail = pipeline.register_applicant(applicant)?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn applicant<R, N, C>(
    State(pipeline): State<Pipeline<R, N, C>>,
    Path(applicant_id): Path<String>,
) -> Result<Json<ApplicantDetail>, AppError>
where
    R: PipelineRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    Ok(Json(pipeline.applicant(&ApplicantDetailId(applicant_id))?))
}

async fn submit_values<R, N, C>(
    State(pipeline): State<Pipeline<R, N, C>>,
    Path(applicant_id): Path<String>,
    Json(request): Json<SubmissionRequest>,
) -> Result<Json<ApplicantFormStatus>, AppError>
where
    R: PipelineRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    let status = pipeline.submit_values(
        &ApplicantDetailId(applicant_id),
        &request.form_id,
        &request.values,
    )?;
    Ok(Json(status))
}

async fn preview_answers<R, N, C>(
    State(pipeline): State<Pipeline<R, N, C>>,
    Path(applicant_id): Path<String>,
) -> Result<Json<Vec<AnswerPreview>>, AppError>
where
    R: PipelineRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    Ok(Json(
        pipeline.preview_answers(&ApplicantDetailId(applicant_id))?,
    ))
}

async fn advance<R, N, C>(
    State(pipeline): State<Pipeline<R, N, C>>,
    Path(applicant_id): Path<String>,
) -> Result<Json<AdvanceResponse>, AppError>
where
    R: PipelineRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    let applicant_id = ApplicantDetailId(applicant_id);
    let stage_id = pipeline.advance(&applicant_id)?;
    Ok(Json(AdvanceResponse {
        applicant_id,
        stage_id,
    }))
}

async fn assign_stage<R, N, C>(
    State(pipeline): State<Pipeline<R, N, C>>,
    Path(applicant_id): Path<String>,
    Json(request): Json<StageRequest>,
) -> Result<Json<ApplicantDetail>, AppError>
where
    R: PipelineRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    let detail = pipeline.assign_stage(&ApplicantDetailId(applicant_id), &request.stage_id)?;
    Ok(Json(detail))
}

async fn decide<R, N, C>(
    State(pipeline): State<Pipeline<R, N, C>>,
    Path(applicant_id): Path<String>,
    headers: HeaderMap,
    Json(request): Json<DecisionRequest>,
) -> Result<Json<ApplicantDetail>, AppError>
where
    R: PipelineRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    let caller = reviewer(&headers)?;
    let decision = parse_decision(&request.status)?;
    let detail = pipeline.decide(&ApplicantDetailId(applicant_id), decision, &caller)?;
    Ok(Json(detail))
}

async fn mark_failed<R, N, C>(
    State(pipeline): State<Pipeline<R, N, C>>,
    Path(applicant_id): Path<String>,
) -> Result<Json<ApplicantDetail>, AppError>
where
    R: PipelineRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    Ok(Json(pipeline.mark_failed(&ApplicantDetailId(applicant_id))?))
}

async fn graduate<R, N, C>(
    State(pipeline): State<Pipeline<R, N, C>>,
    Path(applicant_id): Path<String>,
) -> Result<Json<ApplicantDetail>, AppError>
where
    R: PipelineRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    Ok(Json(pipeline.graduate(&ApplicantDetailId(applicant_id))?))
}

async fn bulk_decide<R, N, C>(
    State(pipeline): State<Pipeline<R, N, C>>,
    headers: HeaderMap,
    Json(request): Json<BulkDecisionRequest>,
) -> Result<Json<BulkOutcome>, AppError>
where
    R: PipelineRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    let caller = reviewer(&headers)?;
    let outcome = pipeline.bulk_decide(&request.applicant_ids, &request.status, &caller)?;
    Ok(Json(outcome))
}

async fn bulk_assign_stage<R, N, C>(
    State(pipeline): State<Pipeline<R, N, C>>,
    Json(request): Json<BulkStageRequest>,
) -> Result<Json<BulkOutcome>, AppError>
where
    R: PipelineRepository + 'static,
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    let outcome = pipeline.bulk_assign_stage(&request.applicant_ids, &request.stage_id)?;
    Ok(Json(outcome))
}

pub(crate) async fn healthcheck() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

pub(crate) async fn readiness_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    let ready = state.readiness.load(Ordering::Relaxed);
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let payload = if ready {
        json!({ "status": "ready" })
    } else {
        json!({ "status": "initializing" })
    };

    (status, Json(payload))
}

pub(crate) async fn metrics_endpoint(Extension(state): Extension<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        state.metrics.render(),
    )
}
