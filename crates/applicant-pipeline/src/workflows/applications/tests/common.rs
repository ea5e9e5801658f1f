use std::sync::{Arc, Mutex};

use chrono::NaiveDate;

use crate::config::PipelineConfig;
use crate::workflows::applications::bulk::BulkCancellation;
use crate::workflows::applications::domain::{
    Activity, ActivityDraft, ActivityId, ActivityKind, ApplicantContact, ApplicantDetail,
    ApplicantDetailId, ApprovedApplicant, AuthenticatedCaller, FieldDraft, FieldType, Form,
    FormField, FormFieldValue, FormId, FormKind, NewApplicant, ProgrammeId, ProgrammeLink, Stage,
    StageId, SubmittedValue,
};
use crate::workflows::applications::memory::InMemoryPipelineRepository;
use crate::workflows::applications::repository::{
    ApplicantNotification, CapabilityCheck, NotificationDispatcher, NotificationError,
    PipelineRepository, RepositoryError, RepositoryTransaction,
};
use crate::workflows::applications::service::ApplicationPipeline;

pub(super) type MemoryPipeline =
    ApplicationPipeline<InMemoryPipelineRepository, RecordingNotifier, AllowAll>;

pub(super) fn build_pipeline() -> (
    MemoryPipeline,
    Arc<InMemoryPipelineRepository>,
    Arc<RecordingNotifier>,
) {
    build_pipeline_with(PipelineConfig::default())
}

pub(super) fn build_pipeline_with(
    config: PipelineConfig,
) -> (
    MemoryPipeline,
    Arc<InMemoryPipelineRepository>,
    Arc<RecordingNotifier>,
) {
    let repository = Arc::new(InMemoryPipelineRepository::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let pipeline = ApplicationPipeline::new(
        repository.clone(),
        notifier.clone(),
        Arc::new(AllowAll),
        config,
    )
    .expect("catalog patterns compile");
    (pipeline, repository, notifier)
}

/// Another facade over the same store, for swapping collaborators mid-scenario.
pub(super) fn pipeline_over<N, C>(
    repository: &Arc<InMemoryPipelineRepository>,
    notifier: N,
    access: C,
) -> ApplicationPipeline<InMemoryPipelineRepository, N, C>
where
    N: NotificationDispatcher + 'static,
    C: CapabilityCheck + 'static,
{
    ApplicationPipeline::new(
        repository.clone(),
        Arc::new(notifier),
        Arc::new(access),
        PipelineConfig::default(),
    )
    .expect("catalog patterns compile")
}

pub(super) fn reviewer() -> AuthenticatedCaller {
    AuthenticatedCaller {
        user_id: "reviewer-7".to_string(),
        display_name: Some("Grace Hopper".to_string()),
    }
}

pub(super) fn contact(first_name: &str) -> ApplicantContact {
    ApplicantContact {
        first_name: first_name.to_string(),
        last_name: "Lovelace".to_string(),
        email: format!("{}@example.org", first_name.to_ascii_lowercase()),
        phone_number: Some("+44 20 7946 0958".to_string()),
    }
}

pub(super) fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).expect("valid date")
}

pub(super) fn programme() -> ProgrammeLink {
    ProgrammeLink {
        programme_id: ProgrammeId::from("prog-fellowship"),
        starts_on: date(2025, 1, 6),
        ends_on: date(2025, 6, 27),
    }
}

pub(super) fn call_for_application(is_stage: bool, with_programme: bool) -> ActivityDraft {
    ActivityDraft {
        kind: ActivityKind::CallForApplication,
        title: "Spring fellowship intake".to_string(),
        is_stage,
        programme: with_programme.then(programme),
    }
}

/// Required ShortAnswer "name" plus an optional 1..=5 Rating "score".
pub(super) fn name_and_score_fields() -> Vec<FieldDraft> {
    vec![
        FieldDraft::new("name", "Name", FieldType::ShortAnswer, 0).required(),
        FieldDraft::new("score", "Self assessment", FieldType::Rating, 1).with_rating_levels(5),
    ]
}

pub(super) fn draft_field(field_type: FieldType) -> FieldDraft {
    let draft = FieldDraft::new("answer", "Answer", field_type, 0);
    match field_type {
        FieldType::SingleAnswer | FieldType::MultipleAnswer | FieldType::Select => draft
            .with_options(&[("red", "Red"), ("green", "Green"), ("blue", "Blue")]),
        _ => draft,
    }
}

pub(super) fn field(draft: FieldDraft) -> FormField {
    FormField::from_draft(&FormId::from("form-fixture"), draft)
}

pub(super) fn answer(key: &str, value: &str) -> SubmittedValue {
    SubmittedValue::new(key, value)
}

/// An activity with a custom name/score form, ready for applicants.
pub(super) struct Intake {
    pub(super) activity: Activity,
    pub(super) form: Form,
}

pub(super) fn intake(pipeline: &MemoryPipeline, draft: ActivityDraft) -> Intake {
    let registration = pipeline.register_activity(draft).expect("activity registers");
    let form = pipeline
        .create_form(
            &registration.activity.id,
            FormKind::Custom,
            name_and_score_fields(),
        )
        .expect("custom form is valid");
    Intake {
        activity: registration.activity,
        form,
    }
}

pub(super) fn register(
    pipeline: &MemoryPipeline,
    intake: &Intake,
    first_name: &str,
) -> ApplicantDetail {
    pipeline
        .register_applicant(NewApplicant {
            activity_id: intake.activity.id.clone(),
            form_id: intake.form.id.clone(),
            contact: contact(first_name),
        })
        .expect("applicant registers")
}

/// Registered and submitted, so the applicant is in review.
pub(super) fn in_review(
    pipeline: &MemoryPipeline,
    intake: &Intake,
    first_name: &str,
) -> ApplicantDetailId {
    let applicant = register(pipeline, intake, first_name);
    pipeline
        .submit_values(&applicant.id, &intake.form.id, &[answer("name", first_name)])
        .expect("submission accepted");
    applicant.id
}

pub(super) fn stage_names(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

pub(super) fn staged_intake(pipeline: &MemoryPipeline, names: &[&str]) -> (Intake, Vec<Stage>) {
    let intake = intake(pipeline, call_for_application(true, false));
    let stages = pipeline
        .define_stages(&intake.activity.id, &stage_names(names))
        .expect("stages defined");
    (intake, stages)
}

pub(super) fn stored_values(
    repository: &InMemoryPipelineRepository,
    applicant_id: &ApplicantDetailId,
) -> Vec<FormFieldValue> {
    repository.values_for(applicant_id).expect("values readable")
}

pub(super) struct AllowAll;

impl CapabilityCheck for AllowAll {
    fn can_decide(&self, _caller: &AuthenticatedCaller, _activity_id: &ActivityId) -> bool {
        true
    }
}

pub(super) struct DenyAll;

impl CapabilityCheck for DenyAll {
    fn can_decide(&self, _caller: &AuthenticatedCaller, _activity_id: &ActivityId) -> bool {
        false
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    events: Mutex<Vec<ApplicantNotification>>,
}

impl RecordingNotifier {
    pub(super) fn events(&self) -> Vec<ApplicantNotification> {
        self.events.lock().expect("notifier mutex poisoned").clone()
    }
}

impl NotificationDispatcher for RecordingNotifier {
    fn dispatch(&self, notification: ApplicantNotification) -> Result<(), NotificationError> {
        self.events
            .lock()
            .expect("notifier mutex poisoned")
            .push(notification);
        Ok(())
    }
}

pub(super) struct OfflineNotifier;

impl NotificationDispatcher for OfflineNotifier {
    fn dispatch(&self, _notification: ApplicantNotification) -> Result<(), NotificationError> {
        Err(NotificationError::Transport("smtp relay offline".to_string()))
    }
}

/// Requests cancellation as soon as the first notification goes out.
pub(super) struct CancellingNotifier {
    pub(super) cancellation: BulkCancellation,
}

impl NotificationDispatcher for CancellingNotifier {
    fn dispatch(&self, _notification: ApplicantNotification) -> Result<(), NotificationError> {
        self.cancellation.cancel();
        Ok(())
    }
}

pub(super) struct UnavailableRepository;

impl UnavailableRepository {
    fn offline<T>() -> Result<T, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

impl PipelineRepository for UnavailableRepository {
    fn begin(&self) -> Result<Box<dyn RepositoryTransaction + '_>, RepositoryError> {
        Self::offline()
    }

    fn activity(&self, _id: &ActivityId) -> Result<Option<Activity>, RepositoryError> {
        Self::offline()
    }

    fn form(&self, _id: &FormId) -> Result<Option<Form>, RepositoryError> {
        Self::offline()
    }

    fn forms_for_activity(&self, _activity_id: &ActivityId) -> Result<Vec<Form>, RepositoryError> {
        Self::offline()
    }

    fn form_fields(&self, _form_id: &FormId) -> Result<Vec<FormField>, RepositoryError> {
        Self::offline()
    }

    fn stages(&self, _activity_id: &ActivityId) -> Result<Vec<Stage>, RepositoryError> {
        Self::offline()
    }

    fn stage(&self, _id: &StageId) -> Result<Option<Stage>, RepositoryError> {
        Self::offline()
    }

    fn applicant(
        &self,
        _id: &ApplicantDetailId,
    ) -> Result<Option<ApplicantDetail>, RepositoryError> {
        Self::offline()
    }

    fn values_for(
        &self,
        _applicant_id: &ApplicantDetailId,
    ) -> Result<Vec<FormFieldValue>, RepositoryError> {
        Self::offline()
    }

    fn approved_applicant(
        &self,
        _applicant_id: &ApplicantDetailId,
    ) -> Result<Option<ApprovedApplicant>, RepositoryError> {
        Self::offline()
    }
}

/// Lets a competing writer commit an applicant update just before the next transaction
/// opens, so the caller's version check fails.
pub(super) struct RacingRepository {
    pub(super) inner: InMemoryPipelineRepository,
    rival: Mutex<Option<ApplicantDetailId>>,
}

impl RacingRepository {
    pub(super) fn new(inner: InMemoryPipelineRepository) -> Self {
        Self {
            inner,
            rival: Mutex::new(None),
        }
    }

    pub(super) fn race_next_write(&self, applicant_id: &ApplicantDetailId) {
        *self.rival.lock().expect("rival mutex poisoned") = Some(applicant_id.clone());
    }
}

impl PipelineRepository for RacingRepository {
    fn begin(&self) -> Result<Box<dyn RepositoryTransaction + '_>, RepositoryError> {
        let rival = self.rival.lock().expect("rival mutex poisoned").take();
        if let Some(applicant_id) = rival {
            let current = self
                .inner
                .applicant(&applicant_id)?
                .ok_or(RepositoryError::NotFound)?;
            let mut competing = self.inner.begin()?;
            competing.update_applicant(current.next_revision(), current.version)?;
            competing.commit()?;
        }
        self.inner.begin()
    }

    fn activity(&self, id: &ActivityId) -> Result<Option<Activity>, RepositoryError> {
        self.inner.activity(id)
    }

    fn form(&self, id: &FormId) -> Result<Option<Form>, RepositoryError> {
        self.inner.form(id)
    }

    fn forms_for_activity(&self, activity_id: &ActivityId) -> Result<Vec<Form>, RepositoryError> {
        self.inner.forms_for_activity(activity_id)
    }

    fn form_fields(&self, form_id: &FormId) -> Result<Vec<FormField>, RepositoryError> {
        self.inner.form_fields(form_id)
    }

    fn stages(&self, activity_id: &ActivityId) -> Result<Vec<Stage>, RepositoryError> {
        self.inner.stages(activity_id)
    }

    fn stage(&self, id: &StageId) -> Result<Option<Stage>, RepositoryError> {
        self.inner.stage(id)
    }

    fn applicant(
        &self,
        id: &ApplicantDetailId,
    ) -> Result<Option<ApplicantDetail>, RepositoryError> {
        self.inner.applicant(id)
    }

    fn values_for(
        &self,
        applicant_id: &ApplicantDetailId,
    ) -> Result<Vec<FormFieldValue>, RepositoryError> {
        self.inner.values_for(applicant_id)
    }

    fn approved_applicant(
        &self,
        applicant_id: &ApplicantDetailId,
    ) -> Result<Option<ApprovedApplicant>, RepositoryError> {
        self.inner.approved_applicant(applicant_id)
    }
}

/// Stretches the existence checks in schema writes so concurrent callers overlap.
#[derive(Default)]
pub(super) struct SlowReadRepository {
    pub(super) inner: InMemoryPipelineRepository,
}

impl SlowReadRepository {
    fn pause() {
        std::thread::sleep(std::time::Duration::from_millis(25));
    }
}

impl PipelineRepository for SlowReadRepository {
    fn begin(&self) -> Result<Box<dyn RepositoryTransaction + '_>, RepositoryError> {
        self.inner.begin()
    }

    fn activity(&self, id: &ActivityId) -> Result<Option<Activity>, RepositoryError> {
        self.inner.activity(id)
    }

    fn form(&self, id: &FormId) -> Result<Option<Form>, RepositoryError> {
        self.inner.form(id)
    }

    fn forms_for_activity(&self, activity_id: &ActivityId) -> Result<Vec<Form>, RepositoryError> {
        let forms = self.inner.forms_for_activity(activity_id);
        Self::pause();
        forms
    }

    fn form_fields(&self, form_id: &FormId) -> Result<Vec<FormField>, RepositoryError> {
        self.inner.form_fields(form_id)
    }

    fn stages(&self, activity_id: &ActivityId) -> Result<Vec<Stage>, RepositoryError> {
        let stages = self.inner.stages(activity_id);
        Self::pause();
        stages
    }

    fn stage(&self, id: &StageId) -> Result<Option<Stage>, RepositoryError> {
        self.inner.stage(id)
    }

    fn applicant(
        &self,
        id: &ApplicantDetailId,
    ) -> Result<Option<ApplicantDetail>, RepositoryError> {
        self.inner.applicant(id)
    }

    fn values_for(
        &self,
        applicant_id: &ApplicantDetailId,
    ) -> Result<Vec<FormFieldValue>, RepositoryError> {
        self.inner.values_for(applicant_id)
    }

    fn approved_applicant(
        &self,
        applicant_id: &ApplicantDetailId,
    ) -> Result<Option<ApprovedApplicant>, RepositoryError> {
        self.inner.approved_applicant(applicant_id)
    }
}

pub(super) type SlowPipeline = ApplicationPipeline<SlowReadRepository, RecordingNotifier, AllowAll>;

pub(super) fn slow_pipeline() -> (SlowPipeline, Arc<SlowReadRepository>) {
    let repository = Arc::new(SlowReadRepository::default());
    let pipeline = ApplicationPipeline::new(
        repository.clone(),
        Arc::new(RecordingNotifier::default()),
        Arc::new(AllowAll),
        PipelineConfig::default(),
    )
    .expect("catalog patterns compile");
    (pipeline, repository)
}

/// Runs `work` on `callers` threads released together and collects each result.
pub(super) fn concurrently<T, F>(callers: usize, work: F) -> Vec<T>
where
    T: Send,
    F: Fn() -> T + Sync,
{
    let start = std::sync::Barrier::new(callers);
    std::thread::scope(|scope| {
        let handles: Vec<_> = (0..callers)
            .map(|_| {
                scope.spawn(|| {
                    start.wait();
                    work()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().expect("caller thread"))
            .collect()
    })
}
