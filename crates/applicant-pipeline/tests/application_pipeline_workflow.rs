//! Integration scenarios for the fellowship intake pipeline.
//!
//! Everything goes through the public facade so form design, intake, staged review, and
//! decisions are exercised the way an embedding service would drive them.

mod common {
    use std::sync::{Arc, Mutex};

    use chrono::NaiveDate;

    use applicant_pipeline::config::PipelineConfig;
    use applicant_pipeline::workflows::applications::{
        ActivityDraft, ActivityId, ActivityKind, ApplicantContact, ApplicantNotification,
        ApplicationPipeline, AuthenticatedCaller, CapabilityCheck, FieldDraft, FieldType,
        FileConstraint, InMemoryPipelineRepository, NotificationDispatcher, NotificationError,
        ProgrammeId, ProgrammeLink,
    };

    pub(super) struct LeadReviewers;

    impl CapabilityCheck for LeadReviewers {
        fn can_decide(&self, caller: &AuthenticatedCaller, _activity_id: &ActivityId) -> bool {
            caller.user_id.starts_with("lead-")
        }
    }

    #[derive(Default, Clone)]
    pub(super) struct Outbox {
        sent: Arc<Mutex<Vec<ApplicantNotification>>>,
    }

    impl Outbox {
        pub(super) fn templates(&self) -> Vec<String> {
            self.sent
                .lock()
                .expect("lock")
                .iter()
                .map(|notification| notification.template.clone())
                .collect()
        }
    }

    impl NotificationDispatcher for Outbox {
        fn dispatch(&self, notification: ApplicantNotification) -> Result<(), NotificationError> {
            self.sent.lock().expect("lock").push(notification);
            Ok(())
        }
    }

    pub(super) type Pipeline = ApplicationPipeline<InMemoryPipelineRepository, Outbox, LeadReviewers>;

    pub(super) fn build_pipeline() -> (Pipeline, Arc<Outbox>) {
        let outbox = Arc::new(Outbox::default());
        let pipeline = ApplicationPipeline::new(
            Arc::new(InMemoryPipelineRepository::new()),
            outbox.clone(),
            Arc::new(LeadReviewers),
            PipelineConfig::default(),
        )
        .expect("catalog patterns compile");
        (pipeline, outbox)
    }

    pub(super) fn lead() -> AuthenticatedCaller {
        AuthenticatedCaller::new("lead-amara")
    }

    pub(super) fn fellowship(is_stage: bool) -> ActivityDraft {
        ActivityDraft {
            kind: ActivityKind::CallForApplication,
            title: "  Backend engineering fellowship ".to_string(),
            is_stage,
            programme: Some(ProgrammeLink {
                programme_id: ProgrammeId::from("prog-backend-2025"),
                starts_on: NaiveDate::from_ymd_opt(2025, 3, 3).expect("valid"),
                ends_on: NaiveDate::from_ymd_opt(2025, 8, 29).expect("valid"),
            }),
        }
    }

    pub(super) fn custom_fields() -> Vec<FieldDraft> {
        vec![
            FieldDraft::new("motivation", "Why this fellowship?", FieldType::LongAnswer, 0)
                .required(),
            FieldDraft::new("track", "Preferred track", FieldType::SingleAnswer, 1)
                .required()
                .with_options(&[("rust", "Rust services"), ("go", "Go services")]),
            FieldDraft::new("portfolio", "Portfolio links", FieldType::Links, 2),
            FieldDraft::new("cv", "Curriculum vitae", FieldType::FileUpload, 3).with_file(
                FileConstraint {
                    max_count: Some(1),
                    max_size_bytes: Some(2_000_000),
                    allowed_types: vec![".pdf".to_string()],
                },
            ),
        ]
    }

    pub(super) fn contact(first_name: &str) -> ApplicantContact {
        ApplicantContact {
            first_name: first_name.to_string(),
            last_name: "Okafor".to_string(),
            email: format!("{}@fellows.example.org", first_name.to_ascii_lowercase()),
            phone_number: None,
        }
    }
}

mod form_design {
    use super::common::*;
    use applicant_pipeline::error::PipelineError;
    use applicant_pipeline::workflows::applications::{FieldDraft, FieldType, FormKind};

    #[test]
    fn registration_seeds_a_default_form_and_custom_forms_extend_it() {
        let (pipeline, _) = build_pipeline();
        let registration = pipeline
            .register_activity(fellowship(false))
            .expect("activity registers");
        assert_eq!(registration.activity.title, "Backend engineering fellowship");

        let default_view = pipeline
            .get_form_by_type(&registration.default_form.id, FormKind::Default)
            .expect("default form readable");
        let keys: Vec<&str> = default_view
            .fields
            .iter()
            .map(|field| field.key.as_str())
            .collect();
        assert_eq!(
            keys,
            ["first_name", "last_name", "email", "phone_number", "date_of_birth", "gender"]
        );

        let custom = pipeline
            .create_form(&registration.activity.id, FormKind::Custom, custom_fields())
            .expect("custom form valid");
        let extended = pipeline
            .add_field_values(
                &custom.id,
                vec![FieldDraft::new("github", "GitHub profile", FieldType::Links, 4)],
            )
            .expect("field appended");
        assert_eq!(extended.field_ids.len(), 5);

        let view = pipeline
            .get_form_by_type(&custom.id, FormKind::Custom)
            .expect("custom form readable");
        let cv = view
            .fields
            .iter()
            .find(|field| field.key == "cv")
            .expect("cv field present");
        assert_eq!(cv.type_label, FieldType::FileUpload.label());
        assert!(cv.file.is_some());

        assert_eq!(
            pipeline
                .forms_for_activity(&registration.activity.id)
                .expect("forms listed")
                .len(),
            2
        );
    }

    #[test]
    fn a_second_custom_form_is_refused() {
        let (pipeline, _) = build_pipeline();
        let registration = pipeline
            .register_activity(fellowship(false))
            .expect("activity registers");
        pipeline
            .create_form(&registration.activity.id, FormKind::Custom, custom_fields())
            .expect("first custom form");

        assert!(matches!(
            pipeline.create_form(&registration.activity.id, FormKind::Custom, custom_fields()),
            Err(PipelineError::Schema(_))
        ));
    }
}

mod staged_review {
    use super::common::*;
    use applicant_pipeline::error::{ErrorKind, PipelineError};
    use applicant_pipeline::workflows::applications::{
        ApplicantStatus, AuthenticatedCaller, Decision, FormKind, NewApplicant, SubmittedValue,
        ValidationErrorKind,
    };

    fn answers(track: &str) -> Vec<SubmittedValue> {
        vec![
            SubmittedValue::new("motivation", "I maintain a tokio-based job runner."),
            SubmittedValue::new("track", track),
            SubmittedValue::new("portfolio", "https://github.com/chioma"),
            SubmittedValue::new(
                "cv",
                r#"[{"name": "cv.pdf", "size_bytes": 48213, "storage_key": "uploads/cv.pdf"}]"#,
            ),
        ]
    }

    #[test]
    fn applicants_move_from_intake_through_stages_to_graduation() {
        let (pipeline, outbox) = build_pipeline();
        let registration = pipeline
            .register_activity(fellowship(true))
            .expect("activity registers");
        let activity_id = registration.activity.id.clone();
        let stages = pipeline
            .define_stages(
                &activity_id,
                &["Screening".to_string(), "Pairing session".to_string()],
            )
            .expect("stages defined");
        let form = pipeline
            .create_form(&activity_id, FormKind::Custom, custom_fields())
            .expect("custom form valid");

        let applicant = pipeline
            .register_applicant(NewApplicant {
                activity_id: activity_id.clone(),
                form_id: form.id.clone(),
                contact: contact("Chioma"),
            })
            .expect("applicant registers");
        assert_eq!(applicant.status, ApplicantStatus::Pending);

        match pipeline.submit_values(&applicant.id, &form.id, &answers("haskell")) {
            Err(PipelineError::Validation(error)) => {
                assert_eq!(error.kind, ValidationErrorKind::UnknownOption);
                assert_eq!(error.field_key, "track");
            }
            other => panic!("expected validation failure, got {other:?}"),
        }

        let status = pipeline
            .submit_values(&applicant.id, &form.id, &answers("rust"))
            .expect("submission accepted");
        assert_eq!(status.status, ApplicantStatus::InReview);
        assert_eq!(status.current_stage_id, Some(stages[0].id.clone()));
        assert_eq!(status.answered_fields, 4);

        let preview = pipeline
            .preview_answers(&applicant.id)
            .expect("preview readable");
        assert_eq!(preview[1].value.as_deref(), Some("rust"));

        assert_eq!(
            pipeline.advance(&applicant.id).expect("advanced"),
            stages[1].id
        );

        let outsider = AuthenticatedCaller::new("intern-bola");
        assert!(matches!(
            pipeline.decide(&applicant.id, Decision::Approved, &outsider),
            Err(PipelineError::Forbidden(_))
        ));

        let approved = pipeline
            .decide(&applicant.id, Decision::Approved, &lead())
            .expect("approved");
        assert_eq!(approved.status, ApplicantStatus::Approved);
        let snapshot = pipeline
            .approved_applicant(&applicant.id)
            .expect("readable")
            .expect("snapshot recorded");
        assert_eq!(snapshot.programme_id.as_str(), "prog-backend-2025");

        let graduated = pipeline.graduate(&applicant.id).expect("graduated");
        assert_eq!(graduated.status, ApplicantStatus::Graduated);
        assert_eq!(
            outbox.templates(),
            ["applicant_approved", "applicant_graduated"]
        );
    }

    #[test]
    fn bulk_decisions_report_each_applicant() {
        let (pipeline, _) = build_pipeline();
        let registration = pipeline
            .register_activity(fellowship(false))
            .expect("activity registers");
        let form = pipeline
            .create_form(&registration.activity.id, FormKind::Custom, custom_fields())
            .expect("custom form valid");

        let mut ids = Vec::new();
        for (name, submit) in [("Chioma", true), ("Tunde", false), ("Ngozi", true)] {
            let applicant = pipeline
                .register_applicant(NewApplicant {
                    activity_id: registration.activity.id.clone(),
                    form_id: form.id.clone(),
                    contact: contact(name),
                })
                .expect("applicant registers");
            if submit {
                pipeline
                    .submit_values(&applicant.id, &form.id, &answers("go"))
                    .expect("submission accepted");
            }
            ids.push(applicant.id);
        }

        let outcome = pipeline
            .bulk_decide(&ids, "rejected", &lead())
            .expect("batch accepted");

        assert_eq!(outcome.succeeded, vec![ids[0].clone(), ids[2].clone()]);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].applicant_id, ids[1]);
        assert_eq!(outcome.failed[0].kind, ErrorKind::InvalidApplicantStatus);
        assert!(outcome.not_attempted.is_empty());
    }
}
