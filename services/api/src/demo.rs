use applicant_pipeline::config::PipelineConfig;
use applicant_pipeline::workflows::applications::{
    ActivityDraft, ActivityKind, ApplicantContact, AuthenticatedCaller, FieldDraft, FieldType,
    FileConstraint, FormKind, NewApplicant, ProgrammeId, ProgrammeLink, SubmittedValue,
};
use chrono::{Duration, Local, NaiveDate};
use clap::Args;

use crate::error::AppError;
use crate::infra::build_pipeline;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Programme start date (YYYY-MM-DD). Defaults to today.
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) programme_start: Option<NaiveDate>,
    /// Reporting date used for the programme status (defaults to today).
    #[arg(long, value_parser = crate::infra::parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Reviewer recorded on decisions.
    #[arg(long, default_value = "demo-reviewer")]
    pub(crate) reviewer: String,
    /// Print the bulk outcome as JSON.
    #[arg(long)]
    pub(crate) json: bool,
}

const APPLICANTS: [(&str, &str, &str); 3] = [
    ("Chioma", "rust", "https://github.com/chioma"),
    ("Tunde", "go", "not a link"),
    ("Ngozi", "rust", "https://gitlab.com/ngozi"),
];

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let DemoArgs {
        programme_start,
        today,
        reviewer,
        json,
    } = args;

    let today = today.unwrap_or_else(|| Local::now().date_naive());
    let starts_on = programme_start.unwrap_or(today);
    let programme = ProgrammeLink {
        programme_id: ProgrammeId::from("prog-demo"),
        starts_on,
        ends_on: starts_on + Duration::weeks(12),
    };
    let caller = AuthenticatedCaller::new(&reviewer);
    let pipeline = build_pipeline(PipelineConfig::default())?;

    println!("Applicant pipeline demo");
    let registration = pipeline.register_activity(ActivityDraft {
        kind: ActivityKind::CallForApplication,
        title: "Platform engineering fellowship".to_string(),
        is_stage: true,
        programme: Some(programme.clone()),
    })?;
    let activity = registration.activity;
    println!(
        "- Activity {} \"{}\" | programme {} ({:?} on {})",
        activity.id,
        activity.title,
        programme.programme_id,
        programme.status(today),
        today
    );

    let stages = pipeline.define_stages(
        &activity.id,
        &["Screening".to_string(), "Technical interview".to_string()],
    )?;
    let stage_names: Vec<&str> = stages.iter().map(|stage| stage.name.as_str()).collect();
    println!("- Review stages: {}", stage_names.join(" -> "));

    let form = pipeline.create_form(&activity.id, FormKind::Custom, demo_fields())?;
    let view = pipeline.get_form_by_type(&form.id, FormKind::Custom)?;
    println!("- Custom form {} with {} fields:", form.id, view.fields.len());
    for field in &view.fields {
        let file_note = if field.file.is_some() {
            " [file limits shown]"
        } else {
            ""
        };
        println!(
            "    {}. {} ({}{}){}",
            field.index,
            field.label,
            field.type_label,
            if field.required { ", required" } else { "" },
            file_note
        );
    }

    println!("\nIntake");
    let mut in_review = Vec::new();
    for (first_name, track, portfolio) in APPLICANTS {
        let applicant = pipeline.register_applicant(NewApplicant {
            activity_id: activity.id.clone(),
            form_id: form.id.clone(),
            contact: ApplicantContact {
                first_name: first_name.to_string(),
                last_name: "Demo".to_string(),
                email: format!("{}@example.org", first_name.to_ascii_lowercase()),
                phone_number: None,
            },
        })?;

        let answers = [
            SubmittedValue::new("motivation", "I want to build reliable infrastructure."),
            SubmittedValue::new("track", track),
            SubmittedValue::new("portfolio", portfolio),
        ];
        match pipeline.submit_values(&applicant.id, &form.id, &answers) {
            Ok(status) => {
                println!(
                    "- {} -> {} ({} answers)",
                    first_name, status.status_label, status.answered_fields
                );
                in_review.push(applicant.id);
            }
            Err(err) => println!("- {} -> rejected: {}", first_name, err),
        }
    }

    if let Some(first) = in_review.first() {
        let stage_id = pipeline.advance(first)?;
        println!("- Advanced {} to stage {}", first, stage_id);
    }

    println!("\nBulk approval by {}", caller.user_id);
    let outcome = pipeline.bulk_decide(&in_review, "approved", &caller)?;
    if json {
        match serde_json::to_string_pretty(&outcome) {
            Ok(payload) => println!("{}", payload),
            Err(err) => println!("  Outcome payload unavailable: {}", err),
        }
    } else {
        println!(
            "- {} approved | {} failed | {} not attempted",
            outcome.succeeded.len(),
            outcome.failed.len(),
            outcome.not_attempted.len()
        );
        for failure in &outcome.failed {
            println!(
                "    {}: {} ({})",
                failure.applicant_id,
                failure.message,
                failure.kind.label()
            );
        }
    }

    for applicant_id in &outcome.succeeded {
        if let Some(snapshot) = pipeline.approved_applicant(applicant_id)? {
            println!(
                "- {} enrolled in {} (approved by {})",
                snapshot.contact.full_name(),
                snapshot.programme_id,
                snapshot.approved_by
            );
        }
    }

    Ok(())
}

fn demo_fields() -> Vec<FieldDraft> {
    let cv = FieldDraft::new("cv", "Curriculum vitae", FieldType::FileUpload, 3).with_file(
        FileConstraint {
            max_count: Some(1),
            max_size_bytes: Some(2_000_000),
            allowed_types: vec![".pdf".to_string()],
        },
    );
    let photo = FieldDraft::new("photo", "Profile photo", FieldType::FileUpload, 4)
        .with_file(FileConstraint::default());

    vec![
        FieldDraft::new("motivation", "Motivation", FieldType::LongAnswer, 0).required(),
        FieldDraft::new("track", "Preferred track", FieldType::Select, 1)
            .required()
            .with_options(&[("rust", "Rust services"), ("go", "Go services")]),
        FieldDraft::new("portfolio", "Portfolio links", FieldType::Links, 2),
        cv,
        photo,
    ]
}
