use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use super::domain::{
    Activity, ActivityId, ApplicantDetail, ApplicantDetailId, ApplicantStatus, Stage, StageId,
};
use super::locks::SchemaLocks;
use super::repository::PipelineRepository;
use super::schema::SchemaError;
use crate::error::{EntityKind, PipelineError};

/// Ordered review checkpoints of a staged call for application.
pub struct StagePipeline<R> {
    repository: Arc<R>,
    locks: Arc<SchemaLocks>,
}

impl<R> StagePipeline<R>
where
    R: PipelineRepository + 'static,
{
    pub fn new(repository: Arc<R>, locks: Arc<SchemaLocks>) -> Self {
        Self { repository, locks }
    }

    /// Create the pipeline once, with contiguous indices starting at zero.
    pub fn define_stages(
        &self,
        activity_id: &ActivityId,
        names: &[String],
    ) -> Result<Vec<Stage>, PipelineError> {
        let activity = self.activity(activity_id)?;
        if !activity.runs_stages() {
            return Err(SchemaError::NotStaged {
                activity_id: activity_id.clone(),
            }
            .into());
        }
        if names.is_empty() {
            return Err(SchemaError::NoStages.into());
        }

        let mut seen = HashSet::new();
        for name in names {
            let name = name.trim();
            if name.is_empty() || !seen.insert(name.to_lowercase()) {
                return Err(SchemaError::InvalidStageName {
                    name: name.to_string(),
                }
                .into());
            }
        }

        let define = || -> Result<Vec<Stage>, PipelineError> {
            if !self.repository.stages(activity_id)?.is_empty() {
                return Err(SchemaError::StagesAlreadyDefined {
                    activity_id: activity_id.clone(),
                }
                .into());
            }

            let stages: Vec<Stage> = names
                .iter()
                .zip(0u32..)
                .map(|(name, index)| Stage {
                    id: StageId::generate(),
                    activity_id: activity_id.clone(),
                    name: name.trim().to_string(),
                    index,
                })
                .collect();

            let mut transaction = self.repository.begin()?;
            for stage in &stages {
                transaction.insert_stage(stage.clone())?;
            }
            transaction.commit()?;
            Ok(stages)
        };
        let stages = self.locks.with_activity(activity_id, define)?;

        info!(activity_id = %activity_id, stages = stages.len(), "stage pipeline defined");
        Ok(stages)
    }

    pub fn stages(&self, activity_id: &ActivityId) -> Result<Vec<Stage>, PipelineError> {
        self.activity(activity_id)?;
        self.ordered_stages(activity_id)
    }

    /// Move to the next stage; an applicant not yet staged lands on the first one.
    pub fn advance(&self, applicant_id: &ApplicantDetailId) -> Result<StageId, PipelineError> {
        let detail = self.reviewable(applicant_id)?;
        let stages = self.ordered_stages(&detail.activity_id)?;
        let no_pipeline = || PipelineError::InvalidStageTransition {
            applicant_id: detail.id.clone(),
            activity_id: detail.activity_id.clone(),
            stage_id: detail.current_stage_id.clone(),
        };

        let next = match &detail.current_stage_id {
            None => stages.first().ok_or_else(no_pipeline)?,
            Some(current) => {
                let position = stages
                    .iter()
                    .position(|stage| &stage.id == current)
                    .ok_or_else(no_pipeline)?;
                stages
                    .get(position + 1)
                    .ok_or_else(|| PipelineError::StageNotFound {
                        applicant_id: detail.id.clone(),
                        stage_id: current.clone(),
                    })?
            }
        };

        let next_id = next.id.clone();
        self.place(&detail, next)?;
        Ok(next_id)
    }

    /// Jump directly to `stage_id`, which must belong to the applicant's activity.
    pub fn assign_stage(
        &self,
        applicant_id: &ApplicantDetailId,
        stage_id: &StageId,
    ) -> Result<ApplicantDetail, PipelineError> {
        let detail = self.reviewable(applicant_id)?;
        let stage = self
            .repository
            .stage(stage_id)?
            .filter(|stage| stage.activity_id == detail.activity_id)
            .ok_or_else(|| PipelineError::InvalidStageTransition {
                applicant_id: detail.id.clone(),
                activity_id: detail.activity_id.clone(),
                stage_id: Some(stage_id.clone()),
            })?;

        if detail.current_stage_id.as_ref() == Some(&stage.id) {
            return Ok(detail);
        }
        self.place(&detail, &stage)
    }

    fn place(
        &self,
        detail: &ApplicantDetail,
        stage: &Stage,
    ) -> Result<ApplicantDetail, PipelineError> {
        let mut updated = detail.next_revision();
        updated.current_stage_id = Some(stage.id.clone());

        let mut transaction = self.repository.begin()?;
        transaction.update_applicant(updated.clone(), detail.version)?;
        transaction
            .commit()
            .map_err(|error| PipelineError::from_applicant_write(error, &detail.id))?;

        info!(
            applicant_id = %detail.id,
            stage_id = %stage.id,
            stage_index = stage.index,
            "applicant moved to stage"
        );
        Ok(updated)
    }

    fn reviewable(
        &self,
        applicant_id: &ApplicantDetailId,
    ) -> Result<ApplicantDetail, PipelineError> {
        let detail = self
            .repository
            .applicant(applicant_id)?
            .ok_or_else(|| PipelineError::not_found(EntityKind::Applicant, applicant_id))?;
        if detail.status != ApplicantStatus::InReview {
            return Err(PipelineError::InvalidApplicantStatus {
                applicant_id: detail.id,
                current: detail.status,
                requested: ApplicantStatus::InReview,
            });
        }
        Ok(detail)
    }

    fn activity(&self, activity_id: &ActivityId) -> Result<Activity, PipelineError> {
        self.repository
            .activity(activity_id)?
            .ok_or_else(|| PipelineError::not_found(EntityKind::Activity, activity_id))
    }

    fn ordered_stages(&self, activity_id: &ActivityId) -> Result<Vec<Stage>, PipelineError> {
        let mut stages = self.repository.stages(activity_id)?;
        stages.sort_by_key(|stage| stage.index);
        Ok(stages)
    }
}
