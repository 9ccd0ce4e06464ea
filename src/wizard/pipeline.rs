use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::Config;
use crate::error::{ProgressError, ProgressResult};
use crate::remote::WizardBackend;
use crate::service::Identity;
use crate::store::json_store::{JsonStore, WIZARD_MIRROR_FILE};
use crate::store::schema::WizardTableData;
use crate::wizard::stages::{self, FIRST_STAGE, LAST_STAGE, StageKind};
use crate::wizard::{AttachmentRef, PendingAttachment, WizardProgress};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WizardView {
    Stage(u8),
    Completed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_bytes: u64,
    pub max_attempts: u32,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024,
            max_attempts: 3,
        }
    }
}

impl From<&Config> for UploadLimits {
    fn from(config: &Config) -> Self {
        Self {
            max_bytes: config.upload_max_bytes,
            max_attempts: config.upload_max_attempts,
        }
    }
}

/// Ten-stage form that saves after every stage and resumes where the user
/// left off.
pub struct WizardPipeline {
    backend: Arc<dyn WizardBackend>,
    identity: Identity,
    limits: UploadLimits,
    mirror: Option<JsonStore>,
    answers: BTreeMap<String, String>,
    current_stage: u8,
    completed_stages: BTreeSet<u8>,
    is_completed: bool,
    attachment: Option<AttachmentRef>,
    pending_attachment: Option<PendingAttachment>,
    upload_attempts: u32,
    created_at: DateTime<Utc>,
    restored_from_mirror: bool,
}

impl WizardPipeline {
    /// Load saved progress for the user, or start at stage 1. If the backend
    /// cannot be read, the local mirror is used for display.
    pub fn resume(
        backend: Arc<dyn WizardBackend>,
        identity: Option<&Identity>,
        limits: UploadLimits,
        mirror: Option<JsonStore>,
    ) -> ProgressResult<Self> {
        let identity = identity.ok_or(ProgressError::NotAuthenticated)?.clone();
        let (saved, restored_from_mirror) = match backend.load_progress(&identity.user_id) {
            Ok(saved) => (saved, false),
            Err(e) => {
                let mirrored = mirror.as_ref().and_then(|m| {
                    let table: WizardTableData = m.load(WIZARD_MIRROR_FILE);
                    table.progress.get(&identity.user_id).cloned()
                });
                match mirrored {
                    Some(p) => {
                        tracing::warn!(
                            error = %e,
                            "wizard backend unreachable, showing local copy"
                        );
                        (Some(p), true)
                    }
                    None => return Err(e.into()),
                }
            }
        };

        let mut pipeline = Self {
            backend,
            identity,
            limits,
            mirror,
            answers: BTreeMap::new(),
            current_stage: FIRST_STAGE,
            completed_stages: BTreeSet::new(),
            is_completed: false,
            attachment: None,
            pending_attachment: None,
            upload_attempts: 0,
            created_at: Utc::now(),
            restored_from_mirror,
        };
        if let Some(saved) = saved {
            pipeline.answers = saved.answers;
            pipeline.current_stage = saved.current_stage.clamp(FIRST_STAGE, LAST_STAGE);
            pipeline.completed_stages = saved.completed_stages.into_iter().collect();
            pipeline.is_completed = saved.is_completed;
            pipeline.attachment = saved.attachment;
            pipeline.created_at = saved.created_at;
        }
        Ok(pipeline)
    }

    pub fn view(&self) -> WizardView {
        if self.is_completed {
            WizardView::Completed
        } else {
            WizardView::Stage(self.current_stage)
        }
    }

    pub fn current_stage(&self) -> u8 {
        self.current_stage
    }

    pub fn answers(&self) -> &BTreeMap<String, String> {
        &self.answers
    }

    pub fn attachment(&self) -> Option<&AttachmentRef> {
        self.attachment.as_ref()
    }

    pub fn restored_from_mirror(&self) -> bool {
        self.restored_from_mirror
    }

    pub fn progress_percentage(&self) -> f64 {
        let completed: Vec<u8> = self.completed_stages.iter().copied().collect();
        stages::progress_percentage(&completed)
    }

    pub fn upload_attempts_remaining(&self) -> u32 {
        self.limits.max_attempts.saturating_sub(self.upload_attempts)
    }

    pub fn set_field(&mut self, field: &str, value: &str) -> ProgressResult<()> {
        if self.is_completed {
            return Err(ProgressError::ValidationFailed(
                "wizard is already completed".into(),
            ));
        }
        if stages::stage_for_field(field).is_none() {
            return Err(ProgressError::ValidationFailed(format!(
                "unknown field {field}"
            )));
        }
        self.answers.insert(field.to_string(), value.to_string());
        Ok(())
    }

    /// Queue a file for upload on the next transition out of the
    /// attachment stage. Rejected files leave no state behind.
    pub fn attach(&mut self, file: PendingAttachment) -> ProgressResult<()> {
        file.validate(self.limits.max_bytes)?;
        self.pending_attachment = Some(file);
        self.upload_attempts = 0;
        Ok(())
    }

    pub fn can_proceed(&self) -> bool {
        !self.is_completed
            && stages::stage(self.current_stage)
                .map(|s| s.is_satisfied(&self.answers))
                .unwrap_or(false)
    }

    pub fn go_back(&mut self) -> WizardView {
        if !self.is_completed && self.current_stage > FIRST_STAGE {
            self.current_stage -= 1;
        }
        self.view()
    }

    /// Save the current stage and move on. Nothing advances unless the
    /// upload (if any) and the save both succeed.
    pub fn proceed(&mut self) -> ProgressResult<WizardView> {
        if self.is_completed {
            return Ok(WizardView::Completed);
        }
        let stage = stages::stage(self.current_stage).ok_or_else(|| {
            ProgressError::ValidationFailed(format!("no stage {}", self.current_stage))
        })?;
        if !stage.is_satisfied(&self.answers) {
            return Err(ProgressError::ValidationFailed(format!(
                "stage {} ({}) is incomplete",
                stage.number, stage.title
            )));
        }

        if stage.kind == StageKind::Attachment {
            self.upload_pending()?;
        }

        let mut completed = self.completed_stages.clone();
        completed.insert(self.current_stage);
        let completed_vec: Vec<u8> = completed.iter().copied().collect();
        let terminal = self.current_stage == LAST_STAGE;
        let next_stage = if terminal {
            self.current_stage
        } else {
            self.current_stage + 1
        };

        let snapshot = WizardProgress {
            user_id: self.identity.user_id.clone(),
            email: self.identity.email.clone(),
            answers: self.answers.clone(),
            current_stage: next_stage,
            progress_percentage: stages::progress_percentage(&completed_vec),
            completed_stages: completed_vec,
            is_completed: terminal,
            attachment: self.attachment.clone(),
            created_at: self.created_at,
            updated_at: Utc::now(),
        };
        let saved = self.backend.save_progress(&snapshot).map_err(|e| {
            tracing::error!(error = %e, stage = stage.number, "wizard save failed");
            ProgressError::from(e)
        })?;

        self.completed_stages = completed;
        self.current_stage = next_stage;
        self.is_completed = terminal;
        self.created_at = saved.created_at;
        self.restored_from_mirror = false;
        self.write_mirror(&saved);
        tracing::info!(stage = stage.number, completed = terminal, "wizard stage saved");
        Ok(self.view())
    }

    fn upload_pending(&mut self) -> ProgressResult<()> {
        let Some(file) = &self.pending_attachment else {
            return Ok(());
        };
        if self.upload_attempts >= self.limits.max_attempts {
            return Err(ProgressError::UploadFailed(format!(
                "gave up after {} attempts; choose the file again to retry",
                self.upload_attempts
            )));
        }
        match self.backend.upload_attachment(&self.identity.user_id, file) {
            Ok(attachment) => {
                self.attachment = Some(attachment);
                self.pending_attachment = None;
                self.upload_attempts = 0;
                Ok(())
            }
            Err(e) => {
                self.upload_attempts += 1;
                tracing::warn!(
                    error = %e,
                    attempt = self.upload_attempts,
                    "attachment upload failed"
                );
                Err(ProgressError::UploadFailed(e.to_string()))
            }
        }
    }

    fn write_mirror(&self, saved: &WizardProgress) {
        let Some(mirror) = &self.mirror else {
            return;
        };
        let mut table: WizardTableData = mirror.load(WIZARD_MIRROR_FILE);
        table.progress.insert(saved.user_id.clone(), saved.clone());
        if let Err(e) = mirror.save(WIZARD_MIRROR_FILE, &table) {
            tracing::warn!(error = %e, "could not write wizard mirror");
        }
    }
}
