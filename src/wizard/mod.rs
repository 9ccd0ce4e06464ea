pub mod pipeline;
pub mod stages;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ProgressError;

pub use pipeline::{WizardPipeline, WizardView};

const ALLOWED_EXTENSIONS: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("docx", "application/vnd.openxmlformats-officedocument.wordprocessingml.document"),
    ("txt", "text/plain"),
];

/// Saved wizard state, one row per user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WizardProgress {
    pub user_id: String,
    pub email: String,
    /// Free-text answers keyed by field name.
    pub answers: BTreeMap<String, String>,
    pub current_stage: u8,
    pub completed_stages: Vec<u8>,
    pub is_completed: bool,
    pub progress_percentage: f64,
    #[serde(default)]
    pub attachment: Option<AttachmentRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Where an uploaded attachment ended up.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
    pub file_name: String,
    pub storage_path: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,
}

/// A file chosen by the user but not uploaded yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingAttachment {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl PendingAttachment {
    pub fn new(file_name: &str, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.to_string(),
            content_type: content_type_for(file_name)
                .unwrap_or("application/octet-stream")
                .to_string(),
            bytes,
        }
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        Ok(Self::new(&file_name, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Type and size checks, run before anything touches the network.
    pub fn validate(&self, max_bytes: u64) -> Result<(), ProgressError> {
        if self.file_name.trim().is_empty() {
            return Err(ProgressError::ValidationFailed("file has no name".into()));
        }
        if content_type_for(&self.file_name).is_none() {
            return Err(ProgressError::ValidationFailed(format!(
                "unsupported file type: {}",
                self.file_name
            )));
        }
        if self.bytes.is_empty() {
            return Err(ProgressError::ValidationFailed("file is empty".into()));
        }
        if self.size() > max_bytes {
            return Err(ProgressError::ValidationFailed(format!(
                "file is {} bytes, limit is {max_bytes}",
                self.size()
            )));
        }
        Ok(())
    }
}

fn content_type_for(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    ALLOWED_EXTENSIONS
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, ct)| *ct)
}
