use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use anyhow::Result;
use chrono::Utc;

use crate::error::RemoteError;
use crate::remote::merge::{self, HistoryMode};
use crate::remote::{
    AggregateBackend, AggregateKey, AggregateSubmission, AggregatedGameRecord, LastThree,
    WizardBackend,
};
use crate::store::json_store::{AGGREGATES_FILE, JsonStore, WIZARD_FILE};
use crate::store::schema::{AggregateTableData, WizardTableData};
use crate::wizard::{AttachmentRef, PendingAttachment, WizardProgress};

#[derive(Default)]
struct Tables {
    records: Vec<AggregatedGameRecord>,
    wizard: BTreeMap<String, WizardProgress>,
    blobs: BTreeMap<String, Vec<u8>>,
}

/// In-process backend. All tables sit behind one mutex, so each upsert is a
/// conditional insert-or-merge that cannot race another writer into a
/// second row for the same key. Optionally persisted through `JsonStore`.
pub struct LocalBackend {
    tables: Mutex<Tables>,
    store: Option<JsonStore>,
    offline: AtomicBool,
}

impl LocalBackend {
    pub fn in_memory() -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            store: None,
            offline: AtomicBool::new(false),
        }
    }

    /// Open a persisted backend, loading existing tables. A corrupt table is
    /// an error rather than a silent reset: this is the system of record.
    pub fn open(store: JsonStore) -> Result<Self> {
        let aggregates: AggregateTableData =
            store.load_strict(AGGREGATES_FILE)?.unwrap_or_default();
        let wizard: WizardTableData = store.load_strict(WIZARD_FILE)?.unwrap_or_default();
        tracing::debug!(
            records = aggregates.records.len(),
            wizard_rows = wizard.progress.len(),
            "opened local backend"
        );
        Ok(Self {
            tables: Mutex::new(Tables {
                records: aggregates.records,
                wizard: wizard.progress,
                blobs: BTreeMap::new(),
            }),
            store: Some(store),
            offline: AtomicBool::new(false),
        })
    }

    /// Make every call fail with a transport error, as an unreachable
    /// server would.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>, RemoteError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(RemoteError::Transport("backend unreachable".into()));
        }
        self.tables
            .lock()
            .map_err(|_| RemoteError::Storage("backend table lock poisoned".into()))
    }

    fn persist_records(&self, records: &[AggregatedGameRecord]) -> Result<(), RemoteError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let data = AggregateTableData {
            records: records.to_vec(),
            ..AggregateTableData::default()
        };
        store
            .save(AGGREGATES_FILE, &data)
            .map_err(|e| RemoteError::Storage(e.to_string()))
    }

    fn persist_wizard(&self, rows: &BTreeMap<String, WizardProgress>) -> Result<(), RemoteError> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let data = WizardTableData {
            progress: rows.clone(),
            ..WizardTableData::default()
        };
        store
            .save(WIZARD_FILE, &data)
            .map_err(|e| RemoteError::Storage(e.to_string()))
    }

    /// Find-or-insert `key` under the held lock, apply `merge_fn`, persist,
    /// then commit. A persistence failure leaves the table unchanged.
    fn upsert_with<F>(
        &self,
        key: &AggregateKey,
        merge_fn: F,
    ) -> Result<AggregatedGameRecord, RemoteError>
    where
        F: FnOnce(Option<&AggregatedGameRecord>) -> AggregatedGameRecord,
    {
        let mut tables = self.lock()?;
        let pos = tables.records.iter().position(|r| &r.key() == key);
        let updated = merge_fn(pos.map(|i| &tables.records[i]));

        let mut next = tables.records.clone();
        match pos {
            Some(i) => next[i] = updated.clone(),
            None => next.push(updated.clone()),
        }
        self.persist_records(&next)?;
        tables.records = next;
        Ok(updated)
    }
}

impl AggregateBackend for LocalBackend {
    fn upsert_aggregate(
        &self,
        submission: &AggregateSubmission,
    ) -> Result<AggregatedGameRecord, RemoteError> {
        let now = Utc::now();
        self.upsert_with(&submission.key(), |existing| {
            merge::merge_submission(existing, submission, HistoryMode::Keep, now)
        })
    }

    fn upsert_aggregate_with_history(
        &self,
        submission: &AggregateSubmission,
    ) -> Result<AggregatedGameRecord, RemoteError> {
        let now = Utc::now();
        self.upsert_with(&submission.key(), |existing| {
            merge::merge_submission(existing, submission, HistoryMode::Shift, now)
        })
    }

    fn get_last_three_scores(
        &self,
        key: &AggregateKey,
        game_mode_id: &str,
    ) -> Result<LastThree, RemoteError> {
        let tables = self.lock()?;
        Ok(tables
            .records
            .iter()
            .find(|r| &r.key() == key && r.has_game_mode(game_mode_id))
            .map(LastThree::from_record)
            .unwrap_or_default())
    }

    fn query_aggregate(
        &self,
        key: &AggregateKey,
    ) -> Result<Option<AggregatedGameRecord>, RemoteError> {
        let tables = self.lock()?;
        Ok(tables
            .records
            .iter()
            .filter(|r| &r.key() == key)
            .max_by_key(|r| r.updated_at)
            .cloned())
    }

    fn query_completed_game_mode_ids(
        &self,
        user_id: &str,
        module_id: &str,
    ) -> Result<Vec<String>, RemoteError> {
        let tables = self.lock()?;
        let mut ids = Vec::new();
        for record in tables
            .records
            .iter()
            .filter(|r| r.user_id == user_id && r.module_id == module_id && r.is_completed)
        {
            merge::union_into(&mut ids, &record.game_mode_ids);
        }
        Ok(ids)
    }

    fn track_game_mode(
        &self,
        key: &AggregateKey,
        game_mode_id: &str,
    ) -> Result<AggregatedGameRecord, RemoteError> {
        let now = Utc::now();
        self.upsert_with(key, |existing| {
            merge::merge_tracked_mode(existing, key, game_mode_id, now)
        })
    }

    fn mark_completed(
        &self,
        key: &AggregateKey,
        game_mode_id: &str,
    ) -> Result<AggregatedGameRecord, RemoteError> {
        let now = Utc::now();
        self.upsert_with(key, |existing| {
            merge::merge_completion(existing, key, game_mode_id, now)
        })
    }

    fn delete_aggregate(
        &self,
        user_id: &str,
        module_id: Option<&str>,
        game_mode_id: Option<&str>,
    ) -> Result<usize, RemoteError> {
        let mut tables = self.lock()?;
        let doomed = |r: &AggregatedGameRecord| {
            r.user_id == user_id
                && module_id.is_none_or(|m| r.module_id == m)
                && game_mode_id.is_none_or(|g| r.has_game_mode(g))
        };
        let next: Vec<AggregatedGameRecord> =
            tables.records.iter().filter(|r| !doomed(*r)).cloned().collect();
        let removed = tables.records.len() - next.len();
        if removed > 0 {
            self.persist_records(&next)?;
            tables.records = next;
        }
        Ok(removed)
    }
}

impl WizardBackend for LocalBackend {
    fn load_progress(&self, user_id: &str) -> Result<Option<WizardProgress>, RemoteError> {
        let tables = self.lock()?;
        Ok(tables.wizard.get(user_id).cloned())
    }

    fn save_progress(&self, progress: &WizardProgress) -> Result<WizardProgress, RemoteError> {
        let mut tables = self.lock()?;
        let mut saved = progress.clone();
        // Creation time belongs to the first save of the row.
        if let Some(existing) = tables.wizard.get(&progress.user_id) {
            saved.created_at = existing.created_at;
        }
        let mut next = tables.wizard.clone();
        next.insert(saved.user_id.clone(), saved.clone());
        self.persist_wizard(&next)?;
        tables.wizard = next;
        Ok(saved)
    }

    fn upload_attachment(
        &self,
        user_id: &str,
        file: &PendingAttachment,
    ) -> Result<AttachmentRef, RemoteError> {
        let mut tables = self.lock()?;
        let storage_path = format!("attachments/{user_id}/{}", file.file_name);
        match &self.store {
            Some(store) => {
                store
                    .write_blob(&storage_path, &file.bytes)
                    .map_err(|e| RemoteError::Storage(e.to_string()))?;
            }
            None => {
                tables.blobs.insert(storage_path.clone(), file.bytes.clone());
            }
        }
        Ok(AttachmentRef {
            file_name: file.file_name.clone(),
            storage_path,
            content_type: file.content_type.clone(),
            size_bytes: file.size(),
            uploaded_at: Utc::now(),
        })
    }
}
