use crate::session::result::{PlacementResult, PlacementScope};
use crate::store::json_store::{JsonStore, LEDGER_FILE};
use crate::store::schema::PlacementLedgerData;

/// Local record of term placements, at most one per term per scope.
///
/// Best-effort cache: the in-memory copy is authoritative for the running
/// session and every write is flushed to disk when a store is attached.
/// Disk failures are logged and otherwise ignored.
pub struct PlacementLedger {
    data: PlacementLedgerData,
    store: Option<JsonStore>,
}

impl PlacementLedger {
    pub fn new(store: Option<JsonStore>) -> Self {
        let data = match &store {
            Some(s) => {
                let loaded: PlacementLedgerData = s.load(LEDGER_FILE);
                if loaded.needs_reset() {
                    tracing::warn!(
                        found = loaded.schema_version,
                        "placement ledger schema changed, starting empty"
                    );
                    PlacementLedgerData::default()
                } else {
                    loaded
                }
            }
            None => PlacementLedgerData::default(),
        };
        Self { data, store }
    }

    pub fn in_memory() -> Self {
        Self::new(None)
    }

    /// Insert or supersede the record for this term.
    pub fn record(&mut self, result: PlacementResult) {
        let entries = self
            .data
            .placements
            .entry(result.scope().storage_key())
            .or_default();
        match entries.iter_mut().find(|p| p.term_id == result.term_id) {
            Some(existing) => *existing = result,
            None => entries.push(result),
        }
        self.flush();
    }

    pub fn list(&self, scope: &PlacementScope) -> Vec<PlacementResult> {
        self.data
            .placements
            .get(&scope.storage_key())
            .cloned()
            .unwrap_or_default()
    }

    pub fn clear(&mut self, scope: &PlacementScope) {
        if self.data.placements.remove(&scope.storage_key()).is_some() {
            self.flush();
        }
    }

    pub fn clear_all(&mut self) {
        self.data.placements.clear();
        self.flush();
    }

    fn flush(&self) {
        if let Some(store) = &self.store
            && let Err(e) = store.save(LEDGER_FILE, &self.data)
        {
            tracing::warn!(error = %e, "could not persist placement ledger");
        }
    }
}
