//! Design history archive
//!
//! Each entry freezes the parameters, the reconciliation result exactly as
//! the service produced it, and the edited solutions at the time of saving.

use crate::params::{AcousticParams, Scenario};
use crate::reconcile::{ReconciliationResult, Solution};
use crate::store::{JsonFileStore, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

const HISTORY_FILE: &str = "history.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    #[default]
    Completed,
    /// Generation returned no usable solutions
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub name: String,
    pub saved_at: DateTime<Utc>,
    #[serde(default)]
    pub status: EntryStatus,
    pub scenario: Scenario,
    pub params: AcousticParams,
    /// What the service said, untouched
    pub result: ReconciliationResult,
    /// The solutions as the designer left them
    pub solutions: Vec<Solution>,
}

impl HistoryEntry {
    pub fn total_units(&self) -> u64 {
        self.solutions.iter().map(Solution::unit_count).sum()
    }
}

pub struct HistoryStore {
    store: JsonFileStore,
}

impl HistoryStore {
    pub fn open(data_dir: &Path) -> Self {
        Self {
            store: JsonFileStore::new(data_dir.join(HISTORY_FILE)),
        }
    }

    /// Insert or replace the entry with the same id
    pub fn save(&self, entry: HistoryEntry) -> StoreResult<()> {
        if entry.name.trim().is_empty() {
            return Err(StoreError::InvalidInput("project name cannot be empty".into()));
        }
        self.store.update(|entries: &mut Vec<HistoryEntry>| {
            tracing::info!(id = %entry.id, name = %entry.name, "archiving design");
            match entries.iter_mut().find(|existing| existing.id == entry.id) {
                Some(existing) => *existing = entry,
                None => entries.push(entry),
            }
            Ok(())
        })
    }

    pub fn get(&self, id: Uuid) -> StoreResult<HistoryEntry> {
        let entries: Vec<HistoryEntry> = self.store.load()?;
        entries
            .into_iter()
            .find(|entry| entry.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("history entry {}", id)))
    }

    /// All entries, newest first
    pub fn list(&self) -> StoreResult<Vec<HistoryEntry>> {
        let mut entries: Vec<HistoryEntry> = self.store.load()?;
        entries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        Ok(entries)
    }

    pub fn delete(&self, id: Uuid) -> StoreResult<HistoryEntry> {
        self.store.update(|entries: &mut Vec<HistoryEntry>| {
            let index = entries
                .iter()
                .position(|entry| entry.id == id)
                .ok_or_else(|| StoreError::NotFound(format!("history entry {}", id)))?;
            Ok(entries.remove(index))
        })
    }
}
