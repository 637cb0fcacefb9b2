//! Equipment catalog
//!
//! CRUD over the equipment records designers pick from. Accessories (e.g.
//! line-array rigging) reference their main unit through `parent_id` and are
//! listed directly under it.

use crate::store::{JsonFileStore, StoreError, StoreResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::Path;

const CATALOG_FILE: &str = "catalog.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    #[default]
    Speaker,
    Amplifier,
    Peripheral,
    Other,
}

impl TableKind {
    pub fn label(&self) -> &'static str {
        match self {
            TableKind::Speaker => "音箱",
            TableKind::Amplifier => "功放",
            TableKind::Peripheral => "周边设备",
            TableKind::Other => "其他设备",
        }
    }
}

impl std::str::FromStr for TableKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "speaker" | "音箱" => Ok(TableKind::Speaker),
            "amplifier" | "功放" => Ok(TableKind::Amplifier),
            "peripheral" | "周边设备" => Ok(TableKind::Peripheral),
            "other" | "其他设备" => Ok(TableKind::Other),
            other => Err(format!("unknown catalog table: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogRecord {
    #[serde(default)]
    pub id: u64,
    #[serde(default)]
    pub table: TableKind,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub category: String,
    /// Intended uses, e.g. "会议室", "报告厅"
    #[serde(default)]
    pub purposes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Main unit this record is an accessory of
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<u64>,
    /// Numeric and free-form specs (power, sensitivity, price, ...)
    #[serde(default)]
    pub specs: BTreeMap<String, serde_json::Value>,
}

/// Partial update; `None` fields keep their stored value
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct CatalogPatch {
    pub table: Option<TableKind>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub category: Option<String>,
    pub purposes: Option<Vec<String>>,
    pub description: Option<String>,
    pub parent_id: Option<u64>,
    pub specs: BTreeMap<String, serde_json::Value>,
}

/// A record as shown in a bundled listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogRow {
    #[serde(flatten)]
    pub record: CatalogRecord,
    pub is_child: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default)]
pub struct CatalogFilter {
    pub table: Option<TableKind>,
    pub brand: Option<String>,
    /// Only applied to the speaker table
    pub purpose: Option<String>,
    pub sort: Option<(String, SortDirection)>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogDocument {
    next_id: u64,
    records: Vec<CatalogRecord>,
}

impl CatalogDocument {
    fn position(&self, id: u64) -> StoreResult<usize> {
        self.records
            .iter()
            .position(|record| record.id == id)
            .ok_or_else(|| StoreError::NotFound(format!("catalog record {}", id)))
    }

    /// Accessories hang directly off a main unit: the parent must exist and
    /// be top-level, and a record that has accessories cannot become one.
    fn check_parent(&self, parent: u64, child: Option<u64>) -> StoreResult<()> {
        if child == Some(parent) {
            return Err(StoreError::InvalidInput(
                "a record cannot be its own accessory".into(),
            ));
        }
        let index = self.position(parent)?;
        if self.records[index].parent_id.is_some() {
            return Err(StoreError::InvalidInput(format!(
                "record {} is itself an accessory and cannot have accessories",
                parent
            )));
        }
        if let Some(child) = child {
            if self.records.iter().any(|r| r.parent_id == Some(child)) {
                return Err(StoreError::InvalidInput(format!(
                    "record {} has accessories and cannot become one",
                    child
                )));
            }
        }
        Ok(())
    }
}

pub struct CatalogStore {
    store: JsonFileStore,
}

impl CatalogStore {
    pub fn open(data_dir: &Path) -> Self {
        Self {
            store: JsonFileStore::new(data_dir.join(CATALOG_FILE)),
        }
    }

    /// Insert a record, assigning a fresh id. Returns the stored record.
    pub fn create(&self, mut record: CatalogRecord) -> StoreResult<CatalogRecord> {
        if record.model.trim().is_empty() {
            return Err(StoreError::InvalidInput("model cannot be empty".into()));
        }
        self.store.update(|doc: &mut CatalogDocument| {
            if let Some(parent) = record.parent_id {
                doc.check_parent(parent, None)?;
            }
            doc.next_id = doc.next_id.max(1);
            record.id = doc.next_id;
            doc.next_id += 1;
            doc.records.push(record.clone());
            tracing::info!(id = record.id, model = %record.model, "catalog record created");
            Ok(record)
        })
    }

    pub fn get(&self, id: u64) -> StoreResult<CatalogRecord> {
        let doc: CatalogDocument = self.store.load()?;
        let index = doc.position(id)?;
        Ok(doc.records[index].clone())
    }

    pub fn list(&self, table: Option<TableKind>) -> StoreResult<Vec<CatalogRecord>> {
        let doc: CatalogDocument = self.store.load()?;
        Ok(doc
            .records
            .into_iter()
            .filter(|record| table.is_none_or(|t| record.table == t))
            .collect())
    }

    /// Apply `patch` to the stored record. Spec keys are merged; the id
    /// never changes.
    pub fn update(&self, id: u64, patch: CatalogPatch) -> StoreResult<CatalogRecord> {
        self.store.update(|doc: &mut CatalogDocument| {
            let index = doc.position(id)?;
            if let Some(parent) = patch.parent_id {
                doc.check_parent(parent, Some(id))?;
            }
            let record = &mut doc.records[index];

            if let Some(table) = patch.table {
                record.table = table;
            }
            merge_text(&mut record.brand, patch.brand);
            merge_text(&mut record.model, patch.model);
            merge_text(&mut record.category, patch.category);
            if let Some(purposes) = patch.purposes {
                record.purposes = purposes;
            }
            if patch.description.is_some() {
                record.description = patch.description;
            }
            if patch.parent_id.is_some() {
                record.parent_id = patch.parent_id;
            }
            record.specs.extend(patch.specs);
            Ok(record.clone())
        })
    }

    /// Remove a record. Its accessories are kept and become top-level.
    pub fn delete(&self, id: u64) -> StoreResult<CatalogRecord> {
        self.store.update(|doc: &mut CatalogDocument| {
            let index = doc.position(id)?;
            let removed = doc.records.remove(index);
            for child in doc
                .records
                .iter_mut()
                .filter(|record| record.parent_id == Some(id))
            {
                child.parent_id = None;
            }
            tracing::info!(id, "catalog record deleted");
            Ok(removed)
        })
    }

    pub fn bundled(&self, table: TableKind) -> StoreResult<Vec<CatalogRow>> {
        Ok(bundle(self.list(Some(table))?))
    }

    pub fn search(&self, filter: &CatalogFilter) -> StoreResult<Vec<CatalogRecord>> {
        Ok(apply_filter(self.list(filter.table)?, filter))
    }
}

fn merge_text(target: &mut String, value: Option<String>) {
    if let Some(value) = value.filter(|v| !v.trim().is_empty()) {
        *target = value;
    }
}

/// Top-level records in stored order, each followed by its accessories.
/// Accessories whose parent is not in `records` are dropped from the view.
fn bundle(records: Vec<CatalogRecord>) -> Vec<CatalogRow> {
    let (parents, children): (Vec<_>, Vec<_>) = records
        .into_iter()
        .partition(|record| record.parent_id.is_none());

    let mut rows = Vec::with_capacity(parents.len() + children.len());
    for parent in parents {
        let parent_id = parent.id;
        rows.push(CatalogRow {
            record: parent,
            is_child: false,
        });
        rows.extend(
            children
                .iter()
                .filter(|child| child.parent_id == Some(parent_id))
                .cloned()
                .map(|record| CatalogRow {
                    record,
                    is_child: true,
                }),
        );
    }
    rows
}

fn apply_filter(records: Vec<CatalogRecord>, filter: &CatalogFilter) -> Vec<CatalogRecord> {
    let brand = filter
        .brand
        .as_deref()
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_lowercase);

    let mut out: Vec<CatalogRecord> = records
        .into_iter()
        .filter(|record| {
            brand
                .as_ref()
                .is_none_or(|b| record.brand.to_lowercase().contains(b.as_str()))
        })
        .filter(|record| match filter.purpose.as_deref() {
            Some(purpose) if record.table == TableKind::Speaker && !purpose.is_empty() => {
                record.purposes.iter().any(|p| p == purpose)
            }
            _ => true,
        })
        .collect();

    if let Some((key, direction)) = &filter.sort {
        out.sort_by(|a, b| {
            let ordering = spec_number(a, key)
                .partial_cmp(&spec_number(b, key))
                .unwrap_or(Ordering::Equal);
            match direction {
                SortDirection::Asc => ordering,
                SortDirection::Desc => ordering.reverse(),
            }
        });
    }
    out
}

/// Numeric value of a spec; missing or non-numeric values count as 0
fn spec_number(record: &CatalogRecord, key: &str) -> f64 {
    match record.specs.get(key) {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}
