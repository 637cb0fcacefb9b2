//! Response reconciliation
//!
//! Turns the single text blob returned by the generation service into a
//! typed, editable list of equipment solutions.
//!
//! The pipeline is pure: raw text in, `ReconciliationResult` out. It never
//! fails. Malformed rows, empty blocks and broken link fragments are dropped
//! rather than reported, so the worst outcome is an empty solution list with
//! the raw narration still attached.

mod assemble;
mod links;
mod split;
mod tokenize;


pub use assemble::{assemble_solutions, PLACEHOLDER_TITLE_PREFIX};
pub use links::{attach_document_links, DocumentLinks};
pub use split::{split_blocks, RESULTS_END_MARKER, RESULTS_START_MARKER};
pub use tokenize::{tokenize_rows, HEADER_LABELS};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Narration used when the service produced no text at all
pub const FAILURE_NARRATION: &str = "❌ 方案生成失败，请检查后端日志。";

/// One row of a procurement table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EquipmentLineItem {
    pub id: Uuid,
    /// Free-text classification, e.g. "音箱" or "功放"
    pub category: String,
    pub name: String,
    pub model: String,
    /// Always >= 1
    pub quantity: u32,
}

impl EquipmentLineItem {
    pub fn new(category: String, name: String, model: String, quantity: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            category,
            name,
            model,
            quantity: quantity.max(1),
        }
    }
}

/// One complete alternative equipment proposal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Solution {
    pub id: Uuid,
    pub title: String,
    pub items: Vec<EquipmentLineItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_link: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spreadsheet_link: Option<String>,
}

impl Solution {
    pub fn new(title: String, items: Vec<EquipmentLineItem>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title,
            items,
            document_link: None,
            spreadsheet_link: None,
        }
    }

    /// Total number of units across all line items
    pub fn unit_count(&self) -> u64 {
        self.items.iter().map(|item| u64::from(item.quantity)).sum()
    }
}

/// Output of one reconciliation run.
///
/// Callers that need to edit solutions clone them out; the result itself is
/// kept as the record of what the service actually said.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationResult {
    solutions: Vec<Solution>,
    narration: String,
}

impl ReconciliationResult {
    /// Result for a generation that never produced text (timeout, transport
    /// failure, empty answer).
    pub fn failed() -> Self {
        Self::failed_with(FAILURE_NARRATION)
    }

    pub fn failed_with(narration: impl Into<String>) -> Self {
        Self {
            solutions: Vec::new(),
            narration: narration.into(),
        }
    }

    pub fn solutions(&self) -> &[Solution] {
        &self.solutions
    }

    pub fn narration(&self) -> &str {
        &self.narration
    }

    pub fn is_empty(&self) -> bool {
        self.solutions.is_empty()
    }
}

/// Run the full pipeline over one raw service answer.
///
/// Blocks are split out of the results section, tokenized and assembled into
/// solutions, then the whole original text is scanned a second time for
/// document links. The narration is always the raw text verbatim.
pub fn reconcile(raw_text: &str) -> ReconciliationResult {
    if raw_text.trim().is_empty() {
        tracing::debug!("empty service answer, returning failed result");
        return ReconciliationResult::failed();
    }

    let blocks = split_blocks(raw_text);
    let mut solutions = assemble_solutions(&blocks);
    let linked = attach_document_links(&mut solutions, raw_text);

    tracing::debug!(
        blocks = blocks.len(),
        solutions = solutions.len(),
        linked,
        "reconciled service answer"
    );

    ReconciliationResult {
        solutions,
        narration: raw_text.to_string(),
    }
}
