//! Design session state
//!
//! Holds the editable copy of a reconciliation result plus everything the
//! designer changes around it. Edits never reach back into the frozen
//! result, so the archive can always show what the service actually said.

use crate::history::{EntryStatus, HistoryEntry};
use crate::params::{AcousticIntent, AcousticParams, ParamsError, Scenario};
use crate::reconcile::{attach_document_links, EquipmentLineItem, ReconciliationResult, Solution};
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const GREETING: &str = "您好，我是您的声学助理。请描述您的场景需求，我会自动同步参数并优化方案。";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Which solutions a document-generation run covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportScope {
    Current,
    All,
}

/// One outstanding call to the generation service
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub request_id: Uuid,
    pub intent: AcousticIntent,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    InvalidParams(#[from] ParamsError),
    #[error("a generation request is already in progress")]
    GenerationInProgress,
    #[error("no generation request {0} is outstanding")]
    UnknownRequest(Uuid),
    #[error("solution index {0} out of range")]
    NoSuchSolution(usize),
    #[error("line item index {item} out of range for solution {solution}")]
    NoSuchItem { solution: usize, item: usize },
    #[error("project name cannot be empty")]
    EmptyName,
}

pub type SessionResult<T> = std::result::Result<T, SessionError>;

#[derive(Debug, Clone)]
pub struct DesignSession {
    project_id: Uuid,
    project_name: String,
    pub scenario: Scenario,
    pub params: AcousticParams,
    result: Option<ReconciliationResult>,
    solutions: Vec<Solution>,
    active: usize,
    chat: Vec<ChatMessage>,
    in_flight: Option<Uuid>,
}

impl Default for DesignSession {
    fn default() -> Self {
        Self::new(Scenario::default(), AcousticParams::default())
    }
}

impl DesignSession {
    pub fn new(scenario: Scenario, params: AcousticParams) -> Self {
        Self {
            project_id: Uuid::new_v4(),
            project_name: default_project_name(),
            scenario,
            params,
            result: None,
            solutions: Vec::new(),
            active: 0,
            chat: vec![ChatMessage {
                role: ChatRole::Assistant,
                text: GREETING.to_string(),
                timestamp: Utc::now(),
            }],
            in_flight: None,
        }
    }

    pub fn project_name(&self) -> &str {
        &self.project_name
    }

    /// The result exactly as reconciled, if a generation has completed
    pub fn result(&self) -> Option<&ReconciliationResult> {
        self.result.as_ref()
    }

    pub fn solutions(&self) -> &[Solution] {
        &self.solutions
    }

    pub fn active_solution(&self) -> Option<&Solution> {
        self.solutions.get(self.active)
    }

    pub fn chat(&self) -> &[ChatMessage] {
        &self.chat
    }

    pub fn is_generating(&self) -> bool {
        self.in_flight.is_some()
    }

    /// Validate parameters and open a generation request.
    ///
    /// Only one request may be outstanding; a second call fails until the
    /// first is completed or abandoned.
    pub fn begin_generation(&mut self) -> SessionResult<GenerationRequest> {
        if self.in_flight.is_some() {
            return Err(SessionError::GenerationInProgress);
        }
        self.params.validate(self.scenario)?;

        let request = GenerationRequest {
            request_id: Uuid::new_v4(),
            intent: AcousticIntent::build(self.scenario, &self.params),
        };
        self.in_flight = Some(request.request_id);
        tracing::debug!(request_id = %request.request_id, "generation started");
        Ok(request)
    }

    /// Accept the result for the outstanding request.
    ///
    /// Results for any other request id are rejected and leave the session
    /// unchanged.
    pub fn complete_generation(
        &mut self,
        request_id: Uuid,
        result: ReconciliationResult,
    ) -> SessionResult<()> {
        if self.in_flight != Some(request_id) {
            return Err(SessionError::UnknownRequest(request_id));
        }
        self.in_flight = None;
        self.push_chat(ChatRole::Assistant, result.narration().to_string());
        self.solutions = result.solutions().to_vec();
        self.active = 0;
        self.result = Some(result);
        Ok(())
    }

    /// Drop the outstanding request after a failure the caller could not
    /// turn into a result.
    pub fn abandon_generation(&mut self, request_id: Uuid, message: &str) {
        if self.in_flight == Some(request_id) {
            self.in_flight = None;
            self.push_chat(ChatRole::Assistant, message.to_string());
        }
    }

    pub fn push_user_message(&mut self, text: &str) {
        self.push_chat(ChatRole::User, text.to_string());
    }

    fn push_chat(&mut self, role: ChatRole, text: String) {
        self.chat.push(ChatMessage {
            role,
            text,
            timestamp: Utc::now(),
        });
    }

    pub fn rename_project(&mut self, name: &str) -> SessionResult<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(SessionError::EmptyName);
        }
        self.project_name = name.to_string();
        Ok(())
    }

    pub fn select_solution(&mut self, index: usize) -> SessionResult<()> {
        if index >= self.solutions.len() {
            return Err(SessionError::NoSuchSolution(index));
        }
        self.active = index;
        Ok(())
    }

    pub fn rename_solution(&mut self, index: usize, title: &str) -> SessionResult<()> {
        let title = title.trim();
        if title.is_empty() {
            return Err(SessionError::EmptyName);
        }
        self.solution_mut(index)?.title = title.to_string();
        Ok(())
    }

    /// Set an item's quantity; zero is raised to one
    pub fn set_quantity(&mut self, solution: usize, item: usize, quantity: u32) -> SessionResult<()> {
        self.item_mut(solution, item)?.quantity = quantity.max(1);
        Ok(())
    }

    /// Replace an item's fields, keeping its id
    pub fn replace_item(
        &mut self,
        solution: usize,
        item: usize,
        replacement: EquipmentLineItem,
    ) -> SessionResult<()> {
        let target = self.item_mut(solution, item)?;
        let id = target.id;
        *target = EquipmentLineItem {
            id,
            quantity: replacement.quantity.max(1),
            ..replacement
        };
        Ok(())
    }

    /// Remove an item. A solution may end up empty here; the designer
    /// emptied it deliberately.
    pub fn delete_item(&mut self, solution: usize, item: usize) -> SessionResult<EquipmentLineItem> {
        let items = &mut self.solution_mut(solution)?.items;
        if item >= items.len() {
            return Err(SessionError::NoSuchItem { solution, item });
        }
        Ok(items.remove(item))
    }

    pub fn document_targets(&self, scope: ReportScope) -> Vec<Solution> {
        match scope {
            ReportScope::Current => self.active_solution().cloned().into_iter().collect(),
            ReportScope::All => self.solutions.clone(),
        }
    }

    /// Attach links from a document-generation answer to the edited copy
    pub fn apply_document_links(&mut self, answer: &str) -> usize {
        attach_document_links(&mut self.solutions, answer)
    }

    /// Snapshot for the archive. `None` until a generation has completed.
    pub fn to_history_entry(&self) -> Option<HistoryEntry> {
        let result = self.result.clone()?;
        let status = if result.is_empty() {
            EntryStatus::Failed
        } else {
            EntryStatus::Completed
        };
        Some(HistoryEntry {
            id: self.project_id,
            name: self.project_name.clone(),
            saved_at: Utc::now(),
            status,
            scenario: self.scenario,
            params: self.params.clone(),
            result,
            solutions: self.solutions.clone(),
        })
    }

    fn solution_mut(&mut self, index: usize) -> SessionResult<&mut Solution> {
        self.solutions
            .get_mut(index)
            .ok_or(SessionError::NoSuchSolution(index))
    }

    fn item_mut(&mut self, solution: usize, item: usize) -> SessionResult<&mut EquipmentLineItem> {
        self.solution_mut(solution)?
            .items
            .get_mut(item)
            .ok_or(SessionError::NoSuchItem { solution, item })
    }
}

fn default_project_name() -> String {
    format!("声学项目_{}_01", Local::now().format("%Y%m%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::{reconcile, RESULTS_START_MARKER};

    fn answer() -> String {
        format!(
            "{}<font size=5>方案1</font>\n|音箱|同轴吸顶扬声器|SX60|4|\n|功放|数字功放|SD300|2|\n<font size=5>方案2</font>\n|音箱|壁挂音箱|EM180|6|",
            RESULTS_START_MARKER
        )
    }

    fn generated() -> DesignSession {
        let mut session = DesignSession::default();
        let request = session.begin_generation().unwrap();
        session
            .complete_generation(request.request_id, reconcile(&answer()))
            .unwrap();
        session
    }

    #[test]
    fn test_default_project_name_has_date() {
        let session = DesignSession::default();
        assert!(session.project_name().starts_with("声学项目_"));
        assert!(session.project_name().ends_with("_01"));
    }

    #[test]
    fn test_second_request_blocked_while_one_is_outstanding() {
        let mut session = DesignSession::default();
        let first = session.begin_generation().unwrap();
        assert!(session.is_generating());
        assert!(matches!(
            session.begin_generation(),
            Err(SessionError::GenerationInProgress)
        ));
        session.abandon_generation(first.request_id, "⚠️ 系统异常");
        assert!(!session.is_generating());
        assert!(session.begin_generation().is_ok());
    }

    #[test]
    fn test_invalid_params_never_open_a_request() {
        let mut session = DesignSession::default();
        session.params.length = 0.0;
        assert!(matches!(
            session.begin_generation(),
            Err(SessionError::InvalidParams(ParamsError::NonPositiveRoom))
        ));
        assert!(!session.is_generating());
    }

    #[test]
    fn test_stale_result_is_rejected() {
        let mut session = DesignSession::default();
        let request = session.begin_generation().unwrap();
        let stale = Uuid::new_v4();
        assert!(matches!(
            session.complete_generation(stale, reconcile(&answer())),
            Err(SessionError::UnknownRequest(_))
        ));
        assert!(session.solutions().is_empty());
        session
            .complete_generation(request.request_id, reconcile(&answer()))
            .unwrap();
        assert_eq!(session.solutions().len(), 2);
        assert_eq!(session.chat().last().unwrap().text, answer());
    }

    #[test]
    fn test_edits_touch_the_copy_only() {
        let mut session = generated();
        session.set_quantity(0, 0, 0).unwrap();
        session.rename_solution(1, "经济型方案").unwrap();
        let removed = session.delete_item(0, 1).unwrap();
        assert_eq!(removed.model, "SD300");

        assert_eq!(session.solutions()[0].items.len(), 1);
        assert_eq!(session.solutions()[0].items[0].quantity, 1);
        assert_eq!(session.solutions()[1].title, "经济型方案");

        let frozen = session.result().unwrap();
        assert_eq!(frozen.solutions()[0].items.len(), 2);
        assert_eq!(frozen.solutions()[0].items[0].quantity, 4);
        assert_eq!(frozen.solutions()[1].title, "方案2");
    }

    #[test]
    fn test_replace_item_keeps_id() {
        let mut session = generated();
        let id = session.solutions()[0].items[0].id;
        let replacement =
            EquipmentLineItem::new("音箱".into(), "线阵列".into(), "LA12".into(), 8);
        session.replace_item(0, 0, replacement).unwrap();
        let item = &session.solutions()[0].items[0];
        assert_eq!(item.id, id);
        assert_eq!(item.model, "LA12");
    }

    #[test]
    fn test_out_of_range_edits_are_errors() {
        let mut session = generated();
        assert!(matches!(session.select_solution(5), Err(SessionError::NoSuchSolution(5))));
        assert!(matches!(
            session.delete_item(1, 9),
            Err(SessionError::NoSuchItem { solution: 1, item: 9 })
        ));
        assert!(matches!(session.rename_project("  "), Err(SessionError::EmptyName)));
    }

    #[test]
    fn test_document_scope_and_links() {
        let mut session = generated();
        session.select_solution(1).unwrap();
        let current = session.document_targets(ReportScope::Current);
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].title, "方案2");
        assert_eq!(session.document_targets(ReportScope::All).len(), 2);

        let linked = session.apply_document_links(r#"方案2 {"word": "https://f/2.docx"}"#);
        assert_eq!(linked, 1);
        assert_eq!(session.solutions()[1].document_link.as_deref(), Some("https://f/2.docx"));
        assert_eq!(session.result().unwrap().solutions()[1].document_link, None);
    }

    #[test]
    fn test_history_snapshot() {
        let session = DesignSession::default();
        assert!(session.to_history_entry().is_none());

        let mut session = generated();
        session.rename_project("总部5号会议室").unwrap();
        let entry = session.to_history_entry().unwrap();
        assert_eq!(entry.name, "总部5号会议室");
        assert_eq!(entry.status, EntryStatus::Completed);
        assert_eq!(entry.solutions.len(), 2);
    }

    #[test]
    fn test_failed_generation_is_archived_as_failed() {
        let mut session = DesignSession::default();
        let request = session.begin_generation().unwrap();
        session
            .complete_generation(request.request_id, ReconciliationResult::failed())
            .unwrap();
        assert_eq!(session.to_history_entry().unwrap().status, EntryStatus::Failed);
    }
}
