use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle of a program record in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgramStatus {
    Pending,
    Processing,
    Documented,
    Failed,
}

/// Lifecycle of a queue entry. Terminal success removes the entry, so
/// there is no `documented` state here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgramMetadata {
    pub program_id: String,
    pub name: String,
    pub description: String,
    pub instruction_count: usize,
    pub account_count: usize,
    pub status: ProgramStatus,
    pub idl_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Invariant: at most one queue item per program id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueItem {
    pub program_id: String,
    pub status: QueueStatus,
    pub added_at: DateTime<Utc>,
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Cached IDL document. `hash` is a pure function of `idl` (see
/// [`crate::idl::hash_idl`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdlCacheEntry {
    pub program_id: String,
    pub idl: Value,
    pub hash: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Documentation {
    pub program_id: String,
    pub name: String,
    pub overview: String,
    pub instructions: String,
    pub accounts: String,
    pub security: String,
    pub full_markdown: String,
    pub generated_at: DateTime<Utc>,
    pub idl_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentError {
    pub program_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Live view of the agent, derived on each read. Never stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentState {
    pub running: bool,
    pub programs_documented: u64,
    pub programs_failed: u64,
    pub total_processed: u64,
    pub queue_length: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    pub recent_errors: Vec<AgentError>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub documented: usize,
    pub failed: usize,
    pub total: usize,
}
