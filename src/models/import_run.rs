// Import run
// One record per entity import: counters, per-record error log and the
// local ids it created (the rollback set).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{LocalId, RemoteEntity, TenantId, UserId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Processing,
    Done,
    Failed,
    RolledBack,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Processing => "processing",
            RunStatus::Done => "done",
            RunStatus::Failed => "failed",
            RunStatus::RolledBack => "rolled_back",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RunStatus::Pending),
            "processing" => Ok(RunStatus::Processing),
            "done" => Ok(RunStatus::Done),
            "failed" => Ok(RunStatus::Failed),
            "rolled_back" => Ok(RunStatus::RolledBack),
            other => Err(format!("Unknown run status: {}", other)),
        }
    }
}

/// What to do when an incoming record matches an existing local row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateStrategy {
    #[default]
    Skip,
    Update,
}

impl DuplicateStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateStrategy::Skip => "skip",
            DuplicateStrategy::Update => "update",
        }
    }
}

impl fmt::Display for DuplicateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DuplicateStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(DuplicateStrategy::Skip),
            "update" => Ok(DuplicateStrategy::Update),
            other => Err(format!(
                "Invalid duplicate strategy: {}. Must be 'skip' or 'update'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEntry {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRun {
    pub id: Uuid,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub entity_type: RemoteEntity,
    pub status: RunStatus,
    pub duplicate_strategy: DuplicateStrategy,
    pub filters: Option<Value>,
    pub total_fetched: i32,
    pub total_imported: i32,
    pub total_updated: i32,
    pub total_skipped: i32,
    pub total_errors: i32,
    /// Identity mappings written for lookup entities.
    pub total_mapped: i32,
    pub error_log: Vec<ErrorEntry>,
    pub imported_ids: Vec<LocalId>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ImportRun {
    pub fn new(
        tenant_id: TenantId,
        user_id: UserId,
        entity_type: RemoteEntity,
        duplicate_strategy: DuplicateStrategy,
        filters: Option<Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            user_id,
            entity_type,
            status: RunStatus::Pending,
            duplicate_strategy,
            filters,
            total_fetched: 0,
            total_imported: 0,
            total_updated: 0,
            total_skipped: 0,
            total_errors: 0,
            total_mapped: 0,
            error_log: Vec::new(),
            imported_ids: Vec::new(),
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }

    pub fn start(&mut self) {
        self.status = RunStatus::Processing;
        self.started_at = Some(Utc::now());
    }

    pub fn record_inserted(&mut self, local_id: LocalId) {
        self.total_imported += 1;
        self.imported_ids.push(local_id);
    }

    pub fn record_error(&mut self, message: impl Into<String>, data: Option<Value>) {
        self.total_errors += 1;
        self.error_log.push(ErrorEntry {
            message: message.into(),
            data,
        });
    }

    /// A run only fails when something went wrong and nothing landed.
    pub fn final_status(&self) -> RunStatus {
        if self.total_errors > 0 && self.total_imported + self.total_updated == 0 {
            RunStatus::Failed
        } else {
            RunStatus::Done
        }
    }

    pub fn finish(&mut self) {
        self.status = self.final_status();
        self.completed_at = Some(Utc::now());
    }

    pub fn can_rollback(&self) -> bool {
        self.status == RunStatus::Done
    }

    pub fn summary(&self) -> ImportSummary {
        ImportSummary {
            import_id: self.id,
            entity_type: self.entity_type,
            status: self.status,
            total_fetched: self.total_fetched,
            total_imported: self.total_imported,
            total_updated: self.total_updated,
            total_skipped: self.total_skipped,
            total_errors: self.total_errors,
            total_mapped: self.total_mapped,
            first_error: self.error_log.first().map(|entry| entry.message.clone()),
            first_errors: self.error_log.iter().take(5).cloned().collect(),
        }
    }
}

/// Outcome handed back to callers once a run finishes.
#[derive(Debug, Clone, Serialize)]
pub struct ImportSummary {
    pub import_id: Uuid,
    pub entity_type: RemoteEntity,
    pub status: RunStatus,
    pub total_fetched: i32,
    pub total_imported: i32,
    pub total_updated: i32,
    pub total_skipped: i32,
    pub total_errors: i32,
    pub total_mapped: i32,
    pub first_error: Option<String>,
    pub first_errors: Vec<ErrorEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RunFilter {
    pub entity: Option<RemoteEntity>,
    pub status: Option<RunStatus>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl RunFilter {
    pub const DEFAULT_PER_PAGE: u32 = 20;
    pub const MAX_PER_PAGE: u32 = 100;

    pub fn limit(&self) -> u32 {
        self.per_page
            .unwrap_or(Self::DEFAULT_PER_PAGE)
            .clamp(1, Self::MAX_PER_PAGE)
    }

    pub fn offset(&self) -> u32 {
        self.page.unwrap_or(1).max(1).saturating_sub(1) * self.limit()
    }
}
