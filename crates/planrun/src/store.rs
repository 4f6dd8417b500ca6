//! Plan state store
//!
//! One record per in-flight or recently finished plan, keyed by a generated
//! id. Records hold the plan exactly as resolved, so password inputs are
//! still placeholders and no elevation secret is ever written.

use crate::error::{Error, Result};
use blueprint::Plan;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

// ============================================================================
// Records
// ============================================================================

/// Where a plan is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Created,
    Running,
    Paused,
    Cancelled,
    Done,
    Failed,
}

impl PlanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Cancelled => "cancelled",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Whether `resume` may continue from this status
    ///
    /// `Running` and `Created` only survive in the store after a crash.
    pub fn is_resumable(&self) -> bool {
        !matches!(self, Self::Done | Self::Cancelled)
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted progress of one plan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanRecord {
    pub id: String,
    pub plan: Plan,
    /// Fingerprint of `plan` when the record was created
    pub fingerprint: String,
    pub status: PlanStatus,
    #[serde(default)]
    pub completed: BTreeSet<String>,
    #[serde(default)]
    pub failed: BTreeSet<String>,
    #[serde(default)]
    pub skipped: BTreeSet<String>,
    /// Step the plan paused after or is waiting on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paused_at: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PlanRecord {
    /// Fresh record with a generated id
    pub fn new(plan: Plan) -> Result<Self> {
        let fingerprint = plan.fingerprint()?;
        let now = Utc::now();
        Ok(Self {
            id: uuid::Uuid::new_v4().to_string(),
            plan,
            fingerprint,
            status: PlanStatus::Created,
            completed: BTreeSet::new(),
            failed: BTreeSet::new(),
            skipped: BTreeSet::new(),
            paused_at: None,
            created_at: now,
            updated_at: now,
        })
    }

    /// Move to a new status and bump the timestamp
    pub fn transition(&mut self, status: PlanStatus) {
        log::debug!("Plan {} {} -> {}", self.id, self.status, status);
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Whether the stored plan still matches its fingerprint
    pub fn is_intact(&self) -> Result<bool> {
        Ok(self.plan.fingerprint()? == self.fingerprint)
    }

    /// Completed step ids in plan order
    pub fn completed_in_order(&self) -> Vec<String> {
        self.plan
            .steps
            .iter()
            .filter(|s| self.completed.contains(&s.id))
            .map(|s| s.id.clone())
            .collect()
    }
}

// ============================================================================
// Store trait
// ============================================================================

/// Persistence for plan records
pub trait StateStore: Send + Sync {
    /// Insert or replace a live record
    fn save(&self, record: &PlanRecord) -> Result<()>;

    /// Load a record, live or archived
    fn load(&self, id: &str) -> Result<PlanRecord>;

    /// Live records, oldest first
    fn list(&self) -> Result<Vec<PlanRecord>>;

    /// Move a record out of the live set
    fn archive(&self, id: &str) -> Result<()>;
}

// ============================================================================
// File store
// ============================================================================

/// JSON files under a state directory
///
/// Live records are `plans/<id>.json`, archived ones `archive/<id>.json`.
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn live_dir(&self) -> PathBuf {
        self.root.join("plans")
    }

    fn archive_dir(&self) -> PathBuf {
        self.root.join("archive")
    }

    fn read(path: &Path) -> Result<PlanRecord> {
        let content = fs::read_to_string(path).map_err(|e| Error::store(path, e))?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl StateStore for FileStore {
    fn save(&self, record: &PlanRecord) -> Result<()> {
        let dir = self.live_dir();
        fs::create_dir_all(&dir).map_err(|e| Error::store(&dir, e))?;

        let path = dir.join(format!("{}.json", record.id));
        let tmp = dir.join(format!(".{}.json.tmp", record.id));
        let content = serde_json::to_string_pretty(record)?;
        fs::write(&tmp, content).map_err(|e| Error::store(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| Error::store(&path, e))?;

        log::debug!("Saved plan record {}", path.display());
        Ok(())
    }

    fn load(&self, id: &str) -> Result<PlanRecord> {
        for dir in [self.live_dir(), self.archive_dir()] {
            let path = dir.join(format!("{id}.json"));
            if path.exists() {
                return Self::read(&path);
            }
        }
        Err(Error::UnknownPlan(id.to_string()))
    }

    fn list(&self) -> Result<Vec<PlanRecord>> {
        let dir = self.live_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut records = Vec::new();
        for entry in fs::read_dir(&dir).map_err(|e| Error::store(&dir, e))? {
            let path = entry.map_err(|e| Error::store(&dir, e))?.path();
            if path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            match Self::read(&path) {
                Ok(record) => records.push(record),
                Err(e) => log::warn!("Skipping unreadable plan record {}: {e}", path.display()),
            }
        }
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    fn archive(&self, id: &str) -> Result<()> {
        let from = self.live_dir().join(format!("{id}.json"));
        if !from.exists() {
            return Err(Error::UnknownPlan(id.to_string()));
        }
        let dir = self.archive_dir();
        fs::create_dir_all(&dir).map_err(|e| Error::store(&dir, e))?;
        let to = dir.join(format!("{id}.json"));
        fs::rename(&from, &to).map_err(|e| Error::store(&to, e))?;

        log::debug!("Archived plan record {id}");
        Ok(())
    }
}

// ============================================================================
// Memory store
// ============================================================================

/// In-process store for tests and one-shot runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    live: Mutex<BTreeMap<String, PlanRecord>>,
    archived: Mutex<BTreeMap<String, PlanRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_archived(&self, id: &str) -> bool {
        self.archived
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id)
    }
}

impl StateStore for MemoryStore {
    fn save(&self, record: &PlanRecord) -> Result<()> {
        self.live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    fn load(&self, id: &str) -> Result<PlanRecord> {
        let live = self.live.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(record) = live.get(id) {
            return Ok(record.clone());
        }
        drop(live);
        self.archived
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownPlan(id.to_string()))
    }

    fn list(&self) -> Result<Vec<PlanRecord>> {
        let mut records: Vec<PlanRecord> = self
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(records)
    }

    fn archive(&self, id: &str) -> Result<()> {
        let record = self
            .live
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .ok_or_else(|| Error::UnknownPlan(id.to_string()))?;
        self.archived
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_string(), record);
        Ok(())
    }
}
