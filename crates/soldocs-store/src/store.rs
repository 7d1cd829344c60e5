//! The persistent store. Owns every on-disk artifact under the data
//! directory:
//!
//! ```text
//! programs.json    index of ProgramMetadata
//! queue.json       QueueItem entries
//! docs/<id>.json   one Documentation per documented program
//! idls/<id>.json   one IdlCacheEntry per cached program
//! ```
//!
//! Mutating operations come in pairs: the plain variant for
//! single-threaded contexts (tests, startup recovery) and a `*_safe`
//! variant that serializes the read-modify-write through the path lock
//! table. Reads never lock; atomic renames guarantee they see a complete
//! prior state.

use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;
use soldocs_core::{
    idl, validate_program_id, Documentation, IdlCacheEntry, ProgramMetadata, ProgramStatus,
    QueueItem, QueueStatus, Result, StoreStats,
};
use tracing::{debug, info};

use crate::files::{read_json_array, read_json_record, write_json_atomic};
use crate::lock::PathLocks;

/// Result of [`Store::add_to_queue`], distinguishing a fresh entry from a
/// failed-item retry and a no-op on an already queued program.
#[derive(Debug, Clone)]
pub enum EnqueueOutcome {
    Added(QueueItem),
    Requeued(QueueItem),
    AlreadyQueued(QueueItem),
}

impl EnqueueOutcome {
    pub fn item(&self) -> &QueueItem {
        match self {
            EnqueueOutcome::Added(item)
            | EnqueueOutcome::Requeued(item)
            | EnqueueOutcome::AlreadyQueued(item) => item,
        }
    }
}

/// Partial update for a queue item. `None` fields are left untouched;
/// `last_error` uses a nested option so it can be explicitly cleared.
#[derive(Debug, Clone, Default)]
pub struct QueueItemPatch {
    pub status: Option<QueueStatus>,
    pub attempts: Option<u32>,
    pub last_error: Option<Option<String>>,
}

pub struct Store {
    data_dir: PathBuf,
    locks: PathLocks,
}

impl Store {
    /// Open (and create, if absent) the data directory layout.
    pub async fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(data_dir.join("docs")).await?;
        tokio::fs::create_dir_all(data_dir.join("idls")).await?;
        info!(data_dir = %data_dir.display(), "Store opened");
        Ok(Self {
            data_dir,
            locks: PathLocks::new(),
        })
    }

    fn programs_path(&self) -> PathBuf {
        self.data_dir.join("programs.json")
    }

    fn queue_path(&self) -> PathBuf {
        self.data_dir.join("queue.json")
    }

    fn doc_path(&self, program_id: &str) -> PathBuf {
        self.data_dir.join("docs").join(format!("{program_id}.json"))
    }

    fn idl_path(&self, program_id: &str) -> PathBuf {
        self.data_dir.join("idls").join(format!("{program_id}.json"))
    }

    // ---- program index ----

    pub async fn list_programs(&self) -> Result<Vec<ProgramMetadata>> {
        read_json_array(&self.programs_path()).await
    }

    pub async fn get_program(&self, program_id: &str) -> Result<Option<ProgramMetadata>> {
        validate_program_id(program_id)?;
        let programs = self.list_programs().await?;
        Ok(programs.into_iter().find(|p| p.program_id == program_id))
    }

    /// Upsert by program id. The index is not kept sorted.
    pub async fn save_program(&self, metadata: ProgramMetadata) -> Result<()> {
        validate_program_id(&metadata.program_id)?;
        let mut programs = self.list_programs().await?;
        match programs
            .iter_mut()
            .find(|p| p.program_id == metadata.program_id)
        {
            Some(existing) => *existing = metadata,
            None => programs.push(metadata),
        }
        write_json_atomic(&self.programs_path(), &programs).await
    }

    pub async fn save_program_safe(&self, metadata: ProgramMetadata) -> Result<()> {
        validate_program_id(&metadata.program_id)?;
        self.locks
            .acquire(&self.programs_path(), || self.save_program(metadata))
            .await
    }

    pub async fn remove_program(&self, program_id: &str) -> Result<bool> {
        validate_program_id(program_id)?;
        let mut programs = self.list_programs().await?;
        let before = programs.len();
        programs.retain(|p| p.program_id != program_id);
        if programs.len() == before {
            return Ok(false);
        }
        write_json_atomic(&self.programs_path(), &programs).await?;
        Ok(true)
    }

    pub async fn remove_program_safe(&self, program_id: &str) -> Result<bool> {
        validate_program_id(program_id)?;
        self.locks
            .acquire(&self.programs_path(), || self.remove_program(program_id))
            .await
    }

    // ---- queue ----

    pub async fn list_queue(&self) -> Result<Vec<QueueItem>> {
        read_json_array(&self.queue_path()).await
    }

    pub async fn pending_queue(&self) -> Result<Vec<QueueItem>> {
        let queue = self.list_queue().await?;
        Ok(queue
            .into_iter()
            .filter(|item| item.status == QueueStatus::Pending)
            .collect())
    }

    /// Enqueue a program. A failed item is reset to pending with a fresh
    /// retry budget; a pending or processing item is left untouched.
    pub async fn add_to_queue(&self, program_id: &str) -> Result<EnqueueOutcome> {
        validate_program_id(program_id)?;
        let mut queue = self.list_queue().await?;
        if let Some(existing) = queue.iter_mut().find(|item| item.program_id == program_id) {
            if existing.status == QueueStatus::Failed {
                existing.status = QueueStatus::Pending;
                existing.attempts = 0;
                existing.last_error = None;
                existing.added_at = Utc::now();
                let item = existing.clone();
                write_json_atomic(&self.queue_path(), &queue).await?;
                debug!(program_id, "Requeued failed program");
                return Ok(EnqueueOutcome::Requeued(item));
            }
            return Ok(EnqueueOutcome::AlreadyQueued(existing.clone()));
        }

        let item = QueueItem {
            program_id: program_id.to_string(),
            status: QueueStatus::Pending,
            added_at: Utc::now(),
            attempts: 0,
            last_error: None,
        };
        queue.push(item.clone());
        write_json_atomic(&self.queue_path(), &queue).await?;
        debug!(program_id, "Added program to queue");
        Ok(EnqueueOutcome::Added(item))
    }

    pub async fn add_to_queue_safe(&self, program_id: &str) -> Result<EnqueueOutcome> {
        validate_program_id(program_id)?;
        self.locks
            .acquire(&self.queue_path(), || self.add_to_queue(program_id))
            .await
    }

    /// Partial merge into an existing item. Returns the updated item, or
    /// `None` when the program is not queued.
    pub async fn update_queue_item(
        &self,
        program_id: &str,
        patch: QueueItemPatch,
    ) -> Result<Option<QueueItem>> {
        validate_program_id(program_id)?;
        let mut queue = self.list_queue().await?;
        let Some(item) = queue.iter_mut().find(|item| item.program_id == program_id) else {
            return Ok(None);
        };
        if let Some(status) = patch.status {
            item.status = status;
        }
        if let Some(attempts) = patch.attempts {
            item.attempts = attempts;
        }
        if let Some(last_error) = patch.last_error {
            item.last_error = last_error;
        }
        let updated = item.clone();
        write_json_atomic(&self.queue_path(), &queue).await?;
        Ok(Some(updated))
    }

    pub async fn update_queue_item_safe(
        &self,
        program_id: &str,
        patch: QueueItemPatch,
    ) -> Result<Option<QueueItem>> {
        validate_program_id(program_id)?;
        self.locks
            .acquire(&self.queue_path(), || {
                self.update_queue_item(program_id, patch)
            })
            .await
    }

    pub async fn remove_from_queue(&self, program_id: &str) -> Result<bool> {
        validate_program_id(program_id)?;
        let mut queue = self.list_queue().await?;
        let before = queue.len();
        queue.retain(|item| item.program_id != program_id);
        if queue.len() == before {
            return Ok(false);
        }
        write_json_atomic(&self.queue_path(), &queue).await?;
        Ok(true)
    }

    pub async fn remove_from_queue_safe(&self, program_id: &str) -> Result<bool> {
        validate_program_id(program_id)?;
        self.locks
            .acquire(&self.queue_path(), || self.remove_from_queue(program_id))
            .await
    }

    /// Flip every `processing` item back to `pending`. Run once at agent
    /// start, before any worker is spawned.
    pub async fn recover_stuck_items(&self) -> Result<usize> {
        let mut queue = self.list_queue().await?;
        let mut recovered = 0;
        for item in queue.iter_mut() {
            if item.status == QueueStatus::Processing {
                item.status = QueueStatus::Pending;
                recovered += 1;
            }
        }
        if recovered > 0 {
            write_json_atomic(&self.queue_path(), &queue).await?;
            info!(recovered, "Recovered stuck queue items");
        }
        Ok(recovered)
    }

    // ---- IDL cache ----

    pub async fn get_idl(&self, program_id: &str) -> Result<Option<IdlCacheEntry>> {
        validate_program_id(program_id)?;
        read_json_record(&self.idl_path(program_id)).await
    }

    /// Hash the IDL deterministically and persist the cache entry.
    pub async fn save_idl(&self, program_id: &str, idl: Value) -> Result<IdlCacheEntry> {
        validate_program_id(program_id)?;
        let entry = IdlCacheEntry {
            program_id: program_id.to_string(),
            hash: idl::hash_idl(&idl),
            idl,
            fetched_at: Utc::now(),
        };
        write_json_atomic(&self.idl_path(program_id), &entry).await?;
        Ok(entry)
    }

    pub async fn save_idl_safe(&self, program_id: &str, idl: Value) -> Result<IdlCacheEntry> {
        validate_program_id(program_id)?;
        self.locks
            .acquire(&self.idl_path(program_id), || {
                self.save_idl(program_id, idl)
            })
            .await
    }

    pub async fn remove_idl(&self, program_id: &str) -> Result<bool> {
        validate_program_id(program_id)?;
        remove_file_if_present(&self.idl_path(program_id)).await
    }

    pub async fn remove_idl_safe(&self, program_id: &str) -> Result<bool> {
        validate_program_id(program_id)?;
        self.locks
            .acquire(&self.idl_path(program_id), || self.remove_idl(program_id))
            .await
    }

    // ---- documentation ----

    pub async fn get_documentation(&self, program_id: &str) -> Result<Option<Documentation>> {
        validate_program_id(program_id)?;
        read_json_record(&self.doc_path(program_id)).await
    }

    pub async fn save_documentation(&self, doc: Documentation) -> Result<()> {
        validate_program_id(&doc.program_id)?;
        write_json_atomic(&self.doc_path(&doc.program_id), &doc).await
    }

    pub async fn save_documentation_safe(&self, doc: Documentation) -> Result<()> {
        validate_program_id(&doc.program_id)?;
        let path = self.doc_path(&doc.program_id);
        self.locks
            .acquire(&path, || self.save_documentation(doc))
            .await
    }

    pub async fn remove_documentation(&self, program_id: &str) -> Result<bool> {
        validate_program_id(program_id)?;
        remove_file_if_present(&self.doc_path(program_id)).await
    }

    pub async fn remove_documentation_safe(&self, program_id: &str) -> Result<bool> {
        validate_program_id(program_id)?;
        self.locks
            .acquire(&self.doc_path(program_id), || {
                self.remove_documentation(program_id)
            })
            .await
    }

    // ---- stats ----

    pub async fn stats(&self) -> Result<StoreStats> {
        let programs = self.list_programs().await?;
        Ok(programs
            .iter()
            .fold(StoreStats::default(), |mut stats, program| {
                match program.status {
                    ProgramStatus::Documented => stats.documented += 1,
                    ProgramStatus::Failed => stats.failed += 1,
                    _ => {}
                }
                stats.total += 1;
                stats
            }))
    }
}

async fn remove_file_if_present(path: &Path) -> Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(err.into()),
    }
}
