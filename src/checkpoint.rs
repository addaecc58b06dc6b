//! Durable per-document progress.
//!
//! A checkpoint is a JSON sidecar next to the document (`<name>.metadata`).
//! Its presence means the document is in progress for the current branch;
//! its absence means either "not started" or "finished".

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tempfile::Builder;

use crate::errors::CheckpointError;
use crate::notes::NoteGroup;
use crate::segment::CorrectionUnit;

const CHECKPOINT_SUFFIX: &str = "metadata";

/// How a unit ended up after its attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    /// An accepted candidate changed the document.
    Corrected,
    /// An accepted candidate left the document textually identical.
    Unchanged,
    /// Every attempt was rejected; the unit was left as it was.
    RetriesExhausted,
}

impl UnitOutcome {
    pub fn changed(self) -> bool {
        matches!(self, UnitOutcome::Corrected)
    }
}

/// Progress record for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    /// Next unit to process, in visitation order.
    pub unit_index: usize,
    #[serde(default)]
    pub notes: Vec<NoteGroup>,
    #[serde(default)]
    pub elapsed_ms: u64,
}

impl Checkpoint {
    /// Record that `unit` is done. Units that did not change get a
    /// "no changes" note.
    pub fn advance(&mut self, unit: &CorrectionUnit, outcome: UnitOutcome) {
        if !outcome.changed() {
            self.notes.push(NoteGroup::no_changes(unit));
        }
        self.unit_index = unit.index + 1;
    }

    pub fn note(&mut self, group: NoteGroup) {
        self.notes.push(group);
    }

    /// Add processing time.
    pub fn elapsed(&mut self, duration: Duration) {
        let ms = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.elapsed_ms = self.elapsed_ms.saturating_add(ms);
    }

    pub fn total_elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }
}

/// Loads and persists checkpoints inside a working tree.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    root: PathBuf,
}

impl CheckpointStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Absolute sidecar path for a repository-relative document path.
    pub fn path_for(&self, document: &Path) -> PathBuf {
        let absolute = self.root.join(document);
        let name = absolute
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        absolute.with_file_name(format!("{}.{}", name, CHECKPOINT_SUFFIX))
    }

    /// Whether `path` names a checkpoint sidecar.
    pub fn is_checkpoint(path: &Path) -> bool {
        path.extension().is_some_and(|e| e == CHECKPOINT_SUFFIX)
    }

    /// Load the checkpoint, or a zero checkpoint if none exists.
    pub fn load(&self, document: &Path) -> Result<Checkpoint, CheckpointError> {
        let path = self.path_for(document);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Checkpoint::default()),
            Err(source) => return Err(CheckpointError::Io { path, source }),
        };
        serde_json::from_str(&content).map_err(|source| CheckpointError::Corrupt { path, source })
    }

    /// Persist atomically: write a temp file in the same directory, then rename
    /// over the sidecar. A crash mid-write leaves the previous checkpoint intact.
    pub fn save(&self, document: &Path, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let path = self.path_for(document);
        let dir = path.parent().unwrap_or(&self.root).to_path_buf();
        let io_err = |source| CheckpointError::Io {
            path: path.clone(),
            source,
        };

        let json = serde_json::to_string_pretty(checkpoint).map_err(|source| {
            CheckpointError::Corrupt {
                path: path.clone(),
                source,
            }
        })?;

        let mut tmp = Builder::new()
            .prefix(".checkpoint-")
            .suffix(".partial")
            .tempfile_in(&dir)
            .map_err(io_err)?;
        tmp.write_all(json.as_bytes()).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&path).map_err(|e| io_err(e.error))?;
        Ok(())
    }

    /// Delete the checkpoint. Missing checkpoints are fine.
    pub fn clear(&self, document: &Path) -> Result<(), CheckpointError> {
        let path = self.path_for(document);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(CheckpointError::Io { path, source }),
        }
    }
}
