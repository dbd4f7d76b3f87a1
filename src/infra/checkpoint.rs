// ============================================================
// Layer 6 — Checkpoint Store
// ============================================================
// Durable record pairing a learner snapshot with the number of
// fully completed epochs (the epoch cursor).
//
// Files in the output directory:
//   model.ckpt          ← committed learner snapshot (single slot)
//   model.ckpt.staged   ← snapshot written for an epoch whose
//                         cursor has not been advanced yet
//   best.ckpt(.staged)  ← best-seen snapshot for early stopping
//   progress.json       ← cursor + history + early-stopping state
//   final_model.ckpt    ← learner state when training finished
//   classes.json        ← the ClassTable established on first run
//   train_config.json   ← configuration of the run
//
// Ordering for one epoch:
//   1. save_snapshot(epoch)  → model.ckpt.staged
//   2. save_best(epoch)      → best.ckpt.staged   (only if improved)
//   3. advance_cursor        → progress.json, then staged files are
//                              renamed over the committed slots
//
// The cursor is only written after the snapshot for the same epoch
// is on disk. On load, a staged snapshot tagged with the committed
// cursor is promoted (crash between steps 3a and 3b); one tagged
// beyond the cursor is discarded (crash before step 3), so the
// interrupted epoch reruns from the previous committed state.
//
// Snapshot files start with a small header:
//   magic "RTCK" | version u32 | epoch u64 | payload length u64
// A missing or mismatched header means the file is corrupt. Corrupt
// state is always reported, never silently replaced by a fresh start.
//
// Reference: Rust Book §9 (Error Handling)
//            std::fs::rename (atomic replace on the same filesystem)

use std::{
    ffi::OsString,
    fs::{self, File},
    io::Write,
    path::{Path, PathBuf},
};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::domain::error::PipelineError;
use crate::domain::sample::ClassTable;
use crate::infra::metrics::EpochRecord;
use crate::ml::early_stopping::EarlyStoppingState;

const SNAPSHOT_FILE: &str = "model.ckpt";
const BEST_FILE:     &str = "best.ckpt";
const FINAL_FILE:    &str = "final_model.ckpt";
const PROGRESS_FILE: &str = "progress.json";
const CLASSES_FILE:  &str = "classes.json";
const CONFIG_FILE:   &str = "train_config.json";

const MAGIC:       &[u8; 4] = b"RTCK";
const VERSION:     u32 = 1;
const HEADER_LEN:  usize = 4 + 4 + 8 + 8;

// ─── TrainingProgress ─────────────────────────────────────────────────────────
/// Everything that must advance together with the epoch cursor.
/// Stored as one JSON file so a single rename commits all of it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingProgress {
    /// Number of fully completed epochs; also the next epoch to run
    pub epoch: usize,

    /// One record per completed epoch, in order
    pub history: Vec<EpochRecord>,

    pub early_stopping: EarlyStoppingState,

    /// Set when early stopping ended the run
    pub stopped_early: bool,
}

/// What `load` found on disk
#[derive(Debug, Clone, Default)]
pub struct Resume {
    /// Committed learner snapshot; `None` means start from scratch
    pub snapshot: Option<Vec<u8>>,
    pub progress: TrainingProgress,
}

// ─── CheckpointStore ──────────────────────────────────────────────────────────
pub struct CheckpointStore {
    dir: PathBuf,

    /// Committed cursor as of the last load / advance
    cursor: usize,

    /// Epoch tags of snapshots written but not yet committed
    staged_snapshot: Option<usize>,
    staged_best:     Option<usize>,
}

impl CheckpointStore {
    /// Open (and create if needed) the output directory
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| PipelineError::io(&dir, e))?;
        Ok(Self { dir, cursor: 0, staged_snapshot: None, staged_best: None })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Committed epoch cursor
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Read the committed snapshot and progress, recovering from an
    /// interrupted epoch first.
    pub fn load(&mut self) -> Result<Resume, PipelineError> {
        let progress = read_json::<TrainingProgress>(&self.path(PROGRESS_FILE))?;
        let cursor   = progress.as_ref().map(|p| p.epoch).unwrap_or(0);

        self.recover_staged(SNAPSHOT_FILE, cursor)?;
        self.recover_staged(BEST_FILE, cursor)?;
        self.staged_snapshot = None;
        self.staged_best     = None;

        let snapshot_path = self.path(SNAPSHOT_FILE);
        let snapshot      = read_snapshot(&snapshot_path)?;

        let resume = match (progress, snapshot) {
            (None, None) => {
                tracing::info!("No checkpoint in '{}', starting from scratch", self.dir.display());
                Resume::default()
            }
            (None, Some(_)) => {
                return Err(PipelineError::corrupt(
                    snapshot_path,
                    "snapshot exists without a progress file",
                ));
            }
            (Some(progress), None) => {
                return Err(PipelineError::corrupt(
                    self.path(PROGRESS_FILE),
                    format!("progress records {} completed epochs but no snapshot exists", progress.epoch),
                ));
            }
            (Some(progress), Some((tag, bytes))) => {
                if tag != progress.epoch {
                    return Err(PipelineError::corrupt(
                        snapshot_path,
                        format!("snapshot belongs to epoch {} but the cursor is {}", tag, progress.epoch),
                    ));
                }
                tracing::info!(
                    "Loaded checkpoint: {} completed epochs ({} bytes)",
                    progress.epoch,
                    bytes.len()
                );
                Resume { snapshot: Some(bytes), progress }
            }
        };

        self.cursor = resume.progress.epoch;
        Ok(resume)
    }

    /// Stage the learner snapshot for the epoch that brings the
    /// cursor to `epoch`. Replaces any earlier staged snapshot.
    pub fn save_snapshot(&mut self, epoch: usize, snapshot: &[u8]) -> Result<(), PipelineError> {
        write_atomic(&staged(&self.path(SNAPSHOT_FILE)), &encode_snapshot(epoch, snapshot))?;
        self.staged_snapshot = Some(epoch);
        tracing::debug!("Staged snapshot for epoch {} ({} bytes)", epoch, snapshot.len());
        Ok(())
    }

    /// Stage a new best-seen snapshot, committed with the cursor
    pub fn save_best(&mut self, epoch: usize, snapshot: &[u8]) -> Result<(), PipelineError> {
        write_atomic(&staged(&self.path(BEST_FILE)), &encode_snapshot(epoch, snapshot))?;
        self.staged_best = Some(epoch);
        tracing::debug!("Staged best snapshot for epoch {}", epoch);
        Ok(())
    }

    /// Commit `progress`: persist the cursor, then promote the
    /// snapshots staged for `progress.epoch`.
    ///
    /// Fails if no snapshot was staged for that epoch or if the
    /// cursor would move backwards.
    pub fn advance_cursor(&mut self, progress: &TrainingProgress) -> Result<(), PipelineError> {
        if progress.epoch < self.cursor {
            return Err(PipelineError::CheckpointOrder(format!(
                "cursor cannot move back from {} to {}",
                self.cursor, progress.epoch
            )));
        }
        if self.staged_snapshot != Some(progress.epoch) {
            return Err(PipelineError::CheckpointOrder(format!(
                "no snapshot staged for epoch {}",
                progress.epoch
            )));
        }

        write_json(&self.path(PROGRESS_FILE), progress)?;

        promote(&self.path(SNAPSHOT_FILE))?;
        if self.staged_best == Some(progress.epoch) {
            promote(&self.path(BEST_FILE))?;
        }

        self.cursor          = progress.epoch;
        self.staged_snapshot = None;
        self.staged_best     = None;
        tracing::debug!("Cursor advanced to {}", self.cursor);
        Ok(())
    }

    /// Committed best-seen snapshot, if any
    pub fn load_best(&self) -> Result<Option<Vec<u8>>, PipelineError> {
        Ok(read_snapshot(&self.path(BEST_FILE))?.map(|(_, bytes)| bytes))
    }

    /// Store the learner state the run finished with
    pub fn export_final(&self, snapshot: &[u8]) -> Result<(), PipelineError> {
        write_atomic(&self.path(FINAL_FILE), &encode_snapshot(self.cursor, snapshot))
    }

    /// The finished model if training completed, otherwise the latest
    /// committed snapshot. A final model exported before the budget was
    /// extended is older than the committed snapshot and is skipped.
    pub fn load_for_inference(&self) -> Result<Option<Vec<u8>>, PipelineError> {
        let latest = read_snapshot(&self.path(SNAPSHOT_FILE))?;
        let chosen = match (read_snapshot(&self.path(FINAL_FILE))?, latest) {
            (Some(finished), Some(latest)) if latest.0 > finished.0 => {
                tracing::info!(
                    "final model is from epoch {}; using snapshot of epoch {}",
                    finished.0,
                    latest.0
                );
                Some(latest)
            }
            (Some(finished), _) => Some(finished),
            (None, latest) => latest,
        };
        Ok(chosen.map(|(_, bytes)| bytes))
    }

    pub fn save_classes(&self, classes: &ClassTable) -> Result<(), PipelineError> {
        write_json(&self.path(CLASSES_FILE), classes)
    }

    pub fn load_classes(&self) -> Result<Option<ClassTable>, PipelineError> {
        read_json(&self.path(CLASSES_FILE))
    }

    pub fn save_config<C: Serialize>(&self, config: &C) -> Result<(), PipelineError> {
        write_json(&self.path(CONFIG_FILE), config)
    }

    pub fn load_config<C: DeserializeOwned>(&self) -> Result<Option<C>, PipelineError> {
        read_json(&self.path(CONFIG_FILE))
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Decide the fate of a staged file left behind by a previous process
    fn recover_staged(&self, name: &str, cursor: usize) -> Result<(), PipelineError> {
        let committed   = self.path(name);
        let staged_path = staged(&committed);
        if !staged_path.exists() {
            return Ok(());
        }

        match read_snapshot(&staged_path) {
            Ok(Some((tag, _))) if tag == cursor => {
                tracing::info!("Promoting '{}' committed before the last shutdown", staged_path.display());
                promote(&committed)
            }
            Ok(Some((tag, _))) => {
                tracing::warn!(
                    "Discarding '{}' from interrupted epoch {} (cursor is {})",
                    staged_path.display(),
                    tag,
                    cursor
                );
                remove(&staged_path)
            }
            Ok(None) => Ok(()),
            Err(e) => {
                tracing::warn!("Discarding unreadable '{}': {}", staged_path.display(), e);
                remove(&staged_path)
            }
        }
    }
}

// ─── File helpers ─────────────────────────────────────────────────────────────

/// Write `bytes` to `path` so that a crash leaves either the old
/// content or the new content, never a mix.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PipelineError> {
    let tmp = with_suffix(path, ".tmp");
    {
        let mut file = File::create(&tmp).map_err(|e| PipelineError::io(&tmp, e))?;
        file.write_all(bytes).map_err(|e| PipelineError::io(&tmp, e))?;
        file.sync_all().map_err(|e| PipelineError::io(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| PipelineError::io(path, e))?;
    sync_parent(path);
    Ok(())
}

pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PipelineError> {
    let json = serde_json::to_vec_pretty(value)
        .map_err(|e| PipelineError::io(path, e.into()))?;
    write_atomic(path, &json)
}

/// `Ok(None)` when the file does not exist
fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, PipelineError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(PipelineError::io(path, e)),
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| PipelineError::corrupt(path, e.to_string()))
}

fn encode_snapshot(epoch: usize, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(epoch as u64).to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(payload);
    out
}

fn decode_snapshot(path: &Path, bytes: Vec<u8>) -> Result<(usize, Vec<u8>), PipelineError> {
    if bytes.len() < HEADER_LEN || &bytes[0..4] != MAGIC {
        return Err(PipelineError::corrupt(path, "missing snapshot header"));
    }

    let word = |range: std::ops::Range<usize>| -> u64 {
        let mut buf = [0u8; 8];
        buf[..range.len()].copy_from_slice(&bytes[range]);
        u64::from_le_bytes(buf)
    };

    let version = word(4..8) as u32;
    if version != VERSION {
        return Err(PipelineError::corrupt(path, format!("unsupported snapshot version {version}")));
    }

    let epoch  = word(8..16) as usize;
    let length = word(16..24) as usize;
    if bytes.len() - HEADER_LEN != length {
        return Err(PipelineError::corrupt(
            path,
            format!("expected {} payload bytes, found {}", length, bytes.len() - HEADER_LEN),
        ));
    }

    Ok((epoch, bytes[HEADER_LEN..].to_vec()))
}

/// `Ok(None)` when the file does not exist
fn read_snapshot(path: &Path) -> Result<Option<(usize, Vec<u8>)>, PipelineError> {
    match fs::read(path) {
        Ok(bytes) => decode_snapshot(path, bytes).map(Some),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PipelineError::io(path, e)),
    }
}

/// Rename `<committed>.staged` over `<committed>`
fn promote(committed: &Path) -> Result<(), PipelineError> {
    fs::rename(staged(committed), committed).map_err(|e| PipelineError::io(committed, e))?;
    sync_parent(committed);
    Ok(())
}

fn remove(path: &Path) -> Result<(), PipelineError> {
    fs::remove_file(path).map_err(|e| PipelineError::io(path, e))
}

fn staged(committed: &Path) -> PathBuf {
    with_suffix(committed, ".staged")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Make a rename durable by syncing the directory entry.
/// Not every platform can open a directory for syncing.
fn sync_parent(path: &Path) {
    if let Some(dir) = path.parent() {
        if let Ok(handle) = File::open(dir) {
            let _ = handle.sync_all();
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn progress(epoch: usize) -> TrainingProgress {
        TrainingProgress { epoch, ..Default::default() }
    }

    fn commit(store: &mut CheckpointStore, epoch: usize, bytes: &[u8]) {
        store.save_snapshot(epoch, bytes).unwrap();
        store.advance_cursor(&progress(epoch)).unwrap();
    }

    #[test]
    fn test_fresh_directory_starts_from_scratch() {
        let tmp = TempDir::new().unwrap();
        let mut store = CheckpointStore::open(tmp.path().join("out")).unwrap();

        let resume = store.load().unwrap();
        assert!(resume.snapshot.is_none());
        assert_eq!(resume.progress.epoch, 0);
        assert_eq!(store.cursor(), 0);
    }

    #[test]
    fn test_commit_then_reload() {
        let tmp = TempDir::new().unwrap();
        let mut store = CheckpointStore::open(tmp.path()).unwrap();
        commit(&mut store, 1, b"one");
        commit(&mut store, 2, b"two");

        let mut reopened = CheckpointStore::open(tmp.path()).unwrap();
        let resume = reopened.load().unwrap();
        assert_eq!(resume.snapshot.as_deref(), Some(&b"two"[..]));
        assert_eq!(resume.progress.epoch, 2);
        assert_eq!(reopened.cursor(), 2);
        assert!(!staged(&tmp.path().join(SNAPSHOT_FILE)).exists());
    }

    #[test]
    fn test_cursor_requires_snapshot_first() {
        let tmp = TempDir::new().unwrap();
        let mut store = CheckpointStore::open(tmp.path()).unwrap();

        let err = store.advance_cursor(&progress(1)).unwrap_err();
        assert!(matches!(err, PipelineError::CheckpointOrder(_)));

        // A snapshot for a different epoch does not count either
        store.save_snapshot(2, b"x").unwrap();
        let err = store.advance_cursor(&progress(1)).unwrap_err();
        assert!(matches!(err, PipelineError::CheckpointOrder(_)));
        assert!(!tmp.path().join(PROGRESS_FILE).exists());
    }

    #[test]
    fn test_cursor_never_moves_back() {
        let tmp = TempDir::new().unwrap();
        let mut store = CheckpointStore::open(tmp.path()).unwrap();
        commit(&mut store, 3, b"three");

        store.save_snapshot(2, b"two").unwrap();
        let err = store.advance_cursor(&progress(2)).unwrap_err();
        assert!(matches!(err, PipelineError::CheckpointOrder(_)));
    }

    #[test]
    fn test_crash_before_cursor_discards_staged_snapshot() {
        let tmp = TempDir::new().unwrap();
        {
            let mut store = CheckpointStore::open(tmp.path()).unwrap();
            commit(&mut store, 1, b"epoch-1");
            // Epoch 2 finished its snapshot, then the process died
            store.save_snapshot(2, b"epoch-2").unwrap();
            store.save_best(2, b"epoch-2").unwrap();
        }

        let mut store = CheckpointStore::open(tmp.path()).unwrap();
        let resume = store.load().unwrap();
        assert_eq!(resume.progress.epoch, 1);
        assert_eq!(resume.snapshot.as_deref(), Some(&b"epoch-1"[..]));
        assert!(!staged(&tmp.path().join(SNAPSHOT_FILE)).exists());
        assert!(store.load_best().unwrap().is_none());
    }

    #[test]
    fn test_crash_after_cursor_promotes_staged_snapshot() {
        let tmp = TempDir::new().unwrap();
        {
            let mut store = CheckpointStore::open(tmp.path()).unwrap();
            commit(&mut store, 1, b"epoch-1");
            store.save_snapshot(2, b"epoch-2").unwrap();
            // Progress written, promotion never happened
            write_json(&tmp.path().join(PROGRESS_FILE), &progress(2)).unwrap();
        }

        let mut store = CheckpointStore::open(tmp.path()).unwrap();
        let resume = store.load().unwrap();
        assert_eq!(resume.progress.epoch, 2);
        assert_eq!(resume.snapshot.as_deref(), Some(&b"epoch-2"[..]));
    }

    #[test]
    fn test_best_slot_commits_with_cursor() {
        let tmp = TempDir::new().unwrap();
        let mut store = CheckpointStore::open(tmp.path()).unwrap();

        store.save_snapshot(1, b"a").unwrap();
        store.save_best(1, b"a").unwrap();
        assert!(store.load_best().unwrap().is_none());
        store.advance_cursor(&progress(1)).unwrap();
        assert_eq!(store.load_best().unwrap().as_deref(), Some(&b"a"[..]));

        // Epoch 2 did not improve: best stays at epoch 1
        commit(&mut store, 2, b"b");
        assert_eq!(store.load_best().unwrap().as_deref(), Some(&b"a"[..]));
    }

    #[test]
    fn test_truncated_snapshot_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        {
            let mut store = CheckpointStore::open(tmp.path()).unwrap();
            commit(&mut store, 1, b"a longer payload");
        }
        let path  = tmp.path().join(SNAPSHOT_FILE);
        let bytes = fs::read(&path).unwrap();
        fs::write(&path, &bytes[..bytes.len() - 3]).unwrap();

        let mut store = CheckpointStore::open(tmp.path()).unwrap();
        assert!(matches!(store.load(), Err(PipelineError::CheckpointCorrupt { .. })));
    }

    #[test]
    fn test_garbage_progress_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join(PROGRESS_FILE), b"{ not json").unwrap();

        let mut store = CheckpointStore::open(tmp.path()).unwrap();
        assert!(matches!(store.load(), Err(PipelineError::CheckpointCorrupt { .. })));
    }

    #[test]
    fn test_snapshot_without_progress_is_corrupt() {
        let tmp = TempDir::new().unwrap();
        write_atomic(&tmp.path().join(SNAPSHOT_FILE), &encode_snapshot(1, b"x")).unwrap();

        let mut store = CheckpointStore::open(tmp.path()).unwrap();
        assert!(matches!(store.load(), Err(PipelineError::CheckpointCorrupt { .. })));
    }

    #[test]
    fn test_inference_prefers_final_model() {
        let tmp = TempDir::new().unwrap();
        let mut store = CheckpointStore::open(tmp.path()).unwrap();
        commit(&mut store, 1, b"latest");
        assert_eq!(store.load_for_inference().unwrap().as_deref(), Some(&b"latest"[..]));

        store.export_final(b"final").unwrap();
        assert_eq!(store.load_for_inference().unwrap().as_deref(), Some(&b"final"[..]));
    }

    #[test]
    fn test_inference_skips_final_model_older_than_snapshot() {
        let tmp = TempDir::new().unwrap();
        let mut store = CheckpointStore::open(tmp.path()).unwrap();
        commit(&mut store, 1, b"epoch one");
        store.export_final(b"final after one").unwrap();

        // Budget extended: a later epoch commits without a new export
        commit(&mut store, 2, b"epoch two");
        assert_eq!(store.load_for_inference().unwrap().as_deref(), Some(&b"epoch two"[..]));

        store.export_final(b"final after two").unwrap();
        assert_eq!(store.load_for_inference().unwrap().as_deref(), Some(&b"final after two"[..]));
    }

    #[test]
    fn test_class_table_round_trip() {
        let tmp   = TempDir::new().unwrap();
        let store = CheckpointStore::open(tmp.path()).unwrap();
        assert!(store.load_classes().unwrap().is_none());

        let table = ClassTable::new(vec!["b".into(), "a".into()]);
        store.save_classes(&table).unwrap();
        assert_eq!(store.load_classes().unwrap(), Some(table));
    }
}
