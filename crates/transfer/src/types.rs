use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use groupbin_protocol::ChunkForm;
use serde::{Deserialize, Serialize};

use crate::chunked::{FileSource, detect_content_type, plan_chunks, resumable_identifier};
use crate::validation::validate_relative_path;
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// Client-generated unique identifier of a queued file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Transfer state of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkState {
    Pending,
    InFlight,
    Acknowledged,
    /// Errored; skipped until the next `start()` puts it back to pending.
    Failed,
}

/// A contiguous byte range of a file, the unit of network transfer.
///
/// Offset and length never change after enqueue; only `state` moves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    pub index: usize,
    pub offset: u64,
    pub len: u64,
    pub state: ChunkState,
}

/// Lifecycle state of a queued file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileState {
    Queued,
    Uploading,
    Completed,
    Failed,
}

impl FileState {
    /// `Completed` and `Failed` end a file's participation in the session.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Duplicate-detection key of a selected file.
///
/// Includes the relative path so equal files in different folders of one
/// selection stay distinct.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub name: String,
    pub relative_path: String,
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// A file picked by the user (file picker, folder browse or drop).
#[derive(Debug, Clone)]
pub struct SelectedFile {
    pub name: String,
    /// Path relative to the picked folder, or the bare name.
    pub relative_path: String,
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub source: FileSource,
}

impl SelectedFile {
    /// Reads name, size and modification time of a file on disk.
    pub fn from_path(path: &Path) -> Result<Self, TransferError> {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_file() {
            return Err(TransferError::InvalidPath(format!(
                "not a regular file: {}",
                path.display()
            )));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| TransferError::InvalidPath(path.display().to_string()))?;

        Ok(Self {
            relative_path: name.clone(),
            name,
            size: metadata.len(),
            modified: metadata.modified().ok(),
            source: FileSource::Disk(path.to_path_buf()),
        })
    }

    /// Wraps an in-memory buffer.
    pub fn in_memory(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        let name = name.into();
        let data = data.into();
        Self {
            relative_path: name.clone(),
            name,
            size: data.len() as u64,
            modified: None,
            source: FileSource::Memory(data),
        }
    }

    /// Overrides the relative path (files picked through a folder).
    pub fn with_relative_path(mut self, relative_path: impl Into<String>) -> Self {
        self.relative_path = relative_path.into();
        self
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            name: self.name.clone(),
            relative_path: self.relative_path.clone(),
            size: self.size,
            modified: self.modified,
        }
    }
}

/// A file in the upload queue.
#[derive(Debug, Clone)]
pub struct UploadFile {
    id: FileId,
    name: String,
    relative_path: String,
    size: u64,
    modified: Option<SystemTime>,
    content_type: String,
    source: FileSource,
    chunks: Vec<ChunkDescriptor>,
    state: FileState,
    transferred: u64,
    failures: u32,
    last_error: Option<String>,
}

impl UploadFile {
    pub fn id(&self) -> &FileId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn relative_path(&self) -> &str {
        &self.relative_path
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn state(&self) -> FileState {
        self.state
    }

    pub fn chunks(&self) -> &[ChunkDescriptor] {
        &self.chunks
    }

    /// Sum of the lengths of acknowledged chunks.
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred
    }

    /// Cumulative chunk failures of this file.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Fraction of this file's bytes acknowledged, in [0, 1].
    pub fn progress(&self) -> f64 {
        if self.size == 0 {
            return 0.0;
        }
        (self.transferred as f64 / self.size as f64).min(1.0)
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            name: self.name.clone(),
            relative_path: self.relative_path.clone(),
            size: self.size,
            modified: self.modified,
        }
    }

    pub fn has_in_flight(&self) -> bool {
        self.chunks.iter().any(|c| c.state == ChunkState::InFlight)
    }

    fn acknowledged_chunks(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.state == ChunkState::Acknowledged)
            .count()
    }

    /// Point-in-time copy for event payloads and UI listings.
    pub fn snapshot(&self) -> FileSnapshot {
        FileSnapshot {
            id: self.id.clone(),
            name: self.name.clone(),
            relative_path: self.relative_path.clone(),
            size: self.size,
            state: self.state,
            transferred_bytes: self.transferred,
            total_chunks: self.chunks.len(),
            acknowledged_chunks: self.acknowledged_chunks(),
            failures: self.failures,
            last_error: self.last_error.clone(),
        }
    }

    fn chunk_mut(&mut self, index: usize) -> Result<&mut ChunkDescriptor, TransferError> {
        let file_id = self.id.clone();
        self.chunks
            .get_mut(index)
            .ok_or(TransferError::ChunkNotFound { file_id, index })
    }

    fn form_for(&self, chunk: &ChunkDescriptor, chunk_size: u64) -> ChunkForm {
        ChunkForm {
            chunk_number: chunk.index as u64 + 1,
            chunk_size,
            current_chunk_size: chunk.len,
            total_size: self.size,
            content_type: self.content_type.clone(),
            identifier: self.id.to_string(),
            filename: self.name.clone(),
            relative_path: self.relative_path.clone(),
            total_chunks: self.chunks.len() as u64,
        }
    }
}

/// Serializable view of a queued file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileSnapshot {
    pub id: FileId,
    pub name: String,
    pub relative_path: String,
    pub size: u64,
    pub state: FileState,
    pub transferred_bytes: u64,
    pub total_chunks: usize,
    pub acknowledged_chunks: usize,
    pub failures: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

/// Everything needed to transfer one chunk without holding the session.
#[derive(Debug, Clone)]
pub struct ChunkJob {
    pub file_id: FileId,
    pub index: usize,
    pub offset: u64,
    pub len: u64,
    pub source: FileSource,
    pub form: ChunkForm,
}

/// Result of acknowledging a chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckOutcome {
    /// First acknowledgment of this chunk; `bytes` were added to the totals.
    Acknowledged { bytes: u64, file_completed: bool },
    /// The chunk was already acknowledged; nothing changed.
    AlreadyAcknowledged,
}

/// Result of recording a chunk failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkFailure {
    /// Cumulative failures of the file after this one.
    pub failures: u32,
    /// The file crossed the failure threshold and is now `Failed`.
    pub file_failed: bool,
}

/// Aggregate counters of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionCounts {
    pub total: usize,
    pub queued: usize,
    pub uploading: usize,
    pub completed: usize,
    pub failed: usize,
}

/// Ordered file queue of one upload session.
///
/// Insertion order is queue order. The chunk size is fixed for the whole
/// session and shared by every file.
#[derive(Debug)]
pub struct UploadSession {
    files: Vec<UploadFile>,
    chunk_size: u64,
}

impl UploadSession {
    /// Creates an empty session. A `chunk_size` of 0 selects
    /// [`DEFAULT_CHUNK_SIZE`].
    pub fn new(chunk_size: u64) -> Self {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Self {
            files: Vec::new(),
            chunk_size,
        }
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn files(&self) -> &[UploadFile] {
        &self.files
    }

    pub fn file(&self, id: &FileId) -> Option<&UploadFile> {
        self.files.iter().find(|f| &f.id == id)
    }

    fn file_mut(&mut self, id: &FileId) -> Result<&mut UploadFile, TransferError> {
        self.files
            .iter_mut()
            .find(|f| &f.id == id)
            .ok_or_else(|| TransferError::FileNotFound(id.clone()))
    }

    /// Appends a file and partitions it into chunks.
    ///
    /// Rejects empty files and files whose fingerprint or identifier is
    /// already queued.
    pub fn enqueue(&mut self, selected: SelectedFile) -> Result<FileId, TransferError> {
        if selected.size == 0 {
            return Err(TransferError::EmptyFile(selected.name));
        }
        validate_relative_path(&selected.relative_path)?;

        let id = FileId(resumable_identifier(selected.size, &selected.relative_path));
        let fingerprint = selected.fingerprint();
        if self
            .files
            .iter()
            .any(|f| f.id == id || f.fingerprint() == fingerprint)
        {
            return Err(TransferError::DuplicateFile(selected.name));
        }

        let content_type = detect_content_type(&selected.name)
            .unwrap_or_default()
            .to_string();
        self.files.push(UploadFile {
            id: id.clone(),
            chunks: plan_chunks(selected.size, self.chunk_size),
            name: selected.name,
            relative_path: selected.relative_path,
            size: selected.size,
            modified: selected.modified,
            content_type,
            source: selected.source,
            state: FileState::Queued,
            transferred: 0,
            failures: 0,
            last_error: None,
        });
        Ok(id)
    }

    /// Drops a file from the queue unless it is fully acknowledged.
    ///
    /// In-flight transfers of the file must be aborted by the caller.
    pub fn remove(&mut self, id: &FileId) -> Result<UploadFile, TransferError> {
        let pos = self
            .files
            .iter()
            .position(|f| &f.id == id)
            .ok_or_else(|| TransferError::FileNotFound(id.clone()))?;
        if self.files[pos].state == FileState::Completed {
            return Err(TransferError::AlreadyAcknowledged(id.clone()));
        }
        Ok(self.files.remove(pos))
    }

    /// Puts every failed chunk of a non-terminal file back to pending.
    /// Returns how many chunks were reset.
    pub fn retry_failed(&mut self) -> usize {
        let mut reset = 0;
        for file in self.files.iter_mut().filter(|f| !f.state.is_terminal()) {
            for chunk in file
                .chunks
                .iter_mut()
                .filter(|c| c.state == ChunkState::Failed)
            {
                chunk.state = ChunkState::Pending;
                reset += 1;
            }
        }
        reset
    }

    /// First pending chunk in file-then-index order, skipping terminal files.
    pub fn next_pending(&self) -> Option<(FileId, usize)> {
        self.files
            .iter()
            .filter(|f| !f.state.is_terminal())
            .find_map(|f| {
                f.chunks
                    .iter()
                    .find(|c| c.state == ChunkState::Pending)
                    .map(|c| (f.id.clone(), c.index))
            })
    }

    /// Marks a chunk in flight and returns the job describing its transfer.
    pub fn begin_chunk(&mut self, id: &FileId, index: usize) -> Result<ChunkJob, TransferError> {
        let chunk_size = self.chunk_size;
        let file = self.file_mut(id)?;
        let chunk = file.chunk_mut(index)?;
        chunk.state = ChunkState::InFlight;
        let chunk = chunk.clone();
        if file.state == FileState::Queued {
            file.state = FileState::Uploading;
        }

        Ok(ChunkJob {
            file_id: file.id.clone(),
            index,
            offset: chunk.offset,
            len: chunk.len,
            source: file.source.clone(),
            form: file.form_for(&chunk, chunk_size),
        })
    }

    /// Records a server acknowledgment. Idempotent per chunk.
    ///
    /// A file completes when its last unacknowledged chunk is acknowledged,
    /// whatever order the acknowledgments arrive in.
    pub fn acknowledge(&mut self, id: &FileId, index: usize) -> Result<AckOutcome, TransferError> {
        let file = self.file_mut(id)?;
        let chunk = file.chunk_mut(index)?;
        if chunk.state == ChunkState::Acknowledged {
            return Ok(AckOutcome::AlreadyAcknowledged);
        }
        chunk.state = ChunkState::Acknowledged;
        let bytes = chunk.len;
        file.transferred += bytes;

        let all_acked = file
            .chunks
            .iter()
            .all(|c| c.state == ChunkState::Acknowledged);
        let file_completed = all_acked && !file.state.is_terminal();
        if file_completed {
            file.state = FileState::Completed;
            file.last_error = None;
        }
        Ok(AckOutcome::Acknowledged {
            bytes,
            file_completed,
        })
    }

    /// Records a failed transfer of an in-flight chunk.
    ///
    /// The chunk is parked as `Failed`. With `max_failures` set, the file
    /// becomes `Failed` once its cumulative failures reach it.
    pub fn fail_chunk(
        &mut self,
        id: &FileId,
        index: usize,
        max_failures: Option<u32>,
        reason: &str,
    ) -> Result<ChunkFailure, TransferError> {
        let file = self.file_mut(id)?;
        let chunk = file.chunk_mut(index)?;
        if chunk.state != ChunkState::InFlight {
            return Ok(ChunkFailure {
                failures: file.failures,
                file_failed: false,
            });
        }
        chunk.state = ChunkState::Failed;
        file.failures += 1;
        file.last_error = Some(reason.to_string());

        let file_failed = !file.state.is_terminal()
            && max_failures.is_some_and(|limit| file.failures >= limit);
        if file_failed {
            mark_failed(file);
        }
        Ok(ChunkFailure {
            failures: file.failures,
            file_failed,
        })
    }

    /// Returns an in-flight chunk to pending (its transfer was aborted).
    pub fn release_chunk(&mut self, id: &FileId, index: usize) -> Result<(), TransferError> {
        let chunk = self.file_mut(id)?.chunk_mut(index)?;
        if chunk.state == ChunkState::InFlight {
            chunk.state = ChunkState::Pending;
        }
        Ok(())
    }

    /// Marks a file `Failed` (terminal), returning its in-flight chunks to
    /// pending. Completed files cannot fail.
    pub fn fail_file(&mut self, id: &FileId, reason: &str) -> Result<(), TransferError> {
        let file = self.file_mut(id)?;
        if file.state == FileState::Completed {
            return Err(TransferError::AlreadyAcknowledged(id.clone()));
        }
        file.last_error = Some(reason.to_string());
        mark_failed(file);
        Ok(())
    }

    /// Acknowledged bytes across all files.
    pub fn transferred_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.transferred).sum()
    }

    pub fn total_bytes(&self) -> u64 {
        self.files.iter().map(|f| f.size).sum()
    }

    /// Aggregate fraction in [0, 1]; 0 for an empty session.
    pub fn progress(&self) -> f64 {
        let total = self.total_bytes();
        if total == 0 {
            return 0.0;
        }
        (self.transferred_bytes() as f64 / total as f64).min(1.0)
    }

    pub fn counts(&self) -> SessionCounts {
        let mut counts = SessionCounts {
            total: self.files.len(),
            ..SessionCounts::default()
        };
        for file in &self.files {
            match file.state {
                FileState::Queued => counts.queued += 1,
                FileState::Uploading => counts.uploading += 1,
                FileState::Completed => counts.completed += 1,
                FileState::Failed => counts.failed += 1,
            }
        }
        counts
    }

    /// `true` when the queue is non-empty and every file is terminal.
    pub fn all_terminal(&self) -> bool {
        !self.files.is_empty() && self.files.iter().all(|f| f.state.is_terminal())
    }
}

fn mark_failed(file: &mut UploadFile) {
    file.state = FileState::Failed;
    for chunk in file
        .chunks
        .iter_mut()
        .filter(|c| c.state == ChunkState::InFlight)
    {
        chunk.state = ChunkState::Pending;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    fn file_of(name: &str, size: usize) -> SelectedFile {
        SelectedFile::in_memory(name, vec![7u8; size])
    }

    fn session_with(files: &[(&str, usize)], chunk_size: u64) -> (UploadSession, Vec<FileId>) {
        let mut session = UploadSession::new(chunk_size);
        let ids = files
            .iter()
            .map(|(name, size)| session.enqueue(file_of(name, *size)).unwrap())
            .collect();
        (session, ids)
    }

    #[test]
    fn enqueue_partitions_and_assigns_identifier() {
        let (session, ids) = session_with(&[("deck.pdf", (5 * MIB / 2) as usize)], MIB);
        let file = session.file(&ids[0]).unwrap();
        assert_eq!(file.id().as_str(), "2621440-deckpdf");
        assert_eq!(file.chunks().len(), 3);
        assert_eq!(file.state(), FileState::Queued);
        assert_eq!(session.counts().total, 1);
    }

    #[test]
    fn enqueue_rejects_duplicate_fingerprint() {
        let mut session = UploadSession::new(4);
        session.enqueue(file_of("a.txt", 10)).unwrap();
        let err = session.enqueue(file_of("a.txt", 10)).unwrap_err();
        assert!(matches!(err, TransferError::DuplicateFile(name) if name == "a.txt"));
        assert_eq!(session.len(), 1);
    }

    #[test]
    fn enqueue_accepts_same_file_in_different_folders() {
        let mut session = UploadSession::new(4);
        let first = session
            .enqueue(file_of("readme.txt", 10).with_relative_path("docs/a/readme.txt"))
            .unwrap();
        let second = session
            .enqueue(file_of("readme.txt", 10).with_relative_path("docs/b/readme.txt"))
            .unwrap();
        assert_ne!(first, second);
        assert_eq!(session.len(), 2);

        let err = session
            .enqueue(file_of("readme.txt", 10).with_relative_path("docs/a/readme.txt"))
            .unwrap_err();
        assert!(matches!(err, TransferError::DuplicateFile(_)));
    }

    #[test]
    fn enqueue_accepts_same_name_different_size() {
        let mut session = UploadSession::new(4);
        session.enqueue(file_of("a.txt", 10)).unwrap();
        session.enqueue(file_of("a.txt", 11)).unwrap();
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn enqueue_rejects_empty_file() {
        let mut session = UploadSession::new(4);
        let err = session.enqueue(file_of("empty.txt", 0)).unwrap_err();
        assert!(matches!(err, TransferError::EmptyFile(_)));
        assert!(session.is_empty());
    }

    #[test]
    fn enqueue_rejects_traversal_in_relative_path() {
        let mut session = UploadSession::new(4);
        let selected = file_of("x.txt", 3).with_relative_path("../x.txt");
        assert!(matches!(
            session.enqueue(selected).unwrap_err(),
            TransferError::InvalidPath(_)
        ));
    }

    #[test]
    fn next_pending_follows_queue_order() {
        let (mut session, ids) = session_with(&[("a", 8), ("b", 8)], 4);
        assert_eq!(session.next_pending(), Some((ids[0].clone(), 0)));
        session.begin_chunk(&ids[0], 0).unwrap();
        assert_eq!(session.next_pending(), Some((ids[0].clone(), 1)));
        session.begin_chunk(&ids[0], 1).unwrap();
        assert_eq!(session.next_pending(), Some((ids[1].clone(), 0)));
    }

    #[test]
    fn begin_chunk_builds_one_based_form() {
        let (mut session, ids) = session_with(&[("notes.txt", 10)], 4);
        let job = session.begin_chunk(&ids[0], 2).unwrap();
        assert_eq!(job.offset, 8);
        assert_eq!(job.len, 2);
        assert_eq!(job.form.chunk_number, 3);
        assert_eq!(job.form.chunk_size, 4);
        assert_eq!(job.form.current_chunk_size, 2);
        assert_eq!(job.form.total_chunks, 3);
        assert_eq!(job.form.total_size, 10);
        assert_eq!(job.form.content_type, "text/plain");
        assert_eq!(job.form.identifier, ids[0].as_str());
        assert_eq!(session.file(&ids[0]).unwrap().state(), FileState::Uploading);
    }

    #[test]
    fn out_of_order_acks_complete_file_once() {
        let (mut session, ids) = session_with(&[("a", 10)], 4);
        for i in 0..3 {
            session.begin_chunk(&ids[0], i).unwrap();
        }

        let first = session.acknowledge(&ids[0], 2).unwrap();
        assert_eq!(
            first,
            AckOutcome::Acknowledged {
                bytes: 2,
                file_completed: false
            }
        );
        session.acknowledge(&ids[0], 0).unwrap();
        let last = session.acknowledge(&ids[0], 1).unwrap();
        assert_eq!(
            last,
            AckOutcome::Acknowledged {
                bytes: 4,
                file_completed: true
            }
        );
        assert_eq!(session.file(&ids[0]).unwrap().state(), FileState::Completed);
        assert_eq!(session.transferred_bytes(), 10);
    }

    #[test]
    fn reacknowledging_changes_nothing() {
        let (mut session, ids) = session_with(&[("a", 8)], 4);
        session.acknowledge(&ids[0], 0).unwrap();
        session.acknowledge(&ids[0], 1).unwrap();
        let before = session.transferred_bytes();

        assert_eq!(
            session.acknowledge(&ids[0], 1).unwrap(),
            AckOutcome::AlreadyAcknowledged
        );
        assert_eq!(session.transferred_bytes(), before);
        assert_eq!(session.file(&ids[0]).unwrap().state(), FileState::Completed);
        assert_eq!(session.counts().completed, 1);
    }

    #[test]
    fn failed_chunk_waits_for_retry() {
        let (mut session, ids) = session_with(&[("a", 12)], 4);
        for i in 0..3 {
            session.begin_chunk(&ids[0], i).unwrap();
        }
        let failure = session.fail_chunk(&ids[0], 1, None, "boom").unwrap();
        assert_eq!(failure.failures, 1);
        assert!(!failure.file_failed);
        assert_eq!(session.next_pending(), None);

        assert_eq!(session.retry_failed(), 1);
        assert_eq!(session.next_pending(), Some((ids[0].clone(), 1)));
        assert_eq!(session.file(&ids[0]).unwrap().last_error(), Some("boom"));
    }

    #[test]
    fn failure_threshold_fails_file() {
        let (mut session, ids) = session_with(&[("a", 8)], 4);
        session.begin_chunk(&ids[0], 0).unwrap();
        session.begin_chunk(&ids[0], 1).unwrap();
        session.fail_chunk(&ids[0], 0, Some(2), "e1").unwrap();
        session.retry_failed();
        session.begin_chunk(&ids[0], 0).unwrap();

        let failure = session.fail_chunk(&ids[0], 0, Some(2), "e2").unwrap();
        assert!(failure.file_failed);
        let file = session.file(&ids[0]).unwrap();
        assert_eq!(file.state(), FileState::Failed);
        assert!(!file.has_in_flight());
        assert!(session.all_terminal());
        assert_eq!(session.next_pending(), None);
    }

    #[test]
    fn stale_failure_is_ignored() {
        let (mut session, ids) = session_with(&[("a", 8)], 4);
        session.acknowledge(&ids[0], 0).unwrap();
        let failure = session.fail_chunk(&ids[0], 0, Some(1), "late").unwrap();
        assert!(!failure.file_failed);
        assert_eq!(failure.failures, 0);
    }

    #[test]
    fn remove_rejects_completed_file() {
        let (mut session, ids) = session_with(&[("a", 4)], 4);
        session.acknowledge(&ids[0], 0).unwrap();
        assert!(matches!(
            session.remove(&ids[0]).unwrap_err(),
            TransferError::AlreadyAcknowledged(_)
        ));
    }

    #[test]
    fn remove_partially_acknowledged_file() {
        let (mut session, ids) = session_with(&[("a", 12), ("b", 4)], 4);
        session.acknowledge(&ids[0], 0).unwrap();
        let removed = session.remove(&ids[0]).unwrap();
        assert_eq!(removed.name(), "a");
        assert_eq!(session.len(), 1);
        assert_eq!(session.total_bytes(), 4);
        assert!(matches!(
            session.remove(&ids[0]).unwrap_err(),
            TransferError::FileNotFound(_)
        ));
    }

    #[test]
    fn release_returns_chunk_to_pending() {
        let (mut session, ids) = session_with(&[("a", 4)], 4);
        session.begin_chunk(&ids[0], 0).unwrap();
        assert_eq!(session.next_pending(), None);
        session.release_chunk(&ids[0], 0).unwrap();
        assert_eq!(session.next_pending(), Some((ids[0].clone(), 0)));
    }

    #[test]
    fn progress_is_monotonic_over_acks() {
        let (mut session, ids) = session_with(&[("a", 10), ("b", 7)], 3);
        let mut last = session.progress();
        assert_eq!(last, 0.0);
        let order = [(1, 2), (0, 3), (0, 0), (1, 0), (0, 1), (1, 1), (0, 2), (0, 3)];
        for (file, chunk) in order {
            session.acknowledge(&ids[file], chunk).unwrap();
            let now = session.progress();
            assert!(now >= last, "progress went from {last} to {now}");
            last = now;
        }
        assert_eq!(last, 1.0);
    }

    #[test]
    fn fail_file_is_terminal_and_counted() {
        let (mut session, ids) = session_with(&[("a", 4), ("b", 4)], 4);
        session.acknowledge(&ids[0], 0).unwrap();
        assert!(!session.all_terminal());
        session.fail_file(&ids[1], "cancelled").unwrap();
        assert!(session.all_terminal());

        let counts = session.counts();
        assert_eq!(counts.completed, 1);
        assert_eq!(counts.failed, 1);
        assert!(counts.completed <= counts.total);
        assert!(session.fail_file(&ids[0], "nope").is_err());
    }

    #[test]
    fn snapshot_reports_chunk_counts() {
        let (mut session, ids) = session_with(&[("a", 10)], 4);
        session.acknowledge(&ids[0], 1).unwrap();
        let snap = session.file(&ids[0]).unwrap().snapshot();
        assert_eq!(snap.total_chunks, 3);
        assert_eq!(snap.acknowledged_chunks, 1);
        assert_eq!(snap.transferred_bytes, 4);
        assert_eq!(snap.state, FileState::Queued);
    }
}
