use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::types::{ChunkDescriptor, ChunkState};
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

// ---------------------------------------------------------------------------
// Partitioning
// ---------------------------------------------------------------------------

/// Cuts a file of `file_size` bytes into `ceil(file_size / chunk_size)`
/// contiguous chunks covering `[0, file_size)`.
///
/// Every chunk is `chunk_size` long except the last, which holds the
/// remainder. If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
pub fn plan_chunks(file_size: u64, chunk_size: u64) -> Vec<ChunkDescriptor> {
    let chunk_size = if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    };
    let count = file_size.div_ceil(chunk_size);
    (0..count)
        .map(|i| {
            let offset = i * chunk_size;
            ChunkDescriptor {
                index: i as usize,
                offset,
                len: chunk_size.min(file_size - offset),
                state: ChunkState::Pending,
            }
        })
        .collect()
}

/// Builds the server-side idempotency key of a file: its size followed by
/// the relative path stripped to `[0-9A-Za-z_-]`.
pub fn resumable_identifier(size: u64, relative_path: &str) -> String {
    let cleaned: String = relative_path
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect();
    format!("{size}-{cleaned}")
}

/// Guesses a MIME type from a file name's extension.
pub fn detect_content_type(name: &str) -> Option<&'static str> {
    let ext = Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("png") => Some("image/png"),
        Some("jpg" | "jpeg") => Some("image/jpeg"),
        Some("gif") => Some("image/gif"),
        Some("webp") => Some("image/webp"),
        Some("pdf") => Some("application/pdf"),
        Some("zip") => Some("application/zip"),
        Some("txt") => Some("text/plain"),
        Some("md") => Some("text/markdown"),
        Some("json") => Some("application/json"),
        Some("mp4") => Some("video/mp4"),
        Some("mp3") => Some("audio/mpeg"),
        Some("docx") => {
            Some("application/vnd.openxmlformats-officedocument.wordprocessingml.document")
        }
        Some("xlsx") => Some("application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
        Some("pptx") => {
            Some("application/vnd.openxmlformats-officedocument.presentationml.presentation")
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Byte sources
// ---------------------------------------------------------------------------

/// Where the bytes of a selected file live.
#[derive(Debug, Clone)]
pub enum FileSource {
    /// A file on disk, reopened for every chunk read.
    Disk(PathBuf),
    /// An in-memory buffer.
    Memory(Arc<[u8]>),
}

impl FileSource {
    /// Reads `len` bytes starting at `offset`.
    ///
    /// Disk reads block; callers on an async runtime should run this on a
    /// blocking thread.
    pub fn read_range(&self, offset: u64, len: u64) -> Result<Vec<u8>, TransferError> {
        match self {
            Self::Disk(path) => ChunkReader::open(path)?.read_at(offset, len),
            Self::Memory(data) => {
                let size = data.len() as u64;
                let end = offset.checked_add(len).filter(|end| *end <= size).ok_or(
                    TransferError::InvalidRange { offset, len, size },
                )?;
                Ok(data[offset as usize..end as usize].to_vec())
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// Reads arbitrary chunk ranges of a file on disk.
pub struct ChunkReader {
    file: std::fs::File,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for range reads.
    pub fn open(path: &Path) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();
        Ok(Self { file, file_size })
    }

    /// Reads exactly `len` bytes at `offset`.
    ///
    /// Fails with [`TransferError::InvalidRange`] when the range runs past the
    /// end of the file (for example because it shrank after selection).
    pub fn read_at(&mut self, offset: u64, len: u64) -> Result<Vec<u8>, TransferError> {
        let in_bounds = offset
            .checked_add(len)
            .is_some_and(|end| end <= self.file_size);
        if !in_bounds {
            return Err(TransferError::InvalidRange {
                offset,
                len,
                size: self.file_size,
            });
        }

        self.file.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; len as usize];
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const MIB: u64 = 1024 * 1024;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(data).unwrap();
        path
    }

    fn assert_exact_cover(chunks: &[ChunkDescriptor], size: u64, chunk_size: u64) {
        assert_eq!(chunks.len() as u64, size.div_ceil(chunk_size));
        let mut expected_offset = 0;
        for (i, c) in chunks.iter().enumerate() {
            assert_eq!(c.index, i);
            assert_eq!(c.offset, expected_offset, "gap or overlap at chunk {i}");
            assert!(c.len > 0 && c.len <= chunk_size);
            assert_eq!(c.state, ChunkState::Pending);
            expected_offset += c.len;
        }
        assert_eq!(expected_offset, size);
    }

    #[test]
    fn plan_two_and_a_half_mib() {
        let chunks = plan_chunks(5 * MIB / 2, MIB);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len, MIB);
        assert_eq!(chunks[1].len, MIB);
        assert_eq!(chunks[2].len, MIB / 2);
        assert_eq!(chunks[2].offset, 2 * MIB);
    }

    #[test]
    fn plan_covers_range_for_many_sizes() {
        for chunk_size in [1, 3, 7, 64, 1000] {
            for size in [0, 1, 2, 6, 7, 8, 63, 64, 65, 999, 1000, 1001, 4096] {
                assert_exact_cover(&plan_chunks(size, chunk_size), size, chunk_size);
            }
        }
    }

    #[test]
    fn plan_empty_file_has_no_chunks() {
        assert!(plan_chunks(0, MIB).is_empty());
    }

    #[test]
    fn plan_exact_multiple_has_no_tail() {
        let chunks = plan_chunks(4 * MIB, MIB);
        assert_eq!(chunks.len(), 4);
        assert!(chunks.iter().all(|c| c.len == MIB));
    }

    #[test]
    fn plan_zero_chunk_size_uses_default() {
        let chunks = plan_chunks(DEFAULT_CHUNK_SIZE + 1, 0);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].len, 1);
    }

    #[test]
    fn identifier_strips_unsafe_characters() {
        assert_eq!(resumable_identifier(2048, "report v2.pdf"), "2048-reportv2pdf");
        assert_eq!(
            resumable_identifier(10, "photos/trip_2024/img-01.jpg"),
            "10-photostrip_2024img-01jpg"
        );
    }

    #[test]
    fn content_type_known_and_unknown() {
        assert_eq!(detect_content_type("IMG.PNG"), Some("image/png"));
        assert_eq!(detect_content_type("notes.txt"), Some("text/plain"));
        assert_eq!(detect_content_type("archive.tar.xz"), None);
        assert_eq!(detect_content_type("noext"), None);
    }

    #[test]
    fn chunk_reader_reads_ranges_out_of_order() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"AABBCCDDEE");

        let mut reader = ChunkReader::open(&path).unwrap();
        assert_eq!(reader.read_at(8, 2).unwrap(), b"EE");
        assert_eq!(reader.read_at(0, 4).unwrap(), b"AABB");
        assert_eq!(reader.read_at(4, 4).unwrap(), b"CCDD");
    }

    #[test]
    fn chunk_reader_rejects_range_past_end() {
        let dir = TempDir::new().unwrap();
        let path = create_test_file(dir.path(), "test.bin", b"0123456789");

        let mut reader = ChunkReader::open(&path).unwrap();
        let err = reader.read_at(8, 4).unwrap_err();
        assert!(matches!(
            err,
            TransferError::InvalidRange {
                offset: 8,
                len: 4,
                size: 10
            }
        ));
    }

    #[test]
    fn disk_and_memory_sources_agree() {
        let dir = TempDir::new().unwrap();
        let data = b"The quick brown fox jumps over the lazy dog";
        let path = create_test_file(dir.path(), "fox.txt", data);

        let disk = FileSource::Disk(path);
        let memory = FileSource::Memory(Arc::from(&data[..]));
        for chunk in plan_chunks(data.len() as u64, 10) {
            assert_eq!(
                disk.read_range(chunk.offset, chunk.len).unwrap(),
                memory.read_range(chunk.offset, chunk.len).unwrap()
            );
        }
    }

    #[test]
    fn memory_source_rejects_overflowing_range() {
        let memory = FileSource::Memory(Arc::from(&b"abc"[..]));
        assert!(memory.read_range(2, 2).is_err());
        assert!(memory.read_range(u64::MAX, 2).is_err());
    }

    #[test]
    fn missing_disk_source_is_io_error() {
        let source = FileSource::Disk(PathBuf::from("/nonexistent/path/file.bin"));
        assert!(matches!(
            source.read_range(0, 1).unwrap_err(),
            TransferError::Io(_)
        ));
    }
}
