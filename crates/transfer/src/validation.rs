use std::path::{Component, Path};

use crate::TransferError;
use crate::types::SelectedFile;

/// Rejects a selection with no files before any transfer begins.
pub fn validate_selection(files: &[SelectedFile]) -> Result<(), TransferError> {
    if files.is_empty() {
        return Err(TransferError::EmptySelection);
    }
    Ok(())
}

/// Validates the relative path sent with every chunk.
///
/// Rejects:
/// - Empty paths
/// - Absolute paths (Unix `/` or Windows `C:\`)
/// - Parent directory traversal (`..`)
/// - Windows prefix components (`C:`, `\\server`)
pub fn validate_relative_path(relative_path: &str) -> Result<(), TransferError> {
    if relative_path.is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }

    for component in Path::new(relative_path).components() {
        match component {
            Component::ParentDir => {
                return Err(TransferError::InvalidPath(format!(
                    "parent directory traversal not allowed: {relative_path}"
                )));
            }
            Component::Prefix(_) | Component::RootDir => {
                return Err(TransferError::InvalidPath(format!(
                    "absolute path not allowed: {relative_path}"
                )));
            }
            Component::CurDir | Component::Normal(_) => {}
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_selection() {
        assert!(matches!(
            validate_selection(&[]).unwrap_err(),
            TransferError::EmptySelection
        ));
    }

    #[test]
    fn accepts_non_empty_selection() {
        let files = vec![SelectedFile::in_memory("a.txt", vec![1u8])];
        assert!(validate_selection(&files).is_ok());
    }

    #[test]
    fn rejects_empty_path() {
        assert!(validate_relative_path("").is_err());
    }

    #[test]
    fn rejects_parent_dir_traversal() {
        assert!(validate_relative_path("../../../etc/passwd").is_err());
        assert!(validate_relative_path("sub/../../escape").is_err());
        assert!(validate_relative_path("..").is_err());
    }

    #[test]
    fn rejects_absolute_unix_path() {
        assert!(validate_relative_path("/tmp/report.pdf").is_err());
    }

    #[test]
    fn accepts_folder_relative_paths() {
        assert!(validate_relative_path("report.pdf").is_ok());
        assert!(validate_relative_path("photos/2024/img.jpg").is_ok());
        assert!(validate_relative_path("./notes.txt").is_ok());
        assert!(validate_relative_path(".config/settings.json").is_ok());
    }
}
