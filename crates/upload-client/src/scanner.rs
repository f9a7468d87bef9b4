//! File selection from paths.
//!
//! Turns command-line paths into [`SelectedFile`]s the way a browser file
//! picker does: a plain file is selected by its name, and a folder is
//! walked recursively with every file's relative path starting at the
//! folder's own name.

use std::path::Path;

use groupbin_transfer::{SelectedFile, TransferError};

use crate::error::UploadError;

/// Selects every file under the given paths.
///
/// Relative paths use `/` as separator (even on Windows). Files inside a
/// folder come out sorted by relative path. Symbolic links inside a folder
/// are not followed.
pub fn select_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<SelectedFile>, UploadError> {
    let mut selected = Vec::new();

    for path in paths {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path).map_err(TransferError::from)?;
        if metadata.is_dir() {
            let root_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let mut found = Vec::new();
            walk_dir(path, path, &root_name, &mut found)?;
            found.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
            selected.extend(found);
        } else {
            selected.push(SelectedFile::from_path(path)?);
        }
    }

    Ok(selected)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    root_name: &str,
    files: &mut Vec<SelectedFile>,
) -> Result<(), UploadError> {
    let entries = std::fs::read_dir(current).map_err(TransferError::from)?;

    for entry in entries {
        let entry = entry.map_err(TransferError::from)?;
        let path = entry.path();
        // Does not follow symlinks, so linked entries are skipped.
        let metadata = entry.metadata().map_err(TransferError::from)?;

        if metadata.is_dir() {
            walk_dir(root, &path, root_name, files)?;
        } else if metadata.is_file() {
            let rel_path = path
                .strip_prefix(root)
                .map_err(|e| TransferError::InvalidPath(e.to_string()))?;

            // Normalize to forward slashes.
            let rel_str = rel_path.to_string_lossy().replace('\\', "/");
            let relative = if root_name.is_empty() {
                rel_str
            } else {
                format!("{root_name}/{rel_str}")
            };
            files.push(SelectedFile::from_path(&path)?.with_relative_path(relative));
        }
    }

    Ok(())
}
