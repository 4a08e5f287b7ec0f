//! Recursive directory copy

use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// Copy `source` to `destination`.
///
/// Directories are recreated (with intermediates) and files are copied
/// byte-for-byte, overwriting existing files. Returns the number of files
/// copied.
pub fn copy_tree(source: &Path, destination: &Path) -> io::Result<u64> {
    if fs::metadata(source)?.is_file() {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(source, destination)?;
        return Ok(1);
    }

    fs::create_dir_all(destination)?;

    let mut copied = 0;
    for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
        let entry = entry.map_err(io::Error::other)?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            copied += 1;
        }
    }

    Ok(copied)
}
