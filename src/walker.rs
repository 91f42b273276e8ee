use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use crate::error::Result;

/// A document file found under an indexed folder.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Path relative to the folder.
    pub relative_path: PathBuf,
    /// Fully resolved absolute path.
    pub absolute_path: PathBuf,
    /// Last modification time as seconds since the Unix epoch.
    pub mtime: u64,
}

/// Extensions the parsers understand, matched case-insensitively.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "txt"];

/// Recursively walk a folder and collect indexable documents.
///
/// Skips hidden files and directories (names starting with `.`). Results
/// are sorted by relative path so chunk streams are produced in a stable
/// order.
pub fn discover_files(root: &Path) -> Result<Vec<DiscoveredFile>> {
    let canonical_root = root.canonicalize()?;
    let mut results = Vec::new();
    walk_dir(&canonical_root, &canonical_root, &mut results)?;
    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(results)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    results: &mut Vec<DiscoveredFile>,
) -> Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }

        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk_dir(root, &path, results)?;
            continue;
        }

        // Symlinked files are followed; symlinked directories are not, so
        // a link back into the tree cannot loop.
        let resolved = if file_type.is_symlink() {
            match path.canonicalize() {
                Ok(target) if target.is_file() => target,
                _ => continue,
            }
        } else if file_type.is_file() {
            path.canonicalize()?
        } else {
            continue;
        };

        if is_supported(&path) {
            results.push(discovered(root, &path, resolved)?);
        }
    }

    Ok(())
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|supported| ext.eq_ignore_ascii_case(supported))
        })
}

fn discovered(
    root: &Path,
    path: &Path,
    absolute_path: PathBuf,
) -> Result<DiscoveredFile> {
    let mtime = std::fs::metadata(&absolute_path)?
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    Ok(DiscoveredFile {
        relative_path: path.strip_prefix(root).unwrap_or(path).to_path_buf(),
        absolute_path,
        mtime,
    })
}
