use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use globset::GlobMatcher;

use crate::error::{Error, Result};

/// A discovered source document.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    /// Path relative to the source root directory.
    pub relative_path: PathBuf,
    /// Fully resolved absolute path.
    pub absolute_path: PathBuf,
    /// Last modification time as seconds since the Unix epoch.
    pub mtime: u64,
}

/// Compile an `--include` pattern, matched against relative paths.
pub fn include_matcher(pattern: &str) -> Result<GlobMatcher> {
    Ok(globset::Glob::new(pattern)
        .map_err(|e| Error::Config(format!("invalid glob pattern: {e}")))?
        .compile_matcher())
}

/// Recursively walk a directory and discover source documents.
///
/// Skips hidden files/directories (names starting with `.`). Without an
/// `include` pattern every `.xml` file is kept; with one, exactly the files
/// whose relative path matches it.
pub fn discover_files(
    root: &Path,
    include: Option<&GlobMatcher>,
) -> Result<Vec<DiscoveredFile>> {
    let canonical_root = root.canonicalize()?;
    let mut results = Vec::new();
    walk_dir(&canonical_root, &canonical_root, include, &mut results)?;
    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(results)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    include: Option<&GlobMatcher>,
    results: &mut Vec<DiscoveredFile>,
) -> Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let file_name = entry.file_name();
        if file_name.to_string_lossy().starts_with('.') {
            continue;
        }

        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            walk_dir(root, &path, include, results)?;
        } else if file_type.is_symlink() {
            let Ok(resolved) = path.canonicalize() else {
                continue;
            };
            // Links to directories are not followed.
            if resolved.is_file() && wanted(root, &path, include) {
                results.push(make_discovered(root, &path, &resolved)?);
            }
        } else if file_type.is_file() && wanted(root, &path, include) {
            let abs = path.canonicalize()?;
            results.push(make_discovered(root, &path, &abs)?);
        }
    }

    Ok(())
}

fn wanted(root: &Path, path: &Path, include: Option<&GlobMatcher>) -> bool {
    match include {
        Some(matcher) => {
            matcher.is_match(path.strip_prefix(root).unwrap_or(path))
        }
        None => path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("xml")),
    }
}

fn make_discovered(
    root: &Path,
    original_path: &Path,
    absolute_path: &Path,
) -> Result<DiscoveredFile> {
    let relative_path = original_path
        .strip_prefix(root)
        .unwrap_or(original_path)
        .to_path_buf();

    Ok(DiscoveredFile {
        relative_path,
        absolute_path: absolute_path.to_path_buf(),
        mtime: file_mtime(absolute_path)?,
    })
}

/// Modification time of `path` in seconds since the Unix epoch.
pub fn file_mtime(path: &Path) -> Result<u64> {
    Ok(std::fs::metadata(path)?
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs())
}
