//! Detecting and relocating downloaded files.
//!
//! The download tools drop files in their own output directory and do not
//! report a path, so the directory is snapshotted before the session and
//! diffed after. Relocation copies then deletes instead of renaming, the
//! library usually lives on a different filesystem than the tool's output.

use anyhow::{anyhow, Context, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::debug;

// In-flight download artifacts, never treated as a finished file.
const PARTIAL_EXTENSIONS: [&str; 4] = ["part", "tmp", "crdownload", "aria2"];

/// The set of files currently in `dir`. A missing directory is an empty set.
pub fn snapshot_dir(dir: &Path) -> Result<HashSet<PathBuf>> {
    let mut files = HashSet::new();
    if !dir.exists() {
        return Ok(files);
    }
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?
    {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            files.insert(entry.path());
        }
    }
    Ok(files)
}

/// The file that appeared in `dir` since `before` was taken. When the tool
/// dropped several files the newest one wins.
pub fn find_new_file(dir: &Path, before: &HashSet<PathBuf>) -> Result<Option<PathBuf>> {
    let after = snapshot_dir(dir)?;
    let mut fresh: Vec<PathBuf> = after
        .difference(before)
        .filter(|path| !is_partial(path))
        .cloned()
        .collect();
    fresh.sort_by_key(|path| {
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH)
    });
    Ok(fresh.pop())
}

/// Move `src` into `dest_dir`, creating it as needed. Copy then delete, with
/// a numeric suffix when the name is already taken.
pub fn relocate(src: &Path, dest_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(dest_dir)
        .with_context(|| format!("Failed to create directory {}", dest_dir.display()))?;
    let name = src
        .file_name()
        .ok_or_else(|| anyhow!("Downloaded file has no name: {}", src.display()))?;

    let dest = unique_destination(dest_dir, Path::new(name));
    std::fs::copy(src, &dest).with_context(|| {
        format!("Failed to copy {} to {}", src.display(), dest.display())
    })?;
    std::fs::remove_file(src)
        .with_context(|| format!("Failed to remove {}", src.display()))?;
    debug!("Relocated {} -> {}", src.display(), dest.display());
    Ok(dest)
}

fn is_partial(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| PARTIAL_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn unique_destination(dest_dir: &Path, name: &Path) -> PathBuf {
    let candidate = dest_dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let stem = name
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = name.extension().map(|e| e.to_string_lossy().into_owned());
    for n in 1.. {
        let numbered = match &ext {
            Some(ext) => format!("{} ({}).{}", stem, n, ext),
            None => format!("{} ({})", stem, n),
        };
        let candidate = dest_dir.join(numbered);
        if !candidate.exists() {
            return candidate;
        }
    }
    unreachable!()
}
