//! Filesystem helpers for assembling layers.

use std::fs;
use std::io;
use std::path::Path;

use tracing::warn;
use walkdir::WalkDir;

/// Copy a directory tree into `dest`, skipping excluded names.
///
/// Regular files and directories are copied. Symlinks are skipped with a
/// warning so a layer never points outside itself. Returns the number of
/// files copied.
pub fn copy_tree(src: &Path, dest: &Path, exclude: &[&str]) -> io::Result<usize> {
  fs::create_dir_all(dest)?;
  let mut copied = 0;

  let walker = WalkDir::new(src)
    .sort_by_file_name()
    .into_iter()
    .filter_entry(|e| e.file_name().to_str().map(|name| !exclude.contains(&name)).unwrap_or(true));

  for entry in walker {
    let entry = entry.map_err(io::Error::other)?;
    let rel = entry.path().strip_prefix(src).map_err(io::Error::other)?;
    if rel.as_os_str().is_empty() {
      continue;
    }

    let target = dest.join(rel);
    let file_type = entry.file_type();
    if file_type.is_dir() {
      fs::create_dir_all(&target)?;
    } else if file_type.is_file() {
      fs::copy(entry.path(), &target)?;
      copied += 1;
    } else {
      warn!(path = %entry.path().display(), "skipping non-regular file");
    }
  }

  Ok(copied)
}

/// List regular files below `root` as sorted, `/`-separated relative paths.
pub fn list_files(root: &Path) -> io::Result<Vec<String>> {
  let mut files = Vec::new();
  if !root.exists() {
    return Ok(files);
  }

  for entry in WalkDir::new(root).sort_by_file_name() {
    let entry = entry.map_err(io::Error::other)?;
    if entry.file_type().is_file() {
      let rel = entry.path().strip_prefix(root).map_err(io::Error::other)?;
      files.push(rel.to_string_lossy().replace('\\', "/"));
    }
  }

  files.sort();
  Ok(files)
}

/// Total size in bytes of the regular files below `path`.
pub fn dir_size(path: &Path) -> u64 {
  WalkDir::new(path)
    .into_iter()
    .flatten()
    .filter(|e| e.file_type().is_file())
    .filter_map(|e| e.metadata().ok())
    .map(|m| m.len())
    .sum()
}
