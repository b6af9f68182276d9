//! Filesystem step primitives

use crate::error::{BuildError, BuildResult};
use crate::filesystem::ProjectFilesystem;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// One resource copied into the classes directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceCopy {
    /// Absolute source file or directory
    pub source: PathBuf,
    /// Destination relative to the project root
    pub destination: PathBuf,
}

/// Delete `path` if present and create it empty
pub fn make_clean_directory(filesystem: &ProjectFilesystem, path: &Path) -> BuildResult<()> {
    let dir = filesystem.resolve(path);
    if dir.exists() {
        let removed = if dir.is_dir() {
            fs::remove_dir_all(&dir)
        } else {
            fs::remove_file(&dir)
        };
        removed.map_err(|e| BuildError::directory(&dir, e))?;
    }
    fs::create_dir_all(&dir).map_err(|e| BuildError::directory(&dir, e))
}

/// Create `path` and its parents
pub fn mkdir(filesystem: &ProjectFilesystem, path: &Path) -> BuildResult<()> {
    let dir = filesystem.resolve(path);
    fs::create_dir_all(&dir).map_err(|e| BuildError::directory(&dir, e))
}

/// Copy resources into place; directories are copied recursively
pub fn copy_resources(filesystem: &ProjectFilesystem, resources: &[ResourceCopy]) -> BuildResult<()> {
    for resource in resources {
        let destination = filesystem.resolve(&resource.destination);
        if resource.source.is_dir() {
            copy_tree(&resource.source, &destination)?;
        } else {
            copy_file(&resource.source, &destination)?;
        }
    }
    Ok(())
}

fn copy_file(source: &Path, destination: &Path) -> BuildResult<()> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::directory(parent, e))?;
    }
    if is_same_file(source, destination) {
        return Err(BuildError::io(
            destination,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("refusing to copy {} onto itself", source.display()),
            ),
        ));
    }
    fs::copy(source, destination).map_err(|e| BuildError::io(source, e))?;
    Ok(())
}

fn is_same_file(source: &Path, destination: &Path) -> bool {
    match (fs::canonicalize(source), fs::canonicalize(destination)) {
        (Ok(source), Ok(destination)) => source == destination,
        _ => false,
    }
}

fn copy_tree(source: &Path, destination: &Path) -> BuildResult<()> {
    for entry in WalkDir::new(source).sort_by(|a, b| a.file_name().cmp(b.file_name())) {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| source.to_path_buf());
            BuildError::io(path, e.into())
        })?;
        let relative = entry.path().strip_prefix(source).unwrap_or(entry.path());
        let target = destination.join(relative);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| BuildError::directory(&target, e))?;
        } else {
            copy_file(entry.path(), &target)?;
        }
    }
    Ok(())
}
