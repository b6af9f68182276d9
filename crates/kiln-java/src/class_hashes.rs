//! Per-class content hashes of a library's output
//!
//! After packaging, every class in the library's jar is hashed and the table
//! is written as `<fully.qualified.Name> <hex-hash>` lines, sorted by class
//! name. A later build reloads the table to validate the artifact without
//! recompiling.

use crate::error::{BuildError, BuildResult};
use crate::filesystem::ProjectFilesystem;
use crate::step::jar::class_name_of_entry;
use crate::target::BuildTarget;
use rayon::prelude::*;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

/// Lowercase hex content hash of one class file
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassHash(String);

impl ClassHash {
    /// SHA-256 of the class bytes
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(format!("{:x}", hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for ClassHash {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.len() % 2 != 0 {
            return Err(format!("hash '{}' must have an even, non-zero length", s));
        }
        if !s.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("hash '{}' is not hexadecimal", s));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }
}

impl fmt::Display for ClassHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Class name to content hash, ordered by class name
pub type ClassHashes = BTreeMap<String, ClassHash>;

/// State of a library reloaded from a previous build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JavaLibraryData {
    pub class_hashes: ClassHashes,
}

/// Where a library's class-hash table lives
pub fn class_hashes_path(target: &BuildTarget, filesystem: &ProjectFilesystem) -> PathBuf {
    filesystem.gen_path(target, "%s.classes.txt")
}

/// Access to outputs persisted by a previous build
pub trait OnDiskBuildInfo {
    /// Lines of a project-relative output file
    fn output_file_contents_by_line(&self, path: &Path) -> BuildResult<Vec<String>>;
}

/// `OnDiskBuildInfo` reading straight from the project filesystem
#[derive(Debug, Clone)]
pub struct FilesystemBuildInfo {
    filesystem: ProjectFilesystem,
}

impl FilesystemBuildInfo {
    pub fn new(filesystem: ProjectFilesystem) -> Self {
        Self { filesystem }
    }
}

impl OnDiskBuildInfo for FilesystemBuildInfo {
    fn output_file_contents_by_line(&self, path: &Path) -> BuildResult<Vec<String>> {
        let path = self.filesystem.resolve(path);
        let contents = fs::read_to_string(&path).map_err(|e| BuildError::io(&path, e))?;
        Ok(contents.lines().map(str::to_string).collect())
    }
}

/// Hash every class under `input`, a jar or a classes directory.
///
/// No input yields an empty table.
pub fn accumulate_class_hashes(
    filesystem: &ProjectFilesystem,
    input: Option<&Path>,
) -> BuildResult<ClassHashes> {
    let Some(input) = input else {
        return Ok(ClassHashes::new());
    };
    let input = filesystem.resolve(input);
    if input.is_dir() {
        hash_directory(&input)
    } else {
        hash_jar(&input)
    }
}

fn hash_directory(dir: &Path) -> BuildResult<ClassHashes> {
    let mut classes = Vec::new();
    for entry in WalkDir::new(dir) {
        let entry = entry.map_err(|e| BuildError::io(dir, io::Error::from(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        let name = relative.to_string_lossy().replace('\\', "/");
        if let Some(class_name) = class_name_of_entry(&name) {
            classes.push((class_name, entry.path().to_path_buf()));
        }
    }

    classes
        .into_par_iter()
        .map(|(class_name, path)| {
            let bytes = fs::read(&path).map_err(|e| BuildError::io(&path, e))?;
            Ok((class_name, ClassHash::of_bytes(&bytes)))
        })
        .collect()
}

fn hash_jar(jar: &Path) -> BuildResult<ClassHashes> {
    let file = File::open(jar).map_err(|e| BuildError::io(jar, e))?;
    let mut archive = ZipArchive::new(file).map_err(|e| BuildError::packaging(jar, e))?;

    let mut hashes = ClassHashes::new();
    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| BuildError::packaging(jar, e))?;
        let Some(class_name) = class_name_of_entry(entry.name()) else {
            continue;
        };
        // Declared entry sizes are untrusted, so the buffer grows as read.
        let mut bytes = Vec::new();
        entry
            .read_to_end(&mut bytes)
            .map_err(|e| BuildError::io(jar, e))?;
        hashes.insert(class_name, ClassHash::of_bytes(&bytes));
    }
    Ok(hashes)
}

/// Render a table in its on-disk form
pub fn format_class_hashes(hashes: &ClassHashes) -> String {
    hashes
        .iter()
        .map(|(class_name, hash)| format!("{} {}\n", class_name, hash))
        .collect()
}

/// Write a table, replacing any previous file
pub fn write_class_hashes(path: &Path, hashes: &ClassHashes) -> BuildResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| BuildError::directory(parent, e))?;
    }
    fs::write(path, format_class_hashes(hashes)).map_err(|e| BuildError::io(path, e))?;
    debug!("Wrote {} class hashes to {}", hashes.len(), path.display());
    Ok(())
}

/// Parse the lines of a class-hash file. Blank lines are ignored.
pub fn parse_class_hashes<S: AsRef<str>>(path: &Path, lines: &[S]) -> BuildResult<ClassHashes> {
    let mut hashes = ClassHashes::new();
    for (index, line) in lines.iter().enumerate() {
        let line = line.as_ref();
        if line.trim().is_empty() {
            continue;
        }
        let corrupt = |reason: String| BuildError::corrupt_metadata(path, index + 1, reason);

        let (class_name, hash) = line
            .split_once(' ')
            .ok_or_else(|| corrupt(format!("expected '<class> <hash>', got '{}'", line)))?;
        if class_name.is_empty() {
            return Err(corrupt("empty class name".to_string()));
        }
        let hash = hash.parse::<ClassHash>().map_err(corrupt)?;
        hashes.insert(class_name.to_string(), hash);
    }
    Ok(hashes)
}

/// Reload the class-hash table a previous build wrote for `target`
pub fn load_prior_class_hashes(
    target: &BuildTarget,
    filesystem: &ProjectFilesystem,
    build_info: &dyn OnDiskBuildInfo,
) -> BuildResult<ClassHashes> {
    let path = class_hashes_path(target, filesystem);
    let lines = build_info.output_file_contents_by_line(&path)?;
    parse_class_hashes(&path, &lines)
}

/// Reconstruct a library's state from disk without rebuilding it
pub fn initialize_from_disk(
    target: &BuildTarget,
    filesystem: &ProjectFilesystem,
    build_info: &dyn OnDiskBuildInfo,
) -> BuildResult<JavaLibraryData> {
    Ok(JavaLibraryData {
        class_hashes: load_prior_class_hashes(target, filesystem, build_info)?,
    })
}

/// Like `initialize_from_disk`, but a missing or corrupt table means there is
/// no prior state. Corruption is logged.
pub fn initialize_from_disk_or_absent(
    target: &BuildTarget,
    filesystem: &ProjectFilesystem,
    build_info: &dyn OnDiskBuildInfo,
) -> BuildResult<Option<JavaLibraryData>> {
    match initialize_from_disk(target, filesystem, build_info) {
        Ok(data) => Ok(Some(data)),
        Err(err) if err.is_corrupt_metadata() => {
            warn!("Ignoring prior build state of {}: {}", target, err);
            Ok(None)
        }
        Err(BuildError::IoError { error, .. }) if error.kind() == io::ErrorKind::NotFound => {
            debug!("No prior build state for {}", target);
            Ok(None)
        }
        Err(err) => Err(err),
    }
}
