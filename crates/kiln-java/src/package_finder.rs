//! Java package inference for source and resource paths

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

/// Maps a project-relative file path to the package folder it belongs in
pub trait JavaPackageFinder {
    /// Package folder (e.g. `com/example`) for a root-relative file path
    fn find_java_package_folder(&self, path: &Path) -> PathBuf;

    /// Dotted package name (e.g. `com.example`)
    fn find_java_package(&self, path: &Path) -> String {
        self.find_java_package_folder(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join(".")
    }
}

/// Infers packages from configured source roots.
///
/// `paths_from_root` are prefixes of the project root (e.g. `java/`) checked
/// first. Otherwise the deepest ancestor directory named by one of
/// `path_elements` (e.g. `src`) is taken as the root. Failing both, the file's
/// parent directory is the package folder.
#[derive(Debug, Clone, Default)]
pub struct DefaultJavaPackageFinder {
    paths_from_root: Vec<PathBuf>,
    path_elements: BTreeSet<String>,
}

impl DefaultJavaPackageFinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from `src_roots` entries: a leading `/` marks a path from root
    pub fn from_src_roots<S: AsRef<str>>(src_roots: &[S]) -> Self {
        let mut finder = Self::new();
        for root in src_roots {
            let root = root.as_ref();
            match root.strip_prefix('/') {
                Some(from_root) => {
                    finder
                        .paths_from_root
                        .push(PathBuf::from(from_root.trim_end_matches('/')));
                }
                None => {
                    finder.path_elements.insert(root.trim_end_matches('/').to_string());
                }
            }
        }
        finder
    }

    /// Add a root-prefix source root
    pub fn with_path_from_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.paths_from_root.push(path.into());
        self
    }

    /// Add a directory name that acts as a source root wherever it appears
    pub fn with_path_element(mut self, element: impl Into<String>) -> Self {
        self.path_elements.insert(element.into());
        self
    }
}

impl JavaPackageFinder for DefaultJavaPackageFinder {
    fn find_java_package_folder(&self, path: &Path) -> PathBuf {
        for root in &self.paths_from_root {
            if let Ok(relative) = path.strip_prefix(root) {
                return parent_or_empty(relative);
            }
        }

        let parent = parent_or_empty(path);
        let mut directory = Some(parent.as_path());
        while let Some(dir) = directory {
            let matches = dir
                .file_name()
                .map(|name| self.path_elements.contains(name.to_string_lossy().as_ref()))
                .unwrap_or(false);
            if matches {
                return parent
                    .strip_prefix(dir)
                    .map(Path::to_path_buf)
                    .unwrap_or_default();
            }
            directory = dir.parent();
        }

        parent
    }
}

/// Roots package inference at a resources directory, deferring to another
/// finder for paths outside it
pub struct ResourcesRootPackageFinder<'a> {
    resources_root: PathBuf,
    fallback: &'a dyn JavaPackageFinder,
}

impl<'a> ResourcesRootPackageFinder<'a> {
    pub fn new(resources_root: impl Into<PathBuf>, fallback: &'a dyn JavaPackageFinder) -> Self {
        Self {
            resources_root: resources_root.into(),
            fallback,
        }
    }
}

impl JavaPackageFinder for ResourcesRootPackageFinder<'_> {
    fn find_java_package_folder(&self, path: &Path) -> PathBuf {
        match path.strip_prefix(&self.resources_root) {
            Ok(relative) => parent_or_empty(relative),
            Err(_) => self.fallback.find_java_package_folder(path),
        }
    }
}

fn parent_or_empty(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}
