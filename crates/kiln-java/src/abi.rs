//! ABI rule resolution
//!
//! Compiling against ABI jars instead of full library jars means a change to
//! a dependency's method bodies does not invalidate its dependents. Two
//! related translations are provided and they differ on purpose:
//!
//! - [`abi_rules_of`] answers "which ABI rules do I compile against" and drops
//!   every dependency that has no ABI jar.
//! - [`abi_substituted_or_original`] rewrites a dependency set for the rule
//!   graph, so deps without ABI jars (resources, native libraries, generated
//!   code) are kept as they are.
//!
//! Both return rules in target order, independent of input order.

use crate::error::{BuildError, BuildResult};
use crate::rules::{RuleHandle, RuleResolver};
use crate::source_path::{SourcePath, SourcePathResolver};
use crate::target::BuildTarget;
use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::PathBuf;
use zip::ZipArchive;

/// Resolve the ABI rule for `abi_target`, declared by `rule`
fn require_abi_rule(
    resolver: &dyn RuleResolver,
    rule: &BuildTarget,
    abi_target: &BuildTarget,
) -> BuildResult<RuleHandle> {
    resolver
        .get_rule(abi_target)
        .ok_or_else(|| BuildError::missing_abi_artifact(rule, abi_target))
}

/// ABI rules of the deps that expose an ABI jar
pub fn abi_rules_of(
    resolver: &dyn RuleResolver,
    deps: &[RuleHandle],
) -> BuildResult<Vec<RuleHandle>> {
    let mut abi_rules = BTreeMap::new();
    for dep in deps {
        let Some(abi_target) = dep.as_abi_capable().and_then(|abi| abi.abi_jar()) else {
            continue;
        };
        let abi_rule = require_abi_rule(resolver, dep.target(), abi_target)?;
        abi_rules.insert(abi_rule.target().clone(), abi_rule);
    }
    Ok(abi_rules.into_values().collect())
}

/// Classpath made of the ABI jars of `deps`
pub fn abi_classpath_of(
    resolver: &dyn RuleResolver,
    deps: &[RuleHandle],
) -> BuildResult<ZipArchiveDependencySupplier> {
    let mut archives = BTreeSet::new();
    for abi_rule in abi_rules_of(resolver, deps)? {
        let output = abi_rule.source_path_to_output().ok_or_else(|| {
            BuildError::missing_abi_artifact(abi_rule.target(), abi_rule.target())
        })?;
        archives.insert(output);
    }
    Ok(ZipArchiveDependencySupplier::new(archives))
}

/// Each dep replaced by its ABI rule when it has one, otherwise kept as is
pub fn abi_substituted_or_original(
    resolver: &dyn RuleResolver,
    deps: &[RuleHandle],
) -> BuildResult<Vec<RuleHandle>> {
    let mut translated = BTreeMap::new();
    for dep in deps {
        let rule = match dep.as_abi_capable().and_then(|abi| abi.abi_jar()) {
            Some(abi_target) => require_abi_rule(resolver, dep.target(), abi_target)?,
            None => dep.clone(),
        };
        translated.insert(rule.target().clone(), rule);
    }
    Ok(translated.into_values().collect())
}

/// A classpath of archives, resolved to filesystem paths only when needed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ZipArchiveDependencySupplier {
    archives: BTreeSet<SourcePath>,
}

impl ZipArchiveDependencySupplier {
    pub fn new(archives: BTreeSet<SourcePath>) -> Self {
        Self { archives }
    }

    /// Unresolved archive references
    pub fn archives(&self) -> &BTreeSet<SourcePath> {
        &self.archives
    }

    pub fn is_empty(&self) -> bool {
        self.archives.is_empty()
    }

    /// Absolute classpath entries
    pub fn resolve(&self, resolver: &dyn SourcePathResolver) -> BTreeSet<PathBuf> {
        self.archives
            .iter()
            .map(|archive| resolver.absolute_path(archive))
            .collect()
    }

    /// Member names of every archive, for hashing the classpath by content
    pub fn archive_entries(
        &self,
        resolver: &dyn SourcePathResolver,
    ) -> BuildResult<BTreeMap<PathBuf, Vec<String>>> {
        let mut entries = BTreeMap::new();
        for path in self.resolve(resolver) {
            let file = File::open(&path).map_err(|e| BuildError::io(&path, e))?;
            let mut archive =
                ZipArchive::new(file).map_err(|e| BuildError::packaging(&path, e))?;

            let mut names = Vec::with_capacity(archive.len());
            for index in 0..archive.len() {
                let entry = archive
                    .by_index(index)
                    .map_err(|e| BuildError::packaging(&path, e))?;
                names.push(entry.name().to_string());
            }
            names.sort();
            entries.insert(path, names);
        }
        Ok(entries)
    }
}
