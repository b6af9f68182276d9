//! Transitive native library collection for JVM rules

use crate::error::BuildResult;
use crate::rules::{BuildRule, RuleHandle, RuleKind, RuleResolver};
use crate::source_path::SourcePath;
use crate::target::BuildTarget;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// Target platform for native code
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CxxPlatform {
    /// Platform flavor, e.g. `linux-x86_64`
    pub flavor: String,
    /// Shared library file extension without the dot
    pub shared_library_extension: String,
}

impl CxxPlatform {
    pub fn new(flavor: impl Into<String>, shared_library_extension: impl Into<String>) -> Self {
        Self {
            flavor: flavor.into(),
            shared_library_extension: shared_library_extension.into(),
        }
    }

    /// System-specific file name of a shared library
    pub fn shared_library_soname(&self, lib_name: &str) -> String {
        format!("lib{}.{}", lib_name, self.shared_library_extension)
    }
}

/// Capability: the rule contributes shared libraries to the final link
pub trait NativeLinkable {
    /// Native dependencies, in declaration order
    fn native_link_deps(&self) -> &[BuildTarget];

    /// Shared libraries for a platform, keyed by soname
    fn shared_libraries(&self, platform: &CxxPlatform) -> BTreeMap<String, SourcePath>;
}

/// Rule kinds the walk may pass through to reach native linkables. The deps
/// of a JVM rule may be either full libraries or their ABI rules.
pub fn is_native_passthrough(rule: &dyn BuildRule) -> bool {
    matches!(rule.kind(), RuleKind::JavaLibrary | RuleKind::CalculateAbi)
}

/// All transitive native libraries of `deps`, keyed by soname.
///
/// The walk is depth-first in declared dependency order. Native linkables are
/// collected and their native deps followed; any other rule is expanded only
/// if `is_native_passthrough` accepts it. Each rule is visited once. When two
/// linkables provide the same soname the one visited last wins.
pub fn native_libraries_of(
    resolver: &dyn RuleResolver,
    deps: &[RuleHandle],
    platform: &CxxPlatform,
) -> BuildResult<BTreeMap<String, SourcePath>> {
    native_libraries_with(resolver, deps, platform, is_native_passthrough)
}

/// Same as `native_libraries_of` with a caller-supplied traversal predicate
pub fn native_libraries_with<F>(
    resolver: &dyn RuleResolver,
    deps: &[RuleHandle],
    platform: &CxxPlatform,
    traverse: F,
) -> BuildResult<BTreeMap<String, SourcePath>>
where
    F: Fn(&dyn BuildRule) -> bool,
{
    let mut visited = HashSet::new();
    let mut linkables = Vec::new();

    // Explicit stack, pushed in reverse so pops follow declaration order.
    let mut stack: Vec<RuleHandle> = deps.iter().rev().cloned().collect();
    while let Some(rule) = stack.pop() {
        if !visited.insert(rule.target().clone()) {
            continue;
        }

        let next: &[BuildTarget] = if let Some(linkable) = rule.as_native_linkable() {
            linkables.push(rule.clone());
            linkable.native_link_deps()
        } else if traverse(rule.as_ref()) {
            rule.build_deps()
        } else {
            &[]
        };

        for dep in next.iter().rev() {
            if !visited.contains(dep) {
                stack.push(resolver.require_rule(dep)?);
            }
        }
    }

    let mut libraries = BTreeMap::new();
    for rule in &linkables {
        if let Some(linkable) = rule.as_native_linkable() {
            for (soname, path) in linkable.shared_libraries(platform) {
                if let Some(previous) = libraries.insert(soname.clone(), path) {
                    debug!(
                        "Native library {} from {} replaces {}",
                        soname,
                        rule.target(),
                        previous
                    );
                }
            }
        }
    }

    Ok(libraries)
}
