//! Build rule model consumed by ABI resolution and native library aggregation
//!
//! The dependency graph itself is owned by the build engine. This module only
//! defines the view of it that JVM library planning needs: rule identity and
//! kind, declared dependencies, outputs, and the two capabilities queried by
//! this crate (`HasJavaAbi` and `NativeLinkable`).

use crate::error::{BuildError, BuildResult};
use crate::native::{CxxPlatform, NativeLinkable};
use crate::source_path::SourcePath;
use crate::target::BuildTarget;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Kind of build rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RuleKind {
    /// Compiled JVM library
    JavaLibrary,
    /// ABI jar computed from a library
    CalculateAbi,
    /// Native library producing shared objects
    CxxLibrary,
    /// Arbitrary generated output
    Genrule,
    /// Android resource bundle
    AndroidResource,
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::JavaLibrary => write!(f, "java_library"),
            Self::CalculateAbi => write!(f, "calculate_abi"),
            Self::CxxLibrary => write!(f, "cxx_library"),
            Self::Genrule => write!(f, "genrule"),
            Self::AndroidResource => write!(f, "android_resource"),
        }
    }
}

/// Capability: the rule may expose a distilled interface-only jar
pub trait HasJavaAbi {
    /// Target of the rule producing the ABI jar, when one exists
    fn abi_jar(&self) -> Option<&BuildTarget>;
}

/// A node of the resolved rule graph
pub trait BuildRule: fmt::Debug + Send + Sync {
    fn target(&self) -> &BuildTarget;

    fn kind(&self) -> RuleKind;

    /// Declared build dependencies, in declaration order
    fn build_deps(&self) -> &[BuildTarget];

    /// Primary output of the rule
    fn source_path_to_output(&self) -> Option<SourcePath>;

    /// ABI capability, if this rule kind supports ABI jars at all
    fn as_abi_capable(&self) -> Option<&dyn HasJavaAbi> {
        None
    }

    /// Native linking capability
    fn as_native_linkable(&self) -> Option<&dyn NativeLinkable> {
        None
    }
}

/// Shared handle to a resolved rule
pub type RuleHandle = Arc<dyn BuildRule>;

/// Looks rules up by target
pub trait RuleResolver {
    fn get_rule(&self, target: &BuildTarget) -> Option<RuleHandle>;

    fn require_rule(&self, target: &BuildTarget) -> BuildResult<RuleHandle> {
        self.get_rule(target)
            .ok_or_else(|| BuildError::rule_not_found(target))
    }
}

/// In-memory rule graph keyed by target
#[derive(Debug, Default, Clone)]
pub struct RuleGraph {
    rules: BTreeMap<BuildTarget, RuleHandle>,
}

impl RuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a rule, replacing any rule with the same target
    pub fn add_rule(&mut self, rule: impl BuildRule + 'static) -> RuleHandle {
        let handle: RuleHandle = Arc::new(rule);
        self.rules.insert(handle.target().clone(), Arc::clone(&handle));
        handle
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl RuleResolver for RuleGraph {
    fn get_rule(&self, target: &BuildTarget) -> Option<RuleHandle> {
        self.rules.get(target).cloned()
    }
}

/// A compiled JVM library
#[derive(Debug, Clone)]
pub struct JavaLibraryRule {
    target: BuildTarget,
    deps: Vec<BuildTarget>,
    output_jar: Option<PathBuf>,
    abi_jar: Option<BuildTarget>,
}

impl JavaLibraryRule {
    pub fn new(target: BuildTarget) -> Self {
        Self {
            target,
            deps: Vec::new(),
            output_jar: None,
            abi_jar: None,
        }
    }

    pub fn with_deps(mut self, deps: Vec<BuildTarget>) -> Self {
        self.deps = deps;
        self
    }

    pub fn with_output_jar(mut self, output_jar: impl Into<PathBuf>) -> Self {
        self.output_jar = Some(output_jar.into());
        self
    }

    /// Declare the ABI jar rule, conventionally `target#class-abi`
    pub fn with_abi_jar(mut self, abi_target: BuildTarget) -> Self {
        self.abi_jar = Some(abi_target);
        self
    }
}

impl HasJavaAbi for JavaLibraryRule {
    fn abi_jar(&self) -> Option<&BuildTarget> {
        self.abi_jar.as_ref()
    }
}

impl BuildRule for JavaLibraryRule {
    fn target(&self) -> &BuildTarget {
        &self.target
    }

    fn kind(&self) -> RuleKind {
        RuleKind::JavaLibrary
    }

    fn build_deps(&self) -> &[BuildTarget] {
        &self.deps
    }

    fn source_path_to_output(&self) -> Option<SourcePath> {
        self.output_jar
            .as_ref()
            .map(|jar| SourcePath::output_of(self.target.clone(), jar))
    }

    fn as_abi_capable(&self) -> Option<&dyn HasJavaAbi> {
        Some(self)
    }
}

/// Computes the ABI jar of a library
#[derive(Debug, Clone)]
pub struct CalculateAbiRule {
    target: BuildTarget,
    deps: Vec<BuildTarget>,
    abi_jar: Option<PathBuf>,
}

impl CalculateAbiRule {
    /// ABI rule for `library`; its only dependency is the library itself
    pub fn new(target: BuildTarget, library: BuildTarget) -> Self {
        Self {
            target,
            deps: vec![library],
            abi_jar: None,
        }
    }

    pub fn with_abi_jar(mut self, abi_jar: impl Into<PathBuf>) -> Self {
        self.abi_jar = Some(abi_jar.into());
        self
    }
}

impl BuildRule for CalculateAbiRule {
    fn target(&self) -> &BuildTarget {
        &self.target
    }

    fn kind(&self) -> RuleKind {
        RuleKind::CalculateAbi
    }

    fn build_deps(&self) -> &[BuildTarget] {
        &self.deps
    }

    fn source_path_to_output(&self) -> Option<SourcePath> {
        self.abi_jar
            .as_ref()
            .map(|jar| SourcePath::output_of(self.target.clone(), jar))
    }
}

/// A native library building one shared object per platform
#[derive(Debug, Clone)]
pub struct NativeLibraryRule {
    target: BuildTarget,
    lib_name: String,
    deps: Vec<BuildTarget>,
    outputs: BTreeMap<String, PathBuf>,
}

impl NativeLibraryRule {
    pub fn new(target: BuildTarget, lib_name: impl Into<String>) -> Self {
        Self {
            target,
            lib_name: lib_name.into(),
            deps: Vec::new(),
            outputs: BTreeMap::new(),
        }
    }

    /// Native dependencies linked alongside this library
    pub fn with_deps(mut self, deps: Vec<BuildTarget>) -> Self {
        self.deps = deps;
        self
    }

    /// Shared object built for the platform with the given flavor
    pub fn with_shared_library(
        mut self,
        platform_flavor: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        self.outputs.insert(platform_flavor.into(), path.into());
        self
    }
}

impl NativeLinkable for NativeLibraryRule {
    fn native_link_deps(&self) -> &[BuildTarget] {
        &self.deps
    }

    fn shared_libraries(&self, platform: &CxxPlatform) -> BTreeMap<String, SourcePath> {
        self.outputs
            .get(&platform.flavor)
            .map(|path| {
                BTreeMap::from([(
                    platform.shared_library_soname(&self.lib_name),
                    SourcePath::output_of(self.target.clone(), path),
                )])
            })
            .unwrap_or_default()
    }
}

impl BuildRule for NativeLibraryRule {
    fn target(&self) -> &BuildTarget {
        &self.target
    }

    fn kind(&self) -> RuleKind {
        RuleKind::CxxLibrary
    }

    fn build_deps(&self) -> &[BuildTarget] {
        &self.deps
    }

    fn source_path_to_output(&self) -> Option<SourcePath> {
        None
    }

    fn as_native_linkable(&self) -> Option<&dyn NativeLinkable> {
        Some(self)
    }
}

/// Any rule without JVM or native capabilities (genrules, resource bundles)
#[derive(Debug, Clone)]
pub struct OpaqueRule {
    target: BuildTarget,
    kind: RuleKind,
    deps: Vec<BuildTarget>,
    output: Option<PathBuf>,
}

impl OpaqueRule {
    pub fn new(target: BuildTarget, kind: RuleKind) -> Self {
        Self {
            target,
            kind,
            deps: Vec::new(),
            output: None,
        }
    }

    pub fn with_deps(mut self, deps: Vec<BuildTarget>) -> Self {
        self.deps = deps;
        self
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }
}

impl BuildRule for OpaqueRule {
    fn target(&self) -> &BuildTarget {
        &self.target
    }

    fn kind(&self) -> RuleKind {
        self.kind
    }

    fn build_deps(&self) -> &[BuildTarget] {
        &self.deps
    }

    fn source_path_to_output(&self) -> Option<SourcePath> {
        self.output
            .as_ref()
            .map(|out| SourcePath::output_of(self.target.clone(), out))
    }
}
