//! Kiln JVM library rules
//!
//! Plans and executes the compilation of JVM libraries into jars:
//! - Compile-to-jar step planning with a fixed, observable stage order
//! - Class usage tracking for incremental rebuilds
//! - ABI substitution of compile-time dependencies
//! - Transitive native library collection
//! - Per-class hashes of library outputs and reloading them from disk
//! - Step execution against a project filesystem

pub mod abi;
pub mod artifacts;
pub mod class_hashes;
pub mod class_usage;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod native;
pub mod package_finder;
pub mod planner;
pub mod rules;
pub mod source_path;
pub mod step;
pub mod target;

// Re-export main types
pub use abi::{
    abi_classpath_of, abi_rules_of, abi_substituted_or_original, ZipArchiveDependencySupplier,
};
pub use artifacts::{BuildableContext, RecordedArtifacts};
pub use class_hashes::{
    accumulate_class_hashes, initialize_from_disk, initialize_from_disk_or_absent, ClassHash,
    ClassHashes, FilesystemBuildInfo, JavaLibraryData, OnDiskBuildInfo,
};
pub use class_usage::{
    ClassUsage, ClassUsageFileWriter, DefaultClassUsageFileWriter, NoOpClassUsageFileWriter,
};
pub use config::JavaConfig;
pub use error::{BuildError, BuildResult};
pub use filesystem::ProjectFilesystem;
pub use native::{native_libraries_of, CxxPlatform, NativeLinkable};
pub use package_finder::{DefaultJavaPackageFinder, JavaPackageFinder, ResourcesRootPackageFinder};
pub use planner::{
    add_accumulate_class_names_step, add_compile_to_jar_steps, ClassUsageTracking,
    CompileToJarRequest, CompileToJarStepFactory, JavacStepFactory, PlanStage, PlanningContext,
};
pub use rules::{BuildRule, HasJavaAbi, RuleGraph, RuleHandle, RuleKind, RuleResolver};
pub use source_path::{DefaultSourcePathResolver, SourcePath, SourcePathResolver};
pub use step::{CompileToJarParams, JarParams, JavaCompiler, Step, StepRunner};
pub use target::BuildTarget;
