//! Compile-to-jar step planning for JVM libraries
//!
//! [`add_compile_to_jar_steps`] turns one library's sources, resources and
//! classpath into an ordered list of steps. The order is a correctness
//! property, not a scheduling hint, so the planner walks a fixed list of
//! named stages ([`PlanStage::ALL`]) and every stage is a single match arm:
//!
//! 1. clean the classes directory (always; resources may land there)
//! 2. copy resources into the classes directory
//! 3. clean the output directory holding the jar and dependency file
//! 4. compile and package, when there are sources
//! 5. package resources alone, when there are no sources but a jar is wanted
//! 6. record the jar as an artifact, exactly once

use crate::artifacts::BuildableContext;
use crate::class_hashes::class_hashes_path;
use crate::class_usage::{ClassUsageFileWriter, DefaultClassUsageFileWriter, NoOpClassUsageFileWriter};
use crate::config::JavaConfig;
use crate::error::{BuildError, BuildResult};
use crate::filesystem::ProjectFilesystem;
use crate::package_finder::{JavaPackageFinder, ResourcesRootPackageFinder};
use crate::source_path::{SourcePath, SourcePathResolver};
use crate::step::jar::DEFAULT_COMPRESSION_LEVEL;
use crate::step::{CompileToJarParams, JarParams, RemoveClassesPatternsMatcher, ResourceCopy, Step};
use crate::target::BuildTarget;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Directory the compiler writes class files to
pub fn classes_dir(target: &BuildTarget, filesystem: &ProjectFilesystem) -> PathBuf {
    filesystem.bin_path(target, "lib__%s__classes")
}

/// Directory holding the library jar and its dependency file
pub fn output_jar_dir_path(target: &BuildTarget, filesystem: &ProjectFilesystem) -> PathBuf {
    filesystem.gen_path(target, "lib__%s__output")
}

/// Conventional location of the library jar
pub fn output_jar_path(target: &BuildTarget, filesystem: &ProjectFilesystem) -> PathBuf {
    output_jar_dir_path(target, filesystem).join(format!("{}.jar", target.short_name))
}

/// Conventional location of the class usage dependency file
pub fn used_classes_file_path(target: &BuildTarget, filesystem: &ProjectFilesystem) -> PathBuf {
    output_jar_dir_path(target, filesystem).join("used-classes.json")
}

/// File listing the sources handed to the compiler
pub fn sources_list_path(target: &BuildTarget, filesystem: &ProjectFilesystem) -> PathBuf {
    filesystem.gen_path(target, "__%s__srcs")
}

/// Compiler scratch directory
pub fn working_directory_path(target: &BuildTarget, filesystem: &ProjectFilesystem) -> PathBuf {
    filesystem.gen_path(target, "lib__%s____working_directory")
}

/// Annotation processor output directory
pub fn annotation_path(target: &BuildTarget, filesystem: &ProjectFilesystem) -> Option<PathBuf> {
    Some(filesystem.annotation_path(target, "__%s_gen__"))
}

/// Whether compilation records per-source class usage
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ClassUsageTracking {
    #[default]
    Disabled,
    /// Write the dependency file to this project-relative path
    Enabled { dep_file: PathBuf },
}

impl ClassUsageTracking {
    /// Tracking at the conventional dependency file path when `enabled`
    pub fn for_target(enabled: bool, target: &BuildTarget, filesystem: &ProjectFilesystem) -> Self {
        if enabled {
            Self::Enabled {
                dep_file: used_classes_file_path(target, filesystem),
            }
        } else {
            Self::Disabled
        }
    }

    pub fn dep_file(&self) -> Option<&Path> {
        match self {
            Self::Disabled => None,
            Self::Enabled { dep_file } => Some(dep_file),
        }
    }
}

/// Inputs of one library compilation, fixed once handed to the planner
#[derive(Debug, Clone)]
pub struct CompileToJarRequest {
    pub target: BuildTarget,
    pub sources: BTreeSet<SourcePath>,
    pub resources: BTreeSet<SourcePath>,
    /// Compile-time classpath only; never part of the rule's dependency closure
    pub classpath: BTreeSet<SourcePath>,
    pub postprocess_classes_commands: Vec<String>,
    pub output_jar: Option<PathBuf>,
    /// Root for resource package inference, replacing the source-root heuristic
    pub resources_root: Option<PathBuf>,
    pub manifest_file: Option<SourcePath>,
    pub remove_classes: RemoveClassesPatternsMatcher,
    pub class_usage: ClassUsageTracking,
}

impl CompileToJarRequest {
    /// Empty request with no jar and tracking disabled
    pub fn new(target: BuildTarget) -> Self {
        Self {
            target,
            sources: BTreeSet::new(),
            resources: BTreeSet::new(),
            classpath: BTreeSet::new(),
            postprocess_classes_commands: Vec::new(),
            output_jar: None,
            resources_root: None,
            manifest_file: None,
            remove_classes: RemoveClassesPatternsMatcher::empty(),
            class_usage: ClassUsageTracking::Disabled,
        }
    }

    /// Request producing the conventional jar, with tracking and class
    /// removal taken from the project configuration
    pub fn from_config(
        target: BuildTarget,
        filesystem: &ProjectFilesystem,
        config: &JavaConfig,
    ) -> BuildResult<Self> {
        let output_jar = output_jar_path(&target, filesystem);
        let class_usage =
            ClassUsageTracking::for_target(config.track_class_usage, &target, filesystem);
        Ok(Self::new(target)
            .with_output_jar(output_jar)
            .with_class_usage(class_usage)
            .with_remove_classes(config.remove_classes_matcher()?))
    }

    pub fn with_sources(mut self, sources: impl IntoIterator<Item = SourcePath>) -> Self {
        self.sources = sources.into_iter().collect();
        self
    }

    pub fn with_resources(mut self, resources: impl IntoIterator<Item = SourcePath>) -> Self {
        self.resources = resources.into_iter().collect();
        self
    }

    pub fn with_classpath(mut self, classpath: impl IntoIterator<Item = SourcePath>) -> Self {
        self.classpath = classpath.into_iter().collect();
        self
    }

    pub fn with_postprocess_classes_commands(mut self, commands: Vec<String>) -> Self {
        self.postprocess_classes_commands = commands;
        self
    }

    pub fn with_output_jar(mut self, output_jar: impl Into<PathBuf>) -> Self {
        self.output_jar = Some(output_jar.into());
        self
    }

    pub fn with_resources_root(mut self, resources_root: impl Into<PathBuf>) -> Self {
        self.resources_root = Some(resources_root.into());
        self
    }

    pub fn with_manifest_file(mut self, manifest_file: SourcePath) -> Self {
        self.manifest_file = Some(manifest_file);
        self
    }

    pub fn with_remove_classes(mut self, remove_classes: RemoveClassesPatternsMatcher) -> Self {
        self.remove_classes = remove_classes;
        self
    }

    pub fn with_class_usage(mut self, class_usage: ClassUsageTracking) -> Self {
        self.class_usage = class_usage;
        self
    }

    /// Check the request once, before any step is planned
    pub fn validate(&self) -> BuildResult<()> {
        self.target.validate()?;

        if !self.sources.is_empty() && self.output_jar.is_none() {
            return Err(BuildError::invalid_request(
                &self.target,
                "sources are compiled into a jar, but no output jar was requested",
            ));
        }
        if let (Some(dep_file), Some(jar)) = (self.class_usage.dep_file(), &self.output_jar) {
            if dep_file == jar.as_path() {
                return Err(BuildError::invalid_request(
                    &self.target,
                    "dependency file and output jar must be different paths",
                ));
            }
        }
        if let Some(root) = &self.resources_root {
            if root.is_absolute() {
                return Err(BuildError::invalid_request(
                    &self.target,
                    format!("resources root must be project-relative: {}", root.display()),
                ));
            }
        }
        Ok(())
    }
}

/// Collaborators used while planning
pub struct PlanningContext<'a> {
    pub filesystem: &'a ProjectFilesystem,
    pub resolver: &'a dyn SourcePathResolver,
    pub package_finder: &'a dyn JavaPackageFinder,
}

/// The compiler frontend as seen by the planner
pub trait CompileToJarStepFactory {
    /// Append the steps that compile `params.sources` and write
    /// `params.output_jar`. May record additional artifacts.
    fn create_compile_to_jar_step(
        &self,
        params: CompileToJarParams,
        steps: &mut Vec<Step>,
        buildable: &mut dyn BuildableContext,
    ) -> BuildResult<()>;

    /// Append the step that packages an already populated directory
    fn create_jar_step(&self, params: JarParams, steps: &mut Vec<Step>);
}

/// Frontend emitting a single compile-and-package step per library
#[derive(Debug, Clone)]
pub struct JavacStepFactory {
    compression_level: i32,
}

impl JavacStepFactory {
    pub fn new() -> Self {
        Self {
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    pub fn from_config(config: &JavaConfig) -> Self {
        Self {
            compression_level: config.compression_level,
        }
    }
}

impl Default for JavacStepFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl CompileToJarStepFactory for JavacStepFactory {
    fn create_compile_to_jar_step(
        &self,
        mut params: CompileToJarParams,
        steps: &mut Vec<Step>,
        _buildable: &mut dyn BuildableContext,
    ) -> BuildResult<()> {
        params.compression_level = self.compression_level;
        steps.push(Step::CompileToJar(Box::new(params)));
        Ok(())
    }

    fn create_jar_step(&self, params: JarParams, steps: &mut Vec<Step>) {
        steps.push(Step::Jar(params.with_compression_level(self.compression_level)));
    }
}

/// Named planning stages, in the only order they may run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStage {
    PrepareClassesDir,
    CopyResources,
    PrepareOutputDir,
    Compile,
    PackageResources,
    DeclareOutput,
}

impl PlanStage {
    pub const ALL: [PlanStage; 6] = [
        Self::PrepareClassesDir,
        Self::CopyResources,
        Self::PrepareOutputDir,
        Self::Compile,
        Self::PackageResources,
        Self::DeclareOutput,
    ];
}

impl fmt::Display for PlanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PrepareClassesDir => "prepare-classes-dir",
            Self::CopyResources => "copy-resources",
            Self::PrepareOutputDir => "prepare-output-dir",
            Self::Compile => "compile",
            Self::PackageResources => "package-resources",
            Self::DeclareOutput => "declare-output",
        };
        f.write_str(name)
    }
}

/// Append the steps that build `request` into a jar.
///
/// Artifacts are recorded on `buildable` as they are planned: the dependency
/// file before the compiler frontend is invoked, the jar last.
pub fn add_compile_to_jar_steps(
    request: &CompileToJarRequest,
    context: &PlanningContext<'_>,
    factory: &dyn CompileToJarStepFactory,
    buildable: &mut dyn BuildableContext,
    steps: &mut Vec<Step>,
) -> BuildResult<()> {
    request.validate()?;

    let target = &request.target;
    let filesystem = context.filesystem;
    let classes_dir = classes_dir(target, filesystem);
    let mut resources = Some(resource_copies(request, context, &classes_dir)?);

    for stage in PlanStage::ALL {
        let planned_before = steps.len();
        match stage {
            PlanStage::PrepareClassesDir => steps.push(Step::MakeCleanDirectory {
                path: classes_dir.clone(),
            }),
            PlanStage::CopyResources => steps.push(Step::CopyResources {
                resources: resources.take().unwrap_or_default(),
            }),
            PlanStage::PrepareOutputDir => steps.push(Step::MakeCleanDirectory {
                path: output_jar_dir_path(target, filesystem),
            }),
            PlanStage::Compile => {
                if let Some(output_jar) = request.output_jar.as_ref() {
                    if !request.sources.is_empty() {
                        plan_compile(
                            request,
                            context,
                            factory,
                            buildable,
                            steps,
                            &classes_dir,
                            output_jar,
                        )?;
                    }
                }
            }
            PlanStage::PackageResources => {
                if let Some(output_jar) = request
                    .output_jar
                    .as_ref()
                    .filter(|_| request.sources.is_empty())
                {
                    let manifest = request
                        .manifest_file
                        .as_ref()
                        .map(|m| context.resolver.absolute_path(m));
                    let params = JarParams::new(&classes_dir, output_jar)
                        .with_manifest(manifest)
                        .with_remove_classes(request.remove_classes.clone());
                    factory.create_jar_step(params, steps);
                }
            }
            PlanStage::DeclareOutput => {
                if let Some(output_jar) = &request.output_jar {
                    buildable.record_artifact(output_jar)?;
                }
            }
        }
        debug!(
            "{}: stage {} planned {} steps",
            target,
            stage,
            steps.len() - planned_before
        );
    }

    Ok(())
}

fn plan_compile(
    request: &CompileToJarRequest,
    context: &PlanningContext<'_>,
    factory: &dyn CompileToJarStepFactory,
    buildable: &mut dyn BuildableContext,
    steps: &mut Vec<Step>,
    classes_dir: &Path,
    output_jar: &Path,
) -> BuildResult<()> {
    let target = &request.target;
    let filesystem = context.filesystem;
    let resolver = context.resolver;

    let usage_writer: Box<dyn ClassUsageFileWriter> = match &request.class_usage {
        ClassUsageTracking::Enabled { dep_file } => {
            buildable.record_artifact(dep_file)?;
            Box::new(DefaultClassUsageFileWriter::new(dep_file))
        }
        ClassUsageTracking::Disabled => Box::new(NoOpClassUsageFileWriter),
    };

    let sources_list = sources_list_path(target, filesystem);
    if let Some(parent) = sources_list.parent() {
        steps.push(Step::Mkdir {
            path: parent.to_path_buf(),
        });
    }

    let working_dir = working_directory_path(target, filesystem);
    steps.push(Step::MakeCleanDirectory {
        path: working_dir.clone(),
    });

    let params = CompileToJarParams {
        target: target.clone(),
        sources: request
            .sources
            .iter()
            .map(|source| resolver.relative_path(source))
            .collect(),
        classpath: request
            .classpath
            .iter()
            .map(|entry| resolver.absolute_path(entry))
            .collect(),
        classes_dir: classes_dir.to_path_buf(),
        generated_code_dir: annotation_path(target, filesystem),
        working_dir: Some(working_dir),
        sources_list,
        postprocess_classes_commands: request.postprocess_classes_commands.clone(),
        classpath_override: BTreeSet::from([classes_dir.to_path_buf()]),
        main_class: None,
        manifest: request
            .manifest_file
            .as_ref()
            .map(|m| resolver.absolute_path(m)),
        output_jar: output_jar.to_path_buf(),
        usage_writer,
        remove_classes: request.remove_classes.clone(),
        compression_level: DEFAULT_COMPRESSION_LEVEL,
    };

    factory.create_compile_to_jar_step(params, steps, buildable)
}

/// Destination of every resource under the classes directory.
///
/// A resource must resolve to a path inside the project; anything else
/// would place its copy outside the classes directory.
fn resource_copies(
    request: &CompileToJarRequest,
    context: &PlanningContext<'_>,
    classes_dir: &Path,
) -> BuildResult<Vec<ResourceCopy>> {
    let rooted;
    let finder: &dyn JavaPackageFinder = match &request.resources_root {
        Some(root) => {
            rooted = ResourcesRootPackageFinder::new(root, context.package_finder);
            &rooted
        }
        None => context.package_finder,
    };

    request
        .resources
        .iter()
        .map(|resource| {
            let local_path = resource_local_path(resource, context);
            if !is_contained(&local_path) {
                return Err(BuildError::invalid_request(
                    &request.target,
                    format!("resource {} is outside the project", resource),
                ));
            }
            let package_folder = finder.find_java_package_folder(&local_path);
            let Some(file_name) = local_path.file_name() else {
                return Err(BuildError::invalid_request(
                    &request.target,
                    format!("resource {} has no file name", resource),
                ));
            };
            if !is_contained(&package_folder) {
                return Err(BuildError::invalid_request(
                    &request.target,
                    format!(
                        "resource {} maps to package folder {} outside the classes directory",
                        resource,
                        package_folder.display()
                    ),
                ));
            }
            Ok(ResourceCopy {
                source: context.resolver.absolute_path(resource),
                destination: classes_dir.join(package_folder).join(file_name),
            })
        })
        .collect()
}

/// Relative, and never climbing out through `..`
fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
}

/// Path used for package inference. A generated resource is treated as if
/// it lived in its producing rule's package.
fn resource_local_path(resource: &SourcePath, context: &PlanningContext<'_>) -> PathBuf {
    let relative = context.resolver.relative_path(resource);
    let Some(target) = resource.rule_target() else {
        return relative;
    };
    let gen_dir = context.filesystem.gen_path(target, "");
    match relative.strip_prefix(&gen_dir) {
        Ok(rest) => Path::new(&target.base_path).join(rest),
        Err(_) => relative,
    }
}

/// Append the steps that hash every class of a library's output and record
/// the class-hash file as an artifact
pub fn add_accumulate_class_names_step(
    target: &BuildTarget,
    context: &PlanningContext<'_>,
    output: Option<&SourcePath>,
    buildable: &mut dyn BuildableContext,
    steps: &mut Vec<Step>,
) -> BuildResult<()> {
    let path = class_hashes_path(target, context.filesystem);
    if let Some(parent) = path.parent() {
        steps.push(Step::Mkdir {
            path: parent.to_path_buf(),
        });
    }
    steps.push(Step::AccumulateClassNames {
        input: output.map(|o| context.resolver.relative_path(o)),
        output: path.clone(),
    });
    buildable.record_artifact(&path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_paths() {
        let filesystem = ProjectFilesystem::new("/repo");
        let target = BuildTarget::new("java/com/example", "lib");

        assert_eq!(
            classes_dir(&target, &filesystem),
            PathBuf::from("buck-out/bin/java/com/example/lib__lib__classes")
        );
        assert_eq!(
            output_jar_path(&target, &filesystem),
            PathBuf::from("buck-out/gen/java/com/example/lib__lib__output/lib.jar")
        );
        assert_eq!(
            used_classes_file_path(&target, &filesystem),
            PathBuf::from("buck-out/gen/java/com/example/lib__lib__output/used-classes.json")
        );
        assert_eq!(
            working_directory_path(&target, &filesystem),
            PathBuf::from("buck-out/gen/java/com/example/lib__lib____working_directory")
        );
        assert_eq!(
            annotation_path(&target, &filesystem),
            Some(PathBuf::from("buck-out/annotation/java/com/example/__lib_gen__"))
        );
    }

    #[test]
    fn test_sources_require_jar() {
        let request = CompileToJarRequest::new(BuildTarget::new("java", "lib"))
            .with_sources([SourcePath::path("java/A.java")]);
        let err = request.validate().unwrap_err();
        assert!(matches!(err, BuildError::InvalidRequest { .. }));
    }

    #[test]
    fn test_dep_file_must_differ_from_jar() {
        let request = CompileToJarRequest::new(BuildTarget::new("java", "lib"))
            .with_output_jar("out/lib.jar")
            .with_class_usage(ClassUsageTracking::Enabled {
                dep_file: PathBuf::from("out/lib.jar"),
            });
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_stage_order_is_fixed() {
        let names: Vec<String> = PlanStage::ALL.iter().map(ToString::to_string).collect();
        assert_eq!(
            names,
            vec![
                "prepare-classes-dir",
                "copy-resources",
                "prepare-output-dir",
                "compile",
                "package-resources",
                "declare-output",
            ]
        );
    }
}
