//! Build steps and their execution
//!
//! Planning produces an ordered `Vec<Step>`. Steps are plain descriptions
//! until a [`StepRunner`] executes them, in order, against a project
//! filesystem. Each step either fully succeeds or fails the build.

pub mod compile;
pub mod fs;
pub mod jar;

pub use compile::{CompileToJarParams, JavaCompiler};
pub use fs::ResourceCopy;
pub use jar::{JarParams, RemoveClassesPatternsMatcher};

use crate::class_hashes;
use crate::error::{BuildError, BuildResult};
use crate::filesystem::ProjectFilesystem;
use std::fmt;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, info};

/// One build action
#[derive(Debug)]
pub enum Step {
    /// Delete a directory if present and recreate it empty
    MakeCleanDirectory { path: PathBuf },
    /// Create a directory and its parents
    Mkdir { path: PathBuf },
    /// Copy resources into the classes directory
    CopyResources { resources: Vec<ResourceCopy> },
    /// Compile sources and package the classes into a jar
    CompileToJar(Box<CompileToJarParams>),
    /// Package a directory into a jar
    Jar(JarParams),
    /// Hash every class of a jar or directory into a class-hash file
    AccumulateClassNames {
        input: Option<PathBuf>,
        output: PathBuf,
    },
}

impl Step {
    /// Short stable name of the step kind
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::MakeCleanDirectory { .. } => "make_clean_dir",
            Self::Mkdir { .. } => "mkdir",
            Self::CopyResources { .. } => "copy_resources",
            Self::CompileToJar(_) => "javac",
            Self::Jar(_) => "jar",
            Self::AccumulateClassNames { .. } => "accumulate_class_names",
        }
    }

    /// Execute the step
    pub fn execute(self, context: &ExecutionContext<'_>) -> BuildResult<()> {
        let filesystem = context.filesystem;
        match self {
            Self::MakeCleanDirectory { path } => fs::make_clean_directory(filesystem, &path),
            Self::Mkdir { path } => fs::mkdir(filesystem, &path),
            Self::CopyResources { resources } => fs::copy_resources(filesystem, &resources),
            Self::CompileToJar(params) => {
                let compiler = context.compiler.ok_or_else(|| {
                    BuildError::compilation(&params.target, "no compiler configured")
                })?;
                compile::execute(filesystem, compiler, *params)
            }
            Self::Jar(params) => jar::write_jar(filesystem, &params),
            Self::AccumulateClassNames { input, output } => {
                let hashes = class_hashes::accumulate_class_hashes(filesystem, input.as_deref())?;
                class_hashes::write_class_hashes(&filesystem.resolve(&output), &hashes)
            }
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MakeCleanDirectory { path } => {
                write!(f, "rm -rf {0} && mkdir -p {0}", path.display())
            }
            Self::Mkdir { path } => write!(f, "mkdir -p {}", path.display()),
            Self::CopyResources { resources } => {
                write!(f, "copy {} resources", resources.len())
            }
            Self::CompileToJar(params) => write!(
                f,
                "javac {} sources -d {} && jar {}",
                params.sources.len(),
                params.classes_dir.display(),
                params.output_jar.display()
            ),
            Self::Jar(params) => write!(
                f,
                "jar {} -C {}",
                params.output_jar.display(),
                params.classes_dir.display()
            ),
            Self::AccumulateClassNames { input, output } => match input {
                Some(input) => write!(
                    f,
                    "get_class_names {} > {}",
                    input.display(),
                    output.display()
                ),
                None => write!(f, "get_class_names > {}", output.display()),
            },
        }
    }
}

/// What steps execute against
pub struct ExecutionContext<'a> {
    pub filesystem: &'a ProjectFilesystem,
    pub compiler: Option<&'a dyn JavaCompiler>,
}

/// Executes steps strictly in order, stopping at the first failure
pub struct StepRunner<'a> {
    context: ExecutionContext<'a>,
}

impl<'a> StepRunner<'a> {
    pub fn new(filesystem: &'a ProjectFilesystem) -> Self {
        Self {
            context: ExecutionContext {
                filesystem,
                compiler: None,
            },
        }
    }

    /// Compiler used by compile steps
    pub fn with_compiler(mut self, compiler: &'a dyn JavaCompiler) -> Self {
        self.context.compiler = Some(compiler);
        self
    }

    /// Run all steps
    pub fn run(&self, steps: Vec<Step>) -> BuildResult<()> {
        let start = Instant::now();
        let total = steps.len();
        for (index, step) in steps.into_iter().enumerate() {
            debug!("[{}/{}] {}", index + 1, total, step);
            step.execute(&self.context)?;
        }
        info!(
            "Ran {} steps in {:.2}s",
            total,
            start.elapsed().as_secs_f64()
        );
        Ok(())
    }
}
