//! Compile-to-jar step: compiler invocation, post-processing and packaging

use crate::class_usage::{ClassUsageFileWriter, NoOpClassUsageFileWriter};
use crate::error::{BuildError, BuildResult};
use crate::filesystem::ProjectFilesystem;
use crate::step::jar::{self, JarParams, RemoveClassesPatternsMatcher};
use crate::target::BuildTarget;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, info};

/// Everything one compiler invocation needs, produced by the planner.
///
/// Paths are project-relative unless noted.
#[derive(Debug)]
pub struct CompileToJarParams {
    pub target: BuildTarget,
    /// Sources to compile
    pub sources: BTreeSet<PathBuf>,
    /// Absolute compile-time classpath
    pub classpath: BTreeSet<PathBuf>,
    /// Directory receiving class files
    pub classes_dir: PathBuf,
    /// Annotation processor output directory
    pub generated_code_dir: Option<PathBuf>,
    /// Scratch directory for the compiler
    pub working_dir: Option<PathBuf>,
    /// File listing the sources, one per line
    pub sources_list: PathBuf,
    /// Commands run against the classes directory after compilation
    pub postprocess_classes_commands: Vec<String>,
    /// Classpath visible to post-processing commands
    pub classpath_override: BTreeSet<PathBuf>,
    pub main_class: Option<String>,
    /// Absolute manifest path
    pub manifest: Option<PathBuf>,
    pub output_jar: PathBuf,
    pub usage_writer: Box<dyn ClassUsageFileWriter>,
    pub remove_classes: RemoveClassesPatternsMatcher,
    pub compression_level: i32,
}

impl CompileToJarParams {
    /// Packaging of the compiled classes
    pub fn jar_params(&self) -> JarParams {
        JarParams::new(&self.classes_dir, &self.output_jar)
            .with_main_class(self.main_class.clone())
            .with_manifest(self.manifest.clone())
            .with_remove_classes(self.remove_classes.clone())
            .with_compression_level(self.compression_level)
    }
}

/// The concrete compiler used when a compile step executes
pub trait JavaCompiler: Send + Sync {
    /// Compile `params.sources` into `params.classes_dir`, reporting every
    /// upstream class each source uses to `usage`. Failure carries the
    /// compiler diagnostics.
    fn compile(
        &self,
        filesystem: &ProjectFilesystem,
        params: &CompileToJarParams,
        usage: &mut dyn ClassUsageFileWriter,
    ) -> Result<(), String>;
}

/// Run a compile-to-jar step
pub(crate) fn execute(
    filesystem: &ProjectFilesystem,
    compiler: &dyn JavaCompiler,
    mut params: CompileToJarParams,
) -> BuildResult<()> {
    write_sources_list(filesystem, &params)?;

    // The compiler borrows the params while reporting into the writer.
    let mut usage = std::mem::replace(&mut params.usage_writer, Box::new(NoOpClassUsageFileWriter));
    for source in &params.sources {
        usage.record_source(source);
    }

    info!(
        "Compiling {} sources for {}",
        params.sources.len(),
        params.target
    );
    compiler
        .compile(filesystem, &params, usage.as_mut())
        .map_err(|diagnostics| BuildError::compilation(&params.target, diagnostics))?;

    for command in &params.postprocess_classes_commands {
        run_postprocess_command(filesystem, &params, command)?;
    }

    usage.write_file(filesystem)?;
    jar::write_jar(filesystem, &params.jar_params())
}

fn write_sources_list(filesystem: &ProjectFilesystem, params: &CompileToJarParams) -> BuildResult<()> {
    let path = filesystem.resolve(&params.sources_list);
    let contents: String = params
        .sources
        .iter()
        .map(|source| format!("{}\n", source.display()))
        .collect();
    fs::write(&path, contents).map_err(|e| BuildError::io(&path, e))
}

fn run_postprocess_command(
    filesystem: &ProjectFilesystem,
    params: &CompileToJarParams,
    command: &str,
) -> BuildResult<()> {
    let classes_dir = filesystem.resolve(&params.classes_dir);
    let classpath = env::join_paths(
        params
            .classpath_override
            .iter()
            .map(|entry| filesystem.resolve(entry)),
    )
    .map_err(|e| BuildError::PostProcess {
        command: command.to_string(),
        status: e.to_string(),
    })?;

    let script = format!("{} {}", command, classes_dir.display());
    debug!("Post-processing classes: {}", script);

    let status = Command::new("sh")
        .arg("-c")
        .arg(&script)
        .current_dir(filesystem.root())
        .env("CLASSPATH", classpath)
        .stdin(Stdio::null())
        .status()
        .map_err(|e| BuildError::PostProcess {
            command: command.to_string(),
            status: e.to_string(),
        })?;

    if !status.success() {
        return Err(BuildError::PostProcess {
            command: command.to_string(),
            status: status.to_string(),
        });
    }
    Ok(())
}
