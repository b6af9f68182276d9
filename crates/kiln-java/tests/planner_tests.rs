//! Compile-to-jar planning tests
//!
//! Step order, artifact declaration and end-to-end execution of planned steps

use kiln_java::artifacts::{BuildableContext, RecordedArtifacts};
use kiln_java::class_usage::read_class_usage_file;
use kiln_java::planner::{
    classes_dir, output_jar_dir_path, output_jar_path, used_classes_file_path,
    working_directory_path,
};
use kiln_java::step::fs::ResourceCopy;
use kiln_java::{
    add_accumulate_class_names_step, add_compile_to_jar_steps, BuildError, BuildResult,
    BuildTarget, ClassUsageFileWriter, ClassUsageTracking, CompileToJarParams,
    CompileToJarRequest, CompileToJarStepFactory, DefaultJavaPackageFinder,
    DefaultSourcePathResolver, JarParams, JavaCompiler, JavaConfig, JavacStepFactory,
    PlanningContext, ProjectFilesystem, SourcePath, Step, StepRunner,
};
use pretty_assertions::assert_eq;
use rstest::rstest;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use zip::ZipArchive;

/// Writes one empty class per source and reports a fixed library class as used
struct FakeCompiler;

impl JavaCompiler for FakeCompiler {
    fn compile(
        &self,
        filesystem: &ProjectFilesystem,
        params: &CompileToJarParams,
        usage: &mut dyn ClassUsageFileWriter,
    ) -> Result<(), String> {
        let package_dir = filesystem.resolve(&params.classes_dir).join("com/example");
        fs::create_dir_all(&package_dir).map_err(|e| e.to_string())?;
        for source in &params.sources {
            let stem = source
                .file_stem()
                .ok_or_else(|| format!("bad source {}", source.display()))?;
            let class_file = package_dir.join(format!("{}.class", stem.to_string_lossy()));
            fs::write(class_file, b"\xca\xfe\xba\xbe").map_err(|e| e.to_string())?;
            usage.record_usage(source, "com.lib.X");
        }
        Ok(())
    }
}

struct Project {
    dir: TempDir,
    filesystem: ProjectFilesystem,
    resolver: DefaultSourcePathResolver,
    finder: DefaultJavaPackageFinder,
}

impl Project {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let filesystem = ProjectFilesystem::new(dir.path());
        let resolver = DefaultSourcePathResolver::new(filesystem.clone());
        let finder = JavaConfig::default().package_finder();
        Self {
            dir,
            filesystem,
            resolver,
            finder,
        }
    }

    fn context(&self) -> PlanningContext<'_> {
        PlanningContext {
            filesystem: &self.filesystem,
            resolver: &self.resolver,
            package_finder: &self.finder,
        }
    }

    fn write(&self, path: &str, contents: &str) {
        let path = self.dir.path().join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn plan(&self, request: &CompileToJarRequest) -> (Vec<Step>, RecordedArtifacts) {
        let mut steps = Vec::new();
        let mut artifacts = RecordedArtifacts::new();
        add_compile_to_jar_steps(
            request,
            &self.context(),
            &JavacStepFactory::new(),
            &mut artifacts,
            &mut steps,
        )
        .unwrap();
        (steps, artifacts)
    }
}

fn short_names(steps: &[Step]) -> Vec<&'static str> {
    steps.iter().map(Step::short_name).collect()
}

fn jar_entries(path: &Path) -> Vec<String> {
    let mut archive = ZipArchive::new(File::open(path).unwrap()).unwrap();
    (0..archive.len())
        .map(|i| archive.by_index(i).unwrap().name().to_string())
        .collect()
}

fn target(name: &str) -> BuildTarget {
    BuildTarget::new("java/com/example", name)
}

#[test]
fn test_library_with_sources_and_tracking() {
    let project = Project::new();
    let t = target("T");
    let request = CompileToJarRequest::new(t.clone())
        .with_sources([
            SourcePath::path("java/com/example/A.java"),
            SourcePath::path("java/com/example/B.java"),
        ])
        .with_classpath([SourcePath::path("third-party/libX.jar")])
        .with_output_jar(output_jar_path(&t, &project.filesystem))
        .with_class_usage(ClassUsageTracking::for_target(true, &t, &project.filesystem));

    let (steps, artifacts) = project.plan(&request);

    assert_eq!(
        short_names(&steps),
        vec![
            "make_clean_dir",
            "copy_resources",
            "make_clean_dir",
            "mkdir",
            "make_clean_dir",
            "javac"
        ]
    );

    match &steps[1] {
        Step::CopyResources { resources } => assert!(resources.is_empty()),
        other => panic!("expected resource copy, got {other}"),
    }
    match &steps[4] {
        Step::MakeCleanDirectory { path } => {
            assert_eq!(path, &working_directory_path(&t, &project.filesystem))
        }
        other => panic!("expected working directory, got {other}"),
    }

    let dep_file = used_classes_file_path(&t, &project.filesystem);
    let jar = output_jar_path(&t, &project.filesystem);
    match &steps[5] {
        Step::CompileToJar(params) => {
            assert_eq!(
                params.sources,
                BTreeSet::from([
                    PathBuf::from("java/com/example/A.java"),
                    PathBuf::from("java/com/example/B.java"),
                ])
            );
            assert_eq!(
                params.classpath,
                BTreeSet::from([project.dir.path().join("third-party/libX.jar")])
            );
            assert_eq!(
                params.classpath_override,
                BTreeSet::from([classes_dir(&t, &project.filesystem)])
            );
            assert_eq!(params.main_class, None);
            assert_eq!(params.output_jar, jar);
            assert_eq!(params.usage_writer.dep_file(), Some(dep_file.as_path()));
        }
        other => panic!("expected compile step, got {other}"),
    }

    assert_eq!(artifacts.artifacts(), &[dep_file.clone(), jar.clone()]);

    StepRunner::new(&project.filesystem)
        .with_compiler(&FakeCompiler)
        .run(steps)
        .unwrap();

    let usage = read_class_usage_file(&project.filesystem.resolve(&dep_file)).unwrap();
    assert_eq!(
        usage.keys().cloned().collect::<Vec<_>>(),
        vec![
            PathBuf::from("java/com/example/A.java"),
            PathBuf::from("java/com/example/B.java"),
        ]
    );
    assert!(usage.values().all(|classes| classes.contains("com.lib.X")));

    let entries = jar_entries(&project.filesystem.resolve(&jar));
    assert!(entries.contains(&"com/example/A.class".to_string()));
    assert!(entries.contains(&"com/example/B.class".to_string()));
}

#[test]
fn test_resources_only_library() {
    let project = Project::new();
    project.write("java/com/example/R.txt", "resource");
    let u = target("U");
    let request = CompileToJarRequest::new(u.clone())
        .with_resources([SourcePath::path("java/com/example/R.txt")])
        .with_output_jar(output_jar_path(&u, &project.filesystem))
        .with_class_usage(ClassUsageTracking::for_target(true, &u, &project.filesystem));

    let (steps, artifacts) = project.plan(&request);

    assert_eq!(
        short_names(&steps),
        vec!["make_clean_dir", "copy_resources", "make_clean_dir", "jar"]
    );

    let classes = classes_dir(&u, &project.filesystem);
    match &steps[1] {
        Step::CopyResources { resources } => assert_eq!(
            resources,
            &vec![ResourceCopy {
                source: project.dir.path().join("java/com/example/R.txt"),
                destination: classes.join("com/example/R.txt"),
            }]
        ),
        other => panic!("expected resource copy, got {other}"),
    }
    match &steps[3] {
        Step::Jar(params) => assert_eq!(params.classes_dir, classes),
        other => panic!("expected jar step, got {other}"),
    }

    // Nothing is compiled, so no dependency file is declared
    let jar = output_jar_path(&u, &project.filesystem);
    assert_eq!(artifacts.artifacts(), &[jar.clone()]);

    StepRunner::new(&project.filesystem).run(steps).unwrap();

    let entries = jar_entries(&project.filesystem.resolve(&jar));
    assert_eq!(entries[0], "META-INF/");
    assert_eq!(entries[1], "META-INF/MANIFEST.MF");
    assert!(entries.contains(&"com/example/R.txt".to_string()));
}

#[test]
fn test_empty_library_still_cleans_classes_dir_first() {
    let project = Project::new();
    let request = CompileToJarRequest::new(target("empty"));

    let (steps, artifacts) = project.plan(&request);

    assert_eq!(
        short_names(&steps),
        vec!["make_clean_dir", "copy_resources", "make_clean_dir"]
    );
    match &steps[0] {
        Step::MakeCleanDirectory { path } => {
            assert_eq!(path, &classes_dir(&target("empty"), &project.filesystem))
        }
        other => panic!("expected classes dir, got {other}"),
    }
    assert!(artifacts.is_empty());
}

#[test]
fn test_output_dir_cleaned_without_sources() {
    let project = Project::new();
    let lib = target("lib");
    let request = CompileToJarRequest::new(lib.clone())
        .with_output_jar(output_jar_path(&lib, &project.filesystem));

    let (steps, _) = project.plan(&request);

    match &steps[2] {
        Step::MakeCleanDirectory { path } => {
            assert_eq!(path, &output_jar_dir_path(&lib, &project.filesystem))
        }
        other => panic!("expected output dir, got {other}"),
    }
}

#[test]
fn test_disabled_tracking_uses_noop_writer() {
    let project = Project::new();
    let lib = target("lib");
    let request = CompileToJarRequest::new(lib.clone())
        .with_sources([SourcePath::path("java/com/example/A.java")])
        .with_output_jar(output_jar_path(&lib, &project.filesystem));

    let (steps, artifacts) = project.plan(&request);

    let Some(Step::CompileToJar(params)) = steps.last() else {
        panic!("expected compile step last");
    };
    assert_eq!(params.usage_writer.dep_file(), None);
    assert_eq!(
        artifacts.artifacts(),
        &[output_jar_path(&lib, &project.filesystem)]
    );
}

#[test]
fn test_resources_root_overrides_package_inference() {
    let project = Project::new();
    let lib = target("lib");
    let request = CompileToJarRequest::new(lib.clone())
        .with_resources([
            SourcePath::path("res/main/org/acme/strings.properties"),
            SourcePath::path("java/com/example/config.json"),
        ])
        .with_resources_root("res/main");

    let (steps, _) = project.plan(&request);

    let classes = classes_dir(&lib, &project.filesystem);
    let Step::CopyResources { resources } = &steps[1] else {
        panic!("expected resource copy");
    };
    let destinations: Vec<PathBuf> = resources.iter().map(|r| r.destination.clone()).collect();
    assert_eq!(
        destinations,
        vec![
            classes.join("com/example/config.json"),
            classes.join("org/acme/strings.properties"),
        ]
    );
}

#[test]
fn test_generated_resource_lands_in_producer_package() {
    let project = Project::new();
    let lib = target("lib");
    let producer = BuildTarget::new("java/com/example/gen", "props");
    let generated = project
        .filesystem
        .gen_path(&producer, "build.properties");
    let request = CompileToJarRequest::new(lib.clone())
        .with_resources([SourcePath::output_of(producer, generated)]);

    let (steps, _) = project.plan(&request);

    let Step::CopyResources { resources } = &steps[1] else {
        panic!("expected resource copy");
    };
    assert_eq!(
        resources[0].destination,
        classes_dir(&lib, &project.filesystem).join("com/example/gen/build.properties")
    );
}

#[test]
fn test_sources_without_jar_rejected_before_planning() {
    let project = Project::new();
    let request = CompileToJarRequest::new(target("lib"))
        .with_sources([SourcePath::path("java/com/example/A.java")]);

    let mut steps = Vec::new();
    let mut artifacts = RecordedArtifacts::new();
    let err = add_compile_to_jar_steps(
        &request,
        &project.context(),
        &JavacStepFactory::new(),
        &mut artifacts,
        &mut steps,
    )
    .unwrap_err();

    assert!(matches!(err, BuildError::InvalidRequest { .. }));
    assert!(steps.is_empty());
    assert!(artifacts.is_empty());
}

#[test]
fn test_jar_declared_once_per_build() {
    let project = Project::new();
    let lib = target("lib");
    let request = CompileToJarRequest::new(lib.clone())
        .with_output_jar(output_jar_path(&lib, &project.filesystem));

    let mut steps = Vec::new();
    let mut artifacts = RecordedArtifacts::new();
    let factory = JavacStepFactory::new();
    add_compile_to_jar_steps(&request, &project.context(), &factory, &mut artifacts, &mut steps)
        .unwrap();

    let err = add_compile_to_jar_steps(
        &request,
        &project.context(),
        &factory,
        &mut artifacts,
        &mut steps,
    )
    .unwrap_err();
    assert!(matches!(err, BuildError::DuplicateArtifact { .. }));
}

#[test]
fn test_request_from_config() {
    let project = Project::new();
    let config = JavaConfig::from_toml_str(
        "[java]\ntrack_class_usage = false\nremove_classes = [\"BuildConfig$\"]\n",
    )
    .unwrap();
    let lib = target("lib");

    let request = CompileToJarRequest::from_config(lib.clone(), &project.filesystem, &config)
        .unwrap();

    assert_eq!(request.output_jar, Some(output_jar_path(&lib, &project.filesystem)));
    assert_eq!(request.class_usage, ClassUsageTracking::Disabled);
    assert!(request
        .remove_classes
        .should_remove_class("com.example.BuildConfig"));
}

/// Frontend that also declares an ABI jar next to the library jar
struct AbiEmittingFactory {
    inner: JavacStepFactory,
}

impl CompileToJarStepFactory for AbiEmittingFactory {
    fn create_compile_to_jar_step(
        &self,
        params: CompileToJarParams,
        steps: &mut Vec<Step>,
        buildable: &mut dyn BuildableContext,
    ) -> BuildResult<()> {
        buildable.record_artifact(&params.output_jar.with_extension("abi.jar"))?;
        self.inner.create_compile_to_jar_step(params, steps, buildable)
    }

    fn create_jar_step(&self, params: JarParams, steps: &mut Vec<Step>) {
        self.inner.create_jar_step(params, steps)
    }
}

#[test]
fn test_frontend_artifacts_precede_jar() {
    let project = Project::new();
    let lib = target("lib");
    let jar = output_jar_path(&lib, &project.filesystem);
    let request = CompileToJarRequest::new(lib.clone())
        .with_sources([SourcePath::path("java/com/example/A.java")])
        .with_output_jar(&jar)
        .with_class_usage(ClassUsageTracking::for_target(true, &lib, &project.filesystem));

    let mut steps = Vec::new();
    let mut artifacts = RecordedArtifacts::new();
    let factory = AbiEmittingFactory {
        inner: JavacStepFactory::new(),
    };
    add_compile_to_jar_steps(&request, &project.context(), &factory, &mut artifacts, &mut steps)
        .unwrap();

    assert_eq!(
        artifacts.artifacts(),
        &[
            used_classes_file_path(&lib, &project.filesystem),
            jar.with_extension("abi.jar"),
            jar,
        ]
    );
}

#[test]
fn test_accumulate_class_names_after_compile() {
    let project = Project::new();
    let lib = target("lib");
    let jar = output_jar_path(&lib, &project.filesystem);
    let request = CompileToJarRequest::new(lib.clone())
        .with_sources([SourcePath::path("java/com/example/A.java")])
        .with_output_jar(&jar);

    let (mut steps, mut artifacts) = project.plan(&request);
    add_accumulate_class_names_step(
        &lib,
        &project.context(),
        Some(&SourcePath::output_of(lib.clone(), &jar)),
        &mut artifacts,
        &mut steps,
    )
    .unwrap();

    let hashes_file = project.filesystem.gen_path(&lib, "%s.classes.txt");
    assert_eq!(artifacts.artifacts().last(), Some(&hashes_file));
    assert_eq!(steps.last().map(Step::short_name), Some("accumulate_class_names"));

    StepRunner::new(&project.filesystem)
        .with_compiler(&FakeCompiler)
        .run(steps)
        .unwrap();

    let contents = fs::read_to_string(project.filesystem.resolve(&hashes_file)).unwrap();
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines.len(), 1);
    assert!(lines[0].starts_with("com.example.A "));
}

#[test]
fn test_compiler_failure_stops_execution() {
    struct FailingCompiler;

    impl JavaCompiler for FailingCompiler {
        fn compile(
            &self,
            _filesystem: &ProjectFilesystem,
            _params: &CompileToJarParams,
            _usage: &mut dyn ClassUsageFileWriter,
        ) -> Result<(), String> {
            Err("A.java:1: error: ';' expected".to_string())
        }
    }

    let project = Project::new();
    let lib = target("lib");
    let jar = output_jar_path(&lib, &project.filesystem);
    let request = CompileToJarRequest::new(lib.clone())
        .with_sources([SourcePath::path("java/com/example/A.java")])
        .with_output_jar(&jar);

    let (steps, _) = project.plan(&request);
    let err = StepRunner::new(&project.filesystem)
        .with_compiler(&FailingCompiler)
        .run(steps)
        .unwrap_err();

    match err {
        BuildError::Compilation { diagnostics, .. } => assert!(diagnostics.contains("expected")),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!project.filesystem.resolve(&jar).exists());
}

#[rstest]
#[case::absolute_outside_project(true)]
#[case::climbs_out_of_project(false)]
fn test_resource_outside_project_rejected(#[case] absolute: bool) {
    let shared = TempDir::new().unwrap();
    fs::create_dir_all(shared.path().join("res")).unwrap();
    let outside = shared.path().join("res/R.txt");
    fs::write(&outside, "precious").unwrap();

    let project = Project::new();
    let resource = if absolute {
        SourcePath::path(&outside)
    } else {
        SourcePath::path("../elsewhere/res/R.txt")
    };
    let lib = target("lib");
    let request = CompileToJarRequest::new(lib.clone())
        .with_resources([resource])
        .with_output_jar(output_jar_path(&lib, &project.filesystem));

    let mut steps = Vec::new();
    let mut artifacts = RecordedArtifacts::new();
    let err = add_compile_to_jar_steps(
        &request,
        &project.context(),
        &JavacStepFactory::new(),
        &mut artifacts,
        &mut steps,
    )
    .unwrap_err();

    assert!(matches!(err, BuildError::InvalidRequest { .. }));
    assert!(steps.is_empty());
    assert!(artifacts.is_empty());
    assert_eq!(fs::read_to_string(&outside).unwrap(), "precious");
}
