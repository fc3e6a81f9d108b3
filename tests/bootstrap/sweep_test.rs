//! Sweeps over real files with a recording controller.

use debugger_bootstrap::bootstrap::{Bootstrapper, FileChange, FsProbe};
use debugger_bootstrap::debugger::ProcessController;
use debugger_bootstrap::protocol::ProjectDescription;
use tempfile::TempDir;

#[derive(Debug, Default)]
struct Recorder {
    calls: Vec<String>,
}

impl ProcessController for Recorder {
    fn start(&mut self, program: &str, args: &[String]) -> bool {
        self.calls.push(format!("start {program} {}", args.join(" ")).trim_end().to_string());
        true
    }

    fn stop(&mut self) -> bool {
        self.calls.push("stop".to_string());
        true
    }
}

struct Project {
    dir: TempDir,
}

impl Project {
    fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    fn path(&self, name: &str) -> String {
        self.dir.path().join(name).to_str().unwrap().to_string()
    }

    fn write(&self, name: &str, content: &str) -> String {
        let path = self.path(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn digest(&self, content: &str) -> String {
        let scratch = self.write(".scratch", content);
        let digest = FsProbe::hash_file(&scratch).unwrap();
        std::fs::remove_file(scratch).unwrap();
        digest
    }
}

fn calls(bootstrapper: &Bootstrapper<FsProbe, Recorder>) -> &[String] {
    &bootstrapper.controller().calls
}

#[test]
fn test_sweep_follows_deploy_of_missing_library() {
    let project = Project::new();
    let exe = project.write("app", "app v1");
    let lib = project.path("libfoo.so");
    let description = ProjectDescription::new(exe.as_str(), project.digest("app v1"))
        .with_dependency(lib.as_str(), project.digest("lib v1"))
        .with_arguments(["--port", "9"]);

    let mut bootstrapper = Bootstrapper::new(FsProbe, Recorder::default());
    bootstrapper.receive(description);
    assert_eq!(bootstrapper.report_missing(), [lib.clone()]);
    assert!(!bootstrapper.is_debugger_running());

    bootstrapper.sweep();
    assert!(!bootstrapper.is_debugger_running());

    // Deployed the usual way: written aside, then renamed into place.
    let staged = project.write("libfoo.so.tmp", "lib v1");
    std::fs::rename(staged, &lib).unwrap();

    let before = bootstrapper.differences();
    bootstrapper.sweep();
    assert_eq!(
        bootstrapper.differences().changes_since(&before),
        vec![FileChange::Found(lib)]
    );
    assert!(bootstrapper.is_debugger_running());
    assert_eq!(
        calls(&bootstrapper).last().unwrap(),
        &format!("start {exe} --port 9")
    );
}

/// Edits to a matching file arrive as an explicit update; the sweep then
/// keeps rehashing it until it matches again.
#[test]
fn test_reported_change_is_tracked_until_restored() {
    let project = Project::new();
    let exe = project.write("app", "good");
    let mut bootstrapper = Bootstrapper::new(FsProbe, Recorder::default());
    bootstrapper.receive(ProjectDescription::new(exe.as_str(), project.digest("good")));
    assert!(bootstrapper.is_debugger_running());

    project.write("app", "bad");
    let before = bootstrapper.differences();
    bootstrapper.update_file_hash(&exe);
    let changes = bootstrapper.differences().changes_since(&before);
    assert!(matches!(&changes[..], [FileChange::Mismatch { file, .. }] if *file == exe));
    assert!(!bootstrapper.is_debugger_running());
    assert_eq!(
        bootstrapper.report_wanted_vs_actual().mismatched().collect::<Vec<_>>(),
        vec![exe.as_str()]
    );

    project.write("app", "good");
    bootstrapper.sweep();
    assert!(bootstrapper.is_debugger_running());
    assert_eq!(
        calls(&bootstrapper).iter().filter(|call| call.starts_with("start")).count(),
        2
    );
}

#[test]
fn test_sweep_after_delete_reports_missing() {
    let project = Project::new();
    let exe = project.write("app", "app");
    let mut bootstrapper = Bootstrapper::new(FsProbe, Recorder::default());
    bootstrapper.receive(ProjectDescription::new(exe.as_str(), project.digest("app")));

    std::fs::remove_file(&exe).unwrap();
    bootstrapper.sweep();

    assert_eq!(bootstrapper.report_missing(), [exe]);
    assert!(bootstrapper.report_wanted_vs_actual().files.is_empty());
    assert!(!bootstrapper.is_debugger_running());
    assert_eq!(calls(&bootstrapper).last().unwrap(), "stop");
}

#[test]
fn test_directory_in_place_of_file_counts_as_missing() {
    let project = Project::new();
    let exe = project.path("app");
    std::fs::create_dir(&exe).unwrap();
    let mut bootstrapper = Bootstrapper::new(FsProbe, Recorder::default());

    bootstrapper.receive(ProjectDescription::new(exe.as_str(), project.digest("app")));
    bootstrapper.sweep();

    assert_eq!(bootstrapper.report_missing(), [exe]);
    assert!(calls(&bootstrapper).is_empty());
}
