//! Reconciler tests against the real filesystem.

mod sweep_test;

/// Verify the public reconciliation types are exported from the library.
#[test]
fn test_all_bootstrap_types_exported() {
    use debugger_bootstrap::bootstrap::{
        Bootstrapper, FileChange, FileDifferences, FileProbe, FsProbe, WantedVsActual,
    };
    use debugger_bootstrap::debugger::DebuggerInstance;

    let bootstrapper = Bootstrapper::new(FsProbe, DebuggerInstance::new("gdbserver"));
    assert!(!bootstrapper.is_project_loaded());
    assert_eq!(bootstrapper.differences(), FileDifferences::default());
    assert!(bootstrapper.report_wanted_vs_actual().files.is_empty());
    assert!(!FsProbe.exists("/definitely/not/here"));

    let _ = WantedVsActual::default();
    let _ = FileChange::Missing("App".to_string());
}
