//! End-to-end behavior of the event loop over real sockets, files and processes.

use std::path::{Path, PathBuf};

use debugger_bootstrap::bootstrap::FsProbe;
use debugger_bootstrap::debugger::SupervisedProcess;
use debugger_bootstrap::protocol::{tag, ProjectDescription};
use debugger_bootstrap::server::Role;
use debugger_bootstrap::watcher::ProjectWatcher;
use tempfile::TempDir;

use super::{dispatcher, pump, pump_until, send, Dispatcher, Subscriber};

const SLEEPER: &str = "echo \"debugging $0 $*\"; exec sleep 30";

fn path(dir: &TempDir, name: &str) -> String {
    dir.path().join(name).to_str().unwrap().to_string()
}

/// SHA-256 of `content`, computed the way the server hashes files.
fn digest(content: &str) -> String {
    let dir = TempDir::new().unwrap();
    let file: PathBuf = dir.path().join("content");
    std::fs::write(&file, content).unwrap();
    FsProbe::hash_file(&file).unwrap()
}

fn write(file: impl AsRef<Path>, content: &str) {
    std::fs::write(file, content).unwrap();
}

fn subscribers(dispatcher: &Dispatcher) -> usize {
    dispatcher
        .roles()
        .into_iter()
        .filter(|role| *role == Role::SubscribedClient)
        .count()
}

fn subscribe(dispatcher: &mut Dispatcher) -> Subscriber {
    let before = subscribers(dispatcher);
    let subscriber = Subscriber::connect(dispatcher.local_addr().unwrap());
    for _ in 0..50 {
        if subscribers(dispatcher) > before {
            return subscriber;
        }
        dispatcher.poll_once().unwrap();
    }
    panic!("subscription was never registered");
}

fn push(dispatcher: &Dispatcher, description: &ProjectDescription) {
    send(
        dispatcher.local_addr().unwrap(),
        &description.to_packet().unwrap(),
    );
}

fn position(subscriber: &Subscriber, wanted: &str) -> usize {
    subscriber
        .tags()
        .iter()
        .position(|kind| *kind == wanted)
        .unwrap_or_else(|| panic!("{wanted} never broadcast: {:?}", subscriber.tags()))
}

/// Each push yields exactly one description notice, followed by the files it
/// is missing.
#[test]
fn test_description_broadcast_once_per_push() {
    let dir = TempDir::new().unwrap();
    let exe = path(&dir, "app");
    let mut dispatcher = dispatcher(SLEEPER);
    let mut subscriber = subscribe(&mut dispatcher);
    let description = ProjectDescription::new(exe.as_str(), digest("v1"));

    push(&dispatcher, &description);
    assert!(pump_until(&mut dispatcher, &mut subscriber, |s| {
        s.count(tag::FILE_MISSING) == 1
    }));
    assert_eq!(
        subscriber.tags(),
        vec![tag::PROJECT_DESCRIPTION, tag::FILE_MISSING]
    );
    assert_eq!(subscriber.seen[0].message, "New project description received");
    assert_eq!(subscriber.seen[1].message, format!("file: \"{exe}\""));

    push(&dispatcher, &description);
    assert!(pump_until(&mut dispatcher, &mut subscriber, |s| {
        s.count(tag::FILE_MISSING) == 2
    }));
    pump(&mut dispatcher, &mut subscriber, 5);

    assert_eq!(subscriber.count(tag::PROJECT_DESCRIPTION), 2);
    assert_eq!(subscriber.count(tag::DEBUGGER_STARTED), 0);
}

/// The debugger starts once the missing executable shows up with the right
/// content, and runs it with the pushed arguments.
#[test]
fn test_debugger_starts_when_file_appears() {
    let dir = TempDir::new().unwrap();
    let exe = path(&dir, "app");
    let mut dispatcher = dispatcher(SLEEPER);
    let mut subscriber = subscribe(&mut dispatcher);

    push(
        &dispatcher,
        &ProjectDescription::new(exe.as_str(), digest("v1")).with_arguments(["--flag"]),
    );
    assert!(pump_until(&mut dispatcher, &mut subscriber, |s| {
        s.count(tag::FILE_MISSING) == 1
    }));
    assert!(!dispatcher.bootstrapper().is_debugger_running());

    write(&exe, "v1");
    assert!(pump_until(&mut dispatcher, &mut subscriber, |s| {
        s.text(tag::DEBUGGER_STDOUT).contains('\n')
    }));

    assert!(position(&subscriber, tag::FILE_FOUND) < position(&subscriber, tag::DEBUGGER_STARTED));
    let pid = dispatcher.bootstrapper().controller().pid().unwrap();
    assert_eq!(subscriber.text(tag::DEBUGGER_STARTED), format!("pid: {pid}"));
    assert_eq!(
        subscriber.text(tag::DEBUGGER_STDOUT),
        format!("debugging {exe} --flag\n")
    );

    let roles = dispatcher.roles();
    assert!(roles.contains(&Role::DebuggerStdout));
    assert!(roles.contains(&Role::DebuggerStderr));
}

/// A file with the wrong content holds the debugger back until it is fixed.
#[test]
fn test_mismatch_blocks_debugger_until_match() {
    let dir = TempDir::new().unwrap();
    let exe = path(&dir, "app");
    let wanted = digest("v2");
    write(&exe, "v1");
    let mut dispatcher = dispatcher(SLEEPER);
    let mut subscriber = subscribe(&mut dispatcher);

    push(&dispatcher, &ProjectDescription::new(exe.as_str(), wanted.as_str()));
    assert!(pump_until(&mut dispatcher, &mut subscriber, |s| {
        s.count(tag::FILE_MISMATCH) == 1
    }));
    pump(&mut dispatcher, &mut subscriber, 5);

    assert_eq!(subscriber.count(tag::FILE_MISMATCH), 1);
    assert_eq!(
        subscriber.text(tag::FILE_MISMATCH),
        format!(
            "file: \"{exe}\" wanted hash: \"{wanted}\" actual hash: \"{}\"",
            digest("v1")
        )
    );
    assert_eq!(subscriber.count(tag::DEBUGGER_STARTED), 0);

    write(&exe, "v2");
    assert!(pump_until(&mut dispatcher, &mut subscriber, |s| {
        s.count(tag::DEBUGGER_STARTED) == 1
    }));
    assert_eq!(subscriber.text(tag::FILE_MATCH), format!("file: \"{exe}\""));
}

/// Deleting a dependency stops the debugger and reports the file missing.
#[test]
fn test_removed_dependency_stops_debugger() {
    let dir = TempDir::new().unwrap();
    let exe = path(&dir, "app");
    let lib = path(&dir, "lib.so");
    write(&exe, "app");
    write(&lib, "lib");
    let mut dispatcher = dispatcher(SLEEPER);
    let mut subscriber = subscribe(&mut dispatcher);

    push(
        &dispatcher,
        &ProjectDescription::new(exe.as_str(), digest("app")).with_dependency(lib.as_str(), digest("lib")),
    );
    assert!(pump_until(&mut dispatcher, &mut subscriber, |s| {
        s.count(tag::DEBUGGER_STARTED) == 1
    }));

    std::fs::remove_file(&lib).unwrap();
    assert!(pump_until(&mut dispatcher, &mut subscriber, |s| {
        s.count(tag::DEBUGGER_STOPPED) == 1
    }));

    assert_eq!(subscriber.text(tag::FILE_MISSING), format!("file: \"{lib}\""));
    assert!(!dispatcher.bootstrapper().is_debugger_running());
    assert!(!dispatcher.roles().into_iter().any(Role::is_debugger));
}

/// Standard error is broadcast under its own tag.
#[test]
fn test_debugger_stderr_is_broadcast() {
    let dir = TempDir::new().unwrap();
    let exe = path(&dir, "app");
    write(&exe, "app");
    let mut dispatcher = dispatcher("echo oops >&2; exec sleep 30");
    let mut subscriber = subscribe(&mut dispatcher);

    push(&dispatcher, &ProjectDescription::new(exe.as_str(), digest("app")));
    assert!(pump_until(&mut dispatcher, &mut subscriber, |s| {
        s.text(tag::DEBUGGER_STDERR).contains('\n')
    }));

    assert_eq!(subscriber.text(tag::DEBUGGER_STDERR), "oops\n");
    assert_eq!(subscriber.count(tag::DEBUGGER_STDOUT), 0);
}

/// A debugger that exits by itself is reported stopped and, with every file
/// still satisfied, started again.
#[test]
fn test_debugger_exit_is_noticed_and_restarted() {
    let dir = TempDir::new().unwrap();
    let exe = path(&dir, "app");
    write(&exe, "app");
    let mut dispatcher = dispatcher("echo bye");
    let mut subscriber = subscribe(&mut dispatcher);

    push(&dispatcher, &ProjectDescription::new(exe.as_str(), digest("app")));
    assert!(pump_until(&mut dispatcher, &mut subscriber, |s| {
        s.count(tag::DEBUGGER_STARTED) >= 2
    }));

    let first_started = subscriber
        .seen
        .iter()
        .find(|update| update.tag == tag::DEBUGGER_STARTED)
        .unwrap();
    let first_stopped = subscriber
        .seen
        .iter()
        .find(|update| update.tag == tag::DEBUGGER_STOPPED)
        .unwrap();
    assert_eq!(first_started.message, first_stopped.message);
    assert!(subscriber.text(tag::DEBUGGER_STDOUT).starts_with("bye\n"));
}

/// A forced stop takes effect, then the next sweep restarts a satisfied
/// project.
#[test]
fn test_force_stop_then_sweep_restarts() {
    let dir = TempDir::new().unwrap();
    let exe = path(&dir, "app");
    write(&exe, "app");
    let mut dispatcher = dispatcher(SLEEPER);
    let mut subscriber = subscribe(&mut dispatcher);

    push(&dispatcher, &ProjectDescription::new(exe.as_str(), digest("app")));
    assert!(pump_until(&mut dispatcher, &mut subscriber, |s| {
        s.count(tag::DEBUGGER_STARTED) == 1
    }));

    send(dispatcher.local_addr().unwrap(), &[0x01, 0x04]);
    assert!(pump_until(&mut dispatcher, &mut subscriber, |s| {
        s.count(tag::DEBUGGER_STARTED) == 2
    }));
    let lifecycle: Vec<&str> = subscriber
        .tags()
        .into_iter()
        .filter(|kind| kind.starts_with("DEBUGGER ST") && *kind != tag::DEBUGGER_STDOUT)
        .collect();
    assert_eq!(
        lifecycle,
        vec![tag::DEBUGGER_STARTED, tag::DEBUGGER_STOPPED, tag::DEBUGGER_STARTED]
    );
}

/// Pushing a new project stops the running debugger before anything else.
#[test]
fn test_new_description_stops_running_debugger() {
    let dir = TempDir::new().unwrap();
    let exe = path(&dir, "app");
    write(&exe, "app");
    let mut dispatcher = dispatcher(SLEEPER);
    let mut subscriber = subscribe(&mut dispatcher);

    push(&dispatcher, &ProjectDescription::new(exe.as_str(), digest("app")));
    assert!(pump_until(&mut dispatcher, &mut subscriber, |s| {
        s.count(tag::DEBUGGER_STARTED) == 1
    }));

    let other = path(&dir, "other");
    push(&dispatcher, &ProjectDescription::new(other.as_str(), digest("other")));
    assert!(pump_until(&mut dispatcher, &mut subscriber, |s| {
        s.count(tag::DEBUGGER_STOPPED) == 1 && s.count(tag::FILE_MISSING) == 1
    }));

    assert_eq!(subscriber.text(tag::FILE_MISSING), format!("file: \"{other}\""));
    assert!(!dispatcher.bootstrapper().is_debugger_running());
}

/// Replacing a watched file with the wrong content stops the debugger.
#[test]
fn test_watcher_reports_rewritten_file() {
    let Ok(watcher) = ProjectWatcher::new() else {
        eprintln!("Skipping: watcher unavailable");
        return;
    };
    let dir = TempDir::new().unwrap();
    let exe = path(&dir, "app");
    write(&exe, "app");
    let mut dispatcher = dispatcher(SLEEPER).with_watcher(watcher);
    let mut subscriber = subscribe(&mut dispatcher);

    push(&dispatcher, &ProjectDescription::new(exe.as_str(), digest("app")));
    assert!(pump_until(&mut dispatcher, &mut subscriber, |s| {
        s.count(tag::DEBUGGER_STARTED) == 1
    }));

    write(&exe, "tampered");
    assert!(pump_until(&mut dispatcher, &mut subscriber, |s| {
        s.count(tag::DEBUGGER_STOPPED) == 1
    }));
    assert!(subscriber.count(tag::FILE_MISMATCH) >= 1);
}

/// Shutting down stops the debugger.
#[test]
fn test_run_stops_debugger_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let exe = path(&dir, "app");
    write(&exe, "app");
    let mut dispatcher = dispatcher(SLEEPER);
    let mut subscriber = subscribe(&mut dispatcher);

    push(&dispatcher, &ProjectDescription::new(exe.as_str(), digest("app")));
    assert!(pump_until(&mut dispatcher, &mut subscriber, |s| {
        s.count(tag::DEBUGGER_STARTED) == 1
    }));

    dispatcher.shutdown_handle().request();
    dispatcher.run().unwrap();

    assert!(!dispatcher.bootstrapper().is_debugger_running());
    assert!(dispatcher.bootstrapper().controller().pid().is_none());
}

/// Every subscriber receives the same updates, and one leaving does not
/// disturb the others.
#[test]
fn test_updates_reach_every_subscriber() {
    let dir = TempDir::new().unwrap();
    let exe = path(&dir, "app");
    let mut dispatcher = dispatcher(SLEEPER);
    let mut first = subscribe(&mut dispatcher);
    let mut second = subscribe(&mut dispatcher);
    assert_eq!(subscribers(&dispatcher), 2);

    let description = ProjectDescription::new(exe.as_str(), digest("v1"));
    push(&dispatcher, &description);
    assert!(pump_until(&mut dispatcher, &mut first, |s| {
        s.count(tag::FILE_MISSING) == 1
    }));
    assert!(pump_until(&mut dispatcher, &mut second, |s| {
        s.count(tag::FILE_MISSING) == 1
    }));
    assert_eq!(first.seen, second.seen);

    drop(second);
    push(&dispatcher, &description);
    assert!(pump_until(&mut dispatcher, &mut first, |s| {
        s.count(tag::PROJECT_DESCRIPTION) == 2
    }));
    assert_eq!(subscribers(&dispatcher), 1);
}
