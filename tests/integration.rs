//! Integration test suite: drives the compiled `devbundle` binary against temporary projects.
//!
//! The bundler is stood in for by `true` / `false`, so these tests only run on Unix.
#![cfg(unix)]

use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_devbundle"))
}

/// Run a devbundle command and assert it exits successfully.
/// Returns stdout as a String.
fn run_success(args: &[&str]) -> String {
    let out = Command::new(binary())
        .args(args)
        .output()
        .expect("failed to invoke devbundle binary");
    let stdout = String::from_utf8_lossy(&out.stdout).to_string();
    let stderr = String::from_utf8_lossy(&out.stderr).to_string();
    assert!(
        out.status.success(),
        "command {:?} failed with status {:?}\nstdout: {}\nstderr: {}",
        args,
        out.status,
        stdout,
        stderr
    );
    stdout
}

/// Run a devbundle command and assert it exits with a non-zero status.
/// Returns (stdout, stderr) as Strings.
fn run_failure(args: &[&str]) -> (String, String) {
    let out = Command::new(binary())
        .args(args)
        .output()
        .expect("failed to invoke devbundle binary");
    let stdout = String::from_utf8_lossy(&out.stdout).to_string();
    let stderr = String::from_utf8_lossy(&out.stderr).to_string();
    assert!(
        !out.status.success(),
        "command {:?} expected to fail but exited successfully\nstdout: {}\nstderr: {}",
        args,
        stdout,
        stderr
    );
    (stdout, stderr)
}

/// A project with `web/a.css`, `web/b.tsx`, a `node_modules` tree, and a config
/// pointing the bundler at `program`.
fn project(program: &str, debounce_ms: u64) -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    let web = dir.path().join("web");
    fs::create_dir_all(web.join("node_modules").join("preact")).unwrap();
    fs::write(web.join("node_modules").join("preact").join("index.js"), "").unwrap();
    fs::write(web.join("package.json"), "{}").unwrap();
    fs::write(web.join("a.css"), "x").unwrap();
    fs::write(web.join("b.tsx"), "export const b = 1;").unwrap();
    fs::write(
        dir.path().join("devbundle.toml"),
        format!(
            "compiled_extensions = [\"tsx\"]\nentry_points = [\"web/b.tsx\"]\ndebounce_ms = {debounce_ms}\n\n[compiler]\nprogram = \"{program}\"\n"
        ),
    )
    .unwrap();
    dir
}

fn root_arg(dir: &Path) -> String {
    dir.display().to_string()
}

// ---------------------------------------------------------------------------
// build
// ---------------------------------------------------------------------------

#[test]
fn test_build_copies_assets_and_reports() {
    let dir = project("true", 1000);
    let root = root_arg(dir.path());
    let stdout = run_success(&["build", "--root", &root]);

    assert_eq!(stdout, "ok web/a.css 1\nbuild ok\n");
    let dist = dir.path().join("dist");
    assert_eq!(fs::read_to_string(dist.join("a.css")).unwrap(), "x");
    assert!(!dist.join("b.tsx").exists(), "compiled sources are not copied");
    assert!(!dist.join("package.json").exists(), "ignored files are not copied");
    assert!(!dist.join("node_modules").exists(), "ignored dirs are not copied");
}

#[test]
fn test_build_twice_is_idempotent() {
    let dir = project("true", 1000);
    let root = root_arg(dir.path());
    let first = run_success(&["build", "--root", &root]);
    let second = run_success(&["build", "--root", &root]);
    assert_eq!(first, second);
    assert_eq!(
        fs::read_dir(dir.path().join("dist")).unwrap().count(),
        1,
        "only a.css should be in the output tree"
    );
}

#[test]
fn test_build_failure_exits_nonzero() {
    let dir = project("false", 1000);
    let root = root_arg(dir.path());
    let (stdout, stderr) = run_failure(&["build", "--root", &root]);

    assert!(stdout.starts_with("ok web/a.css 1\n"), "assets still copied: {stdout}");
    assert!(stdout.ends_with("build failed\n"), "stdout: {stdout}");
    assert!(stderr.contains("build failed"));
}

#[test]
fn test_build_json_output() {
    let dir = project("true", 1000);
    let root = root_arg(dir.path());
    let stdout = run_success(&["build", "--root", &root, "--json"]);

    let value: serde_json::Value = serde_json::from_str(stdout.trim()).expect("valid JSON");
    assert_eq!(value["ok"], true);
    assert_eq!(value["copied"], 1);
    assert_eq!(value["files"][0]["path"], "web/a.css");
    assert_eq!(value["files"][0]["bytes"], 1);
}

#[test]
fn test_overlapping_output_dir_is_rejected() {
    let dir = project("true", 1000);
    fs::write(
        dir.path().join("devbundle.toml"),
        "output_dir = \"web/dist\"\n",
    )
    .unwrap();
    let root = root_arg(dir.path());
    let (_stdout, stderr) = run_failure(&["build", "--root", &root]);
    assert!(stderr.contains("invalid devbundle.toml"), "stderr: {stderr}");
    assert!(dir.path().join("web").join("a.css").exists());
}

// ---------------------------------------------------------------------------
// plan
// ---------------------------------------------------------------------------

#[test]
fn test_plan_lists_classification() {
    let dir = project("true", 1000);
    let root = root_arg(dir.path());
    let stdout = run_success(&["plan", "--root", &root]);

    assert!(stdout.contains("copy web/a.css"));
    assert!(stdout.contains("compile web/b.tsx"));
    assert!(!stdout.contains("node_modules"));
    assert!(!dir.path().join("dist").exists(), "plan must not build");
}

#[test]
fn test_plan_json() {
    let dir = project("true", 1000);
    let root = root_arg(dir.path());
    let stdout = run_success(&["plan", "--root", &root, "--json"]);

    let value: serde_json::Value = serde_json::from_str(stdout.trim()).expect("valid JSON");
    assert_eq!(value["to_copy"], serde_json::json!(["web/a.css"]));
    assert_eq!(value["skipped"], serde_json::json!(["web/b.tsx"]));
}

// ---------------------------------------------------------------------------
// watch
// ---------------------------------------------------------------------------

#[test]
fn test_watch_rebuilds_on_change() {
    let dir = project("true", 100);
    let root = root_arg(dir.path());
    let mut child = Command::new(binary())
        .args(["watch", "--root", &root])
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("failed to spawn devbundle watch");

    let stdout = child.stdout.take().unwrap();
    let (tx, rx) = mpsc::channel::<String>();
    std::thread::spawn(move || {
        for line in BufReader::new(stdout).lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });

    let wait_for = |needle: &str| -> bool {
        while let Ok(line) = rx.recv_timeout(Duration::from_secs(10)) {
            if line == needle {
                return true;
            }
        }
        false
    };

    assert!(wait_for("build ok"), "initial build did not finish");
    // Give the watcher time to register after the initial build.
    std::thread::sleep(Duration::from_millis(500));
    fs::write(dir.path().join("web").join("new.css"), "abc").unwrap();

    let rebuilt = wait_for("ok web/new.css 3");
    let _ = child.kill();
    let _ = child.wait();

    assert!(rebuilt, "change did not trigger a rebuild");
    assert_eq!(
        fs::read_to_string(dir.path().join("dist").join("new.css")).unwrap(),
        "abc"
    );
}
