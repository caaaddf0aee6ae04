//! Drive the `docindex` binary end to end inside a temp workspace.

use std::fs;
use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

fn docindex(workspace: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_docindex"));
    cmd.current_dir(workspace)
        .env_remove("DOCINDEX_CONFIG")
        .env("RUST_LOG", "off");
    cmd
}

fn run(workspace: &Path, args: &[&str]) -> Output {
    let output = docindex(workspace).args(args).output().unwrap();
    assert!(
        output.status.success(),
        "docindex {args:?} failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    output
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn init_workspace() -> TempDir {
    let temp = TempDir::new().unwrap();
    run(temp.path(), &["init"]);
    temp
}

#[test]
fn test_init_creates_settings_and_refuses_overwrite() {
    let temp = init_workspace();
    let settings = temp.path().join(".docindex").join("settings.toml");
    assert!(settings.exists());

    let again = docindex(temp.path()).arg("init").output().unwrap();
    assert!(!again.status.success());

    run(temp.path(), &["init", "--force"]);

    let config = stdout(&run(temp.path(), &["config"]));
    assert!(config.contains("[indexing]"), "{config}");
    assert!(config.contains("[schedule]"), "{config}");
}

#[test]
fn test_update_then_status_reports_documents() {
    let temp = init_workspace();
    let docs = temp.path().join("docs");
    fs::create_dir_all(&docs).unwrap();
    fs::write(docs.join("a.txt"), "alpha").unwrap();
    fs::write(docs.join("b.md"), "# beta").unwrap();

    let update = stdout(&run(temp.path(), &["update", "docs", "--no-progress"]));
    assert!(update.contains("Indexed 2 files"), "{update}");

    let status = stdout(&run(temp.path(), &["status", "--json"]));
    let status: serde_json::Value = serde_json::from_str(&status).unwrap();
    assert_eq!(status["documents"], 2);
    assert_eq!(status["source_bytes"], 11);
    assert_eq!(status["in_flight"].as_array().unwrap().len(), 0);
    assert!(temp.path().join(".docindex").join("index.json").exists());

    // Byte totals follow the files on disk, not the last run.
    fs::remove_file(docs.join("b.md")).unwrap();
    let status = stdout(&run(temp.path(), &["status", "--json"]));
    let status: serde_json::Value = serde_json::from_str(&status).unwrap();
    assert_eq!(status["documents"], 2);
    assert_eq!(status["source_bytes"], 5);

    let cleanup = stdout(&run(temp.path(), &["cleanup"]));
    assert!(cleanup.contains("Nothing to clean up"), "{cleanup}");
}

#[test]
fn test_update_without_roots_fails() {
    let temp = init_workspace();
    let output = docindex(temp.path())
        .args(["update", "--no-progress"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("No data roots configured"), "{stderr}");
}

#[test]
fn test_daemon_answers_commands_and_shuts_down() {
    let temp = init_workspace();
    let mut child = docindex(temp.path())
        .args(["daemon", "--no-schedule"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();

    child
        .stdin
        .take()
        .unwrap()
        .write_all(b"test\n131\nupdate\n")
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    let lines: Vec<String> = stdout(&output).lines().map(str::to_string).collect();
    assert_eq!(lines.len(), 2, "{lines:?}");
    assert!(lines[0].starts_with("idle"), "{lines:?}");
    assert_eq!(lines[1], "shutting down");
}
