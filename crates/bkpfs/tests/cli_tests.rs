//! CLI integration tests.
//!
//! These tests drive the bkpctl binary end-to-end against temporary trees.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Output, Stdio};
use tempfile::TempDir;

/// A bkpctl command isolated from the user's configuration.
fn bkpctl(config_home: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_bkpctl"));
    cmd.env("XDG_CONFIG_HOME", config_home)
        .env_remove("BKPFS_MAXVER")
        .env_remove("BKPFS_CONFIG_CONTENT")
        .env_remove("RUST_LOG");
    cmd
}

struct Fixture {
    dir: TempDir,
    config_home: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
            config_home: TempDir::new().expect("Failed to create temp dir"),
        }
    }

    fn file(&self, name: &str) -> String {
        self.dir.path().join(name).to_string_lossy().into_owned()
    }

    fn run(&self, args: &[&str]) -> Output {
        bkpctl(self.config_home.path())
            .args(args)
            .output()
            .expect("Failed to execute command")
    }

    fn write(&self, name: &str, content: &str, extra: &[&str]) -> Output {
        let mut child = bkpctl(self.config_home.path())
            .arg("-w")
            .args(extra)
            .arg(self.file(name))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .expect("Failed to spawn command");
        child
            .stdin
            .take()
            .expect("stdin is piped")
            .write_all(content.as_bytes())
            .expect("Failed to write stdin");
        child.wait_with_output().expect("Failed to wait for command")
    }

    /// Write v1..v4 with two retained versions.
    fn scenario(&self) {
        for content in ["v1", "v2", "v3", "v4"] {
            let output = self.write("a.txt", content, &["--maxver", "2"]);
            assert!(output.status.success(), "{output:?}");
        }
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn test_help_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_bkpctl"))
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Manage backup versions of a file"));
    for flag in ["--list", "--delete", "--view", "--restore", "--maxver"] {
        assert!(text.contains(flag), "help is missing {flag}");
    }
}

#[test]
fn test_requires_an_action() {
    let fixture = Fixture::new();
    let output = fixture.run(&[&fixture.file("a.txt")]);
    assert!(!output.status.success());
}

#[test]
fn test_write_then_list() {
    let fixture = Fixture::new();
    fixture.scenario();

    let output = fixture.run(&["-l", &fixture.file("a.txt")]);
    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("Backups of a.txt"));
    assert!(text.contains("2\t.a.txt.2"));
    assert!(text.contains("3\t.a.txt.3"));
    assert!(!text.contains(".a.txt.1"));

    let container = fixture.dir.path().join(".a.txt.bkp");
    assert!(container.join(".a.txt.2").exists());
    assert!(container.join(".a.txt.3").exists());
    assert!(!container.join(".a.txt.1").exists());
}

#[test]
fn test_view_versions() {
    let fixture = Fixture::new();
    fixture.scenario();

    let output = fixture.run(&["-v", "oldest", &fixture.file("a.txt")]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "v3");

    let output = fixture.run(&["-v", "newest", &fixture.file("a.txt")]);
    assert_eq!(stdout(&output), "v4");

    let output = fixture.run(&["-v", "3", &fixture.file("a.txt")]);
    assert_eq!(stdout(&output), "v4");
    assert!(!fixture.dir.path().join("a.txt.3.vue").exists());

    let output = fixture.run(&["-v", "1", &fixture.file("a.txt")]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("outside the retained window"));
}

#[test]
fn test_invalid_arguments() {
    let fixture = Fixture::new();
    fixture.scenario();

    for args in [["-d", "3"], ["-v", "all"], ["-r", "all"], ["-v", "latest"]] {
        let output = fixture.run(&[args[0], args[1], &fixture.file("a.txt")]);
        assert!(!output.status.success(), "{args:?} should fail");
        assert!(stderr(&output).contains("invalid argument"), "{args:?}");
    }

    let output = fixture.run(&["-l", &fixture.file("a.txt")]);
    assert!(stdout(&output).contains("2\t.a.txt.2"));
}

#[test]
fn test_delete_all() {
    let fixture = Fixture::new();
    fixture.scenario();

    let output = fixture.run(&["-d", "all", &fixture.file("a.txt")]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Retained window: [4, 4)"));

    let output = fixture.run(&["-l", &fixture.file("a.txt")]);
    assert!(stdout(&output).contains("No backups of a.txt"));

    let output = fixture.run(&["-v", "oldest", &fixture.file("a.txt")]);
    assert!(!output.status.success());

    let output = fixture.run(&["-d", "all", &fixture.file("a.txt")]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("Nothing to delete"));
}

#[test]
fn test_delete_oldest_then_newest() {
    let fixture = Fixture::new();
    fixture.scenario();

    assert!(fixture.run(&["-d", "oldest", &fixture.file("a.txt")]).status.success());
    assert!(fixture.run(&["-d", "newest", &fixture.file("a.txt")]).status.success());
    let output = fixture.run(&["-l", &fixture.file("a.txt")]);
    assert!(stdout(&output).contains("No backups of a.txt"));
}

#[test]
fn test_restore() {
    let fixture = Fixture::new();
    fixture.scenario();

    let output = fixture.run(&["-r", "newest", &fixture.file("a.txt")]);
    assert!(output.status.success());
    assert!(stdout(&output).contains(".a.txt.3.swp"));
    let restored = std::fs::read(fixture.dir.path().join(".a.txt.3.swp")).unwrap();
    assert_eq!(restored, b"v4");
}

#[test]
fn test_missing_file() {
    let fixture = Fixture::new();
    let output = fixture.run(&["-l", &fixture.file("missing.txt")]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("Cannot open file"));
}

#[test]
fn test_json_listing() {
    let fixture = Fixture::new();
    fixture.scenario();

    let output = fixture.run(&["-l", "--json", &fixture.file("a.txt")]);
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["op"], "list");
    assert_eq!(value["old_version"], 2);
    assert_eq!(value["curr_version"], 4);
    assert_eq!(value["filename"], "a.txt");
}

#[test]
fn test_project_config_sets_maxver() {
    let fixture = Fixture::new();
    std::fs::write(fixture.dir.path().join("bkpfs.json"), r#"{"maxver": 1}"#).unwrap();

    for content in ["v1", "v2", "v3"] {
        assert!(fixture.write("a.txt", content, &[]).status.success());
    }
    let output = fixture.run(&["-l", "--json", &fixture.file("a.txt")]);
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["old_version"], 2);
    assert_eq!(value["curr_version"], 3);
}

#[test]
fn test_maxver_env_override() {
    let fixture = Fixture::new();
    let mut child = bkpctl(fixture.config_home.path())
        .env("BKPFS_MAXVER", "0")
        .args(["-w", &fixture.file("a.txt")])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .spawn()
        .expect("Failed to spawn command");
    child
        .stdin
        .take()
        .expect("stdin is piped")
        .write_all(b"unversioned")
        .expect("Failed to write stdin");
    let output = child.wait_with_output().expect("Failed to wait for command");

    assert!(output.status.success());
    assert!(stdout(&output).contains("snapshots disabled"));
    assert!(!fixture.dir.path().join(".a.txt.bkp/.a.txt.0").exists());
}

#[test]
fn test_verify() {
    let fixture = Fixture::new();
    fixture.scenario();

    let output = fixture.run(&["--verify", &fixture.file("a.txt")]);
    assert!(output.status.success());
    assert!(stdout(&output).contains("All retained versions present"));

    let snapshot = fixture.dir.path().join(".a.txt.bkp/.a.txt.2");
    let mut permissions = std::fs::metadata(&snapshot).unwrap().permissions();
    #[allow(clippy::permissions_set_readonly_false)]
    permissions.set_readonly(false);
    std::fs::set_permissions(&snapshot, permissions).unwrap();
    std::fs::remove_file(&snapshot).unwrap();

    let output = fixture.run(&["--verify", &fixture.file("a.txt")]);
    assert!(!output.status.success());
    assert!(stdout(&output).contains("Missing: [2]"));
}

#[test]
fn test_root_choice_shares_versions() {
    let fixture = Fixture::new();
    std::fs::create_dir(fixture.dir.path().join("docs")).unwrap();
    let root = fixture.dir.path().to_string_lossy().into_owned();

    assert!(fixture.write("docs/a.txt", "v1", &[]).status.success());
    let output = fixture.write("docs/a.txt", "v2", &["--root", &root]);
    assert!(output.status.success(), "{output:?}");

    let output = fixture.run(&["-l", "--json", &fixture.file("docs/a.txt")]);
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["old_version"], 0);
    assert_eq!(value["curr_version"], 2);

    let output = fixture.run(&["-v", "newest", "--root", &root, &fixture.file("docs/a.txt")]);
    assert!(output.status.success());
    assert_eq!(stdout(&output), "v2");
}

#[cfg(unix)]
#[test]
fn test_concurrent_writers_get_distinct_versions() {
    let fixture = Fixture::new();
    assert!(fixture.write("a.txt", "seed", &["--maxver", "100"]).status.success());

    let children: Vec<_> = (0..6)
        .map(|i| {
            let mut child = bkpctl(fixture.config_home.path())
                .args(["-w", "--maxver", "100", &fixture.file("a.txt")])
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .spawn()
                .expect("Failed to spawn command");
            child
                .stdin
                .take()
                .expect("stdin is piped")
                .write_all(format!("writer {i}").as_bytes())
                .expect("Failed to write stdin");
            child
        })
        .collect();
    for child in children {
        let output = child.wait_with_output().expect("Failed to wait for command");
        assert!(output.status.success(), "{output:?}");
    }

    let output = fixture.run(&["-l", "--json", &fixture.file("a.txt")]);
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["old_version"], 0);
    assert_eq!(value["curr_version"], 7);

    let output = fixture.run(&["--verify", &fixture.file("a.txt")]);
    assert!(output.status.success(), "{output:?}");
}
