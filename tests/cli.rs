use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn scanbook_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("scanbook");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/barcodes.sqlite"

[storage]
snapshot_path = "{root}/data/data.json"
upload_dir = "{root}/data/uploads"

[scan]
cooldown_secs = 3
default_sections = ["Depo1", "Manav"]

[server]
bind = "127.0.0.1:5055"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("scanbook.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_scanbook(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = scanbook_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run scanbook binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_scanbook(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/barcodes.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_scanbook(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_scanbook(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");

    let (stdout, _, _) = run_scanbook(&config_path, &["sections"]);
    assert_eq!(stdout.matches("Depo1").count(), 1);
}

#[test]
fn test_sections_lists_seeded_sections() {
    let (_tmp, config_path) = setup_test_env();
    run_scanbook(&config_path, &["init"]);

    let (stdout, stderr, success) = run_scanbook(&config_path, &["sections"]);
    assert!(success, "sections failed: {}", stderr);
    assert!(stdout.contains("Depo1 (0)"));
    assert!(stdout.contains("Manav (0)"));
}

#[test]
fn test_export_to_stdout_and_file() {
    let (tmp, config_path) = setup_test_env();
    run_scanbook(&config_path, &["init"]);

    let (stdout, stderr, success) = run_scanbook(&config_path, &["export"]);
    assert!(success, "export failed: {}", stderr);
    assert_eq!(stdout, "Bölüm,Barkod,Tarih\n");

    let out = tmp.path().join("out/barkodlar.csv");
    let (_, stderr, success) = run_scanbook(&config_path, &["export", "-o", out.to_str().unwrap()]);
    assert!(success, "export to file failed: {}", stderr);
    assert!(stderr.contains("Exported 0 records"));
    assert_eq!(fs::read_to_string(out).unwrap(), "Bölüm,Barkod,Tarih\n");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_scanbook(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"));
}
