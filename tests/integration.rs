use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn vrank_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("vrank");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    // Port 9 (discard) on loopback refuses connections, so every fetch
    // fails fast and yields nothing.
    let config_content = format!(
        r#"[db]
path = "{root}/data/vrank.sqlite"

[upstream]
ranking_url = "http://127.0.0.1:9/ranking"
detail_url = "http://127.0.0.1:9/view"
timeout_secs = 2
request_delay_ms = 0

[scheduler]
enabled = false
partitions = [30, 29, 190]

[retention]
days_to_keep = 30
backup_dir = "{root}/backups"

[server]
bind = "127.0.0.1:0"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("vrank.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_vrank(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = vrank_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run vrank binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

#[test]
fn test_init_creates_database() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_vrank(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data/vrank.sqlite").exists());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_vrank(&config_path, &["init"]);
    assert!(success1, "First init failed");

    let (_, _, success2) = run_vrank(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_fetch_with_unreachable_upstream_saves_nothing() {
    let (_tmp, config_path) = setup_test_env();

    run_vrank(&config_path, &["init"]);
    let (stdout, stderr, success) =
        run_vrank(&config_path, &["fetch", "--partition", "30", "--limit", "5"]);
    assert!(success, "fetch failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("fetched: 0"));
    assert!(stdout.contains("saved: 0"));
    assert!(stdout.contains("ok"));
}

#[test]
fn test_fetch_dry_run() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_vrank(&config_path, &["fetch", "--dry-run"]);
    assert!(success, "dry run failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("dry-run"));
    assert!(stdout.contains("fetched: 0"));
}

#[test]
fn test_list_empty_store() {
    let (_tmp, config_path) = setup_test_env();

    run_vrank(&config_path, &["init"]);
    let (stdout, _, success) = run_vrank(&config_path, &["list", "--sort-by", "nonsense"]);
    assert!(success);
    assert!(stdout.contains("No items."));
}

#[test]
fn test_get_missing_item() {
    let (_tmp, config_path) = setup_test_env();

    run_vrank(&config_path, &["init"]);
    let (_, stderr, success) = run_vrank(&config_path, &["get", "BV1doesnotexist"]);
    assert!(!success);
    assert!(stderr.contains("not found"));
}

#[test]
fn test_partitions() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, _, success) = run_vrank(&config_path, &["partitions"]);
    assert!(success);
    assert!(stdout.contains("PARTITION"));
    assert!(stdout.contains("VOCALOID·UTAU"));
    assert!(stdout.contains("190"));
}

#[test]
fn test_stats_on_fresh_database() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_vrank(&config_path, &["stats"]);
    assert!(success, "stats failed: stderr={}", stderr);
    assert!(stdout.contains("Items:"));
    assert!(stdout.contains("华语"));
}

#[test]
fn test_export_empty_range_is_empty_json_array() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_vrank(
        &config_path,
        &["export", "--start", "2025-01-01", "--end", "2025-01-31"],
    );
    assert!(success, "export failed: stderr={}", stderr);
    let v: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(v, serde_json::json!([]));
}

#[test]
fn test_export_rejects_unknown_format() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success) = run_vrank(
        &config_path,
        &["export", "--start", "2025-01-01", "--end", "2025-01-31", "--format", "xml"],
    );
    assert!(!success);
}

#[test]
fn test_cleanup_writes_backup() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_vrank(&config_path, &["cleanup", "--days", "7"]);
    assert!(success, "cleanup failed: stderr={}", stderr);
    assert!(stdout.contains("items deleted: 0"));
    let backups: Vec<_> = fs::read_dir(tmp.path().join("backups")).unwrap().collect();
    assert_eq!(backups.len(), 1);
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_vrank(&tmp.path().join("nope.toml"), &["init"]);
    assert!(!success);
    assert!(stderr.contains("config"));
}

#[test]
fn test_recommend_with_huge_limit_is_clamped() {
    let (_tmp, config_path) = setup_test_env();

    run_vrank(&config_path, &["init"]);
    let (stdout, stderr, success) = run_vrank(
        &config_path,
        &["recommend", "--random", "--limit", "9223372036854775807"],
    );
    assert!(success, "recommend failed: stderr={}", stderr);
    assert!(stdout.contains("No items."));
}

#[test]
fn test_cleanup_rejects_oversized_days() {
    let (tmp, config_path) = setup_test_env();

    let (_, stderr, success) =
        run_vrank(&config_path, &["cleanup", "--days", "160127986750950"]);
    assert!(!success);
    assert!(stderr.contains("--days"));
    assert!(!tmp.path().join("backups").exists());
}
