//! Integration tests for the check command

use file_uploader::validation::ValidationError;
use file_uploader_cli::{CheckCommand, PolicyArgs};
use std::fs;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, size: usize) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, vec![b'x'; size]).unwrap();
    path
}

/// Test that files are split by extension and size
#[test]
fn test_check_classifies_files() {
    let dir = TempDir::new().unwrap();
    let small = write(&dir, "small.txt", 10);
    let large = write(&dir, "large.txt", 1_024_001);
    let script = write(&dir, "run.sh", 10);

    let command = CheckCommand {
        files: vec![small, large, script],
        policy: PolicyArgs {
            max_size_mb: Some(1),
            ..PolicyArgs::default()
        },
    };
    let outcome = command.run().unwrap();

    assert_eq!(outcome.accepted.len(), 1);
    assert_eq!(outcome.accepted[0].name(), "small.txt");
    assert_eq!(outcome.rejected.len(), 2);
    assert_eq!(outcome.rejected[0].file_name, "large.txt");
    assert_eq!(outcome.rejected[0].reason, ValidationError::InvalidSize);
    assert_eq!(outcome.rejected[0].formatted_size, "1.00 MB");
    assert_eq!(outcome.rejected[1].reason, ValidationError::InvalidFormat);
}

/// Test that the policy can come from a configuration file
#[test]
fn test_check_reads_policy_from_config_file() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("uploader.toml");
    fs::write(&config, "allowed_extensions = [\"sh\"]\n").unwrap();
    let script = write(&dir, "run.sh", 10);
    let notes = write(&dir, "notes.txt", 10);

    let command = CheckCommand {
        files: vec![script, notes],
        policy: PolicyArgs {
            config: Some(config),
            ..PolicyArgs::default()
        },
    };
    let outcome = command.run().unwrap();

    assert_eq!(outcome.accepted.len(), 1);
    assert_eq!(outcome.rejected[0].file_name, "notes.txt");
}

/// Test that a missing file aborts the command
#[test]
fn test_check_missing_file() {
    let dir = TempDir::new().unwrap();
    let command = CheckCommand {
        files: vec![dir.path().join("absent.txt")],
        policy: PolicyArgs::default(),
    };
    assert!(command.run().is_err());
}
