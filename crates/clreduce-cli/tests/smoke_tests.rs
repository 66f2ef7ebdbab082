//! Smoke tests for the clreduce CLI
//!
//! These run the real binary. Launcher behaviour is faked with small shell
//! scripts so no OpenCL installation is needed.

#![allow(deprecated)] // Allow deprecated Command::cargo_bin until assert_cmd is updated
#![allow(clippy::expect_used, clippy::unwrap_used)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const ENV_VARS: &[&str] = &[
    "CREDUCE_TEST_CASE",
    "CREDUCE_TEST_CL_LAUNCHER",
    "CREDUCE_TEST_CLANG",
    "CREDUCE_TEST_OCLGRIND",
    "CREDUCE_LIBCLC_INCLUDE_PATH",
    "CREDUCE_TEST_PLATFORM",
    "CREDUCE_TEST_DEVICE",
    "CREDUCE_TEST_OCLGRIND_PLATFORM",
    "CREDUCE_TEST_OCLGRIND_DEVICE",
    "CREDUCE_TEST_TIMEOUT",
    "CREDUCE_TEST_CONSERVATIVE",
    "CREDUCE_TEST_STATIC",
    "CREDUCE_TEST_USE_ORACLE",
    "CREDUCE_TEST_OPTIMISATION_LEVEL",
];

const KERNEL_BODY: &str = "
size_t get_linear_global_id(void) {
    return (get_global_id(2) * get_global_size(1) + get_global_id(1)) * get_global_size(0) + get_global_id(0);
}

kernel void entry(global ulong *result) {
    result[get_linear_global_id()] = 42;
}
";

/// Get a command for the clreduce binary with a clean environment
fn clreduce() -> Command {
    let mut cmd = Command::cargo_bin("clreduce").expect("clreduce binary should exist");
    for var in ENV_VARS {
        cmd.env_remove(var);
    }
    cmd.env_remove("RUST_LOG");
    cmd
}

fn write_kernel(dir: &Path, name: &str, header: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("{header}{KERNEL_BODY}")).unwrap();
    path
}

// ============================================================================
// Basic CLI Tests
// ============================================================================

#[test]
fn test_version_flag() {
    clreduce()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("0.4.0"));
}

#[test]
fn test_help_flag() {
    clreduce()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("test"))
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("reduce-work-sizes"));
}

#[test]
fn test_no_args_fails() {
    clreduce().assert().failure();
}

#[test]
fn test_check_help_mentions_env() {
    clreduce()
        .args(["check", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("CREDUCE_TEST_OPTIMISATION_LEVEL"));
}

// ============================================================================
// Test Case Resolution
// ============================================================================

#[test]
fn test_without_test_case_exits_one() {
    clreduce()
        .arg("test")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("CREDUCE_TEST_CASE"));
}

#[test]
fn test_missing_test_case_exits_one() {
    let temp = TempDir::new().unwrap();
    clreduce()
        .arg("test")
        .arg(temp.path().join("CLProg_404.cl"))
        .assert()
        .code(1)
        .stderr(predicate::str::contains("CLProg_404.cl"));
}

#[test]
fn test_invalid_header_is_not_interesting() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("CLProg_0.cl");
    fs::write(&path, "kernel void k() {}\n").unwrap();
    clreduce()
        .env("CREDUCE_TEST_CASE", &path)
        .arg("test")
        .assert()
        .code(1);
}

// ============================================================================
// Config
// ============================================================================

#[test]
fn test_config_defaults_as_json() {
    clreduce()
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"optimisation_level\": \"either\""))
        .stdout(predicate::str::contains("\"timeout_secs\": 300"))
        .stdout(predicate::str::contains("\"conservative\": true"));
}

#[test]
fn test_config_yaml_with_overrides() {
    clreduce()
        .env("CREDUCE_TEST_STATIC", "yes")
        .args(["config", "--format", "yaml", "--timeout", "12"])
        .assert()
        .success()
        .stdout(predicate::str::contains("timeout_secs: 12"))
        .stdout(predicate::str::contains("static_checks: true"));
}

#[test]
fn test_config_rejects_unknown_level() {
    clreduce()
        .args(["config", "--optimisation-level", "sometimes"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration error"));
}

// ============================================================================
// File Rewriting
// ============================================================================

#[test]
fn test_strip_line_markers() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("kernel.cl");
    fs::write(&path, "# 1 \"kernel.c\"\nint x;\n# 7 \"CLSmith.h\" 2\nint y;\n").unwrap();

    clreduce()
        .args(["--color", "never", "strip-line-markers"])
        .arg(&path)
        .assert()
        .success();
    assert_eq!(fs::read_to_string(&path).unwrap(), "int x;\nint y;\n");
}

#[test]
fn test_reduce_work_sizes_unchecked() {
    let temp = TempDir::new().unwrap();
    let path = write_kernel(temp.path(), "CLProg_1.cl", "// Seed: 1 -g 16,4,2 -l 4,2,2");

    clreduce()
        .args(["reduce-work-sizes", "--unchecked"])
        .arg(&path)
        .assert()
        .success()
        .stderr(predicate::str::contains("work sizes reduced"));
    assert_eq!(
        fs::read_to_string(&path).unwrap(),
        format!("// Seed: 1 -g 1,1,1 -l 1,1,1{KERNEL_BODY}")
    );
}

#[test]
fn test_reduce_work_sizes_reports_bad_header() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("broken.cl");
    fs::write(&path, "// no sizes\n").unwrap();

    clreduce()
        .args(["reduce-work-sizes", "--unchecked"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("work-size header"));
}

// ============================================================================
// Oracle Through Fake Tools
// ============================================================================

#[cfg(unix)]
mod with_fake_launcher {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// Emulator runs print 42; direct runs print 7 unless optimisations
    /// are disabled
    const LAUNCHER: &str = r#"#!/bin/sh
if [ -n "$OCLGRIND_DATA_RACES" ]; then echo 42; exit 0; fi
for arg in "$@"; do
    if [ "$arg" = "---disable_opts" ]; then echo 42; exit 0; fi
done
echo 7
"#;

    fn write_launcher(dir: &Path, script: &str) -> PathBuf {
        let path = dir.join("fake_launcher");
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    fn with_launcher(launcher: &Path) -> Command {
        let mut cmd = clreduce();
        cmd.env("CREDUCE_TEST_CL_LAUNCHER", launcher)
            .env("CREDUCE_TEST_TIMEOUT", "10");
        cmd
    }

    #[test]
    fn test_interesting_exits_zero() {
        let temp = TempDir::new().unwrap();
        let launcher = write_launcher(temp.path(), LAUNCHER);
        let kernel = write_kernel(temp.path(), "CLProg_0.cl", "// Seed: 0 -g 4,1,1 -l 2,1,1");

        with_launcher(&launcher)
            .args(["test", "--emulator-mode", "environment"])
            .arg(&kernel)
            .assert()
            .code(0);
    }

    #[test]
    fn test_unoptimised_level_not_interesting() {
        let temp = TempDir::new().unwrap();
        let launcher = write_launcher(temp.path(), LAUNCHER);
        let kernel = write_kernel(temp.path(), "CLProg_0.cl", "// Seed: 0 -g 4,1,1 -l 2,1,1");

        with_launcher(&launcher)
            .env("CREDUCE_TEST_OPTIMISATION_LEVEL", "unoptimised")
            .args(["test", "--emulator-mode", "environment"])
            .arg(&kernel)
            .assert()
            .code(1);
    }

    #[test]
    fn test_check_single_invalid_case_uses_strict_code() {
        let temp = TempDir::new().unwrap();
        let launcher = write_launcher(temp.path(), "#!/bin/sh\nexit 2\n");
        let kernel = write_kernel(temp.path(), "CLProg_0.cl", "// Seed: 0 -g 4,1,1 -l 2,1,1");

        with_launcher(&launcher)
            .args(["--color", "never", "check", "--emulator-mode", "environment"])
            .arg(&kernel)
            .assert()
            .code(254)
            .stderr(predicate::str::contains("invalid (oracle)"));
    }

    #[test]
    fn test_check_directory_with_exclusions_and_log() {
        let temp = TempDir::new().unwrap();
        let cases = temp.path().join("cases");
        fs::create_dir(&cases).unwrap();
        let launcher = write_launcher(temp.path(), LAUNCHER);
        for name in ["CLProg_10.cl", "CLProg_2.cl", "CLProg_3.cl"] {
            write_kernel(&cases, name, "// Seed: 0 -g 4,1,1 -l 2,1,1");
        }
        let exclude = temp.path().join("exclude.txt");
        fs::write(&exclude, "CLProg_3.cl\n").unwrap();
        let log = temp.path().join("checked.log");

        with_launcher(&launcher)
            .args(["--color", "never", "check", "--emulator-mode", "environment"])
            .arg("--test-case-dir")
            .arg(&cases)
            .arg("--exclude-file")
            .arg(&exclude)
            .arg("--log")
            .arg(&log)
            .assert()
            .success()
            .stderr(predicate::str::contains("CLProg_2.cl: interesting"))
            .stderr(predicate::str::contains("Runtime:"));

        assert_eq!(
            fs::read_to_string(&log).unwrap(),
            "CLProg_2.cl\nCLProg_10.cl\n"
        );
    }

    #[test]
    fn test_checked_work_size_reduction() {
        let temp = TempDir::new().unwrap();
        let launcher = write_launcher(temp.path(), LAUNCHER);
        let kernel = write_kernel(temp.path(), "CLProg_5.cl", "// Seed: 5 -g 8,2,1 -l 4,2,1");

        with_launcher(&launcher)
            .args(["reduce-work-sizes", "--emulator-mode", "environment"])
            .arg(&kernel)
            .assert()
            .success();
        assert!(fs::read_to_string(&kernel)
            .unwrap()
            .starts_with("// Seed: 5 -g 1,1,1 -l 1,1,1\n"));
    }
}
