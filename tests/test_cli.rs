use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn program(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/programs").join(name)
}

fn rpnc(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_rpnc"))
        .args(args)
        .output()
        .expect("failed to run rpnc")
}

fn run_program(name: &str, extra: &[&str]) -> Output {
    let path = program(name);
    let mut args = vec![path.to_str().unwrap()];
    args.extend_from_slice(extra);
    rpnc(&args)
}

// ============================================================================
// BATCH
// ============================================================================

#[test]
fn test_batch_prints_listing() {
    let output = run_program("countdown.rpn", &[]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    assert!(stdout.contains("; countdown\n"));
    assert!(stdout.contains("; main\n"));
}

#[test]
fn test_batch_error_exits_with_failure() {
    let output = run_program("broken.rpn", &[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty(), "listing printed on error");
    assert!(String::from_utf8_lossy(&output.stderr).contains("unterminated definition"));
}

#[test]
fn test_missing_file_exits_with_failure() {
    let output = run_program("no-such-program.rpn", &[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("cannot open"));
}

// ============================================================================
// INTERACTIVE
// ============================================================================

#[test]
fn test_interactive_file_runs_program() {
    let output = run_program("countdown.rpn", &["-i"]);

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "3.000000\n2.000000\n1.000000\n");
}

#[test]
fn test_interactive_errors_keep_success() {
    let output = run_program("errors.rpn", &["-i"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout), "3.000000\n");
    assert_eq!(stderr.lines().filter(|line| line.starts_with("error: ")).count(), 2);
}
