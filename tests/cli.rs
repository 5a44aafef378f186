use std::{
    path::PathBuf,
    process::{Command, Output},
};

fn flare() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_flare"));
    cmd.env_remove("RUST_LOG")
        .env_remove("FLARE_MAX_CALL_DEPTH")
        .env_remove("FLARE_LIBRARY_DIR")
        .env_remove("FLARE_TRACE")
        .env("NO_COLOR", "1");
    cmd
}

fn script(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("scripts")
        .join(name)
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

#[test]
fn runs_a_script_file() {
    let output = flare()
        .arg(script("factorial.flrs"))
        .output()
        .expect("failed to run flare");
    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert_eq!(
        stdout(&output),
        "1! = 1\n2! = 2\n3! = 6\n4! = 24\n5! = 120\n"
    );
}

#[test]
fn err_exits_with_failure() {
    let output = flare()
        .arg(script("halt.flrs"))
        .output()
        .expect("failed to run flare");
    assert_eq!(output.status.code(), Some(1));
    assert_eq!(stdout(&output), "before\n");
    assert!(stderr(&output).contains("stopped on purpose"));
}

#[test]
fn evaluates_inline_code() {
    let output = flare()
        .args(["-e", "video++ 6 * 7"])
        .output()
        .expect("failed to run flare");
    assert!(output.status.success());
    assert_eq!(stdout(&output), "42");
}

#[test]
fn prints_the_version() {
    let output = flare().arg("-v").output().expect("failed to run flare");
    assert!(output.status.success());
    assert_eq!(
        stdout(&output).trim(),
        format!("flare {}", env!("CARGO_PKG_VERSION"))
    );
}

#[test]
fn missing_script_fails() {
    let output = flare()
        .arg(script("does-not-exist.flrs"))
        .output()
        .expect("failed to run flare");
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Could not open"));
}

#[test]
fn malformed_config_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = dir.path().join("broken.toml");
    std::fs::write(&config, "max_call_depth = \"deep\"").expect("write config");
    let output = flare()
        .arg("--config")
        .arg(&config)
        .args(["-e", "video++ 1"])
        .output()
        .expect("failed to run flare");
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("failed to parse"));
}
