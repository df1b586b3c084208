use std::process::Command;

#[test]
fn sariflens_exits_non_zero_on_missing_input() {
    let output = Command::new(env!("CARGO_BIN_EXE_sariflens"))
        .arg("--batch")
        .arg("missing.sarif")
        .output()
        .expect("run sariflens");

    assert!(!output.status.success());
}

#[test]
fn sariflens_exits_non_zero_on_invalid_json() {
    let temp_dir = tempfile::tempdir().expect("create temp dir");
    let sarif = temp_dir.path().join("broken.sarif");
    std::fs::write(&sarif, "{\"runs\": [").expect("write sarif");

    let output = Command::new(env!("CARGO_BIN_EXE_sariflens"))
        .arg("--batch")
        .arg(&sarif)
        .output()
        .expect("run sariflens");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("invalid JSON"), "stderr: {stderr}");
}

#[test]
fn sariflens_requires_an_input() {
    let output = Command::new(env!("CARGO_BIN_EXE_sariflens"))
        .output()
        .expect("run sariflens");

    assert!(!output.status.success());
}
