/// CLI integration tests for porter-ml.
///
/// These tests invoke the compiled binary end-to-end using `--dry-run`
/// so they do NOT require Python, trtexec, or any framework runtime.
/// They verify argument parsing, config assembly, and graph planning.
use std::fs;
use std::process::Command;

use tempfile::tempdir;

const SAMPLES: &str = r#"[{"dtype": "float32", "shape": [1, 4], "data": [0.1, 0.2, 0.3, 0.4]}]"#;

#[test]
fn convert_dry_run_prints_the_plan() {
    let bin = env!("CARGO_BIN_EXE_porter-ml");
    let tmp = tempdir().expect("tempdir");
    let model = tmp.path().join("model.onnx");
    fs::write(&model, b"stub").expect("write model stub");
    let samples = tmp.path().join("samples.json");
    fs::write(&samples, SAMPLES).expect("write samples");

    let output = Command::new(bin)
        .args([
            "convert",
            "--framework",
            "onnx",
            "--model",
            model.to_str().unwrap(),
            "--samples",
            samples.to_str().unwrap(),
            "--target-formats",
            "onnx,trt",
            "--target-precisions",
            "fp16",
            "--workdir",
            tmp.path().join("work").to_str().unwrap(),
            "--dry-run",
        ])
        .output()
        .expect("failed to spawn porter-ml binary");

    assert!(output.status.success(), "convert --dry-run failed");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("ONNX pipeline"), "missing plan header: {stdout}");
    assert!(stdout.contains("Export ONNX"), "missing staging step: {stdout}");
    assert!(
        stdout.contains("Convert ONNX to TensorRT (fp16)"),
        "missing conversion step: {stdout}"
    );
    // Nothing executed: the workdir was never created.
    assert!(!tmp.path().join("work").exists());
}

#[test]
fn invalid_format_for_framework_is_rejected() {
    let bin = env!("CARGO_BIN_EXE_porter-ml");
    let tmp = tempdir().expect("tempdir");
    let model = tmp.path().join("model.onnx");
    fs::write(&model, b"stub").expect("write model stub");
    let samples = tmp.path().join("samples.json");
    fs::write(&samples, SAMPLES).expect("write samples");

    let output = Command::new(bin)
        .args([
            "convert",
            "--framework",
            "onnx",
            "--model",
            model.to_str().unwrap(),
            "--samples",
            samples.to_str().unwrap(),
            "--target-formats",
            "torchscript",
            "--dry-run",
        ])
        .output()
        .expect("failed to spawn porter-ml binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("cannot be produced"),
        "expected a config error, got: {stderr}"
    );
}

#[test]
fn missing_samples_file_is_a_clear_error() {
    let bin = env!("CARGO_BIN_EXE_porter-ml");
    let tmp = tempdir().expect("tempdir");
    let model = tmp.path().join("model.onnx");
    fs::write(&model, b"stub").expect("write model stub");

    let output = Command::new(bin)
        .args([
            "convert",
            "--framework",
            "onnx",
            "--model",
            model.to_str().unwrap(),
            "--samples",
            tmp.path().join("missing.json").to_str().unwrap(),
            "--dry-run",
        ])
        .output()
        .expect("failed to spawn porter-ml binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("failed to read samples"),
        "expected a samples error, got: {stderr}"
    );
}
