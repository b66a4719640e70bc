//! End-to-end runs of the executor against real pipelines in a temp workdir.
//! The ONNX source path is used throughout because staging is a plain file
//! copy, so these tests exercise the full engine without any external tools.

use std::fs;
use std::path::Path;
use std::rc::Rc;

use porter_ml::adapter::ModelAdapter;
use porter_ml::builders::build_pipeline;
use porter_ml::command::{CommandKind, Status};
use porter_ml::config::Config;
use porter_ml::context::ExecutionContext;
use porter_ml::executor::Executor;
use porter_ml::format::{Format, Framework};
use porter_ml::report::{RunReport, STATUS_FILENAME};
use porter_ml::sample::{
    Dataloader, JsonDataloader, Sample, SampleData, TensorValue,
};

/// Test adapter that "infers" outputs by echoing the inputs back under
/// output names, so no framework runtime is needed.
struct EchoAdapter;

impl ModelAdapter for EchoAdapter {
    fn framework(&self) -> Framework {
        Framework::Onnx
    }

    fn tensor_type_name(&self) -> &'static str {
        "numpy.ndarray"
    }

    fn is_supported_tensor(&self, tensor: &TensorValue) -> bool {
        tensor.dtype != "unsupported"
    }

    fn infer_outputs(&self, _model_path: &Path, sample: &Sample) -> anyhow::Result<Sample> {
        Ok(sample
            .values()
            .enumerate()
            .map(|(i, t)| (format!("output__{i}"), t.clone()))
            .collect())
    }
}

fn tensor(dtype: &str) -> TensorValue {
    TensorValue {
        dtype: dtype.to_string(),
        shape: vec![1, 2],
        data: vec![0.5, 1.5],
    }
}

fn loader_with(n: usize) -> Rc<dyn Dataloader> {
    let samples = (0..n)
        .map(|_| SampleData::Tensor(tensor("float32")))
        .collect();
    Rc::new(JsonDataloader::from_samples(samples))
}

fn onnx_config(workdir: &Path) -> Config {
    let model_path = workdir.join("source.onnx");
    fs::write(&model_path, b"not a real model").unwrap();
    let mut config = Config::new(Framework::Onnx, model_path);
    config.workdir = workdir.join("work");
    config.target_formats = vec![Format::Onnx];
    config.sample_count = 3;
    config
}

fn run(config: &Config, loader: Rc<dyn Dataloader>) -> anyhow::Result<RunReport> {
    config.prepare_workdir().unwrap();
    let mut pipeline = build_pipeline(config, loader)?;
    let adapter = EchoAdapter;
    let ctx = ExecutionContext::new(config, &adapter);
    Executor::run(&mut pipeline, &ctx)
}

#[test]
fn onnx_staging_run_succeeds_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let config = onnx_config(dir.path());

    let report = run(&config, loader_with(2)).unwrap();

    assert_eq!(report.requested_failures(), 0);
    for entry in &report.commands {
        assert_eq!(entry.status, Status::Ok, "{} should be OK", entry.name);
    }
    assert!(config.workdir.join("onnx/model.onnx").exists());
    assert!(config.workdir.join("model_input/sample_0.json").exists());
    assert!(config.workdir.join("model_output/sample_1.json").exists());

    // The persisted report matches what the executor returned.
    let loaded = RunReport::load(&config.workdir).unwrap();
    assert_eq!(loaded.commands.len(), report.commands.len());
}

#[test]
fn failed_conversion_skips_its_dependents_but_run_completes() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = onnx_config(dir.path());
    // trtexec is not installed here, so the conversion fails.
    config.target_formats = vec![Format::Trt];

    let report = run(&config, loader_with(1)).unwrap();

    let convert = report
        .commands
        .iter()
        .find(|c| c.kind == CommandKind::Convert)
        .unwrap();
    assert_eq!(convert.status, Status::Fail);
    assert!(convert.error.is_some());

    for entry in report
        .commands
        .iter()
        .filter(|c| matches!(c.kind, CommandKind::Correctness | CommandKind::Performance))
    {
        assert_eq!(
            entry.status,
            Status::Skipped,
            "{} depends on the failed conversion",
            entry.name
        );
        assert!(entry.duration_ms.is_none(), "skipped commands are not invoked");
    }

    assert!(report.requested_failures() > 0);
    // The preprocessing and staging parts of the run are unaffected.
    let staged = report
        .commands
        .iter()
        .find(|c| c.kind == CommandKind::Export)
        .unwrap();
    assert_eq!(staged.status, Status::Ok);
}

#[test]
fn rerun_reuses_existing_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let config = onnx_config(dir.path());

    run(&config, loader_with(1)).unwrap();
    let staged = config.workdir.join("onnx/model.onnx");
    fs::write(&staged, b"externally replaced").unwrap();

    // Second run finds the artifact on disk and does not touch it.
    let report = run(&config, loader_with(1)).unwrap();
    assert_eq!(report.requested_failures(), 0);
    assert_eq!(fs::read(&staged).unwrap(), b"externally replaced");
}

#[test]
fn empty_dataloader_aborts_with_a_persisted_report() {
    let dir = tempfile::tempdir().unwrap();
    let config = onnx_config(dir.path());

    let err = run(&config, loader_with(0)).unwrap_err();
    assert!(err.to_string().contains("no samples"));

    // The report reached disk before the abort and records the failure.
    let loaded = RunReport::load(&config.workdir).unwrap();
    assert_eq!(loaded.commands[0].status, Status::Fail);
    assert_eq!(loaded.commands.len(), 1);
}

#[test]
fn invalid_sample_dtype_aborts_the_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = onnx_config(dir.path());
    let loader: Rc<dyn Dataloader> = Rc::new(JsonDataloader::from_samples(vec![
        SampleData::Tensor(tensor("unsupported")),
    ]));

    assert!(run(&config, loader).is_err());
    assert!(config.workdir.join(STATUS_FILENAME).exists());
}

#[test]
fn deployment_config_is_written_next_to_the_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let config = onnx_config(dir.path());

    run(&config, loader_with(1)).unwrap();

    let deployment = config.workdir.join("onnx/deployment.json");
    let raw = fs::read_to_string(deployment).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(parsed["format"], "onnx");
    assert_eq!(parsed["model_name"], "porter_model");
}

#[test]
fn report_is_written_incrementally() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = onnx_config(dir.path());
    config.save_data = false;

    let report = run(&config, loader_with(1)).unwrap();
    // Every command has a terminal status in insertion order.
    assert!(report.commands.iter().all(|c| c.status != Status::Initialized));
    let loaded = RunReport::load(&config.workdir).unwrap();
    let names: Vec<_> = loaded.commands.iter().map(|c| &c.name).collect();
    let expected: Vec<_> = report.commands.iter().map(|c| &c.name).collect();
    assert_eq!(names, expected);
}
