//! Graph-shape tests: build pipelines for representative configs and assert
//! on the commands and edges, without executing anything.

use std::rc::Rc;

use porter_ml::builders::build_pipeline;
use porter_ml::command::CommandKind;
use porter_ml::config::Config;
use porter_ml::format::{Format, Framework, JitType, Precision};
use porter_ml::pipeline::Pipeline;
use porter_ml::sample::{Dataloader, JsonDataloader};

fn loader() -> Rc<dyn Dataloader> {
    // Graph construction never touches the samples.
    Rc::new(JsonDataloader::from_samples(Vec::new()))
}

fn count_kind(pipeline: &Pipeline, kind: CommandKind) -> usize {
    pipeline.commands().filter(|(_, c)| c.kind == kind).count()
}

#[test]
fn torch_trt_request_inserts_onnx_export_once_as_prerequisite() {
    let mut config = Config::new(Framework::Torch, "model.pt");
    config.target_formats = vec![Format::Trt];
    config.target_precisions = vec![Precision::Fp32, Precision::Fp16];

    let pipeline = build_pipeline(&config, loader()).unwrap();

    let onnx_exports: Vec<_> = pipeline
        .commands()
        .filter(|(_, c)| c.kind == CommandKind::Export && c.target_format == Some(Format::Onnx))
        .collect();
    assert_eq!(onnx_exports.len(), 1, "shared intermediate must be a single node");
    assert!(
        !onnx_exports[0].1.requested,
        "auto-inserted prerequisite must not count as requested"
    );

    // One conversion per precision, each depending on the shared export.
    let (export_id, _) = onnx_exports[0];
    let converts: Vec<_> = pipeline
        .commands()
        .filter(|(_, c)| c.kind == CommandKind::Convert)
        .collect();
    assert_eq!(converts.len(), 2);
    for (_, convert) in &converts {
        assert!(convert.requested);
        assert_eq!(convert.requires, vec![export_id]);
    }
}

#[test]
fn requested_onnx_and_trt_share_one_export_marked_requested() {
    let mut config = Config::new(Framework::Torch, "model.pt");
    config.target_formats = vec![Format::Onnx, Format::Trt];
    config.target_precisions = vec![Precision::Fp32];

    let pipeline = build_pipeline(&config, loader()).unwrap();

    let onnx_exports: Vec<_> = pipeline
        .commands()
        .filter(|(_, c)| c.kind == CommandKind::Export && c.target_format == Some(Format::Onnx))
        .collect();
    assert_eq!(onnx_exports.len(), 1);
    assert!(onnx_exports[0].1.requested);
}

#[test]
fn export_only_config_yields_no_checks() {
    let mut config = Config::new(Framework::Torch, "model.pt");
    config.target_formats = vec![Format::TorchScript, Format::Onnx];

    let pipeline = build_pipeline(&config, loader()).unwrap();

    assert_eq!(count_kind(&pipeline, CommandKind::Correctness), 0);
    assert_eq!(count_kind(&pipeline, CommandKind::Performance), 0);
    // Both jit variants plus the plain ONNX export.
    assert_eq!(count_kind(&pipeline, CommandKind::Export), 3);
}

#[test]
fn check_flags_gate_correctness_and_performance() {
    let mut config = Config::new(Framework::Onnx, "model.onnx");
    config.target_formats = vec![Format::Trt];
    config.target_precisions = vec![Precision::Fp32];

    let with_checks = build_pipeline(&config, loader()).unwrap();
    assert!(count_kind(&with_checks, CommandKind::Correctness) > 0);
    assert!(count_kind(&with_checks, CommandKind::Performance) > 0);

    config.run_correctness = false;
    config.run_profiling = false;
    let without = build_pipeline(&config, loader()).unwrap();
    assert_eq!(count_kind(&without, CommandKind::Correctness), 0);
    assert_eq!(count_kind(&without, CommandKind::Performance), 0);
}

#[test]
fn tensorflow_savedmodel_is_shared_by_tftrt_and_onnx_routes() {
    let mut config = Config::new(Framework::TensorFlow, "model");
    config.target_formats = vec![Format::TfTrt, Format::Onnx];
    config.target_precisions = vec![Precision::Fp16];

    let pipeline = build_pipeline(&config, loader()).unwrap();

    let savedmodels: Vec<_> = pipeline
        .commands()
        .filter(|(_, c)| c.target_format == Some(Format::TfSavedmodel))
        .collect();
    assert_eq!(savedmodels.len(), 1);
    assert!(!savedmodels[0].1.requested);

    let (sm_id, _) = savedmodels[0];
    for (_, command) in pipeline.commands().filter(|(_, c)| c.kind == CommandKind::Convert) {
        match command.target_format {
            Some(Format::TfTrt) | Some(Format::Onnx) => {
                assert_eq!(command.requires, vec![sm_id]);
            }
            other => panic!("unexpected conversion target {other:?}"),
        }
    }
}

#[test]
fn tensorflow_xla_variants_multiply_exports() {
    let mut config = Config::new(Framework::TensorFlow, "model");
    config.target_formats = vec![Format::TfSavedmodel];
    config.enable_xla = vec![false, true];

    let pipeline = build_pipeline(&config, loader()).unwrap();
    assert_eq!(count_kind(&pipeline, CommandKind::Export), 2);
}

#[test]
fn torchscript_jit_types_produce_distinct_exports() {
    let mut config = Config::new(Framework::Torch, "model.pt");
    config.target_formats = vec![Format::TorchScript];
    config.target_jit_types = vec![JitType::Script, JitType::Trace];

    let pipeline = build_pipeline(&config, loader()).unwrap();
    let names: Vec<_> = pipeline
        .commands()
        .filter(|(_, c)| c.kind == CommandKind::Export)
        .map(|(_, c)| c.name.clone())
        .collect();
    assert_eq!(names.len(), 2);
    assert_ne!(names[0], names[1]);
}

#[test]
fn torch_trt_converts_from_torchscript_not_onnx() {
    let mut config = Config::new(Framework::Torch, "model.pt");
    config.target_formats = vec![Format::TorchTrt];
    config.target_precisions = vec![Precision::Fp32];
    config.target_jit_types = vec![JitType::Script];

    let pipeline = build_pipeline(&config, loader()).unwrap();

    let torchscript: Vec<_> = pipeline
        .commands()
        .filter(|(_, c)| c.target_format == Some(Format::TorchScript))
        .collect();
    assert_eq!(torchscript.len(), 1);
    assert!(!torchscript[0].1.requested);
    assert_eq!(
        pipeline
            .commands()
            .filter(|(_, c)| c.target_format == Some(Format::Onnx))
            .count(),
        0
    );
}

#[test]
fn graph_construction_is_deterministic() {
    let config = Config::new(Framework::Torch, "model.pt");

    let first: Vec<String> = build_pipeline(&config, loader())
        .unwrap()
        .commands()
        .map(|(_, c)| c.name.clone())
        .collect();
    let second: Vec<String> = build_pipeline(&config, loader())
        .unwrap()
        .commands()
        .map(|(_, c)| c.name.clone())
        .collect();
    assert_eq!(first, second);
}

#[test]
fn save_data_flag_controls_dump_commands() {
    let mut config = Config::new(Framework::Onnx, "model.onnx");
    config.target_formats = vec![Format::Onnx];

    let with_dumps = build_pipeline(&config, loader()).unwrap();
    assert_eq!(count_kind(&with_dumps, CommandKind::Dump), 2);

    config.save_data = false;
    let without = build_pipeline(&config, loader()).unwrap();
    assert_eq!(count_kind(&without, CommandKind::Dump), 0);
}

#[test]
fn unreachable_format_is_rejected_before_building() {
    let mut config = Config::new(Framework::Onnx, "model.onnx");
    config.target_formats = vec![Format::TorchScript];
    assert!(build_pipeline(&config, loader()).is_err());
}
