use anyhow::Result;
use serde_json::{Value, json};

use crate::adapter::detect_python;
use crate::command::{Command, CommandKind, Execution};
use crate::commands::{cache_hit, labeled, path_json};
use crate::context::{ExecutionContext, kwargs_to_args};
use crate::format::{Format, JitType, Precision, Variant};
use crate::paths::artifact_relative_path;

/// Convert an exported SavedModel to ONNX with `tf2onnx`.
pub fn convert_savedmodel_to_onnx(enable_xla: Option<bool>, jit_compile: Option<bool>) -> Command {
    let variant = Variant {
        enable_xla,
        jit_compile,
        ..Variant::default()
    };
    let name = labeled("Convert SavedModel to ONNX", &variant);
    let cmd_name = name.clone();

    let action = move |ctx: &ExecutionContext| -> Result<Execution> {
        let in_rel = artifact_relative_path(Format::TfSavedmodel, &variant)?;
        let out_rel = artifact_relative_path(Format::Onnx, &variant)?;

        if cache_hit(ctx, &out_rel, &cmd_name) {
            return Ok(Execution::Completed(Some(out_rel)));
        }
        if !ctx.absolute(&in_rel).exists() {
            return Ok(Execution::Skipped(format!(
                "exported SavedModel not found at {}",
                in_rel.display()
            )));
        }

        let argv = vec![
            detect_python()?,
            "-m".to_string(),
            "tf2onnx.convert".to_string(),
            "--saved-model".to_string(),
            in_rel.to_string_lossy().into_owned(),
            "--output".to_string(),
            out_rel.to_string_lossy().into_owned(),
            "--opset".to_string(),
            ctx.config.opset.to_string(),
        ];
        ctx.execute_cmd(&argv, &out_rel.with_file_name("reproduce_conversion.sh"))?;
        Ok(Execution::Completed(Some(out_rel)))
    };

    Command::new(name, CommandKind::Convert, action)
        .target_format(Format::Onnx)
        .variant(variant)
}

/// Build a TensorRT engine from an ONNX artifact with `trtexec`. The ONNX
/// input carries the same XLA / jit-compile flags as the requested engine.
pub fn convert_onnx_to_trt(
    precision: Precision,
    enable_xla: Option<bool>,
    jit_compile: Option<bool>,
) -> Command {
    let base_variant = Variant {
        enable_xla,
        jit_compile,
        ..Variant::default()
    };
    let variant = Variant {
        precision: Some(precision),
        ..base_variant
    };
    let name = labeled("Convert ONNX to TensorRT", &variant);
    let cmd_name = name.clone();

    let action = move |ctx: &ExecutionContext| -> Result<Execution> {
        let in_rel = artifact_relative_path(Format::Onnx, &base_variant)?;
        let out_rel = artifact_relative_path(Format::Trt, &variant)?;

        if cache_hit(ctx, &out_rel, &cmd_name) {
            return Ok(Execution::Completed(Some(out_rel)));
        }
        if !ctx.absolute(&in_rel).exists() {
            return Ok(Execution::Skipped(format!(
                "ONNX model not found at {}",
                in_rel.display()
            )));
        }

        let mut argv = vec![
            "trtexec".to_string(),
            format!("--onnx={}", in_rel.display()),
            format!("--saveEngine={}", out_rel.display()),
            format!(
                "--memPoolSize=workspace:{}M",
                ctx.config.max_workspace_size / (1024 * 1024)
            ),
        ];
        match precision {
            Precision::Fp32 => {}
            Precision::Fp16 => argv.push("--fp16".to_string()),
            Precision::Int8 => argv.push("--int8".to_string()),
        }
        ctx.execute_cmd(&argv, &out_rel.with_file_name("reproduce_conversion.sh"))?;
        Ok(Execution::Completed(Some(out_rel)))
    };

    Command::new(name, CommandKind::Convert, action)
        .target_format(Format::Trt)
        .variant(variant)
}

/// Convert an exported SavedModel to a TF-TRT SavedModel via an external
/// runner.
pub fn convert_savedmodel_to_tftrt(
    precision: Precision,
    enable_xla: Option<bool>,
    jit_compile: Option<bool>,
) -> Command {
    let base_variant = Variant {
        enable_xla,
        jit_compile,
        ..Variant::default()
    };
    let variant = Variant {
        precision: Some(precision),
        ..base_variant
    };
    let name = labeled("Convert SavedModel to TF-TRT", &variant);
    let cmd_name = name.clone();

    let action = move |ctx: &ExecutionContext| -> Result<Execution> {
        let in_rel = artifact_relative_path(Format::TfSavedmodel, &base_variant)?;
        let out_rel = artifact_relative_path(Format::TfTrt, &variant)?;

        if cache_hit(ctx, &out_rel, &cmd_name) {
            return Ok(Execution::Completed(Some(out_rel)));
        }
        if !ctx.absolute(&in_rel).exists() {
            return Ok(Execution::Skipped(format!(
                "exported SavedModel not found at {}",
                in_rel.display()
            )));
        }

        let mut argv = vec![
            detect_python()?,
            "-m".to_string(),
            "porter_runners.savedmodel2tftrt".to_string(),
        ];
        argv.extend(kwargs_to_args(&[
            ("exported-model-path", path_json(&in_rel)),
            ("converted-model-path", path_json(&out_rel)),
            ("max-workspace-size", json!(ctx.config.max_workspace_size)),
            ("target-precision", json!(precision.as_str())),
            (
                "minimum-segment-size",
                json!(ctx.config.minimum_segment_size),
            ),
            (
                "batch-dim",
                ctx.config.batch_dim.map_or(Value::Null, |d| json!(d)),
            ),
        ]));
        ctx.execute_cmd(&argv, &out_rel.with_file_name("reproduce_conversion.sh"))?;
        Ok(Execution::Completed(Some(out_rel)))
    };

    Command::new(name, CommandKind::Convert, action)
        .target_format(Format::TfTrt)
        .variant(variant)
}

/// Compile an exported TorchScript module with Torch-TensorRT via an
/// external runner.
pub fn convert_torchscript_to_torchtrt(jit: JitType, precision: Precision) -> Command {
    let base_variant = Variant {
        jit: Some(jit),
        ..Variant::default()
    };
    let variant = Variant {
        precision: Some(precision),
        ..base_variant
    };
    let name = labeled("Convert TorchScript to Torch-TRT", &variant);
    let cmd_name = name.clone();

    let action = move |ctx: &ExecutionContext| -> Result<Execution> {
        let in_rel = artifact_relative_path(Format::TorchScript, &base_variant)?;
        let out_rel = artifact_relative_path(Format::TorchTrt, &variant)?;

        if cache_hit(ctx, &out_rel, &cmd_name) {
            return Ok(Execution::Completed(Some(out_rel)));
        }
        if !ctx.absolute(&in_rel).exists() {
            return Ok(Execution::Skipped(format!(
                "exported TorchScript model not found at {}",
                in_rel.display()
            )));
        }

        let mut argv = vec![
            detect_python()?,
            "-m".to_string(),
            "porter_runners.torch_tensorrt".to_string(),
        ];
        argv.extend(kwargs_to_args(&[
            ("exported-model-path", path_json(&in_rel)),
            ("converted-model-path", path_json(&out_rel)),
            ("target-precision", json!(precision.as_str())),
            ("max-workspace-size", json!(ctx.config.max_workspace_size)),
            (
                "batch-dim",
                ctx.config.batch_dim.map_or(Value::Null, |d| json!(d)),
            ),
        ]));
        ctx.execute_cmd(&argv, &out_rel.with_file_name("reproduce_conversion.sh"))?;
        Ok(Execution::Completed(Some(out_rel)))
    };

    Command::new(name, CommandKind::Convert, action)
        .target_format(Format::TorchTrt)
        .variant(variant)
}
