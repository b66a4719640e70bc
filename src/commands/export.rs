use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde_json::{Value, json};

use crate::adapter::detect_python;
use crate::command::{Command, CommandKind, Execution};
use crate::commands::{cache_hit, labeled, path_json};
use crate::context::{ExecutionContext, kwargs_to_args};
use crate::format::{Format, JitType, Variant};
use crate::paths::artifact_relative_path;

fn source_model_path(ctx: &ExecutionContext) -> Result<PathBuf> {
    std::path::absolute(&ctx.config.model_path).with_context(|| {
        format!(
            "cannot resolve model path {}",
            ctx.config.model_path.display()
        )
    })
}

/// Export the source PyTorch model to TorchScript via an external runner.
pub fn export_torchscript(jit: JitType) -> Command {
    let variant = Variant {
        jit: Some(jit),
        ..Variant::default()
    };
    let name = labeled("Export TorchScript", &variant);
    let cmd_name = name.clone();

    let action = move |ctx: &ExecutionContext| -> Result<Execution> {
        let out_rel = artifact_relative_path(Format::TorchScript, &variant)?;
        if cache_hit(ctx, &out_rel, &cmd_name) {
            return Ok(Execution::Completed(Some(out_rel)));
        }

        let mut argv = vec![
            detect_python()?,
            "-m".to_string(),
            "porter_runners.export_torchscript".to_string(),
        ];
        argv.extend(kwargs_to_args(&[
            ("model-path", path_json(&source_model_path(ctx)?)),
            ("output-path", path_json(&out_rel)),
            ("jit-type", json!(jit.as_str())),
            (
                "batch-dim",
                ctx.config.batch_dim.map_or(Value::Null, |d| json!(d)),
            ),
        ]));
        ctx.execute_cmd(&argv, &out_rel.with_file_name("reproduce_export.sh"))?;
        Ok(Execution::Completed(Some(out_rel)))
    };

    Command::new(name, CommandKind::Export, action)
        .target_format(Format::TorchScript)
        .variant(variant)
}

/// Export the source PyTorch model to ONNX via an external runner.
pub fn export_onnx() -> Command {
    let variant = Variant::default();
    let name = "Export ONNX".to_string();
    let cmd_name = name.clone();

    let action = move |ctx: &ExecutionContext| -> Result<Execution> {
        let out_rel = artifact_relative_path(Format::Onnx, &variant)?;
        if cache_hit(ctx, &out_rel, &cmd_name) {
            return Ok(Execution::Completed(Some(out_rel)));
        }

        let mut argv = vec![
            detect_python()?,
            "-m".to_string(),
            "porter_runners.export_onnx".to_string(),
        ];
        argv.extend(kwargs_to_args(&[
            ("model-path", path_json(&source_model_path(ctx)?)),
            ("output-path", path_json(&out_rel)),
            ("opset", json!(ctx.config.opset)),
            (
                "batch-dim",
                ctx.config.batch_dim.map_or(Value::Null, |d| json!(d)),
            ),
        ]));
        ctx.execute_cmd(&argv, &out_rel.with_file_name("reproduce_export.sh"))?;
        Ok(Execution::Completed(Some(out_rel)))
    };

    Command::new(name, CommandKind::Export, action).target_format(Format::Onnx)
}

/// Export the source TensorFlow model to a SavedModel, one artifact per
/// requested XLA / jit-compile variant.
pub fn export_savedmodel(enable_xla: Option<bool>, jit_compile: Option<bool>) -> Command {
    let variant = Variant {
        enable_xla,
        jit_compile,
        ..Variant::default()
    };
    let name = labeled("Export SavedModel", &variant);
    let cmd_name = name.clone();

    let action = move |ctx: &ExecutionContext| -> Result<Execution> {
        let out_rel = artifact_relative_path(Format::TfSavedmodel, &variant)?;
        if cache_hit(ctx, &out_rel, &cmd_name) {
            return Ok(Execution::Completed(Some(out_rel)));
        }

        let mut argv = vec![
            detect_python()?,
            "-m".to_string(),
            "porter_runners.export_savedmodel".to_string(),
        ];
        argv.extend(kwargs_to_args(&[
            ("model-path", path_json(&source_model_path(ctx)?)),
            ("output-path", path_json(&out_rel)),
            (
                "enable-xla",
                enable_xla.map_or(Value::Null, |v| json!(v)),
            ),
            (
                "jit-compile",
                jit_compile.map_or(Value::Null, |v| json!(v)),
            ),
        ]));
        ctx.execute_cmd(&argv, &out_rel.with_file_name("reproduce_export.sh"))?;
        Ok(Execution::Completed(Some(out_rel)))
    };

    Command::new(name, CommandKind::Export, action)
        .target_format(Format::TfSavedmodel)
        .variant(variant)
}

/// "Export" for an ONNX source model: stage the file at its canonical
/// artifact path so downstream conversions have a uniform input location.
pub fn stage_onnx() -> Command {
    let name = "Export ONNX".to_string();
    let cmd_name = name.clone();

    let action = move |ctx: &ExecutionContext| -> Result<Execution> {
        let out_rel = artifact_relative_path(Format::Onnx, &Variant::default())?;
        if cache_hit(ctx, &out_rel, &cmd_name) {
            return Ok(Execution::Completed(Some(out_rel)));
        }

        let out_abs = ctx.absolute(&out_rel);
        if let Some(parent) = out_abs.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let source = source_model_path(ctx)?;
        fs::copy(&source, &out_abs).with_context(|| {
            format!(
                "failed to stage {} at {}",
                source.display(),
                out_abs.display()
            )
        })?;
        Ok(Execution::Completed(Some(out_rel)))
    };

    Command::new(name, CommandKind::Export, action).target_format(Format::Onnx)
}
