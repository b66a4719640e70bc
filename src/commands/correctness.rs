use anyhow::Result;
use serde_json::{Value, json};

use crate::adapter::detect_python;
use crate::command::{Command, CommandKind, Execution};
use crate::commands::{labeled, path_json};
use crate::context::{ExecutionContext, kwargs_to_args};
use crate::format::{Format, RuntimeProvider, Variant};
use crate::paths::{MODEL_INPUT_DIR, MODEL_OUTPUT_DIR, artifact_relative_path};

/// Compare a converted artifact's outputs against the source model's, on
/// one runtime provider. The numeric comparison itself is an external
/// checker; this command only wires paths and tolerances into it.
pub fn correctness(format: Format, variant: Variant, runtime: RuntimeProvider) -> Command {
    let name = format!("{} on {runtime}", labeled(&format!("Correctness {format}"), &variant));

    let action = move |ctx: &ExecutionContext| -> Result<Execution> {
        let model_rel = artifact_relative_path(format, &variant)?;
        if !ctx.absolute(&model_rel).exists() {
            return Ok(Execution::Skipped(format!(
                "converted model not found at {}",
                model_rel.display()
            )));
        }

        let mut argv = vec![
            detect_python()?,
            "-m".to_string(),
            "porter_runners.correctness".to_string(),
        ];
        argv.extend(kwargs_to_args(&[
            ("model-path", path_json(&model_rel)),
            ("format", json!(format.as_str())),
            ("runtime", json!(runtime.as_str())),
            ("samples-dir", json!(MODEL_INPUT_DIR)),
            ("expected-dir", json!(MODEL_OUTPUT_DIR)),
            ("atol", ctx.config.atol.map_or(Value::Null, |v| json!(v))),
            ("rtol", ctx.config.rtol.map_or(Value::Null, |v| json!(v))),
            (
                "batch-dim",
                ctx.config.batch_dim.map_or(Value::Null, |d| json!(d)),
            ),
        ]));
        ctx.execute_cmd(
            &argv,
            &model_rel.with_file_name(format!("reproduce_correctness_{runtime}.sh")),
        )?;
        Ok(Execution::Completed(None))
    };

    Command::new(name, CommandKind::Correctness, action)
        .target_format(format)
        .variant(variant)
}
