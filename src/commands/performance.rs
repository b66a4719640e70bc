use anyhow::Result;
use serde_json::{Value, json};

use crate::adapter::detect_python;
use crate::command::{Command, CommandKind, Execution};
use crate::commands::{cache_hit, labeled, path_json};
use crate::context::{ExecutionContext, kwargs_to_args};
use crate::format::{Format, RuntimeProvider, Variant};
use crate::paths::{MODEL_INPUT_DIR, artifact_relative_path};

/// Benchmark a converted artifact on one runtime provider. Timing loops run
/// in an external profiler; the measurements land in a JSON file next to
/// the artifact, which doubles as this command's cacheable output.
pub fn performance(format: Format, variant: Variant, runtime: RuntimeProvider) -> Command {
    let name = format!("{} on {runtime}", labeled(&format!("Performance {format}"), &variant));
    let cmd_name = name.clone();

    let action = move |ctx: &ExecutionContext| -> Result<Execution> {
        let model_rel = artifact_relative_path(format, &variant)?;
        let results_rel = model_rel.with_file_name(format!("performance_{runtime}.json"));

        if cache_hit(ctx, &results_rel, &cmd_name) {
            return Ok(Execution::Completed(Some(results_rel)));
        }
        if !ctx.absolute(&model_rel).exists() {
            return Ok(Execution::Skipped(format!(
                "converted model not found at {}",
                model_rel.display()
            )));
        }

        let mut argv = vec![
            detect_python()?,
            "-m".to_string(),
            "porter_runners.performance".to_string(),
        ];
        argv.extend(kwargs_to_args(&[
            ("model-path", path_json(&model_rel)),
            ("format", json!(format.as_str())),
            ("runtime", json!(runtime.as_str())),
            ("samples-dir", json!(MODEL_INPUT_DIR)),
            ("results-path", path_json(&results_rel)),
            (
                "batch-dim",
                ctx.config.batch_dim.map_or(Value::Null, |d| json!(d)),
            ),
        ]));
        ctx.execute_cmd(
            &argv,
            &model_rel.with_file_name(format!("reproduce_performance_{runtime}.sh")),
        )?;
        Ok(Execution::Completed(Some(results_rel)))
    };

    Command::new(name, CommandKind::Performance, action)
        .target_format(format)
        .variant(variant)
}
