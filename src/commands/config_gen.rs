use std::fs;

use anyhow::{Context, Result};
use serde_json::json;

use crate::command::{Command, CommandKind, Execution};
use crate::commands::{cache_hit, labeled};
use crate::context::ExecutionContext;
use crate::format::{Format, Variant, format_runtimes};
use crate::paths::artifact_relative_path;

/// Emit a `deployment.json` next to the artifact describing how to serve
/// it: format, variant flags, and the runtimes it runs on. Downstream
/// serving tooling reads this instead of re-deriving the variant from the
/// directory name.
pub fn config_gen(format: Format, variant: Variant) -> Command {
    let name = labeled(&format!("Deployment config {format}"), &variant);
    let cmd_name = name.clone();

    let action = move |ctx: &ExecutionContext| -> Result<Execution> {
        let model_rel = artifact_relative_path(format, &variant)?;
        let out_rel = model_rel.with_file_name("deployment.json");

        if cache_hit(ctx, &out_rel, &cmd_name) {
            return Ok(Execution::Completed(Some(out_rel)));
        }
        if !ctx.absolute(&model_rel).exists() {
            return Ok(Execution::Skipped(format!(
                "model not found at {}",
                model_rel.display()
            )));
        }

        let runtimes: Vec<&str> = format_runtimes(format)
            .iter()
            .map(|r| r.as_str())
            .collect();
        let doc = json!({
            "model_name": ctx.config.model_name,
            "framework": ctx.config.framework.as_str(),
            "format": format.as_str(),
            "model_path": model_rel.file_name().map(|f| f.to_string_lossy()),
            "precision": variant.precision.map(|p| p.as_str()),
            "jit_type": variant.jit.map(|j| j.as_str()),
            "enable_xla": variant.enable_xla,
            "jit_compile": variant.jit_compile,
            "runtimes": runtimes,
            "batch_dim": ctx.config.batch_dim,
        });

        let out_abs = ctx.absolute(&out_rel);
        fs::write(&out_abs, serde_json::to_string_pretty(&doc)?)
            .with_context(|| format!("failed to write {}", out_abs.display()))?;
        Ok(Execution::Completed(Some(out_rel)))
    };

    Command::new(name, CommandKind::ConfigGen, action)
        .target_format(format)
        .variant(variant)
}
