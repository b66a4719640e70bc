use std::path::PathBuf;
use std::rc::Rc;

use anyhow::{Context, Result};
use tracing::info;

use crate::command::{Command, CommandKind, Execution};
use crate::context::ExecutionContext;
use crate::error::PorterError;
use crate::paths::{MODEL_INPUT_DIR, MODEL_OUTPUT_DIR};
use crate::sample::{Dataloader, TensorSpec, dump_sample, infer_metadata, normalize_sample, validate_sample};

/// Derive input names, dtypes and shapes from the first dataloader sample.
pub fn infer_input_metadata(loader: Rc<dyn Dataloader>) -> Command {
    let action = move |ctx: &ExecutionContext| -> Result<Execution> {
        let sample = loader
            .samples()
            .next()
            .ok_or_else(|| PorterError::user_input("dataloader returned no samples"))?;
        validate_sample(&sample, ctx.adapter)?;

        let metadata = infer_metadata(&sample, ctx.config.input_names.as_deref())?;
        info!(inputs = metadata.len(), "inferred input metadata");
        ctx.set_input_metadata(metadata);
        Ok(Execution::Completed(None))
    };

    Command::new("Infer input metadata", CommandKind::Preprocess, action)
}

/// Pull up to `sample_count` samples from the dataloader and normalize each
/// into the canonical name-keyed shape.
pub fn fetch_input_samples(loader: Rc<dyn Dataloader>) -> Command {
    let action = move |ctx: &ExecutionContext| -> Result<Execution> {
        let Some(metadata) = ctx.input_metadata() else {
            return Ok(Execution::Skipped(
                "input metadata not available".to_string(),
            ));
        };

        let mut samples = Vec::new();
        for data in loader.samples().take(ctx.config.sample_count) {
            samples.push(normalize_sample(&data, &metadata, ctx.adapter)?);
        }
        if samples.is_empty() {
            return Err(PorterError::user_input("dataloader returned no samples").into());
        }
        info!(count = samples.len(), "fetched input samples");
        ctx.set_samples(samples);
        Ok(Execution::Completed(None))
    };

    Command::new("Fetch input samples", CommandKind::Preprocess, action)
}

/// Run the source model on the first fetched sample to learn the output
/// names, dtypes and shapes.
pub fn infer_output_metadata() -> Command {
    let action = move |ctx: &ExecutionContext| -> Result<Execution> {
        let samples = ctx.samples();
        let Some(first) = samples.first() else {
            return Ok(Execution::Skipped("no input samples fetched".to_string()));
        };

        let outputs = ctx
            .adapter
            .infer_outputs(&std::path::absolute(&ctx.config.model_path)?, first)
            .context("source model inference failed")?;

        let names: Vec<String> = match &ctx.config.output_names {
            Some(names) if names.len() == outputs.len() => names.clone(),
            Some(names) => {
                return Err(PorterError::user_input(format!(
                    "{} output names configured but the model returned {} outputs",
                    names.len(),
                    outputs.len()
                ))
                .into());
            }
            None => outputs.keys().cloned().collect(),
        };

        let metadata = names
            .into_iter()
            .zip(outputs.values())
            .map(|(name, t)| {
                (
                    name,
                    TensorSpec {
                        dtype: t.dtype.clone(),
                        shape: t.shape.clone(),
                    },
                )
            })
            .collect();
        info!(outputs = outputs.len(), "inferred output metadata");
        ctx.set_output_metadata(metadata);
        Ok(Execution::Completed(None))
    };

    Command::new("Infer output metadata", CommandKind::Preprocess, action)
}

/// Dump the normalized input samples as JSON under `model_input/`.
pub fn dump_input_data() -> Command {
    let action = move |ctx: &ExecutionContext| -> Result<Execution> {
        let samples = ctx.samples();
        if samples.is_empty() {
            return Ok(Execution::Skipped("no input samples fetched".to_string()));
        }

        let dir = ctx.workdir().join(MODEL_INPUT_DIR);
        for (i, sample) in samples.iter().enumerate() {
            dump_sample(&dir, i, sample)?;
        }
        info!(count = samples.len(), dir = %dir.display(), "dumped input samples");
        Ok(Execution::Completed(Some(PathBuf::from(MODEL_INPUT_DIR))))
    };

    Command::new("Dump input data", CommandKind::Dump, action)
}

/// Run the source model over every fetched sample and dump the outputs as
/// JSON under `model_output/`; correctness checkers compare against these.
pub fn dump_output_data() -> Command {
    let action = move |ctx: &ExecutionContext| -> Result<Execution> {
        let samples = ctx.samples();
        if samples.is_empty() {
            return Ok(Execution::Skipped("no input samples fetched".to_string()));
        }

        let model_path = std::path::absolute(&ctx.config.model_path)?;
        let dir = ctx.workdir().join(MODEL_OUTPUT_DIR);
        for (i, sample) in samples.iter().enumerate() {
            let outputs = ctx
                .adapter
                .infer_outputs(&model_path, sample)
                .with_context(|| format!("source model inference failed on sample {i}"))?;
            dump_sample(&dir, i, &outputs)?;
        }
        info!(count = samples.len(), dir = %dir.display(), "dumped output samples");
        Ok(Execution::Completed(Some(PathBuf::from(MODEL_OUTPUT_DIR))))
    };

    Command::new("Dump output data", CommandKind::Dump, action)
}
