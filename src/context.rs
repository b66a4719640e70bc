use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::{debug, info};

use crate::adapter::ModelAdapter;
use crate::config::Config;
use crate::sample::{Sample, TensorMetadata};

/// State the preprocessing commands establish and later commands read.
/// The executor is strictly sequential, so interior mutability is enough.
#[derive(Default)]
struct RunState {
    input_metadata: Option<TensorMetadata>,
    output_metadata: Option<TensorMetadata>,
    samples: Vec<Sample>,
}

/// Everything a command's action gets to see: the run configuration, the
/// framework adapter, shared run state, and subprocess plumbing.
pub struct ExecutionContext<'a> {
    pub config: &'a Config,
    pub adapter: &'a dyn ModelAdapter,
    state: RefCell<RunState>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(config: &'a Config, adapter: &'a dyn ModelAdapter) -> Self {
        Self {
            config,
            adapter,
            state: RefCell::new(RunState::default()),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.config.workdir
    }

    /// Absolute location of a workdir-relative artifact path.
    pub fn absolute(&self, relative: &Path) -> PathBuf {
        self.config.workdir.join(relative)
    }

    pub fn set_input_metadata(&self, metadata: TensorMetadata) {
        self.state.borrow_mut().input_metadata = Some(metadata);
    }

    pub fn input_metadata(&self) -> Option<TensorMetadata> {
        self.state.borrow().input_metadata.clone()
    }

    pub fn set_output_metadata(&self, metadata: TensorMetadata) {
        self.state.borrow_mut().output_metadata = Some(metadata);
    }

    pub fn output_metadata(&self) -> Option<TensorMetadata> {
        self.state.borrow().output_metadata.clone()
    }

    pub fn set_samples(&self, samples: Vec<Sample>) {
        self.state.borrow_mut().samples = samples;
    }

    pub fn samples(&self) -> Vec<Sample> {
        self.state.borrow().samples.clone()
    }

    /// Run an external tool synchronously, after writing a reproduction
    /// script capturing the exact invocation next to the artifact it
    /// produces. Nonzero exit surfaces the tool's output in the error.
    pub fn execute_cmd(&self, argv: &[String], reproduce_path: &Path) -> Result<()> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| anyhow!("empty command line"))?;

        let reproduce_abs = self.absolute(reproduce_path);
        if let Some(parent) = reproduce_abs.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        fs::write(&reproduce_abs, reproduction_script(argv))
            .with_context(|| format!("failed to write {}", reproduce_abs.display()))?;
        debug!(script = %reproduce_abs.display(), "wrote reproduction script");

        info!(cmd = %argv.join(" "), "executing");
        let output = Command::new(program)
            .args(args)
            .current_dir(self.workdir())
            .output()
            .with_context(|| format!("failed to spawn {program}; ensure it is on PATH"))?;

        if !output.status.success() {
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            let combined = format!("{}\n{}", stdout.trim(), stderr.trim());
            return Err(anyhow!(
                "{program} exited with {}; reproduce with {}\n\nTool output:\n{}",
                output.status,
                reproduce_abs.display(),
                combined.trim()
            ));
        }

        if self.config.verbose {
            let stdout = String::from_utf8_lossy(&output.stdout);
            if !stdout.trim().is_empty() {
                info!("{}", stdout.trim());
            }
        }
        Ok(())
    }
}

fn reproduction_script(argv: &[String]) -> String {
    format!("#!/usr/bin/env bash\nset -e\n{}\n", argv.join(" "))
}

/// Encode keyword parameters as command-line flags for an external tool.
/// Scalars stay bare; structured values (lists, mappings) are rendered as
/// JSON and quote-wrapped so the receiving script can parse them back.
/// `None`-valued keys are dropped.
pub fn kwargs_to_args(kwargs: &[(&str, Value)]) -> Vec<String> {
    let mut args = Vec::new();
    for (key, value) in kwargs {
        let rendered = match value {
            Value::Null => continue,
            Value::String(s) => s.clone(),
            Value::Bool(_) | Value::Number(_) => value.to_string(),
            Value::Array(_) | Value::Object(_) => format!("'{}'", value),
        };
        args.push(format!("--{key}"));
        args.push(rendered);
    }
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn scalars_stay_bare_and_structured_values_get_quoted() {
        let args = kwargs_to_args(&[
            ("model-path", json!("onnx/model.onnx")),
            ("opset", json!(14)),
            ("enabled", json!(true)),
            ("shape", json!([1, 3, 224, 224])),
            ("skipped", Value::Null),
        ]);
        let expected = [
            "--model-path",
            "onnx/model.onnx",
            "--opset",
            "14",
            "--enabled",
            "true",
            "--shape",
            "'[1,3,224,224]'",
        ];
        assert_eq!(args, expected.map(String::from));
    }

    #[test]
    fn mappings_are_json_encoded() {
        let args = kwargs_to_args(&[("axes", json!({"input__0": [0]}))]);
        assert_eq!(args[1], r#"'{"input__0":[0]}'"#);
    }
}
