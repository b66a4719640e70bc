use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use crate::error::PorterError;
use crate::format::{Format, Framework, JitType, Precision, base_format, export_formats};

/// Default workdir created next to the invocation.
pub const DEFAULT_WORKDIR: &str = "porter_workdir";
/// Default model name used in artifact metadata and the report.
pub const DEFAULT_MODEL_NAME: &str = "porter_model";
/// Default ONNX opset for exports and conversions.
pub const DEFAULT_OPSET: u32 = 14;
/// Default number of dataloader samples fetched for validation.
pub const DEFAULT_SAMPLE_COUNT: usize = 100;
/// Default TensorRT builder workspace, 8 GiB.
pub const DEFAULT_MAX_WORKSPACE_SIZE: u64 = 8_589_934_592;
/// Default TF-TRT minimum segment size.
pub const DEFAULT_MINIMUM_SEGMENT_SIZE: u32 = 3;

/// Everything one pipeline run needs, passed explicitly. There are no
/// module-level defaults or hidden process-wide state.
#[derive(Debug, Clone)]
pub struct Config {
    pub framework: Framework,
    pub model_path: PathBuf,
    pub model_name: String,
    pub workdir: PathBuf,
    /// Wipe and recreate the workdir before running.
    pub override_workdir: bool,
    pub target_formats: Vec<Format>,
    pub target_precisions: Vec<Precision>,
    pub target_jit_types: Vec<JitType>,
    /// XLA variants to produce for TensorFlow exports; empty = unflagged only.
    pub enable_xla: Vec<bool>,
    /// jit_compile variants for TensorFlow exports; empty = unflagged only.
    pub jit_compile: Vec<bool>,
    pub opset: u32,
    pub sample_count: usize,
    /// Absolute tolerance for correctness checks; checker default if None.
    pub atol: Option<f64>,
    /// Relative tolerance for correctness checks; checker default if None.
    pub rtol: Option<f64>,
    pub batch_dim: Option<usize>,
    pub max_workspace_size: u64,
    pub minimum_segment_size: u32,
    pub input_names: Option<Vec<String>>,
    pub output_names: Option<Vec<String>>,
    /// Dump normalized input and inferred output samples under the workdir.
    pub save_data: bool,
    /// Attach correctness checks to converted artifacts.
    pub run_correctness: bool,
    /// Attach performance benchmarks to converted artifacts.
    pub run_profiling: bool,
    pub verbose: bool,
}

impl Config {
    /// A config with documented defaults: all formats the framework supports,
    /// fp32+fp16 for TensorRT-family targets, both TorchScript capture modes.
    pub fn new(framework: Framework, model_path: impl Into<PathBuf>) -> Self {
        Self {
            framework,
            model_path: model_path.into(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            workdir: PathBuf::from(DEFAULT_WORKDIR),
            override_workdir: false,
            target_formats: default_target_formats(framework).to_vec(),
            target_precisions: vec![Precision::Fp32, Precision::Fp16],
            target_jit_types: vec![JitType::Script, JitType::Trace],
            enable_xla: Vec::new(),
            jit_compile: Vec::new(),
            opset: DEFAULT_OPSET,
            sample_count: DEFAULT_SAMPLE_COUNT,
            atol: None,
            rtol: None,
            batch_dim: Some(0),
            max_workspace_size: DEFAULT_MAX_WORKSPACE_SIZE,
            minimum_segment_size: DEFAULT_MINIMUM_SEGMENT_SIZE,
            input_names: None,
            output_names: None,
            save_data: true,
            run_correctness: true,
            run_profiling: true,
            verbose: false,
        }
    }

    /// Fail fast on combinations the graph builder could not satisfy,
    /// before any command runs.
    pub fn validate(&self) -> Result<(), PorterError> {
        if self.target_formats.is_empty() {
            return Err(PorterError::config("no target formats requested"));
        }

        for &format in &self.target_formats {
            if !reachable(self.framework, format) {
                return Err(PorterError::config(format!(
                    "format {format} cannot be produced from a {} model",
                    self.framework
                )));
            }
            match format {
                Format::Trt | Format::TorchTrt | Format::TfTrt => {
                    if self.target_precisions.is_empty() {
                        return Err(PorterError::config(format!(
                            "format {format} requires at least one target precision"
                        )));
                    }
                }
                Format::TorchScript => {
                    if self.target_jit_types.is_empty() {
                        return Err(PorterError::config(
                            "format torchscript requires at least one jit type",
                        ));
                    }
                }
                _ => {}
            }
            if format == Format::TorchTrt && self.target_jit_types.is_empty() {
                return Err(PorterError::config(
                    "format torch-trt requires at least one jit type",
                ));
            }
        }

        if self.sample_count == 0 {
            return Err(PorterError::config("sample_count must be at least 1"));
        }

        Ok(())
    }

    /// Create (or, with `override_workdir`, recreate) the working directory.
    pub fn prepare_workdir(&self) -> Result<()> {
        if self.override_workdir && self.workdir.exists() {
            info!(workdir = %self.workdir.display(), "overriding existing workdir");
            fs::remove_dir_all(&self.workdir).with_context(|| {
                format!("failed to remove workdir {}", self.workdir.display())
            })?;
        }
        fs::create_dir_all(&self.workdir)
            .with_context(|| format!("failed to create workdir {}", self.workdir.display()))?;
        Ok(())
    }
}

/// Formats produced by default for each source framework.
pub fn default_target_formats(framework: Framework) -> &'static [Format] {
    match framework {
        Framework::Torch => &[
            Format::TorchScript,
            Format::Onnx,
            Format::TorchTrt,
            Format::Trt,
        ],
        Framework::TensorFlow => &[
            Format::TfSavedmodel,
            Format::TfTrt,
            Format::Onnx,
            Format::Trt,
        ],
        Framework::Onnx => &[Format::Onnx, Format::Trt],
    }
}

/// A format is reachable when the framework exports it directly or a chain
/// of base formats leads back to an export format.
fn reachable(framework: Framework, format: Format) -> bool {
    if export_formats(framework).contains(&format) {
        return true;
    }
    let mut current = format;
    while let Some(base) = base_format(framework, current) {
        if export_formats(framework).contains(&base) {
            return true;
        }
        current = base;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_for_every_framework() {
        for framework in [Framework::Torch, Framework::TensorFlow, Framework::Onnx] {
            let config = Config::new(framework, "model.bin");
            config.validate().unwrap();
        }
    }

    #[test]
    fn rejects_unreachable_format() {
        let mut config = Config::new(Framework::Torch, "model.pt");
        config.target_formats = vec![Format::TfSavedmodel];
        assert!(config.validate().is_err());
    }

    #[test]
    fn trt_without_precision_fails_fast() {
        let mut config = Config::new(Framework::Onnx, "model.onnx");
        config.target_formats = vec![Format::Trt];
        config.target_precisions = Vec::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn torchscript_without_jit_type_fails_fast() {
        let mut config = Config::new(Framework::Torch, "model.pt");
        config.target_formats = vec![Format::TorchScript];
        config.target_jit_types = Vec::new();
        assert!(config.validate().is_err());
    }
}
