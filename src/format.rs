use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Source framework the model was trained in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Framework {
    Torch,
    #[value(name = "tensorflow")]
    TensorFlow,
    Onnx,
}

impl Framework {
    pub fn as_str(self) -> &'static str {
        match self {
            Framework::Torch => "torch",
            Framework::TensorFlow => "tensorflow",
            Framework::Onnx => "onnx",
        }
    }
}

impl fmt::Display for Framework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target (or intermediate) model format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Format {
    #[value(name = "torchscript")]
    #[serde(rename = "torchscript")]
    TorchScript,
    Onnx,
    TorchTrt,
    TfSavedmodel,
    TfTrt,
    Trt,
}

impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Format::TorchScript => "torchscript",
            Format::Onnx => "onnx",
            Format::TorchTrt => "torch-trt",
            Format::TfSavedmodel => "tf-savedmodel",
            Format::TfTrt => "tf-trt",
            Format::Trt => "trt",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TensorRT-family build precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Precision {
    Fp32,
    Fp16,
    Int8,
}

impl Precision {
    pub fn as_str(self) -> &'static str {
        match self {
            Precision::Fp32 => "fp32",
            Precision::Fp16 => "fp16",
            Precision::Int8 => "int8",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TorchScript capture mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum JitType {
    Script,
    Trace,
}

impl JitType {
    pub fn as_str(self) -> &'static str {
        match self {
            JitType::Script => "script",
            JitType::Trace => "trace",
        }
    }
}

impl fmt::Display for JitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runtime a produced artifact can be validated and benchmarked on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuntimeProvider {
    Trt,
    Cuda,
    Cpu,
    Torch,
    #[serde(rename = "tensorflow")]
    TensorFlow,
}

impl RuntimeProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            RuntimeProvider::Trt => "trt",
            RuntimeProvider::Cuda => "cuda",
            RuntimeProvider::Cpu => "cpu",
            RuntimeProvider::Torch => "torch",
            RuntimeProvider::TensorFlow => "tensorflow",
        }
    }
}

impl fmt::Display for RuntimeProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Variant parameters that distinguish otherwise-identical target formats.
/// Together with the format this is the memoization key for shared
/// intermediates and the input to artifact path resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Variant {
    pub jit: Option<JitType>,
    pub precision: Option<Precision>,
    pub enable_xla: Option<bool>,
    pub jit_compile: Option<bool>,
}

impl Variant {
    /// Non-default flags rendered as path/name suffixes, fixed order:
    /// jit type, xla, jit-compile, precision.
    pub fn suffix(&self) -> String {
        let mut s = String::new();
        if let Some(jit) = self.jit {
            s.push_str(&format!("-{jit}"));
        }
        if self.enable_xla == Some(true) {
            s.push_str("-xla");
        }
        if self.jit_compile == Some(true) {
            s.push_str("-jit");
        }
        if let Some(precision) = self.precision {
            s.push_str(&format!("-{precision}"));
        }
        s
    }
}

/// Formats a framework can export to directly, without conversion.
pub fn export_formats(framework: Framework) -> &'static [Format] {
    match framework {
        Framework::Torch => &[Format::TorchScript, Format::Onnx],
        Framework::TensorFlow => &[Format::TfSavedmodel],
        Framework::Onnx => &[Format::Onnx],
    }
}

/// The intermediate a format is converted from, per source framework.
/// `None` means the format is exported directly, or not reachable at all;
/// `Config::validate` rejects unreachable combinations up front.
pub fn base_format(framework: Framework, format: Format) -> Option<Format> {
    match framework {
        Framework::Torch => match format {
            Format::Trt => Some(Format::Onnx),
            Format::TorchTrt => Some(Format::TorchScript),
            _ => None,
        },
        Framework::TensorFlow => match format {
            Format::Onnx => Some(Format::TfSavedmodel),
            Format::Trt => Some(Format::Onnx),
            Format::TfTrt => Some(Format::TfSavedmodel),
            _ => None,
        },
        Framework::Onnx => match format {
            Format::Trt => Some(Format::Onnx),
            _ => None,
        },
    }
}

/// Runtime providers an artifact of the given format runs on.
pub fn format_runtimes(format: Format) -> &'static [RuntimeProvider] {
    match format {
        Format::Onnx => &[RuntimeProvider::Cuda, RuntimeProvider::Trt, RuntimeProvider::Cpu],
        Format::TorchScript | Format::TorchTrt => &[RuntimeProvider::Torch],
        Format::TfSavedmodel | Format::TfTrt => &[RuntimeProvider::TensorFlow],
        Format::Trt => &[RuntimeProvider::Trt],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_suffix_fixed_order() {
        let variant = Variant {
            jit: Some(JitType::Trace),
            precision: Some(Precision::Fp16),
            enable_xla: Some(true),
            jit_compile: Some(true),
        };
        assert_eq!(variant.suffix(), "-trace-xla-jit-fp16");
        assert_eq!(Variant::default().suffix(), "");
    }

    #[test]
    fn xla_false_adds_no_suffix() {
        let variant = Variant {
            enable_xla: Some(false),
            jit_compile: Some(false),
            ..Variant::default()
        };
        assert_eq!(variant.suffix(), "");
    }

    #[test]
    fn trt_routes_through_onnx_for_every_framework() {
        for framework in [Framework::Torch, Framework::TensorFlow, Framework::Onnx] {
            assert_eq!(base_format(framework, Format::Trt), Some(Format::Onnx));
        }
    }
}
