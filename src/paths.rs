use std::path::PathBuf;

use crate::error::PorterError;
use crate::format::{Format, Variant};

/// Directory under the workdir where normalized input samples are dumped.
pub const MODEL_INPUT_DIR: &str = "model_input";
/// Directory under the workdir where inferred output samples are dumped.
pub const MODEL_OUTPUT_DIR: &str = "model_output";

/// Resolve the canonical workdir-relative path of an artifact.
///
/// Pure: identical arguments always yield the identical path. The directory
/// name encodes every non-default variant flag (see `Variant::suffix`), the
/// file name is fixed per format family. Every command uses this both to
/// locate its inputs and to decide whether its own output already exists.
///
/// Combinations the pipeline cannot produce (a TensorRT plan without a
/// precision, TorchScript without a capture mode) are configuration errors,
/// never silently defaulted.
pub fn artifact_relative_path(format: Format, variant: &Variant) -> Result<PathBuf, PorterError> {
    let dir = PathBuf::from(format!("{}{}", format, variant.suffix()));

    let file = match format {
        Format::Onnx => "model.onnx",
        Format::TorchScript if variant.jit.is_some() => "model.pt",
        Format::TorchTrt if variant.jit.is_some() && variant.precision.is_some() => "model.pt",
        Format::TfSavedmodel => "model.savedmodel",
        Format::TfTrt if variant.precision.is_some() => "model.savedmodel",
        Format::Trt if variant.precision.is_some() => "model.plan",
        _ => {
            return Err(PorterError::config(format!(
                "no artifact path for format {format} with jit: {:?}, precision: {:?}; \
                 provide the missing variant parameters",
                variant.jit, variant.precision
            )));
        }
    };

    Ok(dir.join(file))
}
