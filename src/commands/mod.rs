//! Concrete command bodies. Each constructor returns a fully described
//! `Command`; the builder wires dependencies. Bodies are deliberately thin:
//! resolve paths, short-circuit on an existing output, skip on a missing
//! input, then hand the real work to an external tool through the context.

pub mod config_gen;
pub mod convert;
pub mod correctness;
pub mod data;
pub mod export;
pub mod performance;

use std::path::Path;

use serde_json::{Value, json};
use tracing::info;

use crate::context::ExecutionContext;
use crate::format::Variant;

/// Paths rendered lossily for external tool argv; artifacts never hold
/// non-UTF8 names by construction, source paths come from the CLI.
pub(crate) fn path_json(path: &Path) -> Value {
    json!(path.to_string_lossy())
}

/// Existence-only cache check: if the canonical output is already on disk
/// the command logs and short-circuits. Content and staleness are not
/// examined; delete the artifact (or run with a fresh workdir) to redo
/// work.
pub(crate) fn cache_hit(ctx: &ExecutionContext, relative: &Path, name: &str) -> bool {
    if ctx.absolute(relative).exists() {
        info!(
            command = name,
            artifact = %relative.display(),
            "artifact already exists, skipping"
        );
        true
    } else {
        false
    }
}

/// "Convert ONNX to TensorRT" + fp16 variant -> "Convert ONNX to TensorRT (fp16)".
pub(crate) fn labeled(base: &str, variant: &Variant) -> String {
    let suffix = variant.suffix();
    if suffix.is_empty() {
        base.to_string()
    } else {
        format!(
            "{base} ({})",
            suffix.trim_start_matches('-').replace('-', ", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{JitType, Precision};

    #[test]
    fn labels_read_naturally() {
        assert_eq!(labeled("Export ONNX", &Variant::default()), "Export ONNX");
        let variant = Variant {
            jit: Some(JitType::Script),
            precision: Some(Precision::Fp16),
            ..Variant::default()
        };
        assert_eq!(
            labeled("Convert TorchScript to Torch-TRT", &variant),
            "Convert TorchScript to Torch-TRT (script, fp16)"
        );
    }
}
