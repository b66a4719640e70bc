use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use tracing::debug;

use crate::format::{Format, Framework, base_format, export_formats};
use crate::sample::{Sample, TensorValue};

/// Capability interface for the source framework.
///
/// The core never branches on a framework enum; everything
/// framework-specific (which dtypes count as tensors, how to run the model
/// for output inference) goes through this trait, injected once at pipeline
/// construction.
pub trait ModelAdapter {
    fn framework(&self) -> Framework;

    /// Human-readable tensor type, used in validation error messages.
    fn tensor_type_name(&self) -> &'static str;

    /// Whether the framework recognizes this leaf as a tensor.
    fn is_supported_tensor(&self, tensor: &TensorValue) -> bool;

    /// Run the source model on one normalized sample and return its outputs.
    fn infer_outputs(&self, model_path: &Path, sample: &Sample) -> Result<Sample>;

    fn export_formats(&self) -> &'static [Format] {
        export_formats(self.framework())
    }

    fn base_format(&self, format: Format) -> Option<Format> {
        base_format(self.framework(), format)
    }
}

pub fn adapter_for(framework: Framework) -> Box<dyn ModelAdapter> {
    match framework {
        Framework::Torch => Box::new(TorchAdapter),
        Framework::TensorFlow => Box::new(TensorFlowAdapter),
        Framework::Onnx => Box::new(OnnxAdapter),
    }
}

/// Detect the Python executable name available on this system.
/// Tries `python3` first (Linux/macOS convention), then falls back to `python`.
pub fn detect_python() -> Result<String> {
    for candidate in &["python3", "python"] {
        if let Ok(output) = Command::new(candidate).arg("--version").output()
            && output.status.success()
        {
            return Ok(candidate.to_string());
        }
    }
    Err(anyhow!(
        "Python not found on PATH. Install Python 3.10+ and ensure it is on PATH."
    ))
}

const NUMERIC_DTYPES: &[&str] = &[
    "float64", "float32", "float16", "int64", "int32", "int16", "int8", "uint8", "bool",
];

/// Run an inference one-liner: the script receives the model path and a JSON
/// sample file as argv and prints the output sample as JSON on stdout.
fn run_infer_script(script: &str, model_path: &Path, sample: &Sample) -> Result<Sample> {
    let python = detect_python()?;

    let tmpdir = tempfile::tempdir().context("failed to create temp dir for inference sample")?;
    let sample_path = tmpdir.path().join("sample.json");
    let json = serde_json::to_string(sample).context("failed to serialize sample")?;
    std::fs::write(&sample_path, json).context("failed to write sample for inference")?;

    debug!(model = %model_path.display(), "running output inference");
    let output = Command::new(&python)
        .arg("-c")
        .arg(script)
        .arg(model_path)
        .arg(&sample_path)
        .output()
        .with_context(|| format!("failed to run {python} for output inference"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("output inference failed: {}", stderr.trim()));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    serde_json::from_str(stdout.trim()).context("output inference printed malformed JSON")
}

pub struct TorchAdapter;

impl ModelAdapter for TorchAdapter {
    fn framework(&self) -> Framework {
        Framework::Torch
    }

    fn tensor_type_name(&self) -> &'static str {
        "Union[torch.Tensor, numpy.ndarray]"
    }

    fn is_supported_tensor(&self, tensor: &TensorValue) -> bool {
        NUMERIC_DTYPES.contains(&tensor.dtype.as_str())
    }

    fn infer_outputs(&self, model_path: &Path, sample: &Sample) -> Result<Sample> {
        run_infer_script(&TORCH_INFER, model_path, sample)
    }
}

pub struct TensorFlowAdapter;

impl ModelAdapter for TensorFlowAdapter {
    fn framework(&self) -> Framework {
        Framework::TensorFlow
    }

    fn tensor_type_name(&self) -> &'static str {
        "Union[tensorflow.Tensor, numpy.ndarray]"
    }

    fn is_supported_tensor(&self, tensor: &TensorValue) -> bool {
        NUMERIC_DTYPES.contains(&tensor.dtype.as_str())
    }

    fn infer_outputs(&self, model_path: &Path, sample: &Sample) -> Result<Sample> {
        run_infer_script(&TF_INFER, model_path, sample)
    }
}

pub struct OnnxAdapter;

impl ModelAdapter for OnnxAdapter {
    fn framework(&self) -> Framework {
        Framework::Onnx
    }

    fn tensor_type_name(&self) -> &'static str {
        "numpy.ndarray"
    }

    fn is_supported_tensor(&self, tensor: &TensorValue) -> bool {
        NUMERIC_DTYPES.contains(&tensor.dtype.as_str())
    }

    fn infer_outputs(&self, model_path: &Path, sample: &Sample) -> Result<Sample> {
        run_infer_script(&ONNX_INFER, model_path, sample)
    }
}

fn tensors_to_json(expr: &str) -> String {
    format!(
        "print(json.dumps({{name: {{\"dtype\": str(a.dtype), \"shape\": list(a.shape), \
         \"data\": a.reshape(-1).astype(\"float64\").tolist()}} for name, a in {expr}}}))"
    )
}

const TORCH_INFER_BODY: &str = r#"
import json, sys
import numpy, torch
model = torch.jit.load(sys.argv[1]) if sys.argv[1].endswith(".pt") else torch.load(sys.argv[1], map_location="cpu", weights_only=False)
model.eval()
sample = json.load(open(sys.argv[2]))
args = [torch.from_numpy(numpy.array(v["data"], dtype=v["dtype"]).reshape(v["shape"])) for v in sample.values()]
with torch.no_grad():
    out = model(*args)
out = (out,) if torch.is_tensor(out) else tuple(out)
outputs = [(f"output__{i}", t.detach().cpu().numpy()) for i, t in enumerate(out)]
"#;

const TF_INFER_BODY: &str = r#"
import json, sys
import numpy, tensorflow
model = tensorflow.keras.models.load_model(sys.argv[1])
sample = json.load(open(sys.argv[2]))
args = [numpy.array(v["data"], dtype=v["dtype"]).reshape(v["shape"]) for v in sample.values()]
out = model(*args)
out = (out,) if tensorflow.is_tensor(out) else tuple(out)
outputs = [(f"output__{i}", t.numpy()) for i, t in enumerate(out)]
"#;

const ONNX_INFER_BODY: &str = r#"
import json, sys
import numpy, onnxruntime
session = onnxruntime.InferenceSession(sys.argv[1], providers=["CPUExecutionProvider"])
sample = json.load(open(sys.argv[2]))
feeds = {k: numpy.array(v["data"], dtype=v["dtype"]).reshape(v["shape"]) for k, v in sample.items()}
names = [o.name for o in session.get_outputs()]
outputs = list(zip(names, session.run(names, feeds)))
"#;

// Assembled lazily so the trailing print line stays in one place.
static TORCH_INFER: std::sync::LazyLock<String> =
    std::sync::LazyLock::new(|| format!("{TORCH_INFER_BODY}{}", tensors_to_json("outputs")));
static TF_INFER: std::sync::LazyLock<String> =
    std::sync::LazyLock::new(|| format!("{TF_INFER_BODY}{}", tensors_to_json("outputs")));
static ONNX_INFER: std::sync::LazyLock<String> =
    std::sync::LazyLock::new(|| format!("{ONNX_INFER_BODY}{}", tensors_to_json("outputs")));
