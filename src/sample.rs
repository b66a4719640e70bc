use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adapter::ModelAdapter;
use crate::error::PorterError;

/// A single tensor as it crosses the pipeline boundary: flattened data plus
/// dtype and shape. Conversion tools and checkers reconstruct the real
/// framework tensor on their side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorValue {
    pub dtype: String,
    pub shape: Vec<i64>,
    pub data: Vec<f64>,
}

/// Dtype and shape of one named model input or output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorSpec {
    pub dtype: String,
    pub shape: Vec<i64>,
}

/// Ordered name -> spec mapping for a model's inputs or outputs.
pub type TensorMetadata = IndexMap<String, TensorSpec>;

/// Canonical name-keyed sample, the only shape the core stores.
pub type Sample = IndexMap<String, TensorValue>;

/// The three shapes a dataloader may supply a sample in: a bare tensor, an
/// ordered sequence, or a name-to-tensor mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SampleData {
    Tensor(TensorValue),
    Sequence(Vec<TensorValue>),
    Mapping(IndexMap<String, TensorValue>),
}

impl SampleData {
    fn tensors(&self) -> Vec<&TensorValue> {
        match self {
            SampleData::Tensor(t) => vec![t],
            SampleData::Sequence(ts) => ts.iter().collect(),
            SampleData::Mapping(m) => m.values().collect(),
        }
    }
}

/// Supplies input samples to the preprocessing commands.
pub trait Dataloader {
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn samples(&self) -> Box<dyn Iterator<Item = SampleData> + '_>;
}

/// Dataloader backed by a JSON file holding an array of samples.
pub struct JsonDataloader {
    samples: Vec<SampleData>,
}

impl JsonDataloader {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read samples from {}", path.display()))?;
        let samples: Vec<SampleData> = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse samples in {}", path.display()))?;
        Ok(Self { samples })
    }

    pub fn from_samples(samples: Vec<SampleData>) -> Self {
        Self { samples }
    }
}

impl Dataloader for JsonDataloader {
    fn len(&self) -> usize {
        self.samples.len()
    }

    fn samples(&self) -> Box<dyn Iterator<Item = SampleData> + '_> {
        Box::new(self.samples.iter().cloned())
    }
}

/// Reject samples whose leaves the active framework does not recognize.
/// This is a usage mistake, raised to the caller rather than recorded as a
/// command failure.
pub fn validate_sample(data: &SampleData, adapter: &dyn ModelAdapter) -> Result<(), PorterError> {
    for tensor in data.tensors() {
        if !adapter.is_supported_tensor(tensor) {
            return Err(PorterError::user_input(format!(
                "invalid sample: dtype {:?} is not a recognized {} tensor type ({})",
                tensor.dtype,
                adapter.framework(),
                adapter.tensor_type_name(),
            )));
        }
    }
    Ok(())
}

/// Normalize any of the three dataloader shapes into the canonical
/// name-keyed mapping, zipping positional tensors onto the metadata's input
/// names. Leaves are validated against the active framework first.
pub fn normalize_sample(
    data: &SampleData,
    metadata: &TensorMetadata,
    adapter: &dyn ModelAdapter,
) -> Result<Sample, PorterError> {
    validate_sample(data, adapter)?;

    match data {
        SampleData::Mapping(m) => Ok(m.clone()),
        SampleData::Sequence(ts) => {
            if ts.len() != metadata.len() {
                return Err(PorterError::user_input(format!(
                    "sample has {} tensors but the model takes {} inputs",
                    ts.len(),
                    metadata.len()
                )));
            }
            Ok(metadata.keys().cloned().zip(ts.iter().cloned()).collect())
        }
        SampleData::Tensor(t) => {
            let name = metadata
                .keys()
                .next()
                .cloned()
                .unwrap_or_else(|| "input__0".to_string());
            Ok(IndexMap::from([(name, t.clone())]))
        }
    }
}

/// Derive input metadata from the first dataloader sample. Positional inputs
/// get generated `input__<i>` names unless explicit names were configured.
pub fn infer_metadata(data: &SampleData, names: Option<&[String]>) -> Result<TensorMetadata, PorterError> {
    let tensors = data.tensors();
    let keys: Vec<String> = match (data, names) {
        (_, Some(names)) => {
            if names.len() != tensors.len() {
                return Err(PorterError::user_input(format!(
                    "{} input names configured but the sample has {} tensors",
                    names.len(),
                    tensors.len()
                )));
            }
            names.to_vec()
        }
        (SampleData::Mapping(m), None) => m.keys().cloned().collect(),
        (_, None) => (0..tensors.len()).map(|i| format!("input__{i}")).collect(),
    };

    Ok(keys
        .into_iter()
        .zip(tensors)
        .map(|(name, t)| {
            (
                name,
                TensorSpec {
                    dtype: t.dtype.clone(),
                    shape: t.shape.clone(),
                },
            )
        })
        .collect())
}

/// Write one normalized sample as `sample_<index>.json` under `dir`.
pub fn dump_sample(dir: &Path, index: usize, sample: &Sample) -> Result<()> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create sample dir {}", dir.display()))?;
    let path = dir.join(format!("sample_{index}.json"));
    let json = serde_json::to_string_pretty(sample).context("failed to serialize sample")?;
    fs::write(&path, json).with_context(|| format!("failed to write {}", path.display()))?;
    debug!(path = %path.display(), "dumped sample");
    Ok(())
}
