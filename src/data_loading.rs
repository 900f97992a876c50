use crate::labels::LabelEncoder;
use crate::model::{DenseNetwork, ModelArtifact};
use crate::PipelineError;
use anyhow::{Context, Result};
use log::{debug, info};
use ndarray::{Array1, Array2, ArrayD};
use ndarray_npy::{ReadNpyExt, ReadableElement};
use serde::de::DeserializeOwned;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

fn extension(path: &Path) -> String {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Reads a JSON or CBOR artifact, picked by file extension.
fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let reader = BufReader::new(file);
    let value = match extension(path).as_str() {
        "cbor" => ciborium::from_reader(reader)
            .with_context(|| format!("decoding CBOR from {}", path.display()))?,
        _ => serde_json::from_reader(reader)
            .with_context(|| format!("decoding JSON from {}", path.display()))?,
    };
    Ok(value)
}

pub fn load_model(path: &Path) -> Result<DenseNetwork, PipelineError> {
    let artifact: ModelArtifact = read_artifact(path)
        .map_err(|e| PipelineError::model_load(path.display(), format!("{:#}", e)))?;
    let model = DenseNetwork::from_artifact(artifact).map_err(|e| match e {
        PipelineError::ModelLoad { message, .. } => PipelineError::model_load(path.display(), message),
        other => other,
    })?;
    info!("Loaded model from {}", path.display());
    Ok(model)
}

pub fn load_label_encoder(path: &Path) -> Result<LabelEncoder, PipelineError> {
    let encoder: LabelEncoder = read_artifact(path)
        .map_err(|e| PipelineError::model_load(path.display(), format!("{:#}", e)))?;
    info!(
        "Loaded {} classes from {}: {:?}",
        encoder.len(),
        path.display(),
        encoder.classes()
    );
    Ok(encoder)
}

/// Loads one beat from a `.npy` or `.csv` file as an f64 array of whatever
/// rank the file holds; rank is checked later by the validator.
pub fn load_waveform(path: &Path) -> Result<ArrayD<f64>, PipelineError> {
    let bytes = std::fs::read(path).map_err(|e| PipelineError::Input {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;

    match extension(path).as_str() {
        "npy" => read_npy(&bytes),
        "csv" => read_csv(&bytes),
        other => Err(PipelineError::Shape(format!(
            "unsupported waveform format {:?}",
            other
        ))),
    }
}

fn try_npy<T: ReadableElement + Copy>(bytes: &[u8], widen: fn(T) -> f64) -> Option<ArrayD<f64>> {
    ArrayD::<T>::read_npy(bytes).ok().map(|arr| arr.mapv(widen))
}

fn read_npy(bytes: &[u8]) -> Result<ArrayD<f64>, PipelineError> {
    let f64_err = match ArrayD::<f64>::read_npy(bytes) {
        Ok(arr) => return Ok(arr),
        Err(e) => e,
    };
    try_npy::<f32>(bytes, f64::from)
        .or_else(|| try_npy::<i64>(bytes, |x| x as f64))
        .or_else(|| try_npy::<i32>(bytes, f64::from))
        .or_else(|| try_npy::<i16>(bytes, f64::from))
        .or_else(|| try_npy::<i8>(bytes, f64::from))
        .or_else(|| try_npy::<u64>(bytes, |x| x as f64))
        .or_else(|| try_npy::<u32>(bytes, f64::from))
        .or_else(|| try_npy::<u16>(bytes, f64::from))
        .or_else(|| try_npy::<u8>(bytes, f64::from))
        .ok_or_else(|| PipelineError::Shape(format!("not a numeric NPY array: {}", f64_err)))
}

fn read_csv(bytes: &[u8]) -> Result<ArrayD<f64>, PipelineError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(bytes);

    let mut rows: Vec<Vec<f64>> = Vec::new();
    for (line, result) in rdr.records().enumerate() {
        let record = result.map_err(|e| PipelineError::Shape(e.to_string()))?;
        let mut cells: Vec<&str> = record.iter().collect();
        if cells.iter().all(|c| c.is_empty()) {
            continue;
        }
        // a trailing delimiter is tolerated, a gap inside the row is not
        if cells.last() == Some(&"") {
            cells.pop();
        }
        if let Some(col) = cells.iter().position(|c| c.is_empty()) {
            return Err(PipelineError::Shape(format!(
                "line {}: empty cell at column {}",
                line + 1,
                col + 1
            )));
        }
        let row = cells
            .iter()
            .map(|s| s.parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()
            .map_err(|e| PipelineError::Shape(format!("line {}: {}", line + 1, e)))?;
        rows.push(row);
    }

    let width = rows.first().map_or(0, Vec::len);
    if rows.len() <= 1 || width == 1 {
        if rows.iter().any(|r| r.len() != width) {
            return Err(PipelineError::Shape("ragged CSV rows".into()));
        }
        let flat: Array1<f64> = rows.into_iter().flatten().collect();
        return Ok(flat.into_dyn());
    }

    if rows.iter().any(|r| r.len() != width) {
        return Err(PipelineError::Shape("ragged CSV rows".into()));
    }
    let height = rows.len();
    let grid = Array2::from_shape_vec((height, width), rows.into_iter().flatten().collect())
        .map_err(|e| PipelineError::Shape(e.to_string()))?;
    Ok(grid.into_dyn())
}

/// Expands directories into the beat files they contain, sorted by path.
pub fn collect_inputs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            for entry in WalkDir::new(path) {
                let entry = entry.with_context(|| format!("walking {}", path.display()))?;
                let ext = extension(entry.path());
                if entry.file_type().is_file() && (ext == "npy" || ext == "csv") {
                    files.push(entry.into_path());
                }
            }
        } else {
            files.push(path.clone());
        }
    }
    files.sort();
    debug!("Collected {} input files", files.len());
    Ok(files)
}
