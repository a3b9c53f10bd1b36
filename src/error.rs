// src/error.rs

use std::path::PathBuf;

use thiserror::Error;

use crate::backend::CaptureSlot;
use crate::material::MaterialPath;

#[derive(Error, Debug)]
pub enum FrameError {
    #[error("frame is empty")]
    Empty,

    #[error("pixel buffer has {actual} bytes, expected {expected}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("frame of {width}x{height} pixels does not fit in memory")]
    TooLarge { width: u32, height: u32 },

    #[error("not a raw frame dump (bad magic)")]
    BadMagic,

    #[error("unknown pixel format code {0}")]
    UnknownFormat(u8),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("base64 error: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("no capture source configured")]
    NoSource,

    #[error("capture folder not found: {0}")]
    SourceMissing(PathBuf),

    #[error("no frames found in {0}")]
    NoFrames(PathBuf),

    #[error("camera is not connected")]
    NotConnected,

    #[error("failed to read frame {path}: {source}")]
    Frame {
        path: PathBuf,
        #[source]
        source: FrameError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum MaterialError {
    #[error("catalog not found at {0}")]
    CatalogNotFound(PathBuf),

    #[error("material not found in catalog: {0}")]
    UnknownMaterial(String),

    #[error("invalid material path '{0}', expected shelf/book/page")]
    InvalidPath(String),

    #[error("material data file not found for {0}")]
    DataNotFound(String),

    #[error("no extinction coefficient data for {0}")]
    NoExtinctionData(String),

    #[error("wavelength {wavelength} µm outside tabulated range {min}-{max} µm")]
    OutOfRange { wavelength: f64, min: f64, max: f64 },

    #[error("malformed data row '{0}'")]
    MalformedRow(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum CalcError {
    #[error("Material Error: could not get k for '{path}': {source}")]
    Material {
        path: MaterialPath,
        #[source]
        source: MaterialError,
    },

    #[error("Math Error: wavelength must be greater than 0 (got {0})")]
    InvalidWavelength(f64),

    #[error("Calculation Error: Division by zero (intensities and alpha must be non-zero)")]
    DivisionByZero,

    #[error("Image Error: {0}")]
    Frame(#[from] FrameError),
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error(transparent)]
    Database(#[from] DbError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("image data for measurement {id} is not valid base64: {source}")]
    Image {
        id: i64,
        #[source]
        source: base64::DecodeError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("'measurements.csv' not found in the archive")]
    MissingCsv,

    #[error("CSV file is empty or has no header")]
    NoHeader,

    #[error("CSV file is missing required columns: {0:?}")]
    MissingColumns(Vec<String>),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum TransferError {
    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("transfer thread stopped without a result")]
    Aborted,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to parse settings {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum MeasureError {
    #[error("no {0} image captured yet")]
    MissingFrame(CaptureSlot),

    #[error(transparent)]
    Calculation(#[from] CalcError),

    #[error("failed to encode image: {0}")]
    Encode(#[from] FrameError),

    #[error("failed to save measurement: {0}")]
    Save(#[from] DbError),
}

/// Top-level error for `main` and the headless commands.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Material(#[from] MaterialError),

    #[error("failed to read image: {0}")]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Measure(#[from] MeasureError),

    #[error(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Import(#[from] ImportError),

    #[error("GUI error: {0}")]
    Gui(#[from] eframe::Error),
}
