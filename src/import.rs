// src/import.rs

use crate::database::{Database, NewMeasurement};
use crate::error::ImportError;
use crate::export::ARCHIVE_CSV;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;
use tracing::{info, warn};
use zip::result::ZipError;
use zip::ZipArchive;

pub const REQUIRED_COLUMNS: [&str; 9] = [
    "Date",
    "Name",
    "Layer",
    "Wavelength",
    "RefImage",
    "MatImage",
    "Shelf",
    "Book",
    "Page",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub succeeded: usize,
    pub failed: usize,
}

pub fn import_from_zip(db: &Database, path: &Path) -> Result<ImportSummary, ImportError> {
    info!("Starting import from {}", path.display());
    let summary = import_from_archive(db, File::open(path)?)?;
    info!(
        "Import complete: {} rows succeeded, {} rows failed",
        summary.succeeded, summary.failed
    );
    Ok(summary)
}

/// Imports from any seekable ZIP stream. Images referenced by the CSV are read
/// straight out of the archive.
pub fn import_from_archive<R: Read + Seek>(db: &Database, reader: R) -> Result<ImportSummary, ImportError> {
    let mut archive = ZipArchive::new(reader)?;

    let mut csv_bytes = Vec::new();
    match archive.by_name(ARCHIVE_CSV) {
        Ok(mut file) => {
            file.read_to_end(&mut csv_bytes)?;
        }
        Err(ZipError::FileNotFound) => return Err(ImportError::MissingCsv),
        Err(e) => return Err(e.into()),
    }

    let mut reader = csv::Reader::from_reader(csv_bytes.as_slice());
    let headers = reader.headers()?.clone();
    if headers.is_empty() || headers.iter().all(|h| h.trim().is_empty()) {
        return Err(ImportError::NoHeader);
    }

    let index: HashMap<&str, usize> = headers.iter().enumerate().map(|(i, h)| (h, i)).collect();
    let missing: Vec<String> = REQUIRED_COLUMNS
        .iter()
        .filter(|c| !index.contains_key(*c))
        .map(|c| c.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(ImportError::MissingColumns(missing));
    }

    let mut summary = ImportSummary::default();
    // header is line 1
    for (line, record) in (2..).zip(reader.records()) {
        let record = match record {
            Ok(record) => record,
            Err(e) => {
                warn!("Row {line}: unreadable CSV record: {e}");
                summary.failed += 1;
                continue;
            }
        };
        let field = |col: &str| record.get(index[col]).unwrap_or("").trim();

        let layer_nm = match field("Layer").parse::<f64>() {
            Ok(v) => v,
            Err(_) => {
                warn!("Row {line}: invalid or missing Layer '{}'", field("Layer"));
                summary.failed += 1;
                continue;
            }
        };

        let wavelength = field("Wavelength");
        let wavelength_um = if wavelength.is_empty() {
            None
        } else {
            match wavelength.parse::<f64>() {
                Ok(v) => Some(v),
                Err(_) => {
                    warn!("Row {line}: invalid Wavelength '{wavelength}', storing NULL");
                    None
                }
            }
        };

        let (ref_image, mat_image) = match (
            read_image_base64(&mut archive, field("RefImage")),
            read_image_base64(&mut archive, field("MatImage")),
        ) {
            (Some(r), Some(m)) => (r, m),
            _ => {
                warn!("Row {line}: could not read image files");
                summary.failed += 1;
                continue;
            }
        };

        let non_empty = |v: &str| (!v.is_empty()).then(|| v.to_string());
        let measurement = NewMeasurement {
            date: non_empty(field("Date")),
            name: non_empty(field("Name")),
            layer_nm,
            wavelength_um,
            ref_image,
            mat_image,
            shelf: field("Shelf").to_string(),
            book: field("Book").to_string(),
            page: field("Page").to_string(),
        };

        match db.save_measurement(&measurement) {
            Ok(_) => summary.succeeded += 1,
            Err(e) => {
                warn!("Row {line}: database rejected the row: {e}");
                summary.failed += 1;
            }
        }
    }

    Ok(summary)
}

fn read_image_base64<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> Option<String> {
    if name.is_empty() {
        return None;
    }
    let name = name.replace('\\', "/");
    let mut file = match archive.by_name(name.trim_start_matches("./")) {
        Ok(file) => file,
        Err(e) => {
            warn!("Image {name} not in archive: {e}");
            return None;
        }
    };
    let mut bytes = Vec::new();
    if let Err(e) = file.read_to_end(&mut bytes) {
        warn!("Error reading image {name}: {e}");
        return None;
    }
    Some(STANDARD.encode(bytes))
}
