// src/export.rs

use crate::database::{Database, Measurement, MeasurementFilter, SortOrder};
use crate::error::ExportError;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

pub const ARCHIVE_CSV: &str = "measurements.csv";
pub const ARCHIVE_IMG_DIR: &str = "img";

/// CSV row with the database column names as headers.
#[derive(Debug, Serialize)]
struct CsvRow<'a> {
    id: i64,
    #[serde(rename = "Date")]
    date: &'a str,
    #[serde(rename = "Name")]
    name: &'a str,
    #[serde(rename = "Layer")]
    layer: f64,
    #[serde(rename = "Wavelength")]
    wavelength: Option<f64>,
    #[serde(rename = "RefImage")]
    ref_image: &'a str,
    #[serde(rename = "MatImage")]
    mat_image: &'a str,
    #[serde(rename = "Shelf")]
    shelf: &'a str,
    #[serde(rename = "Book")]
    book: &'a str,
    #[serde(rename = "Page")]
    page: &'a str,
}

impl<'a> CsvRow<'a> {
    fn new(m: &'a Measurement, ref_image: &'a str, mat_image: &'a str) -> Self {
        Self {
            id: m.id,
            date: &m.date,
            name: m.name.as_deref().unwrap_or(""),
            layer: m.layer_nm,
            wavelength: m.wavelength_um,
            ref_image,
            mat_image,
            shelf: &m.shelf,
            book: &m.book,
            page: &m.page,
        }
    }
}

fn export_path(dir: &Path, extension: &str) -> PathBuf {
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    dir.join(format!("measurements_export_{timestamp}.{extension}"))
}

/// Moves a finished temp file to its final name. Until then a failed
/// export leaves nothing behind in `dir`.
fn persist(tmp: NamedTempFile, path: &Path) -> Result<(), ExportError> {
    tmp.persist(path).map_err(|e| ExportError::Io(e.error))?;
    Ok(())
}

/// Writes every measurement, images inline as base64, to a timestamped CSV in `dir`.
/// Returns `None` when the database is empty.
pub fn export_to_csv(db: &Database, dir: &Path) -> Result<Option<PathBuf>, ExportError> {
    let rows = db.get_measurements(&MeasurementFilter::default(), SortOrder::NewestFirst, None)?;
    fs::create_dir_all(dir)?;
    if rows.is_empty() {
        warn!("No measurements to export");
        return Ok(None);
    }

    let mut writer = csv::Writer::from_writer(NamedTempFile::new_in(dir)?);
    for m in &rows {
        writer.serialize(CsvRow::new(m, &m.ref_image, &m.mat_image))?;
    }
    let tmp = writer.into_inner().map_err(|e| ExportError::Io(e.into_error()))?;
    let path = export_path(dir, "csv");
    persist(tmp, &path)?;

    info!("Exported {} rows to {}", rows.len(), path.display());
    Ok(Some(path))
}

/// Writes the filtered measurements to a timestamped ZIP in `dir`: a
/// `measurements.csv` whose image columns hold relative paths, plus the
/// decoded images under `img/`. Returns `None` when nothing matches.
pub fn export_to_zip(
    db: &Database,
    dir: &Path,
    filter: &MeasurementFilter,
) -> Result<Option<PathBuf>, ExportError> {
    let rows = db.get_measurements(filter, SortOrder::NewestFirst, None)?;
    fs::create_dir_all(dir)?;
    if rows.is_empty() {
        warn!("No measurements match the export filter");
        return Ok(None);
    }

    let mut zip = ZipWriter::new(NamedTempFile::new_in(dir)?);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut csv_writer = csv::Writer::from_writer(Vec::new());
    for m in &rows {
        let ref_name = format!("{ARCHIVE_IMG_DIR}/{}_ref.png", m.id);
        let mat_name = format!("{ARCHIVE_IMG_DIR}/{}_mat.png", m.id);

        for (name, encoded) in [(&ref_name, &m.ref_image), (&mat_name, &m.mat_image)] {
            let bytes = STANDARD
                .decode(encoded.trim())
                .map_err(|source| ExportError::Image { id: m.id, source })?;
            zip.start_file(name.as_str(), options)?;
            zip.write_all(&bytes)?;
        }

        csv_writer.serialize(CsvRow::new(m, &ref_name, &mat_name))?;
    }

    let csv_bytes = csv_writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))?;
    zip.start_file(ARCHIVE_CSV, options)?;
    zip.write_all(&csv_bytes)?;
    let tmp = zip.finish()?;
    let path = export_path(dir, "zip");
    persist(tmp, &path)?;

    info!("Exported {} rows to {}", rows.len(), path.display());
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::tests::sample;
    use crate::database::NewMeasurement;
    use std::fs::File;
    use std::io::Read;

    fn db_with_rows() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.save_measurement(&NewMeasurement {
            ref_image: STANDARD.encode(b"ref-bytes"),
            mat_image: STANDARD.encode(b"mat-bytes"),
            ..sample(Some("first"), 12.5, "2024-05-01 10:00:00")
        })
        .unwrap();
        db.save_measurement(&NewMeasurement {
            ref_image: STANDARD.encode(b"r2"),
            mat_image: STANDARD.encode(b"m2"),
            book: "Ag".to_string(),
            ..sample(None, 30.0, "2024-05-02 10:00:00")
        })
        .unwrap();
        db
    }

    #[test]
    fn empty_database_exports_nothing() {
        let db = Database::open_in_memory().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("exports");
        assert!(export_to_csv(&db, &out).unwrap().is_none());
        assert!(out.is_dir());
        assert!(export_to_zip(&db, &out, &MeasurementFilter::default())
            .unwrap()
            .is_none());
    }

    #[test]
    fn csv_has_all_columns_and_rows() {
        let db = db_with_rows();
        let dir = tempfile::tempdir().unwrap();
        let path = export_to_csv(&db, dir.path()).unwrap().unwrap();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("measurements_export_") && name.ends_with(".csv"));

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(
            headers,
            ["id", "Date", "Name", "Layer", "Wavelength", "RefImage", "MatImage", "Shelf", "Book", "Page"]
        );
        let records: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(records.len(), 2);
        // newest first
        assert_eq!(&records[0][3], "30.0");
        assert_eq!(&records[1][2], "first");
    }

    #[test]
    fn zip_contains_csv_and_images() {
        let db = db_with_rows();
        let dir = tempfile::tempdir().unwrap();
        let filter = MeasurementFilter {
            book: Some("Cu".to_string()),
            ..Default::default()
        };
        let path = export_to_zip(&db, dir.path(), &filter).unwrap().unwrap();

        let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        assert_eq!(archive.len(), 3);

        let mut img = Vec::new();
        archive.by_name("img/1_ref.png").unwrap().read_to_end(&mut img).unwrap();
        assert_eq!(img, b"ref-bytes");

        let mut csv_text = String::new();
        archive
            .by_name(ARCHIVE_CSV)
            .unwrap()
            .read_to_string(&mut csv_text)
            .unwrap();
        let mut reader = csv::Reader::from_reader(csv_text.as_bytes());
        let records: Vec<csv::StringRecord> = reader.records().map(Result::unwrap).collect();
        assert_eq!(records.len(), 1);
        assert_eq!(&records[0][5], "img/1_ref.png");
        assert_eq!(&records[0][6], "img/1_mat.png");
    }

    #[test]
    fn corrupt_image_data_aborts_zip_export() {
        let db = Database::open_in_memory().unwrap();
        db.save_measurement(&NewMeasurement {
            ref_image: "not base64!".to_string(),
            ..sample(None, 1.0, "2024-05-01 10:00:00")
        })
        .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let err = export_to_zip(&db, dir.path(), &MeasurementFilter::default()).unwrap_err();
        assert!(matches!(err, ExportError::Image { id: 1, .. }));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn successful_export_leaves_only_the_archive() {
        let db = db_with_rows();
        let dir = tempfile::tempdir().unwrap();
        let path = export_to_zip(&db, dir.path(), &MeasurementFilter::default())
            .unwrap()
            .unwrap();
        let names: Vec<PathBuf> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(names, vec![path]);
    }
}
