// src/cli.rs

use crate::backend::CaptureSlot;
use crate::config::AppSettings;
use crate::database::{Database, MeasurementFilter};
use crate::error::AppError;
use crate::export::{export_to_csv, export_to_zip};
use crate::frame::Frame;
use crate::import::import_from_zip;
use crate::material::{MaterialLibrary, MaterialPath};
use crate::session::{MeasurementRequest, MeasurementSession};

use clap::Subcommand;
use std::path::PathBuf;
use tracing::info;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Calculate a layer thickness from a reference and a material image
    Calc {
        /// Image taken without the sample
        #[arg(long)]
        reference: PathBuf,

        /// Image taken through the sample
        #[arg(long)]
        material: PathBuf,

        /// Material as shelf/book/page
        #[arg(long)]
        path: MaterialPath,

        /// Wavelength in µm (defaults to the configured one)
        #[arg(long)]
        wavelength: Option<f64>,

        #[arg(long)]
        name: Option<String>,

        /// Store the result in the database
        #[arg(long)]
        save: bool,
    },

    /// Export measurements (ZIP with images by default)
    Export {
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Write a single CSV with inline base64 images instead
        #[arg(long)]
        csv: bool,
    },

    /// Import measurements from an exported ZIP archive
    Import { archive: PathBuf },
}

pub fn run(command: Command, settings: &AppSettings) -> Result<(), AppError> {
    match command {
        Command::Calc {
            reference,
            material,
            path,
            wavelength,
            name,
            save,
        } => {
            let mut session = MeasurementSession::new();
            session.set_frame(CaptureSlot::Reference, Frame::open(&reference)?);
            session.set_frame(CaptureSlot::Material, Frame::open(&material)?);

            let library = MaterialLibrary::open(&settings.materials_dir)?;
            let db = if save { Some(Database::open(&settings.database)?) } else { None };

            let request = MeasurementRequest {
                name: name.unwrap_or_default(),
                material: path,
                wavelength_um: wavelength.unwrap_or(settings.default_wavelength_um),
                save,
            };
            let outcome = session.run(&request, &library, db.as_ref())?;

            println!("Layer thickness: {:.2} nm", outcome.result.thickness_nm);
            println!("  k = {}, alpha = {:.1} cm^-1", outcome.result.k, outcome.result.alpha_per_cm);
            if let Some(id) = outcome.saved_id {
                println!("  saved as measurement {id}");
            }
        }
        Command::Export { dir, csv } => {
            let db = Database::open(&settings.database)?;
            let dir = dir.unwrap_or_else(|| settings.export_dir.clone());
            let written = if csv {
                export_to_csv(&db, &dir)?
            } else {
                export_to_zip(&db, &dir, &MeasurementFilter::default())?
            };
            match written {
                Some(path) => println!("Exported to {}", path.display()),
                None => println!("No measurements to export"),
            }
        }
        Command::Import { archive } => {
            let db = Database::open(&settings.database)?;
            let summary = import_from_zip(&db, &archive)?;
            info!("Imported {} rows from {}", summary.succeeded, archive.display());
            println!("Imported {} rows, {} failed", summary.succeeded, summary.failed);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::SortOrder;
    use crate::material::tests::write_library;
    use approx::assert_abs_diff_eq;
    use std::fs;
    use std::path::Path;

    fn settings_in(dir: &Path) -> AppSettings {
        let materials = dir.join("materials");
        fs::create_dir_all(&materials).unwrap();
        write_library(&materials);
        AppSettings {
            database: dir.join("measurements.db"),
            materials_dir: materials,
            export_dir: dir.join("exports"),
            ..Default::default()
        }
    }

    fn write_png(path: &Path, gray: u8) {
        let png = Frame::solid_bgr(6, 4, [gray, gray, gray]).encode_png().unwrap();
        fs::write(path, png).unwrap();
    }

    fn calc(dir: &Path, path: MaterialPath, save: bool) -> Command {
        write_png(&dir.join("ref.png"), 200);
        write_png(&dir.join("mat.png"), 100);
        Command::Calc {
            reference: dir.join("ref.png"),
            material: dir.join("mat.png"),
            path,
            wavelength: Some(0.5),
            name: Some("wafer 7".to_string()),
            save,
        }
    }

    fn copper() -> MaterialPath {
        MaterialPath::new("main", "Cu", "Johnson")
    }

    #[test]
    fn calc_with_save_stores_the_measurement() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        run(calc(dir.path(), copper(), true), &settings).unwrap();

        let db = Database::open(&settings.database).unwrap();
        let rows = db
            .get_measurements(&MeasurementFilter::default(), SortOrder::NewestFirst, None)
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].name.as_deref(), Some("wafer 7"));
        assert_eq!(rows[0].wavelength_um, Some(0.5));
        assert_eq!((rows[0].shelf.as_str(), rows[0].book.as_str()), ("main", "Cu"));
        assert_abs_diff_eq!(rows[0].layer_nm, 30.065, epsilon = 0.01);
    }

    #[test]
    fn calc_without_save_leaves_no_database() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        run(calc(dir.path(), copper(), false), &settings).unwrap();
        assert!(!settings.database.exists());
    }

    #[test]
    fn calc_with_unknown_material_fails() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let command = calc(dir.path(), MaterialPath::new("main", "Au", "Johnson"), false);
        let err = run(command, &settings).unwrap_err();
        assert!(err.to_string().starts_with("Material Error"));
    }

    #[test]
    fn export_then_import_duplicates_rows() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        run(calc(dir.path(), copper(), true), &settings).unwrap();

        run(Command::Export { dir: None, csv: false }, &settings).unwrap();
        let archives: Vec<_> = fs::read_dir(&settings.export_dir)
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert_eq!(archives.len(), 1);
        assert_eq!(archives[0].extension().unwrap(), "zip");

        run(
            Command::Import {
                archive: archives[0].clone(),
            },
            &settings,
        )
        .unwrap();
        let db = Database::open(&settings.database).unwrap();
        assert_eq!(db.count_measurements(&MeasurementFilter::default()).unwrap(), 2);
    }

    #[test]
    fn export_of_empty_database_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings_in(dir.path());
        let out = dir.path().join("csv-out");
        run(
            Command::Export {
                dir: Some(out.clone()),
                csv: true,
            },
            &settings,
        )
        .unwrap();
        assert_eq!(fs::read_dir(&out).unwrap().count(), 0);
    }
}
