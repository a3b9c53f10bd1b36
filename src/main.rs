mod app;
mod backend;
mod calculation;
mod cli;
mod config;
mod database;
mod error;
mod export;
mod frame;
mod history;
mod i18n;
mod import;
mod material;
mod session;
mod transfer;

use app::LayerThicknessApp;
use config::AppSettings;
use error::AppError;

use clap::Parser;
use eframe::egui;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Layer thickness measurement by transmission imaging
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Settings file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database file
    #[arg(long)]
    database: Option<PathBuf>,

    /// Material database directory containing catalog-nk.yml
    #[arg(long)]
    materials: Option<PathBuf>,

    /// Folder of image files served by the simulated camera
    #[arg(long)]
    camera_dir: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<cli::Command>,
}

impl Args {
    fn apply_overrides(&self, settings: &mut AppSettings) {
        if let Some(db) = &self.database {
            settings.database = db.clone();
        }
        if let Some(dir) = &self.materials {
            settings.materials_dir = dir.clone();
        }
        if let Some(dir) = &self.camera_dir {
            settings.camera.source_dir = Some(dir.clone());
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose {
        "layer_thickness_app=debug"
    } else {
        "layer_thickness_app=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn main() -> Result<(), AppError> {
    let args = Args::parse();
    init_logging(args.verbose);

    let settings_path = args.config.clone().unwrap_or_else(AppSettings::default_path);
    let mut settings = match args.command {
        Some(_) => AppSettings::load(&settings_path)?,
        None => AppSettings::load_or_default(&settings_path),
    };
    args.apply_overrides(&mut settings);

    if let Some(command) = args.command {
        return cli::run(command, &settings);
    }

    let mut viewport = egui::ViewportBuilder::default().with_title(i18n::strings(settings.language).app_title);
    viewport = match settings.window_size.dimensions() {
        Some(size) => viewport.with_inner_size(size),
        None => viewport.with_fullscreen(true),
    };
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    info!("Starting GUI, settings at {}", settings_path.display());
    if settings.camera.source_dir.is_none() {
        warn!("No camera folder configured; choose one on the Measure page");
    }

    eframe::run_native(
        "Layer Thickness Measurement",
        options,
        Box::new(move |cc| Box::new(LayerThicknessApp::new(cc, settings, settings_path))),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn command_line_paths_override_the_settings_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.yml");
        fs::write(
            &path,
            "database: file.db\nmaterials_dir: file-materials\ncamera:\n  source_dir: file-frames\n",
        )
        .unwrap();
        let mut settings = AppSettings::load(&path).unwrap();

        let args = Args::try_parse_from(["layer_thickness_app", "--database", "cli.db", "--camera-dir", "cli-frames"])
            .unwrap();
        args.apply_overrides(&mut settings);

        assert_eq!(settings.database, PathBuf::from("cli.db"));
        assert_eq!(settings.camera.source_dir, Some(PathBuf::from("cli-frames")));
        assert_eq!(settings.materials_dir, PathBuf::from("file-materials"));
        assert!(args.command.is_none());
    }

    #[test]
    fn no_flags_keep_file_values() {
        let mut settings = AppSettings {
            database: PathBuf::from("file.db"),
            ..Default::default()
        };
        let before = settings.clone();
        Args::try_parse_from(["layer_thickness_app"])
            .unwrap()
            .apply_overrides(&mut settings);
        assert_eq!(settings, before);
    }

    #[test]
    fn calc_subcommand_parses_material_path() {
        let args = Args::try_parse_from([
            "layer_thickness_app",
            "--materials",
            "lib",
            "calc",
            "--reference",
            "r.png",
            "--material",
            "m.png",
            "--path",
            "main/Cu/Johnson",
            "--save",
        ])
        .unwrap();
        assert_eq!(args.materials, Some(PathBuf::from("lib")));
        match args.command {
            Some(cli::Command::Calc { path, save, wavelength, .. }) => {
                assert_eq!(path, material::MaterialPath::new("main", "Cu", "Johnson"));
                assert!(save);
                assert_eq!(wavelength, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
