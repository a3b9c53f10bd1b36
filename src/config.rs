// src/config.rs

use crate::error::ConfigError;
use crate::i18n::Language;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// Defaults
pub const APP_DIR_NAME: &str = "layer-thickness";
pub const SETTINGS_FILE: &str = "settings.yml";
pub const DEFAULT_DATABASE: &str = "data/measurements.db";
pub const DEFAULT_MATERIALS_DIR: &str = "data/refractiveindex";
pub const DEFAULT_EXPORT_DIR: &str = "exports";
pub const EXPOSURE_MIN_MS: f64 = 0.01;
pub const EXPOSURE_MAX_MS: f64 = 1000.0;
pub const DEFAULT_EXPOSURE_MS: f64 = 10.0;
pub const DEFAULT_CONNECT_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;
pub const DEFAULT_WAVELENGTH_UM: f64 = 0.635;
pub const DEFAULT_PAGE_SIZE: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThemeMode {
    Light,
    Dark,
    #[default]
    System,
}

impl ThemeMode {
    pub const ALL: [ThemeMode; 3] = [ThemeMode::Light, ThemeMode::Dark, ThemeMode::System];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum WindowSize {
    #[default]
    #[serde(rename = "1100x800")]
    Standard,
    #[serde(rename = "1280x900")]
    Large,
    #[serde(rename = "1600x1000")]
    ExtraLarge,
    Fullscreen,
}

impl WindowSize {
    pub const ALL: [WindowSize; 4] = [
        WindowSize::Standard,
        WindowSize::Large,
        WindowSize::ExtraLarge,
        WindowSize::Fullscreen,
    ];

    /// Inner size in points, `None` for fullscreen.
    pub fn dimensions(self) -> Option<[f32; 2]> {
        match self {
            WindowSize::Standard => Some([1100.0, 800.0]),
            WindowSize::Large => Some([1280.0, 900.0]),
            WindowSize::ExtraLarge => Some([1600.0, 1000.0]),
            WindowSize::Fullscreen => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            WindowSize::Standard => "1100x800",
            WindowSize::Large => "1280x900",
            WindowSize::ExtraLarge => "1600x1000",
            WindowSize::Fullscreen => "Fullscreen",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    /// Folder the file-backed camera reads frames from.
    pub source_dir: Option<PathBuf>,
    pub exposure_ms: f64,
    pub connect_attempts: u32,
    pub retry_delay_ms: u64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            source_dir: None,
            exposure_ms: DEFAULT_EXPOSURE_MS,
            connect_attempts: DEFAULT_CONNECT_ATTEMPTS,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub theme: ThemeMode,
    pub language: Language,
    pub window_size: WindowSize,
    pub database: PathBuf,
    pub export_dir: PathBuf,
    pub materials_dir: PathBuf,
    pub camera: CameraSettings,
    pub default_wavelength_um: f64,
    pub history_page_size: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            theme: ThemeMode::default(),
            language: Language::default(),
            window_size: WindowSize::default(),
            database: PathBuf::from(DEFAULT_DATABASE),
            export_dir: PathBuf::from(DEFAULT_EXPORT_DIR),
            materials_dir: PathBuf::from(DEFAULT_MATERIALS_DIR),
            camera: CameraSettings::default(),
            default_wavelength_um: DEFAULT_WAVELENGTH_UM,
            history_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl AppSettings {
    /// `<config dir>/layer-thickness/settings.yml`, or a relative path when the
    /// platform has no config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR_NAME))
            .unwrap_or_default()
            .join(SETTINGS_FILE)
    }

    /// Loads settings; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            info!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let text = fs::read_to_string(path)?;
        let mut settings: Self = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if settings.history_page_size == 0 {
            warn!("history_page_size must be positive, using {DEFAULT_PAGE_SIZE}");
            settings.history_page_size = DEFAULT_PAGE_SIZE;
        }
        settings.camera.exposure_ms = settings.camera.exposure_ms.clamp(EXPOSURE_MIN_MS, EXPOSURE_MAX_MS);
        Ok(settings)
    }

    /// Like [`AppSettings::load`] but logs failures and falls back to defaults.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_else(|e| {
            warn!("Could not load settings: {e}");
            Self::default()
        })
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_yaml::to_string(self)?)?;
        info!("Settings saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = AppSettings::load(&dir.path().join("none.yml")).unwrap();
        assert_eq!(settings, AppSettings::default());
        assert_eq!(settings.history_page_size, 20);
        assert_eq!(settings.theme, ThemeMode::System);
        assert_eq!(settings.language, Language::English);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(SETTINGS_FILE);
        let settings = AppSettings {
            theme: ThemeMode::Dark,
            language: Language::German,
            window_size: WindowSize::Fullscreen,
            camera: CameraSettings {
                source_dir: Some(PathBuf::from("/tmp/frames")),
                ..Default::default()
            },
            ..Default::default()
        };
        settings.save(&path).unwrap();
        assert_eq!(AppSettings::load(&path).unwrap(), settings);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(
            &path,
            "theme: Light\nwindow_size: 1280x900\nhistory_page_size: 0\ncamera:\n  exposure_ms: 5000\n",
        )
        .unwrap();
        let settings = AppSettings::load(&path).unwrap();
        assert_eq!(settings.theme, ThemeMode::Light);
        assert_eq!(settings.window_size, WindowSize::Large);
        assert_eq!(settings.history_page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(settings.camera.exposure_ms, EXPOSURE_MAX_MS);
        assert_eq!(settings.camera.connect_attempts, DEFAULT_CONNECT_ATTEMPTS);
        assert_eq!(settings.database, PathBuf::from(DEFAULT_DATABASE));
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(SETTINGS_FILE);
        fs::write(&path, "theme: [not, a, theme]\n").unwrap();
        assert!(matches!(AppSettings::load(&path), Err(ConfigError::Parse { .. })));
        assert_eq!(AppSettings::load_or_default(&path), AppSettings::default());
    }

    #[test]
    fn window_presets() {
        assert_eq!(WindowSize::Standard.dimensions(), Some([1100.0, 800.0]));
        assert_eq!(WindowSize::Fullscreen.dimensions(), None);
        assert_eq!(WindowSize::ExtraLarge.label(), "1600x1000");
    }
}
