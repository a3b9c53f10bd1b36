// src/i18n.rs

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Language {
    #[default]
    English,
    German,
}

impl Language {
    pub const ALL: [Language; 2] = [Language::English, Language::German];

    pub fn native_name(self) -> &'static str {
        match self {
            Language::English => "English",
            Language::German => "Deutsch",
        }
    }
}

/// UI labels for one language.
pub struct Strings {
    pub app_title: &'static str,
    pub nav_home: &'static str,
    pub nav_measure: &'static str,
    pub nav_history: &'static str,
    pub nav_transfer: &'static str,
    pub nav_help: &'static str,
    pub nav_settings: &'static str,

    pub home_heading: &'static str,
    pub home_intro: &'static str,

    pub camera: &'static str,
    pub connect: &'static str,
    pub disconnect: &'static str,
    pub connected: &'static str,
    pub not_connected: &'static str,
    pub exposure_ms: &'static str,
    pub reference_image: &'static str,
    pub material_image: &'static str,
    pub capture: &'static str,
    pub no_image: &'static str,
    pub material: &'static str,
    pub shelf: &'static str,
    pub book: &'static str,
    pub page: &'static str,
    pub wavelength_um: &'static str,
    pub name_optional: &'static str,
    pub save_measurement: &'static str,
    pub reset: &'static str,
    pub calculate: &'static str,
    pub result: &'static str,
    pub saved_as: &'static str,

    pub filter: &'static str,
    pub name: &'static str,
    pub from_date: &'static str,
    pub to_date: &'static str,
    pub newest_first: &'static str,
    pub oldest_first: &'static str,
    pub refresh: &'static str,
    pub delete_selected: &'static str,
    pub previous: &'static str,
    pub next: &'static str,
    pub page_of: &'static str,
    pub date: &'static str,
    pub layer_nm: &'static str,

    pub matching_rows: &'static str,
    pub export_zip: &'static str,
    pub export_csv: &'static str,
    pub import_zip: &'static str,
    pub nothing_to_export: &'static str,
    pub exported_to: &'static str,
    pub imported: &'static str,

    pub help_heading: &'static str,
    pub help_steps: &'static [&'static str],

    pub theme: &'static str,
    pub theme_light: &'static str,
    pub theme_dark: &'static str,
    pub theme_system: &'static str,
    pub language: &'static str,
    pub window_size: &'static str,
}

pub fn strings(lang: Language) -> &'static Strings {
    match lang {
        Language::English => &ENGLISH,
        Language::German => &GERMAN,
    }
}

static ENGLISH: Strings = Strings {
    app_title: "Layer Thickness Measurement",
    nav_home: "Home",
    nav_measure: "Measure",
    nav_history: "History",
    nav_transfer: "Ex-/Import",
    nav_help: "Help",
    nav_settings: "Settings",

    home_heading: "Welcome",
    home_intro: "Measure the thickness of thin layers from a reference and a material image.",

    camera: "Camera",
    connect: "Connect",
    disconnect: "Disconnect",
    connected: "Connected",
    not_connected: "Not connected",
    exposure_ms: "Exposure (ms)",
    reference_image: "Reference image",
    material_image: "Material image",
    capture: "Capture",
    no_image: "No image captured",
    material: "Material",
    shelf: "Shelf",
    book: "Book",
    page: "Page",
    wavelength_um: "Wavelength (µm)",
    name_optional: "Name (optional)",
    save_measurement: "Save measurement",
    reset: "Reset",
    calculate: "Calculate",
    result: "Layer thickness",
    saved_as: "Saved as measurement",

    filter: "Filter",
    name: "Name",
    from_date: "From",
    to_date: "To",
    newest_first: "Newest first",
    oldest_first: "Oldest first",
    refresh: "Refresh",
    delete_selected: "Delete selected",
    previous: "Previous",
    next: "Next",
    page_of: "of",
    date: "Date",
    layer_nm: "Layer (nm)",

    matching_rows: "Matching measurements",
    export_zip: "Export to ZIP",
    export_csv: "Export to CSV",
    import_zip: "Import from ZIP",
    nothing_to_export: "No measurements to export.",
    exported_to: "Exported to",
    imported: "Import finished",

    help_heading: "How to measure",
    help_steps: &[
        "Connect the camera on the Measure page.",
        "Capture a reference image without the sample in the beam path.",
        "Insert the sample and capture the material image.",
        "Select the material (shelf, book, page) and enter the wavelength.",
        "Press Calculate. Enable \"Save measurement\" to store the result.",
        "Browse stored results on the History page and export them on the Ex-/Import page.",
    ],

    theme: "Theme",
    theme_light: "Light",
    theme_dark: "Dark",
    theme_system: "System",
    language: "Language",
    window_size: "Window size",
};

static GERMAN: Strings = Strings {
    app_title: "Schichtdickenmessung",
    nav_home: "Start",
    nav_measure: "Messen",
    nav_history: "Verlauf",
    nav_transfer: "Ex-/Import",
    nav_help: "Hilfe",
    nav_settings: "Einstellungen",

    home_heading: "Willkommen",
    home_intro: "Bestimmen Sie die Dicke dünner Schichten aus einem Referenz- und einem Materialbild.",

    camera: "Kamera",
    connect: "Verbinden",
    disconnect: "Trennen",
    connected: "Verbunden",
    not_connected: "Nicht verbunden",
    exposure_ms: "Belichtung (ms)",
    reference_image: "Referenzbild",
    material_image: "Materialbild",
    capture: "Aufnehmen",
    no_image: "Kein Bild aufgenommen",
    material: "Material",
    shelf: "Regal",
    book: "Buch",
    page: "Seite",
    wavelength_um: "Wellenlänge (µm)",
    name_optional: "Name (optional)",
    save_measurement: "Messung speichern",
    reset: "Zurücksetzen",
    calculate: "Berechnen",
    result: "Schichtdicke",
    saved_as: "Gespeichert als Messung",

    filter: "Filter",
    name: "Name",
    from_date: "Von",
    to_date: "Bis",
    newest_first: "Neueste zuerst",
    oldest_first: "Älteste zuerst",
    refresh: "Aktualisieren",
    delete_selected: "Auswahl löschen",
    previous: "Zurück",
    next: "Weiter",
    page_of: "von",
    date: "Datum",
    layer_nm: "Schicht (nm)",

    matching_rows: "Passende Messungen",
    export_zip: "Als ZIP exportieren",
    export_csv: "Als CSV exportieren",
    import_zip: "Aus ZIP importieren",
    nothing_to_export: "Keine Messungen zum Exportieren.",
    exported_to: "Exportiert nach",
    imported: "Import abgeschlossen",

    help_heading: "So wird gemessen",
    help_steps: &[
        "Verbinden Sie die Kamera auf der Seite Messen.",
        "Nehmen Sie ein Referenzbild ohne Probe im Strahlengang auf.",
        "Setzen Sie die Probe ein und nehmen Sie das Materialbild auf.",
        "Wählen Sie das Material (Regal, Buch, Seite) und geben Sie die Wellenlänge ein.",
        "Klicken Sie auf Berechnen. Mit \"Messung speichern\" wird das Ergebnis abgelegt.",
        "Gespeicherte Ergebnisse finden Sie im Verlauf, der Export erfolgt unter Ex-/Import.",
    ],

    theme: "Design",
    theme_light: "Hell",
    theme_dark: "Dunkel",
    theme_system: "System",
    language: "Sprache",
    window_size: "Fenstergröße",
};
