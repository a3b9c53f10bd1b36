// src/app.rs

use crate::backend::{CameraCommand, CameraEvent, CameraWorker, CaptureSlot, FolderCamera, RetryPolicy};
use crate::config::{AppSettings, ThemeMode, WindowSize, EXPOSURE_MAX_MS, EXPOSURE_MIN_MS};
use crate::database::{Database, Measurement, MeasurementFilter, SortOrder};
use crate::error::DbError;
use crate::history::Pager;
use crate::i18n::{strings, Language, Strings};
use crate::material::{display_name, find_item, first_selectable, Catalog, CatalogItem, Entry, MaterialLibrary, MaterialPath};
use crate::session::{MeasurementOutcome, MeasurementRequest, MeasurementSession};
use crate::transfer::{TransferJob, TransferOutcome, TransferTask};

use chrono::NaiveDate;
use eframe::egui;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{error, info, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Page {
    Home,
    Measure,
    History,
    Transfer,
    Help,
    Settings,
}

struct Banner {
    text: String,
    is_error: bool,
}

impl Banner {
    fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }

    fn show(&self, ui: &mut egui::Ui) {
        let color = if self.is_error {
            egui::Color32::from_rgb(200, 40, 40)
        } else {
            egui::Color32::from_rgb(0, 150, 0)
        };
        ui.colored_label(color, self.text.as_str());
    }
}

/// Shelf/book/page chosen in the cascading selectors.
#[derive(Debug, Clone, Default, PartialEq)]
struct MaterialSelection {
    shelf: String,
    book: String,
    page: String,
}

impl MaterialSelection {
    fn from_catalog(catalog: &Catalog) -> Self {
        let mut selection = Self::default();
        selection.normalize(catalog);
        selection
    }

    /// Replaces keys that are not in the catalog with the first selectable
    /// entry of their level.
    fn normalize(&mut self, catalog: &Catalog) {
        let Some(shelf) = catalog.shelf(&self.shelf).or_else(|| first_selectable(&catalog.shelves)) else {
            *self = Self::default();
            return;
        };
        self.shelf = shelf.key.clone();

        let Some(book) = find_item(&shelf.books, &self.book).or_else(|| first_selectable(&shelf.books)) else {
            self.book.clear();
            self.page.clear();
            return;
        };
        self.book = book.key.clone();

        match find_item(&book.pages, &self.page).or_else(|| first_selectable(&book.pages)) {
            Some(page) => self.page = page.key.clone(),
            None => self.page.clear(),
        }
    }

    fn path(&self) -> Option<MaterialPath> {
        if self.shelf.is_empty() || self.book.is_empty() || self.page.is_empty() {
            None
        } else {
            Some(MaterialPath::new(&self.shelf, &self.book, &self.page))
        }
    }
}

/// Text inputs of a measurement filter.
#[derive(Debug, Clone, Default)]
struct FilterForm {
    name: String,
    start_date: String,
    end_date: String,
    shelf: String,
    book: String,
    page: String,
}

impl FilterForm {
    fn to_filter(&self) -> Result<MeasurementFilter, String> {
        let text = |s: &str| {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        };
        Ok(MeasurementFilter {
            name: text(&self.name),
            start_date: parse_date(&self.start_date)?,
            end_date: parse_date(&self.end_date)?,
            shelf: text(&self.shelf),
            book: text(&self.book),
            page: text(&self.page),
        })
    }
}

fn parse_date(input: &str) -> Result<Option<NaiveDate>, String> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .map(Some)
        .map_err(|_| format!("Invalid date '{input}', expected YYYY-MM-DD"))
}

#[derive(Default)]
struct HistoryState {
    form: FilterForm,
    order: SortOrder,
    pager: Pager,
    rows: Vec<Measurement>,
    selected: Option<i64>,
    stale: bool,
}

#[derive(Default)]
struct TransferState {
    form: FilterForm,
    count: usize,
    names: Vec<String>,
    shelves: Vec<String>,
    books: Vec<String>,
    pages: Vec<String>,
    stale: bool,
    task: Option<TransferTask>,
}

pub struct LayerThicknessApp {
    settings: AppSettings,
    settings_path: PathBuf,
    page: Page,
    banner: Option<Banner>,

    db: Option<Database>,
    library: Option<MaterialLibrary>,

    camera: CameraWorker,
    camera_connected: bool,
    camera_busy: bool,
    exposure_ms: f64,

    session: MeasurementSession,
    previews: HashMap<CaptureSlot, egui::TextureHandle>,
    selection: MaterialSelection,
    wavelength_um: f64,
    name: String,
    save_measurement: bool,
    last_result: Option<MeasurementOutcome>,

    history: HistoryState,
    transfer: TransferState,
    theme_applied: bool,
}

impl LayerThicknessApp {
    pub fn new(_cc: &eframe::CreationContext<'_>, settings: AppSettings, settings_path: PathBuf) -> Self {
        let mut banner = None;

        let db = match Database::open(&settings.database) {
            Ok(db) => Some(db),
            Err(e) => {
                error!("Could not open database {}: {e}", settings.database.display());
                banner = Some(Banner::error(format!("Database error: {e}")));
                None
            }
        };

        let library = match MaterialLibrary::open(&settings.materials_dir) {
            Ok(library) => Some(library),
            Err(e) => {
                warn!("Material library unavailable: {e}");
                banner.get_or_insert_with(|| Banner::error(e.to_string()));
                None
            }
        };
        let selection = library
            .as_ref()
            .map(|l| MaterialSelection::from_catalog(l.catalog()))
            .unwrap_or_default();

        let camera = CameraWorker::spawn(Box::new(FolderCamera::new(settings.camera.source_dir.clone())));
        let camera_busy = settings.camera.source_dir.is_some();
        if camera_busy {
            camera.send(CameraCommand::Connect(retry_policy(&settings)));
        }

        let mut history = HistoryState {
            stale: true,
            ..Default::default()
        };
        history.pager.set_per_page(settings.history_page_size);

        Self {
            page: Page::Home,
            banner,
            db,
            library,
            camera,
            camera_connected: false,
            camera_busy,
            exposure_ms: settings.camera.exposure_ms,
            session: MeasurementSession::new(),
            previews: HashMap::new(),
            selection,
            wavelength_um: settings.default_wavelength_um,
            name: String::new(),
            save_measurement: true,
            last_result: None,
            history,
            transfer: TransferState {
                stale: true,
                ..Default::default()
            },
            theme_applied: false,
            settings,
            settings_path,
        }
    }

    fn t(&self) -> &'static Strings {
        strings(self.settings.language)
    }

    // ---- camera ---------------------------------------------------------

    fn poll_camera(&mut self, ctx: &egui::Context) {
        while let Some(event) = self.camera.try_recv() {
            match event {
                CameraEvent::Connected(info) => {
                    self.camera_connected = true;
                    self.camera_busy = false;
                    self.banner = Some(Banner::info(format!("{} ({} frames)", info.name, info.frame_count)));
                    self.camera.send(CameraCommand::SetExposure(self.exposure_ms));
                }
                CameraEvent::ConnectFailed(message) => {
                    self.camera_connected = false;
                    self.camera_busy = false;
                    self.banner = Some(Banner::error(format!("Camera: {message}")));
                }
                CameraEvent::ExposureSet(ms) => self.exposure_ms = ms,
                CameraEvent::Captured { slot, frame } => {
                    self.camera_busy = false;
                    let image = egui::ColorImage::from_rgb(
                        [frame.width() as usize, frame.height() as usize],
                        &frame.to_rgb8(),
                    );
                    let texture = ctx.load_texture(format!("{slot}-preview"), image, Default::default());
                    self.previews.insert(slot, texture);
                    self.session.set_frame(slot, frame);
                    self.last_result = None;
                }
                CameraEvent::CaptureFailed { slot, message } => {
                    self.camera_busy = false;
                    self.banner = Some(Banner::error(format!("Capture of {slot} image failed: {message}")));
                }
                CameraEvent::Disconnected => {
                    self.camera_connected = false;
                    self.camera_busy = false;
                }
            }
        }
    }

    fn choose_camera_folder(&mut self) {
        let Some(dir) = rfd::FileDialog::new().pick_folder() else {
            return;
        };
        info!("Camera source folder set to {}", dir.display());
        self.settings.camera.source_dir = Some(dir.clone());
        let previous = std::mem::replace(&mut self.camera, CameraWorker::spawn(Box::new(FolderCamera::new(Some(dir)))));
        previous.detach();
        self.camera_connected = false;
        self.camera_busy = true;
        self.camera.send(CameraCommand::Connect(retry_policy(&self.settings)));
        self.persist_settings();
    }

    // ---- measurement ----------------------------------------------------

    fn calculate(&mut self) {
        let Some(material) = self.selection.path() else {
            self.banner = Some(Banner::error("Select a material first"));
            return;
        };
        let Some(library) = &self.library else {
            self.banner = Some(Banner::error("No material catalog loaded"));
            return;
        };
        if self.save_measurement && self.db.is_none() {
            self.banner = Some(Banner::error("Database unavailable, measurement cannot be saved"));
            return;
        }

        let request = MeasurementRequest {
            name: self.name.clone(),
            material,
            wavelength_um: self.wavelength_um,
            save: self.save_measurement,
        };
        match self.session.run(&request, library, self.db.as_ref()) {
            Ok(outcome) => {
                if outcome.saved_id.is_some() {
                    self.history.stale = true;
                    self.transfer.stale = true;
                }
                self.last_result = Some(outcome);
                self.banner = None;
            }
            Err(e) => {
                error!("Measurement failed: {e}");
                self.last_result = None;
                self.banner = Some(Banner::error(e.to_string()));
            }
        }
    }

    fn reset_measurement(&mut self) {
        self.session.reset();
        self.previews.clear();
        self.last_result = None;
        self.name.clear();
        self.banner = None;
    }

    // ---- history / transfer data ---------------------------------------

    fn reload_history(&mut self) {
        self.history.stale = false;
        let Some(db) = &self.db else { return };
        let filter = match self.history.form.to_filter() {
            Ok(filter) => filter,
            Err(message) => {
                self.banner = Some(Banner::error(message));
                return;
            }
        };
        let loaded = db.count_measurements(&filter).and_then(|total| {
            self.history.pager.set_total(total);
            db.get_measurements(&filter, self.history.order, Some(self.history.pager.page_request()))
        });
        match loaded {
            Ok(rows) => {
                if !rows.iter().any(|m| Some(m.id) == self.history.selected) {
                    self.history.selected = None;
                }
                self.history.rows = rows;
            }
            Err(e) => {
                error!("Loading history failed: {e}");
                self.banner = Some(Banner::error(e.to_string()));
            }
        }
    }

    fn delete_selected(&mut self) {
        let (Some(db), Some(id)) = (&self.db, self.history.selected) else {
            return;
        };
        match db.delete_measurement(id) {
            Ok(true) => {
                info!("Deleted measurement {id}");
                self.history.selected = None;
                self.history.stale = true;
                self.transfer.stale = true;
            }
            Ok(false) => warn!("Measurement {id} was already gone"),
            Err(e) => self.banner = Some(Banner::error(e.to_string())),
        }
    }

    fn reload_transfer(&mut self) {
        self.transfer.stale = false;
        let Some(db) = &self.db else { return };
        let Ok(filter) = self.transfer.form.to_filter() else {
            return;
        };
        match transfer_data(db, &filter) {
            Ok(data) => {
                self.transfer.count = data.count;
                self.transfer.names = data.names;
                self.transfer.shelves = data.shelves;
                self.transfer.books = data.books;
                self.transfer.pages = data.pages;
            }
            Err(e) => self.banner = Some(Banner::error(e.to_string())),
        }
    }

    fn export(&mut self, as_zip: bool) {
        if self.db.is_none() || self.transfer.task.is_some() {
            return;
        }
        let filter = match self.transfer.form.to_filter() {
            Ok(filter) => filter,
            Err(message) => {
                self.banner = Some(Banner::error(message));
                return;
            }
        };
        let Some(dir) = rfd::FileDialog::new()
            .set_directory(&self.settings.export_dir)
            .pick_folder()
        else {
            return;
        };
        let job = if as_zip {
            TransferJob::ExportZip { dir, filter }
        } else {
            TransferJob::ExportCsv { dir }
        };
        self.start_transfer(job);
    }

    fn import(&mut self) {
        if self.db.is_none() || self.transfer.task.is_some() {
            return;
        }
        let Some(archive) = rfd::FileDialog::new().add_filter("ZIP", &["zip"]).pick_file() else {
            return;
        };
        self.start_transfer(TransferJob::Import { archive });
    }

    fn start_transfer(&mut self, job: TransferJob) {
        info!("Starting {job:?}");
        self.transfer.task = Some(TransferTask::spawn(self.settings.database.clone(), job));
        self.banner = None;
    }

    fn poll_transfer(&mut self) {
        let Some(result) = self.transfer.task.as_ref().and_then(TransferTask::try_finish) else {
            return;
        };
        self.transfer.task = None;
        let t = self.t();
        self.banner = Some(match result {
            Ok(TransferOutcome::Exported(Some(path))) => Banner::info(format!("{} {}", t.exported_to, path.display())),
            Ok(TransferOutcome::Exported(None)) => Banner::error(t.nothing_to_export),
            Ok(TransferOutcome::Imported(summary)) => {
                self.history.stale = true;
                self.transfer.stale = true;
                Banner::info(format!(
                    "{}: {} ok, {} failed",
                    t.imported, summary.succeeded, summary.failed
                ))
            }
            Err(e) => Banner::error(e.to_string()),
        });
    }

    // ---- settings -------------------------------------------------------

    /// Writes the user-facing preferences back to the settings file. Values
    /// given on the command line stay out of it.
    fn persist_settings(&mut self) {
        let mut stored = AppSettings::load_or_default(&self.settings_path);
        stored.theme = self.settings.theme;
        stored.language = self.settings.language;
        stored.window_size = self.settings.window_size;
        stored.camera.source_dir = self.settings.camera.source_dir.clone();
        stored.camera.exposure_ms = self.exposure_ms;
        if let Err(e) = stored.save(&self.settings_path) {
            error!("Saving settings failed: {e}");
            self.banner = Some(Banner::error(e.to_string()));
        }
    }

    fn apply_theme(&mut self, ctx: &egui::Context, frame: &eframe::Frame) {
        let visuals = match self.settings.theme {
            ThemeMode::Light => egui::Visuals::light(),
            ThemeMode::Dark => egui::Visuals::dark(),
            ThemeMode::System => frame
                .info()
                .system_theme
                .map(|theme| theme.egui_visuals())
                .unwrap_or_else(egui::Visuals::dark),
        };
        ctx.set_visuals(visuals);
        self.theme_applied = true;
    }

    fn apply_window_size(&self, ctx: &egui::Context) {
        match self.settings.window_size.dimensions() {
            Some([w, h]) => {
                ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(false));
                ctx.send_viewport_cmd(egui::ViewportCommand::InnerSize(egui::vec2(w, h)));
            }
            None => ctx.send_viewport_cmd(egui::ViewportCommand::Fullscreen(true)),
        }
    }

    // ---- pages ----------------------------------------------------------

    fn navigation(&mut self, ui: &mut egui::Ui) {
        let t = self.t();
        ui.add_space(8.0);
        for (page, label) in [
            (Page::Home, t.nav_home),
            (Page::Measure, t.nav_measure),
            (Page::History, t.nav_history),
            (Page::Transfer, t.nav_transfer),
        ] {
            ui.selectable_value(&mut self.page, page, label);
        }
        ui.separator();
        ui.selectable_value(&mut self.page, Page::Help, t.nav_help);
        ui.selectable_value(&mut self.page, Page::Settings, t.nav_settings);
    }

    fn home_page(&mut self, ui: &mut egui::Ui) {
        let t = self.t();
        ui.heading(t.home_heading);
        ui.label(t.home_intro);
        ui.add_space(12.0);
        if ui.button(format!("➡ {}", t.nav_measure)).clicked() {
            self.page = Page::Measure;
        }
    }

    fn measure_page(&mut self, ui: &mut egui::Ui) {
        let t = self.t();
        ui.heading(t.nav_measure);

        ui.horizontal(|ui| {
            ui.label(format!("{}:", t.camera));
            if self.camera_connected {
                ui.colored_label(egui::Color32::from_rgb(0, 150, 0), t.connected);
            } else {
                ui.label(t.not_connected);
            }
            if self.camera_busy {
                ui.spinner();
            }
            if ui.button("📁").on_hover_text("Camera folder").clicked() {
                self.choose_camera_folder();
            }
            if self.camera_connected {
                if ui.button(t.disconnect).clicked() {
                    self.camera.send(CameraCommand::Disconnect);
                }
            } else if ui.add_enabled(!self.camera_busy, egui::Button::new(t.connect)).clicked() {
                self.camera_busy = true;
                self.camera.send(CameraCommand::Connect(retry_policy(&self.settings)));
            }

            ui.label(t.exposure_ms);
            let exposure = ui.add(
                egui::DragValue::new(&mut self.exposure_ms)
                    .speed(0.5)
                    .clamp_range(EXPOSURE_MIN_MS..=EXPOSURE_MAX_MS),
            );
            if exposure.drag_released() || exposure.lost_focus() {
                self.camera.send(CameraCommand::SetExposure(self.exposure_ms));
                self.persist_settings();
            }
        });
        ui.separator();

        let mut capture = None;
        ui.columns(2, |cols| {
            let slots = [
                (CaptureSlot::Reference, t.reference_image),
                (CaptureSlot::Material, t.material_image),
            ];
            for (ui, (slot, title)) in cols.iter_mut().zip(slots) {
                ui.group(|ui| {
                    ui.strong(title);
                    match self.previews.get(&slot) {
                        Some(texture) => {
                            let size = texture.size_vec2();
                            let scale = (ui.available_width() / size.x).min(240.0 / size.y).min(1.0);
                            ui.image((texture.id(), size * scale));
                        }
                        None => {
                            ui.add_space(100.0);
                            ui.label(t.no_image);
                            ui.add_space(100.0);
                        }
                    }
                    let enabled = self.camera_connected && !self.camera_busy;
                    if ui.add_enabled(enabled, egui::Button::new(t.capture)).clicked() {
                        capture = Some(slot);
                    }
                });
            }
        });
        if let Some(slot) = capture {
            self.camera_busy = true;
            self.camera.send(CameraCommand::Capture(slot));
        }

        ui.separator();
        ui.strong(t.material);
        self.material_selectors(ui);

        ui.horizontal(|ui| {
            ui.label(t.wavelength_um);
            ui.add(
                egui::DragValue::new(&mut self.wavelength_um)
                    .speed(0.001)
                    .clamp_range(0.0..=100.0)
                    .max_decimals(4),
            );
            ui.label(t.name_optional);
            ui.add(egui::TextEdit::singleline(&mut self.name).desired_width(180.0));
            ui.checkbox(&mut self.save_measurement, t.save_measurement);
        });

        ui.horizontal(|ui| {
            if ui.button(t.reset).clicked() {
                self.reset_measurement();
            }
            if ui
                .add_enabled(self.session.is_ready(), egui::Button::new(t.calculate))
                .clicked()
            {
                self.calculate();
            }
        });

        if let Some(outcome) = &self.last_result {
            ui.separator();
            let r = &outcome.result;
            ui.label(
                egui::RichText::new(format!("{}: {:.2} nm", t.result, r.thickness_nm))
                    .size(22.0)
                    .strong(),
            );
            ui.label(format!(
                "k = {:.4}   α = {:.1} cm⁻¹   gray {:.1} / {:.1}",
                r.k, r.alpha_per_cm, r.reference_gray, r.material_gray
            ));
            if let Some(id) = outcome.saved_id {
                ui.label(format!("{} #{id}", t.saved_as));
            }
        }
    }

    fn material_selectors(&mut self, ui: &mut egui::Ui) {
        let t = self.t();
        let Some(library) = &self.library else {
            ui.colored_label(egui::Color32::from_rgb(200, 40, 40), "No material catalog loaded");
            return;
        };
        let catalog = library.catalog();
        let selection = &mut self.selection;

        let mut changed = false;
        if catalog_combo(ui, "shelf_combo", t.shelf, &catalog.shelves, &mut selection.shelf) {
            selection.book.clear();
            selection.page.clear();
            selection.normalize(catalog);
            changed = true;
        }
        if let Some(shelf) = catalog.shelf(&selection.shelf) {
            if catalog_combo(ui, "book_combo", t.book, &shelf.books, &mut selection.book) {
                selection.page.clear();
                selection.normalize(catalog);
                changed = true;
            }
            if let Some(book) = find_item(&shelf.books, &selection.book) {
                changed |= catalog_combo(ui, "page_combo", t.page, &book.pages, &mut selection.page);
            }
        }

        if let Some(path) = selection.path() {
            match library.load(&path) {
                Ok(data) => match data.k_range() {
                    Some((lo, hi)) => {
                        ui.label(format!("k: {lo:.3} - {hi:.3} µm"));
                    }
                    None => {
                        ui.colored_label(egui::Color32::from_rgb(200, 40, 40), "No k data for this material");
                    }
                },
                Err(e) => {
                    ui.colored_label(egui::Color32::from_rgb(200, 40, 40), e.to_string());
                }
            }
        }

        if changed {
            self.last_result = None;
        }
    }

    fn history_page(&mut self, ui: &mut egui::Ui) {
        let t = self.t();
        ui.heading(t.nav_history);

        let mut reload = false;
        ui.horizontal(|ui| {
            ui.label(t.name);
            reload |= ui
                .add(egui::TextEdit::singleline(&mut self.history.form.name).desired_width(140.0))
                .changed();
            ui.label(t.from_date);
            reload |= date_edit(ui, &mut self.history.form.start_date);
            ui.label(t.to_date);
            reload |= date_edit(ui, &mut self.history.form.end_date);

            let before = self.history.order;
            egui::ComboBox::from_id_source("history_order")
                .selected_text(order_label(t, before))
                .show_ui(ui, |ui| {
                    for order in [SortOrder::NewestFirst, SortOrder::OldestFirst] {
                        ui.selectable_value(&mut self.history.order, order, order_label(t, order));
                    }
                });
            reload |= self.history.order != before;
            reload |= ui.button(t.refresh).clicked();
        });
        if reload {
            self.history.pager.first();
            self.history.stale = true;
        }
        ui.separator();

        let mut clicked = None;
        egui::Grid::new("history_grid")
            .striped(true)
            .num_columns(6)
            .show(ui, |ui| {
                for header in ["ID", t.date, t.name, t.layer_nm, t.wavelength_um, t.material] {
                    ui.strong(header);
                }
                ui.end_row();

                for m in &self.history.rows {
                    let selected = self.history.selected == Some(m.id);
                    if ui.selectable_label(selected, m.id.to_string()).clicked() {
                        clicked = Some((m.id, selected));
                    }
                    ui.label(m.date.as_str());
                    ui.label(m.name.as_deref().unwrap_or("-"));
                    ui.label(format!("{:.2}", m.layer_nm));
                    ui.label(m.wavelength_um.map(|w| format!("{w:.4}")).unwrap_or_else(|| "-".to_string()));
                    ui.label(format!("{}/{}/{}", m.shelf, m.book, m.page));
                    ui.end_row();
                }
            });
        if let Some((id, was_selected)) = clicked {
            self.history.selected = (!was_selected).then_some(id);
        }

        ui.separator();
        ui.horizontal(|ui| {
            let pager = &mut self.history.pager;
            if ui
                .add_enabled(pager.current_page() > 1, egui::Button::new(t.previous))
                .clicked()
                && pager.prev()
            {
                self.history.stale = true;
            }
            ui.label(format!(
                "{} {} {} {} ({})",
                t.page,
                pager.current_page(),
                t.page_of,
                pager.total_pages(),
                pager.total_items()
            ));
            if ui
                .add_enabled(pager.current_page() < pager.total_pages(), egui::Button::new(t.next))
                .clicked()
                && pager.next()
            {
                self.history.stale = true;
            }
        });
        if ui
            .add_enabled(self.history.selected.is_some(), egui::Button::new(t.delete_selected))
            .clicked()
        {
            self.delete_selected();
        }
    }

    fn transfer_page(&mut self, ui: &mut egui::Ui) {
        let t = self.t();
        ui.heading(t.nav_transfer);

        let mut changed = false;
        let state = &mut self.transfer;
        egui::Grid::new("transfer_filter").num_columns(2).show(ui, |ui| {
            ui.label(t.name);
            changed |= suggestion_combo(ui, "transfer_name", &state.names, &mut state.form.name);
            ui.end_row();
            ui.label(t.from_date);
            changed |= date_edit(ui, &mut state.form.start_date);
            ui.end_row();
            ui.label(t.to_date);
            changed |= date_edit(ui, &mut state.form.end_date);
            ui.end_row();
            ui.label(t.shelf);
            changed |= suggestion_combo(ui, "transfer_shelf", &state.shelves, &mut state.form.shelf);
            ui.end_row();
            ui.label(t.book);
            changed |= suggestion_combo(ui, "transfer_book", &state.books, &mut state.form.book);
            ui.end_row();
            ui.label(t.page);
            changed |= suggestion_combo(ui, "transfer_page", &state.pages, &mut state.form.page);
            ui.end_row();
        });
        if changed {
            state.stale = true;
        }

        ui.label(format!("{}: {}", t.matching_rows, state.count));
        ui.separator();
        let idle = state.task.is_none();
        ui.horizontal(|ui| {
            if ui.add_enabled(idle, egui::Button::new(t.export_zip)).clicked() {
                self.export(true);
            }
            if ui.add_enabled(idle, egui::Button::new(t.export_csv)).clicked() {
                self.export(false);
            }
            if ui.add_enabled(idle, egui::Button::new(t.import_zip)).clicked() {
                self.import();
            }
            if !idle {
                ui.spinner();
            }
        });
    }

    fn help_page(&self, ui: &mut egui::Ui) {
        let t = self.t();
        ui.heading(t.help_heading);
        for (i, step) in t.help_steps.iter().enumerate() {
            ui.label(format!("{}. {step}", i + 1));
        }
    }

    fn settings_page(&mut self, ui: &mut egui::Ui) {
        let t = self.t();
        ui.heading(t.nav_settings);

        let mut changed = false;
        egui::Grid::new("settings_grid")
            .num_columns(2)
            .spacing([24.0, 8.0])
            .show(ui, |ui| {
                ui.label(t.theme);
                ui.horizontal(|ui| {
                    for mode in ThemeMode::ALL {
                        let label = match mode {
                            ThemeMode::Light => t.theme_light,
                            ThemeMode::Dark => t.theme_dark,
                            ThemeMode::System => t.theme_system,
                        };
                        changed |= ui.radio_value(&mut self.settings.theme, mode, label).changed();
                    }
                });
                ui.end_row();

                ui.label(t.language);
                egui::ComboBox::from_id_source("language")
                    .selected_text(self.settings.language.native_name())
                    .show_ui(ui, |ui| {
                        for lang in Language::ALL {
                            changed |= ui
                                .selectable_value(&mut self.settings.language, lang, lang.native_name())
                                .changed();
                        }
                    });
                ui.end_row();

                ui.label(t.window_size);
                let before = self.settings.window_size;
                egui::ComboBox::from_id_source("window_size")
                    .selected_text(before.label())
                    .show_ui(ui, |ui| {
                        for size in WindowSize::ALL {
                            ui.selectable_value(&mut self.settings.window_size, size, size.label());
                        }
                    });
                if self.settings.window_size != before {
                    self.apply_window_size(ui.ctx());
                    changed = true;
                }
                ui.end_row();
            });

        if changed {
            self.theme_applied = false;
            self.persist_settings();
        }

        ui.separator();
        egui::Grid::new("paths_grid").num_columns(2).show(ui, |ui| {
            for (label, path) in [
                ("Settings", &self.settings_path),
                ("Database", &self.settings.database),
                ("Materials", &self.settings.materials_dir),
                ("Exports", &self.settings.export_dir),
            ] {
                ui.label(label);
                ui.monospace(path.display().to_string());
                ui.end_row();
            }
        });
    }
}

impl eframe::App for LayerThicknessApp {
    fn update(&mut self, ctx: &egui::Context, frame: &mut eframe::Frame) {
        if !self.theme_applied {
            self.apply_theme(ctx, frame);
        }
        self.poll_camera(ctx);
        self.poll_transfer();
        if self.page == Page::History && self.history.stale {
            self.reload_history();
        }
        if self.page == Page::Transfer && self.transfer.stale {
            self.reload_transfer();
        }

        egui::SidePanel::left("navigation")
            .resizable(false)
            .default_width(150.0)
            .show(ctx, |ui| self.navigation(ui));

        egui::TopBottomPanel::bottom("status").show(ctx, |ui| match &self.banner {
            Some(banner) => banner.show(ui),
            None => {
                ui.label(self.t().app_title);
            }
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| match self.page {
                Page::Home => self.home_page(ui),
                Page::Measure => self.measure_page(ui),
                Page::History => self.history_page(ui),
                Page::Transfer => self.transfer_page(ui),
                Page::Help => self.help_page(ui),
                Page::Settings => self.settings_page(ui),
            });
        });

        // camera events arrive from another thread
        ctx.request_repaint_after(POLL_INTERVAL);
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        info!("Shutting down");
        self.camera.send(CameraCommand::Disconnect);
    }
}

fn retry_policy(settings: &AppSettings) -> RetryPolicy {
    RetryPolicy {
        attempts: settings.camera.connect_attempts,
        delay: Duration::from_millis(settings.camera.retry_delay_ms),
    }
}

fn transfer_data(db: &Database, filter: &MeasurementFilter) -> Result<TransferData, DbError> {
    Ok(TransferData {
        count: db.count_measurements(filter)?,
        names: db.unique_names()?,
        shelves: db.unique_shelves()?,
        books: db.unique_books()?,
        pages: db.unique_pages()?,
    })
}

struct TransferData {
    count: usize,
    names: Vec<String>,
    shelves: Vec<String>,
    books: Vec<String>,
    pages: Vec<String>,
}

fn order_label(t: &Strings, order: SortOrder) -> &'static str {
    match order {
        SortOrder::NewestFirst => t.newest_first,
        SortOrder::OldestFirst => t.oldest_first,
    }
}

/// Date field; reports a change once editing finishes.
fn date_edit(ui: &mut egui::Ui, value: &mut String) -> bool {
    ui.add(
        egui::TextEdit::singleline(value)
            .hint_text("YYYY-MM-DD")
            .desired_width(100.0),
    )
    .lost_focus()
}

/// Catalog level selector. Dividers are shown as disabled headings.
fn catalog_combo<T: CatalogItem>(
    ui: &mut egui::Ui,
    id: &str,
    label: &str,
    entries: &[Entry<T>],
    selected: &mut String,
) -> bool {
    let mut changed = false;
    let current = find_item(entries, selected)
        .map(|item| display_name(item.name()))
        .unwrap_or_default();
    ui.horizontal(|ui| {
        ui.label(label);
        egui::ComboBox::from_id_source(id)
            .selected_text(current)
            .width(320.0)
            .show_ui(ui, |ui| {
                for entry in entries {
                    match entry {
                        Entry::Divider(text) => {
                            ui.add_enabled(false, egui::Label::new(egui::RichText::new(display_name(text)).strong()));
                        }
                        Entry::Item(item) => {
                            let is_selected = item.key() == selected.as_str();
                            if ui.selectable_label(is_selected, display_name(item.name())).clicked() && !is_selected {
                                *selected = item.key().to_string();
                                changed = true;
                            }
                        }
                    }
                }
            });
    });
    changed
}

/// Free-text filter value picked from the values present in the database;
/// `*` clears it.
fn suggestion_combo(ui: &mut egui::Ui, id: &str, values: &[String], selected: &mut String) -> bool {
    let before = selected.clone();
    let shown = if selected.is_empty() { "*".to_string() } else { selected.clone() };
    egui::ComboBox::from_id_source(id)
        .selected_text(shown)
        .width(220.0)
        .show_ui(ui, |ui| {
            ui.selectable_value(selected, String::new(), "*");
            for value in values {
                ui.selectable_value(selected, value.clone(), value.as_str());
            }
        });
    *selected != before
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"
- DIVIDER: "Elements"
- SHELF: main
  content:
    - BOOK: Ag
      content:
        - DIVIDER: "Experimental"
        - PAGE: Johnson
    - BOOK: Cu
      content:
        - PAGE: Babar
        - PAGE: Johnson
- SHELF: empty
  content: []
"#;

    #[test]
    fn selection_starts_at_first_selectable() {
        let catalog = Catalog::parse(CATALOG).unwrap();
        let selection = MaterialSelection::from_catalog(&catalog);
        assert_eq!(selection.path(), Some(MaterialPath::new("main", "Ag", "Johnson")));
    }

    #[test]
    fn changing_book_keeps_valid_page_or_falls_back() {
        let catalog = Catalog::parse(CATALOG).unwrap();
        let mut selection = MaterialSelection::from_catalog(&catalog);

        selection.book = "Cu".to_string();
        selection.normalize(&catalog);
        assert_eq!(selection.page, "Johnson");

        selection.page = "Unknown".to_string();
        selection.normalize(&catalog);
        assert_eq!(selection.page, "Babar");
    }

    #[test]
    fn empty_shelf_has_no_path() {
        let catalog = Catalog::parse(CATALOG).unwrap();
        let mut selection = MaterialSelection::from_catalog(&catalog);
        selection.shelf = "empty".to_string();
        selection.normalize(&catalog);
        assert_eq!(selection.shelf, "empty");
        assert!(selection.book.is_empty());
        assert_eq!(selection.path(), None);
    }

    #[test]
    fn filter_form_parses_dates_and_trims() {
        let form = FilterForm {
            name: "  wafer ".to_string(),
            start_date: "2024-05-01".to_string(),
            shelf: " ".to_string(),
            ..Default::default()
        };
        let filter = form.to_filter().unwrap();
        assert_eq!(filter.name.as_deref(), Some("wafer"));
        assert_eq!(filter.start_date, NaiveDate::from_ymd_opt(2024, 5, 1));
        assert_eq!(filter.end_date, None);
        assert_eq!(filter.shelf, None);
    }

    #[test]
    fn filter_form_rejects_bad_dates() {
        let form = FilterForm {
            end_date: "01.05.2024".to_string(),
            ..Default::default()
        };
        assert!(form.to_filter().unwrap_err().contains("01.05.2024"));
    }
}
