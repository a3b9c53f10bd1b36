// src/backend.rs

use crate::config::{
    DEFAULT_CONNECT_ATTEMPTS, DEFAULT_EXPOSURE_MS, DEFAULT_RETRY_DELAY_MS, EXPOSURE_MAX_MS, EXPOSURE_MIN_MS,
};
use crate::error::CameraError;
use crate::frame::Frame;

use crossbeam_channel::{unbounded, Receiver, Sender};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// File extensions the folder camera accepts.
pub const SUPPORTED_EXTENSIONS: [&str; 7] = ["png", "bmp", "jpg", "jpeg", "tif", "tiff", "ltf"];

#[derive(Debug, Clone, PartialEq)]
pub struct CameraInfo {
    pub name: String,
    pub frame_count: usize,
}

/// A source of frames. Vendor drivers sit behind this trait.
pub trait Camera: Send {
    fn connect(&mut self) -> Result<CameraInfo, CameraError>;
    fn is_connected(&self) -> bool;
    /// Applies the exposure time and returns the value actually used.
    fn set_exposure(&mut self, ms: f64) -> Result<f64, CameraError>;
    fn capture(&mut self) -> Result<Frame, CameraError>;
    fn disconnect(&mut self);
}

/// Camera backed by a folder of image files (simulation mode). Frames are
/// served in file-name order and wrap around.
pub struct FolderCamera {
    dir: Option<PathBuf>,
    files: Vec<PathBuf>,
    next: usize,
    exposure_ms: f64,
    connected: bool,
}

impl FolderCamera {
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            files: Vec::new(),
            next: 0,
            exposure_ms: DEFAULT_EXPOSURE_MS,
            connected: false,
        }
    }

    pub fn exposure_ms(&self) -> f64 {
        self.exposure_ms
    }
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| SUPPORTED_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl Camera for FolderCamera {
    fn connect(&mut self) -> Result<CameraInfo, CameraError> {
        let dir = self.dir.as_ref().ok_or(CameraError::NoSource)?;
        if !dir.is_dir() {
            return Err(CameraError::SourceMissing(dir.clone()));
        }

        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && is_supported(&path) {
                files.push(path);
            }
        }
        if files.is_empty() {
            return Err(CameraError::NoFrames(dir.clone()));
        }
        files.sort();

        info!("Folder camera connected: {} frames in {}", files.len(), dir.display());
        self.files = files;
        self.next = 0;
        self.connected = true;
        Ok(CameraInfo {
            name: format!("Folder {}", dir.display()),
            frame_count: self.files.len(),
        })
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn set_exposure(&mut self, ms: f64) -> Result<f64, CameraError> {
        if !self.connected {
            return Err(CameraError::NotConnected);
        }
        let clamped = if ms.is_nan() { self.exposure_ms } else { ms.clamp(EXPOSURE_MIN_MS, EXPOSURE_MAX_MS) };
        if clamped != ms {
            warn!("Exposure {ms} ms clamped to {clamped} ms");
        }
        self.exposure_ms = clamped;
        Ok(clamped)
    }

    fn capture(&mut self) -> Result<Frame, CameraError> {
        if !self.connected {
            return Err(CameraError::NotConnected);
        }
        let path = &self.files[self.next % self.files.len()];
        self.next = (self.next + 1) % self.files.len();
        debug!("Capturing {}", path.display());
        Frame::open(path).map_err(|source| CameraError::Frame {
            path: path.clone(),
            source,
        })
    }

    fn disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            self.files.clear();
            info!("Folder camera disconnected");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_CONNECT_ATTEMPTS,
            delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

/// Tries to connect up to `policy.attempts` times (at least once).
pub fn connect_with_retry(camera: &mut dyn Camera, policy: RetryPolicy) -> Result<CameraInfo, CameraError> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match camera.connect() {
            Ok(info) => return Ok(info),
            Err(e) => {
                warn!("Camera connect attempt {attempt}/{attempts} failed: {e}");
                if attempt >= attempts {
                    return Err(e);
                }
            }
        }
        attempt += 1;
        thread::sleep(policy.delay);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaptureSlot {
    Reference,
    Material,
}

impl fmt::Display for CaptureSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureSlot::Reference => write!(f, "reference"),
            CaptureSlot::Material => write!(f, "material"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CameraCommand {
    Connect(RetryPolicy),
    SetExposure(f64),
    Capture(CaptureSlot),
    Disconnect,
    Shutdown,
}

#[derive(Debug)]
pub enum CameraEvent {
    Connected(CameraInfo),
    ConnectFailed(String),
    ExposureSet(f64),
    Captured { slot: CaptureSlot, frame: Frame },
    CaptureFailed { slot: CaptureSlot, message: String },
    Disconnected,
}

/// Runs a camera on its own thread. Commands go in, events come out; the UI
/// polls [`CameraWorker::try_recv`] once per frame.
pub struct CameraWorker {
    commands: Sender<CameraCommand>,
    events: Receiver<CameraEvent>,
    handle: Option<JoinHandle<()>>,
}

impl CameraWorker {
    pub fn spawn(camera: Box<dyn Camera>) -> Self {
        let (cmd_tx, cmd_rx) = unbounded();
        let (evt_tx, evt_rx) = unbounded();
        let handle = thread::spawn(move || run_camera_loop(camera, cmd_rx, evt_tx));
        Self {
            commands: cmd_tx,
            events: evt_rx,
            handle: Some(handle),
        }
    }

    pub fn send(&self, cmd: CameraCommand) {
        if self.commands.send(cmd).is_err() {
            error!("Camera thread is gone, dropping {cmd:?}");
        }
    }

    pub fn try_recv(&self) -> Option<CameraEvent> {
        self.events.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<CameraEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Asks the thread to stop without waiting for it. A connect retry in
    /// progress finishes in the background and the thread then exits.
    pub fn detach(mut self) {
        let _ = self.commands.send(CameraCommand::Shutdown);
        if self.handle.take().is_some() {
            debug!("Camera thread detached");
        }
    }
}

impl Drop for CameraWorker {
    fn drop(&mut self) {
        let _ = self.commands.send(CameraCommand::Shutdown);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("Camera thread panicked");
            }
        }
    }
}

fn run_camera_loop(mut camera: Box<dyn Camera>, commands: Receiver<CameraCommand>, events: Sender<CameraEvent>) {
    debug!("Camera thread started");
    for cmd in commands.iter() {
        let event = match cmd {
            CameraCommand::Connect(policy) => match connect_with_retry(camera.as_mut(), policy) {
                Ok(info) => CameraEvent::Connected(info),
                Err(e) => CameraEvent::ConnectFailed(e.to_string()),
            },
            CameraCommand::SetExposure(ms) => match camera.set_exposure(ms) {
                Ok(applied) => CameraEvent::ExposureSet(applied),
                Err(e) => {
                    warn!("Set exposure failed: {e}");
                    continue;
                }
            },
            CameraCommand::Capture(slot) => match camera.capture() {
                Ok(frame) => CameraEvent::Captured { slot, frame },
                Err(e) => {
                    error!("Capture of {slot} image failed: {e}");
                    CameraEvent::CaptureFailed {
                        slot,
                        message: e.to_string(),
                    }
                }
            },
            CameraCommand::Disconnect => {
                camera.disconnect();
                CameraEvent::Disconnected
            }
            CameraCommand::Shutdown => break,
        };
        if events.send(event).is_err() {
            break;
        }
    }
    camera.disconnect();
    debug!("Camera thread stopped");
}
