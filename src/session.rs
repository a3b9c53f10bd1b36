// src/session.rs

use crate::backend::CaptureSlot;
use crate::calculation::{calculate_thickness, ExtinctionSource, ThicknessResult};
use crate::database::{Database, NewMeasurement};
use crate::error::MeasureError;
use crate::frame::Frame;
use crate::material::MaterialPath;

use tracing::info;

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRequest {
    pub name: String,
    pub material: MaterialPath,
    pub wavelength_um: f64,
    pub save: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementOutcome {
    pub result: ThicknessResult,
    /// Row id when the measurement was stored.
    pub saved_id: Option<i64>,
}

/// Holds the two captures of one measurement.
#[derive(Debug, Default)]
pub struct MeasurementSession {
    reference: Option<Frame>,
    material: Option<Frame>,
}

impl MeasurementSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_frame(&mut self, slot: CaptureSlot, frame: Frame) {
        *self.slot_mut(slot) = Some(frame);
    }

    pub fn frame(&self, slot: CaptureSlot) -> Option<&Frame> {
        match slot {
            CaptureSlot::Reference => self.reference.as_ref(),
            CaptureSlot::Material => self.material.as_ref(),
        }
    }

    pub fn is_ready(&self) -> bool {
        self.reference.is_some() && self.material.is_some()
    }

    pub fn reset(&mut self) {
        self.reference = None;
        self.material = None;
    }

    fn slot_mut(&mut self, slot: CaptureSlot) -> &mut Option<Frame> {
        match slot {
            CaptureSlot::Reference => &mut self.reference,
            CaptureSlot::Material => &mut self.material,
        }
    }

    fn require(&self, slot: CaptureSlot) -> Result<&Frame, MeasureError> {
        self.frame(slot).ok_or(MeasureError::MissingFrame(slot))
    }

    /// Calculates the layer thickness and, if requested, stores it in `db`.
    pub fn run(
        &self,
        request: &MeasurementRequest,
        source: &dyn ExtinctionSource,
        db: Option<&Database>,
    ) -> Result<MeasurementOutcome, MeasureError> {
        let reference = self.require(CaptureSlot::Reference)?;
        let material = self.require(CaptureSlot::Material)?;

        let result = calculate_thickness(reference, material, &request.material, request.wavelength_um, source)?;

        let saved_id = match db.filter(|_| request.save) {
            Some(db) => {
                let name = request.name.trim();
                let record = NewMeasurement {
                    date: None,
                    name: (!name.is_empty()).then(|| name.to_string()),
                    layer_nm: result.thickness_nm,
                    wavelength_um: Some(request.wavelength_um),
                    ref_image: reference.to_base64_png()?,
                    mat_image: material.to_base64_png()?,
                    shelf: request.material.shelf.clone(),
                    book: request.material.book.clone(),
                    page: request.material.page.clone(),
                };
                let id = db.save_measurement(&record)?;
                info!("Measurement saved with id {id}");
                Some(id)
            }
            None => None,
        };

        Ok(MeasurementOutcome { result, saved_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calculation::tests::FixedK;
    use crate::error::CalcError;
    use approx::assert_abs_diff_eq;

    fn request(save: bool) -> MeasurementRequest {
        MeasurementRequest {
            name: "  ".to_string(),
            material: MaterialPath::new("main", "Cu", "Johnson"),
            wavelength_um: 0.5,
            save,
        }
    }

    fn ready_session() -> MeasurementSession {
        let mut session = MeasurementSession::new();
        session.set_frame(CaptureSlot::Reference, Frame::solid_bgr(8, 8, [200, 200, 200]));
        session.set_frame(CaptureSlot::Material, Frame::solid_bgr(8, 8, [100, 100, 100]));
        session
    }

    #[test]
    fn missing_frames_are_reported_by_slot() {
        let mut session = MeasurementSession::new();
        let err = session.run(&request(false), &FixedK(Ok(0.1)), None).unwrap_err();
        assert!(matches!(err, MeasureError::MissingFrame(CaptureSlot::Reference)));

        session.set_frame(CaptureSlot::Reference, Frame::solid_bgr(2, 2, [9, 9, 9]));
        assert!(!session.is_ready());
        let err = session.run(&request(false), &FixedK(Ok(0.1)), None).unwrap_err();
        assert_eq!(err.to_string(), "no material image captured yet");
    }

    #[test]
    fn calculates_without_saving() {
        let session = ready_session();
        let db = Database::open_in_memory().unwrap();
        let outcome = session.run(&request(false), &FixedK(Ok(0.1)), Some(&db)).unwrap();
        assert_abs_diff_eq!(outcome.result.thickness_nm, 601.3, epsilon = 0.1);
        assert_eq!(outcome.saved_id, None);
        assert_eq!(db.count_measurements(&Default::default()).unwrap(), 0);
    }

    #[test]
    fn saves_with_images_and_null_name() {
        let session = ready_session();
        let db = Database::open_in_memory().unwrap();
        let outcome = session.run(&request(true), &FixedK(Ok(0.1)), Some(&db)).unwrap();
        let id = outcome.saved_id.unwrap();

        let stored = db.get_measurement(id).unwrap().unwrap();
        assert_eq!(stored.name, None);
        assert_eq!(stored.layer_nm, outcome.result.thickness_nm);
        assert_eq!(stored.wavelength_um, Some(0.5));
        assert_eq!((stored.shelf.as_str(), stored.book.as_str(), stored.page.as_str()), ("main", "Cu", "Johnson"));
        let reference = Frame::from_base64(&stored.ref_image).unwrap();
        assert_eq!(reference.mean_gray().unwrap(), 200.0);
    }

    #[test]
    fn calculation_errors_pass_through() {
        let session = ready_session();
        let db = Database::open_in_memory().unwrap();
        let err = session
            .run(&request(true), &FixedK(Err("nope".to_string())), Some(&db))
            .unwrap_err();
        assert!(matches!(err, MeasureError::Calculation(CalcError::Material { .. })));
        assert!(err.to_string().starts_with("Material Error"));
        assert_eq!(db.count_measurements(&Default::default()).unwrap(), 0);
    }

    #[test]
    fn reset_clears_both_frames() {
        let mut session = ready_session();
        assert!(session.is_ready());
        session.reset();
        assert!(session.frame(CaptureSlot::Reference).is_none());
        assert!(session.frame(CaptureSlot::Material).is_none());
    }
}
