// src/calculation.rs
//
// Layer thickness from a reference (no sample) and a material (sample in the
// beam path) capture, after Beer-Lambert: I = I0 * exp(-alpha * x).

use crate::error::{CalcError, MaterialError};
use crate::frame::Frame;
use crate::material::MaterialPath;

use std::f64::consts::PI;
use tracing::{debug, info};

const CM_PER_UM: f64 = 1e-4;
const NM_PER_CM: f64 = 1e7;

/// Anything that can report the extinction coefficient k of a material.
pub trait ExtinctionSource {
    fn extinction_coefficient(&self, path: &MaterialPath, wavelength_um: f64) -> Result<f64, MaterialError>;
}

/// Undo the sRGB transfer curve on a 0-255 gray value.
pub fn linearize(gray: f64) -> f64 {
    ((gray / 255.0 + 0.055) / 1.005).powf(2.4)
}

/// Absorption coefficient alpha in cm^-1 from k and the wavelength in µm.
pub fn absorption_coefficient(k: f64, wavelength_um: f64) -> Result<f64, CalcError> {
    if wavelength_um <= 0.0 || wavelength_um.is_nan() {
        return Err(CalcError::InvalidWavelength(wavelength_um));
    }
    Ok(4.0 * PI * k / (wavelength_um * CM_PER_UM))
}

/// Thickness in nm from the transmitted and incident (linear) intensities.
pub fn thickness_nm(transmitted: f64, incident: f64, alpha: f64) -> Result<f64, CalcError> {
    if transmitted == 0.0 || incident == 0.0 || alpha == 0.0 {
        return Err(CalcError::DivisionByZero);
    }
    let x_cm = (incident / transmitted).ln() / alpha;
    Ok(x_cm * NM_PER_CM)
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThicknessResult {
    pub thickness_nm: f64,
    pub k: f64,
    pub alpha_per_cm: f64,
    pub reference_gray: f64,
    pub material_gray: f64,
    pub reference_linear: f64,
    pub material_linear: f64,
}

pub fn calculate_thickness(
    reference: &Frame,
    material: &Frame,
    path: &MaterialPath,
    wavelength_um: f64,
    source: &dyn ExtinctionSource,
) -> Result<ThicknessResult, CalcError> {
    let reference_gray = reference.mean_gray()?;
    let material_gray = material.mean_gray()?;
    debug!("Mean gray: reference {reference_gray:.3}, material {material_gray:.3}");

    let reference_linear = linearize(reference_gray);
    let material_linear = linearize(material_gray);

    let k = source
        .extinction_coefficient(path, wavelength_um)
        .map_err(|source| CalcError::Material {
            path: path.clone(),
            source,
        })?;

    let alpha = absorption_coefficient(k, wavelength_um)?;
    let thickness = thickness_nm(material_linear, reference_linear, alpha)?;
    info!("Layer thickness for {path} at {wavelength_um} µm: {thickness:.2} nm (k={k}, alpha={alpha:.1}/cm)");

    Ok(ThicknessResult {
        thickness_nm: thickness,
        k,
        alpha_per_cm: alpha,
        reference_gray,
        material_gray,
        reference_linear,
        material_linear,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    /// Extinction source with a fixed answer.
    pub(crate) struct FixedK(pub Result<f64, String>);

    impl ExtinctionSource for FixedK {
        fn extinction_coefficient(&self, _: &MaterialPath, _: f64) -> Result<f64, MaterialError> {
            self.0.clone().map_err(MaterialError::UnknownMaterial)
        }
    }

    fn frames() -> (Frame, Frame) {
        (
            Frame::solid_bgr(10, 10, [200, 200, 200]),
            Frame::solid_bgr(10, 10, [100, 100, 100]),
        )
    }

    #[test]
    fn linearize_known_values() {
        assert_abs_diff_eq!(linearize(200.0), 0.64896, epsilon = 1e-4);
        assert_abs_diff_eq!(linearize(100.0), 0.14318, epsilon = 1e-4);
        assert_abs_diff_eq!(linearize(255.0), 1.12358, epsilon = 1e-4);
        assert_abs_diff_eq!(linearize(0.0), 0.00093, epsilon = 1e-4);
    }

    #[test]
    fn alpha_from_k_and_wavelength() {
        assert_abs_diff_eq!(absorption_coefficient(0.1, 0.5).unwrap(), 25132.74, epsilon = 1e-2);
        assert_eq!(absorption_coefficient(0.0, 0.5).unwrap(), 0.0);
        assert!(matches!(
            absorption_coefficient(0.1, 0.0),
            Err(CalcError::InvalidWavelength(_))
        ));
        assert!(absorption_coefficient(0.1, -1.0).is_err());
    }

    #[test]
    fn thickness_from_intensities() {
        let x = thickness_nm(0.1517, 0.6515, 25132.74).unwrap();
        assert_abs_diff_eq!(x, 579.9, epsilon = 0.1);
    }

    #[test]
    fn zero_inputs_are_division_errors() {
        assert!(matches!(thickness_nm(0.0, 0.6, 25000.0), Err(CalcError::DivisionByZero)));
        assert!(matches!(thickness_nm(0.1, 0.0, 25000.0), Err(CalcError::DivisionByZero)));
        assert!(matches!(thickness_nm(0.1, 0.6, 0.0), Err(CalcError::DivisionByZero)));
    }

    #[test]
    fn full_pipeline() {
        let (reference, material) = frames();
        let path = MaterialPath::new("test_shelf", "test_book", "test_page");
        let result = calculate_thickness(&reference, &material, &path, 0.5, &FixedK(Ok(0.1))).unwrap();

        assert_eq!(result.reference_gray, 200.0);
        assert_eq!(result.material_gray, 100.0);
        assert_abs_diff_eq!(result.thickness_nm, 601.3, epsilon = 0.1);
    }

    #[test]
    fn material_lookup_failure_names_the_path() {
        let (reference, material) = frames();
        let path = MaterialPath::new("fail", "fail", "fail");
        let err = calculate_thickness(
            &reference,
            &material,
            &path,
            0.5,
            &FixedK(Err("Mock Material Error".to_string())),
        )
        .unwrap_err();

        let msg = err.to_string();
        assert!(msg.contains("Material Error"));
        assert!(msg.contains("fail/fail/fail"));
        assert!(msg.contains("Mock Material Error"));
    }

    #[test]
    fn zero_wavelength_is_a_math_error() {
        let (reference, material) = frames();
        let path = MaterialPath::new("a", "b", "c");
        let err = calculate_thickness(&reference, &material, &path, 0.0, &FixedK(Ok(0.1))).unwrap_err();
        assert!(err.to_string().contains("Math Error"));
        assert!(err.to_string().contains("wavelength must be greater than 0"));
    }

    #[test]
    fn zero_k_is_a_calculation_error() {
        let (reference, material) = frames();
        let path = MaterialPath::new("a", "b", "c");
        let err = calculate_thickness(&reference, &material, &path, 0.5, &FixedK(Ok(0.0))).unwrap_err();
        assert!(err.to_string().contains("Calculation Error"));
        assert!(err.to_string().contains("Division by zero"));
    }
}
