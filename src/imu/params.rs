//! Sensor configuration shared by every preintegration built from one IMU.

use std::sync::Arc;

use nalgebra::{Matrix3, Vector3};

use super::sample::STANDARD_GRAVITY;

/// Symmetry tolerance for covariance checks.
const SYMMETRY_TOLERANCE: f64 = 1e-12;

/// Preintegration parameters.
///
/// Read-only once built; share one `Arc<PreintegrationParams>` between all
/// accumulators fed by the same sensor.
#[derive(Debug, Clone, PartialEq)]
pub struct PreintegrationParams {
    /// Gravity in the navigation frame (m/s^2).
    pub gravity: Vector3<f64>,
    /// Continuous-time gyroscope noise covariance.
    pub gyroscope_covariance: Matrix3<f64>,
    /// Continuous-time accelerometer noise covariance.
    pub accelerometer_covariance: Matrix3<f64>,
    /// Covariance of the error introduced by discrete integration.
    pub integration_covariance: Matrix3<f64>,
}

impl Default for PreintegrationParams {
    fn default() -> Self {
        // Z-up navigation frame, approximate EuRoC noise values
        Self {
            gravity: Vector3::new(0.0, 0.0, -STANDARD_GRAVITY),
            gyroscope_covariance: Matrix3::identity() * 1.7e-4 * 1.7e-4,
            accelerometer_covariance: Matrix3::identity() * 2.0e-3 * 2.0e-3,
            integration_covariance: Matrix3::identity() * 1e-8,
        }
    }
}

impl PreintegrationParams {
    /// Parameters with the given gravity and zero noise covariances.
    pub fn new(gravity: Vector3<f64>) -> Self {
        Self {
            gravity,
            gyroscope_covariance: Matrix3::zeros(),
            accelerometer_covariance: Matrix3::zeros(),
            integration_covariance: Matrix3::zeros(),
        }
    }

    /// Navigation frame with Z pointing down: gravity = (0, 0, g).
    pub fn make_shared_d(g: f64) -> Arc<Self> {
        Arc::new(Self::new(Vector3::new(0.0, 0.0, g)))
    }

    /// Navigation frame with Z pointing up: gravity = (0, 0, -g).
    pub fn make_shared_u(g: f64) -> Arc<Self> {
        Arc::new(Self::new(Vector3::new(0.0, 0.0, -g)))
    }

    pub fn with_gyroscope_sigma(mut self, sigma: f64) -> Self {
        self.gyroscope_covariance = Matrix3::identity() * sigma * sigma;
        self
    }

    pub fn with_accelerometer_sigma(mut self, sigma: f64) -> Self {
        self.accelerometer_covariance = Matrix3::identity() * sigma * sigma;
        self
    }

    pub fn with_integration_covariance(mut self, covariance: Matrix3<f64>) -> Self {
        self.integration_covariance = covariance;
        self
    }

    /// Checks the parameters for values no sensor can produce.
    ///
    /// Accumulators never call this; it is for the code that loads a
    /// configuration before sharing it.
    pub fn validate(&self) -> Result<(), ParamsError> {
        if !self.gravity.iter().all(|g| g.is_finite()) {
            return Err(ParamsError::NonFiniteGravity);
        }

        for (name, covariance) in [
            ("gyroscope", &self.gyroscope_covariance),
            ("accelerometer", &self.accelerometer_covariance),
            ("integration", &self.integration_covariance),
        ] {
            validate_covariance(name, covariance)?;
        }

        Ok(())
    }
}

fn validate_covariance(name: &'static str, covariance: &Matrix3<f64>) -> Result<(), ParamsError> {
    if !covariance.iter().all(|c| c.is_finite()) {
        return Err(ParamsError::NonFiniteCovariance(name));
    }
    if (covariance - covariance.transpose()).amax() > SYMMETRY_TOLERANCE {
        return Err(ParamsError::AsymmetricCovariance(name));
    }
    if let Some(axis) = (0..3).find(|&i| covariance[(i, i)] < 0.0) {
        return Err(ParamsError::NegativeVariance { name, axis });
    }
    Ok(())
}

/// Errors reported by [`PreintegrationParams::validate`].
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ParamsError {
    #[error("gravity vector contains non-finite values")]
    NonFiniteGravity,
    #[error("{0} covariance contains non-finite values")]
    NonFiniteCovariance(&'static str),
    #[error("{0} covariance is not symmetric")]
    AsymmetricCovariance(&'static str),
    #[error("{name} covariance has a negative variance on axis {axis}")]
    NegativeVariance { name: &'static str, axis: usize },
}
