use std::ops::{Add, Neg, Sub};

use nalgebra::Vector3;

use super::types::Vector6;

/// Standard gravity magnitude (m/s^2).
pub const STANDARD_GRAVITY: f64 = 9.81;

/// Constant IMU biases over one preintegration interval.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ConstantBias {
    pub accelerometer: Vector3<f64>,
    pub gyroscope: Vector3<f64>,
}

impl ConstantBias {
    pub fn new(accelerometer: Vector3<f64>, gyroscope: Vector3<f64>) -> Self {
        Self {
            accelerometer,
            gyroscope,
        }
    }

    pub fn zero() -> Self {
        Self::default()
    }

    /// Stacked `[b_a; b_g]`.
    pub fn vector(&self) -> Vector6 {
        let mut v = Vector6::zeros();
        v.fixed_rows_mut::<3>(0).copy_from(&self.accelerometer);
        v.fixed_rows_mut::<3>(3).copy_from(&self.gyroscope);
        v
    }

    pub fn from_vector(v: &Vector6) -> Self {
        Self::new(
            v.fixed_rows::<3>(0).into_owned(),
            v.fixed_rows::<3>(3).into_owned(),
        )
    }

    /// Removes the bias from a raw accelerometer reading.
    pub fn correct_accelerometer(&self, measurement: &Vector3<f64>) -> Vector3<f64> {
        measurement - self.accelerometer
    }

    /// Removes the bias from a raw gyroscope reading.
    pub fn correct_gyroscope(&self, measurement: &Vector3<f64>) -> Vector3<f64> {
        measurement - self.gyroscope
    }
}

impl Add for ConstantBias {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.accelerometer + rhs.accelerometer,
            self.gyroscope + rhs.gyroscope,
        )
    }
}

impl Sub for ConstantBias {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(
            self.accelerometer - rhs.accelerometer,
            self.gyroscope - rhs.gyroscope,
        )
    }
}

impl Neg for ConstantBias {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.accelerometer, -self.gyroscope)
    }
}

/// Single IMU measurement with the time step it covers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImuMeasurement {
    /// Specific force in body frame (m/s^2).
    pub acc: Vector3<f64>,
    /// Angular velocity in body frame (rad/s).
    pub omega: Vector3<f64>,
    /// Integration step (s), must be positive.
    pub dt: f64,
}

impl ImuMeasurement {
    pub fn new(acc: Vector3<f64>, omega: Vector3<f64>, dt: f64) -> Self {
        Self { acc, omega, dt }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bias_vector_layout() {
        let bias = ConstantBias::new(Vector3::new(1.0, 2.0, 3.0), Vector3::new(4.0, 5.0, 6.0));
        let v = bias.vector();

        assert_eq!(v.as_slice(), &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(ConstantBias::from_vector(&v), bias);
    }

    #[test]
    fn test_bias_arithmetic() {
        let a = ConstantBias::new(Vector3::new(0.125, 0.25, 0.375), Vector3::new(-0.5, 0.0, 0.5));
        let b = ConstantBias::new(Vector3::new(0.5, 0.5, 0.5), Vector3::new(1.0, 1.0, 1.0));

        assert_eq!((a + b) - b, a);
        assert_eq!(a + (-a), ConstantBias::zero());
    }

    #[test]
    fn test_bias_correction() {
        let bias = ConstantBias::new(Vector3::new(0.25, 0.0, -0.5), Vector3::new(0.01, 0.02, 0.03));

        assert_eq!(
            bias.correct_accelerometer(&Vector3::new(1.0, 1.0, 1.0)),
            Vector3::new(0.75, 1.0, 1.5)
        );
        assert_eq!(
            bias.correct_gyroscope(&Vector3::new(0.01, 0.02, 0.03)),
            Vector3::zeros()
        );
    }
}
