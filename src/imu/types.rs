//! Type aliases for the fixed-size blocks used by preintegration.
//!
//! Every 9-dimensional tangent vector and every 9-row/9-column Jacobian is
//! ordered [δθ, δp, δv]: rotation, position, velocity. Bias 6-vectors are
//! ordered [accelerometer, gyroscope].

use nalgebra::{SMatrix, SVector};

/// 9×9 Jacobian (state w.r.t. state).
pub type Matrix9 = SMatrix<f64, 9, 9>;

/// 9-dimensional tangent vector [δθ, δp, δv].
pub type Vector9 = SVector<f64, 9>;

/// 9×3 Jacobian (state w.r.t. an acceleration or angular-velocity input).
pub type Matrix93 = SMatrix<f64, 9, 3>;

/// 9×6 Jacobian (state or residual w.r.t. the [accel, gyro] bias).
pub type Matrix96 = SMatrix<f64, 9, 6>;

/// 6-dimensional bias vector [b_a, b_g].
pub type Vector6 = SVector<f64, 6>;
