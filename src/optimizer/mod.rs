//! Optimization building blocks for inertial estimation.
//!
//! Provides the preintegrated IMU factor and the parameter layout used to
//! assemble its Jacobians into a dense system.

pub mod imu_factors;

pub use imu_factors::{mahalanobis_norm_squared, FactorStateLayout, ImuFactor, ImuLinearization};
