//! IMU preintegration: measurements, biases, parameters and the accumulator.

pub mod params;
pub mod preintegration;
pub mod sample;
pub mod types;

pub use params::{ParamsError, PreintegrationParams};
pub use preintegration::{
    ErrorJacobians, GenericPreintegration, ManifoldPreintegration, MatrixPreintegration,
};
pub use sample::{ConstantBias, ImuMeasurement, STANDARD_GRAVITY};
