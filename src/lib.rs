pub mod geometry;
pub mod imu;
pub mod optimizer;

#[cfg(test)]
mod numerical;

pub use geometry::{GenericNavState, MatrixNavState, NavState, Rotation};
pub use imu::{
    ConstantBias, ImuMeasurement, ManifoldPreintegration, MatrixPreintegration, PreintegrationParams,
};
