//! Geometry utilities: SO(3) and the navigation-state manifold.

pub mod navstate;
pub mod so3;

pub use navstate::{
    d_pos, d_rot, d_vel, tangent, GenericNavState, MatrixNavState, NavState, UpdateJacobians,
};
pub use so3::{right_jacobian_so3, right_jacobian_so3_inv, skew, Rotation};
