//! Navigation state: a point on the 9-DOF manifold SO(3) × ℝ³ × ℝ³.
//!
//! # Chart
//!
//! Tangent vectors are ordered `[δθ, δp, δv]` and expressed in the body frame
//! of the state they are attached to:
//!
//! ```text
//! retract(x, ξ)         = (R · Exp(ξ_θ),  p + R · ξ_p,  v + R · ξ_v)
//! local_coordinates(x, y) = (Log(Rₓᵀ R_y), Rₓᵀ (p_y - pₓ), Rₓᵀ (v_y - vₓ))
//! ```
//!
//! `local_coordinates(x, retract(x, ξ)) = ξ` for `|ξ_θ| < π`. All Jacobians in
//! this module are exact derivatives in this chart.
//!
//! # IMU update
//!
//! ```text
//! R' = R · Exp(ω dt)
//! v' = v + (R a + g) dt
//! p' = p + v dt + ½ (R a + g) dt²
//! ```

use nalgebra::{Matrix3, Rotation3, SMatrix, UnitQuaternion, Vector3};

use super::so3::{right_jacobian_so3, right_jacobian_so3_inv, skew, Rotation};
use crate::imu::types::{Matrix9, Matrix93, Vector9};

/// Navigation state generic over the rotation representation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenericNavState<R: Rotation> {
    rotation: R,
    position: Vector3<f64>,
    velocity: Vector3<f64>,
}

/// Navigation state backed by a unit quaternion.
pub type NavState = GenericNavState<UnitQuaternion<f64>>;

/// Navigation state backed by a 3×3 rotation matrix.
pub type MatrixNavState = GenericNavState<Rotation3<f64>>;

/// Jacobians of [`GenericNavState::update`] in local coordinates of the new state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateJacobians {
    /// ∂x' / ∂x (9×9)
    pub wrt_state: Matrix9,
    /// ∂x' / ∂a (9×3)
    pub wrt_acc: Matrix93,
    /// ∂x' / ∂ω (9×3)
    pub wrt_omega: Matrix93,
}

/// Rotation block `[δθ]` of a tangent vector.
#[inline]
pub fn d_rot(xi: &Vector9) -> Vector3<f64> {
    xi.fixed_rows::<3>(0).into_owned()
}

/// Position block `[δp]` of a tangent vector.
#[inline]
pub fn d_pos(xi: &Vector9) -> Vector3<f64> {
    xi.fixed_rows::<3>(3).into_owned()
}

/// Velocity block `[δv]` of a tangent vector.
#[inline]
pub fn d_vel(xi: &Vector9) -> Vector3<f64> {
    xi.fixed_rows::<3>(6).into_owned()
}

/// Stacks rotation, position and velocity blocks into a tangent vector.
pub fn tangent(d_r: &Vector3<f64>, d_p: &Vector3<f64>, d_v: &Vector3<f64>) -> Vector9 {
    let mut xi = Vector9::zeros();
    xi.fixed_rows_mut::<3>(0).copy_from(d_r);
    xi.fixed_rows_mut::<3>(3).copy_from(d_p);
    xi.fixed_rows_mut::<3>(6).copy_from(d_v);
    xi
}

#[inline]
fn set_block<const C: usize>(
    m: &mut SMatrix<f64, 9, C>,
    row: usize,
    col: usize,
    block: &Matrix3<f64>,
) {
    m.fixed_view_mut::<3, 3>(row, col).copy_from(block);
}

impl<R: Rotation> GenericNavState<R> {
    pub fn new(rotation: R, position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        Self {
            rotation,
            position,
            velocity,
        }
    }

    /// Identity rotation, zero position, zero velocity.
    pub fn identity() -> Self {
        Self::new(R::identity(), Vector3::zeros(), Vector3::zeros())
    }

    pub fn rotation(&self) -> &R {
        &self.rotation
    }

    pub fn position(&self) -> &Vector3<f64> {
        &self.position
    }

    pub fn velocity(&self) -> &Vector3<f64> {
        &self.velocity
    }

    pub fn rotation_matrix(&self) -> Matrix3<f64> {
        self.rotation.matrix()
    }

    /// Velocity expressed in the body frame, `Rᵀ v`.
    pub fn body_velocity(&self) -> Vector3<f64> {
        self.rotation.unrotate(&self.velocity)
    }

    /// True when `other` is within `tol` of `self` in local coordinates.
    pub fn equals(&self, other: &Self, tol: f64) -> bool {
        self.local_coordinates(other).amax() <= tol
    }

    /// Moves along the tangent vector `xi` (body-frame chart).
    pub fn retract(&self, xi: &Vector9) -> Self {
        let r = &self.rotation;
        Self::new(
            r.compose(&R::expmap(&d_rot(xi))),
            self.position + r.rotate(&d_pos(xi)),
            self.velocity + r.rotate(&d_vel(xi)),
        )
    }

    /// [`Self::retract`] plus its Jacobians w.r.t. the state and w.r.t. `xi`.
    pub fn retract_with_jacobians(&self, xi: &Vector9) -> (Self, Matrix9, Matrix9) {
        let omega = d_rot(xi);
        let incr_t = R::expmap(&omega).matrix().transpose();

        let mut h_state = Matrix9::zeros();
        set_block(&mut h_state, 0, 0, &incr_t);
        set_block(&mut h_state, 3, 0, &(-incr_t * skew(&d_pos(xi))));
        set_block(&mut h_state, 3, 3, &incr_t);
        set_block(&mut h_state, 6, 0, &(-incr_t * skew(&d_vel(xi))));
        set_block(&mut h_state, 6, 6, &incr_t);

        let mut h_xi = Matrix9::zeros();
        set_block(&mut h_xi, 0, 0, &right_jacobian_so3(&omega));
        set_block(&mut h_xi, 3, 3, &incr_t);
        set_block(&mut h_xi, 6, 6, &incr_t);

        (self.retract(xi), h_state, h_xi)
    }

    /// Tangent vector taking `self` to `other`; inverse of [`Self::retract`].
    pub fn local_coordinates(&self, other: &Self) -> Vector9 {
        let r = &self.rotation;
        tangent(
            &r.between(&other.rotation).logmap(),
            &r.unrotate(&(other.position - self.position)),
            &r.unrotate(&(other.velocity - self.velocity)),
        )
    }

    /// [`Self::local_coordinates`] plus its Jacobians w.r.t. `self` and `other`.
    ///
    /// The rotation blocks use Jr⁻¹ of the relative rotation, which diverges as
    /// its angle approaches π; keep the two states well within half a turn.
    pub fn local_coordinates_with_jacobians(&self, other: &Self) -> (Vector9, Matrix9, Matrix9) {
        let xi = self.local_coordinates(other);
        let phi = d_rot(&xi);
        let delta_r = self.rotation.between(&other.rotation).matrix();
        let jr_inv = right_jacobian_so3_inv(&phi);
        let identity = Matrix3::identity();

        let mut h_self = Matrix9::zeros();
        set_block(&mut h_self, 0, 0, &(-jr_inv * delta_r.transpose()));
        set_block(&mut h_self, 3, 0, &skew(&d_pos(&xi)));
        set_block(&mut h_self, 3, 3, &(-identity));
        set_block(&mut h_self, 6, 0, &skew(&d_vel(&xi)));
        set_block(&mut h_self, 6, 6, &(-identity));

        let mut h_other = Matrix9::zeros();
        set_block(&mut h_other, 0, 0, &jr_inv);
        set_block(&mut h_other, 3, 3, &delta_r);
        set_block(&mut h_other, 6, 6, &delta_r);

        (xi, h_self, h_other)
    }

    /// Advances the state by one IMU sample.
    ///
    /// `acc` and `omega` are body-frame specific force and angular velocity,
    /// `gravity` is expressed in the navigation frame. The preintegrated delta
    /// is advanced with zero gravity since it lives in the body frame of the
    /// interval start. `dt` must be positive.
    pub fn update(
        &self,
        acc: &Vector3<f64>,
        omega: &Vector3<f64>,
        gravity: &Vector3<f64>,
        dt: f64,
    ) -> Self {
        let nav_acc = self.rotation.rotate(acc) + gravity;
        Self::new(
            self.rotation.compose(&R::expmap(&(omega * dt))),
            self.position + self.velocity * dt + 0.5 * nav_acc * dt * dt,
            self.velocity + nav_acc * dt,
        )
    }

    /// [`Self::update`] plus the Jacobians w.r.t. the old state, `acc` and `omega`.
    ///
    /// Gravity is a constant offset and drops out of every Jacobian.
    pub fn update_with_jacobians(
        &self,
        acc: &Vector3<f64>,
        omega: &Vector3<f64>,
        gravity: &Vector3<f64>,
        dt: f64,
    ) -> (Self, UpdateJacobians) {
        let theta = omega * dt;
        let incr_t = R::expmap(&theta).matrix().transpose();
        let dt22 = 0.5 * dt * dt;
        let incr_t_acc_skew = incr_t * skew(acc);

        let mut wrt_state = Matrix9::zeros();
        set_block(&mut wrt_state, 0, 0, &incr_t);
        set_block(&mut wrt_state, 3, 0, &(-dt22 * incr_t_acc_skew));
        set_block(&mut wrt_state, 3, 3, &incr_t);
        set_block(&mut wrt_state, 3, 6, &(dt * incr_t));
        set_block(&mut wrt_state, 6, 0, &(-dt * incr_t_acc_skew));
        set_block(&mut wrt_state, 6, 6, &incr_t);

        let mut wrt_acc = Matrix93::zeros();
        set_block(&mut wrt_acc, 3, 0, &(dt22 * incr_t));
        set_block(&mut wrt_acc, 6, 0, &(dt * incr_t));

        let mut wrt_omega = Matrix93::zeros();
        set_block(&mut wrt_omega, 0, 0, &(dt * right_jacobian_so3(&theta)));

        (
            self.update(acc, omega, gravity, dt),
            UpdateJacobians {
                wrt_state,
                wrt_acc,
                wrt_omega,
            },
        )
    }
}

impl<R: Rotation> Default for GenericNavState<R> {
    fn default() -> Self {
        Self::identity()
    }
}
