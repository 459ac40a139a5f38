//! On-manifold IMU preintegration.
//!
//! Folds raw `(a, ω, dt)` samples into a relative navigation state `Δx_ij`
//! expressed in the body frame at time `i`, and keeps the first-order
//! sensitivity of `Δx_ij` to the bias estimate so the delta can be corrected
//! without re-integrating when the bias is refined.
//!
//! # Bias correction
//!
//! With `D = [∂Δx/∂b_a | ∂Δx/∂b_g]` (9×6, in local coordinates of `Δx_ij`):
//!
//! ```text
//! Δx_ij(b) ≈ Δx_ij ⊞ D · (b - b̂)
//! ```
//!
//! Each sample advances `D` by the chain rule through the navigation-state
//! update (measured = true + bias, so `∂input/∂bias = -I`):
//!
//! ```text
//! D_a' = F · D_a - G_a
//! D_g' = F · D_g - G_ω
//! ```
//!
//! The correction is first order only: its error grows with `|b - b̂|²`, so
//! re-integrate once the bias estimate has moved far from `b̂`.
//!
//! # Residual
//!
//! ```text
//! x̂_j = (R_i ΔR,  p_i + v_i Δt + ½ g Δt² + R_i Δp,  v_i + g Δt + R_i Δv)
//! e   = local_coordinates(x_j, x̂_j)
//! ```

use std::sync::Arc;

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use tracing::{debug, trace};

use super::params::PreintegrationParams;
use super::sample::{ConstantBias, ImuMeasurement};
use super::types::{Matrix9, Matrix93, Matrix96, Vector9};
use crate::geometry::so3::{skew, Rotation};
use crate::geometry::{GenericNavState, UpdateJacobians};

/// Preintegration accumulator generic over the rotation representation.
#[derive(Debug, Clone)]
pub struct GenericPreintegration<R: Rotation> {
    params: Arc<PreintegrationParams>,
    /// Bias estimate the samples are corrected with.
    bias_hat: ConstantBias,
    delta_xij: GenericNavState<R>,
    delta_t_ij: f64,
    /// ∂Δx/∂b_a stacked as [∂R; ∂p; ∂v].
    d_delta_d_bias_acc: Matrix93,
    /// ∂Δx/∂b_g stacked as [∂R; ∂p; ∂v].
    d_delta_d_bias_omega: Matrix93,
}

/// Preintegration with unit-quaternion rotations.
pub type ManifoldPreintegration = GenericPreintegration<UnitQuaternion<f64>>;

/// Preintegration with 3×3 rotation matrices.
pub type MatrixPreintegration = GenericPreintegration<Rotation3<f64>>;

/// Jacobians of [`GenericPreintegration::compute_error`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorJacobians {
    /// ∂e/∂x_i (9×9)
    pub wrt_state_i: Matrix9,
    /// ∂e/∂x_j (9×9)
    pub wrt_state_j: Matrix9,
    /// ∂e/∂b (9×6)
    pub wrt_bias: Matrix96,
}

impl<R: Rotation> GenericPreintegration<R> {
    pub fn new(params: Arc<PreintegrationParams>, bias_hat: ConstantBias) -> Self {
        Self {
            params,
            bias_hat,
            delta_xij: GenericNavState::identity(),
            delta_t_ij: 0.0,
            d_delta_d_bias_acc: Matrix93::zeros(),
            d_delta_d_bias_omega: Matrix93::zeros(),
        }
    }

    /// Back to the idle state: identity delta, zero time, zero bias Jacobians.
    pub fn reset_integration(&mut self) {
        debug!(
            delta_t_ij = self.delta_t_ij,
            "resetting IMU preintegration"
        );
        self.delta_xij = GenericNavState::identity();
        self.delta_t_ij = 0.0;
        self.d_delta_d_bias_acc = Matrix93::zeros();
        self.d_delta_d_bias_omega = Matrix93::zeros();
    }

    pub fn params(&self) -> &Arc<PreintegrationParams> {
        &self.params
    }

    pub fn bias_hat(&self) -> &ConstantBias {
        &self.bias_hat
    }

    pub fn delta_xij(&self) -> &GenericNavState<R> {
        &self.delta_xij
    }

    pub fn delta_rij(&self) -> &R {
        self.delta_xij.rotation()
    }

    pub fn delta_pij(&self) -> &Vector3<f64> {
        self.delta_xij.position()
    }

    pub fn delta_vij(&self) -> &Vector3<f64> {
        self.delta_xij.velocity()
    }

    pub fn delta_t_ij(&self) -> f64 {
        self.delta_t_ij
    }

    pub fn del_r_del_bias_acc(&self) -> Matrix3<f64> {
        self.d_delta_d_bias_acc.fixed_view::<3, 3>(0, 0).into_owned()
    }

    pub fn del_r_del_bias_omega(&self) -> Matrix3<f64> {
        self.d_delta_d_bias_omega.fixed_view::<3, 3>(0, 0).into_owned()
    }

    /// `∂Δp/∂b_a` of the Cartesian `delta_pij()`, in the body frame at `i`.
    pub fn del_p_del_bias_acc(&self) -> Matrix3<f64> {
        self.cartesian_block(&self.d_delta_d_bias_acc, 3)
    }

    /// `∂Δp/∂b_g` of the Cartesian `delta_pij()`, in the body frame at `i`.
    pub fn del_p_del_bias_omega(&self) -> Matrix3<f64> {
        self.cartesian_block(&self.d_delta_d_bias_omega, 3)
    }

    /// `∂Δv/∂b_a` of the Cartesian `delta_vij()`, in the body frame at `i`.
    pub fn del_v_del_bias_acc(&self) -> Matrix3<f64> {
        self.cartesian_block(&self.d_delta_d_bias_acc, 6)
    }

    /// `∂Δv/∂b_g` of the Cartesian `delta_vij()`, in the body frame at `i`.
    pub fn del_v_del_bias_omega(&self) -> Matrix3<f64> {
        self.cartesian_block(&self.d_delta_d_bias_omega, 6)
    }

    // Chart blocks are expressed in the frame of ΔR; rotate them back.
    fn cartesian_block(&self, block: &Matrix93, row: usize) -> Matrix3<f64> {
        self.delta_rij().matrix() * block.fixed_view::<3, 3>(row, 0)
    }

    /// Full bias Jacobian `[∂Δx/∂b_a | ∂Δx/∂b_g]` (9×6) in local coordinates
    /// of `Δx_ij`, the form [`Self::bias_corrected_delta`] retracts with.
    pub fn bias_jacobian(&self) -> Matrix96 {
        let mut d = Matrix96::zeros();
        d.fixed_view_mut::<9, 3>(0, 0).copy_from(&self.d_delta_d_bias_acc);
        d.fixed_view_mut::<9, 3>(0, 3).copy_from(&self.d_delta_d_bias_omega);
        d
    }

    /// Integrates one raw IMU sample.
    ///
    /// Samples must arrive in chronological order; `dt` must be positive.
    pub fn update(&mut self, measured_acc: &Vector3<f64>, measured_omega: &Vector3<f64>, dt: f64) {
        self.update_with_jacobians(measured_acc, measured_omega, dt);
    }

    /// [`Self::update`] returning the Jacobians of the new delta w.r.t. the
    /// previous delta, the measured acceleration and the measured angular rate.
    pub fn update_with_jacobians(
        &mut self,
        measured_acc: &Vector3<f64>,
        measured_omega: &Vector3<f64>,
        dt: f64,
    ) -> UpdateJacobians {
        let acc = self.bias_hat.correct_accelerometer(measured_acc);
        let omega = self.bias_hat.correct_gyroscope(measured_omega);

        // The delta lives in the body frame at i; gravity enters in predict().
        let (delta_xij, jacobians) =
            self.delta_xij
                .update_with_jacobians(&acc, &omega, &Vector3::zeros(), dt);

        self.d_delta_d_bias_acc =
            jacobians.wrt_state * self.d_delta_d_bias_acc - jacobians.wrt_acc;
        self.d_delta_d_bias_omega =
            jacobians.wrt_state * self.d_delta_d_bias_omega - jacobians.wrt_omega;
        self.delta_xij = delta_xij;
        self.delta_t_ij += dt;

        trace!(dt, delta_t_ij = self.delta_t_ij, "integrated IMU sample");

        jacobians
    }

    /// Integrates a batch of samples in order.
    pub fn integrate_measurements(&mut self, measurements: &[ImuMeasurement]) {
        for m in measurements {
            self.update(&m.acc, &m.omega, m.dt);
        }
        debug!(
            samples = measurements.len(),
            delta_t_ij = self.delta_t_ij,
            "integrated IMU batch"
        );
    }

    /// Delta corrected to first order for a new bias estimate.
    pub fn bias_corrected_delta(&self, bias: &ConstantBias) -> GenericNavState<R> {
        let xi = self.bias_jacobian() * (*bias - self.bias_hat).vector();
        self.delta_xij.retract(&xi)
    }

    /// [`Self::bias_corrected_delta`] plus its Jacobian w.r.t. the bias (9×6).
    pub fn bias_corrected_delta_with_jacobians(
        &self,
        bias: &ConstantBias,
    ) -> (GenericNavState<R>, Matrix96) {
        let d = self.bias_jacobian();
        let xi = d * (*bias - self.bias_hat).vector();
        let (corrected, _, h_xi) = self.delta_xij.retract_with_jacobians(&xi);
        (corrected, h_xi * d)
    }

    /// State at `j` predicted from the state at `i` and a bias estimate.
    pub fn predict(&self, state_i: &GenericNavState<R>, bias: &ConstantBias) -> GenericNavState<R> {
        let delta = self.bias_corrected_delta(bias);
        self.compose_delta(state_i, &delta)
    }

    /// [`Self::predict`] plus its Jacobians w.r.t. `state_i` (9×9) and the bias (9×6).
    pub fn predict_with_jacobians(
        &self,
        state_i: &GenericNavState<R>,
        bias: &ConstantBias,
    ) -> (GenericNavState<R>, Matrix9, Matrix96) {
        let (delta, h_delta_bias) = self.bias_corrected_delta_with_jacobians(bias);
        let predicted = self.compose_delta(state_i, &delta);

        let d_rt = delta.rotation().matrix().transpose();
        let mut h_state = Matrix9::zeros();
        h_state.fixed_view_mut::<3, 3>(0, 0).copy_from(&d_rt);
        h_state
            .fixed_view_mut::<3, 3>(3, 0)
            .copy_from(&(-d_rt * skew(delta.position())));
        h_state.fixed_view_mut::<3, 3>(3, 3).copy_from(&d_rt);
        h_state
            .fixed_view_mut::<3, 3>(3, 6)
            .copy_from(&(self.delta_t_ij * d_rt));
        h_state
            .fixed_view_mut::<3, 3>(6, 0)
            .copy_from(&(-d_rt * skew(delta.velocity())));
        h_state.fixed_view_mut::<3, 3>(6, 6).copy_from(&d_rt);

        // ∂x̂_j/∂Δx is the identity in this chart.
        (predicted, h_state, h_delta_bias)
    }

    /// Residual between the actual state at `j` and the one predicted from `i`.
    ///
    /// Zero when the two states are consistent with the corrected delta.
    pub fn compute_error(
        &self,
        state_i: &GenericNavState<R>,
        state_j: &GenericNavState<R>,
        bias: &ConstantBias,
    ) -> Vector9 {
        let predicted = self.predict(state_i, bias);
        state_j.local_coordinates(&predicted)
    }

    /// [`Self::compute_error`] plus its Jacobians w.r.t. both states and the bias.
    ///
    /// Degenerates when the rotation error nears π (see
    /// [`crate::geometry::right_jacobian_so3_inv`]).
    pub fn compute_error_with_jacobians(
        &self,
        state_i: &GenericNavState<R>,
        state_j: &GenericNavState<R>,
        bias: &ConstantBias,
    ) -> (Vector9, ErrorJacobians) {
        let (predicted, h_predict_state, h_predict_bias) =
            self.predict_with_jacobians(state_i, bias);
        let (error, h_error_state_j, h_error_predict) =
            state_j.local_coordinates_with_jacobians(&predicted);

        (
            error,
            ErrorJacobians {
                wrt_state_i: h_error_predict * h_predict_state,
                wrt_state_j: h_error_state_j,
                wrt_bias: h_error_predict * h_predict_bias,
            },
        )
    }

    fn compose_delta(
        &self,
        state_i: &GenericNavState<R>,
        delta: &GenericNavState<R>,
    ) -> GenericNavState<R> {
        let dt = self.delta_t_ij;
        let gravity = &self.params.gravity;
        let r_i = state_i.rotation();

        GenericNavState::new(
            r_i.compose(delta.rotation()),
            state_i.position()
                + state_i.velocity() * dt
                + 0.5 * gravity * dt * dt
                + r_i.rotate(delta.position()),
            state_i.velocity() + gravity * dt + r_i.rotate(delta.velocity()),
        )
    }
}
