//! Preintegrated IMU factor for inertial optimization.
//!
//! One factor constrains the navigation states at keyframes `i` and `j`
//! and the bias shared by the interval:
//!
//! ```text
//! r_imu = local_coordinates(x_j, predict(x_i, b))    // [δθ (3), δp (3), δv (3)]
//! ```
//!
//! Jacobians are exact in the same local charts the optimizer retracts with.

use nalgebra::{DMatrix, SMatrix};
use tracing::debug;

use crate::geometry::NavState;
use crate::imu::types::{Matrix9, Matrix96, Vector9};
use crate::imu::{ConstantBias, ManifoldPreintegration};

/// Residual and Jacobians of an [`ImuFactor`] at one linearization point.
#[derive(Debug, Clone, PartialEq)]
pub struct ImuLinearization {
    pub residual: Vector9,
    /// ∂r/∂x_i (9×9)
    pub h_state_i: Matrix9,
    /// ∂r/∂x_j (9×9)
    pub h_state_j: Matrix9,
    /// ∂r/∂b (9×6)
    pub h_bias: Matrix96,
}

impl ImuLinearization {
    /// Squared Mahalanobis norm of the residual.
    pub fn mahalanobis_norm_squared(&self, info: &Matrix9) -> f64 {
        mahalanobis_norm_squared(&self.residual, info)
    }
}

/// `rᵀ · Ω · r`
pub fn mahalanobis_norm_squared(residual: &Vector9, info: &Matrix9) -> f64 {
    (residual.transpose() * info * residual)[(0, 0)]
}

/// Preintegrated measurements between two keyframe states.
#[derive(Debug, Clone)]
pub struct ImuFactor {
    /// Index of keyframe i in the state layout.
    pub state_i: usize,
    /// Index of keyframe j in the state layout.
    pub state_j: usize,
    pim: ManifoldPreintegration,
}

impl ImuFactor {
    pub fn new(state_i: usize, state_j: usize, pim: ManifoldPreintegration) -> Self {
        Self {
            state_i,
            state_j,
            pim,
        }
    }

    pub fn preintegration(&self) -> &ManifoldPreintegration {
        &self.pim
    }

    pub fn evaluate(&self, x_i: &NavState, x_j: &NavState, bias: &ConstantBias) -> Vector9 {
        self.pim.compute_error(x_i, x_j, bias)
    }

    pub fn linearize(
        &self,
        x_i: &NavState,
        x_j: &NavState,
        bias: &ConstantBias,
    ) -> ImuLinearization {
        let (residual, jacobians) = self.pim.compute_error_with_jacobians(x_i, x_j, bias);

        debug!(
            state_i = self.state_i,
            state_j = self.state_j,
            residual_norm = residual.norm(),
            "linearized IMU factor"
        );

        ImuLinearization {
            residual,
            h_state_i: jacobians.wrt_state_i,
            h_state_j: jacobians.wrt_state_j,
            h_bias: jacobians.wrt_bias,
        }
    }
}

/// Parameter layout for inertial optimization.
///
/// Each keyframe contributes one navigation-state block:
/// - Rotation (3), position (3), velocity (3)
///
/// A single bias block `[b_a (3), b_g (3)]` follows all state blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FactorStateLayout {
    /// Number of keyframe states.
    pub num_states: usize,
}

impl FactorStateLayout {
    /// Parameters per keyframe state.
    pub const STATE_PARAMS: usize = 9;
    /// Parameters in the shared bias block.
    pub const BIAS_PARAMS: usize = 6;

    pub fn new(num_states: usize) -> Self {
        Self { num_states }
    }

    /// Total number of parameters.
    pub fn total_params(&self) -> usize {
        self.num_states * Self::STATE_PARAMS + Self::BIAS_PARAMS
    }

    /// Starting index for keyframe state `idx`.
    pub fn state_start(&self, idx: usize) -> usize {
        idx * Self::STATE_PARAMS
    }

    /// Starting index for the bias block.
    pub fn bias_start(&self) -> usize {
        self.num_states * Self::STATE_PARAMS
    }

    /// Writes the factor's Jacobian blocks into a dense 9×N row block.
    ///
    /// Returns `None` if either state index is outside the layout.
    pub fn scatter_jacobian(
        &self,
        factor: &ImuFactor,
        linearization: &ImuLinearization,
    ) -> Option<DMatrix<f64>> {
        if factor.state_i >= self.num_states || factor.state_j >= self.num_states {
            return None;
        }

        let mut rows = DMatrix::zeros(Self::STATE_PARAMS, self.total_params());
        add_block(&mut rows, self.state_start(factor.state_i), &linearization.h_state_i);
        add_block(&mut rows, self.state_start(factor.state_j), &linearization.h_state_j);
        add_block(&mut rows, self.bias_start(), &linearization.h_bias);
        Some(rows)
    }
}

// Accumulates so that a factor with i == j still sums both contributions.
fn add_block<const C: usize>(rows: &mut DMatrix<f64>, col: usize, block: &SMatrix<f64, 9, C>) {
    let mut view = rows.fixed_view_mut::<9, C>(0, col);
    view += block;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Rotation;
    use crate::imu::{ImuMeasurement, PreintegrationParams};
    use approx::assert_relative_eq;
    use nalgebra::{UnitQuaternion, Vector3};
    use std::sync::Arc;

    fn integrated_factor() -> ImuFactor {
        let params = Arc::new(PreintegrationParams::new(Vector3::new(0.0, 0.0, -9.81)));
        let mut pim = ManifoldPreintegration::new(params, ConstantBias::zero());
        let measurements: Vec<_> = (0..10)
            .map(|k| {
                ImuMeasurement::new(
                    Vector3::new(0.2, -0.1 * k as f64, 9.81),
                    Vector3::new(0.05, 0.1, -0.2),
                    0.01,
                )
            })
            .collect();
        pim.integrate_measurements(&measurements);
        ImuFactor::new(0, 2, pim)
    }

    fn state_i() -> NavState {
        NavState::new(
            UnitQuaternion::expmap(&Vector3::new(0.1, -0.2, 0.3)),
            Vector3::new(1.0, 2.0, 3.0),
            Vector3::new(0.5, 0.0, -0.25),
        )
    }

    #[test]
    fn test_imu_residual_zero_for_predicted_state() {
        let factor = integrated_factor();
        let bias = ConstantBias::zero();
        let x_i = state_i();
        let x_j = factor.preintegration().predict(&x_i, &bias);

        let residual = factor.evaluate(&x_i, &x_j, &bias);

        assert!(residual.norm() < 1e-12);
    }

    #[test]
    fn test_linearize_matches_evaluate() {
        let factor = integrated_factor();
        let bias = ConstantBias::new(Vector3::new(0.01, 0.0, 0.02), Vector3::new(0.0, 0.003, 0.0));
        let x_i = state_i();
        let x_j = NavState::new(
            UnitQuaternion::expmap(&Vector3::new(0.12, -0.18, 0.28)),
            Vector3::new(1.01, 2.0, 3.0),
            Vector3::new(0.5, 0.1, -0.2),
        );

        let linearization = factor.linearize(&x_i, &x_j, &bias);
        let (_, jacobians) = factor
            .preintegration()
            .compute_error_with_jacobians(&x_i, &x_j, &bias);

        assert_relative_eq!(linearization.residual, factor.evaluate(&x_i, &x_j, &bias));
        assert_eq!(linearization.h_state_i, jacobians.wrt_state_i);
        assert_eq!(linearization.h_state_j, jacobians.wrt_state_j);
        assert_eq!(linearization.h_bias, jacobians.wrt_bias);
    }

    #[test]
    fn test_mahalanobis_norm() {
        let residual = Vector9::from_element(2.0);
        let info = Matrix9::identity() * 0.5;

        assert_relative_eq!(mahalanobis_norm_squared(&residual, &info), 18.0);
    }

    #[test]
    fn test_factor_state_layout() {
        let layout = FactorStateLayout::new(3);

        assert_eq!(layout.total_params(), 3 * 9 + 6);
        assert_eq!(layout.state_start(0), 0);
        assert_eq!(layout.state_start(2), 18);
        assert_eq!(layout.bias_start(), 27);
    }

    #[test]
    fn test_scatter_jacobian() {
        let factor = integrated_factor();
        let bias = ConstantBias::zero();
        let x_i = state_i();
        let x_j = factor.preintegration().predict(&x_i, &bias);
        let linearization = factor.linearize(&x_i, &x_j, &bias);
        let layout = FactorStateLayout::new(3);

        let rows = layout
            .scatter_jacobian(&factor, &linearization)
            .expect("indices in range");

        assert_eq!(rows.shape(), (9, 33));
        assert_eq!(rows.fixed_view::<9, 9>(0, 0).into_owned(), linearization.h_state_i);
        assert_eq!(rows.fixed_view::<9, 9>(0, 9).into_owned(), Matrix9::zeros());
        assert_eq!(rows.fixed_view::<9, 9>(0, 18).into_owned(), linearization.h_state_j);
        assert_eq!(rows.fixed_view::<9, 6>(0, 27).into_owned(), linearization.h_bias);

        assert!(FactorStateLayout::new(2)
            .scatter_jacobian(&factor, &linearization)
            .is_none());
    }
}
