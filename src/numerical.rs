//! Central-difference derivatives on manifolds, used to check analytic Jacobians.

use nalgebra::{DMatrix, DVector, SMatrix, SVector};

use crate::geometry::{GenericNavState, Rotation};
use crate::imu::types::Vector6;
use crate::imu::ConstantBias;

const DELTA: f64 = 1e-5;

/// Minimal chart needed to differentiate through a value.
pub(crate) trait Chart {
    const DIM: usize;

    fn retract_dyn(&self, d: &DVector<f64>) -> Self;

    fn local_dyn(&self, other: &Self) -> DVector<f64>;
}

impl<const N: usize> Chart for SVector<f64, N> {
    const DIM: usize = N;

    fn retract_dyn(&self, d: &DVector<f64>) -> Self {
        self + SVector::<f64, N>::from_column_slice(d.as_slice())
    }

    fn local_dyn(&self, other: &Self) -> DVector<f64> {
        DVector::from_column_slice((other - self).as_slice())
    }
}

impl<R: Rotation> Chart for GenericNavState<R> {
    const DIM: usize = 9;

    fn retract_dyn(&self, d: &DVector<f64>) -> Self {
        self.retract(&SVector::<f64, 9>::from_column_slice(d.as_slice()))
    }

    fn local_dyn(&self, other: &Self) -> DVector<f64> {
        DVector::from_column_slice(self.local_coordinates(other).as_slice())
    }
}

impl Chart for ConstantBias {
    const DIM: usize = 6;

    fn retract_dyn(&self, d: &DVector<f64>) -> Self {
        *self + ConstantBias::from_vector(&Vector6::from_column_slice(d.as_slice()))
    }

    fn local_dyn(&self, other: &Self) -> DVector<f64> {
        DVector::from_column_slice((*other - *self).vector().as_slice())
    }
}

/// Jacobian of `f` at `x`, in the local charts of `x` and `f(x)`.
pub(crate) fn numerical_derivative<X, Y, F>(f: F, x: &X) -> DMatrix<f64>
where
    X: Chart,
    Y: Chart,
    F: Fn(&X) -> Y,
{
    let y = f(x);
    let mut jacobian = DMatrix::zeros(Y::DIM, X::DIM);

    for j in 0..X::DIM {
        let mut d = DVector::zeros(X::DIM);
        d[j] = DELTA;
        let plus = y.local_dyn(&f(&x.retract_dyn(&d)));
        d[j] = -DELTA;
        let minus = y.local_dyn(&f(&x.retract_dyn(&d)));
        jacobian.set_column(j, &((plus - minus) / (2.0 * DELTA)));
    }

    jacobian
}

/// Copies a fixed-size matrix into a dynamic one for comparison.
pub(crate) fn to_dynamic<const R: usize, const C: usize>(m: &SMatrix<f64, R, C>) -> DMatrix<f64> {
    DMatrix::from_column_slice(R, C, m.as_slice())
}
