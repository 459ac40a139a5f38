//! SO(3) Lie group utilities for on-manifold preintegration.
//!
//! Provides the [`Rotation`] capability used by [`super::GenericNavState`],
//! skew-symmetric matrix construction, and the right Jacobian Jr(φ) with its
//! inverse, following the convention in Forster et al. "IMU Preintegration on
//! Manifold":
//!
//! ```text
//! Exp(φ + δφ) ≈ Exp(φ) · Exp(Jr(φ) δφ)
//! Log(Exp(φ) · Exp(δφ)) ≈ φ + Jr⁻¹(φ) δφ
//! ```

use std::fmt::Debug;

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

/// Small angle threshold for numerical stability.
const SMALL_ANGLE_THRESHOLD: f64 = 1e-6;

/// Below this norm of the quaternion vector part, Log uses its Taylor form.
const QUATERNION_LOG_THRESHOLD: f64 = 1e-10;

/// Rotation-group capability needed by the navigation state.
///
/// Any representation (unit quaternion, rotation matrix, ...) that provides an
/// exact exponential/logarithm pair can drive [`super::GenericNavState`].
/// `compose` must return a renormalised element so repeated composition never
/// drifts off the group.
pub trait Rotation: Copy + Debug + PartialEq + Send + Sync + 'static {
    fn identity() -> Self;

    /// Exponential map: rotation vector (axis · angle) to group element.
    fn expmap(omega: &Vector3<f64>) -> Self;

    /// Logarithm map, inverse of [`Rotation::expmap`] for angles in [0, π].
    fn logmap(&self) -> Vector3<f64>;

    fn compose(&self, other: &Self) -> Self;

    fn inverse(&self) -> Self;

    /// `R · v`
    fn rotate(&self, v: &Vector3<f64>) -> Vector3<f64>;

    /// `Rᵀ · v`
    fn unrotate(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.inverse().rotate(v)
    }

    /// 3×3 rotation matrix.
    fn matrix(&self) -> Matrix3<f64>;

    /// `self⁻¹ · other`
    fn between(&self, other: &Self) -> Self {
        self.inverse().compose(other)
    }
}

impl Rotation for UnitQuaternion<f64> {
    fn identity() -> Self {
        UnitQuaternion::identity()
    }

    fn expmap(omega: &Vector3<f64>) -> Self {
        UnitQuaternion::from_scaled_axis(*omega)
    }

    fn logmap(&self) -> Vector3<f64> {
        quaternion_log(self)
    }

    fn compose(&self, other: &Self) -> Self {
        UnitQuaternion::new_normalize((self * other).into_inner())
    }

    fn inverse(&self) -> Self {
        UnitQuaternion::inverse(self)
    }

    fn rotate(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.transform_vector(v)
    }

    fn unrotate(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.inverse_transform_vector(v)
    }

    fn matrix(&self) -> Matrix3<f64> {
        self.to_rotation_matrix().into_inner()
    }
}

impl Rotation for Rotation3<f64> {
    fn identity() -> Self {
        Rotation3::identity()
    }

    fn expmap(omega: &Vector3<f64>) -> Self {
        Rotation3::new(*omega)
    }

    fn logmap(&self) -> Vector3<f64> {
        // trace-based acos is inaccurate near identity
        quaternion_log(&UnitQuaternion::from_rotation_matrix(self))
    }

    fn compose(&self, other: &Self) -> Self {
        let mut composed = self * other;
        composed.renormalize();
        composed
    }

    fn inverse(&self) -> Self {
        Rotation3::inverse(self)
    }

    fn rotate(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.transform_vector(v)
    }

    fn unrotate(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.inverse_transform_vector(v)
    }

    fn matrix(&self) -> Matrix3<f64> {
        self.into_inner()
    }
}

/// Logarithm of a unit quaternion as a rotation vector with angle in [0, π].
///
/// Uses `atan2` on the vector/scalar parts.
pub fn quaternion_log(q: &UnitQuaternion<f64>) -> Vector3<f64> {
    // q and -q encode the same rotation; pick the shortest arc.
    let (w, v) = if q.w < 0.0 {
        (-q.w, -q.imag())
    } else {
        (q.w, q.imag())
    };
    let n = v.norm();

    if n < QUATERNION_LOG_THRESHOLD {
        // θ = 2·atan(n / w) ≈ 2n / w
        return v * (2.0 / w);
    }

    v * (2.0 * n.atan2(w) / n)
}

/// Constructs the skew-symmetric matrix [v]× such that [v]× u = v × u.
///
/// ```text
/// [v]× = |  0   -v_z   v_y |
///        |  v_z   0   -v_x |
///        | -v_y  v_x    0  |
/// ```
#[inline]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y,
        v.z, 0.0, -v.x,
        -v.y, v.x, 0.0,
    )
}

/// Computes the right Jacobian Jr(φ) of SO(3).
///
/// ```text
/// Jr(φ) = I - (1 - cos|φ|)/|φ|² [φ]× + (|φ| - sin|φ|)/|φ|³ [φ]×²
/// ```
///
/// For small angles (|φ| < ε):
/// ```text
/// Jr(φ) ≈ I - 0.5 [φ]×
/// ```
pub fn right_jacobian_so3(phi: &Vector3<f64>) -> Matrix3<f64> {
    let theta = phi.norm();

    if theta < SMALL_ANGLE_THRESHOLD {
        return Matrix3::identity() - 0.5 * skew(phi);
    }

    let theta_sq = theta * theta;
    let theta_cu = theta_sq * theta;
    let sin_theta = theta.sin();
    let cos_theta = theta.cos();

    let skew_phi = skew(phi);
    let skew_phi_sq = skew_phi * skew_phi;

    Matrix3::identity()
        - ((1.0 - cos_theta) / theta_sq) * skew_phi
        + ((theta - sin_theta) / theta_cu) * skew_phi_sq
}

/// Computes the inverse of the right Jacobian Jr⁻¹(φ).
///
/// ```text
/// Jr⁻¹(φ) = I + 0.5 [φ]× + (1/|φ|² - (1 + cos|φ|)/(2|φ| sin|φ|)) [φ]×²
/// ```
///
/// For small angles:
/// ```text
/// Jr⁻¹(φ) ≈ I + 0.5 [φ]× + 1/12 [φ]×²
/// ```
///
/// Ill-conditioned as |φ| → π: `sin|φ| → 0` and the last coefficient blows up.
pub fn right_jacobian_so3_inv(phi: &Vector3<f64>) -> Matrix3<f64> {
    let theta = phi.norm();

    if theta < SMALL_ANGLE_THRESHOLD {
        let skew_phi = skew(phi);
        return Matrix3::identity() + 0.5 * skew_phi + (1.0 / 12.0) * skew_phi * skew_phi;
    }

    let theta_sq = theta * theta;
    let sin_theta = theta.sin();
    let cos_theta = theta.cos();

    let skew_phi = skew(phi);
    let skew_phi_sq = skew_phi * skew_phi;

    let coeff = 1.0 / theta_sq - (1.0 + cos_theta) / (2.0 * theta * sin_theta);

    Matrix3::identity() + 0.5 * skew_phi + coeff * skew_phi_sq
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_skew_cross_product() {
        let v = Vector3::new(1.0, 2.0, 3.0);
        let u = Vector3::new(4.0, 5.0, 6.0);

        assert_relative_eq!(v.cross(&u), skew(&v) * u, epsilon = 1e-12);
    }

    #[test]
    fn test_skew_antisymmetric() {
        let skew_v = skew(&Vector3::new(1.0, 2.0, 3.0));

        assert_relative_eq!(skew_v, -skew_v.transpose(), epsilon = 1e-12);
    }

    #[test]
    fn test_right_jacobian_identity_at_zero() {
        let phi = Vector3::zeros();

        assert_relative_eq!(right_jacobian_so3(&phi), Matrix3::identity(), epsilon = 1e-10);
        assert_relative_eq!(right_jacobian_so3_inv(&phi), Matrix3::identity(), epsilon = 1e-10);
    }

    #[test]
    fn test_right_jacobian_inverse_relationship() {
        let phi = Vector3::new(0.1, 0.2, 0.3);
        let product = right_jacobian_so3(&phi) * right_jacobian_so3_inv(&phi);

        assert_relative_eq!(product, Matrix3::identity(), epsilon = 1e-10);
    }

    #[test]
    fn test_right_jacobian_first_order_expmap() {
        // Exp(φ + δ) ≈ Exp(φ) Exp(Jr(φ) δ)
        let phi = Vector3::new(0.3, -0.2, 0.5);
        let delta = Vector3::new(1e-7, -2e-7, 0.5e-7);

        let lhs = UnitQuaternion::expmap(&(phi + delta));
        let rhs = UnitQuaternion::expmap(&phi)
            .compose(&UnitQuaternion::expmap(&(right_jacobian_so3(&phi) * delta)));

        assert_relative_eq!(lhs.between(&rhs).logmap(), Vector3::zeros(), epsilon = 1e-11);
    }

    #[test]
    fn test_quaternion_log_roundtrip() {
        let cases = [
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(1e-12, -3e-12, 2e-12),
            Vector3::new(1e-7, 2e-7, -1e-7),
            Vector3::new(0.1, 0.2, 0.3),
            Vector3::new(3.0, 0.0, 0.0),
        ];

        for phi in cases {
            let q = UnitQuaternion::expmap(&phi);
            assert_relative_eq!(q.logmap(), phi, epsilon = 1e-14, max_relative = 1e-12);
        }
    }

    #[test]
    fn test_quaternion_log_picks_shortest_arc() {
        let q = UnitQuaternion::expmap(&Vector3::new(0.0, 0.0, 0.4));
        let flipped = UnitQuaternion::new_unchecked(-q.into_inner());

        assert_relative_eq!(flipped.logmap(), Vector3::new(0.0, 0.0, 0.4), epsilon = 1e-14);
    }

    #[test]
    fn test_representations_agree() {
        let a = Vector3::new(0.3, -0.1, 0.7);
        let b = Vector3::new(-0.2, 0.4, 0.1);
        let v = Vector3::new(1.0, -2.0, 0.5);

        let qa = UnitQuaternion::expmap(&a).compose(&UnitQuaternion::expmap(&b));
        let ra = Rotation3::expmap(&a).compose(&Rotation3::expmap(&b));

        assert_relative_eq!(qa.matrix(), Rotation::matrix(&ra), epsilon = 1e-13);
        assert_relative_eq!(qa.logmap(), ra.logmap(), epsilon = 1e-13);
        assert_relative_eq!(qa.rotate(&v), ra.rotate(&v), epsilon = 1e-13);
        assert_relative_eq!(qa.unrotate(&v), ra.unrotate(&v), epsilon = 1e-13);
    }

    #[test]
    fn test_compose_stays_orthonormal() {
        let step = Rotation3::expmap(&Vector3::new(0.01, 0.02, -0.03));
        let mut r = Rotation3::<f64>::identity();
        for _ in 0..10_000 {
            r = r.compose(&step);
        }
        let m = Rotation::matrix(&r);

        assert_relative_eq!(m.transpose() * m, Matrix3::identity(), epsilon = 1e-12);
    }
}
