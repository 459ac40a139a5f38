use std::sync::Arc;

use anyhow::{Context, Result};
use nalgebra::{UnitQuaternion, Vector3};

use imu_preintegration::geometry::Rotation;
use imu_preintegration::imu::{
    ConstantBias, ImuMeasurement, ManifoldPreintegration, STANDARD_GRAVITY,
};
use imu_preintegration::optimizer::{FactorStateLayout, ImuFactor};
use imu_preintegration::{NavState, PreintegrationParams};

/// IMU rate of the synthetic trajectory (Hz).
const IMU_RATE: f64 = 200.0;

fn main() -> Result<()> {
    let num_samples: usize = match std::env::args().nth(1) {
        Some(arg) => arg
            .parse()
            .with_context(|| format!("invalid sample count: {arg}"))?,
        None => 200,
    };
    let dt = 1.0 / IMU_RATE;

    let params = PreintegrationParams {
        gravity: Vector3::new(0.0, 0.0, -STANDARD_GRAVITY),
        ..PreintegrationParams::default()
    };
    params.validate()?;
    let params = Arc::new(params);

    // Body spins slowly about z while accelerating forward in its own frame.
    let omega = Vector3::new(0.0, 0.0, 0.3);
    let specific_force = Vector3::new(0.5, 0.0, STANDARD_GRAVITY);
    let true_bias = ConstantBias::new(
        Vector3::new(0.02, -0.01, 0.03),
        Vector3::new(0.001, 0.002, -0.001),
    );

    let measurements: Vec<_> = (0..num_samples)
        .map(|_| {
            ImuMeasurement::new(
                specific_force + true_bias.accelerometer,
                omega + true_bias.gyroscope,
                dt,
            )
        })
        .collect();

    let x_i = NavState::new(
        UnitQuaternion::expmap(&Vector3::new(0.0, 0.0, 0.5)),
        Vector3::new(1.0, 2.0, 0.0),
        Vector3::new(0.2, 0.0, 0.0),
    );
    let x_j = measurements.iter().fold(x_i, |x, m| {
        x.update(
            &true_bias.correct_accelerometer(&m.acc),
            &true_bias.correct_gyroscope(&m.omega),
            &params.gravity,
            m.dt,
        )
    });

    // Integrate with a zero bias guess, then correct to the true bias.
    let mut pim = ManifoldPreintegration::new(params, ConstantBias::zero());
    pim.integrate_measurements(&measurements);

    let delta_rot = pim.delta_rij().logmap();
    println!(
        "Integrated {} IMU samples over {:.3} s",
        measurements.len(),
        pim.delta_t_ij()
    );
    println!(
        "Delta: rot [{:.4}, {:.4}, {:.4}], pos [{:.4}, {:.4}, {:.4}], vel [{:.4}, {:.4}, {:.4}]",
        delta_rot.x,
        delta_rot.y,
        delta_rot.z,
        pim.delta_pij().x,
        pim.delta_pij().y,
        pim.delta_pij().z,
        pim.delta_vij().x,
        pim.delta_vij().y,
        pim.delta_vij().z,
    );

    let factor = ImuFactor::new(0, 1, pim);
    let at_guess = factor.evaluate(&x_i, &x_j, &ConstantBias::zero());
    let at_truth = factor.linearize(&x_i, &x_j, &true_bias);
    println!("Residual norm with zero bias:  {:.3e}", at_guess.norm());
    println!("Residual norm with true bias:  {:.3e}", at_truth.residual.norm());

    let layout = FactorStateLayout::new(2);
    let rows = layout
        .scatter_jacobian(&factor, &at_truth)
        .context("factor references a state outside the layout")?;
    println!(
        "Jacobian row block: {}x{}, max |J| = {:.3}",
        rows.nrows(),
        rows.ncols(),
        rows.amax()
    );

    Ok(())
}
