//! Flat double-precision entry points.
//!
//! Scalar arguments in alphabetical order and a caller-provided output buffer,
//! for control loops that keep their state in plain arrays. Nothing here
//! allocates, logs or normalizes.

use crate::gradient::{self, MagneticReference};
use crate::madgwick::madgwick_step;
use crate::quaternion::{Quaternion, Vec3};

/// Writes `q - alpha ∇F` into `out` as `[q_0, q_1, q_2, q_3]`.
#[allow(clippy::too_many_arguments)]
pub fn gradient_descent(
    a_x: f64,
    a_y: f64,
    a_z: f64,
    alpha: f64,
    b_x: f64,
    b_z: f64,
    m_x: f64,
    m_y: f64,
    m_z: f64,
    q_0: f64,
    q_1: f64,
    q_2: f64,
    q_3: f64,
    out: &mut [f64; 4],
) {
    let q = gradient::gradient_descent(
        &Quaternion::new(q_0, q_1, q_2, q_3),
        &Vec3::new(a_x, a_y, a_z),
        &Vec3::new(m_x, m_y, m_z),
        &MagneticReference::new(b_x, b_z),
        alpha,
    );
    *out = q.to_array();
}

/// Writes the next (non-normalized) orientation into `out`.
#[allow(clippy::too_many_arguments)]
pub fn madgwick(
    a_x: f64,
    a_y: f64,
    a_z: f64,
    b_x: f64,
    b_z: f64,
    beta: f64,
    dt: f64,
    m_x: f64,
    m_y: f64,
    m_z: f64,
    q_0: f64,
    q_1: f64,
    q_2: f64,
    q_3: f64,
    w_x: f64,
    w_y: f64,
    w_z: f64,
    out: &mut [f64; 4],
) {
    let q = madgwick_step(
        &Quaternion::new(q_0, q_1, q_2, q_3),
        &Vec3::new(w_x, w_y, w_z),
        &Vec3::new(a_x, a_y, a_z),
        &Vec3::new(m_x, m_y, m_z),
        &MagneticReference::new(b_x, b_z),
        beta,
        dt,
    );
    *out = q.to_array();
}
