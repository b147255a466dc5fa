//! Gradient-descent orientation refinement.
//!
//! The objective compares where the earth-frame references should appear in
//! the sensor frame, given an orientation estimate `q`, against where the
//! accelerometer and magnetometer actually observed them:
//!
//! ```text
//! f1 = q* ⊗ G ⊗ q - a        G = (0, 0, 1)
//! f2 = q* ⊗ B ⊗ q - m        B = (bx, 0, bz)
//! F  = ½ (|f1|² + |f2|²)
//! ∇F = J1ᵗ f1 + J2ᵗ f2       J = ∂f/∂q
//! ```
//!
//! The Jacobians are the exact partial derivatives of the full polynomial
//! expressions (no unit-norm simplification), written out as straight-line
//! arithmetic.

use num_traits::Float;

use crate::quaternion::{Quaternion, Vec3};

/// Earth-frame magnetic field reference `B = (bx, 0, bz)`.
///
/// Both components come from an offline calibration of the local field; the
/// filter only consumes them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MagneticReference<T> {
    pub bx: T,
    pub bz: T,
}

impl<T: Float> MagneticReference<T> {
    pub const fn new(bx: T, bz: T) -> Self {
        Self { bx, bz }
    }

    /// Unit field vector for a magnetic dip angle, in degrees (+ pointing
    /// down). Declination is ignored: the reference frame's x axis is taken to
    /// be magnetic north.
    pub fn from_inclination_deg(inclination_deg: T) -> Self {
        let el = inclination_deg.to_radians();
        Self::new(el.cos(), el.sin())
    }

    pub fn vector(&self) -> Vec3<T> {
        Vec3::new(self.bx, T::zero(), self.bz)
    }
}

/// Earth-frame gravity direction.
pub fn gravity<T: Float>() -> Vec3<T> {
    Vec3::new(T::zero(), T::zero(), T::one())
}

/// Objective function residuals for one orientation estimate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Residuals<T> {
    /// `f1`: expected minus measured gravity direction
    pub gravity: Vec3<T>,
    /// `f2`: expected minus measured magnetic field direction
    pub field: Vec3<T>,
}

impl<T: Float> Residuals<T> {
    /// `|f1|² + |f2|²`, twice the objective `F`.
    pub fn sum_of_squares(&self) -> T {
        self.gravity.dot(&self.gravity) + self.field.dot(&self.field)
    }

    /// `|f1| + |f2|`
    pub fn norm_sum(&self) -> T {
        self.gravity.norm() + self.field.norm()
    }
}

/// Computes `f1` and `f2` for the estimate `q` against readings `a` and `m`.
pub fn residuals<T: Float>(
    q: &Quaternion<T>,
    a: &Vec3<T>,
    m: &Vec3<T>,
    reference: &MagneticReference<T>,
) -> Residuals<T> {
    let two = T::one() + T::one();
    let (q0, q1, q2, q3) = (q.w, q.i, q.j, q.k);
    let (bx, bz) = (reference.bx, reference.bz);

    let q0q0 = q0 * q0;
    let q1q1 = q1 * q1;
    let q2q2 = q2 * q2;
    let q3q3 = q3 * q3;

    // Shared terms of q* ⊗ v ⊗ q
    let xz = two * (q1 * q3 - q0 * q2);
    let yz = two * (q0 * q1 + q2 * q3);
    let zz = q0q0 - q1q1 - q2q2 + q3q3;
    let xx = q0q0 + q1q1 - q2q2 - q3q3;
    let xy = two * (q1 * q2 - q0 * q3);
    let zx = two * (q1 * q3 + q0 * q2);

    Residuals {
        gravity: Vec3::new(xz - a.x, yz - a.y, zz - a.z),
        field: Vec3::new(
            bx * xx + bz * xz - m.x,
            bx * xy + bz * yz - m.y,
            bx * zx + bz * zz - m.z,
        ),
    }
}

/// Gradient `∇F = J1ᵗ f1 + J2ᵗ f2` of the alignment objective, returned as a
/// quaternion-shaped 4-vector. It is not normalized.
pub fn gradient<T: Float>(
    q: &Quaternion<T>,
    a: &Vec3<T>,
    m: &Vec3<T>,
    reference: &MagneticReference<T>,
) -> Quaternion<T> {
    let Residuals {
        gravity: f1,
        field: f2,
    } = residuals(q, a, m, reference);

    let two = T::one() + T::one();
    let (q0, q1, q2, q3) = (two * q.w, two * q.i, two * q.j, two * q.k);
    let (bx, bz) = (reference.bx, reference.bz);

    // J1 = ∂f1/∂q, rows for the x, y and z components of f1
    let j11 = -q2;
    let j12 = q3;
    let j13 = -q0;
    let j14 = q1;
    let j21 = q1;
    let j22 = q0;
    let j23 = q3;
    let j24 = q2;
    let j31 = q0;
    let j32 = -q1;
    let j33 = -q2;
    let j34 = q3;

    // J2 = ∂f2/∂q
    let k11 = bx * q0 - bz * q2;
    let k12 = bx * q1 + bz * q3;
    let k13 = -bx * q2 - bz * q0;
    let k14 = -bx * q3 + bz * q1;
    let k21 = -bx * q3 + bz * q1;
    let k22 = bx * q2 + bz * q0;
    let k23 = bx * q1 + bz * q3;
    let k24 = -bx * q0 + bz * q2;
    let k31 = bx * q2 + bz * q0;
    let k32 = bx * q3 - bz * q1;
    let k33 = bx * q0 - bz * q2;
    let k34 = bx * q1 + bz * q3;

    Quaternion::new(
        j11 * f1.x + j21 * f1.y + j31 * f1.z + k11 * f2.x + k21 * f2.y + k31 * f2.z,
        j12 * f1.x + j22 * f1.y + j32 * f1.z + k12 * f2.x + k22 * f2.y + k32 * f2.z,
        j13 * f1.x + j23 * f1.y + j33 * f1.z + k13 * f2.x + k23 * f2.y + k33 * f2.z,
        j14 * f1.x + j24 * f1.y + j34 * f1.z + k14 * f2.x + k24 * f2.y + k34 * f2.z,
    )
}

/// One descent step `q - alpha ∇F`.
///
/// Meant to be applied once per sensor sample, not iterated to convergence.
/// The result is not renormalized.
pub fn gradient_descent<T: Float>(
    q: &Quaternion<T>,
    a: &Vec3<T>,
    m: &Vec3<T>,
    reference: &MagneticReference<T>,
    alpha: T,
) -> Quaternion<T> {
    *q - gradient(q, a, m, reference).scale(alpha)
}
