//! Fixed-size quaternion and 3-vector value types.
//!
//! Quaternions are stored scalar first, ordered as (w, i, j, k). Every
//! operation is straight-line arithmetic over four (or three) components.

use num_traits::Float;
use std::ops::{Add, Mul, Neg, Sub};

/// A real 3-vector, used for sensor readings and earth-frame references.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Vec3<T> {
    pub x: T,
    pub y: T,
    pub z: T,
}

impl<T: Float> Vec3<T> {
    pub const fn new(x: T, y: T, z: T) -> Self {
        Self { x, y, z }
    }

    pub fn zeros() -> Self {
        Self::new(T::zero(), T::zero(), T::zero())
    }

    pub fn dot(&self, other: &Self) -> T {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(&self, other: &Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn scale(&self, s: T) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }

    pub fn norm(&self) -> T {
        self.dot(self).sqrt()
    }

    /// Returns the unit vector in the direction of `self`. A zero vector
    /// yields NaN components.
    pub fn normalize(&self) -> Self {
        self.scale(T::one() / self.norm())
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl<T: Float> Add for Vec3<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl<T: Float> Sub for Vec3<T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl<T: Float> Neg for Vec3<T> {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// A quaternion with scalar part `w` and vector part `(i, j, k)`.
///
/// When used as an orientation the quaternion must have unit norm. Nothing in
/// this module enforces that: the filter step returns non-normalized
/// quaternions and the caller decides when to call [`Quaternion::normalize`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Quaternion<T> {
    /// Scalar (real) part
    pub w: T,
    pub i: T,
    pub j: T,
    pub k: T,
}

impl<T: Float> Quaternion<T> {
    pub const fn new(w: T, i: T, j: T, k: T) -> Self {
        Self { w, i, j, k }
    }

    pub fn identity() -> Self {
        Self::new(T::one(), T::zero(), T::zero(), T::zero())
    }

    /// Builds a quaternion from its scalar and vector parts.
    pub fn from_parts(w: T, v: Vec3<T>) -> Self {
        Self::new(w, v.x, v.y, v.z)
    }

    /// Embeds a 3-vector as the pure quaternion `(0, v)`.
    pub fn pure(v: Vec3<T>) -> Self {
        Self::from_parts(T::zero(), v)
    }

    /// The vector (imaginary) part.
    pub fn vector(&self) -> Vec3<T> {
        Vec3::new(self.i, self.j, self.k)
    }

    /// Negates the vector part, keeping the scalar part.
    pub fn conjugate(&self) -> Self {
        Self::new(self.w, -self.i, -self.j, -self.k)
    }

    /// Hamilton product `self ⊗ rhs`.
    ///
    /// ```text
    /// w = w1 w2 - v1·v2
    /// v = w1 v2 + w2 v1 + v1 × v2
    /// ```
    pub fn product(&self, rhs: &Self) -> Self {
        let (w1, v1) = (self.w, self.vector());
        let (w2, v2) = (rhs.w, rhs.vector());
        Self::from_parts(
            w1 * w2 - v1.dot(&v2),
            v2.scale(w1) + v1.scale(w2) + v1.cross(&v2),
        )
    }

    /// Computes the vector part of `self ⊗ (0, v) ⊗ conj(self)`.
    ///
    /// This is a rigid rotation of `v` only if `self` has unit norm; otherwise
    /// the result is additionally scaled by `|self|²`.
    pub fn rotate(&self, v: &Vec3<T>) -> Vec3<T> {
        self.product(&Self::pure(*v))
            .product(&self.conjugate())
            .vector()
    }

    pub fn scale(&self, s: T) -> Self {
        Self::new(self.w * s, self.i * s, self.j * s, self.k * s)
    }

    pub fn dot(&self, other: &Self) -> T {
        self.w * other.w + self.i * other.i + self.j * other.j + self.k * other.k
    }

    pub fn norm_squared(&self) -> T {
        self.dot(self)
    }

    pub fn norm(&self) -> T {
        self.norm_squared().sqrt()
    }

    /// Returns `self / |self|`. The zero quaternion yields NaN components.
    pub fn normalize(&self) -> Self {
        self.scale(T::one() / self.norm())
    }

    pub fn is_finite(&self) -> bool {
        self.w.is_finite() && self.i.is_finite() && self.j.is_finite() && self.k.is_finite()
    }

    pub fn to_array(self) -> [T; 4] {
        [self.w, self.i, self.j, self.k]
    }

    pub fn from_array(q: [T; 4]) -> Self {
        Self::new(q[0], q[1], q[2], q[3])
    }
}

impl<T: Float> Default for Quaternion<T> {
    fn default() -> Self {
        Self::identity()
    }
}

impl<T: Float> Mul for Quaternion<T> {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        self.product(&rhs)
    }
}

impl<T: Float> Add for Quaternion<T> {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(
            self.w + rhs.w,
            self.i + rhs.i,
            self.j + rhs.j,
            self.k + rhs.k,
        )
    }
}

impl<T: Float> Sub for Quaternion<T> {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(
            self.w - rhs.w,
            self.i - rhs.i,
            self.j - rhs.j,
            self.k - rhs.k,
        )
    }
}

impl<T: Float> Neg for Quaternion<T> {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.w, -self.i, -self.j, -self.k)
    }
}

// nalgebra interop. The application side (initial alignment, estimates handed
// to consumers) speaks nalgebra; the filter itself never does.

impl From<nalgebra::Quaternion<f64>> for Quaternion<f64> {
    fn from(q: nalgebra::Quaternion<f64>) -> Self {
        Self::new(q.w, q.i, q.j, q.k)
    }
}

impl From<nalgebra::UnitQuaternion<f64>> for Quaternion<f64> {
    fn from(q: nalgebra::UnitQuaternion<f64>) -> Self {
        q.into_inner().into()
    }
}

impl From<Quaternion<f64>> for nalgebra::Quaternion<f64> {
    fn from(q: Quaternion<f64>) -> Self {
        nalgebra::Quaternion::new(q.w, q.i, q.j, q.k)
    }
}

impl From<nalgebra::Vector3<f64>> for Vec3<f64> {
    fn from(v: nalgebra::Vector3<f64>) -> Self {
        Self::new(v.x, v.y, v.z)
    }
}

impl From<Vec3<f64>> for nalgebra::Vector3<f64> {
    fn from(v: Vec3<f64>) -> Self {
        nalgebra::Vector3::new(v.x, v.y, v.z)
    }
}

#[cfg(test)]
pub(crate) fn assert_quat_close(actual: &Quaternion<f64>, expected: &Quaternion<f64>, eps: f64) {
    for (a, e) in actual.to_array().iter().zip(expected.to_array().iter()) {
        approx::assert_abs_diff_eq!(*a, *e, epsilon = eps);
    }
}

#[cfg(test)]
pub(crate) fn assert_vec_close(actual: &Vec3<f64>, expected: &Vec3<f64>, eps: f64) {
    approx::assert_abs_diff_eq!(actual.x, expected.x, epsilon = eps);
    approx::assert_abs_diff_eq!(actual.y, expected.y, epsilon = eps);
    approx::assert_abs_diff_eq!(actual.z, expected.z, epsilon = eps);
}
