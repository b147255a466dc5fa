//! Input checks run by the filter driver before each step.
//!
//! The closed-form kernel never calls these: degenerate inputs simply
//! propagate NaN/Inf through it. All checks are allocation-free.

use num_traits::Float;
use thiserror::Error;

use crate::quaternion::{Quaternion, Vec3};

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum InputError {
    #[error("{name} contains a non-finite component")]
    NonFinite { name: &'static str },
    #[error("{name} has zero magnitude")]
    ZeroMagnitude { name: &'static str },
    #[error("orientation is not unit norm (|q| = {norm})")]
    NotUnitNorm { norm: f64 },
}

/// Passes `v` through if every component is finite.
pub fn check_finite<T: Float>(name: &'static str, v: &Vec3<T>) -> Result<Vec3<T>, InputError> {
    if v.is_finite() {
        Ok(*v)
    } else {
        Err(InputError::NonFinite { name })
    }
}

/// Passes `v` through if it is finite and can be normalized.
pub fn check_nonzero<T: Float>(name: &'static str, v: &Vec3<T>) -> Result<Vec3<T>, InputError> {
    let v = check_finite(name, v)?;
    if v.norm() > T::epsilon() {
        Ok(v)
    } else {
        Err(InputError::ZeroMagnitude { name })
    }
}

pub fn check_unit_norm<T: Float>(q: &Quaternion<T>, tolerance: T) -> Result<(), InputError> {
    let norm = q.norm();
    if q.is_finite() && (norm - T::one()).abs() <= tolerance {
        Ok(())
    } else {
        Err(InputError::NotUnitNorm {
            norm: norm.to_f64().unwrap_or(f64::NAN),
        })
    }
}
