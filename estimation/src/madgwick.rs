//! Madgwick filter implementation.
//!
//! The Madgwick filter is an efficient attitude estimator combining
//! accelerometer, gyroscope and magnetometer readings. The gyroscope rate is
//! integrated into a quaternion derivative, which is then pulled toward the
//! orientation implied by gravity and the magnetic field by subtracting a
//! gradient-descent correction scaled by the fusion gain `beta`.
//!
//! [`madgwick_step`] is the pure per-sample update. [`Madgwick`] is a thin
//! driver that owns the orientation between samples and performs the
//! renormalization the step leaves to its caller.

use nalgebra::UnitQuaternion;
use num_traits::Float;
use std::time::Duration;
use tracing::trace;

use crate::config::FilterConfig;
use crate::gradient::{gradient, gradient_descent, MagneticReference};
use crate::quaternion::{Quaternion, Vec3};
use crate::validate::{check_finite, check_nonzero, check_unit_norm, InputError};
use crate::{initial_orientation, RawImuData};

/// Tolerance on `|q|` for orientations handed to [`Madgwick::with_orientation`].
const UNIT_NORM_TOLERANCE: f64 = 1e-3;

/// One fusion update.
///
/// - `w`, angular rate (rad/s)
/// - `a`, `m`, accelerometer and magnetometer readings, expected normalized
/// - `beta`, fusion gain
/// - `dt`, integration timestep (s)
///
/// The returned quaternion is not unit norm; callers renormalize before
/// the next step.
pub fn madgwick_step<T: Float>(
    q: &Quaternion<T>,
    w: &Vec3<T>,
    a: &Vec3<T>,
    m: &Vec3<T>,
    reference: &MagneticReference<T>,
    beta: T,
    dt: T,
) -> Quaternion<T> {
    let half = T::one() / (T::one() + T::one());

    // Rate of change of the orientation from the gyro alone
    let q_dot = q.product(&Quaternion::pure(*w)).scale(half);

    // Pull the rate toward the accelerometer/magnetometer solution
    let q_dot = q_dot - gradient(q, a, m, reference).scale(beta);

    *q + q_dot.scale(dt)
}

pub struct Madgwick {
    time: Duration,
    beta: f64,
    alpha: f64,
    reference: MagneticReference<f64>,
    q: Quaternion<f64>,
}

impl Madgwick {
    /// Seeds the filter with the orientation aligned to the first sample's
    /// accelerometer and magnetometer readings.
    pub fn new(init: &RawImuData, config: &FilterConfig) -> Result<Self, InputError> {
        let accel = check_nonzero("accelerometer", &init.accel())?;
        let mag = check_nonzero("magnetometer", &init.mag())?;
        let q = initial_orientation(&accel, &mag);
        Self::with_orientation(q, init.time, config)
    }

    /// Seeds the filter with a known orientation at `time`.
    pub fn with_orientation(
        q: Quaternion<f64>,
        time: Duration,
        config: &FilterConfig,
    ) -> Result<Self, InputError> {
        check_unit_norm(&q, UNIT_NORM_TOLERANCE)?;
        Ok(Self {
            time,
            beta: config.beta,
            alpha: config.alpha,
            reference: config.magnetic_reference(),
            q: q.normalize(),
        })
    }

    pub fn orientation(&self) -> Quaternion<f64> {
        self.q
    }

    pub fn estimate(&self) -> UnitQuaternion<f64> {
        UnitQuaternion::new_unchecked(self.q.into())
    }

    /// Fuses one sample. `dt` is the time since the latest accepted sample;
    /// out-of-order timestamps integrate over zero time and do not move the
    /// clock back.
    ///
    /// On error the sample is discarded and the state is left untouched.
    pub fn update(&mut self, raw: &RawImuData) -> Result<(), InputError> {
        let (accel, mag) = self.observations(raw)?;
        let gyro = check_finite("gyroscope", &raw.gyro())?;
        let dt = raw.time.saturating_sub(self.time).as_secs_f64();

        let q = madgwick_step(&self.q, &gyro, &accel, &mag, &self.reference, self.beta, dt);
        trace!(dt, w = q.w, i = q.i, j = q.j, k = q.k, "madgwick update");
        self.commit(q, raw.time)
    }

    /// Applies a single accelerometer/magnetometer descent step, ignoring the
    /// gyroscope. Useful when no gyro is fitted or it is known to be bad.
    pub fn correct(&mut self, raw: &RawImuData) -> Result<(), InputError> {
        let (accel, mag) = self.observations(raw)?;
        let q = gradient_descent(&self.q, &accel, &mag, &self.reference, self.alpha);
        trace!(w = q.w, i = q.i, j = q.j, k = q.k, "descent correction");
        self.commit(q, raw.time)
    }

    fn observations(&self, raw: &RawImuData) -> Result<(Vec3<f64>, Vec3<f64>), InputError> {
        let accel = check_nonzero("accelerometer", &raw.accel())?.normalize();
        let mag = check_nonzero("magnetometer", &raw.mag())?.normalize();
        Ok((accel, mag))
    }

    fn commit(&mut self, q: Quaternion<f64>, time: Duration) -> Result<(), InputError> {
        let q = q.normalize();
        if !q.is_finite() {
            return Err(InputError::NonFinite {
                name: "orientation",
            });
        }
        self.q = q;
        self.time = self.time.max(time);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gradient::gravity;
    use crate::quaternion::assert_quat_close;
    use approx::assert_abs_diff_eq;

    fn sample(time: f64, q_true: &Quaternion<f64>, gyro_deg: Vec3<f64>) -> RawImuData {
        let reference = FilterConfig::default().magnetic_reference();
        let inv = q_true.conjugate();
        let a = inv.rotate(&gravity());
        let m = inv.rotate(&reference.vector());
        RawImuData {
            time: Duration::from_secs_f64(time),
            ax: a.x,
            ay: a.y,
            az: a.z,
            gx: gyro_deg.x,
            gy: gyro_deg.y,
            gz: gyro_deg.z,
            mx: m.x,
            my: m.y,
            mz: m.z,
        }
    }

    fn tilted() -> Quaternion<f64> {
        UnitQuaternion::from_euler_angles(0.4, -0.3, 1.0).into()
    }

    #[test]
    fn zero_gain_is_pure_gyro_integration() {
        let q = Quaternion::new(0.9, 0.2, -0.3, 0.4).normalize();
        let w = Vec3::new(0.3, -1.5, 0.8);
        let a = Vec3::new(0.1, 0.2, 0.97);
        let m = Vec3::new(0.6, 0.1, 0.75);
        let reference = MagneticReference::new(0.8, 0.6);
        let dt = 0.01;

        let expected = q + q.product(&Quaternion::pure(w)).scale(0.5).scale(dt);
        assert_eq!(madgwick_step(&q, &w, &a, &m, &reference, 0.0, dt), expected);
    }

    #[test]
    fn step_adds_scaled_gradient() {
        let q = Quaternion::new(0.9, 0.2, -0.3, 0.4);
        let w = Vec3::new(0.3, -1.5, 0.8);
        let a = Vec3::new(0.1, 0.2, 0.97);
        let m = Vec3::new(0.6, 0.1, 0.75);
        let reference = MagneticReference::new(0.8, 0.6);
        let (beta, dt) = (0.1, 0.02);

        let gyro_only = madgwick_step(&q, &w, &a, &m, &reference, 0.0, dt);
        let fused = madgwick_step(&q, &w, &a, &m, &reference, beta, dt);
        let correction = gradient(&q, &a, &m, &reference).scale(beta * dt);
        assert_quat_close(&fused, &(gyro_only - correction), 1e-12);
    }

    #[test]
    fn step_does_not_normalize() {
        let q = Quaternion::identity();
        let w = Vec3::new(2.0, 0.0, 0.0);
        let a = gravity();
        let m = Vec3::new(1.0, 0.0, 0.0);
        let reference = MagneticReference::new(1.0, 0.0);

        let next = madgwick_step(&q, &w, &a, &m, &reference, 0.1, 0.1);
        assert_quat_close(&next, &Quaternion::new(1.0, 0.1, 0.0, 0.0), 1e-15);
        assert!(next.norm() > 1.0);
    }

    #[test]
    fn new_aligns_to_first_sample() {
        let q_true = tilted();
        let config = FilterConfig::default();
        let raw = sample(0.0, &q_true, Vec3::zeros());
        let filter = Madgwick::new(&raw, &config).expect("Failed to seed filter");
        let q = filter.orientation();
        assert_abs_diff_eq!(q.dot(&q_true).abs(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn tracks_constant_yaw_rate() {
        let rate_deg = 30.0;
        let config = FilterConfig::default();
        let yaw = |t: f64| {
            let half = (rate_deg * t).to_radians() / 2.0;
            Quaternion::new(half.cos(), 0.0, 0.0, half.sin())
        };

        let mut filter = Madgwick::new(&sample(0.0, &yaw(0.0), Vec3::zeros()), &config).unwrap();
        for n in 1..=200 {
            let t = n as f64 * 0.01;
            filter
                .update(&sample(t, &yaw(t), Vec3::new(0.0, 0.0, rate_deg)))
                .unwrap();
        }

        // The correction is evaluated at the previous estimate, so it trails the
        // truth by up to one step of rotation.
        let q = filter.orientation();
        assert_abs_diff_eq!(q.dot(&yaw(2.0)).abs(), 1.0, epsilon = 1e-5);
        assert_abs_diff_eq!(q.norm(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn fusion_corrects_a_wrong_seed() {
        let q_true = tilted();
        let config = FilterConfig {
            beta: 2.0,
            ..FilterConfig::default()
        };
        let mut filter =
            Madgwick::with_orientation(Quaternion::identity(), Duration::ZERO, &config).unwrap();
        for n in 1..=1000 {
            let t = n as f64 * 0.01;
            filter.update(&sample(t, &q_true, Vec3::zeros())).unwrap();
        }
        let q = filter.orientation();
        assert_abs_diff_eq!(q.dot(&q_true).abs(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn correct_converges_without_gyro() {
        let q_true = tilted();
        let config = FilterConfig {
            alpha: 0.05,
            ..FilterConfig::default()
        };
        let mut filter =
            Madgwick::with_orientation(Quaternion::identity(), Duration::ZERO, &config).unwrap();
        // The gyro reading is garbage and must be ignored
        let raw = sample(0.0, &q_true, Vec3::new(f64::NAN, 0.0, 0.0));
        for _ in 0..500 {
            filter.correct(&raw).unwrap();
        }
        let q = filter.orientation();
        assert_abs_diff_eq!(q.dot(&q_true).abs(), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn bad_samples_leave_state_untouched() {
        let config = FilterConfig::default();
        let mut filter = Madgwick::new(&sample(0.0, &tilted(), Vec3::zeros()), &config).unwrap();
        let before = filter.orientation();

        let mut raw = sample(0.01, &tilted(), Vec3::zeros());
        raw.mx = 0.0;
        raw.my = 0.0;
        raw.mz = 0.0;
        assert_eq!(
            filter.update(&raw),
            Err(InputError::ZeroMagnitude {
                name: "magnetometer"
            })
        );

        let mut raw = sample(0.01, &tilted(), Vec3::zeros());
        raw.gz = f64::INFINITY;
        assert_eq!(
            filter.update(&raw),
            Err(InputError::NonFinite { name: "gyroscope" })
        );
        assert_eq!(filter.orientation(), before);
    }

    #[test]
    fn stale_timestamps_do_not_rewind_the_clock() {
        let config = FilterConfig {
            beta: 0.0,
            ..FilterConfig::default()
        };
        let level = Quaternion::identity();
        let yaw_rate = Vec3::new(0.0, 0.0, 90.0);
        let start = Duration::from_secs(1);
        let mut filter = Madgwick::with_orientation(level, start, &config).unwrap();

        filter.update(&sample(1.01, &level, yaw_rate)).unwrap();
        let after_first = filter.orientation();
        // Older than the last accepted sample: integrates over zero time
        filter.update(&sample(0.5, &level, yaw_rate)).unwrap();
        assert_quat_close(&filter.orientation(), &after_first, 1e-15);
        // Repeated timestamp: also zero time
        filter.update(&sample(1.01, &level, yaw_rate)).unwrap();
        assert_quat_close(&filter.orientation(), &after_first, 1e-15);
        filter.update(&sample(1.02, &level, yaw_rate)).unwrap();

        // Two 10 ms steps at 90°/s
        let q = filter.orientation();
        let yaw = 2.0 * q.k.atan2(q.w);
        assert_abs_diff_eq!(yaw, 1.8f64.to_radians(), epsilon = 1e-5);
    }

    #[test]
    fn rejects_non_unit_seed() {
        let result = Madgwick::with_orientation(
            Quaternion::new(2.0, 0.0, 0.0, 0.0),
            Duration::ZERO,
            &FilterConfig::default(),
        );
        assert!(matches!(result, Err(InputError::NotUnitNorm { .. })));
    }
}
