pub mod config;
pub mod gradient;
pub mod kernel;
pub mod madgwick;
pub mod quaternion;
pub mod validate;

use anyhow::Error;
use csv::WriterBuilder;
use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

pub use config::{load_config, ConfigError, FilterConfig};
pub use gradient::MagneticReference;
pub use madgwick::Madgwick;
pub use quaternion::{Quaternion, Vec3};
pub use validate::InputError;

/// Struct holding raw imu measurements
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
pub struct RawImuData {
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub time: Duration,
    // Accelerations, any unit (only the direction is used)
    pub ax: f64,
    pub ay: f64,
    pub az: f64,
    // Angular velocities in deg/s
    pub gx: f64,
    pub gy: f64,
    pub gz: f64,
    // Magnetic field, any unit (only the direction is used)
    pub mx: f64,
    pub my: f64,
    pub mz: f64,
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let secs = duration.as_secs_f64();
    serializer.serialize_f64(secs)
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = f64::deserialize(deserializer)?;
    Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

impl RawImuData {
    pub fn accel(&self) -> Vec3<f64> {
        Vec3::new(self.ax, self.ay, self.az)
    }

    /// Returns a vector of angular velocities in rads/s
    pub fn gyro(&self) -> Vec3<f64> {
        Vec3::new(
            self.gx.to_radians(),
            self.gy.to_radians(),
            self.gz.to_radians(),
        )
    }

    pub fn mag(&self) -> Vec3<f64> {
        Vec3::new(self.mx, self.my, self.mz)
    }
}

/// One orientation estimate, scalar first.
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq)]
pub struct Estimate {
    #[serde(
        serialize_with = "serialize_duration",
        deserialize_with = "deserialize_duration"
    )]
    pub time: Duration,
    pub w: f64,
    pub i: f64,
    pub j: f64,
    pub k: f64,
}

impl Estimate {
    pub fn new(time: Duration, q: Quaternion<f64>) -> Self {
        Self {
            time,
            w: q.w,
            i: q.i,
            j: q.j,
            k: q.k,
        }
    }

    pub fn orientation(&self) -> Quaternion<f64> {
        Quaternion::new(self.w, self.i, self.j, self.k)
    }
}

pub fn read_csv(file_path: &Path) -> Result<Vec<RawImuData>, Error> {
    let file = File::open(file_path)?;
    let mut rdr = csv::Reader::from_reader(file);

    // Deserialize each record into a data struct
    let mut data = Vec::new();
    for result in rdr.deserialize() {
        let record: RawImuData = result?;
        data.push(record);
    }

    Ok(data)
}

pub fn write_csv<R: Serialize>(file_path: &Path, data: &[R]) -> Result<(), Error> {
    let file = File::create(file_path)?;
    write_records(file, data)
}

/// Writes `data` as CSV with a header row to any writer.
pub fn write_records<W: Write, R: Serialize>(writer: W, data: &[R]) -> Result<(), Error> {
    let mut writer = WriterBuilder::new().has_headers(true).from_writer(writer);
    for record in data {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Returns the orientation implied by a single accelerometer and magnetometer
/// reading, in the filter's convention: `accel ∝ q* ⊗ (0,0,1) ⊗ q`.
///
/// Degenerate when the two readings are parallel.
pub fn initial_orientation(accel: &Vec3<f64>, mag: &Vec3<f64>) -> Quaternion<f64> {
    let acc = Vector3::<f64>::from(*accel).normalize();
    let mag = Vector3::<f64>::from(*mag).normalize();

    // Down x Mag = East
    // East x Down = North
    let y_axis = acc.cross(&mag).normalize();
    let x_axis = y_axis.cross(&acc).normalize();

    // Columns are the earth axes seen from the sensor, so the matrix maps earth
    // to sensor and the orientation is its inverse. The triad is orthonormal
    // by construction.
    let rot = Rotation3::from_matrix_unchecked(Matrix3::from_columns(&[x_axis, y_axis, acc]));
    UnitQuaternion::from_rotation_matrix(&rot).inverse().into()
}

/// How the replay driver consumes each sample.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mode {
    /// Full gyro + accelerometer + magnetometer fusion.
    #[default]
    Fusion,
    /// One accelerometer/magnetometer descent step per sample; gyro ignored.
    AccelMag,
}

/// Runs the filter over recorded samples, seeding it from the first one.
///
/// Samples the filter rejects are logged and skipped, so the output may be
/// shorter than the input. Fails only if the first sample cannot seed the
/// filter.
pub fn replay(
    samples: &[RawImuData],
    config: &FilterConfig,
    mode: Mode,
) -> Result<Vec<Estimate>, InputError> {
    let Some((first, rest)) = samples.split_first() else {
        return Ok(Vec::new());
    };

    let mut filter = Madgwick::new(first, config)?;
    let mut estimates = Vec::with_capacity(samples.len());
    estimates.push(Estimate::new(first.time, filter.orientation()));

    for raw in rest {
        let result = match mode {
            Mode::Fusion => filter.update(raw),
            Mode::AccelMag => filter.correct(raw),
        };
        if let Err(e) = result {
            warn!(time = raw.time.as_secs_f64(), error = %e, "Skipping sample");
            continue;
        }
        estimates.push(Estimate::new(raw.time, filter.orientation()));
    }

    Ok(estimates)
}
