use std::io::{Read, Write};

use anyhow::{Context, Result, anyhow, bail};
use mocap_ekf_core::{Estimate, ImuSample, PoseSample};
use nalgebra::{Quaternion, UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleKind {
    Imu,
    Mocap,
}

/// One row of a recording. IMU rows fill `ax..gz` and the orientation,
/// mocap rows fill `tx..tz` and the orientation.
#[derive(Debug, Clone, Deserialize)]
pub struct SampleRecord {
    pub kind: SampleKind,
    pub t: f64,
    pub ax: Option<f64>,
    pub ay: Option<f64>,
    pub az: Option<f64>,
    pub gx: Option<f64>,
    pub gy: Option<f64>,
    pub gz: Option<f64>,
    pub qw: f64,
    pub qx: f64,
    pub qy: f64,
    pub qz: f64,
    pub tx: Option<f64>,
    pub ty: Option<f64>,
    pub tz: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleEvent {
    Imu(ImuSample),
    Pose(PoseSample),
}

impl SampleEvent {
    pub fn timestamp_s(&self) -> f64 {
        match self {
            SampleEvent::Imu(sample) => sample.timestamp_s,
            SampleEvent::Pose(pose) => pose.timestamp_s,
        }
    }
}

fn vector(name: &str, x: Option<f64>, y: Option<f64>, z: Option<f64>) -> Result<Vector3<f64>> {
    match (x, y, z) {
        (Some(x), Some(y), Some(z)) => Ok(Vector3::new(x, y, z)),
        _ => Err(anyhow!("missing {} component", name)),
    }
}

impl SampleRecord {
    fn orientation(&self) -> Result<UnitQuaternion<f64>> {
        let q = Quaternion::new(self.qw, self.qx, self.qy, self.qz);
        if !(q.norm() > 1e-9) {
            bail!("degenerate orientation quaternion");
        }
        Ok(UnitQuaternion::from_quaternion(q))
    }

    pub fn into_event(self) -> Result<SampleEvent> {
        let orientation = self.orientation()?;
        Ok(match self.kind {
            SampleKind::Imu => SampleEvent::Imu(ImuSample {
                timestamp_s: self.t,
                linear_acceleration: vector("acceleration", self.ax, self.ay, self.az)?,
                angular_velocity: vector("angular velocity", self.gx, self.gy, self.gz)?,
                orientation,
            }),
            SampleKind::Mocap => SampleEvent::Pose(PoseSample {
                timestamp_s: self.t,
                translation: vector("translation", self.tx, self.ty, self.tz)?,
                rotation: orientation,
            }),
        })
    }
}

pub fn read_samples(reader: impl Read) -> Result<Vec<SampleEvent>> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    csv_reader
        .deserialize::<SampleRecord>()
        .enumerate()
        .map(|(i, record)| {
            // header is line 1
            let line = i + 2;
            record
                .map_err(anyhow::Error::from)
                .and_then(SampleRecord::into_event)
                .with_context(|| format!("bad sample on line {}", line))
        })
        .collect()
}

/// One published estimate, flattened for csv.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EstimateRecord {
    pub t: f64,
    pub pn: f64,
    pub pe: f64,
    pub pd: f64,
    pub qw: f64,
    pub qx: f64,
    pub qy: f64,
    pub qz: f64,
    pub u: f64,
    pub v: f64,
    pub w: f64,
    pub p: f64,
    pub q: f64,
    pub r: f64,
    pub var_pn: f64,
    pub var_pe: f64,
    pub var_pd: f64,
    pub var_roll: f64,
    pub var_pitch: f64,
    pub var_yaw: f64,
    pub var_u: f64,
    pub var_v: f64,
    pub var_w: f64,
}

impl From<&Estimate> for EstimateRecord {
    fn from(estimate: &Estimate) -> Self {
        let orientation = estimate.orientation.quaternion();
        let [var_pn, var_pe, var_pd, var_roll, var_pitch, var_yaw] = estimate.pose_covariance;
        let [var_u, var_v, var_w, ..] = estimate.twist_covariance;
        Self {
            t: estimate.timestamp_s,
            pn: estimate.position_ned.x,
            pe: estimate.position_ned.y,
            pd: estimate.position_ned.z,
            qw: orientation.w,
            qx: orientation.i,
            qy: orientation.j,
            qz: orientation.k,
            u: estimate.velocity_body.x,
            v: estimate.velocity_body.y,
            w: estimate.velocity_body.z,
            p: estimate.angular_velocity_body.x,
            q: estimate.angular_velocity_body.y,
            r: estimate.angular_velocity_body.z,
            var_pn,
            var_pe,
            var_pd,
            var_roll,
            var_pitch,
            var_yaw,
            var_u,
            var_v,
            var_w,
        }
    }
}

pub struct EstimateWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> EstimateWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(writer),
        }
    }

    pub fn write(&mut self, estimate: &Estimate) -> Result<()> {
        self.writer.serialize(EstimateRecord::from(estimate))?;
        Ok(())
    }

    pub fn finish(mut self) -> Result<W> {
        self.writer.flush()?;
        self.writer
            .into_inner()
            .map_err(|e| anyhow!("failed to flush estimates: {}", e.error()))
    }
}
