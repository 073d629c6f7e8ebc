use anyhow::{Result, bail};
use log::{debug, info, warn};
use mocap_ekf_core::{Correction, Estimate, MocapEkf};

use crate::record::SampleEvent;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct ReplaySummary {
    pub imu_samples: usize,
    pub pose_samples: usize,
    pub predicts: usize,
    pub rejected: usize,
    pub published: usize,
    pub flying_since_s: Option<f64>,
}

/// Plays recorded samples through a [`MocapEkf`] as if they arrived live.
///
/// Predict and publish timers fire at their configured periods, measured
/// from the first sample. A timer due at or before a sample's timestamp
/// fires before that sample is handled.
pub struct Replay {
    ekf: MocapEkf,
    predict_period_s: f64,
    publish_period_s: f64,
    /// timestamp of the first sample, both timers count from here
    origin_s: Option<f64>,
    predict_ticks: u64,
    publish_ticks: u64,
    last_sample_s: Option<f64>,
    summary: ReplaySummary,
}

impl Replay {
    pub fn new(ekf: MocapEkf) -> Self {
        let config = ekf.config();
        Self {
            predict_period_s: config.predict_period_s(),
            publish_period_s: config.publish_period_s(),
            ekf,
            origin_s: None,
            predict_ticks: 0,
            publish_ticks: 0,
            last_sample_s: None,
            summary: ReplaySummary::default(),
        }
    }

    pub fn ekf(&self) -> &MocapEkf {
        &self.ekf
    }

    pub fn summary(&self) -> &ReplaySummary {
        &self.summary
    }

    /// Fires the timers due up to the event, then hands the event to the
    /// filter. Samples must arrive in time order.
    pub fn push(
        &mut self,
        event: &SampleEvent,
        mut publish: impl FnMut(&Estimate) -> Result<()>,
    ) -> Result<()> {
        let t = event.timestamp_s();
        if !t.is_finite() {
            bail!("non-finite sample timestamp");
        }
        if let Some(last_s) = self.last_sample_s.filter(|last_s| t < *last_s) {
            bail!("sample at {} s arrived after one at {} s", t, last_s);
        }
        self.last_sample_s = Some(t);

        self.run_timers_until(t, &mut publish)?;

        match event {
            SampleEvent::Imu(sample) => {
                self.summary.imu_samples += 1;
                let outcome = self.ekf.handle_imu(sample);
                if let Some(flag) = outcome.flying_flag {
                    info!("[{}] take-off detected", flag.timestamp_s);
                    self.summary.flying_since_s = Some(flag.timestamp_s);
                }
                self.record_correction("imu", t, outcome.correction);
            }
            SampleEvent::Pose(pose) => {
                self.summary.pose_samples += 1;
                let correction = self.ekf.handle_pose(pose);
                self.record_correction("mocap", t, correction);
            }
        }
        Ok(())
    }

    fn record_correction<E: core::fmt::Display>(
        &mut self,
        source: &str,
        t: f64,
        correction: core::result::Result<Correction, E>,
    ) {
        if let Err(e) = correction {
            warn!("[{}] {} correction rejected: {}", t, source, e);
            self.summary.rejected += 1;
        }
    }

    fn run_timers_until(
        &mut self,
        t: f64,
        publish: &mut impl FnMut(&Estimate) -> Result<()>,
    ) -> Result<()> {
        let origin_s = *self.origin_s.get_or_insert(t);

        loop {
            // multiples of the period, so ticks do not drift over a long replay
            let next_predict_s = origin_s + self.predict_ticks as f64 * self.predict_period_s;
            let next_publish_s = origin_s + self.publish_ticks as f64 * self.publish_period_s;
            if next_predict_s > t && next_publish_s > t {
                return Ok(());
            }

            // predict first when both are due together
            if next_predict_s <= next_publish_s {
                match self.ekf.predict_tick(next_predict_s) {
                    Ok(Correction::Applied) => self.summary.predicts += 1,
                    Ok(_) => {}
                    Err(e) => {
                        debug!("[{}] predict rejected: {}", next_predict_s, e);
                        self.summary.rejected += 1;
                    }
                }
                self.predict_ticks += 1;
            } else {
                publish(&self.ekf.estimate(next_publish_s))?;
                self.summary.published += 1;
                self.publish_ticks += 1;
            }
        }
    }

    pub fn into_summary(self) -> ReplaySummary {
        self.summary
    }
}
