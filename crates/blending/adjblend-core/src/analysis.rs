//! Motion analysis: velocity, acceleration, movement regions and contact phases.
//!
//! - velocity[i]: symmetric finite difference, one-sided at the first/last sample.
//! - acceleration: the same difference applied to velocity.
//! - MovementRegion: maximal run where |velocity| > `movement_threshold`; regions
//!   whose gap is smaller than `merge_gap` are merged.
//! - ContactPhase: maximal run (>= 2 samples) of at-rest samples (rest speed below
//!   `contact_threshold`, optionally gated by ground height) whose values all stay
//!   within `contact_tolerance` of the run mean.
//!
//! Curves shorter than 3 samples produce no regions or phases. The analysis is a pure
//! function of (curve, config): no randomness, no hidden state.

use serde::{Deserialize, Serialize};

use adjblend_api_core::coercion::from_components;
use adjblend_api_core::Value;

use crate::config::AnalysisConfig;
use crate::curve::{Curve, Fingerprint};
use crate::derivative::{finite_differences, rest_speeds};
use crate::error::AdjustError;

/// Minimum curve length for region/phase detection.
pub const MIN_ANALYSIS_SAMPLES: usize = 3;

/// A maximal interval of non-trivial velocity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MovementRegion {
    pub start_index: usize,
    pub end_index: usize,
    pub start_time: f32,
    pub end_time: f32,
    pub peak_velocity: f32,
    pub peak_index: usize,
}

/// A maximal planted interval.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ContactPhase {
    pub start_index: usize,
    pub end_index: usize,
    pub start_time: f32,
    pub end_time: f32,
    /// Mean value over the phase.
    pub contact_value: Value,
}

impl ContactPhase {
    /// Number of samples in the phase (both ends inclusive).
    #[inline]
    pub fn frames(&self) -> usize {
        self.end_index - self.start_index + 1
    }

    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        (self.start_index..=self.end_index).contains(&index)
    }
}

/// Everything derived from one curve and one configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MotionAnalysis {
    pub source: Fingerprint,
    pub times: Vec<f32>,
    pub velocity: Vec<Value>,
    pub acceleration: Vec<Value>,
    /// |velocity| per sample.
    pub speed: Vec<f32>,
    /// Speed relative to the slower neighbour (contact detection input).
    pub rest_speed: Vec<f32>,
    pub peak_speed: f32,
    pub regions: Vec<MovementRegion>,
    pub phases: Vec<ContactPhase>,
}

impl MotionAnalysis {
    #[inline]
    pub fn len(&self) -> usize {
        self.times.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// |velocity| normalized by the curve's peak speed: 0 when static, 1 at the peak.
    pub fn normalized_speed(&self) -> Vec<f32> {
        if self.peak_speed <= 0.0 {
            return vec![0.0; self.speed.len()];
        }
        let inv = self.peak_speed.recip();
        self.speed.iter().map(|s| (s * inv).clamp(0.0, 1.0)).collect()
    }

    /// Phase containing sample `index`, if any.
    pub fn phase_at(&self, index: usize) -> Option<&ContactPhase> {
        let pos = self.phases.partition_point(|p| p.end_index < index);
        self.phases.get(pos).filter(|p| p.contains(index))
    }
}

/// Analyze `curve` with `config`.
pub fn analyze(curve: &Curve, config: &AnalysisConfig) -> Result<MotionAnalysis, AdjustError> {
    config.validate_analysis()?;
    if let (Some(ground), Some(first)) = (&config.ground, curve.samples().first()) {
        if ground.axis >= first.value.len() {
            return Err(AdjustError::config(format!(
                "ground.axis {} out of range for {}-component values",
                ground.axis,
                first.value.len()
            )));
        }
    }

    let times: Vec<f32> = curve.times().collect();
    let values: Vec<Value> = curve.values().cloned().collect();

    let velocity = finite_differences(&times, &values);
    let acceleration = finite_differences(&times, &velocity);
    let speed: Vec<f32> = velocity.iter().map(Value::magnitude).collect();
    let rest_speed = rest_speeds(&times, &values);
    let peak_speed = speed.iter().copied().fold(0.0f32, f32::max);

    let (regions, phases) = if values.len() < MIN_ANALYSIS_SAMPLES {
        (Vec::new(), Vec::new())
    } else {
        (
            detect_regions(&times, &speed, config),
            detect_phases(&times, &values, &rest_speed, config),
        )
    };

    Ok(MotionAnalysis {
        source: curve.fingerprint(),
        times,
        velocity,
        acceleration,
        speed,
        rest_speed,
        peak_speed,
        regions,
        phases,
    })
}

fn detect_regions(times: &[f32], speed: &[f32], config: &AnalysisConfig) -> Vec<MovementRegion> {
    let mut raw: Vec<MovementRegion> = Vec::new();
    let mut i = 0;
    while i < speed.len() {
        if speed[i] <= config.movement_threshold {
            i += 1;
            continue;
        }
        let start = i;
        let mut peak_index = i;
        while i < speed.len() && speed[i] > config.movement_threshold {
            if speed[i] > speed[peak_index] {
                peak_index = i;
            }
            i += 1;
        }
        let end = i - 1;
        raw.push(MovementRegion {
            start_index: start,
            end_index: end,
            start_time: times[start],
            end_time: times[end],
            peak_velocity: speed[peak_index],
            peak_index,
        });
    }

    let mut merged: Vec<MovementRegion> = Vec::with_capacity(raw.len());
    for region in raw {
        match merged.last_mut() {
            Some(prev) if region.start_time - prev.end_time < config.merge_gap => {
                prev.end_index = region.end_index;
                prev.end_time = region.end_time;
                if region.peak_velocity > prev.peak_velocity {
                    prev.peak_velocity = region.peak_velocity;
                    prev.peak_index = region.peak_index;
                }
            }
            _ => merged.push(region),
        }
    }
    merged
}

/// Running per-component statistics of a candidate contact window.
struct Window {
    sum: Vec<f32>,
    min: Vec<f32>,
    max: Vec<f32>,
    count: usize,
}

impl Window {
    fn new(first: &[f32]) -> Self {
        Self {
            sum: first.to_vec(),
            min: first.to_vec(),
            max: first.to_vec(),
            count: 1,
        }
    }

    fn push(&mut self, v: &[f32]) {
        for (c, x) in v.iter().enumerate() {
            self.sum[c] += x;
            self.min[c] = self.min[c].min(*x);
            self.max[c] = self.max[c].max(*x);
        }
        self.count += 1;
    }

    fn mean(&self) -> Vec<f32> {
        let inv = (self.count as f32).recip();
        self.sum.iter().map(|s| s * inv).collect()
    }

    /// Whether every member of `members` lies within `tolerance` of `mean`.
    ///
    /// The bounding box decides most windows without visiting the members: a
    /// component spread past the tolerance rejects, a box whose far corner is
    /// inside the tolerance accepts. Only vector windows in between are scanned.
    fn fits(&self, members: &[Value], mean: &[f32], tolerance: f32) -> bool {
        let mut corner = 0.0f32;
        for c in 0..mean.len() {
            let reach = (mean[c] - self.min[c]).max(self.max[c] - mean[c]);
            if reach > tolerance {
                return false;
            }
            corner += reach * reach;
        }
        if corner.sqrt() <= tolerance {
            return true;
        }
        members.iter().all(|v| {
            let d: f32 = v
                .as_slice()
                .iter()
                .zip(mean)
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            d.sqrt() <= tolerance
        })
    }
}

fn detect_phases(
    times: &[f32],
    values: &[Value],
    rest_speed: &[f32],
    config: &AnalysisConfig,
) -> Vec<ContactPhase> {
    let planted = |i: usize| -> bool {
        if rest_speed[i] >= config.contact_threshold {
            return false;
        }
        match &config.ground {
            Some(g) => values[i].as_slice()[g.axis] <= g.level + g.tolerance,
            None => true,
        }
    };

    let n = values.len();
    let mut phases = Vec::new();
    let mut i = 0;
    while i < n {
        if !planted(i) {
            i += 1;
            continue;
        }
        let start = i;
        let mut window = Window::new(values[start].as_slice());
        let mut mean = window.mean();
        let mut j = start + 1;
        while j < n && planted(j) {
            window.push(values[j].as_slice());
            let candidate = window.mean();
            if !window.fits(&values[start..=j], &candidate, config.contact_tolerance) {
                break;
            }
            mean = candidate;
            j += 1;
        }
        let end = j - 1;
        if end > start {
            let contact_value =
                from_components(&values[start], &mean).unwrap_or_else(|| values[start].clone());
            phases.push(ContactPhase {
                start_index: start,
                end_index: end,
                start_time: times[start],
                end_time: times[end],
                contact_value,
            });
        }
        i = j;
    }
    phases
}
