//! Sampled curves: ordered (time, value) pairs with a content fingerprint.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use adjblend_api_core::{lerp_values, Value};

use crate::error::AdjustError;

/// Deterministic content hash used as a cache key.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(pub u64);

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// One sample of a curve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub time: f32,
    pub value: Value,
}

impl Sample {
    pub fn new(time: f32, value: Value) -> Self {
        Self { time, value }
    }
}

/// Immutable sampled curve.
///
/// Invariants: times are finite and strictly increasing, values are finite and
/// all share one shape. Transformations build new curves.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Sample>", into = "Vec<Sample>")]
pub struct Curve {
    samples: Vec<Sample>,
}

impl Curve {
    /// Build a curve, validating its invariants.
    pub fn new(samples: Vec<Sample>) -> Result<Self, AdjustError> {
        if let Some(first) = samples.first() {
            let mut prev: Option<f32> = None;
            for (i, s) in samples.iter().enumerate() {
                if !s.time.is_finite() {
                    return Err(AdjustError::curve(format!("sample {i} has a non-finite time")));
                }
                if let Some(p) = prev {
                    if s.time <= p {
                        return Err(AdjustError::curve(format!(
                            "sample times must be strictly increasing (sample {i}: {} <= {p})",
                            s.time
                        )));
                    }
                }
                if !s.value.is_finite() {
                    return Err(AdjustError::curve(format!("sample {i} has a non-finite value")));
                }
                if !s.value.same_shape(&first.value) {
                    return Err(AdjustError::curve(format!(
                        "sample {i} shape {:?}[{}] differs from {:?}[{}]",
                        s.value.kind(),
                        s.value.len(),
                        first.value.kind(),
                        first.value.len()
                    )));
                }
                prev = Some(s.time);
            }
        }
        Ok(Self { samples })
    }

    /// Scalar curve from parallel time/value slices.
    pub fn from_scalars(times: &[f32], values: &[f32]) -> Result<Self, AdjustError> {
        if times.len() != values.len() {
            return Err(AdjustError::curve(format!(
                "{} times but {} values",
                times.len(),
                values.len()
            )));
        }
        Self::new(
            times
                .iter()
                .zip(values)
                .map(|(t, v)| Sample::new(*t, Value::Float(*v)))
                .collect(),
        )
    }

    /// Scalar curve sampled once per frame starting at time 0.
    pub fn from_frames(values: &[f32]) -> Result<Self, AdjustError> {
        let times: Vec<f32> = (0..values.len()).map(|i| i as f32).collect();
        Self::from_scalars(&times, values)
    }

    /// Curve sharing `self`'s time base with new values.
    pub fn with_values(&self, values: Vec<Value>) -> Result<Self, AdjustError> {
        if values.len() != self.samples.len() {
            return Err(AdjustError::curve(format!(
                "expected {} values, got {}",
                self.samples.len(),
                values.len()
            )));
        }
        Self::new(
            self.samples
                .iter()
                .zip(values)
                .map(|(s, v)| Sample::new(s.time, v))
                .collect(),
        )
    }

    #[inline]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn time(&self, i: usize) -> f32 {
        self.samples[i].time
    }

    #[inline]
    pub fn value(&self, i: usize) -> &Value {
        &self.samples[i].value
    }

    pub fn times(&self) -> impl Iterator<Item = f32> + '_ {
        self.samples.iter().map(|s| s.time)
    }

    pub fn values(&self) -> impl Iterator<Item = &Value> + '_ {
        self.samples.iter().map(|s| &s.value)
    }

    /// True when both curves have identical sample times.
    pub fn same_time_base(&self, other: &Curve) -> bool {
        self.len() == other.len()
            && self
                .times()
                .zip(other.times())
                .all(|(a, b)| a.to_bits() == b.to_bits())
    }

    /// Linear lookup at `time`, clamped to the first/last sample.
    /// Returns `None` for an empty curve.
    pub fn value_at(&self, time: f32) -> Option<Value> {
        let n = self.samples.len();
        let first = self.samples.first()?;
        let last = &self.samples[n - 1];
        if n == 1 || time <= first.time {
            return Some(first.value.clone());
        }
        if time >= last.time {
            return Some(last.value.clone());
        }
        let hi = self.samples.partition_point(|s| s.time <= time);
        let (a, b) = (&self.samples[hi - 1], &self.samples[hi]);
        let t = (time - a.time) / (b.time - a.time);
        lerp_values(&a.value, &b.value, t).ok()
    }

    /// Deterministic content hash over times, value shape and components.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut h = DefaultHasher::new();
        self.samples.len().hash(&mut h);
        if let Some(first) = self.samples.first() {
            first.value.kind().hash(&mut h);
            first.value.len().hash(&mut h);
        }
        for s in &self.samples {
            s.time.to_bits().hash(&mut h);
            for c in s.value.as_slice() {
                c.to_bits().hash(&mut h);
            }
        }
        Fingerprint(h.finish())
    }
}

impl TryFrom<Vec<Sample>> for Curve {
    type Error = AdjustError;

    fn try_from(samples: Vec<Sample>) -> Result<Self, Self::Error> {
        Curve::new(samples)
    }
}

impl From<Curve> for Vec<Sample> {
    fn from(curve: Curve) -> Self {
        curve.samples
    }
}
