//! Curve sampling: turn a host channel into a uniformly (or explicitly) time-indexed [`Curve`].
//!
//! Model:
//! - The host exposes its native interpolation through [`CurveSource::evaluate`].
//! - [`Keyframes`] is a built-in source for hosts that hand over raw keys. Each key
//!   carries the interpolation used for the segment that leaves it:
//!   Constant (hold), Linear, or Bezier timing with normalized control points
//!   (defaults {0.42, 0.0} / {0.58, 1.0}, i.e. ease-in-out).
//!
//! API:
//! - sample_curve(&dyn CurveSource, &SampleRequest) -> Curve

use serde::{Deserialize, Serialize};

use adjblend_api_core::{lerp_values, Value};

use crate::curve::{Curve, Sample};
use crate::error::AdjustError;

const DEFAULT_OUT_X: f32 = 0.42;
const DEFAULT_OUT_Y: f32 = 0.0;
const DEFAULT_IN_X: f32 = 0.58;
const DEFAULT_IN_Y: f32 = 1.0;

/// Anything that can be evaluated at an arbitrary time.
pub trait CurveSource {
    fn evaluate(&self, time: f32) -> Value;
}

impl<F> CurveSource for F
where
    F: Fn(f32) -> Value,
{
    fn evaluate(&self, time: f32) -> Value {
        self(time)
    }
}

/// Segment interpolation leaving a key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Interpolation {
    Constant,
    Linear,
    /// Cubic-bezier timing; control points are in the normalized segment square.
    Bezier { x1: f32, y1: f32, x2: f32, y2: f32 },
    /// Bezier with the default ease-in-out control points.
    #[default]
    Auto,
}

/// A single key on a host channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Keyframe {
    pub time: f32,
    pub value: Value,
    #[serde(default)]
    pub interpolation: Interpolation,
}

/// Keyed channel evaluated with per-segment interpolation.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Keyframes {
    pub keys: Vec<Keyframe>,
}

/// Cubic Bezier basis function
#[inline]
fn cubic_bezier(p0: f32, p1: f32, p2: f32, p3: f32, t: f32) -> f32 {
    let u = 1.0 - t;
    u * u * u * p0 + 3.0 * u * u * t * p1 + 3.0 * u * t * t * p2 + t * t * t * p3
}

/// Given control points (x1, y1, x2, y2) and an input t in [0,1],
/// compute the eased y by inverting the x bezier via binary search.
fn bezier_ease_t(t: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> f32 {
    let t = t.clamp(0.0, 1.0);
    if x1 == 0.0 && y1 == 0.0 && x2 == 1.0 && y2 == 1.0 {
        return t;
    }
    let (x1, x2) = (x1.clamp(0.0, 1.0), x2.clamp(0.0, 1.0));
    let mut lo = 0.0f32;
    let mut hi = 1.0f32;
    let mut mid = t;
    for _ in 0..24 {
        let x = cubic_bezier(0.0, x1, x2, 1.0, mid);
        if (x - t).abs() < 1e-6 {
            break;
        }
        if x < t {
            lo = mid;
        } else {
            hi = mid;
        }
        mid = 0.5 * (lo + hi);
    }
    cubic_bezier(0.0, y1, y2, 1.0, mid)
}

impl Keyframes {
    pub fn new(mut keys: Vec<Keyframe>) -> Self {
        keys.sort_by(|a, b| a.time.total_cmp(&b.time));
        Self { keys }
    }

    /// First and last key time, if any.
    pub fn time_range(&self) -> Option<(f32, f32)> {
        Some((self.keys.first()?.time, self.keys.last()?.time))
    }

    /// Find the segment [i, i+1] containing `time` with the local parameter in [0,1].
    /// Outside the keyed range the nearest key is held.
    fn find_segment(&self, time: f32) -> (usize, usize, f32) {
        let n = self.keys.len();
        if n <= 1 || time <= self.keys[0].time {
            return (0, 0, 0.0);
        }
        if time >= self.keys[n - 1].time {
            return (n - 1, n - 1, 0.0);
        }
        let hi = self.keys.partition_point(|k| k.time <= time);
        let (t0, t1) = (self.keys[hi - 1].time, self.keys[hi].time);
        let denom = (t1 - t0).max(f32::EPSILON);
        (hi - 1, hi, ((time - t0) / denom).clamp(0.0, 1.0))
    }
}

impl CurveSource for Keyframes {
    fn evaluate(&self, time: f32) -> Value {
        if self.keys.is_empty() {
            // Fail-soft: an unkeyed channel reads as a neutral scalar.
            return Value::Float(0.0);
        }
        let (i0, i1, lt) = self.find_segment(time);
        let left = &self.keys[i0];
        if i0 == i1 {
            return left.value.clone();
        }
        let right = &self.keys[i1];
        let eased = match left.interpolation {
            Interpolation::Constant => return left.value.clone(),
            Interpolation::Linear => lt,
            Interpolation::Bezier { x1, y1, x2, y2 } => bezier_ease_t(lt, x1, y1, x2, y2),
            Interpolation::Auto => {
                bezier_ease_t(lt, DEFAULT_OUT_X, DEFAULT_OUT_Y, DEFAULT_IN_X, DEFAULT_IN_Y)
            }
        };
        lerp_values(&left.value, &right.value, eased).unwrap_or_else(|_| left.value.clone())
    }
}

/// Which times to sample.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SampleRequest {
    /// `count` evenly spaced samples over [start, end], both inclusive.
    Uniform { start: f32, end: f32, count: usize },
    /// One sample per frame at `fps` over [start, end]; the end is always included.
    FrameRate { start: f32, end: f32, fps: f32 },
    /// Caller-provided, strictly increasing sample times.
    Explicit { times: Vec<f32> },
}

fn check_range(start: f32, end: f32) -> Result<(), AdjustError> {
    if !start.is_finite() || !end.is_finite() || end <= start {
        return Err(AdjustError::range(format!(
            "time range [{start}, {end}] is empty"
        )));
    }
    Ok(())
}

/// Reject resolved times that collapsed onto each other under f32 rounding.
fn check_increasing(times: Vec<f32>) -> Result<Vec<f32>, AdjustError> {
    if times.iter().any(|t| !t.is_finite()) || times.windows(2).any(|w| w[1] <= w[0]) {
        return Err(AdjustError::range(
            "sample times must be finite and strictly increasing",
        ));
    }
    Ok(times)
}

impl SampleRequest {
    /// Resolve the request into sample times, validating it.
    pub fn times(&self) -> Result<Vec<f32>, AdjustError> {
        match self {
            SampleRequest::Uniform { start, end, count } => {
                check_range(*start, *end)?;
                if *count < 2 {
                    return Err(AdjustError::range(format!(
                        "sample count must be >= 2 (got {count})"
                    )));
                }
                let step = (end - start) / (*count - 1) as f32;
                let mut times: Vec<f32> =
                    (0..*count).map(|i| start + step * i as f32).collect();
                // Pin the last sample so rounding never leaves the range.
                times[*count - 1] = *end;
                check_increasing(times)
            }
            SampleRequest::FrameRate { start, end, fps } => {
                check_range(*start, *end)?;
                if !fps.is_finite() || *fps <= 0.0 {
                    return Err(AdjustError::range(format!("fps must be > 0 (got {fps})")));
                }
                let step = fps.recip();
                let frames = ((end - start) * fps).ceil() as usize;
                let mut times: Vec<f32> = (0..frames)
                    .map(|f| start + step * f as f32)
                    .filter(|t| *t < *end)
                    .collect();
                times.push(*end);
                if times.len() < 2 {
                    return Err(AdjustError::range("frame rate yields fewer than 2 samples"));
                }
                check_increasing(times)
            }
            SampleRequest::Explicit { times } => {
                if times.len() < 2 {
                    return Err(AdjustError::range(format!(
                        "sample count must be >= 2 (got {})",
                        times.len()
                    )));
                }
                check_increasing(times.clone())
            }
        }
    }
}

/// Sample `source` at the requested times.
pub fn sample_curve(
    source: &dyn CurveSource,
    request: &SampleRequest,
) -> Result<Curve, AdjustError> {
    let samples = request
        .times()?
        .into_iter()
        .map(|t| Sample::new(t, source.evaluate(t)))
        .collect();
    Curve::new(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_keys() -> Keyframes {
        Keyframes::new(vec![
            Keyframe {
                time: 0.0,
                value: Value::f(0.0),
                interpolation: Interpolation::Linear,
            },
            Keyframe {
                time: 4.0,
                value: Value::f(8.0),
                interpolation: Interpolation::Linear,
            },
        ])
    }

    #[test]
    fn uniform_sampling_hits_both_ends() {
        let c = sample_curve(
            &linear_keys(),
            &SampleRequest::Uniform {
                start: 0.0,
                end: 4.0,
                count: 5,
            },
        )
        .unwrap();
        let values: Vec<f32> = c.values().map(|v| v.as_slice()[0]).collect();
        assert_eq!(values, vec![0.0, 2.0, 4.0, 6.0, 8.0]);
    }

    #[test]
    fn empty_range_and_short_counts_fail() {
        let keys = linear_keys();
        for req in [
            SampleRequest::Uniform {
                start: 1.0,
                end: 1.0,
                count: 4,
            },
            SampleRequest::Uniform {
                start: 0.0,
                end: 1.0,
                count: 1,
            },
            SampleRequest::Explicit { times: vec![0.0] },
            SampleRequest::Explicit {
                times: vec![0.0, 2.0, 1.0],
            },
        ] {
            let err = sample_curve(&keys, &req).unwrap_err();
            assert!(matches!(err, AdjustError::InvalidRange { .. }), "{req:?}");
        }
    }

    #[test]
    fn dense_request_over_tiny_range_is_a_range_error() {
        // f32 spacing near 1000 is ~6e-5, so these times collapse onto each other.
        let req = SampleRequest::Uniform {
            start: 1000.0,
            end: 1000.001,
            count: 10_000,
        };
        assert!(matches!(req.times(), Err(AdjustError::InvalidRange { .. })));
        assert!(matches!(
            sample_curve(&linear_keys(), &req),
            Err(AdjustError::InvalidRange { .. })
        ));
    }

    #[test]
    fn frame_rate_includes_end() {
        let times = SampleRequest::FrameRate {
            start: 0.0,
            end: 1.0,
            fps: 4.0,
        }
        .times()
        .unwrap();
        assert_eq!(times, vec![0.0, 0.25, 0.5, 0.75, 1.0]);
    }

    #[test]
    fn constant_holds_and_auto_eases() {
        let keys = Keyframes::new(vec![
            Keyframe {
                time: 0.0,
                value: Value::f(0.0),
                interpolation: Interpolation::Constant,
            },
            Keyframe {
                time: 1.0,
                value: Value::f(1.0),
                interpolation: Interpolation::Auto,
            },
            Keyframe {
                time: 2.0,
                value: Value::f(2.0),
                interpolation: Interpolation::Linear,
            },
        ]);
        assert_eq!(keys.evaluate(0.9), Value::f(0.0));
        // Ease-in-out is symmetric around the segment midpoint.
        let mid = keys.evaluate(1.5).as_slice()[0];
        assert!((mid - 1.5).abs() < 1e-3, "mid={mid}");
        let early = keys.evaluate(1.1).as_slice()[0];
        assert!(early < 1.1, "ease-in should lag linear, got {early}");
        assert_eq!(keys.evaluate(5.0), Value::f(2.0));
    }

    #[test]
    fn closures_are_sources() {
        let src = |t: f32| Value::f(t * t);
        let c = sample_curve(
            &src,
            &SampleRequest::Explicit {
                times: vec![1.0, 2.0, 3.0],
            },
        )
        .unwrap();
        assert_eq!(c.value(2), &Value::f(9.0));
    }
}
