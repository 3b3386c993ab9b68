//! Blending utilities for Value types.
//! - f32 linear interpolation for scalars and vector components
//! - smoothstep shaping used by masks and falloffs
//! - adjustment blend modes (Add, Subtract, Multiply, Replace, Overlay)
//!
//! Every blend mode is applied per component. A scalar layer sample is broadcast
//! over a vector base sample.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::coercion;
use crate::value::ValueError;
use crate::Value;

/// Linear interpolation for f32
#[inline]
pub fn lerp_f(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Hermite smoothstep of `x` between `edge0` and `edge1`, clamped to [0,1].
///
/// A degenerate range (`edge0 >= edge1`) behaves as a hard step at `edge1`:
/// values at or above the edge map to 1.
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge1 <= edge0 {
        return if x >= edge1 { 1.0 } else { 0.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Component-wise lerp between two values of the same shape.
pub fn lerp_values(a: &Value, b: &Value, t: f32) -> Result<Value, ValueError> {
    let b = coercion::broadcast_to(b, a)?;
    a.zip_with(&b, |x, y| lerp_f(x, y, t))
}

/// Image-compositing overlay for one component.
#[inline]
fn overlay_f(base: f32, layer: f32) -> f32 {
    if base < 0.5 {
        2.0 * base * layer
    } else {
        1.0 - 2.0 * (1.0 - base) * (1.0 - layer)
    }
}

/// Arithmetic rule combining a layer sample into the running result.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BlendMode {
    Add,
    Subtract,
    Multiply,
    Replace,
    Overlay,
}

impl BlendMode {
    pub const ALL: [BlendMode; 5] = [
        BlendMode::Add,
        BlendMode::Subtract,
        BlendMode::Multiply,
        BlendMode::Replace,
        BlendMode::Overlay,
    ];

    /// Stable lowercase tag used for persistence.
    pub fn tag(self) -> &'static str {
        match self {
            BlendMode::Add => "add",
            BlendMode::Subtract => "subtract",
            BlendMode::Multiply => "multiply",
            BlendMode::Replace => "replace",
            BlendMode::Overlay => "overlay",
        }
    }

    #[inline]
    fn apply_f(self, v: f32, l: f32, w: f32) -> f32 {
        match self {
            BlendMode::Add => v + l * w,
            BlendMode::Subtract => v - l * w,
            BlendMode::Multiply => v * lerp_f(1.0, l, w),
            BlendMode::Replace => lerp_f(v, l, w),
            BlendMode::Overlay => lerp_f(v, overlay_f(v, l), w),
        }
    }
}

impl fmt::Display for BlendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for BlendMode {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BlendMode::ALL
            .into_iter()
            .find(|m| m.tag().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ValueError::UnsupportedBlendMode(s.to_string()))
    }
}

/// Blend layer sample `layer` into `value` with weight `weight`.
pub fn apply_blend_mode(
    mode: BlendMode,
    value: &Value,
    layer: &Value,
    weight: f32,
) -> Result<Value, ValueError> {
    let layer = coercion::broadcast_to(layer, value)?;
    value.zip_with(&layer, |v, l| mode.apply_f(v, l, weight))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_and_subtract_scale_by_weight() {
        let v = Value::f(1.0);
        let l = Value::f(2.0);
        assert_eq!(apply_blend_mode(BlendMode::Add, &v, &l, 0.5).unwrap(), Value::f(2.0));
        assert_eq!(apply_blend_mode(BlendMode::Subtract, &v, &l, 0.5).unwrap(), Value::f(0.0));
    }

    #[test]
    fn multiply_is_identity_at_zero_weight() {
        let v = Value::vec3(1.0, 2.0, 3.0);
        let l = Value::vec3(4.0, 4.0, 4.0);
        assert_eq!(apply_blend_mode(BlendMode::Multiply, &v, &l, 0.0).unwrap(), v);
        assert_eq!(
            apply_blend_mode(BlendMode::Multiply, &v, &l, 1.0).unwrap(),
            Value::vec3(4.0, 8.0, 12.0)
        );
    }

    #[test]
    fn overlay_matches_compositing_formula() {
        let dark = apply_blend_mode(BlendMode::Overlay, &Value::f(0.25), &Value::f(0.5), 1.0).unwrap();
        assert_eq!(dark, Value::f(0.25));
        let light = apply_blend_mode(BlendMode::Overlay, &Value::f(0.75), &Value::f(0.5), 1.0).unwrap();
        assert_eq!(light, Value::f(0.75));
        let half = apply_blend_mode(BlendMode::Overlay, &Value::f(0.25), &Value::f(1.0), 0.5).unwrap();
        assert_eq!(half, Value::f(0.375));
    }

    #[test]
    fn replace_lerps_toward_layer() {
        let out = apply_blend_mode(BlendMode::Replace, &Value::f(0.0), &Value::f(10.0), 0.25).unwrap();
        assert_eq!(out, Value::f(2.5));
    }

    #[test]
    fn scalar_layer_broadcasts() {
        let out =
            apply_blend_mode(BlendMode::Add, &Value::Vec2([1.0, 2.0]), &Value::f(1.0), 1.0).unwrap();
        assert_eq!(out, Value::Vec2([2.0, 3.0]));
    }

    #[test]
    fn tags_parse_case_insensitively() {
        assert_eq!("ADD".parse::<BlendMode>().unwrap(), BlendMode::Add);
        assert_eq!(" overlay ".parse::<BlendMode>().unwrap(), BlendMode::Overlay);
        assert_eq!(
            "screen".parse::<BlendMode>().unwrap_err(),
            ValueError::UnsupportedBlendMode("screen".into())
        );
    }

    #[test]
    fn smoothstep_edges() {
        assert_eq!(smoothstep(0.0, 1.0, -1.0), 0.0);
        assert_eq!(smoothstep(0.0, 1.0, 0.5), 0.5);
        assert_eq!(smoothstep(0.0, 1.0, 2.0), 1.0);
        assert_eq!(smoothstep(0.0, 0.0, 0.0), 1.0);
        assert_eq!(smoothstep(0.5, 0.5, 0.25), 0.0);
    }
}
