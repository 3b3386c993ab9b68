//! Coercion helpers between Value shapes.
//! Only scalar -> vector broadcasting is supported; every other mismatch is an error
//! so that a bad layer curve never silently corrupts a channel.

use crate::value::ValueError;
use crate::Value;

/// Broadcast `v` to the shape of `like`.
/// Rules:
/// - same shape -> clone
/// - Float -> every component of `like` set to the scalar
/// - anything else -> `ShapeMismatch`
pub fn broadcast_to(v: &Value, like: &Value) -> Result<Value, ValueError> {
    if v.same_shape(like) {
        return Ok(v.clone());
    }
    match v {
        Value::Float(f) => Ok(like.map(|_| *f)),
        _ => Err(like.mismatch(v)),
    }
}

/// Convert a Value into a Vec<f32> (generic vector).
pub fn to_vector(v: &Value) -> Vec<f32> {
    v.as_slice().to_vec()
}

/// Rebuild a value with the same shape as `like` from raw components.
/// Returns `None` when the component count does not match.
pub fn from_components(like: &Value, components: &[f32]) -> Option<Value> {
    if components.len() != like.len() {
        return None;
    }
    let mut i = 0;
    Some(like.map(|_| {
        let c = components[i];
        i += 1;
        c
    }))
}
