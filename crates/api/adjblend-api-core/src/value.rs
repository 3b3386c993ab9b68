//! Value: one sample of an animated channel.
//! All numeric types use f32, matching host curve precision.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Coarse kind of a [`Value`], used for shape checks and quick dispatch.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Float,
    Vec2,
    Vec3,
    Vec4,
    Vector,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum Value {
    /// Scalar channel (a single F-curve).
    Float(f32),

    /// 2D vector
    Vec2([f32; 2]),

    /// 3D vector (bone location, euler rotation, scale)
    Vec3([f32; 3]),

    /// 4D vector (quaternion channels are treated component-wise)
    Vec4([f32; 4]),

    /// Generic, variable-length numeric vector
    Vector(Vec<f32>),
}

/// Errors raised by component-wise value arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("value shape mismatch: expected {expected:?} with {expected_len} components, got {actual:?} with {actual_len}")]
    ShapeMismatch {
        expected: ValueKind,
        expected_len: usize,
        actual: ValueKind,
        actual_len: usize,
    },
    #[error("unsupported blend mode '{0}'")]
    UnsupportedBlendMode(String),
}

impl Value {
    /// Return the coarse kind of this value.
    #[inline]
    pub fn kind(&self) -> ValueKind {
        match self {
            Value::Float(_) => ValueKind::Float,
            Value::Vec2(_) => ValueKind::Vec2,
            Value::Vec3(_) => ValueKind::Vec3,
            Value::Vec4(_) => ValueKind::Vec4,
            Value::Vector(_) => ValueKind::Vector,
        }
    }

    /// Convenience constructors
    pub fn f(v: f32) -> Self {
        Value::Float(v)
    }

    pub fn vec3(x: f32, y: f32, z: f32) -> Self {
        Value::Vec3([x, y, z])
    }

    /// Components as a flat slice.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        match self {
            Value::Float(f) => std::slice::from_ref(f),
            Value::Vec2(a) => a,
            Value::Vec3(a) => a,
            Value::Vec4(a) => a,
            Value::Vector(v) => v,
        }
    }

    #[inline]
    fn as_mut_slice(&mut self) -> &mut [f32] {
        match self {
            Value::Float(f) => std::slice::from_mut(f),
            Value::Vec2(a) => a,
            Value::Vec3(a) => a,
            Value::Vec4(a) => a,
            Value::Vector(v) => v,
        }
    }

    /// Number of components.
    #[inline]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A value of the same shape with every component set to zero.
    pub fn zeros_like(&self) -> Self {
        self.map(|_| 0.0)
    }

    /// True when `other` has the same kind and component count.
    #[inline]
    pub fn same_shape(&self, other: &Value) -> bool {
        self.kind() == other.kind() && self.len() == other.len()
    }

    /// Apply `f` to every component, keeping the shape.
    pub fn map(&self, mut f: impl FnMut(f32) -> f32) -> Self {
        let mut out = self.clone();
        for c in out.as_mut_slice() {
            *c = f(*c);
        }
        out
    }

    /// Combine two values component-wise. Shapes must match exactly.
    pub fn zip_with(
        &self,
        other: &Value,
        mut f: impl FnMut(f32, f32) -> f32,
    ) -> Result<Self, ValueError> {
        if !self.same_shape(other) {
            return Err(self.mismatch(other));
        }
        let mut out = self.clone();
        for (o, b) in out.as_mut_slice().iter_mut().zip(other.as_slice()) {
            *o = f(*o, *b);
        }
        Ok(out)
    }

    /// Euclidean norm of the components.
    pub fn magnitude(&self) -> f32 {
        self.as_slice().iter().map(|c| c * c).sum::<f32>().sqrt()
    }

    /// Euclidean distance to another value of the same shape.
    pub fn distance(&self, other: &Value) -> Result<f32, ValueError> {
        if !self.same_shape(other) {
            return Err(self.mismatch(other));
        }
        Ok(self
            .as_slice()
            .iter()
            .zip(other.as_slice())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            .sqrt())
    }

    /// True when every component is finite.
    pub fn is_finite(&self) -> bool {
        self.as_slice().iter().all(|c| c.is_finite())
    }

    pub(crate) fn mismatch(&self, other: &Value) -> ValueError {
        ValueError::ShapeMismatch {
            expected: self.kind(),
            expected_len: self.len(),
            actual: other.kind(),
            actual_len: other.len(),
        }
    }
}
