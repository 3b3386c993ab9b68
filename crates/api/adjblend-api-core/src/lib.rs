//! adjblend-api-core: engine-agnostic value model and blend math shared by the
//! adjustment-blending crates.

pub mod blend;
pub mod coercion;
pub mod value;

pub use blend::{apply_blend_mode, lerp_f, lerp_values, smoothstep, BlendMode};
pub use value::{Value, ValueError, ValueKind};
