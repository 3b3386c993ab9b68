//! adjblend-core: non-destructive adjustment blending driven by motion analysis
//! (engine-agnostic).
//!
//! Pipeline per channel: sampled base curve -> [`analysis::analyze`] ->
//! [`mask::build_masks`] -> [`BlendEngine::blend`] over a [`LayerStack`] ->
//! adjusted curve. The [`SlidingCorrector`] reads contact phases and writes
//! corrective layers back into the stack. A [`Session`] ties these together for a
//! host reached through [`HostAdapter`].

pub mod adapter;
pub mod analysis;
pub mod batch;
pub mod cache;
pub mod commands;
pub mod config;
pub mod corrector;
pub mod curve;
mod derivative;
pub mod diagnostics;
pub mod engine;
pub mod error;
pub mod ids;
pub mod layers;
pub mod mask;
pub mod sampling;
pub mod session;

// Re-exports for hosts and adapters
pub use adapter::{HostAdapter, InMemoryHost};
pub use analysis::{analyze, ContactPhase, MotionAnalysis, MovementRegion};
pub use batch::{BatchItem, BatchOutcome, CancelToken};
pub use cache::{AnalysisCache, Analyzed, CacheInfo};
pub use commands::{CacheOp, Command, CommandOutput};
pub use config::{AnalysisConfig, Config, GroundContact, WorkflowPreset};
pub use corrector::{CorrectionReport, PhaseCorrection, PhaseState, SlidingCorrector};
pub use curve::{Curve, Fingerprint, Sample};
pub use diagnostics::DiagnosticReport;
pub use engine::{BlendEngine, BlendJob, BlendResult, LayerContribution};
pub use error::{AdjustError, Warning};
pub use ids::{ChannelId, LayerId};
pub use layers::{
    smoothing_delta, AdjustmentLayer, LayerKind, LayerSpec, LayerStack, LayerState, MaskPolicy,
    StackSnapshot,
};
pub use mask::{build_masks, Masks};
pub use sampling::{sample_curve, CurveSource, Interpolation, Keyframe, Keyframes, SampleRequest};
pub use session::{ChannelAnalysis, LayerOp, Session, SessionState};
pub use adjblend_api_core::{apply_blend_mode, BlendMode, Value, ValueKind};
