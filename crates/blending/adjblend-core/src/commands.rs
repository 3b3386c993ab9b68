//! Typed command set over a [`Session`].
//!
//! Each host-facing operation is one [`Command`] variant; hosts that dispatch from
//! UI buttons or scripts deserialize commands from JSON instead of looking up
//! operators by string.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use adjblend_api_core::{BlendMode, Value};

use crate::adapter::HostAdapter;
use crate::batch::{BatchOutcome, CancelToken};
use crate::cache::{Analyzed, CacheInfo};
use crate::config::{Config, WorkflowPreset};
use crate::corrector::CorrectionReport;
use crate::diagnostics::DiagnosticReport;
use crate::curve::Curve;
use crate::engine::BlendResult;
use crate::error::AdjustError;
use crate::ids::{ChannelId, LayerId};
use crate::layers::{LayerKind, LayerSpec, StackSnapshot};
use crate::session::{LayerOp, Session};

fn default_influence() -> f32 {
    1.0
}

fn default_radius() -> usize {
    2
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum CacheOp {
    Clear,
    Info,
    /// Drop cached analyses of one host channel's current curve.
    Invalidate { channel: ChannelId },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Analyze the listed channels (every host channel when empty).
    Analyze {
        #[serde(default)]
        channels: Vec<ChannelId>,
    },
    FixSliding {
        channel: ChannelId,
    },
    /// Add a layer; without a curve it starts as a zero delta on the base time base.
    CreateLayer {
        channel: ChannelId,
        name: String,
        #[serde(default)]
        kind: LayerKind,
        #[serde(default = "default_mode")]
        mode: BlendMode,
        #[serde(default = "default_influence")]
        influence: f32,
        #[serde(default)]
        curve: Option<Curve>,
    },
    CreateSmoothingLayer {
        channel: ChannelId,
        #[serde(default = "default_radius")]
        radius: usize,
        #[serde(default = "default_influence")]
        influence: f32,
    },
    ApplyAll,
    /// Blend one channel and report regions, phases and layer contributions.
    Diagnose {
        channel: ChannelId,
    },
    Layer {
        channel: ChannelId,
        op: LayerOp,
    },
    Cache(CacheOp),
    SetPreset {
        preset: WorkflowPreset,
    },
}

fn default_mode() -> BlendMode {
    BlendMode::Add
}

/// What a command produced.
#[derive(Clone, Debug)]
pub enum CommandOutput {
    Analyzed(BatchOutcome<Arc<Analyzed>>),
    Corrected(CorrectionReport),
    LayerCreated { id: LayerId, stack: StackSnapshot },
    Applied(BatchOutcome<BlendResult>),
    Diagnostics(DiagnosticReport),
    Stack(StackSnapshot),
    CacheInfo(CacheInfo),
    Invalidated { entries: usize },
    Preset(Config),
}

fn zero_delta(base: &Curve) -> Result<Curve, AdjustError> {
    let zeros: Vec<Value> = base.values().map(Value::zeros_like).collect();
    base.with_values(zeros)
}

impl Session {
    /// Execute one command against `host`.
    pub fn execute(
        &self,
        host: &mut dyn HostAdapter,
        command: Command,
        cancel: &CancelToken,
    ) -> Result<CommandOutput, AdjustError> {
        match command {
            Command::Analyze { channels } => self
                .analyze_host(host, &channels, cancel)
                .map(CommandOutput::Analyzed),
            Command::FixSliding { channel } => {
                self.fix_sliding(host, &channel).map(CommandOutput::Corrected)
            }
            Command::CreateLayer {
                channel,
                name,
                kind,
                mode,
                influence,
                curve,
            } => {
                let curve = match curve {
                    Some(curve) => curve,
                    None => zero_delta(&host.sample(&channel)?)?,
                };
                let spec = LayerSpec::new(name, curve)
                    .kind(kind)
                    .mode(mode)
                    .influence(influence);
                let (id, stack) = self.add_layer(&channel, spec);
                Ok(CommandOutput::LayerCreated { id, stack })
            }
            Command::CreateSmoothingLayer {
                channel,
                radius,
                influence,
            } => {
                let (id, stack) = self.create_smoothing_layer(host, &channel, radius, influence)?;
                Ok(CommandOutput::LayerCreated { id, stack })
            }
            Command::ApplyAll => self.apply_all(host, cancel).map(CommandOutput::Applied),
            Command::Diagnose { channel } => {
                self.diagnose(host, &channel).map(CommandOutput::Diagnostics)
            }
            Command::Layer { channel, op } => self.layer_op(&channel, op).map(CommandOutput::Stack),
            Command::Cache(CacheOp::Clear) => {
                self.clear_cache();
                Ok(CommandOutput::CacheInfo(self.cache_info()))
            }
            Command::Cache(CacheOp::Info) => Ok(CommandOutput::CacheInfo(self.cache_info())),
            Command::Cache(CacheOp::Invalidate { channel }) => {
                let curve = host.sample(&channel)?;
                let entries = self.engine().cache().invalidate_curve(curve.fingerprint());
                Ok(CommandOutput::Invalidated { entries })
            }
            Command::SetPreset { preset } => Ok(CommandOutput::Preset(self.set_preset(preset))),
        }
    }
}
