//! Session: explicit owner of layer stacks, the analysis cache and the active
//! configuration. Correction state lives in the stacks themselves (stamped
//! `ContactFix` layers), so saving and reloading a session loses nothing.
//!
//! Concurrency model:
//! - Stacks live behind one `RwLock`; mutations are serialized, blend passes read
//!   a [`StackSnapshot`] taken under the read lock and never hold it while blending.
//! - Analysis and blending of different channels run in parallel (rayon) and only
//!   meet in the cache.
//! - Batches check a [`CancelToken`] between channels.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::adapter::HostAdapter;
use crate::batch::{run_batch, BatchOutcome, CancelToken};
use crate::cache::{Analyzed, CacheInfo};
use crate::config::{AnalysisConfig, Config, WorkflowPreset};
use crate::corrector::{CorrectionReport, SlidingCorrector};
use crate::curve::Curve;
use crate::diagnostics::DiagnosticReport;
use crate::engine::{BlendEngine, BlendJob, BlendResult};
use crate::error::{AdjustError, Warning};
use crate::ids::{ChannelId, LayerId};
use crate::layers::{smoothing_delta, LayerKind, LayerSpec, LayerStack, LayerState, StackSnapshot};

/// Typed edit on one channel's layer stack.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum LayerOp {
    Remove { id: LayerId },
    Reorder { id: LayerId, index: usize },
    SetInfluence { id: LayerId, value: f32 },
    SetEnabled { id: LayerId, enabled: bool },
    Rename { id: LayerId, name: String },
    Solo { id: Option<LayerId> },
}

/// Result of analyzing one channel.
#[derive(Clone, Debug)]
pub struct ChannelAnalysis {
    pub analyzed: Arc<Analyzed>,
    pub report: DiagnosticReport,
}

/// Everything a host needs to persist: layer states per channel.
pub type SessionState = BTreeMap<ChannelId, Vec<LayerState>>;

#[derive(Debug, Default)]
pub struct Session {
    config: RwLock<Config>,
    stacks: RwLock<HashMap<ChannelId, LayerStack>>,
    engine: BlendEngine,
    corrector: SlidingCorrector,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

fn too_short(channel: &str, analyzed: &Analyzed) -> Vec<Warning> {
    let samples = analyzed.analysis.len();
    if samples < crate::analysis::MIN_ANALYSIS_SAMPLES {
        vec![Warning::TooFewSamples {
            channel: channel.to_string(),
            samples,
        }]
    } else {
        Vec::new()
    }
}

impl Session {
    pub fn new(config: Config) -> Result<Self, AdjustError> {
        config.analysis.validate()?;
        Ok(Self {
            engine: BlendEngine::new(config.cache_capacity),
            config: RwLock::new(config),
            stacks: RwLock::default(),
            corrector: SlidingCorrector::new(),
        })
    }

    pub fn from_preset(preset: WorkflowPreset) -> Result<Self, AdjustError> {
        Self::new(Config::from_preset(preset))
    }

    pub fn config(&self) -> Config {
        read(&self.config).clone()
    }

    pub fn analysis_config(&self) -> AnalysisConfig {
        read(&self.config).analysis.clone()
    }

    /// Replace the configuration; the cache is resized, entries stay valid
    /// because they are keyed by the config fingerprint.
    pub fn set_config(&self, config: Config) -> Result<(), AdjustError> {
        config.analysis.validate()?;
        self.engine.cache().resize(config.cache_capacity);
        *write(&self.config) = config;
        Ok(())
    }

    /// Switch workflow preset. `Custom` keeps the current analysis settings.
    pub fn set_preset(&self, preset: WorkflowPreset) -> Config {
        let mut config = write(&self.config);
        if let Some(analysis) = preset.analysis() {
            config.analysis = analysis;
        }
        config.preset = preset;
        log::debug!("preset set to {:?}", preset);
        config.clone()
    }

    pub fn engine(&self) -> &BlendEngine {
        &self.engine
    }

    pub fn cache_info(&self) -> CacheInfo {
        self.engine.cache_info()
    }

    pub fn clear_cache(&self) {
        self.engine.cache().clear();
    }

    /// Channels that currently own a layer stack.
    pub fn channels(&self) -> Vec<ChannelId> {
        let mut names: Vec<ChannelId> = read(&self.stacks).keys().cloned().collect();
        names.sort();
        names
    }

    /// Consistent copy of a channel's stack (empty when it has none).
    pub fn snapshot(&self, channel: &str) -> StackSnapshot {
        read(&self.stacks)
            .get(channel)
            .map(LayerStack::snapshot)
            .unwrap_or_default()
    }

    /// Run `edit` under the write lock on `channel`'s stack, creating it if needed.
    pub fn with_stack<R>(
        &self,
        channel: &str,
        edit: impl FnOnce(&mut LayerStack) -> Result<R, AdjustError>,
    ) -> Result<R, AdjustError> {
        let mut stacks = write(&self.stacks);
        let stack = stacks.entry(channel.to_string()).or_default();
        edit(stack)
    }

    pub fn add_layer(&self, channel: &str, spec: LayerSpec) -> (LayerId, StackSnapshot) {
        let mut stacks = write(&self.stacks);
        stacks.entry(channel.to_string()).or_default().add_layer(spec)
    }

    pub fn layer_op(&self, channel: &str, op: LayerOp) -> Result<StackSnapshot, AdjustError> {
        let mut stacks = write(&self.stacks);
        let stack = match stacks.get_mut(channel) {
            Some(stack) => stack,
            None => {
                let id = match &op {
                    LayerOp::Remove { id }
                    | LayerOp::Reorder { id, .. }
                    | LayerOp::SetInfluence { id, .. }
                    | LayerOp::SetEnabled { id, .. }
                    | LayerOp::Rename { id, .. } => *id,
                    LayerOp::Solo { id: None } => return Ok(StackSnapshot::default()),
                    LayerOp::Solo { id: Some(id) } => *id,
                };
                return Err(AdjustError::UnknownLayer { id });
            }
        };
        match op {
            LayerOp::Remove { id } => stack.remove_layer(id),
            LayerOp::Reorder { id, index } => stack.reorder(id, index),
            LayerOp::SetInfluence { id, value } => stack.set_influence(id, value),
            LayerOp::SetEnabled { id, enabled } => stack.set_enabled(id, enabled),
            LayerOp::Rename { id, name } => stack.rename(id, name),
            LayerOp::Solo { id } => stack.set_solo(id),
        }
    }

    /// Analyze one host channel (cached).
    pub fn analyze(&self, host: &dyn HostAdapter, channel: &str) -> Result<ChannelAnalysis, AdjustError> {
        let curve = host.sample(channel)?;
        let analyzed = self.engine.analyze(&curve, &self.analysis_config())?;
        let mut report = DiagnosticReport::from_analysis(channel, &analyzed.analysis);
        report.warnings = too_short(channel, &analyzed);
        Ok(ChannelAnalysis { analyzed, report })
    }

    /// Analyze independent curves in parallel.
    pub fn analyze_batch(
        &self,
        curves: &[(ChannelId, Curve)],
        cancel: &CancelToken,
    ) -> BatchOutcome<Arc<Analyzed>> {
        let config = self.analysis_config();
        run_batch(
            curves,
            cancel,
            |(channel, _)| channel.clone(),
            |(channel, curve)| {
                let analyzed = self.engine.analyze(curve, &config)?;
                let warnings = too_short(channel, &analyzed);
                Ok((analyzed, warnings))
            },
        )
    }

    /// Sample `channels` from the host (all host channels when empty) and analyze them.
    pub fn analyze_host(
        &self,
        host: &dyn HostAdapter,
        channels: &[ChannelId],
        cancel: &CancelToken,
    ) -> Result<BatchOutcome<Arc<Analyzed>>, AdjustError> {
        let names = if channels.is_empty() {
            host.channels()
        } else {
            channels.to_vec()
        };
        let curves = names
            .into_iter()
            .map(|name| host.sample(&name).map(|curve| (name, curve)))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.analyze_batch(&curves, cancel))
    }

    /// Detect contact phases on `channel` and write corrective layers.
    pub fn fix_sliding(&self, host: &dyn HostAdapter, channel: &str) -> Result<CorrectionReport, AdjustError> {
        let curve = host.sample(channel)?;
        let config = self.analysis_config();
        let analyzed = self.engine.analyze(&curve, &config)?;
        self.with_stack(channel, |stack| {
            self.corrector
                .correct(channel, &curve, &analyzed.analysis, &config, stack)
        })
    }

    /// Add a `Smoothing` layer that pulls `channel` toward its moving average.
    pub fn create_smoothing_layer(
        &self,
        host: &dyn HostAdapter,
        channel: &str,
        radius: usize,
        influence: f32,
    ) -> Result<(LayerId, StackSnapshot), AdjustError> {
        let curve = host.sample(channel)?;
        let delta = smoothing_delta(&curve, radius)?;
        let spec = LayerSpec::new(format!("Smoothing {channel} r{radius}"), delta)
            .kind(LayerKind::Smoothing)
            .influence(influence);
        Ok(self.add_layer(channel, spec))
    }

    /// Blend one channel's stack onto its host curve.
    pub fn blend(&self, host: &dyn HostAdapter, channel: &str) -> Result<BlendResult, AdjustError> {
        let base = host.sample(channel)?;
        let stack = self.snapshot(channel);
        self.engine.blend(channel, &base, &stack, &self.analysis_config())
    }

    /// Blend one channel and report its regions, phases and per-layer
    /// contributions together.
    pub fn diagnose(&self, host: &dyn HostAdapter, channel: &str) -> Result<DiagnosticReport, AdjustError> {
        let base = host.sample(channel)?;
        let config = self.analysis_config();
        let analyzed = self.engine.analyze(&base, &config)?;
        let result = self
            .engine
            .blend(channel, &base, &self.snapshot(channel), &config)?;
        Ok(DiagnosticReport::new(channel, &analyzed.analysis, &result))
    }

    /// Blend every channel that owns a stack and write the results back.
    ///
    /// Channels are blended in parallel; writes happen afterwards on the calling
    /// thread. A failing channel is reported in its item and never blocks others.
    pub fn apply_all(
        &self,
        host: &mut dyn HostAdapter,
        cancel: &CancelToken,
    ) -> Result<BatchOutcome<BlendResult>, AdjustError> {
        let jobs = self
            .channels()
            .into_iter()
            .map(|channel| {
                let base = host.sample(&channel)?;
                let stack = self.snapshot(&channel);
                Ok(BlendJob {
                    channel,
                    base,
                    stack,
                })
            })
            .collect::<Result<Vec<_>, AdjustError>>()?;

        let mut outcome = self
            .engine
            .blend_batch(&jobs, &self.analysis_config(), cancel);
        for item in &mut outcome.items {
            if let Ok(result) = &item.result {
                if let Err(err) = host.write(&item.channel, &result.curve) {
                    item.result = Err(err);
                }
            }
        }
        log::debug!(
            "applied {} of {} channels",
            outcome.succeeded().count(),
            outcome.len()
        );
        Ok(outcome)
    }

    /// Persistable layer state of every channel.
    pub fn save_state(&self) -> SessionState {
        read(&self.stacks)
            .iter()
            .map(|(channel, stack)| (channel.clone(), stack.to_states()))
            .collect()
    }

    /// Replace all stacks from persisted state. On error nothing changes.
    pub fn load_state(&self, state: SessionState) -> Result<(), AdjustError> {
        let mut rebuilt = HashMap::with_capacity(state.len());
        for (channel, states) in state {
            rebuilt.insert(channel, LayerStack::from_states(states)?);
        }
        *write(&self.stacks) = rebuilt;
        Ok(())
    }
}
