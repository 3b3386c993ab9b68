//! Blend engine: base curve + layer stack + motion masks -> adjusted curve.
//!
//! Per sample i, over the active layers in stack order:
//!
//! ```text
//! value = base[i]
//! for layer in stack:
//!     weight = influence * VelocityWeight[i] * EnergyMask[i] * ContactMask[i]
//!     value  = apply_blend_mode(layer.mode, value, layer[i], weight)
//! ```
//!
//! Which of the motion factors apply depends on the layer kind (see
//! [`LayerKind::mask_policy`]). The engine owns the analysis cache; it never
//! mutates the base curve or the stack it is handed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use adjblend_api_core::{apply_blend_mode, lerp_f, BlendMode, Value};

use crate::batch::{run_batch, BatchOutcome, CancelToken};
use crate::cache::{AnalysisCache, Analyzed, CacheInfo};
use crate::config::AnalysisConfig;
use crate::curve::{Curve, Sample};
use crate::error::{AdjustError, Warning};
use crate::ids::{ChannelId, LayerId};
use crate::layers::{AdjustmentLayer, LayerKind, StackSnapshot};

/// How much one layer contributed across the curve.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerContribution {
    pub id: LayerId,
    pub name: String,
    pub kind: LayerKind,
    pub mode: BlendMode,
    /// Effective weight per sample.
    pub weights: Vec<f32>,
    pub peak_weight: f32,
    pub mean_weight: f32,
}

impl LayerContribution {
    /// True when the layer changed at least one sample's weight from zero.
    pub fn contributed(&self) -> bool {
        self.peak_weight > 0.0
    }
}

/// Adjusted curve plus the masks and weights that produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlendResult {
    /// Same length and time base as the base curve.
    pub curve: Curve,
    pub contributions: Vec<LayerContribution>,
    pub energy_mask: Vec<f32>,
    pub contact_mask: Vec<f32>,
    /// Normalized speed of the base curve.
    pub velocity_weight: Vec<f32>,
    pub warnings: Vec<Warning>,
}

/// One unit of a blend batch.
#[derive(Clone, Debug)]
pub struct BlendJob {
    pub channel: ChannelId,
    pub base: Curve,
    pub stack: StackSnapshot,
}

/// Stateless blend math plus a shared analysis cache.
#[derive(Debug, Default)]
pub struct BlendEngine {
    cache: AnalysisCache,
}

/// Layer samples on the base time base.
fn aligned_layer_values(
    layer: &AdjustmentLayer,
    base: &Curve,
    warnings: &mut Vec<Warning>,
) -> Result<Vec<Value>, AdjustError> {
    if layer.curve.same_time_base(base) {
        return Ok(layer.curve.values().cloned().collect());
    }
    if layer.curve.is_empty() {
        return Err(AdjustError::curve(format!("layer '{}' has no samples", layer.name)));
    }
    warnings.push(Warning::LayerResampled {
        layer: layer.id,
        name: layer.name.clone(),
    });
    base.times()
        .map(|t| {
            layer
                .curve
                .value_at(t)
                .ok_or_else(|| AdjustError::curve(format!("layer '{}' has no samples", layer.name)))
        })
        .collect()
}

impl BlendEngine {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            cache: AnalysisCache::new(cache_capacity),
        }
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    pub fn cache_info(&self) -> CacheInfo {
        self.cache.info()
    }

    /// Cached analysis and masks for `curve`.
    pub fn analyze(&self, curve: &Curve, config: &AnalysisConfig) -> Result<Arc<Analyzed>, AdjustError> {
        self.cache.get_or_compute(curve, config).map(|(entry, _)| entry)
    }

    /// Blend `stack` onto `base`.
    ///
    /// Errors abort the pass without touching the cache entry already stored
    /// for `base`.
    pub fn blend(
        &self,
        channel: &str,
        base: &Curve,
        stack: &StackSnapshot,
        config: &AnalysisConfig,
    ) -> Result<BlendResult, AdjustError> {
        let analyzed = self.analyze(base, config)?;
        let analysis = &analyzed.analysis;
        let masks = &analyzed.masks;
        let velocity_weight = analysis.normalized_speed();
        let n = base.len();

        let mut warnings = Vec::new();
        if n < crate::analysis::MIN_ANALYSIS_SAMPLES {
            warnings.push(Warning::TooFewSamples {
                channel: channel.to_string(),
                samples: n,
            });
        }

        let mut values: Vec<Value> = base.values().cloned().collect();
        let mut contributions = Vec::new();
        for layer in stack.active() {
            let layer_values = aligned_layer_values(layer, base, &mut warnings)?;
            let policy = layer.kind.mask_policy();
            let preservation = if policy.full_velocity {
                1.0
            } else {
                config.energy_preservation
            };

            let mut weights = Vec::with_capacity(n);
            for (i, value) in values.iter_mut().enumerate() {
                let mut weight = layer.influence;
                if policy.velocity {
                    weight *= lerp_f(1.0, velocity_weight[i], preservation);
                }
                if policy.energy {
                    weight *= masks.energy[i];
                }
                if policy.contact {
                    weight *= masks.contact[i];
                }
                *value = apply_blend_mode(layer.mode, value, &layer_values[i], weight)?;
                weights.push(weight);
            }

            let peak_weight = weights.iter().copied().fold(0.0f32, f32::max);
            let mean_weight = if n == 0 {
                0.0
            } else {
                weights.iter().sum::<f32>() / n as f32
            };
            contributions.push(LayerContribution {
                id: layer.id,
                name: layer.name.clone(),
                kind: layer.kind,
                mode: layer.mode,
                weights,
                peak_weight,
                mean_weight,
            });
        }

        let curve = Curve::new(
            base.times()
                .zip(values)
                .map(|(t, v)| Sample::new(t, v))
                .collect(),
        )?;
        log::debug!(
            "blended '{}': {} samples, {} layers, {} warnings",
            channel,
            n,
            contributions.len(),
            warnings.len()
        );

        Ok(BlendResult {
            curve,
            contributions,
            energy_mask: masks.energy.clone(),
            contact_mask: masks.contact.clone(),
            velocity_weight,
            warnings,
        })
    }

    /// Blend independent channels in parallel; one failing channel never
    /// aborts the others.
    pub fn blend_batch(
        &self,
        jobs: &[BlendJob],
        config: &AnalysisConfig,
        cancel: &CancelToken,
    ) -> BatchOutcome<BlendResult> {
        run_batch(
            jobs,
            cancel,
            |job| job.channel.clone(),
            |job| {
                let mut result = self.blend(&job.channel, &job.base, &job.stack, config)?;
                let warnings = std::mem::take(&mut result.warnings);
                Ok((result, warnings))
            },
        )
    }
}
