//! Per-sample energy and contact weights derived from a [`MotionAnalysis`].

use serde::{Deserialize, Serialize};

use adjblend_api_core::smoothstep;

use crate::analysis::MotionAnalysis;
use crate::config::AnalysisConfig;
use crate::error::AdjustError;

/// Energy and contact weights in [0,1], one per sample.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Masks {
    /// Fades adjustments in only where the base motion has velocity.
    pub energy: Vec<f32>,
    /// Protects planted intervals; 1 outside contact phases.
    pub contact: Vec<f32>,
}

impl Masks {
    #[inline]
    pub fn len(&self) -> usize {
        self.energy.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.energy.is_empty()
    }
}

/// Build both masks.
///
/// Fails with `InvalidConfig` when the energy thresholds are inverted or the
/// contact falloff is not positive.
pub fn build_masks(analysis: &MotionAnalysis, config: &AnalysisConfig) -> Result<Masks, AdjustError> {
    config.validate_masks()?;

    let energy = analysis
        .speed
        .iter()
        .map(|s| smoothstep(config.energy_threshold_low, config.energy_threshold_high, *s))
        .collect();

    let mut contact = vec![1.0f32; analysis.len()];
    if config.preserve_motion_flow {
        for phase in &analysis.phases {
            for (i, weight) in contact
                .iter_mut()
                .enumerate()
                .take(phase.end_index + 1)
                .skip(phase.start_index)
            {
                let t = analysis.times[i];
                let to_edge = (t - phase.start_time).min(phase.end_time - t);
                *weight = 1.0 - smoothstep(0.0, config.contact_falloff, to_edge);
            }
        }
    }

    Ok(Masks { energy, contact })
}
