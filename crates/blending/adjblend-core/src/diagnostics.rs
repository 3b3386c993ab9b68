//! Diagnostic report for host-side visualization.

use serde::{Deserialize, Serialize};

use crate::analysis::{ContactPhase, MotionAnalysis, MovementRegion};
use crate::engine::{BlendResult, LayerContribution};
use crate::error::{AdjustError, Warning};
use crate::ids::ChannelId;

/// Regions, phases and per-layer contributions for one channel.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub channel: ChannelId,
    pub regions: Vec<MovementRegion>,
    pub phases: Vec<ContactPhase>,
    pub peak_speed: f32,
    pub contributions: Vec<LayerContribution>,
    pub warnings: Vec<Warning>,
}

impl DiagnosticReport {
    /// Report for an analysis alone (no blend pass yet).
    pub fn from_analysis(channel: impl Into<ChannelId>, analysis: &MotionAnalysis) -> Self {
        Self {
            channel: channel.into(),
            regions: analysis.regions.clone(),
            phases: analysis.phases.clone(),
            peak_speed: analysis.peak_speed,
            ..Default::default()
        }
    }

    /// Report for a finished blend pass.
    pub fn new(channel: impl Into<ChannelId>, analysis: &MotionAnalysis, result: &BlendResult) -> Self {
        Self {
            contributions: result.contributions.clone(),
            warnings: result.warnings.clone(),
            ..Self::from_analysis(channel, analysis)
        }
    }

    /// Layers that changed at least one sample.
    pub fn contributing(&self) -> impl Iterator<Item = &LayerContribution> + '_ {
        self.contributions.iter().filter(|c| c.contributed())
    }

    pub fn to_json(&self) -> Result<String, AdjustError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
