//! Configuration for motion analysis, mask building and sessions.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::curve::Fingerprint;
use crate::error::AdjustError;

/// Optional height gate for contact detection: a sample can only be planted when
/// its `axis` component is at or below `level + tolerance`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroundContact {
    pub axis: usize,
    pub level: f32,
    pub tolerance: f32,
}

/// Options recognized by the analyzer, the mask builder and the corrector.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// |velocity| above which a sample belongs to a movement region.
    pub movement_threshold: f32,
    /// Movement regions closer than this (seconds/frames of curve time) are merged.
    pub merge_gap: f32,
    /// Rest speed below which a sample may be part of a contact phase.
    pub contact_threshold: f32,
    /// Max distance of a planted sample from its phase mean.
    pub contact_tolerance: f32,
    pub energy_threshold_low: f32,
    pub energy_threshold_high: f32,
    /// Width of the contact mask ramp and the corrector's blend-out.
    pub contact_falloff: f32,
    pub preserve_motion_flow: bool,
    /// Phases with fewer samples are reported and left uncorrected.
    pub min_contact_frames: usize,
    /// How strongly layer weight follows normalized speed (0 = ignore speed).
    pub energy_preservation: f32,
    pub ground: Option<GroundContact>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            movement_threshold: 0.1,
            merge_gap: 2.0,
            contact_threshold: 0.05,
            contact_tolerance: 0.02,
            energy_threshold_low: 0.01,
            energy_threshold_high: 0.5,
            contact_falloff: 3.0,
            preserve_motion_flow: true,
            min_contact_frames: 3,
            energy_preservation: 1.0,
            ground: None,
        }
    }
}

fn check_finite_non_negative(name: &str, v: f32) -> Result<(), AdjustError> {
    if !v.is_finite() || v < 0.0 {
        return Err(AdjustError::config(format!(
            "{name} must be finite and >= 0 (got {v})"
        )));
    }
    Ok(())
}

impl AnalysisConfig {
    /// Parse a configuration bundle from JSON; missing keys take defaults.
    pub fn from_json(raw: &str) -> Result<Self, AdjustError> {
        let cfg: Self = serde_json::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validate every threshold the analyzer, mask builder and corrector rely on.
    pub fn validate(&self) -> Result<(), AdjustError> {
        self.validate_analysis()?;
        self.validate_masks()
    }

    pub(crate) fn validate_analysis(&self) -> Result<(), AdjustError> {
        check_finite_non_negative("movement_threshold", self.movement_threshold)?;
        check_finite_non_negative("merge_gap", self.merge_gap)?;
        check_finite_non_negative("contact_threshold", self.contact_threshold)?;
        check_finite_non_negative("contact_tolerance", self.contact_tolerance)?;
        if let Some(ground) = &self.ground {
            if !ground.level.is_finite() {
                return Err(AdjustError::config("ground.level must be finite"));
            }
            check_finite_non_negative("ground.tolerance", ground.tolerance)?;
        }
        Ok(())
    }

    pub(crate) fn validate_masks(&self) -> Result<(), AdjustError> {
        check_finite_non_negative("energy_threshold_low", self.energy_threshold_low)?;
        check_finite_non_negative("energy_threshold_high", self.energy_threshold_high)?;
        if self.energy_threshold_low > self.energy_threshold_high {
            return Err(AdjustError::config(format!(
                "energy_threshold_low ({}) > energy_threshold_high ({})",
                self.energy_threshold_low, self.energy_threshold_high
            )));
        }
        if !self.contact_falloff.is_finite() || self.contact_falloff <= 0.0 {
            return Err(AdjustError::config(format!(
                "contact_falloff must be > 0 (got {})",
                self.contact_falloff
            )));
        }
        if !(0.0..=1.0).contains(&self.energy_preservation) {
            return Err(AdjustError::config(format!(
                "energy_preservation must be in [0,1] (got {})",
                self.energy_preservation
            )));
        }
        Ok(())
    }

    /// Deterministic content hash of every option; half of the cache key.
    pub fn fingerprint(&self) -> Fingerprint {
        let mut h = DefaultHasher::new();
        for v in [
            self.movement_threshold,
            self.merge_gap,
            self.contact_threshold,
            self.contact_tolerance,
            self.energy_threshold_low,
            self.energy_threshold_high,
            self.contact_falloff,
            self.energy_preservation,
        ] {
            v.to_bits().hash(&mut h);
        }
        self.preserve_motion_flow.hash(&mut h);
        self.min_contact_frames.hash(&mut h);
        match &self.ground {
            Some(g) => {
                1u8.hash(&mut h);
                g.axis.hash(&mut h);
                g.level.to_bits().hash(&mut h);
                g.tolerance.to_bits().hash(&mut h);
            }
            None => 0u8.hash(&mut h),
        }
        Fingerprint(h.finish())
    }
}

/// Preset configurations for common clean-up workflows.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPreset {
    #[default]
    MocapCleanup,
    KeyframePolish,
    ProceduralBlend,
    ContactFix,
    /// Leave the current analysis settings untouched.
    Custom,
}

impl WorkflowPreset {
    /// Analysis settings for this preset, or `None` for `Custom`.
    pub fn analysis(self) -> Option<AnalysisConfig> {
        let base = AnalysisConfig::default();
        match self {
            WorkflowPreset::MocapCleanup => Some(base),
            WorkflowPreset::KeyframePolish => Some(AnalysisConfig {
                movement_threshold: 0.05,
                contact_tolerance: 0.01,
                energy_preservation: 0.5,
                ..base
            }),
            WorkflowPreset::ProceduralBlend => Some(AnalysisConfig {
                energy_threshold_low: 0.0,
                energy_threshold_high: 0.1,
                preserve_motion_flow: false,
                energy_preservation: 0.0,
                ..base
            }),
            WorkflowPreset::ContactFix => Some(AnalysisConfig {
                contact_threshold: 0.1,
                contact_tolerance: 0.05,
                contact_falloff: 5.0,
                min_contact_frames: 2,
                ..base
            }),
            WorkflowPreset::Custom => None,
        }
    }
}

/// Session-level configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub analysis: AnalysisConfig,
    /// Maximum number of analyses kept in the LRU cache.
    pub cache_capacity: usize,
    pub preset: WorkflowPreset,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            analysis: AnalysisConfig::default(),
            cache_capacity: 256,
            preset: WorkflowPreset::default(),
        }
    }
}

impl Config {
    /// Build a config from a preset (Custom keeps the default analysis settings).
    pub fn from_preset(preset: WorkflowPreset) -> Self {
        Self {
            analysis: preset.analysis().unwrap_or_default(),
            preset,
            ..Self::default()
        }
    }
}
