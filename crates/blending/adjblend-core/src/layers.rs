//! Adjustment layers and the ordered layer stack.
//!
//! Layers are addressed by [`LayerId`], never by position, so reordering never
//! invalidates an id held by the host. Every mutating operation validates the id
//! and returns a snapshot of the updated stack.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use adjblend_api_core::{BlendMode, Value};

use crate::curve::{Curve, Fingerprint};
use crate::error::AdjustError;
use crate::ids::LayerId;

/// Purpose of a layer; decides which motion masks scale its weight.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LayerKind {
    #[default]
    Additive,
    EnergyPreserve,
    ContactFix,
    Smoothing,
}

/// Which motion-derived weights a layer is multiplied by.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MaskPolicy {
    pub velocity: bool,
    /// Ignore the configured `energy_preservation` and weight fully by speed.
    pub full_velocity: bool,
    pub energy: bool,
    pub contact: bool,
}

impl LayerKind {
    pub const ALL: [LayerKind; 4] = [
        LayerKind::Additive,
        LayerKind::EnergyPreserve,
        LayerKind::ContactFix,
        LayerKind::Smoothing,
    ];

    pub fn tag(self) -> &'static str {
        match self {
            LayerKind::Additive => "additive",
            LayerKind::EnergyPreserve => "energy_preserve",
            LayerKind::ContactFix => "contact_fix",
            LayerKind::Smoothing => "smoothing",
        }
    }

    pub fn mask_policy(self) -> MaskPolicy {
        match self {
            LayerKind::Additive | LayerKind::Smoothing => MaskPolicy {
                velocity: true,
                full_velocity: false,
                energy: true,
                contact: true,
            },
            LayerKind::EnergyPreserve => MaskPolicy {
                velocity: true,
                full_velocity: true,
                energy: true,
                contact: true,
            },
            // Corrective curves carry their own falloff and target planted samples.
            LayerKind::ContactFix => MaskPolicy {
                velocity: false,
                full_velocity: false,
                energy: false,
                contact: false,
            },
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

impl FromStr for LayerKind {
    type Err = AdjustError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim();
        LayerKind::ALL
            .into_iter()
            .find(|k| k.tag().eq_ignore_ascii_case(key) || format!("{k:?}").eq_ignore_ascii_case(key))
            .ok_or_else(|| AdjustError::UnsupportedLayerKind { tag: s.to_string() })
    }
}

/// Provenance of a layer written by the sliding corrector.
///
/// Persisted with the layer so a reloaded stack still knows which base curve and
/// which contact spans its correction was built for.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrectionStamp {
    /// Fingerprint of the base curve the correction was computed from.
    pub source: Fingerprint,
    /// Corrected phases as inclusive sample index spans.
    pub spans: Vec<(usize, usize)>,
    /// Fingerprint of the corrective delta as written.
    pub delta: Fingerprint,
}

/// A named, weighted delta curve applied on top of a base curve.
#[derive(Clone, Debug, PartialEq)]
pub struct AdjustmentLayer {
    pub id: LayerId,
    pub name: String,
    pub kind: LayerKind,
    pub mode: BlendMode,
    /// Always within [0,1].
    pub influence: f32,
    pub enabled: bool,
    pub curve: Arc<Curve>,
    pub correction: Option<CorrectionStamp>,
}

/// Parameters for creating a layer.
#[derive(Clone, Debug, PartialEq)]
pub struct LayerSpec {
    pub name: String,
    pub kind: LayerKind,
    pub mode: BlendMode,
    pub influence: f32,
    pub enabled: bool,
    pub curve: Curve,
    pub correction: Option<CorrectionStamp>,
}

impl LayerSpec {
    pub fn new(name: impl Into<String>, curve: Curve) -> Self {
        Self {
            name: name.into(),
            kind: LayerKind::default(),
            mode: BlendMode::Add,
            influence: 1.0,
            enabled: true,
            curve,
            correction: None,
        }
    }

    pub fn kind(mut self, kind: LayerKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn mode(mut self, mode: BlendMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn influence(mut self, influence: f32) -> Self {
        self.influence = influence;
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn correction(mut self, stamp: CorrectionStamp) -> Self {
        self.correction = Some(stamp);
        self
    }
}

/// Persisted form of a layer (host scene state). Tags are plain strings so a host
/// can store them without knowing this crate's enums.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayerState {
    pub id: LayerId,
    pub name: String,
    pub kind: String,
    pub mode: String,
    pub influence: f32,
    pub enabled: bool,
    pub curve: Curve,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correction: Option<CorrectionStamp>,
}

/// Delta that moves `curve` onto its centered moving average over
/// `2 * radius + 1` samples (the window shrinks at the curve ends).
///
/// Blended with `Add` at full weight this yields the smoothed curve.
pub fn smoothing_delta(curve: &Curve, radius: usize) -> Result<Curve, AdjustError> {
    if radius == 0 {
        return Err(AdjustError::config("smoothing radius must be >= 1"));
    }
    let values: Vec<Value> = curve.values().cloned().collect();
    let n = values.len();
    let mut deltas = Vec::with_capacity(n);
    for (i, value) in values.iter().enumerate() {
        let window = &values[i.saturating_sub(radius)..(i + radius + 1).min(n)];
        let inv = (window.len() as f32).recip();
        let mut sum = value.zeros_like();
        for v in window {
            sum = sum.zip_with(v, |a, b| a + b)?;
        }
        deltas.push(sum.zip_with(value, |s, v| s * inv - v)?);
    }
    curve.with_values(deltas)
}

/// Interactive edits accept any number; out-of-range input is clamped.
#[inline]
fn clamp_influence(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Consistent, cheap-to-clone view of a stack used for one blend pass.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StackSnapshot {
    pub layers: Vec<AdjustmentLayer>,
    pub solo: Option<LayerId>,
}

impl StackSnapshot {
    /// Layers that contribute to a blend pass, in application order.
    pub fn active(&self) -> impl Iterator<Item = &AdjustmentLayer> + '_ {
        self.layers.iter().filter(move |l| match self.solo {
            Some(id) => l.id == id,
            None => l.enabled,
        })
    }

    pub fn get(&self, id: LayerId) -> Option<&AdjustmentLayer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn ids(&self) -> Vec<LayerId> {
        self.layers.iter().map(|l| l.id).collect()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Ordered stack of adjustment layers; order is application order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerStack {
    layers: Vec<AdjustmentLayer>,
    solo: Option<LayerId>,
}

impl LayerStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> StackSnapshot {
        StackSnapshot {
            layers: self.layers.clone(),
            solo: self.solo,
        }
    }

    pub fn layers(&self) -> &[AdjustmentLayer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, id: LayerId) -> Option<&AdjustmentLayer> {
        self.layers.iter().find(|l| l.id == id)
    }

    pub fn contains(&self, id: LayerId) -> bool {
        self.get(id).is_some()
    }

    fn position(&self, id: LayerId) -> Result<usize, AdjustError> {
        self.layers
            .iter()
            .position(|l| l.id == id)
            .ok_or(AdjustError::UnknownLayer { id })
    }

    fn layer_mut(&mut self, id: LayerId) -> Result<&mut AdjustmentLayer, AdjustError> {
        let idx = self.position(id)?;
        Ok(&mut self.layers[idx])
    }

    /// Append a layer on top of the stack.
    pub fn add_layer(&mut self, spec: LayerSpec) -> (LayerId, StackSnapshot) {
        let id = LayerId::new();
        self.insert_with_id(id, spec);
        (id, self.snapshot())
    }

    fn insert_with_id(&mut self, id: LayerId, spec: LayerSpec) {
        self.layers.push(AdjustmentLayer {
            id,
            name: spec.name,
            kind: spec.kind,
            mode: spec.mode,
            influence: clamp_influence(spec.influence),
            enabled: spec.enabled,
            curve: Arc::new(spec.curve),
            correction: spec.correction,
        });
    }

    pub fn remove_layer(&mut self, id: LayerId) -> Result<StackSnapshot, AdjustError> {
        let idx = self.position(id)?;
        self.layers.remove(idx);
        if self.solo == Some(id) {
            self.solo = None;
        }
        Ok(self.snapshot())
    }

    /// Move a layer to `new_index`; indices past the end move it to the top.
    pub fn reorder(&mut self, id: LayerId, new_index: usize) -> Result<StackSnapshot, AdjustError> {
        let idx = self.position(id)?;
        let layer = self.layers.remove(idx);
        let target = new_index.min(self.layers.len());
        self.layers.insert(target, layer);
        Ok(self.snapshot())
    }

    pub fn set_influence(&mut self, id: LayerId, value: f32) -> Result<StackSnapshot, AdjustError> {
        self.layer_mut(id)?.influence = clamp_influence(value);
        Ok(self.snapshot())
    }

    pub fn set_enabled(&mut self, id: LayerId, enabled: bool) -> Result<StackSnapshot, AdjustError> {
        self.layer_mut(id)?.enabled = enabled;
        Ok(self.snapshot())
    }

    pub fn rename(&mut self, id: LayerId, name: impl Into<String>) -> Result<StackSnapshot, AdjustError> {
        self.layer_mut(id)?.name = name.into();
        Ok(self.snapshot())
    }

    /// Replace a layer's curve in place (edits, corrector refresh).
    pub fn set_curve(&mut self, id: LayerId, curve: Curve) -> Result<StackSnapshot, AdjustError> {
        self.layer_mut(id)?.curve = Arc::new(curve);
        Ok(self.snapshot())
    }

    /// Solo one layer (only it contributes), or clear solo with `None`.
    pub fn set_solo(&mut self, id: Option<LayerId>) -> Result<StackSnapshot, AdjustError> {
        if let Some(id) = id {
            self.position(id)?;
        }
        self.solo = id;
        Ok(self.snapshot())
    }

    pub fn solo(&self) -> Option<LayerId> {
        self.solo
    }

    /// Persistable state of every layer, in stack order.
    pub fn to_states(&self) -> Vec<LayerState> {
        self.layers
            .iter()
            .map(|l| LayerState {
                id: l.id,
                name: l.name.clone(),
                kind: l.kind.tag().to_string(),
                mode: l.mode.tag().to_string(),
                influence: l.influence,
                enabled: l.enabled,
                curve: (*l.curve).clone(),
                correction: l.correction.clone(),
            })
            .collect()
    }

    /// Rebuild a stack from persisted state, keeping ids and order.
    pub fn from_states(states: Vec<LayerState>) -> Result<Self, AdjustError> {
        let mut stack = Self::new();
        for state in states {
            let kind: LayerKind = state.kind.parse()?;
            let mode: BlendMode = state.mode.parse()?;
            if stack.contains(state.id) {
                return Err(AdjustError::config(format!("duplicate layer id {}", state.id)));
            }
            stack.insert_with_id(
                state.id,
                LayerSpec {
                    name: state.name,
                    kind,
                    mode,
                    influence: state.influence,
                    enabled: state.enabled,
                    curve: state.curve,
                    correction: state.correction,
                },
            );
        }
        Ok(stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> LayerSpec {
        LayerSpec::new(name, Curve::from_frames(&[1.0, 1.0, 1.0]).unwrap())
    }

    #[test]
    fn influence_is_clamped_not_rejected() {
        let mut stack = LayerStack::new();
        let (id, _) = stack.add_layer(spec("a").influence(3.0));
        assert_eq!(stack.get(id).unwrap().influence, 1.0);
        let snap = stack.set_influence(id, -0.5).unwrap();
        assert_eq!(snap.get(id).unwrap().influence, 0.0);
        stack.set_influence(id, f32::NAN).unwrap();
        assert_eq!(stack.get(id).unwrap().influence, 0.0);
    }

    #[test]
    fn unknown_ids_are_reported() {
        let mut stack = LayerStack::new();
        let ghost = LayerId::new();
        assert_eq!(
            stack.remove_layer(ghost).unwrap_err(),
            AdjustError::UnknownLayer { id: ghost }
        );
        assert!(stack.set_enabled(ghost, false).is_err());
        assert!(stack.reorder(ghost, 0).is_err());
        assert!(stack.set_solo(Some(ghost)).is_err());
    }

    #[test]
    fn reorder_keeps_ids_stable() {
        let mut stack = LayerStack::new();
        let (a, _) = stack.add_layer(spec("a"));
        let (b, _) = stack.add_layer(spec("b"));
        let (c, _) = stack.add_layer(spec("c"));
        let snap = stack.reorder(c, 0).unwrap();
        assert_eq!(snap.ids(), vec![c, a, b]);
        let snap = stack.reorder(c, 99).unwrap();
        assert_eq!(snap.ids(), vec![a, b, c]);
        assert_eq!(stack.get(b).unwrap().name, "b");
    }

    #[test]
    fn solo_and_enabled_select_active_layers() {
        let mut stack = LayerStack::new();
        let (a, _) = stack.add_layer(spec("a"));
        let (b, _) = stack.add_layer(spec("b").enabled(false));
        let active: Vec<LayerId> = stack.snapshot().active().map(|l| l.id).collect();
        assert_eq!(active, vec![a]);
        let snap = stack.set_solo(Some(b)).unwrap();
        let active: Vec<LayerId> = snap.active().map(|l| l.id).collect();
        assert_eq!(active, vec![b]);
        let snap = stack.remove_layer(b).unwrap();
        assert_eq!(snap.solo, None);
    }

    #[test]
    fn unknown_tags_fail_restore() {
        let mut stack = LayerStack::new();
        stack.add_layer(spec("a"));
        let mut states = stack.to_states();
        states[0].mode = "dodge".into();
        assert_eq!(
            LayerStack::from_states(states).unwrap_err(),
            AdjustError::UnsupportedBlendMode {
                tag: "dodge".into()
            }
        );
    }

    #[test]
    fn smoothing_delta_moves_onto_the_moving_average() {
        let spike = Curve::from_frames(&[0.0, 0.0, 3.0, 0.0, 0.0]).unwrap();
        let delta = smoothing_delta(&spike, 1).unwrap();
        let out: Vec<f32> = spike
            .values()
            .zip(delta.values())
            .map(|(v, d)| v.as_slice()[0] + d.as_slice()[0])
            .collect();
        assert_eq!(out, vec![0.0, 1.0, 1.0, 1.0, 0.0]);
        assert!(smoothing_delta(&spike, 0).is_err());
    }

    #[test]
    fn kind_tags_parse() {
        assert_eq!("contact_fix".parse::<LayerKind>().unwrap(), LayerKind::ContactFix);
        assert_eq!("EnergyPreserve".parse::<LayerKind>().unwrap(), LayerKind::EnergyPreserve);
        assert!("wiggle".parse::<LayerKind>().is_err());
    }
}
