//! Sliding corrector: pins planted intervals of a position curve.
//!
//! Each detected contact phase moves through `Detecting -> Anchoring -> Corrected`.
//! Anchoring takes the per-component median over the phase. All anchored phases
//! of a channel share one `ContactFix` layer: inside a phase the delta pulls every
//! sample onto that phase's anchor, outside it the edge correction fades out over
//! `contact_falloff` (clipped at the midpoint to the neighbouring phase) when
//! `preserve_motion_flow` is set, and stops dead otherwise.
//!
//! The layer carries a [`CorrectionStamp`] (base fingerprint, corrected spans,
//! delta fingerprint). Re-running compares the planned stamp with the stamped
//! layers already in the stack, so the outcome depends only on the stack: an
//! unchanged plan reuses the layer, any other plan replaces it. The stamp is
//! persisted with the layer, so this also holds after a reload.

use serde::{Deserialize, Serialize};

use adjblend_api_core::{smoothstep, BlendMode, Value};

use crate::analysis::{ContactPhase, MotionAnalysis};
use crate::config::AnalysisConfig;
use crate::curve::{Curve, Fingerprint};
use crate::error::{AdjustError, Warning};
use crate::ids::{ChannelId, LayerId};
use crate::layers::{CorrectionStamp, LayerKind, LayerSpec, LayerStack};

/// Where a phase ended up in the correction state machine.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseState {
    Detecting,
    Anchoring,
    Corrected,
    /// Shorter than `min_contact_frames`; reported, left alone.
    Skipped,
}

/// Outcome for one contact phase.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PhaseCorrection {
    pub phase: ContactPhase,
    pub state: PhaseState,
    pub anchor: Option<Value>,
    pub layer: Option<LayerId>,
    /// False when an existing corrective layer was reused.
    pub created: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CorrectionReport {
    pub channel: ChannelId,
    pub phases: Vec<PhaseCorrection>,
    pub created: Vec<LayerId>,
    pub removed: Vec<LayerId>,
    pub warnings: Vec<Warning>,
}

/// Writes and refreshes corrective layers. Holds no state of its own: what is
/// already corrected is read from the stamps in the stack.
#[derive(Copy, Clone, Debug, Default)]
pub struct SlidingCorrector;

/// Per-component median over `values`.
fn median_value(values: &[Value]) -> Option<Value> {
    let first = values.first()?;
    let dims = first.len();
    let mut components = Vec::with_capacity(dims);
    let mut column = Vec::with_capacity(values.len());
    for c in 0..dims {
        column.clear();
        column.extend(values.iter().map(|v| v.as_slice()[c]));
        column.sort_by(f32::total_cmp);
        let mid = column.len() / 2;
        let median = if column.len() % 2 == 0 {
            0.5 * (column[mid - 1] + column[mid])
        } else {
            column[mid]
        };
        components.push(median);
    }
    adjblend_api_core::coercion::from_components(first, &components)
}

/// Pull of an anchored phase at its two edges.
struct Edges {
    start: Value,
    end: Value,
}

/// Corrective delta for every anchored phase of `curve`, as one curve.
///
/// `anchors` runs parallel to `phases`; `None` marks a phase left alone. Such a
/// phase still bounds its neighbours' fades.
fn corrective_curve(
    curve: &Curve,
    phases: &[ContactPhase],
    anchors: &[Option<Value>],
    config: &AnalysisConfig,
) -> Result<Curve, AdjustError> {
    let pull = |anchor: &Value, i: usize| anchor.zip_with(curve.value(i), |a, v| a - v);
    let mut edges: Vec<Option<Edges>> = Vec::with_capacity(phases.len());
    for (phase, anchor) in phases.iter().zip(anchors) {
        edges.push(match anchor {
            Some(a) => Some(Edges {
                start: pull(a, phase.start_index)?,
                end: pull(a, phase.end_index)?,
            }),
            None => None,
        });
    }

    // Fade width on each side of a phase: the falloff, clipped at half the gap to
    // the neighbouring phase so no fade reaches into another phase.
    let reach_between = |before: &ContactPhase, after: &ContactPhase| {
        config
            .contact_falloff
            .min(0.5 * (after.start_time - before.end_time))
    };

    let mut deltas = Vec::with_capacity(curve.len());
    let mut k = 0;
    for (i, sample) in curve.samples().iter().enumerate() {
        while k < phases.len() && phases[k].end_index < i {
            k += 1;
        }
        let mut delta = sample.value.zeros_like();
        if phases.get(k).is_some_and(|p| p.start_index <= i) {
            if let Some(anchor) = &anchors[k] {
                delta = pull(anchor, i)?;
            }
        } else if config.preserve_motion_flow {
            let prev = k.checked_sub(1);
            let next = phases.get(k);
            if let Some((phase, Some(edge))) = prev.map(|p| (&phases[p], &edges[p])) {
                let reach = next.map_or(config.contact_falloff, |n| reach_between(phase, n));
                let fade = 1.0 - smoothstep(0.0, reach, sample.time - phase.end_time);
                delta = delta.zip_with(&edge.end, |d, e| d + e * fade)?;
            }
            if let (Some(phase), Some(edge)) = (next, edges.get(k).and_then(Option::as_ref)) {
                let reach = prev.map_or(config.contact_falloff, |p| reach_between(&phases[p], phase));
                let fade = 1.0 - smoothstep(0.0, reach, phase.start_time - sample.time);
                delta = delta.zip_with(&edge.start, |d, e| d + e * fade)?;
            }
        }
        deltas.push(delta);
    }
    curve.with_values(deltas)
}

/// Stamped corrective layers in `stack`, bottom to top.
fn stamped(stack: &LayerStack) -> impl Iterator<Item = (LayerId, &CorrectionStamp)> + '_ {
    stack
        .layers()
        .iter()
        .filter_map(|l| l.correction.as_ref().map(|stamp| (l.id, stamp)))
}

impl SlidingCorrector {
    pub fn new() -> Self {
        Self
    }

    /// Corrective layer in `stack` that was built from the curve `source`, if any.
    pub fn layer_for(&self, stack: &LayerStack, source: Fingerprint) -> Option<LayerId> {
        stamped(stack)
            .find(|(_, stamp)| stamp.source == source)
            .map(|(id, _)| id)
    }

    /// Read-only view of where each phase of `analysis` stands: `Corrected` when a
    /// stamped layer in `stack` covers its span of this curve, `Skipped` when too
    /// short, `Detecting` otherwise.
    pub fn status(
        &self,
        analysis: &MotionAnalysis,
        config: &AnalysisConfig,
        stack: &LayerStack,
    ) -> Vec<(ContactPhase, PhaseState)> {
        analysis
            .phases
            .iter()
            .map(|phase| {
                let span = (phase.start_index, phase.end_index);
                let state = if phase.frames() < config.min_contact_frames {
                    PhaseState::Skipped
                } else if stamped(stack)
                    .any(|(_, stamp)| stamp.source == analysis.source && stamp.spans.contains(&span))
                {
                    PhaseState::Corrected
                } else {
                    PhaseState::Detecting
                };
                (phase.clone(), state)
            })
            .collect()
    }

    /// Correct every contact phase found in `analysis`, keeping exactly one
    /// up-to-date corrective layer for the channel in `stack`.
    ///
    /// Validation happens before the stack is touched, so an error leaves it as it was.
    pub fn correct(
        &self,
        channel: &str,
        curve: &Curve,
        analysis: &MotionAnalysis,
        config: &AnalysisConfig,
        stack: &mut LayerStack,
    ) -> Result<CorrectionReport, AdjustError> {
        config.validate()?;
        let fingerprint = curve.fingerprint();
        if analysis.source != fingerprint {
            return Err(AdjustError::config(format!(
                "analysis of {} does not match curve {fingerprint}",
                analysis.source
            )));
        }

        // Anchor every long enough phase and build the delta up front.
        let mut plan = Vec::with_capacity(analysis.phases.len());
        for phase in &analysis.phases {
            if phase.frames() < config.min_contact_frames {
                plan.push((phase, PhaseState::Skipped, None));
                continue;
            }
            let values: Vec<Value> = curve.samples()[phase.start_index..=phase.end_index]
                .iter()
                .map(|s| s.value.clone())
                .collect();
            let anchor = median_value(&values)
                .ok_or_else(|| AdjustError::curve("contact phase has no samples"))?;
            plan.push((phase, PhaseState::Anchoring, Some(anchor)));
        }
        let anchors: Vec<Option<Value>> = plan.iter().map(|(_, _, a)| a.clone()).collect();
        let spans: Vec<(usize, usize)> = plan
            .iter()
            .filter(|(_, state, _)| *state == PhaseState::Anchoring)
            .map(|(p, _, _)| (p.start_index, p.end_index))
            .collect();
        let fix = if spans.is_empty() {
            None
        } else {
            let delta = corrective_curve(curve, &analysis.phases, &anchors, config)?;
            let stamp = CorrectionStamp {
                source: fingerprint,
                spans,
                delta: delta.fingerprint(),
            };
            Some((delta, stamp))
        };

        let mut report = CorrectionReport {
            channel: channel.to_string(),
            ..Default::default()
        };

        let existing: Vec<(LayerId, CorrectionStamp)> =
            stamped(stack).map(|(id, stamp)| (id, stamp.clone())).collect();
        let reused = match (&fix, existing.as_slice()) {
            (Some((_, planned)), [(id, current)]) if current == planned => Some(*id),
            _ => None,
        };

        let layer = match (reused, fix) {
            (Some(id), _) => Some((id, false)),
            (None, fix) => {
                let slot = existing
                    .first()
                    .and_then(|(id, _)| stack.layers().iter().position(|l| l.id == *id));
                for (id, _) in &existing {
                    stack.remove_layer(*id)?;
                    report.removed.push(*id);
                }
                match fix {
                    Some((delta, stamp)) => {
                        let phases = stamp.spans.len();
                        let (id, _) = stack.add_layer(
                            LayerSpec::new(format!("Contact Fix {channel}"), delta)
                                .kind(LayerKind::ContactFix)
                                .mode(BlendMode::Add)
                                .correction(stamp),
                        );
                        if let Some(index) = slot {
                            stack.reorder(id, index)?;
                        }
                        log::info!(
                            "'{}': corrective layer {} pins {} contact phase(s)",
                            channel,
                            id,
                            phases
                        );
                        report.created.push(id);
                        Some((id, true))
                    }
                    None => None,
                }
            }
        };
        if !report.removed.is_empty() {
            log::debug!(
                "'{}': replaced {} stale corrective layer(s)",
                channel,
                report.removed.len()
            );
        }

        for (phase, state, anchor) in plan {
            if state == PhaseState::Skipped {
                log::warn!(
                    "'{}': contact phase {}..{} has {} frames (< {}), not corrected",
                    channel,
                    phase.start_time,
                    phase.end_time,
                    phase.frames(),
                    config.min_contact_frames
                );
                report.warnings.push(Warning::ShortContactPhase {
                    channel: channel.to_string(),
                    start_time: phase.start_time,
                    end_time: phase.end_time,
                    frames: phase.frames(),
                    min_frames: config.min_contact_frames,
                });
                report.phases.push(PhaseCorrection {
                    phase: phase.clone(),
                    state,
                    anchor: None,
                    layer: None,
                    created: false,
                });
                continue;
            }
            report.phases.push(PhaseCorrection {
                phase: phase.clone(),
                state: PhaseState::Corrected,
                anchor,
                layer: layer.map(|(id, _)| id),
                created: layer.is_some_and(|(_, created)| created),
            });
        }

        Ok(report)
    }
}
