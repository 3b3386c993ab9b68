//! Host adapter boundary.
//!
//! The core never touches host scene objects. A host exposes its animated
//! channels through [`HostAdapter`]: sampled curves come in, blended curves go
//! back out. [`InMemoryHost`] is the reference implementation used by tests and
//! headless tools.

use hashbrown::HashMap;

use crate::curve::Curve;
use crate::error::AdjustError;
use crate::ids::ChannelId;
use crate::sampling::{sample_curve, CurveSource, SampleRequest};

/// Narrow interface to the host application.
pub trait HostAdapter {
    /// Channels the host can sample, in a stable order.
    fn channels(&self) -> Vec<ChannelId>;

    /// Sampled base curve of `channel`.
    fn sample(&self, channel: &str) -> Result<Curve, AdjustError>;

    /// Store the blended result for `channel`.
    fn write(&mut self, channel: &str, curve: &Curve) -> Result<(), AdjustError>;
}

/// Host that keeps base and written curves in memory.
///
/// Written curves are kept apart from the bases, so applying twice never
/// compounds adjustments.
#[derive(Clone, Debug, Default)]
pub struct InMemoryHost {
    base: HashMap<ChannelId, Curve>,
    order: Vec<ChannelId>,
    written: HashMap<ChannelId, Curve>,
}

impl InMemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a base channel.
    pub fn insert(&mut self, channel: impl Into<ChannelId>, curve: Curve) {
        let channel = channel.into();
        if self.base.insert(channel.clone(), curve).is_none() {
            self.order.push(channel);
        }
    }

    /// Add a channel by sampling any [`CurveSource`] (keyframes, closures).
    pub fn insert_sampled(
        &mut self,
        channel: impl Into<ChannelId>,
        source: &dyn CurveSource,
        request: &SampleRequest,
    ) -> Result<(), AdjustError> {
        let curve = sample_curve(source, request)?;
        self.insert(channel, curve);
        Ok(())
    }

    /// Last curve written for `channel`.
    pub fn output(&self, channel: &str) -> Option<&Curve> {
        self.written.get(channel)
    }

    pub fn written_count(&self) -> usize {
        self.written.len()
    }
}

impl HostAdapter for InMemoryHost {
    fn channels(&self) -> Vec<ChannelId> {
        self.order.clone()
    }

    fn sample(&self, channel: &str) -> Result<Curve, AdjustError> {
        self.base
            .get(channel)
            .cloned()
            .ok_or_else(|| AdjustError::UnknownChannel {
                channel: channel.to_string(),
            })
    }

    fn write(&mut self, channel: &str, curve: &Curve) -> Result<(), AdjustError> {
        if !self.base.contains_key(channel) {
            return Err(AdjustError::UnknownChannel {
                channel: channel.to_string(),
            });
        }
        self.written.insert(channel.to_string(), curve.clone());
        Ok(())
    }
}
