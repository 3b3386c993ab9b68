//! Parallel per-curve batches with cooperative cancellation.
//!
//! Units are independent curves and run on the rayon pool. Cancellation is
//! checked once per unit, before it starts; a unit that already started runs to
//! completion.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::Serialize;

use crate::error::{AdjustError, Warning};
use crate::ids::ChannelId;

/// Shared flag an interactive host flips to abort a running batch.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Re-arm the token for the next batch.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Result for one channel of a batch.
#[derive(Clone, Debug, Serialize)]
pub struct BatchItem<T> {
    pub channel: ChannelId,
    pub result: Result<T, AdjustError>,
}

/// Per-channel results in input order plus every warning raised.
#[derive(Clone, Debug, Serialize)]
pub struct BatchOutcome<T> {
    pub items: Vec<BatchItem<T>>,
    pub warnings: Vec<Warning>,
    pub cancelled: bool,
}

impl<T> BatchOutcome<T> {
    pub fn succeeded(&self) -> impl Iterator<Item = (&str, &T)> + '_ {
        self.items
            .iter()
            .filter_map(|i| i.result.as_ref().ok().map(|v| (i.channel.as_str(), v)))
    }

    pub fn failed(&self) -> impl Iterator<Item = (&str, &AdjustError)> + '_ {
        self.items
            .iter()
            .filter_map(|i| i.result.as_ref().err().map(|e| (i.channel.as_str(), e)))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Run `work` over `units` in parallel.
///
/// A failing unit never aborts its siblings; units not yet started when the
/// token is cancelled report `AdjustError::Cancelled`.
pub(crate) fn run_batch<U, T, K, W>(
    units: &[U],
    cancel: &CancelToken,
    channel_of: K,
    work: W,
) -> BatchOutcome<T>
where
    U: Sync,
    T: Send,
    K: Fn(&U) -> ChannelId + Sync,
    W: Fn(&U) -> Result<(T, Vec<Warning>), AdjustError> + Sync,
{
    let results: Vec<(ChannelId, Result<T, AdjustError>, Vec<Warning>)> = units
        .par_iter()
        .map(|unit| {
            let channel = channel_of(unit);
            if cancel.is_cancelled() {
                return (channel, Err(AdjustError::Cancelled), Vec::new());
            }
            match work(unit) {
                Ok((value, warnings)) => (channel, Ok(value), warnings),
                Err(err) => (channel, Err(err), Vec::new()),
            }
        })
        .collect();

    let mut items = Vec::with_capacity(results.len());
    let mut warnings = Vec::new();
    let mut cancelled = false;
    for (channel, result, w) in results {
        if matches!(result, Err(AdjustError::Cancelled)) {
            cancelled = true;
        }
        warnings.extend(w);
        items.push(BatchItem { channel, result });
    }
    if cancelled {
        log::warn!("batch cancelled; {} of {} units skipped", skipped(&items), items.len());
    }
    BatchOutcome {
        items,
        warnings,
        cancelled,
    }
}

fn skipped<T>(items: &[BatchItem<T>]) -> usize {
    items
        .iter()
        .filter(|i| matches!(i.result, Err(AdjustError::Cancelled)))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_keep_input_order() {
        let units: Vec<u32> = (0..64).collect();
        let out = run_batch(&units, &CancelToken::new(), |u| format!("c{u}"), |u| {
            Ok((u * 2, Vec::new()))
        });
        assert!(!out.cancelled);
        let doubled: Vec<u32> = out.succeeded().map(|(_, v)| *v).collect();
        assert_eq!(doubled, (0..64).map(|u| u * 2).collect::<Vec<_>>());
        assert_eq!(out.items[5].channel, "c5");
    }

    #[test]
    fn cancelled_token_skips_every_unit() {
        let token = CancelToken::new();
        token.cancel();
        let out = run_batch(&[1, 2, 3], &token, |u| u.to_string(), |u| Ok((*u, Vec::new())));
        assert!(out.cancelled);
        assert_eq!(out.failed().count(), 3);
        token.reset();
        assert!(!token.is_cancelled());
    }

    #[test]
    fn one_failure_does_not_abort_the_batch() {
        let out = run_batch(&[1, 2, 3], &CancelToken::new(), |u| u.to_string(), |u| {
            if *u == 2 {
                Err(AdjustError::UnknownChannel {
                    channel: "2".into(),
                })
            } else {
                Ok((*u, vec![Warning::TooFewSamples {
                    channel: u.to_string(),
                    samples: 1,
                }]))
            }
        });
        assert_eq!(out.succeeded().count(), 2);
        assert_eq!(out.failed().count(), 1);
        assert_eq!(out.warnings.len(), 2);
    }
}
