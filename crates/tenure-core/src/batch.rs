//! Batching of corrections so the role API sees bounded bursts.

use crate::drift::Correction;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchPolicy {
    pub max_batch_size: usize,
    /// Flush a non-empty batch once it has been accumulating this long.
    pub accumulation_window: Duration,
    /// Pause after each mid-scan flush.
    pub inter_batch_delay: Duration,
}

impl Default for BatchPolicy {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            accumulation_window: Duration::from_secs(600),
            inter_batch_delay: Duration::from_secs(60),
        }
    }
}

/// A group of corrections submitted together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    /// 1-based position of this batch within the scan.
    pub seq: usize,
    pub corrections: Vec<Correction>,
}

impl Batch {
    pub fn len(&self) -> usize {
        self.corrections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.corrections.is_empty()
    }
}

/// Accumulates corrections for one scan and decides when to flush.
///
/// The scheduler only decides; the cycle submits the batch and performs the
/// pause. Time is passed in so the window can be checked after every scanned
/// member, including members that needed no correction.
#[derive(Debug)]
pub struct BatchScheduler {
    policy: BatchPolicy,
    pending: Vec<Correction>,
    window_start: Instant,
    flushed: usize,
}

impl BatchScheduler {
    pub fn new(policy: BatchPolicy, now: Instant) -> Self {
        Self {
            policy,
            pending: Vec::with_capacity(policy.max_batch_size),
            window_start: now,
            flushed: 0,
        }
    }

    pub fn push(&mut self, correction: Correction) {
        self.pending.push(correction);
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn flushed(&self) -> usize {
        self.flushed
    }

    pub fn inter_batch_delay(&self) -> Duration {
        self.policy.inter_batch_delay
    }

    /// Take the pending batch if it is full or its window has elapsed.
    pub fn poll_flush(&mut self, now: Instant) -> Option<Batch> {
        if self.pending.is_empty() {
            return None;
        }
        let full = self.pending.len() >= self.policy.max_batch_size;
        let expired = now.saturating_duration_since(self.window_start) >= self.policy.accumulation_window;
        if full || expired {
            self.window_start = now;
            Some(self.take())
        } else {
            None
        }
    }

    /// Restart the accumulation window, typically after the post-flush pause.
    pub fn resume(&mut self, now: Instant) {
        self.window_start = now;
    }

    /// Take whatever is pending at the end of the scan.
    pub fn drain(&mut self) -> Option<Batch> {
        if self.pending.is_empty() {
            None
        } else {
            Some(self.take())
        }
    }

    /// Drop pending corrections without submitting them. Returns how many.
    pub fn discard(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }

    fn take(&mut self) -> Batch {
        self.flushed += 1;
        let capacity = self.policy.max_batch_size;
        Batch {
            seq: self.flushed,
            corrections: std::mem::replace(&mut self.pending, Vec::with_capacity(capacity)),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
