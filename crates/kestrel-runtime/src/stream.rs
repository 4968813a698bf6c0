//! Buffered response stream — pausable, bounded-memory consumption of
//! incremental model output.
//!
//! A fixed-capacity [`RingBuffer`] holds the most recent items; once full,
//! the oldest entry is silently overwritten. [`consume_stream`] wraps an
//! incremental source and honors the control token: while paused it suspends
//! before requesting the next item, and on cancellation the in-flight wait is
//! rejected immediately rather than waiting for the next item.

use std::time::Instant;

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::debug;

use kestrel_control::ControlToken;

// ─────────────────────────────────────────────────────────────────────────────
// Ring buffer
// ─────────────────────────────────────────────────────────────────────────────

/// Fixed-capacity buffer that silently overwrites the oldest entry once full.
#[derive(Clone, Debug)]
pub struct RingBuffer<T> {
    items: std::collections::VecDeque<T>,
    capacity: usize,
}

impl<T> RingBuffer<T> {
    /// Create a buffer. Capacity must be at least 1.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: std::collections::VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an item, overwriting the oldest when full. O(1), never fails.
    pub fn push(&mut self, item: T) {
        if self.items.len() == self.capacity {
            let _ = self.items.pop_front();
        }
        self.items.push_back(item);
    }

    /// Items currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the buffer holds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// The configured capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Iterate oldest → newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// The most recent item.
    #[must_use]
    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Lifecycle + metrics
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle markers emitted to the listener, in order, for one run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StreamLifecycle {
    /// Consumption started.
    Started,
    /// One item was received and buffered.
    ItemReceived,
    /// Consumption suspended (token paused).
    Paused,
    /// Consumption resumed.
    Resumed,
    /// The source produced an error.
    Error(String),
    /// Consumption ended.
    Ended,
}

/// Per-run consumption metrics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamMetrics {
    /// Items received.
    pub items: u64,
    /// Sum of inter-item gaps in milliseconds.
    pub total_gap_ms: u64,
}

impl StreamMetrics {
    /// Mean inter-item gap in milliseconds (0 with fewer than two items).
    #[must_use]
    pub fn avg_gap_ms(&self) -> u64 {
        if self.items < 2 {
            0
        } else {
            self.total_gap_ms / (self.items - 1)
        }
    }
}

/// What a consumption run produced.
#[derive(Debug)]
pub struct ConsumeOutcome<T> {
    /// The most recent items, oldest first.
    pub buffer: RingBuffer<T>,
    /// Run metrics.
    pub metrics: StreamMetrics,
    /// Whether the run was cut short by cancellation.
    pub interrupted: bool,
    /// Error from the source, if one ended the run.
    pub error: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Consumer
// ─────────────────────────────────────────────────────────────────────────────

/// Consume an incremental source under a control token.
///
/// Pauses are honored *between* items: when the token is paused, the
/// consumer notifies the listener and suspends before requesting the next
/// item. Cancellation rejects the in-flight wait immediately (biased select).
/// A source error notifies the listener and ends the run.
pub async fn consume_stream<T, S>(
    mut source: S,
    token: &ControlToken,
    capacity: usize,
    listener: &mut dyn FnMut(StreamLifecycle),
) -> ConsumeOutcome<T>
where
    S: Stream<Item = Result<T, String>> + Unpin,
{
    let mut buffer = RingBuffer::new(capacity);
    let mut metrics = StreamMetrics::default();
    let mut last_item_at: Option<Instant> = None;
    let mut interrupted = false;
    let mut error = None;
    let cancel = token.cancelled_token();

    listener(StreamLifecycle::Started);

    loop {
        // Suspend before requesting the next item while paused
        if token.is_paused() {
            listener(StreamLifecycle::Paused);
            if token.wait_if_paused().await.is_err() {
                interrupted = true;
                break;
            }
            listener(StreamLifecycle::Resumed);
        }

        // biased: prefer cancellation when both a source item and cancel are ready
        let next = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                interrupted = true;
                break;
            }
            next = source.next() => next,
        };

        match next {
            None => break,
            Some(Err(e)) => {
                listener(StreamLifecycle::Error(e.clone()));
                error = Some(e);
                break;
            }
            Some(Ok(item)) => {
                let now = Instant::now();
                if let Some(previous) = last_item_at {
                    metrics.total_gap_ms +=
                        u64::try_from(now.duration_since(previous).as_millis()).unwrap_or(u64::MAX);
                }
                last_item_at = Some(now);
                metrics.items += 1;
                buffer.push(item);
                listener(StreamLifecycle::ItemReceived);
            }
        }
    }

    listener(StreamLifecycle::Ended);
    debug!(
        items = metrics.items,
        interrupted, "stream consumption ended"
    );

    ConsumeOutcome {
        buffer,
        metrics,
        interrupted,
        error,
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
