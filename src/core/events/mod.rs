//! Event Recorder: buffers `AuctionEvent`/`BidderEvent`/
//! `WinEvent` in memory and flushes them to an external analytics sink
//! on capacity, on an interval, or on shutdown.
//!
//! A `tokio::sync::Notify` races an interval sleep inside
//! `tokio::select!`, and `shutdown()` is the one path that both stops
//! the timer and drains the buffer. The swap-then-flush step
//! additionally copies the buffer contents under the lock, swapping in
//! a fresh `Vec` rather than handing the consumer a reference alias
//! into memory the producer could still be mutating.

use crate::core::models::bidder::DemandClass;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Serialize)]
pub struct AuctionEvent {
    pub auction_id: String,
    pub bidders_selected: u32,
    pub bidders_excluded: u32,
    pub bidders_with_bids: u32,
    pub winning_bid_count: u32,
    pub duration_ms: u64,
    pub revenue: f64,
    pub payout: f64,
    pub device_type: Option<i32>,
    pub geo_country: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BidderEvent {
    pub auction_id: String,
    pub bidder_code: String,
    pub latency_ms: u64,
    pub had_bid: bool,
    pub bid_count: u32,
    pub first_bid_cpm: Option<f64>,
    pub floor: f64,
    pub below_floor: bool,
    pub timed_out: bool,
    pub errored: bool,
    pub no_bid_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WinEvent {
    pub auction_id: String,
    pub bidder_code: String,
    pub imp_id: String,
    pub original_cpm: f64,
    pub adjusted_cpm: f64,
    pub platform_cut: f64,
    pub clear_price: f64,
    pub demand_class: DemandClass,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Event {
    Auction(AuctionEvent),
    Bidder(BidderEvent),
    Win(WinEvent),
}

struct Buffer {
    events: Vec<Event>,
    capacity: usize,
    dropped: u64,
}

impl Buffer {
    /// On overflow, drops the oldest buffered event rather than the
    /// incoming one.
    fn push(&mut self, event: Event) {
        if self.events.len() >= self.capacity {
            self.events.remove(0);
            self.dropped += 1;
        }
        self.events.push(event);
    }

    fn is_full(&self) -> bool {
        self.events.len() >= self.capacity
    }

    /// Copies the buffered events into a fresh `Vec` and clears the
    /// original in place, rather than moving (aliasing) the backing
    /// allocation out from under the lock.
    fn swap_copy(&mut self) -> Vec<Event> {
        let copy = self.events.clone();
        self.events.clear();
        copy
    }
}

pub struct EventRecorder {
    buffer: Mutex<Buffer>,
    sink_url: Option<String>,
    client: Client,
    notify: Notify,
    closed: AtomicBool,
}

impl EventRecorder {
    pub fn new(sink_url: Option<String>, capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            buffer: Mutex::new(Buffer {
                events: Vec::with_capacity(capacity),
                capacity,
                dropped: 0,
            }),
            sink_url,
            client: Client::new(),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    /// Spawns the background flush worker driven by `interval`, and
    /// also by capacity pressure via [`EventRecorder::record`].
    pub fn spawn(self: &Arc<Self>, interval: Duration) {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {
                        this.flush().await;
                    }
                    _ = this.notify.notified() => {
                        this.flush().await;
                        if this.closed.load(Ordering::Acquire) {
                            break;
                        }
                    }
                }
            }
        });
    }

    pub fn record(&self, event: Event) {
        if self.closed.load(Ordering::Acquire) {
            return;
        }
        let is_full = {
            let mut buf = self.buffer.lock();
            buf.push(event);
            buf.is_full()
        };
        if is_full {
            self.notify.notify_one();
        }
    }

    async fn flush(&self) {
        let (batch, dropped) = {
            let mut buf = self.buffer.lock();
            let dropped = buf.dropped;
            buf.dropped = 0;
            (buf.swap_copy(), dropped)
        };

        if dropped > 0 {
            warn!(dropped, "event recorder buffer overflowed, events were dropped");
        }
        if batch.is_empty() {
            return;
        }

        let Some(url) = &self.sink_url else {
            debug!(count = batch.len(), "no event sink configured, discarding batch");
            return;
        };

        Self::send_with_retry(&self.client, url, &batch).await;
    }

    async fn send_with_retry(client: &Client, url: &str, batch: &[Event]) {
        let mut backoff = Duration::from_millis(200);
        let max_attempts = 3;

        for attempt in 1..=max_attempts {
            match client.post(url).json(batch).send().await {
                Ok(resp) if resp.status().is_success() => return,
                Ok(resp) => {
                    warn!(status = %resp.status(), attempt, "event sink rejected batch");
                }
                Err(err) => {
                    warn!(%err, attempt, "event sink request failed");
                }
            }

            if attempt < max_attempts {
                tokio::time::sleep(backoff).await;
                backoff *= 2;
            }
        }

        error!(count = batch.len(), "giving up on event batch after retries, events lost");
    }

    /// One-shot close: flushes the buffer and signals the worker to
    /// exit after its next wake. Safe against concurrent callers — the
    /// `compare_exchange` ensures only the first caller drives the
    /// notify/flush sequence; later callers return immediately.
    pub async fn close(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        self.flush().await;
        self.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn overflow_drops_oldest_pressure_without_panicking() {
        let recorder = EventRecorder::new(None, 2);
        for i in 0..5 {
            recorder.record(Event::Bidder(BidderEvent {
                auction_id: format!("a{i}"),
                bidder_code: "x".into(),
                latency_ms: 1,
                had_bid: false,
                bid_count: 0,
                first_bid_cpm: None,
                floor: 0.0,
                below_floor: false,
                timed_out: false,
                errored: false,
                no_bid_reason: None,
            }));
        }
        let buf = recorder.buffer.lock();
        assert_eq!(buf.dropped, 3);
        // the two most recent events survive; the oldest three were evicted.
        assert!(matches!(&buf.events[0], Event::Bidder(b) if b.auction_id == "a3"));
        assert!(matches!(&buf.events[1], Event::Bidder(b) if b.auction_id == "a4"));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let recorder = EventRecorder::new(None, 10);
        recorder.close().await;
        recorder.close().await;
        assert!(recorder.closed.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn swap_copy_leaves_original_buffer_empty() {
        let recorder = EventRecorder::new(None, 10);
        recorder.record(Event::Auction(AuctionEvent {
            auction_id: "a1".into(),
            bidders_selected: 1,
            bidders_excluded: 0,
            bidders_with_bids: 1,
            winning_bid_count: 1,
            duration_ms: 10,
            revenue: 1.0,
            payout: 0.8,
            device_type: None,
            geo_country: None,
        }));
        recorder.flush().await;
        assert!(recorder.buffer.lock().events.is_empty());
    }
}
