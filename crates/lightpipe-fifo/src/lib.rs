//! Rate-adaptive asynchronous FIFO between two audio clock domains
//!
//! One producer (the sample-rate-conversion task) and one consumer (the
//! output-domain callback) run on independent clocks that drift slowly
//! relative to each other. The FIFO absorbs short-run jitter in its depth and
//! reports a signed timing error on every production, which the producer's
//! conversion-ratio controller uses to cancel the long-run drift.
//!
//! # Architecture
//!
//! - **Transport**: a lock-free SPSC sample ring (`rtrb`). The producer pushes
//!   whole interleaved blocks, the consumer pops one frame per callback.
//! - **Control**: a PI regulator on the depth deviation from the
//!   half-capacity setpoint (see [`control`]).
//! - **Startup/reset**: after (re)initialization the consumer holds off,
//!   emitting silence until the queue has filled to the setpoint, so the
//!   producer always has half a queue of headroom in both directions.
//!
//! Both halves stay allocated for the lifetime of the bridge; format changes
//! reinitialize them in place (`FifoProducer::init`, drain handshake) rather
//! than reallocating, so the consumer side never observes a dangling queue.

mod control;

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

pub use control::DepthControl;

/// State shared between the two halves of the queue.
///
/// Everything here is monotonic or single-writer: `channel_count` and
/// `drain_until` are written by the producer and read by the consumer,
/// `consume_timestamp` and the counters go the other way.
struct FifoShared {
    /// Frames the queue can hold at the configured channel count
    capacity_frames: usize,
    /// Samples per frame in the current epoch (producer-written)
    channel_count: AtomicUsize,
    /// Consumer must discard every sample pushed before this running total;
    /// written by the producer at epoch boundaries
    drain_until: AtomicU64,
    /// Consumer is holding off until depth reaches the setpoint
    filling: AtomicBool,
    /// Reference-clock tick of the most recent consume call
    consume_timestamp: AtomicI32,
    /// Frames zero-filled because the queue ran dry
    underruns: AtomicU64,
    /// Blocks discarded because the queue was full
    overflows: AtomicU64,
}

/// Producer half: owned by the sample-rate-conversion task.
pub struct FifoProducer {
    ring: rtrb::Producer<i32>,
    shared: Arc<FifoShared>,
    control: DepthControl,
    channel_count: usize,
    /// Running total of samples pushed into the ring
    pushed: u64,
    /// Nominal rate pair, for diagnostics
    rates: (u32, u32),
}

/// Consumer half: owned by the output-domain side.
pub struct FifoConsumer {
    ring: rtrb::Consumer<i32>,
    shared: Arc<FifoShared>,
    /// Running total of samples popped from the ring
    popped: u64,
}

/// Allocate a queue sized for `max_channels`-wide frames with
/// `capacity_frames` frames of depth. Returns the two halves; each lives on
/// its own thread for the lifetime of the bridge.
pub fn rate_fifo(max_channels: usize, capacity_frames: usize) -> (FifoProducer, FifoConsumer) {
    let (ring_tx, ring_rx) = rtrb::RingBuffer::new(capacity_frames * max_channels);
    let shared = Arc::new(FifoShared {
        capacity_frames,
        channel_count: AtomicUsize::new(max_channels),
        drain_until: AtomicU64::new(0),
        filling: AtomicBool::new(true),
        consume_timestamp: AtomicI32::new(0),
        underruns: AtomicU64::new(0),
        overflows: AtomicU64::new(0),
    });

    let producer = FifoProducer {
        ring: ring_tx,
        shared: Arc::clone(&shared),
        control: DepthControl::new(capacity_frames / 2),
        channel_count: max_channels,
        pushed: 0,
        rates: (0, 0),
    };
    let consumer = FifoConsumer {
        ring: ring_rx,
        shared,
        popped: 0,
    };
    (producer, consumer)
}

impl FifoProducer {
    /// Reinitialize for a new format epoch: record the channel count, mark
    /// everything pushed so far as stale for the consumer to discard, and
    /// restart the fill-to-setpoint phase.
    pub fn init(&mut self, channel_count: usize) {
        self.channel_count = channel_count.max(1);
        self.shared
            .channel_count
            .store(self.channel_count, Ordering::Release);
        self.shared.drain_until.store(self.pushed, Ordering::Release);
        self.shared.filling.store(true, Ordering::Release);
        self.control.reset();
        log::info!(
            "fifo init: {} channels, {} frames capacity, setpoint {}",
            self.channel_count,
            self.shared.capacity_frames,
            self.control.target_frames()
        );
    }

    /// Record the nominal rate pair in force. Purely diagnostic: the control
    /// law normalizes its gains by the observed block size instead.
    pub fn init_rates(&mut self, input_hz: u32, output_hz: u32) {
        self.rates = (input_hz, output_hz);
        log::info!("fifo rates: {} -> {}", input_hz, output_hz);
    }

    /// Push `frame_count` interleaved frames and run the depth servo.
    ///
    /// Returns the signed Q32 relative timing error: positive when the queue
    /// is running full (the conversion ratio must rise, producing fewer
    /// output samples per input block). A full queue drops the whole block
    /// rather than tearing a frame.
    pub fn produce(&mut self, frames: &[i32], frame_count: usize, _timestamp: i32) -> i32 {
        let n_samples = frame_count * self.channel_count;
        debug_assert!(frames.len() >= n_samples);

        if self.ring.slots() < n_samples {
            let overflows = self.shared.overflows.fetch_add(1, Ordering::Relaxed) + 1;
            if overflows.is_power_of_two() {
                log::warn!("fifo overflow: dropped a {} frame block ({} total)", frame_count, overflows);
            }
        } else {
            for &s in &frames[..n_samples] {
                // Cannot fail: space was checked above and only this side writes
                let _ = self.ring.push(s);
            }
            self.pushed += n_samples as u64;
        }

        self.control.update(self.depth_frames(), frame_count)
    }

    /// Epoch-boundary reset of the producer-side control state.
    pub fn reset(&mut self) {
        self.shared.drain_until.store(self.pushed, Ordering::Release);
        self.shared.filling.store(true, Ordering::Release);
        self.control.reset();
    }

    /// Current queue depth in frames.
    pub fn depth_frames(&self) -> usize {
        let capacity = self.ring.buffer().capacity();
        (capacity - self.ring.slots()) / self.channel_count
    }

    /// Reference-clock tick of the consumer's most recent pull.
    pub fn last_consume_timestamp(&self) -> i32 {
        self.shared.consume_timestamp.load(Ordering::Acquire)
    }

    /// Blocks dropped because the queue was full.
    pub fn overflows(&self) -> u64 {
        self.shared.overflows.load(Ordering::Relaxed)
    }

    /// The nominal rate pair recorded at the last `init_rates`.
    pub fn rates(&self) -> (u32, u32) {
        self.rates
    }
}

impl FifoConsumer {
    /// Pop one frame (all channels) into `out`, recording the consume
    /// timestamp. Zero-fills while the queue is refilling to its setpoint or
    /// when it runs dry. Returns the number of channels written.
    pub fn consume(&mut self, out: &mut [i32], timestamp: i32) -> usize {
        let channels = self.shared.channel_count.load(Ordering::Acquire);
        self.shared
            .consume_timestamp
            .store(timestamp, Ordering::Release);

        self.discard_stale();

        if self.shared.filling.load(Ordering::Acquire) {
            let target_samples = (self.shared.capacity_frames / 2) * channels;
            if self.ring.slots() < target_samples {
                out[..channels].fill(0);
                return channels;
            }
            self.shared.filling.store(false, Ordering::Release);
        }

        if self.ring.slots() < channels {
            // Ran dry: emit silence and rebuild the cushion before resuming
            self.shared.underruns.fetch_add(1, Ordering::Relaxed);
            self.shared.filling.store(true, Ordering::Release);
            out[..channels].fill(0);
            return channels;
        }

        for slot in out[..channels].iter_mut() {
            *slot = self.ring.pop().unwrap_or(0);
        }
        self.popped += channels as u64;
        channels
    }

    /// Output-domain-side reset: discard everything buffered and hold off
    /// until the queue refills to its setpoint.
    pub fn reset(&mut self) {
        while self.ring.pop().is_ok() {
            self.popped += 1;
        }
        self.shared.filling.store(true, Ordering::Release);
    }

    /// Frames zero-filled because the queue ran dry.
    pub fn underruns(&self) -> u64 {
        self.shared.underruns.load(Ordering::Relaxed)
    }

    /// Discard samples from before the most recent producer-side epoch
    /// boundary. Stale samples are already in the ring when the boundary is
    /// published, so this always terminates.
    fn discard_stale(&mut self) {
        let drain_until = self.shared.drain_until.load(Ordering::Acquire);
        while self.popped < drain_until {
            match self.ring.pop() {
                Ok(_) => self.popped += 1,
                Err(_) => break,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drained(producer: &mut FifoProducer, consumer: &mut FifoConsumer, channels: usize) {
        producer.init(channels);
        // First consume executes the drain and enters the filling phase
        let mut scratch = vec![0i32; channels];
        consumer.consume(&mut scratch, 0);
    }

    #[test]
    fn frames_pass_through_in_order() {
        let (mut tx, mut rx) = rate_fifo(2, 8);
        drained(&mut tx, &mut rx, 2);

        // Fill past the setpoint (4 frames) so the consumer releases
        let block: Vec<i32> = (0..12).collect(); // 6 frames of 2 channels
        tx.produce(&block, 6, 100);

        let mut frame = [0i32; 2];
        assert_eq!(rx.consume(&mut frame, 200), 2);
        assert_eq!(frame, [0, 1]);
        rx.consume(&mut frame, 201);
        assert_eq!(frame, [2, 3]);
    }

    #[test]
    fn consumer_holds_off_until_setpoint() {
        let (mut tx, mut rx) = rate_fifo(2, 8);
        drained(&mut tx, &mut rx, 2);

        // Only 2 frames buffered, setpoint is 4: silence expected
        tx.produce(&[7, 7, 7, 7], 2, 0);
        let mut frame = [99i32; 2];
        rx.consume(&mut frame, 0);
        assert_eq!(frame, [0, 0]);

        // Reaching the setpoint releases real samples
        tx.produce(&[8, 8, 9, 9], 2, 0);
        rx.consume(&mut frame, 0);
        assert_eq!(frame, [7, 7]);
    }

    #[test]
    fn underrun_emits_silence_and_counts() {
        let (mut tx, mut rx) = rate_fifo(2, 4);
        drained(&mut tx, &mut rx, 2);

        tx.produce(&[1, 1, 2, 2], 2, 0);
        let mut frame = [0i32; 2];
        rx.consume(&mut frame, 0); // releases (setpoint = 2)
        assert_eq!(frame, [1, 1]);
        rx.consume(&mut frame, 1);
        assert_eq!(frame, [2, 2]);

        // Dry: silence, counter, and back into the filling phase
        rx.consume(&mut frame, 2);
        assert_eq!(frame, [0, 0]);
        assert_eq!(rx.underruns(), 1);
    }

    #[test]
    fn overflow_drops_whole_block() {
        let (mut tx, mut rx) = rate_fifo(1, 4);
        drained(&mut tx, &mut rx, 1);

        tx.produce(&[1, 2, 3, 4], 4, 0);
        tx.produce(&[5, 6, 7, 8], 4, 0); // no space: dropped atomically
        assert_eq!(tx.overflows(), 1);

        let mut frame = [0i32; 1];
        rx.consume(&mut frame, 0);
        assert_eq!(frame, [1]);
    }

    #[test]
    fn init_drains_stale_epoch() {
        let (mut tx, mut rx) = rate_fifo(2, 8);
        drained(&mut tx, &mut rx, 2);
        tx.produce(&[1, 1, 2, 2, 3, 3, 4, 4], 4, 0);

        // New epoch at a different channel count: stale samples must go
        tx.init(1);
        tx.produce(&[10, 11, 12, 13], 4, 0);

        let mut frame = [0i32; 1];
        rx.consume(&mut frame, 0); // drain + released (setpoint = 4 frames)
        assert_eq!(frame, [10]);
    }

    #[test]
    fn consume_records_timestamp() {
        let (tx, mut rx) = rate_fifo(2, 8);
        let mut frame = [0i32; 2];
        rx.consume(&mut frame, 4242);
        assert_eq!(tx.last_consume_timestamp(), 4242);
    }
}
