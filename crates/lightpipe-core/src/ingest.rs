//! Ingestion front end: sample frames in, timestamped blocks out
//!
//! The upstream receiver delivers one interleaved sample period at a time,
//! tagged with the nominal rate its clock recovery currently reports and the
//! channel count in force (the optical side halves its channel count at
//! double rates). Two shapes assemble frames into blocks:
//!
//! - [`FrameSource`] — polling: the conversion loop itself blocks on the
//!   frame channel and accumulates directly into a staging block.
//! - [`IngestPort`]/[`BlockMailbox`] — asynchronous: the receiver's own
//!   thread pushes frames at arbitrary times; completed blocks cross to the
//!   loop through a one-slot mailbox gated by a ready flag, so at most one
//!   handoff is ever outstanding and a block the loop was not ready for is
//!   dropped whole, never torn.
//!
//! Either way the block's timestamp is the reference-clock tick captured at
//! its first frame, once per block.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam::channel::{bounded, Receiver, Sender, TrySendError};

use crate::types::{InputBlock, Sample, Timestamp, MAX_CHANNELS, N_IN_FRAMES, REF_CLOCK_HZ};

/// One interleaved sample period from the upstream domain.
#[derive(Debug, Clone, Copy)]
pub struct InputFrame {
    pub samples: [Sample; MAX_CHANNELS],
    /// Channels actually carried in `samples`
    pub channel_count: usize,
    /// Nominal rate the upstream clock recovery currently reports;
    /// 0 while it has no stable measurement yet
    pub rate: u32,
}

impl InputFrame {
    pub fn silence(channel_count: usize, rate: u32) -> Self {
        Self {
            samples: [0; MAX_CHANNELS],
            channel_count,
            rate,
        }
    }
}

/// Source of the reference-clock ticks used for block timestamps.
/// A trait seam so tests can drive virtual time.
pub trait ReferenceClock: Send {
    fn now(&self) -> Timestamp;
}

/// Wall-clock reference: 100 MHz ticks since construction, wrapping.
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ReferenceClock for StdClock {
    fn now(&self) -> Timestamp {
        let ticks = self.origin.elapsed().as_nanos() * (REF_CLOCK_HZ as u128) / 1_000_000_000;
        ticks as u32 as Timestamp
    }
}

/// What the conversion loop gets back when it asks for the next block.
pub enum BlockEvent {
    Block(InputBlock),
    /// The upstream channel closed; the bridge shuts down cleanly
    Disconnected,
}

/// Abstracts the two ingestion shapes for the conversion loop.
pub trait BlockSource {
    /// Block until a full input block is available.
    fn next_block(&mut self, channel_count: usize) -> BlockEvent;

    /// Most recent nominal input rate observed (0 = no information).
    fn observed_rate(&self) -> u32;

    /// Most recent channel count observed on input frames.
    fn observed_channels(&self) -> usize;

    /// Tell the source the channel count for the epoch being entered.
    fn set_channel_count(&mut self, channel_count: usize) {
        let _ = channel_count;
    }
}

// ─────────────────────────── Polling shape ───────────────────────────

/// Polling ingestion: the conversion loop owns the frame receiver and
/// accumulates blocks in place.
pub struct FrameSource<C: ReferenceClock = StdClock> {
    rx: Receiver<InputFrame>,
    clock: C,
    observed_rate: u32,
    observed_channels: usize,
}

impl<C: ReferenceClock> FrameSource<C> {
    pub fn new(rx: Receiver<InputFrame>, clock: C) -> Self {
        Self {
            rx,
            clock,
            observed_rate: 0,
            observed_channels: 0,
        }
    }
}

impl<C: ReferenceClock> BlockSource for FrameSource<C> {
    fn next_block(&mut self, channel_count: usize) -> BlockEvent {
        let mut block = InputBlock::silence();
        for frame_idx in 0..N_IN_FRAMES {
            let frame = match self.rx.recv() {
                Ok(frame) => frame,
                Err(_) => return BlockEvent::Disconnected,
            };
            if frame_idx == 0 {
                block.timestamp = self.clock.now();
            }
            self.observed_rate = frame.rate;
            self.observed_channels = frame.channel_count;

            let base = frame_idx * channel_count;
            block.samples[base..base + channel_count]
                .copy_from_slice(&frame.samples[..channel_count]);
        }
        BlockEvent::Block(block)
    }

    fn observed_rate(&self) -> u32 {
        self.observed_rate
    }

    fn observed_channels(&self) -> usize {
        self.observed_channels
    }
}

// ─────────────────────────── Interrupt shape ───────────────────────────

/// State shared between the receiver-side port and the loop-side mailbox.
struct IngestShared {
    /// Loop is parked waiting for a block; the port may publish
    ready: AtomicBool,
    /// Latest nominal rate seen on a frame
    rate: AtomicU32,
    /// Latest channel count seen on a frame
    channels_seen: AtomicUsize,
    /// Channel count the port interleaves blocks at (epoch-scoped)
    channel_count: AtomicUsize,
    /// Blocks completed while the loop was not ready
    overruns: AtomicU64,
}

/// Receiver-thread half of the asynchronous shape. Owns the double buffer:
/// one staging slot fills while the previously published one is read by the
/// loop. Safe to call at arbitrary times relative to the loop.
pub struct IngestPort<C: ReferenceClock = StdClock> {
    slots: [InputBlock; 2],
    active: usize,
    frames_in_slot: usize,
    /// Channel count cached at each block start
    block_channels: usize,
    tx: Sender<InputBlock>,
    shared: Arc<IngestShared>,
    clock: C,
}

/// Conversion-loop half of the asynchronous shape: a one-slot mailbox.
pub struct BlockMailbox {
    rx: Receiver<InputBlock>,
    shared: Arc<IngestShared>,
}

/// Build the two halves of the asynchronous ingestion path.
pub fn ingest_pair<C: ReferenceClock>(
    clock: C,
    channel_count: usize,
) -> (IngestPort<C>, BlockMailbox) {
    let (tx, rx) = bounded(1);
    let shared = Arc::new(IngestShared {
        ready: AtomicBool::new(false),
        rate: AtomicU32::new(0),
        channels_seen: AtomicUsize::new(0),
        channel_count: AtomicUsize::new(channel_count),
        overruns: AtomicU64::new(0),
    });

    let port = IngestPort {
        slots: [InputBlock::silence(); 2],
        active: 0,
        frames_in_slot: 0,
        block_channels: channel_count,
        tx,
        shared: Arc::clone(&shared),
        clock,
    };
    let mailbox = BlockMailbox { rx, shared };
    (port, mailbox)
}

impl<C: ReferenceClock> IngestPort<C> {
    /// Accept one sample period. On the `N_IN_FRAMES`th frame the filled
    /// slot is published — but only if the loop is waiting and the mailbox
    /// is empty; otherwise the block is dropped whole and counted.
    pub fn push_frame(&mut self, frame: &InputFrame) {
        if self.frames_in_slot == 0 {
            self.slots[self.active].timestamp = self.clock.now();
            self.block_channels = self.shared.channel_count.load(Ordering::Acquire);
        }

        self.shared.rate.store(frame.rate, Ordering::Release);
        self.shared
            .channels_seen
            .store(frame.channel_count, Ordering::Release);

        let channels = self.block_channels;
        let base = self.frames_in_slot * channels;
        self.slots[self.active].samples[base..base + channels]
            .copy_from_slice(&frame.samples[..channels]);

        self.frames_in_slot += 1;
        if self.frames_in_slot < N_IN_FRAMES {
            return;
        }
        self.frames_in_slot = 0;

        if !self.shared.ready.load(Ordering::Acquire) {
            self.shared.overruns.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match self.tx.try_send(self.slots[self.active]) {
            Ok(()) => {
                // Flip to the other staging slot; the published copy now
                // belongs to the loop
                self.active ^= 1;
            }
            Err(TrySendError::Full(_)) => {
                self.shared.overruns.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Blocks completed while the loop was busy.
    pub fn overruns(&self) -> u64 {
        self.shared.overruns.load(Ordering::Relaxed)
    }
}

impl BlockSource for BlockMailbox {
    fn next_block(&mut self, _channel_count: usize) -> BlockEvent {
        self.shared.ready.store(true, Ordering::Release);
        let event = match self.rx.recv() {
            Ok(block) => BlockEvent::Block(block),
            Err(_) => BlockEvent::Disconnected,
        };
        self.shared.ready.store(false, Ordering::Release);
        event
    }

    fn observed_rate(&self) -> u32 {
        self.shared.rate.load(Ordering::Acquire)
    }

    fn observed_channels(&self) -> usize {
        self.shared.channels_seen.load(Ordering::Acquire)
    }

    fn set_channel_count(&mut self, channel_count: usize) {
        self.shared
            .channel_count
            .store(channel_count, Ordering::Release);
    }
}
