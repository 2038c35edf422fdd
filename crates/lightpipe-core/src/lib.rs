//! Lightpipe core — asynchronous sample-rate conversion between two
//! independently clocked audio domains
//!
//! An optical multichannel stream and a local serial bus each run on their
//! own slowly drifting clock. This crate owns the bridge between them: it
//! ingests input sample blocks, fans per-channel conversion out across a
//! bounded worker pool, pushes the resampled frames through a rate-adaptive
//! FIFO, and servos the conversion ratio from the FIFO's timing feedback so
//! long-run drift cancels while short-run jitter rides on queue depth.
//!
//! # Architecture
//!
//! ```text
//! receiver thread ──frames──► ingest ──blocks──► conversion loop
//!                                                   │  fork/join
//!                                             worker pool (per-channel-slice jobs)
//!                                                   │  produce(err feedback)
//!                                             rate-adaptive FIFO ──► output domain
//! ```
//!
//! The conversion loop is single-threaded and owns all conversion state
//! exclusively; workers only ever touch disjoint channel slices during the
//! fork/join window. The only cross-thread mutation is the one-slot block
//! handoff from ingestion and the FIFO itself, both single-producer,
//! single-consumer.
//!
//! Everything is scoped to a format epoch — the pair of nominal rates plus
//! the channel count in force. A detected change tears the epoch down at a
//! block boundary and rebuilds, never mid-block.

pub mod convert;
pub mod error;
pub mod ingest;
pub mod ratio;
pub mod schedule;
pub mod supervisor;
pub mod task;
pub mod timestamp;
pub mod types;
pub mod worker;

pub use convert::{Converter, ConverterConfig, Quality};
pub use error::{BridgeError, BridgeResult, ConfigError};
pub use ingest::{
    ingest_pair, BlockEvent, BlockMailbox, BlockSource, FrameSource, IngestPort, InputFrame,
    ReferenceClock, StdClock,
};
pub use ratio::{FsRatio, RatioController};
pub use schedule::{partition_channels, ChannelJob};
pub use supervisor::{normal_rate, FormatSupervisor};
pub use task::{AsrcTask, BridgeConfig, TaskStats};
pub use types::*;

// The output domain pulls frames straight from the FIFO's consumer half
pub use lightpipe_fifo::{rate_fifo, FifoConsumer, FifoProducer};
