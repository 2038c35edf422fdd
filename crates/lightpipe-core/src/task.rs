//! The conversion task: one epoch-outer, block-inner orchestration loop
//!
//! Per epoch the task builds everything scoped to the format in force — the
//! channel partition, the converter bank, the ratio controller, the FIFO
//! producer state — then converts blocks until the supervisor reports a
//! format change or the input disconnects. All per-epoch state is dropped
//! and rebuilt at the boundary; only the worker pool and the FIFO allocation
//! survive across epochs.
//!
//! Per block, strictly in this order: acquire the block, fork/join the
//! conversion, interpolate the output timestamp, produce into the FIFO,
//! update the ratio from the returned error, poll the supervisor. The ratio
//! computed from block k's feedback is first used by block k+1's conversion,
//! one block of control lag by design.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lightpipe_fifo::FifoProducer;

use crate::convert::{ConverterConfig, Quality};
use crate::error::{BridgeResult, ConfigError};
use crate::ingest::{BlockEvent, BlockSource};
use crate::ratio::RatioController;
use crate::supervisor::FormatSupervisor;
use crate::timestamp::{interpolate_timestamp, interpolation_ticks};
use crate::types::{EpochFormat, OutputBlock, RateCode, MAX_JOBS, N_IN_FRAMES};
use crate::worker::{dispatch_block, ConverterBank};

/// Blocks between periodic depth/ratio diagnostics (a few seconds at 48 kHz)
const DEPTH_LOG_INTERVAL: u64 = 50_000;

/// Startup configuration for the bridge task.
#[derive(Debug, Clone, Copy)]
pub struct BridgeConfig {
    /// Nominal input rate until the first measurement arrives
    pub input_rate: u32,
    /// Nominal output rate until the first measurement arrives
    pub output_rate: u32,
    pub channel_count: usize,
    /// Parallel conversion jobs to allow, up to [`MAX_JOBS`]
    pub max_jobs: usize,
    pub quality: Quality,
    pub dither: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            input_rate: 48_000,
            output_rate: 48_000,
            channel_count: 8,
            max_jobs: MAX_JOBS,
            quality: Quality::default(),
            dither: false,
        }
    }
}

/// Lock-free counters the task publishes for diagnostics and tests.
#[derive(Debug, Default)]
pub struct TaskStats {
    blocks: AtomicU64,
    epochs: AtomicU64,
    overruns: AtomicU64,
}

impl TaskStats {
    /// Blocks converted across all epochs.
    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    /// Epochs started, including the first.
    pub fn epochs(&self) -> u64 {
        self.epochs.load(Ordering::Relaxed)
    }

    /// Blocks whose processing exceeded the block period.
    pub fn overruns(&self) -> u64 {
        self.overruns.load(Ordering::Relaxed)
    }
}

enum EpochExit {
    FormatChange(EpochFormat),
    Disconnected,
}

/// The sample-rate-conversion bridge task.
///
/// Owns the ingestion source and the FIFO producer half; the consumer half
/// lives with the output domain and pulls one frame per period. `run`
/// converts until the input channel closes.
pub struct AsrcTask<S: BlockSource> {
    source: S,
    producer: FifoProducer,
    /// Output domain's detected nominal rate, written by its driver
    output_rate: Arc<AtomicU32>,
    config: BridgeConfig,
    pool: rayon::ThreadPool,
    stats: Arc<TaskStats>,
}

impl<S: BlockSource> std::fmt::Debug for AsrcTask<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsrcTask")
            .field("output_rate", &self.output_rate)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S: BlockSource> AsrcTask<S> {
    /// Validate the configuration and build the worker pool. The pool is
    /// sized once and reused for every epoch.
    pub fn new(
        source: S,
        producer: FifoProducer,
        output_rate: Arc<AtomicU32>,
        config: BridgeConfig,
    ) -> BridgeResult<Self> {
        RateCode::from_hz(config.input_rate)?;
        RateCode::from_hz(config.output_rate)?;
        if config.max_jobs == 0 || config.max_jobs > MAX_JOBS {
            return Err(ConfigError::TooManyJobs {
                jobs: config.max_jobs,
                max: MAX_JOBS,
            }
            .into());
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_jobs)
            .thread_name(|i| format!("convert-{i}"))
            .build()
            .map_err(|e| ConfigError::Pool(e.to_string()))?;

        Ok(Self {
            source,
            producer,
            output_rate,
            config,
            pool,
            stats: Arc::new(TaskStats::default()),
        })
    }

    /// Counters for the monitoring side; clone before calling [`run`].
    pub fn stats(&self) -> Arc<TaskStats> {
        Arc::clone(&self.stats)
    }

    /// Run epochs until the input disconnects. Configuration errors
    /// (an unsupported rate measurement, a capacity violation) abort.
    pub fn run(mut self) -> BridgeResult<()> {
        let mut format = EpochFormat {
            input_rate: self.config.input_rate,
            output_rate: self.config.output_rate,
            channel_count: self.config.channel_count,
        };

        loop {
            self.stats.epochs.fetch_add(1, Ordering::Relaxed);
            match self.run_epoch(format)? {
                EpochExit::FormatChange(next) => {
                    log::info!(
                        "format change: {}/{} Hz {}ch -> {}/{} Hz {}ch",
                        format.input_rate,
                        format.output_rate,
                        format.channel_count,
                        next.input_rate,
                        next.output_rate,
                        next.channel_count
                    );
                    format = next;
                }
                EpochExit::Disconnected => {
                    log::info!("input closed, bridge task exiting");
                    return Ok(());
                }
            }
        }
    }

    fn run_epoch(&mut self, format: EpochFormat) -> BridgeResult<EpochExit> {
        let input_code = RateCode::from_hz(format.input_rate)?;
        let output_code = RateCode::from_hz(format.output_rate)?;

        // Bypass only holds at equal rates; a format change away from the
        // startup pair falls back to real conversion
        let quality = if self.config.quality == Quality::Bypass && input_code != output_code {
            log::warn!("bypass requested but rates differ, using linear conversion");
            Quality::Linear
        } else {
            self.config.quality
        };

        let converter_config = ConverterConfig {
            input_rate: input_code,
            output_rate: output_code,
            quality,
            dither: self.config.dither,
        };
        let mut bank = ConverterBank::new(&converter_config, format.channel_count, self.config.max_jobs)?;
        let controller = RatioController::new(bank.nominal_ratio());
        let ticks = interpolation_ticks(input_code, output_code);
        let supervisor = FormatSupervisor::new(format);

        self.source.set_channel_count(format.channel_count);
        self.producer.init(format.channel_count);
        self.producer.init_rates(format.input_rate, format.output_rate);

        log::info!(
            "epoch start: {} -> {} Hz, {} channels over {} jobs {:?}, ideal ratio {:#x}",
            format.input_rate,
            format.output_rate,
            format.channel_count,
            bank.num_jobs(),
            bank.schedule(),
            controller.ideal()
        );

        // Hard real-time budget: a block must be processed before the next
        // one's samples finish arriving
        let budget = Duration::from_nanos(
            N_IN_FRAMES as u64 * 1_000_000_000 / format.input_rate as u64,
        );

        let mut ratio = bank.nominal_ratio();
        let mut output = OutputBlock::silence();

        loop {
            let block = match self.source.next_block(format.channel_count) {
                BlockEvent::Block(block) => block,
                BlockEvent::Disconnected => return Ok(EpochExit::Disconnected),
            };
            let started = Instant::now();

            let frames = dispatch_block(&self.pool, &mut bank, &block, ratio, &mut output)?;
            let produce_timestamp =
                interpolate_timestamp(block.timestamp, bank.fractional_phase(), ticks);
            let error = self
                .producer
                .produce(&output.samples, frames, produce_timestamp);
            ratio = controller.update(error);

            if started.elapsed() > budget {
                let overruns = self.stats.overruns.fetch_add(1, Ordering::Relaxed) + 1;
                if overruns.is_power_of_two() {
                    log::warn!(
                        "processing overran the {}us block period ({} total)",
                        budget.as_micros(),
                        overruns
                    );
                }
            }

            let blocks = self.stats.blocks.fetch_add(1, Ordering::Relaxed) + 1;
            if blocks % DEPTH_LOG_INTERVAL == 0 {
                log::debug!(
                    "fifo depth {} frames, error {}, ratio {:#x}",
                    self.producer.depth_frames(),
                    error,
                    ratio.0
                );
            }

            let observed_output = self.output_rate.load(Ordering::Relaxed);
            if let Some(next) = supervisor.poll(
                self.source.observed_rate(),
                observed_output,
                self.source.observed_channels(),
            ) {
                return Ok(EpochExit::FormatChange(next));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{FrameSource, StdClock};
    use crossbeam::channel::unbounded;
    use lightpipe_fifo::rate_fifo;

    fn source() -> FrameSource {
        let (_tx, rx) = unbounded();
        FrameSource::new(rx, StdClock::new())
    }

    #[test]
    fn unsupported_startup_rate_fails_fast() {
        let (producer, _consumer) = rate_fifo(8, 64);
        let config = BridgeConfig {
            input_rate: 12_345,
            ..Default::default()
        };
        let err = AsrcTask::new(source(), producer, Arc::new(AtomicU32::new(0)), config);
        assert!(err.is_err());
    }

    #[test]
    fn oversized_worker_request_fails_fast() {
        let (producer, _consumer) = rate_fifo(8, 64);
        let config = BridgeConfig {
            max_jobs: MAX_JOBS + 1,
            ..Default::default()
        };
        let err = AsrcTask::new(source(), producer, Arc::new(AtomicU32::new(0)), config);
        assert!(matches!(
            err.unwrap_err(),
            crate::error::BridgeError::Config(ConfigError::TooManyJobs { .. })
        ));
    }
}
