//! Parallel conversion of one block across the worker pool
//!
//! Each job owns its converter and scratch for one epoch, reads its channel
//! slice out of the shared input block, converts, and leaves the result in
//! its own output scratch. Jobs are read-disjoint and write-disjoint by
//! construction, so the dispatch is a plain parallel-for with a join barrier
//! and no locking; the loop interleaves the job outputs into the shared
//! output block after the join.
//!
//! Interleave rule, both directions:
//! `frame * channel_count + channel_start + channel_offset`.

use rayon::prelude::*;

use crate::convert::{Converter, ConverterConfig};
use crate::error::{BridgeResult, ConfigError};
use crate::ratio::FsRatio;
use crate::schedule::{partition_channels, ChannelJob};
use crate::types::{
    InputBlock, OutputBlock, Sample, MAX_CHANNELS, MAX_CHANNELS_PER_JOB, MAX_JOBS, MAX_OUT_FRAMES,
    N_IN_FRAMES,
};

/// One worker slot's epoch state: its channel slice, converter, and scratch.
struct JobState {
    job: ChannelJob,
    converter: Converter,
    input_scratch: Vec<Sample>,
    output_scratch: Vec<Sample>,
    out_frames: usize,
}

impl JobState {
    /// Pack, convert, unpack into the job's own scratch. Runs on a worker
    /// thread; touches nothing outside this job's state and its read-only
    /// slice of the input block.
    fn run(&mut self, input: &InputBlock, channel_count: usize, ratio: FsRatio) -> BridgeResult<()> {
        let n = self.job.num_channels;
        let start = self.job.channel_start;

        for frame in 0..N_IN_FRAMES {
            let base = frame * channel_count + start;
            self.input_scratch[frame * n..(frame + 1) * n]
                .copy_from_slice(&input.samples[base..base + n]);
        }

        self.out_frames = self.converter.process(
            &self.input_scratch,
            n,
            &mut self.output_scratch,
            ratio,
        )?;
        Ok(())
    }
}

/// Fixed-capacity arena of per-job conversion state for one epoch.
///
/// Capacity is checked at construction: the partition must fit the worker
/// pool and no job may carry more channels than one converter instance is
/// sized for. Violations are configuration errors, caught before any audio
/// moves.
pub struct ConverterBank {
    jobs: Vec<JobState>,
    channel_count: usize,
    nominal_ratio: FsRatio,
}

impl std::fmt::Debug for ConverterBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConverterBank")
            .field("jobs", &self.jobs.len())
            .field("channel_count", &self.channel_count)
            .field("nominal_ratio", &self.nominal_ratio)
            .finish()
    }
}

impl ConverterBank {
    pub fn new(
        config: &ConverterConfig,
        channel_count: usize,
        max_jobs: usize,
    ) -> BridgeResult<Self> {
        if channel_count > MAX_CHANNELS {
            return Err(ConfigError::TooManyChannels {
                channels: channel_count,
                max_jobs,
                per_job: MAX_CHANNELS_PER_JOB,
            }
            .into());
        }
        let schedule = partition_channels(channel_count, max_jobs);

        if schedule.len() > MAX_JOBS {
            return Err(ConfigError::TooManyJobs {
                jobs: schedule.len(),
                max: MAX_JOBS,
            }
            .into());
        }
        if let Some(widest) = schedule.iter().map(|j| j.num_channels).max() {
            if widest > MAX_CHANNELS_PER_JOB {
                return Err(ConfigError::TooManyChannels {
                    channels: channel_count,
                    max_jobs,
                    per_job: MAX_CHANNELS_PER_JOB,
                }
                .into());
            }
        }

        let mut nominal_ratio = config.nominal_ratio();
        let mut jobs = Vec::with_capacity(schedule.len());
        for job in schedule {
            let (converter, nominal) = Converter::new(config, job.num_channels)?;
            nominal_ratio = nominal;
            jobs.push(JobState {
                job,
                converter,
                input_scratch: vec![0; N_IN_FRAMES * job.num_channels],
                output_scratch: vec![0; MAX_OUT_FRAMES * job.num_channels],
                out_frames: 0,
            });
        }

        Ok(Self {
            jobs,
            channel_count,
            nominal_ratio,
        })
    }

    /// The nominal conversion ratio the epoch's controller locks onto.
    pub fn nominal_ratio(&self) -> FsRatio {
        self.nominal_ratio
    }

    /// The jobs' channel slices, for logging and tests.
    pub fn schedule(&self) -> Vec<ChannelJob> {
        self.jobs.iter().map(|j| j.job).collect()
    }

    pub fn num_jobs(&self) -> usize {
        self.jobs.len()
    }

    /// Fractional phase of the first job's converter, which is authoritative
    /// for output timestamping (all jobs run in lockstep).
    pub fn fractional_phase(&self) -> u64 {
        self.jobs
            .first()
            .map(|j| j.converter.fractional_phase())
            .unwrap_or(0)
    }
}

/// Convert one block: fork the jobs onto the pool, join, interleave.
///
/// Every job must complete before this returns; none is skipped or
/// reordered relative to the barrier. All jobs report the same output frame
/// count — a representation invariant of the converters (same ratio, same
/// phase), asserted rather than re-validated.
pub fn dispatch_block(
    pool: &rayon::ThreadPool,
    bank: &mut ConverterBank,
    input: &InputBlock,
    ratio: FsRatio,
    output: &mut OutputBlock,
) -> BridgeResult<usize> {
    if bank.jobs.is_empty() {
        output.frames = 0;
        return Ok(0);
    }

    let channel_count = bank.channel_count;
    let results: Vec<BridgeResult<()>> = pool.install(|| {
        bank.jobs
            .par_iter_mut()
            .map(|job| job.run(input, channel_count, ratio))
            .collect()
    });
    for result in results {
        result?;
    }

    let out_frames = bank.jobs[0].out_frames;
    debug_assert!(bank.jobs.iter().all(|j| j.out_frames == out_frames));

    for job_state in &bank.jobs {
        let n = job_state.job.num_channels;
        let start = job_state.job.channel_start;
        for frame in 0..out_frames {
            let base = frame * channel_count + start;
            output.samples[base..base + n]
                .copy_from_slice(&job_state.output_scratch[frame * n..(frame + 1) * n]);
        }
    }
    output.frames = out_frames;
    Ok(out_frames)
}
