//! Channel scheduler: partitions the active channels into parallel jobs
//!
//! The partition is deliberately biased rather than even: every job takes
//! `ceil(channels / max_jobs)` channels except possibly the last, which takes
//! the remainder. At most one job is short, which bounds the worst-case
//! per-worker cost and keeps the per-job arithmetic trivial.

/// One worker's contiguous channel-slice assignment for a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelJob {
    /// Channels this job converts
    pub num_channels: usize,
    /// First channel of the slice within the interleaved block
    pub channel_start: usize,
}

/// Partition `channel_count` channels into at most `max_jobs` contiguous
/// jobs. The jobs cover `[0, channel_count)` exactly, in order, with no
/// overlap; zero channels yields zero jobs.
pub fn partition_channels(channel_count: usize, max_jobs: usize) -> Vec<ChannelJob> {
    debug_assert!(max_jobs > 0);
    let mut jobs = Vec::with_capacity(max_jobs);
    if channel_count == 0 {
        return jobs;
    }

    let per_job = channel_count.div_ceil(max_jobs);
    let mut start = 0;
    while start < channel_count {
        let num_channels = per_job.min(channel_count - start);
        jobs.push(ChannelJob {
            num_channels,
            channel_start: start,
        });
        start += num_channels;
    }
    jobs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{MAX_CHANNELS, MAX_JOBS};

    #[test]
    fn eight_channels_four_jobs() {
        let jobs = partition_channels(8, 4);
        assert_eq!(jobs.len(), 4);
        for (i, job) in jobs.iter().enumerate() {
            assert_eq!(job.num_channels, 2);
            assert_eq!(job.channel_start, i * 2);
        }
    }

    #[test]
    fn five_channels_four_jobs_has_one_short_tail() {
        let jobs = partition_channels(5, 4);
        assert_eq!(jobs.len(), 3);
        assert_eq!(
            jobs,
            [
                ChannelJob { num_channels: 2, channel_start: 0 },
                ChannelJob { num_channels: 2, channel_start: 2 },
                ChannelJob { num_channels: 1, channel_start: 4 },
            ]
        );
    }

    #[test]
    fn zero_channels_zero_jobs() {
        assert!(partition_channels(0, 4).is_empty());
    }

    #[test]
    fn partition_is_exact_cover_for_all_counts() {
        for channels in 1..=MAX_CHANNELS {
            for max_jobs in 1..=MAX_JOBS {
                let jobs = partition_channels(channels, max_jobs);
                assert!(jobs.len() <= max_jobs);
                assert!(!jobs.is_empty());

                // Contiguous, strictly increasing, exact cover
                let mut next = 0;
                for job in &jobs {
                    assert!(job.num_channels > 0);
                    assert_eq!(job.channel_start, next);
                    next += job.num_channels;
                }
                assert_eq!(next, channels);

                // At most one short job, and only at the tail
                let per_job = jobs[0].num_channels;
                for job in &jobs[..jobs.len() - 1] {
                    assert_eq!(job.num_channels, per_job);
                }
                assert!(jobs[jobs.len() - 1].num_channels <= per_job);
            }
        }
    }
}
