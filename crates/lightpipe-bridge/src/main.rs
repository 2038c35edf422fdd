//! Simulated optical-to-serial audio bridge
//!
//! Stands in for the hardware around the conversion core: one thread plays
//! the optical receiver, pushing sample frames at a deliberately offset
//! clock; one thread plays the serial-bus consumer, pulling frames at its
//! own offset clock. The conversion core between them must keep the FIFO
//! depth pinned at its setpoint despite the drift.
//!
//! Run with an optional YAML settings path:
//! `lightpipe-bridge [bridge.yaml]`

mod config;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use crossbeam::channel::bounded;

use config::BridgeSettings;
use lightpipe_core::{
    normal_rate, rate_fifo, AsrcTask, BridgeConfig, FifoConsumer, FrameSource, InputFrame,
    ReferenceClock, StdClock, MAX_CHANNELS,
};

/// Frames pushed per pacing tick; keeps sleep granularity around a
/// millisecond instead of one sleep per sample period
const PACER_INTERVAL: Duration = Duration::from_millis(1);

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let settings = match std::env::args().nth(1) {
        Some(path) => BridgeSettings::load(&path)?,
        None => BridgeSettings::default(),
    };
    log::info!("settings: {settings:?}");

    let quality = settings.quality()?;
    let (frame_tx, frame_rx) = bounded(4096);
    let (producer, consumer) = rate_fifo(MAX_CHANNELS, settings.fifo_frames);
    let output_rate = Arc::new(AtomicU32::new(settings.output_rate));
    let stop = Arc::new(AtomicBool::new(false));

    let task = AsrcTask::new(
        FrameSource::new(frame_rx, StdClock::new()),
        producer,
        Arc::clone(&output_rate),
        BridgeConfig {
            input_rate: settings.input_rate,
            output_rate: settings.output_rate,
            channel_count: settings.channels,
            max_jobs: settings.max_jobs,
            quality,
            dither: settings.dither,
        },
    )
    .context("configuring the bridge task")?;
    let stats = task.stats();

    let task_thread = thread::Builder::new()
        .name("bridge-task".into())
        .spawn(move || task.run())?;

    // Optical receiver stand-in: frames at the offset input clock, tagged
    // with the rate its clock recovery would report
    let receiver = {
        let settings = settings.clone();
        thread::Builder::new().name("optical-rx".into()).spawn(move || {
            let rate = BridgeSettings::effective_rate(settings.input_rate, settings.input_ppm);
            let detected = normal_rate(rate.round() as u32);
            let deadline = Instant::now() + Duration::from_secs(settings.run_seconds);
            let mut carry = 0.0f64;
            let mut index: i64 = 0;

            while Instant::now() < deadline {
                carry += rate * PACER_INTERVAL.as_secs_f64();
                let whole = carry as usize;
                carry -= whole as f64;

                for _ in 0..whole {
                    let mut frame = InputFrame::silence(settings.channels, detected);
                    for ch in 0..settings.channels {
                        // A slow ramp per channel, easy to eyeball in logs
                        frame.samples[ch] = ((index % 10_000) * 1_000 + ch as i64) as i32;
                    }
                    index += 1;
                    if frame_tx.send(frame).is_err() {
                        return;
                    }
                }
                thread::sleep(PACER_INTERVAL);
            }
            // Dropping the sender shuts the conversion task down
        })?
    };

    // Serial-bus stand-in: pulls one frame per period at its own clock
    let player = {
        let settings = settings.clone();
        let stop = Arc::clone(&stop);
        thread::Builder::new().name("serial-tx".into()).spawn(move || {
            run_player(consumer, &settings, &stop);
        })?
    };

    receiver.join().expect("receiver thread panicked");
    task_thread
        .join()
        .expect("task thread panicked")
        .context("bridge task failed")?;
    stop.store(true, Ordering::Relaxed);
    player.join().expect("player thread panicked");

    log::info!(
        "done: {} blocks over {} epochs, {} timing overruns",
        stats.blocks(),
        stats.epochs(),
        stats.overruns()
    );
    Ok(())
}

fn run_player(mut consumer: FifoConsumer, settings: &BridgeSettings, stop: &AtomicBool) {
    let rate = BridgeSettings::effective_rate(settings.output_rate, settings.output_ppm);
    let clock = StdClock::new();
    let started = Instant::now();
    let mut carry = 0.0f64;
    let mut pulled: u64 = 0;
    let mut last_report = Instant::now();

    while !stop.load(Ordering::Relaxed) {
        carry += rate * PACER_INTERVAL.as_secs_f64();
        let whole = carry as usize;
        carry -= whole as f64;

        let mut out = [0i32; MAX_CHANNELS];
        for _ in 0..whole {
            consumer.consume(&mut out, clock.now());
            pulled += 1;
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            log::info!(
                "t={:>4}s pulled {} frames, {} underruns, latest sample {:#x}",
                started.elapsed().as_secs(),
                pulled,
                consumer.underruns(),
                out[0]
            );
        }
        thread::sleep(PACER_INTERVAL);
    }
}
