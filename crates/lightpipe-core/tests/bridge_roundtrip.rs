//! End-to-end bridge tests: ingestion through conversion into the FIFO and
//! out the consumer half, across real threads.

use std::sync::atomic::AtomicU32;
use std::sync::Arc;
use std::thread;

use crossbeam::channel::{unbounded, Sender};

use lightpipe_core::{
    rate_fifo, AsrcTask, BridgeConfig, FrameSource, InputFrame, Quality, StdClock, MAX_CHANNELS,
};

fn frame(index: i32, rate: u32) -> InputFrame {
    let mut samples = [0; MAX_CHANNELS];
    samples[0] = 1_000 + index;
    samples[1] = 2_000 + index;
    InputFrame {
        samples,
        channel_count: 2,
        rate,
    }
}

fn feed(tx: &Sender<InputFrame>, start: i32, count: i32, rate: u32) {
    for i in start..start + count {
        tx.send(frame(i, rate)).expect("task hung up early");
    }
}

#[test]
fn bypass_round_trip_reproduces_the_input() {
    let (tx, rx) = unbounded();
    let (producer, mut consumer) = rate_fifo(MAX_CHANNELS, 256);
    let config = BridgeConfig {
        channel_count: 2,
        quality: Quality::Bypass,
        ..Default::default()
    };

    let task = AsrcTask::new(
        FrameSource::new(rx, StdClock::new()),
        producer,
        Arc::new(AtomicU32::new(0)),
        config,
    )
    .expect("valid config");
    let stats = task.stats();
    let worker = thread::spawn(move || task.run());

    // 50 whole blocks, then hang up so the task drains and exits
    feed(&tx, 0, 200, 48_000);
    drop(tx);
    worker.join().unwrap().expect("task failed");

    assert_eq!(stats.epochs(), 1);
    assert_eq!(stats.blocks(), 50);

    // Everything the task produced is sitting in the queue: the consumer
    // must see the exact input stream, frame for frame, channel for channel
    let mut out = [0i32; MAX_CHANNELS];
    for i in 0..200 {
        assert_eq!(consumer.consume(&mut out, i), 2);
        assert_eq!(out[0], 1_000 + i as i32, "frame {i} channel 0");
        assert_eq!(out[1], 2_000 + i as i32, "frame {i} channel 1");
    }
    assert_eq!(consumer.underruns(), 0);
}

#[test]
fn rate_change_reinitializes_exactly_once() {
    let (tx, rx) = unbounded();
    let (producer, _consumer) = rate_fifo(MAX_CHANNELS, 256);
    let config = BridgeConfig {
        channel_count: 2,
        quality: Quality::Linear,
        ..Default::default()
    };

    let task = AsrcTask::new(
        FrameSource::new(rx, StdClock::new()),
        producer,
        Arc::new(AtomicU32::new(0)),
        config,
    )
    .expect("valid config");
    let stats = task.stats();
    let worker = thread::spawn(move || task.run());

    // Steady at 48 kHz, then the receiver reports 44.1 kHz: one
    // re-initialization, after which the new rate is steady state
    feed(&tx, 0, 40, 48_000);
    feed(&tx, 40, 40, 44_100);
    drop(tx);
    worker.join().unwrap().expect("task failed");

    assert_eq!(stats.epochs(), 2);
    assert_eq!(stats.blocks(), 20);
}

#[test]
fn output_rate_watch_triggers_a_format_change() {
    let (tx, rx) = unbounded();
    let (producer, _consumer) = rate_fifo(MAX_CHANNELS, 256);
    let output_rate = Arc::new(AtomicU32::new(0));
    let config = BridgeConfig {
        channel_count: 2,
        quality: Quality::Linear,
        ..Default::default()
    };

    let task = AsrcTask::new(
        FrameSource::new(rx, StdClock::new()),
        producer,
        Arc::clone(&output_rate),
        config,
    )
    .expect("valid config");
    let stats = task.stats();
    let worker = thread::spawn(move || task.run());

    feed(&tx, 0, 40, 48_000);
    // The output domain's driver detects a new nominal rate
    output_rate.store(96_000, std::sync::atomic::Ordering::Relaxed);
    feed(&tx, 40, 40, 48_000);
    drop(tx);
    worker.join().unwrap().expect("task failed");

    assert_eq!(stats.epochs(), 2);
}
