//! Acquisition thread lifecycle and the low-priority service loop.
//!
//! Verifies that:
//! - The acquisition thread drives the load switch from real cycle boundaries
//! - The thread is joined and the load dropped when the runner is dropped
//! - The service loop answers console commands and respects shutdown

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel as xch;
use divert_config::Settings;
use divert_core::SharedControls;
use divert_core::engine::STARTUP_SETTLE_CYCLES;
use divert_core::mocks::{CountingWatchdog, RecordingLoadSwitch, WaveformFrontend};
use divert_core::runner::{AcquisitionRunner, supervise};
use divert_traits::clock::{MonotonicClock, TestClock};

fn wait_until(deadline: Duration, mut done: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn acquisition_thread_turns_surplus_into_diversion() {
    let shared = Arc::new(SharedControls::new(Settings::default()));
    let frontend = WaveformFrontend::new(200.0, 120.0, 100.0);
    let switch = RecordingLoadSwitch::default();

    let runner = AcquisitionRunner::spawn(
        frontend,
        switch.clone(),
        Arc::clone(&shared),
        MonotonicClock::new(),
    )
    .unwrap();

    // The settle window has to elapse first; at the real tick rate that is
    // under a second of wall time.
    let shared_poll = Arc::clone(&shared);
    assert!(
        wait_until(Duration::from_secs(20), || {
            shared_poll.cycle_count() > u64::from(STARTUP_SETTLE_CYCLES) + 20
        }),
        "cycle counter never progressed past the settle window"
    );
    assert!(
        wait_until(Duration::from_secs(5), || switch.is_on()),
        "sustained surplus never reached the load switch"
    );
    assert!(shared.grid_power_ipu() > 0);

    // Dropping the runner joins the thread and leaves the load off.
    drop(runner);
    assert!(!switch.is_on());
}

#[test]
fn starved_load_is_reprobed_after_the_retest_interval() {
    // A simulated clock lets the acquisition thread burn through the
    // ten-minute retest interval in real seconds: every tick sleep advances
    // the timeline instead of blocking.
    let shared = Arc::new(SharedControls::new(Settings::default()));
    // Strong export, but the divert channel never draws: the tank reads full.
    let frontend = WaveformFrontend::new(200.0, 120.0, 0.0);
    let switch = RecordingLoadSwitch::default();
    let clock = TestClock::new();

    let runner = AcquisitionRunner::spawn(
        frontend,
        switch.clone(),
        Arc::clone(&shared),
        clock.clone(),
    )
    .unwrap();

    let shared_poll = Arc::clone(&shared);
    assert!(
        wait_until(Duration::from_secs(30), || shared_poll.tank_full()),
        "starved load never latched tank-full"
    );
    assert!(
        wait_until(Duration::from_secs(5), || !switch.is_on()),
        "load stayed on after the tank-full latch"
    );

    // A retest window switches the load on and, still starved, back off
    // again, so the transition counter moves by at least two.
    let latched_at = switch.transitions.load(Ordering::Relaxed);
    assert!(
        wait_until(Duration::from_secs(120), || {
            switch.transitions.load(Ordering::Relaxed) >= latched_at + 2
        }),
        "no retest burst reached the load switch"
    );
    assert!(shared.tank_full(), "a starved retest must keep the latch");
    assert!(clock.elapsed() >= Duration::from_secs(600));

    drop(runner);
    assert!(!switch.is_on());
}

#[test]
fn runner_can_be_created_dropped_and_recreated() {
    let shared = Arc::new(SharedControls::new(Settings::default()));
    for _ in 0..3 {
        let runner = AcquisitionRunner::spawn(
            WaveformFrontend::new(200.0, 0.0, 0.0),
            RecordingLoadSwitch::default(),
            Arc::clone(&shared),
            MonotonicClock::new(),
        )
        .unwrap();
        std::thread::sleep(Duration::from_millis(50));
        drop(runner);
    }
}

#[test]
fn service_loop_answers_commands_and_stops_on_shutdown() {
    let shared = Arc::new(SharedControls::new(Settings::default()));
    let running = Arc::new(AtomicBool::new(true));
    let (cmd_tx, cmd_rx) = xch::unbounded::<String>();
    let (out_tx, out_rx) = xch::unbounded::<String>();
    let mut watchdog = CountingWatchdog::default();
    let feeds = Arc::clone(&watchdog.feeds);

    let loop_shared = Arc::clone(&shared);
    let loop_running = Arc::clone(&running);
    let handle = std::thread::spawn(move || {
        supervise(
            &loop_shared,
            &mut watchdog,
            &cmd_rx,
            PathBuf::from("/nonexistent/settings.toml"),
            &loop_running,
            |line| {
                let _ = out_tx.send(line.to_string());
            },
        );
    });

    cmd_tx.send("disable".into()).unwrap();
    let reply = out_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(reply, "diversion disabled");
    assert!(!shared.enabled());

    cmd_tx.send("bogus".into()).unwrap();
    let reply = out_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(reply.starts_with("error:"));

    // A pending digest is emitted through the same sink.
    shared.raise_digest();
    let digest = out_rx.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(digest, "0,0,0,0,0,0");

    // The first service pass feeds the watchdog unconditionally.
    assert!(wait_until(Duration::from_secs(2), || {
        feeds.load(Ordering::Relaxed) >= 1
    }));

    running.store(false, Ordering::Relaxed);
    handle.join().unwrap();
}
