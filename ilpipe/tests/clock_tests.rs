// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for the media clock.
//!
//! A manually advanced wall clock makes the extrapolation window
//! deterministic.

use std::sync::{
    Arc,
    atomic::{AtomicI64, Ordering},
};

use ilpipe::{
    EngineContext, MediaClock, NORMAL_SPEED, PRE_ROLL_US, WAIT_AUDIO, WAIT_VIDEO, WallClock,
    engine::{
        ClockState, RefClock, State,
        loopback::{ClockSnapshot, LoopbackEngine},
    },
};

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

#[derive(Default)]
struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    fn advance_ms(&self, ms: i64) {
        self.now.fetch_add(ms * 1000, Ordering::SeqCst);
    }
}

impl WallClock for ManualClock {
    fn now_us(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

struct Fixture {
    engine: Arc<LoopbackEngine>,
    wall: Arc<ManualClock>,
    clock: MediaClock,
}

impl Fixture {
    fn snapshot(&self) -> ClockSnapshot {
        let handle = self.clock.component().handle().unwrap();
        self.engine.clock_snapshot(handle).unwrap()
    }

    fn set_engine_time(&self, media_time: i64) {
        let handle = self.clock.component().handle().unwrap();
        self.engine.set_media_time(handle, media_time);
    }
}

fn setup_test() -> Fixture {
    LOG_ONCE.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::builder()
                    .with_default_directive(tracing::level_filters::LevelFilter::INFO.into())
                    .from_env_lossy(),
            )
            .init();
    });
    let engine = Arc::new(LoopbackEngine::new());
    let context = EngineContext::new(engine.clone()).unwrap();
    let wall = Arc::new(ManualClock::default());
    let clock = MediaClock::open_with_wall_clock(&context, wall.clone()).unwrap();
    Fixture {
        engine,
        wall,
        clock,
    }
}

#[test]
fn extrapolates_inside_the_sampling_window() {
    let fixture = setup_test();
    fixture.set_engine_time(10_000_000);

    assert_eq!(fixture.clock.get_media_time().unwrap(), 10_000_000);
    fixture.wall.advance_ms(40);
    assert_eq!(fixture.clock.get_media_time().unwrap(), 10_040_000);
}

#[test]
fn resamples_after_the_window_expires() {
    let fixture = setup_test();
    fixture.set_engine_time(1_000_000);
    assert_eq!(fixture.clock.get_media_time().unwrap(), 1_000_000);

    fixture.set_engine_time(5_000_000);
    fixture.wall.advance_ms(50);
    assert_eq!(fixture.clock.get_media_time().unwrap(), 1_050_000);

    fixture.wall.advance_ms(60);
    assert_eq!(fixture.clock.get_media_time().unwrap(), 5_000_000);
}

#[test]
fn mutations_force_a_resample() {
    let fixture = setup_test();
    fixture.set_engine_time(1_000_000);
    fixture.clock.get_media_time().unwrap();

    fixture.set_engine_time(2_000_000);
    fixture.clock.step(1).unwrap();
    assert_eq!(fixture.clock.get_media_time().unwrap(), 2_000_000);
    assert_eq!(fixture.snapshot().steps, 1);
}

#[test]
fn pause_freezes_extrapolation() {
    let fixture = setup_test();
    fixture.set_engine_time(3_000_000);
    fixture.clock.pause().unwrap();
    assert!(fixture.clock.is_paused());
    assert_eq!(fixture.snapshot().scale, 0);

    let first = fixture.clock.get_media_time().unwrap();
    fixture.wall.advance_ms(30);
    assert_eq!(fixture.clock.get_media_time().unwrap(), first);
    fixture.wall.advance_ms(30);
    assert_eq!(fixture.clock.get_media_time().unwrap(), first);
}

#[test]
fn pause_and_resume_are_idempotent() {
    let fixture = setup_test();
    fixture.clock.set_speed(2 * NORMAL_SPEED, false).unwrap();

    fixture.clock.pause().unwrap();
    fixture.clock.pause().unwrap();
    assert!(fixture.clock.is_paused());

    fixture.clock.resume().unwrap();
    assert!(!fixture.clock.is_paused());
    assert_eq!(fixture.snapshot().scale, 2 << 16);
    fixture.clock.resume().unwrap();
    assert_eq!(fixture.clock.speed(), 2 * NORMAL_SPEED);
}

#[test]
fn speed_scales_extrapolation() {
    let fixture = setup_test();
    fixture.clock.set_speed(2 * NORMAL_SPEED, false).unwrap();
    fixture.set_engine_time(1_000_000);

    assert_eq!(fixture.clock.get_media_time().unwrap(), 1_000_000);
    fixture.wall.advance_ms(10);
    assert_eq!(fixture.clock.get_media_time().unwrap(), 1_020_000);
}

#[test]
fn trick_play_speed_is_not_persisted() {
    let fixture = setup_test();
    fixture.clock.set_speed(3 * NORMAL_SPEED, true).unwrap();
    assert_eq!(fixture.snapshot().scale, 3 << 16);
    assert_eq!(fixture.clock.speed(), NORMAL_SPEED);

    fixture.clock.set_speed(-NORMAL_SPEED, true).unwrap();
    assert_eq!(fixture.snapshot().scale, 0);
    fixture.clock.set_speed(5 * NORMAL_SPEED, true).unwrap();
    assert_eq!(fixture.snapshot().scale, 0);
}

#[test]
fn stop_applies_pre_roll() {
    let fixture = setup_test();
    fixture.clock.stop().unwrap();
    let state = fixture.snapshot().state;
    assert_eq!(state.state, ClockState::Stopped);
    assert_eq!(state.offset, -PRE_ROLL_US);
}

#[test]
fn reset_arms_wait_mask_only_when_stopped() {
    let fixture = setup_test();
    fixture.clock.stop().unwrap();
    fixture.clock.reset(true, true).unwrap();

    let snapshot = fixture.snapshot();
    assert_eq!(snapshot.reference, RefClock::Audio);
    assert_eq!(snapshot.state.state, ClockState::WaitingForStartTime);
    assert_eq!(snapshot.state.wait_mask, WAIT_AUDIO | WAIT_VIDEO);
    assert_eq!(snapshot.state.offset, -PRE_ROLL_US);
    assert_eq!(fixture.clock.reference(), RefClock::Audio);

    // Not stopped any more: the reference follows, the wait mask does not.
    fixture.clock.reset(true, false).unwrap();
    let snapshot = fixture.snapshot();
    assert_eq!(snapshot.reference, RefClock::Video);
    assert_eq!(snapshot.state.wait_mask, WAIT_AUDIO | WAIT_VIDEO);

    fixture.clock.stop().unwrap();
    fixture.clock.reset(true, false).unwrap();
    assert_eq!(fixture.snapshot().state.wait_mask, WAIT_VIDEO);
    assert_eq!(fixture.clock.wait_mask(), WAIT_VIDEO);
}

#[test]
fn media_time_updates_follow_the_reference() {
    let fixture = setup_test();
    fixture.clock.set_reference_clock(true).unwrap();
    fixture.clock.set_media_time(7_000_000).unwrap();
    let snapshot = fixture.snapshot();
    assert_eq!(snapshot.audio_reference, Some(7_000_000));
    assert_eq!(snapshot.video_reference, None);
    assert_eq!(fixture.clock.get_media_time().unwrap(), 7_000_000);

    fixture.clock.set_reference_clock(false).unwrap();
    fixture.clock.set_media_time(8_000_000).unwrap();
    assert_eq!(fixture.snapshot().video_reference, Some(8_000_000));
}

#[test]
fn start_runs_from_the_given_time() {
    let fixture = setup_test();
    fixture.clock.stop().unwrap();
    fixture.clock.reset(true, true).unwrap();
    fixture.clock.state_execute().unwrap();
    assert_eq!(
        fixture.clock.component().state().unwrap(),
        State::Executing
    );

    fixture.clock.start(12_000_000).unwrap();
    let state = fixture.snapshot().state;
    assert_eq!(state.state, ClockState::Running);
    assert_eq!(state.start_time, 12_000_000);
    assert_eq!(fixture.clock.get_media_time().unwrap(), 12_000_000);

    fixture.clock.state_idle().unwrap();
    fixture.clock.deinit().unwrap();
    assert_eq!(fixture.engine.handle_count(), 0);
}

#[test]
fn reset_without_streams_falls_back_to_video() {
    let fixture = setup_test();
    fixture.clock.stop().unwrap();
    fixture.clock.reset(false, false).unwrap();

    assert_eq!(fixture.clock.reference(), RefClock::Video);
    assert_eq!(fixture.clock.wait_mask(), 0);
    let snapshot = fixture.snapshot();
    assert_eq!(snapshot.reference, RefClock::Video);
    assert_eq!(snapshot.state.state, ClockState::WaitingForStartTime);
    assert_eq!(snapshot.state.wait_mask, 0);
}

#[test]
fn state_changes_force_a_resample() {
    let fixture = setup_test();
    fixture.set_engine_time(1_000_000);
    assert_eq!(fixture.clock.get_media_time().unwrap(), 1_000_000);

    fixture.set_engine_time(5_000_000);
    fixture.clock.state_execute().unwrap();
    assert_eq!(fixture.clock.get_media_time().unwrap(), 5_000_000);

    fixture.set_engine_time(6_000_000);
    fixture.clock.state_idle().unwrap();
    assert_eq!(fixture.clock.get_media_time().unwrap(), 6_000_000);
}
