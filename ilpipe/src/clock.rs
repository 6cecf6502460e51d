// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Media clock controller.
//!
//! [`MediaClock`] drives the engine's `clock` component and exposes the
//! pipeline's notion of "current media time". Reading the time from the
//! engine is comparatively expensive, so [`MediaClock::get_media_time`]
//! samples the engine at most once per [`SAMPLE_WINDOW_US`] and extrapolates
//! in between using the current playback speed.
//!
//! All times are microseconds.

use std::{cell::RefCell, sync::Arc, time::Instant};

use parking_lot::ReentrantMutex;
use tracing::debug;

use crate::{
    Component, EngineContext, Error, Result,
    engine::{ClockState, ClockStateConfig, Config, RefClock, State},
};

/// Speed value meaning normal playback.
pub const NORMAL_SPEED: i32 = 1000;

/// Fastest supported trick-play speed; anything outside `0..=MAX_SPEED` pauses.
pub const MAX_SPEED: i32 = 4 * NORMAL_SPEED;

/// Maximum age of an engine sample before it is refreshed.
pub const SAMPLE_WINDOW_US: i64 = 100_000;

/// Negative start offset applied when stopping or re-arming the clock.
pub const PRE_ROLL_US: i64 = 200_000;

/// Wait-mask bit of the audio stream.
pub const WAIT_AUDIO: u32 = ilpipe_sys::CLOCK_PORT0;

/// Wait-mask bit of the video stream.
pub const WAIT_VIDEO: u32 = ilpipe_sys::CLOCK_PORT1;

/// Converts a speed (1000 = normal) to the engine's Q16 scale.
///
/// Speeds outside the supported envelope map to 0, which pauses.
pub fn speed_to_scale(speed: i32) -> i32 {
    if (0..=MAX_SPEED).contains(&speed) {
        (speed << 16) / NORMAL_SPEED
    } else {
        0
    }
}

/// Source of wall-clock time in microseconds.
pub trait WallClock: Send + Sync {
    fn now_us(&self) -> i64;
}

/// [`WallClock`] backed by [`Instant`].
pub struct MonotonicClock {
    origin: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl WallClock for MonotonicClock {
    fn now_us(&self) -> i64 {
        i64::try_from(self.origin.elapsed().as_micros()).unwrap_or(i64::MAX)
    }
}

#[derive(Debug, Clone, Copy)]
struct Sample {
    media_time: i64,
    wall_time: i64,
}

#[derive(Debug)]
struct ClockInner {
    reference: RefClock,
    wait_mask: u32,
    /// Speed persisted for [`MediaClock::resume`].
    speed: i32,
    /// Speed currently applied to the engine; 0 while paused.
    applied_speed: i32,
    paused: bool,
    sample: Option<Sample>,
}

impl Default for ClockInner {
    fn default() -> Self {
        Self {
            reference: RefClock::None,
            wait_mask: 0,
            speed: NORMAL_SPEED,
            applied_speed: NORMAL_SPEED,
            paused: false,
            sample: None,
        }
    }
}

/// Controller for the engine clock component.
///
/// Public methods may call each other; the state lock is re-entrant.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use ilpipe::{EngineContext, MediaClock, engine::loopback::LoopbackEngine};
///
/// # fn main() -> Result<(), ilpipe::Error> {
/// let context = EngineContext::new(Arc::new(LoopbackEngine::new()))?;
/// let clock = MediaClock::open(&context)?;
/// clock.stop()?;
/// clock.reset(true, true)?;
/// clock.state_execute()?;
/// clock.start(0)?;
/// clock.pause()?;
/// assert!(clock.is_paused());
/// clock.resume()?;
/// clock.deinit()?;
/// # Ok(())
/// # }
/// ```
pub struct MediaClock {
    component: Component,
    wall: Arc<dyn WallClock>,
    state: ReentrantMutex<RefCell<ClockInner>>,
}

impl MediaClock {
    /// Creates and initializes the `clock` component.
    pub fn open(context: &EngineContext) -> Result<Self> {
        Self::open_with_wall_clock(context, Arc::new(MonotonicClock::new()))
    }

    pub fn open_with_wall_clock(context: &EngineContext, wall: Arc<dyn WallClock>) -> Result<Self> {
        let component = Component::new(context, "clock");
        component.init()?;
        Ok(Self {
            component,
            wall,
            state: ReentrantMutex::new(RefCell::new(ClockInner::default())),
        })
    }

    pub fn component(&self) -> &Component {
        &self.component
    }

    /// Port used for clock queries.
    fn port(&self) -> u32 {
        self.component.input_port()
    }

    fn invalidate(&self) {
        self.state.lock().borrow_mut().sample = None;
    }

    /// Current media time.
    ///
    /// Re-samples the engine when the last sample is older than
    /// [`SAMPLE_WINDOW_US`] (or none was taken since the last mutation);
    /// otherwise extrapolates from the sample at the applied speed.
    pub fn get_media_time(&self) -> Result<i64> {
        let guard = self.state.lock();
        let now = self.wall.now_us();
        {
            let inner = guard.borrow();
            if let Some(sample) = inner.sample
                && now - sample.wall_time <= SAMPLE_WINDOW_US
            {
                let speed = if inner.paused {
                    0
                } else {
                    i64::from(inner.applied_speed)
                };
                let elapsed = now - sample.wall_time;
                return Ok(sample.media_time + elapsed * speed / i64::from(NORMAL_SPEED));
            }
        }

        let mut config = Config::CurrentMediaTime {
            port: self.port(),
            timestamp: 0,
        };
        self.component.get_config(&mut config)?;
        let Config::CurrentMediaTime { timestamp, .. } = config else {
            return Err(Error::BadParameter);
        };
        guard.borrow_mut().sample = Some(Sample {
            media_time: timestamp,
            wall_time: now,
        });
        Ok(timestamp)
    }

    /// Pushes `pts` as the reference stream's current time.
    pub fn set_media_time(&self, pts: i64) -> Result<()> {
        let _guard = self.state.lock();
        let reference = self.reference();
        let port = self.port();
        let config = if reference == RefClock::Audio {
            Config::CurrentAudioReference {
                port,
                timestamp: pts,
            }
        } else {
            Config::CurrentVideoReference {
                port,
                timestamp: pts,
            }
        };
        self.component.set_config(&config)?;
        self.invalidate();
        Ok(())
    }

    /// Applies `speed` (1000 = normal) to the engine.
    ///
    /// Speeds outside `0..=MAX_SPEED` pause the clock. With
    /// `pause_resume_only` the speed is applied but not remembered for
    /// [`Self::resume`].
    pub fn set_speed(&self, speed: i32, pause_resume_only: bool) -> Result<()> {
        let guard = self.state.lock();
        let scale = speed_to_scale(speed);
        self.component.set_config(&Config::Scale(scale))?;
        {
            let mut inner = guard.borrow_mut();
            inner.applied_speed = if scale == 0 { 0 } else { speed };
            if !pause_resume_only {
                inner.speed = speed;
            }
            inner.sample = None;
        }
        debug!(speed, scale, pause_resume_only, "Clock speed set");
        Ok(())
    }

    /// Freezes the clock; no-op if already paused.
    pub fn pause(&self) -> Result<()> {
        let guard = self.state.lock();
        if guard.borrow().paused {
            return Ok(());
        }
        self.set_speed(0, true)?;
        guard.borrow_mut().paused = true;
        Ok(())
    }

    /// Restores the last persisted speed; no-op if not paused.
    pub fn resume(&self) -> Result<()> {
        let guard = self.state.lock();
        let speed = {
            let inner = guard.borrow();
            if !inner.paused {
                return Ok(());
            }
            inner.speed
        };
        self.set_speed(speed, true)?;
        guard.borrow_mut().paused = false;
        Ok(())
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().borrow().paused
    }

    /// The persisted speed (1000 = normal).
    pub fn speed(&self) -> i32 {
        self.state.lock().borrow().speed
    }

    pub fn reference(&self) -> RefClock {
        self.state.lock().borrow().reference
    }

    pub fn wait_mask(&self) -> u32 {
        self.state.lock().borrow().wait_mask
    }

    /// Advances a paused clock by `steps` frames.
    pub fn step(&self, steps: u32) -> Result<()> {
        let _guard = self.state.lock();
        self.component.set_config(&Config::SingleStep {
            port: self.port(),
            steps,
        })?;
        self.invalidate();
        Ok(())
    }

    /// Reads the engine's clock state.
    pub fn clock_state(&self) -> Result<ClockStateConfig> {
        let mut config = Config::ClockState(ClockStateConfig::default());
        self.component.get_config(&mut config)?;
        match config {
            Config::ClockState(state) => Ok(state),
            _ => Err(Error::BadParameter),
        }
    }

    fn set_clock_state(&self, state: ClockStateConfig) -> Result<()> {
        self.component.set_config(&Config::ClockState(state))?;
        self.invalidate();
        Ok(())
    }

    /// Halts the clock with a pre-roll so the first buffer after a seek is
    /// not immediately late.
    pub fn stop(&self) -> Result<()> {
        let _guard = self.state.lock();
        self.set_clock_state(ClockStateConfig {
            state: ClockState::Stopped,
            start_time: 0,
            offset: -PRE_ROLL_US,
            wait_mask: 0,
        })?;
        debug!("Clock stopped");
        Ok(())
    }

    /// Starts the clock running from `pts`.
    pub fn start(&self, pts: i64) -> Result<()> {
        let guard = self.state.lock();
        let wait_mask = guard.borrow().wait_mask;
        self.set_clock_state(ClockStateConfig {
            state: ClockState::Running,
            start_time: pts,
            offset: 0,
            wait_mask,
        })?;
        debug!(pts, "Clock started");
        Ok(())
    }

    /// Re-arms the clock after a seek.
    ///
    /// Audio is the reference stream when present, otherwise video. Only a
    /// stopped clock is moved to "waiting for start time", with a wait mask
    /// covering every present stream (empty when there is none).
    pub fn reset(&self, has_video: bool, has_audio: bool) -> Result<()> {
        let guard = self.state.lock();
        let reference = if has_audio {
            RefClock::Audio
        } else {
            RefClock::Video
        };
        self.apply_reference(reference)?;

        if self.clock_state()?.state == ClockState::Stopped {
            let mut wait_mask = 0;
            if has_audio {
                wait_mask |= WAIT_AUDIO;
            }
            if has_video {
                wait_mask |= WAIT_VIDEO;
            }
            self.set_clock_state(ClockStateConfig {
                state: ClockState::WaitingForStartTime,
                start_time: 0,
                offset: -PRE_ROLL_US,
                wait_mask,
            })?;
            guard.borrow_mut().wait_mask = wait_mask;
            debug!(wait_mask, ?reference, "Clock waiting for start time");
        }
        self.invalidate();
        Ok(())
    }

    /// Makes audio (or video, when `prefer_audio` is false) the reference stream.
    pub fn set_reference_clock(&self, prefer_audio: bool) -> Result<()> {
        self.apply_reference(if prefer_audio {
            RefClock::Audio
        } else {
            RefClock::Video
        })
    }

    fn apply_reference(&self, reference: RefClock) -> Result<()> {
        let guard = self.state.lock();
        if guard.borrow().reference == reference {
            return Ok(());
        }
        self.component
            .set_config(&Config::ActiveRefClock(reference))?;
        let mut inner = guard.borrow_mut();
        inner.reference = reference;
        inner.sample = None;
        Ok(())
    }

    /// Moves the clock component to `Executing`.
    pub fn state_execute(&self) -> Result<()> {
        if self.component.state()? == State::Loaded {
            self.component.set_state(State::Idle)?;
        }
        self.component.set_state(State::Executing)?;
        self.invalidate();
        Ok(())
    }

    /// Moves the clock component back to `Idle`.
    pub fn state_idle(&self) -> Result<()> {
        self.component.set_state(State::Idle)?;
        self.invalidate();
        Ok(())
    }

    pub fn deinit(&self) -> Result<()> {
        self.invalidate();
        self.component.deinit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_speed_is_unit_scale() {
        assert_eq!(speed_to_scale(NORMAL_SPEED), 1 << 16);
        assert_eq!(speed_to_scale(2 * NORMAL_SPEED), 2 << 16);
        assert_eq!(speed_to_scale(500), 1 << 15);
    }

    #[test]
    fn speeds_outside_envelope_pause() {
        assert_eq!(speed_to_scale(-NORMAL_SPEED), 0);
        assert_eq!(speed_to_scale(MAX_SPEED + 1), 0);
        assert_eq!(speed_to_scale(MAX_SPEED), 4 << 16);
    }
}
