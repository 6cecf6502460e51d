// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Per-component queue of pending engine notifications.
//!
//! The engine thread posts events; caller threads block until the event that
//! completes their operation shows up. Identical `(kind, data1, data2)` events
//! replace each other so the queue never holds two copies of one notification.

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};
use tracing::error;

use crate::{
    Error, Result,
    engine::{Command, Event, EventKind},
};

struct QueueState {
    events: VecDeque<Event>,
    /// Bumped by teardown; waiters that started under an older generation bail out.
    generation: u64,
    closed: bool,
}

/// Ordered set of pending notifications with blocking, deadline-bounded waits.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use ilpipe::{EventQueue, engine::{Command, Event, State}};
///
/// # fn main() -> Result<(), ilpipe::Error> {
/// let queue = EventQueue::new();
/// queue.post(Event::command_complete(Command::StateSet(State::Idle)));
/// queue.wait_for_command(Command::StateSet(State::Idle), Duration::from_millis(10))?;
/// assert!(queue.is_empty());
/// # Ok(())
/// # }
/// ```
pub struct EventQueue {
    state: Mutex<QueueState>,
    cond: Condvar,
    fatal: Arc<AtomicBool>,
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl EventQueue {
    pub fn new() -> Self {
        Self::with_fatal_flag(Arc::new(AtomicBool::new(false)))
    }

    /// Creates a queue whose waits abort once `fatal` is raised.
    pub(crate) fn with_fatal_flag(fatal: Arc<AtomicBool>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                events: VecDeque::new(),
                generation: 0,
                closed: false,
            }),
            cond: Condvar::new(),
            fatal,
        }
    }

    /// Appends `event`, dropping any queued event with the same key first,
    /// and wakes every waiter.
    pub fn post(&self, event: Event) {
        let mut state = self.state.lock();
        let key = event.key();
        state.events.retain(|queued| queued.key() != key);
        state.events.push_back(event);
        self.cond.notify_all();
    }

    pub fn len(&self) -> usize {
        self.state.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().events.is_empty()
    }

    /// Discards every pending event.
    pub fn clear(&self) {
        self.state.lock().events.clear();
    }

    /// Blocks until an event of `kind` arrives, consuming it.
    ///
    /// Any queued error event matches as well and is returned as its typed
    /// failure, except a same-state error with `data2 == 1`, which counts as
    /// success.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] if nothing matched before `timeout`
    /// - [`Error::Fatal`] if the owning component hit a fatal resource error
    /// - [`Error::Flushing`] if teardown interrupted the wait
    pub fn wait_for(&self, kind: EventKind, timeout: Duration) -> Result<Event> {
        self.wait_matching(timeout, |event| event.kind == kind)
            .inspect_err(|err| {
                if matches!(err, Error::Timeout) && !timeout.is_zero() {
                    error!(?kind, "Timed out waiting for event after {:?}", timeout);
                }
            })
    }

    /// Blocks until `command` has completed, consuming the completion event.
    ///
    /// Error handling is the same as for [`Self::wait_for`].
    pub fn wait_for_command(&self, command: Command, timeout: Duration) -> Result<()> {
        let (code, param) = (command.code(), command.param());
        self.wait_matching(timeout, |event| {
            event.kind == EventKind::CommandComplete && event.data1 == code && event.data2 == param
        })
        .map(|_| ())
        .inspect_err(|err| {
            if matches!(err, Error::Timeout) && !timeout.is_zero() {
                error!(
                    command = code,
                    param, "Timed out waiting for command completion after {:?}", timeout
                );
            }
        })
    }

    fn wait_matching(&self, timeout: Duration, matches: impl Fn(&Event) -> bool) -> Result<Event> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        let generation = state.generation;
        let mut timed_out = false;
        loop {
            let position = state
                .events
                .iter()
                .position(|event| event.kind == EventKind::Error || matches(event));
            if let Some(event) = position.and_then(|position| state.events.remove(position)) {
                if event.kind != EventKind::Error {
                    return Ok(event);
                }
                if event.data1 == ilpipe_sys::ERR_SAME_STATE && event.data2 == 1 {
                    return Ok(event);
                }
                return Err(Error::from_code(event.data1));
            }
            if self.fatal.load(Ordering::Acquire) {
                return Err(Error::Fatal);
            }
            if state.closed || state.generation != generation {
                return Err(Error::Flushing);
            }
            if timed_out {
                return Err(Error::Timeout);
            }
            timed_out = self.cond.wait_until(&mut state, deadline).timed_out();
        }
    }

    /// Makes every in-flight wait return [`Error::Flushing`].
    ///
    /// Waits started after this call are unaffected.
    pub(crate) fn interrupt(&self) {
        let mut state = self.state.lock();
        state.generation = state.generation.wrapping_add(1);
        self.cond.notify_all();
    }

    /// Rejects every current and future wait until [`Self::reopen`].
    pub(crate) fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.events.clear();
        self.cond.notify_all();
    }

    pub(crate) fn reopen(&self) {
        let mut state = self.state.lock();
        state.closed = false;
        state.events.clear();
    }

    /// Wakes all waiters so they re-check the fatal flag.
    pub(crate) fn wake(&self) {
        let _state = self.state.lock();
        self.cond.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use tracing_test::traced_test;

    use super::*;
    use crate::engine::State;

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn duplicate_events_are_coalesced() {
        let queue = EventQueue::new();
        queue.post(Event::new(EventKind::PortSettingsChanged, 131, 0));
        queue.post(Event::new(EventKind::PortSettingsChanged, 131, 0));
        assert_eq!(queue.len(), 1);
        queue.post(Event::new(EventKind::PortSettingsChanged, 130, 0));
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn latest_duplicate_wins() {
        let queue = EventQueue::new();
        let mut first = Event::new(EventKind::BufferFlag, 90, 1);
        first.payload = Some(vec![1]);
        let mut second = first.clone();
        second.payload = Some(vec![2]);
        queue.post(first);
        queue.post(second);
        let event = queue.wait_for(EventKind::BufferFlag, SHORT).unwrap();
        assert_eq!(event.payload, Some(vec![2]));
    }

    #[test]
    fn same_state_error_with_flag_is_success() {
        let queue = EventQueue::new();
        queue.post(Event::error(ilpipe_sys::ERR_SAME_STATE, 1));
        assert!(
            queue
                .wait_for_command(Command::StateSet(State::Idle), SHORT)
                .is_ok()
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn error_event_short_circuits_wait() {
        let queue = EventQueue::new();
        queue.post(Event::new(EventKind::PortSettingsChanged, 131, 0));
        queue.post(Event::error(ilpipe_sys::ERR_PORT_UNPOPULATED, 0));
        let result = queue.wait_for_command(Command::PortEnable(130), SHORT);
        assert!(matches!(result, Err(Error::PortUnpopulated)));
        // Unrelated events stay queued.
        assert_eq!(queue.len(), 1);
    }

    #[traced_test]
    #[test]
    fn timeout_is_reported_and_logged() {
        let queue = EventQueue::new();
        let result = queue.wait_for_command(Command::Flush(130), SHORT);
        assert!(matches!(result, Err(Error::Timeout)));
        assert!(logs_contain("Timed out waiting for command completion"));
    }

    #[test]
    fn zero_timeout_polls_once() {
        let queue = EventQueue::new();
        assert!(matches!(
            queue.wait_for(EventKind::Mark, Duration::ZERO),
            Err(Error::Timeout)
        ));
        queue.post(Event::new(EventKind::Mark, 0, 0));
        assert!(queue.wait_for(EventKind::Mark, Duration::ZERO).is_ok());
    }

    #[test]
    fn waiter_wakes_when_event_arrives() {
        let queue = Arc::new(EventQueue::new());
        let poster = {
            let queue = queue.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(30));
                queue.post(Event::command_complete(Command::PortDisable(131)));
            })
        };
        queue
            .wait_for_command(Command::PortDisable(131), Duration::from_secs(5))
            .unwrap();
        poster.join().unwrap();
    }

    #[test]
    fn fatal_flag_aborts_wait() {
        let fatal = Arc::new(AtomicBool::new(false));
        let queue = Arc::new(EventQueue::with_fatal_flag(fatal.clone()));
        let waiter = {
            let queue = queue.clone();
            thread::spawn(move || queue.wait_for(EventKind::PortSettingsChanged, Duration::from_secs(10)))
        };
        thread::sleep(Duration::from_millis(30));
        fatal.store(true, Ordering::Release);
        queue.wake();
        assert!(matches!(waiter.join().unwrap(), Err(Error::Fatal)));
    }

    #[test]
    fn interrupt_releases_current_waiters_only() {
        let queue = Arc::new(EventQueue::new());
        let waiter = {
            let queue = queue.clone();
            thread::spawn(move || queue.wait_for(EventKind::Mark, Duration::from_secs(10)))
        };
        thread::sleep(Duration::from_millis(30));
        queue.interrupt();
        assert!(matches!(waiter.join().unwrap(), Err(Error::Flushing)));
        assert!(matches!(
            queue.wait_for(EventKind::Mark, SHORT),
            Err(Error::Timeout)
        ));
    }
}
