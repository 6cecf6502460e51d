// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! The boundary between the framework and a processing engine.
//!
//! An engine owns the actual decoders, mixers, renderers and clocks. The
//! framework only talks to it through the [`Engine`] trait and only hears
//! back from it through [`ComponentCallbacks`], which every
//! [`crate::Component`] registers when it binds its handle.
//!
//! Unit operations return a raw [`Status`] (mapped with
//! [`crate::Error::from_status`]); operations that produce a value return
//! `Result<T, Status>`. Buffer submissions hand the buffer back inside
//! [`Rejected`] when the engine refuses it, so ownership is never lost.
//!
//! [`loopback::LoopbackEngine`] is a software engine that honors the same
//! contract in-process.

pub mod loopback;

use std::sync::Arc;

pub use ilpipe_sys::Status;

use crate::Buffer;

/// Opaque engine handle for one component instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Component lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Invalid,
    Loaded,
    Idle,
    Executing,
    Pause,
    WaitForResources,
}

impl State {
    pub fn raw(self) -> u32 {
        match self {
            State::Invalid => ilpipe_sys::STATE_INVALID,
            State::Loaded => ilpipe_sys::STATE_LOADED,
            State::Idle => ilpipe_sys::STATE_IDLE,
            State::Executing => ilpipe_sys::STATE_EXECUTING,
            State::Pause => ilpipe_sys::STATE_PAUSE,
            State::WaitForResources => ilpipe_sys::STATE_WAIT_FOR_RESOURCES,
        }
    }

    pub fn from_raw(value: u32) -> Option<Self> {
        match value {
            ilpipe_sys::STATE_INVALID => Some(State::Invalid),
            ilpipe_sys::STATE_LOADED => Some(State::Loaded),
            ilpipe_sys::STATE_IDLE => Some(State::Idle),
            ilpipe_sys::STATE_EXECUTING => Some(State::Executing),
            ilpipe_sys::STATE_PAUSE => Some(State::Pause),
            ilpipe_sys::STATE_WAIT_FOR_RESOURCES => Some(State::WaitForResources),
            _ => None,
        }
    }
}

/// Commands sent to a component with `send_command`.
///
/// Completion is reported by a command-complete event carrying
/// [`Command::code`] in `data1` and [`Command::param`] in `data2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    StateSet(State),
    Flush(u32),
    PortDisable(u32),
    PortEnable(u32),
    MarkBuffer(u32),
}

impl Command {
    pub fn code(&self) -> u32 {
        match self {
            Command::StateSet(_) => ilpipe_sys::COMMAND_STATE_SET,
            Command::Flush(_) => ilpipe_sys::COMMAND_FLUSH,
            Command::PortDisable(_) => ilpipe_sys::COMMAND_PORT_DISABLE,
            Command::PortEnable(_) => ilpipe_sys::COMMAND_PORT_ENABLE,
            Command::MarkBuffer(_) => ilpipe_sys::COMMAND_MARK_BUFFER,
        }
    }

    /// The command argument: a target state or a port index.
    pub fn param(&self) -> u32 {
        match self {
            Command::StateSet(state) => state.raw(),
            Command::Flush(port)
            | Command::PortDisable(port)
            | Command::PortEnable(port)
            | Command::MarkBuffer(port) => *port,
        }
    }
}

/// Kinds of asynchronous notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    CommandComplete,
    Error,
    Mark,
    PortSettingsChanged,
    BufferFlag,
    ParamOrConfigChanged,
    Other(u32),
}

impl EventKind {
    pub fn raw(self) -> u32 {
        match self {
            EventKind::CommandComplete => ilpipe_sys::EVENT_CMD_COMPLETE,
            EventKind::Error => ilpipe_sys::EVENT_ERROR,
            EventKind::Mark => ilpipe_sys::EVENT_MARK,
            EventKind::PortSettingsChanged => ilpipe_sys::EVENT_PORT_SETTINGS_CHANGED,
            EventKind::BufferFlag => ilpipe_sys::EVENT_BUFFER_FLAG,
            EventKind::ParamOrConfigChanged => ilpipe_sys::EVENT_PARAM_OR_CONFIG_CHANGED,
            EventKind::Other(raw) => raw,
        }
    }
}

impl From<u32> for EventKind {
    fn from(value: u32) -> Self {
        match value {
            ilpipe_sys::EVENT_CMD_COMPLETE => EventKind::CommandComplete,
            ilpipe_sys::EVENT_ERROR => EventKind::Error,
            ilpipe_sys::EVENT_MARK => EventKind::Mark,
            ilpipe_sys::EVENT_PORT_SETTINGS_CHANGED => EventKind::PortSettingsChanged,
            ilpipe_sys::EVENT_BUFFER_FLAG => EventKind::BufferFlag,
            ilpipe_sys::EVENT_PARAM_OR_CONFIG_CHANGED => EventKind::ParamOrConfigChanged,
            other => EventKind::Other(other),
        }
    }
}

/// An asynchronous notification from the engine.
///
/// For errors `data1` is the status code; for command completion `data1` is
/// the command code and `data2` its argument; for buffer flags `data1` is the
/// port and `data2` the flags.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub kind: EventKind,
    pub data1: u32,
    pub data2: u32,
    /// Opaque engine-specific payload.
    pub payload: Option<Vec<u8>>,
}

impl Event {
    pub fn new(kind: EventKind, data1: u32, data2: u32) -> Self {
        Self {
            kind,
            data1,
            data2,
            payload: None,
        }
    }

    pub fn command_complete(command: Command) -> Self {
        Self::new(EventKind::CommandComplete, command.code(), command.param())
    }

    pub fn error(status: Status, data2: u32) -> Self {
        Self::new(EventKind::Error, status, data2)
    }

    /// Events with the same key replace each other in the queue.
    pub fn key(&self) -> (EventKind, u32, u32) {
        (self.kind, self.data1, self.data2)
    }
}

/// Port families queried at init to discover port numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PortDomain {
    Audio,
    Video,
    Image,
    Other,
}

impl PortDomain {
    /// Query order used when discovering a component's ports.
    pub const ALL: [PortDomain; 4] = [
        PortDomain::Audio,
        PortDomain::Image,
        PortDomain::Video,
        PortDomain::Other,
    ];

    pub fn raw(self) -> u32 {
        match self {
            PortDomain::Audio => ilpipe_sys::DOMAIN_AUDIO,
            PortDomain::Video => ilpipe_sys::DOMAIN_VIDEO,
            PortDomain::Image => ilpipe_sys::DOMAIN_IMAGE,
            PortDomain::Other => ilpipe_sys::DOMAIN_OTHER,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

/// Buffer requirements and status of one port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortDefinition {
    pub port: u32,
    pub direction: Direction,
    pub domain: PortDomain,
    pub enabled: bool,
    pub populated: bool,
    pub buffer_count_min: u32,
    pub buffer_count_actual: u32,
    pub buffer_size: usize,
    pub buffer_alignment: usize,
}

impl PortDefinition {
    /// A blank definition used as a query for `port`.
    pub fn query(port: u32) -> Self {
        Self {
            port,
            direction: Direction::Input,
            domain: PortDomain::Other,
            enabled: false,
            populated: false,
            buffer_count_min: 0,
            buffer_count_actual: 0,
            buffer_size: 0,
            buffer_alignment: 0,
        }
    }
}

/// Parameters exchanged with `get_parameter` / `set_parameter`.
///
/// `get_parameter` takes the query in-place and fills in the answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Param {
    /// The contiguous range of ports a component exposes in `domain`.
    PortRange {
        domain: PortDomain,
        start_port: u32,
        ports: u32,
    },
    PortDefinition(PortDefinition),
}

impl Param {
    pub fn port_range(domain: PortDomain) -> Self {
        Param::PortRange {
            domain,
            start_port: 0,
            ports: 0,
        }
    }
}

/// Media clock states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ClockState {
    Running,
    WaitingForStartTime,
    #[default]
    Stopped,
}

impl ClockState {
    pub fn raw(self) -> u32 {
        match self {
            ClockState::Running => ilpipe_sys::CLOCK_STATE_RUNNING,
            ClockState::WaitingForStartTime => ilpipe_sys::CLOCK_STATE_WAITING_FOR_START_TIME,
            ClockState::Stopped => ilpipe_sys::CLOCK_STATE_STOPPED,
        }
    }
}

/// Which stream drives the media clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RefClock {
    #[default]
    None,
    Audio,
    Video,
}

impl RefClock {
    pub fn raw(self) -> u32 {
        match self {
            RefClock::None => ilpipe_sys::REF_CLOCK_NONE,
            RefClock::Audio => ilpipe_sys::REF_CLOCK_AUDIO,
            RefClock::Video => ilpipe_sys::REF_CLOCK_VIDEO,
        }
    }
}

/// Clock state configuration: state, start time, offset and wait mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClockStateConfig {
    pub state: ClockState,
    /// Media time at which a running clock starts, in microseconds.
    pub start_time: i64,
    /// Offset applied to the start time, in microseconds.
    pub offset: i64,
    /// Clock ports whose first buffer must arrive before time advances.
    pub wait_mask: u32,
}

/// Run-time configs exchanged with `get_config` / `set_config`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Config {
    ClockState(ClockStateConfig),
    ActiveRefClock(RefClock),
    /// Playback scale in Q16 fixed point (`1 << 16` is normal speed).
    Scale(i32),
    CurrentMediaTime { port: u32, timestamp: i64 },
    CurrentAudioReference { port: u32, timestamp: i64 },
    CurrentVideoReference { port: u32, timestamp: i64 },
    SingleStep { port: u32, steps: u32 },
}

/// A buffer the engine refused, handed back with the reason.
#[derive(Debug)]
pub struct Rejected {
    pub status: Status,
    pub buffer: Buffer,
}

/// Notifications delivered by the engine, usually from its own thread.
///
/// Implementations must not block for long and must never fail back into
/// the engine.
pub trait ComponentCallbacks: Send + Sync {
    fn event_handler(&self, event: Event);

    /// An input buffer has been consumed and is returned to its owner.
    fn empty_buffer_done(&self, buffer: Buffer);

    /// An output buffer has been filled and is returned to its owner.
    fn fill_buffer_done(&self, buffer: Buffer);
}

/// Calls the framework makes into a processing engine.
pub trait Engine: Send + Sync {
    fn init(&self) -> Status;

    fn deinit(&self) -> Status;

    /// Instantiates the component registered under `name`.
    fn get_handle(
        &self,
        name: &str,
        callbacks: Arc<dyn ComponentCallbacks>,
    ) -> Result<Handle, Status>;

    fn free_handle(&self, handle: Handle) -> Status;

    fn send_command(&self, handle: Handle, command: Command) -> Status;

    fn get_state(&self, handle: Handle) -> Result<State, Status>;

    fn get_parameter(&self, handle: Handle, param: &mut Param) -> Status;

    fn set_parameter(&self, handle: Handle, param: &Param) -> Status;

    fn get_config(&self, handle: Handle, config: &mut Config) -> Status;

    fn set_config(&self, handle: Handle, config: &Config) -> Status;

    /// Allocates an engine-owned buffer of `size` bytes on `port`.
    fn allocate_buffer(&self, handle: Handle, port: u32, size: usize) -> Result<Buffer, Status>;

    /// Registers caller-allocated storage with the engine.
    fn use_buffer(&self, handle: Handle, buffer: &Buffer) -> Status;

    fn free_buffer(&self, handle: Handle, port: u32, buffer: Buffer) -> Status;

    fn empty_this_buffer(&self, handle: Handle, buffer: Buffer) -> Result<(), Rejected>;

    fn fill_this_buffer(&self, handle: Handle, buffer: Buffer) -> Result<(), Rejected>;

    /// Connects `output_port` of `output` to the given input, or severs the
    /// connection on `output_port` when `input` is `None`.
    fn setup_tunnel(&self, output: Handle, output_port: u32, input: Option<(Handle, u32)>)
    -> Status;
}
