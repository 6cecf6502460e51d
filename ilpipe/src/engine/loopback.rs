// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! In-process software engine.
//!
//! [`LoopbackEngine`] honors the [`Engine`] contract without any hardware:
//! it runs the component state machine, port enable/disable/flush, tunnels,
//! the media clock configs and a pass-through "decoder" that copies input
//! payloads to the output. Every callback is delivered from a dedicated
//! engine thread, exactly like a hardware engine would.
//!
//! A handful of hooks (`commands`, `raise_error`, `set_hold_buffers`,
//! `fail_allocations_after`, `set_media_time`, `clock_snapshot`, `sync`)
//! let tests steer and observe the engine.

use std::{
    collections::{BTreeMap, HashMap, VecDeque},
    sync::Arc,
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::{
    ClockStateConfig, Command, ComponentCallbacks, Config, Direction, Engine, Event, EventKind,
    Handle, Param, PortDefinition, PortDomain, RefClock, Rejected, State, Status,
};
use crate::{Buffer, BufferFlags};

const BUFFER_COUNT_MIN: u32 = 2;
const BUFFER_COUNT_DEFAULT: u32 = 4;
const BUFFER_ALIGNMENT: usize = 16;
const SYNC_TIMEOUT: Duration = Duration::from_secs(5);

/// Port layout of one engine role.
struct RoleInfo {
    name: &'static str,
    domain: PortDomain,
    start_port: u32,
    ports: u32,
    /// Offsets (from `start_port`) of the input ports; all others are outputs.
    inputs: &'static [u32],
    buffer_size: usize,
}

const ROLES: &[RoleInfo] = &[
    RoleInfo {
        name: "clock",
        domain: PortDomain::Other,
        start_port: 80,
        ports: 6,
        inputs: &[],
        buffer_size: 256,
    },
    RoleInfo {
        name: "audio_decode",
        domain: PortDomain::Audio,
        start_port: 120,
        ports: 2,
        inputs: &[0],
        buffer_size: 16 * 1024,
    },
    RoleInfo {
        name: "audio_render",
        domain: PortDomain::Audio,
        start_port: 100,
        ports: 2,
        inputs: &[0],
        buffer_size: 16 * 1024,
    },
    RoleInfo {
        name: "audio_mixer",
        domain: PortDomain::Audio,
        start_port: 230,
        ports: 2,
        inputs: &[1],
        buffer_size: 16 * 1024,
    },
    RoleInfo {
        name: "video_decode",
        domain: PortDomain::Video,
        start_port: 130,
        ports: 2,
        inputs: &[0],
        buffer_size: 64 * 1024,
    },
    RoleInfo {
        name: "video_render",
        domain: PortDomain::Video,
        start_port: 90,
        ports: 2,
        inputs: &[0],
        buffer_size: 64 * 1024,
    },
    RoleInfo {
        name: "video_scheduler",
        domain: PortDomain::Video,
        start_port: 10,
        ports: 2,
        inputs: &[0],
        buffer_size: 64 * 1024,
    },
    RoleInfo {
        name: "video_splitter",
        domain: PortDomain::Video,
        start_port: 250,
        ports: 2,
        inputs: &[0],
        buffer_size: 64 * 1024,
    },
    RoleInfo {
        name: "null_sink",
        domain: PortDomain::Video,
        start_port: 240,
        ports: 2,
        inputs: &[0],
        buffer_size: 64 * 1024,
    },
];

/// Observable state of a clock component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSnapshot {
    pub state: ClockStateConfig,
    pub reference: RefClock,
    /// Q16 playback scale.
    pub scale: i32,
    /// Current media time in microseconds.
    pub media_time: i64,
    /// Total number of single steps requested.
    pub steps: u32,
    pub audio_reference: Option<i64>,
    pub video_reference: Option<i64>,
}

impl Default for ClockSnapshot {
    fn default() -> Self {
        Self {
            state: ClockStateConfig::default(),
            reference: RefClock::None,
            scale: 1 << 16,
            media_time: 0,
            steps: 0,
            audio_reference: None,
            video_reference: None,
        }
    }
}

/// Payload travelling through the pass-through pipeline.
struct Packet {
    data: Vec<u8>,
    timestamp: i64,
    flags: BufferFlags,
}

impl Packet {
    fn from_buffer(buffer: &Buffer) -> Self {
        Self {
            data: buffer.payload().to_vec(),
            timestamp: buffer.timestamp(),
            flags: buffer.flags(),
        }
    }
}

enum Job {
    Event(Arc<dyn ComponentCallbacks>, Event),
    EmptyDone(Arc<dyn ComponentCallbacks>, Buffer),
    FillDone(Arc<dyn ComponentCallbacks>, Buffer),
    Barrier(Sender<()>),
    Shutdown,
}

struct SimPort {
    definition: PortDefinition,
    /// Enable or disable command waiting for its completion condition.
    pending: Option<Command>,
    registered: u32,
    held: VecDeque<Buffer>,
    tunnel: Option<(Handle, u32)>,
}

impl SimPort {
    fn populated(&self) -> bool {
        self.registered >= self.definition.buffer_count_actual
    }

    fn ready(&self) -> bool {
        self.populated() || self.tunnel.is_some()
    }
}

struct Sim {
    role: &'static RoleInfo,
    callbacks: Arc<dyn ComponentCallbacks>,
    state: State,
    pending_state: Option<State>,
    ports: BTreeMap<u32, SimPort>,
    backlog: VecDeque<Packet>,
    commands: Vec<Command>,
    clock: ClockSnapshot,
}

impl Sim {
    fn new(role: &'static RoleInfo, callbacks: Arc<dyn ComponentCallbacks>) -> Self {
        let ports = (0..role.ports)
            .map(|offset| {
                let port = role.start_port + offset;
                let direction = if role.inputs.contains(&offset) {
                    Direction::Input
                } else {
                    Direction::Output
                };
                let definition = PortDefinition {
                    port,
                    direction,
                    domain: role.domain,
                    enabled: true,
                    populated: false,
                    buffer_count_min: BUFFER_COUNT_MIN,
                    buffer_count_actual: BUFFER_COUNT_DEFAULT,
                    buffer_size: role.buffer_size,
                    buffer_alignment: BUFFER_ALIGNMENT,
                };
                let sim_port = SimPort {
                    definition,
                    pending: None,
                    registered: 0,
                    held: VecDeque::new(),
                    tunnel: None,
                };
                (port, sim_port)
            })
            .collect();
        Self {
            role,
            callbacks,
            state: State::Loaded,
            pending_state: None,
            ports,
            backlog: VecDeque::new(),
            commands: Vec::new(),
            clock: ClockSnapshot::default(),
        }
    }

    fn event(&self, jobs: &mut Vec<Job>, event: Event) {
        jobs.push(Job::Event(self.callbacks.clone(), event));
    }

    fn complete(&self, jobs: &mut Vec<Job>, command: Command) {
        self.event(jobs, Event::command_complete(command));
    }

    fn first_port(&self, direction: Direction) -> Option<u32> {
        self.ports
            .values()
            .find(|port| port.definition.direction == direction)
            .map(|port| port.definition.port)
    }

    fn targets(&self, port: u32) -> Vec<u32> {
        if port == ilpipe_sys::ALL_PORTS {
            self.ports.keys().copied().collect()
        } else {
            vec![port]
        }
    }

    fn return_held(&mut self, port: u32, jobs: &mut Vec<Job>) {
        let Some(sim_port) = self.ports.get_mut(&port) else {
            return;
        };
        let input = sim_port.definition.direction == Direction::Input;
        for buffer in sim_port.held.drain(..) {
            jobs.push(if input {
                Job::EmptyDone(self.callbacks.clone(), buffer)
            } else {
                Job::FillDone(self.callbacks.clone(), buffer)
            });
        }
    }

    fn return_all_held(&mut self, jobs: &mut Vec<Job>) {
        let ports: Vec<u32> = self.ports.keys().copied().collect();
        for port in ports {
            self.return_held(port, jobs);
        }
        self.backlog.clear();
    }

    /// Completes pending port commands and state transitions whose
    /// conditions now hold.
    fn settle(&mut self, jobs: &mut Vec<Job>) {
        let loaded = self.state == State::Loaded;
        let mut completed = Vec::new();
        for port in self.ports.values_mut() {
            match port.pending {
                Some(command @ Command::PortEnable(_)) if loaded || port.ready() => {
                    port.pending = None;
                    completed.push(command);
                }
                Some(command @ Command::PortDisable(_)) if port.registered == 0 => {
                    port.pending = None;
                    completed.push(command);
                }
                _ => {}
            }
        }

        match self.pending_state {
            Some(State::Idle)
                if self
                    .ports
                    .values()
                    .all(|port| !port.definition.enabled || port.ready()) =>
            {
                self.pending_state = None;
                self.state = State::Idle;
                completed.push(Command::StateSet(State::Idle));
            }
            Some(State::Loaded) if self.ports.values().all(|port| port.registered == 0) => {
                self.pending_state = None;
                self.state = State::Loaded;
                completed.push(Command::StateSet(State::Loaded));
            }
            _ => {}
        }

        for command in completed {
            self.complete(jobs, command);
        }
    }

    fn accepts_buffers(&self) -> bool {
        matches!(self.state, State::Idle | State::Executing | State::Pause)
    }

    fn get_config(&self, config: &mut Config) -> Status {
        match config {
            Config::ClockState(state) => *state = self.clock.state,
            Config::ActiveRefClock(reference) => *reference = self.clock.reference,
            Config::Scale(scale) => *scale = self.clock.scale,
            Config::CurrentMediaTime { timestamp, .. } => *timestamp = self.clock.media_time,
            Config::CurrentAudioReference { timestamp, .. } => {
                *timestamp = self.clock.audio_reference.unwrap_or_default()
            }
            Config::CurrentVideoReference { timestamp, .. } => {
                *timestamp = self.clock.video_reference.unwrap_or_default()
            }
            Config::SingleStep { .. } => return ilpipe_sys::ERR_UNSUPPORTED_INDEX,
        }
        ilpipe_sys::STATUS_OK
    }

    fn set_config(&mut self, config: &Config) -> Status {
        let clock = &mut self.clock;
        match *config {
            Config::ClockState(state) => {
                if state.state == super::ClockState::Running {
                    clock.media_time = state.start_time;
                }
                clock.state = state;
            }
            Config::ActiveRefClock(reference) => clock.reference = reference,
            Config::Scale(scale) => clock.scale = scale,
            Config::CurrentAudioReference { timestamp, .. } => {
                clock.audio_reference = Some(timestamp);
                if clock.reference == RefClock::Audio {
                    clock.media_time = timestamp;
                }
            }
            Config::CurrentVideoReference { timestamp, .. } => {
                clock.video_reference = Some(timestamp);
                if clock.reference == RefClock::Video {
                    clock.media_time = timestamp;
                }
            }
            Config::SingleStep { steps, .. } => clock.steps += steps,
            Config::CurrentMediaTime { .. } => return ilpipe_sys::ERR_UNSUPPORTED_SETTING,
        }
        ilpipe_sys::STATUS_OK
    }
}

#[derive(Default)]
struct Registry {
    sims: HashMap<Handle, Sim>,
    next_handle: u64,
    initialized: u32,
    hold_buffers: bool,
    allocations_left: Option<usize>,
}

impl Registry {
    fn sim(&mut self, handle: Handle) -> Result<&mut Sim, Status> {
        self.sims
            .get_mut(&handle)
            .ok_or(ilpipe_sys::ERR_BAD_PARAMETER)
    }

    fn take_allocation(&mut self) -> Result<(), Status> {
        match &mut self.allocations_left {
            Some(0) => Err(ilpipe_sys::ERR_INSUFFICIENT_RESOURCES),
            Some(left) => {
                *left -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn send_command(&mut self, handle: Handle, command: Command, jobs: &mut Vec<Job>) -> Status {
        let sim = match self.sim(handle) {
            Ok(sim) => sim,
            Err(status) => return status,
        };
        if let Command::Flush(port) | Command::PortEnable(port) | Command::PortDisable(port) =
            command
            && port != ilpipe_sys::ALL_PORTS
            && !sim.ports.contains_key(&port)
        {
            return ilpipe_sys::ERR_BAD_PORT_INDEX;
        }
        sim.commands.push(command);

        match command {
            Command::StateSet(target) => self.set_state(handle, target, jobs),
            Command::Flush(port) => {
                for port in sim.targets(port) {
                    sim.return_held(port, jobs);
                    if Some(port) == sim.first_port(Direction::Output) {
                        sim.backlog.clear();
                    }
                    sim.complete(jobs, Command::Flush(port));
                }
            }
            Command::PortEnable(port) => {
                for port in sim.targets(port) {
                    if let Some(sim_port) = sim.ports.get_mut(&port) {
                        sim_port.definition.enabled = true;
                        sim_port.pending = Some(Command::PortEnable(port));
                    }
                }
                sim.settle(jobs);
            }
            Command::PortDisable(port) => {
                for port in sim.targets(port) {
                    sim.return_held(port, jobs);
                    if let Some(sim_port) = sim.ports.get_mut(&port) {
                        sim_port.definition.enabled = false;
                        sim_port.pending = Some(Command::PortDisable(port));
                    }
                }
                sim.settle(jobs);
            }
            Command::MarkBuffer(_) => sim.complete(jobs, command),
        }
        ilpipe_sys::STATUS_OK
    }

    fn set_state(&mut self, handle: Handle, target: State, jobs: &mut Vec<Job>) {
        let hold = self.hold_buffers;
        let Some(sim) = self.sims.get_mut(&handle) else {
            return;
        };
        let from = sim.state;
        if from == target {
            sim.event(jobs, Event::error(ilpipe_sys::ERR_SAME_STATE, 1));
            return;
        }
        let legal = sim.pending_state.is_none()
            && matches!(
                (from, target),
                (State::Loaded, State::Idle)
                    | (State::Idle, State::Loaded)
                    | (State::Idle, State::Executing)
                    | (State::Executing, State::Idle)
                    | (State::Idle, State::Pause)
                    | (State::Pause, State::Idle)
                    | (State::Executing, State::Pause)
                    | (State::Pause, State::Executing)
                    | (State::Loaded, State::WaitForResources)
                    | (State::WaitForResources, State::Loaded)
                    | (_, State::Invalid)
            );
        if !legal {
            debug!(role = sim.role.name, ?from, ?target, "Rejecting state transition");
            sim.event(
                jobs,
                Event::error(ilpipe_sys::ERR_INCORRECT_STATE_TRANSITION, 0),
            );
            return;
        }

        match (from, target) {
            (State::Loaded, State::Idle) | (State::Idle, State::Loaded) => {
                sim.pending_state = Some(target);
                sim.settle(jobs);
            }
            (State::Executing | State::Pause, State::Idle) => {
                sim.return_all_held(jobs);
                sim.state = State::Idle;
                sim.complete(jobs, Command::StateSet(target));
            }
            (_, State::Executing) => {
                sim.state = State::Executing;
                sim.complete(jobs, Command::StateSet(target));
                if !hold {
                    if let Some(input) = sim.first_port(Direction::Input)
                        && let Some(port) = sim.ports.get_mut(&input)
                    {
                        let held: Vec<Buffer> = port.held.drain(..).collect();
                        for buffer in held {
                            sim.backlog.push_back(Packet::from_buffer(&buffer));
                            jobs.push(Job::EmptyDone(sim.callbacks.clone(), buffer));
                        }
                    }
                    self.pump(handle, jobs);
                }
            }
            _ => {
                sim.state = target;
                sim.complete(jobs, Command::StateSet(target));
            }
        }
    }

    /// Moves queued packets through `start` and any components tunneled
    /// downstream of it.
    fn pump(&mut self, start: Handle, jobs: &mut Vec<Job>) {
        let mut work = vec![start];
        while let Some(handle) = work.pop() {
            let mut forwards = Vec::new();
            {
                let Some(sim) = self.sims.get_mut(&handle) else {
                    continue;
                };
                if sim.state != State::Executing {
                    continue;
                }
                let Some(output) = sim.first_port(Direction::Output) else {
                    sim.backlog.clear();
                    continue;
                };
                let Sim {
                    ports,
                    backlog,
                    callbacks,
                    ..
                } = sim;
                let Some(port) = ports.get_mut(&output) else {
                    continue;
                };

                while !backlog.is_empty() {
                    if let Some(peer) = port.tunnel {
                        if let Some(packet) = backlog.pop_front() {
                            forwards.push((peer, packet));
                        }
                        continue;
                    }
                    let packet = if port.registered > 0 {
                        let Some(mut buffer) = port.held.pop_front() else {
                            break;
                        };
                        let Some(packet) = backlog.pop_front() else {
                            port.held.push_front(buffer);
                            break;
                        };
                        buffer.fill(&packet.data);
                        buffer.set_timestamp(packet.timestamp);
                        buffer.set_flags(packet.flags);
                        jobs.push(Job::FillDone(callbacks.clone(), buffer));
                        packet
                    } else {
                        match backlog.pop_front() {
                            Some(packet) => packet,
                            None => break,
                        }
                    };
                    if packet.flags.contains(BufferFlags::END_OF_STREAM) {
                        jobs.push(Job::Event(
                            callbacks.clone(),
                            Event::new(EventKind::BufferFlag, output, packet.flags.bits()),
                        ));
                    }
                }
            }

            for ((peer, _), packet) in forwards {
                match self.sims.get_mut(&peer) {
                    Some(sim) => {
                        sim.backlog.push_back(packet);
                        if !work.contains(&peer) {
                            work.push(peer);
                        }
                    }
                    None => trace!(peer = peer.raw(), "Dropping packet for released component"),
                }
            }
        }
    }
}

/// Software engine that runs every component in-process.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use ilpipe::{Component, EngineContext, engine::{Command, State, loopback::LoopbackEngine}};
///
/// # fn main() -> Result<(), ilpipe::Error> {
/// let engine = Arc::new(LoopbackEngine::new());
/// let context = EngineContext::new(engine.clone())?;
/// let render = Component::new(&context, "video_render");
/// render.init()?;
/// render.set_state(State::Idle)?;
///
/// let handle = render.handle().unwrap();
/// assert!(engine.commands(handle).contains(&Command::StateSet(State::Idle)));
/// # Ok(())
/// # }
/// ```
pub struct LoopbackEngine {
    registry: Mutex<Registry>,
    sender: Sender<Job>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackEngine {
    /// Creates the engine and starts its callback thread.
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let worker = thread::Builder::new()
            .name("loopback-engine".to_string())
            .spawn(move || run_callbacks(receiver))
            .inspect_err(|err| warn!("Failed to spawn engine thread: {}", err))
            .ok();
        Self {
            registry: Mutex::new(Registry::default()),
            sender,
            worker: Mutex::new(worker),
        }
    }

    fn with_registry<R>(&self, f: impl FnOnce(&mut Registry, &mut Vec<Job>) -> R) -> R {
        let mut jobs = Vec::new();
        let result = {
            let mut registry = self.registry.lock();
            f(&mut *registry, &mut jobs)
        };
        for job in jobs {
            if self.sender.send(job).is_err() {
                warn!("Engine thread is gone; dropping callback");
            }
        }
        result
    }

    /// Every command sent to `handle`, in order.
    pub fn commands(&self, handle: Handle) -> Vec<Command> {
        self.registry
            .lock()
            .sims
            .get(&handle)
            .map(|sim| sim.commands.clone())
            .unwrap_or_default()
    }

    /// Posts an error event carrying `status` to `handle`.
    pub fn raise_error(&self, handle: Handle, status: Status) {
        self.post_event(handle, Event::error(status, 0));
    }

    /// Posts an arbitrary event to `handle` from the engine thread.
    pub fn post_event(&self, handle: Handle, event: Event) {
        self.with_registry(|registry, jobs| {
            if let Some(sim) = registry.sims.get(&handle) {
                sim.event(jobs, event);
            }
        });
    }

    /// While set, submitted input buffers stay with the engine until they
    /// are flushed, their port is disabled or the component leaves
    /// `Executing`.
    pub fn set_hold_buffers(&self, hold: bool) {
        self.registry.lock().hold_buffers = hold;
    }

    /// Lets the next `count` buffer allocations succeed and fails the rest
    /// with insufficient resources. `None` removes the limit.
    pub fn fail_allocations_after(&self, count: Option<usize>) {
        self.registry.lock().allocations_left = count;
    }

    /// Overrides the buffer count a port advertises, bypassing the minimum
    /// enforced by `set_parameter`.
    pub fn set_buffer_count(&self, handle: Handle, port: u32, count: u32) {
        if let Some(sim_port) = self
            .registry
            .lock()
            .sims
            .get_mut(&handle)
            .and_then(|sim| sim.ports.get_mut(&port))
        {
            sim_port.definition.buffer_count_actual = count;
        }
    }

    /// Overrides the media time reported by a clock component.
    pub fn set_media_time(&self, handle: Handle, media_time: i64) {
        if let Some(sim) = self.registry.lock().sims.get_mut(&handle) {
            sim.clock.media_time = media_time;
        }
    }

    pub fn clock_snapshot(&self, handle: Handle) -> Option<ClockSnapshot> {
        self.registry.lock().sims.get(&handle).map(|sim| sim.clock)
    }

    /// Number of live component handles.
    pub fn handle_count(&self) -> usize {
        self.registry.lock().sims.len()
    }

    /// Blocks until every callback queued so far has been delivered.
    pub fn sync(&self) -> bool {
        let (sender, receiver) = crossbeam_channel::bounded(1);
        if self.sender.send(Job::Barrier(sender)).is_err() {
            return false;
        }
        receiver.recv_timeout(SYNC_TIMEOUT).is_ok()
    }
}

fn run_callbacks(receiver: Receiver<Job>) {
    for job in receiver.iter() {
        match job {
            Job::Event(callbacks, event) => callbacks.event_handler(event),
            Job::EmptyDone(callbacks, buffer) => callbacks.empty_buffer_done(buffer),
            Job::FillDone(callbacks, buffer) => callbacks.fill_buffer_done(buffer),
            Job::Barrier(done) => {
                let _ = done.send(());
            }
            Job::Shutdown => break,
        }
    }
    trace!("Engine thread stopped");
}

impl Drop for LoopbackEngine {
    fn drop(&mut self) {
        let _ = self.sender.send(Job::Shutdown);
        if let Some(worker) = self.worker.lock().take()
            && worker.thread().id() != thread::current().id()
            && worker.join().is_err()
        {
            tracing::error!("Engine thread panicked");
        }
    }
}

impl Engine for LoopbackEngine {
    fn init(&self) -> Status {
        self.registry.lock().initialized += 1;
        ilpipe_sys::STATUS_OK
    }

    fn deinit(&self) -> Status {
        let mut registry = self.registry.lock();
        if registry.initialized == 0 {
            return ilpipe_sys::ERR_INVALID_STATE;
        }
        registry.initialized -= 1;
        if registry.initialized == 0 && !registry.sims.is_empty() {
            warn!(
                handles = registry.sims.len(),
                "Engine de-initialized with live components"
            );
        }
        ilpipe_sys::STATUS_OK
    }

    fn get_handle(
        &self,
        name: &str,
        callbacks: Arc<dyn ComponentCallbacks>,
    ) -> Result<Handle, Status> {
        let role = ROLES
            .iter()
            .find(|role| role.name == name)
            .ok_or(ilpipe_sys::ERR_COMPONENT_NOT_FOUND)?;
        let mut registry = self.registry.lock();
        if registry.initialized == 0 {
            return Err(ilpipe_sys::ERR_NOT_READY);
        }
        registry.next_handle += 1;
        let handle = Handle::new(registry.next_handle);
        registry.sims.insert(handle, Sim::new(role, callbacks));
        debug!(role = name, handle = handle.raw(), "Created component");
        Ok(handle)
    }

    fn free_handle(&self, handle: Handle) -> Status {
        match self.registry.lock().sims.remove(&handle) {
            Some(sim) => {
                if sim.state != State::Loaded {
                    warn!(role = sim.role.name, state = ?sim.state, "Releasing component outside Loaded");
                }
                ilpipe_sys::STATUS_OK
            }
            None => ilpipe_sys::ERR_BAD_PARAMETER,
        }
    }

    fn send_command(&self, handle: Handle, command: Command) -> Status {
        self.with_registry(|registry, jobs| registry.send_command(handle, command, jobs))
    }

    fn get_state(&self, handle: Handle) -> Result<State, Status> {
        self.registry.lock().sim(handle).map(|sim| sim.state)
    }

    fn get_parameter(&self, handle: Handle, param: &mut Param) -> Status {
        let mut registry = self.registry.lock();
        let sim = match registry.sim(handle) {
            Ok(sim) => sim,
            Err(status) => return status,
        };
        match param {
            Param::PortRange {
                domain,
                start_port,
                ports,
            } => {
                if *domain == sim.role.domain {
                    *start_port = sim.role.start_port;
                    *ports = sim.role.ports;
                } else {
                    *start_port = 0;
                    *ports = 0;
                }
            }
            Param::PortDefinition(definition) => match sim.ports.get(&definition.port) {
                Some(port) => {
                    *definition = port.definition.clone();
                    definition.populated = port.populated();
                }
                None => return ilpipe_sys::ERR_BAD_PORT_INDEX,
            },
        }
        ilpipe_sys::STATUS_OK
    }

    fn set_parameter(&self, handle: Handle, param: &Param) -> Status {
        let mut registry = self.registry.lock();
        let sim = match registry.sim(handle) {
            Ok(sim) => sim,
            Err(status) => return status,
        };
        let loaded = sim.state == State::Loaded;
        match param {
            Param::PortRange { .. } => ilpipe_sys::ERR_UNSUPPORTED_SETTING,
            Param::PortDefinition(definition) => {
                let Some(port) = sim.ports.get_mut(&definition.port) else {
                    return ilpipe_sys::ERR_BAD_PORT_INDEX;
                };
                if port.definition.enabled && !loaded {
                    return ilpipe_sys::ERR_INCORRECT_STATE_OPERATION;
                }
                if definition.buffer_count_actual < port.definition.buffer_count_min
                    || definition.buffer_size == 0
                {
                    return ilpipe_sys::ERR_BAD_PARAMETER;
                }
                port.definition.buffer_count_actual = definition.buffer_count_actual;
                port.definition.buffer_size = definition.buffer_size;
                ilpipe_sys::STATUS_OK
            }
        }
    }

    fn get_config(&self, handle: Handle, config: &mut Config) -> Status {
        let mut registry = self.registry.lock();
        match registry.sim(handle) {
            Ok(sim) if sim.role.name == "clock" => sim.get_config(config),
            Ok(_) => ilpipe_sys::ERR_UNSUPPORTED_INDEX,
            Err(status) => status,
        }
    }

    fn set_config(&self, handle: Handle, config: &Config) -> Status {
        let mut registry = self.registry.lock();
        match registry.sim(handle) {
            Ok(sim) if sim.role.name == "clock" => sim.set_config(config),
            Ok(_) => ilpipe_sys::ERR_UNSUPPORTED_INDEX,
            Err(status) => status,
        }
    }

    fn allocate_buffer(&self, handle: Handle, port: u32, size: usize) -> Result<Buffer, Status> {
        self.with_registry(|registry, jobs| {
            let sim = registry.sim(handle)?;
            let loaded = sim.state == State::Loaded;
            let sim_port = sim
                .ports
                .get(&port)
                .ok_or(ilpipe_sys::ERR_BAD_PORT_INDEX)?;
            if !sim_port.definition.enabled && !loaded {
                return Err(ilpipe_sys::ERR_INCORRECT_STATE_OPERATION);
            }
            if size == 0 {
                return Err(ilpipe_sys::ERR_BAD_PARAMETER);
            }
            let alignment = sim_port.definition.buffer_alignment;
            registry.take_allocation()?;

            let sim = registry.sim(handle)?;
            if let Some(sim_port) = sim.ports.get_mut(&port) {
                sim_port.registered += 1;
            }
            sim.settle(jobs);
            Ok(Buffer::aligned(port, size, alignment))
        })
    }

    fn use_buffer(&self, handle: Handle, buffer: &Buffer) -> Status {
        let result = self.with_registry(|registry, jobs| {
            let sim = registry.sim(handle)?;
            let loaded = sim.state == State::Loaded;
            let sim_port = sim
                .ports
                .get(&buffer.port())
                .ok_or(ilpipe_sys::ERR_BAD_PORT_INDEX)?;
            if !sim_port.definition.enabled && !loaded {
                return Err(ilpipe_sys::ERR_INCORRECT_STATE_OPERATION);
            }
            if buffer.capacity() < sim_port.definition.buffer_size {
                return Err(ilpipe_sys::ERR_BAD_PARAMETER);
            }
            registry.take_allocation()?;

            let sim = registry.sim(handle)?;
            if let Some(sim_port) = sim.ports.get_mut(&buffer.port()) {
                sim_port.registered += 1;
            }
            sim.settle(jobs);
            Ok(())
        });
        result.err().unwrap_or(ilpipe_sys::STATUS_OK)
    }

    fn free_buffer(&self, handle: Handle, port: u32, buffer: Buffer) -> Status {
        self.with_registry(|registry, jobs| {
            let sim = match registry.sim(handle) {
                Ok(sim) => sim,
                Err(status) => return status,
            };
            let running = sim.accepts_buffers() && sim.pending_state != Some(State::Loaded);
            let Some(sim_port) = sim.ports.get_mut(&port) else {
                return ilpipe_sys::ERR_BAD_PORT_INDEX;
            };
            sim_port.registered = sim_port.registered.saturating_sub(1);
            let unpopulated =
                running && sim_port.definition.enabled && sim_port.pending.is_none();
            trace!(role = sim.role.name, port, index = buffer.index(), "Freed buffer");
            drop(buffer);
            if unpopulated {
                sim.event(jobs, Event::error(ilpipe_sys::ERR_PORT_UNPOPULATED, port));
            }
            sim.settle(jobs);
            ilpipe_sys::STATUS_OK
        })
    }

    fn empty_this_buffer(&self, handle: Handle, buffer: Buffer) -> Result<(), Rejected> {
        self.with_registry(|registry, jobs| {
            let hold = registry.hold_buffers;
            let sim = match registry.sim(handle) {
                Ok(sim) => sim,
                Err(status) => return Err(Rejected { status, buffer }),
            };
            let accepts = sim.accepts_buffers();
            let executing = sim.state == State::Executing;
            let port = match sim.ports.get_mut(&buffer.port()) {
                Some(port) if port.definition.direction == Direction::Input => port,
                _ => {
                    return Err(Rejected {
                        status: ilpipe_sys::ERR_BAD_PORT_INDEX,
                        buffer,
                    });
                }
            };
            if !port.definition.enabled || !accepts {
                return Err(Rejected {
                    status: ilpipe_sys::ERR_INCORRECT_STATE_OPERATION,
                    buffer,
                });
            }
            if hold || !executing {
                port.held.push_back(buffer);
                return Ok(());
            }
            sim.backlog.push_back(Packet::from_buffer(&buffer));
            jobs.push(Job::EmptyDone(sim.callbacks.clone(), buffer));
            registry.pump(handle, jobs);
            Ok(())
        })
    }

    fn fill_this_buffer(&self, handle: Handle, buffer: Buffer) -> Result<(), Rejected> {
        self.with_registry(|registry, jobs| {
            let sim = match registry.sim(handle) {
                Ok(sim) => sim,
                Err(status) => return Err(Rejected { status, buffer }),
            };
            let accepts = sim.accepts_buffers();
            let port = match sim.ports.get_mut(&buffer.port()) {
                Some(port) if port.definition.direction == Direction::Output => port,
                _ => {
                    return Err(Rejected {
                        status: ilpipe_sys::ERR_BAD_PORT_INDEX,
                        buffer,
                    });
                }
            };
            if !port.definition.enabled || !accepts {
                return Err(Rejected {
                    status: ilpipe_sys::ERR_INCORRECT_STATE_OPERATION,
                    buffer,
                });
            }
            port.held.push_back(buffer);
            registry.pump(handle, jobs);
            Ok(())
        })
    }

    fn setup_tunnel(
        &self,
        output: Handle,
        output_port: u32,
        input: Option<(Handle, u32)>,
    ) -> Status {
        let mut registry = self.registry.lock();
        let Some((input, input_port)) = input else {
            return match registry.sim(output) {
                Ok(sim) => match sim.ports.get_mut(&output_port) {
                    Some(port) => {
                        port.tunnel = None;
                        ilpipe_sys::STATUS_OK
                    }
                    None => ilpipe_sys::ERR_BAD_PORT_INDEX,
                },
                Err(status) => status,
            };
        };

        for (handle, port) in [(output, output_port), (input, input_port)] {
            let sim = match registry.sim(handle) {
                Ok(sim) => sim,
                Err(status) => return status,
            };
            let loaded = sim.state == State::Loaded;
            match sim.ports.get(&port) {
                Some(sim_port) if sim_port.definition.enabled && !loaded => {
                    return ilpipe_sys::ERR_INCORRECT_STATE_OPERATION;
                }
                Some(_) => {}
                None => return ilpipe_sys::ERR_BAD_PORT_INDEX,
            }
        }

        let peers = [(output, output_port, input, input_port), (input, input_port, output, output_port)];
        for (handle, port, peer, peer_port) in peers {
            if let Ok(sim) = registry.sim(handle)
                && let Some(sim_port) = sim.ports.get_mut(&port)
            {
                sim_port.tunnel = Some((peer, peer_port));
            }
        }
        debug!(
            output = output.raw(),
            output_port,
            input = input.raw(),
            input_port,
            "Tunnel established"
        );
        ilpipe_sys::STATUS_OK
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Recorder {
        events: Mutex<Vec<Event>>,
        filled: Mutex<Vec<Buffer>>,
        emptied: Mutex<Vec<Buffer>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                events: Mutex::new(Vec::new()),
                filled: Mutex::new(Vec::new()),
                emptied: Mutex::new(Vec::new()),
            })
        }
    }

    impl ComponentCallbacks for Recorder {
        fn event_handler(&self, event: Event) {
            self.events.lock().push(event);
        }

        fn empty_buffer_done(&self, buffer: Buffer) {
            self.emptied.lock().push(buffer);
        }

        fn fill_buffer_done(&self, buffer: Buffer) {
            self.filled.lock().push(buffer);
        }
    }

    fn engine_with(role: &str) -> (LoopbackEngine, Handle, Arc<Recorder>) {
        let engine = LoopbackEngine::new();
        assert_eq!(engine.init(), ilpipe_sys::STATUS_OK);
        let recorder = Recorder::new();
        let handle = engine.get_handle(role, recorder.clone()).unwrap();
        (engine, handle, recorder)
    }

    #[test]
    fn unknown_role_is_not_found() {
        let engine = LoopbackEngine::new();
        engine.init();
        assert_eq!(
            engine.get_handle("teapot", Recorder::new()).err(),
            Some(ilpipe_sys::ERR_COMPONENT_NOT_FOUND)
        );
    }

    #[test]
    fn same_state_reports_flagged_error() {
        let (engine, handle, recorder) = engine_with("video_render");
        engine.send_command(handle, Command::StateSet(State::Loaded));
        assert!(engine.sync());
        assert_eq!(
            recorder.events.lock().as_slice(),
            &[Event::error(ilpipe_sys::ERR_SAME_STATE, 1)]
        );
    }

    #[test]
    fn illegal_transition_reports_error() {
        let (engine, handle, recorder) = engine_with("video_render");
        engine.send_command(handle, Command::StateSet(State::Executing));
        assert!(engine.sync());
        assert_eq!(
            recorder.events.lock()[0],
            Event::error(ilpipe_sys::ERR_INCORRECT_STATE_TRANSITION, 0)
        );
        assert_eq!(engine.get_state(handle), Ok(State::Loaded));
    }

    #[test]
    fn idle_waits_for_enabled_ports_to_populate() {
        let (engine, handle, recorder) = engine_with("audio_decode");
        engine.send_command(handle, Command::PortDisable(121));
        engine.send_command(handle, Command::StateSet(State::Idle));
        assert_eq!(engine.get_state(handle), Ok(State::Loaded));

        let buffers: Vec<Buffer> = (0..BUFFER_COUNT_DEFAULT)
            .map(|_| engine.allocate_buffer(handle, 120, 1024).unwrap())
            .collect();
        assert_eq!(engine.get_state(handle), Ok(State::Idle));
        assert!(engine.sync());
        assert!(
            recorder
                .events
                .lock()
                .contains(&Event::command_complete(Command::StateSet(State::Idle)))
        );
        assert_eq!(buffers[0].as_ptr() as usize % BUFFER_ALIGNMENT, 0);
    }

    #[test]
    fn allocation_failure_injection() {
        let (engine, handle, _recorder) = engine_with("video_decode");
        engine.fail_allocations_after(Some(1));
        assert!(engine.allocate_buffer(handle, 130, 64).is_ok());
        assert_eq!(
            engine.allocate_buffer(handle, 130, 64).err(),
            Some(ilpipe_sys::ERR_INSUFFICIENT_RESOURCES)
        );
    }

    #[test]
    fn clock_configs_round_trip() {
        let (engine, handle, _recorder) = engine_with("clock");
        let state = ClockStateConfig {
            state: super::super::ClockState::Running,
            start_time: 5_000_000,
            offset: 0,
            wait_mask: 0,
        };
        assert_eq!(
            engine.set_config(handle, &Config::ClockState(state)),
            ilpipe_sys::STATUS_OK
        );
        let mut media_time = Config::CurrentMediaTime {
            port: 80,
            timestamp: 0,
        };
        assert_eq!(engine.get_config(handle, &mut media_time), ilpipe_sys::STATUS_OK);
        assert_eq!(
            media_time,
            Config::CurrentMediaTime {
                port: 80,
                timestamp: 5_000_000
            }
        );
    }

    #[test]
    fn clock_configs_are_rejected_elsewhere() {
        let (engine, handle, _recorder) = engine_with("video_decode");
        assert_eq!(
            engine.set_config(handle, &Config::Scale(0)),
            ilpipe_sys::ERR_UNSUPPORTED_INDEX
        );
    }

    #[test]
    fn tunnel_requires_disabled_ports_outside_loaded() {
        let engine = LoopbackEngine::new();
        engine.init();
        let decode = engine.get_handle("video_decode", Recorder::new()).unwrap();
        let render = engine.get_handle("video_render", Recorder::new()).unwrap();
        assert_eq!(
            engine.setup_tunnel(decode, 131, Some((render, 90))),
            ilpipe_sys::STATUS_OK
        );
        assert_eq!(
            engine.setup_tunnel(decode, 131, Some((render, 99))),
            ilpipe_sys::ERR_BAD_PORT_INDEX
        );
        assert_eq!(engine.setup_tunnel(decode, 131, None), ilpipe_sys::STATUS_OK);
    }
}
