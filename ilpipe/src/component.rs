// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Processing components and their lifecycle.
//!
//! A [`Component`] wraps one engine handle: it owns the input and output
//! [`Port`]s with their buffer pools, the [`EventQueue`] fed by the engine
//! thread, and drives the `Loaded → Idle → Executing` state machine.
//!
//! # Key Types
//!
//! - [`Component`]: one decoder, mixer, splitter, renderer or clock
//! - [`Port`] / [`BufferPool`]: buffer ownership between caller and engine
//! - [`EventQueue`]: command/event correlation with bounded waits
//! - [`PortLayout`]: how a role numbers its ports

pub mod events;
pub mod port;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use tracing::{debug, error, trace, warn};
use uuid::Uuid;

use crate::{
    Buffer, BufferFlags, EngineContext, Error, Result,
    config::BufferMode,
    engine::{
        Command, ComponentCallbacks, Config, Direction, Event, EventKind, Handle, Param,
        PortDefinition, PortDomain, Rejected, State, Status,
    },
};

pub use events::EventQueue;
pub use port::{BufferLayout, BufferPool, Port};

/// How a role maps its port range onto input and output ports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortLayout {
    /// Input is the first port of the range, output the next one.
    Standard,
    /// Output is the first port of the range, input the next one (mixers).
    Swapped,
}

impl PortLayout {
    pub fn for_role(role: &str) -> Self {
        if role == "audio_mixer" {
            PortLayout::Swapped
        } else {
            PortLayout::Standard
        }
    }

    /// Returns `(input, output)` for a range of `ports` starting at `start_port`.
    ///
    /// Port numbers are clamped to the last port of the range.
    pub fn resolve(self, start_port: u32, ports: u32) -> (u32, u32) {
        let last = start_port + ports.saturating_sub(1);
        let (input, output) = match self {
            PortLayout::Standard => (start_port, start_port + 1),
            PortLayout::Swapped => (start_port + 1, start_port),
        };
        (input.min(last), output.min(last))
    }
}

/// State shared with the engine thread through [`ComponentCallbacks`].
struct Shared {
    name: String,
    fatal: Arc<AtomicBool>,
    exit: AtomicBool,
    eos: AtomicBool,
    ignore_error: Mutex<Option<Status>>,
    events: EventQueue,
    input: Port,
    output: Port,
}

impl Shared {
    fn new(name: &str) -> Self {
        let fatal = Arc::new(AtomicBool::new(false));
        let events = EventQueue::with_fatal_flag(fatal.clone());
        events.close();
        Self {
            name: name.to_string(),
            events,
            input: Port::new(Direction::Input, fatal.clone()),
            output: Port::new(Direction::Output, fatal.clone()),
            fatal,
            exit: AtomicBool::new(false),
            eos: AtomicBool::new(false),
            ignore_error: Mutex::new(None),
        }
    }

    /// Sets the sticky fatal flag and wakes every waiter of every family.
    fn raise_fatal(&self) {
        self.fatal.store(true, Ordering::Release);
        self.events.wake();
        self.input.pool().wake();
        self.output.pool().wake();
    }

    fn reset(&self) {
        self.fatal.store(false, Ordering::Release);
        self.exit.store(false, Ordering::Release);
        self.eos.store(false, Ordering::Release);
        *self.ignore_error.lock() = None;
        self.events.reopen();
    }
}

impl ComponentCallbacks for Shared {
    fn event_handler(&self, event: Event) {
        if event.kind == EventKind::Error {
            let mut ignore = self.ignore_error.lock();
            if *ignore == Some(event.data1) {
                *ignore = None;
                debug!(
                    component = %self.name,
                    status = format_args!("{:#x}", event.data1),
                    "Ignoring expected error"
                );
                return;
            }
        }

        let (kind, data1, data2) = event.key();
        // Latches must be visible before a waiter can consume the event.
        if kind == EventKind::BufferFlag
            && BufferFlags::from_bits_retain(data2).contains(BufferFlags::END_OF_STREAM)
        {
            debug!(component = %self.name, port = data1, "End of stream");
            self.eos.store(true, Ordering::Release);
        }
        let fatal = kind == EventKind::Error && Error::is_fatal_status(data1);
        if fatal {
            self.fatal.store(true, Ordering::Release);
        }
        self.events.post(event);

        match kind {
            EventKind::BufferFlag => {}
            EventKind::Error if data1 == ilpipe_sys::ERR_SAME_STATE => {}
            EventKind::Error => {
                error!(
                    component = %self.name,
                    status = format_args!("{:#x}", data1),
                    data2,
                    "Engine reported error: {}",
                    Error::from_code(data1)
                );
                if fatal {
                    self.raise_fatal();
                }
            }
            EventKind::PortSettingsChanged => {
                debug!(component = %self.name, port = data1, "Port settings changed");
            }
            _ => trace!(component = %self.name, ?kind, data1, data2, "Event"),
        }
    }

    fn empty_buffer_done(&self, buffer: Buffer) {
        trace!(component = %self.name, index = buffer.index(), "Input buffer returned");
        self.input.pool().release(buffer);
    }

    fn fill_buffer_done(&self, buffer: Buffer) {
        trace!(
            component = %self.name,
            index = buffer.index(),
            filled = buffer.filled_len(),
            "Output buffer returned"
        );
        self.output.pool().release(buffer);
    }
}

#[derive(Debug, Clone, Copy)]
struct Binding {
    handle: Handle,
}

/// One asynchronous processing stage bound to an engine handle.
///
/// A component is created empty, bound with [`Self::init`], given buffers,
/// driven through its states and finally released with [`Self::deinit`]
/// (also run on drop). All methods take `&self`, so one component can be fed
/// from one thread while another drains it.
///
/// # Examples
///
/// ```
/// use std::{sync::Arc, time::Duration};
/// use ilpipe::{Component, EngineContext, config::BufferMode, engine::{State, loopback::LoopbackEngine}};
///
/// # fn main() -> Result<(), ilpipe::Error> {
/// let context = EngineContext::new(Arc::new(LoopbackEngine::new()))?;
/// let decoder = Component::new(&context, "video_decode");
/// decoder.init()?;
/// decoder.allocate_input_buffers(BufferMode::EngineAllocated)?;
/// decoder.set_state(State::Executing)?;
///
/// if let Some(mut buffer) = decoder.acquire_input_buffer(Duration::from_millis(100)) {
///     buffer.fill(b"access unit");
///     decoder.empty_this_buffer(buffer)?;
/// }
/// decoder.deinit()?;
/// # Ok(())
/// # }
/// ```
pub struct Component {
    context: EngineContext,
    role: String,
    id: Uuid,
    layout: PortLayout,
    shared: Arc<Shared>,
    binding: Mutex<Option<Binding>>,
}

impl Component {
    /// Creates an unbound component for the engine role `role`.
    pub fn new(context: &EngineContext, role: &str) -> Self {
        Self {
            context: context.clone(),
            role: role.to_string(),
            id: Uuid::new_v4(),
            layout: PortLayout::for_role(role),
            shared: Arc::new(Shared::new(role)),
            binding: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.role
    }

    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    /// Unique id of this component instance, used to correlate logs.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_initialized(&self) -> bool {
        self.binding.lock().is_some()
    }

    /// The engine handle, if the component is bound.
    pub fn handle(&self) -> Option<Handle> {
        self.binding.lock().map(|binding| binding.handle)
    }

    pub fn input(&self) -> &Port {
        &self.shared.input
    }

    pub fn output(&self) -> &Port {
        &self.shared.output
    }

    pub fn input_port(&self) -> u32 {
        self.shared.input.index()
    }

    pub fn output_port(&self) -> u32 {
        self.shared.output.index()
    }

    pub fn events(&self) -> &EventQueue {
        &self.shared.events
    }

    fn bound_handle(&self) -> Result<Handle> {
        self.handle().ok_or(Error::NotInitialized)
    }

    fn command_timeout(&self) -> Duration {
        self.context.settings().command_timeout()
    }

    fn port_timeout(&self) -> Duration {
        self.context.settings().port_timeout()
    }

    /// Binds the engine handle, resolves the port numbers and disables every port.
    ///
    /// # Errors
    ///
    /// - [`Error::ComponentNotFound`] if the engine does not know the role
    /// - any error raised while disabling the ports; the handle is released again
    pub fn init(&self) -> Result<()> {
        let engine = self.context.engine();
        let mut binding = self.binding.lock();
        if binding.is_some() {
            return Err(Error::Other(format!(
                "Component {} is already initialized.",
                self.role
            )));
        }

        self.shared.reset();
        let callbacks: Arc<dyn ComponentCallbacks> = self.shared.clone();
        let handle = engine
            .get_handle(&self.role, callbacks)
            .map_err(Error::from_code)
            .inspect_err(|err| error!(component = %self.role, "Failed to get handle: {}", err))?;

        let mut first_range = None;
        let mut all_ports = Vec::new();
        for domain in PortDomain::ALL {
            let mut param = Param::port_range(domain);
            if Error::from_status(engine.get_parameter(handle, &mut param)).is_err() {
                continue;
            }
            if let Param::PortRange {
                start_port, ports, ..
            } = param
                && ports > 0
            {
                first_range.get_or_insert((start_port, ports));
                all_ports.extend(start_port..start_port + ports);
            }
        }

        let Some((start_port, ports)) = first_range else {
            if let Err(err) = Error::from_status(engine.free_handle(handle)) {
                warn!(component = %self.role, "Failed to release handle: {}", err);
            }
            return Err(Error::Other(format!(
                "Component {} exposes no ports.",
                self.role
            )));
        };

        let (input_port, output_port) = self.layout.resolve(start_port, ports);
        self.shared.input.set_index(input_port);
        self.shared.output.set_index(output_port);
        *binding = Some(Binding { handle });
        drop(binding);

        for port in all_ports {
            if let Err(err) = self.disable_port(port, true) {
                error!(component = %self.role, port, "Failed to disable port: {}", err);
                self.release_handle(handle);
                return Err(err);
            }
        }

        debug!(
            component = %self.role,
            id = %self.id,
            input_port,
            output_port,
            "Initialized"
        );
        Ok(())
    }

    fn release_handle(&self, handle: Handle) {
        if let Err(err) = Error::from_status(self.context.engine().free_handle(handle)) {
            warn!(component = %self.role, "Failed to release handle: {}", err);
        }
        *self.binding.lock() = None;
        self.shared.events.close();
    }

    /// Tears the component down and releases the engine handle.
    ///
    /// Runs flush all ports → free output buffers → free input buffers →
    /// `Idle` → `Loaded` → release handle. Waiters blocked on this component
    /// are released first. Failures of the intermediate steps are logged and
    /// do not stop the sequence. Calling it on an unbound component is a no-op.
    pub fn deinit(&self) -> Result<()> {
        let Some(handle) = self.handle() else {
            return Ok(());
        };
        if self.shared.exit.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.shared.input.pool().begin_flush();
        self.shared.output.pool().begin_flush();
        self.shared.events.interrupt();

        if let Err(err) = self.flush_all() {
            warn!(component = %self.role, "Flush during teardown failed: {}", err);
        }
        if let Err(err) = self.free_output_buffers() {
            warn!(component = %self.role, "Freeing output buffers failed: {}", err);
        }
        if let Err(err) = self.free_input_buffers() {
            warn!(component = %self.role, "Freeing input buffers failed: {}", err);
        }
        if let Err(err) = self.transition_to_loaded() {
            warn!(component = %self.role, "Transition to Loaded failed: {}", err);
        }

        let status = self.context.engine().free_handle(handle);
        *self.binding.lock() = None;
        self.shared.events.close();
        self.shared.eos.store(false, Ordering::Release);
        debug!(component = %self.role, id = %self.id, "De-initialized");
        Error::from_status(status)
    }

    fn transition_to_loaded(&self) -> Result<()> {
        match self.state()? {
            State::Loaded => return Ok(()),
            State::Executing | State::Pause => self.set_state(State::Idle)?,
            _ => {}
        }
        self.set_state(State::Loaded)
    }

    /// Queries the engine for the current state.
    pub fn state(&self) -> Result<State> {
        let handle = self.bound_handle()?;
        self.context
            .engine()
            .get_state(handle)
            .map_err(Error::from_code)
    }

    /// Moves the component to `target` and waits for the transition.
    ///
    /// Requesting the current state returns immediately without sending a
    /// command; a same-state error from the engine also counts as success.
    pub fn set_state(&self, target: State) -> Result<()> {
        if self.state()? == target {
            return Ok(());
        }
        match self.send_command(Command::StateSet(target)) {
            Err(Error::SameState) => return Ok(()),
            result => result?,
        }
        match self.wait_for_command(Command::StateSet(target), self.command_timeout()) {
            Err(Error::SameState) => {
                debug!(component = %self.role, ?target, "Already in requested state");
                Ok(())
            }
            result => result,
        }
    }

    /// Sends a raw command without waiting for its completion.
    pub fn send_command(&self, command: Command) -> Result<()> {
        let handle = self.bound_handle()?;
        Error::from_status(self.context.engine().send_command(handle, command)).inspect_err(
            |err| {
                if !matches!(err, Error::SameState) {
                    error!(component = %self.role, ?command, "Command rejected: {}", err);
                }
            },
        )
    }

    pub fn get_parameter(&self, param: &mut Param) -> Result<()> {
        let handle = self.bound_handle()?;
        Error::from_status(self.context.engine().get_parameter(handle, param))
    }

    pub fn set_parameter(&self, param: &Param) -> Result<()> {
        let handle = self.bound_handle()?;
        Error::from_status(self.context.engine().set_parameter(handle, param)).inspect_err(
            |err| error!(component = %self.role, ?param, "Set parameter failed: {}", err),
        )
    }

    pub fn get_config(&self, config: &mut Config) -> Result<()> {
        let handle = self.bound_handle()?;
        Error::from_status(self.context.engine().get_config(handle, config))
    }

    pub fn set_config(&self, config: &Config) -> Result<()> {
        let handle = self.bound_handle()?;
        Error::from_status(self.context.engine().set_config(handle, config)).inspect_err(
            |err| error!(component = %self.role, ?config, "Set config failed: {}", err),
        )
    }

    pub fn port_definition(&self, port: u32) -> Result<PortDefinition> {
        let mut param = Param::PortDefinition(PortDefinition::query(port));
        self.get_parameter(&mut param)?;
        match param {
            Param::PortDefinition(definition) => Ok(definition),
            _ => Err(Error::BadParameter),
        }
    }

    /// Enables `port` unless it is already enabled.
    ///
    /// Returns whether a command was sent. With `wait` the call blocks until
    /// the engine confirms the enable.
    pub fn enable_port(&self, port: u32, wait: bool) -> Result<bool> {
        if self.port_definition(port)?.enabled {
            return Ok(false);
        }
        self.send_command(Command::PortEnable(port))?;
        if wait {
            self.wait_for_command(Command::PortEnable(port), self.port_timeout())?;
        }
        Ok(true)
    }

    /// Disables `port` unless it is already disabled.
    ///
    /// Returns whether a command was sent.
    pub fn disable_port(&self, port: u32, wait: bool) -> Result<bool> {
        if !self.port_definition(port)?.enabled {
            return Ok(false);
        }
        self.send_command(Command::PortDisable(port))?;
        if wait {
            self.wait_for_command(Command::PortDisable(port), self.port_timeout())?;
        }
        Ok(true)
    }

    /// Waits for a command-complete event for `command`.
    pub fn wait_for_command(&self, command: Command, timeout: Duration) -> Result<()> {
        self.shared.events.wait_for_command(command, timeout)
    }

    /// Waits for an event of `kind`, returning it.
    pub fn wait_for_event(&self, kind: EventKind, timeout: Duration) -> Result<Event> {
        self.shared.events.wait_for(kind, timeout)
    }

    /// Flushes one port, returning every buffer the engine holds on it.
    pub fn flush_port(&self, port: u32) -> Result<()> {
        self.send_command(Command::Flush(port))?;
        self.wait_for_command(Command::Flush(port), self.command_timeout())
    }

    pub fn flush_input(&self) -> Result<()> {
        self.flush_port(self.input_port())
    }

    pub fn flush_output(&self) -> Result<()> {
        self.flush_port(self.output_port())
    }

    /// Flushes both ports; the output is flushed even if the input flush fails.
    pub fn flush_all(&self) -> Result<()> {
        let input = self.flush_input();
        let output = if self.output_port() != self.input_port() {
            self.flush_output()
        } else {
            Ok(())
        };
        input.and(output)
    }

    /// Allocates the input port's buffers as described by its port definition.
    ///
    /// The component is first brought to `Idle` (through `Loaded` if needed)
    /// so buffers are negotiated before any data flows.
    pub fn allocate_input_buffers(&self, mode: BufferMode) -> Result<()> {
        self.allocate_port_buffers(&self.shared.input, mode)
    }

    pub fn allocate_output_buffers(&self, mode: BufferMode) -> Result<()> {
        self.allocate_port_buffers(&self.shared.output, mode)
    }

    fn allocate_port_buffers(&self, port: &Port, mode: BufferMode) -> Result<()> {
        if port.pool().is_installed() {
            return Err(Error::Other(format!(
                "Port {} of {} already has buffers.",
                port.index(),
                self.role
            )));
        }
        let definition = self.port_definition(port.index())?;
        self.ensure_idle()?;
        self.allocate(
            port,
            BufferLayout {
                count: definition.buffer_count_actual as usize,
                size: definition.buffer_size,
                alignment: definition.buffer_alignment,
                mode,
            },
        )
    }

    fn ensure_idle(&self) -> Result<()> {
        let state = self.state()?;
        if state == State::Idle {
            return Ok(());
        }
        if state != State::Loaded
            && let Err(err) = self.set_state(State::Loaded)
        {
            warn!(component = %self.role, ?state, "Could not force Loaded: {}", err);
        }
        self.set_state(State::Idle)
    }

    /// Obtains `layout.count` buffers for `port`, enables the port and waits
    /// for the engine to confirm the enable.
    ///
    /// Buffers obtained before a failure are handed back to the engine.
    fn allocate(&self, port: &Port, layout: BufferLayout) -> Result<()> {
        if layout.count == 0 {
            return Ok(());
        }
        let engine = self.context.engine();
        let handle = self.bound_handle()?;
        let index = port.index();
        let sent = self.enable_port(index, false)?;

        let mut buffers = Vec::with_capacity(layout.count);
        for _ in 0..layout.count {
            let result = match layout.mode {
                BufferMode::EngineAllocated => engine.allocate_buffer(handle, index, layout.size),
                BufferMode::CallerAllocated => {
                    let buffer = Buffer::aligned(index, layout.size, layout.alignment);
                    match engine.use_buffer(handle, &buffer) {
                        ilpipe_sys::STATUS_OK => Ok(buffer),
                        status => Err(status),
                    }
                }
            };
            match result {
                Ok(buffer) => buffers.push(buffer),
                Err(status) => {
                    let err = Error::from_code(status);
                    error!(
                        component = %self.role,
                        port = index,
                        obtained = buffers.len(),
                        "Buffer allocation failed: {}", err
                    );
                    for buffer in buffers {
                        if let Err(err) = Error::from_status(engine.free_buffer(handle, index, buffer))
                        {
                            warn!(component = %self.role, port = index, "Failed to free buffer: {}", err);
                        }
                    }
                    return Err(err);
                }
            }
        }

        port.set_layout(layout);
        port.pool().install(buffers);
        if sent {
            self.wait_for_command(Command::PortEnable(index), self.port_timeout())?;
        }
        debug!(
            component = %self.role,
            port = index,
            count = layout.count,
            size = layout.size,
            "Buffers allocated"
        );
        Ok(())
    }

    pub fn free_input_buffers(&self) -> Result<()> {
        self.free_port_buffers(&self.shared.input)
    }

    pub fn free_output_buffers(&self) -> Result<()> {
        self.free_port_buffers(&self.shared.output)
    }

    /// Disables the port, waits for every buffer to come home and hands
    /// them all back to the engine. Freeing twice is a no-op.
    fn free_port_buffers(&self, port: &Port) -> Result<()> {
        let pool = port.pool();
        if !pool.is_installed() {
            return Ok(());
        }
        let engine = self.context.engine();
        let handle = self.bound_handle()?;
        let index = port.index();

        pool.begin_flush();
        let sent = self.disable_port(index, false).unwrap_or_else(|err| {
            warn!(component = %self.role, port = index, "Disable before free failed: {}", err);
            false
        });

        if let Err(err) = pool.wait_drained(self.context.settings().drain_timeout()) {
            warn!(
                component = %self.role,
                port = index,
                outstanding = pool.outstanding(),
                "Not every buffer came back before free: {}", err
            );
        }

        let mut result = Ok(());
        for buffer in pool.take_all() {
            if let Err(err) = Error::from_status(engine.free_buffer(handle, index, buffer)) {
                warn!(component = %self.role, port = index, "Failed to free buffer: {}", err);
                result = result.and(Err(err));
            }
        }
        if sent {
            result = result.and(self.wait_for_command(Command::PortDisable(index), self.port_timeout()));
        }
        port.set_layout(BufferLayout::default());
        result
    }

    /// Takes a free input buffer, waiting up to `timeout`.
    ///
    /// `None` means "retry later": the pool is empty, flushing, torn down, or
    /// the component hit a fatal error.
    pub fn acquire_input_buffer(&self, timeout: Duration) -> Option<Buffer> {
        if self.shared.exit.load(Ordering::Acquire) {
            return None;
        }
        let mut buffer = self.shared.input.pool().acquire(timeout)?;
        buffer.reset();
        Some(buffer)
    }

    /// Takes a returned output buffer, waiting up to `timeout`.
    pub fn acquire_output_buffer(&self, timeout: Duration) -> Option<Buffer> {
        if self.shared.exit.load(Ordering::Acquire) {
            return None;
        }
        self.shared.output.pool().acquire(timeout)
    }

    /// Gives an acquired, unsubmitted input buffer back to the pool.
    pub fn return_input_buffer(&self, buffer: Buffer) {
        self.shared.input.pool().release(buffer);
    }

    pub fn return_output_buffer(&self, buffer: Buffer) {
        self.shared.output.pool().release(buffer);
    }

    /// Submits a filled input buffer to the engine.
    ///
    /// A rejected buffer goes back to the input pool.
    pub fn empty_this_buffer(&self, buffer: Buffer) -> Result<()> {
        let Some(handle) = self.handle() else {
            self.return_input_buffer(buffer);
            return Err(Error::NotInitialized);
        };
        match self.context.engine().empty_this_buffer(handle, buffer) {
            Ok(()) => Ok(()),
            Err(Rejected { status, buffer }) => {
                let err = Error::from_code(status);
                error!(component = %self.role, index = buffer.index(), "Input buffer rejected: {}", err);
                self.return_input_buffer(buffer);
                Err(err)
            }
        }
    }

    /// Hands an empty output buffer to the engine to be filled.
    ///
    /// A rejected buffer goes back to the output pool.
    pub fn fill_this_buffer(&self, mut buffer: Buffer) -> Result<()> {
        let Some(handle) = self.handle() else {
            self.return_output_buffer(buffer);
            return Err(Error::NotInitialized);
        };
        buffer.reset();
        match self.context.engine().fill_this_buffer(handle, buffer) {
            Ok(()) => Ok(()),
            Err(Rejected { status, buffer }) => {
                let err = Error::from_code(status);
                error!(component = %self.role, index = buffer.index(), "Output buffer rejected: {}", err);
                self.return_output_buffer(buffer);
                Err(err)
            }
        }
    }

    /// Blocks until every input buffer is back in the pool.
    pub fn wait_for_input_done(&self, timeout: Duration) -> Result<()> {
        self.shared.input.pool().wait_drained(timeout)
    }

    pub fn wait_for_output_done(&self, timeout: Duration) -> Result<()> {
        self.shared.output.pool().wait_drained(timeout)
    }

    /// Swallows the next error event carrying `status`, exactly once.
    pub fn ignore_next_error(&self, status: Status) {
        *self.shared.ignore_error.lock() = Some(status);
    }

    /// `true` once end of stream was signalled or the component is dead.
    pub fn is_eos(&self) -> bool {
        self.shared.eos.load(Ordering::Acquire) || self.bad_state()
    }

    pub fn reset_eos(&self) {
        self.shared.eos.store(false, Ordering::Release);
    }

    /// `true` after a fatal resource error; the pipeline must be rebuilt.
    pub fn bad_state(&self) -> bool {
        self.shared.fatal.load(Ordering::Acquire)
    }
}

impl Drop for Component {
    fn drop(&mut self) {
        if self.is_initialized()
            && let Err(err) = self.deinit()
        {
            error!(component = %self.role, "Failed to de-initialize component: {:?}", err);
        }
    }
}
