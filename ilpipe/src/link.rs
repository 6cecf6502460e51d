// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Tunnels between components.
//!
//! A [`Link`] connects one component's output port to another component's
//! input port so buffers flow between them inside the engine. Establishing
//! and tearing down a link are multi-step protocols touching both sides.

use tracing::{debug, error};
use uuid::Uuid;

use crate::{
    Component, Error, Result,
    engine::{Command, State},
};

/// A connection from `src`'s output port to `dst`'s input port.
///
/// The link borrows both components, so it can never outlive them. Dropping
/// an established link tears it down.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use ilpipe::{Component, EngineContext, Link, engine::loopback::LoopbackEngine};
///
/// # fn main() -> Result<(), ilpipe::Error> {
/// let context = EngineContext::new(Arc::new(LoopbackEngine::new()))?;
/// let decoder = Component::new(&context, "video_decode");
/// let render = Component::new(&context, "video_render");
/// decoder.init()?;
/// render.init()?;
///
/// let mut link = Link::new(&decoder, &render)?;
/// link.establish(true, true)?;
/// assert!(link.is_established());
/// link.de_establish()?;
/// # Ok(())
/// # }
/// ```
pub struct Link<'a> {
    id: Uuid,
    src: &'a Component,
    src_port: u32,
    dst: &'a Component,
    dst_port: u32,
    established: bool,
}

impl<'a> Link<'a> {
    /// Links `src`'s output port to `dst`'s input port.
    ///
    /// # Errors
    ///
    /// [`Error::NotInitialized`] if either component has not been initialized.
    pub fn new(src: &'a Component, dst: &'a Component) -> Result<Self> {
        Self::check_initialized(src, dst)?;
        Ok(Self::with_ports(
            src,
            src.output_port(),
            dst,
            dst.input_port(),
        ))
    }

    /// Links explicit ports, e.g. one of the clock's output ports.
    pub fn with_ports(src: &'a Component, src_port: u32, dst: &'a Component, dst_port: u32) -> Self {
        Self {
            id: Uuid::new_v4(),
            src,
            src_port,
            dst,
            dst_port,
            established: false,
        }
    }

    fn check_initialized(src: &Component, dst: &Component) -> Result<()> {
        if src.is_initialized() && dst.is_initialized() {
            Ok(())
        } else {
            Err(Error::NotInitialized)
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    pub fn src_port(&self) -> u32 {
        self.src_port
    }

    pub fn dst_port(&self) -> u32 {
        self.dst_port
    }

    /// Connects the two ports.
    ///
    /// With `disable_ports` both ports are disabled first; with
    /// `enable_ports` both are enabled afterwards and the destination is
    /// brought to `Idle`.
    ///
    /// # Errors
    ///
    /// Fails if the engine refuses the connection or any state or port
    /// command fails. A refused connection leaves the link unestablished.
    pub fn establish(&mut self, enable_ports: bool, disable_ports: bool) -> Result<()> {
        Self::check_initialized(self.src, self.dst)?;
        let (src, dst) = (self.src, self.dst);
        let src_handle = src.handle().ok_or(Error::NotInitialized)?;
        let dst_handle = dst.handle().ok_or(Error::NotInitialized)?;

        if src.state()? == State::Loaded {
            src.set_state(State::Idle)?;
        }

        if disable_ports {
            let src_sent = src.disable_port(self.src_port, false)?;
            let dst_sent = dst.disable_port(self.dst_port, false)?;
            if src_sent {
                src.wait_for_command(Command::PortDisable(self.src_port), self.port_timeout())?;
            }
            if dst_sent {
                dst.wait_for_command(Command::PortDisable(self.dst_port), self.port_timeout())?;
            }
        }

        let status = src.context().engine().setup_tunnel(
            src_handle,
            self.src_port,
            Some((dst_handle, self.dst_port)),
        );
        Error::from_status(status).inspect_err(|err| {
            error!(
                link = %self.id,
                src = src.name(),
                src_port = self.src_port,
                dst = dst.name(),
                dst_port = self.dst_port,
                "Failed to set up tunnel: {}", err
            )
        })?;
        self.established = true;

        if enable_ports {
            let src_sent = src.enable_port(self.src_port, false)?;
            let dst_sent = dst.enable_port(self.dst_port, false)?;
            if dst_sent {
                dst.wait_for_command(Command::PortEnable(self.dst_port), self.port_timeout())?;
            }
            if dst.state()? == State::Loaded {
                dst.set_state(State::Idle)?;
            }
            if src_sent {
                src.wait_for_command(Command::PortEnable(self.src_port), self.port_timeout())?;
            }
        }

        debug!(
            link = %self.id,
            src = src.name(),
            src_port = self.src_port,
            dst = dst.name(),
            dst_port = self.dst_port,
            "Link established"
        );
        Ok(())
    }

    /// Tears the connection down: disables both ports, waits for both, then
    /// severs each side independently.
    ///
    /// A side whose component has already been de-initialized is skipped.
    /// The first failure is returned after both sides have been attempted.
    pub fn de_establish(&mut self) -> Result<()> {
        if !self.established {
            return Ok(());
        }
        let sides = [(self.src, self.src_port), (self.dst, self.dst_port)];

        let mut sent = [false; 2];
        let mut result = Ok(());
        for (slot, (component, port)) in sides.iter().enumerate() {
            if !component.is_initialized() {
                debug!(link = %self.id, component = component.name(), "Skipping released side");
                continue;
            }
            match component.disable_port(*port, false) {
                Ok(was_sent) => sent[slot] = was_sent,
                Err(err) => result = result.and(Err(err)),
            }
        }
        for (slot, (component, port)) in sides.iter().enumerate() {
            if sent[slot]
                && let Err(err) =
                    component.wait_for_command(Command::PortDisable(*port), self.port_timeout())
            {
                result = result.and(Err(err));
            }
        }

        for (component, port) in sides {
            let Some(handle) = component.handle() else {
                debug!(link = %self.id, component = component.name(), "Skipping released side");
                continue;
            };
            let status = component.context().engine().setup_tunnel(handle, port, None);
            if let Err(err) = Error::from_status(status) {
                error!(link = %self.id, component = component.name(), port, "Failed to sever tunnel: {}", err);
                result = result.and(Err(err));
            }
        }

        self.established = false;
        debug!(link = %self.id, "Link de-established");
        result
    }

    /// Flushes both ends of the link.
    pub fn flush(&self) -> Result<()> {
        let src = self.src.flush_port(self.src_port);
        let dst = self.dst.flush_port(self.dst_port);
        src.and(dst)
    }

    fn port_timeout(&self) -> std::time::Duration {
        self.src.context().settings().port_timeout()
    }
}

impl Drop for Link<'_> {
    fn drop(&mut self) {
        if self.established
            && let Err(err) = self.de_establish()
        {
            error!(link = %self.id, "Failed to de-establish link: {:?}", err);
        }
    }
}
