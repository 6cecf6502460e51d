// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # ilpipe - component pipelines over an asynchronous media engine
//!
//! Safe, idiomatic Rust framework for driving hardware-style media engines:
//! decoders, mixers, splitters, renderers and a media clock, each running as an
//! independent asynchronous component that exchanges buffers and reports
//! progress through events.
//!
//! ## Overview
//!
//! The engine itself sits behind the [`engine::Engine`] trait. This crate
//! manages everything around it: buffer ownership between caller and
//! engine, correlation of commands with their completion events, the
//! component state machine, tunnels between components and the media clock.
//!
//! ### Key Concepts
//!
//! - **Context**: an initialized engine plus [`config::Settings`] ([`EngineContext`])
//! - **Component**: one processing stage bound to an engine handle ([`Component`])
//! - **Port / pool**: where buffers live while the caller owns them ([`Port`], [`BufferPool`])
//! - **Event queue**: deduplicated notifications with bounded waits ([`EventQueue`])
//! - **Link**: a tunnel from one component's output to another's input ([`Link`])
//! - **Media clock**: shared "current time" with speed, pause and step ([`MediaClock`])
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────┐
//! │ EngineContext │  (Arc<dyn Engine> + Settings)
//! └───────┬───────┘
//!         │
//!         ├─► Component ──► input Port  ──► BufferPool
//!         │             ├─► output Port ──► BufferPool
//!         │             └─► EventQueue  ◄── engine thread
//!         │
//!         ├─► Link<'a>   (borrows two components)
//!         │
//!         └─► MediaClock (wraps the "clock" component)
//! ```
//!
//! ## Examples
//!
//! ### Feeding a decoder tunneled to a renderer
//!
//! ```
//! use std::{sync::Arc, time::Duration};
//! use ilpipe::{BufferFlags, Component, EngineContext, Link, config::BufferMode,
//!     engine::{State, loopback::LoopbackEngine}};
//!
//! # fn main() -> Result<(), ilpipe::Error> {
//! let context = EngineContext::new(Arc::new(LoopbackEngine::new()))?;
//! let decoder = Component::new(&context, "video_decode");
//! let render = Component::new(&context, "video_render");
//! decoder.init()?;
//! render.init()?;
//!
//! decoder.allocate_input_buffers(BufferMode::EngineAllocated)?;
//! let mut link = Link::new(&decoder, &render)?;
//! link.establish(true, true)?;
//! decoder.set_state(State::Executing)?;
//! render.set_state(State::Executing)?;
//!
//! if let Some(mut buffer) = decoder.acquire_input_buffer(Duration::from_millis(200)) {
//!     buffer.fill(b"last frame");
//!     buffer.set_flags(BufferFlags::END_OF_STREAM);
//!     decoder.empty_this_buffer(buffer)?;
//! }
//! decoder.wait_for_input_done(Duration::from_secs(1))?;
//!
//! link.de_establish()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Thread Safety
//!
//! - [`EngineContext`], [`Component`] and [`MediaClock`] are `Send + Sync`
//! - Engine callbacks arrive on the engine's own thread and only touch the
//!   event queue and the buffer pools
//! - Every blocking call takes an explicit timeout

mod buffer;
mod clock;
mod component;
mod context;
mod error;
mod link;

pub mod config;
pub mod engine;

pub use buffer::{Buffer, BufferFlags};
pub use clock::{
    MAX_SPEED, MediaClock, MonotonicClock, NORMAL_SPEED, PRE_ROLL_US, SAMPLE_WINDOW_US,
    WAIT_AUDIO, WAIT_VIDEO, WallClock, speed_to_scale,
};
pub use component::{BufferLayout, BufferPool, Component, EventQueue, Port, PortLayout};
pub use context::EngineContext;
pub use error::{Error, Result};
pub use link::Link;
