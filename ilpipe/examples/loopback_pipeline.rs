// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Feeds a decoder tunneled to a renderer on the loopback engine while a
//! media clock follows the submitted timestamps.
//!
//! ```text
//! cargo run --example loopback_pipeline -- --frames 50 --caller-allocated
//! ```

mod common;

use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use ilpipe::{
    BufferFlags, Component, EngineContext, Error, Link, MediaClock, Result,
    config::{BufferMode, Settings},
    engine::{EventKind, State, loopback::LoopbackEngine},
};
use tracing::{debug, info};

#[derive(Debug, Parser)]
#[command(version, about = "Runs a decode/render pipeline on the loopback engine", long_about = None)]
struct Opts {
    /// Number of frames to submit; the last one carries end-of-stream.
    #[arg(long, default_value_t = 25)]
    frames: u32,

    /// Presentation time between frames, in microseconds.
    #[arg(long, default_value_t = 40_000)]
    frame_interval_us: i64,

    /// JSON settings file.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Lend caller-allocated memory to the engine instead of letting it allocate.
    #[arg(long)]
    caller_allocated: bool,
}

fn load_settings(opts: &Opts) -> Result<Settings> {
    let mut settings = match &opts.settings {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .map_err(|err| Error::Other(format!("{}: {err}", path.display())))?;
            Settings::from_json(&json)?
        }
        None => Settings::default(),
    };
    if opts.caller_allocated {
        settings.buffer_mode = BufferMode::CallerAllocated;
    }
    Ok(settings)
}

fn main() -> Result<()> {
    common::setup_logging(env!("CARGO_CRATE_NAME"));
    let opts = Opts::parse();
    let settings = load_settings(&opts)?;
    let context = EngineContext::with_settings(Arc::new(LoopbackEngine::new()), settings)?;
    let timeout = context.settings().port_timeout();

    let clock = MediaClock::open(&context)?;
    clock.stop()?;
    clock.reset(true, false)?;
    clock.state_execute()?;

    let decoder = Component::new(&context, "video_decode");
    let render = Component::new(&context, "video_render");
    decoder.init()?;
    render.init()?;
    decoder.allocate_input_buffers(context.settings().buffer_mode)?;

    let mut link = Link::new(&decoder, &render)?;
    link.establish(true, true)?;
    decoder.set_state(State::Executing)?;
    render.set_state(State::Executing)?;
    clock.start(0)?;

    for frame in 0..opts.frames {
        // A timed-out acquire is back-pressure; only a dead decoder ends the feed.
        let mut buffer = loop {
            if let Some(buffer) = decoder.acquire_input_buffer(timeout) {
                break buffer;
            }
            if decoder.bad_state() {
                return Err(Error::Fatal);
            }
            debug!(frame, "Decoder input full, retrying");
        };
        let pts = i64::from(frame) * opts.frame_interval_us;
        buffer.fill(format!("frame {frame}").as_bytes());
        buffer.set_timestamp(pts);
        if frame + 1 == opts.frames {
            buffer.set_flags(BufferFlags::END_OF_STREAM);
        }
        decoder.empty_this_buffer(buffer)?;
        clock.set_media_time(pts)?;
    }

    if opts.frames > 0 {
        render.wait_for_event(EventKind::BufferFlag, timeout)?;
    }
    info!(
        frames = opts.frames,
        eos = render.is_eos(),
        media_time = clock.get_media_time()?,
        "Pipeline drained"
    );

    link.flush()?;
    link.de_establish()?;
    drop(link);
    decoder.deinit()?;
    render.deinit()?;
    clock.state_idle()?;
    clock.deinit()?;
    Ok(())
}
