// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Integration tests for tunnels between components.

use std::{sync::Arc, time::Duration};

use ilpipe::{
    BufferFlags, Component, EngineContext, Error, Link,
    config::BufferMode,
    engine::{Command, EventKind, State, loopback::LoopbackEngine},
};

/// Ensures logging is initialized only once across all tests.
static LOG_ONCE: std::sync::Once = std::sync::Once::new();

const WAIT: Duration = Duration::from_secs(2);

fn setup_test() -> (Arc<LoopbackEngine>, EngineContext) {
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
    (engine, context)
}

fn count(engine: &LoopbackEngine, component: &Component, command: Command) -> usize {
    engine
        .commands(component.handle().unwrap())
        .into_iter()
        .filter(|sent| *sent == command)
        .count()
}

#[test]
fn link_requires_initialized_components() {
    let (_engine, context) = setup_test();
    let decoder = Component::new(&context, "video_decode");
    let render = Component::new(&context, "video_render");
    decoder.init().unwrap();
    assert!(matches!(
        Link::new(&decoder, &render),
        Err(Error::NotInitialized)
    ));
}

#[test]
fn establish_wires_ports_and_idles_both_sides() {
    let (engine, context) = setup_test();
    let decoder = Component::new(&context, "video_decode");
    let render = Component::new(&context, "video_render");
    decoder.init().unwrap();
    render.init().unwrap();

    let mut link = Link::new(&decoder, &render).unwrap();
    assert_eq!(link.src_port(), 131);
    assert_eq!(link.dst_port(), 90);
    link.establish(true, true).unwrap();

    assert!(link.is_established());
    assert_eq!(decoder.state().unwrap(), State::Idle);
    assert_eq!(render.state().unwrap(), State::Idle);
    assert!(decoder.port_definition(131).unwrap().enabled);
    assert!(render.port_definition(90).unwrap().enabled);
    assert_eq!(count(&engine, &render, Command::PortEnable(90)), 1);

    link.de_establish().unwrap();
    assert!(!link.is_established());
    assert!(!decoder.port_definition(131).unwrap().enabled);
    assert!(!render.port_definition(90).unwrap().enabled);

    // De-establishing twice is a no-op.
    link.de_establish().unwrap();
    assert_eq!(count(&engine, &render, Command::PortDisable(90)), 2);
}

#[test]
fn data_flows_through_the_tunnel() {
    let (_engine, context) = setup_test();
    let decoder = Component::new(&context, "video_decode");
    let render = Component::new(&context, "video_render");
    decoder.init().unwrap();
    render.init().unwrap();
    decoder
        .allocate_input_buffers(BufferMode::EngineAllocated)
        .unwrap();

    let mut link = Link::new(&decoder, &render).unwrap();
    link.establish(true, true).unwrap();
    decoder.set_state(State::Executing).unwrap();
    render.set_state(State::Executing).unwrap();

    let mut buffer = decoder.acquire_input_buffer(WAIT).unwrap();
    buffer.fill(b"frame");
    buffer.set_flags(BufferFlags::END_OF_STREAM);
    decoder.empty_this_buffer(buffer).unwrap();

    render.wait_for_event(EventKind::BufferFlag, WAIT).unwrap();
    assert!(render.is_eos());
    assert!(!decoder.is_eos());

    link.flush().unwrap();
    link.de_establish().unwrap();
}

#[test]
fn teardown_survives_released_destination() {
    let (engine, context) = setup_test();
    let decoder = Component::new(&context, "video_decode");
    let render = Component::new(&context, "video_render");
    decoder.init().unwrap();
    render.init().unwrap();

    let mut link = Link::new(&decoder, &render).unwrap();
    link.establish(true, true).unwrap();

    render.deinit().unwrap();
    assert!(!render.is_initialized());

    link.de_establish().unwrap();
    assert!(!link.is_established());
    assert!(!decoder.port_definition(131).unwrap().enabled);
    assert_eq!(count(&engine, &decoder, Command::PortDisable(131)), 2);
}

#[test]
fn dropping_an_established_link_tears_it_down() {
    let (engine, context) = setup_test();
    let decoder = Component::new(&context, "video_decode");
    let render = Component::new(&context, "video_render");
    decoder.init().unwrap();
    render.init().unwrap();

    {
        let mut link = Link::new(&decoder, &render).unwrap();
        link.establish(true, false).unwrap();
    }

    assert!(!render.port_definition(90).unwrap().enabled);
    assert_eq!(count(&engine, &render, Command::PortDisable(90)), 2);

    // The ports can be wired again after teardown.
    let mut link = Link::new(&decoder, &render).unwrap();
    link.establish(true, true).unwrap();
}

#[test]
fn clock_ports_link_explicitly() {
    let (_engine, context) = setup_test();
    let clock = Component::new(&context, "clock");
    let render = Component::new(&context, "video_render");
    clock.init().unwrap();
    render.init().unwrap();

    let mut link = Link::with_ports(&clock, 80, &render, 91);
    link.establish(true, true).unwrap();
    assert!(clock.port_definition(80).unwrap().enabled);
    assert!(render.port_definition(91).unwrap().enabled);
    link.de_establish().unwrap();
}
