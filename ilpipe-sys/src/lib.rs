// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! # ilpipe-sys: Raw engine ABI vocabulary
//!
//! This crate holds the numeric codes exchanged across the boundary between
//! the `ilpipe` framework and a hardware processing engine: status codes,
//! component states, commands, event kinds, buffer flags and the clock
//! configuration enumerations.
//!
//! ## Usage
//!
//! **Most users should NOT use this crate directly.** Use the safe `ilpipe`
//! crate instead, which maps these codes to typed enums and `Result`s.
//!
//! This crate is only needed for:
//! - Implementing an engine adapter that speaks raw codes
//! - Matching on status codes not yet covered by `ilpipe::Error`

#![allow(clippy::unreadable_literal)]

/// Raw status code returned by every engine call.
pub type Status = u32;

pub const STATUS_OK: Status = 0;
pub const ERR_INSUFFICIENT_RESOURCES: Status = 0x8000_1000;
pub const ERR_UNDEFINED: Status = 0x8000_1001;
pub const ERR_INVALID_COMPONENT_NAME: Status = 0x8000_1002;
pub const ERR_COMPONENT_NOT_FOUND: Status = 0x8000_1003;
pub const ERR_BAD_PARAMETER: Status = 0x8000_1005;
pub const ERR_NOT_IMPLEMENTED: Status = 0x8000_1006;
pub const ERR_UNDERFLOW: Status = 0x8000_1007;
pub const ERR_OVERFLOW: Status = 0x8000_1008;
pub const ERR_HARDWARE: Status = 0x8000_1009;
pub const ERR_INVALID_STATE: Status = 0x8000_100A;
pub const ERR_STREAM_CORRUPT: Status = 0x8000_100B;
pub const ERR_PORTS_NOT_COMPATIBLE: Status = 0x8000_100C;
pub const ERR_RESOURCES_LOST: Status = 0x8000_100D;
pub const ERR_NO_MORE: Status = 0x8000_100E;
pub const ERR_VERSION_MISMATCH: Status = 0x8000_100F;
pub const ERR_NOT_READY: Status = 0x8000_1010;
pub const ERR_TIMEOUT: Status = 0x8000_1011;
pub const ERR_SAME_STATE: Status = 0x8000_1012;
pub const ERR_RESOURCES_PREEMPTED: Status = 0x8000_1013;
pub const ERR_INCORRECT_STATE_TRANSITION: Status = 0x8000_1017;
pub const ERR_INCORRECT_STATE_OPERATION: Status = 0x8000_1018;
pub const ERR_UNSUPPORTED_SETTING: Status = 0x8000_1019;
pub const ERR_UNSUPPORTED_INDEX: Status = 0x8000_101A;
pub const ERR_BAD_PORT_INDEX: Status = 0x8000_101B;
pub const ERR_PORT_UNPOPULATED: Status = 0x8000_101C;
pub const ERR_COMPONENT_SUSPENDED: Status = 0x8000_101D;
pub const ERR_DYNAMIC_RESOURCES_UNAVAILABLE: Status = 0x8000_101E;
pub const ERR_FORMAT_NOT_DETECTED: Status = 0x8000_1020;
pub const ERR_TUNNELING_UNSUPPORTED: Status = 0x8000_1023;

/// Component lifecycle states.
pub const STATE_INVALID: u32 = 0;
pub const STATE_LOADED: u32 = 1;
pub const STATE_IDLE: u32 = 2;
pub const STATE_EXECUTING: u32 = 3;
pub const STATE_PAUSE: u32 = 4;
pub const STATE_WAIT_FOR_RESOURCES: u32 = 5;

/// Commands accepted by `send_command`.
pub const COMMAND_STATE_SET: u32 = 0;
pub const COMMAND_FLUSH: u32 = 1;
pub const COMMAND_PORT_DISABLE: u32 = 2;
pub const COMMAND_PORT_ENABLE: u32 = 3;
pub const COMMAND_MARK_BUFFER: u32 = 4;

/// Asynchronous notification kinds delivered through the event callback.
pub const EVENT_CMD_COMPLETE: u32 = 0;
pub const EVENT_ERROR: u32 = 1;
pub const EVENT_MARK: u32 = 2;
pub const EVENT_PORT_SETTINGS_CHANGED: u32 = 3;
pub const EVENT_BUFFER_FLAG: u32 = 4;
pub const EVENT_RESOURCES_ACQUIRED: u32 = 5;
pub const EVENT_COMPONENT_RESUMED: u32 = 6;
pub const EVENT_DYNAMIC_RESOURCES_AVAILABLE: u32 = 7;
pub const EVENT_PORT_FORMAT_DETECTED: u32 = 8;
pub const EVENT_PARAM_OR_CONFIG_CHANGED: u32 = 0x7F00_0001;

/// Buffer header flags.
pub const BUFFERFLAG_EOS: u32 = 0x0000_0001;
pub const BUFFERFLAG_STARTTIME: u32 = 0x0000_0002;
pub const BUFFERFLAG_DECODEONLY: u32 = 0x0000_0004;
pub const BUFFERFLAG_DATACORRUPT: u32 = 0x0000_0008;
pub const BUFFERFLAG_ENDOFFRAME: u32 = 0x0000_0010;
pub const BUFFERFLAG_SYNCFRAME: u32 = 0x0000_0020;
pub const BUFFERFLAG_EXTRADATA: u32 = 0x0000_0040;
pub const BUFFERFLAG_CODECCONFIG: u32 = 0x0000_0080;
pub const BUFFERFLAG_TIME_UNKNOWN: u32 = 0x0000_0100;

/// Port index addressing every port of a component.
pub const ALL_PORTS: u32 = 0xFFFF_FFFF;

/// Port domains queried at init to discover port numbering.
pub const DOMAIN_AUDIO: u32 = 0;
pub const DOMAIN_VIDEO: u32 = 1;
pub const DOMAIN_IMAGE: u32 = 2;
pub const DOMAIN_OTHER: u32 = 3;

/// Port directions.
pub const DIR_INPUT: u32 = 0;
pub const DIR_OUTPUT: u32 = 1;

/// Media clock states.
pub const CLOCK_STATE_RUNNING: u32 = 0;
pub const CLOCK_STATE_WAITING_FOR_START_TIME: u32 = 1;
pub const CLOCK_STATE_STOPPED: u32 = 2;

/// Media clock reference sources.
pub const REF_CLOCK_NONE: u32 = 0;
pub const REF_CLOCK_AUDIO: u32 = 1;
pub const REF_CLOCK_VIDEO: u32 = 2;

/// Clock wait-mask bits, one per clock output port.
pub const CLOCK_PORT0: u32 = 0x0000_0001;
pub const CLOCK_PORT1: u32 = 0x0000_0002;
pub const CLOCK_PORT2: u32 = 0x0000_0004;
pub const CLOCK_PORT3: u32 = 0x0000_0008;
pub const CLOCK_PORT4: u32 = 0x0000_0010;
pub const CLOCK_PORT5: u32 = 0x0000_0020;
