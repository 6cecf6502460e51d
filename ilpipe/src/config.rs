// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Runtime settings shared by every component created from a context.
//!
//! Settings are plain data: they can be built in code, deserialized from JSON
//! and are carried by [`crate::EngineContext`].

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Result;

/// Who owns the memory behind a port's buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferMode {
    /// The engine allocates the buffer memory (`allocate_buffer`).
    #[default]
    EngineAllocated,
    /// The framework allocates aligned memory and lends it to the engine (`use_buffer`).
    CallerAllocated,
}

/// Timeouts and defaults applied by components.
///
/// # Examples
///
/// ```
/// use ilpipe::config::Settings;
///
/// # fn main() -> Result<(), ilpipe::Error> {
/// let settings = Settings::from_json(r#"{ "command_timeout_ms": 250 }"#)?;
/// assert_eq!(settings.command_timeout().as_millis(), 250);
/// assert_eq!(settings.port_timeout_ms, Settings::default().port_timeout_ms);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Budget for a state-set or flush command to complete.
    pub command_timeout_ms: u64,
    /// Budget for a port enable/disable command to complete.
    pub port_timeout_ms: u64,
    /// Budget for every buffer to come back to its pool during teardown.
    pub drain_timeout_ms: u64,
    /// Buffer mode used when a caller does not pick one explicitly.
    pub buffer_mode: BufferMode,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            command_timeout_ms: 1000,
            port_timeout_ms: 1000,
            drain_timeout_ms: 1000,
            buffer_mode: BufferMode::EngineAllocated,
        }
    }
}

impl Settings {
    /// Parses settings from JSON; missing fields keep their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn port_timeout(&self) -> Duration {
        Duration::from_millis(self.port_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn buffer_mode_parses_snake_case() {
        let settings = Settings::from_json(r#"{ "buffer_mode": "caller_allocated" }"#).unwrap();
        assert_eq!(settings.buffer_mode, BufferMode::CallerAllocated);
        assert_eq!(settings.command_timeout_ms, 1000);
    }

    #[test]
    fn malformed_json_is_reported() {
        assert!(matches!(
            Settings::from_json("{ not json"),
            Err(crate::Error::Json(_))
        ));
    }
}
