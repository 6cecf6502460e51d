// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Error types for component, link and clock operations.
//!
//! This module maps raw engine status codes to idiomatic Rust error enums and
//! adds the framework-level failures (fatal resource state, teardown
//! interruption, missing engine handle).

use ilpipe_sys::Status;

/// Convenience result type using [`Error`] as the error variant.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors that can occur when driving components through the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An unknown or unrecognized engine status code.
    #[error("Unknown error: {0:#x}")]
    Unknown(Status),

    /// The engine ran out of resources; the component is unusable afterwards.
    #[error("Insufficient resources")]
    InsufficientResources,

    /// The engine reported an unspecified failure.
    #[error("Undefined engine error")]
    Undefined,

    /// No component is registered under the requested role name.
    #[error("Component not found")]
    ComponentNotFound,

    /// A parameter or config passed to the engine was rejected.
    #[error("Bad parameter")]
    BadParameter,

    /// The engine does not implement the requested operation.
    #[error("Not implemented")]
    NotImplemented,

    /// The component is in the invalid state.
    #[error("Invalid state")]
    InvalidState,

    /// The engine could not make sense of the submitted stream.
    #[error("Stream corrupt")]
    StreamCorrupt,

    /// The two ports of a link cannot be connected.
    #[error("Ports not compatible")]
    PortsNotCompatible,

    /// Resources held by the component were reclaimed by the engine.
    #[error("Resources lost")]
    ResourcesLost,

    /// The component is not ready to accept the request.
    #[error("Not ready")]
    NotReady,

    /// An expected command, event or buffer did not arrive in time.
    #[error("Timeout")]
    Timeout,

    /// The requested state transition is already in effect.
    #[error("Same state")]
    SameState,

    /// The requested state transition is not allowed from the current state.
    #[error("Incorrect state transition")]
    IncorrectStateTransition,

    /// The operation is not allowed in the current state.
    #[error("Incorrect state operation")]
    IncorrectStateOperation,

    /// The engine does not support the requested setting.
    #[error("Unsupported setting")]
    UnsupportedSetting,

    /// The engine does not know the requested parameter or config index.
    #[error("Unsupported index")]
    UnsupportedIndex,

    /// The port index does not belong to the component.
    #[error("Bad port index")]
    BadPortIndex,

    /// The port has no buffers allocated.
    #[error("Port unpopulated")]
    PortUnpopulated,

    /// The underlying hardware failed.
    #[error("Hardware error")]
    Hardware,

    /// The component is in the sticky fatal resource-error state.
    #[error("Component is in a fatal resource-error state")]
    Fatal,

    /// The operation was interrupted because the component is being torn down.
    #[error("Interrupted by teardown")]
    Flushing,

    /// The component has no engine handle (never initialized, or de-initialized).
    #[error("Component is not initialized")]
    NotInitialized,

    /// A generic error for framework-level failures not mapped to engine codes.
    #[error("Other error: {0}")]
    Other(String),

    /// Failed to parse settings.
    #[error("Settings: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Converts an engine status code to a Rust [`Result`].
    ///
    /// - `Ok(())` if `status == STATUS_OK`
    /// - `Err(Error::...)` for any error status code
    ///
    /// ```ignore
    /// let status = engine.send_command(handle, command);
    /// Error::from_status(status)?;
    /// ```
    pub fn from_status(status: Status) -> Result<()> {
        match status {
            ilpipe_sys::STATUS_OK => Ok(()),
            other => Err(Error::from_code(other)),
        }
    }

    /// Maps a non-OK status code to its error variant.
    pub(crate) fn from_code(status: Status) -> Error {
        match status {
            ilpipe_sys::ERR_INSUFFICIENT_RESOURCES => Error::InsufficientResources,
            ilpipe_sys::ERR_UNDEFINED => Error::Undefined,
            ilpipe_sys::ERR_INVALID_COMPONENT_NAME | ilpipe_sys::ERR_COMPONENT_NOT_FOUND => {
                Error::ComponentNotFound
            }
            ilpipe_sys::ERR_BAD_PARAMETER => Error::BadParameter,
            ilpipe_sys::ERR_NOT_IMPLEMENTED => Error::NotImplemented,
            ilpipe_sys::ERR_INVALID_STATE => Error::InvalidState,
            ilpipe_sys::ERR_STREAM_CORRUPT => Error::StreamCorrupt,
            ilpipe_sys::ERR_PORTS_NOT_COMPATIBLE | ilpipe_sys::ERR_TUNNELING_UNSUPPORTED => {
                Error::PortsNotCompatible
            }
            ilpipe_sys::ERR_RESOURCES_LOST => Error::ResourcesLost,
            ilpipe_sys::ERR_NOT_READY => Error::NotReady,
            ilpipe_sys::ERR_TIMEOUT => Error::Timeout,
            ilpipe_sys::ERR_SAME_STATE => Error::SameState,
            ilpipe_sys::ERR_INCORRECT_STATE_TRANSITION => Error::IncorrectStateTransition,
            ilpipe_sys::ERR_INCORRECT_STATE_OPERATION => Error::IncorrectStateOperation,
            ilpipe_sys::ERR_UNSUPPORTED_SETTING => Error::UnsupportedSetting,
            ilpipe_sys::ERR_UNSUPPORTED_INDEX => Error::UnsupportedIndex,
            ilpipe_sys::ERR_BAD_PORT_INDEX => Error::BadPortIndex,
            ilpipe_sys::ERR_PORT_UNPOPULATED => Error::PortUnpopulated,
            ilpipe_sys::ERR_HARDWARE => Error::Hardware,
            other => Error::Unknown(other),
        }
    }

    /// Returns `true` for status codes that leave a component permanently unusable.
    pub fn is_fatal_status(status: Status) -> bool {
        matches!(
            status,
            ilpipe_sys::ERR_INSUFFICIENT_RESOURCES
                | ilpipe_sys::ERR_STREAM_CORRUPT
                | ilpipe_sys::ERR_RESOURCES_LOST
                | ilpipe_sys::ERR_HARDWARE
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_status_maps_to_ok() {
        assert!(Error::from_status(ilpipe_sys::STATUS_OK).is_ok());
    }

    #[test]
    fn known_codes_map_to_variants() {
        assert!(matches!(
            Error::from_status(ilpipe_sys::ERR_SAME_STATE),
            Err(Error::SameState)
        ));
        assert!(matches!(
            Error::from_status(ilpipe_sys::ERR_TIMEOUT),
            Err(Error::Timeout)
        ));
        assert!(matches!(
            Error::from_status(0x8000_1FFF),
            Err(Error::Unknown(0x8000_1FFF))
        ));
    }

    #[test]
    fn fatal_classification() {
        assert!(Error::is_fatal_status(ilpipe_sys::ERR_INSUFFICIENT_RESOURCES));
        assert!(Error::is_fatal_status(ilpipe_sys::ERR_STREAM_CORRUPT));
        assert!(!Error::is_fatal_status(ilpipe_sys::ERR_SAME_STATE));
        assert!(!Error::is_fatal_status(ilpipe_sys::ERR_PORT_UNPOPULATED));
    }
}
