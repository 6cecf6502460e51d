// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Smoke test for the raw ABI vocabulary.

/// Status codes the framework dispatches on must not collide.
#[test]
fn status_codes_are_distinct() {
    let mut codes = vec![
        ilpipe_sys::STATUS_OK,
        ilpipe_sys::ERR_INSUFFICIENT_RESOURCES,
        ilpipe_sys::ERR_UNDEFINED,
        ilpipe_sys::ERR_COMPONENT_NOT_FOUND,
        ilpipe_sys::ERR_BAD_PARAMETER,
        ilpipe_sys::ERR_STREAM_CORRUPT,
        ilpipe_sys::ERR_TIMEOUT,
        ilpipe_sys::ERR_SAME_STATE,
        ilpipe_sys::ERR_INCORRECT_STATE_TRANSITION,
        ilpipe_sys::ERR_PORT_UNPOPULATED,
    ];
    let len = codes.len();
    codes.sort_unstable();
    codes.dedup();
    assert_eq!(codes.len(), len);
}

#[test]
fn buffer_flags_are_single_bits() {
    for flag in [
        ilpipe_sys::BUFFERFLAG_EOS,
        ilpipe_sys::BUFFERFLAG_STARTTIME,
        ilpipe_sys::BUFFERFLAG_ENDOFFRAME,
        ilpipe_sys::BUFFERFLAG_TIME_UNKNOWN,
    ] {
        assert_eq!(flag.count_ones(), 1);
    }
}
