// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Common utilities shared across examples.

use tracing_subscriber::EnvFilter;

/// Initializes tracing subscriber for examples.
///
/// Without `RUST_LOG`, logs INFO globally and DEBUG for the framework and
/// for the example binary `example`, so component and link lifecycle
/// messages show up in demo runs.
pub fn setup_logging(example: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("info,ilpipe=debug,{example}=debug")));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}
