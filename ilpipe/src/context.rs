// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! Engine context management.
//!
//! This module provides [`EngineContext`], the explicit replacement for a
//! process-wide engine init/deinit pair. Every component is created from a
//! context; independent contexts (or fake engines) can coexist in one process.

use std::sync::Arc;

use crate::{Error, Result, config::Settings, engine::Engine};

/// Internal shared state of a context.
///
/// The engine is de-initialized when the last reference is dropped.
struct ContextInner {
    engine: Arc<dyn Engine>,
    settings: Settings,
    initialized: bool,
}

impl ContextInner {
    /// De-initializes the engine immediately, reporting the engine status.
    fn destroy(mut self) -> Result<()> {
        self.initialized = false;
        Error::from_status(self.engine.deinit())
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        if self.initialized
            && let Err(err) = Error::from_status(self.engine.deinit())
        {
            tracing::error!("Failed to de-initialize engine: {:?}", err);
        }
    }
}

/// Entry point for creating components against one engine.
///
/// The context is cheaply cloneable and thread-safe. Components keep a clone,
/// so the engine stays initialized for as long as any component exists.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use ilpipe::{Component, EngineContext, engine::loopback::LoopbackEngine};
///
/// # fn main() -> Result<(), ilpipe::Error> {
/// let context = EngineContext::new(Arc::new(LoopbackEngine::new()))?;
/// let decoder = Component::new(&context, "video_decode");
/// decoder.init()?;
/// decoder.deinit()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct EngineContext {
    inner: Arc<ContextInner>,
}

impl EngineContext {
    /// Initializes `engine` with default [`Settings`].
    pub fn new(engine: Arc<dyn Engine>) -> Result<Self> {
        Self::with_settings(engine, Settings::default())
    }

    /// Initializes `engine` and binds `settings` to every component created from this context.
    ///
    /// # Errors
    ///
    /// Returns the mapped engine status if the engine refuses to initialize.
    pub fn with_settings(engine: Arc<dyn Engine>, settings: Settings) -> Result<Self> {
        Error::from_status(engine.init())?;
        Ok(Self {
            inner: Arc::new(ContextInner {
                engine,
                settings,
                initialized: true,
            }),
        })
    }

    pub fn engine(&self) -> &Arc<dyn Engine> {
        &self.inner.engine
    }

    pub fn settings(&self) -> &Settings {
        &self.inner.settings
    }

    /// Forces immediate de-initialization of the engine.
    ///
    /// # Errors
    ///
    /// Returns an error if components or other clones still hold the context,
    /// or if the engine fails to de-initialize.
    pub fn destroy(self) -> Result<()> {
        let inner = Arc::into_inner(self.inner)
            .ok_or_else(|| Error::Other("Context is still in use.".to_string()))?;
        inner.destroy()
    }
}
