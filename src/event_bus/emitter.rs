//! The emitter seam node executors and the runner publish through.

use std::fmt;
use thiserror::Error;

use super::event::Event;

/// Abstract event emitter; cheap to clone behind an `Arc`.
pub trait EventEmitter: Send + Sync + fmt::Debug {
    /// Emit an event synchronously without blocking the dispatch loop.
    fn emit(&self, event: Event) -> Result<(), EmitterError>;
}

/// Errors that can occur when emitting an event.
#[derive(Debug, Error)]
pub enum EmitterError {
    #[error("event channel closed")]
    Closed,
    #[error("event emission failed: {0}")]
    Other(String),
}

/// Emitter that drops every event; used when no bus is attached.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullEmitter;

impl EventEmitter for NullEmitter {
    fn emit(&self, _event: Event) -> Result<(), EmitterError> {
        Ok(())
    }
}
