//! Observability events for workflow runs.
//!
//! The runner emits an [`Event`] at every significant point (node start,
//! node completion, log append, approval request, run end). Events fan out
//! synchronously to registered [`EventSink`]s and into a channel consumed
//! via [`EventBus::subscribe`]. This realizes the engine's node-lifecycle
//! callbacks as an event stream.

pub mod bus;
pub mod emitter;
pub mod event;

pub use bus::{EventBus, EventSink, EventStream, MemorySink, StdOutSink};
pub use emitter::{EmitterError, EventEmitter, NullEmitter};
pub use event::Event;
