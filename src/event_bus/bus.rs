//! Fan-out plumbing: sinks plus a subscribable channel.

use std::fmt;
use std::sync::{Arc, Mutex};

use super::emitter::{EmitterError, EventEmitter};
use super::event::Event;

/// Destination for events, invoked synchronously on emit.
pub trait EventSink: Send + Sync {
    fn handle(&self, event: &Event);
}

/// Sink that prints each event through `tracing`.
#[derive(Debug, Default)]
pub struct StdOutSink;

impl EventSink for StdOutSink {
    fn handle(&self, event: &Event) {
        tracing::info!(target: "agentflow::events", "{event}");
    }
}

/// Sink that captures events in memory, for tests and inspection.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<Event>>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Copy of everything captured so far.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().expect("sink poisoned").clone()
    }
}

impl EventSink for MemorySink {
    fn handle(&self, event: &Event) {
        self.events.lock().expect("sink poisoned").push(event.clone());
    }
}

/// Event fan-out owned by a runner.
///
/// Sinks receive every event synchronously; the channel side buffers
/// events for a subscriber that drains them off-loop.
pub struct EventBus {
    sinks: Mutex<Vec<Arc<dyn EventSink>>>,
    tx: flume::Sender<Event>,
    rx: flume::Receiver<Event>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("queued", &self.rx.len())
            .finish_non_exhaustive()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            sinks: Mutex::new(Vec::new()),
            tx,
            rx,
        }
    }

    #[must_use]
    pub fn with_sink(sink: Arc<dyn EventSink>) -> Self {
        let bus = Self::new();
        bus.add_sink(sink);
        bus
    }

    pub fn add_sink(&self, sink: Arc<dyn EventSink>) {
        self.sinks.lock().expect("sinks poisoned").push(sink);
    }

    /// A cloneable emitter handle for the dispatch loop and executors.
    #[must_use]
    pub fn emitter(&self) -> Arc<dyn EventEmitter> {
        Arc::new(BusEmitter {
            tx: self.tx.clone(),
            sinks: {
                let sinks = self.sinks.lock().expect("sinks poisoned");
                Arc::new(Mutex::new(sinks.clone()))
            },
        })
    }

    /// Stream of events; each event is delivered to one subscriber.
    #[must_use]
    pub fn subscribe(&self) -> EventStream {
        EventStream {
            rx: self.rx.clone(),
        }
    }
}

#[derive(Clone)]
struct BusEmitter {
    tx: flume::Sender<Event>,
    sinks: Arc<Mutex<Vec<Arc<dyn EventSink>>>>,
}

impl fmt::Debug for BusEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusEmitter").finish_non_exhaustive()
    }
}

impl EventEmitter for BusEmitter {
    fn emit(&self, event: Event) -> Result<(), EmitterError> {
        for sink in self.sinks.lock().expect("sinks poisoned").iter() {
            sink.handle(&event);
        }
        self.tx.send(event).map_err(|_| EmitterError::Closed)
    }
}

/// Subscriber side of the bus.
#[derive(Clone)]
pub struct EventStream {
    rx: flume::Receiver<Event>,
}

impl EventStream {
    /// Await the next event; `None` once the bus is gone and drained.
    pub async fn recv(&self) -> Option<Event> {
        self.rx.recv_async().await.ok()
    }

    /// Drain everything currently buffered without waiting.
    pub fn drain(&self) -> Vec<Event> {
        self.rx.try_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExecutionStatus, NodeStatus, NodeType};
    use uuid::Uuid;

    #[test]
    fn sinks_and_stream_both_see_events() {
        let bus = EventBus::new();
        let sink = MemorySink::new();
        bus.add_sink(sink.clone());
        let stream = bus.subscribe();
        let emitter = bus.emitter();

        let run_id = Uuid::new_v4();
        emitter
            .emit(Event::NodeStart {
                run_id,
                node_id: "a".into(),
                node_type: NodeType::Start,
                dispatch: 1,
            })
            .unwrap();
        emitter
            .emit(Event::NodeComplete {
                run_id,
                node_id: "a".into(),
                node_type: NodeType::Start,
                status: NodeStatus::Completed,
                dispatch: 1,
            })
            .unwrap();
        emitter
            .emit(Event::RunFinished {
                run_id,
                status: ExecutionStatus::Completed,
                dispatches: 1,
            })
            .unwrap();

        assert_eq!(sink.snapshot().len(), 3);
        let drained = stream.drain();
        assert_eq!(drained.len(), 3);
        assert!(matches!(drained[2], Event::RunFinished { .. }));
    }
}
