use tokio::sync::broadcast;

/// Timing record for a single device call
///
/// `wait_ms` measures how long the call sat queued before the I/O loop
/// picked it up, `run_ms` the device call itself.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OperationEvent {
    /// Device operation name (`connect`, `get_status`, `start`, ...)
    pub operation: &'static str,
    /// Milliseconds spent waiting for the I/O loop
    pub wait_ms: f64,
    /// Milliseconds spent executing the device call
    pub run_ms: f64,
    /// Total milliseconds from enqueue to completion
    pub total_ms: f64,
    /// Whether the call succeeded
    pub success: bool,
}

/// Failure record for a device call
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorEvent {
    /// Device operation name
    pub operation: &'static str,
    /// Error text
    pub message: String,
}

/// Observability event emitted by the engine
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// A device call completed (successfully or not)
    Operation(OperationEvent),
    /// A device call failed
    Error(ErrorEvent),
}

/// Best-effort broadcast channel for [`EngineEvent`]s
///
/// Publishing never blocks and never fails: events sent while no subscriber
/// is attached, or past a lagging subscriber's buffer, are simply dropped.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Attach a new subscriber
    ///
    /// Subscribers only observe events published after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event, dropping it if nobody is listening
    pub fn publish(&self, event: EngineEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let bus = EventBus::default();
        bus.publish(EngineEvent::Error(ErrorEvent {
            operation: "start",
            message: "connection reset".to_string(),
        }));
    }

    #[tokio::test]
    async fn test_subscriber_receives_operation_event() {
        let bus = EventBus::default();
        let mut receiver = bus.subscribe();

        bus.publish(EngineEvent::Operation(OperationEvent {
            operation: "set_speed",
            wait_ms: 0.2,
            run_ms: 11.0,
            total_ms: 11.2,
            success: true,
        }));

        match receiver.recv().await.unwrap() {
            EngineEvent::Operation(event) => {
                assert_eq!(event.operation, "set_speed");
                assert!(event.success);
            }
            EngineEvent::Error(_) => panic!("expected an operation event"),
        }
    }
}
