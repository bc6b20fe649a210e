//! Event system for engine status reporting
//!
//! The automint scheduler and the spend orchestrator publish [`EngineEvent`]s
//! through an [`EventDispatcher`]. Listeners are registered by name and called
//! in registration order; a failing listener is logged and skipped so it can
//! never interrupt a spend or a mint.
//!
//! # Custom Listeners
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use private_spend_engine::events::{EngineEvent, EventListener};
//!
//! struct CustomListener;
//!
//! #[async_trait]
//! impl EventListener for CustomListener {
//!     async fn handle_event(
//!         &mut self,
//!         event: &EngineEvent,
//!     ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!         println!("Received event: {}", event.event_type());
//!         Ok(())
//!     }
//! }
//! ```

use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, warn};

pub mod listeners;
pub mod types;

pub use types::*;

/// Dispatcher shared between the scheduler and the orchestrator
pub type SharedDispatcher = Arc<Mutex<EventDispatcher>>;

/// Errors that can occur during event dispatcher operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventDispatcherError {
    /// Attempted to register a listener with a duplicate name
    DuplicateListener(String),
    /// Attempted to register more listeners than the configured maximum
    TooManyListeners { current: usize, max: usize },
    /// Listener name is empty
    InvalidListenerName(String),
}

impl fmt::Display for EventDispatcherError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventDispatcherError::DuplicateListener(name) => {
                write!(f, "Listener with name '{}' is already registered", name)
            }
            EventDispatcherError::TooManyListeners { current, max } => write!(
                f,
                "Cannot register listener: maximum of {} listeners allowed, currently have {}",
                max, current
            ),
            EventDispatcherError::InvalidListenerName(name) => {
                write!(f, "Invalid listener name: '{}'", name)
            }
        }
    }
}

impl Error for EventDispatcherError {}

/// Statistics about event processing
#[derive(Debug, Default, Clone)]
pub struct EventStats {
    pub total_events_dispatched: usize,
    pub total_listener_calls: usize,
    pub total_listener_errors: usize,
    pub events_by_type: HashMap<String, usize>,
    pub errors_by_listener: HashMap<String, usize>,
}

/// Trait for handling engine events asynchronously
///
/// Errors are logged by the dispatcher and do not reach other listeners.
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn handle_event(
        &mut self,
        event: &EngineEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;

    /// Name used for registration and logging
    fn name(&self) -> &'static str {
        "UnnamedListener"
    }

    /// Skip events this listener does not care about
    fn wants_event(&self, _event: &EngineEvent) -> bool {
        true
    }
}

/// Delivers events to registered listeners in registration order
#[derive(Default)]
pub struct EventDispatcher {
    listeners: Vec<Box<dyn EventListener>>,
    registered_names: HashSet<String>,
    max_listeners: Option<usize>,
    stats: EventStats,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a dispatcher that refuses more than `max_listeners` listeners
    pub fn new_with_limit(max_listeners: usize) -> Self {
        Self {
            max_listeners: Some(max_listeners),
            ..Self::default()
        }
    }

    pub fn shared(self) -> SharedDispatcher {
        Arc::new(Mutex::new(self))
    }

    /// Register an event listener under its unique name
    pub fn register(
        &mut self,
        listener: Box<dyn EventListener>,
    ) -> Result<(), EventDispatcherError> {
        let listener_name = listener.name().to_string();
        if listener_name.trim().is_empty() {
            return Err(EventDispatcherError::InvalidListenerName(listener_name));
        }
        if self.registered_names.contains(&listener_name) {
            return Err(EventDispatcherError::DuplicateListener(listener_name));
        }
        if let Some(max) = self.max_listeners {
            if self.listeners.len() >= max {
                return Err(EventDispatcherError::TooManyListeners {
                    current: self.listeners.len(),
                    max,
                });
            }
        }

        debug!(listener = %listener_name, "Registering event listener");
        self.registered_names.insert(listener_name);
        self.listeners.push(listener);
        Ok(())
    }

    /// Dispatch an event to every interested listener
    pub async fn dispatch(&mut self, event: EngineEvent) {
        let event_type = event.event_type();
        self.stats.total_events_dispatched += 1;
        *self
            .stats
            .events_by_type
            .entry(event_type.to_string())
            .or_insert(0) += 1;

        for listener in &mut self.listeners {
            if !listener.wants_event(&event) {
                continue;
            }
            self.stats.total_listener_calls += 1;
            if let Err(e) = listener.handle_event(&event).await {
                let name = listener.name();
                self.stats.total_listener_errors += 1;
                *self
                    .stats
                    .errors_by_listener
                    .entry(name.to_string())
                    .or_insert(0) += 1;
                warn!(listener = name, event = event_type, error = %e, "Event listener failed");
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn get_stats(&self) -> EventStats {
        self.stats.clone()
    }
}

/// Dispatch through an optional shared dispatcher
pub(crate) async fn emit(dispatcher: Option<&SharedDispatcher>, event: EngineEvent) {
    if let Some(dispatcher) = dispatcher {
        dispatcher.lock().await.dispatch(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::listeners::MockEventListener;
    use super::*;

    #[tokio::test]
    async fn failing_listener_does_not_block_others() {
        let mut dispatcher = EventDispatcher::new();
        let failing = MockEventListener::builder().name("failing").fail_always().build();
        let healthy = MockEventListener::new();
        let captured = healthy.get_captured_events();
        dispatcher.register(Box::new(failing)).unwrap();
        dispatcher.register(Box::new(healthy)).unwrap();

        dispatcher
            .dispatch(EngineEvent::Automint(AutomintStatus::Idle))
            .await;

        assert_eq!(captured.lock().unwrap().len(), 1);
        let stats = dispatcher.get_stats();
        assert_eq!(stats.total_listener_errors, 1);
        assert_eq!(stats.errors_by_listener.get("failing"), Some(&1));
    }

    #[tokio::test]
    async fn tracing_listener_handles_every_event_kind() {
        let mut dispatcher = EventDispatcher::new();
        dispatcher
            .register(Box::new(listeners::TracingListener::new()))
            .unwrap();

        for event in [
            EngineEvent::Automint(AutomintStatus::Idle),
            EngineEvent::Automint(AutomintStatus::Failed {
                reason: "wallet locked".to_string(),
            }),
            EngineEvent::PlanAborted { plan_id: 7 },
        ] {
            dispatcher.dispatch(event).await;
        }

        let stats = dispatcher.get_stats();
        assert_eq!(stats.total_events_dispatched, 3);
        assert_eq!(stats.total_listener_errors, 0);
    }

    #[test]
    fn registration_is_validated() {
        let mut dispatcher = EventDispatcher::new_with_limit(1);
        dispatcher.register(Box::new(MockEventListener::new())).unwrap();

        let err = dispatcher
            .register(Box::new(MockEventListener::new()))
            .unwrap_err();
        assert!(matches!(err, EventDispatcherError::DuplicateListener(_)));

        let other = MockEventListener::builder().name("other").build();
        let err = dispatcher.register(Box::new(other)).unwrap_err();
        assert_eq!(
            err,
            EventDispatcherError::TooManyListeners { current: 1, max: 1 }
        );

        let blank = MockEventListener::builder().name(" ").build();
        let err = EventDispatcher::new().register(Box::new(blank)).unwrap_err();
        assert!(matches!(err, EventDispatcherError::InvalidListenerName(_)));
    }
}
