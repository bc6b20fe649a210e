//! Mock event listener for testing scenarios
//!
//! Captures every received event so tests can assert on the sequence of
//! automint status changes and plan lifecycle events.
//!
//! ```rust,ignore
//! let mock = MockEventListener::new();
//! let captured = mock.get_captured_events();
//! dispatcher.register(Box::new(mock))?;
//! // ... run a tick ...
//! assert_eq!(captured.lock().unwrap().len(), 2);
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::events::{EngineEvent, EventListener};

pub struct MockEventListener {
    name: &'static str,
    captured_events: Arc<Mutex<Vec<EngineEvent>>>,
    capture_only: Option<Vec<&'static str>>,
    fail_always: bool,
}

impl Default for MockEventListener {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEventListener {
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> MockEventListenerBuilder {
        MockEventListenerBuilder::default()
    }

    /// Handle to the captured events, valid after the listener is registered
    pub fn get_captured_events(&self) -> Arc<Mutex<Vec<EngineEvent>>> {
        Arc::clone(&self.captured_events)
    }
}

#[async_trait]
impl EventListener for MockEventListener {
    async fn handle_event(
        &mut self,
        event: &EngineEvent,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.fail_always {
            return Err(format!("mock failure on {}", event.event_type()).into());
        }
        self.captured_events
            .lock()
            .map_err(|e| e.to_string())?
            .push(event.clone());
        Ok(())
    }

    fn name(&self) -> &'static str {
        self.name
    }

    fn wants_event(&self, event: &EngineEvent) -> bool {
        self.capture_only
            .as_ref()
            .map(|types| types.contains(&event.event_type()))
            .unwrap_or(true)
    }
}

pub struct MockEventListenerBuilder {
    name: &'static str,
    capture_only: Option<Vec<&'static str>>,
    fail_always: bool,
}

impl Default for MockEventListenerBuilder {
    fn default() -> Self {
        Self {
            name: "MockEventListener",
            capture_only: None,
            fail_always: false,
        }
    }
}

impl MockEventListenerBuilder {
    pub fn name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    /// Capture only events whose [`EngineEvent::event_type`] is listed
    pub fn capture_only(mut self, event_types: Vec<&'static str>) -> Self {
        self.capture_only = Some(event_types);
        self
    }

    /// Return an error from every call
    pub fn fail_always(mut self) -> Self {
        self.fail_always = true;
        self
    }

    pub fn build(self) -> MockEventListener {
        MockEventListener {
            name: self.name,
            captured_events: Arc::new(Mutex::new(Vec::new())),
            capture_only: self.capture_only,
            fail_always: self.fail_always,
        }
    }
}
