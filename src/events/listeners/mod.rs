//! Built-in event listeners
//!
//! - [`TracingListener`]: forwards events to the `tracing` subscriber
//! - [`MockEventListener`]: captures events for assertions in tests

pub mod mock_listener;
pub mod tracing_listener;

pub use mock_listener::{MockEventListener, MockEventListenerBuilder};
pub use tracing_listener::TracingListener;
