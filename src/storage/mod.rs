//! Output index abstraction layer
//!
//! This module provides the trait the engine uses to query outputs and to
//! arbitrate reservations, plus an in-memory backend. Persistent backends
//! live outside the engine and implement [`OutputIndex`] directly.

pub mod memory;
pub mod output_index;
pub mod output_status;

pub use memory::*;
pub use output_index::*;
pub use output_status::*;
