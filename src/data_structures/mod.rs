//! Core data types shared by every engine component

pub mod denomination;
pub mod output;
pub mod spend_plan;

pub use denomination::*;
pub use output::*;
pub use spend_plan::*;
