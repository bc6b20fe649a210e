use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data_structures::Output;

/// Lifecycle state of an output as seen by the index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputStatus {
    Available,
    /// Held by a live lease
    Reserved,
    /// Excluded from selection by the user
    Locked,
    Spent,
}

impl OutputStatus {
    /// Spent wins over reserved, reserved over the user lock
    pub fn of(output: &Output, reserved: bool) -> Self {
        if output.spent {
            OutputStatus::Spent
        } else if reserved {
            OutputStatus::Reserved
        } else if output.locked {
            OutputStatus::Locked
        } else {
            OutputStatus::Available
        }
    }
}

impl fmt::Display for OutputStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OutputStatus::Available => "available",
            OutputStatus::Reserved => "reserved",
            OutputStatus::Locked => "locked",
            OutputStatus::Spent => "spent",
        };
        f.write_str(s)
    }
}
