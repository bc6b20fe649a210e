use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors::{EngineError, EngineResult};

/// Anonymity knob mapped onto the minimum decoy pool size
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct SecurityLevel(u32);

impl SecurityLevel {
    pub const MIN: u32 = 1;
    pub const MAX: u32 = 100;
    pub const DEFAULT: SecurityLevel = SecurityLevel(2);

    pub fn new(level: u32) -> EngineResult<Self> {
        if !(Self::MIN..=Self::MAX).contains(&level) {
            return Err(EngineError::InvalidSecurityLevel {
                level,
                min: Self::MIN,
                max: Self::MAX,
            });
        }
        Ok(Self(level))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl Default for SecurityLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for SecurityLevel {
    type Error = EngineError;

    fn try_from(level: u32) -> Result<Self, Self::Error> {
        Self::new(level)
    }
}

impl From<SecurityLevel> for u32 {
    fn from(level: SecurityLevel) -> Self {
        level.0
    }
}

impl fmt::Display for SecurityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Minimum eligible RingCT pool for a build at `level`
pub fn required_pool_size(level: SecurityLevel) -> usize {
    10 * level.get() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_outside_range_are_rejected() {
        assert!(SecurityLevel::new(0).is_err());
        assert!(SecurityLevel::new(101).is_err());
        assert_eq!(SecurityLevel::new(100).unwrap().get(), 100);

        let parsed: Result<SecurityLevel, _> = serde_json::from_str("0");
        assert!(parsed.is_err());
        let parsed: SecurityLevel = serde_json::from_str("7").unwrap();
        assert_eq!(parsed.get(), 7);
    }

    #[test]
    fn pool_size_grows_with_level() {
        assert_eq!(required_pool_size(SecurityLevel::default()), 20);
        assert_eq!(required_pool_size(SecurityLevel::new(1).unwrap()), 10);
        assert_eq!(required_pool_size(SecurityLevel::new(100).unwrap()), 1_000);
    }
}
