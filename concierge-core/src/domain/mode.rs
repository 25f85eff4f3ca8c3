use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Process-wide service degradation mode.
///
/// `ReadOnly` and `Offline` narrow what the request layer is willing to do;
/// what each mode means for a given operation is decided by the caller.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum DegradationMode {
    #[default]
    Normal,
    ReadOnly,
    Offline,
}

impl DegradationMode {
    pub const ALL: [DegradationMode; 3] = [
        DegradationMode::Normal,
        DegradationMode::ReadOnly,
        DegradationMode::Offline,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DegradationMode::Normal => "normal",
            DegradationMode::ReadOnly => "read_only",
            DegradationMode::Offline => "offline",
        }
    }

    /// Writes are refused in both `ReadOnly` and `Offline`.
    pub fn is_read_only(&self) -> bool {
        matches!(self, DegradationMode::ReadOnly | DegradationMode::Offline)
    }

    pub fn is_offline(&self) -> bool {
        matches!(self, DegradationMode::Offline)
    }

    pub fn as_u8(&self) -> u8 {
        match self {
            DegradationMode::Normal => 0,
            DegradationMode::ReadOnly => 1,
            DegradationMode::Offline => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(DegradationMode::Normal),
            1 => Some(DegradationMode::ReadOnly),
            2 => Some(DegradationMode::Offline),
            _ => None,
        }
    }
}

impl fmt::Display for DegradationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DegradationMode {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" => Ok(DegradationMode::Normal),
            "read_only" => Ok(DegradationMode::ReadOnly),
            "offline" => Ok(DegradationMode::Offline),
            other => Err(CoreError::Validation(format!(
                "invalid degradation mode '{}', expected one of: normal, read_only, offline",
                other
            ))),
        }
    }
}
