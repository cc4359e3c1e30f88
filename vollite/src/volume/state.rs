//! Volume lifecycle status and state machine.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use vollite_shared::errors::VolliteError;

/// Lifecycle status of a volume.
///
/// ```text
/// new()    → Undefined (declared, no hypervisor object)
/// define() → Defined   (storage materialized in the pool)
/// erase()  → Erased    (storage destroyed, can be defined again)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeStatus {
    /// Declared in memory only.
    #[default]
    Undefined,

    /// Backed by a hypervisor-side storage object.
    Defined,

    /// Storage object destroyed.
    Erased,
}

impl VolumeStatus {
    /// Check if define() can be called from this state.
    pub fn can_define(&self) -> bool {
        self.can_transition_to(VolumeStatus::Defined)
    }

    /// Whether queries against hypervisor state are allowed.
    pub fn is_defined(&self) -> bool {
        matches!(self, VolumeStatus::Defined)
    }

    /// Check if transition to target state is valid.
    pub fn can_transition_to(&self, target: VolumeStatus) -> bool {
        use VolumeStatus::*;
        matches!(
            (self, target),
            (Undefined, Defined) |
            // A same-named object left in the pool can be erased before first define
            (Undefined, Erased) |
            (Defined, Erased) |
            (Erased, Defined)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VolumeStatus::Undefined => "undefined",
            VolumeStatus::Defined => "defined",
            VolumeStatus::Erased => "erased",
        }
    }
}

impl FromStr for VolumeStatus {
    type Err = VolliteError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "undefined" => Ok(VolumeStatus::Undefined),
            "defined" => Ok(VolumeStatus::Defined),
            "erased" => Ok(VolumeStatus::Erased),
            other => Err(VolliteError::InvalidConfiguration(format!(
                "unknown volume status '{}'",
                other
            ))),
        }
    }
}

impl std::fmt::Display for VolumeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
