//! Observer status and health snapshot.

use serde::{Deserialize, Serialize};

use crate::mesh::ObserverId;
use crate::profile::DisplayMode;

/// Lifecycle status of a mesh observer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ObserverStatus {
    /// Built, warm-up not finished
    #[default]
    Initializing,
    /// Accepting observations
    Running,
    /// Observations ignored until resumed
    Suspended,
    /// Torn down; terminal
    Disabled,
}

impl ObserverStatus {
    pub fn accepts_observations(&self) -> bool {
        matches!(self, Self::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    pub(crate) fn as_u8(self) -> u8 {
        match self {
            Self::Initializing => 0,
            Self::Running => 1,
            Self::Suspended => 2,
            Self::Disabled => 3,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Running,
            2 => Self::Suspended,
            3 => Self::Disabled,
            _ => Self::Initializing,
        }
    }
}

/// Point-in-time diagnostics for an observer.
#[derive(Debug, Clone, Serialize)]
pub struct ObserverHealth {
    pub observer: ObserverId,
    pub status: ObserverStatus,
    pub display_mode: DisplayMode,
    /// Free slots in the pool.
    pub pooled: usize,
    /// Entries in the directory.
    pub active: usize,
    /// Observations waiting for a slot.
    pub pending: usize,
    pub total_created: usize,
}

impl ObserverHealth {
    /// Running with observations waiting on an empty pool.
    pub fn is_starved(&self) -> bool {
        self.status == ObserverStatus::Running && self.pooled == 0 && self.pending > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_default_is_initializing() {
        assert_eq!(ObserverStatus::default(), ObserverStatus::Initializing);
    }

    #[test]
    fn status_serializes_screaming_snake_case() {
        insta::assert_json_snapshot!(
            [
                ObserverStatus::Initializing,
                ObserverStatus::Running,
                ObserverStatus::Suspended,
                ObserverStatus::Disabled,
            ],
            @r#"
        [
          "INITIALIZING",
          "RUNNING",
          "SUSPENDED",
          "DISABLED"
        ]
        "#
        );
    }

    #[test]
    fn only_running_accepts_observations() {
        assert!(ObserverStatus::Running.accepts_observations());
        assert!(!ObserverStatus::Suspended.accepts_observations());
        assert!(!ObserverStatus::Disabled.accepts_observations());
        assert!(ObserverStatus::Disabled.is_terminal());
    }

    #[test]
    fn starved_when_pending_on_empty_pool() {
        let health = ObserverHealth {
            observer: ObserverId::new(),
            status: ObserverStatus::Running,
            display_mode: DisplayMode::Visible,
            pooled: 0,
            active: 10,
            pending: 1,
            total_created: 10,
        };
        assert!(health.is_starved());
    }
}
