//! Error types for configuration resolution and the run lifecycle.

use crate::model::{BoardId, FirmwareKind, HicId};
use std::fmt;
use thiserror::Error;

/// Fatal problems with the registries or the filter.
///
/// All of these are raised before any board is touched.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigurationError {
    /// Two targets claim the same board family
    #[error("Multiple targets found for board id \"{board_id}\"")]
    DuplicateTarget { board_id: BoardId },

    /// Two bootloaders claim the same interface circuit
    #[error("Duplicate bootloaders for HIC \"{hic_id}\" not allowed ({first} and {second})")]
    DuplicateBootloader {
        hic_id: HicId,
        first: String,
        second: String,
    },

    /// A name appears twice among firmware of one kind
    #[error("Duplicate {kind} firmware name \"{name}\"")]
    DuplicateFirmware { name: String, kind: FirmwareKind },

    /// The explicit firmware filter names images that are not in the registry
    #[error("Cannot find firmware {}", .missing.join(", "))]
    UnknownFirmware { missing: Vec<String> },
}

/// Phase of a [`crate::manager::TestManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Configured,
    Complete,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Init => f.write_str("Init"),
            RunState::Configured => f.write_str("Configured"),
            RunState::Complete => f.write_str("Complete"),
        }
    }
}

fn describe_states(states: &[RunState]) -> String {
    states
        .iter()
        .map(RunState::to_string)
        .collect::<Vec<_>>()
        .join(" or ")
}

/// An operation was called in the wrong phase. This is a caller bug.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("{operation} requires state {}, but the run is {actual}", describe_states(.allowed))]
    WrongState {
        operation: &'static str,
        allowed: &'static [RunState],
        actual: RunState,
    },

    #[error("firmware filter has already been set")]
    FilterAlreadySet,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ManagerError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ConfigurationError::UnknownFirmware {
            missing: vec!["a_if".to_string(), "b_if".to_string()],
        };
        assert_eq!(err.to_string(), "Cannot find firmware a_if, b_if");

        let err = LifecycleError::WrongState {
            operation: "test_configurations",
            allowed: &[RunState::Configured, RunState::Complete],
            actual: RunState::Init,
        };
        assert_eq!(
            err.to_string(),
            "test_configurations requires state Configured or Complete, but the run is Init"
        );
    }
}
