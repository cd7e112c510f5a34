use thiserror::Error;

use crate::action::ActionError;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum GroupingError {
    /// The caller asked for something the optimizer cannot do.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A solution lost or duplicated a participant. Never expected in correct code.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Cannot select parents from an empty population")]
    EmptyPopulation,

    #[error("Group edit failed: {0}")]
    Action(#[from] ActionError),
}

pub type Result<T> = std::result::Result<T, GroupingError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_error_converts() {
        let err: GroupingError = ActionError::InvalidPosition.into();
        assert_eq!(err, GroupingError::Action(ActionError::InvalidPosition));
        assert_eq!(err.to_string(), "Group edit failed: Invalid position");
    }

    #[test]
    fn invalid_argument_display() {
        let err = GroupingError::InvalidArgument("group count must be positive".to_string());
        assert_eq!(err.to_string(), "Invalid argument: group count must be positive");
    }
}
