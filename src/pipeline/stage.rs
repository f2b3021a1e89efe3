use crate::error::{CrmError, Result};
use std::fmt;

/// Steps of a migration run, in the only order they may happen
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MigrationStage {
    Configured,
    Validated,
    ConnectionTested,
    Previewed,
    FieldsMapped,
    RecordsSelected,
    Confirmed,
    Running,
    Summarized,
}

impl MigrationStage {
    pub fn next(self) -> Option<Self> {
        use MigrationStage::*;
        match self {
            Configured => Some(Validated),
            Validated => Some(ConnectionTested),
            ConnectionTested => Some(Previewed),
            Previewed => Some(FieldsMapped),
            FieldsMapped => Some(RecordsSelected),
            RecordsSelected => Some(Confirmed),
            Confirmed => Some(Running),
            Running => Some(Summarized),
            Summarized => None,
        }
    }

    /// Move to `to`, which must be the immediate successor.
    pub fn advance(&mut self, to: MigrationStage) -> Result<()> {
        if self.next() != Some(to) {
            return Err(CrmError::InvalidTransition {
                from: self.to_string(),
                to: to.to_string(),
            });
        }
        *self = to;
        Ok(())
    }
}

impl fmt::Display for MigrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
