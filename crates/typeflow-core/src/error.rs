//! Hard failures of an inference run
//!
//! Everything the analysis can approximate (unresolved calls, reads of
//! unassigned variables, overflowing type tables) is reported through the
//! results instead. These errors mean the input is inconsistent or the run
//! was stopped.

use crate::bound::BlockId;
use crate::symbols::RoutineId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("routine {0:?} is not declared in the symbol oracle")]
    UnknownRoutine(RoutineId),

    #[error("routine {0:?} has more than one body in the unit")]
    DuplicateRoutine(RoutineId),

    #[error("malformed body: {0}")]
    MalformedBody(String),

    #[error("block {block:?} of routine {routine:?} is out of range")]
    UnknownBlock { routine: RoutineId, block: BlockId },

    #[error("analysis cancelled after {rounds} rounds")]
    Cancelled { rounds: usize },
}

pub type Result<T> = std::result::Result<T, AnalysisError>;
