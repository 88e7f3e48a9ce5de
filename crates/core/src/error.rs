use thiserror::Error;

use crate::model::{CycleError, PlanError, RecordError};
use crate::timer::TimerError;

/// Any validation failure raised by the domain model.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error(transparent)]
    Record(#[from] RecordError),
    #[error(transparent)]
    Timer(#[from] TimerError),
    #[error(transparent)]
    Cycle(#[from] CycleError),
}
