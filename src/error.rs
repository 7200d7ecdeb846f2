use thiserror::Error;

use crate::api::ApiError;

/// Failures of roll-call session operations.
///
/// None of these are fatal: the session stays usable and the caller can
/// retry after changing the selection.
#[derive(Debug, Error)]
pub enum RollCallError {
    #[error("no students available to call")]
    NoCandidates,

    #[error("roll call already in progress")]
    AlreadyRolling,

    #[error("no roll call in progress")]
    NotRolling,

    #[error("cannot change {0} while a roll call is in progress")]
    LockedWhileRolling(&'static str),

    #[error("group {0} does not belong to the selected class")]
    UnknownGroup(i64),

    #[error("no class selected")]
    NoClassSelected,

    #[error("class {0} not found")]
    ClassNotFound(i64),

    #[error("history record {0} not found")]
    HistoryRecordNotFound(i64),

    /// The local record is kept even when this is reported.
    #[error("failed to save roll call record: {0}")]
    Persistence(ApiError),

    #[error(transparent)]
    Api(ApiError),
}
