pub mod history;
pub mod roster;
pub(crate) mod timestamp;

pub use history::{HistoryRecord, NewRollCall, PersistedRollCall};
pub use roster::{coerce_weight, Candidate, Class, Group, Student, MAX_WEIGHT};
