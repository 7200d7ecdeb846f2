pub mod roll_calls;
pub mod roster;

pub use roster::ImportSummary;
