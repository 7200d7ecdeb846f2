pub mod candidates;
pub mod ledger;
pub mod sampler;
pub mod stats;

pub use candidates::{resolve_candidates, scope_size};
pub use ledger::HistoryLedger;
pub use sampler::TicketSampler;
pub use stats::{format_elapsed, project, RollCallStats};
