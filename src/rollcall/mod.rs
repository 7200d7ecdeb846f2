pub mod commands;
pub mod controller;
pub mod state;
#[cfg(test)]
pub(crate) mod testing;

pub use controller::{RollCallController, RollCallSnapshot, RollEvent, SaveResult};
pub use state::{RollCallState, RollStatus};
