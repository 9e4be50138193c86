//! In-memory engine state.
//!
//! Everything here is volatile: a restart discards history and resets every
//! target to `down`.

mod downtime;
mod history;
mod models;
mod snapshot;
mod status;
mod store;

pub use history::*;
pub use models::*;
pub use snapshot::*;
pub use store::*;

use thiserror::Error;

/// State invariant violations.
#[derive(Error, Debug, PartialEq)]
pub enum StateError {
    #[error("downtime event already open for {0}")]
    DowntimeAlreadyOpen(String),
    #[error("no open downtime event for {0}")]
    NoOpenDowntime(String),
}
