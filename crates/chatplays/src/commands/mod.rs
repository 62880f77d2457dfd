//! Commands
//!
//! Command registry, vote aggregation and the privileged host control
//! surface.

mod aggregator;
mod control;
mod registry;

pub use aggregator::{
    AggregatorEvent, ResolvedOptions, VoteAggregator, VoteOrigin, VoteOutcome, VotePolicy,
};
pub use control::HostCommand;
pub use registry::{CommandEntry, CommandRegistry};

pub(crate) use aggregator::seconds;
