//! Modification audit trail.
//!
//! Every decided proposal, accepted or not, becomes exactly one immutable
//! [`ModificationRecord`]. The tracker owns the records for one run and
//! projects them into the long and wide export views.

mod store;
mod types;

pub use store::ModificationTracker;
pub use types::{ModificationRecord, TrackerSummary};
