//! Analysis Layer
//!
//! Batch analysis over stored records.

pub mod sessions;

pub use sessions::{partition, Session, SessionGrouping};
