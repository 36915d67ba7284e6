//! Shared messaging between the scanner coordinator and its consumers

pub mod messages;

pub use messages::StatusMessage;
