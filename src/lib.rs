//! SIRIM Capture - certification serial capture from camera text
//!
//! Picks certification serials out of recognized camera text, confirms them
//! over consecutive frames, stores them, and groups stored captures into
//! sessions per scanned product barcode.

pub mod analysis;
pub mod app;
pub mod capture;
pub mod config;
pub mod export;
pub mod shared;
pub mod storage;
pub mod vision;

pub use app::{CaptureDetails, SaveOutcome, ScannerApp};
