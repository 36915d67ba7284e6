//! Frame data structures for camera content

use std::time::Instant;

/// A camera frame handed to the analysis worker
///
/// Producers may block until a frame is closed, so every frame must be closed
/// exactly once after analysis, whatever the outcome.
pub trait Frame: Send {
    /// Frame width in pixels, as captured
    fn width(&self) -> u32;
    /// Frame height in pixels, as captured
    fn height(&self) -> u32;
    /// Clockwise rotation needed to display the frame upright
    fn rotation_degrees(&self) -> i32;
    /// Raw pixel data
    fn data(&self) -> &[u8];
    /// Release the frame back to its producer
    fn close(&mut self);
}

/// An owned frame held in memory
#[derive(Debug)]
pub struct CapturedFrame {
    /// Raw pixel data
    pub data: Vec<u8>,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Display rotation in degrees
    pub rotation_degrees: i32,
    /// Timestamp when frame was captured
    pub timestamp: Instant,
    closed: bool,
}

impl CapturedFrame {
    /// Create a new captured frame
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            rotation_degrees: 0,
            timestamp: Instant::now(),
            closed: false,
        }
    }

    /// Set the display rotation
    pub fn with_rotation(mut self, rotation_degrees: i32) -> Self {
        self.rotation_degrees = rotation_degrees;
        self
    }

    /// Get frame dimensions as (width, height)
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Whether the frame has been released
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Frame for CapturedFrame {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn rotation_degrees(&self) -> i32 {
        self.rotation_degrees
    }

    fn data(&self) -> &[u8] {
        &self.data
    }

    fn close(&mut self) {
        self.data = Vec::new();
        self.closed = true;
    }
}
