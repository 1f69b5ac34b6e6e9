//! Frame source boundary.

use crate::camera::CameraError;
use crate::frame::RawFrame;

/// A camera that produces a live preview stream and on-demand stills.
///
/// Implementations are driven from a single thread; calls never overlap.
pub trait FrameSource: Send {
    /// Block until the next preview frame is available.
    fn next_preview(&mut self) -> Result<RawFrame, CameraError>;

    /// Take one full-resolution still.
    fn capture_still(&mut self) -> Result<RawFrame, CameraError>;

    /// Release the device. Calling it more than once is a no-op.
    fn shutdown(&mut self);
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn next_preview(&mut self) -> Result<RawFrame, CameraError> {
        (**self).next_preview()
    }

    fn capture_still(&mut self) -> Result<RawFrame, CameraError> {
        (**self).capture_still()
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }
}
