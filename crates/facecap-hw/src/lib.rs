//! facecap-hw: camera frames and capture hardware.
//!
//! Defines the raw frame handle, the encoded/planar decode paths, the
//! frame source boundary, and a V4L2 implementation of it.

pub mod camera;
pub mod decode;
pub mod frame;
pub mod source;

pub use camera::{Camera, CameraError, CameraOptions, DeviceInfo};
pub use decode::{decode_frame, DecodeError};
pub use frame::{PixelFormat, Plane, RawFrame};
pub use source::FrameSource;
