//! facecap: face-gated still capture.
//!
//! A [`FaceCaptureSession`] analyzes live frames for face presence (one
//! analysis in flight at a time), exposes the result through an observable
//! capture gate, and turns a still into a [`FinalImage`]: re-verified,
//! rotation-corrected, cropped to the face and mirrored.
//! [`FaceCaptureController`] routes outcomes to presentation callbacks.

pub mod config;
pub mod controller;
pub mod engine;
pub mod error;
pub mod gate;
pub mod pipeline;
pub mod session;

pub use config::Config;
pub use controller::{CameraPermission, CaptureListener, FaceCaptureController};
pub use error::{CaptureError, ErrorKind};
pub use gate::{CaptureGate, GateState, LiveBounds};
pub use pipeline::{CropSource, FinalImage, PipelineOptions};
pub use session::FaceCaptureSession;
